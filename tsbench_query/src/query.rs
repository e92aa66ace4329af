//! Query files: one query per line as `<label>\t<query text>`.

use std::io::BufRead;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Groups latencies of queries of the same kind
    pub label: String,
    pub text: String,
}

/// Reads queries from a query file. Blank lines and lines starting with `#` are skipped.
#[derive(Debug)]
pub struct QueryDecoder<R> {
    input: R,
    line: u64,
    buf: String,
}

impl<R: BufRead> QueryDecoder<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            line: 0,
            buf: String::new(),
        }
    }

    /// The next query, `None` at the end of the input
    pub fn decode(&mut self) -> Result<Option<Query>> {
        loop {
            self.buf.clear();
            if self.input.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line += 1;

            let line = self.buf.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((label, text)) = line.split_once('\t') else {
                return Err(Error::Malformed {
                    line: self.line,
                    reason: "expected a label and a query separated by a tab".to_string(),
                });
            };
            if label.is_empty() || text.trim().is_empty() {
                return Err(Error::Malformed {
                    line: self.line,
                    reason: "empty label or query".to_string(),
                });
            }
            return Ok(Some(Query {
                label: label.to_string(),
                text: text.to_string(),
            }));
        }
    }
}

impl<R: BufRead> Iterator for QueryDecoder<R> {
    type Item = Result<Query>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decode().transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reads_queries() {
        let input = "# generated queries\n\
                     cpu-max-all-1\tSELECT max(usage_user) FROM cpu\n\
                     \n\
                     lastpoint\tSELECT * FROM cpu\tWHERE 1\r\n";
        let queries: Vec<Query> = QueryDecoder::new(Cursor::new(input))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(
            queries,
            vec![
                Query {
                    label: "cpu-max-all-1".to_string(),
                    text: "SELECT max(usage_user) FROM cpu".to_string(),
                },
                Query {
                    label: "lastpoint".to_string(),
                    text: "SELECT * FROM cpu\tWHERE 1".to_string(),
                },
            ]
        );
    }

    #[test]
    fn missing_tab() {
        let mut decoder = QueryDecoder::new(Cursor::new("ok\tSELECT 1\nSELECT 2\n"));
        assert!(decoder.decode().unwrap().is_some());
        let err = decoder.decode().unwrap_err();
        assert_eq!(
            err.to_string(),
            "malformed query at line 2: expected a label and a query separated by a tab"
        );
    }

    #[test]
    fn empty_input() {
        let mut decoder = QueryDecoder::new(Cursor::new(""));
        assert!(decoder.decode().unwrap().is_none());
    }
}
