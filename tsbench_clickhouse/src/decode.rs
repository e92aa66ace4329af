//! Rows of the generated input and the batches that carry them to workers.

use std::{collections::BTreeMap, io::BufRead};

use tsbench_load::{Batch, DecodeError, HashIndexer, PointDecoder, PointIndexer};

/// One measurement of one host, kept as the text the processor turns into SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub table: String,
    /// `hostname=host_0,region=eu-west-1,...`
    pub tags: String,
    /// `<timestamp ns>,<value>,<value>,...`
    pub fields: String,
}

impl Row {
    /// The first tag, `hostname=<host>` for generated data
    pub fn host_tag(&self) -> &str {
        self.tags.split(',').next().unwrap_or_default()
    }
}

/// Reads the line pairs that follow the header:
///
/// ```text
/// tags,hostname=host_0,region=eu-west-1,datacenter=eu-west-1b
/// cpu,1451606400000000000,58,2,24
/// ```
#[derive(Debug)]
pub struct RowDecoder<R> {
    input: R,
    line: u64,
    buf: String,
}

impl<R: BufRead> RowDecoder<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            line: 0,
            buf: String::new(),
        }
    }

    /// Read one line into the buffer, `false` at the end of the input
    fn read_line(&mut self) -> Result<bool, DecodeError> {
        self.buf.clear();
        if self.input.read_line(&mut self.buf)? == 0 {
            return Ok(false);
        }
        self.line += 1;
        let len = self.buf.trim_end_matches(['\n', '\r']).len();
        self.buf.truncate(len);
        Ok(true)
    }
}

impl<R: BufRead> PointDecoder for RowDecoder<R> {
    type Point = Row;

    fn decode(&mut self) -> Result<Option<Row>, DecodeError> {
        if !self.read_line()? {
            return Ok(None);
        }
        let tags = match self.buf.split_once(',') {
            Some(("tags", tags)) => tags.to_string(),
            _ => {
                return Err(DecodeError::malformed(
                    self.line,
                    "expected a line starting with 'tags,'",
                ));
            }
        };

        if !self.read_line()? {
            return Err(DecodeError::malformed(
                self.line,
                "input ended between a tags line and its values",
            ));
        }
        match self.buf.split_once(',') {
            Some((table, fields)) if !table.is_empty() => Ok(Some(Row {
                table: table.to_string(),
                tags,
                fields: fields.to_string(),
            })),
            _ => Err(DecodeError::malformed(
                self.line,
                "expected '<table>,<timestamp>,<values>'",
            )),
        }
    }
}

/// Rows grouped by destination table
#[derive(Debug, Default)]
pub struct TableBatch {
    tables: BTreeMap<String, Vec<Row>>,
    rows: usize,
}

impl TableBatch {
    pub fn tables(&self) -> impl Iterator<Item = (&str, &[Row])> {
        self.tables.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn into_tables(self) -> BTreeMap<String, Vec<Row>> {
        self.tables
    }
}

impl Batch for TableBatch {
    type Point = Row;

    fn len(&self) -> usize {
        self.rows
    }

    fn append(&mut self, row: Row) {
        self.rows += 1;
        match self.tables.get_mut(&row.table) {
            Some(rows) => rows.push(row),
            None => {
                self.tables.insert(row.table.clone(), vec![row]);
            }
        }
    }
}

/// Sends all rows of a host to the same lane
#[derive(Debug, Clone, Copy)]
pub struct HostnameIndexer(HashIndexer);

impl HostnameIndexer {
    pub fn new(lanes: usize) -> Self {
        Self(HashIndexer::new(lanes))
    }
}

impl PointIndexer<Row> for HostnameIndexer {
    fn index(&self, row: &Row) -> usize {
        self.0.index_for_key(row.host_tag().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use pretty_assertions::assert_eq;

    const DATA: &str = "tags,hostname=host_0,region=eu-west-1\n\
                        cpu,1451606400000000000,58,2\n\
                        tags,hostname=host_1,region=us-east-1,path=/dev/sda1\n\
                        disk,1451606400000000000,7\r\n";

    fn decode_all(input: &str) -> Result<Vec<Row>, DecodeError> {
        let mut decoder = RowDecoder::new(Cursor::new(input.to_string()));
        let mut rows = vec![];
        while let Some(row) = decoder.decode()? {
            rows.push(row);
        }
        Ok(rows)
    }

    #[test]
    fn decodes_line_pairs() {
        let rows = decode_all(DATA).unwrap();
        assert_eq!(
            rows,
            vec![
                Row {
                    table: "cpu".to_string(),
                    tags: "hostname=host_0,region=eu-west-1".to_string(),
                    fields: "1451606400000000000,58,2".to_string(),
                },
                Row {
                    table: "disk".to_string(),
                    tags: "hostname=host_1,region=us-east-1,path=/dev/sda1".to_string(),
                    fields: "1451606400000000000,7".to_string(),
                },
            ]
        );
        assert_eq!(rows[1].host_tag(), "hostname=host_1");
    }

    #[test]
    fn missing_tags_line() {
        let err = decode_all("cpu,1,2\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "malformed input at line 1: expected a line starting with 'tags,'"
        );
    }

    #[test]
    fn truncated_pair() {
        let err = decode_all("tags,hostname=host_0\n").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { line: 1, .. }), "{err}");
    }

    #[test]
    fn batch_groups_by_table() {
        let mut batch = TableBatch::default();
        assert!(batch.is_empty());
        for row in decode_all(DATA).unwrap() {
            batch.append(row.clone());
            batch.append(row);
        }
        assert_eq!(batch.len(), 4);
        let sizes: Vec<(&str, usize)> = batch.tables().map(|(t, rows)| (t, rows.len())).collect();
        assert_eq!(sizes, vec![("cpu", 2), ("disk", 2)]);
    }

    #[test]
    fn rows_of_a_host_share_a_lane() {
        let indexer = HostnameIndexer::new(8);
        let row = |tags: &str, table: &str| Row {
            table: table.to_string(),
            tags: tags.to_string(),
            fields: "0,1".to_string(),
        };
        let a = indexer.index(&row("hostname=host_3,region=a", "cpu"));
        let b = indexer.index(&row("hostname=host_3,region=b,path=/", "disk"));
        assert_eq!(a, b);
        assert!(a < 8);
        assert_eq!(HostnameIndexer::new(1).index(&row("hostname=host_9", "cpu")), 0);
    }
}
