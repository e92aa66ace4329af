//! The schema preamble of generated ClickHouse input.
//!
//! ```text
//! tags,hostname,region,datacenter,rack,os,arch,team,service,service_version,service_environment
//! cpu,usage_user,usage_system,usage_idle,usage_nice,usage_iowait,usage_irq,usage_softirq,usage_steal,usage_guest,usage_guest_nice
//! disk,total,free,used,used_percent,inodes_total,inodes_free,inodes_used
//!
//! ```

use std::io::BufRead;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataHeader {
    /// Tags common to every row, the first one identifies the host
    pub tags: Vec<String>,
    pub tables: Vec<Table>,
}

impl DataHeader {
    /// Read the header, leaving `input` at the first data line
    pub fn read(input: &mut dyn BufRead) -> Result<Self> {
        let mut line = String::new();
        let mut next_line = |line: &mut String| -> Result<()> {
            line.clear();
            if input.read_line(line)? == 0 {
                return Err(Error::Header(
                    "input ended before the blank line closing the header".to_string(),
                ));
            }
            Ok(())
        };

        next_line(&mut line)?;
        let mut parts = line.trim().split(',');
        match parts.next() {
            Some("tags") => {}
            other => {
                return Err(Error::Header(format!(
                    "got '{}', expected 'tags'",
                    other.unwrap_or_default()
                )));
            }
        }
        let tags: Vec<String> = parts.map(str::to_string).collect();
        if tags.is_empty() || tags.iter().any(String::is_empty) {
            return Err(Error::Header("empty tag name".to_string()));
        }

        let mut tables = vec![];
        loop {
            next_line(&mut line)?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                break;
            }
            let mut parts = trimmed.split(',');
            let name = parts.next().unwrap_or_default().to_string();
            let columns: Vec<String> = parts
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
            if name.is_empty() || columns.is_empty() {
                return Err(Error::Header(format!("bad table description '{trimmed}'")));
            }
            tables.push(Table { name, columns });
        }

        Ok(Self { tags, tables })
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }
}
