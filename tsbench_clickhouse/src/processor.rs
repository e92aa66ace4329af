//! Turns batches of rows into `INSERT` statements.

use std::{
    collections::HashMap,
    fmt::Write as _,
    sync::{Arc, atomic::Ordering},
    time::Instant,
};

use chrono::DateTime;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::debug;
use tsbench_load::{BatchStats, DynError, Processor};

use crate::{
    Client, DataHeader, Error, Result, Row, TableBatch, benchmark::LoadContext, header::Table,
};

/// Host tag value to tags id
#[derive(Debug)]
enum TagCache {
    /// Each worker sees a disjoint set of hosts
    Local(HashMap<String, u32>),
    Shared(Arc<RwLock<HashMap<String, u32>>>),
}

/// A row split into the pieces of its SQL tuple
#[derive(Debug, PartialEq)]
struct ParsedRow<'a> {
    /// Values of the header tags, the host first
    tags: Vec<&'a str>,
    /// JSON object of the tags beyond the header ones
    additional_tags: Option<String>,
    time: String,
    values: Vec<&'a str>,
}

impl<'a> ParsedRow<'a> {
    fn parse(row: &'a Row, table: &Table, tag_count: usize) -> Result<Self> {
        let malformed = |reason: String| Error::MalformedRow {
            table: row.table.clone(),
            reason,
        };

        let mut tags = Vec::with_capacity(tag_count);
        let mut extra = Map::new();
        for (i, pair) in row.tags.split(',').enumerate() {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| malformed(format!("tag '{pair}' is not key=value")))?;
            if i < tag_count {
                tags.push(value);
            } else {
                extra.insert(key.to_string(), Value::String(value.to_string()));
            }
        }
        if tags.len() < tag_count {
            return Err(malformed(format!(
                "expected {tag_count} tags, got {}",
                tags.len()
            )));
        }

        let mut fields = row.fields.split(',');
        let ts = fields.next().unwrap_or_default();
        let nanos: i64 = ts
            .parse()
            .map_err(|_| malformed(format!("bad timestamp '{ts}'")))?;
        let time = DateTime::from_timestamp_nanos(nanos)
            .format("%Y-%m-%d %H:%M:%S%.9f")
            .to_string();

        let values: Vec<&str> = fields.collect();
        if values.len() != table.columns.len() {
            return Err(malformed(format!(
                "expected {} values, got {}",
                table.columns.len(),
                values.len()
            )));
        }
        if let Some(bad) = values.iter().find(|v| v.parse::<f64>().is_err()) {
            return Err(malformed(format!("'{bad}' is not a number")));
        }

        Ok(Self {
            tags,
            additional_tags: (!extra.is_empty()).then(|| Value::Object(extra).to_string()),
            time,
            values,
        })
    }
}

/// Writes batches for one worker
#[derive(Debug)]
pub struct ClickHouseProcessor {
    context: Arc<LoadContext>,
    client: Option<Client>,
    cache: TagCache,
}

impl ClickHouseProcessor {
    pub(crate) fn new(context: Arc<LoadContext>) -> Self {
        let cache = if context.hash_workers {
            TagCache::Local(HashMap::new())
        } else {
            TagCache::Shared(Arc::clone(&context.tag_ids))
        };
        Self {
            context,
            client: None,
            cache,
        }
    }

    /// Write the rows of one table, returning the number of metrics written
    fn process_table(&mut self, table_name: &str, rows: &[Row]) -> Result<u64> {
        let context = Arc::clone(&self.context);
        let header = context.header.get().ok_or(Error::HeaderNotRead)?;
        let table = header
            .table(table_name)
            .ok_or_else(|| Error::UnknownTable(table_name.to_string()))?;
        let parsed = rows
            .iter()
            .map(|row| ParsedRow::parse(row, table, header.tags.len()))
            .collect::<Result<Vec<_>>>()?;

        self.register_tags(&context, header, &parsed)?;
        let ids = self.lookup_ids(&parsed);
        let insert = rows_insert(header, table, context.config.in_table_tag, &parsed, &ids);
        execute(&context, self.client.as_ref(), insert)?;

        Ok(parsed.iter().map(|r| r.values.len() as u64).sum())
    }

    /// Assign ids to hosts not seen before and insert their tags
    fn register_tags(
        &mut self,
        context: &LoadContext,
        header: &DataHeader,
        rows: &[ParsedRow<'_>],
    ) -> Result<()> {
        let client = self.client.as_ref();
        match &mut self.cache {
            TagCache::Local(known) => insert_new_tags(context, client, header, known, rows),
            TagCache::Shared(shared) => {
                let missing = {
                    let known = shared.read();
                    rows.iter().any(|r| !known.contains_key(r.tags[0]))
                };
                if !missing {
                    return Ok(());
                }
                // other workers wait until the new ids are usable
                let mut known = shared.write();
                insert_new_tags(context, client, header, &mut known, rows)
            }
        }
    }

    fn lookup_ids(&self, rows: &[ParsedRow<'_>]) -> Vec<u32> {
        let lookup = |known: &HashMap<String, u32>| {
            rows.iter()
                .map(|r| known.get(r.tags[0]).copied().unwrap_or_default())
                .collect::<Vec<_>>()
        };
        match &self.cache {
            TagCache::Local(known) => lookup(known),
            TagCache::Shared(shared) => lookup(&*shared.read()),
        }
    }
}

/// Insert the tags of hosts missing from `known`, caching their ids once the insert succeeded
fn insert_new_tags(
    context: &LoadContext,
    client: Option<&Client>,
    header: &DataHeader,
    known: &mut HashMap<String, u32>,
    rows: &[ParsedRow<'_>],
) -> Result<()> {
    let mut new_tags: Vec<(u32, &[&str])> = vec![];
    for row in rows {
        let host = row.tags[0];
        if !known.contains_key(host) && !new_tags.iter().any(|(_, tags)| tags[0] == host) {
            let id = context.next_tag_id.fetch_add(1, Ordering::Relaxed);
            new_tags.push((id, &row.tags[..]));
        }
    }
    if new_tags.is_empty() {
        return Ok(());
    }

    execute(context, client, tags_insert(&header.tags, &new_tags))?;
    known.extend(
        new_tags
            .iter()
            .map(|(id, tags)| (tags[0].to_string(), *id)),
    );
    Ok(())
}

fn execute(context: &LoadContext, client: Option<&Client>, sql: String) -> Result<()> {
    match client {
        Some(client) => Ok(context.runtime.block_on(client.execute(sql))?),
        None => Ok(()),
    }
}

impl Processor for ClickHouseProcessor {
    type Batch = TableBatch;

    fn init(&mut self, worker: usize, do_load: bool) -> Result<(), DynError> {
        if do_load {
            let client = self
                .context
                .config
                .client(Some(&self.context.db_name))?;
            self.client = Some(client);
        }
        debug!(worker, do_load, "clickhouse processor ready");
        Ok(())
    }

    fn process_batch(&mut self, batch: TableBatch, do_load: bool) -> Result<BatchStats, DynError> {
        let mut stats = BatchStats::default();
        for (table, rows) in batch.into_tables() {
            stats.rows += rows.len() as u64;
            if do_load {
                let start = Instant::now();
                stats.metrics += self.process_table(&table, &rows)?;
                if self.context.config.log_batches {
                    let took = start.elapsed();
                    println!(
                        "BATCH: batchsize {} row rate {:.6}/sec (took {took:?})",
                        rows.len(),
                        rows.len() as f64 / took.as_secs_f64()
                    );
                }
            }
        }
        Ok(stats)
    }

    fn close(&mut self, _do_load: bool) {
        self.client = None;
    }
}

/// Single quoted SQL string literal
fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn tags_insert(tag_columns: &[String], rows: &[(u32, &[&str])]) -> String {
    let mut sql = format!("INSERT INTO tags (id,{}) VALUES ", tag_columns.join(","));
    for (i, (id, values)) in rows.iter().enumerate() {
        if i > 0 {
            sql.push(',');
        }
        let values: Vec<String> = values.iter().map(|v| quote(v)).collect();
        let _ = write!(sql, "({id},{})", values.join(","));
    }
    sql
}

fn rows_insert(
    header: &DataHeader,
    table: &Table,
    in_table_tag: bool,
    rows: &[ParsedRow<'_>],
    ids: &[u32],
) -> String {
    let mut sql = format!("INSERT INTO {} (time,tags_id,additional_tags", table.name);
    if in_table_tag {
        sql.push(',');
        sql.push_str(&header.tags[0]);
    }
    for column in &table.columns {
        sql.push(',');
        sql.push_str(column);
    }
    sql.push_str(") VALUES ");

    for (i, (row, id)) in rows.iter().zip(ids).enumerate() {
        if i > 0 {
            sql.push(',');
        }
        let additional = row
            .additional_tags
            .as_deref()
            .map(quote)
            .unwrap_or_else(|| "NULL".to_string());
        let _ = write!(sql, "({},{id},{additional}", quote(&row.time));
        if in_table_tag {
            let _ = write!(sql, ",{}", quote(row.tags[0]));
        }
        for value in &row.values {
            sql.push(',');
            sql.push_str(value);
        }
        sql.push(')');
    }
    sql
}
