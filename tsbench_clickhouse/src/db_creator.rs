//! Database and schema setup ahead of a load.

use std::{io::BufRead, sync::Arc};

use tracing::{debug, info};
use tsbench_load::{DbCreator, DynError};

use crate::{Client, DataHeader, Error, Result, benchmark::LoadContext, header::Table};

/// Creates the database, the `tags` table and one table per measurement of the data header
#[derive(Debug)]
pub struct ClickHouseDbCreator {
    context: Arc<LoadContext>,
}

impl ClickHouseDbCreator {
    pub(crate) fn new(context: Arc<LoadContext>) -> Self {
        Self { context }
    }

    fn header(&self) -> Result<&DataHeader> {
        self.context.header.get().ok_or(Error::HeaderNotRead)
    }

    fn run(&self, client: &Client, sql: String) -> Result<bytes::Bytes> {
        debug!(%sql, "clickhouse schema statement");
        Ok(self.context.runtime.block_on(client.query(sql))?)
    }
}

impl DbCreator for ClickHouseDbCreator {
    fn init(&mut self, input: &mut dyn BufRead) -> Result<(), DynError> {
        let header = DataHeader::read(input)?;
        info!(
            tags = header.tags.len(),
            tables = header.tables.len(),
            "read data header"
        );
        // a second init keeps the first header
        let _ = self.context.header.set(header);
        Ok(())
    }

    fn db_exists(&self, db_name: &str) -> Result<bool, DynError> {
        let client = self.context.config.client(None)?;
        let body = self.run(
            &client,
            format!(
                "SELECT 1 FROM system.databases WHERE name = '{}'",
                db_name.replace('\'', "\\'")
            ),
        )?;
        Ok(!body.iter().all(u8::is_ascii_whitespace))
    }

    fn remove_old_db(&self, db_name: &str) -> Result<(), DynError> {
        let client = self.context.config.client(None)?;
        self.run(&client, format!("DROP DATABASE IF EXISTS {db_name}"))?;
        Ok(())
    }

    fn create_db(&self, db_name: &str) -> Result<(), DynError> {
        let client = self.context.config.client(None)?;
        self.run(&client, format!("CREATE DATABASE {db_name}"))?;
        Ok(())
    }

    fn post_create_db(&self, db_name: &str) -> Result<(), DynError> {
        let header = self.header()?;
        let client = self.context.config.client(Some(db_name))?;
        self.run(&client, create_tags_table(&header.tags))?;
        for table in &header.tables {
            self.run(
                &client,
                create_measurement_table(table, &header.tags[0], self.context.config.in_table_tag),
            )?;
        }
        info!(db_name, tables = header.tables.len() + 1, "created tables");
        Ok(())
    }
}

fn create_tags_table(tags: &[String]) -> String {
    let columns: Vec<String> = tags.iter().map(|t| format!("{t} String")).collect();
    format!(
        "CREATE TABLE tags (created_at DateTime DEFAULT now(), id UInt32, {}) \
         ENGINE = MergeTree() ORDER BY ({})",
        columns.join(", "),
        tags.join(",")
    )
}

fn create_measurement_table(table: &Table, host_tag: &str, in_table_tag: bool) -> String {
    let mut columns = vec![
        "time DateTime64(9, 'UTC')".to_string(),
        "tags_id UInt32".to_string(),
    ];
    if in_table_tag {
        columns.push(format!("{host_tag} String"));
    }
    columns.extend(table.columns.iter().map(|c| format!("{c} Float64")));
    columns.push("additional_tags Nullable(String) DEFAULT NULL".to_string());
    format!(
        "CREATE TABLE {} ({}) ENGINE = MergeTree() ORDER BY (tags_id, time)",
        table.name,
        columns.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        io::Cursor,
        sync::{OnceLock, atomic::AtomicU32},
    };

    use clap::Parser;
    use mockito::{Matcher, Server};
    use pretty_assertions::assert_eq;
    use tokio::runtime::Runtime;

    use super::*;
    use crate::ClickHouseConfig;

    const HEADER: &str = "tags,hostname,region\ncpu,usage_user,usage_system\nmem,free\n\n";

    fn creator(url: &str, in_table_tag: bool, runtime: &Runtime) -> ClickHouseDbCreator {
        let mut config = ClickHouseConfig::try_parse_from(["clickhouse"]).unwrap();
        config.url = url.parse().unwrap();
        config.in_table_tag = in_table_tag;
        ClickHouseDbCreator::new(Arc::new(LoadContext {
            config,
            db_name: "benchmark".to_string(),
            hash_workers: false,
            runtime: runtime.handle().clone(),
            header: OnceLock::new(),
            next_tag_id: AtomicU32::new(1),
            tag_ids: Arc::new(parking_lot::RwLock::new(HashMap::new())),
        }))
    }

    #[test]
    fn table_statements() {
        let tags = vec!["hostname".to_string(), "region".to_string()];
        assert_eq!(
            create_tags_table(&tags),
            "CREATE TABLE tags (created_at DateTime DEFAULT now(), id UInt32, hostname String, \
             region String) ENGINE = MergeTree() ORDER BY (hostname,region)"
        );

        let table = Table {
            name: "cpu".to_string(),
            columns: vec!["usage_user".to_string(), "usage_system".to_string()],
        };
        assert_eq!(
            create_measurement_table(&table, "hostname", false),
            "CREATE TABLE cpu (time DateTime64(9, 'UTC'), tags_id UInt32, usage_user Float64, \
             usage_system Float64, additional_tags Nullable(String) DEFAULT NULL) \
             ENGINE = MergeTree() ORDER BY (tags_id, time)"
        );
        assert!(
            create_measurement_table(&table, "hostname", true)
                .contains("tags_id UInt32, hostname String, usage_user Float64")
        );
    }

    #[test]
    fn init_reads_the_header_once() {
        let runtime = Runtime::new().unwrap();
        let mut creator = creator("http://127.0.0.1:1", false, &runtime);
        assert!(matches!(creator.header(), Err(Error::HeaderNotRead)));

        let mut input = Cursor::new(format!("{HEADER}tags,hostname=host_0,region=a\n"));
        creator.init(&mut input).unwrap();
        assert_eq!(creator.header().unwrap().tables.len(), 2);

        let mut rest = String::new();
        input.read_line(&mut rest).unwrap();
        assert_eq!(rest, "tags,hostname=host_0,region=a\n");
    }

    #[test]
    fn init_rejects_a_bad_header() {
        let runtime = Runtime::new().unwrap();
        let mut creator = creator("http://127.0.0.1:1", false, &runtime);
        let err = creator
            .init(&mut Cursor::new("cpu,usage_user\n\n"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "input has wrong header format: got 'cpu', expected 'tags'"
        );
    }

    #[test]
    fn creates_database_and_tables() {
        let runtime = Runtime::new().unwrap();
        let mut server = Server::new();
        let exists = server
            .mock("POST", "/")
            .match_body(Matcher::Regex("^SELECT 1 FROM system.databases".to_string()))
            .with_body("1\n")
            .create();
        let drop_db = server
            .mock("POST", "/")
            .match_body("DROP DATABASE IF EXISTS benchmark")
            .create();
        let create = server
            .mock("POST", "/")
            .match_body("CREATE DATABASE benchmark")
            .create();
        let tables = server
            .mock("POST", "/")
            .match_query(Matcher::UrlEncoded(
                "database".to_string(),
                "benchmark".to_string(),
            ))
            .match_body(Matcher::Regex("^CREATE TABLE (tags|cpu|mem) ".to_string()))
            .expect(3)
            .create();

        let mut creator = creator(&server.url(), true, &runtime);
        creator.init(&mut Cursor::new(HEADER)).unwrap();
        assert!(creator.db_exists("benchmark").unwrap());
        creator.remove_old_db("benchmark").unwrap();
        creator.create_db("benchmark").unwrap();
        creator.post_create_db("benchmark").unwrap();

        exists.assert();
        drop_db.assert();
        create.assert();
        tables.assert();
    }

    #[test]
    fn empty_answer_means_no_database() {
        let runtime = Runtime::new().unwrap();
        let mut server = Server::new();
        let _mock = server.mock("POST", "/").with_body("").create();
        let creator = creator(&server.url(), false, &runtime);
        assert!(!creator.db_exists("benchmark").unwrap());
    }
}
