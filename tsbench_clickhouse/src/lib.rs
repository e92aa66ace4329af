//! Loads generated time series into ClickHouse and runs queries against it.
//!
//! Input starts with a [`DataHeader`] describing the tags and the measurement tables, followed
//! by pairs of lines that [`RowDecoder`] turns into [`Row`]s. Tags are normalised into a `tags`
//! table referenced by id from every measurement row.

pub mod benchmark;
pub mod client;
pub mod config;
pub mod db_creator;
pub mod decode;
pub mod header;
pub mod processor;
pub mod query;

pub use benchmark::ClickHouseBenchmark;
pub use client::Client;
pub use config::ClickHouseConfig;
pub use db_creator::ClickHouseDbCreator;
pub use decode::{HostnameIndexer, Row, RowDecoder, TableBatch};
pub use header::{DataHeader, Table};
pub use processor::ClickHouseProcessor;
pub use query::ClickHouseQueryExecutor;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Client(#[from] client::Error),

    #[error("input has wrong header format: {0}")]
    Header(String),

    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid ClickHouse host '{host}': {source}")]
    Host {
        host: String,
        #[source]
        source: url::ParseError,
    },

    #[error("the data header has not been read")]
    HeaderNotRead,

    #[error("table {0} is not described in the data header")]
    UnknownTable(String),

    #[error("malformed {table} row: {reason}")]
    MalformedRow { table: String, reason: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
