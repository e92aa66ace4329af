use tokio::runtime::Handle;
use tracing::debug;
use tsbench_query::{DynError, Query, QueryExecutor};

use crate::Client;

/// Runs benchmark queries over the HTTP interface, one instance per query worker
#[derive(Debug)]
pub struct ClickHouseQueryExecutor {
    client: Client,
    runtime: Handle,
    /// Print every response as it arrives
    print_responses: bool,
}

impl ClickHouseQueryExecutor {
    pub fn new(client: Client, runtime: Handle) -> Self {
        Self {
            client,
            runtime,
            print_responses: false,
        }
    }

    pub fn with_print_responses(mut self, print_responses: bool) -> Self {
        self.print_responses = print_responses;
        self
    }
}

impl QueryExecutor for ClickHouseQueryExecutor {
    fn init(&mut self, worker: usize) -> Result<(), DynError> {
        debug!(worker, database = ?self.client.database(), "clickhouse query worker ready");
        Ok(())
    }

    fn execute(&mut self, query: &Query) -> Result<u64, DynError> {
        let body = self.runtime.block_on(self.client.query(query.text.as_str()))?;
        let text = String::from_utf8_lossy(&body);
        if self.print_responses {
            println!("{}:\n{text}", query.label);
        }
        Ok(text.lines().filter(|l| !l.is_empty()).count() as u64)
    }
}
