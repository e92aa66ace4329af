use std::sync::LazyLock;

use clap::{ArgAction, Parser};
use regex::Regex;
use secrecy::{ExposeSecret, Secret};
use url::Url;

use crate::{Error, Result, client::Client};

/// Connection keys that are always taken from their own flags
static MANAGED_KEYS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(host|dbname|user|password)=\S*\b").expect("connection key pattern is valid")
});

/// How to reach the ClickHouse server and how to lay out the data in it
#[derive(Debug, Clone, Parser)]
pub struct ClickHouseConfig {
    /// URL of the ClickHouse HTTP interface
    #[clap(
        long = "clickhouse-url",
        env = "TSBENCH_CLICKHOUSE_URL",
        default_value = "http://127.0.0.1:8123"
    )]
    pub url: Url,

    /// Additional `key=value` connection settings, separated by spaces. Host, database, user and
    /// password given here are ignored in favour of their own flags.
    #[clap(long = "clickhouse", env = "TSBENCH_CLICKHOUSE", default_value = "")]
    pub connect: String,

    /// Hostname of the ClickHouse instance, replacing the host of `--clickhouse-url`
    #[clap(long = "host", env = "TSBENCH_CLICKHOUSE_HOST")]
    pub host: Option<String>,

    /// User to connect to ClickHouse as
    #[clap(long = "user", env = "TSBENCH_CLICKHOUSE_USER", default_value = "default")]
    pub user: String,

    /// Password to connect to ClickHouse
    #[clap(long = "password", env = "TSBENCH_CLICKHOUSE_PASSWORD")]
    pub password: Option<Secret<String>>,

    /// Print the row rate of every batch written
    #[clap(
        long = "log-batches",
        env = "TSBENCH_LOG_BATCHES",
        action = ArgAction::Set,
        default_value_t = false
    )]
    pub log_batches: bool,

    /// Keep the hostname as a column of every measurement table, next to the tags id
    #[clap(
        long = "in-table-tag",
        env = "TSBENCH_IN_TABLE_TAG",
        action = ArgAction::Set,
        default_value_t = false
    )]
    pub in_table_tag: bool,
}

impl ClickHouseConfig {
    /// The free form connection settings, without the keys that have flags of their own
    pub fn extra_settings(&self) -> String {
        let stripped = MANAGED_KEYS.replace_all(&self.connect, "");
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Connection description for `db_name`, with the password masked
    pub fn connect_string(&self, db_name: &str) -> String {
        let host = self
            .host
            .as_deref()
            .or_else(|| self.url.host_str())
            .unwrap_or_default();
        let mut parts = vec![
            format!("host={host}"),
            format!("dbname={db_name}"),
            format!("user={}", self.user),
        ];
        if let Some(password) = &self.password {
            if !password.expose_secret().is_empty() {
                parts.push("password=***".to_string());
            }
        }
        let extra = self.extra_settings();
        if !extra.is_empty() {
            parts.push(extra);
        }
        parts.join(" ")
    }

    /// The HTTP interface URL with `--host` applied
    pub fn server_url(&self) -> Result<Url> {
        let mut url = self.url.clone();
        if let Some(host) = &self.host {
            url.set_host(Some(host)).map_err(|source| Error::Host {
                host: host.clone(),
                source,
            })?;
        }
        Ok(url)
    }

    /// Client for statements against `db_name`, or the server's default database
    pub fn client(&self, db_name: Option<&str>) -> Result<Client> {
        let mut client = Client::new(self.server_url()?)?.with_user(&self.user);
        if let Some(password) = &self.password {
            client = client.with_password(password.clone());
        }
        if let Some(db_name) = db_name {
            client = client.with_database(db_name);
        }
        for setting in self.extra_settings().split(' ').filter(|s| !s.is_empty()) {
            if let Some((key, value)) = setting.split_once('=') {
                client = client.with_setting(key, value);
            }
        }
        Ok(client)
    }
}
