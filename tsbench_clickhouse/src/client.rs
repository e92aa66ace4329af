//! Minimal client for the ClickHouse HTTP interface.

use std::string::FromUtf8Error;

use bytes::Bytes;
use reqwest::{IntoUrl, Method, StatusCode};
use secrecy::{ExposeSecret, Secret};
use url::Url;

/// Primary error type for the [`Client`]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("base URL error: {0}")]
    BaseUrl(#[source] reqwest::Error),

    #[error("failed to read the response bytes: {0}")]
    Bytes(#[source] reqwest::Error),

    #[error("invalid UTF8 in response: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),

    #[error("server responded with error [{code}]: {message}")]
    ApiError { code: StatusCode, message: String },

    #[error("failed to send {method} {url} request: {source}")]
    RequestSend {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Sends SQL statements to a ClickHouse server
#[derive(Debug, Clone)]
pub struct Client {
    base_url: Url,
    user: Option<String>,
    password: Option<Secret<String>>,
    /// Database statements run against, the server default when unset
    database: Option<String>,
    /// Extra ClickHouse settings sent as query parameters with every statement
    settings: Vec<(String, String)>,
    http_client: reqwest::Client,
}

impl Client {
    pub fn new<U: IntoUrl>(base_url: U) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into_url().map_err(Error::BaseUrl)?,
            user: None,
            password: None,
            database: None,
            settings: vec![],
            http_client: reqwest::Client::new(),
        })
    }

    pub fn with_user<S: Into<String>>(mut self, user: S) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_password(mut self, password: Secret<String>) -> Self {
        self.password = Some(password);
        self
    }

    pub fn with_database<S: Into<String>>(mut self, database: S) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_setting<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.settings.push((key.into(), value.into()));
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Run a statement that returns no data
    pub async fn execute<S: Into<String>>(&self, sql: S) -> Result<()> {
        self.query(sql).await.map(|_| ())
    }

    /// Run a statement and return the raw response body, `TabSeparated` unless the statement
    /// asks for another format
    pub async fn query<S: Into<String>>(&self, sql: S) -> Result<Bytes> {
        let mut params: Vec<(&str, &str)> = self
            .settings
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        if let Some(db) = &self.database {
            params.push(("database", db.as_str()));
        }

        let mut req = self
            .http_client
            .post(self.base_url.clone())
            .query(&params);
        if let Some(user) = &self.user {
            req = req.header("X-ClickHouse-User", user);
        }
        if let Some(password) = &self.password {
            req = req.header("X-ClickHouse-Key", password.expose_secret());
        }

        let resp = req
            .body(sql.into())
            .send()
            .await
            .map_err(|source| Error::RequestSend {
                method: Method::POST,
                url: self.base_url.to_string(),
                source,
            })?;
        let status = resp.status();
        let content = resp.bytes().await.map_err(Error::Bytes)?;
        match status {
            StatusCode::OK => Ok(content),
            code => Err(Error::ApiError {
                code,
                message: String::from_utf8(content.to_vec())?,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};

    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn query_sends_sql_and_credentials() {
        let mut mock_server = Server::new_async().await;
        let mock = mock_server
            .mock("POST", "/")
            .match_header("X-ClickHouse-User", "default")
            .match_header("X-ClickHouse-Key", "hunter2")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("database".into(), "benchmark".into()),
                Matcher::UrlEncoded("max_threads".into(), "4".into()),
            ]))
            .match_body("SELECT 1")
            .with_status(200)
            .with_body("1\n")
            .create_async()
            .await;

        let client = Client::new(mock_server.url())
            .expect("create client")
            .with_user("default")
            .with_password(Secret::new("hunter2".to_string()))
            .with_database("benchmark")
            .with_setting("max_threads", "4");
        let body = client.query("SELECT 1").await.expect("send query");
        assert_eq!(&body[..], b"1\n");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_errors_carry_the_message() {
        let mut mock_server = Server::new_async().await;
        let mock = mock_server
            .mock("POST", "/")
            .with_status(404)
            .with_body("Code: 81. DB::Exception: Database nope does not exist")
            .create_async()
            .await;

        let client = Client::new(mock_server.url()).expect("create client");
        let err = client.execute("SELECT 1").await.unwrap_err();
        match err {
            Error::ApiError { code, message } => {
                assert_eq!(code, StatusCode::NOT_FOUND);
                assert!(message.contains("Database nope does not exist"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }

        mock.assert_async().await;
    }
}
