//! Minimal Elasticsearch transport: one `_search` call against a list of
//! servers, failing over to the next server on connection errors.

use async_trait::async_trait;
use goldstone_core::config::ElasticsearchConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

const DEFAULT_PORT: u16 = 9200;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("invalid search server address '{0}'")]
    Address(String),

    #[error("search transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("search backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed search response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// A single-field sort, rendered as `{"field": {"order": "asc"}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            field: field.into(),
            order,
        }
    }

    pub fn to_json(&self) -> Value {
        let mut clause = serde_json::Map::new();
        clause.insert(self.field.clone(), json!({ "order": self.order }));
        Value::Object(clause)
    }
}

/// Anything that can run a search body against an index.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, index: &str, body: Value) -> Result<Value, SearchError>;
}

/// Normalise a server address. `host` and `host:port` become
/// `http://host[:9200]/`; full URLs are kept, with a trailing slash added to
/// any path prefix.
pub fn server_url(address: &str) -> Result<Url, SearchError> {
    let with_scheme = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    };

    let mut url =
        Url::parse(&with_scheme).map_err(|_| SearchError::Address(address.to_string()))?;
    if url.host_str().is_none() {
        return Err(SearchError::Address(address.to_string()));
    }
    if url.port().is_none() && !address.contains("://") {
        url.set_port(Some(DEFAULT_PORT))
            .map_err(|_| SearchError::Address(address.to_string()))?;
    }
    // `join` replaces the last segment unless the path ends in a slash.
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// HTTP client for an Elasticsearch cluster.
pub struct EsClient {
    http: reqwest::Client,
    servers: Vec<Url>,
}

impl EsClient {
    pub fn new(config: &ElasticsearchConfig) -> Result<Self, SearchError> {
        Self::with_servers(&config.servers, Duration::from_millis(config.request_timeout_ms))
    }

    pub fn with_servers<S: AsRef<str>>(servers: &[S], timeout: Duration) -> Result<Self, SearchError> {
        let servers = servers
            .iter()
            .map(|s| server_url(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        if servers.is_empty() {
            return Err(SearchError::Address(String::new()));
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, servers })
    }

    pub fn servers(&self) -> &[Url] {
        &self.servers
    }
}

#[async_trait]
impl SearchBackend for EsClient {
    async fn search(&self, index: &str, body: Value) -> Result<Value, SearchError> {
        let mut last_err = None;

        for server in &self.servers {
            let url = server
                .join(&format!("{index}/_search"))
                .map_err(|_| SearchError::Address(server.to_string()))?;
            debug!(url = %url, "Elasticsearch search");

            let response = match self.http.post(url.clone()).json(&body).send().await {
                Ok(response) => response,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    warn!(server = %server, error = %e, "Search server unreachable, trying next");
                    last_err = Some(SearchError::Transport(e));
                    continue;
                }
                Err(e) => return Err(SearchError::Transport(e)),
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SearchError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            metrics::counter!("analytics.queries").increment(1);
            return Ok(response.json::<Value>().await?);
        }

        metrics::counter!("analytics.query_errors").increment(1);
        Err(last_err.unwrap_or_else(|| SearchError::Address(String::new())))
    }
}
