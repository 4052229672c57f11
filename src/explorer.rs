use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::config::TrackerConfig;
use crate::error::ExplorerError;
use crate::models::RecordFields;
use crate::retry::retry_with_backoff;

/// Benign `status == "0"` message for an address with no entries in a category.
pub const NO_TRANSACTIONS_FOUND: &str = "No transactions found";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Parameters of one paged `account` module request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub action: &'static str,
    pub address: String,
    pub start_block: u64,
    pub end_block: u64,
    pub page: usize,
    pub offset: usize,
    pub sort: SortOrder,
}

impl PageQuery {
    pub fn first_page(action: &'static str, address: &str, config: &TrackerConfig) -> Self {
        Self {
            action,
            address: address.to_string(),
            start_block: 0,
            end_block: config.end_block,
            page: 1,
            offset: config.page_size,
            sort: SortOrder::Asc,
        }
    }
}

/// Source of explorer pages. A returned error means the page could not be
/// served even after the implementation's own retries.
#[async_trait]
pub trait ExplorerApi: Send + Sync {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<RecordFields>, ExplorerError>;
}

#[async_trait]
impl<T: ExplorerApi + ?Sized> ExplorerApi for &T {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<RecordFields>, ExplorerError> {
        (**self).fetch_page(query).await
    }
}

/// Enforces a minimum gap between consecutive requests across all callers.
#[derive(Debug)]
pub struct RateLimiter {
    delay: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(delay: Duration) -> Self {
        Self { delay, last: Mutex::new(None) }
    }

    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.delay {
                sleep(self.delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    message: String,
    #[serde(default)]
    result: Value,
}

/// Decode an explorer response body into its result entries.
pub fn parse_envelope(body: &str) -> Result<Vec<RecordFields>, ExplorerError> {
    let envelope: Envelope = serde_json::from_str(body)?;

    if envelope.status != "1" {
        let empty_result = match &envelope.result {
            Value::Array(entries) => entries.is_empty(),
            Value::Null => true,
            _ => false,
        };
        if empty_result && envelope.message.starts_with(NO_TRANSACTIONS_FOUND) {
            return Ok(Vec::new());
        }
        let result = match envelope.result {
            Value::String(s) => s,
            other => other.to_string(),
        };
        return Err(ExplorerError::Api { message: envelope.message, result });
    }

    let Value::Array(entries) = envelope.result else {
        return Err(ExplorerError::Malformed("result is not a list".into()));
    };
    entries.into_iter().map(entry_fields).collect()
}

fn entry_fields(entry: Value) -> Result<RecordFields, ExplorerError> {
    let map = match entry {
        Value::Object(map) => map,
        other => {
            return Err(ExplorerError::Malformed(format!("result entry is not an object: {other}")))
        }
    };
    Ok(map
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect())
}

/// Etherscan-compatible HTTP client with a shared rate limiter and bounded retries.
pub struct EtherscanClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    limiter: RateLimiter,
    max_retries: u32,
    backoff: Duration,
}

impl EtherscanClient {
    pub fn new(config: &TrackerConfig) -> Result<Self, ExplorerError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            limiter: RateLimiter::new(config.rate_limit_delay),
            max_retries: config.max_retries,
            backoff: config.retry_backoff,
        })
    }

    async fn request_once(&self, query: &PageQuery) -> Result<Vec<RecordFields>, ExplorerError> {
        self.limiter.wait().await;

        let params = [
            ("module", "account".to_string()),
            ("action", query.action.to_string()),
            ("address", query.address.clone()),
            ("startblock", query.start_block.to_string()),
            ("endblock", query.end_block.to_string()),
            ("page", query.page.to_string()),
            ("offset", query.offset.to_string()),
            ("sort", query.sort.as_str().to_string()),
            ("apikey", self.api_key.clone()),
        ];
        debug!(action = query.action, page = query.page, start_block = query.start_block, "GET explorer page");

        let response = self.http.get(&self.base_url).query(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExplorerError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        parse_envelope(&body)
    }
}

#[async_trait]
impl ExplorerApi for EtherscanClient {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<RecordFields>, ExplorerError> {
        retry_with_backoff(self.max_retries, self.backoff, |_| self.request_once(query)).await
    }
}
