//! HTTP transport for the source API.
//!
//! [`Transport`] is the seam between the fetcher and the network: one GET
//! returning status, the rate-limit metadata, and the JSON body. The fetcher
//! never sees `reqwest` types, which keeps it testable with a scripted fake.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, USER_AGENT};
use serde_json::Value;
use tracing::trace;

use crate::error::FetchError;

/// Rate-limit metadata extracted from response headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitMeta {
    /// `x-ratelimit-remaining`
    pub remaining: Option<u64>,
    /// `x-ratelimit-reset`, epoch seconds.
    pub reset_epoch_secs: Option<i64>,
    /// `retry-after`, seconds from now.
    pub retry_after_secs: Option<i64>,
}

impl RateLimitMeta {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        fn num<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
            headers.get(name)?.to_str().ok()?.trim().parse().ok()
        }
        Self {
            remaining: num(headers, "x-ratelimit-remaining"),
            reset_epoch_secs: num(headers, "x-ratelimit-reset"),
            retry_after_secs: num(headers, "retry-after"),
        }
    }

    /// Absolute reopen instant in epoch milliseconds, if the response carried
    /// one. `x-ratelimit-reset` wins over `retry-after`.
    pub fn reset_hint_ms(&self, now_ms: i64) -> Option<i64> {
        self.reset_epoch_secs
            .map(|secs| secs.saturating_mul(1000))
            .or_else(|| {
                self.retry_after_secs
                    .map(|secs| now_ms.saturating_add(secs.saturating_mul(1000)))
            })
    }
}

/// A decoded response. `body` is `Value::Null` when it was empty or not JSON.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub meta: RateLimitMeta,
    pub body: Value,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 403 and 429 are how the source says "slow down".
    pub fn is_throttled(&self) -> bool {
        matches!(self.status, 403 | 429)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url` (absolute) and return whatever came back. Only network-level
    /// failures are errors; every HTTP status is a response.
    async fn get(&self, url: &str) -> Result<TransportResponse, FetchError>;
}

/// `reqwest`-backed transport with optional bearer authentication.
pub struct HttpTransport {
    client: reqwest::Client,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(token: Option<String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self { client, token })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse, FetchError> {
        let mut req = self
            .client
            .get(url)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let meta = RateLimitMeta::from_headers(resp.headers());
        let bytes = resp.bytes().await?;
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        trace!(target: "hubcast::sources", %url, status, ?meta, "GET completed");

        Ok(TransportResponse { status, meta, body })
    }
}
