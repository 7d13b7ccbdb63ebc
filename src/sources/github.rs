//! GitHub activity source.
//!
//! Fetches a user's public event feed and, for push events whose inline
//! commit list is empty, the commit range via the compare endpoint. Every
//! request goes through the [`RateLimitGate`]:
//! - a closed gate short-circuits the call (`Ok(None)` / empty detail);
//! - 403/429 responses close the gate with the response's reset hint and are
//!   reported as `Ok(None)`, never as errors;
//! - rate-limit headers are inspected on *every* response, so a successful
//!   call that used the last request of the window also closes the gate.
//!
//! Any other non-2xx status is a [`FetchError::Status`].

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::ActivitySource;
use super::feed_item::{CommitSummary, FeedItem, parse_feed};
use super::gate::RateLimitGate;
use super::transport::{Transport, TransportResponse};
use crate::error::FetchError;

pub const DEFAULT_API_ROOT: &str = "https://api.github.com";

/// Page size requested from the events endpoint.
const PER_PAGE: u32 = 30;

pub struct GithubSource<T> {
    transport: T,
    gate: RateLimitGate,
    api_root: String,
}

#[derive(Deserialize)]
struct CompareResponse {
    #[serde(default)]
    commits: Vec<CompareCommit>,
}

#[derive(Deserialize)]
struct CompareCommit {
    sha: String,
    commit: CompareCommitDetail,
}

#[derive(Deserialize)]
struct CompareCommitDetail {
    #[serde(default)]
    message: String,
}

impl<T: Transport> GithubSource<T> {
    pub fn new(transport: T) -> Self {
        Self::with_api_root(transport, DEFAULT_API_ROOT)
    }

    pub fn with_api_root(transport: T, api_root: impl Into<String>) -> Self {
        Self {
            transport,
            gate: RateLimitGate::new(),
            api_root: api_root.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn gate(&self) -> &RateLimitGate {
        &self.gate
    }

    /// Issue one gated request. `Ok(None)` means "suppressed or throttled".
    async fn request(&self, url: &str) -> Result<Option<TransportResponse>, FetchError> {
        if self.gate.should_suppress() {
            debug!(
                target: "hubcast::sources",
                %url,
                reset_at_ms = self.gate.reset_at_ms(),
                "Rate-limit cooldown active; skipping request"
            );
            return Ok(None);
        }

        let resp = self.transport.get(url).await?;
        let now = Utc::now().timestamp_millis();

        if let Some(remaining) = resp.meta.remaining {
            self.gate.observe_remaining(remaining);
            if remaining == 0 {
                if let Some(reset) = resp.meta.reset_hint_ms(now) {
                    self.gate.record_throttled_at(Some(reset), now);
                }
            }
        }

        if resp.is_throttled() {
            let hint = resp.meta.reset_hint_ms(now);
            self.gate.record_throttled_at(hint, now);
            warn!(
                target: "hubcast::sources",
                %url, status = resp.status, reset_at_ms = self.gate.reset_at_ms(),
                "Source throttled the request"
            );
            return Ok(None);
        }

        if !resp.is_success() {
            return Err(FetchError::Status {
                status: resp.status,
                url: url.to_string(),
            });
        }

        Ok(Some(resp))
    }
}

#[async_trait]
impl<T: Transport> ActivitySource for GithubSource<T> {
    async fn fetch_activity(&self, identity: &str) -> Result<Option<Vec<FeedItem>>, FetchError> {
        let url = format!(
            "{}/users/{}/events/public?per_page={PER_PAGE}",
            self.api_root, identity
        );
        let Some(resp) = self.request(&url).await? else {
            return Ok(None);
        };
        let items = parse_feed(resp.body).map_err(|source| FetchError::Decode {
            url: url.clone(),
            source,
        })?;
        info!(target: "hubcast::sources", %identity, count = items.len(), "Fetched activity feed");
        Ok(Some(items))
    }

    async fn fetch_detail(
        &self,
        repo: &str,
        before: &str,
        head: &str,
    ) -> Result<Vec<CommitSummary>, FetchError> {
        let url = format!("{}/repos/{repo}/compare/{before}...{head}", self.api_root);
        let Some(resp) = self.request(&url).await? else {
            return Ok(Vec::new());
        };
        let parsed: CompareResponse =
            serde_json::from_value(resp.body).map_err(|source| FetchError::Decode {
                url: url.clone(),
                source,
            })?;
        debug!(
            target: "hubcast::sources",
            %repo, commits = parsed.commits.len(),
            "Backfilled push commit range"
        );
        Ok(parsed
            .commits
            .into_iter()
            .map(|c| CommitSummary {
                sha: c.sha,
                message: c.commit.message,
            })
            .collect())
    }
}
