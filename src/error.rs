//! Error types shared across the crate.
//!
//! Each component seam gets its own enum so callers can decide what is fatal:
//! - `ConfigError`: startup validation, always fatal.
//! - `FetchError`: a hard transport failure; aborts the current cycle only.
//! - `NotifyError`: a failed send; isolated to the item being dispatched.
//! - `StoreError`: state load/save problems; logged and otherwise ignored.
//!
//! Throttling is deliberately absent: the fetcher reports it as `Ok(None)`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("invalid value {value:?} for `{key}`: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("destination request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("destination rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
