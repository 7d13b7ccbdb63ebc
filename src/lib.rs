#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! hubcast: relays a GitHub user's public activity feed into a Discord channel.
//!
//! The crate is organized around one poll cycle and the seams it talks through:
//! - `config`: settings from the environment and an optional JSON file.
//! - `sources`: the feed data model, the rate-limit gate and the GitHub fetcher.
//! - `executor`: rendering, destination notifiers and the poll cycle itself.
//! - `state`: persistence of the last processed feed item id.
//! - `lifecycle`: startup, recurring scheduling and shutdown.
//! - `utils`: text helpers shared by the renderer and the notifier.
//!
//! Use `hubcast::prelude::*` to bring commonly used items into scope quickly.

pub mod config;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod sources;
pub mod state;
pub mod utils;

/// Crate-level constants for consumers that want to inspect package metadata at runtime.
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the crate version (e.g., "0.1.0").
#[inline]
pub const fn version() -> &'static str {
    PKG_VERSION
}

/// Parse a single log level name (trace|debug|info|warn|error).
pub fn parse_level(s: &str) -> Option<tracing::Level> {
    use tracing::Level;
    match s.trim().to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialize tracing (logging).
/// - Honors the `RUST_LOG` environment variable if set to a plain level.
/// - Falls back to `debug` when `debug` is set, `info` otherwise.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init_tracing(debug: bool) {
    let fallback = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| parse_level(&s))
        .unwrap_or(fallback);
    init_tracing_with_level(level);
}

/// Initialize tracing at an explicit level, ignoring `RUST_LOG`.
pub fn init_tracing_with_level(level: tracing::Level) {
    // Ignore the error if the global subscriber was already set.
    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
}

/// A convenient set of exports for most consumers.
///
/// Bring this into scope with:
/// `use hubcast::prelude::*;`
pub mod prelude {
    pub use anyhow::{Context, Error, Result, anyhow, bail};

    pub use tracing::{debug, error, info, trace, warn};

    pub use std::sync::Arc;
    pub use std::time::Duration;

    pub use crate as hubcast;
    pub use crate::config::Config;
    pub use crate::executor::{CycleReport, DiscordNotifier, DryRunNotifier, Notifier, Runtime};
    pub use crate::lifecycle::Scheduler;
    pub use crate::sources::{ActivitySource, EventKind, FeedItem, GithubSource, HttpTransport};
    pub use crate::state::{JsonFileStore, MemoryStore, PollState, StateStore};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_parse() {
        assert_eq!(parse_level("DEBUG"), Some(tracing::Level::DEBUG));
        assert_eq!(parse_level("warning"), Some(tracing::Level::WARN));
        assert_eq!(parse_level("hubcast=debug"), None);
    }
}
