/*!
Activity sources (the "fetch" side of the relay).

This module defines the [`ActivitySource`] trait the poll cycle talks to, and
re-exports the pieces a concrete source is built from:

- `feed_item.rs` -> `FeedItem`, `Payload`, `EventKind` (the feed data model)
- `gate.rs`      -> `RateLimitGate`   (cooldown tracking)
- `transport.rs` -> `Transport`, `HttpTransport` (one GET, status + headers + JSON)
- `github.rs`    -> `GithubSource`    (events feed + compare backfill)

A source is responsible for:
- Honouring the rate-limit gate before every request
- Reporting throttling as `Ok(None)` / an empty detail list, not as an error
- Returning feed items newest first, exactly as the feed orders them
*/

use async_trait::async_trait;

use crate::error::FetchError;

pub mod feed_item;
pub mod gate;
pub mod github;
pub mod transport;

pub use feed_item::{CommitSummary, EventKind, FeedItem, Payload};
pub use gate::RateLimitGate;
pub use github::GithubSource;
pub use transport::{HttpTransport, Transport};

/// Capability the poll cycle needs from the feed provider.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Latest feed items for `identity`, newest first.
    ///
    /// `Ok(None)` when the request was suppressed by the cooldown or the source
    /// throttled it.
    async fn fetch_activity(&self, identity: &str) -> Result<Option<Vec<FeedItem>>, FetchError>;

    /// Commits between `before` and `head` in `repo` (`owner/name`), used to
    /// backfill push events that arrived without inline commits. Empty when
    /// suppressed or throttled.
    async fn fetch_detail(
        &self,
        repo: &str,
        before: &str,
        head: &str,
    ) -> Result<Vec<CommitSummary>, FetchError>;
}
