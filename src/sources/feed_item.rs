//! The feed data model.
//!
//! A [`FeedItem`] is one entry of a GitHub user's public event feed. The
//! envelope (id, actor, repository, timestamp) is common to every event; the
//! kind-specific part lives in [`Payload`], a tagged union with one variant per
//! event kind the relay knows how to render plus [`Payload::Unrecognized`] for
//! everything else.
//!
//! Items are immutable once parsed. Payload fields are lenient (`Option` or
//! defaulted) because the feed omits fields freely between event versions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Public web root used to build human-facing links.
pub const WEB_ROOT: &str = "https://github.com";

/// The event kinds the relay can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Push,
    Create,
    Fork,
    Watch,
    Release,
    Issues,
    IssueComment,
    PullRequest,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::Push,
        EventKind::Create,
        EventKind::Fork,
        EventKind::Watch,
        EventKind::Release,
        EventKind::Issues,
        EventKind::IssueComment,
        EventKind::PullRequest,
    ];

    /// The `type` string used by the feed (e.g. `PushEvent`).
    pub fn type_name(self) -> &'static str {
        match self {
            EventKind::Push => "PushEvent",
            EventKind::Create => "CreateEvent",
            EventKind::Fork => "ForkEvent",
            EventKind::Watch => "WatchEvent",
            EventKind::Release => "ReleaseEvent",
            EventKind::Issues => "IssuesEvent",
            EventKind::IssueComment => "IssueCommentEvent",
            EventKind::PullRequest => "PullRequestEvent",
        }
    }

    /// Short lowercase alias accepted in configuration (e.g. `push`).
    pub fn short_name(self) -> &'static str {
        match self {
            EventKind::Push => "push",
            EventKind::Create => "create",
            EventKind::Fork => "fork",
            EventKind::Watch => "watch",
            EventKind::Release => "release",
            EventKind::Issues => "issues",
            EventKind::IssueComment => "issue_comment",
            EventKind::PullRequest => "pull_request",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

impl FromStr for EventKind {
    type Err = String;

    /// Accepts `PushEvent`, `push`, `pushevent`, ... (case-insensitive).
    /// `star` is an alias for `watch`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        if wanted == "star" {
            return Ok(EventKind::Watch);
        }
        EventKind::ALL
            .into_iter()
            .find(|k| {
                k.type_name().eq_ignore_ascii_case(&wanted)
                    || k.short_name() == wanted
                    || k.short_name().replace('_', "") == wanted
            })
            .ok_or_else(|| format!("unknown event kind '{}'", s.trim()))
    }
}

/// Who performed the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub login: String,
    /// Display name (`display_login` when present, else `login`).
    pub name: String,
    pub avatar_url: Option<String>,
}

impl Actor {
    pub fn profile_url(&self) -> String {
        format!("{WEB_ROOT}/{}", self.login)
    }
}

/// The repository an event happened in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    /// `owner/name`
    pub repo_name: String,
    pub repo_url: String,
}

/// A single commit reference, either inline in a push payload or backfilled.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommitSummary {
    pub sha: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PushPayload {
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    pub head: Option<String>,
    pub before: Option<String>,
    pub size: Option<u64>,
    pub commits: Vec<CommitSummary>,
}

impl PushPayload {
    /// Branch name with the `refs/heads/` prefix removed.
    pub fn branch(&self) -> &str {
        let r = self.git_ref.as_deref().unwrap_or("");
        r.strip_prefix("refs/heads/").unwrap_or(r)
    }

    /// The `(before, head)` range of the push. `None` when either end is
    /// missing or `before` is the all-zero sha of a freshly created branch.
    pub fn compare_range(&self) -> Option<(&str, &str)> {
        let before = self.before.as_deref().filter(|s| !s.is_empty())?;
        let head = self.head.as_deref().filter(|s| !s.is_empty())?;
        if before.chars().all(|c| c == '0') {
            return None;
        }
        Some((before, head))
    }

    /// The range to backfill when the feed omitted inline commits.
    pub fn backfill_range(&self) -> Option<(&str, &str)> {
        if !self.commits.is_empty() {
            return None;
        }
        self.compare_range()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CreatePayload {
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    pub ref_type: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Forkee {
    pub full_name: String,
    pub html_url: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ForkPayload {
    pub forkee: Forkee,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Release {
    pub tag_name: String,
    pub name: Option<String>,
    pub body: Option<String>,
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReleasePayload {
    pub release: Release,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Issue {
    pub number: u64,
    pub title: Option<String>,
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IssuesPayload {
    pub action: String,
    pub issue: Issue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Comment {
    pub body: Option<String>,
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IssueCommentPayload {
    pub action: String,
    pub issue: Issue,
    pub comment: Comment,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PullRequest {
    pub number: Option<u64>,
    pub title: Option<String>,
    pub html_url: Option<String>,
    pub merged: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PullRequestPayload {
    pub action: String,
    pub number: Option<u64>,
    pub pull_request: PullRequest,
}

impl PullRequestPayload {
    pub fn number(&self) -> u64 {
        self.number.or(self.pull_request.number).unwrap_or_default()
    }
}

/// Kind-specific event data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Push(PushPayload),
    Create(CreatePayload),
    Fork(ForkPayload),
    Watch,
    Release(ReleasePayload),
    Issues(IssuesPayload),
    IssueComment(IssueCommentPayload),
    PullRequest(PullRequestPayload),
    Unrecognized,
}

impl Payload {
    /// Decode the raw payload for the given feed `type`.
    ///
    /// Unknown types, and known types whose payload does not decode, become
    /// [`Payload::Unrecognized`] so the item still takes part in id tracking.
    pub fn parse(type_name: &str, raw: Value) -> Self {
        let Ok(kind) = type_name.parse::<EventKind>() else {
            return Payload::Unrecognized;
        };
        let parsed = match kind {
            EventKind::Push => serde_json::from_value(raw).map(Payload::Push),
            EventKind::Create => serde_json::from_value(raw).map(Payload::Create),
            EventKind::Fork => serde_json::from_value(raw).map(Payload::Fork),
            EventKind::Watch => Ok(Payload::Watch),
            EventKind::Release => serde_json::from_value(raw).map(Payload::Release),
            EventKind::Issues => serde_json::from_value(raw).map(Payload::Issues),
            EventKind::IssueComment => serde_json::from_value(raw).map(Payload::IssueComment),
            EventKind::PullRequest => serde_json::from_value(raw).map(Payload::PullRequest),
        };
        parsed.unwrap_or_else(|e| {
            warn!(
                target: "hubcast::sources",
                %type_name, error = %e,
                "Payload did not match its event kind; treating as unrecognized"
            );
            Payload::Unrecognized
        })
    }

    pub fn kind(&self) -> Option<EventKind> {
        match self {
            Payload::Push(_) => Some(EventKind::Push),
            Payload::Create(_) => Some(EventKind::Create),
            Payload::Fork(_) => Some(EventKind::Fork),
            Payload::Watch => Some(EventKind::Watch),
            Payload::Release(_) => Some(EventKind::Release),
            Payload::Issues(_) => Some(EventKind::Issues),
            Payload::IssueComment(_) => Some(EventKind::IssueComment),
            Payload::PullRequest(_) => Some(EventKind::PullRequest),
            Payload::Unrecognized => None,
        }
    }
}

/// One entry of the activity feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    /// Opaque, unique id. Newer items have larger ids in feed order, but the
    /// relay only ever compares ids for equality.
    pub id: String,
    /// Raw feed `type` (e.g. `PushEvent`, or anything the feed invents later).
    pub kind: String,
    pub actor: Actor,
    pub subject: Subject,
    pub timestamp: DateTime<Utc>,
    pub payload: Payload,
}

impl FeedItem {
    /// The recognised kind, or `None` for event types the relay does not render.
    pub fn event_kind(&self) -> Option<EventKind> {
        self.payload.kind()
    }
}

#[derive(Deserialize)]
struct RawActor {
    login: String,
    #[serde(default)]
    display_login: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

#[derive(Deserialize)]
struct RawRepo {
    name: String,
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    actor: RawActor,
    repo: RawRepo,
    #[serde(default)]
    payload: Value,
    created_at: DateTime<Utc>,
}

impl From<RawEvent> for FeedItem {
    fn from(raw: RawEvent) -> Self {
        let payload = Payload::parse(&raw.kind, raw.payload);
        let name = raw
            .actor
            .display_login
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| raw.actor.login.clone());
        FeedItem {
            id: raw.id,
            actor: Actor {
                login: raw.actor.login,
                name,
                avatar_url: raw.actor.avatar_url,
            },
            subject: Subject {
                repo_url: format!("{WEB_ROOT}/{}", raw.repo.name),
                repo_name: raw.repo.name,
            },
            timestamp: raw.created_at,
            kind: raw.kind,
            payload,
        }
    }
}

/// Just enough of an entry to keep it in id tracking.
#[derive(Deserialize)]
struct RawEnvelope {
    id: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

impl FeedItem {
    /// Placeholder for an entry whose envelope did not parse. It never renders
    /// but still takes part in last-seen tracking.
    fn opaque(envelope: RawEnvelope) -> Self {
        FeedItem {
            id: envelope.id,
            kind: envelope.kind.unwrap_or_default(),
            actor: Actor {
                login: String::new(),
                name: String::new(),
                avatar_url: None,
            },
            subject: Subject {
                repo_name: String::new(),
                repo_url: String::new(),
            },
            timestamp: DateTime::<Utc>::default(),
            payload: Payload::Unrecognized,
        }
    }
}

/// Parse a feed response body (a JSON array, newest first) into items,
/// preserving order.
///
/// A body that is not an array is an error. An entry with a malformed
/// envelope but a readable id is kept as an unrecognized item; only entries
/// without an id are dropped.
pub fn parse_feed(body: Value) -> Result<Vec<FeedItem>, serde_json::Error> {
    let entries: Vec<Value> = serde_json::from_value(body)?;
    let items = entries
        .into_iter()
        .filter_map(|entry| match RawEvent::deserialize(&entry) {
            Ok(raw) => Some(FeedItem::from(raw)),
            Err(e) => match RawEnvelope::deserialize(&entry) {
                Ok(envelope) => {
                    warn!(
                        target: "hubcast::sources",
                        id = %envelope.id, error = %e,
                        "Malformed feed entry; keeping it for id tracking only"
                    );
                    Some(FeedItem::opaque(envelope))
                }
                Err(_) => {
                    warn!(target: "hubcast::sources", error = %e, "Dropping feed entry without an id");
                    None
                }
            },
        })
        .collect();
    Ok(items)
}
