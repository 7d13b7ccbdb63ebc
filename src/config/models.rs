use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::sources::EventKind;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 60_000;
pub const MIN_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_STATE_FILE: &str = "data/state.json";

/// Fully resolved runtime configuration.
///
/// Built by the loader from an optional JSON file overlaid with environment
/// variables; every field here has already been validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Bot token for the destination (`DISCORD_TOKEN`).
    pub discord_token: String,
    /// Destination channel id (`DISCORD_CHANNEL_ID`).
    pub channel_id: String,
    /// Source identity whose public feed is relayed (`GITHUB_USERNAME`).
    pub github_username: String,
    /// Optional source token, raising the source's rate limit (`GITHUB_TOKEN`).
    pub github_token: Option<String>,
    pub poll_interval: Duration,
    pub state_file: PathBuf,
    /// Kinds that get dispatched. Defaults to every known kind.
    pub event_types: BTreeSet<EventKind>,
    pub debug: bool,
}

impl Config {
    /// JSON view for `--print-config`, with secrets masked.
    pub fn redacted(&self) -> Value {
        json!({
            "discord_token": "***",
            "discord_channel_id": self.channel_id,
            "github_username": self.github_username,
            "github_token": self.github_token.as_ref().map(|_| "***"),
            "poll_interval_ms": self.poll_interval.as_millis() as u64,
            "state_file": self.state_file.display().to_string(),
            "event_types": self.event_types.iter().map(|k| k.type_name()).collect::<Vec<_>>(),
            "debug": self.debug,
        })
    }
}

/// Shape of the optional JSON config file. Keys mirror the environment
/// variables in snake_case; everything is optional because the environment
/// may supply it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub discord_token: Option<String>,
    pub discord_channel_id: Option<String>,
    pub github_username: Option<String>,
    pub github_token: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub state_file: Option<PathBuf>,
    pub event_types: Option<Vec<String>>,
    pub debug: Option<bool>,
}
