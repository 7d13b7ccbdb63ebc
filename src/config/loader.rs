use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use super::models::{
    Config, DEFAULT_POLL_INTERVAL_MS, DEFAULT_STATE_FILE, FileConfig, MIN_POLL_INTERVAL_MS,
};
use crate::error::ConfigError;
use crate::sources::EventKind;

/// Parse a JSON config file body.
pub fn load_from_str(s: &str) -> Result<FileConfig> {
    serde_json::from_str(s).context("Failed to parse JSON config string")
}

/// Read and parse a JSON config file asynchronously (Tokio).
pub async fn load_from_path_async<P: AsRef<Path>>(path: P) -> Result<FileConfig> {
    let path_ref = path.as_ref();
    let bytes = tokio::fs::read(path_ref)
        .await
        .with_context(|| format!("Failed to read config file {}", path_ref.display()))?;
    let file: FileConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse JSON config from {}", path_ref.display()))?;
    debug!(target: "hubcast::config", path = %path_ref.display(), "Loaded config file");
    Ok(file)
}

/// Resolve the effective config: the optional file at `path` overlaid with
/// the process environment.
pub async fn load(path: Option<&Path>) -> Result<Config> {
    let file = match path {
        Some(p) => load_from_path_async(p).await?,
        None => FileConfig::default(),
    };
    let cfg = resolve_from_env(file)?;
    Ok(cfg)
}

pub fn resolve_from_env(file: FileConfig) -> Result<Config, ConfigError> {
    resolve(file, |key| std::env::var(key).ok())
}

/// Build a [`Config`] from `file` and the variables returned by `lookup`.
///
/// Variables win over file values; blank values count as absent on both
/// sides.
pub fn resolve<F>(file: FileConfig, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).and_then(non_blank);

    let discord_token = var("DISCORD_TOKEN")
        .or_else(|| file.discord_token.and_then(non_blank))
        .ok_or(ConfigError::Missing("DISCORD_TOKEN"))?;
    let channel_id = var("DISCORD_CHANNEL_ID")
        .or_else(|| file.discord_channel_id.and_then(non_blank))
        .ok_or(ConfigError::Missing("DISCORD_CHANNEL_ID"))?;
    let github_username = var("GITHUB_USERNAME")
        .or_else(|| file.github_username.and_then(non_blank))
        .ok_or(ConfigError::Missing("GITHUB_USERNAME"))?;
    let github_token = var("GITHUB_TOKEN").or_else(|| file.github_token.and_then(non_blank));

    let poll_interval_ms = match var("POLL_INTERVAL_MS") {
        Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
            key: "POLL_INTERVAL_MS",
            value: raw.clone(),
            reason: e.to_string(),
        })?,
        None => file.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
    };

    let state_file = var("STATE_FILE")
        .map(PathBuf::from)
        .or(file.state_file.filter(|p| !p.as_os_str().is_empty()))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE));

    let event_types = match var("EVENT_TYPES") {
        Some(raw) => parse_kinds(raw.split(','))?,
        None => match &file.event_types {
            Some(list) => parse_kinds(list.iter().map(String::as_str))?,
            None => EventKind::ALL.into_iter().collect(),
        },
    };

    let debug = match var("DEBUG") {
        Some(raw) => parse_flag(&raw)?,
        None => file.debug.unwrap_or(false),
    };

    let cfg = Config {
        discord_token,
        channel_id,
        github_username,
        github_token,
        poll_interval: Duration::from_millis(poll_interval_ms),
        state_file,
        event_types,
        debug,
    };
    validate_config(&cfg)?;
    Ok(cfg)
}

/// Sanity checks on a resolved config.
pub fn validate_config(cfg: &Config) -> Result<(), ConfigError> {
    let interval_ms = cfg.poll_interval.as_millis();
    if interval_ms < u128::from(MIN_POLL_INTERVAL_MS) {
        return Err(ConfigError::Invalid {
            key: "POLL_INTERVAL_MS",
            value: interval_ms.to_string(),
            reason: format!("must be at least {MIN_POLL_INTERVAL_MS}"),
        });
    }
    if !cfg.channel_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(ConfigError::Invalid {
            key: "DISCORD_CHANNEL_ID",
            value: cfg.channel_id.clone(),
            reason: "must be a numeric channel id".into(),
        });
    }
    if cfg.event_types.is_empty() {
        return Err(ConfigError::Invalid {
            key: "EVENT_TYPES",
            value: String::new(),
            reason: "at least one event kind is required".into(),
        });
    }
    Ok(())
}

fn non_blank(s: String) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_kinds<'a>(names: impl Iterator<Item = &'a str>) -> Result<BTreeSet<EventKind>, ConfigError> {
    names
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(|n| {
            n.parse::<EventKind>().map_err(|reason| ConfigError::Invalid {
                key: "EVENT_TYPES",
                value: n.to_string(),
                reason,
            })
        })
        .collect()
}

fn parse_flag(raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key: "DEBUG",
            value: raw.to_string(),
            reason: "expected one of 1/0, true/false, yes/no, on/off".into(),
        }),
    }
}
