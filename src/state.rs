//! Persistence of the last processed feed item id.
//!
//! The store is a single slot. [`JsonFileStore`] keeps it in a small JSON
//! document (`{"lastEventId": "..."}`) and writes synchronously, through a
//! temporary sibling plus rename, so a crash never leaves a torn file behind.
//!
//! Callers treat every [`StoreError`] as non-fatal: a failed load is a cold
//! start, a failed save is retried implicitly by the next cycle.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::StoreError;

/// Last-seen tracking for the poll cycle.
///
/// Once set, `last_seen_id` only moves forward to the newest id of a fetched
/// feed page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollState {
    pub last_seen_id: Option<String>,
}

impl PollState {
    pub fn new(last_seen_id: Option<String>) -> Self {
        Self { last_seen_id }
    }

    /// `true` before any item was ever recorded.
    pub fn is_cold(&self) -> bool {
        self.last_seen_id.is_none()
    }
}

pub trait StateStore: Send + Sync {
    /// The stored id, or `None` when nothing was stored yet.
    fn load(&self) -> Result<Option<String>, StoreError>;

    fn save(&self, last_seen_id: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StateDocument {
    #[serde(rename = "lastEventId")]
    last_event_id: Option<String>,
}

/// File-backed store.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<Option<String>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(target: "hubcast::state", path = %self.path.display(), "No state file yet");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let doc: StateDocument = serde_json::from_str(&raw)?;
        trace!(target: "hubcast::state", last_event_id = ?doc.last_event_id, "Loaded state");
        Ok(doc.last_event_id.filter(|id| !id.is_empty()))
    }

    fn save(&self, last_seen_id: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let doc = StateDocument {
            last_event_id: Some(last_seen_id.to_string()),
        };
        let tmp = self.temp_path();
        fs::write(&tmp, serde_json::to_vec_pretty(&doc)?)?;
        fs::rename(&tmp, &self.path)?;
        trace!(target: "hubcast::state", %last_seen_id, "Saved state");
        Ok(())
    }
}

/// In-memory store for single-shot runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new(initial: Option<String>) -> Self {
        Self {
            slot: Mutex::new(initial),
        }
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Option<String>, StoreError> {
        Ok(self.slot.lock().unwrap_or_else(|p| p.into_inner()).clone())
    }

    fn save(&self, last_seen_id: &str) -> Result<(), StoreError> {
        *self.slot.lock().unwrap_or_else(|p| p.into_inner()) = Some(last_seen_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_cold_start() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn save_then_load_round_trips_and_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/data/state.json");
        let store = JsonFileStore::new(&path);

        store.save("123456").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("123456"));

        let raw = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["lastEventId"], "123456");
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();

        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::Json(_)));
    }

    #[test]
    fn null_or_empty_id_is_cold_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = JsonFileStore::new(&path);

        fs::write(&path, r#"{"lastEventId": null}"#).unwrap();
        assert_eq!(store.load().unwrap(), None);
        fs::write(&path, r#"{"lastEventId": ""}"#).unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn memory_store_holds_last_value() {
        let store = MemoryStore::default();
        assert_eq!(store.load().unwrap(), None);
        store.save("a").unwrap();
        store.save("b").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn poll_state_cold_flag() {
        assert!(PollState::default().is_cold());
        assert!(!PollState::new(Some("1".into())).is_cold());
    }
}
