//! Configuration for hubcast.
//!
//! Settings come from the environment, optionally layered over a JSON file:
//!
//! let file = hubcast::config::load_from_path_async("hubcast.json").await?;
//! let cfg = hubcast::config::resolve_from_env(file)?;

pub mod loader;
pub mod models;

pub use models::{
    Config, DEFAULT_POLL_INTERVAL_MS, DEFAULT_STATE_FILE, FileConfig, MIN_POLL_INTERVAL_MS,
};

pub use loader::{
    load, load_from_path_async, load_from_str, resolve, resolve_from_env, validate_config,
};
