//! Utilities for hubcast.
//!
//! Submodules:
//! - `text`: truncation and formatting helpers used by the renderer.

pub mod text;
