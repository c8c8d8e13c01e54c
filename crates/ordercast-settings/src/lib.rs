//! # ordercast-settings
//!
//! Configuration for the ordercast realtime client.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ClientSettings::default()`]
//! 2. **Settings file**: JSON, deep-merged over defaults
//! 3. **Environment variables**: `ORDERCAST_*` overrides (highest priority)
//!
//! There is no global instance: the application's composition root loads the
//! settings once and hands them to the client it builds.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path,
};
pub use types::*;
