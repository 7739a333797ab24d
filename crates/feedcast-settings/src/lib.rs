//! # feedcast-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`FeedcastSettings::default()`]
//! 2. **Settings file**: an explicit path, or `~/.feedcast/settings.json`
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `FEEDCAST_*` overrides (highest priority)
//!
//! There is no global instance: the binary loads settings once and passes
//! the sections down to whatever needs them.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::{BusSettings, FeedcastSettings, LoggingSettings, ServerSettings};
