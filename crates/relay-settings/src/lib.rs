//! # relay-settings
//!
//! Layered configuration for the mission relay.
//!
//! Settings are resolved from three layers (in priority order):
//! 1. **Compiled defaults** ([`RelaySettings::default()`])
//! 2. **Settings file** (`~/.mission-relay/settings.json`, deep-merged over defaults)
//! 3. **Environment variables** (`RELAY_*` overrides, highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::{LoggingSettings, RelaySettings, ServerSettings};
