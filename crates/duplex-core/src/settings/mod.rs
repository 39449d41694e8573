//! Configuration with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`DuplexSettings::default()`]
//! 2. **User file**: `~/.duplex/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `DUPLEX_*` overrides (highest priority)

mod errors;
mod loader;
mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path, parse_u16_range,
    parse_u64_range, parse_usize_range, settings_path,
};
pub use types::{ConnectionSettings, DuplexSettings, MAX_TIMEOUT_MS, MIN_TIMEOUT_MS, ServerSettings};
