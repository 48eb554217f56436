//! # pulse-settings
//!
//! Configuration for the pulse server, loaded from three layers in
//! priority order:
//! 1. **Compiled defaults** ([`PulseSettings::default()`])
//! 2. **Settings file** (`~/.pulse/settings.json`, deep-merged over defaults)
//! 3. **Environment variables** (`PULSE_*`, highest priority)
//!
//! The merged result is range-checked by [`PulseSettings::validate`].

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = PulseSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.session.history_window, 10);
        assert_eq!(settings.llm.model, "deepseek-chat");
    }
}
