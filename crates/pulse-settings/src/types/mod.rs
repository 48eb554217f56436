//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a
//! settings file may contain any subset of fields.

mod analysis;
mod server;
mod session;

pub use analysis::*;
pub use server::*;
pub use session::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9090 },
///   "session": { "historyWindow": 20 },
///   "llm": { "model": "deepseek-chat" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PulseSettings {
    /// Listener and transport settings.
    pub server: ServerSettings,
    /// Session window and inactivity.
    pub session: SessionSettings,
    /// Inbound event limits.
    pub validation: ValidationSettings,
    /// Pipeline cadence and capacity.
    pub analysis: AnalysisSettings,
    /// Classifier endpoint.
    pub llm: LlmSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl PulseSettings {
    /// Check every value against its allowed range.
    pub fn validate(&self) -> Result<()> {
        let s = &self.session;
        check_range("session.historyWindow", s.history_window, 5, 50)?;
        check_range("session.recentActions", s.recent_actions, 1, s.history_window)?;
        check_min("session.inactivityTimeoutMs", s.inactivity_timeout_ms, 1_000)?;
        check_min("session.cleanupIntervalMs", s.cleanup_interval_ms, 1_000)?;

        let v = &self.validation;
        check_min("validation.stageMax", v.stage_max, 1)?;
        check_min("validation.clicksMax", v.clicks_max, 1)?;
        if v.item_id_min > v.item_id_max {
            return Err(SettingsError::invalid(
                "validation.itemIdMin",
                format!("{} exceeds itemIdMax {}", v.item_id_min, v.item_id_max),
            ));
        }

        let a = &self.analysis;
        check_range("analysis.intervalMs", a.interval_ms, 1_000, 60_000)?;
        check_min("analysis.requestQueue", a.request_queue, 1)?;
        check_min("analysis.resultQueue", a.result_queue, 1)?;
        check_min("analysis.maxInFlight", a.max_in_flight, 1)?;

        let l = &self.llm;
        check_range("llm.maxTokens", l.max_tokens, 1, 4096)?;
        if !(0.0..=2.0).contains(&l.temperature) {
            return Err(SettingsError::invalid(
                "llm.temperature",
                format!("{} is outside 0..=2", l.temperature),
            ));
        }
        if l.model.is_empty() {
            return Err(SettingsError::invalid("llm.model", "must not be empty"));
        }
        if l.base_url.is_empty() {
            return Err(SettingsError::invalid("llm.baseUrl", "must not be empty"));
        }

        let srv = &self.server;
        check_min("server.sendBuffer", srv.send_buffer, 1)?;
        check_min("server.maxMessageSize", srv.max_message_size, 64)?;
        check_min("server.writeTimeoutMs", srv.write_timeout_ms, 1)?;
        if srv.ping_interval_ms == 0 || srv.ping_interval_ms >= srv.pong_timeout_ms {
            return Err(SettingsError::invalid(
                "server.pingIntervalMs",
                "must be non-zero and shorter than pongTimeoutMs",
            ));
        }
        Ok(())
    }
}

fn check_range<T>(field: &'static str, value: T, min: T, max: T) -> Result<()>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min || value > max {
        return Err(SettingsError::invalid(
            field,
            format!("{value} is outside {min}..={max}"),
        ));
    }
    Ok(())
}

fn check_min<T>(field: &'static str, value: T, min: T) -> Result<()>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min {
        return Err(SettingsError::invalid(field, format!("{value} is below {min}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn window_bounds() {
        let mut settings = PulseSettings::default();
        settings.session.history_window = 4;
        assert_matches!(
            settings.validate(),
            Err(SettingsError::Invalid { field: "session.historyWindow", .. })
        );
        settings.session.history_window = 51;
        assert!(settings.validate().is_err());
        settings.session.history_window = 50;
        settings.validate().unwrap();
    }

    #[test]
    fn recent_actions_cannot_exceed_window() {
        let mut settings = PulseSettings::default();
        settings.session.recent_actions = 11;
        assert_matches!(
            settings.validate(),
            Err(SettingsError::Invalid { field: "session.recentActions", .. })
        );
    }

    #[test]
    fn analysis_interval_bounds() {
        let mut settings = PulseSettings::default();
        settings.analysis.interval_ms = 999;
        assert!(settings.validate().is_err());
        settings.analysis.interval_ms = 60_001;
        assert!(settings.validate().is_err());
        settings.analysis.interval_ms = 60_000;
        settings.validate().unwrap();
    }

    #[test]
    fn temperature_bounds() {
        let mut settings = PulseSettings::default();
        settings.llm.temperature = 2.5;
        assert_matches!(
            settings.validate(),
            Err(SettingsError::Invalid { field: "llm.temperature", .. })
        );
    }

    #[test]
    fn item_range_must_be_ordered() {
        let mut settings = PulseSettings::default();
        settings.validation.item_id_min = 20;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn ping_must_precede_pong_deadline() {
        let mut settings = PulseSettings::default();
        settings.server.ping_interval_ms = settings.server.pong_timeout_ms;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let settings: PulseSettings =
            serde_json::from_str(r#"{"validation": {"stageMax": 10}}"#).unwrap();
        assert_eq!(settings.validation.stage_max, 10);
        assert_eq!(settings.validation.clicks_max, 10_000);
        assert_eq!(settings.server, ServerSettings::default());
    }
}
