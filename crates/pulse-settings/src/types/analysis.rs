//! Analysis pipeline and classifier endpoint settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Pipeline cadence and capacity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisSettings {
    /// Drain period.
    pub interval_ms: u64,
    /// Pending request capacity.
    pub request_queue: usize,
    /// Undelivered result capacity.
    pub result_queue: usize,
    /// Concurrent classifier calls.
    pub max_in_flight: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            request_queue: 100,
            result_queue: 100,
            max_in_flight: 8,
        }
    }
}

impl AnalysisSettings {
    /// Drain period.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// OpenAI-compatible chat-completions endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmSettings {
    /// API root; `/chat/completions` is appended.
    pub base_url: String,
    /// Model name.
    pub model: String,
    /// Bearer token. Never serialized back out.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Completion token limit.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Per-request timeout.
    pub timeout_ms: u64,
    /// Timeout for the startup connectivity probe.
    pub probe_timeout_ms: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            api_key: None,
            max_tokens: 150,
            temperature: 0.7,
            timeout_ms: 30_000,
            probe_timeout_ms: 10_000,
        }
    }
}

impl LlmSettings {
    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Probe timeout.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_is_not_serialized() {
        let settings = LlmSettings {
            api_key: Some("sk-secret".into()),
            ..LlmSettings::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("sk-secret"));
        assert!(!json.contains("apiKey"));
    }

    #[test]
    fn api_key_is_read_from_file() {
        let settings: LlmSettings = serde_json::from_str(r#"{"apiKey": "sk-1"}"#).unwrap();
        assert_eq!(settings.api_key.as_deref(), Some("sk-1"));
        assert_eq!(settings.model, "deepseek-chat");
    }
}
