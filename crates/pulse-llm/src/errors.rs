//! Classifier error types.

/// Errors produced while obtaining a classification.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// Transport failure (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body or embedded payload was not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The endpoint answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error description extracted from the body.
        message: String,
    },

    /// The completion carried no choices.
    #[error("empty response: no choices returned")]
    EmptyResponse,

    /// The payload parsed but violates the classification schema.
    #[error("invalid classification: {reason}")]
    InvalidPayload {
        /// Which rule was broken.
        reason: String,
    },
}

impl ClassifierError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            reason: reason.into(),
        }
    }

    /// Short category label for logs and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Http(e) if e.is_timeout() => "timeout",
            Self::Http(_) => "network",
            Self::Json(_) => "parse",
            Self::Api { .. } => "api",
            Self::EmptyResponse => "empty",
            Self::InvalidPayload { .. } => "invalid",
        }
    }
}

/// Result alias for classifier operations.
pub type Result<T> = std::result::Result<T, ClassifierError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display() {
        let err = ClassifierError::Api {
            status: 429,
            message: "slow down".into(),
        };
        assert_eq!(err.to_string(), "API error (429): slow down");
        assert_eq!(err.category(), "api");
    }

    #[test]
    fn invalid_payload_category() {
        assert_eq!(ClassifierError::invalid("x").category(), "invalid");
        assert_eq!(ClassifierError::EmptyResponse.category(), "empty");
    }

    #[test]
    fn json_error_converts() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ClassifierError = json_err.into();
        assert_eq!(err.category(), "parse");
    }
}
