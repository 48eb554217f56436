//! OpenAI-compatible chat-completions classifier.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use pulse_core::{Classification, DerivedUserState, HistoryEntry};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::classifier::Classifier;
use crate::errors::{ClassifierError, Result};
use crate::payload::RawClassification;
use crate::prompt::{PROBE_PROMPT, SYSTEM_PROMPT, build_user_prompt};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";

/// Default model.
pub const DEFAULT_MODEL: &str = "deepseek-chat";

/// Token limit for the connectivity probe.
const PROBE_MAX_TOKENS: u32 = 10;

/// Endpoint configuration.
#[derive(Clone, Debug)]
pub struct ChatConfig {
    /// API root; `/chat/completions` is appended.
    pub base_url: String,
    /// Model name.
    pub model: String,
    /// Bearer token, if the endpoint needs one.
    pub api_key: Option<String>,
    /// Completion token limit.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Timeout for [`Classifier::test_connection`].
    pub probe_timeout: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            max_tokens: 150,
            temperature: 0.7,
            timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Classifier backed by a `/chat/completions` endpoint in JSON mode.
pub struct ChatCompletionClassifier {
    config: ChatConfig,
    client: reqwest::Client,
    url: String,
}

impl std::fmt::Debug for ChatCompletionClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionClassifier")
            .field("url", &self.url)
            .field("model", &self.config.model)
            .finish_non_exhaustive()
    }
}

impl ChatCompletionClassifier {
    /// Build a classifier. Fails only if the HTTP client cannot be constructed.
    pub fn new(config: ChatConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        let url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        info!(model = %config.model, url = %url, "chat classifier initialized");
        Ok(Self {
            config,
            client,
            url,
        })
    }

    /// Endpoint configuration.
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    async fn complete(&self, request: &ChatRequest<'_>, timeout: Duration) -> Result<String> {
        let mut builder = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .timeout(timeout)
            .json(request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Api {
                status: status.as_u16(),
                message: parse_api_error(&body),
            });
        }

        let body: ChatResponse = serde_json::from_slice(&response.bytes().await?)?;
        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or(ClassifierError::EmptyResponse)
    }
}

#[async_trait]
impl Classifier for ChatCompletionClassifier {
    #[instrument(skip_all, fields(model = %self.config.model, stage = state.stage))]
    async fn classify(
        &self,
        state: &DerivedUserState,
        recent_actions: &[HistoryEntry],
    ) -> Result<Classification> {
        let prompt = build_user_prompt(state, recent_actions);
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            stream: false,
            max_tokens: self.config.max_tokens,
            temperature: Some(self.config.temperature),
            response_format: Some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let started = Instant::now();
        let outcome = async {
            let content = self.complete(&request, self.config.timeout).await?;
            RawClassification::from_json(&content)?.validate()
        }
        .await;

        metrics::histogram!("classifier_request_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        match &outcome {
            Ok(c) => {
                metrics::counter!("classifier_requests_total", "status" => "success").increment(1);
                debug!(urgency = %c.urgency, state_change = c.state_change, "classification received");
            }
            Err(e) => {
                metrics::counter!("classifier_requests_total", "status" => e.category())
                    .increment(1);
            }
        }
        outcome
    }

    async fn test_connection(&self) -> Result<()> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: PROBE_PROMPT,
            }],
            stream: false,
            max_tokens: PROBE_MAX_TOKENS,
            temperature: None,
            response_format: None,
        };
        let reply = self.complete(&request, self.config.probe_timeout).await?;
        debug!(reply = %reply, "connection test succeeded");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

/// Extract a readable message from an error body.
fn parse_api_error(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| json["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| {
            if body.is_empty() {
                "unknown error".to_string()
            } else {
                body.to_string()
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pulse_core::{BehaviorState, Urgency};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn state() -> DerivedUserState {
        DerivedUserState {
            current_state: BehaviorState::New,
            last_change: chrono::Utc::now(),
            stage: 200,
            clicks: 400,
            previous_stage: 100,
            previous_clicks: 100,
            engagement_rate: 3.0,
        }
    }

    fn classifier(server: &MockServer) -> ChatCompletionClassifier {
        ChatCompletionClassifier::new(ChatConfig {
            base_url: server.uri(),
            api_key: Some("sk-test".into()),
            ..ChatConfig::default()
        })
        .unwrap()
    }

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "cmpl-1",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        })
    }

    #[tokio::test]
    async fn classify_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "deepseek-chat",
                "stream": false,
                "response_format": {"type": "json_object"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                r#"{"message":"Clicking. What an achievement.","state_change":true,"new_state":"productive","urgency":"low"}"#,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let c = classifier(&server)
            .classify(&state(), &[HistoryEntry::new(100, 100), HistoryEntry::new(200, 400)])
            .await
            .unwrap();
        assert_eq!(c.message, "Clicking. What an achievement.");
        assert_eq!(c.new_state, Some(BehaviorState::Productive));
        assert_eq!(c.urgency, Urgency::Low);
    }

    #[tokio::test]
    async fn http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"message": "Authentication Fails", "type": "authentication_error"}
            })))
            .mount(&server)
            .await;

        let err = classifier(&server).classify(&state(), &[]).await.unwrap_err();
        assert_matches!(err, ClassifierError::Api { status: 401, ref message } if message == "Authentication Fails");
    }

    #[tokio::test]
    async fn no_choices_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let err = classifier(&server).classify(&state(), &[]).await.unwrap_err();
        assert_matches!(err, ClassifierError::EmptyResponse);
    }

    #[tokio::test]
    async fn non_json_content_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("not json at all")))
            .mount(&server)
            .await;

        let err = classifier(&server).classify(&state(), &[]).await.unwrap_err();
        assert_matches!(err, ClassifierError::Json(_));
    }

    #[tokio::test]
    async fn structurally_invalid_content_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                r#"{"message":"hi","state_change":true,"new_state":"sleepy","urgency":"low"}"#,
            )))
            .mount(&server)
            .await;

        let err = classifier(&server).classify(&state(), &[]).await.unwrap_err();
        assert_matches!(err, ClassifierError::InvalidPayload { .. });
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion("{}"))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let classifier = ChatCompletionClassifier::new(ChatConfig {
            base_url: server.uri(),
            timeout: Duration::from_millis(50),
            ..ChatConfig::default()
        })
        .unwrap();
        let err = classifier.classify(&state(), &[]).await.unwrap_err();
        assert_eq!(err.category(), "timeout");
    }

    #[tokio::test]
    async fn test_connection_probe() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({"max_tokens": 10})))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("hello")))
            .expect(1)
            .mount(&server)
            .await;

        classifier(&server).test_connection().await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let err = classifier(&server).test_connection().await.unwrap_err();
        assert_matches!(err, ClassifierError::Api { status: 503, ref message } if message == "down");
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let c = ChatCompletionClassifier::new(ChatConfig {
            base_url: "http://localhost:1/".into(),
            ..ChatConfig::default()
        })
        .unwrap();
        assert_eq!(c.url, "http://localhost:1/chat/completions");
    }
}
