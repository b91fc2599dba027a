//! OpenAI-compatible chat-completions client.
//!
//! Speaks `POST {base_url}/chat/completions` as implemented by OpenAI, Docker
//! Model Runner, vLLM, llama.cpp server, LiteLLM and most local runners.
//! Status codes are sorted into the three [`ModelClientError`] kinds so the
//! retry policy can tell "endpoint down" from "bad key" from "bad request".

use super::{FinishReason, ModelClient, ModelInvocation, ModelResponse, TokenUsage};
use crate::config::{ProcessorConfig, API_KEY_NOT_REQUIRED};
use crate::error::{ModelClientError, TextProcError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Client for any OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: Option<u32>,
}

impl OpenAiCompatibleClient {
    /// Build a client from the resolved configuration.
    pub fn new(config: &ProcessorConfig) -> Result<Self, TextProcError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| TextProcError::Internal(format!("HTTP client: {e}")))?;

        let api_key = if config.api_key == API_KEY_NOT_REQUIRED {
            None
        } else {
            Some(config.api_key.clone())
        };

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
        })
    }

    /// Full URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn messages<'a>(invocation: &'a ModelInvocation) -> Vec<WireMessage<'a>> {
        let mut messages = vec![WireMessage {
            role: "system",
            content: &invocation.system_prompt,
        }];
        if let Some(ref instruction) = invocation.instruction {
            messages.push(WireMessage {
                role: "user",
                content: instruction,
            });
        }
        messages.push(WireMessage {
            role: "user",
            content: &invocation.user_content,
        });
        messages
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatibleClient {
    async fn invoke(&self, invocation: &ModelInvocation) -> Result<ModelResponse, ModelClientError> {
        let body = ChatRequest {
            model: &self.model,
            messages: Self::messages(invocation),
            max_tokens: invocation.max_tokens,
            temperature: invocation.temperature,
            stream: false,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ModelClientError::Transport(format!("request to {} timed out", self.endpoint))
            } else {
                ModelClientError::Transport(format!("request to {} failed: {e}", self.endpoint))
            }
        })?;

        let status = response.status();
        // Read the body fully before classifying so no half-read response is
        // left on the connection.
        let text = response.text().await.map_err(|e| {
            ModelClientError::Transport(format!("failed to read response body: {e}"))
        })?;

        if !status.is_success() {
            return Err(classify_status(status, &text));
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            ModelClientError::Model {
                detail: format!("malformed response payload: {e}"),
                retryable: false,
            }
        })?;

        normalise(parsed, &self.model)
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn backend_name(&self) -> &str {
        "openai-compatible"
    }
}

/// Sort a non-success HTTP status into the error taxonomy.
fn classify_status(status: StatusCode, body: &str) -> ModelClientError {
    let detail = format!("HTTP {}: {}", status.as_u16(), snippet(body));
    match status.as_u16() {
        401 | 403 => ModelClientError::Auth(detail),
        408 | 429 | 500..=599 => ModelClientError::Model {
            detail,
            retryable: true,
        },
        _ => ModelClientError::Model {
            detail,
            retryable: false,
        },
    }
}

/// First 200 characters of an error body, on one line.
fn snippet(body: &str) -> String {
    let one_line: String = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if one_line.chars().count() > 200 {
        let cut: String = one_line.chars().take(200).collect();
        format!("{cut}\u{2026}")
    } else {
        one_line
    }
}

fn normalise(parsed: ChatResponse, requested_model: &str) -> Result<ModelResponse, ModelClientError> {
    let tokens = parsed
        .usage
        .map(|u| TokenUsage {
            prompt: u.prompt_tokens,
            completion: u.completion_tokens,
            total: u
                .total_tokens
                .unwrap_or(u.prompt_tokens.saturating_add(u.completion_tokens)),
        })
        .unwrap_or_default();

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ModelClientError::Model {
            detail: "response contained no choices".into(),
            retryable: false,
        })?;

    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(ModelClientError::Model {
            detail: "completion was blocked by the provider's content filter".into(),
            retryable: false,
        });
    }

    let finish_reason = FinishReason::from_wire(choice.finish_reason.as_deref());
    debug!(
        "chat completion: {} prompt tokens, {} completion tokens, finish={}",
        tokens.prompt, tokens.completion, finish_reason
    );

    Ok(ModelResponse {
        raw_text: choice.message.content.unwrap_or_default(),
        model: parsed
            .model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| requested_model.to_string()),
        tokens,
        finish_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn invocation() -> ModelInvocation {
        ModelInvocation {
            system_prompt: "You summarise.".into(),
            instruction: None,
            user_content: "<document>\nSome text.\n</document>".into(),
            max_tokens: 64,
            temperature: 0.3,
        }
    }

    fn client_for(url: &str, key: &str) -> OpenAiCompatibleClient {
        let config = ProcessorConfig::builder()
            .base_url(url)
            .api_key(key)
            .model("test-model")
            .request_timeout_secs(5)
            .build()
            .unwrap();
        OpenAiCompatibleClient::new(&config).unwrap()
    }

    #[test]
    fn endpoint_is_joined_once() {
        let c = client_for("http://localhost:8080/v1/", API_KEY_NOT_REQUIRED);
        assert_eq!(c.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn instruction_travels_as_its_own_message() {
        let mut inv = invocation();
        inv.instruction = Some("List every date.".into());
        let msgs = OpenAiCompatibleClient::messages(&inv);
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].role, "system");
        assert_eq!(msgs[1].content, "List every date.");
        assert!(msgs[2].content.contains("Some text."));
    }

    #[tokio::test]
    async fn successful_completion_is_normalised() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "test-model",
                "max_tokens": 64,
                "stream": false
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"model":"test-model-2025","choices":[{"message":{"role":"assistant","content":"A short summary."},"finish_reason":"stop"}],
                    "usage":{"prompt_tokens":42,"completion_tokens":5,"total_tokens":47}}"#,
            )
            .create_async()
            .await;

        let client = client_for(&format!("{}/v1", server.url()), "sk-test");
        let resp = client.invoke(&invocation()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(resp.raw_text, "A short summary.");
        assert_eq!(resp.model, "test-model-2025");
        assert_eq!(resp.tokens, TokenUsage { prompt: 42, completion: 5, total: 47 });
        assert_eq!(resp.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn missing_usage_defaults_to_zero() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"ok"},"finish_reason":"length"}]}"#)
            .create_async()
            .await;

        let client = client_for(&format!("{}/v1", server.url()), API_KEY_NOT_REQUIRED);
        let resp = client.invoke(&invocation()).await.unwrap();
        assert_eq!(resp.tokens, TokenUsage::default());
        assert_eq!(resp.finish_reason, FinishReason::Length);
        assert_eq!(resp.model, "test-model");
    }

    #[tokio::test]
    async fn sentinel_key_sends_no_authorization_header() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"ok"}}]}"#)
            .create_async()
            .await;

        let client = client_for(&format!("{}/v1", server.url()), API_KEY_NOT_REQUIRED);
        client.invoke(&invocation()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(401)
            .with_body(r#"{"error":{"message":"Incorrect API key provided"}}"#)
            .create_async()
            .await;

        let client = client_for(&format!("{}/v1", server.url()), "sk-bad");
        let err = client.invoke(&invocation()).await.unwrap_err();
        assert!(matches!(err, ModelClientError::Auth(ref d) if d.contains("401")), "got {err:?}");
    }

    #[tokio::test]
    async fn server_error_is_retryable_model_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let client = client_for(&format!("{}/v1", server.url()), API_KEY_NOT_REQUIRED);
        let err = client.invoke(&invocation()).await.unwrap_err();
        assert_eq!(
            err,
            ModelClientError::Model {
                detail: "HTTP 503: overloaded".into(),
                retryable: true
            }
        );
    }

    #[tokio::test]
    async fn bad_request_is_not_retryable() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(400)
            .with_body(r#"{"error":"context length exceeded"}"#)
            .create_async()
            .await;

        let client = client_for(&format!("{}/v1", server.url()), API_KEY_NOT_REQUIRED);
        let err = client.invoke(&invocation()).await.unwrap_err();
        assert!(matches!(err, ModelClientError::Model { retryable: false, .. }));
    }

    #[tokio::test]
    async fn malformed_payload_is_model_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body("<html>gateway</html>")
            .create_async()
            .await;

        let client = client_for(&format!("{}/v1", server.url()), API_KEY_NOT_REQUIRED);
        let err = client.invoke(&invocation()).await.unwrap_err();
        assert!(matches!(err, ModelClientError::Model { ref detail, .. } if detail.contains("malformed")));
    }

    #[tokio::test]
    async fn empty_choices_is_model_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let client = client_for(&format!("{}/v1", server.url()), API_KEY_NOT_REQUIRED);
        let err = client.invoke(&invocation()).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Model);
    }

    #[tokio::test]
    async fn content_filter_is_not_retryable() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":""},"finish_reason":"content_filter"}]}"#)
            .create_async()
            .await;

        let client = client_for(&format!("{}/v1", server.url()), API_KEY_NOT_REQUIRED);
        let err = client.invoke(&invocation()).await.unwrap_err();
        assert!(matches!(err, ModelClientError::Model { retryable: false, .. }));
    }

    #[tokio::test]
    async fn connection_refused_is_transport() {
        // Port 9 (discard) on localhost is closed on any sane test host.
        let client = client_for("http://127.0.0.1:9/v1", API_KEY_NOT_REQUIRED);
        let err = client.invoke(&invocation()).await.unwrap_err();
        assert!(matches!(err, ModelClientError::Transport(_)), "got {err:?}");
    }

    #[test]
    fn snippet_caps_length() {
        let long = "x".repeat(500);
        let s = snippet(&long);
        assert_eq!(s.chars().count(), 201);
    }
}
