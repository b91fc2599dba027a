//! Adapter over edgequake-llm providers.
//!
//! Lets the processor run against any provider edgequake-llm knows
//! (OpenAI, Anthropic, Gemini, Azure OpenAI, Ollama, LM Studio, …) with
//! credentials read from the provider's usual environment variables.
//! Provider errors arrive as opaque messages; [`classify_provider_error`]
//! sorts them into the same three kinds the HTTP client produces.

use super::{FinishReason, ModelClient, ModelInvocation, ModelResponse, TokenUsage};
use crate::error::{ModelClientError, TextProcError};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// An HTTP status code as providers render it: at the start of the message
/// or after "status", "http", "error" or "code".
static RE_STATUS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|\bstatus(?:\s*code)?|\bhttp(?:/[\d.]+)?|\berror|\bcode)\W{0,3}([1-5]\d{2})\b")
        .unwrap()
});

const AUTH_PHRASES: &[&str] = &[
    "unauthorized",
    "forbidden",
    "invalid api key",
    "incorrect api key",
    "missing api key",
    "no api key",
    "invalid x-api-key",
    "api key not",
    "authentication",
    "permission denied",
];

const TRANSPORT_PHRASES: &[&str] = &[
    "timed out",
    "timeout",
    "connection refused",
    "connection reset",
    "connection closed",
    "connection aborted",
    "error sending request",
    "failed to lookup address",
    "dns error",
    "network error",
    "tcp connect",
    "broken pipe",
    "reset by peer",
];

const TRANSIENT_PHRASES: &[&str] = &[
    "rate limit",
    "ratelimit",
    "too many requests",
    "overloaded",
    "service unavailable",
    "temporarily unavailable",
    "bad gateway",
    "internal server error",
];

/// [`ModelClient`] backed by an `Arc<dyn LLMProvider>`.
pub struct ProviderClient {
    provider: Arc<dyn LLMProvider>,
    name: String,
    model: String,
    timeout: Duration,
}

impl ProviderClient {
    /// Wrap a pre-constructed provider.
    ///
    /// Useful when the caller already configured the provider (custom
    /// middleware, caching, rate limiting).
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        name: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            name: name.into(),
            model: model.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Bound each provider call; an overrun is a transport error.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Instantiate a named provider with the given model.
    pub fn from_name(provider_name: &str, model: &str) -> Result<Self, TextProcError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            TextProcError::ProviderNotConfigured {
                provider: provider_name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider, provider_name, model))
    }

    fn messages(invocation: &ModelInvocation) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(invocation.system_prompt.as_str())];
        if let Some(ref instruction) = invocation.instruction {
            messages.push(ChatMessage::user(instruction.as_str()));
        }
        messages.push(ChatMessage::user(invocation.user_content.as_str()));
        messages
    }
}

#[async_trait]
impl ModelClient for ProviderClient {
    async fn invoke(&self, invocation: &ModelInvocation) -> Result<ModelResponse, ModelClientError> {
        let messages = Self::messages(invocation);
        let options = CompletionOptions {
            temperature: Some(invocation.temperature),
            max_tokens: Some(invocation.max_tokens as usize),
            ..Default::default()
        };

        let response =
            with_deadline(self.timeout, self.provider.chat(&messages, Some(&options))).await?;

        let tokens = TokenUsage::new(
            saturating_u32(response.prompt_tokens),
            saturating_u32(response.completion_tokens),
        );
        // Providers do not expose a uniform stop reason; a completion that
        // used the whole budget is treated as cut off.
        let finish_reason = if tokens.completion > 0 && tokens.completion >= invocation.max_tokens {
            FinishReason::Length
        } else {
            FinishReason::Stop
        };
        debug!(
            "{}: {} prompt tokens, {} completion tokens",
            self.name, tokens.prompt, tokens.completion
        );

        Ok(ModelResponse {
            raw_text: response.content,
            model: self.model.clone(),
            tokens,
            finish_reason,
        })
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn backend_name(&self) -> &str {
        &self.name
    }
}

/// Token counts past `u32::MAX` saturate instead of wrapping.
fn saturating_u32<N: TryInto<u32>>(n: N) -> u32 {
    n.try_into().unwrap_or(u32::MAX)
}

/// Await a provider call for at most `timeout`, classifying its error.
async fn with_deadline<T, E, F>(timeout: Duration, call: F) -> Result<T, ModelClientError>
where
    E: fmt::Display,
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(classify_provider_error(&e.to_string())),
        Err(_) => Err(ModelClientError::Transport(format!(
            "provider call timed out after {:.1}s",
            timeout.as_secs_f64()
        ))),
    }
}

/// Sort a provider error message into the three client error kinds.
///
/// Providers wrap HTTP and network failures differently, so matching is on
/// the rendered message. Status codes only count where they read as a
/// status; anything unrecognised is a non-retryable model error.
pub fn classify_provider_error(message: &str) -> ModelClientError {
    let lower = message.to_lowercase();
    let has = |phrases: &[&str]| phrases.iter().any(|p| lower.contains(p));
    let status = RE_STATUS
        .captures(&lower)
        .and_then(|c| c[1].parse::<u16>().ok());

    if matches!(status, Some(401 | 403)) || has(AUTH_PHRASES) {
        ModelClientError::Auth(message.to_string())
    } else if has(TRANSPORT_PHRASES) {
        ModelClientError::Transport(message.to_string())
    } else if matches!(status, Some(408 | 429 | 500..=599)) || has(TRANSIENT_PHRASES) {
        ModelClientError::Model {
            detail: message.to_string(),
            retryable: true,
        }
    } else {
        ModelClientError::Model {
            detail: message.to_string(),
            retryable: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_messages() {
        assert!(matches!(
            classify_provider_error("API error: 401 Unauthorized"),
            ModelClientError::Auth(_)
        ));
        assert!(matches!(
            classify_provider_error("Invalid API key supplied"),
            ModelClientError::Auth(_)
        ));
    }

    #[test]
    fn transport_messages() {
        assert!(matches!(
            classify_provider_error("Network error: connection refused"),
            ModelClientError::Transport(_)
        ));
        assert!(matches!(
            classify_provider_error("request timed out after 60s"),
            ModelClientError::Transport(_)
        ));
    }

    #[test]
    fn transient_model_messages() {
        assert_eq!(
            classify_provider_error("Rate limit exceeded"),
            ModelClientError::Model {
                detail: "Rate limit exceeded".into(),
                retryable: true
            }
        );
        assert!(matches!(
            classify_provider_error("HTTP 503 Service Unavailable"),
            ModelClientError::Model { retryable: true, .. }
        ));
    }

    #[test]
    fn unknown_messages_are_not_retried() {
        assert!(matches!(
            classify_provider_error("invalid request: messages must not be empty"),
            ModelClientError::Model { retryable: false, .. }
        ));
    }

    #[test]
    fn numbers_outside_status_position_are_ignored() {
        let context = "API error: This model's maximum context length is 8192 tokens. \
                       However, you requested 14010 tokens (13510 in the messages, \
                       500 in the completion).";
        assert!(matches!(
            classify_provider_error(context),
            ModelClientError::Model { retryable: false, .. }
        ));
        assert!(matches!(
            classify_provider_error("Invalid request: max_tokens 4030 exceeds 500 limit"),
            ModelClientError::Model { retryable: false, .. }
        ));
        assert!(matches!(
            classify_provider_error("unknown field 'connection_pool' in request body"),
            ModelClientError::Model { retryable: false, .. }
        ));
    }

    #[test]
    fn status_codes_in_status_position_are_classified() {
        assert!(matches!(
            classify_provider_error("403 Forbidden"),
            ModelClientError::Auth(_)
        ));
        assert!(matches!(
            classify_provider_error("status code: 429"),
            ModelClientError::Model { retryable: true, .. }
        ));
        assert!(matches!(
            classify_provider_error("HTTP/1.1 502"),
            ModelClientError::Model { retryable: true, .. }
        ));
    }

    #[test]
    fn oversized_token_counts_saturate() {
        assert_eq!(saturating_u32(12usize), 12);
        assert_eq!(saturating_u32(u64::from(u32::MAX) + 5), u32::MAX);
    }

    #[tokio::test]
    async fn slow_provider_call_is_a_transport_error() {
        let pending = std::future::pending::<Result<(), String>>();
        let err = with_deadline(Duration::from_millis(20), pending)
            .await
            .unwrap_err();
        match err {
            ModelClientError::Transport(msg) => assert!(msg.contains("timed out")),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn deadline_passes_results_and_classifies_errors() {
        let ok = with_deadline(Duration::from_secs(1), async { Ok::<u32, String>(7) }).await;
        assert_eq!(ok, Ok(7));

        let err = with_deadline(Duration::from_secs(1), async {
            Err::<u32, String>("API error: 401 Unauthorized".into())
        })
        .await;
        assert!(matches!(err, Err(ModelClientError::Auth(_))));
    }
}
