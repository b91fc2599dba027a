//! Model backends: one trait, one implementation per backend family.
//!
//! [`ModelClient`] is the only seam between the orchestration core and the
//! network. A client performs exactly one request per
//! [`ModelClient::invoke`] and never retries; retry policy lives in
//! [`crate::pipeline::retry`] where it is visible and testable.
//!
//! | Backend | Implementation |
//! |---------|----------------|
//! | [`Backend::OpenAiCompatible`] | [`openai::OpenAiCompatibleClient`]: Docker Model Runner, vLLM, LiteLLM, OpenAI |
//! | [`Backend::Provider`] | [`provider::ProviderClient`]: any edgequake-llm provider |

pub mod openai;
pub mod provider;

use crate::config::{Backend, ProcessorConfig};
use crate::error::{ModelClientError, TextProcError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub use openai::OpenAiCompatibleClient;
pub use provider::ProviderClient;

/// One fully-formed request to the language model.
///
/// Built fresh per call by [`crate::pipeline::prompt::PromptBuilder`] and
/// never mutated afterwards. The caller's instruction (custom analysis) is
/// carried apart from the document content so the two are sent as separate
/// messages.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInvocation {
    pub system_prompt: String,
    pub instruction: Option<String>,
    pub user_content: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Token accounting reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u32,
    pub completion: u32,
    pub total: u32,
}

impl TokenUsage {
    /// Build usage from prompt/completion counts, deriving the total.
    pub fn new(prompt: u32, completion: u32) -> Self {
        Self {
            prompt,
            completion,
            total: prompt.saturating_add(completion),
        }
    }

    /// Field-wise sum, used to account for retried attempts.
    pub fn saturating_add(self, other: TokenUsage) -> Self {
        Self {
            prompt: self.prompt.saturating_add(other.prompt),
            completion: self.completion.saturating_add(other.completion),
            total: self.total.saturating_add(other.total),
        }
    }
}

/// Why the backend stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    /// Natural end of the completion.
    Stop,
    /// The completion hit `max_tokens`; the output may be cut short.
    Length,
    /// The backend flagged the generation as failed.
    Error,
}

impl FinishReason {
    /// Map an OpenAI-style `finish_reason` string.
    ///
    /// Missing reasons and tool-call stops count as [`FinishReason::Stop`].
    pub fn from_wire(reason: Option<&str>) -> Self {
        match reason {
            None | Some("stop") | Some("tool_calls") | Some("function_call") | Some("end_turn") => {
                FinishReason::Stop
            }
            Some("length") | Some("max_tokens") => FinishReason::Length,
            Some(_) => FinishReason::Error,
        }
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::Error => "error",
        })
    }
}

/// A backend reply normalised into a fixed shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub raw_text: String,
    /// Model id as reported by the backend (may differ from the requested alias).
    pub model: String,
    pub tokens: TokenUsage,
    pub finish_reason: FinishReason,
}

/// A stateless adapter that sends one [`ModelInvocation`] to a backend.
///
/// Implementations must be `Send + Sync`: one client is shared by every
/// concurrent call of a batch.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send exactly one request and normalise the reply.
    async fn invoke(&self, invocation: &ModelInvocation) -> Result<ModelResponse, ModelClientError>;

    /// The configured model identifier.
    fn model_id(&self) -> &str;

    /// Short backend name for logs ("openai-compatible", "anthropic", …).
    fn backend_name(&self) -> &str;
}

/// Instantiate the client for the configured backend.
///
/// Selection happens here once, so the processor never branches on the
/// backend family.
pub fn client_from_config(config: &ProcessorConfig) -> Result<Arc<dyn ModelClient>, TextProcError> {
    match &config.backend {
        Backend::OpenAiCompatible => Ok(Arc::new(OpenAiCompatibleClient::new(config)?)),
        Backend::Provider(name) => Ok(Arc::new(
            ProviderClient::from_name(name, &config.model)?
                .with_timeout(Duration::from_secs(config.request_timeout_secs)),
        )),
    }
}
