//! TextProcessor: the orchestration core callers talk to.
//!
//! Each call walks the same state machine:
//!
//! ```text
//! Validating ──▶ Building ──▶ Invoking ──▶ Parsing ──▶ Done(success)
//!     │                        ▲    │         │
//!     │                        │    ▼         ▼
//!     │                     RetryWait ◀── (retryable failure)
//!     ▼                                       │
//! Done(failure) ◀──────── (give up) ──────────┘
//! ```
//!
//! Every failure ends as an [`AnalysisResult`] with `success == false`;
//! nothing raised by the client or the parser crosses this boundary.
//! Callers who want `?` use [`AnalysisResult::into_result`] or
//! [`TextProcessor::quick_summarize`].

use crate::config::ProcessorConfig;
use crate::error::{AnalysisError, TextProcError};
use crate::model::{client_from_config, FinishReason, ModelClient, ModelResponse};
use crate::output::{
    AnalysisMetadata, AnalysisPayload, AnalysisRequest, AnalysisResult, AnalysisTask, Task,
};
use crate::pipeline::parse::{parse_key_points, parse_text};
use crate::pipeline::prompt::{BuiltPrompt, PromptBuilder};
use crate::pipeline::retry::{AttemptError, RetryDecision, RetryPolicy, RetryState};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// What the reply of a prepared call must parse into.
#[derive(Debug, Clone, Copy)]
enum Expect {
    Summary,
    KeyPoints(u32),
    Analysis,
}

/// Runs summarisation, key-point extraction, and custom analysis against a
/// [`ModelClient`].
///
/// Cheap to clone; clones share the client. Safe to call concurrently:
/// no state is shared between calls.
#[derive(Clone)]
pub struct TextProcessor {
    config: Arc<ProcessorConfig>,
    client: Arc<dyn ModelClient>,
    prompts: PromptBuilder,
    retry: RetryPolicy,
}

impl std::fmt::Debug for TextProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextProcessor")
            .field("config", &self.config)
            .field("backend", &self.client.backend_name())
            .field("model", &self.client.model_id())
            .finish()
    }
}

impl TextProcessor {
    /// Build a processor around an existing client (real or fake).
    pub fn new(config: ProcessorConfig, client: Arc<dyn ModelClient>) -> Self {
        Self {
            prompts: PromptBuilder::new(&config),
            retry: RetryPolicy::from_config(&config),
            config: Arc::new(config),
            client,
        }
    }

    /// Build a processor and the client for the configured backend.
    pub fn from_config(config: ProcessorConfig) -> Result<Self, TextProcError> {
        let client = client_from_config(&config)?;
        info!(
            "Using {} backend, model {}",
            client.backend_name(),
            client.model_id()
        );
        Ok(Self::new(config, client))
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<dyn ModelClient> {
        &self.client
    }

    /// Summarise `text`. `None` parameters use the configured defaults
    /// (500 tokens, temperature 0.7).
    pub async fn summarize(
        &self,
        text: &str,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> AnalysisResult {
        self.analyze_text(
            text,
            &AnalysisTask::Summarize {
                max_tokens,
                temperature,
            },
        )
        .await
    }

    /// Extract up to `num_points` (default 5) distinct key points.
    pub async fn extract_key_points(&self, text: &str, num_points: Option<u32>) -> AnalysisResult {
        self.analyze_text(
            text,
            &AnalysisTask::KeyPoints {
                num_points,
                max_tokens: None,
            },
        )
        .await
    }

    /// Run a caller-supplied instruction against `text` (default budget 1000 tokens).
    pub async fn custom_analysis(
        &self,
        text: &str,
        instruction: &str,
        max_tokens: Option<u32>,
    ) -> AnalysisResult {
        self.analyze_text(
            text,
            &AnalysisTask::CustomAnalysis {
                instruction: instruction.to_string(),
                max_tokens,
                temperature: None,
            },
        )
        .await
    }

    /// Generic entry point for a fully-formed request.
    pub async fn analyze(&self, request: &AnalysisRequest) -> AnalysisResult {
        self.analyze_text(&request.text, &request.task).await
    }

    /// Summary text with default parameters, or the categorised error.
    pub async fn quick_summarize(&self, text: &str) -> Result<String, AnalysisError> {
        match self.summarize(text, None, None).await.into_result()? {
            AnalysisPayload::Summary(s) | AnalysisPayload::Analysis(s) => Ok(s),
            AnalysisPayload::KeyPoints(points) => Ok(points.join("\n")),
        }
    }

    /// Run `task` against `text`.
    pub async fn analyze_text(&self, text: &str, task: &AnalysisTask) -> AnalysisResult {
        let started = Instant::now();
        let kind = task.task();
        debug!("{}: {} input chars", kind, text.chars().count());

        // Validating + Building
        let (built, expect) = match self.prepare(text, task) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!("{}: rejected before invocation: {}", kind, e);
                let metadata = AnalysisMetadata {
                    model: self.client.model_id().to_string(),
                    duration_ms: started.elapsed().as_millis() as u64,
                    ..Default::default()
                };
                return AnalysisResult::failed(kind, e, metadata);
            }
        };

        if built.truncation.truncated {
            debug!(
                "{}: input truncated from {} to {} chars",
                kind, built.truncation.original_chars, built.truncation.kept_chars
            );
        }

        let mut metadata = AnalysisMetadata {
            model: self.client.model_id().to_string(),
            truncated: built.truncation.truncated,
            ..Default::default()
        };
        let outcome = self.invoke_with_retry(kind, &built, expect, &mut metadata).await;
        metadata.duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(payload) => {
                info!(
                    "{}: done in {}ms ({} attempt(s), {} tokens)",
                    kind, metadata.duration_ms, metadata.attempts, metadata.tokens_used.total
                );
                AnalysisResult::succeeded(kind, payload, metadata)
            }
            Err(e) => {
                warn!(
                    "{}: failed after {} attempt(s): {}",
                    kind, metadata.attempts, e
                );
                AnalysisResult::failed(kind, e, metadata)
            }
        }
    }

    fn prepare(
        &self,
        text: &str,
        task: &AnalysisTask,
    ) -> Result<(BuiltPrompt, Expect), AnalysisError> {
        if text.trim().is_empty() {
            return Err(AnalysisError::validation("text must not be empty"));
        }

        match task {
            AnalysisTask::Summarize {
                max_tokens,
                temperature,
            } => {
                let max_tokens = positive(*max_tokens, self.config.default_max_tokens, "max_tokens")?;
                let temperature = temperature_in_range(*temperature, self.config.default_temperature)?;
                Ok((
                    self.prompts.build_summarize(text, max_tokens, temperature),
                    Expect::Summary,
                ))
            }
            AnalysisTask::KeyPoints {
                num_points,
                max_tokens,
            } => {
                let n = positive(*num_points, self.config.default_num_points, "num_points")?;
                let max_tokens =
                    positive(*max_tokens, self.config.key_points_max_tokens, "max_tokens")?;
                Ok((
                    self.prompts.build_key_points(text, n, max_tokens),
                    Expect::KeyPoints(n),
                ))
            }
            AnalysisTask::CustomAnalysis {
                instruction,
                max_tokens,
                temperature,
            } => {
                if instruction.trim().is_empty() {
                    return Err(AnalysisError::validation(
                        "instruction must not be empty for custom analysis",
                    ));
                }
                let max_tokens =
                    positive(*max_tokens, self.config.analysis_max_tokens, "max_tokens")?;
                let temperature = temperature_in_range(*temperature, self.config.default_temperature)?;
                Ok((
                    self.prompts.build_custom_analysis(
                        text,
                        instruction.trim(),
                        max_tokens,
                        temperature,
                    ),
                    Expect::Analysis,
                ))
            }
        }
    }

    /// Invoking → (RetryWait → Invoking)* → Parsing.
    async fn invoke_with_retry(
        &self,
        task: Task,
        built: &BuiltPrompt,
        expect: Expect,
        metadata: &mut AnalysisMetadata,
    ) -> Result<AnalysisPayload, AnalysisError> {
        let mut state = RetryState::default();
        loop {
            state.attempts += 1;
            metadata.attempts = state.attempts;

            let attempt = match self.client.invoke(&built.invocation).await {
                Ok(response) => {
                    record_response(metadata, &response);
                    debug!(
                        "{}: attempt {} used {} prompt + {} completion tokens (finish: {})",
                        task,
                        state.attempts,
                        response.tokens.prompt,
                        response.tokens.completion,
                        response.finish_reason
                    );
                    parse_response(&response, expect)
                }
                Err(e) => Err(AttemptError::Client(e)),
            };

            let err = match attempt {
                Ok(payload) => return Ok(payload),
                Err(err) => err,
            };
            warn!("{}: attempt {} failed: {}", task, state.attempts, err);

            match self.retry.decide(&err, &mut state) {
                RetryDecision::Retry { delay } => {
                    warn!(
                        "{}: retry {}/{} after {}ms backoff",
                        task,
                        state.retries(),
                        self.retry.max_retries,
                        delay.as_millis()
                    );
                    sleep(delay).await;
                }
                RetryDecision::GiveUp => return Err(err.into()),
            }
        }
    }
}

fn positive(value: Option<u32>, default: u32, name: &str) -> Result<u32, AnalysisError> {
    match value {
        Some(0) => Err(AnalysisError::validation(format!(
            "{name} must be a positive integer"
        ))),
        Some(n) => Ok(n),
        None => Ok(default),
    }
}

fn temperature_in_range(value: Option<f32>, default: f32) -> Result<f32, AnalysisError> {
    let temperature = value.unwrap_or(default);
    if !(0.0..=2.0).contains(&temperature) {
        return Err(AnalysisError::validation(format!(
            "temperature must be between 0 and 2, got {temperature}"
        )));
    }
    Ok(temperature)
}

fn record_response(metadata: &mut AnalysisMetadata, response: &ModelResponse) {
    metadata.tokens_used = metadata.tokens_used.saturating_add(response.tokens);
    metadata.finish_reason = Some(response.finish_reason);
    if !response.model.is_empty() {
        metadata.model = response.model.clone();
    }
}

fn parse_response(response: &ModelResponse, expect: Expect) -> Result<AnalysisPayload, AttemptError> {
    let malformed = |detail: String| AttemptError::Malformed {
        detail,
        finish_reason: response.finish_reason,
    };
    if response.finish_reason == FinishReason::Error {
        return Err(malformed("backend reported a generation error".into()));
    }
    match expect {
        Expect::Summary => parse_text(&response.raw_text)
            .map(AnalysisPayload::Summary)
            .map_err(|e| malformed(e.0)),
        Expect::Analysis => parse_text(&response.raw_text)
            .map(AnalysisPayload::Analysis)
            .map_err(|e| malformed(e.0)),
        Expect::KeyPoints(n) => parse_key_points(&response.raw_text, n)
            .map(AnalysisPayload::KeyPoints)
            .map_err(|e| malformed(e.0)),
    }
}

/// Summarise `text` with a processor built from `config`, propagating any
/// failure.
///
/// Convenience for scripts; long-running callers should keep one
/// [`TextProcessor`] instead of rebuilding the client per call.
pub async fn quick_summarize(text: &str, config: &ProcessorConfig) -> Result<String, TextProcError> {
    let processor = TextProcessor::from_config(config.clone())?;
    Ok(processor.quick_summarize(text).await?)
}
