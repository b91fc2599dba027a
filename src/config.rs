//! Configuration types for document analysis.
//!
//! All processing behaviour is controlled through [`ProcessorConfig`], built
//! via its [`ProcessorConfigBuilder`] or resolved from the environment with
//! [`ProcessorConfig::from_env`]. The config is resolved once and handed to
//! [`crate::TextProcessor`] at construction; nothing reads process state at
//! call time.

use crate::error::TextProcError;
use crate::prompts::DEFAULT_SUMMARY_PROMPT;
use serde::{Deserialize, Serialize};
use std::fmt;

/// API key value meaning "this endpoint does not need a credential".
///
/// Local runners (Docker Model Runner, llama.cpp server, vLLM) accept any
/// bearer token or none at all; the OpenAI-compatible client skips the
/// `Authorization` header when it sees this value.
pub const API_KEY_NOT_REQUIRED: &str = "not-needed";

/// Default OpenAI-compatible endpoint (Docker Model Runner).
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/v1";

/// Default model identifier served by the local runner.
pub const DEFAULT_MODEL: &str = "docker.io/granite-4.0-nano:350M-BF16";

/// Upload limit of the conversion service: 20 MB.
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 20 * 1024 * 1024;

/// Which backend family answers [`crate::model::ModelInvocation`]s.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Backend {
    /// Any endpoint implementing `POST {base_url}/chat/completions`. (default)
    #[default]
    OpenAiCompatible,
    /// A named edgequake-llm provider ("openai", "anthropic", "gemini", "ollama", …).
    /// Credentials come from the provider's own environment variables.
    Provider(String),
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::OpenAiCompatible => f.write_str("openai-compatible"),
            Backend::Provider(name) => f.write_str(name),
        }
    }
}

/// How oversized input is shortened before it is sent to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TruncationStrategy {
    /// Keep the first `max_input_chars` characters.
    Head,
    /// Keep the first three quarters and the last quarter of the budget,
    /// joined by an omission marker. Conclusions usually live at the end. (default)
    #[default]
    HeadAndTail,
}

/// Configuration for a [`crate::TextProcessor`].
///
/// # Example
/// ```rust
/// use edgequake_textproc::ProcessorConfig;
///
/// let config = ProcessorConfig::builder()
///     .model("gpt-4.1-nano")
///     .max_retries(3)
///     .concurrency(8)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone, PartialEq)]
pub struct ProcessorConfig {
    /// Backend family. Default: [`Backend::OpenAiCompatible`].
    pub backend: Backend,

    /// Base URL of the OpenAI-compatible endpoint, including the `/v1` prefix.
    pub base_url: String,

    /// Model identifier sent with every invocation.
    pub model: String,

    /// API key; [`API_KEY_NOT_REQUIRED`] for endpoints without auth.
    pub api_key: String,

    /// Per-invocation timeout in seconds. Default: 60.
    pub request_timeout_secs: u64,

    /// Summary length bound when the caller gives none. Default: 500.
    pub default_max_tokens: u32,

    /// Sampling temperature for summaries and custom analysis. Default: 0.7.
    pub default_temperature: f32,

    /// Number of key points when the caller gives none. Default: 5.
    pub default_num_points: u32,

    /// Completion budget for key-point extraction. Default: 300.
    pub key_points_max_tokens: u32,

    /// Key points are sampled cooler than prose. Default: 0.5.
    pub key_points_temperature: f32,

    /// Completion budget for custom analysis when the caller gives none. Default: 1000.
    pub analysis_max_tokens: u32,

    /// Character budget for document text inside one invocation. Default: 32 000.
    pub max_input_chars: usize,

    /// How text over `max_input_chars` is cut. Default: head and tail.
    pub truncation: TruncationStrategy,

    /// Retries after the first attempt. Default: 2.
    ///
    /// Applies to transport failures; transient model errors additionally
    /// stop after `max_model_retries`. Auth failures are never retried.
    pub max_retries: u32,

    /// Retries allowed for transient model-side failures. Default: 1.
    pub max_model_retries: u32,

    /// Initial retry delay in milliseconds, doubling per retry. Default: 500.
    pub retry_backoff_ms: u64,

    /// Maximum in-flight invocations during a batch. Default: 4.
    pub concurrency: usize,

    /// Custom summarisation system prompt. If None, uses the built-in default.
    pub summary_system_prompt: Option<String>,

    /// Largest document a converter will accept, in bytes. Default: 20 MB.
    pub max_document_bytes: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: API_KEY_NOT_REQUIRED.to_string(),
            request_timeout_secs: 60,
            default_max_tokens: 500,
            default_temperature: 0.7,
            default_num_points: 5,
            key_points_max_tokens: 300,
            key_points_temperature: 0.5,
            analysis_max_tokens: 1000,
            max_input_chars: 32_000,
            truncation: TruncationStrategy::default(),
            max_retries: 2,
            max_model_retries: 1,
            retry_backoff_ms: 500,
            concurrency: 4,
            summary_system_prompt: None,
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
        }
    }
}

impl fmt::Debug for ProcessorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = if self.api_key == API_KEY_NOT_REQUIRED {
            API_KEY_NOT_REQUIRED
        } else {
            "<redacted>"
        };
        f.debug_struct("ProcessorConfig")
            .field("backend", &self.backend)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &key)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("default_temperature", &self.default_temperature)
            .field("default_num_points", &self.default_num_points)
            .field("max_input_chars", &self.max_input_chars)
            .field("truncation", &self.truncation)
            .field("max_retries", &self.max_retries)
            .field("max_model_retries", &self.max_model_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl ProcessorConfig {
    /// Create a new builder for `ProcessorConfig`.
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder {
            config: Self::default(),
        }
    }

    /// Reopen a configuration for adjustment, e.g. CLI flags over env values.
    pub fn into_builder(self) -> ProcessorConfigBuilder {
        ProcessorConfigBuilder { config: self }
    }

    /// Resolve configuration from process environment variables.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `EDGEQUAKE_LLM_PROVIDER` | `backend` (unset → OpenAI-compatible) |
    /// | `MODEL_RUNNER_URL` | `base_url` |
    /// | `TEXTPROC_MODEL`, `EDGEQUAKE_MODEL` | `model` |
    /// | `OPENAI_API_KEY` | `api_key` |
    /// | `TEXTPROC_TIMEOUT_SECS` | `request_timeout_secs` |
    /// | `TEXTPROC_MAX_TOKENS` | `default_max_tokens` |
    /// | `TEXTPROC_TEMPERATURE` | `default_temperature` |
    /// | `TEXTPROC_NUM_POINTS` | `default_num_points` |
    /// | `TEXTPROC_MAX_INPUT_CHARS` | `max_input_chars` |
    /// | `TEXTPROC_MAX_RETRIES` | `max_retries` |
    /// | `TEXTPROC_RETRY_BACKOFF_MS` | `retry_backoff_ms` |
    /// | `TEXTPROC_CONCURRENCY` | `concurrency` |
    /// | `TEXTPROC_MAX_DOCUMENT_BYTES` | `max_document_bytes` |
    pub fn from_env() -> Result<Self, TextProcError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration through an arbitrary key lookup.
    ///
    /// Empty values count as unset. Values that fail to parse are reported
    /// as [`TextProcError::InvalidConfig`] naming the variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TextProcError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut builder = Self::builder();

        if let Some(provider) = get("EDGEQUAKE_LLM_PROVIDER") {
            builder = builder.backend(Backend::Provider(provider.trim().to_lowercase()));
        }
        if let Some(url) = get("MODEL_RUNNER_URL") {
            builder = builder.base_url(url);
        }
        if let Some(model) = get("TEXTPROC_MODEL").or_else(|| get("EDGEQUAKE_MODEL")) {
            builder = builder.model(model);
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            builder = builder.api_key(key);
        }
        if let Some(v) = get("TEXTPROC_TIMEOUT_SECS") {
            builder = builder.request_timeout_secs(parse_var("TEXTPROC_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("TEXTPROC_MAX_TOKENS") {
            builder = builder.default_max_tokens(parse_var("TEXTPROC_MAX_TOKENS", &v)?);
        }
        if let Some(v) = get("TEXTPROC_TEMPERATURE") {
            builder = builder.default_temperature(parse_var("TEXTPROC_TEMPERATURE", &v)?);
        }
        if let Some(v) = get("TEXTPROC_NUM_POINTS") {
            builder = builder.default_num_points(parse_var("TEXTPROC_NUM_POINTS", &v)?);
        }
        if let Some(v) = get("TEXTPROC_MAX_INPUT_CHARS") {
            builder = builder.max_input_chars(parse_var("TEXTPROC_MAX_INPUT_CHARS", &v)?);
        }
        if let Some(v) = get("TEXTPROC_MAX_RETRIES") {
            builder = builder.max_retries(parse_var("TEXTPROC_MAX_RETRIES", &v)?);
        }
        if let Some(v) = get("TEXTPROC_RETRY_BACKOFF_MS") {
            builder = builder.retry_backoff_ms(parse_var("TEXTPROC_RETRY_BACKOFF_MS", &v)?);
        }
        if let Some(v) = get("TEXTPROC_CONCURRENCY") {
            builder = builder.concurrency(parse_var("TEXTPROC_CONCURRENCY", &v)?);
        }
        if let Some(v) = get("TEXTPROC_MAX_DOCUMENT_BYTES") {
            builder = builder.max_document_bytes(parse_var("TEXTPROC_MAX_DOCUMENT_BYTES", &v)?);
        }

        builder.build()
    }

    /// True when the API key is the "no credential needed" sentinel.
    pub fn api_key_required(&self) -> bool {
        self.api_key != API_KEY_NOT_REQUIRED
    }

    /// The effective summarisation system prompt.
    pub fn summary_prompt(&self) -> &str {
        self.summary_system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SUMMARY_PROMPT)
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T, TextProcError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| {
        TextProcError::InvalidConfig(format!("{name}={value:?} could not be parsed: {e}"))
    })
}

/// Builder for [`ProcessorConfig`].
#[derive(Debug)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    pub fn backend(mut self, backend: Backend) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn default_max_tokens(mut self, n: u32) -> Self {
        self.config.default_max_tokens = n;
        self
    }

    pub fn default_temperature(mut self, t: f32) -> Self {
        self.config.default_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn default_num_points(mut self, n: u32) -> Self {
        self.config.default_num_points = n;
        self
    }

    pub fn key_points_max_tokens(mut self, n: u32) -> Self {
        self.config.key_points_max_tokens = n;
        self
    }

    pub fn key_points_temperature(mut self, t: f32) -> Self {
        self.config.key_points_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn analysis_max_tokens(mut self, n: u32) -> Self {
        self.config.analysis_max_tokens = n;
        self
    }

    pub fn max_input_chars(mut self, n: usize) -> Self {
        self.config.max_input_chars = n;
        self
    }

    pub fn truncation(mut self, strategy: TruncationStrategy) -> Self {
        self.config.truncation = strategy;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn max_model_retries(mut self, n: u32) -> Self {
        self.config.max_model_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn summary_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.summary_system_prompt = Some(prompt.into());
        self
    }

    pub fn max_document_bytes(mut self, n: usize) -> Self {
        self.config.max_document_bytes = n;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ProcessorConfig, TextProcError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(TextProcError::InvalidConfig(
                "Model identifier must not be empty".into(),
            ));
        }
        if c.backend == Backend::OpenAiCompatible
            && !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://"))
        {
            return Err(TextProcError::InvalidConfig(format!(
                "Base URL must be an HTTP/HTTPS URL, got '{}'",
                c.base_url
            )));
        }
        if c.api_key.trim().is_empty() {
            return Err(TextProcError::InvalidConfig(format!(
                "API key must not be empty; use '{API_KEY_NOT_REQUIRED}' for endpoints without auth"
            )));
        }
        if c.default_max_tokens == 0 || c.key_points_max_tokens == 0 || c.analysis_max_tokens == 0
        {
            return Err(TextProcError::InvalidConfig(
                "Token limits must be ≥ 1".into(),
            ));
        }
        if c.default_temperature.is_nan() || c.key_points_temperature.is_nan() {
            return Err(TextProcError::InvalidConfig(
                "Temperatures must be numbers between 0 and 2".into(),
            ));
        }
        if c.default_num_points == 0 {
            return Err(TextProcError::InvalidConfig(
                "Default number of key points must be ≥ 1".into(),
            ));
        }
        if c.max_input_chars < 100 {
            return Err(TextProcError::InvalidConfig(format!(
                "max_input_chars must be ≥ 100, got {}",
                c.max_input_chars
            )));
        }
        if c.concurrency == 0 {
            return Err(TextProcError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_local_runner() {
        let c = ProcessorConfig::default();
        assert_eq!(c.backend, Backend::OpenAiCompatible);
        assert_eq!(c.base_url, DEFAULT_BASE_URL);
        assert_eq!(c.model, DEFAULT_MODEL);
        assert!(!c.api_key_required());
        assert_eq!(c.default_max_tokens, 500);
        assert_eq!(c.default_num_points, 5);
        assert_eq!(c.analysis_max_tokens, 1000);
        assert_eq!(c.max_retries, 2);
        assert_eq!(c.max_document_bytes, 20_971_520);
    }

    #[test]
    fn builder_clamps_and_trims() {
        let c = ProcessorConfig::builder()
            .base_url("http://localhost:12434/engines/v1/")
            .default_temperature(5.0)
            .concurrency(0)
            .build()
            .unwrap();
        assert_eq!(c.base_url, "http://localhost:12434/engines/v1");
        assert_eq!(c.default_temperature, 2.0);
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn builder_rejects_bad_values() {
        assert!(ProcessorConfig::builder().model(" ").build().is_err());
        assert!(ProcessorConfig::builder().base_url("localhost").build().is_err());
        assert!(ProcessorConfig::builder().api_key("").build().is_err());
        assert!(ProcessorConfig::builder().default_max_tokens(0).build().is_err());
        assert!(ProcessorConfig::builder().default_num_points(0).build().is_err());
        assert!(ProcessorConfig::builder().max_input_chars(10).build().is_err());
    }

    #[test]
    fn provider_backend_skips_url_check() {
        let c = ProcessorConfig::builder()
            .backend(Backend::Provider("anthropic".into()))
            .base_url("unused")
            .build();
        assert!(c.is_ok());
    }

    #[test]
    fn from_lookup_empty_gives_defaults() {
        let c = ProcessorConfig::from_lookup(|_| None).unwrap();
        assert_eq!(c, ProcessorConfig::default());
    }

    #[test]
    fn from_lookup_reads_known_variables() {
        let c = ProcessorConfig::from_lookup(lookup_from(&[
            ("MODEL_RUNNER_URL", "https://api.openai.com/v1"),
            ("OPENAI_API_KEY", "sk-test"),
            ("EDGEQUAKE_MODEL", "gpt-4.1-nano"),
            ("TEXTPROC_MAX_RETRIES", "4"),
            ("TEXTPROC_CONCURRENCY", "12"),
            ("TEXTPROC_TEMPERATURE", "0.2"),
        ]))
        .unwrap();
        assert_eq!(c.base_url, "https://api.openai.com/v1");
        assert_eq!(c.api_key, "sk-test");
        assert!(c.api_key_required());
        assert_eq!(c.model, "gpt-4.1-nano");
        assert_eq!(c.max_retries, 4);
        assert_eq!(c.concurrency, 12);
        assert!((c.default_temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn textproc_model_wins_over_edgequake_model() {
        let c = ProcessorConfig::from_lookup(lookup_from(&[
            ("TEXTPROC_MODEL", "local-model"),
            ("EDGEQUAKE_MODEL", "gpt-4.1"),
        ]))
        .unwrap();
        assert_eq!(c.model, "local-model");
    }

    #[test]
    fn from_lookup_selects_provider_backend() {
        let c = ProcessorConfig::from_lookup(lookup_from(&[("EDGEQUAKE_LLM_PROVIDER", "Gemini")]))
            .unwrap();
        assert_eq!(c.backend, Backend::Provider("gemini".into()));
    }

    #[test]
    fn from_lookup_reports_malformed_variable() {
        let err = ProcessorConfig::from_lookup(lookup_from(&[("TEXTPROC_MAX_TOKENS", "lots")]))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("TEXTPROC_MAX_TOKENS"), "got: {msg}");
    }

    #[test]
    fn nan_temperature_is_rejected() {
        let err = ProcessorConfig::from_lookup(lookup_from(&[("TEXTPROC_TEMPERATURE", "NaN")]))
            .unwrap_err();
        assert!(matches!(err, TextProcError::InvalidConfig(_)));

        assert!(ProcessorConfig::builder()
            .key_points_temperature(f32::NAN)
            .build()
            .is_err());
        let clamped = ProcessorConfig::builder()
            .default_temperature(5.0)
            .build()
            .unwrap();
        assert_eq!(clamped.default_temperature, 2.0);
    }

    #[test]
    fn debug_redacts_real_keys() {
        let c = ProcessorConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn summary_prompt_override() {
        let c = ProcessorConfig::builder()
            .summary_system_prompt("Summarise like a pirate.")
            .build()
            .unwrap();
        assert_eq!(c.summary_prompt(), "Summarise like a pirate.");
        assert_eq!(
            ProcessorConfig::default().summary_prompt(),
            DEFAULT_SUMMARY_PROMPT
        );
    }
}
