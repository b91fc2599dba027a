//! Error types for the edgequake-textproc library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`TextProcError`] — **Fatal**: the processor cannot be set up at all
//!   (bad configuration, provider not configured). Returned as
//!   `Err(TextProcError)` from constructors and from the few APIs that
//!   deliberately propagate failures, such as [`crate::quick_summarize`].
//!
//! * [`AnalysisError`] — **Non-fatal**: a single analysis call failed
//!   (bad input, transport failure, rejected credential, unusable model
//!   output). Stored inside [`crate::output::AnalysisResult`] so batches and
//!   serving layers can compose calls without unwinding.
//!
//! [`ModelClientError`] is the narrower vocabulary a
//! [`crate::model::ModelClient`] speaks; the processor folds it into an
//! [`AnalysisError`] once retries are exhausted.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// All fatal errors returned by the edgequake-textproc library.
#[derive(Debug, Error)]
pub enum TextProcError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or environment validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configured provider could not be initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Call errors ───────────────────────────────────────────────────────
    /// An analysis failed and the caller asked for it to be propagated.
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The four failure categories every analysis call is sorted into.
///
/// The display names are stable: they prefix every error string so that
/// callers reading only the text can still tell the categories apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad caller input. Never retried, raised before any network call.
    Validation,
    /// Credential missing or rejected. Never retried.
    Auth,
    /// Network or connection failure. Retried with bounded backoff.
    Transport,
    /// Backend reachable but returned an error or unusable payload.
    Model,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Auth => "AuthError",
            ErrorKind::Transport => "TransportError",
            ErrorKind::Model => "ModelError",
        };
        f.write_str(name)
    }
}

/// A non-fatal, categorised failure of one analysis call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct AnalysisError {
    pub kind: ErrorKind,
    pub message: String,
}

impl AnalysisError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    pub fn model(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Model, message)
    }
}

/// Failure of a single [`crate::model::ModelClient::invoke`] call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelClientError {
    /// Connection refused, DNS failure, timeout, or a half-read body.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Credential missing or rejected by the endpoint (401/403).
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The endpoint answered, but with an error status or a payload we
    /// cannot use. `retryable` marks transient backend conditions
    /// (429, 5xx) as opposed to deterministic rejections.
    #[error("model endpoint error: {detail}")]
    Model { detail: String, retryable: bool },
}

impl ModelClientError {
    /// The taxonomy bucket this client failure belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModelClientError::Transport(_) => ErrorKind::Transport,
            ModelClientError::Auth(_) => ErrorKind::Auth,
            ModelClientError::Model { .. } => ErrorKind::Model,
        }
    }
}

impl From<ModelClientError> for AnalysisError {
    fn from(e: ModelClientError) -> Self {
        match e {
            ModelClientError::Transport(detail) => AnalysisError::transport(detail),
            ModelClientError::Auth(detail) => AnalysisError::auth(detail),
            ModelClientError::Model { detail, .. } => AnalysisError::model(detail),
        }
    }
}

/// Failures reported by a [`crate::convert::DocumentConverter`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ConversionError {
    /// The document's format is not handled by this converter.
    #[error("Unsupported file type: .{extension} ('{name}')")]
    UnsupportedFormat { name: String, extension: String },

    /// The document exceeds the configured size limit.
    #[error("Document '{name}' is {size} bytes, over the {limit}-byte limit")]
    TooLarge {
        name: String,
        size: usize,
        limit: usize,
    },

    /// The conversion engine ran but could not produce text.
    #[error("Failed to convert '{name}': {detail}")]
    Failed { name: String, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_error_display_is_prefixed_by_kind() {
        let e = AnalysisError::transport("connection refused");
        assert_eq!(e.to_string(), "TransportError: connection refused");

        let e = AnalysisError::validation("text is empty");
        assert!(e.to_string().starts_with("ValidationError: "));
    }

    #[test]
    fn every_kind_has_a_distinct_prefix() {
        let kinds = [
            ErrorKind::Validation,
            ErrorKind::Auth,
            ErrorKind::Transport,
            ErrorKind::Model,
        ];
        let names: std::collections::HashSet<String> =
            kinds.iter().map(|k| k.to_string()).collect();
        assert_eq!(names.len(), 4);
    }

    #[test]
    fn client_error_maps_to_matching_kind() {
        let e: AnalysisError = ModelClientError::Auth("invalid key".into()).into();
        assert_eq!(e.kind, ErrorKind::Auth);
        assert!(e.message.contains("invalid key"));

        let e: AnalysisError = ModelClientError::Model {
            detail: "HTTP 503".into(),
            retryable: true,
        }
        .into();
        assert_eq!(e.kind, ErrorKind::Model);
        assert_eq!(
            ModelClientError::Transport("x".into()).kind(),
            ErrorKind::Transport
        );
    }

    #[test]
    fn provider_not_configured_display() {
        let e = TextProcError::ProviderNotConfigured {
            provider: "anthropic".into(),
            hint: "Set ANTHROPIC_API_KEY".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("anthropic"), "got: {msg}");
        assert!(msg.contains("ANTHROPIC_API_KEY"), "got: {msg}");
    }

    #[test]
    fn too_large_display() {
        let e = ConversionError::TooLarge {
            name: "big.md".into(),
            size: 30,
            limit: 20,
        };
        assert!(e.to_string().contains("big.md"));
        assert!(e.to_string().contains("20-byte"));
    }

    #[test]
    fn kind_serialises_snake_case() {
        let json = serde_json::to_string(&ErrorKind::Transport).unwrap();
        assert_eq!(json, "\"transport\"");
    }
}
