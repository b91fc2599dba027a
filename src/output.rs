//! Request and result types.
//!
//! Every result type serialises with the field names the serving layer
//! exposes (`task`, `payload`, `metadata.tokens_used`, `success`, `error`,
//! batch `{ results, total }`), so callers can hand them straight to
//! `serde_json`.

use crate::error::{AnalysisError, ErrorKind};
use crate::model::{FinishReason, TokenUsage};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde::Deserialize;
use std::fmt;

/// The three analysis tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Summarize,
    KeyPoints,
    CustomAnalysis,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Task::Summarize => "summarize",
            Task::KeyPoints => "key_points",
            Task::CustomAnalysis => "custom_analysis",
        })
    }
}

/// A task together with its parameters.
///
/// Parameters left as `None` fall back to the processor's configured
/// defaults. The variant decides which parameters exist, so a custom
/// analysis cannot be built without an instruction.
#[derive(Debug, Clone, PartialEq, serde::Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum AnalysisTask {
    Summarize {
        #[serde(default)]
        max_tokens: Option<u32>,
        #[serde(default)]
        temperature: Option<f32>,
    },
    KeyPoints {
        #[serde(default)]
        num_points: Option<u32>,
        #[serde(default)]
        max_tokens: Option<u32>,
    },
    CustomAnalysis {
        instruction: String,
        #[serde(default)]
        max_tokens: Option<u32>,
        #[serde(default)]
        temperature: Option<f32>,
    },
}

impl AnalysisTask {
    /// Summarise with default length and temperature.
    pub fn summarize() -> Self {
        AnalysisTask::Summarize {
            max_tokens: None,
            temperature: None,
        }
    }

    /// Extract the default number of key points.
    pub fn key_points() -> Self {
        AnalysisTask::KeyPoints {
            num_points: None,
            max_tokens: None,
        }
    }

    /// Run `instruction` against the text with the default budget.
    pub fn custom_analysis(instruction: impl Into<String>) -> Self {
        AnalysisTask::CustomAnalysis {
            instruction: instruction.into(),
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn task(&self) -> Task {
        match self {
            AnalysisTask::Summarize { .. } => Task::Summarize,
            AnalysisTask::KeyPoints { .. } => Task::KeyPoints,
            AnalysisTask::CustomAnalysis { .. } => Task::CustomAnalysis,
        }
    }
}

/// One analysis call: the text and what to do with it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub text: String,
    pub task: AnalysisTask,
}

impl AnalysisRequest {
    pub fn new(text: impl Into<String>, task: AnalysisTask) -> Self {
        Self {
            text: text.into(),
            task,
        }
    }
}

/// The useful part of a successful result.
///
/// Serialises as a bare string (summary, analysis) or an array of strings
/// (key points).
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum AnalysisPayload {
    Summary(String),
    KeyPoints(Vec<String>),
    Analysis(String),
}

/// Facts about how a result was produced.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct AnalysisMetadata {
    /// Model id as reported by the backend, else the configured id.
    pub model: String,
    /// Summed over every attempt that reached the backend.
    pub tokens_used: TokenUsage,
    /// Finish reason of the last attempt that got a reply.
    pub finish_reason: Option<FinishReason>,
    /// Input text was shortened before it was sent.
    pub truncated: bool,
    /// Number of invocations made; 0 when validation failed.
    pub attempts: u32,
    pub duration_ms: u64,
}

/// The outcome of one analysis call.
///
/// Failures are values, not errors: `success == false`, `payload == None`
/// and `error` holds `"<Kind>: <message>"`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AnalysisResult {
    pub task: Task,
    pub payload: Option<AnalysisPayload>,
    pub metadata: AnalysisMetadata,
    pub success: bool,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl AnalysisResult {
    pub fn succeeded(task: Task, payload: AnalysisPayload, metadata: AnalysisMetadata) -> Self {
        Self {
            task,
            payload: Some(payload),
            metadata,
            success: true,
            error: None,
            error_kind: None,
        }
    }

    pub fn failed(task: Task, error: AnalysisError, metadata: AnalysisMetadata) -> Self {
        Self {
            task,
            payload: None,
            metadata,
            success: false,
            error_kind: Some(error.kind),
            error: Some(error.to_string()),
        }
    }

    /// Summary or analysis text; `None` for key points and failures.
    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            Some(AnalysisPayload::Summary(s)) | Some(AnalysisPayload::Analysis(s)) => Some(s),
            _ => None,
        }
    }

    pub fn key_points(&self) -> Option<&[String]> {
        match &self.payload {
            Some(AnalysisPayload::KeyPoints(points)) => Some(points),
            _ => None,
        }
    }

    /// Rebuild the categorised error of a failed result.
    pub fn analysis_error(&self) -> Option<AnalysisError> {
        if self.success {
            return None;
        }
        let kind = self.error_kind.unwrap_or(ErrorKind::Model);
        let rendered = self.error.as_deref().unwrap_or("unknown failure");
        let prefix = format!("{kind}: ");
        let message = rendered.strip_prefix(&prefix).unwrap_or(rendered);
        Some(AnalysisError::new(kind, message))
    }

    /// Convert to a `Result` for callers who prefer `?`.
    pub fn into_result(self) -> Result<AnalysisPayload, AnalysisError> {
        if let Some(err) = self.analysis_error() {
            return Err(err);
        }
        self.payload
            .ok_or_else(|| AnalysisError::model("successful result without payload"))
    }
}

/// What happened to one batch item.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    /// The analysis ran; the result itself may still be a failure.
    Analyzed { result: AnalysisResult },
    /// The document could not be turned into text.
    ConversionFailed { error: String },
    /// The batch was cancelled before this item started.
    Cancelled,
}

/// One entry of a [`BatchResult`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct BatchItem {
    /// Caller-supplied identifier (file name, row id, ...).
    pub source: String,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

impl BatchItem {
    pub fn is_success(&self) -> bool {
        matches!(&self.outcome, BatchOutcome::Analyzed { result } if result.success)
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match &self.outcome {
            BatchOutcome::Analyzed { result } => Some(result),
            _ => None,
        }
    }

    /// Human-readable failure description, if the item failed.
    pub fn error(&self) -> Option<String> {
        match &self.outcome {
            BatchOutcome::Analyzed { result } => result.error.clone(),
            BatchOutcome::ConversionFailed { error } => Some(error.clone()),
            BatchOutcome::Cancelled => Some("cancelled before start".into()),
        }
    }
}

/// Per-item outcomes in input order. Never partial: one entry per input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    pub items: Vec<BatchItem>,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BatchItem> {
        self.items.iter()
    }
}

impl Serialize for BatchResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("BatchResult", 2)?;
        s.serialize_field("results", &self.items)?;
        s.serialize_field("total", &self.items.len())?;
        s.end()
    }
}
