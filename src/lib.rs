//! # edgequake-textproc
//!
//! Summarise, extract key points from, and run custom analyses over
//! converted documents with a language model.
//!
//! ## Why this crate?
//!
//! Converted documents are arbitrarily long and small local models are
//! easily confused. This crate sits between the two: it bounds the input
//! deterministically, builds task-specific prompts, retries only the
//! failures worth retrying, parses the reply strictly, and reports every
//! outcome in one stable shape, whether it is a single call or a batch of
//! hundreds.
//!
//! ## Pipeline Overview
//!
//! ```text
//! text
//!  │
//!  ├─ 1. Validate  empty text, bad token/point counts, missing instruction
//!  ├─ 2. Truncate  keep head (and tail) of oversized input, record it
//!  ├─ 3. Prompt    task-specific system prompt, fenced document
//!  ├─ 4. Invoke    one request per attempt; retry policy decides the rest
//!  ├─ 5. Parse     strip fences, trim, parse "N. point" lines
//!  └─ 6. Result    AnalysisResult { payload, metadata, success, error }
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_textproc::{ProcessorConfig, TextProcessor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // MODEL_RUNNER_URL / TEXTPROC_MODEL / OPENAI_API_KEY, with local defaults
//!     let config = ProcessorConfig::from_env()?;
//!     let processor = TextProcessor::from_config(config)?;
//!
//!     let result = processor
//!         .extract_key_points("Rust is fast. Rust is safe. Rust is fun.", Some(3))
//!         .await;
//!     match result.key_points() {
//!         Some(points) => points.iter().for_each(|p| println!("- {p}")),
//!         None => eprintln!("{}", result.error.as_deref().unwrap_or("")),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `textproc` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-textproc = { version = "0.1", default-features = false }
//! ```
//!
//! ## Backends
//!
//! | Backend | Selected by | Notes |
//! |---------|-------------|-------|
//! | OpenAI-compatible | default | Docker Model Runner, vLLM, LiteLLM, OpenAI; `MODEL_RUNNER_URL` |
//! | edgequake-llm provider | `EDGEQUAKE_LLM_PROVIDER=anthropic` etc. | Credentials from the provider's usual env vars |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod processor;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{BatchCancel, BatchCoordinator, BatchStream};
pub use config::{Backend, ProcessorConfig, ProcessorConfigBuilder, TruncationStrategy};
pub use convert::{ConvertedDocument, DocumentConverter, MarkupConverter, TextFormat};
pub use error::{AnalysisError, ConversionError, ErrorKind, ModelClientError, TextProcError};
pub use model::{FinishReason, ModelClient, ModelInvocation, ModelResponse, TokenUsage};
pub use output::{
    AnalysisMetadata, AnalysisPayload, AnalysisRequest, AnalysisResult, AnalysisTask, BatchItem,
    BatchOutcome, BatchResult, Task,
};
pub use processor::{quick_summarize, TextProcessor};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
