//! Per-call stages between a validated request and a typed result.
//!
//! Each submodule implements exactly one step and has no network access,
//! which keeps them independently testable.
//!
//! ## Data Flow
//!
//! ```text
//! text ──▶ truncate ──▶ prompt ──▶ ModelClient ──▶ parse
//!           (budget)    (invocation)  (1 call)     (payload)
//!                                        ▲   │
//!                                        └ retry ┘
//! ```
//!
//! 1. [`truncate`] — cut oversized text deterministically
//! 2. [`prompt`]   — build the task-specific [`crate::model::ModelInvocation`]
//! 3. [`retry`]    — decide whether a failed attempt is retried, and when
//! 4. [`parse`]    — normalise the raw reply into summary text or key points

pub mod parse;
pub mod prompt;
pub mod retry;
pub mod truncate;
