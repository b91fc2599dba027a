//! PromptBuilder: task-specific invocations, no I/O.
//!
//! Every builder fences the (possibly truncated) document text and keeps
//! the caller's instruction in its own field of [`ModelInvocation`], so
//! document content can never rewrite the task directive.

use super::truncate::{truncate, Truncation};
use crate::config::{ProcessorConfig, TruncationStrategy};
use crate::model::ModelInvocation;
use crate::prompts::{
    fence_document, instruction_message, key_points_prompt, summary_directive,
    ANALYSIS_SYSTEM_PROMPT,
};

/// An invocation plus the record of what truncation did to its input.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltPrompt {
    pub invocation: ModelInvocation,
    pub truncation: Truncation,
}

/// Builds [`ModelInvocation`]s for the three analysis tasks.
///
/// Parameters are assumed validated by the caller; the builder only
/// shapes text.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    summary_prompt: String,
    max_input_chars: usize,
    strategy: TruncationStrategy,
    key_points_temperature: f32,
}

impl PromptBuilder {
    pub fn new(config: &ProcessorConfig) -> Self {
        Self {
            summary_prompt: config.summary_prompt().to_string(),
            max_input_chars: config.max_input_chars,
            strategy: config.truncation,
            key_points_temperature: config.key_points_temperature,
        }
    }

    /// Concise, faithful summary bounded by `max_tokens`.
    pub fn build_summarize(&self, text: &str, max_tokens: u32, temperature: f32) -> BuiltPrompt {
        let (content, truncation) = self.prepare(text);
        BuiltPrompt {
            invocation: ModelInvocation {
                system_prompt: format!("{}{}", self.summary_prompt, summary_directive(max_tokens)),
                instruction: None,
                user_content: content,
                max_tokens,
                temperature,
            },
            truncation,
        }
    }

    /// Exactly `num_points` distinct single-sentence points, one per line,
    /// sampled at the configured key-point temperature.
    pub fn build_key_points(&self, text: &str, num_points: u32, max_tokens: u32) -> BuiltPrompt {
        let (content, truncation) = self.prepare(text);
        BuiltPrompt {
            invocation: ModelInvocation {
                system_prompt: key_points_prompt(num_points),
                instruction: None,
                user_content: content,
                max_tokens,
                temperature: self.key_points_temperature,
            },
            truncation,
        }
    }

    /// Free-form analysis following `instruction` verbatim.
    pub fn build_custom_analysis(
        &self,
        text: &str,
        instruction: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> BuiltPrompt {
        let (content, truncation) = self.prepare(text);
        BuiltPrompt {
            invocation: ModelInvocation {
                system_prompt: ANALYSIS_SYSTEM_PROMPT.to_string(),
                instruction: Some(instruction_message(instruction)),
                user_content: content,
                max_tokens,
                temperature,
            },
            truncation,
        }
    }

    fn prepare(&self, text: &str) -> (String, Truncation) {
        let (kept, truncation) = truncate(text, self.max_input_chars, self.strategy);
        (fence_document(&kept), truncation)
    }
}
