//! Retry policy as a pure decision function.
//!
//! The processor loop asks [`RetryPolicy::decide`] after every failed
//! attempt and either sleeps for the returned delay or stops. Nothing here
//! sleeps or performs I/O, so every path is unit-testable.
//!
//! | Failure | Decision |
//! |---------|----------|
//! | auth | give up |
//! | transport | retry while total retries < `max_retries` |
//! | transient model error | retry while model retries < `max_model_retries` (and total < `max_retries`) |
//! | deterministic model error | give up |
//! | malformed output, `finish_reason == length` | give up |
//! | malformed output, otherwise | treated as a transient model error |

use crate::config::ProcessorConfig;
use crate::error::{AnalysisError, ModelClientError};
use crate::model::FinishReason;
use std::time::Duration;
use thiserror::Error;

/// Why one attempt failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AttemptError {
    /// The client call itself failed.
    #[error(transparent)]
    Client(ModelClientError),
    /// The call succeeded but the reply could not be used.
    #[error("malformed model output: {detail} (finish_reason={finish_reason})")]
    Malformed {
        detail: String,
        finish_reason: FinishReason,
    },
}

impl From<AttemptError> for AnalysisError {
    fn from(e: AttemptError) -> Self {
        match e {
            AttemptError::Client(inner) => inner.into(),
            AttemptError::Malformed {
                detail,
                finish_reason: FinishReason::Length,
            } => AnalysisError::model(format!(
                "malformed model output: {detail} (output hit the max_tokens limit; raise max_tokens)"
            )),
            AttemptError::Malformed { detail, .. } => {
                AnalysisError::model(format!("malformed model output: {detail}"))
            }
        }
    }
}

/// Counters carried across attempts of one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Attempts made so far, including the one that just failed.
    pub attempts: u32,
    pub transport_retries: u32,
    pub model_retries: u32,
}

impl RetryState {
    /// Retries taken so far, of any kind.
    pub fn retries(&self) -> u32 {
        self.transport_retries + self.model_retries
    }
}

/// Outcome of [`RetryPolicy::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    GiveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub max_model_retries: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ProcessorConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            max_model_retries: config.max_model_retries,
            backoff_base: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Delay before retry number `retry` (1-based): base × 2^(retry-1).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1u32 << exp)
    }

    /// Decide what to do after a failed attempt, updating `state` when the
    /// answer is a retry.
    pub fn decide(&self, error: &AttemptError, state: &mut RetryState) -> RetryDecision {
        let transient_model = match error {
            AttemptError::Client(ModelClientError::Auth(_)) => return RetryDecision::GiveUp,
            AttemptError::Client(ModelClientError::Transport(_)) => {
                if state.retries() >= self.max_retries {
                    return RetryDecision::GiveUp;
                }
                state.transport_retries += 1;
                return RetryDecision::Retry {
                    delay: self.backoff(state.retries()),
                };
            }
            AttemptError::Client(ModelClientError::Model { retryable, .. }) => *retryable,
            AttemptError::Malformed { finish_reason, .. } => *finish_reason != FinishReason::Length,
        };

        if !transient_model
            || state.model_retries >= self.max_model_retries
            || state.retries() >= self.max_retries
        {
            return RetryDecision::GiveUp;
        }
        state.model_retries += 1;
        RetryDecision::Retry {
            delay: self.backoff(state.retries()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            max_model_retries: 1,
            backoff_base: Duration::from_millis(100),
        }
    }

    fn transport() -> AttemptError {
        AttemptError::Client(ModelClientError::Transport("refused".into()))
    }

    fn model(retryable: bool) -> AttemptError {
        AttemptError::Client(ModelClientError::Model {
            detail: "HTTP 503".into(),
            retryable,
        })
    }

    #[test]
    fn backoff_doubles() {
        let p = policy();
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn auth_never_retries() {
        let mut state = RetryState::default();
        let err = AttemptError::Client(ModelClientError::Auth("401".into()));
        assert_eq!(policy().decide(&err, &mut state), RetryDecision::GiveUp);
        assert_eq!(state, RetryState::default());
    }

    #[test]
    fn transport_retries_up_to_bound() {
        let p = policy();
        let mut state = RetryState::default();
        assert_eq!(
            p.decide(&transport(), &mut state),
            RetryDecision::Retry {
                delay: Duration::from_millis(100)
            }
        );
        assert_eq!(
            p.decide(&transport(), &mut state),
            RetryDecision::Retry {
                delay: Duration::from_millis(200)
            }
        );
        assert_eq!(p.decide(&transport(), &mut state), RetryDecision::GiveUp);
        assert_eq!(state.transport_retries, 2);
    }

    #[test]
    fn transient_model_error_retries_once() {
        let p = policy();
        let mut state = RetryState::default();
        assert!(matches!(
            p.decide(&model(true), &mut state),
            RetryDecision::Retry { .. }
        ));
        assert_eq!(p.decide(&model(true), &mut state), RetryDecision::GiveUp);
    }

    #[test]
    fn deterministic_model_error_gives_up() {
        let mut state = RetryState::default();
        assert_eq!(policy().decide(&model(false), &mut state), RetryDecision::GiveUp);
    }

    #[test]
    fn malformed_output_retries_unless_length() {
        let p = policy();
        let mut state = RetryState::default();
        let cut_off = AttemptError::Malformed {
            detail: "no key points".into(),
            finish_reason: FinishReason::Length,
        };
        assert_eq!(p.decide(&cut_off, &mut state), RetryDecision::GiveUp);

        let garbled = AttemptError::Malformed {
            detail: "no key points".into(),
            finish_reason: FinishReason::Stop,
        };
        assert!(matches!(
            p.decide(&garbled, &mut state),
            RetryDecision::Retry { .. }
        ));
    }

    #[test]
    fn model_retry_respects_total_bound() {
        let p = RetryPolicy {
            max_retries: 1,
            max_model_retries: 1,
            backoff_base: Duration::ZERO,
        };
        let mut state = RetryState::default();
        assert!(matches!(
            p.decide(&transport(), &mut state),
            RetryDecision::Retry { .. }
        ));
        assert_eq!(p.decide(&model(true), &mut state), RetryDecision::GiveUp);
    }

    #[test]
    fn transport_retry_respects_total_bound() {
        let p = policy();
        let mut state = RetryState::default();
        assert!(matches!(
            p.decide(&transport(), &mut state),
            RetryDecision::Retry { .. }
        ));
        assert!(matches!(
            p.decide(&model(true), &mut state),
            RetryDecision::Retry { .. }
        ));
        assert_eq!(p.decide(&transport(), &mut state), RetryDecision::GiveUp);
        assert_eq!(state.retries(), 2);
        assert_eq!(state.transport_retries, 1);
    }

    #[test]
    fn zero_retries_configured() {
        let p = RetryPolicy {
            max_retries: 0,
            ..policy()
        };
        let mut state = RetryState::default();
        assert_eq!(p.decide(&transport(), &mut state), RetryDecision::GiveUp);
        assert_eq!(p.decide(&model(true), &mut state), RetryDecision::GiveUp);
    }

    #[test]
    fn length_malformed_message_suggests_raising_budget() {
        let err: AnalysisError = AttemptError::Malformed {
            detail: "no key points found".into(),
            finish_reason: FinishReason::Length,
        }
        .into();
        assert!(err.to_string().starts_with("ModelError:"));
        assert!(err.message.contains("max_tokens"));
    }
}
