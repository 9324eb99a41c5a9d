//! Subtask error model and the run-loop error policy.

use serde::{Deserialize, Serialize};
use tributary_state::StateError;

// ---------------------------------------------------------------------------
// SubtaskError
// ---------------------------------------------------------------------------

/// Categorised subtask failure.
///
/// `Fetch` and `Process` wrap the opaque errors raised by stream code.
/// `State` wraps checkpoint and run-record failures from the store.
#[derive(Debug, thiserror::Error)]
pub enum SubtaskError {
    /// The fetch sequence failed to start or yielded an error.
    #[error("fetch failed: {0:#}")]
    Fetch(anyhow::Error),

    /// Applying one fetched item failed.
    #[error("process failed at item {index}: {error:#}")]
    Process { index: u64, error: anyhow::Error },

    /// Removing previous output before a full refresh failed.
    #[error("delete before full refresh failed: {0:#}")]
    Delete(anyhow::Error),

    /// Checkpoint store failure.
    #[error("state store: {0}")]
    State(#[from] StateError),

    /// No stream with this name is registered.
    #[error("unknown stream '{0}'")]
    UnknownStream(String),

    /// Run options the run-loop cannot honour.
    #[error("invalid run options: {0}")]
    InvalidOptions(String),
}

impl SubtaskError {
    /// Index of the item that failed to process, if this is a process error.
    #[must_use]
    pub fn failed_index(&self) -> Option<u64> {
        match self {
            Self::Process { index, .. } => Some(*index),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ErrorPolicy
// ---------------------------------------------------------------------------

/// What the run-loop does with an error that interrupts the fetch sequence.
///
/// Both policies finalize the run with the last tracked state and record the
/// error message on the run. They differ only in what the caller sees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Log the error and end the run as if the sequence were exhausted.
    #[default]
    LogAndFinalize,
    /// Additionally yield the error to the caller once.
    Abort,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_keeps_error_chain() {
        let inner = anyhow::anyhow!("socket closed").context("GET /issues");
        let err = SubtaskError::Fetch(inner);
        let msg = err.to_string();
        assert!(msg.contains("GET /issues"), "got: {msg}");
        assert!(msg.contains("socket closed"), "got: {msg}");
    }

    #[test]
    fn process_error_reports_index() {
        let err = SubtaskError::Process {
            index: 7,
            error: anyhow::anyhow!("bad payload"),
        };
        assert_eq!(err.failed_index(), Some(7));
        assert_eq!(err.to_string(), "process failed at item 7: bad payload");
    }

    #[test]
    fn state_error_converts() {
        let err: SubtaskError = StateError::UnknownRun(3).into();
        assert!(matches!(err, SubtaskError::State(StateError::UnknownRun(3))));
        assert!(err.failed_index().is_none());
    }

    #[test]
    fn error_policy_defaults_to_log_and_finalize() {
        assert_eq!(ErrorPolicy::default(), ErrorPolicy::LogAndFinalize);
        let parsed: ErrorPolicy = serde_json::from_str("\"abort\"").unwrap();
        assert_eq!(parsed, ErrorPolicy::Abort);
    }
}
