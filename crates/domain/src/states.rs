//! Indexer run state machine and progress events.

use code_index_shared::{ErrorCode, ErrorEnvelope};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one indexing run.
///
/// ```text
/// Idle -> Scanning -> Processing -> Completed
///            |            |
///            +------------+-------> Failed
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexerState {
    /// Nothing started yet.
    #[default]
    Idle,
    /// Enumerating files.
    Scanning,
    /// Chunking, embedding and writing.
    Processing,
    /// Every batch was acknowledged.
    Completed,
    /// Aborted by a run-fatal error or cancellation.
    Failed,
}

impl IndexerState {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Returns true for `Completed` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true when `next` is a legal successor of `self`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Scanning)
                | (Self::Scanning, Self::Processing)
                | (Self::Scanning | Self::Processing, Self::Failed)
                | (Self::Processing, Self::Completed)
        )
    }

    /// Move to `next`, rejecting illegal transitions as invariant errors.
    pub fn transition(self, next: Self) -> Result<Self, ErrorEnvelope> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ErrorEnvelope::invariant(
                ErrorCode::new("index", "invalid_state_transition"),
                format!("cannot move indexer from {self} to {next}"),
            )
            .with_metadata("from", self.as_str())
            .with_metadata("to", next.as_str()))
        }
    }
}

impl fmt::Display for IndexerState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Progress events emitted while a run advances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// The run moved to a new state.
    State {
        /// New state.
        state: IndexerState,
    },
    /// A file finished processing.
    FileIndexed {
        /// Files finished so far.
        files_done: u64,
        /// Blocks embedded and written so far.
        blocks_written: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions_are_allowed() -> Result<(), ErrorEnvelope> {
        let state = IndexerState::Idle
            .transition(IndexerState::Scanning)?
            .transition(IndexerState::Processing)?
            .transition(IndexerState::Completed)?;
        assert!(state.is_terminal());
        Ok(())
    }

    #[test]
    fn failure_is_reachable_from_active_states_only() {
        assert!(IndexerState::Scanning.can_transition_to(IndexerState::Failed));
        assert!(IndexerState::Processing.can_transition_to(IndexerState::Failed));
        assert!(!IndexerState::Idle.can_transition_to(IndexerState::Failed));
        assert!(!IndexerState::Completed.can_transition_to(IndexerState::Failed));
    }

    #[test]
    fn illegal_transition_is_an_invariant_error() {
        let error = IndexerState::Idle.transition(IndexerState::Completed).err();
        assert_eq!(
            error.map(|e| (e.kind, e.code.code().to_owned())),
            Some((
                code_index_shared::ErrorKind::Invariant,
                "invalid_state_transition".to_owned()
            ))
        );
    }

    #[test]
    fn progress_event_serialization_shape() -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(ProgressEvent::State {
            state: IndexerState::Processing,
        })?;
        assert_eq!(value, serde_json::json!({"type": "state", "state": "processing"}));
        Ok(())
    }
}
