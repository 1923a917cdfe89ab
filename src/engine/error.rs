//! Engine error taxonomy.

use thiserror::Error;

use super::types::{SetKind, Stage};

/// Errors raised by stage operations. None of them mutate state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Addition beyond a stage cap. The toggle is a no-op.
    #[error("{kind} set is full ({cap} items)")]
    CapacityExceeded { kind: SetKind, cap: usize },

    /// Advance attempted without the exact required count.
    #[error("select {shortfall} more ({selected}/{required} in {kind} set)")]
    IncompleteSelection {
        kind: SetKind,
        required: usize,
        selected: usize,
        shortfall: usize,
    },

    /// `record_choice` called with a winner that is not one of the compared items,
    /// or with an item compared against itself.
    #[error("invalid winner '{winner}' for pair ('{item_a}', '{item_b}')")]
    InvalidWinner {
        item_a: String,
        item_b: String,
        winner: String,
    },

    /// Scoring attempted before every pair has a winner.
    #[error("{remaining} of {required} comparisons remaining")]
    IncompleteComparisons {
        recorded: usize,
        required: usize,
        remaining: usize,
    },

    /// Item outside the candidate domain of the stage.
    #[error("'{item}' is not a candidate for the {kind} set")]
    UnknownItem { kind: SetKind, item: String },

    /// Operation not allowed in the current stage.
    #[error("cannot {action} while {stage}")]
    InvalidTransition { stage: Stage, action: &'static str },
}

impl EngineError {
    /// Whether the caller should surface the error to the user and carry on.
    /// `InvalidWinner` and `InvalidTransition` indicate an integration bug.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::CapacityExceeded { .. }
                | Self::IncompleteSelection { .. }
                | Self::IncompleteComparisons { .. }
                | Self::UnknownItem { .. }
        )
    }
}
