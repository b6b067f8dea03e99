use crate::types::{InningsNo, Sequence};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoreError {
    /// Duplicate or competing submission. Refetch state and retry.
    #[error("Conflict on match '{match_id}': {reason} (last committed sequence {last_good_sequence})")]
    Conflict {
        match_id: String,
        reason: ConflictReason,
        last_good_sequence: Sequence,
    },

    /// The event does not directly follow the last applied one.
    #[error("Out of order: expected sequence {expected}, got {actual}")]
    OutOfOrder {
        expected: Sequence,
        actual: Sequence,
    },

    /// Malformed or impossible event. Nothing was appended or applied.
    #[error("Invalid event for match '{match_id}' innings {innings}: {reason} (resume from sequence {last_good_sequence})")]
    Validation {
        match_id: String,
        innings: InningsNo,
        reason: String,
        last_good_sequence: Sequence,
    },

    /// Derived figures disagree with the innings total. Needs operator review.
    #[error("Reconciliation failed for match '{match_id}' at sequence {sequence}: {detail}")]
    Reconciliation {
        match_id: String,
        sequence: Sequence,
        detail: String,
    },

    /// A durability or replay bound was exceeded. No partial state is visible.
    #[error("Timed out during {operation} after {elapsed_ms}ms; safe to retry")]
    Timeout {
        operation: &'static str,
        elapsed_ms: u64,
    },

    #[error("Replay cancelled at sequence {at}")]
    Cancelled { at: Sequence },

    /// Rejected reference data: a fixture or a fantasy team.
    #[error("Invalid {what} '{id}': {reason}")]
    InvalidSetup {
        what: &'static str,
        id: String,
        reason: String,
    },

    #[error("{what} '{id}' not found")]
    NotFound { what: &'static str, id: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    /// The idempotency key was already committed at `sequence`.
    DuplicateKey { sequence: Sequence },
    /// Another writer committed the slot the caller expected to fill.
    StaleSequence { expected: Sequence },
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateKey { sequence } => {
                write!(f, "idempotency key already committed at sequence {sequence}")
            }
            Self::StaleSequence { expected } => {
                write!(f, "submission expected last sequence {expected}")
            }
        }
    }
}

impl ScoreError {
    pub fn validation(
        match_id: &str,
        innings: InningsNo,
        last_good_sequence: Sequence,
        reason: impl Into<String>,
    ) -> Self {
        Self::Validation {
            match_id: match_id.to_string(),
            innings,
            reason: reason.into(),
            last_good_sequence,
        }
    }

    /// The sequence an operator should resume from, when the error knows it.
    pub fn last_good_sequence(&self) -> Option<Sequence> {
        match self {
            Self::Conflict { last_good_sequence, .. }
            | Self::Validation { last_good_sequence, .. } => Some(*last_good_sequence),
            Self::OutOfOrder { expected, .. } => Some(expected.saturating_sub(1)),
            Self::Reconciliation { sequence, .. } => Some(*sequence),
            Self::Cancelled { at } => Some(*at),
            _ => None,
        }
    }

    /// Conflicts and timeouts leave no partial state and may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Timeout { .. })
    }
}

pub type ScoreResult<T> = Result<T, ScoreError>;
