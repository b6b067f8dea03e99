use crate::{
    event::EventKind,
    types::{InningsNo, MatchId, Sequence},
};
use serde::{Deserialize, Serialize};

/// All operator-issued scoring commands.
/// Variants are added over time, never removed or reordered.
///
/// `expected_last_sequence` is the match sequence the operator's screen
/// was showing. Omit it to accept whatever the service has committed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ScoringCommand {
    // ── Deliveries ────────────────────────────────
    SubmitBall {
        match_id: MatchId,
        innings: InningsNo,
        event: EventKind,
        idempotency_key: String,
        #[serde(default)]
        expected_last_sequence: Option<Sequence>,
    },

    // ── Corrections ───────────────────────────────
    Retract {
        match_id: MatchId,
        retracts: Sequence,
        reason: String,
        idempotency_key: String,
        #[serde(default)]
        expected_last_sequence: Option<Sequence>,
    },

    // ── Innings lifecycle ─────────────────────────
    Suspend {
        match_id: MatchId,
        innings: InningsNo,
        reason: String,
        idempotency_key: String,
        #[serde(default)]
        expected_last_sequence: Option<Sequence>,
    },
    Resume {
        match_id: MatchId,
        innings: InningsNo,
        idempotency_key: String,
        #[serde(default)]
        expected_last_sequence: Option<Sequence>,
    },
    Declare {
        match_id: MatchId,
        innings: InningsNo,
        idempotency_key: String,
        #[serde(default)]
        expected_last_sequence: Option<Sequence>,
    },
}

impl ScoringCommand {
    pub fn match_id(&self) -> &str {
        match self {
            Self::SubmitBall { match_id, .. }
            | Self::Retract { match_id, .. }
            | Self::Suspend { match_id, .. }
            | Self::Resume { match_id, .. }
            | Self::Declare { match_id, .. } => match_id,
        }
    }

    /// Stable name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SubmitBall { .. } => "submit_ball",
            Self::Retract { .. }    => "retract",
            Self::Suspend { .. }    => "suspend",
            Self::Resume { .. }     => "resume",
            Self::Declare { .. }    => "declare",
        }
    }
}
