//! Checkpoints: serialized match views, taken every N sequences.
//!
//! A checkpoint captures everything needed to resume folding from its
//! sequence without replaying the match from sequence 1. Retraction
//! rewinds to the newest checkpoint strictly before the retracted event.

use crate::{
    projection::MatchView,
    types::{MatchId, Sequence},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub match_id: MatchId,
    pub sequence: Sequence,
    pub view: MatchView,
}

impl Checkpoint {
    pub fn of(view: &MatchView) -> Self {
        Self {
            match_id: view.scoreboard.match_id.clone(),
            sequence: view.last_sequence(),
            view: view.clone(),
        }
    }
}

pub fn is_due(sequence: Sequence, interval: u64) -> bool {
    interval > 0 && sequence > 0 && sequence % interval == 0
}
