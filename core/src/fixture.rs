//! Match reference data: which format, which two sides, who is in them.
//!
//! Player and team records themselves live outside this core. A fixture
//! only pins the ids the ledger is allowed to mention.

use crate::{
    config::MatchFormat,
    types::{InningsNo, MatchId, PlayerId, TeamId},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamSheet {
    pub team_id: TeamId,
    pub players: Vec<PlayerId>,
}

impl TeamSheet {
    pub fn contains(&self, player: &str) -> bool {
        self.players.iter().any(|p| p == player)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchFixture {
    pub match_id: MatchId,
    pub format_id: String,
    /// `sides[0]` bats first. The toss is settled before registration.
    pub sides: [TeamSheet; 2],
}

impl MatchFixture {
    pub fn batting(&self, innings: InningsNo) -> &TeamSheet {
        &self.sides[MatchFormat::batting_side(innings)]
    }

    pub fn bowling(&self, innings: InningsNo) -> &TeamSheet {
        &self.sides[1 - MatchFormat::batting_side(innings)]
    }

    pub fn check(&self, format: &MatchFormat) -> Result<(), String> {
        if self.match_id.trim().is_empty() {
            return Err("match id is empty".into());
        }
        if self.format_id != format.format_id {
            return Err(format!(
                "fixture format {} does not match {}",
                self.format_id, format.format_id
            ));
        }
        if self.sides[0].team_id == self.sides[1].team_id {
            return Err("a team cannot play itself".into());
        }
        let mut seen = HashSet::new();
        for side in &self.sides {
            if side.players.len() != format.team_size as usize {
                return Err(format!(
                    "{} named {} players; {} requires {}",
                    side.team_id,
                    side.players.len(),
                    format.format_id,
                    format.team_size
                ));
            }
            for p in &side.players {
                if !seen.insert(p.as_str()) {
                    return Err(format!("player {p} is listed twice"));
                }
            }
        }
        Ok(())
    }
}
