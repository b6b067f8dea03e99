//! Match view: every cache derived from one match's ledger.
//!
//! A view is the scoreboard and the figure book folded to the same
//! sequence. It can always be thrown away and rebuilt by `replay`.

use crate::{
    config::MatchFormat,
    error::ScoreResult,
    event::BallEvent,
    figures::FigureBook,
    fixture::MatchFixture,
    innings::Scoreboard,
    types::{PlayerId, Sequence},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchView {
    pub scoreboard: Scoreboard,
    pub figures: FigureBook,
}

impl MatchView {
    pub fn new(fixture: &MatchFixture, format: &MatchFormat) -> Self {
        Self {
            scoreboard: Scoreboard::new(fixture, format),
            figures: FigureBook::new(format.balls_per_over),
        }
    }

    pub fn last_sequence(&self) -> Sequence {
        self.scoreboard.last_sequence
    }

    /// Apply one event to both caches. The figure book only sees events
    /// the scoreboard accepted.
    pub fn fold(&mut self, event: &BallEvent) -> ScoreResult<BTreeSet<PlayerId>> {
        self.scoreboard.apply(event)?;
        Ok(self.figures.apply(event))
    }

    pub fn skip(&mut self, sequence: Sequence) -> ScoreResult<()> {
        self.scoreboard.skip(sequence)
    }

    /// Fold `events` in order, skipping retracted sequences. `on_event`
    /// runs after each event and may stop the replay by returning an error.
    pub fn replay<I, F>(
        &mut self,
        events: I,
        retracted: &HashSet<Sequence>,
        mut on_event: F,
    ) -> ScoreResult<()>
    where
        I: IntoIterator<Item = ScoreResult<BallEvent>>,
        F: FnMut(&MatchView) -> ScoreResult<()>,
    {
        for event in events {
            let event = event?;
            if retracted.contains(&event.sequence) {
                self.skip(event.sequence)?;
            } else {
                self.fold(&event)?;
            }
            on_event(self)?;
        }
        Ok(())
    }
}
