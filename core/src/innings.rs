//! Innings state machine.
//!
//! An innings moves NOT_STARTED → IN_PROGRESS → COMPLETED, and may sit in
//! SUSPENDED between two IN_PROGRESS spells. Its state is a pure fold of
//! the committed ledger; `Scoreboard::apply` is the only mutator and it
//! refuses anything but the next sequence.
//!
//! Validation (`Scoreboard::validate`) runs before an event is appended.
//! Folding trusts committed events, so a rebuild after a retraction never
//! fails on facts that were valid when they were recorded.

use crate::{
    config::{MatchFormat, StrikePolicy},
    error::{ScoreError, ScoreResult},
    event::{BallEvent, Delivery, EventKind, Extra, ExtraKind},
    fixture::{MatchFixture, TeamSheet},
    types::{InningsNo, MatchId, PlayerId, Sequence, TeamId},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InningsStatus {
    NotStarted,
    InProgress,
    Suspended,
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    AllOut,
    OversExhausted,
    TargetReached,
    Declared,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Extras {
    pub wides: u32,
    pub no_balls: u32,
    pub byes: u32,
    pub leg_byes: u32,
    pub penalties: u32,
}

impl Extras {
    pub fn total(&self) -> u32 {
        self.wides + self.no_balls + self.byes + self.leg_byes + self.penalties
    }

    pub(crate) fn record(&mut self, extra: &Extra) {
        let amount = extra.amount as u32;
        match extra.kind {
            ExtraKind::Wide    => self.wides += amount,
            ExtraKind::NoBall  => self.no_balls += amount,
            ExtraKind::Bye     => self.byes += amount,
            ExtraKind::LegBye  => self.leg_byes += amount,
            ExtraKind::Penalty => self.penalties += amount,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InningsState {
    pub innings: InningsNo,
    pub batting_team: TeamId,
    pub bowling_team: TeamId,
    pub status: InningsStatus,
    pub completion: Option<Completion>,
    pub total_runs: u32,
    pub wickets: u8,
    pub legal_balls: u32,
    pub extras: Extras,
    /// `None` while a new batter is on the way in.
    pub striker: Option<PlayerId>,
    pub non_striker: Option<PlayerId>,
    /// Bowler of the over in progress; `None` between overs.
    pub bowler: Option<PlayerId>,
    pub powerplay: bool,
    /// Runs needed to win, final innings only.
    pub target: Option<u32>,
    pub last_applied_sequence: Sequence,
    pub balls_per_over: u8,
    pub ball_limit: Option<u32>,
    /// Deliveries bowled in the current over, wides and no-balls included.
    pub deliveries_this_over: u8,
    pub previous_over_bowler: Option<PlayerId>,
    pub overs_by_bowler: BTreeMap<PlayerId, u16>,
    pub dismissed: Vec<PlayerId>,
}

impl InningsState {
    pub fn new(innings: InningsNo, fixture: &MatchFixture, format: &MatchFormat) -> Self {
        Self {
            innings,
            batting_team: fixture.batting(innings).team_id.clone(),
            bowling_team: fixture.bowling(innings).team_id.clone(),
            status: InningsStatus::NotStarted,
            completion: None,
            total_runs: 0,
            wickets: 0,
            legal_balls: 0,
            extras: Extras::default(),
            striker: None,
            non_striker: None,
            bowler: None,
            powerplay: format.is_powerplay_over(1),
            target: None,
            last_applied_sequence: 0,
            balls_per_over: format.balls_per_over,
            ball_limit: format.max_legal_balls(),
            deliveries_this_over: 0,
            previous_over_bowler: None,
            overs_by_bowler: BTreeMap::new(),
            dismissed: Vec::new(),
        }
    }

    /// 1-based number of the over the next legal ball belongs to.
    pub fn current_over(&self) -> u16 {
        (self.legal_balls / self.balls_per_over as u32) as u16 + 1
    }

    /// Conventional "overs.balls" notation, e.g. "12.3".
    pub fn overs(&self) -> String {
        let bpo = self.balls_per_over as u32;
        format!("{}.{}", self.legal_balls / bpo, self.legal_balls % bpo)
    }

    pub fn run_rate(&self) -> Option<f64> {
        if self.legal_balls == 0 {
            return None;
        }
        Some(self.total_runs as f64 * self.balls_per_over as f64 / self.legal_balls as f64)
    }

    pub fn balls_remaining(&self) -> Option<u32> {
        self.ball_limit.map(|limit| limit.saturating_sub(self.legal_balls))
    }

    pub fn runs_required(&self) -> Option<u32> {
        self.target.map(|t| t.saturating_sub(self.total_runs))
    }

    pub fn required_run_rate(&self) -> Option<f64> {
        let runs = self.runs_required()?;
        let balls = self.balls_remaining()?;
        if balls == 0 {
            return None;
        }
        Some(runs as f64 * self.balls_per_over as f64 / balls as f64)
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, InningsStatus::InProgress | InningsStatus::Suspended)
    }

    fn swap_ends(&mut self) {
        std::mem::swap(&mut self.striker, &mut self.non_striker);
    }

    fn fold_delivery(&mut self, d: &Delivery, format: &MatchFormat) {
        if self.status == InningsStatus::NotStarted {
            self.status = InningsStatus::InProgress;
        }

        // The recorded batters are the facts; rotation below predicts the next ball.
        self.striker = Some(d.striker.clone());
        self.non_striker = Some(d.non_striker.clone());
        self.bowler = Some(d.bowler.clone());

        self.total_runs += d.total_runs();
        if let Some(extra) = &d.extra {
            self.extras.record(extra);
        }
        self.deliveries_this_over = self.deliveries_this_over.saturating_add(1);

        let legal = d.is_legal();
        if legal {
            self.legal_balls += 1;
        }

        if d.completed_runs(format) % 2 == 1 {
            self.swap_ends();
        }

        if let Some(w) = &d.wicket {
            self.wickets += 1;
            self.dismissed.push(w.dismissed.clone());
            if self.striker.as_deref() == Some(w.dismissed.as_str()) {
                self.striker = None;
            } else if self.non_striker.as_deref() == Some(w.dismissed.as_str()) {
                self.non_striker = None;
            }
            if format.strike_policy == StrikePolicy::NewBatterOnStrike && self.non_striker.is_none() {
                self.non_striker = self.striker.take();
            }
        }

        if legal && self.legal_balls % self.balls_per_over as u32 == 0 {
            self.swap_ends();
            if let Some(bowler) = self.bowler.take() {
                *self.overs_by_bowler.entry(bowler.clone()).or_insert(0) += 1;
                self.previous_over_bowler = Some(bowler);
            }
            self.deliveries_this_over = 0;
        }

        self.check_completion(format);
    }

    fn check_completion(&mut self, format: &MatchFormat) {
        let completion = if self.target.is_some_and(|t| self.total_runs >= t) {
            Some(Completion::TargetReached)
        } else if self.wickets >= format.all_out_wickets() {
            Some(Completion::AllOut)
        } else if self.ball_limit.is_some_and(|limit| self.legal_balls >= limit) {
            Some(Completion::OversExhausted)
        } else {
            None
        };
        if let Some(c) = completion {
            self.complete(c);
        } else {
            self.powerplay = format.is_powerplay_over(self.current_over());
        }
    }

    fn complete(&mut self, completion: Completion) {
        self.status = InningsStatus::Completed;
        self.completion = Some(completion);
        self.bowler = None;
        self.powerplay = false;
    }
}

/// Every innings of one match plus the match-wide sequence cursor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scoreboard {
    pub match_id: MatchId,
    pub format: MatchFormat,
    pub fixture: MatchFixture,
    pub innings: Vec<InningsState>,
    pub last_sequence: Sequence,
}

impl Scoreboard {
    pub fn new(fixture: &MatchFixture, format: &MatchFormat) -> Self {
        let innings = (1..=format.total_innings())
            .map(|n| InningsState::new(n, fixture, format))
            .collect();
        Self {
            match_id: fixture.match_id.clone(),
            format: format.clone(),
            fixture: fixture.clone(),
            innings,
            last_sequence: 0,
        }
    }

    pub fn innings(&self, innings: InningsNo) -> Option<&InningsState> {
        innings
            .checked_sub(1)
            .and_then(|i| self.innings.get(i as usize))
    }

    /// The latest innings that has started, or 1 before the first ball.
    pub fn current_innings(&self) -> InningsNo {
        self.innings
            .iter()
            .rposition(|s| s.status != InningsStatus::NotStarted)
            .map_or(1, |i| i as InningsNo + 1)
    }

    pub fn is_finished(&self) -> bool {
        self.innings.iter().all(|s| s.status == InningsStatus::Completed)
            || self
                .innings
                .last()
                .is_some_and(|s| s.completion == Some(Completion::TargetReached))
            || self.won_by_an_innings()
    }

    /// The side due to bat last already leads, so the final innings is never played.
    fn won_by_an_innings(&self) -> bool {
        let total = self.format.total_innings();
        if total < 2 {
            return false;
        }
        let (Some(last), Some(previous)) = (self.innings(total), self.innings(total - 1)) else {
            return false;
        };
        last.status == InningsStatus::NotStarted
            && previous.status == InningsStatus::Completed
            && self.target_for(total) == Some(0)
    }

    /// Runs needed by the side batting in `innings`, if it is the last one.
    fn target_for(&self, innings: InningsNo) -> Option<u32> {
        if innings != self.format.total_innings() {
            return None;
        }
        let side = MatchFormat::batting_side(innings);
        let (own, other) = self
            .innings
            .iter()
            .filter(|s| s.innings < innings)
            .fold((0u32, 0u32), |(own, other), s| {
                if MatchFormat::batting_side(s.innings) == side {
                    (own + s.total_runs, other)
                } else {
                    (own, other + s.total_runs)
                }
            });
        Some((other + 1).saturating_sub(own))
    }

    /// State checks for an event about to be appended to `innings`.
    pub fn validate(
        &self,
        innings: InningsNo,
        kind: &EventKind,
        max_deliveries_per_over: u8,
    ) -> Result<(), String> {
        let total = self.format.total_innings();
        let state = self
            .innings(innings)
            .ok_or_else(|| format!("{} has {total} innings, not {innings}", self.format.format_id))?;

        let current = self.current_innings();
        if innings < current {
            return Err(format!("innings {innings} is closed; play is in innings {current}"));
        }
        if innings > 1 {
            let previous = &self.innings[innings as usize - 2];
            if previous.status != InningsStatus::Completed {
                return Err(format!("innings {} has not finished", innings - 1));
            }
        }

        kind.check_shape(&self.format, max_deliveries_per_over)?;

        match kind {
            EventKind::Run(d) | EventKind::Extra(d) | EventKind::Wicket(d) => {
                if self.won_by_an_innings() {
                    return Err("the match is decided; the final innings is not played".into());
                }
                self.validate_delivery(state, d)
            }
            EventKind::Suspended { .. } => match state.status {
                InningsStatus::InProgress => Ok(()),
                other => Err(format!("cannot suspend an innings that is {other:?}")),
            },
            EventKind::Resumed => match state.status {
                InningsStatus::Suspended => Ok(()),
                other => Err(format!("cannot resume an innings that is {other:?}")),
            },
            EventKind::Declared => {
                if !self.format.allows_declaration() {
                    return Err(format!("{} does not allow declarations", self.format.format_id));
                }
                match state.status {
                    InningsStatus::InProgress => Ok(()),
                    other => Err(format!("cannot declare an innings that is {other:?}")),
                }
            }
            EventKind::Retraction { .. } => Err("retractions are submitted through retract".into()),
        }
    }

    fn validate_delivery(&self, state: &InningsState, d: &Delivery) -> Result<(), String> {
        match state.status {
            InningsStatus::Completed => return Err(format!("innings {} is complete", state.innings)),
            InningsStatus::Suspended => {
                return Err(format!("innings {} is suspended; resume first", state.innings))
            }
            InningsStatus::NotStarted | InningsStatus::InProgress => {}
        }

        let over = state.current_over();
        if d.over != over {
            return Err(format!("expected over {over}, got {}", d.over));
        }
        let ball = state.deliveries_this_over as u16 + 1;
        if d.ball as u16 != ball {
            return Err(format!("expected ball {over}.{ball}, got {}.{}", d.over, d.ball));
        }

        let batting = self.fixture.batting(state.innings);
        let bowling = self.fixture.bowling(state.innings);
        check_batter(state, batting, state.striker.as_deref(), &d.striker, "striker")?;
        check_batter(state, batting, state.non_striker.as_deref(), &d.non_striker, "non-striker")?;

        if !bowling.contains(&d.bowler) {
            return Err(format!("{} is not in {}", d.bowler, bowling.team_id));
        }
        if state.previous_over_bowler.as_deref() == Some(d.bowler.as_str()) {
            return Err(format!("{} bowled the previous over", d.bowler));
        }
        let taking_over = state.bowler.as_deref() != Some(d.bowler.as_str());
        if let (true, Some(max)) = (taking_over, self.format.max_overs_per_bowler) {
            let bowled = state.overs_by_bowler.get(&d.bowler).copied().unwrap_or(0);
            if bowled >= max {
                return Err(format!("{} has bowled the maximum {max} overs", d.bowler));
            }
        }

        if let Some(w) = &d.wicket {
            if let Some(f) = w.fielders.iter().find(|f| !bowling.contains(f)) {
                return Err(format!("fielder {f} is not in {}", bowling.team_id));
            }
        }
        Ok(())
    }

    /// Fold the next committed event. Fails unless `event.sequence` directly
    /// follows the last applied one.
    pub fn apply(&mut self, event: &BallEvent) -> ScoreResult<&InningsState> {
        let expected = self.last_sequence + 1;
        if event.sequence != expected {
            return Err(ScoreError::OutOfOrder { expected, actual: event.sequence });
        }
        if event.match_id != self.match_id {
            return Err(ScoreError::validation(
                &self.match_id,
                event.innings,
                self.last_sequence,
                format!("event belongs to match {}", event.match_id),
            ));
        }
        let idx = match self.innings(event.innings) {
            Some(_) => event.innings as usize - 1,
            None => {
                return Err(ScoreError::validation(
                    &self.match_id,
                    event.innings,
                    self.last_sequence,
                    "innings out of range",
                ))
            }
        };

        if self.innings[idx].status == InningsStatus::NotStarted && event.delivery().is_some() {
            let target = self.target_for(event.innings);
            self.innings[idx].target = target;
        }

        let format = &self.format;
        let state = &mut self.innings[idx];
        match &event.detail {
            EventKind::Run(d) | EventKind::Extra(d) | EventKind::Wicket(d) => {
                state.fold_delivery(d, format);
            }
            EventKind::Suspended { .. } => {
                if state.status == InningsStatus::InProgress {
                    state.status = InningsStatus::Suspended;
                }
            }
            EventKind::Resumed => {
                if state.status == InningsStatus::Suspended {
                    state.status = InningsStatus::InProgress;
                }
            }
            EventKind::Declared => state.complete(Completion::Declared),
            // The rewind itself happens when the view is rebuilt.
            EventKind::Retraction { .. } => {}
        }
        state.last_applied_sequence = event.sequence;
        self.last_sequence = event.sequence;

        if state.status == InningsStatus::Completed {
            log::info!(
                "match={} innings {} complete: {}/{} in {} overs ({:?})",
                self.match_id,
                state.innings,
                state.total_runs,
                state.wickets,
                state.overs(),
                state.completion
            );
        }
        Ok(&self.innings[idx])
    }

    /// Advance past a retracted event without folding it.
    pub fn skip(&mut self, sequence: Sequence) -> ScoreResult<()> {
        let expected = self.last_sequence + 1;
        if sequence != expected {
            return Err(ScoreError::OutOfOrder { expected, actual: sequence });
        }
        self.last_sequence = sequence;
        Ok(())
    }
}

fn check_batter(
    state: &InningsState,
    batting: &TeamSheet,
    at_crease: Option<&str>,
    named: &str,
    end: &str,
) -> Result<(), String> {
    match at_crease {
        Some(expected) if expected != named => {
            Err(format!("{end} should be {expected}, got {named}"))
        }
        Some(_) => Ok(()),
        None => {
            if !batting.contains(named) {
                Err(format!("{named} is not in {}", batting.team_id))
            } else if state.dismissed.iter().any(|p| p == named) {
                Err(format!("{named} has already been dismissed"))
            } else {
                Ok(())
            }
        }
    }
}
