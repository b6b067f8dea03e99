//! Seeded match simulator: plays plausible cricket through the service.
//!
//! Used by the runner's simulate mode and by property-style tests. Every
//! delivery goes through `ScoringService::submit_ball` with the expected
//! sequence set, exactly as a scoring operator's client would send it.

use crate::{
    error::{ScoreError, ScoreResult},
    event::{Delivery, DismissalKind, EventKind, ExtraKind, Wicket},
    fixture::MatchFixture,
    innings::{InningsState, InningsStatus},
    ledger::derive_idempotency_key,
    projection::MatchView,
    rng::DeliveryRng,
    service::ScoringService,
    types::{InningsNo, PlayerId},
};

/// Overs after which an unlimited-overs innings is declared.
pub const DEFAULT_DECLARE_AFTER_OVERS: u16 = 90;

// Relative outcome weights for one delivery.
const OUTCOMES: [(Outcome, f64); 11] = [
    (Outcome::Runs(0), 0.36),
    (Outcome::Runs(1), 0.26),
    (Outcome::Runs(2), 0.07),
    (Outcome::Runs(3), 0.01),
    (Outcome::Runs(4), 0.11),
    (Outcome::Runs(6), 0.04),
    (Outcome::Wicket, 0.05),
    (Outcome::Wide, 0.04),
    (Outcome::NoBall, 0.01),
    (Outcome::LegBye, 0.03),
    (Outcome::Bye, 0.02),
];

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Runs(u8),
    Wicket,
    Wide,
    NoBall,
    LegBye,
    Bye,
}

pub struct MatchSimulator<'a> {
    service: &'a ScoringService,
    seed: u64,
    /// Overs after which an unlimited-overs side declares.
    declare_after: Option<u16>,
    suspension_chance: f64,
}

impl<'a> MatchSimulator<'a> {
    pub fn new(service: &'a ScoringService, seed: u64) -> Self {
        Self { service, seed, declare_after: None, suspension_chance: 0.0 }
    }

    pub fn declare_after(mut self, overs: u16) -> Self {
        self.declare_after = Some(overs);
        self
    }

    /// Occasionally stop play and resume it straight away.
    pub fn with_interruptions(mut self, per_delivery: f64) -> Self {
        self.suspension_chance = per_delivery;
        self
    }

    /// Play every innings of a registered match. Returns the final view.
    pub fn play_match(&self, match_id: &str) -> ScoreResult<MatchView> {
        let total = self.service.snapshot(match_id)?.scoreboard.format.total_innings();
        for innings in 1..=total {
            if self.service.snapshot(match_id)?.scoreboard.is_finished() {
                break;
            }
            self.play_innings(match_id, innings)?;
        }
        self.service.snapshot(match_id)
    }

    pub fn play_innings(&self, match_id: &str, innings: InningsNo) -> ScoreResult<InningsState> {
        let mut rng = DeliveryRng::new(self.seed, innings as u64);
        let view = self.service.snapshot(match_id)?;
        let fixture = view.scoreboard.fixture.clone();
        let format = view.scoreboard.format.clone();
        // Limited-overs innings end on their own.
        let declare_at = match format.overs_per_innings {
            Some(_) => None,
            None => Some(self.declare_after.unwrap_or(DEFAULT_DECLARE_AFTER_OVERS)),
        };
        let max_deliveries = self.service.config().ledger.max_deliveries_per_over;

        loop {
            let state = self.service.get_innings_state(match_id, innings)?;
            if state.status == InningsStatus::Completed {
                return Ok(state);
            }
            let head = self.service.last_sequence(match_id)?;

            if state.status == InningsStatus::Suspended {
                let key = format!("sim-{}-resume-{head}", self.seed);
                self.service.resume(match_id, innings, &key, Some(head))?;
                continue;
            }

            let over = state.current_over();
            if state.status == InningsStatus::InProgress
                && state.deliveries_this_over == 0
                && declare_at.is_some_and(|c| over > c)
            {
                let key = format!("sim-{}-declare-{head}", self.seed);
                return Ok(self.service.declare(match_id, innings, &key, Some(head))?.state);
            }

            if state.status == InningsStatus::InProgress && rng.chance(self.suspension_chance) {
                let key = format!("sim-{}-suspend-{head}", self.seed);
                self.service.suspend(match_id, innings, "rain", &key, Some(head))?;
                continue;
            }

            let (striker, non_striker) = batters(&fixture, &state)?;
            let bowler = match &state.bowler {
                Some(b) => b.clone(),
                None => pick_bowler(&fixture, &format, &state, &mut rng)?,
            };
            let ball = state.deliveries_this_over + 1;
            let force_legal = ball >= max_deliveries;

            let mut outcome = OUTCOMES[rng.weighted(&OUTCOMES.map(|(_, w)| w))].0;
            if force_legal && matches!(outcome, Outcome::Wide | Outcome::NoBall) {
                outcome = Outcome::Runs(0);
            }

            let d = Delivery::new(over, ball, striker.clone(), non_striker.clone(), bowler.clone());
            let event = match outcome {
                Outcome::Runs(r) => EventKind::Run(d.runs(r)),
                Outcome::Wide => EventKind::Extra(d.with_extra(ExtraKind::Wide, 1)),
                Outcome::NoBall => {
                    let bat = if rng.chance(0.4) { 1 } else { 0 };
                    EventKind::Extra(d.runs(bat).with_extra(ExtraKind::NoBall, 1))
                }
                Outcome::LegBye => EventKind::Extra(d.with_extra(ExtraKind::LegBye, 1)),
                Outcome::Bye => EventKind::Extra(d.with_extra(ExtraKind::Bye, 1 + rng.below(2) as u8)),
                Outcome::Wicket => {
                    let bowling = &fixture.bowling(innings).players;
                    let fielder = bowling[rng.below(bowling.len())].clone();
                    let wicket = match rng.weighted(&[0.3, 0.4, 0.15, 0.1, 0.05]) {
                        0 => Wicket::new(DismissalKind::Bowled, striker),
                        1 => Wicket::new(DismissalKind::Caught, striker).by(fielder),
                        2 => Wicket::new(DismissalKind::Lbw, striker),
                        3 => {
                            let out = if rng.chance(0.5) { striker } else { non_striker };
                            Wicket::new(DismissalKind::RunOut, out).by(fielder)
                        }
                        _ => Wicket::new(DismissalKind::Stumped, striker).by(bowling[0].clone()),
                    };
                    EventKind::Wicket(d.with_wicket(wicket))
                }
            };

            let key = derive_idempotency_key(match_id, innings, over, ball, &format!("sim-{}-{head}", self.seed));
            self.service.submit_ball(match_id, innings, event, &key, Some(head))?;
        }
    }
}

/// The pair at the crease, filling vacancies in batting order.
fn batters(fixture: &MatchFixture, state: &InningsState) -> ScoreResult<(PlayerId, PlayerId)> {
    let mut waiting = fixture.batting(state.innings).players.iter().filter(|&p| {
        !state.dismissed.contains(p)
            && state.striker.as_ref() != Some(p)
            && state.non_striker.as_ref() != Some(p)
    });
    let mut next = || {
        waiting.next().cloned().ok_or_else(|| ScoreError::validation(
            &fixture.match_id,
            state.innings,
            state.last_applied_sequence,
            "no batters left",
        ))
    };
    let striker = match &state.striker {
        Some(p) => p.clone(),
        None => next()?,
    };
    let non_striker = match &state.non_striker {
        Some(p) => p.clone(),
        None => next()?,
    };
    Ok((striker, non_striker))
}

/// Specialists first (the tail of the sheet), never the previous over's
/// bowler, never past the quota.
fn pick_bowler(
    fixture: &MatchFixture,
    format: &crate::config::MatchFormat,
    state: &InningsState,
    rng: &mut DeliveryRng,
) -> ScoreResult<PlayerId> {
    let squad = &fixture.bowling(state.innings).players;
    let eligible = |p: &&PlayerId| {
        state.previous_over_bowler.as_ref() != Some(*p)
            && format
                .max_overs_per_bowler
                .map_or(true, |max| state.overs_by_bowler.get(*p).copied().unwrap_or(0) < max)
    };
    // The first player keeps wicket.
    let specialists: Vec<&PlayerId> = squad.iter().rev().take(5).filter(eligible).collect();
    let pool: Vec<&PlayerId> = if specialists.is_empty() {
        squad.iter().skip(1).filter(eligible).collect()
    } else {
        specialists
    };
    if pool.is_empty() {
        return Err(ScoreError::validation(
            &fixture.match_id,
            state.innings,
            state.last_applied_sequence,
            "no eligible bowler",
        ));
    }
    Ok(pool[rng.below(pool.len())].clone())
}
