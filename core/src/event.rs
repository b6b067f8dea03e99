//! Ledger events: one per delivery, plus corrections and lifecycle marks.
//!
//! RULE: Events are immutable once committed.
//! Corrections are new `Retraction` events; nothing is edited in place.
//! Variants are added over time: never removed or reordered.

use crate::{
    config::MatchFormat,
    types::{InningsNo, MatchId, PlayerId, Sequence},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Largest number of runs credited off the bat on a single delivery
/// (three run plus four overthrows).
pub const MAX_RUNS_OFF_BAT: u8 = 7;

/// Largest single penalty award.
pub const MAX_PENALTY_RUNS: u8 = 10;

/// A committed ledger event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BallEvent {
    pub match_id: MatchId,
    pub innings: InningsNo,
    pub sequence: Sequence,
    pub recorded_at: DateTime<Utc>,
    pub detail: EventKind,
}

impl BallEvent {
    pub fn delivery(&self) -> Option<&Delivery> {
        self.detail.delivery()
    }

    pub fn retracts(&self) -> Option<Sequence> {
        match &self.detail {
            EventKind::Retraction { retracts, .. } => Some(*retracts),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// Runs off the bat only (including a dot ball).
    Run(Delivery),
    /// One extra, plus runs off the bat when it is a no-ball.
    Extra(Delivery),
    /// A dismissal, with whatever runs or extra accompanied it.
    Wicket(Delivery),
    /// Nullifies the event committed at `retracts`.
    Retraction { retracts: Sequence, reason: String },
    /// Play stopped (rain, bad light).
    Suspended { reason: String },
    Resumed,
    /// Batting side closes its innings.
    Declared,
}

impl EventKind {
    pub fn delivery(&self) -> Option<&Delivery> {
        match self {
            Self::Run(d) | Self::Extra(d) | Self::Wicket(d) => Some(d),
            _ => None,
        }
    }

    /// Stable name for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Run(_)              => "run",
            Self::Extra(_)            => "extra",
            Self::Wicket(_)           => "wicket",
            Self::Retraction { .. }   => "retraction",
            Self::Suspended { .. }    => "suspended",
            Self::Resumed             => "resumed",
            Self::Declared            => "declared",
        }
    }

    /// Checks that need no innings state: the kind agrees with its
    /// contents, counts are in range and the dismissal is possible.
    pub fn check_shape(
        &self,
        format: &MatchFormat,
        max_deliveries_per_over: u8,
    ) -> Result<(), String> {
        let d = match self {
            Self::Run(d) => {
                if d.extra.is_some() || d.wicket.is_some() {
                    return Err("a run event carries neither extra nor wicket".into());
                }
                d
            }
            Self::Extra(d) => {
                if d.extra.is_none() {
                    return Err("an extra event must record the extra".into());
                }
                if d.wicket.is_some() {
                    return Err("dismissals are recorded as wicket events".into());
                }
                d
            }
            Self::Wicket(d) => {
                if d.wicket.is_none() {
                    return Err("a wicket event must record the dismissal".into());
                }
                d
            }
            Self::Retraction { reason, .. } | Self::Suspended { reason } => {
                if reason.trim().is_empty() {
                    return Err(format!("{} needs a reason", self.type_name()));
                }
                return Ok(());
            }
            Self::Resumed | Self::Declared => return Ok(()),
        };
        d.check_shape(format, max_deliveries_per_over)
    }
}

/// One delivery as recorded by the scorer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Delivery {
    /// 1-based over number within the innings.
    pub over: u16,
    /// 1-based position within the over, counting wides and no-balls.
    pub ball: u8,
    pub striker: PlayerId,
    pub non_striker: PlayerId,
    pub bowler: PlayerId,
    #[serde(default)]
    pub runs_off_bat: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Extra>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wicket: Option<Wicket>,
}

impl Delivery {
    pub fn new(
        over: u16,
        ball: u8,
        striker: impl Into<PlayerId>,
        non_striker: impl Into<PlayerId>,
        bowler: impl Into<PlayerId>,
    ) -> Self {
        Self {
            over,
            ball,
            striker: striker.into(),
            non_striker: non_striker.into(),
            bowler: bowler.into(),
            runs_off_bat: 0,
            extra: None,
            wicket: None,
        }
    }

    pub fn runs(mut self, runs_off_bat: u8) -> Self {
        self.runs_off_bat = runs_off_bat;
        self
    }

    pub fn with_extra(mut self, kind: ExtraKind, amount: u8) -> Self {
        self.extra = Some(Extra { kind, amount });
        self
    }

    pub fn with_wicket(mut self, wicket: Wicket) -> Self {
        self.wicket = Some(wicket);
        self
    }

    /// Wides and no-balls are re-bowled; everything else counts toward the over.
    pub fn is_legal(&self) -> bool {
        !matches!(
            self.extra.as_ref().map(|e| e.kind),
            Some(ExtraKind::Wide | ExtraKind::NoBall)
        )
    }

    pub fn extra_runs(&self) -> u32 {
        self.extra.as_ref().map_or(0, |e| e.amount as u32)
    }

    /// Everything this delivery added to the team total.
    pub fn total_runs(&self) -> u32 {
        self.runs_off_bat as u32 + self.extra_runs()
    }

    /// Runs charged to the bowler: off the bat plus wides and no-balls.
    pub fn bowler_conceded(&self) -> u32 {
        let extras = match &self.extra {
            Some(e) if matches!(e.kind, ExtraKind::Wide | ExtraKind::NoBall) => e.amount as u32,
            _ => 0,
        };
        self.runs_off_bat as u32 + extras
    }

    /// Runs the batters physically completed (boundaries included).
    /// An odd count means they finish at opposite ends.
    pub fn completed_runs(&self, format: &MatchFormat) -> u32 {
        let from_extra = match &self.extra {
            None => 0,
            Some(e) => match e.kind {
                ExtraKind::Bye | ExtraKind::LegBye => e.amount as u32,
                ExtraKind::Wide => (e.amount.saturating_sub(format.wide_penalty)) as u32,
                ExtraKind::NoBall => (e.amount.saturating_sub(format.no_ball_penalty)) as u32,
                ExtraKind::Penalty => 0,
            },
        };
        self.runs_off_bat as u32 + from_extra
    }

    fn check_shape(&self, format: &MatchFormat, max_deliveries_per_over: u8) -> Result<(), String> {
        if self.over == 0 {
            return Err("over numbers start at 1".into());
        }
        if self.ball == 0 || self.ball > max_deliveries_per_over {
            return Err(format!(
                "ball {} outside 1..={max_deliveries_per_over}",
                self.ball
            ));
        }
        if self.striker == self.non_striker {
            return Err("striker and non-striker must differ".into());
        }
        if self.bowler == self.striker || self.bowler == self.non_striker {
            return Err("bowler cannot be one of the batters".into());
        }
        if self.runs_off_bat > MAX_RUNS_OFF_BAT {
            return Err(format!(
                "{} runs off the bat exceeds {MAX_RUNS_OFF_BAT}",
                self.runs_off_bat
            ));
        }

        let extra_kind = self.extra.as_ref().map(|e| e.kind);
        if let Some(extra) = &self.extra {
            let (min, max) = match extra.kind {
                ExtraKind::Wide => (format.wide_penalty, format.wide_penalty + MAX_RUNS_OFF_BAT),
                ExtraKind::NoBall => (format.no_ball_penalty, format.no_ball_penalty + MAX_RUNS_OFF_BAT),
                ExtraKind::Bye | ExtraKind::LegBye => (1, MAX_RUNS_OFF_BAT),
                ExtraKind::Penalty => (1, MAX_PENALTY_RUNS),
            };
            if extra.amount < min || extra.amount > max {
                return Err(format!(
                    "{:?} amount {} outside {min}..={max}",
                    extra.kind, extra.amount
                ));
            }
            if self.runs_off_bat > 0 && extra.kind != ExtraKind::NoBall {
                return Err(format!("runs off the bat cannot accompany a {:?}", extra.kind));
            }
        }

        if let Some(w) = &self.wicket {
            if !w.kind.allowed_with(extra_kind) {
                return Err(format!("{:?} is not possible off a {:?}", w.kind, extra_kind));
            }
            if w.dismissed != self.striker && w.dismissed != self.non_striker {
                return Err(format!("{} is not batting", w.dismissed));
            }
            if w.dismissed == self.non_striker && !w.kind.non_striker_can_be_out() {
                return Err(format!("the non-striker cannot be out {:?}", w.kind));
            }
            if w.kind.needs_fielder() && w.fielders.is_empty() {
                return Err(format!("{:?} must name the fielder", w.kind));
            }
            if matches!(w.kind, DismissalKind::Caught | DismissalKind::Stumped) && w.fielders.len() > 1 {
                return Err(format!("{:?} credits exactly one fielder", w.kind));
            }
            if w.fielders.iter().any(|f| f == &self.striker || f == &self.non_striker) {
                return Err("a batter cannot be credited as a fielder".into());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExtraKind {
    Wide,
    NoBall,
    Bye,
    LegBye,
    Penalty,
}

/// Wide and no-ball amounts include the one-run penalty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Extra {
    pub kind: ExtraKind,
    pub amount: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wicket {
    pub kind: DismissalKind,
    pub dismissed: PlayerId,
    #[serde(default)]
    pub fielders: Vec<PlayerId>,
}

impl Wicket {
    pub fn new(kind: DismissalKind, dismissed: impl Into<PlayerId>) -> Self {
        Self { kind, dismissed: dismissed.into(), fielders: Vec::new() }
    }

    pub fn by(mut self, fielder: impl Into<PlayerId>) -> Self {
        self.fielders.push(fielder.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DismissalKind {
    Bowled,
    Caught,
    Lbw,
    Stumped,
    RunOut,
    HitWicket,
    ObstructingTheField,
    RetiredOut,
}

impl DismissalKind {
    /// Counts toward the bowler's wickets.
    pub fn credited_to_bowler(self) -> bool {
        matches!(
            self,
            Self::Bowled | Self::Caught | Self::Lbw | Self::Stumped | Self::HitWicket
        )
    }

    pub fn needs_fielder(self) -> bool {
        matches!(self, Self::Caught | Self::Stumped | Self::RunOut)
    }

    pub fn non_striker_can_be_out(self) -> bool {
        matches!(self, Self::RunOut | Self::ObstructingTheField | Self::RetiredOut)
    }

    pub fn allowed_with(self, extra: Option<ExtraKind>) -> bool {
        match extra {
            None | Some(ExtraKind::Bye | ExtraKind::LegBye | ExtraKind::Penalty) => true,
            Some(ExtraKind::NoBall) => {
                matches!(self, Self::RunOut | Self::ObstructingTheField | Self::RetiredOut)
            }
            Some(ExtraKind::Wide) => matches!(
                self,
                Self::Stumped | Self::RunOut | Self::HitWicket | Self::ObstructingTheField | Self::RetiredOut
            ),
        }
    }
}

/// The ledger row as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Option<i64>,
    pub match_id: MatchId,
    pub innings: InningsNo,
    pub sequence: Sequence,
    pub event_type: String,
    pub idempotency_key: String,
    /// Sequence nullified by this row, for retraction rows only.
    pub retracts: Option<Sequence>,
    pub payload: String, // JSON-serialized BallEvent
    pub recorded_at: String,
}

impl LedgerEntry {
    pub fn from_event(event: &BallEvent, idempotency_key: &str) -> serde_json::Result<Self> {
        Ok(Self {
            id: None,
            match_id: event.match_id.clone(),
            innings: event.innings,
            sequence: event.sequence,
            event_type: event.detail.type_name().to_string(),
            idempotency_key: idempotency_key.to_string(),
            retracts: event.retracts(),
            payload: serde_json::to_string(event)?,
            recorded_at: event.recorded_at.to_rfc3339(),
        })
    }

    pub fn event(&self) -> serde_json::Result<BallEvent> {
        serde_json::from_str(&self.payload)
    }
}
