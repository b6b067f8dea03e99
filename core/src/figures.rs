//! Player figures: batting, bowling and fielding, derived from the ledger.
//!
//! RULE: Rates are computed from their numerator and denominator on read.
//! Nothing here stores a strike rate, an economy or an average.

use crate::{
    event::{BallEvent, Delivery, DismissalKind, ExtraKind},
    innings::Extras,
    types::{InningsNo, PlayerId, Sequence},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BattingFigures {
    pub runs: u32,
    pub balls_faced: u32,
    pub fours: u32,
    pub sixes: u32,
    pub dots: u32,
    pub innings_batted: u32,
    pub outs: u32,
    /// Most recent dismissal, `None` while not out.
    pub how_out: Option<DismissalKind>,
}

impl BattingFigures {
    /// Runs per hundred balls faced.
    pub fn strike_rate(&self) -> Option<f64> {
        ratio(self.runs as f64 * 100.0, self.balls_faced)
    }

    /// Runs per dismissal.
    pub fn average(&self) -> Option<f64> {
        ratio(self.runs as f64, self.outs)
    }

    pub fn is_duck(&self) -> bool {
        self.outs > 0 && self.runs == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BowlingFigures {
    pub legal_balls: u32,
    pub runs_conceded: u32,
    pub wickets: u32,
    pub maidens: u32,
    pub wides: u32,
    pub no_balls: u32,
    pub dots: u32,
    pub balls_per_over: u8,
}

impl Default for BowlingFigures {
    fn default() -> Self {
        Self {
            legal_balls: 0,
            runs_conceded: 0,
            wickets: 0,
            maidens: 0,
            wides: 0,
            no_balls: 0,
            dots: 0,
            balls_per_over: 6,
        }
    }
}

impl BowlingFigures {
    /// Runs conceded per over.
    pub fn economy(&self) -> Option<f64> {
        ratio(
            self.runs_conceded as f64 * self.balls_per_over as f64,
            self.legal_balls,
        )
    }

    /// Runs conceded per wicket.
    pub fn average(&self) -> Option<f64> {
        ratio(self.runs_conceded as f64, self.wickets)
    }

    /// Balls per wicket.
    pub fn strike_rate(&self) -> Option<f64> {
        ratio(self.legal_balls as f64, self.wickets)
    }

    pub fn overs(&self) -> String {
        let bpo = self.balls_per_over.max(1) as u32;
        format!("{}.{}", self.legal_balls / bpo, self.legal_balls % bpo)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldingFigures {
    pub catches: u32,
    pub run_outs: u32,
    pub stumpings: u32,
}

fn ratio(numerator: f64, denominator: u32) -> Option<f64> {
    (denominator > 0).then(|| numerator / denominator as f64)
}

/// Sequence of the latest event that moved each points-bearing figure.
/// Zero means never.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoringMoments {
    pub runs: Sequence,
    pub fours: Sequence,
    pub sixes: Sequence,
    /// Runs crossed 50 or 100.
    pub milestone: Sequence,
    pub dismissal: Sequence,
    pub wickets: Sequence,
    /// Wickets reached 3 or 5.
    pub haul: Sequence,
    pub maidens: Sequence,
    pub catches: Sequence,
    pub run_outs: Sequence,
    pub stumpings: Sequence,
}

impl ScoringMoments {
    fn merge(&mut self, other: &ScoringMoments) {
        for (mine, theirs) in [
            (&mut self.runs, other.runs),
            (&mut self.fours, other.fours),
            (&mut self.sixes, other.sixes),
            (&mut self.milestone, other.milestone),
            (&mut self.dismissal, other.dismissal),
            (&mut self.wickets, other.wickets),
            (&mut self.haul, other.haul),
            (&mut self.maidens, other.maidens),
            (&mut self.catches, other.catches),
            (&mut self.run_outs, other.run_outs),
            (&mut self.stumpings, other.stumpings),
        ] {
            *mine = (*mine).max(theirs);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerFigures {
    pub player_id: PlayerId,
    pub batting: BattingFigures,
    pub bowling: BowlingFigures,
    pub fielding: FieldingFigures,
    /// Sequence of the last event that moved any figure, dot balls and
    /// runs conceded included.
    pub last_changed_sequence: Sequence,
    #[serde(default)]
    pub scored_at: ScoringMoments,
}

impl PlayerFigures {
    pub fn new(player_id: impl Into<PlayerId>, balls_per_over: u8) -> Self {
        Self {
            player_id: player_id.into(),
            batting: BattingFigures::default(),
            bowling: BowlingFigures { balls_per_over, ..BowlingFigures::default() },
            fielding: FieldingFigures::default(),
            last_changed_sequence: 0,
            scored_at: ScoringMoments::default(),
        }
    }

    /// Accumulate another scope's figures for the same player.
    pub fn merge(&mut self, other: &PlayerFigures) {
        let b = &mut self.batting;
        b.runs += other.batting.runs;
        b.balls_faced += other.batting.balls_faced;
        b.fours += other.batting.fours;
        b.sixes += other.batting.sixes;
        b.dots += other.batting.dots;
        b.innings_batted += other.batting.innings_batted;
        b.outs += other.batting.outs;
        if other.batting.how_out.is_some() {
            b.how_out = other.batting.how_out;
        }

        let w = &mut self.bowling;
        w.legal_balls += other.bowling.legal_balls;
        w.runs_conceded += other.bowling.runs_conceded;
        w.wickets += other.bowling.wickets;
        w.maidens += other.bowling.maidens;
        w.wides += other.bowling.wides;
        w.no_balls += other.bowling.no_balls;
        w.dots += other.bowling.dots;

        let f = &mut self.fielding;
        f.catches += other.fielding.catches;
        f.run_outs += other.fielding.run_outs;
        f.stumpings += other.fielding.stumpings;

        self.last_changed_sequence = self.last_changed_sequence.max(other.last_changed_sequence);
        self.scored_at.merge(&other.scored_at);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Innings(InningsNo),
    Match,
}

// ── Figure book ────────────────────────────────────────────────────

/// Runs and legal balls of the over in progress, for maiden detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct OverTally {
    bowler: PlayerId,
    conceded: u32,
    legal: u8,
    /// Set when a second bowler finished someone else's over.
    shared: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InningsFigures {
    pub players: BTreeMap<PlayerId, PlayerFigures>,
    pub extras: Extras,
    over: Option<OverTally>,
}

/// Per-innings figures for one match, updated one event at a time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FigureBook {
    pub balls_per_over: u8,
    pub innings: BTreeMap<InningsNo, InningsFigures>,
}

impl FigureBook {
    pub fn new(balls_per_over: u8) -> Self {
        Self { balls_per_over, innings: BTreeMap::new() }
    }

    /// Fold one committed event. Returns the players whose figures moved.
    pub fn apply(&mut self, event: &BallEvent) -> BTreeSet<PlayerId> {
        match event.delivery() {
            Some(d) => self.apply_delivery(event.innings, event.sequence, d),
            None => BTreeSet::new(),
        }
    }

    fn apply_delivery(&mut self, innings: InningsNo, sequence: Sequence, d: &Delivery) -> BTreeSet<PlayerId> {
        let bpo = self.balls_per_over;
        let book = self.innings.entry(innings).or_default();
        let mut changed = BTreeSet::new();

        let mut touch = |players: &mut BTreeMap<PlayerId, PlayerFigures>, id: &str| {
            players
                .entry(id.to_string())
                .or_insert_with(|| PlayerFigures::new(id, bpo))
                .last_changed_sequence = sequence;
            changed.insert(id.to_string());
        };

        if let Some(extra) = &d.extra {
            book.extras.record(extra);
        }
        let legal = d.is_legal();

        // ── Batting ────────────────────────────────────────────
        for batter in [&d.striker, &d.non_striker] {
            let fresh = book
                .players
                .get(batter.as_str())
                .map_or(true, |p| p.batting.innings_batted == 0);
            if fresh {
                touch(&mut book.players, batter);
                if let Some(p) = book.players.get_mut(batter.as_str()) {
                    p.batting.innings_batted = 1;
                }
            }
        }

        if legal || d.runs_off_bat > 0 {
            touch(&mut book.players, &d.striker);
            if let Some(p) = book.players.get_mut(d.striker.as_str()) {
                let bat = &mut p.batting;
                let before = bat.runs;
                bat.runs += d.runs_off_bat as u32;
                let at = &mut p.scored_at;
                if d.runs_off_bat > 0 {
                    at.runs = sequence;
                }
                if [50, 100].iter().any(|&m| before < m && bat.runs >= m) {
                    at.milestone = sequence;
                }
                match d.runs_off_bat {
                    4 => {
                        bat.fours += 1;
                        at.fours = sequence;
                    }
                    6 => {
                        bat.sixes += 1;
                        at.sixes = sequence;
                    }
                    _ => {}
                }
                if legal {
                    bat.balls_faced += 1;
                    if d.runs_off_bat == 0 {
                        bat.dots += 1;
                    }
                }
            }
        }

        // ── Bowling ────────────────────────────────────────────
        touch(&mut book.players, &d.bowler);
        let conceded = d.bowler_conceded();
        if let Some(p) = book.players.get_mut(d.bowler.as_str()) {
            let bowl = &mut p.bowling;
            bowl.runs_conceded += conceded;
            match d.extra.as_ref().map(|e| e.kind) {
                Some(ExtraKind::Wide) => bowl.wides += 1,
                Some(ExtraKind::NoBall) => bowl.no_balls += 1,
                _ => {}
            }
            if legal {
                bowl.legal_balls += 1;
                if conceded == 0 {
                    bowl.dots += 1;
                }
            }
        }

        let tally = book.over.get_or_insert_with(|| OverTally {
            bowler: d.bowler.clone(),
            conceded: 0,
            legal: 0,
            shared: false,
        });
        if tally.bowler != d.bowler {
            tally.bowler = d.bowler.clone();
            tally.shared = true;
        }
        tally.conceded += conceded;
        if legal {
            tally.legal += 1;
        }
        if tally.legal >= bpo {
            if !tally.shared && tally.conceded == 0 {
                if let Some(p) = book.players.get_mut(d.bowler.as_str()) {
                    p.bowling.maidens += 1;
                    p.scored_at.maidens = sequence;
                }
            }
            book.over = None;
        }

        // ── Dismissal and fielding ─────────────────────────────
        if let Some(w) = &d.wicket {
            touch(&mut book.players, &w.dismissed);
            if let Some(p) = book.players.get_mut(w.dismissed.as_str()) {
                p.batting.outs += 1;
                p.batting.how_out = Some(w.kind);
                p.scored_at.dismissal = sequence;
            }
            if w.kind.credited_to_bowler() {
                if let Some(p) = book.players.get_mut(d.bowler.as_str()) {
                    p.bowling.wickets += 1;
                    p.scored_at.wickets = sequence;
                    if matches!(p.bowling.wickets, 3 | 5) {
                        p.scored_at.haul = sequence;
                    }
                }
            }
            let credited: Vec<&PlayerId> = match w.kind {
                DismissalKind::Caught | DismissalKind::Stumped => w.fielders.iter().take(1).collect(),
                DismissalKind::RunOut => w.fielders.iter().collect(),
                _ => Vec::new(),
            };
            for fielder in credited {
                touch(&mut book.players, fielder);
                if let Some(p) = book.players.get_mut(fielder.as_str()) {
                    match w.kind {
                        DismissalKind::Caught => {
                            p.fielding.catches += 1;
                            p.scored_at.catches = sequence;
                        }
                        DismissalKind::Stumped => {
                            p.fielding.stumpings += 1;
                            p.scored_at.stumpings = sequence;
                        }
                        _ => {
                            p.fielding.run_outs += 1;
                            p.scored_at.run_outs = sequence;
                        }
                    }
                }
            }
        }

        changed
    }

    pub fn project(&self, scope: Scope) -> BTreeMap<PlayerId, PlayerFigures> {
        match scope {
            Scope::Innings(n) => self
                .innings
                .get(&n)
                .map(|b| b.players.clone())
                .unwrap_or_default(),
            Scope::Match => {
                let mut merged: BTreeMap<PlayerId, PlayerFigures> = BTreeMap::new();
                for book in self.innings.values() {
                    for (id, figures) in &book.players {
                        merged
                            .entry(id.clone())
                            .or_insert_with(|| PlayerFigures::new(id.as_str(), self.balls_per_over))
                            .merge(figures);
                    }
                }
                merged
            }
        }
    }

    pub fn extras(&self, innings: InningsNo) -> Extras {
        self.innings
            .get(&innings)
            .map(|b| b.extras.clone())
            .unwrap_or_default()
    }

    /// Σ batting runs for one innings.
    pub fn batting_runs(&self, innings: InningsNo) -> u32 {
        self.innings
            .get(&innings)
            .map_or(0, |b| b.players.values().map(|p| p.batting.runs).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_are_none_without_a_denominator() {
        let p = PlayerFigures::new("p1", 6);
        assert_eq!(p.batting.strike_rate(), None);
        assert_eq!(p.batting.average(), None);
        assert_eq!(p.bowling.economy(), None);
        assert_eq!(p.bowling.average(), None);
        assert_eq!(p.bowling.strike_rate(), None);
    }

    #[test]
    fn rates_use_numerator_and_denominator() {
        let mut p = PlayerFigures::new("p1", 6);
        p.batting.runs = 30;
        p.batting.balls_faced = 20;
        p.bowling.legal_balls = 12;
        p.bowling.runs_conceded = 15;
        assert_eq!(p.batting.strike_rate(), Some(150.0));
        assert_eq!(p.bowling.economy(), Some(7.5));
        assert_eq!(p.bowling.overs(), "2.0");
    }

    #[test]
    fn duck_needs_a_dismissal() {
        let mut b = BattingFigures::default();
        assert!(!b.is_duck());
        b.outs = 1;
        assert!(b.is_duck());
    }
}
