//! Fantasy points: league rules applied to player figures.
//!
//! `score` is a pure function of its inputs. Team totals and standings
//! are recomputed from figures on every read; nothing is accumulated.

use crate::{
    config::{FantasyLeague, ScoringRules, TieBreak},
    figures::PlayerFigures,
    types::{LeagueId, MatchId, PlayerId, Sequence},
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Player,
    Captain,
    ViceCaptain,
}

impl Role {
    pub fn multiplier(self, rules: &ScoringRules) -> f64 {
        match self {
            Self::Player      => 1.0,
            Self::Captain     => rules.captain_multiplier,
            Self::ViceCaptain => rules.vice_captain_multiplier,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PointBreakdown {
    pub batting: f64,
    pub bowling: f64,
    pub fielding: f64,
    pub bonus: f64,
}

impl PointBreakdown {
    pub fn sum(&self) -> f64 {
        self.batting + self.bowling + self.fielding + self.bonus
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FantasyPointRecord {
    pub player_id: PlayerId,
    pub breakdown: PointBreakdown,
    pub multiplier: f64,
    /// Always `multiplier * breakdown.sum()`.
    pub total: f64,
    pub last_points_sequence: Sequence,
}

/// Points for one player's figures under `rules`, scaled once by `role`.
pub fn score(figures: &PlayerFigures, rules: &ScoringRules, role: Role) -> FantasyPointRecord {
    let bat = &figures.batting;
    let bowl = &figures.bowling;
    let field = &figures.fielding;

    let mut batting = bat.runs as f64 * rules.runs
        + bat.fours as f64 * rules.fours
        + bat.sixes as f64 * rules.sixes;
    if bat.is_duck() {
        batting += rules.duck;
    }

    let bowling = bowl.wickets as f64 * rules.wickets + bowl.maidens as f64 * rules.maidens;

    let fielding = field.catches as f64 * rules.catches
        + field.run_outs as f64 * rules.run_outs
        + field.stumpings as f64 * rules.stumpings;

    let mut bonus = 0.0;
    match bat.runs {
        100.. => bonus += rules.century,
        50..=99 => bonus += rules.half_century,
        _ => {}
    }
    match bowl.wickets {
        5.. => bonus += rules.five_wicket_haul,
        3..=4 => bonus += rules.three_wicket_haul,
        _ => {}
    }

    let breakdown = PointBreakdown { batting, bowling, fielding, bonus };
    let multiplier = role.multiplier(rules);
    FantasyPointRecord {
        player_id: figures.player_id.clone(),
        total: multiplier * breakdown.sum(),
        breakdown,
        multiplier,
        last_points_sequence: last_points_sequence(figures, rules),
    }
}

/// The latest event that moved a figure these rules award points for.
/// Dot balls, runs conceded and unrewarded figures never count.
fn last_points_sequence(figures: &PlayerFigures, rules: &ScoringRules) -> Sequence {
    let at = &figures.scored_at;
    let pays = |weight: f64| weight != 0.0;
    [
        (pays(rules.runs), at.runs),
        (pays(rules.fours), at.fours),
        (pays(rules.sixes), at.sixes),
        (pays(rules.half_century) || pays(rules.century), at.milestone),
        (pays(rules.duck) && figures.batting.is_duck(), at.dismissal),
        (pays(rules.wickets), at.wickets),
        (pays(rules.three_wicket_haul) || pays(rules.five_wicket_haul), at.haul),
        (pays(rules.maidens), at.maidens),
        (pays(rules.catches), at.catches),
        (pays(rules.run_outs), at.run_outs),
        (pays(rules.stumpings), at.stumpings),
    ]
    .into_iter()
    .filter(|&(counts, _)| counts)
    .map(|(_, sequence)| sequence)
    .max()
    .unwrap_or(0)
}

// ── Teams and standings ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FantasyTeam {
    pub team_id: String,
    pub league_id: LeagueId,
    pub owner: String,
    pub players: Vec<PlayerId>,
    pub captain: PlayerId,
    pub vice_captain: PlayerId,
    /// Registration order within the league, assigned by the store.
    #[serde(default)]
    pub entry_order: u64,
}

impl FantasyTeam {
    pub fn check(&self, league: &FantasyLeague) -> Result<(), String> {
        if self.league_id != league.league_id {
            return Err(format!("team {} belongs to {}", self.team_id, self.league_id));
        }
        if self.players.len() != league.team_size {
            return Err(format!(
                "{} picks {} players; {} requires {}",
                self.team_id,
                self.players.len(),
                league.league_id,
                league.team_size
            ));
        }
        let distinct: HashSet<&str> = self.players.iter().map(String::as_str).collect();
        if distinct.len() != self.players.len() {
            return Err(format!("{} picks a player twice", self.team_id));
        }
        if self.captain == self.vice_captain {
            return Err("captain and vice-captain must differ".into());
        }
        for (role, id) in [("captain", &self.captain), ("vice-captain", &self.vice_captain)] {
            if !distinct.contains(id.as_str()) {
                return Err(format!("{role} {id} is not in the team"));
            }
        }
        Ok(())
    }

    pub fn role_of(&self, player: &str) -> Role {
        if self.captain == player {
            Role::Captain
        } else if self.vice_captain == player {
            Role::ViceCaptain
        } else {
            Role::Player
        }
    }

    /// Each picked player's record with this team's captaincy applied.
    /// Players without figures score zero.
    pub fn records(
        &self,
        figures: &BTreeMap<PlayerId, PlayerFigures>,
        rules: &ScoringRules,
    ) -> Vec<FantasyPointRecord> {
        self.players
            .iter()
            .map(|id| {
                let fallback;
                let f = match figures.get(id) {
                    Some(f) => f,
                    None => {
                        fallback = PlayerFigures::new(id.as_str(), 6);
                        &fallback
                    }
                };
                score(f, rules, self.role_of(id))
            })
            .collect()
    }
}

/// One team's points for one match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamScore {
    pub team_id: String,
    pub match_id: MatchId,
    pub records: Vec<FantasyPointRecord>,
    /// Σ of the records' totals.
    pub total: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FantasyStanding {
    pub rank: usize,
    pub team_id: String,
    pub owner: String,
    pub total: f64,
    pub last_points_sequence: Sequence,
    pub entry_order: u64,
}

impl FantasyStanding {
    pub fn for_team(team: &FantasyTeam, records: &[FantasyPointRecord]) -> Self {
        Self {
            rank: 0,
            team_id: team.team_id.clone(),
            owner: team.owner.clone(),
            total: records.iter().map(|r| r.total).sum(),
            last_points_sequence: records
                .iter()
                .filter(|r| r.total != 0.0)
                .map(|r| r.last_points_sequence)
                .max()
                .unwrap_or(0),
            entry_order: team.entry_order,
        }
    }
}

/// Sort by total descending, break ties per `tie_break`, then by entry
/// order, and assign 1-based ranks. Equal keys never share a rank.
pub fn rank(mut standings: Vec<FantasyStanding>, tie_break: TieBreak) -> Vec<FantasyStanding> {
    standings.sort_by(|a, b| {
        b.total
            .partial_cmp(&a.total)
            .unwrap_or(Ordering::Equal)
            .then_with(|| match tie_break {
                TieBreak::MostRecentEvent => b.last_points_sequence.cmp(&a.last_points_sequence),
                TieBreak::EarliestEntry => Ordering::Equal,
            })
            .then_with(|| a.entry_order.cmp(&b.entry_order))
    });
    for (i, s) in standings.iter_mut().enumerate() {
        s.rank = i + 1;
    }
    standings
}
