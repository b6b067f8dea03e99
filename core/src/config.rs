use crate::{
    error::{ScoreError, ScoreResult},
    types::{InningsNo, LeagueId},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

// ── Match formats ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchFormat {
    pub format_id: String,
    pub label: String,
    /// `None` for unlimited-overs (multi-day) cricket.
    pub overs_per_innings: Option<u16>,
    pub innings_per_side: u8,
    #[serde(default = "default_balls_per_over")]
    pub balls_per_over: u8,
    #[serde(default = "default_team_size")]
    pub team_size: u8,
    #[serde(default)]
    pub powerplays: Vec<PowerplayWindow>,
    #[serde(default)]
    pub max_overs_per_bowler: Option<u16>,
    #[serde(default)]
    pub strike_policy: StrikePolicy,
    #[serde(default = "default_penalty")]
    pub wide_penalty: u8,
    #[serde(default = "default_penalty")]
    pub no_ball_penalty: u8,
}

/// Inclusive, 1-based over range with fielding restrictions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PowerplayWindow {
    pub first_over: u16,
    pub last_over: u16,
}

/// Where the incoming batter stands after a dismissal.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StrikePolicy {
    /// New batter takes the dismissed batter's end; the over-end swap still applies.
    #[default]
    DismissedEnd,
    /// New batter faces the next ball unless the over has just ended.
    NewBatterOnStrike,
}

impl MatchFormat {
    pub fn total_innings(&self) -> InningsNo {
        self.innings_per_side * 2
    }

    pub fn max_legal_balls(&self) -> Option<u32> {
        self.overs_per_innings
            .map(|o| o as u32 * self.balls_per_over as u32)
    }

    /// Wickets that end an innings.
    pub fn all_out_wickets(&self) -> u8 {
        self.team_size.saturating_sub(1)
    }

    pub fn is_powerplay_over(&self, over: u16) -> bool {
        self.powerplays
            .iter()
            .any(|w| over >= w.first_over && over <= w.last_over)
    }

    pub fn allows_declaration(&self) -> bool {
        self.innings_per_side > 1
    }

    /// Which side bats in `innings`: 0 for the side batting first, 1 otherwise.
    pub fn batting_side(innings: InningsNo) -> usize {
        if innings % 2 == 1 { 0 } else { 1 }
    }
}

fn default_balls_per_over() -> u8 { 6 }
fn default_team_size() -> u8 { 11 }
fn default_penalty() -> u8 { 1 }

// ── Fantasy leagues ────────────────────────────────────────────────

/// Points per unit of each figure. Unlisted entries score nothing;
/// unlisted multipliers fall back to 2x captain and 1.5x vice-captain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringRules {
    pub runs: f64,
    pub fours: f64,
    pub sixes: f64,
    /// Applied (usually negative) when a batter is dismissed for 0.
    pub duck: f64,
    pub wickets: f64,
    pub maidens: f64,
    pub catches: f64,
    pub run_outs: f64,
    pub stumpings: f64,
    pub half_century: f64,
    pub century: f64,
    pub three_wicket_haul: f64,
    pub five_wicket_haul: f64,
    pub captain_multiplier: f64,
    pub vice_captain_multiplier: f64,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            runs: 0.0,
            fours: 0.0,
            sixes: 0.0,
            duck: 0.0,
            wickets: 0.0,
            maidens: 0.0,
            catches: 0.0,
            run_outs: 0.0,
            stumpings: 0.0,
            half_century: 0.0,
            century: 0.0,
            three_wicket_haul: 0.0,
            five_wicket_haul: 0.0,
            captain_multiplier: 2.0,
            vice_captain_multiplier: 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// The team whose points moved most recently ranks higher.
    #[default]
    MostRecentEvent,
    /// The team registered first ranks higher.
    EarliestEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FantasyLeague {
    pub league_id: LeagueId,
    pub label: String,
    #[serde(default = "default_fantasy_team_size")]
    pub team_size: usize,
    #[serde(default)]
    pub tie_break: TieBreak,
    pub scoring_rules: ScoringRules,
}

fn default_fantasy_team_size() -> usize { 11 }

// ── Ledger ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// How long an append may wait for the database write lock.
    pub append_timeout_ms: u64,
    /// Wall-clock bound on a single replay.
    pub replay_timeout_ms: u64,
    pub replay_page_size: usize,
    /// Take an innings checkpoint every N match sequences.
    pub checkpoint_interval: u64,
    pub broadcast_capacity: usize,
    /// Safety bound on deliveries in one over, wides and no-balls
    /// included. Overs end on legal balls, never on this count.
    pub max_deliveries_per_over: u8,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            append_timeout_ms: 2_000,
            replay_timeout_ms: 5_000,
            replay_page_size: 256,
            checkpoint_interval: 30,
            broadcast_capacity: 1_024,
            max_deliveries_per_over: u8::MAX,
        }
    }
}

impl LedgerConfig {
    pub fn append_timeout(&self) -> Duration {
        Duration::from_millis(self.append_timeout_ms)
    }

    pub fn replay_timeout(&self) -> Duration {
        Duration::from_millis(self.replay_timeout_ms)
    }
}

// ── Files ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct FormatsFile {
    formats: Vec<MatchFormat>,
}

#[derive(Debug, Clone, Deserialize)]
struct LeaguesFile {
    leagues: Vec<FantasyLeague>,
}

#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub formats: HashMap<String, MatchFormat>,
    pub leagues: HashMap<LeagueId, FantasyLeague>,
    pub ledger: LedgerConfig,
}

impl ScoringConfig {
    /// Load from the data/ directory.
    /// In tests, use ScoringConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let formats_path = format!("{data_dir}/formats/match_formats.json");
        let formats_content = std::fs::read_to_string(&formats_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {formats_path}: {e}"))?;
        let formats_file: FormatsFile = serde_json::from_str(&formats_content)?;
        let formats = formats_file
            .formats
            .into_iter()
            .map(|f| (f.format_id.clone(), f))
            .collect();

        let leagues_path = format!("{data_dir}/fantasy/leagues.json");
        let leagues_content = std::fs::read_to_string(&leagues_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {leagues_path}: {e}"))?;
        let leagues_file: LeaguesFile = serde_json::from_str(&leagues_content)?;
        let leagues = leagues_file
            .leagues
            .into_iter()
            .map(|l| (l.league_id.clone(), l))
            .collect();

        // Ledger tuning is optional; defaults apply when the file is absent.
        let ledger_path = format!("{data_dir}/ledger/ledger.json");
        let ledger = match std::fs::read_to_string(&ledger_path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("{ledger_path} not found, using default ledger settings");
                LedgerConfig::default()
            }
            Err(e) => return Err(anyhow::anyhow!("Cannot read {ledger_path}: {e}")),
        };

        let config = Self { formats, leagues, ledger };
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> anyhow::Result<()> {
        for f in self.formats.values() {
            anyhow::ensure!(f.balls_per_over > 0, "format {} has zero balls per over", f.format_id);
            anyhow::ensure!(f.team_size >= 2, "format {} needs at least two players", f.format_id);
            anyhow::ensure!(
                matches!(f.innings_per_side, 1 | 2),
                "format {} must have one or two innings per side",
                f.format_id
            );
        }
        for l in self.leagues.values() {
            anyhow::ensure!(l.team_size > 0, "league {} has an empty team size", l.league_id);
        }
        anyhow::ensure!(self.ledger.replay_page_size > 0, "replay_page_size must be positive");
        anyhow::ensure!(self.ledger.broadcast_capacity > 0, "broadcast_capacity must be positive");
        Ok(())
    }

    pub fn format(&self, format_id: &str) -> ScoreResult<&MatchFormat> {
        self.formats.get(format_id).ok_or_else(|| ScoreError::NotFound {
            what: "format",
            id: format_id.to_string(),
        })
    }

    pub fn league(&self, league_id: &str) -> ScoreResult<&FantasyLeague> {
        self.leagues.get(league_id).ok_or_else(|| ScoreError::NotFound {
            what: "fantasy league",
            id: league_id.to_string(),
        })
    }

    /// In-code configuration mirroring data/, plus a two-over format for short tests.
    pub fn default_test() -> Self {
        let formats = [
            MatchFormat {
                format_id: "T20".into(),
                label: "Twenty20".into(),
                overs_per_innings: Some(20),
                innings_per_side: 1,
                balls_per_over: 6,
                team_size: 11,
                powerplays: vec![PowerplayWindow { first_over: 1, last_over: 6 }],
                max_overs_per_bowler: Some(4),
                strike_policy: StrikePolicy::DismissedEnd,
                wide_penalty: 1,
                no_ball_penalty: 1,
            },
            MatchFormat {
                format_id: "ODI".into(),
                label: "One Day International".into(),
                overs_per_innings: Some(50),
                innings_per_side: 1,
                balls_per_over: 6,
                team_size: 11,
                powerplays: vec![
                    PowerplayWindow { first_over: 1, last_over: 10 },
                    PowerplayWindow { first_over: 11, last_over: 40 },
                    PowerplayWindow { first_over: 41, last_over: 50 },
                ],
                max_overs_per_bowler: Some(10),
                strike_policy: StrikePolicy::DismissedEnd,
                wide_penalty: 1,
                no_ball_penalty: 1,
            },
            MatchFormat {
                format_id: "TEST".into(),
                label: "Test match".into(),
                overs_per_innings: None,
                innings_per_side: 2,
                balls_per_over: 6,
                team_size: 11,
                powerplays: vec![],
                max_overs_per_bowler: None,
                strike_policy: StrikePolicy::DismissedEnd,
                wide_penalty: 1,
                no_ball_penalty: 1,
            },
            MatchFormat {
                format_id: "T2".into(),
                label: "Two-over shootout".into(),
                overs_per_innings: Some(2),
                innings_per_side: 1,
                balls_per_over: 6,
                team_size: 11,
                powerplays: vec![PowerplayWindow { first_over: 1, last_over: 1 }],
                max_overs_per_bowler: Some(1),
                strike_policy: StrikePolicy::DismissedEnd,
                wide_penalty: 1,
                no_ball_penalty: 1,
            },
        ]
        .into_iter()
        .map(|f| (f.format_id.clone(), f))
        .collect();

        let leagues = [
            FantasyLeague {
                league_id: "classic".into(),
                label: "Classic".into(),
                team_size: 11,
                tie_break: TieBreak::MostRecentEvent,
                scoring_rules: ScoringRules {
                    runs: 1.0,
                    fours: 1.0,
                    sixes: 2.0,
                    duck: -2.0,
                    wickets: 25.0,
                    maidens: 12.0,
                    catches: 8.0,
                    run_outs: 6.0,
                    stumpings: 12.0,
                    half_century: 8.0,
                    century: 16.0,
                    three_wicket_haul: 4.0,
                    five_wicket_haul: 8.0,
                    ..ScoringRules::default()
                },
            },
            FantasyLeague {
                league_id: "simple".into(),
                label: "Runs and catches".into(),
                team_size: 11,
                tie_break: TieBreak::EarliestEntry,
                scoring_rules: ScoringRules {
                    runs: 1.0,
                    catches: 4.0,
                    ..ScoringRules::default()
                },
            },
        ]
        .into_iter()
        .map(|l| (l.league_id.clone(), l))
        .collect();

        Self {
            formats,
            leagues,
            ledger: LedgerConfig {
                checkpoint_interval: 10,
                ..LedgerConfig::default()
            },
        }
    }
}
