//! score-runner: headless runner for the cricket scoring core.
//!
//! Usage:
//!   score-runner --seed 12345 --format T20 --db match.db
//!   score-runner --seed 7 --format ODI --overs 10
//!   score-runner --db match.db --ipc-mode < commands.jsonl

use anyhow::Result;
use cricket_core::{
    command::ScoringCommand,
    config::ScoringConfig,
    error::ScoreError,
    fantasy::FantasyTeam,
    figures::Scope,
    fixture::{MatchFixture, TeamSheet},
    projection::MatchView,
    service::ScoringService,
    simulator::MatchSimulator,
    store::ScoreStore,
    types::{InningsNo, MatchId},
};
use std::env;
use std::io::{self, BufRead, Write};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcRequest {
    RegisterMatch { fixture: MatchFixture },
    Command { command: ScoringCommand },
    GetState { match_id: MatchId, innings: InningsNo },
    Figures { match_id: MatchId, scope: Scope },
    Fantasy { league_id: String, match_id: MatchId },
    RegisterTeam { team: FantasyTeam },
    Leaderboard { league_id: String, match_id: MatchId },
    Reconcile { match_id: MatchId },
    Quit,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let overs = parse_arg(&args, "--overs", 0u16);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let format_id = string_arg(&args, "--format", "T20");
    let db = string_arg(&args, "--db", ":memory:");
    let data_dir = string_arg(&args, "--data-dir", "./data");

    let mut config = ScoringConfig::load(data_dir)?;
    if overs > 0 {
        let format = config
            .formats
            .get_mut(format_id)
            .ok_or_else(|| anyhow::anyhow!("unknown format {format_id}"))?;
        if format.overs_per_innings.is_some() {
            format.overs_per_innings = Some(overs);
            // Five specialists must be able to bowl the innings out.
            format.max_overs_per_bowler = format.max_overs_per_bowler.map(|q| q.max(overs.div_ceil(5)));
        }
    }

    if !ipc_mode {
        println!("score-runner");
        println!("  seed:      {seed}");
        println!("  format:    {format_id}");
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!();
    }

    let store = if db == ":memory:" {
        ScoreStore::in_memory()?
    } else {
        ScoreStore::open(db)?
    };
    store.migrate()?;
    let service = ScoringService::new(store, config)?;
    let recovered = service.recover()?;
    log::info!("{recovered} match(es) recovered from {db}");

    if ipc_mode {
        run_ipc_loop(&service)?;
    } else {
        let match_id = format!("{format_id}-{seed}-{}", chrono::Utc::now().timestamp());
        service.register_match(demo_fixture(&service, &match_id, format_id)?)?;
        let mut sim = MatchSimulator::new(&service, seed).with_interruptions(0.002);
        if overs > 0 {
            sim = sim.declare_after(overs);
        }
        let view = sim.play_match(&match_id)?;
        print_scorecard(&service, &view)?;
    }
    Ok(())
}

fn run_ipc_loop(service: &ScoringService) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let request: IpcRequest = match serde_json::from_str(&buffer) {
            Ok(r) => r,
            Err(e) => {
                writeln!(stdout, "{}", serde_json::json!({ "error": e.to_string() }))?;
                stdout.flush()?;
                continue;
            }
        };
        if matches!(request, IpcRequest::Quit) {
            break;
        }

        let response = match handle_request(service, request) {
            Ok(value) => value,
            Err(e) => error_json(&e),
        };
        writeln!(stdout, "{response}")?;
        stdout.flush()?;
    }
    Ok(())
}

fn handle_request(
    service: &ScoringService,
    request: IpcRequest,
) -> Result<serde_json::Value, ScoreError> {
    let value = match request {
        IpcRequest::RegisterMatch { fixture } => {
            let match_id = fixture.match_id.clone();
            service.register_match(fixture)?;
            serde_json::json!({ "registered": match_id })
        }
        IpcRequest::Command { command } => serde_json::to_value(service.execute(command)?)?,
        IpcRequest::GetState { match_id, innings } => {
            serde_json::to_value(service.get_innings_state(&match_id, innings)?)?
        }
        IpcRequest::Figures { match_id, scope } => {
            serde_json::to_value(service.get_player_figures(&match_id, scope)?)?
        }
        IpcRequest::Fantasy { league_id, match_id } => {
            serde_json::to_value(service.get_fantasy_points(&league_id, &match_id)?)?
        }
        IpcRequest::RegisterTeam { team } => serde_json::to_value(service.register_fantasy_team(team)?)?,
        IpcRequest::Leaderboard { league_id, match_id } => {
            serde_json::to_value(service.leaderboard(&league_id, &match_id)?)?
        }
        IpcRequest::Reconcile { match_id } => serde_json::to_value(service.reconcile(&match_id)?)?,
        IpcRequest::Quit => serde_json::Value::Null,
    };
    Ok(value)
}

/// Operators see the error and the sequence to resume from.
fn error_json(e: &ScoreError) -> serde_json::Value {
    serde_json::json!({
        "error": e.to_string(),
        "retryable": e.is_retryable(),
        "last_good_sequence": e.last_good_sequence(),
    })
}

fn demo_fixture(service: &ScoringService, match_id: &str, format_id: &str) -> Result<MatchFixture> {
    let team_size = service.config().format(format_id)?.team_size;
    let sheet = |team: &str| TeamSheet {
        team_id: team.to_string(),
        players: (1..=team_size).map(|n| format!("{team}-{n:02}")).collect(),
    };
    Ok(MatchFixture {
        match_id: match_id.to_string(),
        format_id: format_id.to_string(),
        sides: [sheet("home"), sheet("away")],
    })
}

fn print_scorecard(service: &ScoringService, view: &MatchView) -> Result<()> {
    let match_id = &view.scoreboard.match_id;
    println!("=== SCORECARD {match_id} ===");
    for state in &view.scoreboard.innings {
        let figures = service.get_player_figures(match_id, Scope::Innings(state.innings))?;
        println!();
        println!(
            "  Innings {}: {} {}/{} ({} overs) {:?}",
            state.innings,
            state.batting_team,
            state.total_runs,
            state.wickets,
            state.overs(),
            state.completion
        );
        if let Some(target) = state.target {
            println!("    target: {target}");
        }
        let mut batters: Vec<_> = figures.values().filter(|p| p.batting.innings_batted > 0).collect();
        batters.sort_by(|a, b| b.batting.runs.cmp(&a.batting.runs));
        for p in batters.iter().take(5) {
            let sr = p
                .batting
                .strike_rate()
                .map_or_else(|| "-".to_string(), |v| format!("{v:.1}"));
            let status = p.batting.how_out.map_or("not out".to_string(), |k| format!("{k:?}"));
            println!(
                "    {:<10} {:>3} ({:>3}b, {}x4, {}x6) SR {sr} {status}",
                p.player_id, p.batting.runs, p.batting.balls_faced, p.batting.fours, p.batting.sixes
            );
        }
        let mut bowlers: Vec<_> = figures.values().filter(|p| p.bowling.legal_balls > 0).collect();
        bowlers.sort_by(|a, b| b.bowling.wickets.cmp(&a.bowling.wickets));
        for p in bowlers.iter().take(3) {
            let econ = p
                .bowling
                .economy()
                .map_or_else(|| "-".to_string(), |v| format!("{v:.2}"));
            println!(
                "    {:<10} {}-{}-{}-{} econ {econ}",
                p.player_id,
                p.bowling.overs(),
                p.bowling.maidens,
                p.bowling.runs_conceded,
                p.bowling.wickets
            );
        }
        println!("    extras: {}", state.extras.total());
    }

    println!();
    match service.reconcile(match_id) {
        Ok(_) => println!("=== RECONCILIATION: clean ==="),
        Err(e) => println!("=== RECONCILIATION: {e} ==="),
    }

    let mut leagues: Vec<_> = service.config().leagues.keys().cloned().collect();
    leagues.sort();
    for league in leagues {
        let points = service.get_fantasy_points(&league, match_id)?;
        let mut top: Vec<_> = points.values().collect();
        top.sort_by(|a, b| b.total.total_cmp(&a.total));
        println!();
        println!("=== FANTASY ({league}) top 5 ===");
        for r in top.iter().take(5) {
            println!("  {:<10} {:>6.1}", r.player_id, r.total);
        }
    }
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn string_arg<'a>(args: &'a [String], flag: &str, default: &'a str) -> &'a str {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
        .unwrap_or(default)
}
