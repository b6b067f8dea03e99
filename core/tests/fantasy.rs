//! Fantasy points: rule application, captaincy and league standings.

mod common;

use common::{service_with_match, Scorer};
use cricket_core::{
    config::ScoringRules,
    error::ScoreError,
    event::{DismissalKind, EventKind, Wicket},
    fantasy::{score, FantasyTeam, Role},
    figures::{PlayerFigures, Scope},
};

fn team(team_id: &str, league: &str, star: &str) -> FantasyTeam {
    let mut players: Vec<String> = (1..=10).map(|n| format!("{team_id}-x{n:02}")).collect();
    players.push(star.to_string());
    FantasyTeam {
        team_id: team_id.to_string(),
        league_id: league.to_string(),
        owner: format!("owner of {team_id}"),
        players,
        captain: star.to_string(),
        vice_captain: format!("{team_id}-x01"),
        entry_order: 0,
    }
}

#[test]
fn runs_and_catches_with_captaincy() {
    let rules = ScoringRules { runs: 1.0, catches: 4.0, ..ScoringRules::default() };
    let mut figures = PlayerFigures::new("p1", 6);
    figures.batting.runs = 50;
    figures.fielding.catches = 2;

    let plain = score(&figures, &rules, Role::Player);
    assert_eq!(plain.total, 58.0);
    assert_eq!(plain.breakdown.batting, 50.0);
    assert_eq!(plain.breakdown.fielding, 8.0);

    let captain = score(&figures, &rules, Role::Captain);
    assert_eq!(captain.total, 116.0);
    assert_eq!(captain.multiplier, 2.0);

    let vice = score(&figures, &rules, Role::ViceCaptain);
    assert_eq!(vice.total, 87.0);
}

#[test]
fn bonuses_apply_at_their_thresholds() {
    let rules = ScoringRules {
        wickets: 25.0,
        three_wicket_haul: 4.0,
        five_wicket_haul: 8.0,
        half_century: 8.0,
        century: 16.0,
        ..ScoringRules::default()
    };
    let mut f = PlayerFigures::new("p1", 6);
    f.bowling.wickets = 3;
    f.batting.runs = 99;
    let r = score(&f, &rules, Role::Player);
    assert_eq!(r.breakdown.bowling, 75.0);
    assert_eq!(r.breakdown.bonus, 12.0);

    f.bowling.wickets = 5;
    f.batting.runs = 100;
    assert_eq!(score(&f, &rules, Role::Player).breakdown.bonus, 24.0);
}

#[test]
fn points_follow_the_ledger() {
    let service = service_with_match("fan-live", "T20");
    let mut s = Scorer::new(&service, "fan-live", 1);
    s.runs("a11", 4);
    let d = s.next("a11");
    let out = d.striker.clone();
    s.submit(EventKind::Wicket(d.with_wicket(Wicket::new(DismissalKind::Caught, out).by("a02"))))
        .unwrap();

    let points = service.get_fantasy_points("simple", "fan-live").unwrap();
    assert_eq!(points["h01"].total, 4.0);
    assert_eq!(points["a02"].total, 4.0);
    assert_eq!(points["a02"].last_points_sequence, 2);

    let classic = service.get_fantasy_points("classic", "fan-live").unwrap();
    // 4 runs + 1 for the four, out for 4 so no duck.
    assert_eq!(classic["h01"].total, 5.0);
    assert_eq!(classic["a11"].total, 25.0);
    assert_eq!(classic["a02"].total, 8.0);

    let err = service.get_fantasy_points("no-such-league", "fan-live").unwrap_err();
    assert!(matches!(err, ScoreError::NotFound { what: "fantasy league", .. }));
}

#[test]
fn team_total_applies_captain_and_vice_captain_once() {
    let service = service_with_match("fan-team", "T20");
    let mut s = Scorer::new(&service, "fan-team", 1);
    s.runs("a11", 1); // h01, then h02 faces
    s.runs("a11", 3);

    let mut t = team("t1", "simple", "h01");
    t.players[0] = "h02".into();
    t.vice_captain = "h02".into();
    service.register_fantasy_team(t).unwrap();

    let total = service.fantasy_team_total("t1", "fan-team").unwrap();
    // h01: 1 run x2, h02: 3 runs x1.5.
    assert_eq!(total.total, 2.0 + 4.5);
    assert_eq!(total.records.len(), 11);
}

#[test]
fn invalid_teams_are_rejected() {
    let service = service_with_match("fan-bad", "T20");

    let mut short = team("short", "simple", "h01");
    short.players.pop();
    let err = service.register_fantasy_team(short).unwrap_err();
    assert!(matches!(err, ScoreError::InvalidSetup { what: "fantasy team", .. }));

    let mut same = team("same", "simple", "h01");
    same.vice_captain = "h01".into();
    assert!(service.register_fantasy_team(same).is_err());

    let mut outsider = team("outsider", "simple", "h01");
    outsider.captain = "h09".into();
    assert!(service.register_fantasy_team(outsider).is_err());

    service.register_fantasy_team(team("dup", "simple", "h01")).unwrap();
    assert!(service.register_fantasy_team(team("dup", "simple", "h01")).is_err());
}

#[test]
fn earliest_entry_breaks_ties() {
    let service = service_with_match("fan-early", "T20");
    let mut s = Scorer::new(&service, "fan-early", 1);
    s.runs("a11", 1); // h01
    s.runs("a11", 1); // h02

    let first = service.register_fantasy_team(team("early", "simple", "h02")).unwrap();
    let second = service.register_fantasy_team(team("late", "simple", "h01")).unwrap();
    assert_eq!((first.entry_order, second.entry_order), (1, 2));

    let board = service.leaderboard("simple", "fan-early").unwrap();
    let order: Vec<(&str, usize)> = board.iter().map(|s| (s.team_id.as_str(), s.rank)).collect();
    assert_eq!(order, vec![("early", 1), ("late", 2)]);
    assert_eq!(board[0].total, board[1].total);
}

#[test]
fn most_recent_points_break_ties() {
    let service = service_with_match("fan-recent", "T20");
    let mut s = Scorer::new(&service, "fan-recent", 1);
    s.runs("a11", 1); // h01 at sequence 1
    s.runs("a11", 1); // h02 at sequence 2

    service.register_fantasy_team(team("first-in", "classic", "h01")).unwrap();
    service.register_fantasy_team(team("latest", "classic", "h02")).unwrap();

    let board = service.leaderboard("classic", "fan-recent").unwrap();
    assert_eq!(board[0].team_id, "latest");
    assert_eq!(board[0].last_points_sequence, 2);
    assert_eq!(board[1].team_id, "first-in");
    assert_eq!(board[0].total, 2.0);
    assert_eq!(board[1].total, 2.0);
    assert_eq!((board[0].rank, board[1].rank), (1, 2));
}

#[test]
fn dot_balls_do_not_count_as_recent_points() {
    let service = service_with_match("fan-dot", "T20");
    let mut s = Scorer::new(&service, "fan-dot", 1);
    s.runs("a11", 1); // h01 at sequence 1
    s.runs("a11", 1); // h02 at sequence 2
    s.runs("a11", 0); // h01 faces a dot at sequence 3

    let figures = service.get_player_figures("fan-dot", Scope::Match).unwrap();
    assert_eq!(figures["h01"].last_changed_sequence, 3);
    let points = service.get_fantasy_points("classic", "fan-dot").unwrap();
    assert_eq!(points["h01"].last_points_sequence, 1);
    assert_eq!(points["h02"].last_points_sequence, 2);

    service.register_fantasy_team(team("dotted", "classic", "h01")).unwrap();
    service.register_fantasy_team(team("scored", "classic", "h02")).unwrap();
    let board = service.leaderboard("classic", "fan-dot").unwrap();
    assert_eq!(board[0].total, board[1].total);
    assert_eq!(board[0].team_id, "scored");
    assert_eq!(board[0].last_points_sequence, 2);
    assert_eq!(board[1].last_points_sequence, 1);
}

#[test]
fn points_recompute_after_a_retraction() {
    let service = service_with_match("fan-retract", "T20");
    let mut s = Scorer::new(&service, "fan-retract", 1);
    s.runs("a11", 6);
    service.register_fantasy_team(team("t", "classic", "h01")).unwrap();
    assert_eq!(service.fantasy_team_total("t", "fan-retract").unwrap().total, 16.0);

    service.retract("fan-retract", 1, "was a four", "fix", Some(1)).unwrap();
    assert_eq!(service.fantasy_team_total("t", "fan-retract").unwrap().total, 0.0);
}
