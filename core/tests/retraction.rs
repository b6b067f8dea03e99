//! Retractions: a corrected delivery is nullified and every cache rewinds.

mod common;

use common::{fixture, service_with_match, Scorer};
use cricket_core::{
    config::ScoringConfig,
    error::ScoreError,
    event::{Delivery, DismissalKind, EventKind, Wicket},
    figures::{BattingFigures, BowlingFigures, FieldingFigures, PlayerFigures, Scope},
    innings::InningsState,
    service::ScoringService,
    store::ScoreStore,
};
use std::collections::BTreeMap;
use std::time::Duration;

type Counters = BTreeMap<String, (BattingFigures, BowlingFigures, FieldingFigures)>;

/// Figures without the sequence bookkeeping, which differs between two
/// ledgers even when the cricket is the same.
fn counters(figures: BTreeMap<String, PlayerFigures>) -> Counters {
    figures
        .into_iter()
        .map(|(id, f)| (id, (f.batting, f.bowling, f.fielding)))
        .collect()
}

fn without_cursor(mut state: InningsState) -> InningsState {
    state.last_applied_sequence = 0;
    state
}

#[test]
fn retracting_a_boundary_removes_it_everywhere() {
    let service = service_with_match("ret-four", "T20");
    let mut s = Scorer::new(&service, "ret-four", 1);
    s.runs("a11", 1); // seq 1
    s.runs("a11", 4); // seq 2, h02 on strike
    s.runs("a11", 0); // seq 3

    let out = service.retract("ret-four", 2, "scorer error", "fix-1", Some(3)).unwrap();
    assert_eq!(out.sequence, 4);
    assert!(!out.replayed);

    let state = out.state;
    assert_eq!(state.total_runs, 1);
    assert_eq!(state.legal_balls, 2);
    assert_eq!(state.deliveries_this_over, 2);
    assert_eq!(state.last_applied_sequence, 4);

    let figures = service.get_player_figures("ret-four", Scope::Innings(1)).unwrap();
    assert_eq!(figures["h02"].batting.runs, 0);
    assert_eq!(figures["h02"].batting.fours, 0);
    assert_eq!(figures["h02"].batting.balls_faced, 1);
    assert_eq!(figures["a11"].bowling.runs_conceded, 1);

    // The ledger keeps both the original and its retraction.
    let events = service.replay_events("ret-four", None, 1).unwrap();
    assert_eq!(events.len(), 4);
    assert_eq!(events[3].retracts(), Some(2));
    assert!(service.reconcile("ret-four").unwrap().is_clean());

    // Play continues from the rewound position.
    let next = s.next("a11");
    assert_eq!((next.over, next.ball), (1, 3));
    s.runs("a11", 2);
}

#[test]
fn retracting_a_wicket_restores_the_batter() {
    let service = service_with_match("ret-wicket", "T20");
    let mut s = Scorer::new(&service, "ret-wicket", 1);
    s.runs("a11", 0);
    let d = s.next("a11");
    let out = d.striker.clone();
    s.submit(EventKind::Wicket(
        d.with_wicket(Wicket::new(DismissalKind::Caught, out).by("a03")),
    ))
    .unwrap();
    assert_eq!(s.state().wickets, 1);

    let state = service.retract("ret-wicket", 2, "not out on review", "fix-w", None).unwrap().state;
    assert_eq!(state.wickets, 0);
    assert!(state.dismissed.is_empty());

    let figures = service.get_player_figures("ret-wicket", Scope::Innings(1)).unwrap();
    assert_eq!(figures["h01"].batting.outs, 0);
    assert_eq!(figures["a11"].bowling.wickets, 0);
    assert_eq!(figures.get("a03").map_or(0, |p| p.fielding.catches), 0);
}

#[test]
fn retraction_rewinds_through_checkpoints() {
    // Checkpoints every 10 sequences in the test configuration.
    let service = service_with_match("ret-cp", "T20");
    let mut s = Scorer::new(&service, "ret-cp", 1);
    let bowlers = ["a11", "a10", "a09"];
    for i in 0..25 {
        s.runs(bowlers[(i / 6) % 3], 1);
    }
    assert_eq!(service.store().checkpoint_sequences("ret-cp").unwrap(), vec![10, 20]);

    // Retract inside the third window: checkpoint 20 is stale, 10 is the base.
    s.runs("a10", 6); // seq 26
    let out = service.retract("ret-cp", 15, "wrong batter credited", "fix-cp", Some(26)).unwrap();
    assert_eq!(out.sequence, 27);
    assert_eq!(out.state.total_runs, 25 + 6 - 1);
    // The rebuild re-saves the checkpoint it passed on the way up.
    assert_eq!(service.store().checkpoint_sequences("ret-cp").unwrap(), vec![10, 20]);
    assert!(service.reconcile("ret-cp").unwrap().is_clean());

    // Retract before the first checkpoint: rebuilt from sequence 1.
    let out = service.retract("ret-cp", 3, "duplicate entry", "fix-early", Some(27)).unwrap();
    assert_eq!(out.state.total_runs, 25 + 6 - 2);
    assert!(service.reconcile("ret-cp").unwrap().is_clean());

    let from_scratch = service.replay_state("ret-cp", 1, 28, None).unwrap();
    assert_eq!(from_scratch, service.get_innings_state("ret-cp", 1).unwrap());
}

#[test]
fn retraction_is_idempotent_by_key() {
    let service = service_with_match("ret-idem", "T20");
    let mut s = Scorer::new(&service, "ret-idem", 1);
    s.runs("a11", 2);
    s.runs("a11", 2);

    let first = service.retract("ret-idem", 1, "typo", "fix-1", Some(2)).unwrap();
    let again = service.retract("ret-idem", 1, "typo", "fix-1", Some(2)).unwrap();
    assert_eq!(first.sequence, again.sequence);
    assert!(again.replayed);
    assert_eq!(service.last_sequence("ret-idem").unwrap(), 3);
}

#[test]
fn invalid_retractions_are_rejected() {
    let service = service_with_match("ret-bad", "TEST");
    let mut s = Scorer::new(&service, "ret-bad", 1);
    s.runs("a11", 1);
    service.suspend("ret-bad", 1, "bad light", "susp", Some(1)).unwrap();
    service.resume("ret-bad", 1, "res", Some(2)).unwrap();

    let validation = |r: Result<_, ScoreError>| match r {
        Err(ScoreError::Validation { reason, .. }) => reason,
        other => panic!("expected Validation, got {other:?}"),
    };

    let reason = validation(service.retract("ret-bad", 9, "missing", "r1", None));
    assert!(reason.contains("no event at sequence 9"), "{reason}");

    let reason = validation(service.retract("ret-bad", 2, "not a ball", "r2", None));
    assert!(reason.contains("not a delivery"), "{reason}");

    let reason = validation(service.retract("ret-bad", 1, "  ", "r3", None));
    assert!(reason.contains("needs a reason"), "{reason}");

    service.retract("ret-bad", 1, "wrong", "r4", None).unwrap();
    let reason = validation(service.retract("ret-bad", 1, "again", "r5", None));
    assert!(reason.contains("already retracted"), "{reason}");

    // Closed innings cannot be corrected.
    s.runs("a11", 3);
    let head = service.last_sequence("ret-bad").unwrap();
    service.declare("ret-bad", 1, "decl", Some(head)).unwrap();
    let mut second = Scorer::new(&service, "ret-bad", 2);
    second.runs("h11", 0);
    let reason = validation(service.retract("ret-bad", head, "too late", "r6", None));
    assert!(reason.contains("play is in innings 2"), "{reason}");
}

#[test]
fn retraction_publishes_the_players_it_changed() {
    let service = service_with_match("ret-delta", "T20");
    let mut rx = service.subscribe("ret-delta").unwrap();
    let mut s = Scorer::new(&service, "ret-delta", 1);
    s.runs("a11", 4);
    s.runs("a11", 0);
    service.retract("ret-delta", 1, "short run", "fix", Some(2)).unwrap();

    let mut deltas = Vec::new();
    while let Ok(d) = rx.try_recv() {
        deltas.push(d);
    }
    assert_eq!(deltas.len(), 3);
    let retraction = &deltas[2];
    assert_eq!(retraction.sequence, 3);
    assert_eq!(retraction.innings_state.total_runs, 0);
    let changed: Vec<&str> = retraction
        .changed_figures
        .iter()
        .map(|f| f.player_id.as_str())
        .collect();
    assert!(changed.contains(&"h01"));
    assert!(changed.contains(&"a11"));
}

#[test]
fn a_retracted_ball_leaves_no_trace_beside_a_match_that_never_had_it() {
    let service = service_with_match("ret-twin-a", "T20");
    service.register_match(fixture("ret-twin-b", "T20")).unwrap();

    let mut a = Scorer::new(&service, "ret-twin-a", 1);
    a.runs("a11", 1);
    a.runs("a11", 4); // seq 2, retracted below
    for r in [0, 2, 1] {
        a.runs("a11", r);
    }
    service.retract("ret-twin-a", 2, "boundary was short", "fix", Some(5)).unwrap();

    let mut b = Scorer::new(&service, "ret-twin-b", 1);
    for r in [1, 0, 2, 1] {
        b.runs("a11", r);
    }

    let state_a = service.get_innings_state("ret-twin-a", 1).unwrap();
    let state_b = service.get_innings_state("ret-twin-b", 1).unwrap();
    assert_eq!(state_a.last_applied_sequence, 6);
    assert_eq!(state_b.last_applied_sequence, 4);
    assert_eq!(without_cursor(state_a), without_cursor(state_b));

    for scope in [Scope::Innings(1), Scope::Match] {
        assert_eq!(
            counters(service.get_player_figures("ret-twin-a", scope).unwrap()),
            counters(service.get_player_figures("ret-twin-b", scope).unwrap()),
        );
    }
    let points = |id: &str| service.get_fantasy_points("classic", id).unwrap();
    let totals = |m: BTreeMap<String, cricket_core::fantasy::FantasyPointRecord>| {
        m.into_iter().map(|(id, r)| (id, r.total)).collect::<Vec<_>>()
    };
    assert_eq!(totals(points("ret-twin-a")), totals(points("ret-twin-b")));
}

#[test]
fn a_rebuild_that_times_out_is_redone_before_the_next_ball() {
    let store = ScoreStore::in_memory().expect("store");
    store.migrate().expect("migrate");
    let mut config = ScoringConfig::default_test();
    config.ledger.replay_timeout_ms = 0;
    let service = ScoringService::new(store, config).expect("service");
    service.register_match(fixture("ret-stuck", "T20")).unwrap();

    let mut s = Scorer::new(&service, "ret-stuck", 1);
    s.runs("a11", 4);
    s.runs("a11", 1);

    let err = service.retract("ret-stuck", 1, "no boundary", "fix", Some(2)).unwrap_err();
    assert!(matches!(err, ScoreError::Timeout { operation: "replay", .. }), "{err:?}");
    assert!(err.is_retryable());
    assert_eq!(service.ledger().last_sequence("ret-stuck").unwrap(), 3);

    // While the rebuild cannot finish, nothing serves the pre-retraction view.
    let err = service.get_innings_state("ret-stuck", 1).unwrap_err();
    assert!(matches!(err, ScoreError::Timeout { .. }), "{err:?}");
    let next = EventKind::Run(Delivery::new(1, 2, "h02", "h01", "a11").runs(2));
    let err = service.submit_ball("ret-stuck", 1, next, "after", Some(3)).unwrap_err();
    assert!(matches!(err, ScoreError::Timeout { .. }), "{err:?}");

    service.ledger().set_replay_timeout(Duration::from_secs(5));
    let again = service.retract("ret-stuck", 1, "no boundary", "fix", Some(2)).unwrap();
    assert!(again.replayed);
    assert_eq!(again.sequence, 3);
    assert_eq!(again.state.total_runs, 1);
    assert_eq!(again.state.last_applied_sequence, 3);

    let state = s.runs("a11", 2).state;
    assert_eq!(state.last_applied_sequence, 4);
    assert_eq!(state.total_runs, 3);
    assert!(service.reconcile("ret-stuck").unwrap().is_clean());
}
