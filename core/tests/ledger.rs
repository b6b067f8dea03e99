//! Event ledger: ordered appends, idempotency, lazy and restartable replay.

mod common;

use common::{fixture, service_with_match, Scorer};
use cricket_core::{
    config::ScoringConfig,
    error::{ConflictReason, ScoreError},
    event::EventKind,
    ledger::{derive_idempotency_key, CancelToken},
    service::ScoringService,
    store::ScoreStore,
};
use std::time::Duration;

fn played(match_id: &str, balls: usize) -> ScoringService {
    let service = service_with_match(match_id, "T20");
    let mut s = Scorer::new(&service, match_id, 1);
    let bowlers = ["a11", "a10"];
    for i in 0..balls {
        s.runs(bowlers[(i / 6) % 2], (i % 3) as u8);
    }
    service
}

#[test]
fn sequences_are_contiguous_from_one() {
    let service = played("led-seq", 9);
    let events = service.replay_events("led-seq", None, 1).unwrap();
    let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, (1..=9).collect::<Vec<_>>());
    assert_eq!(service.ledger().last_sequence("led-seq").unwrap(), 9);
}

#[test]
fn resubmitting_the_same_key_returns_the_original_sequence() {
    let service = service_with_match("led-idem", "T20");
    let s = Scorer::new(&service, "led-idem", 1);
    let event = EventKind::Run(s.next("a11").runs(4));

    let first = service.submit_ball("led-idem", 1, event.clone(), "op-1", Some(0)).unwrap();
    // The retry arrives with the stale expected sequence it was first sent with.
    let retry = service.submit_ball("led-idem", 1, event, "op-1", Some(0)).unwrap();

    assert_eq!(first.sequence, 1);
    assert!(!first.replayed);
    assert_eq!(retry.sequence, 1);
    assert!(retry.replayed);
    assert_eq!(retry.state.total_runs, 4);
    assert_eq!(service.last_sequence("led-idem").unwrap(), 1);
}

#[test]
fn reusing_a_key_for_a_different_event_is_a_conflict() {
    let service = service_with_match("led-dup", "T20");
    let s = Scorer::new(&service, "led-dup", 1);
    let d = s.next("a11");
    service.submit_ball("led-dup", 1, EventKind::Run(d.clone().runs(1)), "op-1", Some(0)).unwrap();

    let err = service
        .submit_ball("led-dup", 1, EventKind::Run(d.runs(2)), "op-1", None)
        .unwrap_err();
    match err {
        ScoreError::Conflict { reason, last_good_sequence, .. } => {
            assert_eq!(reason, ConflictReason::DuplicateKey { sequence: 1 });
            assert_eq!(last_good_sequence, 1);
        }
        other => panic!("expected Conflict, got {other:?}"),
    }
}

#[test]
fn stale_expected_sequence_is_a_conflict() {
    let service = played("led-stale", 2);
    let s = Scorer::new(&service, "led-stale", 1);
    let err = service
        .submit_ball("led-stale", 1, EventKind::Run(s.next("a11")), "late", Some(1))
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.last_good_sequence(), Some(2));
    assert!(matches!(
        err,
        ScoreError::Conflict { reason: ConflictReason::StaleSequence { expected: 1 }, .. }
    ));
}

#[test]
fn derived_keys_are_stable_per_submission() {
    let a = derive_idempotency_key("m", 1, 4, 2, "tablet-7:19");
    assert_eq!(a, derive_idempotency_key("m", 1, 4, 2, "tablet-7:19"));
    assert_ne!(a, derive_idempotency_key("m", 1, 4, 3, "tablet-7:19"));
    assert_eq!(a.len(), 64);
}

#[test]
fn replay_is_lazy_and_restartable() {
    let service = played("led-replay", 20);
    let ledger = service.ledger();

    let mut replay = ledger.replay("led-replay", None, 1);
    let first: Vec<u64> = replay.by_ref().take(7).map(|e| e.unwrap().sequence).collect();
    assert_eq!(first, (1..=7).collect::<Vec<_>>());
    let position = replay.position();
    assert_eq!(position, 8);

    let rest: Vec<u64> = ledger
        .replay("led-replay", None, position)
        .map(|e| e.unwrap().sequence)
        .collect();
    assert_eq!(rest, (8..=20).collect::<Vec<_>>());

    let bounded: Vec<u64> = ledger
        .replay("led-replay", None, 5)
        .until(9)
        .map(|e| e.unwrap().sequence)
        .collect();
    assert_eq!(bounded, (5..=9).collect::<Vec<_>>());
}

#[test]
fn replay_filters_by_innings() {
    let service = service_with_match("led-inn", "T2");
    let mut s = Scorer::new(&service, "led-inn", 1);
    for i in 0..12 {
        s.runs(if i < 6 { "a11" } else { "a10" }, 1);
    }
    let mut chase = Scorer::new(&service, "led-inn", 2);
    chase.runs("h11", 1);
    let state = chase.runs("h11", 1).state;
    assert_eq!(state.target, Some(13));
    assert_eq!(state.status, cricket_core::innings::InningsStatus::InProgress);

    let second: Vec<u64> = service
        .ledger()
        .replay("led-inn", Some(2), 1)
        .map(|e| e.unwrap().sequence)
        .collect();
    assert_eq!(second, vec![13, 14]);
}

#[test]
fn cancelled_replay_stops_and_reports_its_position() {
    let service = played("led-cancel", 12);
    let token = CancelToken::new();
    let mut replay = service.ledger().replay("led-cancel", None, 1).with_cancel(token.clone());

    for _ in 0..4 {
        replay.next().unwrap().unwrap();
    }
    token.cancel();
    match replay.next() {
        Some(Err(ScoreError::Cancelled { at })) => assert_eq!(at, 4),
        other => panic!("expected Cancelled, got {other:?}"),
    }
    assert!(replay.next().is_none());
    assert_eq!(replay.position(), 5);

    // Cancelling a state replay leaves committed state alone.
    let token = CancelToken::new();
    token.cancel();
    let err = service.replay_state("led-cancel", 1, 12, Some(token)).unwrap_err();
    assert!(matches!(err, ScoreError::Cancelled { .. }));
    assert_eq!(service.get_innings_state("led-cancel", 1).unwrap().legal_balls, 12);
}

#[test]
fn replay_past_its_deadline_times_out() {
    let service = played("led-deadline", 3);
    let mut replay = service
        .ledger()
        .replay("led-deadline", None, 1)
        .with_timeout(Duration::ZERO);
    assert!(matches!(replay.next(), Some(Err(ScoreError::Timeout { operation: "replay", .. }))));
}

#[test]
fn replay_state_matches_the_live_state_at_each_point() {
    let service = played("led-point", 10);
    let at_four = service.replay_state("led-point", 1, 4, None).unwrap();
    assert_eq!(at_four.legal_balls, 4);
    assert_eq!(at_four.last_applied_sequence, 4);
    // Runs cycle 0, 1, 2, 0: three runs after four balls.
    assert_eq!(at_four.total_runs, 3);

    let now = service.replay_state("led-point", 1, 10, None).unwrap();
    assert_eq!(now, service.get_innings_state("led-point", 1).unwrap());
}

#[test]
fn append_times_out_while_another_writer_holds_the_lock() {
    let path = std::env::temp_dir().join(format!("ledger-lock-{}.db", uuid::Uuid::new_v4()));
    let path = path.to_string_lossy().to_string();

    let store = ScoreStore::open(&path).expect("open");
    store.migrate().expect("migrate");
    let mut config = ScoringConfig::default_test();
    config.ledger.append_timeout_ms = 100;
    let service = ScoringService::new(store, config).expect("service");
    service.register_match(fixture("led-lock", "T20")).expect("register");

    let blocker = rusqlite::Connection::open(&path).expect("second connection");
    blocker.execute_batch("BEGIN IMMEDIATE;").expect("take write lock");

    let s = Scorer::new(&service, "led-lock", 1);
    let err = service
        .submit_ball("led-lock", 1, EventKind::Run(s.next("a11")), "locked", Some(0))
        .unwrap_err();
    assert!(matches!(err, ScoreError::Timeout { operation: "append", .. }), "{err:?}");
    assert!(err.is_retryable());

    blocker.execute_batch("ROLLBACK;").expect("release");
    let ok = service
        .submit_ball("led-lock", 1, EventKind::Run(s.next("a11")), "locked", Some(0))
        .unwrap();
    assert_eq!(ok.sequence, 1);

    drop(service);
    drop(blocker);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn recovery_rebuilds_from_the_persisted_ledger() {
    let path = std::env::temp_dir().join(format!("ledger-recover-{}.db", uuid::Uuid::new_v4()));
    let path = path.to_string_lossy().to_string();
    {
        let store = ScoreStore::open(&path).expect("open");
        store.migrate().expect("migrate");
        let service = ScoringService::new(store, ScoringConfig::default_test()).expect("service");
        service.register_match(fixture("led-recover", "T20")).expect("register");
        let mut s = Scorer::new(&service, "led-recover", 1);
        for i in 0..14 {
            s.runs(if i < 6 || i >= 12 { "a11" } else { "a10" }, 1);
        }
    }

    let store = ScoreStore::open(&path).expect("reopen");
    store.migrate().expect("migrate is idempotent");
    let service = ScoringService::new(store, ScoringConfig::default_test()).expect("service");
    assert_eq!(service.recover().unwrap(), 1);
    let state = service.get_innings_state("led-recover", 1).unwrap();
    assert_eq!(state.total_runs, 14);
    assert_eq!(state.last_applied_sequence, 14);
    assert_eq!(service.store().checkpoint_sequences("led-recover").unwrap(), vec![10]);
    assert!(service.reconcile("led-recover").unwrap().is_clean());

    drop(service);
    let _ = std::fs::remove_file(&path);
}
