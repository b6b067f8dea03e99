//! One writer per match: competing submissions and parallel matches.

mod common;

use common::{fixture, service_with_match, Scorer};
use cricket_core::{
    config::ScoringConfig,
    error::{ConflictReason, ScoreError},
    event::EventKind,
    figures::Scope,
    service::ScoringService,
    store::ScoreStore,
};
use std::sync::Barrier;
use std::time::{Duration, Instant};

#[test]
fn two_scorers_racing_for_the_same_ball_commit_once() {
    let service = service_with_match("cc-race", "T20");
    let ball = Scorer::new(&service, "cc-race", 1).next("a11");
    let barrier = Barrier::new(2);

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = [(1u8, "tablet-a"), (4u8, "tablet-b")]
            .into_iter()
            .map(|(runs, key)| {
                let event = EventKind::Run(ball.clone().runs(runs));
                let service = &service;
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    service.submit_ball("cc-race", 1, event, key, Some(0))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("thread")).collect()
    });

    let committed: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(committed.len(), 1);
    assert_eq!(committed[0].sequence, 1);

    let loser = results.iter().find_map(|r| r.as_ref().err()).expect("one conflict");
    match loser {
        ScoreError::Conflict { reason, last_good_sequence, .. } => {
            assert_eq!(*reason, ConflictReason::StaleSequence { expected: 0 });
            assert_eq!(*last_good_sequence, 1);
        }
        other => panic!("expected Conflict, got {other:?}"),
    }
    assert_eq!(service.last_sequence("cc-race").unwrap(), 1);
}

#[test]
fn readers_never_see_a_half_applied_event() {
    let service = service_with_match("cc-read", "T20");
    std::thread::scope(|scope| {
        let writer = scope.spawn(|| {
            let mut s = Scorer::new(&service, "cc-read", 1);
            let bowlers = ["a11", "a10"];
            for i in 0..36 {
                s.runs(bowlers[(i / 6) % 2], 1);
            }
        });
        let reader = scope.spawn(|| {
            while !writer_done(&service) {
                let view = service.snapshot("cc-read").expect("snapshot");
                let state = view.scoreboard.innings(1).expect("innings").clone();
                assert_eq!(state.total_runs, state.legal_balls);
                assert_eq!(state.last_applied_sequence, view.last_sequence());
                assert_eq!(view.figures.batting_runs(1), state.total_runs);
            }
        });
        writer.join().expect("writer");
        reader.join().expect("reader");
    });
    assert_eq!(service.get_innings_state("cc-read", 1).unwrap().total_runs, 36);
}

fn writer_done(service: &ScoringService) -> bool {
    service.last_sequence("cc-read").unwrap_or(0) >= 36
}

#[test]
fn separate_matches_progress_in_parallel() {
    let service = ScoringService::build_test().expect("service");
    let ids: Vec<String> = (0..4).map(|i| format!("cc-par-{i}")).collect();
    for id in &ids {
        service.register_match(fixture(id, "T20")).unwrap();
    }

    std::thread::scope(|scope| {
        for (i, id) in ids.iter().enumerate() {
            let service = &service;
            scope.spawn(move || {
                let mut s = Scorer::new(service, id, 1);
                for _ in 0..6 {
                    s.runs("a11", i as u8);
                }
            });
        }
    });

    for (i, id) in ids.iter().enumerate() {
        let state = service.get_innings_state(id, 1).unwrap();
        assert_eq!(state.legal_balls, 6);
        assert_eq!(state.total_runs, 6 * i as u32);
        assert_eq!(state.last_applied_sequence, 6);
        let figures = service.get_player_figures(id, Scope::Match).unwrap();
        assert_eq!(figures["a11"].bowling.runs_conceded, 6 * i as u32);
    }
}

#[test]
fn reads_do_not_wait_behind_a_pending_append() {
    let path = std::env::temp_dir().join(format!("cc-pending-{}.db", uuid::Uuid::new_v4()));
    let path = path.to_string_lossy().to_string();

    let store = ScoreStore::open(&path).expect("open");
    store.migrate().expect("migrate");
    let mut config = ScoringConfig::default_test();
    config.ledger.append_timeout_ms = 10_000;
    let service = ScoringService::new(store, config).expect("service");
    service.register_match(fixture("cc-pending", "T20")).expect("register");
    let mut s = Scorer::new(&service, "cc-pending", 1);
    s.runs("a11", 4);

    let blocker = rusqlite::Connection::open(&path).expect("second connection");
    blocker.execute_batch("BEGIN IMMEDIATE;").expect("take write lock");

    let next = EventKind::Run(s.next("a11").runs(1));
    std::thread::scope(|scope| {
        let writer = scope.spawn(|| service.submit_ball("cc-pending", 1, next, "pending", Some(1)));
        // Let the writer reach the database lock.
        std::thread::sleep(Duration::from_millis(200));

        let started = Instant::now();
        let state = service.get_innings_state("cc-pending", 1).expect("state");
        let figures = service.get_player_figures("cc-pending", Scope::Match).expect("figures");
        let view = service.snapshot("cc-pending").expect("snapshot");
        let waited = started.elapsed();
        assert!(waited < Duration::from_secs(2), "reads took {waited:?} during a pending write");
        assert_eq!(state.last_applied_sequence, 1);
        assert_eq!(state.total_runs, 4);
        assert_eq!(figures["h01"].batting.runs, 4);
        assert_eq!(view.last_sequence(), 1);
        assert!(!writer.is_finished(), "the append should still be waiting");

        blocker.execute_batch("ROLLBACK;").expect("release");
        let committed = writer.join().expect("writer").expect("append after release");
        assert_eq!(committed.sequence, 2);
    });
    assert_eq!(service.get_innings_state("cc-pending", 1).unwrap().total_runs, 5);

    drop(service);
    drop(blocker);
    let _ = std::fs::remove_file(&path);
}
