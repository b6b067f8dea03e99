//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use cricket_core::{
    error::ScoreResult,
    event::{Delivery, EventKind},
    fixture::{MatchFixture, TeamSheet},
    innings::InningsState,
    service::{ScoringService, SubmitOutcome},
    types::{InningsNo, PlayerId, Sequence},
};

/// `home` bats first with h01..h11; `away` fields with a01..a11.
pub fn fixture(match_id: &str, format_id: &str) -> MatchFixture {
    let sheet = |team: &str, prefix: char| TeamSheet {
        team_id: team.to_string(),
        players: (1..=11).map(|n| format!("{prefix}{n:02}")).collect(),
    };
    MatchFixture {
        match_id: match_id.to_string(),
        format_id: format_id.to_string(),
        sides: [sheet("home", 'h'), sheet("away", 'a')],
    }
}

/// `RUST_LOG=debug cargo test` shows the service's logging.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn service_with_match(match_id: &str, format_id: &str) -> ScoringService {
    init_logging();
    let service = ScoringService::build_test().expect("test service");
    service
        .register_match(fixture(match_id, format_id))
        .expect("register match");
    service
}

/// Plays deliveries the way a scoring operator would: each one addressed
/// to the next over and ball, with the current pair at the crease.
pub struct Scorer<'a> {
    pub service: &'a ScoringService,
    pub match_id: String,
    pub innings: InningsNo,
    submitted: u64,
}

impl<'a> Scorer<'a> {
    pub fn new(service: &'a ScoringService, match_id: &str, innings: InningsNo) -> Self {
        Self { service, match_id: match_id.to_string(), innings, submitted: 0 }
    }

    pub fn state(&self) -> InningsState {
        self.service
            .get_innings_state(&self.match_id, self.innings)
            .expect("innings state")
    }

    pub fn head(&self) -> Sequence {
        self.service.last_sequence(&self.match_id).expect("last sequence")
    }

    /// The next delivery, filling an empty crease in batting order.
    pub fn next(&self, bowler: &str) -> Delivery {
        let state = self.state();
        let view = self.service.snapshot(&self.match_id).expect("snapshot");
        let mut waiting = view
            .scoreboard
            .fixture
            .batting(self.innings)
            .players
            .clone()
            .into_iter()
            .filter(|p| {
                !state.dismissed.contains(p)
                    && state.striker.as_ref() != Some(p)
                    && state.non_striker.as_ref() != Some(p)
            });
        let striker: PlayerId = state.striker.clone().unwrap_or_else(|| waiting.next().expect("batter"));
        let non_striker: PlayerId =
            state.non_striker.clone().unwrap_or_else(|| waiting.next().expect("batter"));
        Delivery::new(
            state.current_over(),
            state.deliveries_this_over + 1,
            striker,
            non_striker,
            bowler,
        )
    }

    pub fn submit(&mut self, event: EventKind) -> ScoreResult<SubmitOutcome> {
        self.submitted += 1;
        let key = format!("{}-{}-k{}", self.match_id, self.innings, self.submitted);
        let head = self.head();
        self.service
            .submit_ball(&self.match_id, self.innings, event, &key, Some(head))
    }

    pub fn runs(&mut self, bowler: &str, runs: u8) -> SubmitOutcome {
        let d = self.next(bowler).runs(runs);
        self.submit(EventKind::Run(d)).expect("run")
    }

    /// Six dot balls.
    pub fn maiden(&mut self, bowler: &str) {
        for _ in 0..6 {
            self.runs(bowler, 0);
        }
    }
}
