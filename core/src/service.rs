//! The scoring service: the single entry point for match progression.
//!
//! WRITE PATH (fixed, never reordered):
//!   1. Take the match's writer turn.
//!   2. Idempotency: a committed key returns its original outcome.
//!   3. Compare the caller's expected sequence with the view's head.
//!   4. Validate against the current state. Nothing is appended on failure.
//!   5. Compare-and-append to the ledger.
//!   6. Fold into a copy of the view, then swap it in.
//!   7. Checkpoint when due, run the totals check, publish the delta.
//!
//! RULES:
//!   - One writer per match; matches never share a writer turn.
//!   - Readers clone a committed snapshot under the view's read lock. The
//!     view is write-locked only for the swap in step 6, so a read never
//!     waits on the database.
//!   - A retraction rebuilds the view before its writer turn ends.
//!   - A write that fails after its event is committed retires the cached
//!     view. The next access rebuilds the match from the ledger.

use crate::{
    broadcast::{BroadcastGateway, DeltaMessage},
    checkpoint::{self, Checkpoint},
    clock::{Clock, SteppedClock, SystemClock},
    command::ScoringCommand,
    config::ScoringConfig,
    error::{ConflictReason, ScoreError, ScoreResult},
    event::{BallEvent, EventKind},
    fantasy::{self, FantasyPointRecord, FantasyStanding, FantasyTeam, Role, TeamScore},
    figures::{PlayerFigures, Scope},
    fixture::MatchFixture,
    innings::InningsState,
    ledger::{CancelToken, EventLedger},
    projection::MatchView,
    reconciliation::{self, ReconciliationIssue, ReconciliationReport},
    store::{ReconIssueRow, ScoreStore},
    types::{InningsNo, MatchId, PlayerId, Sequence},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

/// What a successful write returns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmitOutcome {
    pub sequence: Sequence,
    pub state: InningsState,
    /// True when the idempotency key had already been committed and the
    /// original sequence is being returned.
    pub replayed: bool,
}

/// One match's cached view and the turn its writers queue on.
struct MatchSlot {
    writer: Mutex<()>,
    view: RwLock<MatchView>,
    /// Set once the view has fallen behind the ledger; the slot is out of
    /// the match table and takes no more writes.
    retired: AtomicBool,
}

impl MatchSlot {
    fn new(view: MatchView) -> ViewHandle {
        Arc::new(Self {
            writer: Mutex::new(()),
            view: RwLock::new(view),
            retired: AtomicBool::new(false),
        })
    }

    fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }
}

type ViewHandle = Arc<MatchSlot>;

pub struct ScoringService {
    config: ScoringConfig,
    store: Arc<ScoreStore>,
    ledger: EventLedger,
    gateway: BroadcastGateway,
    clock: Arc<dyn Clock>,
    matches: RwLock<HashMap<MatchId, ViewHandle>>,
}

impl ScoringService {
    pub fn new(store: ScoreStore, config: ScoringConfig) -> ScoreResult<Self> {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: ScoreStore,
        config: ScoringConfig,
        clock: Arc<dyn Clock>,
    ) -> ScoreResult<Self> {
        store.set_busy_timeout(config.ledger.append_timeout())?;
        let store = Arc::new(store);
        Ok(Self {
            ledger: EventLedger::new(store.clone(), config.ledger.clone(), clock.clone()),
            gateway: BroadcastGateway::new(config.ledger.broadcast_capacity),
            config,
            store,
            clock,
            matches: RwLock::new(HashMap::new()),
        })
    }

    /// In-memory store, test configuration and a stepped clock.
    pub fn build_test() -> ScoreResult<Self> {
        let store = ScoreStore::in_memory()?;
        store.migrate()?;
        Self::with_clock(store, ScoringConfig::default_test(), Arc::new(SteppedClock::match_day()))
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn ledger(&self) -> &EventLedger {
        &self.ledger
    }

    pub fn store(&self) -> &ScoreStore {
        &self.store
    }

    // ── Matches ────────────────────────────────────────────────

    /// Register a fixture. Registering the identical fixture again is a no-op.
    pub fn register_match(&self, fixture: MatchFixture) -> ScoreResult<()> {
        let format = self.config.format(&fixture.format_id)?;
        fixture.check(format).map_err(|reason| ScoreError::InvalidSetup {
            what: "fixture",
            id: fixture.match_id.clone(),
            reason,
        })?;

        let inserted = self
            .store
            .insert_fixture(&fixture, &self.clock.now().to_rfc3339())?;
        if !inserted {
            return match self.store.fixture(&fixture.match_id)? {
                Some(existing) if existing == fixture => Ok(()),
                _ => Err(ScoreError::InvalidSetup {
                    what: "fixture",
                    id: fixture.match_id.clone(),
                    reason: "match id already registered with a different fixture".into(),
                }),
            };
        }

        let view = MatchView::new(&fixture, format);
        write_lock(&self.matches)
            .entry(fixture.match_id.clone())
            .or_insert_with(|| MatchSlot::new(view));
        log::info!(
            "match={} registered: {} v {} ({})",
            fixture.match_id,
            fixture.sides[0].team_id,
            fixture.sides[1].team_id,
            fixture.format_id
        );
        Ok(())
    }

    /// Rebuild every registered match from its latest checkpoint and the
    /// ledger. Call once at startup.
    pub fn recover(&self) -> ScoreResult<usize> {
        let fixtures = self.store.fixtures()?;
        let mut recovered = 0;
        for fixture in &fixtures {
            let view = self.rebuild(fixture)?;
            log::info!(
                "match={} recovered at sequence {}",
                fixture.match_id,
                view.last_sequence()
            );
            write_lock(&self.matches).insert(fixture.match_id.clone(), MatchSlot::new(view));
            recovered += 1;
        }
        Ok(recovered)
    }

    fn view(&self, match_id: &str) -> ScoreResult<ViewHandle> {
        if let Some(handle) = read_lock(&self.matches).get(match_id) {
            return Ok(handle.clone());
        }
        let fixture = self.store.fixture(match_id)?.ok_or_else(|| ScoreError::NotFound {
            what: "match",
            id: match_id.to_string(),
        })?;
        let view = self.rebuild(&fixture)?;
        Ok(write_lock(&self.matches)
            .entry(match_id.to_string())
            .or_insert_with(|| MatchSlot::new(view))
            .clone())
    }

    /// Take a slot out of the match table after its view fell behind the
    /// ledger. Writers queued on it retry against a rebuilt one.
    fn retire(&self, match_id: &str, slot: &ViewHandle) {
        slot.retired.store(true, Ordering::Release);
        let mut matches = write_lock(&self.matches);
        if matches.get(match_id).is_some_and(|live| Arc::ptr_eq(live, slot)) {
            matches.remove(match_id);
        }
        log::warn!("match={match_id} cached view retired; next access rebuilds it from the ledger");
    }

    /// Latest checkpoint plus the ledger tail.
    fn rebuild(&self, fixture: &MatchFixture) -> ScoreResult<MatchView> {
        let format = self.config.format(&fixture.format_id)?;
        let head = self.ledger.last_sequence(&fixture.match_id)?;
        let mut view = match self.store.latest_checkpoint_before(&fixture.match_id, head + 1)? {
            Some((sequence, json)) => {
                let cp: Checkpoint = serde_json::from_str(&json)?;
                log::debug!("match={} resuming from checkpoint {sequence}", fixture.match_id);
                cp.view
            }
            None => MatchView::new(fixture, format),
        };
        self.replay_into(&mut view, head, None, true)?;
        Ok(view)
    }

    /// Fold the ledger into `view` from its head up to `up_to`.
    fn replay_into(
        &self,
        view: &mut MatchView,
        up_to: Sequence,
        cancel: Option<CancelToken>,
        save_checkpoints: bool,
    ) -> ScoreResult<()> {
        let match_id = view.scoreboard.match_id.clone();
        let retracted: HashSet<Sequence> =
            self.ledger.retracted(&match_id, up_to)?.into_iter().collect();
        let mut events = self
            .ledger
            .replay(&match_id, None, view.last_sequence() + 1)
            .until(up_to);
        if let Some(token) = cancel {
            events = events.with_cancel(token);
        }
        let interval = self.config.ledger.checkpoint_interval;
        view.replay(events, &retracted, |v| {
            if save_checkpoints && checkpoint::is_due(v.last_sequence(), interval) {
                self.save_checkpoint(v)?;
            }
            Ok(())
        })
    }

    fn save_checkpoint(&self, view: &MatchView) -> ScoreResult<()> {
        let cp = Checkpoint::of(view);
        self.store
            .save_checkpoint(&cp.match_id, cp.sequence, &serde_json::to_string(&cp)?)?;
        log::debug!("match={} checkpoint saved at {}", cp.match_id, cp.sequence);
        Ok(())
    }

    // ── Writes ─────────────────────────────────────────────────

    /// Score one delivery (`run`, `extra` or `wicket`).
    pub fn submit_ball(
        &self,
        match_id: &str,
        innings: InningsNo,
        event: EventKind,
        idempotency_key: &str,
        expected_last: Option<Sequence>,
    ) -> ScoreResult<SubmitOutcome> {
        if event.delivery().is_none() {
            return Err(ScoreError::validation(
                match_id,
                innings,
                self.last_sequence(match_id)?,
                format!("{} is not a delivery", event.type_name()),
            ));
        }
        self.commit(match_id, innings, event, idempotency_key, expected_last)
    }

    pub fn suspend(
        &self,
        match_id: &str,
        innings: InningsNo,
        reason: &str,
        idempotency_key: &str,
        expected_last: Option<Sequence>,
    ) -> ScoreResult<SubmitOutcome> {
        let event = EventKind::Suspended { reason: reason.to_string() };
        self.commit(match_id, innings, event, idempotency_key, expected_last)
    }

    pub fn resume(
        &self,
        match_id: &str,
        innings: InningsNo,
        idempotency_key: &str,
        expected_last: Option<Sequence>,
    ) -> ScoreResult<SubmitOutcome> {
        self.commit(match_id, innings, EventKind::Resumed, idempotency_key, expected_last)
    }

    pub fn declare(
        &self,
        match_id: &str,
        innings: InningsNo,
        idempotency_key: &str,
        expected_last: Option<Sequence>,
    ) -> ScoreResult<SubmitOutcome> {
        self.commit(match_id, innings, EventKind::Declared, idempotency_key, expected_last)
    }

    pub fn execute(&self, command: ScoringCommand) -> ScoreResult<SubmitOutcome> {
        log::debug!("match={} executing {}", command.match_id(), command.name());
        match command {
            ScoringCommand::SubmitBall { match_id, innings, event, idempotency_key, expected_last_sequence } => {
                self.submit_ball(&match_id, innings, event, &idempotency_key, expected_last_sequence)
            }
            ScoringCommand::Retract { match_id, retracts, reason, idempotency_key, expected_last_sequence } => {
                self.retract(&match_id, retracts, &reason, &idempotency_key, expected_last_sequence)
            }
            ScoringCommand::Suspend { match_id, innings, reason, idempotency_key, expected_last_sequence } => {
                self.suspend(&match_id, innings, &reason, &idempotency_key, expected_last_sequence)
            }
            ScoringCommand::Resume { match_id, innings, idempotency_key, expected_last_sequence } => {
                self.resume(&match_id, innings, &idempotency_key, expected_last_sequence)
            }
            ScoringCommand::Declare { match_id, innings, idempotency_key, expected_last_sequence } => {
                self.declare(&match_id, innings, &idempotency_key, expected_last_sequence)
            }
        }
    }

    /// Steps 2 and 3 of the write path. `Ok(Some(..))` means the key was
    /// already committed with this same event.
    fn precheck(
        &self,
        view: &MatchView,
        innings: InningsNo,
        event: &EventKind,
        idempotency_key: &str,
        expected_last: Option<Sequence>,
    ) -> ScoreResult<Option<SubmitOutcome>> {
        let match_id = view.scoreboard.match_id.as_str();
        let head = view.last_sequence();
        if idempotency_key.trim().is_empty() {
            return Err(ScoreError::validation(match_id, innings, head, "idempotency key is empty"));
        }

        if let Some(sequence) = self.ledger.sequence_for_key(match_id, idempotency_key)? {
            let original = self.ledger.get(match_id, sequence)?;
            return match original {
                Some(e) if e.innings == innings && &e.detail == event => {
                    log::debug!("match={match_id} key already committed at {sequence}");
                    Ok(Some(SubmitOutcome {
                        sequence,
                        state: self.state_of(view, e.innings)?,
                        replayed: true,
                    }))
                }
                _ => Err(ScoreError::Conflict {
                    match_id: match_id.to_string(),
                    reason: ConflictReason::DuplicateKey { sequence },
                    last_good_sequence: head,
                }),
            };
        }

        if let Some(expected) = expected_last {
            if expected != head {
                return Err(ScoreError::Conflict {
                    match_id: match_id.to_string(),
                    reason: ConflictReason::StaleSequence { expected },
                    last_good_sequence: head,
                });
            }
        }
        Ok(None)
    }

    fn commit(
        &self,
        match_id: &str,
        innings: InningsNo,
        event: EventKind,
        idempotency_key: &str,
        expected_last: Option<Sequence>,
    ) -> ScoreResult<SubmitOutcome> {
        let slot = self.view(match_id)?;
        let turn = lock(&slot.writer);
        if slot.is_retired() {
            drop(turn);
            return self.commit(match_id, innings, event, idempotency_key, expected_last);
        }
        let mut next = read_lock(&slot.view).clone();

        if let Some(outcome) = self.precheck(&next, innings, &event, idempotency_key, expected_last)? {
            return Ok(outcome);
        }
        let head = next.last_sequence();
        if let Err(reason) =
            next.scoreboard
                .validate(innings, &event, self.config.ledger.max_deliveries_per_over)
        {
            log::warn!("match={match_id} rejected {} at {head}: {reason}", event.type_name());
            return Err(ScoreError::validation(match_id, innings, head, reason));
        }

        let committed = self.ledger.append(match_id, innings, event, idempotency_key, head)?;

        let changed = match next.fold(&committed) {
            Ok(changed) => changed,
            Err(e) => {
                log::error!("match={match_id} fold failed after commit at {}: {e}", committed.sequence);
                self.retire(match_id, &slot);
                return Err(e);
            }
        };
        *write_lock(&slot.view) = next;

        let view = read_lock(&slot.view);
        self.after_commit(&view, &committed, &changed)
    }

    /// Nullify a committed delivery in the current innings. State and
    /// figures are rebuilt from the newest checkpoint before it.
    pub fn retract(
        &self,
        match_id: &str,
        target: Sequence,
        reason: &str,
        idempotency_key: &str,
        expected_last: Option<Sequence>,
    ) -> ScoreResult<SubmitOutcome> {
        let slot = self.view(match_id)?;
        let turn = lock(&slot.writer);
        if slot.is_retired() {
            drop(turn);
            return self.retract(match_id, target, reason, idempotency_key, expected_last);
        }
        let view = read_lock(&slot.view).clone();
        let head = view.last_sequence();
        let current = view.scoreboard.current_innings();

        let target_event = self.ledger.get(match_id, target)?;
        let innings = target_event.as_ref().map_or(current, |e| e.innings);
        let event = EventKind::Retraction { retracts: target, reason: reason.to_string() };

        if let Some(outcome) = self.precheck(&view, innings, &event, idempotency_key, expected_last)? {
            return Ok(outcome);
        }

        let reject = |reason: String| {
            log::warn!("match={match_id} rejected retraction of {target}: {reason}");
            ScoreError::validation(match_id, innings, head, reason)
        };
        let target_event = target_event.ok_or_else(|| reject(format!("no event at sequence {target}")))?;
        if target_event.delivery().is_none() {
            return Err(reject(format!("sequence {target} is not a delivery")));
        }
        if target_event.innings != current {
            return Err(reject(format!(
                "sequence {target} is in innings {}, play is in innings {current}",
                target_event.innings
            )));
        }
        if self.ledger.retracted(match_id, head)?.contains(&target) {
            return Err(reject(format!("sequence {target} is already retracted")));
        }
        event
            .check_shape(&view.scoreboard.format, self.config.ledger.max_deliveries_per_over)
            .map_err(reject)?;

        // Checkpoints at or after the target fold it in.
        self.store.delete_checkpoints_from(match_id, target)?;
        let committed = self.ledger.append(match_id, innings, event, idempotency_key, head)?;

        let rebuilt = match self.rewind(&view, target, committed.sequence) {
            Ok(rebuilt) => rebuilt,
            Err(e) => {
                log::error!("match={match_id} rebuild after retracting {target} failed: {e}");
                self.retire(match_id, &slot);
                return Err(e);
            }
        };

        let before = view.figures.project(Scope::Innings(innings));
        let after = rebuilt.figures.project(Scope::Innings(innings));
        let changed: BTreeSet<PlayerId> = before
            .keys()
            .chain(after.keys())
            .filter(|id| before.get(*id) != after.get(*id))
            .cloned()
            .collect();
        *write_lock(&slot.view) = rebuilt;

        log::info!(
            "match={match_id} retracted sequence {target} ({reason}); {} player(s) changed",
            changed.len()
        );
        let view = read_lock(&slot.view);
        self.after_commit(&view, &committed, &changed)
    }

    /// The view refolded from the newest checkpoint before `target`, with
    /// every retracted sequence skipped.
    fn rewind(&self, view: &MatchView, target: Sequence, up_to: Sequence) -> ScoreResult<MatchView> {
        let match_id = view.scoreboard.match_id.as_str();
        let mut rebuilt = match self.store.latest_checkpoint_before(match_id, target)? {
            Some((_, json)) => serde_json::from_str::<Checkpoint>(&json)?.view,
            None => MatchView::new(&view.scoreboard.fixture, &view.scoreboard.format),
        };
        self.replay_into(&mut rebuilt, up_to, None, true)?;
        Ok(rebuilt)
    }

    /// Step 7: checkpoint, totals check, broadcast.
    fn after_commit(
        &self,
        view: &MatchView,
        committed: &BallEvent,
        changed: &BTreeSet<PlayerId>,
    ) -> ScoreResult<SubmitOutcome> {
        let match_id = committed.match_id.as_str();
        if checkpoint::is_due(committed.sequence, self.config.ledger.checkpoint_interval) {
            self.save_checkpoint(view)?;
        }

        for issue in reconciliation::check_totals(view) {
            log::warn!("match={match_id} reconciliation: {}", issue.detail);
            self.record_issue(match_id, &issue)?;
        }

        let state = self.state_of(view, committed.innings)?;
        let innings_figures = view.figures.project(Scope::Innings(committed.innings));
        let changed_figures = changed
            .iter()
            .map(|id| {
                innings_figures
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| PlayerFigures::new(id.as_str(), view.figures.balls_per_over))
            })
            .collect();
        self.gateway.publish(DeltaMessage {
            sequence: committed.sequence,
            event: committed.clone(),
            innings_state: state.clone(),
            changed_figures,
        });

        log::debug!(
            "match={match_id} seq {} applied: {}/{} ({})",
            committed.sequence,
            state.total_runs,
            state.wickets,
            state.overs()
        );
        Ok(SubmitOutcome { sequence: committed.sequence, state, replayed: false })
    }

    fn state_of(&self, view: &MatchView, innings: InningsNo) -> ScoreResult<InningsState> {
        view.scoreboard
            .innings(innings)
            .cloned()
            .ok_or_else(|| ScoreError::NotFound {
                what: "innings",
                id: format!("{}/{innings}", view.scoreboard.match_id),
            })
    }

    // ── Reads ──────────────────────────────────────────────────

    pub fn get_innings_state(&self, match_id: &str, innings: InningsNo) -> ScoreResult<InningsState> {
        let handle = self.view(match_id)?;
        let view = read_lock(&handle.view);
        self.state_of(&view, innings)
    }

    pub fn last_sequence(&self, match_id: &str) -> ScoreResult<Sequence> {
        let handle = self.view(match_id)?;
        let head = read_lock(&handle.view).last_sequence();
        Ok(head)
    }

    /// Consistent copy of the whole match view.
    pub fn snapshot(&self, match_id: &str) -> ScoreResult<MatchView> {
        let handle = self.view(match_id)?;
        let view = read_lock(&handle.view).clone();
        Ok(view)
    }

    pub fn get_player_figures(
        &self,
        match_id: &str,
        scope: Scope,
    ) -> ScoreResult<BTreeMap<PlayerId, PlayerFigures>> {
        let handle = self.view(match_id)?;
        let figures = read_lock(&handle.view).figures.project(scope);
        Ok(figures)
    }

    /// Match figures merged across every registered match the player appears in.
    pub fn career_figures(&self, player_id: &str) -> ScoreResult<Option<PlayerFigures>> {
        let mut career: Option<PlayerFigures> = None;
        for fixture in self.store.fixtures()? {
            if !fixture.sides.iter().any(|s| s.contains(player_id)) {
                continue;
            }
            let figures = self.get_player_figures(&fixture.match_id, Scope::Match)?;
            if let Some(f) = figures.get(player_id) {
                career
                    .get_or_insert_with(|| PlayerFigures::new(player_id, f.bowling.balls_per_over))
                    .merge(f);
            }
        }
        Ok(career)
    }

    /// Per-player records for a match under a league's rules, without
    /// captaincy. Team totals apply each team's own captain.
    pub fn get_fantasy_points(
        &self,
        league_id: &str,
        match_id: &str,
    ) -> ScoreResult<BTreeMap<PlayerId, FantasyPointRecord>> {
        let rules = &self.config.league(league_id)?.scoring_rules;
        let figures = self.get_player_figures(match_id, Scope::Match)?;
        Ok(figures
            .iter()
            .map(|(id, f)| (id.clone(), fantasy::score(f, rules, Role::Player)))
            .collect())
    }

    pub fn register_fantasy_team(&self, team: FantasyTeam) -> ScoreResult<FantasyTeam> {
        let league = self.config.league(&team.league_id)?;
        let invalid = |reason: String| ScoreError::InvalidSetup {
            what: "fantasy team",
            id: team.team_id.clone(),
            reason,
        };
        team.check(league).map_err(invalid)?;
        let entry_order = self
            .store
            .insert_fantasy_team(&team)?
            .ok_or_else(|| invalid("team id already registered".into()))?;
        log::info!("league={} team {} entered at #{entry_order}", team.league_id, team.team_id);
        Ok(FantasyTeam { entry_order, ..team })
    }

    pub fn fantasy_team_total(&self, team_id: &str, match_id: &str) -> ScoreResult<TeamScore> {
        let team = self.store.fantasy_team(team_id)?.ok_or_else(|| ScoreError::NotFound {
            what: "fantasy team",
            id: team_id.to_string(),
        })?;
        let rules = &self.config.league(&team.league_id)?.scoring_rules;
        let figures = self.get_player_figures(match_id, Scope::Match)?;
        let records = team.records(&figures, rules);
        Ok(TeamScore {
            team_id: team.team_id,
            match_id: match_id.to_string(),
            total: records.iter().map(|r| r.total).sum(),
            records,
        })
    }

    pub fn leaderboard(&self, league_id: &str, match_id: &str) -> ScoreResult<Vec<FantasyStanding>> {
        let league = self.config.league(league_id)?;
        let figures = self.get_player_figures(match_id, Scope::Match)?;
        let standings = self
            .store
            .fantasy_teams(league_id)?
            .iter()
            .map(|team| {
                let records = team.records(&figures, &league.scoring_rules);
                FantasyStanding::for_team(team, &records)
            })
            .collect();
        Ok(fantasy::rank(standings, league.tie_break))
    }

    pub fn subscribe(&self, match_id: &str) -> ScoreResult<broadcast::Receiver<DeltaMessage>> {
        self.view(match_id)?;
        Ok(self.gateway.subscribe(match_id))
    }

    /// Committed events from `from` onward, collected eagerly. Use
    /// `ledger().replay(..)` to walk lazily.
    pub fn replay_events(
        &self,
        match_id: &str,
        innings: Option<InningsNo>,
        from: Sequence,
    ) -> ScoreResult<Vec<BallEvent>> {
        self.view(match_id)?;
        self.ledger.replay(match_id, innings, from).collect()
    }

    /// An innings state folded from scratch up to `up_to`, ignoring every
    /// cache. Cancelling the token stops the fold; the ledger is untouched.
    pub fn replay_state(
        &self,
        match_id: &str,
        innings: InningsNo,
        up_to: Sequence,
        cancel: Option<CancelToken>,
    ) -> ScoreResult<InningsState> {
        let view = self.fold_from_scratch(match_id, up_to, cancel)?;
        self.state_of(&view, innings)
    }

    fn fold_from_scratch(
        &self,
        match_id: &str,
        up_to: Sequence,
        cancel: Option<CancelToken>,
    ) -> ScoreResult<MatchView> {
        let fixture = self.store.fixture(match_id)?.ok_or_else(|| ScoreError::NotFound {
            what: "match",
            id: match_id.to_string(),
        })?;
        let format = self.config.format(&fixture.format_id)?;
        let mut view = MatchView::new(&fixture, format);
        self.replay_into(&mut view, up_to, cancel, false)?;
        Ok(view)
    }

    // ── Reconciliation ─────────────────────────────────────────

    /// Totals check plus a full rebuild compared with the cached view.
    /// Issues are recorded for review and returned as `Reconciliation`.
    pub fn reconcile(&self, match_id: &str) -> ScoreResult<ReconciliationReport> {
        let cached = self.snapshot(match_id)?;
        let rebuilt = self.fold_from_scratch(match_id, cached.last_sequence(), None)?;

        let mut issues = reconciliation::check_totals(&cached);
        issues.extend(reconciliation::compare_rebuild(&cached, &rebuilt));
        for issue in &issues {
            log::warn!("match={match_id} reconciliation: {}", issue.detail);
            self.record_issue(match_id, issue)?;
        }
        ReconciliationReport {
            match_id: match_id.to_string(),
            sequence: cached.last_sequence(),
            issues,
        }
        .into_result()
    }

    pub fn open_issues(&self, match_id: &str) -> ScoreResult<Vec<ReconIssueRow>> {
        self.store.open_recon_issues(match_id)
    }

    fn record_issue(&self, match_id: &str, issue: &ReconciliationIssue) -> ScoreResult<()> {
        let row = issue.to_row(
            match_id,
            uuid::Uuid::new_v4().to_string(),
            self.clock.now().to_rfc3339(),
        );
        self.store.insert_recon_issue(&row)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
