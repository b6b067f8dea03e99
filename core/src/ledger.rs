//! Event ledger: ordered, append-only, per match.
//!
//! RULES:
//!   - `append` is a compare-and-append: it commits at `expected_last + 1`
//!     or not at all. Two writers racing for the same slot get one commit
//!     and one Conflict.
//!   - An idempotency key commits at most once per match.
//!   - Nothing here publishes. The service broadcasts after the commit.

use crate::{
    clock::Clock,
    config::LedgerConfig,
    error::{ConflictReason, ScoreError, ScoreResult},
    event::{BallEvent, EventKind, LedgerEntry},
    store::{AppendOutcome, ScoreStore},
    types::{InningsNo, MatchId, Sequence},
};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Stable key for one operator submission of one ball.
pub fn derive_idempotency_key(
    match_id: &str,
    innings: InningsNo,
    over: u16,
    ball: u8,
    submission_id: &str,
) -> String {
    let mut h = Sha256::new();
    h.update(format!("{match_id}|{innings}|{over}|{ball}|{submission_id}").as_bytes());
    h.finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Shared flag a caller flips to stop a replay between events.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct EventLedger {
    store: Arc<ScoreStore>,
    config: LedgerConfig,
    clock: Arc<dyn Clock>,
    /// Starts at `config.replay_timeout_ms`; operators may raise it live.
    replay_timeout_ms: AtomicU64,
}

impl EventLedger {
    pub fn new(store: Arc<ScoreStore>, config: LedgerConfig, clock: Arc<dyn Clock>) -> Self {
        let replay_timeout_ms = AtomicU64::new(config.replay_timeout_ms);
        Self { store, config, clock, replay_timeout_ms }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Deadline for replays started from now on, rebuilds included.
    pub fn replay_timeout(&self) -> Duration {
        Duration::from_millis(self.replay_timeout_ms.load(Ordering::Relaxed))
    }

    pub fn set_replay_timeout(&self, timeout: Duration) {
        let ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.replay_timeout_ms.store(ms, Ordering::Relaxed);
        log::info!("replay deadline set to {ms}ms");
    }

    /// Commit `detail` as the match's next event. `expected_last` is the
    /// sequence the caller last observed for this match.
    pub fn append(
        &self,
        match_id: &str,
        innings: InningsNo,
        detail: EventKind,
        idempotency_key: &str,
        expected_last: Sequence,
    ) -> ScoreResult<BallEvent> {
        let event = BallEvent {
            match_id: match_id.to_string(),
            innings,
            sequence: expected_last + 1,
            recorded_at: self.clock.now(),
            detail,
        };
        let entry = LedgerEntry::from_event(&event, idempotency_key)?;

        match self.store.insert_if_next(&entry, expected_last)? {
            AppendOutcome::Committed => {
                log::debug!(
                    "match={match_id} committed {} at sequence {}",
                    entry.event_type,
                    event.sequence
                );
                Ok(event)
            }
            AppendOutcome::DuplicateKey { sequence } => Err(ScoreError::Conflict {
                match_id: match_id.to_string(),
                reason: ConflictReason::DuplicateKey { sequence },
                last_good_sequence: self.store.last_sequence(match_id)?,
            }),
            AppendOutcome::Stale { actual } => Err(ScoreError::Conflict {
                match_id: match_id.to_string(),
                reason: ConflictReason::StaleSequence { expected: expected_last },
                last_good_sequence: actual,
            }),
        }
    }

    pub fn get(&self, match_id: &str, sequence: Sequence) -> ScoreResult<Option<BallEvent>> {
        match self.store.ledger_entry(match_id, sequence)? {
            Some(entry) => Ok(Some(entry.event()?)),
            None => Ok(None),
        }
    }

    pub fn last_sequence(&self, match_id: &str) -> ScoreResult<Sequence> {
        self.store.last_sequence(match_id)
    }

    pub fn sequence_for_key(&self, match_id: &str, key: &str) -> ScoreResult<Option<Sequence>> {
        self.store.sequence_for_key(match_id, key)
    }

    pub fn retracted(&self, match_id: &str, up_to: Sequence) -> ScoreResult<Vec<Sequence>> {
        self.store.retracted_sequences(match_id, up_to)
    }

    /// Lazily read events with sequence ≥ `from`, optionally one innings
    /// only. Bounded by `replay_timeout_ms`.
    pub fn replay(&self, match_id: &str, innings: Option<InningsNo>, from: Sequence) -> Replay<'_> {
        Replay {
            store: &self.store,
            match_id: match_id.to_string(),
            innings,
            next: from.max(1),
            until: None,
            page_size: self.config.replay_page_size.max(1),
            buffer: VecDeque::new(),
            exhausted: false,
            started: Instant::now(),
            timeout: self.replay_timeout(),
            cancel: None,
            done: false,
        }
    }
}

/// A paged, finite walk over one match's ledger.
///
/// Restart after a failure or cancellation with
/// `ledger.replay(match_id, innings, replay.position())`.
pub struct Replay<'a> {
    store: &'a ScoreStore,
    match_id: MatchId,
    innings: Option<InningsNo>,
    next: Sequence,
    until: Option<Sequence>,
    page_size: usize,
    buffer: VecDeque<LedgerEntry>,
    exhausted: bool,
    started: Instant,
    timeout: Duration,
    cancel: Option<CancelToken>,
    done: bool,
}

impl<'a> Replay<'a> {
    /// Stop after `sequence` even if later events exist.
    pub fn until(mut self, sequence: Sequence) -> Self {
        self.until = Some(sequence);
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The first sequence not yet yielded.
    pub fn position(&self) -> Sequence {
        self.buffer.front().map_or(self.next, |e| e.sequence)
    }

    fn fail(&mut self, err: ScoreError) -> Option<ScoreResult<BallEvent>> {
        self.done = true;
        Some(Err(err))
    }

    fn fill(&mut self) -> ScoreResult<()> {
        let page = self
            .store
            .ledger_page(&self.match_id, self.innings, self.next, self.page_size)?;
        if page.len() < self.page_size {
            self.exhausted = true;
        }
        if let Some(last) = page.last() {
            self.next = last.sequence + 1;
        }
        self.buffer.extend(page);
        Ok(())
    }
}

impl Iterator for Replay<'_> {
    type Item = ScoreResult<BallEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            let at = Replay::position(self).saturating_sub(1);
            log::debug!("match={} replay cancelled at {at}", self.match_id);
            return self.fail(ScoreError::Cancelled { at });
        }
        let elapsed = self.started.elapsed();
        if elapsed >= self.timeout {
            return self.fail(ScoreError::Timeout {
                operation: "replay",
                elapsed_ms: elapsed.as_millis() as u64,
            });
        }

        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fill() {
                return self.fail(e);
            }
        }
        let entry = match self.buffer.pop_front() {
            Some(entry) => entry,
            None => {
                self.done = true;
                return None;
            }
        };
        if self.until.is_some_and(|u| entry.sequence > u) {
            self.buffer.push_front(entry);
            self.done = true;
            return None;
        }
        match entry.event() {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                self.buffer.push_front(entry);
                self.fail(e.into())
            }
        }
    }
}
