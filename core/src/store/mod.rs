//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The ledger and the service call store methods: they never execute SQL directly.

use crate::{
    error::{ScoreError, ScoreResult},
    event::LedgerEntry,
    types::{InningsNo, MatchId, Sequence},
};
mod checkpoint;
mod fantasy;
mod fixture;
mod reconciliation;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub struct ScoreStore {
    conn: Mutex<Connection>,
    path: Option<String>, // None for :memory:, Some(path) for file
}

/// Result of a compare-and-append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    Committed,
    /// The idempotency key was already committed at `sequence`.
    DuplicateKey { sequence: Sequence },
    /// The caller's view of the ledger is behind; `actual` is the real head.
    Stale { actual: Sequence },
}

impl ScoreStore {
    pub fn open(path: &str) -> ScoreResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> ScoreResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn: Mutex::new(conn), path: None })
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases, this returns a new in-memory database (isolated).
    pub fn reopen(&self) -> ScoreResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// How long a write waits on another connection's lock before giving up.
    pub fn set_busy_timeout(&self, timeout: Duration) -> ScoreResult<()> {
        self.conn().busy_timeout(timeout)?;
        Ok(())
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> ScoreResult<()> {
        let conn = self.conn();
        conn.execute_batch(include_str!("../../../migrations/001_ledger.sql"))?;
        conn.execute_batch(include_str!("../../../migrations/002_checkpoints.sql"))?;
        conn.execute_batch(include_str!("../../../migrations/003_fixtures_and_fantasy.sql"))?;
        conn.execute_batch(include_str!("../../../migrations/004_reconciliation.sql"))?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // ── Ledger ─────────────────────────────────────────────────

    /// Insert `entry` only if the key is new and the match's highest
    /// sequence is still `expected_last`. One IMMEDIATE transaction.
    pub fn insert_if_next(
        &self,
        entry: &LedgerEntry,
        expected_last: Sequence,
    ) -> ScoreResult<AppendOutcome> {
        let started = Instant::now();
        let mut conn = self.conn();
        let result = (|| -> rusqlite::Result<AppendOutcome> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let existing: Option<i64> = tx
                .query_row(
                    "SELECT sequence FROM ledger_event
                     WHERE match_id = ?1 AND idempotency_key = ?2",
                    params![entry.match_id, entry.idempotency_key],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(sequence) = existing {
                return Ok(AppendOutcome::DuplicateKey { sequence: sequence as Sequence });
            }

            let head: i64 = tx.query_row(
                "SELECT COALESCE(MAX(sequence), 0) FROM ledger_event WHERE match_id = ?1",
                params![entry.match_id],
                |row| row.get(0),
            )?;
            if head as Sequence != expected_last {
                return Ok(AppendOutcome::Stale { actual: head as Sequence });
            }

            tx.execute(
                "INSERT INTO ledger_event
                 (match_id, innings, sequence, event_type, idempotency_key,
                  retracts, payload, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    entry.match_id,
                    entry.innings as i64,
                    entry.sequence as i64,
                    entry.event_type,
                    entry.idempotency_key,
                    entry.retracts.map(|s| s as i64),
                    entry.payload,
                    entry.recorded_at,
                ],
            )?;
            tx.commit()?;
            Ok(AppendOutcome::Committed)
        })();

        result.map_err(|e| busy_to_timeout(e, "append", started))
    }

    /// Up to `limit` rows with sequence ≥ `from`, in sequence order.
    pub fn ledger_page(
        &self,
        match_id: &str,
        innings: Option<InningsNo>,
        from: Sequence,
        limit: usize,
    ) -> ScoreResult<Vec<LedgerEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, match_id, innings, sequence, event_type, idempotency_key,
                    retracts, payload, recorded_at
             FROM ledger_event
             WHERE match_id = ?1 AND sequence >= ?2
               AND (?3 IS NULL OR innings = ?3)
             ORDER BY sequence ASC
             LIMIT ?4",
        )?;
        let rows = stmt
            .query_map(
                params![match_id, from as i64, innings.map(|i| i as i64), limit as i64],
                Self::map_ledger_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn ledger_entry(&self, match_id: &str, sequence: Sequence) -> ScoreResult<Option<LedgerEntry>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, match_id, innings, sequence, event_type, idempotency_key,
                        retracts, payload, recorded_at
                 FROM ledger_event WHERE match_id = ?1 AND sequence = ?2",
                params![match_id, sequence as i64],
                Self::map_ledger_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn last_sequence(&self, match_id: &str) -> ScoreResult<Sequence> {
        let head: i64 = self.conn().query_row(
            "SELECT COALESCE(MAX(sequence), 0) FROM ledger_event WHERE match_id = ?1",
            params![match_id],
            |row| row.get(0),
        )?;
        Ok(head as Sequence)
    }

    pub fn sequence_for_key(&self, match_id: &str, key: &str) -> ScoreResult<Option<Sequence>> {
        let seq: Option<i64> = self
            .conn()
            .query_row(
                "SELECT sequence FROM ledger_event WHERE match_id = ?1 AND idempotency_key = ?2",
                params![match_id, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(seq.map(|s| s as Sequence))
    }

    /// Sequences nullified by retractions committed at or before `up_to`.
    pub fn retracted_sequences(&self, match_id: &str, up_to: Sequence) -> ScoreResult<Vec<Sequence>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT retracts FROM ledger_event
             WHERE match_id = ?1 AND retracts IS NOT NULL AND sequence <= ?2
             ORDER BY retracts ASC",
        )?;
        let rows = stmt
            .query_map(params![match_id, up_to as i64], |row| {
                Ok(row.get::<_, i64>(0)? as Sequence)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_ledger_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LedgerEntry> {
        Ok(LedgerEntry {
            id: row.get(0)?,
            match_id: row.get(1)?,
            innings: row.get::<_, i64>(2)? as InningsNo,
            sequence: row.get::<_, i64>(3)? as Sequence,
            event_type: row.get(4)?,
            idempotency_key: row.get(5)?,
            retracts: row.get::<_, Option<i64>>(6)?.map(|s| s as Sequence),
            payload: row.get(7)?,
            recorded_at: row.get(8)?,
        })
    }
}

/// SQLite reports lock contention past `busy_timeout` as BUSY or LOCKED.
fn busy_to_timeout(e: rusqlite::Error, operation: &'static str, started: Instant) -> ScoreError {
    match &e {
        rusqlite::Error::SqliteFailure(f, _)
            if matches!(f.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            ScoreError::Timeout {
                operation,
                elapsed_ms: started.elapsed().as_millis() as u64,
            }
        }
        _ => ScoreError::Database(e),
    }
}

// ── Row types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconIssueRow {
    pub issue_id: String,
    pub match_id: MatchId,
    pub innings: Option<InningsNo>,
    pub sequence: Sequence,
    pub check_name: String,
    pub expected: Option<i64>,
    pub actual: Option<i64>,
    pub detail: String,
    pub status: String,
    pub detected_at: String,
}
