//! Reconciliation: consistency checks between derived caches.
//!
//! Design:
//!   - Totals check: Σ batting runs + extras must equal the innings total,
//!     and Σ batter dismissals must equal wickets fallen.
//!   - Rebuild check: a view folded from scratch must equal the cached one.
//!   - A failure is recorded as an open `recon_issue` row for an operator.
//!     Nothing is auto-corrected.

use crate::{
    error::{ScoreError, ScoreResult},
    innings::InningsStatus,
    projection::MatchView,
    store::ReconIssueRow,
    types::{InningsNo, MatchId, Sequence},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReconCheck {
    InningsTotals,
    Wickets,
    Rebuild,
}

impl ReconCheck {
    pub fn name(self) -> &'static str {
        match self {
            Self::InningsTotals => "innings_totals",
            Self::Wickets       => "wickets",
            Self::Rebuild       => "rebuild",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconciliationIssue {
    pub check: ReconCheck,
    pub innings: Option<InningsNo>,
    pub sequence: Sequence,
    pub expected: Option<i64>,
    pub actual: Option<i64>,
    pub detail: String,
}

impl ReconciliationIssue {
    pub fn to_row(&self, match_id: &str, issue_id: String, detected_at: String) -> ReconIssueRow {
        ReconIssueRow {
            issue_id,
            match_id: match_id.to_string(),
            innings: self.innings,
            sequence: self.sequence,
            check_name: self.check.name().to_string(),
            expected: self.expected,
            actual: self.actual,
            detail: self.detail.clone(),
            status: "open".to_string(),
            detected_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub match_id: MatchId,
    pub sequence: Sequence,
    pub issues: Vec<ReconciliationIssue>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// `Err(Reconciliation)` naming the first issue, if there is one.
    pub fn into_result(self) -> ScoreResult<Self> {
        match self.issues.first() {
            None => Ok(self),
            Some(first) => Err(ScoreError::Reconciliation {
                match_id: self.match_id.clone(),
                sequence: first.sequence,
                detail: format!("{} ({} issue(s) open)", first.detail, self.issues.len()),
            }),
        }
    }
}

/// Per-innings totals against the figure book.
pub fn check_totals(view: &MatchView) -> Vec<ReconciliationIssue> {
    let sequence = view.last_sequence();
    let mut issues = Vec::new();
    for state in &view.scoreboard.innings {
        if state.status == InningsStatus::NotStarted {
            continue;
        }
        let n = state.innings;
        let batting = view.figures.batting_runs(n);
        let extras = view.figures.extras(n).total();
        if batting + extras != state.total_runs {
            issues.push(ReconciliationIssue {
                check: ReconCheck::InningsTotals,
                innings: Some(n),
                sequence,
                expected: Some(state.total_runs as i64),
                actual: Some((batting + extras) as i64),
                detail: format!(
                    "innings {n}: batting {batting} + extras {extras} != total {}",
                    state.total_runs
                ),
            });
        }

        let outs: u32 = view
            .figures
            .innings
            .get(&n)
            .map_or(0, |b| b.players.values().map(|p| p.batting.outs).sum());
        if outs != state.wickets as u32 {
            issues.push(ReconciliationIssue {
                check: ReconCheck::Wickets,
                innings: Some(n),
                sequence,
                expected: Some(state.wickets as i64),
                actual: Some(outs as i64),
                detail: format!("innings {n}: {outs} dismissals != {} wickets", state.wickets),
            });
        }
    }
    issues
}

/// A cached view against one rebuilt from the ledger.
pub fn compare_rebuild(cached: &MatchView, rebuilt: &MatchView) -> Vec<ReconciliationIssue> {
    let mut issues = Vec::new();
    if cached.last_sequence() != rebuilt.last_sequence() {
        issues.push(ReconciliationIssue {
            check: ReconCheck::Rebuild,
            innings: None,
            sequence: cached.last_sequence(),
            expected: Some(rebuilt.last_sequence() as i64),
            actual: Some(cached.last_sequence() as i64),
            detail: "cached view is at a different sequence than the ledger".into(),
        });
        return issues;
    }
    for (cached_state, rebuilt_state) in cached.scoreboard.innings.iter().zip(&rebuilt.scoreboard.innings) {
        if cached_state != rebuilt_state {
            issues.push(ReconciliationIssue {
                check: ReconCheck::Rebuild,
                innings: Some(cached_state.innings),
                sequence: cached.last_sequence(),
                expected: Some(rebuilt_state.total_runs as i64),
                actual: Some(cached_state.total_runs as i64),
                detail: format!("innings {} state differs from a ledger rebuild", cached_state.innings),
            });
        }
    }
    if cached.figures != rebuilt.figures {
        issues.push(ReconciliationIssue {
            check: ReconCheck::Rebuild,
            innings: None,
            sequence: cached.last_sequence(),
            expected: None,
            actual: None,
            detail: "player figures differ from a ledger rebuild".into(),
        });
    }
    issues
}
