use super::{ReconIssueRow, ScoreStore};
use crate::{error::ScoreResult, types::{InningsNo, Sequence}};
use rusqlite::params;

impl ScoreStore {
    pub fn insert_recon_issue(&self, issue: &ReconIssueRow) -> ScoreResult<()> {
        self.conn().execute(
            "INSERT INTO recon_issue
             (issue_id, match_id, innings, sequence, check_name,
              expected, actual, detail, status, detected_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
            params![
                issue.issue_id,
                issue.match_id,
                issue.innings.map(|i| i as i64),
                issue.sequence as i64,
                issue.check_name,
                issue.expected,
                issue.actual,
                issue.detail,
                issue.status,
                issue.detected_at,
            ],
        )?;
        Ok(())
    }

    pub fn open_recon_issues(&self, match_id: &str) -> ScoreResult<Vec<ReconIssueRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT issue_id, match_id, innings, sequence, check_name,
                    expected, actual, detail, status, detected_at
             FROM recon_issue
             WHERE match_id = ?1 AND status = 'open'
             ORDER BY sequence ASC, detected_at ASC",
        )?;
        let rows = stmt
            .query_map(params![match_id], Self::map_recon_issue_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn resolve_recon_issue(&self, issue_id: &str) -> ScoreResult<bool> {
        let n = self.conn().execute(
            "UPDATE recon_issue SET status = 'resolved' WHERE issue_id = ?1 AND status = 'open'",
            params![issue_id],
        )?;
        Ok(n == 1)
    }

    fn map_recon_issue_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReconIssueRow> {
        Ok(ReconIssueRow {
            issue_id: row.get(0)?,
            match_id: row.get(1)?,
            innings: row.get::<_, Option<i64>>(2)?.map(|i| i as InningsNo),
            sequence: row.get::<_, i64>(3)? as Sequence,
            check_name: row.get(4)?,
            expected: row.get(5)?,
            actual: row.get(6)?,
            detail: row.get(7)?,
            status: row.get(8)?,
            detected_at: row.get(9)?,
        })
    }
}
