use super::ScoreStore;
use crate::{error::ScoreResult, types::Sequence};
use rusqlite::{params, OptionalExtension};

impl ScoreStore {
    pub fn save_checkpoint(&self, match_id: &str, sequence: Sequence, state_json: &str) -> ScoreResult<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO checkpoint (match_id, sequence, state_json)
             VALUES (?1, ?2, ?3)",
            params![match_id, sequence as i64, state_json],
        )?;
        Ok(())
    }

    /// Newest checkpoint with sequence strictly below `before`.
    pub fn latest_checkpoint_before(
        &self,
        match_id: &str,
        before: Sequence,
    ) -> ScoreResult<Option<(Sequence, String)>> {
        let row = self
            .conn()
            .query_row(
                "SELECT sequence, state_json FROM checkpoint
                 WHERE match_id = ?1 AND sequence < ?2
                 ORDER BY sequence DESC LIMIT 1",
                params![match_id, before as i64],
                |row| Ok((row.get::<_, i64>(0)? as Sequence, row.get(1)?)),
            )
            .optional()?;
        Ok(row)
    }

    /// Drop checkpoints at or after `from`; they fold in a retracted event.
    pub fn delete_checkpoints_from(&self, match_id: &str, from: Sequence) -> ScoreResult<usize> {
        let n = self.conn().execute(
            "DELETE FROM checkpoint WHERE match_id = ?1 AND sequence >= ?2",
            params![match_id, from as i64],
        )?;
        Ok(n)
    }

    pub fn checkpoint_sequences(&self, match_id: &str) -> ScoreResult<Vec<Sequence>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT sequence FROM checkpoint WHERE match_id = ?1 ORDER BY sequence ASC",
        )?;
        let rows = stmt
            .query_map(params![match_id], |row| Ok(row.get::<_, i64>(0)? as Sequence))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
