use super::ScoreStore;
use crate::{error::ScoreResult, fixture::MatchFixture};
use rusqlite::{params, OptionalExtension};

impl ScoreStore {
    /// Returns false if the match id is already registered.
    pub fn insert_fixture(&self, fixture: &MatchFixture, registered_at: &str) -> ScoreResult<bool> {
        let json = serde_json::to_string(fixture)?;
        let n = self.conn().execute(
            "INSERT OR IGNORE INTO fixture (match_id, format_id, fixture_json, registered_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![fixture.match_id, fixture.format_id, json, registered_at],
        )?;
        Ok(n == 1)
    }

    pub fn fixture(&self, match_id: &str) -> ScoreResult<Option<MatchFixture>> {
        let json: Option<String> = self
            .conn()
            .query_row(
                "SELECT fixture_json FROM fixture WHERE match_id = ?1",
                params![match_id],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(j) => Ok(Some(serde_json::from_str(&j)?)),
            None => Ok(None),
        }
    }

    pub fn fixtures(&self) -> ScoreResult<Vec<MatchFixture>> {
        let rows: Vec<String> = {
            let conn = self.conn();
            let mut stmt = conn.prepare(
                "SELECT fixture_json FROM fixture ORDER BY registered_at ASC, match_id ASC",
            )?;
            let rows = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        rows.iter()
            .map(|j| serde_json::from_str(j).map_err(Into::into))
            .collect()
    }
}
