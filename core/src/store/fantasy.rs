use super::ScoreStore;
use crate::{error::ScoreResult, fantasy::FantasyTeam};
use rusqlite::{params, OptionalExtension, TransactionBehavior};

impl ScoreStore {
    /// Persist a team and assign its entry order within the league.
    /// Returns `None` if the team id is taken.
    pub fn insert_fantasy_team(&self, team: &FantasyTeam) -> ScoreResult<Option<u64>> {
        let players = serde_json::to_string(&team.players)?;
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let taken: Option<String> = tx
            .query_row(
                "SELECT team_id FROM fantasy_team WHERE team_id = ?1",
                params![team.team_id],
                |row| row.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Ok(None);
        }

        let next: i64 = tx.query_row(
            "SELECT COALESCE(MAX(entry_order), 0) + 1 FROM fantasy_team WHERE league_id = ?1",
            params![team.league_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO fantasy_team
             (team_id, league_id, owner, entry_order, players_json, captain, vice_captain)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                team.team_id,
                team.league_id,
                team.owner,
                next,
                players,
                team.captain,
                team.vice_captain,
            ],
        )?;
        tx.commit()?;
        Ok(Some(next as u64))
    }

    pub fn fantasy_teams(&self, league_id: &str) -> ScoreResult<Vec<FantasyTeam>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT team_id, league_id, owner, entry_order, players_json, captain, vice_captain
             FROM fantasy_team WHERE league_id = ?1 ORDER BY entry_order ASC",
        )?;
        let rows = stmt
            .query_map(params![league_id], Self::map_fantasy_team_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(Self::finish_team).collect()
    }

    pub fn fantasy_team(&self, team_id: &str) -> ScoreResult<Option<FantasyTeam>> {
        let row = self
            .conn()
            .query_row(
                "SELECT team_id, league_id, owner, entry_order, players_json, captain, vice_captain
                 FROM fantasy_team WHERE team_id = ?1",
                params![team_id],
                Self::map_fantasy_team_row,
            )
            .optional()?;
        row.map(Self::finish_team).transpose()
    }

    fn map_fantasy_team_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(FantasyTeam, String)> {
        Ok((
            FantasyTeam {
                team_id: row.get(0)?,
                league_id: row.get(1)?,
                owner: row.get(2)?,
                entry_order: row.get::<_, i64>(3)? as u64,
                players: Vec::new(),
                captain: row.get(5)?,
                vice_captain: row.get(6)?,
            },
            row.get(4)?,
        ))
    }

    fn finish_team((mut team, players_json): (FantasyTeam, String)) -> ScoreResult<FantasyTeam> {
        team.players = serde_json::from_str(&players_json)?;
        Ok(team)
    }
}
