use chrono::{NaiveDate, Utc};
use rusqlite::params;
use std::collections::HashMap;

use super::Database;
use crate::domain::{NflTeam, Position, Ranking, RankingPlayer, RankingSummary};
use crate::error::{Error, OptionalRow, Result};

impl Database {
    /// Store a ranking snapshot and return its id.
    pub fn insert_ranking(
        &self,
        date: NaiveDate,
        players: &HashMap<String, RankingPlayer>,
    ) -> Result<i64> {
        if players.is_empty() {
            return Err(Error::Validation("ranking has no players".into()));
        }
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO rankings (ranking_date, created) VALUES (?1, ?2)",
            params![date, Utc::now()],
        )?;
        let id = tx.last_insert_rowid();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO ranking_players
                    (ranking_id, player_id, rank, first_name, last_name, position, team)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            let mut rows: Vec<&RankingPlayer> = players.values().collect();
            rows.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.id.cmp(&b.id)));
            for p in rows {
                stmt.execute(params![
                    id,
                    p.id,
                    p.rank,
                    p.first_name,
                    p.last_name,
                    p.position.as_str(),
                    p.team.key()
                ])?;
            }
        }
        tx.commit()?;
        Ok(id)
    }

    pub fn get_ranking(&self, id: i64) -> Result<Ranking> {
        let conn = self.lock()?;
        let date: NaiveDate = conn
            .query_row(
                "SELECT ranking_date FROM rankings WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .or_not_found(|| format!("ranking {id}"))?;

        let mut stmt = conn.prepare(
            "SELECT player_id, rank, first_name, last_name, position, team
             FROM ranking_players WHERE ranking_id = ?1",
        )?;
        let players = stmt
            .query_map(params![id], |row| {
                let position: String = row.get(4)?;
                let team: String = row.get(5)?;
                Ok(RankingPlayer {
                    id: row.get(0)?,
                    rank: row.get(1)?,
                    first_name: row.get(2)?,
                    last_name: row.get(3)?,
                    position: Position::parse(&position),
                    team: NflTeam::parse(&team),
                })
            })?
            .map(|r| r.map(|p| (p.id.clone(), p)))
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;

        Ok(Ranking { id, date, players })
    }

    /// Newest ranking date first.
    pub fn list_rankings(&self) -> Result<Vec<RankingSummary>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT r.id, r.ranking_date, COUNT(p.player_id)
             FROM rankings r LEFT JOIN ranking_players p ON p.ranking_id = r.id
             GROUP BY r.id
             ORDER BY r.ranking_date DESC, r.id DESC",
        )?;
        let rankings = stmt
            .query_map([], |row| {
                Ok(RankingSummary {
                    id: row.get(0)?,
                    date: row.get(1)?,
                    player_count: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rankings)
    }

    pub fn delete_ranking(&self, id: i64) -> Result<()> {
        let conn = self.lock()?;
        let n = conn.execute("DELETE FROM rankings WHERE id = ?1", params![id])?;
        if n == 0 {
            return Err(Error::NotFound(format!("ranking {id}")));
        }
        Ok(())
    }
}
