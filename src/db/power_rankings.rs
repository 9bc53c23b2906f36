use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::Database;
use crate::domain::{
    NflTeam, Position, PowerRanking, PowerRankingPlayer, PowerRankingSummary, TeamPowerRanking,
};
use crate::error::{OptionalRow, Result};

impl Database {
    /// Persist a computed snapshot and return its id. `id` and `created` on
    /// the input are ignored.
    pub fn save_power_ranking(&self, snapshot: &PowerRanking) -> Result<i64> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO power_rankings (league_id, ranking_id, week, created)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                snapshot.league_id,
                snapshot.ranking_id,
                snapshot.week,
                Utc::now()
            ],
        )?;
        let id = tx.last_insert_rowid();

        {
            let mut team_stmt = tx.prepare(
                "INSERT INTO power_ranking_teams (
                    power_ranking_id, team_id, team_name, rank, rank_change, total_score,
                    roster_score, record_score, streak_score, points_for_score,
                    points_against_score
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            let mut player_stmt = tx.prepare(
                "INSERT INTO power_ranking_players (
                    team_row_id, ordinal, player_id, rank, first_name, last_name, position,
                    nfl_team, power_ranking_points, is_starter
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for team in &snapshot.teams {
                team_stmt.execute(params![
                    id,
                    team.team_id,
                    team.team_name,
                    team.rank,
                    team.rank_change,
                    team.total_score,
                    team.roster_score,
                    team.record_score,
                    team.streak_score,
                    team.points_for_score,
                    team.points_against_score
                ])?;
                let team_row = tx.last_insert_rowid();
                for (ordinal, p) in team.roster.iter().enumerate() {
                    player_stmt.execute(params![
                        team_row,
                        ordinal as i64,
                        p.player_id,
                        p.rank,
                        p.first_name,
                        p.last_name,
                        p.position.as_str(),
                        p.nfl_team.key(),
                        p.power_ranking_points,
                        p.is_starter
                    ])?;
                }
            }
        }
        tx.commit()?;
        Ok(id)
    }

    pub fn get_power_ranking(&self, id: i64) -> Result<PowerRanking> {
        let conn = self.lock()?;
        let mut snapshot = conn
            .query_row(
                "SELECT id, league_id, ranking_id, week, created
                 FROM power_rankings WHERE id = ?1",
                params![id],
                map_snapshot,
            )
            .or_not_found(|| format!("power ranking {id}"))?;
        snapshot.teams = query_teams(&conn, id)?;
        Ok(snapshot)
    }

    /// The most recently created snapshot for a league, if any.
    pub fn latest_power_ranking(&self, league_id: i64) -> Result<Option<PowerRanking>> {
        let id: Option<i64> = {
            let conn = self.lock()?;
            conn.query_row(
                "SELECT id FROM power_rankings WHERE league_id = ?1
                 ORDER BY created DESC, id DESC LIMIT 1",
                params![league_id],
                |row| row.get(0),
            )
            .optional()?
        };
        id.map(|id| self.get_power_ranking(id)).transpose()
    }

    pub fn list_power_rankings(&self, league_id: i64) -> Result<Vec<PowerRankingSummary>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, ranking_id, week, created FROM power_rankings
             WHERE league_id = ?1 ORDER BY created DESC, id DESC",
        )?;
        let summaries = stmt
            .query_map(params![league_id], |row| {
                Ok(PowerRankingSummary {
                    id: row.get(0)?,
                    ranking_id: row.get(1)?,
                    week: row.get(2)?,
                    created: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(summaries)
    }
}

fn query_teams(conn: &Connection, power_ranking_id: i64) -> Result<Vec<TeamPowerRanking>> {
    let mut stmt = conn.prepare(
        "SELECT id, team_id, team_name, rank, rank_change, total_score, roster_score,
                record_score, streak_score, points_for_score, points_against_score
         FROM power_ranking_teams WHERE power_ranking_id = ?1 ORDER BY rank, id",
    )?;
    let rows = stmt
        .query_map(params![power_ranking_id], |row| {
            let team_row: i64 = row.get(0)?;
            Ok((
                team_row,
                TeamPowerRanking {
                    team_id: row.get(1)?,
                    team_name: row.get(2)?,
                    rank: row.get(3)?,
                    rank_change: row.get(4)?,
                    total_score: row.get(5)?,
                    roster_score: row.get(6)?,
                    record_score: row.get(7)?,
                    streak_score: row.get(8)?,
                    points_for_score: row.get(9)?,
                    points_against_score: row.get(10)?,
                    roster: Vec::new(),
                },
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut player_stmt = conn.prepare(
        "SELECT player_id, rank, first_name, last_name, position, nfl_team,
                power_ranking_points, is_starter
         FROM power_ranking_players WHERE team_row_id = ?1 ORDER BY ordinal",
    )?;
    let mut teams = Vec::with_capacity(rows.len());
    for (team_row, mut team) in rows {
        team.roster = player_stmt
            .query_map(params![team_row], map_player)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        teams.push(team);
    }
    Ok(teams)
}

fn map_snapshot(row: &Row) -> rusqlite::Result<PowerRanking> {
    let created: DateTime<Utc> = row.get(4)?;
    Ok(PowerRanking {
        id: row.get(0)?,
        league_id: row.get(1)?,
        ranking_id: row.get(2)?,
        week: row.get(3)?,
        created,
        teams: Vec::new(),
    })
}

fn map_player(row: &Row) -> rusqlite::Result<PowerRankingPlayer> {
    let position: String = row.get(4)?;
    let team: String = row.get(5)?;
    Ok(PowerRankingPlayer {
        player_id: row.get(0)?,
        rank: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        position: Position::parse(&position),
        nfl_team: NflTeam::parse(&team),
        power_ranking_points: row.get(6)?,
        is_starter: row.get(7)?,
    })
}
