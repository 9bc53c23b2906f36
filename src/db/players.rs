use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use super::Database;
use crate::domain::{
    Change, FieldChange, NflTeam, Player, Position, SearchQuery, PROP_NICKNAME,
};
use crate::error::{Error, OptionalRow, Result};

/// What `save_player` did with the incoming record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted,
    Updated(usize),
    Unchanged,
}

const PLAYER_COLUMNS: &str = "p.id, p.yahoo_id, p.first_name, p.last_name, p.position, p.team,
    p.weight, p.height, p.birth_date, p.rookie_year, p.years_exp, p.jersey,
    p.depth_chart_order, p.college, p.active, p.nickname1, p.created, p.updated";

impl Database {
    /// Load a player with its change history, newest change first.
    pub fn get_player(&self, id: &str) -> Result<Player> {
        let conn = self.lock()?;
        let mut player = query_player(&conn, id).or_not_found(|| format!("player {id}"))?;
        player.changes = query_changes(&conn, id)?;
        Ok(player)
    }

    /// Insert or diff-and-update a player.
    ///
    /// Updates log one change row per differing field. The Yahoo id is never
    /// touched here and an empty incoming nickname never clears a stored one.
    pub fn save_player(&self, player: &Player) -> Result<SaveOutcome> {
        let mut conn = self.lock()?;
        save_player_locked(&mut conn, player)
    }

    /// Save a batch of upstream records, each in its own transaction.
    ///
    /// `cancel` is checked before every record; once set, the batch stops
    /// with `Canceled` and the remaining records are left alone.
    pub fn save_players(&self, players: &[Player], cancel: &AtomicBool) -> Result<SaveSummary> {
        let mut conn = self.lock()?;
        let mut summary = SaveSummary::default();
        for (done, player) in players.iter().enumerate() {
            if cancel.load(Ordering::Relaxed) {
                return Err(Error::Canceled(format!(
                    "player save stopped after {done} of {} records",
                    players.len()
                )));
            }
            match save_player_locked(&mut conn, player)? {
                SaveOutcome::Inserted => summary.inserted += 1,
                SaveOutcome::Updated(_) => summary.updated += 1,
                SaveOutcome::Unchanged => summary.unchanged += 1,
            }
        }
        Ok(summary)
    }

    /// User edit of the nickname; logged like any other change.
    pub fn update_player_nickname(&self, id: &str, nickname: &str) -> Result<()> {
        let nickname = nickname.trim();
        if nickname.is_empty() {
            return Err(Error::Validation("nickname must not be empty".into()));
        }
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let stored = query_player(&tx, id).or_not_found(|| format!("player {id}"))?;
        if stored.nickname1 == nickname {
            return Ok(());
        }
        let now = Utc::now();
        insert_change(&tx, id, now, PROP_NICKNAME, &stored.nickname1, nickname)?;
        tx.execute(
            "UPDATE players SET nickname1 = ?1, updated = ?2 WHERE id = ?3",
            params![nickname, now, id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Clear the nickname, provided it still reads `old`.
    pub fn delete_player_nickname(&self, id: &str, old: &str) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let stored = query_player(&tx, id).or_not_found(|| format!("player {id}"))?;
        if stored.nickname1 != old {
            return Err(Error::Conflict(format!(
                "nickname of player {id} is {:?}, not {:?}",
                stored.nickname1, old
            )));
        }
        if old.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        insert_change(&tx, id, now, PROP_NICKNAME, old, "")?;
        tx.execute(
            "UPDATE players SET nickname1 = '', updated = ?1 WHERE id = ?2",
            params![now, id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Full-text search over first, last and nickname with optional exact
    /// position/team filters. An empty text with no filter matches nothing.
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<Player>> {
        let conn = self.lock()?;
        search_locked(&conn, query)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

fn save_player_locked(conn: &mut Connection, player: &Player) -> Result<SaveOutcome> {
    if player.id.trim().is_empty() {
        return Err(Error::Validation("player id must not be empty".into()));
    }
    let tx = conn.transaction()?;
    let now = Utc::now();

    let Some(stored) = query_player(&tx, &player.id).optional()? else {
        tx.execute(
            "INSERT INTO players (
                id, yahoo_id, first_name, last_name, position, team, weight, height,
                birth_date, rookie_year, years_exp, jersey, depth_chart_order, college,
                active, nickname1, created, updated
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?17)",
            params![
                player.id,
                player.yahoo_id,
                player.first_name,
                player.last_name,
                player.position.as_str(),
                player.team.key(),
                player.weight,
                player.height,
                player.birth_date,
                player.rookie_year,
                player.years_exp,
                player.jersey,
                player.depth_chart_order,
                player.college,
                player.active,
                player.nickname1,
                now,
            ],
        )?;
        tx.commit()?;
        return Ok(SaveOutcome::Inserted);
    };

    let changes: Vec<FieldChange> = stored.diff(player);
    if changes.is_empty() {
        return Ok(SaveOutcome::Unchanged);
    }
    for change in &changes {
        insert_change(&tx, &player.id, now, change.property, &change.old, &change.new)?;
    }
    tx.execute(
        "UPDATE players SET
            first_name = ?2, last_name = ?3, position = ?4, team = ?5, weight = ?6,
            height = ?7, birth_date = ?8, rookie_year = ?9, years_exp = ?10, jersey = ?11,
            depth_chart_order = ?12, college = ?13, active = ?14,
            nickname1 = CASE WHEN ?15 = '' THEN nickname1 ELSE ?15 END,
            updated = ?16
         WHERE id = ?1",
        params![
            player.id,
            player.first_name,
            player.last_name,
            player.position.as_str(),
            player.team.key(),
            player.weight,
            player.height,
            player.birth_date,
            player.rookie_year,
            player.years_exp,
            player.jersey,
            player.depth_chart_order,
            player.college,
            player.active,
            player.nickname1,
            now,
        ],
    )?;
    tx.commit()?;
    debug!("player {} updated ({} changes)", player.id, changes.len());
    Ok(SaveOutcome::Updated(changes.len()))
}

pub(super) fn search_locked(conn: &Connection, query: &SearchQuery) -> Result<Vec<Player>> {
    let position = query.position.map(|p| p.as_str());
    let team = query.team.map(|t| t.key());
    let match_expr = fts_match_expression(&query.text);

    let players = match match_expr {
        Some(expr) => {
            let sql = format!(
                "SELECT {PLAYER_COLUMNS}
                 FROM player_search s JOIN players p ON p.id = s.player_id
                 WHERE player_search MATCH ?1
                   AND (?2 IS NULL OR p.position = ?2)
                   AND (?3 IS NULL OR p.team = ?3)
                 ORDER BY p.last_name, p.first_name, p.id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![expr, position, team], map_player)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        }
        None if position.is_some() || team.is_some() => {
            let sql = format!(
                "SELECT {PLAYER_COLUMNS} FROM players p
                 WHERE (?1 IS NULL OR p.position = ?1)
                   AND (?2 IS NULL OR p.team = ?2)
                 ORDER BY p.last_name, p.first_name, p.id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![position, team], map_player)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        }
        None => Vec::new(),
    };
    Ok(players)
}

/// Every alphanumeric run becomes a quoted term; all terms must match.
fn fts_match_expression(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" AND "))
    }
}

pub(super) fn query_player(conn: &Connection, id: &str) -> rusqlite::Result<Player> {
    conn.query_row(
        &format!("SELECT {PLAYER_COLUMNS} FROM players p WHERE p.id = ?1"),
        params![id],
        map_player,
    )
}

fn query_changes(conn: &Connection, id: &str) -> Result<Vec<Change>> {
    let mut stmt = conn.prepare(
        "SELECT changed_at, property, old_value, new_value
         FROM player_changes WHERE player_id = ?1
         ORDER BY changed_at DESC, id DESC",
    )?;
    let changes = stmt
        .query_map(params![id], |row| {
            Ok(Change {
                time: row.get(0)?,
                property: row.get(1)?,
                old: row.get(2)?,
                new: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(changes)
}

pub(super) fn insert_change(
    conn: &Connection,
    player_id: &str,
    at: chrono::DateTime<Utc>,
    property: &str,
    old: &str,
    new: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO player_changes (player_id, changed_at, property, old_value, new_value)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![player_id, at, property, old, new],
    )?;
    Ok(())
}

fn map_player(row: &Row) -> rusqlite::Result<Player> {
    let position: String = row.get(4)?;
    let team: String = row.get(5)?;
    Ok(Player {
        id: row.get(0)?,
        yahoo_id: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        position: Position::parse(&position),
        team: NflTeam::parse(&team),
        weight: row.get(6)?,
        height: row.get(7)?,
        birth_date: row.get(8)?,
        rookie_year: row.get(9)?,
        years_exp: row.get(10)?,
        jersey: row.get(11)?,
        depth_chart_order: row.get(12)?,
        college: row.get(13)?,
        active: row.get(14)?,
        nickname1: row.get(15)?,
        created: row.get(16)?,
        updated: row.get(17)?,
        changes: Vec::new(),
    })
}
