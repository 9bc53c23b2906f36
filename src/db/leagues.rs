use rusqlite::{params, Connection, OptionalExtension, Row};

use super::Database;
use crate::domain::{validate_year, League, LeagueManager, Platform};
use crate::error::{Error, OptionalRow, Result};

impl Database {
    /// Insert a league (managers included) and return its id.
    pub fn insert_league(&self, league: &League) -> Result<i64> {
        if league.external_id.trim().is_empty() {
            return Err(Error::Validation("external id must not be empty".into()));
        }
        validate_year(&league.year)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM leagues WHERE platform = ?1 AND external_id = ?2",
                params![league.platform.as_str(), league.external_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Err(Error::Conflict(format!(
                "{} league {} already exists (id {id})",
                league.platform, league.external_id
            )));
        }

        tx.execute(
            "INSERT INTO leagues (platform, external_id, name, year, archived)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                league.platform.as_str(),
                league.external_id,
                league.name,
                league.year,
                league.archived
            ],
        )?;
        let id = tx.last_insert_rowid();
        insert_managers(&tx, id, &league.managers)?;
        tx.commit()?;
        Ok(id)
    }

    pub fn get_league(&self, id: i64) -> Result<League> {
        let conn = self.lock()?;
        let mut league = conn
            .query_row(
                "SELECT id, platform, external_id, name, year, archived
                 FROM leagues WHERE id = ?1",
                params![id],
                map_league,
            )
            .or_not_found(|| format!("league {id}"))?;
        league.managers = query_managers(&conn, id)?;
        Ok(league)
    }

    /// Lookup by the platform's own league id.
    pub fn find_league_by_external_id(
        &self,
        platform: Platform,
        external_id: &str,
    ) -> Result<League> {
        let id: i64 = {
            let conn = self.lock()?;
            conn.query_row(
                "SELECT id FROM leagues WHERE platform = ?1 AND external_id = ?2",
                params![platform.as_str(), external_id],
                |row| row.get(0),
            )
            .or_not_found(|| format!("{platform} league {external_id}"))?
        };
        self.get_league(id)
    }

    /// All leagues, newest season first. Managers are not loaded.
    pub fn list_leagues(&self, include_archived: bool) -> Result<Vec<League>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, platform, external_id, name, year, archived
             FROM leagues WHERE ?1 OR archived = 0
             ORDER BY year DESC, name, id",
        )?;
        let leagues = stmt
            .query_map(params![include_archived], map_league)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(leagues)
    }

    pub fn archive_league(&self, id: i64, archived: bool) -> Result<()> {
        let conn = self.lock()?;
        let n = conn.execute(
            "UPDATE leagues SET archived = ?1 WHERE id = ?2",
            params![archived, id],
        )?;
        if n == 0 {
            return Err(Error::NotFound(format!("league {id}")));
        }
        Ok(())
    }

    /// Removes the league and everything hanging off it.
    pub fn delete_league(&self, id: i64) -> Result<()> {
        let conn = self.lock()?;
        let n = conn.execute("DELETE FROM leagues WHERE id = ?1", params![id])?;
        if n == 0 {
            return Err(Error::NotFound(format!("league {id}")));
        }
        Ok(())
    }

    /// Replace the league's managers; order is kept as given.
    pub fn save_league_managers(&self, league_id: i64, managers: &[LeagueManager]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let exists: Option<i64> = tx
            .query_row(
                "SELECT id FROM leagues WHERE id = ?1",
                params![league_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(Error::NotFound(format!("league {league_id}")));
        }
        tx.execute(
            "DELETE FROM league_managers WHERE league_id = ?1",
            params![league_id],
        )?;
        insert_managers(&tx, league_id, managers)?;
        tx.commit()?;
        Ok(())
    }
}

fn insert_managers(conn: &Connection, league_id: i64, managers: &[LeagueManager]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO league_managers
            (league_id, external_id, team_name, manager_name, join_key, ordinal)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for (ordinal, m) in managers.iter().enumerate() {
        stmt.execute(params![
            league_id,
            m.external_id,
            m.team_name,
            m.manager_name,
            m.join_key,
            ordinal as i64
        ])?;
    }
    Ok(())
}

fn query_managers(conn: &Connection, league_id: i64) -> Result<Vec<LeagueManager>> {
    let mut stmt = conn.prepare(
        "SELECT external_id, team_name, manager_name, join_key
         FROM league_managers WHERE league_id = ?1 ORDER BY ordinal",
    )?;
    let managers = stmt
        .query_map(params![league_id], |row| {
            Ok(LeagueManager {
                external_id: row.get(0)?,
                team_name: row.get(1)?,
                manager_name: row.get(2)?,
                join_key: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(managers)
}

fn map_league(row: &Row) -> rusqlite::Result<League> {
    let platform: String = row.get(1)?;
    let platform = Platform::parse(&platform).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(League {
        id: row.get(0)?,
        platform,
        external_id: row.get(2)?,
        name: row.get(3)?,
        year: row.get(4)?,
        archived: row.get(5)?,
        managers: Vec::new(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::test_support::memory_db;
    use crate::error::ErrorKind;

    pub fn manager(external_id: &str, team: &str, name: &str, join_key: &str) -> LeagueManager {
        LeagueManager {
            external_id: external_id.into(),
            team_name: team.into(),
            manager_name: name.into(),
            join_key: join_key.into(),
        }
    }

    #[test]
    fn test_insert_and_get_league() {
        let db = memory_db();
        let mut league = League::new(Platform::Sleeper, "924039165950484480", "Dynasty", "2024");
        league.managers = vec![
            manager("u1", "Puk Nukem", "puk", "1"),
            manager("u4", "No-Bell Prizes", "nobel", "4"),
        ];
        let id = db.insert_league(&league).unwrap();

        let got = db.get_league(id).unwrap();
        assert_eq!(got.id, id);
        assert_eq!(got.platform, Platform::Sleeper);
        assert_eq!(got.managers.len(), 2);
        assert_eq!(got.managers[1].team_name, "No-Bell Prizes");

        let found = db
            .find_league_by_external_id(Platform::Sleeper, "924039165950484480")
            .unwrap();
        assert_eq!(found.id, id);
    }

    #[test]
    fn test_insert_validates() {
        let db = memory_db();
        let bad_year = League::new(Platform::Yahoo, "123", "x", "24");
        assert_eq!(
            db.insert_league(&bad_year).unwrap_err().kind(),
            ErrorKind::Validation
        );
        let no_id = League::new(Platform::Yahoo, " ", "x", "2024");
        assert_eq!(
            db.insert_league(&no_id).unwrap_err().kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn test_duplicate_league_is_conflict() {
        let db = memory_db();
        let league = League::new(Platform::Yahoo, "123", "x", "2024");
        db.insert_league(&league).unwrap();
        assert_eq!(
            db.insert_league(&league).unwrap_err().kind(),
            ErrorKind::Conflict
        );
    }

    #[test]
    fn test_replace_managers_keeps_order() {
        let db = memory_db();
        let id = db
            .insert_league(&League::new(Platform::Sleeper, "1", "L", "2024"))
            .unwrap();
        db.save_league_managers(id, &[manager("a", "A", "a", "7"), manager("b", "B", "b", "1")])
            .unwrap();
        db.save_league_managers(id, &[manager("c", "C", "c", "4")])
            .unwrap();
        let got = db.get_league(id).unwrap();
        assert_eq!(got.managers, vec![manager("c", "C", "c", "4")]);

        assert_eq!(
            db.save_league_managers(999, &[]).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_archive_and_delete() {
        let db = memory_db();
        let old = db
            .insert_league(&League::new(Platform::Sleeper, "1", "Old", "2022"))
            .unwrap();
        let new = db
            .insert_league(&League::new(Platform::Sleeper, "2", "New", "2024"))
            .unwrap();
        db.archive_league(old, true).unwrap();

        let active = db.list_leagues(false).unwrap();
        assert_eq!(active.iter().map(|l| l.id).collect::<Vec<_>>(), vec![new]);
        let all = db.list_leagues(true).unwrap();
        assert_eq!(all.iter().map(|l| l.id).collect::<Vec<_>>(), vec![new, old]);

        db.delete_league(old).unwrap();
        assert_eq!(db.get_league(old).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(db.delete_league(old).unwrap_err().kind(), ErrorKind::NotFound);
    }
}
