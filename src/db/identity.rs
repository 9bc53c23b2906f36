use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use super::players::{insert_change, search_locked};
use super::Database;
use crate::domain::{strip_suffixes, ForeignPlayer, SearchQuery, PROP_YAHOO_ID};
use crate::error::{Error, Result};

impl Database {
    /// Map Yahoo players to canonical ids, in input order.
    ///
    /// An exact `yahoo_id` hit wins. Otherwise the suffix-stripped name is
    /// searched within the player's position and a unique hit is bound to the
    /// Yahoo id so the next lookup is exact. Any failure aborts the batch.
    pub fn convert_yahoo_ids(&self, players: &[ForeignPlayer]) -> Result<Vec<String>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut ids = Vec::with_capacity(players.len());
        let mut bound = 0usize;

        for foreign in players {
            if let Some(id) = find_by_yahoo_id(&tx, &foreign.id)? {
                ids.push(id);
                continue;
            }

            let query = SearchQuery {
                text: strip_suffixes(&foreign.full_name()),
                team: None,
                position: Some(foreign.position),
            };
            let mut hits = search_locked(&tx, &query)?;
            let player = match hits.len() {
                1 => hits.remove(0),
                0 => {
                    return Err(Error::NotFound(format!(
                        "player {} ({}, yahoo id {})",
                        foreign.full_name(),
                        foreign.position,
                        foreign.id
                    )))
                }
                n => {
                    return Err(Error::Conflict(format!(
                        "multiple results found for {} ({}): {n} players",
                        foreign.full_name(),
                        foreign.position
                    )))
                }
            };

            let now = Utc::now();
            insert_change(&tx, &player.id, now, PROP_YAHOO_ID, &player.yahoo_id, &foreign.id)?;
            tx.execute(
                "UPDATE players SET yahoo_id = ?1, updated = ?2 WHERE id = ?3",
                params![foreign.id, now, player.id],
            )?;
            debug!("bound yahoo id {} to player {}", foreign.id, player.id);
            bound += 1;
            ids.push(player.id);
        }

        tx.commit()?;
        if bound > 0 {
            info!("bound {} new yahoo ids", bound);
        }
        Ok(ids)
    }
}

fn find_by_yahoo_id(conn: &Connection, yahoo_id: &str) -> Result<Option<String>> {
    if yahoo_id.is_empty() {
        return Ok(None);
    }
    let mut stmt = conn.prepare("SELECT id FROM players WHERE yahoo_id = ?1 LIMIT 2")?;
    let ids = stmt
        .query_map(params![yahoo_id], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    match ids.len() {
        0 => Ok(None),
        1 => Ok(ids.into_iter().next()),
        _ => Err(Error::Conflict(format!(
            "multiple results found for yahoo id {yahoo_id}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{memory_db, player, seed_top_players};
    use crate::domain::{NflTeam, Position};
    use crate::error::ErrorKind;

    fn foreign(id: &str, first: &str, last: &str, position: Position) -> ForeignPlayer {
        ForeignPlayer {
            id: id.into(),
            first_name: first.into(),
            last_name: last.into(),
            position,
        }
    }

    #[test]
    fn test_name_match_binds_yahoo_id() {
        let db = memory_db();
        seed_top_players(&db);

        let ids = db
            .convert_yahoo_ids(&[
                foreign("31031", "Justin", "Jefferson", Position::WR),
                foreign("30121", "Christian", "McCaffrey", Position::RB),
            ])
            .unwrap();
        assert_eq!(ids, vec!["6794", "4034"]);

        let p = db.get_player("6794").unwrap();
        assert_eq!(p.yahoo_id, "31031");
        assert_eq!(p.changes.len(), 1);
        assert_eq!(p.changes[0].property, PROP_YAHOO_ID);
        assert_eq!(p.changes[0].new, "31031");
    }

    #[test]
    fn test_conversion_is_idempotent() {
        let db = memory_db();
        seed_top_players(&db);
        let input = [
            foreign("32700", "Ja'Marr", "Chase", Position::WR),
            foreign("30175", "Travis", "Kelce", Position::TE),
        ];
        let first = db.convert_yahoo_ids(&input).unwrap();
        let second = db.convert_yahoo_ids(&input).unwrap();
        assert_eq!(first, second);
        // The second pass is served by the exact id lookup and writes nothing.
        assert_eq!(db.get_player("7564").unwrap().changes.len(), 1);
        assert_eq!(db.get_player("1466").unwrap().changes.len(), 1);
    }

    #[test]
    fn test_suffix_is_stripped_before_search() {
        let db = memory_db();
        db.save_player(&player("8112", "Kenneth", "Walker", Position::RB, NflTeam::Sea))
            .unwrap();
        let ids = db
            .convert_yahoo_ids(&[foreign("33500", "Kenneth", "Walker III", Position::RB)])
            .unwrap();
        assert_eq!(ids, vec!["8112"]);
    }

    #[test]
    fn test_position_restricts_search() {
        let db = memory_db();
        seed_top_players(&db);
        // Two Justins, only one kicker.
        let ids = db
            .convert_yahoo_ids(&[foreign("1001", "Justin", "", Position::K)])
            .unwrap();
        assert_eq!(ids, vec!["1945"]);
    }

    #[test]
    fn test_ambiguous_name_is_conflict_and_rolls_back() {
        let db = memory_db();
        seed_top_players(&db);
        db.save_player(&player("9999", "Justin", "Jefferson", Position::WR, NflTeam::Fa))
            .unwrap();

        let err = db
            .convert_yahoo_ids(&[
                foreign("30175", "Travis", "Kelce", Position::TE),
                foreign("31031", "Justin", "Jefferson", Position::WR),
            ])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        // Kelce's binding was part of the aborted batch.
        assert_eq!(db.get_player("1466").unwrap().yahoo_id, "");
    }

    #[test]
    fn test_unknown_player_is_not_found() {
        let db = memory_db();
        seed_top_players(&db);
        let err = db
            .convert_yahoo_ids(&[foreign("1", "Nobody", "Atall", Position::QB)])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
