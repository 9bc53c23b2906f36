use rusqlite::params;
use std::collections::BTreeMap;

use super::Database;
use crate::domain::{PlayerScore, SeasonScores, SEASON_WEEKS};
use crate::error::{Error, Result};

impl Database {
    /// Store a week's player scores for a league, replacing earlier values.
    pub fn save_player_scores(
        &self,
        league_id: i64,
        week: u32,
        scores: &[PlayerScore],
    ) -> Result<()> {
        if week == 0 || week as usize >= SEASON_WEEKS {
            return Err(Error::Validation(format!(
                "week must be between 1 and {}, got {week}",
                SEASON_WEEKS - 1
            )));
        }
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO player_scores (player_id, league_id, week, score)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for s in scores {
                stmt.execute(params![s.player_id, league_id, week, s.score])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// One entry per league the player scored in, oldest season first.
    pub fn get_player_scores(&self, player_id: &str) -> Result<Vec<SeasonScores>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT l.id, l.name, l.year, s.week, s.score
             FROM player_scores s JOIN leagues l ON l.id = s.league_id
             WHERE s.player_id = ?1
             ORDER BY l.year, l.id, s.week",
        )?;
        let rows = stmt
            .query_map(params![player_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut seasons: BTreeMap<(String, i64), SeasonScores> = BTreeMap::new();
        for (league_id, name, year, week, score) in rows {
            let entry = seasons
                .entry((year.clone(), league_id))
                .or_insert_with(|| SeasonScores {
                    league_id,
                    league_name: name,
                    league_year: year,
                    player_id: player_id.to_string(),
                    scores: [0; SEASON_WEEKS],
                });
            if let Some(slot) = usize::try_from(week).ok().and_then(|w| entry.scores.get_mut(w)) {
                *slot = score;
            }
        }
        Ok(seasons.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_db;
    use crate::domain::{League, Platform};
    use crate::error::ErrorKind;

    fn score(id: &str, score: i64) -> PlayerScore {
        PlayerScore {
            player_id: id.into(),
            score,
        }
    }

    #[test]
    fn test_scores_indexed_by_week() {
        let db = memory_db();
        let league = db
            .insert_league(&League::new(Platform::Sleeper, "924039165950484480", "L", "2024"))
            .unwrap();
        db.save_player_scores(league, 1, &[score("8154", 13100), score("4034", 22400)])
            .unwrap();

        let seasons = db.get_player_scores("8154").unwrap();
        assert_eq!(seasons.len(), 1);
        let mut expected = [0; SEASON_WEEKS];
        expected[1] = 13100;
        assert_eq!(seasons[0].scores, expected);
        assert_eq!(seasons[0].league_year, "2024");
    }

    #[test]
    fn test_resync_replaces_and_sorts_by_year() {
        let db = memory_db();
        let newer = db
            .insert_league(&League::new(Platform::Sleeper, "b", "New", "2024"))
            .unwrap();
        let older = db
            .insert_league(&League::new(Platform::Yahoo, "a", "Old", "2023"))
            .unwrap();
        db.save_player_scores(newer, 3, &[score("1", 5000)]).unwrap();
        db.save_player_scores(newer, 3, &[score("1", 7000)]).unwrap();
        db.save_player_scores(older, 18, &[score("1", 900)]).unwrap();

        let seasons = db.get_player_scores("1").unwrap();
        assert_eq!(seasons.len(), 2);
        assert_eq!(seasons[0].league_name, "Old");
        assert_eq!(seasons[0].scores[18], 900);
        assert_eq!(seasons[1].scores[3], 7000);
    }

    #[test]
    fn test_week_out_of_range() {
        let db = memory_db();
        let league = db
            .insert_league(&League::new(Platform::Sleeper, "x", "L", "2024"))
            .unwrap();
        let err = db.save_player_scores(league, 19, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(db.get_player_scores("nobody").unwrap().is_empty());
    }
}
