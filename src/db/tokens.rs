use chrono::Utc;
use rusqlite::params;

use super::Database;
use crate::domain::OAuthToken;
use crate::error::{OptionalRow, Result};

impl Database {
    /// Upsert the token for a league.
    pub fn save_token(&self, league_id: i64, token: &OAuthToken) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO oauth_tokens
                (league_id, access_token, refresh_token, token_type, expiry, updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(league_id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_type = excluded.token_type,
                expiry = excluded.expiry,
                updated = excluded.updated",
            params![
                league_id,
                token.access_token,
                token.refresh_token,
                token.token_type,
                token.expiry,
                Utc::now()
            ],
        )?;
        Ok(())
    }

    pub fn get_token(&self, league_id: i64) -> Result<OAuthToken> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT access_token, refresh_token, token_type, expiry
             FROM oauth_tokens WHERE league_id = ?1",
            params![league_id],
            |row| {
                Ok(OAuthToken {
                    access_token: row.get(0)?,
                    refresh_token: row.get(1)?,
                    token_type: row.get(2)?,
                    expiry: row.get(3)?,
                })
            },
        )
        .or_not_found(|| format!("token for league {league_id}"))
    }
}
