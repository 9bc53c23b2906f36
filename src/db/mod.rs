use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::error::{Error, Result};

mod identity;
mod leagues;
mod players;
mod power_rankings;
mod rankings;
mod scores;
mod tokens;

pub use players::SaveSummary;

/// Thread-safe SQLite handle (single connection with mutex).
///
/// Every public operation runs in its own short transaction; a transaction
/// that is dropped before `commit` rolls back.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path.
    /// `":memory:"` gives a private in-memory database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        debug!("database ready at {}", path);
        Ok(db)
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Internal("database mutex poisoned".into()))
    }
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS players (
    id                TEXT    PRIMARY KEY,
    yahoo_id          TEXT    NOT NULL DEFAULT '',
    first_name        TEXT    NOT NULL,
    last_name         TEXT    NOT NULL,
    position          TEXT    NOT NULL,
    team              TEXT    NOT NULL,
    weight            INTEGER NOT NULL DEFAULT 0,
    height            INTEGER,
    birth_date        TEXT,
    rookie_year       INTEGER,
    years_exp         INTEGER NOT NULL DEFAULT 0,
    jersey            INTEGER NOT NULL DEFAULT 0,
    depth_chart_order INTEGER NOT NULL DEFAULT 0,
    college           TEXT    NOT NULL DEFAULT '',
    active            INTEGER NOT NULL DEFAULT 0,
    nickname1         TEXT    NOT NULL DEFAULT '',
    created           TEXT    NOT NULL,
    updated           TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS player_changes (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    player_id   TEXT    NOT NULL REFERENCES players(id),
    changed_at  TEXT    NOT NULL,
    property    TEXT    NOT NULL,
    old_value   TEXT    NOT NULL,
    new_value   TEXT    NOT NULL
);

CREATE VIRTUAL TABLE IF NOT EXISTS player_search USING fts5(
    player_id UNINDEXED,
    first_name,
    last_name,
    nickname1,
    tokenize = 'unicode61 remove_diacritics 2'
);

CREATE TRIGGER IF NOT EXISTS players_search_insert AFTER INSERT ON players BEGIN
    INSERT INTO player_search (player_id, first_name, last_name, nickname1)
    VALUES (new.id, new.first_name, new.last_name, new.nickname1);
END;

CREATE TRIGGER IF NOT EXISTS players_search_update
AFTER UPDATE OF first_name, last_name, nickname1 ON players BEGIN
    DELETE FROM player_search WHERE player_id = old.id;
    INSERT INTO player_search (player_id, first_name, last_name, nickname1)
    VALUES (new.id, new.first_name, new.last_name, new.nickname1);
END;

CREATE TABLE IF NOT EXISTS leagues (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    platform    TEXT    NOT NULL,
    external_id TEXT    NOT NULL,
    name        TEXT    NOT NULL,
    year        TEXT    NOT NULL,
    archived    INTEGER NOT NULL DEFAULT 0,
    UNIQUE (platform, external_id)
);

CREATE TABLE IF NOT EXISTS league_managers (
    league_id    INTEGER NOT NULL REFERENCES leagues(id) ON DELETE CASCADE,
    external_id  TEXT    NOT NULL,
    team_name    TEXT    NOT NULL,
    manager_name TEXT    NOT NULL,
    join_key     TEXT    NOT NULL,
    ordinal      INTEGER NOT NULL,
    PRIMARY KEY (league_id, external_id)
);

CREATE TABLE IF NOT EXISTS player_scores (
    player_id   TEXT    NOT NULL,
    league_id   INTEGER NOT NULL REFERENCES leagues(id) ON DELETE CASCADE,
    week        INTEGER NOT NULL,
    score       INTEGER NOT NULL,
    PRIMARY KEY (player_id, league_id, week)
);

CREATE TABLE IF NOT EXISTS rankings (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    ranking_date TEXT   NOT NULL,
    created     TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS ranking_players (
    ranking_id  INTEGER NOT NULL REFERENCES rankings(id) ON DELETE CASCADE,
    player_id   TEXT    NOT NULL,
    rank        INTEGER NOT NULL,
    first_name  TEXT    NOT NULL,
    last_name   TEXT    NOT NULL,
    position    TEXT    NOT NULL,
    team        TEXT    NOT NULL,
    PRIMARY KEY (ranking_id, player_id)
);

CREATE TABLE IF NOT EXISTS power_rankings (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    league_id   INTEGER NOT NULL REFERENCES leagues(id) ON DELETE CASCADE,
    ranking_id  INTEGER NOT NULL,
    week        INTEGER NOT NULL,
    created     TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS power_ranking_teams (
    id                   INTEGER PRIMARY KEY AUTOINCREMENT,
    power_ranking_id     INTEGER NOT NULL REFERENCES power_rankings(id) ON DELETE CASCADE,
    team_id              TEXT    NOT NULL,
    team_name            TEXT    NOT NULL,
    rank                 INTEGER NOT NULL,
    rank_change          INTEGER NOT NULL,
    total_score          INTEGER NOT NULL,
    roster_score         INTEGER NOT NULL,
    record_score         INTEGER NOT NULL,
    streak_score         INTEGER NOT NULL,
    points_for_score     INTEGER NOT NULL,
    points_against_score INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS power_ranking_players (
    team_row_id          INTEGER NOT NULL REFERENCES power_ranking_teams(id) ON DELETE CASCADE,
    ordinal              INTEGER NOT NULL,
    player_id            TEXT    NOT NULL,
    rank                 INTEGER NOT NULL,
    first_name           TEXT    NOT NULL,
    last_name            TEXT    NOT NULL,
    position             TEXT    NOT NULL,
    nfl_team             TEXT    NOT NULL,
    power_ranking_points INTEGER NOT NULL,
    is_starter           INTEGER NOT NULL,
    PRIMARY KEY (team_row_id, ordinal)
);

CREATE TABLE IF NOT EXISTS oauth_tokens (
    league_id     INTEGER PRIMARY KEY REFERENCES leagues(id) ON DELETE CASCADE,
    access_token  TEXT    NOT NULL,
    refresh_token TEXT    NOT NULL,
    token_type    TEXT    NOT NULL,
    expiry        TEXT    NOT NULL,
    updated       TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_players_yahoo ON players(yahoo_id);
CREATE INDEX IF NOT EXISTS idx_player_changes_player ON player_changes(player_id, changed_at);
CREATE INDEX IF NOT EXISTS idx_player_scores_league ON player_scores(league_id, week);
CREATE INDEX IF NOT EXISTS idx_power_rankings_league ON power_rankings(league_id, created);
"#;
