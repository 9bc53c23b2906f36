use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Sleeper,
    Yahoo,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Sleeper => "sleeper",
            Platform::Yahoo => "yahoo",
        }
    }

    pub fn parse(s: &str) -> Result<Platform> {
        match s.trim().to_lowercase().as_str() {
            "sleeper" => Ok(Platform::Sleeper),
            "yahoo" => Ok(Platform::Yahoo),
            other => Err(Error::Validation(format!("unknown platform {other:?}"))),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A season-scoped league on one platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct League {
    pub id: i64,
    pub platform: Platform,
    pub external_id: String,
    pub name: String,
    /// "YYYY"
    pub year: String,
    pub archived: bool,
    pub managers: Vec<LeagueManager>,
}

impl League {
    pub fn new(platform: Platform, external_id: &str, name: &str, year: &str) -> Self {
        League {
            id: 0,
            platform,
            external_id: external_id.to_string(),
            name: name.to_string(),
            year: year.to_string(),
            archived: false,
            managers: Vec::new(),
        }
    }

    pub fn manager_by_join_key(&self, join_key: &str) -> Option<&LeagueManager> {
        self.managers.iter().find(|m| m.join_key == join_key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeagueManager {
    pub external_id: String,
    pub team_name: String,
    pub manager_name: String,
    /// Platform roster-slot number that matchup records refer to.
    pub join_key: String,
}

impl LeagueManager {
    /// Team name, or the manager's name for teams that never set one.
    pub fn display_name(&self) -> &str {
        if self.team_name.is_empty() {
            &self.manager_name
        } else {
            &self.team_name
        }
    }
}

/// One row of a league table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeagueStanding {
    pub rank: u32,
    pub team_id: String,
    pub team_name: String,
    pub manager_name: String,
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
    /// "INT.DD"
    pub points_for: String,
    pub points_for_scaled: i64,
}

/// Four digits, nothing else.
pub fn validate_year(year: &str) -> Result<()> {
    if year.len() == 4 && year.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "year must be formatted YYYY, got {year:?}"
        )))
    }
}
