use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::position::Position;
use super::teams::NflTeam;

/// An external, dated valuation of players. Rank 1 is best.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub id: i64,
    pub date: NaiveDate,
    pub players: HashMap<String, RankingPlayer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingPlayer {
    pub rank: i32,
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub position: Position,
    pub team: NflTeam,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingSummary {
    pub id: i64,
    pub date: NaiveDate,
    pub player_count: i64,
}

/// Persisted team valuation for one league week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerRanking {
    pub id: i64,
    pub league_id: i64,
    pub ranking_id: i64,
    pub week: u32,
    pub created: DateTime<Utc>,
    pub teams: Vec<TeamPowerRanking>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TeamPowerRanking {
    pub team_id: String,
    pub team_name: String,
    pub rank: u32,
    pub rank_change: i32,
    pub total_score: i64,
    pub roster_score: i64,
    pub record_score: i64,
    pub streak_score: i64,
    pub points_for_score: i64,
    pub points_against_score: i64,
    pub roster: Vec<PowerRankingPlayer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerRankingPlayer {
    pub player_id: String,
    pub rank: i32,
    pub first_name: String,
    pub last_name: String,
    pub position: Position,
    pub nfl_team: NflTeam,
    pub power_ranking_points: i64,
    pub is_starter: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerRankingSummary {
    pub id: i64,
    pub ranking_id: i64,
    pub week: u32,
    pub created: DateTime<Utc>,
}
