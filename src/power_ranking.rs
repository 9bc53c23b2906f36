//! Team valuation from rosters, a player ranking and the starting lineup.
//!
//! Every roster player is worth `player_value(rank)`: starters at full value,
//! everyone else at 40%. The roster sum is scaled down by 100 and added to
//! the caller-supplied record, streak and points terms. All arithmetic past
//! the valuation curve is integer, and sorts are stable, so identical inputs
//! give identical snapshots.

use std::collections::{HashMap, HashSet};

use crate::domain::{
    NflTeam, Position, PowerRanking, PowerRankingPlayer, Ranking, Roster, RosterSpot,
    TeamPowerRanking,
};

/// Rank given to rostered players the ranking does not list.
pub const PLACEHOLDER_RANK: i32 = 1000;

const VALUE_SCALE: f64 = 10_000.0;
const VALUE_DECAY: f64 = 0.983;
/// Bench players count 2/5 of their value.
const BENCH_NUM: i64 = 2;
const BENCH_DEN: i64 = 5;
const ROSTER_DIVISOR: i64 = 100;

/// `10000 · 0.983^rank`, strictly decreasing in rank.
pub fn valuation_curve(rank: i32) -> f64 {
    VALUE_SCALE * VALUE_DECAY.powi(rank)
}

/// Integer player value: the curve rounded up. Every rank has value ≥ 1.
pub fn player_value(rank: i32) -> i64 {
    // absorb float noise so exact products (rank 1 → 9830) do not round up
    (valuation_curve(rank) - 1e-9).ceil() as i64
}

/// Non-roster inputs for one team.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamSeed {
    pub team_name: String,
    pub record_score: i64,
    pub streak_score: i64,
    pub points_for_score: i64,
    pub points_against_score: i64,
}

/// Scores and ranks every roster. Teams come back sorted by total score,
/// ties in roster order, with `rank` 1..=N and `rank_change` 0.
pub fn calculate(
    ranking: &Ranking,
    rosters: &[Roster],
    starters: &[RosterSpot],
    seeds: &HashMap<String, TeamSeed>,
) -> Vec<TeamPowerRanking> {
    let mut teams: Vec<TeamPowerRanking> = rosters
        .iter()
        .map(|roster| {
            let seed = seeds.get(&roster.team_id).cloned().unwrap_or_default();
            let mut team = TeamPowerRanking {
                team_id: roster.team_id.clone(),
                team_name: seed.team_name,
                record_score: seed.record_score,
                streak_score: seed.streak_score,
                points_for_score: seed.points_for_score,
                points_against_score: seed.points_against_score,
                roster: roster_players(ranking, roster),
                ..Default::default()
            };
            team.roster_score = roster_score(&mut team.roster, starters);
            team.total_score = team.roster_score
                + team.record_score
                + team.streak_score
                + team.points_for_score
                + team.points_against_score;
            team
        })
        .collect();

    teams.sort_by(|a, b| b.total_score.cmp(&a.total_score));
    for (i, team) in teams.iter_mut().enumerate() {
        team.rank = i as u32 + 1;
    }
    teams
}

/// `rank_change` = previous rank − current rank for teams in both snapshots.
pub fn apply_rank_changes(teams: &mut [TeamPowerRanking], previous: Option<&PowerRanking>) {
    let previous: HashMap<&str, u32> = previous
        .map(|p| {
            p.teams
                .iter()
                .map(|t| (t.team_id.as_str(), t.rank))
                .collect()
        })
        .unwrap_or_default();
    for team in teams.iter_mut() {
        team.rank_change = previous
            .get(team.team_id.as_str())
            .map(|&prev| prev as i32 - team.rank as i32)
            .unwrap_or(0);
    }
}

/// Ranking entries for each distinct roster id, best rank first.
fn roster_players(ranking: &Ranking, roster: &Roster) -> Vec<PowerRankingPlayer> {
    let mut seen = HashSet::new();
    let mut players: Vec<PowerRankingPlayer> = roster
        .player_ids
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .map(|id| match ranking.players.get(id) {
            Some(p) => PowerRankingPlayer {
                player_id: id.clone(),
                rank: p.rank,
                first_name: p.first_name.clone(),
                last_name: p.last_name.clone(),
                position: p.position,
                nfl_team: p.team,
                power_ranking_points: 0,
                is_starter: false,
            },
            None => PowerRankingPlayer {
                player_id: id.clone(),
                rank: PLACEHOLDER_RANK,
                first_name: String::new(),
                last_name: String::new(),
                position: Position::Unknown,
                nfl_team: NflTeam::Fa,
                power_ranking_points: 0,
                is_starter: false,
            },
        })
        .collect();
    players.sort_by_key(|p| p.rank);
    players
}

/// Fills starters slot by slot, prices the bench, and returns the scaled sum.
fn roster_score(players: &mut [PowerRankingPlayer], starters: &[RosterSpot]) -> i64 {
    let mut total = 0i64;
    for spot in starters {
        let pick = players
            .iter_mut()
            .find(|p| !p.is_starter && spot.allows(p.position));
        if let Some(p) = pick {
            p.is_starter = true;
            p.power_ranking_points = player_value(p.rank);
            total += p.power_ranking_points;
        }
    }
    for p in players.iter_mut().filter(|p| !p.is_starter) {
        p.power_ranking_points = player_value(p.rank) * BENCH_NUM / BENCH_DEN;
        total += p.power_ranking_points;
    }
    total / ROSTER_DIVISOR
}
