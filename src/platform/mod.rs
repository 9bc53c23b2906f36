pub mod sleeper;
pub mod yahoo;

pub use sleeper::SleeperClient;
pub use yahoo::YahooClient;

use async_trait::async_trait;
use reqwest::Response;

use crate::domain::{
    League, LeagueManager, LeagueStanding, Matchup, PlayerScore, Roster, RosterSpot,
};
use crate::error::{Error, Result};

/// The capability set every league platform adapter provides.
#[async_trait]
pub trait FantasyPlatform: Send + Sync {
    /// Leagues a user plays in for a season.
    async fn get_leagues(&self, user: &str, year: &str) -> Result<Vec<League>>;

    async fn get_league_name(&self, external_id: &str) -> Result<String>;

    /// Managers in platform order; callers sort with `sort_managers`.
    async fn get_managers(&self, league: &League) -> Result<Vec<LeagueManager>>;

    /// Orders managers by numeric `join_key`. Keys that do not parse keep
    /// their relative order after the numeric ones.
    fn sort_managers(&self, managers: &mut [LeagueManager]) {
        managers.sort_by_key(|m| match m.join_key.trim().parse::<i64>() {
            Ok(n) => (0, n),
            Err(_) => (1, 0),
        });
    }

    /// Paired results for a week, plus per-player scores where the platform
    /// reports them. `team_id` is left for the caller to fill from `join_key`.
    async fn get_matchup_results(
        &self,
        league: &League,
        week: u32,
    ) -> Result<(Vec<Matchup>, Vec<PlayerScore>)>;

    /// Rosters keyed by manager external id, with canonical player ids.
    async fn get_rosters(&self, league: &League) -> Result<Vec<Roster>>;

    /// The weekly starting lineup template.
    async fn get_starters(&self, league: &League) -> Result<Vec<RosterSpot>>;

    async fn get_league_standings(&self, league: &League) -> Result<Vec<LeagueStanding>>;

    /// Human-readable name for logging.
    fn name(&self) -> &'static str;
}

/// Standings order: wins desc, losses asc, points-for desc. Ranks are then
/// assigned 1..=N in that order.
pub fn rank_standings(standings: &mut [LeagueStanding]) {
    standings.sort_by(|a, b| {
        b.wins
            .cmp(&a.wins)
            .then(a.losses.cmp(&b.losses))
            .then(b.points_for_scaled.cmp(&a.points_for_scaled))
    });
    for (i, s) in standings.iter_mut().enumerate() {
        s.rank = i as u32 + 1;
    }
}

/// Maps a non-2xx response to an upstream error carrying status and body.
pub(crate) async fn check_status(platform: &'static str, resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Upstream {
        platform,
        status: status.as_u16(),
        message: body.chars().take(200).collect(),
    })
}
