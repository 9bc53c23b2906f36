use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{check_status, rank_standings, FantasyPlatform};
use crate::domain::player::{parse_birth_date, parse_height, parse_rookie_year};
use crate::domain::{
    format_scaled, scale_points, starter_template, League, LeagueManager, LeagueStanding,
    Matchup, NflTeam, Platform, Player, PlayerScore, Position, Roster, RosterSpot, TeamResult,
    SCORE_SCALE,
};
use crate::error::{Error, Result};

const PLATFORM: &str = "sleeper";
const INVALID_PLAYER: &str = "Player Invalid";

/// Client for the public Sleeper API (no authentication).
/// Docs: <https://docs.sleeper.com>
#[derive(Clone)]
pub struct SleeperClient {
    http: Client,
    /// Base URL for overriding in tests
    base_url: String,
}

impl SleeperClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::request("failed to build sleeper HTTP client", e))?;
        Ok(SleeperClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::request(format!("sleeper request {path} failed"), e))?;
        let resp = check_status(PLATFORM, resp).await?;
        resp.json()
            .await
            .map_err(|e| Error::parse(format!("sleeper {path}"), e))
    }

    /// Full NFL player catalog, sorted by id.
    pub async fn fetch_players(&self) -> Result<Vec<Player>> {
        let raw = self.get_json("/v1/players/nfl").await?;
        let players = convert_players(&raw)?;
        info!("Fetched {} players from Sleeper", players.len());
        Ok(players)
    }
}

#[async_trait]
impl FantasyPlatform for SleeperClient {
    fn name(&self) -> &'static str {
        PLATFORM
    }

    async fn get_leagues(&self, user: &str, year: &str) -> Result<Vec<League>> {
        let raw_user = self.get_json(&format!("/v1/user/{user}")).await?;
        let user_id = raw_user["user_id"]
            .as_str()
            .ok_or_else(|| Error::NotFound(format!("sleeper user {user}")))?;
        let raw = self
            .get_json(&format!("/v1/user/{user_id}/leagues/nfl/{year}"))
            .await?;
        convert_leagues(&raw, year)
    }

    async fn get_league_name(&self, external_id: &str) -> Result<String> {
        let raw = self.get_json(&format!("/v1/league/{external_id}")).await?;
        match raw["name"].as_str() {
            Some(name) if !name.is_empty() => Ok(name.to_string()),
            _ => Err(Error::NotFound("league name".into())),
        }
    }

    async fn get_managers(&self, league: &League) -> Result<Vec<LeagueManager>> {
        let rosters = self
            .get_json(&format!("/v1/league/{}/rosters", league.external_id))
            .await?;
        let users = self
            .get_json(&format!("/v1/league/{}/users", league.external_id))
            .await?;
        let mut managers = convert_managers(&rosters, &users)?;
        self.sort_managers(&mut managers);
        Ok(managers)
    }

    async fn get_matchup_results(
        &self,
        league: &League,
        week: u32,
    ) -> Result<(Vec<Matchup>, Vec<PlayerScore>)> {
        let raw = self
            .get_json(&format!(
                "/v1/league/{}/matchups/{}",
                league.external_id, week
            ))
            .await?;
        convert_matchups(&raw, week, &league.managers)
    }

    async fn get_rosters(&self, league: &League) -> Result<Vec<Roster>> {
        let raw = self
            .get_json(&format!("/v1/league/{}/rosters", league.external_id))
            .await?;
        convert_rosters(&raw)
    }

    async fn get_starters(&self, league: &League) -> Result<Vec<RosterSpot>> {
        let raw = self
            .get_json(&format!("/v1/league/{}", league.external_id))
            .await?;
        convert_starters(&raw)
    }

    async fn get_league_standings(&self, league: &League) -> Result<Vec<LeagueStanding>> {
        let rosters = self
            .get_json(&format!("/v1/league/{}/rosters", league.external_id))
            .await?;
        let users = self
            .get_json(&format!("/v1/league/{}/users", league.external_id))
            .await?;
        convert_standings(&rosters, &users)
    }
}

/// Reads an integer that Sleeper sends either as a number or a string.
fn int_field(v: &Value) -> Option<i64> {
    v.as_i64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

fn str_field(v: &Value) -> String {
    v.as_str().unwrap_or_default().to_string()
}

/// Catalog conversion: drops empty ids, unknown positions and the
/// "Player Invalid" placeholder.
pub fn convert_players(raw: &Value) -> Result<Vec<Player>> {
    let entries = raw
        .as_object()
        .ok_or_else(|| Error::parse("sleeper players", "expected an object keyed by id"))?;
    let mut players: Vec<Player> = entries.values().filter_map(convert_player).collect();
    players.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(players)
}

fn convert_player(v: &Value) -> Option<Player> {
    let id = v["player_id"].as_str()?.trim();
    if id.is_empty() {
        return None;
    }
    let position = Position::parse(v["position"].as_str().unwrap_or_default());
    if !position.is_known() {
        return None;
    }
    let first_name = str_field(&v["first_name"]);
    let last_name = str_field(&v["last_name"]);
    if format!("{first_name} {last_name}") == INVALID_PLAYER {
        return None;
    }

    let mut player = Player::new(id);
    player.yahoo_id = match int_field(&v["yahoo_id"]) {
        Some(0) | None => String::new(),
        Some(n) => n.to_string(),
    };
    player.first_name = first_name;
    player.last_name = last_name;
    player.position = position;
    player.team = NflTeam::parse(v["team"].as_str().unwrap_or_default());
    player.weight = int_field(&v["weight"]).unwrap_or(0) as i32;
    player.height = v["height"]
        .as_str()
        .and_then(parse_height)
        .or_else(|| v["height"].as_i64().filter(|h| *h > 0).map(|h| h as i32));
    player.birth_date = v["birth_date"].as_str().and_then(parse_birth_date);
    player.rookie_year = v["metadata"]["rookie_year"]
        .as_str()
        .or_else(|| v["rookie_year"].as_str())
        .and_then(parse_rookie_year);
    player.years_exp = int_field(&v["years_exp"]).unwrap_or(0) as i32;
    player.jersey = int_field(&v["number"]).unwrap_or(0) as i32;
    player.depth_chart_order = int_field(&v["depth_chart_order"]).unwrap_or(0) as i32;
    player.college = str_field(&v["college"]);
    player.active = v["active"].as_bool().unwrap_or(false);
    Some(player)
}

pub fn convert_leagues(raw: &Value, year: &str) -> Result<Vec<League>> {
    let Some(entries) = raw.as_array() else {
        // Sleeper answers null for a user with no leagues that season.
        return Ok(Vec::new());
    };
    let leagues = entries
        .iter()
        .filter_map(|l| {
            let id = l["league_id"].as_str()?;
            let name = l["name"].as_str().unwrap_or_default();
            let season = l["season"].as_str().unwrap_or(year);
            Some(League::new(Platform::Sleeper, id, name, season))
        })
        .collect();
    Ok(leagues)
}

/// Joins rosters to users on `owner_id`. Rosters without an owner are skipped.
pub fn convert_managers(rosters: &Value, users: &Value) -> Result<Vec<LeagueManager>> {
    let rosters = rosters
        .as_array()
        .ok_or_else(|| Error::parse("sleeper rosters", "expected an array"))?;
    let users = users_by_id(users)?;

    let mut managers = Vec::new();
    for roster in rosters {
        let Some(owner_id) = roster["owner_id"].as_str() else {
            warn!("skipping sleeper roster {} without owner", roster["roster_id"]);
            continue;
        };
        let Some(roster_id) = int_field(&roster["roster_id"]) else {
            continue;
        };
        let user = users.get(owner_id);
        managers.push(LeagueManager {
            external_id: owner_id.to_string(),
            team_name: user
                .map(|u| str_field(&u["metadata"]["team_name"]))
                .unwrap_or_default(),
            manager_name: user
                .map(|u| str_field(&u["display_name"]))
                .unwrap_or_default(),
            join_key: roster_id.to_string(),
        });
    }
    if managers.is_empty() {
        return Err(Error::NotFound("managers".into()));
    }
    Ok(managers)
}

fn users_by_id(users: &Value) -> Result<HashMap<&str, &Value>> {
    let users = users
        .as_array()
        .ok_or_else(|| Error::parse("sleeper users", "expected an array"))?;
    Ok(users
        .iter()
        .filter_map(|u| Some((u["user_id"].as_str()?, u)))
        .collect())
}

/// Pairs matchup records by `matchup_id`; records with a null id (byes) are
/// ignored. Team names come from `managers`, matched on roster id.
pub fn convert_matchups(
    raw: &Value,
    week: u32,
    managers: &[LeagueManager],
) -> Result<(Vec<Matchup>, Vec<PlayerScore>)> {
    let records = raw
        .as_array()
        .ok_or_else(|| Error::parse("sleeper matchups", "expected an array"))?;

    let mut pairs: BTreeMap<i64, Vec<TeamResult>> = BTreeMap::new();
    let mut scores: BTreeMap<String, i64> = BTreeMap::new();
    for record in records {
        let join_key = int_field(&record["roster_id"])
            .map(|id| id.to_string())
            .unwrap_or_default();

        if let Some(points) = record["players_points"].as_object() {
            for (player_id, pts) in points {
                scores.insert(player_id.clone(), scale_points(pts.as_f64().unwrap_or(0.0)));
            }
        }

        let Some(matchup_id) = int_field(&record["matchup_id"]) else {
            continue;
        };
        let team_name = managers
            .iter()
            .find(|m| m.join_key == join_key)
            .map(|m| m.display_name().to_string())
            .unwrap_or_default();
        pairs.entry(matchup_id).or_default().push(TeamResult {
            team_id: String::new(),
            team_name,
            score: scale_points(record["points"].as_f64().unwrap_or(0.0)),
            join_key,
        });
    }

    let mut matchups = Vec::with_capacity(pairs.len());
    for (matchup_id, teams) in pairs {
        let [team_a, team_b]: [TeamResult; 2] = teams.try_into().map_err(|t: Vec<_>| {
            Error::parse(
                "sleeper matchups",
                format!("matchup {matchup_id} has {} teams, expected 2", t.len()),
            )
        })?;
        matchups.push(Matchup {
            matchup_id,
            week,
            team_a,
            team_b,
        });
    }
    let player_scores = scores
        .into_iter()
        .map(|(player_id, score)| PlayerScore { player_id, score })
        .collect();
    Ok((matchups, player_scores))
}

pub fn convert_rosters(raw: &Value) -> Result<Vec<Roster>> {
    let rosters = raw
        .as_array()
        .ok_or_else(|| Error::parse("sleeper rosters", "expected an array"))?;
    Ok(rosters
        .iter()
        .filter_map(|r| {
            let owner_id = r["owner_id"].as_str()?;
            let player_ids = r["players"]
                .as_array()
                .map(|ps| ps.iter().filter_map(|p| p.as_str()).map(String::from).collect())
                .unwrap_or_default();
            Some(Roster {
                team_id: owner_id.to_string(),
                player_ids,
            })
        })
        .collect())
}

pub fn convert_starters(league: &Value) -> Result<Vec<RosterSpot>> {
    let positions = league["roster_positions"]
        .as_array()
        .ok_or_else(|| Error::parse("sleeper league", "missing roster_positions"))?;
    Ok(starter_template(positions.iter().filter_map(|p| p.as_str())))
}

/// Season record per roster. Points-for is `fpts` plus `fpts_decimal`
/// hundredths.
pub fn convert_standings(rosters: &Value, users: &Value) -> Result<Vec<LeagueStanding>> {
    let rosters = rosters
        .as_array()
        .ok_or_else(|| Error::parse("sleeper rosters", "expected an array"))?;
    let users = users_by_id(users)?;

    let mut standings = Vec::with_capacity(rosters.len());
    for roster in rosters {
        let Some(owner_id) = roster["owner_id"].as_str() else {
            continue;
        };
        let settings = &roster["settings"];
        let fpts = int_field(&settings["fpts"]).unwrap_or(0);
        let fpts_decimal = int_field(&settings["fpts_decimal"]).unwrap_or(0);
        let scaled = fpts * SCORE_SCALE + fpts_decimal * 10;
        let user = users.get(owner_id);
        let manager_name = user
            .map(|u| str_field(&u["display_name"]))
            .unwrap_or_default();
        let team_name = user
            .map(|u| str_field(&u["metadata"]["team_name"]))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| manager_name.clone());
        standings.push(LeagueStanding {
            rank: 0,
            team_id: owner_id.to_string(),
            team_name,
            manager_name,
            wins: int_field(&settings["wins"]).unwrap_or(0) as u32,
            losses: int_field(&settings["losses"]).unwrap_or(0) as u32,
            ties: int_field(&settings["ties"]).unwrap_or(0) as u32,
            points_for: format_scaled(scaled),
            points_for_scaled: scaled,
        });
    }
    if standings.is_empty() {
        return Err(Error::NotFound("managers".into()));
    }
    rank_standings(&mut standings);
    Ok(standings)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::{json, Value};

    pub const LEAGUE_ID: &str = "924039165950484480";

    pub fn league() -> Value {
        json!({
            "league_id": LEAGUE_ID,
            "name": "Gridiron Gang",
            "season": "2024",
            "roster_positions": ["QB", "RB", "RB", "WR", "WR", "TE", "FLEX", "K", "DEF", "BN", "BN", "IR"]
        })
    }

    pub fn rosters() -> Value {
        json!([
            {
                "roster_id": 7, "owner_id": "u7",
                "players": ["4034", "6794"],
                "settings": {"wins": 24, "losses": 4, "ties": 0, "fpts": 1825, "fpts_decimal": 98}
            },
            {
                "roster_id": 1, "owner_id": "u1",
                "players": ["8154", "7564"],
                "settings": {"wins": 19, "losses": 9, "ties": 0, "fpts": 1516, "fpts_decimal": 56}
            },
            {
                "roster_id": 6, "owner_id": "u6",
                "players": ["4988"],
                "settings": {"wins": 20, "losses": 8, "ties": 0, "fpts": 1554, "fpts_decimal": 16}
            },
            {
                "roster_id": 4, "owner_id": "u4",
                "players": ["1466", "3321"],
                "settings": {"wins": 18, "losses": 10, "ties": 0, "fpts": 1525, "fpts_decimal": 8}
            }
        ])
    }

    pub fn users() -> Value {
        json!([
            {"user_id": "u1", "display_name": "puknukem", "metadata": {"team_name": "Puk Nukem"}},
            {"user_id": "u4", "display_name": "nobel", "metadata": {"team_name": "No-Bell Prizes"}},
            {"user_id": "u6", "display_name": "gee17", "metadata": {}},
            {"user_id": "u7", "display_name": "captain", "metadata": {"team_name": "Jolly Roger"}}
        ])
    }

    pub fn matchups_week1() -> Value {
        json!([
            {"roster_id": 1, "matchup_id": 1, "points": 107.54,
             "players_points": {"8154": 13.1, "7564": 21.4}},
            {"roster_id": 4, "matchup_id": 1, "points": 84.3,
             "players_points": {"1466": 9.2}},
            {"roster_id": 6, "matchup_id": 2, "points": 85.06,
             "players_points": {"4988": 0.0}},
            {"roster_id": 7, "matchup_id": 2, "points": 114.24,
             "players_points": {"4034": 30.2}}
        ])
    }

    pub fn players() -> Value {
        json!({
            "6794": {
                "player_id": "6794", "first_name": "Justin", "last_name": "Jefferson",
                "position": "WR", "team": "MIN", "weight": "195", "height": "6'1\"",
                "birth_date": "1999-06-16", "years_exp": 4, "number": 18,
                "depth_chart_order": 1, "college": "LSU", "active": true, "yahoo_id": 32692,
                "metadata": {"rookie_year": "2020"}
            },
            "4034": {
                "player_id": "4034", "first_name": "Christian", "last_name": "McCaffrey",
                "position": "RB", "team": "SF", "weight": "205", "height": "71",
                "birth_date": "1996-06-07", "years_exp": 7, "number": 23,
                "depth_chart_order": null, "college": "Stanford", "active": true, "yahoo_id": null
            },
            "0000": {
                "player_id": "0000", "first_name": "Player", "last_name": "Invalid",
                "position": "QB", "team": null, "active": false
            },
            "9001": {
                "player_id": "9001", "first_name": "Line", "last_name": "Backer",
                "position": "LB", "team": "DAL", "active": true
            },
            "OAK": {
                "player_id": "OAK", "first_name": "Oakland", "last_name": "Raiders",
                "position": "DEF", "team": "LV", "active": true, "yahoo_id": 0
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use chrono::NaiveDate;

    fn managers() -> Vec<LeagueManager> {
        let mut managers = convert_managers(&rosters(), &users()).unwrap();
        SleeperClient::new("http://localhost")
            .unwrap()
            .sort_managers(&mut managers);
        managers
    }

    #[test]
    fn test_managers_sorted_by_roster_id() {
        let managers = managers();
        let keys: Vec<&str> = managers.iter().map(|m| m.join_key.as_str()).collect();
        assert_eq!(keys, vec!["1", "4", "6", "7"]);
        let teams: Vec<&str> = managers.iter().map(|m| m.team_name.as_str()).collect();
        assert_eq!(teams, vec!["Puk Nukem", "No-Bell Prizes", "", "Jolly Roger"]);
        assert_eq!(managers[2].manager_name, "gee17");
    }

    #[test]
    fn test_week_one_matchups() {
        let (matchups, scores) = convert_matchups(&matchups_week1(), 1, &managers()).unwrap();
        assert_eq!(matchups.len(), 2);

        let m1 = &matchups[0];
        assert_eq!(m1.matchup_id, 1);
        assert_eq!((m1.team_a.team_name.as_str(), m1.team_a.score), ("Puk Nukem", 107540));
        assert_eq!(
            (m1.team_b.team_name.as_str(), m1.team_b.score),
            ("No-Bell Prizes", 84300)
        );
        let m2 = &matchups[1];
        assert_eq!((m2.team_a.team_name.as_str(), m2.team_a.score), ("gee17", 85060));
        assert_eq!((m2.team_b.team_name.as_str(), m2.team_b.score), ("Jolly Roger", 114240));
        assert_eq!(m2.team_a.join_key, "6");

        let s = scores.iter().find(|s| s.player_id == "8154").unwrap();
        assert_eq!(s.score, 13100);
    }

    #[test]
    fn test_singleton_matchup_fails() {
        let raw = serde_json::json!([
            {"roster_id": 1, "matchup_id": 1, "points": 10.0},
            {"roster_id": 4, "matchup_id": 2, "points": 12.0},
            {"roster_id": 6, "matchup_id": null, "points": 0.0}
        ]);
        let err = convert_matchups(&raw, 1, &[]).unwrap_err();
        assert!(err.to_string().contains("matchup 1 has 1 teams"));
    }

    #[test]
    fn test_bye_records_are_ignored() {
        let raw = serde_json::json!([
            {"roster_id": 1, "matchup_id": 3, "points": 10.0},
            {"roster_id": 4, "matchup_id": 3, "points": 12.0},
            {"roster_id": 6, "matchup_id": null, "points": 0.0}
        ]);
        let (matchups, _) = convert_matchups(&raw, 2, &[]).unwrap();
        assert_eq!(matchups.len(), 1);
        assert_eq!(matchups[0].week, 2);
    }

    #[test]
    fn test_standings_order() {
        let standings = convert_standings(&rosters(), &users()).unwrap();
        let rows: Vec<(u32, &str, u32, u32, &str)> = standings
            .iter()
            .map(|s| {
                (
                    s.rank,
                    s.team_name.as_str(),
                    s.wins,
                    s.losses,
                    s.points_for.as_str(),
                )
            })
            .collect();
        assert_eq!(
            rows,
            vec![
                (1, "Jolly Roger", 24, 4, "1825.98"),
                (2, "gee17", 20, 8, "1554.16"),
                (3, "Puk Nukem", 19, 9, "1516.56"),
                (4, "No-Bell Prizes", 18, 10, "1525.08"),
            ]
        );
    }

    #[test]
    fn test_player_conversion() {
        let players = convert_players(&players()).unwrap();
        let ids: Vec<&str> = players.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["4034", "6794", "OAK"]);

        let jj = &players[1];
        assert_eq!(jj.team, NflTeam::Min);
        assert_eq!(jj.height, Some(73));
        assert_eq!(jj.weight, 195);
        assert_eq!(jj.birth_date, NaiveDate::from_ymd_opt(1999, 6, 16));
        assert_eq!(jj.rookie_year, Some(2020));
        assert_eq!(jj.yahoo_id, "32692");
        assert_eq!(jj.jersey, 18);

        let cmc = &players[0];
        assert_eq!(cmc.team, NflTeam::Sfo);
        assert_eq!(cmc.height, Some(71));
        assert_eq!(cmc.yahoo_id, "");
        assert_eq!(cmc.depth_chart_order, 0);

        assert_eq!(players[2].team, NflTeam::Lvr);
        assert_eq!(players[2].yahoo_id, "");
    }

    #[test]
    fn test_starters_from_league() {
        let spots = convert_starters(&league()).unwrap();
        assert_eq!(spots.len(), 9);
        assert_eq!(spots[6], RosterSpot::flex());
    }

    #[test]
    fn test_rosters_keyed_by_owner() {
        let rosters = convert_rosters(&rosters()).unwrap();
        assert_eq!(rosters.len(), 4);
        assert_eq!(rosters[1].team_id, "u1");
        assert_eq!(rosters[1].player_ids, vec!["8154", "7564"]);
    }

    #[test]
    fn test_null_leagues_is_empty() {
        assert!(convert_leagues(&Value::Null, "2024").unwrap().is_empty());
        let raw = serde_json::json!([
            {"league_id": LEAGUE_ID, "name": "Gridiron Gang", "season": "2024"}
        ]);
        let leagues = convert_leagues(&raw, "2024").unwrap();
        assert_eq!(leagues[0].external_id, LEAGUE_ID);
        assert_eq!(leagues[0].platform, Platform::Sleeper);
    }
}
