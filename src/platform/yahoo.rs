use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{check_status, rank_standings, FantasyPlatform};
use crate::db::Database;
use crate::domain::{
    format_scaled, scale_decimal, starter_template, ForeignPlayer, League, LeagueManager,
    LeagueStanding, Matchup, OAuthToken, Platform, PlayerScore, Position, Roster, RosterSpot,
    TeamResult,
};
use crate::error::{Error, Result};
use crate::oauth::OAuthManager;

const PLATFORM: &str = "yahoo";

/// Client for the Yahoo Fantasy Sports v2 XML API.
///
/// Each request carries a bearer token for the league, refreshed through the
/// shared `OAuthManager`. Roster player ids are mapped to canonical ids with
/// the store's identity reconciliation.
#[derive(Clone)]
pub struct YahooClient {
    http: Client,
    /// Base URL for overriding in tests
    base_url: String,
    db: Database,
    oauth: Arc<OAuthManager>,
}

pub fn league_key(external_id: &str) -> String {
    format!("nfl.l.{external_id}")
}

impl YahooClient {
    pub fn new(base_url: &str, db: Database, oauth: Arc<OAuthManager>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::request("failed to build yahoo HTTP client", e))?;
        Ok(YahooClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            db,
            oauth,
        })
    }

    async fn get_xml(
        &self,
        token: &OAuthToken,
        external_id: &str,
        resource: &str,
    ) -> Result<XmlLeague> {
        let path = format!("/fantasy/v2/league/{}{}", league_key(external_id), resource);
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| Error::request(format!("yahoo request {path} failed"), e))?;
        let resp = check_status(PLATFORM, resp).await?;
        let body = resp
            .text()
            .await
            .map_err(|e| Error::request(format!("yahoo body {path}"), e))?;
        parse_league(&body)
    }

    async fn league_resource(&self, league: &League, resource: &str) -> Result<XmlLeague> {
        let token = self.oauth.get_token(league.id).await?;
        self.get_xml(&token, &league.external_id, resource).await
    }

    /// League name and season, using a token that is not yet tied to a
    /// stored league (the OAuth add flow).
    pub async fn fetch_league_info(
        &self,
        token: &OAuthToken,
        external_id: &str,
    ) -> Result<(String, String)> {
        let league = self.get_xml(token, external_id, "").await?;
        if league.name.is_empty() {
            return Err(Error::NotFound("league name".into()));
        }
        Ok((league.name, league.season))
    }
}

#[async_trait]
impl FantasyPlatform for YahooClient {
    fn name(&self) -> &'static str {
        PLATFORM
    }

    async fn get_leagues(&self, _user: &str, _year: &str) -> Result<Vec<League>> {
        Err(Error::Validation(
            "yahoo leagues are added through the oauth flow".into(),
        ))
    }

    async fn get_league_name(&self, external_id: &str) -> Result<String> {
        let league = self
            .db
            .find_league_by_external_id(Platform::Yahoo, external_id)?;
        let xml = self.league_resource(&league, "").await?;
        if xml.name.is_empty() {
            return Err(Error::NotFound("league name".into()));
        }
        Ok(xml.name)
    }

    async fn get_managers(&self, league: &League) -> Result<Vec<LeagueManager>> {
        let xml = self.league_resource(league, "/standings").await?;
        let mut managers = convert_managers(&xml)?;
        self.sort_managers(&mut managers);
        Ok(managers)
    }

    async fn get_matchup_results(
        &self,
        league: &League,
        week: u32,
    ) -> Result<(Vec<Matchup>, Vec<PlayerScore>)> {
        let xml = self
            .league_resource(league, &format!("/scoreboard;week={week}"))
            .await?;
        Ok((convert_matchups(&xml, week)?, Vec::new()))
    }

    async fn get_rosters(&self, league: &League) -> Result<Vec<Roster>> {
        let xml = self.league_resource(league, "/teams/roster").await?;
        let mut rosters = Vec::new();
        for (team_key, players) in roster_players(&xml)? {
            let player_ids = self.db.convert_yahoo_ids(&players)?;
            rosters.push(Roster {
                team_id: team_key,
                player_ids,
            });
        }
        info!("Loaded {} yahoo rosters for league {}", rosters.len(), league.id);
        Ok(rosters)
    }

    async fn get_starters(&self, league: &League) -> Result<Vec<RosterSpot>> {
        let xml = self.league_resource(league, "/settings").await?;
        convert_starters(&xml)
    }

    async fn get_league_standings(&self, league: &League) -> Result<Vec<LeagueStanding>> {
        let xml = self.league_resource(league, "/standings").await?;
        convert_standings(&xml)
    }
}

#[derive(Debug, Deserialize)]
struct FantasyContent {
    league: XmlLeague,
}

#[derive(Debug, Default, Deserialize)]
pub struct XmlLeague {
    #[serde(default)]
    name: String,
    #[serde(default)]
    season: String,
    #[serde(default)]
    settings: Option<XmlSettings>,
    #[serde(default)]
    standings: Option<XmlStandings>,
    #[serde(default)]
    scoreboard: Option<XmlScoreboard>,
    #[serde(default)]
    teams: Option<XmlTeams>,
}

#[derive(Debug, Deserialize)]
struct XmlSettings {
    roster_positions: XmlRosterPositions,
}

#[derive(Debug, Deserialize)]
struct XmlRosterPositions {
    #[serde(rename = "roster_position", default)]
    items: Vec<XmlRosterPosition>,
}

#[derive(Debug, Deserialize)]
struct XmlRosterPosition {
    position: String,
    #[serde(default)]
    count: String,
}

#[derive(Debug, Deserialize)]
struct XmlStandings {
    teams: XmlTeams,
}

#[derive(Debug, Default, Deserialize)]
struct XmlTeams {
    #[serde(rename = "team", default)]
    items: Vec<XmlTeam>,
}

#[derive(Debug, Deserialize)]
struct XmlTeam {
    team_key: String,
    team_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    managers: Option<XmlManagers>,
    #[serde(default)]
    team_points: Option<XmlTeamPoints>,
    #[serde(default)]
    team_standings: Option<XmlTeamStandings>,
    #[serde(default)]
    roster: Option<XmlRoster>,
}

impl XmlTeam {
    fn manager_name(&self) -> String {
        self.managers
            .as_ref()
            .and_then(|m| m.items.first())
            .map(|m| m.nickname.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct XmlManagers {
    #[serde(rename = "manager", default)]
    items: Vec<XmlManager>,
}

#[derive(Debug, Deserialize)]
struct XmlManager {
    #[serde(default)]
    nickname: String,
}

#[derive(Debug, Deserialize)]
struct XmlTeamPoints {
    #[serde(default)]
    total: String,
}

#[derive(Debug, Deserialize)]
struct XmlTeamStandings {
    outcome_totals: XmlOutcomeTotals,
    #[serde(default)]
    points_for: String,
}

#[derive(Debug, Deserialize)]
struct XmlOutcomeTotals {
    #[serde(default)]
    wins: String,
    #[serde(default)]
    losses: String,
    #[serde(default)]
    ties: String,
}

#[derive(Debug, Deserialize)]
struct XmlScoreboard {
    matchups: XmlMatchups,
}

#[derive(Debug, Deserialize)]
struct XmlMatchups {
    #[serde(rename = "matchup", default)]
    items: Vec<XmlMatchup>,
}

#[derive(Debug, Deserialize)]
struct XmlMatchup {
    teams: XmlTeams,
}

#[derive(Debug, Deserialize)]
struct XmlRoster {
    players: XmlPlayers,
}

#[derive(Debug, Default, Deserialize)]
struct XmlPlayers {
    #[serde(rename = "player", default)]
    items: Vec<XmlPlayer>,
}

#[derive(Debug, Deserialize)]
struct XmlPlayer {
    player_id: String,
    name: XmlName,
    #[serde(default)]
    primary_position: String,
    #[serde(default)]
    display_position: String,
}

#[derive(Debug, Deserialize)]
struct XmlName {
    #[serde(default)]
    first: String,
    #[serde(default)]
    last: String,
}

pub fn parse_league(body: &str) -> Result<XmlLeague> {
    let content: FantasyContent =
        quick_xml::de::from_str(body).map_err(|e| Error::parse("yahoo league", e))?;
    Ok(content.league)
}

fn parse_count(raw: &str, what: &str) -> Result<u32> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(0);
    }
    raw.parse()
        .map_err(|_| Error::parse("yahoo league", format!("{what} {raw:?} is not a number")))
}

fn standings_teams(league: &XmlLeague) -> Result<&[XmlTeam]> {
    league
        .standings
        .as_ref()
        .map(|s| s.teams.items.as_slice())
        .ok_or_else(|| Error::parse("yahoo standings", "missing standings"))
}

/// Managers come from standings: the team key is the external id and the
/// team id joins matchups.
pub fn convert_managers(league: &XmlLeague) -> Result<Vec<LeagueManager>> {
    let managers: Vec<LeagueManager> = standings_teams(league)?
        .iter()
        .map(|t| LeagueManager {
            external_id: t.team_key.clone(),
            team_name: t.name.clone(),
            manager_name: t.manager_name(),
            join_key: t.team_id.clone(),
        })
        .collect();
    if managers.is_empty() {
        return Err(Error::NotFound("managers".into()));
    }
    Ok(managers)
}

/// Matchup ids follow document order, starting at 1.
pub fn convert_matchups(league: &XmlLeague, week: u32) -> Result<Vec<Matchup>> {
    let scoreboard = league
        .scoreboard
        .as_ref()
        .ok_or_else(|| Error::parse("yahoo scoreboard", "missing scoreboard"))?;

    let mut matchups = Vec::with_capacity(scoreboard.matchups.items.len());
    for (i, m) in scoreboard.matchups.items.iter().enumerate() {
        let matchup_id = i as i64 + 1;
        let results = m
            .teams
            .items
            .iter()
            .map(|t| {
                let total = t.team_points.as_ref().map(|p| p.total.as_str()).unwrap_or("0");
                Ok(TeamResult {
                    team_id: String::new(),
                    team_name: t.name.clone(),
                    score: scale_decimal(total)?,
                    join_key: t.team_id.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let [team_a, team_b]: [TeamResult; 2] = results.try_into().map_err(|t: Vec<_>| {
            Error::parse(
                "yahoo scoreboard",
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
    Ok(matchups)
}

/// Each roster position repeated `count` times; bench slots are dropped.
pub fn convert_starters(league: &XmlLeague) -> Result<Vec<RosterSpot>> {
    let settings = league
        .settings
        .as_ref()
        .ok_or_else(|| Error::parse("yahoo settings", "missing settings"))?;
    let mut tokens = Vec::new();
    for p in &settings.roster_positions.items {
        if p.position.trim().eq_ignore_ascii_case("BN") {
            continue;
        }
        let count = parse_count(&p.count, "roster position count")?.max(1);
        for _ in 0..count {
            tokens.push(p.position.as_str());
        }
    }
    Ok(starter_template(tokens))
}

pub fn convert_standings(league: &XmlLeague) -> Result<Vec<LeagueStanding>> {
    let mut standings = Vec::new();
    for t in standings_teams(league)? {
        let Some(ts) = t.team_standings.as_ref() else {
            continue;
        };
        let points_raw = if ts.points_for.trim().is_empty() {
            t.team_points.as_ref().map(|p| p.total.as_str()).unwrap_or("0")
        } else {
            ts.points_for.as_str()
        };
        let scaled = scale_decimal(points_raw)?;
        let manager_name = t.manager_name();
        standings.push(LeagueStanding {
            rank: 0,
            team_id: t.team_key.clone(),
            team_name: if t.name.is_empty() {
                manager_name.clone()
            } else {
                t.name.clone()
            },
            manager_name,
            wins: parse_count(&ts.outcome_totals.wins, "wins")?,
            losses: parse_count(&ts.outcome_totals.losses, "losses")?,
            ties: parse_count(&ts.outcome_totals.ties, "ties")?,
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

/// Team key plus the team's players as Yahoo identifies them.
pub fn roster_players(league: &XmlLeague) -> Result<Vec<(String, Vec<ForeignPlayer>)>> {
    let teams = league
        .teams
        .as_ref()
        .ok_or_else(|| Error::parse("yahoo rosters", "missing teams"))?;
    Ok(teams
        .items
        .iter()
        .map(|t| {
            let players = t
                .roster
                .as_ref()
                .map(|r| r.players.items.iter().map(foreign_player).collect())
                .unwrap_or_default();
            (t.team_key.clone(), players)
        })
        .collect())
}

fn foreign_player(p: &XmlPlayer) -> ForeignPlayer {
    let position = if p.primary_position.is_empty() {
        p.display_position.split(',').next().unwrap_or_default()
    } else {
        p.primary_position.as_str()
    };
    ForeignPlayer {
        id: p.player_id.trim().to_string(),
        first_name: p.name.first.clone(),
        last_name: p.name.last.clone(),
        position: Position::parse(position),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STANDINGS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<fantasy_content xml:lang="en-US" xmlns:yahoo="http://www.yahooapis.com/v1/base.rng" xmlns="http://fantasysports.yahooapis.com/fantasy/v2/base.rng">
  <league>
    <league_key>423.l.12345</league_key>
    <league_id>12345</league_id>
    <name>Office League</name>
    <season>2023</season>
    <standings>
      <teams count="3">
        <team>
          <team_key>423.l.12345.t.2</team_key>
          <team_id>2</team_id>
          <name>Tua Legit</name>
          <managers><manager><manager_id>2</manager_id><nickname>Sam</nickname></manager></managers>
          <team_points><coverage_type>season</coverage_type><total>1401.2</total></team_points>
          <team_standings>
            <rank>2</rank>
            <outcome_totals><wins>9</wins><losses>5</losses><ties>0</ties><percentage>.643</percentage></outcome_totals>
            <points_for>1401.2</points_for>
          </team_standings>
        </team>
        <team>
          <team_key>423.l.12345.t.10</team_key>
          <team_id>10</team_id>
          <name>Kamara Shy</name>
          <managers><manager><manager_id>10</manager_id><nickname>Alex</nickname></manager></managers>
          <team_standings>
            <outcome_totals><wins>9</wins><losses>5</losses><ties>0</ties></outcome_totals>
            <points_for>1450.66</points_for>
          </team_standings>
        </team>
        <team>
          <team_key>423.l.12345.t.1</team_key>
          <team_id>1</team_id>
          <name>Hurts So Good</name>
          <managers><manager><manager_id>1</manager_id><nickname>Jo</nickname></manager></managers>
          <team_standings>
            <outcome_totals><wins>11</wins><losses>3</losses><ties>0</ties></outcome_totals>
            <points_for>1388.04</points_for>
          </team_standings>
        </team>
      </teams>
    </standings>
  </league>
</fantasy_content>"#;

    const SCOREBOARD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<fantasy_content>
  <league>
    <name>Office League</name>
    <scoreboard>
      <week>3</week>
      <matchups count="2">
        <matchup>
          <week>3</week>
          <teams count="2">
            <team><team_key>423.l.12345.t.1</team_key><team_id>1</team_id><name>Hurts So Good</name>
              <team_points><coverage_type>week</coverage_type><week>3</week><total>107.54</total></team_points></team>
            <team><team_key>423.l.12345.t.2</team_key><team_id>2</team_id><name>Tua Legit</name>
              <team_points><coverage_type>week</coverage_type><week>3</week><total>84.30</total></team_points></team>
          </teams>
        </matchup>
        <matchup>
          <week>3</week>
          <teams count="2">
            <team><team_key>423.l.12345.t.10</team_key><team_id>10</team_id><name>Kamara Shy</name>
              <team_points><total>99</total></team_points></team>
            <team><team_key>423.l.12345.t.3</team_key><team_id>3</team_id><name>Other</name>
              <team_points><total>101.125</total></team_points></team>
          </teams>
        </matchup>
      </matchups>
    </scoreboard>
  </league>
</fantasy_content>"#;

    const SETTINGS: &str = r#"<fantasy_content><league><name>Office League</name><settings>
      <roster_positions>
        <roster_position><position>QB</position><position_type>O</position_type><count>1</count></roster_position>
        <roster_position><position>WR</position><position_type>O</position_type><count>2</count></roster_position>
        <roster_position><position>RB</position><position_type>O</position_type><count>2</count></roster_position>
        <roster_position><position>TE</position><position_type>O</position_type><count>1</count></roster_position>
        <roster_position><position>W/R/T</position><position_type>O</position_type><count>1</count></roster_position>
        <roster_position><position>K</position><position_type>K</position_type><count>1</count></roster_position>
        <roster_position><position>DEF</position><position_type>DT</position_type><count>1</count></roster_position>
        <roster_position><position>BN</position><count>6</count></roster_position>
        <roster_position><position>IR</position><count>1</count></roster_position>
      </roster_positions>
    </settings></league></fantasy_content>"#;

    const ROSTERS: &str = r#"<fantasy_content><league><name>Office League</name>
      <teams count="1">
        <team>
          <team_key>423.l.12345.t.1</team_key>
          <team_id>1</team_id>
          <name>Hurts So Good</name>
          <roster>
            <coverage_type>date</coverage_type>
            <players count="2">
              <player>
                <player_key>423.p.31031</player_key>
                <player_id>31031</player_id>
                <name><full>Justin Jefferson</full><first>Justin</first><last>Jefferson</last></name>
                <display_position>WR</display_position>
                <primary_position>WR</primary_position>
              </player>
              <player>
                <player_key>423.p.33500</player_key>
                <player_id>33500</player_id>
                <name><full>Kenneth Walker III</full><first>Kenneth</first><last>Walker III</last></name>
                <display_position>RB</display_position>
              </player>
            </players>
          </roster>
        </team>
      </teams>
    </league></fantasy_content>"#;

    #[test]
    fn test_managers_from_standings() {
        let league = parse_league(STANDINGS).unwrap();
        let mut managers = convert_managers(&league).unwrap();
        managers.sort_by_key(|m| m.join_key.parse::<i64>().unwrap_or(i64::MAX));
        let keys: Vec<&str> = managers.iter().map(|m| m.join_key.as_str()).collect();
        assert_eq!(keys, vec!["1", "2", "10"]);
        assert_eq!(managers[0].external_id, "423.l.12345.t.1");
        assert_eq!(managers[0].manager_name, "Jo");
        assert_eq!(managers[2].team_name, "Kamara Shy");
    }

    #[test]
    fn test_standings_sorted_by_record() {
        let league = parse_league(STANDINGS).unwrap();
        let standings = convert_standings(&league).unwrap();
        let rows: Vec<(u32, &str, &str)> = standings
            .iter()
            .map(|s| (s.rank, s.team_name.as_str(), s.points_for.as_str()))
            .collect();
        assert_eq!(
            rows,
            vec![
                (1, "Hurts So Good", "1388.04"),
                (2, "Kamara Shy", "1450.66"),
                (3, "Tua Legit", "1401.20"),
            ]
        );
    }

    #[test]
    fn test_scoreboard_matchups() {
        let league = parse_league(SCOREBOARD).unwrap();
        let matchups = convert_matchups(&league, 3).unwrap();
        assert_eq!(matchups.len(), 2);
        assert_eq!(matchups[0].matchup_id, 1);
        assert_eq!(matchups[0].team_a.score, 107540);
        assert_eq!(matchups[0].team_b.score, 84300);
        assert_eq!(matchups[0].team_b.join_key, "2");
        assert_eq!(matchups[1].matchup_id, 2);
        assert_eq!(matchups[1].team_a.score, 99000);
        assert_eq!(matchups[1].team_b.score, 101125);
        assert!(matchups.iter().all(|m| m.week == 3));
    }

    #[test]
    fn test_starters_expand_counts() {
        let league = parse_league(SETTINGS).unwrap();
        let spots = convert_starters(&league).unwrap();
        let names: Vec<&str> = spots.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["QB", "WR", "WR", "RB", "RB", "TE", "FLEX", "K", "DEF"]
        );
    }

    #[test]
    fn test_roster_players() {
        let league = parse_league(ROSTERS).unwrap();
        let teams = roster_players(&league).unwrap();
        assert_eq!(teams.len(), 1);
        let (key, players) = &teams[0];
        assert_eq!(key, "423.l.12345.t.1");
        assert_eq!(players.len(), 2);
        assert_eq!(players[0].id, "31031");
        assert_eq!(players[0].position, Position::WR);
        assert_eq!(players[1].last_name, "Walker III");
        assert_eq!(players[1].position, Position::RB);
    }

    #[test]
    fn test_malformed_body_is_parse_error() {
        let err = parse_league("<fantasy_content><oops></fantasy_content>").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Upstream);
        assert!(convert_managers(&XmlLeague::default()).is_err());
    }

    #[test]
    fn test_league_key() {
        assert_eq!(league_key("12345"), "nfl.l.12345");
    }
}
