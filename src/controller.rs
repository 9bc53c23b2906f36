use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::db::{Database, SaveSummary};
use crate::domain::{
    validate_year, League, LeagueStanding, Matchup, NflTeam, Platform, Player, Position,
    PowerRanking, PowerRankingSummary, Ranking, RankingSummary, SearchQuery, SeasonScores,
    TeamResult,
};
use crate::error::{Error, Result};
use crate::oauth::OAuthManager;
use crate::platform::{FantasyPlatform, SleeperClient, YahooClient};
use crate::power_ranking::{self, TeamSeed};
use crate::ranking_csv;

/// Runs `fut`, failing with `Canceled` once `deadline` elapses. Dropping the
/// future drops any open transaction, which rolls it back. Work handed to
/// the blocking pool goes through `spawn_cancelable` so it sees the drop.
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Canceled(format!(
            "deadline of {}s exceeded",
            deadline.as_secs_f64()
        ))),
    }
}

/// Sets the shared flag when dropped.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Runs `work` on the blocking pool. If the returned future is dropped
/// before the work finishes, the flag passed to `work` is set; long store
/// loops check it and stop with `Canceled`.
pub async fn spawn_cancelable<T, F>(what: &'static str, work: F) -> Result<T>
where
    F: FnOnce(&AtomicBool) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let cancel = Arc::new(AtomicBool::new(false));
    let _guard = CancelOnDrop(cancel.clone());
    tokio::task::spawn_blocking(move || {
        if cancel.load(Ordering::Relaxed) {
            return Err(Error::Canceled(format!("{what} canceled before it started")));
        }
        work(&*cancel)
    })
    .await
    .map_err(|e| Error::Internal(format!("{what} task failed: {e}")))?
}

/// Composes the store, the platform adapters, the ranking engine and OAuth.
///
/// Platform calls are dispatched on `league.platform`; errors pass through
/// unchanged.
#[derive(Clone)]
pub struct Controller {
    db: Database,
    sleeper: SleeperClient,
    yahoo: YahooClient,
    oauth: Arc<OAuthManager>,
}

impl Controller {
    pub fn new(
        db: Database,
        sleeper: SleeperClient,
        yahoo: YahooClient,
        oauth: Arc<OAuthManager>,
    ) -> Self {
        Controller {
            db,
            sleeper,
            yahoo,
            oauth,
        }
    }

    fn platform(&self, platform: Platform) -> &dyn FantasyPlatform {
        match platform {
            Platform::Sleeper => &self.sleeper,
            Platform::Yahoo => &self.yahoo,
        }
    }

    // ── Players ────────────────────────────────────────────────────────────

    /// Free-text search; explicit filters override `team:`/`pos:` tokens.
    pub fn search_players(
        &self,
        text: &str,
        position: Option<&str>,
        team: Option<&str>,
    ) -> Result<Vec<Player>> {
        let mut query = SearchQuery::parse(text);
        if let Some(pos) = position.filter(|p| !p.is_empty()) {
            query.position = Some(Position::parse(pos));
        }
        if let Some(team) = team.filter(|t| !t.is_empty()) {
            query.team = Some(NflTeam::parse(team));
        }
        self.db.search(&query)
    }

    pub fn get_player(&self, id: &str) -> Result<Player> {
        self.db.get_player(id)
    }

    pub fn update_player_nickname(&self, id: &str, nickname: &str) -> Result<Player> {
        self.db.update_player_nickname(id, nickname)?;
        self.db.get_player(id)
    }

    pub fn delete_player_nickname(&self, id: &str, old: &str) -> Result<Player> {
        self.db.delete_player_nickname(id, old)?;
        self.db.get_player(id)
    }

    pub fn get_player_scores(&self, player_id: &str) -> Result<Vec<SeasonScores>> {
        self.db.get_player_scores(player_id)
    }

    /// Pulls the full Sleeper catalog and upserts it. The bulk save runs on
    /// the blocking pool and stops early if this future is dropped.
    pub async fn refresh_players(&self) -> Result<SaveSummary> {
        let players = self.sleeper.fetch_players().await?;
        let db = self.db.clone();
        let summary =
            spawn_cancelable("player save", move |cancel| db.save_players(&players, cancel))
                .await?;
        info!(
            "Player refresh: {} inserted, {} updated, {} unchanged",
            summary.inserted, summary.updated, summary.unchanged
        );
        Ok(summary)
    }

    // ── Leagues ────────────────────────────────────────────────────────────

    pub fn list_leagues(&self, include_archived: bool) -> Result<Vec<League>> {
        self.db.list_leagues(include_archived)
    }

    pub fn get_league(&self, id: i64) -> Result<League> {
        self.db.get_league(id)
    }

    pub fn archive_league(&self, id: i64, archived: bool) -> Result<League> {
        self.db.archive_league(id, archived)?;
        self.db.get_league(id)
    }

    pub fn delete_league(&self, id: i64) -> Result<()> {
        self.db.delete_league(id)
    }

    /// Leagues a user plays in on a platform, not yet stored.
    pub async fn find_leagues(
        &self,
        platform: Platform,
        user: &str,
        year: &str,
    ) -> Result<Vec<League>> {
        validate_year(year)?;
        self.platform(platform).get_leagues(user, year).await
    }

    /// Stores a Sleeper league under its platform name. Yahoo leagues go
    /// through `add_yahoo_league` since they need a token first.
    pub async fn add_league(
        &self,
        platform: Platform,
        external_id: &str,
        year: &str,
    ) -> Result<League> {
        if platform == Platform::Yahoo {
            return Err(Error::Validation(
                "yahoo leagues are added through the oauth flow".into(),
            ));
        }
        let external_id = external_id.trim();
        if external_id.is_empty() {
            return Err(Error::Validation("external id is required".into()));
        }
        validate_year(year)?;

        let name = self.platform(platform).get_league_name(external_id).await?;
        let id = self
            .db
            .insert_league(&League::new(platform, external_id, &name, year))?;
        info!("Added {} league {} ({})", platform, name, id);
        self.db.get_league(id)
    }

    /// Fetches the league's managers from its platform and replaces the
    /// stored set.
    pub async fn add_league_managers(&self, league_id: i64) -> Result<League> {
        let league = self.db.get_league(league_id)?;
        let adapter = self.platform(league.platform);
        let mut managers = adapter.get_managers(&league).await?;
        adapter.sort_managers(&mut managers);
        self.db.save_league_managers(league.id, &managers)?;
        info!(
            "Stored {} {} managers for league {}",
            managers.len(),
            adapter.name(),
            league.id
        );
        self.db.get_league(league.id)
    }

    /// Pulls a week's matchups, resolves each side to its manager and stores
    /// the per-player scores.
    pub async fn sync_results_from_platform(
        &self,
        league_id: i64,
        week: u32,
    ) -> Result<Vec<Matchup>> {
        let league = self.db.get_league(league_id)?;
        if league.managers.is_empty() {
            return Err(Error::Validation(format!(
                "league {} has no managers; add them first",
                league.id
            )));
        }
        let (mut matchups, scores) = self
            .platform(league.platform)
            .get_matchup_results(&league, week)
            .await?;
        for m in &mut matchups {
            assign_team(&league, &mut m.team_a)?;
            assign_team(&league, &mut m.team_b)?;
        }
        self.db.save_player_scores(league.id, week, &scores)?;
        info!(
            "Synced week {} for league {}: {} matchups, {} player scores",
            week,
            league.id,
            matchups.len(),
            scores.len()
        );
        Ok(matchups)
    }

    pub async fn get_league_standings(&self, league_id: i64) -> Result<Vec<LeagueStanding>> {
        let league = self.db.get_league(league_id)?;
        self.platform(league.platform)
            .get_league_standings(&league)
            .await
    }

    // ── Rankings ───────────────────────────────────────────────────────────

    /// Parses a FantasyPros export dated `date` (YYYY-MM-DD) and stores it.
    pub async fn import_ranking(&self, date: &str, csv: Vec<u8>) -> Result<Ranking> {
        let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|_| Error::Validation(format!("date must be YYYY-MM-DD, got {date:?}")))?;
        let db = self.db.clone();
        let players = spawn_cancelable("ranking import", move |cancel| {
            ranking_csv::parse_ranking(&db, csv.as_slice(), cancel)
        })
        .await?;
        let id = self.db.insert_ranking(date, &players)?;
        info!("Imported ranking {} for {} with {} players", id, date, players.len());
        self.db.get_ranking(id)
    }

    pub fn list_rankings(&self) -> Result<Vec<RankingSummary>> {
        self.db.list_rankings()
    }

    pub fn get_ranking(&self, id: i64) -> Result<Ranking> {
        self.db.get_ranking(id)
    }

    pub fn delete_ranking(&self, id: i64) -> Result<()> {
        self.db.delete_ranking(id)
    }

    // ── Power rankings ─────────────────────────────────────────────────────

    /// Scores every team in the league against a stored ranking and persists
    /// the snapshot. Rank changes are relative to the league's last snapshot.
    pub async fn calculate_power_ranking(
        &self,
        league_id: i64,
        ranking_id: i64,
        week: u32,
    ) -> Result<PowerRanking> {
        let league = self.db.get_league(league_id)?;
        let ranking = self.db.get_ranking(ranking_id)?;
        let adapter = self.platform(league.platform);
        let rosters = adapter.get_rosters(&league).await?;
        let starters = adapter.get_starters(&league).await?;
        if starters.is_empty() {
            warn!("league {} has no starter slots", league.id);
        }

        let seeds: HashMap<String, TeamSeed> = league
            .managers
            .iter()
            .map(|m| {
                (
                    m.external_id.clone(),
                    TeamSeed {
                        team_name: m.display_name().to_string(),
                        ..Default::default()
                    },
                )
            })
            .collect();

        let mut teams = power_ranking::calculate(&ranking, &rosters, &starters, &seeds);
        let previous = self.db.latest_power_ranking(league.id)?;
        power_ranking::apply_rank_changes(&mut teams, previous.as_ref());

        let mut snapshot = PowerRanking {
            id: 0,
            league_id: league.id,
            ranking_id: ranking.id,
            week,
            created: Utc::now(),
            teams,
        };
        snapshot.id = self.db.save_power_ranking(&snapshot)?;
        info!(
            "Power ranking {} for league {} week {} ({} teams)",
            snapshot.id,
            league.id,
            week,
            snapshot.teams.len()
        );
        Ok(snapshot)
    }

    pub fn get_power_ranking(&self, id: i64) -> Result<PowerRanking> {
        self.db.get_power_ranking(id)
    }

    pub fn list_power_rankings(&self, league_id: i64) -> Result<Vec<PowerRankingSummary>> {
        self.db.get_league(league_id)?;
        self.db.list_power_rankings(league_id)
    }

    // ── OAuth ──────────────────────────────────────────────────────────────

    pub fn start_oauth(&self, platform: Platform) -> Result<(String, String)> {
        self.oauth.start(platform)
    }

    pub async fn exchange_oauth_code(&self, state: &str, code: &str) -> Result<()> {
        self.oauth.exchange(state, code).await
    }

    /// Adds a Yahoo league with the token parked on an exchanged state, then
    /// binds that token to the new league.
    pub async fn add_yahoo_league(&self, state: &str, external_id: &str) -> Result<League> {
        let external_id = external_id.trim();
        if external_id.is_empty() {
            return Err(Error::Validation("external id is required".into()));
        }
        let token = self.oauth.retrieve(state)?;
        let (name, season) = self.yahoo.fetch_league_info(&token, external_id).await?;
        validate_year(&season)?;

        let id = self
            .db
            .insert_league(&League::new(Platform::Yahoo, external_id, &name, &season))?;
        if let Err(e) = self.oauth.save(state, id) {
            self.db.delete_league(id)?;
            return Err(e);
        }
        info!("Added yahoo league {} ({})", name, id);
        self.db.get_league(id)
    }
}

/// Fills `team_id` from the manager whose `join_key` the adapter recorded.
fn assign_team(league: &League, result: &mut TeamResult) -> Result<()> {
    let manager = league.manager_by_join_key(&result.join_key).ok_or_else(|| {
        Error::NotFound(format!(
            "manager with join key {} in league {}",
            result.join_key, league.id
        ))
    })?;
    result.team_id = manager.external_id.clone();
    if result.team_name.is_empty() {
        result.team_name = manager.display_name().to_string();
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::{controller, sleeper_stub};
    use super::*;
    use crate::db::test_support::{memory_db, seed_top_players};
    use crate::error::ErrorKind;
    use crate::platform::sleeper::fixtures::LEAGUE_ID;

    const RANKING_CSV: &str = "\
RK,PLAYER NAME,TEAM,POS
1,Justin Jefferson,MIN,WR1
2,Christian McCaffrey,SF,RB1
3,Ja'Marr Chase,CIN,WR2
4,Nick Chubb,CLE,RB2
6,Travis Kelce,KC,TE1
7,Tyreek Hill,MIA,WR3
";

    async fn sleeper_league(ctl: &Controller) -> League {
        let league = ctl
            .add_league(Platform::Sleeper, LEAGUE_ID, "2024")
            .await
            .unwrap();
        ctl.add_league_managers(league.id).await.unwrap()
    }

    #[tokio::test]
    async fn test_with_deadline_cancels() {
        let err = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Canceled);

        let ok = with_deadline(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_deadline_reaches_blocking_work() {
        let (seen_tx, seen_rx) = std::sync::mpsc::channel();
        let err = with_deadline(
            Duration::from_millis(50),
            spawn_cancelable("spin", move |cancel| {
                let started = std::time::Instant::now();
                while !cancel.load(Ordering::Relaxed) && started.elapsed() < Duration::from_secs(5)
                {
                    std::thread::sleep(Duration::from_millis(1));
                }
                seen_tx.send(cancel.load(Ordering::Relaxed)).unwrap();
                Ok(())
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Canceled);
        assert!(seen_rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }

    #[tokio::test]
    async fn test_spawn_cancelable_returns_work_result() {
        let value = spawn_cancelable("sum", |_| Ok(2 + 2)).await.unwrap();
        assert_eq!(value, 4);
        let err = spawn_cancelable::<(), _>("fail", |_| Err(Error::Conflict("dup".into())))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_add_sleeper_league_and_managers() {
        let ctl = controller(memory_db(), &sleeper_stub().await);
        let league = sleeper_league(&ctl).await;

        assert_eq!(league.name, "Gridiron Gang");
        assert_eq!(league.year, "2024");
        let keys: Vec<&str> = league.managers.iter().map(|m| m.join_key.as_str()).collect();
        assert_eq!(keys, vec!["1", "4", "6", "7"]);
        let teams: Vec<&str> = league.managers.iter().map(|m| m.team_name.as_str()).collect();
        assert_eq!(teams, vec!["Puk Nukem", "No-Bell Prizes", "", "Jolly Roger"]);
        assert_eq!(league.managers[2].manager_name, "gee17");
    }

    #[tokio::test]
    async fn test_add_league_rejects_bad_input() {
        let ctl = controller(memory_db(), "http://127.0.0.1:9");
        let err = ctl
            .add_league(Platform::Sleeper, LEAGUE_ID, "24")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = ctl
            .add_league(Platform::Yahoo, "12345", "2024")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = ctl
            .add_league(Platform::Sleeper, "  ", "2024")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_sync_results_assigns_teams_and_scores() {
        let ctl = controller(memory_db(), &sleeper_stub().await);
        let league = sleeper_league(&ctl).await;

        let matchups = ctl.sync_results_from_platform(league.id, 1).await.unwrap();
        assert_eq!(matchups.len(), 2);
        assert_eq!(matchups[0].team_a.team_id, "u1");
        assert_eq!(matchups[0].team_a.team_name, "Puk Nukem");
        assert_eq!(matchups[0].team_a.score, 107540);
        assert_eq!(matchups[0].team_b.team_id, "u4");
        assert_eq!(matchups[0].team_b.score, 84300);
        assert_eq!(matchups[1].team_a.team_name, "gee17");
        assert_eq!(matchups[1].team_a.score, 85060);
        assert_eq!(matchups[1].team_b.team_name, "Jolly Roger");
        assert_eq!(matchups[1].team_b.score, 114240);

        let seasons = ctl.get_player_scores("8154").unwrap();
        assert_eq!(seasons.len(), 1);
        let mut expected = [0i64; 19];
        expected[1] = 13100;
        assert_eq!(seasons[0].scores, expected);
        assert_eq!(seasons[0].league_id, league.id);
    }

    #[tokio::test]
    async fn test_sync_requires_managers() {
        let ctl = controller(memory_db(), &sleeper_stub().await);
        let league = ctl
            .add_league(Platform::Sleeper, LEAGUE_ID, "2024")
            .await
            .unwrap();
        let err = ctl
            .sync_results_from_platform(league.id, 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_standings() {
        let ctl = controller(memory_db(), &sleeper_stub().await);
        let league = sleeper_league(&ctl).await;
        let standings = ctl.get_league_standings(league.id).await.unwrap();

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

    #[tokio::test]
    async fn test_refresh_players() {
        let ctl = controller(memory_db(), &sleeper_stub().await);
        let first = ctl.refresh_players().await.unwrap();
        assert!(first.inserted > 0);
        assert_eq!(ctl.get_player("6794").unwrap().last_name, "Jefferson");

        let second = ctl.refresh_players().await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 0);
        assert_eq!(second.unchanged, first.inserted);
    }

    #[tokio::test]
    async fn test_power_ranking_round() {
        let db = memory_db();
        seed_top_players(&db);
        let ctl = controller(db, &sleeper_stub().await);
        let league = sleeper_league(&ctl).await;

        let ranking = ctl
            .import_ranking("2024-09-01", RANKING_CSV.as_bytes().to_vec())
            .await
            .unwrap();
        assert_eq!(ranking.players.len(), 6);

        let first = ctl
            .calculate_power_ranking(league.id, ranking.id, 1)
            .await
            .unwrap();
        assert_eq!(first.teams.len(), 4);
        let ranks: Vec<u32> = first.teams.iter().map(|t| t.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
        assert_eq!(first.teams[0].team_id, "u7");
        assert_eq!(first.teams[0].team_name, "Jolly Roger");
        assert!(first.teams.iter().all(|t| t.rank_change == 0));
        let gee = first.teams.iter().find(|t| t.team_id == "u6").unwrap();
        assert_eq!(gee.team_name, "gee17");

        let stored = ctl.get_power_ranking(first.id).unwrap();
        assert_eq!(stored.teams, first.teams);

        let second = ctl
            .calculate_power_ranking(league.id, ranking.id, 2)
            .await
            .unwrap();
        assert_ne!(second.id, first.id);
        assert!(second.teams.iter().all(|t| t.rank_change == 0));
        assert_eq!(ctl.list_power_rankings(league.id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_import_ranking_rejects_bad_date() {
        let ctl = controller(memory_db(), "http://127.0.0.1:9");
        let err = ctl
            .import_ranking("09/01/2024", RANKING_CSV.as_bytes().to_vec())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_add_yahoo_league_needs_exchanged_state() {
        let ctl = controller(memory_db(), "http://127.0.0.1:9");
        let (state, _) = ctl.start_oauth(Platform::Yahoo).unwrap();
        let err = ctl.add_yahoo_league(&state, "12345").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(ctl.list_leagues(true).unwrap().is_empty());
    }
}
