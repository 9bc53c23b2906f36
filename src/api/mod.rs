use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::controller::{spawn_cancelable, with_deadline, Controller};
use crate::domain::Platform;
use crate::error::{Error, ErrorKind, Result};

#[derive(Clone)]
pub struct AppState {
    pub controller: Controller,
    /// Deadline for lookups and single-row writes.
    pub request_timeout: Duration,
    /// Deadline for anything that fans out to a platform or imports data.
    pub admin_timeout: Duration,
}

type ApiResult<T> = std::result::Result<T, (StatusCode, String)>;

/// HTTP status for an error kind. Token refresh failures are a 500; other
/// auth errors are a 400.
pub fn status_for(err: &Error) -> StatusCode {
    match (err.kind(), err) {
        (_, Error::Refresh(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        (ErrorKind::NotFound, _) => StatusCode::NOT_FOUND,
        (ErrorKind::Validation, _) | (ErrorKind::Auth, _) => StatusCode::BAD_REQUEST,
        (ErrorKind::Upstream, _) => StatusCode::BAD_GATEWAY,
        (ErrorKind::Conflict, _) => StatusCode::CONFLICT,
        (ErrorKind::Internal, _) => StatusCode::INTERNAL_SERVER_ERROR,
        (ErrorKind::Canceled, _) => StatusCode::GATEWAY_TIMEOUT,
    }
}

/// Runs a store call on the blocking pool under `deadline`.
async fn blocking<T, F>(deadline: Duration, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    with_deadline(deadline, spawn_cancelable("request", move |_| work())).await
}

fn reject(err: Error) -> (StatusCode, String) {
    let status = status_for(&err);
    if status.is_server_error() {
        warn!("request failed: {}", err);
    }
    (status, err.to_string())
}

/// Build the Axum router for the JSON API and the OAuth redirect handlers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/players/search", get(search_players))
        .route("/api/players/:id", get(get_player))
        .route("/api/players/:id/scores", get(player_scores))
        .route(
            "/api/players/:id/nickname",
            put(update_nickname).delete(delete_nickname),
        )
        .route("/api/platforms/:platform/leagues", get(find_leagues))
        .route("/api/leagues", get(list_leagues).post(add_league))
        .route("/api/leagues/:id", get(get_league).delete(delete_league))
        .route("/api/leagues/:id/archive", post(archive_league))
        .route("/api/leagues/:id/managers", post(add_league_managers))
        .route("/api/leagues/:id/results/:week", post(sync_results))
        .route("/api/leagues/:id/standings", get(league_standings))
        .route(
            "/api/leagues/:id/power-rankings",
            get(list_power_rankings).post(calculate_power_ranking),
        )
        .route("/api/power-rankings/:id", get(get_power_ranking))
        .route("/api/rankings", get(list_rankings).post(import_ranking))
        .route("/api/rankings/:id", get(get_ranking).delete(delete_ranking))
        .route("/api/admin/refresh-players", post(refresh_players))
        .route("/oauth/start", get(oauth_start))
        .route("/oauth/callback", get(oauth_callback))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

// ── Players ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    pos: Option<String>,
    team: Option<String>,
}

/// GET /api/players/search?q=jefferson&pos=WR&team=MIN
async fn search_players(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<impl IntoResponse> {
    let ctl = state.controller.clone();
    blocking(state.request_timeout, move || {
        ctl.search_players(&params.q, params.pos.as_deref(), params.team.as_deref())
    })
    .await
    .map(Json)
    .map_err(reject)
}

async fn get_player(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let ctl = state.controller.clone();
    blocking(state.request_timeout, move || ctl.get_player(&id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn player_scores(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let ctl = state.controller.clone();
    blocking(state.request_timeout, move || ctl.get_player_scores(&id))
        .await
        .map(Json)
        .map_err(reject)
}

#[derive(Debug, Deserialize)]
struct NicknameBody {
    nickname: String,
}

/// PUT /api/players/:id/nickname  {"nickname": "..."}
async fn update_nickname(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<NicknameBody>,
) -> ApiResult<impl IntoResponse> {
    let ctl = state.controller.clone();
    blocking(state.request_timeout, move || {
        ctl.update_player_nickname(&id, &body.nickname)
    })
    .await
    .map(Json)
    .map_err(reject)
}

#[derive(Debug, Deserialize)]
struct OldNickname {
    old: String,
}

/// DELETE /api/players/:id/nickname?old=...
async fn delete_nickname(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<OldNickname>,
) -> ApiResult<impl IntoResponse> {
    let ctl = state.controller.clone();
    blocking(state.request_timeout, move || {
        ctl.delete_player_nickname(&id, &params.old)
    })
    .await
    .map(Json)
    .map_err(reject)
}

// ── Leagues ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct FindLeaguesParams {
    user: String,
    year: String,
}

/// GET /api/platforms/sleeper/leagues?user=...&year=2024
async fn find_leagues(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
    Query(params): Query<FindLeaguesParams>,
) -> ApiResult<impl IntoResponse> {
    let platform = Platform::parse(&platform).map_err(reject)?;
    let ctl = &state.controller;
    with_deadline(
        state.request_timeout,
        ctl.find_leagues(platform, &params.user, &params.year),
    )
    .await
    .map(Json)
    .map_err(reject)
}

#[derive(Debug, Deserialize)]
struct ListLeaguesParams {
    #[serde(default)]
    archived: bool,
}

async fn list_leagues(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListLeaguesParams>,
) -> ApiResult<impl IntoResponse> {
    let ctl = state.controller.clone();
    blocking(state.request_timeout, move || ctl.list_leagues(params.archived))
        .await
    .map(Json)
    .map_err(reject)
}

#[derive(Debug, Deserialize)]
struct AddLeagueBody {
    platform: String,
    external_id: String,
    #[serde(default)]
    year: String,
    /// OAuth state holding the token for a Yahoo league.
    #[serde(default)]
    state: String,
}

/// POST /api/leagues
async fn add_league(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AddLeagueBody>,
) -> ApiResult<impl IntoResponse> {
    let platform = Platform::parse(&body.platform).map_err(reject)?;
    let ctl = &state.controller;
    let league = with_deadline(state.request_timeout, async {
        match platform {
            Platform::Yahoo => ctl.add_yahoo_league(&body.state, &body.external_id).await,
            Platform::Sleeper => {
                ctl.add_league(platform, &body.external_id, &body.year)
                    .await
            }
        }
    })
    .await
    .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(league)))
}

async fn get_league(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let ctl = state.controller.clone();
    blocking(state.request_timeout, move || ctl.get_league(id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn delete_league(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let ctl = state.controller.clone();
    blocking(state.request_timeout, move || ctl.delete_league(id))
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct ArchiveBody {
    archived: bool,
}

/// POST /api/leagues/:id/archive  {"archived": false} restores
async fn archive_league(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    body: Option<Json<ArchiveBody>>,
) -> ApiResult<impl IntoResponse> {
    let archived = body.map(|Json(b)| b.archived).unwrap_or(true);
    let ctl = state.controller.clone();
    blocking(state.request_timeout, move || ctl.archive_league(id, archived))
        .await
    .map(Json)
    .map_err(reject)
}

async fn add_league_managers(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    with_deadline(
        state.admin_timeout,
        state.controller.add_league_managers(id),
    )
    .await
    .map(Json)
    .map_err(reject)
}

async fn sync_results(
    State(state): State<Arc<AppState>>,
    Path((id, week)): Path<(i64, u32)>,
) -> ApiResult<impl IntoResponse> {
    with_deadline(
        state.admin_timeout,
        state.controller.sync_results_from_platform(id, week),
    )
    .await
    .map(Json)
    .map_err(reject)
}

async fn league_standings(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    with_deadline(
        state.request_timeout,
        state.controller.get_league_standings(id),
    )
    .await
    .map(Json)
    .map_err(reject)
}

// ── Power rankings ────────────────────────────────────────────────────────

async fn list_power_rankings(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let ctl = state.controller.clone();
    blocking(state.request_timeout, move || ctl.list_power_rankings(id))
        .await
    .map(Json)
    .map_err(reject)
}

#[derive(Debug, Deserialize)]
struct CalculateBody {
    ranking_id: i64,
    week: u32,
}

/// POST /api/leagues/:id/power-rankings  {"ranking_id": 3, "week": 5}
async fn calculate_power_ranking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<CalculateBody>,
) -> ApiResult<impl IntoResponse> {
    let snapshot = with_deadline(
        state.admin_timeout,
        state
            .controller
            .calculate_power_ranking(id, body.ranking_id, body.week),
    )
    .await
    .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

async fn get_power_ranking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let ctl = state.controller.clone();
    blocking(state.request_timeout, move || ctl.get_power_ranking(id))
        .await
        .map(Json)
        .map_err(reject)
}

// ── Rankings ──────────────────────────────────────────────────────────────

async fn list_rankings(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let ctl = state.controller.clone();
    blocking(state.admin_timeout, move || ctl.list_rankings())
        .await
        .map(Json)
        .map_err(reject)
}

#[derive(Debug, Deserialize)]
struct ImportParams {
    date: String,
}

/// POST /api/rankings?date=2024-09-01 with the FantasyPros CSV as the body.
async fn import_ranking(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ImportParams>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let ranking = with_deadline(
        state.admin_timeout,
        state.controller.import_ranking(&params.date, body.to_vec()),
    )
    .await
    .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(ranking)))
}

async fn get_ranking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let ctl = state.controller.clone();
    blocking(state.admin_timeout, move || ctl.get_ranking(id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn delete_ranking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let ctl = state.controller.clone();
    blocking(state.admin_timeout, move || ctl.delete_ranking(id))
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn refresh_players(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let summary = with_deadline(state.admin_timeout, state.controller.refresh_players())
        .await
        .map_err(reject)?;
    Ok(Json(json!({
        "inserted": summary.inserted,
        "updated": summary.updated,
        "unchanged": summary.unchanged,
    })))
}

// ── OAuth ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StartParams {
    platform: String,
}

/// GET /oauth/start?platform=yahoo → 303 to the provider consent page.
async fn oauth_start(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StartParams>,
) -> ApiResult<impl IntoResponse> {
    let platform = Platform::parse(&params.platform).map_err(reject)?;
    let (_, url) = state.controller.start_oauth(platform).map_err(reject)?;
    Ok(Redirect::to(&url))
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    state: String,
    code: String,
}

/// GET /oauth/callback?state=...&code=...
///
/// Echoes the state back; the client then adds the league with it.
async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> ApiResult<impl IntoResponse> {
    with_deadline(
        state.request_timeout,
        state
            .controller
            .exchange_oauth_code(&params.state, &params.code),
    )
    .await
    .map_err(reject)?;
    Ok(Json(json!({ "state": params.state })))
}
