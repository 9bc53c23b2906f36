use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use url::Url;

use crate::db::Database;
use crate::domain::{OAuthToken, Platform};
use crate::error::{Error, Result};

const STATE_LEN: usize = 15;
const STATE_TTL_MINUTES: i64 = 5;

/// Source of the current time, swappable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Yahoo OAuth application credentials.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    /// e.g. `https://api.login.yahoo.com/oauth2`
    pub auth_base_url: String,
}

#[derive(Debug, Clone)]
enum StateStatus {
    Issued,
    /// A code exchange for this state is in flight.
    Exchanging,
    Exchanged(OAuthToken),
}

#[derive(Debug, Clone)]
struct StateEntry {
    status: StateStatus,
    expiry: DateTime<Utc>,
}

/// Token response from the provider's token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    expires_in: i64,
}

/// Owns the short-lived OAuth state map and the per-league token lifecycle.
///
/// A state goes Issued → Exchanging → Exchanged → Saved; entries older than
/// five minutes are dropped the next time the map is touched. A failed
/// exchange puts the state back to Issued.
pub struct OAuthManager {
    config: OAuthConfig,
    http: Client,
    db: Database,
    clock: Arc<dyn Clock>,
    states: Mutex<HashMap<String, StateEntry>>,
}

impl OAuthManager {
    pub fn new(config: OAuthConfig, db: Database, clock: Arc<dyn Clock>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::request("failed to build oauth HTTP client", e))?;
        Ok(OAuthManager {
            config,
            http,
            db,
            clock,
            states: Mutex::new(HashMap::new()),
        })
    }

    /// Issues a state token and returns it with the provider's consent URL.
    pub fn start(&self, platform: Platform) -> Result<(String, String)> {
        if platform != Platform::Yahoo {
            return Err(Error::Validation(format!(
                "oauth is not supported for platform {platform}"
            )));
        }
        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(STATE_LEN)
            .map(char::from)
            .collect();

        let url = Url::parse_with_params(
            &format!("{}/request_auth", self.config.auth_base_url),
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("response_type", "code"),
                ("state", state.as_str()),
            ],
        )
        .map_err(|e| Error::Internal(format!("bad oauth auth url: {e}")))?;

        let expiry = self.clock.now() + Duration::minutes(STATE_TTL_MINUTES);
        self.lock_states()?.insert(
            state.clone(),
            StateEntry {
                status: StateStatus::Issued,
                expiry,
            },
        );
        debug!("issued oauth state expiring at {}", expiry);
        Ok((state, url.to_string()))
    }

    /// Swaps an authorization code for a token and parks it on the state.
    ///
    /// Only one exchange per state can be in flight; a concurrent callback
    /// with the same state is told the state is not valid.
    pub async fn exchange(&self, state: &str, code: &str) -> Result<()> {
        {
            let mut states = self.lock_states()?;
            match live_entry(&mut states, state, self.clock.now()) {
                Some(entry) if matches!(entry.status, StateStatus::Issued) => {
                    entry.status = StateStatus::Exchanging;
                }
                _ => return Err(state_not_valid()),
            }
        }

        let requested = self
            .request_token(
                &[
                    ("grant_type", "authorization_code"),
                    ("redirect_uri", self.config.redirect_url.as_str()),
                    ("code", code),
                ],
                |msg| Error::Auth(format!("token exchange failed: {msg}")),
            )
            .await;
        match requested {
            Ok(token) => self.store_token(state, token),
            Err(e) => {
                self.reissue(state)?;
                Err(e)
            }
        }
    }

    /// The token obtained for a state, if the state is still live.
    pub fn retrieve(&self, state: &str) -> Result<OAuthToken> {
        let mut states = self.lock_states()?;
        match live_entry(&mut states, state, self.clock.now()) {
            Some(StateEntry {
                status: StateStatus::Exchanged(token),
                ..
            }) => Ok(token.clone()),
            Some(_) => Err(Error::Auth("state has no token yet".into())),
            None => Err(state_not_valid()),
        }
    }

    /// Persists the state's token for a league and retires the state.
    pub fn save(&self, state: &str, league_id: i64) -> Result<()> {
        let token = self.retrieve(state)?;
        self.db.save_token(league_id, &token)?;
        self.lock_states()?.remove(state);
        info!("saved oauth token for league {}", league_id);
        Ok(())
    }

    /// A usable token for a league, refreshed and rewritten when expired.
    pub async fn get_token(&self, league_id: i64) -> Result<OAuthToken> {
        let token = self.db.get_token(league_id)?;
        if !token.is_expired(self.clock.now()) {
            return Ok(token);
        }

        debug!("refreshing oauth token for league {}", league_id);
        let mut fresh = self
            .request_token(
                &[
                    ("grant_type", "refresh_token"),
                    ("redirect_uri", self.config.redirect_url.as_str()),
                    ("refresh_token", token.refresh_token.as_str()),
                ],
                Error::Refresh,
            )
            .await?;
        if fresh.refresh_token.is_empty() {
            fresh.refresh_token = token.refresh_token;
        }
        self.db.save_token(league_id, &fresh)?;
        Ok(fresh)
    }

    /// Posts a grant to the token endpoint. Every failure, whether transport,
    /// status or body, is reported through `fail`.
    async fn request_token(
        &self,
        form: &[(&str, &str)],
        fail: fn(String) -> Error,
    ) -> Result<OAuthToken> {
        let url = format!("{}/get_token", self.config.auth_base_url);
        let resp = self
            .http
            .post(&url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(form)
            .send()
            .await
            .map_err(|e| fail(format!("oauth token request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("oauth token endpoint returned {}: {}", status, body);
            return Err(fail(format!("{status}: {body}")));
        }
        let raw: TokenResponse = resp
            .json()
            .await
            .map_err(|e| fail(format!("unreadable oauth token response: {e}")))?;
        Ok(self.token_from_response(raw))
    }

    fn token_from_response(&self, raw: TokenResponse) -> OAuthToken {
        OAuthToken {
            access_token: raw.access_token,
            refresh_token: raw.refresh_token.unwrap_or_default(),
            token_type: raw.token_type.unwrap_or_else(|| "bearer".into()),
            expiry: self.clock.now() + Duration::seconds(raw.expires_in),
        }
    }

    fn store_token(&self, state: &str, token: OAuthToken) -> Result<()> {
        let mut states = self.lock_states()?;
        let entry = live_entry(&mut states, state, self.clock.now()).ok_or_else(state_not_valid)?;
        entry.status = StateStatus::Exchanged(token);
        Ok(())
    }

    /// Puts an in-flight state back to Issued after a failed exchange.
    fn reissue(&self, state: &str) -> Result<()> {
        let mut states = self.lock_states()?;
        if let Some(entry) = live_entry(&mut states, state, self.clock.now()) {
            if matches!(entry.status, StateStatus::Exchanging) {
                entry.status = StateStatus::Issued;
            }
        }
        Ok(())
    }

    fn lock_states(&self) -> Result<MutexGuard<'_, HashMap<String, StateEntry>>> {
        self.states
            .lock()
            .map_err(|_| Error::Internal("oauth state mutex poisoned".into()))
    }
}

/// Drops expired entries, then looks the state up.
fn live_entry<'a>(
    states: &'a mut HashMap<String, StateEntry>,
    state: &str,
    now: DateTime<Utc>,
) -> Option<&'a mut StateEntry> {
    states.retain(|_, e| e.expiry >= now);
    states.get_mut(state)
}

fn state_not_valid() -> Error {
    Error::Auth("state is not valid".into())
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::{
        http::{header::AUTHORIZATION, HeaderMap, StatusCode},
        routing::post,
        Form, Json, Router,
    };
    use serde_json::{json, Value};

    use super::*;

    /// A clock that only moves when told to.
    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub fn new(start: DateTime<Utc>) -> Arc<Self> {
            Arc::new(ManualClock {
                now: Mutex::new(start),
            })
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    pub fn config() -> OAuthConfig {
        OAuthConfig {
            client_id: "client".into(),
            client_secret: "secret".into(),
            redirect_url: "https://rankings.example.com/oauth/callback".into(),
            // Nothing listens here.
            auth_base_url: "http://127.0.0.1:9/oauth2".into(),
        }
    }

    pub fn config_at(auth_base_url: &str) -> OAuthConfig {
        OAuthConfig {
            auth_base_url: auth_base_url.into(),
            ..config()
        }
    }

    /// Serves a Yahoo-shaped `/oauth2/get_token` on an ephemeral port and
    /// returns its base URL. Code grants yield `access-<code>` with a new
    /// refresh token; refresh grants yield `access-refreshed` without one.
    /// The code `bad` and the refresh token `refresh-revoked` get a 401.
    pub async fn token_stub(delay: std::time::Duration) -> String {
        let app = Router::new().route(
            "/oauth2/get_token",
            post(
                move |headers: HeaderMap, Form(form): Form<HashMap<String, String>>| async move {
                    tokio::time::sleep(delay).await;
                    token_grant(&headers, &form)
                },
            ),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/oauth2")
    }

    fn token_grant(headers: &HeaderMap, form: &HashMap<String, String>) -> (StatusCode, Json<Value>) {
        let rejected = (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid_grant"})));
        // base64("client:secret")
        if headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
            != Some("Basic Y2xpZW50OnNlY3JldA==")
        {
            return rejected;
        }
        let field = |name: &str| form.get(name).map(String::as_str).unwrap_or_default();
        match field("grant_type") {
            "authorization_code" if field("code") != "bad" => (
                StatusCode::OK,
                Json(json!({
                    "access_token": format!("access-{}", field("code")),
                    "refresh_token": "refresh-1",
                    "token_type": "bearer",
                    "expires_in": 3600,
                })),
            ),
            "refresh_token" if field("refresh_token") != "refresh-revoked" => (
                StatusCode::OK,
                Json(json!({
                    "access_token": "access-refreshed",
                    "token_type": "bearer",
                    "expires_in": 3600,
                })),
            ),
            _ => rejected,
        }
    }

    pub fn token(access: &str, expiry: DateTime<Utc>) -> OAuthToken {
        OAuthToken {
            access_token: access.into(),
            refresh_token: format!("refresh-{access}"),
            token_type: "bearer".into(),
            expiry,
        }
    }
}
