use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OAuth2 bearer token as persisted per league.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expiry: DateTime<Utc>,
}

impl OAuthToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry < now
    }
}
