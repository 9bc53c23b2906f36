use clap::Parser;

/// Fantasy football league tracker with power rankings
#[derive(Parser, Debug, Clone)]
#[command(name = "league-rankings", version, about)]
pub struct Config {
    /// HTTP listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "league-rankings.db")]
    pub database_path: String,

    /// Sleeper API base URL
    #[arg(long, env = "SLEEPER_API_URL", default_value = "https://api.sleeper.app")]
    pub sleeper_api_url: String,

    /// Yahoo Fantasy Sports API base URL
    #[arg(
        long,
        env = "YAHOO_API_URL",
        default_value = "https://fantasysports.yahooapis.com"
    )]
    pub yahoo_api_url: String,

    /// Yahoo OAuth2 base URL (request_auth / get_token live under it)
    #[arg(
        long,
        env = "YAHOO_AUTH_URL",
        default_value = "https://api.login.yahoo.com/oauth2"
    )]
    pub yahoo_auth_url: String,

    /// Yahoo OAuth client id
    #[arg(long, env = "YAHOO_CLIENT_ID")]
    pub yahoo_client_id: Option<String>,

    /// Yahoo OAuth client secret
    #[arg(long, env = "YAHOO_CLIENT_SECRET")]
    pub yahoo_client_secret: Option<String>,

    /// Redirect URL registered with Yahoo; must route to /oauth/callback
    #[arg(long, env = "YAHOO_REDIRECT_URL")]
    pub yahoo_redirect_url: Option<String>,

    /// Deadline for ordinary requests in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "10")]
    pub request_timeout_secs: u64,

    /// Deadline for platform syncs, imports and admin requests in seconds
    #[arg(long, env = "ADMIN_TIMEOUT_SECS", default_value = "30")]
    pub admin_timeout_secs: u64,

    /// Player catalog refresh interval in seconds
    #[arg(long, env = "PLAYER_REFRESH_INTERVAL_SECS", default_value = "86400")]
    pub player_refresh_interval_secs: u64,

    /// Timeout for one player catalog refresh in seconds
    #[arg(long, env = "PLAYER_REFRESH_TIMEOUT_SECS", default_value = "30")]
    pub player_refresh_timeout_secs: u64,

    /// How long shutdown waits for the server and background tasks
    #[arg(long, env = "SHUTDOWN_GRACE_SECS", default_value = "10")]
    pub shutdown_grace_secs: u64,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        let timeouts = [
            ("request_timeout_secs", self.request_timeout_secs),
            ("admin_timeout_secs", self.admin_timeout_secs),
            ("player_refresh_interval_secs", self.player_refresh_interval_secs),
            ("player_refresh_timeout_secs", self.player_refresh_timeout_secs),
            ("shutdown_grace_secs", self.shutdown_grace_secs),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                anyhow::bail!("{name} must be positive");
            }
        }

        let oauth = [
            self.yahoo_client_id.is_some(),
            self.yahoo_client_secret.is_some(),
            self.yahoo_redirect_url.is_some(),
        ];
        if oauth.iter().any(|set| *set) && !oauth.iter().all(|set| *set) {
            anyhow::bail!(
                "YAHOO_CLIENT_ID, YAHOO_CLIENT_SECRET and YAHOO_REDIRECT_URL must be set together"
            );
        }
        Ok(())
    }

    /// True when Yahoo OAuth credentials are configured.
    pub fn yahoo_enabled(&self) -> bool {
        self.yahoo_client_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["league-rankings"];
        argv.extend_from_slice(args);
        Config::parse_from(argv)
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = parse(&[]);
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.admin_timeout_secs, 30);
        assert_eq!(config.player_refresh_interval_secs, 86_400);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = parse(&["--admin-timeout-secs", "0"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_oauth_rejected() {
        let config = parse(&["--yahoo-client-id", "abc"]);
        assert!(config.validate().is_err());

        let config = parse(&[
            "--yahoo-client-id",
            "abc",
            "--yahoo-client-secret",
            "shh",
            "--yahoo-redirect-url",
            "https://example.com/oauth/callback",
        ]);
        assert!(config.validate().is_ok());
        assert!(config.yahoo_enabled());
    }
}
