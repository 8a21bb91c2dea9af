//! Configuration module for the bridge

use std::env;
use std::fmt;

use url::Url;

use crate::error::{BridgeError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.upstox.com/v2";
pub const DEFAULT_MARKET_FEED_URL: &str = "wss://api.upstox.com/v2/feed/market-data-feed";
pub const DEFAULT_PORTFOLIO_FEED_URL: &str = "wss://api.upstox.com/v2/feed/portfolio-stream-feed";
pub const DEFAULT_OAUTH_STATE: &str = "some_state";
pub const DEFAULT_PORT: u16 = 3000;

/// OAuth client credentials and the broker's REST root
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub base_url: Url,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,

    /// WebSocket endpoint for the market data feed
    pub market_feed_url: Url,

    /// WebSocket endpoint for the portfolio stream feed
    pub portfolio_feed_url: Url,

    /// `state` parameter sent with the authorization dialog redirect
    pub oauth_state: String,

    /// HTTP listen port
    pub port: u16,
}

impl Config {
    /// Load configuration from `.env` and environment variables
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let missing: Vec<&str> = ["UPSTOX_API_KEY", "UPSTOX_API_SECRET", "UPSTOX_REDIRECT_URI"]
            .into_iter()
            .filter(|key| get(*key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(BridgeError::Config(format!(
                "Missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let parse_url = |key: &str, default: &str| -> Result<Url> {
            let raw = get(key).unwrap_or_else(|| default.to_string());
            Url::parse(&raw).map_err(|e| BridgeError::Config(format!("{key}: {e}")))
        };

        let port = match get("PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|e| BridgeError::Config(format!("PORT: {e}")))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            credentials: Credentials {
                client_id: get("UPSTOX_API_KEY").unwrap_or_default(),
                client_secret: get("UPSTOX_API_SECRET").unwrap_or_default(),
                redirect_uri: get("UPSTOX_REDIRECT_URI").unwrap_or_default(),
                base_url: parse_url("UPSTOX_BASE_URL", DEFAULT_BASE_URL)?,
            },
            market_feed_url: parse_url("UPSTOX_MARKET_FEED_URL", DEFAULT_MARKET_FEED_URL)?,
            portfolio_feed_url: parse_url("UPSTOX_PORTFOLIO_FEED_URL", DEFAULT_PORTFOLIO_FEED_URL)?,
            oauth_state: get("UPSTOX_OAUTH_STATE").unwrap_or_else(|| DEFAULT_OAUTH_STATE.to_string()),
            port,
        })
    }
}
