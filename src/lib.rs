//! Upstox bridge library
//!
//! OAuth session handling, REST pass-through for historical data and orders,
//! and relay of the market and portfolio WebSocket feeds.

use std::sync::Arc;

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod metrics;

pub use auth::{AccessToken, AuthSession, Session, SessionStore};
pub use config::{Config, Credentials};
pub use error::{BridgeError, Result};
pub use feed::{FeedConnection, FeedEndpoints, FeedEvent, FeedHandle, FeedKind, FeedState, FeedSupervisor};
pub use gateway::BrokerGateway;
pub use metrics::Metrics;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: SessionStore,
    pub auth: Arc<AuthSession>,
    pub gateway: Arc<BrokerGateway>,
    pub feeds: Arc<FeedSupervisor>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Wire every component around one HTTP client and one session store
    pub fn new(config: Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("upstox-bridge/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let config = Arc::new(config);
        let credentials = Arc::new(config.credentials.clone());
        let metrics = Arc::new(Metrics::new()?);
        let sessions = SessionStore::new();

        let auth = AuthSession::new(
            http.clone(),
            credentials.clone(),
            config.oauth_state.clone(),
            sessions.clone(),
        );
        let gateway = BrokerGateway::new(http, credentials.base_url.clone(), metrics.clone());
        let feeds = FeedSupervisor::new(
            FeedEndpoints {
                market: config.market_feed_url.clone(),
                portfolio: config.portfolio_feed_url.clone(),
            },
            sessions.clone(),
            metrics.clone(),
        );

        Ok(Self {
            config,
            sessions,
            auth: Arc::new(auth),
            gateway: Arc::new(gateway),
            feeds: Arc::new(feeds),
            metrics,
        })
    }
}
