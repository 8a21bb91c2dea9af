//! Feed supervisor
//!
//! Owns the market and portfolio handles for the current session and drains
//! their events into the log.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use url::Url;

use super::{FeedConnection, FeedEvent, FeedEvents, FeedHandle, FeedKind, FeedState};
use crate::auth::{Session, SessionStore};
use crate::error::{BridgeError, Result};
use crate::metrics::Metrics;

/// WebSocket endpoints per feed kind
#[derive(Debug, Clone)]
pub struct FeedEndpoints {
    pub market: Url,
    pub portfolio: Url,
}

impl FeedEndpoints {
    pub fn url(&self, kind: FeedKind) -> &Url {
        match kind {
            FeedKind::Market => &self.market,
            FeedKind::Portfolio => &self.portfolio,
        }
    }
}

/// Feed state as reported by `/health`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeedStatus {
    pub feed: FeedKind,
    pub state: FeedState,
}

/// Feeds running for one session
#[derive(Default)]
struct Running {
    session: Option<Arc<Session>>,
    handles: HashMap<FeedKind, FeedHandle>,
}

/// Holds at most one handle per feed kind, all on the stored session
pub struct FeedSupervisor {
    endpoints: FeedEndpoints,
    sessions: SessionStore,
    metrics: Arc<Metrics>,
    running: Mutex<Running>,
}

impl FeedSupervisor {
    pub fn new(endpoints: FeedEndpoints, sessions: SessionStore, metrics: Arc<Metrics>) -> Self {
        Self {
            endpoints,
            sessions,
            metrics,
            running: Mutex::new(Running::default()),
        }
    }

    /// Open both feeds with the current session, closing feeds of an older one
    ///
    /// The session is read under the supervisor lock, so concurrent callers
    /// always leave the feeds on the most recently stored session. A no-op when
    /// the feeds already run on it.
    pub async fn start(&self) -> Result<Arc<Session>> {
        let mut running = self.running.lock().await;
        let session = self.sessions.current().await?;

        if let Some(active) = &running.session {
            if Arc::ptr_eq(active, &session) {
                debug!(token = %session.access_token.masked(), "Feeds already on current session");
                return Ok(session);
            }
        }

        for (kind, handle) in running.handles.drain() {
            let state = handle.close().await;
            info!(feed = %kind, state = ?state, "Closed feed from previous session");
        }
        running.session = None;

        for kind in FeedKind::ALL {
            let (handle, events) = FeedConnection::open(kind, self.endpoints.url(kind), &session)
                .map_err(|e| {
                    error!(feed = %kind, error = %e, "Error starting {} feed", kind.label());
                    BridgeError::Transport(format!(
                        "Failed to start {} feed",
                        kind.label().to_lowercase()
                    ))
                })?;

            tokio::spawn(log_sink(kind, events, self.metrics.clone()));
            running.handles.insert(kind, handle);
        }
        running.session = Some(session.clone());

        Ok(session)
    }

    /// Current state of each open feed
    pub async fn statuses(&self) -> Vec<FeedStatus> {
        let running = self.running.lock().await;
        FeedKind::ALL
            .iter()
            .filter_map(|kind| {
                running.handles.get(kind).map(|h| FeedStatus {
                    feed: *kind,
                    state: h.state(),
                })
            })
            .collect()
    }

    /// Close every open feed
    pub async fn shutdown(&self) {
        let mut running = self.running.lock().await;
        running.session = None;
        for (kind, handle) in running.handles.drain() {
            let state = handle.close().await;
            info!(feed = %kind, state = ?state, "Feed closed on shutdown");
        }
    }
}

/// Consumer that logs every feed event
async fn log_sink(kind: FeedKind, mut events: FeedEvents, metrics: Arc<Metrics>) {
    let label = kind.label();

    while let Some(event) = events.next().await {
        metrics.feed_event(kind.as_str(), event.name());

        match &event {
            FeedEvent::Opened => {
                info!(feed = %kind, "{label} feed open");
            }
            FeedEvent::Message(payload) => {
                metrics.feed_message(kind.as_str());
                info!(feed = %kind, bytes = payload.len(), payload = %payload, "{label} received");
            }
            FeedEvent::Errored(detail) => {
                error!(feed = %kind, error = %detail, "{label} feed error");
            }
            FeedEvent::Closed => {
                info!(feed = %kind, "{label} feed disconnected");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AccessToken;
    use futures_util::SinkExt;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::handshake::server::{
        ErrorResponse, Request as HandshakeRequest, Response as HandshakeResponse,
    };
    use tokio_tungstenite::tungstenite::Message;

    fn endpoints(addr: std::net::SocketAddr) -> FeedEndpoints {
        FeedEndpoints {
            market: Url::parse(&format!("ws://{addr}/market")).unwrap(),
            portfolio: Url::parse(&format!("ws://{addr}/portfolio")).unwrap(),
        }
    }

    fn session(token: &str) -> Session {
        Session::new(AccessToken::new(token).unwrap())
    }

    /// Accepts feeds, records their bearer, sends one text frame, then idles
    async fn feed_server() -> (std::net::SocketAddr, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let record = |req: &HandshakeRequest,
                                  resp: HandshakeResponse|
                     -> std::result::Result<HandshakeResponse, ErrorResponse> {
                        let bearer = req
                            .headers()
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        let _ = tx.send(bearer);
                        Ok(resp)
                    };
                    if let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(tcp, record).await {
                        let _ = ws.send(Message::Text("tick".into())).await;
                        while let Some(Ok(_)) = ws.next().await {}
                    }
                });
            }
        });

        (addr, rx)
    }

    async fn wait_until<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check().await {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    fn counter_line(text: &str, metric: &str, labels: &[&str]) -> Option<String> {
        text.lines()
            .find(|line| line.starts_with(metric) && labels.iter().all(|l| line.contains(l)))
            .map(String::from)
    }

    #[tokio::test]
    async fn test_statuses_empty_before_start() {
        let endpoints = FeedEndpoints {
            market: Url::parse("ws://127.0.0.1:1/market").unwrap(),
            portfolio: Url::parse("ws://127.0.0.1:1/portfolio").unwrap(),
        };
        let supervisor =
            FeedSupervisor::new(endpoints, SessionStore::new(), Arc::new(Metrics::new().unwrap()));
        assert!(supervisor.statuses().await.is_empty());
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_requires_session() {
        let supervisor = FeedSupervisor::new(
            endpoints("127.0.0.1:1".parse().unwrap()),
            SessionStore::new(),
            Arc::new(Metrics::new().unwrap()),
        );
        let err = supervisor.start().await.unwrap_err();
        assert!(matches!(err, BridgeError::NotAuthenticated));
        assert!(supervisor.statuses().await.is_empty());
    }

    #[tokio::test]
    async fn test_start_opens_both_and_restart_replaces() {
        // a port with no listener: both feeds end up Errored
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let sessions = SessionStore::new();
        let supervisor =
            FeedSupervisor::new(endpoints(addr), sessions.clone(), Arc::new(Metrics::new().unwrap()));

        sessions.replace(session("tok-1")).await;
        supervisor.start().await.unwrap();
        let statuses = supervisor.statuses().await;
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].feed, FeedKind::Market);
        assert_eq!(statuses[1].feed, FeedKind::Portfolio);

        sessions.replace(session("tok-2")).await;
        let started = supervisor.start().await.unwrap();
        assert_eq!(started.access_token.as_str(), "tok-2");
        assert_eq!(supervisor.statuses().await.len(), 2);

        supervisor.shutdown().await;
        assert!(supervisor.statuses().await.is_empty());
    }

    #[tokio::test]
    async fn test_feeds_follow_latest_stored_session() {
        let (addr, mut bearers) = feed_server().await;
        let sessions = SessionStore::new();
        let supervisor =
            FeedSupervisor::new(endpoints(addr), sessions.clone(), Arc::new(Metrics::new().unwrap()));

        // an older exchange's caller reaches start after a newer session was stored
        let older = sessions.replace(session("tok-old")).await;
        sessions.replace(session("tok-new")).await;

        let started = supervisor.start().await.unwrap();
        assert_eq!(started.access_token.as_str(), "tok-new");
        assert!(!Arc::ptr_eq(&started, &older));

        // second caller for the same stored session does not reconnect
        supervisor.start().await.unwrap();

        let mut seen = Vec::new();
        while let Ok(Some(bearer)) =
            tokio::time::timeout(Duration::from_millis(500), bearers.recv()).await
        {
            seen.push(bearer);
        }
        assert_eq!(seen, vec!["Bearer tok-new".to_string(); 2]);

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_log_sink_counts_frames_and_reports_open() {
        let (addr, _bearers) = feed_server().await;
        let sessions = SessionStore::new();
        let metrics = Arc::new(Metrics::new().unwrap());
        let supervisor = FeedSupervisor::new(endpoints(addr), sessions.clone(), metrics.clone());

        sessions.replace(session("tok123")).await;
        supervisor.start().await.unwrap();

        let supervisor = &supervisor;
        let metrics = &metrics;
        wait_until(|| async move {
            let statuses = supervisor.statuses().await;
            statuses.len() == 2 && statuses.iter().all(|s| s.state == FeedState::Open)
        })
        .await;

        wait_until(|| async move {
            let text = metrics.render().unwrap();
            ["market", "portfolio"].iter().all(|feed| {
                let label = format!("feed=\"{feed}\"");
                counter_line(&text, "upstox_feed_messages_total", &[label.as_str()])
                    .is_some_and(|line| line.ends_with(" 1"))
            })
        })
        .await;

        let text = metrics.render().unwrap();
        let opened = counter_line(
            &text,
            "upstox_feed_events_total",
            &["feed=\"market\"", "event=\"opened\""],
        )
        .unwrap();
        assert!(opened.ends_with(" 1"), "{opened}");

        supervisor.shutdown().await;
        assert!(supervisor.statuses().await.is_empty());

        wait_until(|| async move {
            let text = metrics.render().unwrap();
            counter_line(
                &text,
                "upstox_feed_events_total",
                &["feed=\"market\"", "event=\"closed\""],
            )
            .is_some()
        })
        .await;
    }
}
