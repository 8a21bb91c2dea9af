//! WebSocket client for a single broker feed
//!
//! Handles the authorized handshake and relays frames to the consumer's
//! event stream. No reconnection: a terminal handle stays terminal.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::client::IntoClientRequest,
    tungstenite::handshake::client::Request,
    tungstenite::http::{header::AUTHORIZATION, HeaderValue},
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};
use url::Url;

use super::{FeedEvent, FeedKind, FeedPayload, FeedState};
use crate::auth::Session;
use crate::error::{BridgeError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Inbound events of one feed; dropping it closes the feed
pub type FeedEvents = ReceiverStream<FeedEvent>;

const EVENT_BUFFER: usize = 1024;

/// Opens authorized feed connections
pub struct FeedConnection;

impl FeedConnection {
    /// Start connecting to `url` with the session's bearer token
    ///
    /// Returns at once with the handle in `Connecting`; the handshake and
    /// relay run on a background task.
    pub fn open(kind: FeedKind, url: &Url, session: &Session) -> Result<(FeedHandle, FeedEvents)> {
        let request = authorized_request(url, session)?;

        let (state_tx, state_rx) = watch::channel(FeedState::Connecting);
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        info!(feed = %kind, url = %url, "Connecting to feed");

        let relay = Relay {
            kind,
            state: state_tx,
            events: events_tx,
        };
        let task = tokio::spawn(relay.run(request, shutdown_rx));

        let handle = FeedHandle {
            kind,
            state: state_rx,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        };
        Ok((handle, ReceiverStream::new(events_rx)))
    }
}

fn authorized_request(url: &Url, session: &Session) -> Result<Request> {
    let mut request = url.as_str().into_client_request()?;
    let bearer = HeaderValue::from_str(&session.access_token.bearer())
        .map_err(|e| BridgeError::Transport(format!("invalid bearer token: {e}")))?;
    request.headers_mut().insert(AUTHORIZATION, bearer);
    Ok(request)
}

/// Owned handle to a running feed
pub struct FeedHandle {
    kind: FeedKind,
    state: watch::Receiver<FeedState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl FeedHandle {
    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    /// Current connection state
    pub fn state(&self) -> FeedState {
        *self.state.borrow()
    }

    /// Wait until the handshake has either succeeded or failed
    pub async fn settled(&mut self) -> FeedState {
        let settled = self
            .state
            .wait_for(|s| *s != FeedState::Connecting)
            .await
            .map(|state| *state);
        settled.unwrap_or_else(|_| self.state())
    }

    /// Request shutdown and wait for the transport task to finish
    pub async fn close(mut self) -> FeedState {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(feed = %self.kind, error = %e, "Feed task ended abnormally");
            }
        }
        self.state()
    }
}

/// Background half of a feed: owns the transport
struct Relay {
    kind: FeedKind,
    state: watch::Sender<FeedState>,
    events: mpsc::Sender<FeedEvent>,
}

impl Relay {
    async fn run(self, request: Request, mut shutdown: oneshot::Receiver<()>) {
        let connected = tokio::select! {
            result = connect_async(request) => result,
            _ = &mut shutdown => {
                self.emit(FeedEvent::Closed).await;
                return;
            }
        };

        let mut stream = match connected {
            Ok((stream, response)) => {
                info!(feed = %self.kind, status = ?response.status(), "{} feed connected", self.kind.label());
                stream
            }
            Err(e) => {
                error!(feed = %self.kind, error = %e, "{} feed error", self.kind.label());
                self.emit(FeedEvent::Errored(e.to_string())).await;
                return;
            }
        };

        if !self.emit(FeedEvent::Opened).await {
            Self::shutdown(&mut stream).await;
            self.emit(FeedEvent::Closed).await;
            return;
        }

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!(feed = %self.kind, "Shutdown requested");
                    Self::shutdown(&mut stream).await;
                    self.emit(FeedEvent::Closed).await;
                    break;
                }
                frame = stream.next() => {
                    let delivered = match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.emit(FeedEvent::Message(FeedPayload::Text(text))).await
                        }
                        Some(Ok(Message::Binary(data))) => {
                            self.emit(FeedEvent::Message(FeedPayload::Binary(data))).await
                        }
                        Some(Ok(Message::Ping(data))) => {
                            debug!(feed = %self.kind, "Received ping, sending pong");
                            let _ = stream.send(Message::Pong(data)).await;
                            true
                        }
                        Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => true,
                        Some(Ok(Message::Close(frame))) => {
                            debug!(feed = %self.kind, frame = ?frame, "Received close frame");
                            self.emit(FeedEvent::Closed).await;
                            break;
                        }
                        Some(Err(e)) => {
                            error!(feed = %self.kind, error = %e, "{} feed error", self.kind.label());
                            self.emit(FeedEvent::Errored(e.to_string())).await;
                            break;
                        }
                        None => {
                            self.emit(FeedEvent::Closed).await;
                            break;
                        }
                    };

                    // consumer dropped its stream
                    if !delivered {
                        debug!(feed = %self.kind, "Consumer gone, closing feed");
                        Self::shutdown(&mut stream).await;
                        self.emit(FeedEvent::Closed).await;
                        break;
                    }
                }
            }
        }
    }

    /// Apply the event to the state machine and forward it.
    /// Returns false once the consumer is gone.
    async fn emit(&self, event: FeedEvent) -> bool {
        self.state.send_modify(|state| *state = state.on_event(&event));
        self.events.send(event).await.is_ok()
    }

    async fn shutdown(stream: &mut WsStream) {
        let _ = stream.close(None).await;
    }
}
