//! Streaming feed module
//!
//! Market data and portfolio WebSocket feeds, surfaced as event streams.

mod connection;
mod supervisor;

pub use connection::{FeedConnection, FeedEvents, FeedHandle};
pub use supervisor::{FeedEndpoints, FeedStatus, FeedSupervisor};

use std::fmt;

use serde::Serialize;

/// Which broker feed a connection serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Market,
    Portfolio,
}

impl FeedKind {
    pub const ALL: [FeedKind; 2] = [FeedKind::Market, FeedKind::Portfolio];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::Market => "market",
            FeedKind::Portfolio => "portfolio",
        }
    }

    /// Human-readable feed name used in log lines
    pub fn label(&self) -> &'static str {
        match self {
            FeedKind::Market => "Market data",
            FeedKind::Portfolio => "Portfolio stream",
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection lifecycle
///
/// `Connecting -> Open -> Closed`, with `Errored` reachable from either live
/// state. `Closed` and `Errored` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedState {
    Connecting,
    Open,
    Closed,
    Errored,
}

impl FeedState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FeedState::Closed | FeedState::Errored)
    }

    /// State after observing `event`; terminal states never change
    pub fn on_event(self, event: &FeedEvent) -> FeedState {
        match (self, event) {
            (s, _) if s.is_terminal() => s,
            (FeedState::Connecting, FeedEvent::Opened) => FeedState::Open,
            (_, FeedEvent::Errored(_)) => FeedState::Errored,
            (_, FeedEvent::Closed) => FeedState::Closed,
            (s, _) => s,
        }
    }
}

/// Raw frame payload; feed schemas are not decoded here
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedPayload {
    Text(String),
    Binary(Vec<u8>),
}

impl FeedPayload {
    pub fn len(&self) -> usize {
        match self {
            FeedPayload::Text(text) => text.len(),
            FeedPayload::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for FeedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedPayload::Text(text) => f.write_str(text),
            FeedPayload::Binary(data) => write!(f, "<{} bytes>", data.len()),
        }
    }
}

/// Event surfaced to a feed's consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Opened,
    Message(FeedPayload),
    Errored(String),
    Closed,
}

impl FeedEvent {
    pub fn name(&self) -> &'static str {
        match self {
            FeedEvent::Opened => "opened",
            FeedEvent::Message(_) => "message",
            FeedEvent::Errored(_) => "errored",
            FeedEvent::Closed => "closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg() -> FeedEvent {
        FeedEvent::Message(FeedPayload::Text("{}".into()))
    }

    #[test]
    fn test_happy_path_transitions() {
        let state = FeedState::Connecting.on_event(&FeedEvent::Opened);
        assert_eq!(state, FeedState::Open);
        let state = state.on_event(&msg());
        assert_eq!(state, FeedState::Open);
        assert_eq!(state.on_event(&FeedEvent::Closed), FeedState::Closed);
    }

    #[test]
    fn test_errored_from_connecting_or_open() {
        let err = FeedEvent::Errored("refused".into());
        assert_eq!(FeedState::Connecting.on_event(&err), FeedState::Errored);
        assert_eq!(FeedState::Open.on_event(&err), FeedState::Errored);
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        for terminal in [FeedState::Closed, FeedState::Errored] {
            for event in [FeedEvent::Opened, msg(), FeedEvent::Errored("x".into()), FeedEvent::Closed] {
                assert_eq!(terminal.on_event(&event), terminal);
            }
        }
    }

    #[test]
    fn test_message_does_not_open_connecting_feed() {
        assert_eq!(FeedState::Connecting.on_event(&msg()), FeedState::Connecting);
    }

    #[test]
    fn test_binary_payload_display() {
        let payload = FeedPayload::Binary(vec![0x0a, 0x0b, 0x0c]);
        assert_eq!(payload.to_string(), "<3 bytes>");
        assert_eq!(payload.len(), 3);
    }
}
