//! Error types for the bridge

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Bridge errors
///
/// `Display` is the exact text handed back to HTTP clients, so remote details
/// never go in here; they are logged where the failure is caught.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    AuthExchange(String),

    #[error("Not authenticated. Please authenticate via /login first.")]
    NotAuthenticated,

    #[error("{0}")]
    Remote(String),

    #[error("{0}")]
    Transport(String),
}

impl BridgeError {
    pub fn validation(msg: impl Into<String>) -> Self {
        BridgeError::Validation(msg.into())
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        BridgeError::Remote(msg.into())
    }

    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Config(_) => "config",
            BridgeError::Validation(_) => "validation",
            BridgeError::AuthExchange(_) => "auth_exchange",
            BridgeError::NotAuthenticated => "not_authenticated",
            BridgeError::Remote(_) => "remote",
            BridgeError::Transport(_) => "transport",
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BridgeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        BridgeError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Remote(err.to_string())
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        BridgeError::Remote(err.to_string())
    }
}

// Every failure is a 500 with a flat body; clients get no error code to branch on.
impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
