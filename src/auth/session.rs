//! Session state
//!
//! Holds the single bearer token obtained from the code exchange.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{BridgeError, Result};

/// Opaque bearer token, never empty
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value for an `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }

    /// First and last four characters, for logs
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 8 {
            return "****".to_string();
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken({})", self.masked())
    }
}

/// Authenticated state produced by a successful code exchange
#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: AccessToken,
    pub created_at: DateTime<Utc>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
}

impl Session {
    pub fn new(access_token: AccessToken) -> Self {
        Self {
            access_token,
            created_at: Utc::now(),
            user_id: None,
            user_name: None,
        }
    }
}

/// Owner of the process's current session
///
/// Cloning shares the same slot. Sessions are immutable once stored, so a
/// reader holding an `Arc<Session>` keeps a consistent token even if a newer
/// exchange replaces it.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    current: Arc<RwLock<Option<Arc<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session, or `NotAuthenticated`
    pub async fn current(&self) -> Result<Arc<Session>> {
        self.current
            .read()
            .await
            .clone()
            .ok_or(BridgeError::NotAuthenticated)
    }

    /// Store a session, replacing any previous one
    pub async fn replace(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        *self.current.write().await = Some(session.clone());
        session
    }

    pub async fn is_authenticated(&self) -> bool {
        self.current.read().await.is_some()
    }
}
