//! OAuth client for the broker's authorization-code flow

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, error, info};
use url::Url;

use super::session::{AccessToken, Session, SessionStore};
use crate::config::Credentials;
use crate::error::{BridgeError, Result};

const DIALOG_PATH: &str = "login/authorization/dialog";
const TOKEN_PATH: &str = "login/authorization/token";

/// Token endpoint response. Only `access_token` is required.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    user_id: Option<String>,
    user_name: Option<String>,
}

/// Builds login redirects and turns authorization codes into sessions
pub struct AuthSession {
    http: reqwest::Client,
    credentials: Arc<Credentials>,
    state: String,
    sessions: SessionStore,
}

impl AuthSession {
    pub fn new(
        http: reqwest::Client,
        credentials: Arc<Credentials>,
        state: impl Into<String>,
        sessions: SessionStore,
    ) -> Self {
        Self {
            http,
            credentials,
            state: state.into(),
            sessions,
        }
    }

    /// URL of the broker's authorization dialog
    pub fn login_url(&self) -> Result<Url> {
        let mut url = endpoint(&self.credentials.base_url, DIALOG_PATH)?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.credentials.client_id)
            .append_pair("redirect_uri", &self.credentials.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("state", &self.state);

        debug!(url = %url, "Generated login URL");
        Ok(url)
    }

    /// Exchange an authorization code and store the resulting session
    pub async fn exchange_code(&self, code: Option<&str>) -> Result<Arc<Session>> {
        let code = code.map(str::trim).filter(|c| !c.is_empty()).ok_or_else(|| {
            BridgeError::AuthExchange("No authorization code provided".to_string())
        })?;

        let session = self.request_token(code).await.map_err(|e| {
            error!(error = %e, "Error fetching access token");
            BridgeError::AuthExchange("Failed to fetch access token".to_string())
        })?;

        info!(
            token = %session.access_token.masked(),
            user_id = ?session.user_id,
            "Access token obtained"
        );

        Ok(self.sessions.replace(session).await)
    }

    async fn request_token(&self, code: &str) -> Result<Session> {
        let url = endpoint(&self.credentials.base_url, TOKEN_PATH)?;
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("redirect_uri", self.credentials.redirect_uri.as_str()),
            ("code", code),
        ];

        let response = self
            .http
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BridgeError::remote(format!("status {status}: {body}")));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)?;
        let access_token = parsed
            .access_token
            .and_then(AccessToken::new)
            .ok_or_else(|| BridgeError::remote("response has no access_token"))?;

        Ok(Session {
            user_id: parsed.user_id,
            user_name: parsed.user_name,
            ..Session::new(access_token)
        })
    }
}

/// Append a relative path to the REST root
pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| BridgeError::Config(format!("base URL cannot be a base: {base}")))?
        .pop_if_empty()
        .extend(path.split('/'));
    Ok(url)
}
