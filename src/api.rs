//! HTTP routes
//!
//! Thin dispatch onto the auth, gateway and feed components. Every failure
//! renders as `500 {"error": ...}` through `BridgeError`.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::error::{BridgeError, Result};
use crate::gateway::{CandleData, CandleQuery, ModifyRequest, OrderDetails, OrderId, OrderResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderIdQuery {
    pub order_id: Option<String>,
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/login", get(login))
        .route("/callback", get(callback))
        .route("/historical", get(historical))
        .route("/orders/place", post(place_order))
        .route("/orders/cancel", delete(cancel_order))
        .route("/orders/modify", put(modify_order))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "Your server is up and running ..."
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "authenticated": state.sessions.is_authenticated().await,
        "feeds": state.feeds.statuses().await,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics(State(state): State<AppState>) -> Result<String> {
    state.metrics.render()
}

/// Redirect to the broker's authorization dialog
async fn login(State(state): State<AppState>) -> Result<Response> {
    let url = state.auth.login_url().map_err(|e| {
        error!(error = %e, "Error generating login URL");
        BridgeError::Config("Failed to generate login URL".to_string())
    })?;

    Ok((StatusCode::FOUND, [(header::LOCATION, url.to_string())]).into_response())
}

/// OAuth redirect target: exchange the code, then start both feeds
///
/// Feeds start on the stored session, which may be a concurrent callback's
/// if that exchange completed later than this one.
async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<Value>> {
    state.auth.exchange_code(query.code.as_deref()).await?;
    let session = state.feeds.start().await?;

    info!(token = %session.access_token.masked(), "Authentication complete, feeds started");
    Ok(Json(json!({
        "message": "Authentication successful, WebSocket feeds started"
    })))
}

async fn historical(
    State(state): State<AppState>,
    Query(query): Query<CandleQuery>,
) -> Result<Json<CandleData>> {
    let request = query.validate()?;
    let session = state.sessions.current().await?;

    let data = state
        .gateway
        .fetch_historical_candles(&session, &request)
        .await?;
    Ok(Json(data))
}

async fn place_order(State(state): State<AppState>, body: Bytes) -> Result<Json<OrderResult>> {
    let order = OrderDetails::from_body(json_body(&body))?;
    let session = state.sessions.current().await?;

    Ok(Json(state.gateway.place_order(&session, &order).await?))
}

async fn cancel_order(
    State(state): State<AppState>,
    Query(query): Query<OrderIdQuery>,
) -> Result<Json<OrderResult>> {
    let order_id = OrderId::parse(query.order_id.as_deref())?;
    let session = state.sessions.current().await?;

    Ok(Json(state.gateway.cancel_order(&session, &order_id).await?))
}

async fn modify_order(
    State(state): State<AppState>,
    Query(query): Query<OrderIdQuery>,
    body: Bytes,
) -> Result<Json<OrderResult>> {
    let request = ModifyRequest::new(query.order_id.as_deref(), json_body(&body))?;
    let session = state.sessions.current().await?;

    Ok(Json(state.gateway.modify_order(&session, &request).await?))
}

/// Empty or malformed bodies count as absent
fn json_body(body: &Bytes) -> Option<Value> {
    if body.is_empty() {
        return None;
    }
    match serde_json::from_slice(body) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(error = %e, "Ignoring unparsable request body");
            None
        }
    }
}
