//! Broker REST gateway
//!
//! Single-attempt, authorized wrappers around the historical candle and
//! order endpoints. Inputs are validated by the request types before a
//! gateway method can be called.

mod historical;
mod orders;

pub use historical::{Candle, CandleData, CandleQuery, CandleRequest};
pub use orders::{ModifyRequest, OrderDetails, OrderId, OrderResult};

use std::sync::Arc;

use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};
use url::Url;

use crate::auth::{endpoint, Session};
use crate::error::{BridgeError, Result};
use crate::metrics::Metrics;

/// Gateway operations, for logs, metrics and failure messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    HistoricalCandles,
    PlaceOrder,
    CancelOrder,
    ModifyOrder,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::HistoricalCandles => "historical_candles",
            Operation::PlaceOrder => "place_order",
            Operation::CancelOrder => "cancel_order",
            Operation::ModifyOrder => "modify_order",
        }
    }

    /// Message returned to callers when the remote call fails
    pub fn failure_message(&self) -> &'static str {
        match self {
            Operation::HistoricalCandles => "Failed to fetch historical data",
            Operation::PlaceOrder => "Failed to place order",
            Operation::CancelOrder => "Failed to cancel order",
            Operation::ModifyOrder => "Failed to modify order",
        }
    }
}

/// Stateless REST wrappers sharing one HTTP client
pub struct BrokerGateway {
    http: reqwest::Client,
    base_url: Url,
    metrics: Arc<Metrics>,
}

impl BrokerGateway {
    pub fn new(http: reqwest::Client, base_url: Url, metrics: Arc<Metrics>) -> Self {
        Self {
            http,
            base_url,
            metrics,
        }
    }

    /// Fetch historical candles for an instrument
    pub async fn fetch_historical_candles(
        &self,
        session: &Session,
        request: &CandleRequest,
    ) -> Result<CandleData> {
        let op = Operation::HistoricalCandles;
        let encoded: Vec<String> = request
            .path_segments()
            .iter()
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        let mut url = self.base_url.clone();
        let path = format!("{}/{}", url.path().trim_end_matches('/'), encoded.join("/"));
        url.set_path(&path);

        debug!(
            instrument_key = %request.instrument_key,
            interval = %request.interval,
            "Fetching historical candles"
        );

        self.send(op, session, self.http.get(url)).await
    }

    /// Place a new order
    pub async fn place_order(&self, session: &Session, order: &OrderDetails) -> Result<OrderResult> {
        let op = Operation::PlaceOrder;
        let url = endpoint(&self.base_url, "order/place")?;

        info!(
            symbol = ?order.get("symbol"),
            quantity = ?order.get("quantity"),
            transaction_type = ?order.get("transaction_type"),
            "Placing order"
        );

        let result: OrderResult = self.send(op, session, self.http.post(url).json(order)).await?;
        info!(order_id = ?result.order_id(), "Order placed");
        Ok(result)
    }

    /// Cancel an open order
    pub async fn cancel_order(&self, session: &Session, order_id: &OrderId) -> Result<OrderResult> {
        let op = Operation::CancelOrder;
        let url = endpoint(&self.base_url, "order/cancel")?;

        info!(order_id = %order_id.as_str(), "Cancelling order");

        let request = self
            .http
            .delete(url)
            .query(&[("order_id", order_id.as_str())]);
        self.send(op, session, request).await
    }

    /// Modify an open order
    pub async fn modify_order(
        &self,
        session: &Session,
        request: &ModifyRequest,
    ) -> Result<OrderResult> {
        let op = Operation::ModifyOrder;
        let url = endpoint(&self.base_url, "order/modify")?;

        info!(order_id = %request.order_id.as_str(), "Modifying order");

        let builder = self
            .http
            .put(url)
            .query(&[("order_id", request.order_id.as_str())])
            .json(&request.modifications);
        self.send(op, session, builder).await
    }

    /// Authorize, send once and decode; remote detail is logged, not returned
    async fn send<T: DeserializeOwned>(
        &self,
        op: Operation,
        session: &Session,
        request: RequestBuilder,
    ) -> Result<T> {
        let request = request
            .header(AUTHORIZATION, session.access_token.bearer())
            .header(ACCEPT, "application/json");

        match Self::execute(request).await {
            Ok(value) => {
                self.metrics.gateway_request(op.as_str(), "ok");
                Ok(value)
            }
            Err(e) => {
                error!(operation = op.as_str(), error = %e, "{}", op.failure_message());
                self.metrics.gateway_request(op.as_str(), "error");
                Err(BridgeError::remote(op.failure_message()))
            }
        }
    }

    async fn execute<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(BridgeError::remote(format!("status {status}: {body}")));
        }
        Ok(serde_json::from_str(&body)?)
    }
}
