//! Prometheus counters for feed traffic and gateway calls

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::{BridgeError, Result};

/// Registry owned by the application state
pub struct Metrics {
    registry: Registry,
    feed_messages: IntCounterVec,
    feed_events: IntCounterVec,
    gateway_requests: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let feed_messages = IntCounterVec::new(
            Opts::new("upstox_feed_messages_total", "Frames received per feed"),
            &["feed"],
        )
        .map_err(to_config)?;
        let feed_events = IntCounterVec::new(
            Opts::new("upstox_feed_events_total", "Feed lifecycle events"),
            &["feed", "event"],
        )
        .map_err(to_config)?;
        let gateway_requests = IntCounterVec::new(
            Opts::new("upstox_gateway_requests_total", "Broker REST calls by outcome"),
            &["operation", "outcome"],
        )
        .map_err(to_config)?;

        registry
            .register(Box::new(feed_messages.clone()))
            .map_err(to_config)?;
        registry
            .register(Box::new(feed_events.clone()))
            .map_err(to_config)?;
        registry
            .register(Box::new(gateway_requests.clone()))
            .map_err(to_config)?;

        Ok(Self {
            registry,
            feed_messages,
            feed_events,
            gateway_requests,
        })
    }

    pub fn feed_message(&self, feed: &str) {
        self.feed_messages.with_label_values(&[feed]).inc();
    }

    pub fn feed_event(&self, feed: &str, event: &str) {
        self.feed_events.with_label_values(&[feed, event]).inc();
    }

    pub fn gateway_request(&self, operation: &str, outcome: &str) {
        self.gateway_requests
            .with_label_values(&[operation, outcome])
            .inc();
    }

    /// Text exposition format
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| BridgeError::Remote(format!("metrics encoding error: {e}")))?;
        String::from_utf8(buffer)
            .map_err(|e| BridgeError::Remote(format!("metrics encoding error: {e}")))
    }
}

fn to_config(err: prometheus::Error) -> BridgeError {
    BridgeError::Config(format!("metrics registry: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_counts() {
        let metrics = Metrics::new().unwrap();
        metrics.feed_message("market");
        metrics.feed_message("market");
        metrics.gateway_request("place_order", "ok");

        let text = metrics.render().unwrap();
        assert!(text.contains(r#"upstox_feed_messages_total{feed="market"} 2"#));
        assert!(text.contains(r#"upstox_gateway_requests_total{operation="place_order",outcome="ok"} 1"#));
    }
}
