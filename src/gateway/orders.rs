//! Order request validation and response types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BridgeError, Result};

const REQUIRED_ORDER_FIELDS: [&str; 3] = ["symbol", "quantity", "transaction_type"];

/// `null`, `false`, `0` and `""` count as missing, like the broker's own SDKs
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Order placement body, forwarded verbatim once validated
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct OrderDetails(Map<String, Value>);

impl OrderDetails {
    /// Validate a request body; `None` means no (or unparsable) body
    pub fn from_body(body: Option<Value>) -> Result<Self> {
        let missing = || {
            BridgeError::validation(
                "Missing required order details: symbol, quantity, transaction_type",
            )
        };

        let fields = match body {
            Some(Value::Object(fields)) => fields,
            _ => return Err(missing()),
        };

        let complete = REQUIRED_ORDER_FIELDS
            .iter()
            .all(|key| fields.get(*key).map(is_truthy).unwrap_or(false));
        if !complete {
            return Err(missing());
        }

        Ok(Self(fields))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// Broker order identifier, never empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderId(String);

impl OrderId {
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        Self::non_empty(raw)
            .ok_or_else(|| BridgeError::validation("Missing required query parameter: orderId"))
    }

    fn non_empty(raw: Option<&str>) -> Option<Self> {
        raw.map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Validated order modification
#[derive(Debug, Clone, PartialEq)]
pub struct ModifyRequest {
    pub order_id: OrderId,
    pub modifications: Map<String, Value>,
}

impl ModifyRequest {
    pub fn new(order_id: Option<&str>, body: Option<Value>) -> Result<Self> {
        let (order_id, body) = match (OrderId::non_empty(order_id), body) {
            (Some(id), Some(body)) => (id, body),
            _ => {
                return Err(BridgeError::validation(
                    "Missing required parameters: orderId, modifications",
                ))
            }
        };

        match body {
            Value::Object(modifications) => Ok(Self {
                order_id,
                modifications,
            }),
            _ => Err(BridgeError::validation("Invalid order ID or modifications")),
        }
    }
}

/// Broker response to an order call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Anything else the broker sent (`errors`, `metadata`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OrderResult {
    /// `data.order_id`, when the broker returned one
    pub fn order_id(&self) -> Option<&str> {
        self.data.as_ref()?.get("order_id")?.as_str()
    }
}
