//! Historical candle requests and response types
//!
//! The broker returns candles as positional arrays:
//! `[timestamp, open, high, low, close, volume, open_interest]`.

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;
use std::str::FromStr;

use crate::error::{BridgeError, Result};

/// Query string of `GET /historical`; every field is optional until validated
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandleQuery {
    pub instrument_key: Option<String>,
    pub interval: Option<String>,
    pub to_date: Option<String>,
    pub from_date: Option<String>,
}

impl CandleQuery {
    /// Check that all four parameters are present and non-empty
    pub fn validate(self) -> Result<CandleRequest> {
        let required = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        match (
            required(self.instrument_key),
            required(self.interval),
            required(self.to_date),
            required(self.from_date),
        ) {
            (Some(instrument_key), Some(interval), Some(to_date), Some(from_date)) => {
                Ok(CandleRequest {
                    instrument_key,
                    interval,
                    to_date,
                    from_date,
                })
            }
            _ => Err(BridgeError::validation(
                "Missing required query parameters: instrumentKey, interval, toDate, fromDate",
            )),
        }
    }
}

/// Validated historical candle request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandleRequest {
    pub instrument_key: String,
    pub interval: String,
    pub to_date: String,
    pub from_date: String,
}

impl CandleRequest {
    /// Path segments after the REST root, unencoded
    pub(crate) fn path_segments(&self) -> [&str; 5] {
        [
            "historical-candle",
            self.instrument_key.as_str(),
            self.interval.as_str(),
            self.to_date.as_str(),
            self.from_date.as_str(),
        ]
    }
}

/// Historical candle response, kept as the broker's exact JSON text
///
/// Proxied unchanged; `candles` gives a typed view on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandleData(Box<RawValue>);

impl CandleData {
    /// Raw JSON as received from the broker
    pub fn as_str(&self) -> &str {
        self.0.get()
    }

    pub fn status(&self) -> Result<Option<String>> {
        let envelope: CandleEnvelope = serde_json::from_str(self.0.get())?;
        Ok(envelope.status)
    }

    /// Decode the positional candle rows
    pub fn candles(&self) -> Result<Vec<Candle>> {
        let envelope: CandleEnvelope = serde_json::from_str(self.0.get())?;
        Ok(envelope.data.candles)
    }
}

#[derive(Deserialize)]
struct CandleEnvelope {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    data: CandleSeries,
}

#[derive(Default, Deserialize)]
struct CandleSeries {
    #[serde(default, deserialize_with = "deserialize_candles")]
    candles: Vec<Candle>,
}

/// Single OHLC candle
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<FixedOffset>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
    pub open_interest: Option<u64>,
}

impl Candle {
    fn from_row(row: &[Value]) -> std::result::Result<Self, String> {
        if row.len() < 6 {
            return Err(format!("Invalid candle format: expected 6 or 7 fields, got {}", row.len()));
        }

        let timestamp = row[0]
            .as_str()
            .ok_or_else(|| "Candle timestamp is not a string".to_string())
            .and_then(|s| DateTime::parse_from_rfc3339(s).map_err(|e| e.to_string()))?;

        Ok(Candle {
            timestamp,
            open: decimal(&row[1])?,
            high: decimal(&row[2])?,
            low: decimal(&row[3])?,
            close: decimal(&row[4])?,
            volume: count(&row[5])?,
            open_interest: row
                .get(6)
                .filter(|v| !v.is_null())
                .map(count)
                .transpose()?,
        })
    }
}

fn decimal(value: &Value) -> std::result::Result<Decimal, String> {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => return Err(format!("Invalid price: {other}")),
    };
    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|e| e.to_string())
}

fn count(value: &Value) -> std::result::Result<u64, String> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
        .ok_or_else(|| format!("Invalid volume: {value}"))
}

/// Custom deserializer for candles from positional arrays
fn deserialize_candles<'de, D>(deserializer: D) -> std::result::Result<Vec<Candle>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Vec<Value>> = Deserialize::deserialize(deserializer)?;
    raw.iter()
        .map(|row| Candle::from_row(row).map_err(serde::de::Error::custom))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn query(key: Option<&str>, interval: Option<&str>, to: Option<&str>, from: Option<&str>) -> CandleQuery {
        CandleQuery {
            instrument_key: key.map(String::from),
            interval: interval.map(String::from),
            to_date: to.map(String::from),
            from_date: from.map(String::from),
        }
    }

    #[test]
    fn test_missing_parameters_rejected() {
        let cases = [
            query(None, Some("1minute"), Some("2023-01-02"), Some("2023-01-01")),
            query(Some("NSE_EQ|INE848E01016"), None, Some("2023-01-02"), Some("2023-01-01")),
            query(Some("NSE_EQ|INE848E01016"), Some("1minute"), Some(""), Some("2023-01-01")),
            query(Some("NSE_EQ|INE848E01016"), Some("1minute"), Some("2023-01-02"), None),
        ];

        for case in cases {
            let err = case.validate().unwrap_err();
            assert!(matches!(err, BridgeError::Validation(_)));
            assert!(err.to_string().starts_with("Missing required"));
        }
    }

    #[test]
    fn test_complete_query_validates() {
        let request = query(Some("NSE_EQ|INE848E01016"), Some("day"), Some("2023-11-13"), Some("2023-11-01"))
            .validate()
            .unwrap();
        assert_eq!(
            request.path_segments(),
            ["historical-candle", "NSE_EQ|INE848E01016", "day", "2023-11-13", "2023-11-01"]
        );
    }

    #[test]
    fn test_parse_candle_response() {
        let raw = r#"{
            "status": "success",
            "data": {
                "candles": [
                    ["2023-11-13T00:00:00+05:30", 53.1, 53.95, 51.6, 52.05, 235519861, 0],
                    ["2023-11-10T00:00:00+05:30", 52.5, 53.4, 52.2, 53.05, 149436539]
                ]
            }
        }"#;

        let data: CandleData = serde_json::from_str(raw).unwrap();
        assert_eq!(data.status().unwrap().as_deref(), Some("success"));

        let candles = data.candles().unwrap();
        assert_eq!(candles.len(), 2);

        let first = &candles[0];
        assert_eq!(first.open, dec!(53.1));
        assert_eq!(first.close, dec!(52.05));
        assert_eq!(first.volume, 235519861);
        assert_eq!(first.open_interest, Some(0));
        assert_eq!(first.timestamp.to_rfc3339(), "2023-11-13T00:00:00+05:30");
        assert_eq!(candles[1].open_interest, None);
    }

    #[test]
    fn test_broker_text_passes_through() {
        let raw = r#"{"status":"success","data":{"candles":[["2023-11-13T09:15:00+05:30",0.12345678901234567890,1,1,1,1,null]]},"metadata":{"latency":12}}"#;
        let data: CandleData = serde_json::from_str(raw).unwrap();

        assert_eq!(data.as_str(), raw);
        assert_eq!(serde_json::to_string(&data).unwrap(), raw);

        let candles = data.candles().unwrap();
        assert_eq!(candles[0].open.round_dp(8), dec!(0.12345679));
        assert_eq!(candles[0].high, dec!(1));
        assert_eq!(candles[0].open_interest, None);
    }

    #[test]
    fn test_short_row_rejected_by_typed_view() {
        let raw = r#"{"status":"success","data":{"candles":[["2023-11-13T00:00:00+05:30", 1.0, 2.0]]}}"#;
        let data: CandleData = serde_json::from_str(raw).unwrap();
        assert!(data.candles().is_err());
    }
}
