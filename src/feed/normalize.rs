//! Frame parsing and normalization
//!
//! One JSON parse per frame. A frame is either a data frame (has a
//! `topic`) or a control reply (subscribe ack, pong). Malformed frames are
//! reported as [`ValidationError`] and the caller counts and drops them;
//! they never stall the receive loop.

use super::types::TickerRecord;
use crate::error::ValidationError;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;

/// Raw inbound frame, covering both data and control shapes
#[derive(Debug, Deserialize)]
struct RawFrame {
    /// Data frames: "tickers.{symbol}"
    topic: Option<String>,
    /// Data frames: "snapshot"
    #[serde(rename = "type")]
    frame_type: Option<String>,
    /// Frame timestamp, Unix millis
    ts: Option<i64>,
    data: Option<TickerData>,

    /// Control frames
    op: Option<String>,
    success: Option<bool>,
    req_id: Option<String>,
    ret_msg: Option<String>,
}

/// Ticker payload with upstream field names.
///
/// Values arrive as decimal strings, occasionally as bare numbers, and may
/// be missing or empty; everything is taken as a loose JSON value and
/// coerced afterwards.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct TickerData {
    symbol: Option<String>,
    last_price: Option<Value>,
    mark_price: Option<Value>,
    bid_price: Option<Value>,
    ask_price: Option<Value>,
    bid_iv: Option<Value>,
    ask_iv: Option<Value>,
    mark_iv: Option<Value>,
    index_price: Option<Value>,
    underlying_price: Option<Value>,
    #[serde(rename = "volume24h")]
    volume_24h: Option<Value>,
    #[serde(rename = "turnover24h")]
    turnover_24h: Option<Value>,
    open_interest: Option<Value>,
    delta: Option<Value>,
    gamma: Option<Value>,
    theta: Option<Value>,
    vega: Option<Value>,
}

/// Control reply from the upstream feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlReply {
    /// Subscribe ack, keyed by the request id we sent
    Subscribe {
        req_id: Option<String>,
        success: bool,
        ret_msg: Option<String>,
    },
    Pong,
    /// Recognized op we don't act on
    Other(String),
}

/// Classified inbound frame
#[derive(Debug)]
pub enum Inbound {
    Record(TickerRecord),
    Control(ControlReply),
}

/// Parse one inbound text frame.
///
/// Data frames must carry a resolvable symbol and a timestamp; all other
/// fields pass through with string-to-decimal coercion, mapping missing or
/// non-numeric values to `None`, never to zero.
pub fn parse_frame(text: &str) -> Result<Inbound, ValidationError> {
    let frame: RawFrame = serde_json::from_str(text)?;

    if frame.topic.is_none() {
        return Ok(Inbound::Control(classify_control(frame)));
    }

    let data = frame.data.unwrap_or_default();

    // Prefer the payload symbol; fall back to the topic suffix.
    let symbol = data
        .symbol
        .clone()
        .filter(|s| !s.is_empty())
        .or_else(|| {
            frame
                .topic
                .as_deref()
                .and_then(|t| t.strip_prefix("tickers."))
                .filter(|s| !s.is_empty())
                .map(String::from)
        })
        .ok_or(ValidationError::MissingSymbol)?;

    let timestamp = frame
        .ts
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .ok_or(ValidationError::MissingTimestamp)?;

    Ok(Inbound::Record(build_record(symbol, timestamp, &data)))
}

fn classify_control(frame: RawFrame) -> ControlReply {
    match frame.op.as_deref() {
        Some("subscribe") => ControlReply::Subscribe {
            req_id: frame.req_id,
            success: frame.success.unwrap_or(false),
            ret_msg: frame.ret_msg,
        },
        Some("pong") | Some("ping") => ControlReply::Pong,
        // Bybit also signals pong via ret_msg on some endpoints
        _ if frame.ret_msg.as_deref() == Some("pong") => ControlReply::Pong,
        op => ControlReply::Other(op.unwrap_or("").to_string()),
    }
}

fn build_record(symbol: String, timestamp: DateTime<Utc>, data: &TickerData) -> TickerRecord {
    let mut record = TickerRecord::new(symbol, timestamp);
    record.last_price = coerce_decimal(&data.last_price);
    record.mark_price = coerce_decimal(&data.mark_price);
    record.bid_price = coerce_decimal(&data.bid_price);
    record.ask_price = coerce_decimal(&data.ask_price);
    record.bid_iv = coerce_decimal(&data.bid_iv);
    record.ask_iv = coerce_decimal(&data.ask_iv);
    record.mark_iv = coerce_decimal(&data.mark_iv);
    record.index_price = coerce_decimal(&data.index_price);
    record.underlying_price = coerce_decimal(&data.underlying_price);
    record.volume_24h = coerce_decimal(&data.volume_24h);
    record.turnover_24h = coerce_decimal(&data.turnover_24h);
    record.open_interest = coerce_decimal(&data.open_interest);
    record.delta = coerce_decimal(&data.delta);
    record.gamma = coerce_decimal(&data.gamma);
    record.theta = coerce_decimal(&data.theta);
    record.vega = coerce_decimal(&data.vega);
    record
}

/// Coerce a loose JSON value to a decimal. Missing, empty, and non-numeric
/// values all map to `None`.
fn coerce_decimal(value: &Option<Value>) -> Option<Decimal> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => Decimal::from_str(s).ok(),
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SNAPSHOT: &str = r#"{
        "topic": "tickers.BTC-27JUN25-60000-C",
        "type": "snapshot",
        "ts": 1718000000123,
        "data": {
            "symbol": "BTC-27JUN25-60000-C",
            "lastPrice": "100",
            "markPrice": "101.5",
            "bidPrice": "99.5",
            "askPrice": "100.5",
            "markIv": "0.62",
            "underlyingPrice": "65000.1",
            "volume24h": "12.4",
            "openInterest": "330.2",
            "delta": "0.55",
            "gamma": "0.0001",
            "theta": "-25.3",
            "vega": "40.2"
        }
    }"#;

    #[test]
    fn test_parse_snapshot() {
        let inbound = parse_frame(SNAPSHOT).unwrap();
        let record = match inbound {
            Inbound::Record(r) => r,
            other => panic!("expected record, got {:?}", other),
        };

        assert_eq!(record.symbol, "BTC-27JUN25-60000-C");
        assert_eq!(record.timestamp.timestamp_millis(), 1718000000123);
        assert_eq!(record.last_price, Some(dec!(100)));
        assert_eq!(record.mark_price, Some(dec!(101.5)));
        assert_eq!(record.delta, Some(dec!(0.55)));
        assert_eq!(record.theta, Some(dec!(-25.3)));
    }

    #[test]
    fn test_missing_optional_fields_are_absent() {
        let msg = r#"{
            "topic": "tickers.BTC-27JUN25-60000-C",
            "type": "snapshot",
            "ts": 1718000000123,
            "data": {"symbol": "BTC-27JUN25-60000-C", "lastPrice": "100"}
        }"#;

        let record = match parse_frame(msg).unwrap() {
            Inbound::Record(r) => r,
            other => panic!("expected record, got {:?}", other),
        };

        assert_eq!(record.last_price, Some(dec!(100)));
        // absent means absent, not zero
        assert_eq!(record.mark_price, None);
        assert_eq!(record.volume_24h, None);
        assert_eq!(record.vega, None);
    }

    #[test]
    fn test_empty_and_non_numeric_map_to_absent() {
        let msg = r#"{
            "topic": "tickers.BTC-27JUN25-60000-C",
            "type": "snapshot",
            "ts": 1718000000123,
            "data": {
                "symbol": "BTC-27JUN25-60000-C",
                "lastPrice": "",
                "markPrice": "n/a",
                "delta": null
            }
        }"#;

        let record = match parse_frame(msg).unwrap() {
            Inbound::Record(r) => r,
            other => panic!("expected record, got {:?}", other),
        };

        assert_eq!(record.last_price, None);
        assert_eq!(record.mark_price, None);
        assert_eq!(record.delta, None);
    }

    #[test]
    fn test_bare_number_coercion() {
        let msg = r#"{
            "topic": "tickers.ETH-1AUG25-3000-P",
            "type": "snapshot",
            "ts": 1718000000123,
            "data": {"symbol": "ETH-1AUG25-3000-P", "lastPrice": 42.5}
        }"#;

        let record = match parse_frame(msg).unwrap() {
            Inbound::Record(r) => r,
            other => panic!("expected record, got {:?}", other),
        };
        assert_eq!(record.last_price, Some(dec!(42.5)));
    }

    #[test]
    fn test_symbol_falls_back_to_topic() {
        let msg = r#"{
            "topic": "tickers.SOL-5SEP25-150-C",
            "type": "snapshot",
            "ts": 1718000000123,
            "data": {"lastPrice": "1.2"}
        }"#;

        let record = match parse_frame(msg).unwrap() {
            Inbound::Record(r) => r,
            other => panic!("expected record, got {:?}", other),
        };
        assert_eq!(record.symbol, "SOL-5SEP25-150-C");
    }

    #[test]
    fn test_missing_symbol_fails() {
        let msg = r#"{
            "topic": "tickers.",
            "type": "snapshot",
            "ts": 1718000000123,
            "data": {"lastPrice": "1.2"}
        }"#;

        let err = parse_frame(msg).unwrap_err();
        assert!(matches!(err, ValidationError::MissingSymbol));
    }

    #[test]
    fn test_missing_timestamp_fails() {
        let msg = r#"{
            "topic": "tickers.BTC-27JUN25-60000-C",
            "type": "snapshot",
            "data": {"symbol": "BTC-27JUN25-60000-C"}
        }"#;

        let err = parse_frame(msg).unwrap_err();
        assert!(matches!(err, ValidationError::MissingTimestamp));
    }

    #[test]
    fn test_malformed_json_fails() {
        let err = parse_frame("{not json").unwrap_err();
        assert!(matches!(err, ValidationError::Malformed(_)));
    }

    #[test]
    fn test_subscribe_ack() {
        let msg = r#"{"success":true,"ret_msg":"","op":"subscribe","req_id":"sub-3"}"#;
        let control = match parse_frame(msg).unwrap() {
            Inbound::Control(c) => c,
            other => panic!("expected control, got {:?}", other),
        };
        assert_eq!(
            control,
            ControlReply::Subscribe {
                req_id: Some("sub-3".to_string()),
                success: true,
                ret_msg: Some(String::new()),
            }
        );
    }

    #[test]
    fn test_subscribe_rejection() {
        let msg = r#"{"success":false,"ret_msg":"too many args","op":"subscribe","req_id":"sub-9"}"#;
        let control = match parse_frame(msg).unwrap() {
            Inbound::Control(c) => c,
            other => panic!("expected control, got {:?}", other),
        };
        match control {
            ControlReply::Subscribe {
                success, ret_msg, ..
            } => {
                assert!(!success);
                assert_eq!(ret_msg.as_deref(), Some("too many args"));
            }
            other => panic!("expected subscribe reply, got {:?}", other),
        }
    }

    #[test]
    fn test_pong_variants() {
        let op_pong = r#"{"op":"pong"}"#;
        assert!(matches!(
            parse_frame(op_pong).unwrap(),
            Inbound::Control(ControlReply::Pong)
        ));

        let ret_pong = r#"{"success":true,"ret_msg":"pong","op":"ping"}"#;
        assert!(matches!(
            parse_frame(ret_pong).unwrap(),
            Inbound::Control(ControlReply::Pong)
        ));
    }
}
