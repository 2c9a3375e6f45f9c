// =============================================================================
// Strict feed decoding — the only place raw JSON becomes engine input
// =============================================================================
//
// Both upstream feeds deliver loosely typed JSON (numbers often arrive as
// strings). Every record is validated here before it can reach the
// aggregation engine: a missing field, an unparseable numeric, or a
// non-finite value rejects that record with a `DecodeError`. Rejection is
// never fatal — the caller logs a diagnostic and keeps consuming the stream.
// =============================================================================

use serde_json::Value;
use thiserror::Error;

use crate::engine::series::{bucket_start_for, Candle};
use crate::types::{Trade, TradeSide};

/// A record that failed strict validation at the feed boundary.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field {0}")]
    MissingField(&'static str),

    #[error("field {field} is not a valid number: {raw}")]
    BadNumber { field: &'static str, raw: String },

    #[error("field {0} is not finite")]
    NonFinite(&'static str),

    #[error("field {0} is out of range")]
    OutOfRange(&'static str),

    #[error("unexpected message shape: {0}")]
    Shape(&'static str),
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// Extract a finite f64 from a field that may be a JSON string or number.
fn num_f64(obj: &Value, field: &'static str) -> Result<f64, DecodeError> {
    let value = match &obj[field] {
        Value::String(s) => s.parse::<f64>().map_err(|_| DecodeError::BadNumber {
            field,
            raw: s.clone(),
        })?,
        Value::Number(n) => n.as_f64().ok_or(DecodeError::BadNumber {
            field,
            raw: n.to_string(),
        })?,
        Value::Null => return Err(DecodeError::MissingField(field)),
        other => {
            return Err(DecodeError::BadNumber {
                field,
                raw: other.to_string(),
            })
        }
    };

    if !value.is_finite() {
        return Err(DecodeError::NonFinite(field));
    }
    Ok(value)
}

fn num_i64(obj: &Value, field: &'static str) -> Result<i64, DecodeError> {
    match &obj[field] {
        Value::Number(n) => n.as_i64().ok_or(DecodeError::BadNumber {
            field,
            raw: n.to_string(),
        }),
        Value::String(s) => s.parse::<i64>().map_err(|_| DecodeError::BadNumber {
            field,
            raw: s.clone(),
        }),
        Value::Null => Err(DecodeError::MissingField(field)),
        other => Err(DecodeError::BadNumber {
            field,
            raw: other.to_string(),
        }),
    }
}

fn positive(value: f64, field: &'static str) -> Result<f64, DecodeError> {
    if value > 0.0 {
        Ok(value)
    } else {
        Err(DecodeError::OutOfRange(field))
    }
}

// ---------------------------------------------------------------------------
// Exchange trade payload
// ---------------------------------------------------------------------------

/// Decode an exchange aggTrade frame into a [`Trade`].
///
/// Expected shape (combined-stream envelopes are unwrapped):
/// ```json
/// { "e": "aggTrade", "s": "BTCUSDT", "a": 12345,
///   "p": "37000.00", "q": "0.123", "T": 1700000000123, "m": true }
/// ```
pub fn decode_trade(text: &str) -> Result<Trade, DecodeError> {
    let root: Value = serde_json::from_str(text)?;

    // Support both the combined-stream envelope and the direct payload.
    let data = if root.get("data").is_some() {
        &root["data"]
    } else {
        &root
    };

    let trade_id = match &data["a"] {
        Value::Number(n) => n.as_u64().ok_or(DecodeError::BadNumber {
            field: "a",
            raw: n.to_string(),
        })?,
        Value::Null => return Err(DecodeError::MissingField("a")),
        other => {
            return Err(DecodeError::BadNumber {
                field: "a",
                raw: other.to_string(),
            })
        }
    };

    let price = positive(num_f64(data, "p")?, "p")?;
    let size = positive(num_f64(data, "q")?, "q")?;
    let timestamp = num_i64(data, "T")?;

    // Buyer-is-maker means the taker was selling.
    let side = match &data["m"] {
        Value::Bool(true) => TradeSide::Sell,
        Value::Bool(false) => TradeSide::Buy,
        _ => return Err(DecodeError::MissingField("m")),
    };

    Ok(Trade {
        timestamp,
        price,
        size,
        side,
        trade_id,
    })
}

// ---------------------------------------------------------------------------
// Indexer candle records
// ---------------------------------------------------------------------------

/// Decode one indexer candle record.
///
/// The service keys candles by `bucketStart` (older deployments send
/// `timestamp`); either is accepted and truncated onto the local bucket grid
/// so that lookups by exact bucket always line up.
pub fn decode_candle_record(value: &Value, bucket_width_ms: i64) -> Result<Candle, DecodeError> {
    if !value.is_object() {
        return Err(DecodeError::Shape("candle record is not an object"));
    }

    let raw_ts = if value.get("bucketStart").is_some() {
        num_i64(value, "bucketStart")?
    } else {
        num_i64(value, "timestamp")?
    };

    let open = num_f64(value, "open")?;
    let high = num_f64(value, "high")?;
    let low = num_f64(value, "low")?;
    let close = num_f64(value, "close")?;
    let volume = num_f64(value, "volume")?;
    if volume < 0.0 {
        return Err(DecodeError::OutOfRange("volume"));
    }

    Ok(Candle {
        bucket_start: bucket_start_for(raw_ts, bucket_width_ms),
        open,
        high,
        low,
        close,
        volume,
    })
}

/// Decode a batch of candle records, skipping records that fail validation.
///
/// One bad record aborts only that record, never the batch: the decoded
/// candles and the per-record errors are returned side by side so the caller
/// can merge the former and report the latter.
pub fn decode_candle_batch(
    values: &[Value],
    bucket_width_ms: i64,
) -> (Vec<Candle>, Vec<DecodeError>) {
    let mut candles = Vec::with_capacity(values.len());
    let mut errors = Vec::new();

    for value in values {
        match decode_candle_record(value, bucket_width_ms) {
            Ok(candle) => candles.push(candle),
            Err(e) => errors.push(e),
        }
    }

    (candles, errors)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_trade_ok() {
        let text = r#"{"e":"aggTrade","s":"BTCUSDT","a":42,"p":"37000.5","q":"0.25","T":1700000000123,"m":true}"#;
        let trade = decode_trade(text).expect("should decode");
        assert_eq!(trade.trade_id, 42);
        assert!((trade.price - 37_000.5).abs() < f64::EPSILON);
        assert!((trade.size - 0.25).abs() < f64::EPSILON);
        assert_eq!(trade.timestamp, 1_700_000_000_123);
        assert_eq!(trade.side, TradeSide::Sell);
    }

    #[test]
    fn decode_trade_unwraps_combined_envelope() {
        let text = r#"{"stream":"btcusdt@aggTrade","data":{"a":7,"p":"100","q":"1","T":1000,"m":false}}"#;
        let trade = decode_trade(text).expect("should decode");
        assert_eq!(trade.trade_id, 7);
        assert_eq!(trade.side, TradeSide::Buy);
    }

    #[test]
    fn decode_trade_rejects_missing_price() {
        let text = r#"{"a":1,"q":"1","T":1000,"m":false}"#;
        let err = decode_trade(text).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField("p")));
    }

    #[test]
    fn decode_trade_rejects_unparseable_quantity() {
        let text = r#"{"a":1,"p":"100","q":"lots","T":1000,"m":false}"#;
        let err = decode_trade(text).unwrap_err();
        assert!(matches!(err, DecodeError::BadNumber { field: "q", .. }));
    }

    #[test]
    fn decode_trade_rejects_non_positive_price() {
        let text = r#"{"a":1,"p":"0","q":"1","T":1000,"m":false}"#;
        assert!(matches!(
            decode_trade(text).unwrap_err(),
            DecodeError::OutOfRange("p")
        ));
    }

    #[test]
    fn decode_trade_rejects_invalid_json() {
        assert!(matches!(
            decode_trade("not json").unwrap_err(),
            DecodeError::Json(_)
        ));
    }

    #[test]
    fn decode_candle_accepts_string_and_number_fields() {
        let value = json!({
            "bucketStart": 1_700_000_040_000_i64,
            "open": "100.5",
            "high": 101.0,
            "low": "99.5",
            "close": 100.0,
            "volume": "12.5"
        });
        let candle = decode_candle_record(&value, 60_000).expect("should decode");
        assert_eq!(candle.bucket_start, 1_700_000_040_000);
        assert!((candle.open - 100.5).abs() < f64::EPSILON);
        assert!((candle.volume - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn decode_candle_falls_back_to_timestamp_key() {
        let value = json!({
            "timestamp": 60_000,
            "open": 1.0, "high": 1.0, "low": 1.0, "close": 1.0, "volume": 0.0
        });
        let candle = decode_candle_record(&value, 60_000).expect("should decode");
        assert_eq!(candle.bucket_start, 60_000);
    }

    #[test]
    fn decode_candle_aligns_unaligned_timestamps() {
        let value = json!({
            "bucketStart": 61_234,
            "open": 1.0, "high": 1.0, "low": 1.0, "close": 1.0, "volume": 1.0
        });
        let candle = decode_candle_record(&value, 60_000).expect("should decode");
        assert_eq!(candle.bucket_start, 60_000);
    }

    #[test]
    fn decode_candle_rejects_non_finite_close() {
        let value = json!({
            "bucketStart": 0,
            "open": 1.0, "high": 1.0, "low": 1.0, "close": "NaN", "volume": 1.0
        });
        assert!(matches!(
            decode_candle_record(&value, 60_000).unwrap_err(),
            DecodeError::NonFinite("close")
        ));
    }

    #[test]
    fn decode_candle_rejects_negative_volume() {
        let value = json!({
            "bucketStart": 0,
            "open": 1.0, "high": 1.0, "low": 1.0, "close": 1.0, "volume": -2.0
        });
        assert!(matches!(
            decode_candle_record(&value, 60_000).unwrap_err(),
            DecodeError::OutOfRange("volume")
        ));
    }

    #[test]
    fn batch_decode_skips_only_the_bad_record() {
        let values = vec![
            json!({"bucketStart": 0, "open": 1.0, "high": 1.0, "low": 1.0, "close": 1.0, "volume": 1.0}),
            json!({"bucketStart": 60_000, "open": 1.0, "high": 1.0, "low": 1.0, "close": 1.0}),
            json!({"bucketStart": 120_000, "open": 2.0, "high": 2.0, "low": 2.0, "close": 2.0, "volume": 3.0}),
        ];

        let (candles, errors) = decode_candle_batch(&values, 60_000);
        assert_eq!(candles.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(candles[0].bucket_start, 0);
        assert_eq!(candles[1].bucket_start, 120_000);
        assert!(matches!(errors[0], DecodeError::MissingField("volume")));
    }

    #[test]
    fn empty_batch_decodes_to_nothing() {
        let (candles, errors) = decode_candle_batch(&[], 60_000);
        assert!(candles.is_empty());
        assert!(errors.is_empty());
    }
}
