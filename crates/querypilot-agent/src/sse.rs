//! Server-sent event framing.
//!
//! Every frame is `event: <type>\ndata: <json>\n\n`, with the payload
//! serialized on a single line.

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

/// Failure to serialize an event payload.
///
/// Payloads are built from types whose serialization cannot fail for valid
/// data, so this indicates a defect rather than a runtime condition.
#[derive(Debug, Error)]
#[error("failed to encode {event_type} event: {source}")]
pub struct EncodeError {
    pub event_type: String,
    #[source]
    pub source: serde_json::Error,
}

/// Frame one event.
pub fn encode<T: Serialize + ?Sized>(event_type: &str, payload: &T) -> Result<Bytes, EncodeError> {
    let data = serde_json::to_string(payload).map_err(|source| EncodeError {
        event_type: event_type.to_string(),
        source,
    })?;

    let mut frame = String::with_capacity(event_type.len() + data.len() + 16);
    frame.push_str("event: ");
    frame.push_str(event_type);
    frame.push_str("\ndata: ");
    frame.push_str(&data);
    frame.push_str("\n\n");
    Ok(Bytes::from(frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::{Cell, Row};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn test_frame_layout() {
        let frame = encode("text_delta", &json!({"text": "Hi"})).unwrap();
        assert_eq!(&frame[..], b"event: text_delta\ndata: {\"text\":\"Hi\"}\n\n");
    }

    #[test]
    fn test_newlines_stay_inside_json() {
        let frame = encode("text_delta", &json!({"text": "a\nb"})).unwrap();
        let text = std::str::from_utf8(&frame).unwrap();
        assert_eq!(text.matches('\n').count(), 3);
        assert!(text.contains(r#""a\nb""#));
    }

    #[test]
    fn test_dates_and_decimals() {
        let row = Row(vec![
            (
                "day".into(),
                Cell::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
            ),
            (
                "at".into(),
                Cell::DateTime(
                    NaiveDate::from_ymd_opt(2024, 3, 1)
                        .unwrap()
                        .and_hms_opt(12, 30, 0)
                        .unwrap(),
                ),
            ),
            ("amount".into(), Cell::Decimal(Decimal::from_str("12.50").unwrap())),
        ]);
        let frame = encode("tool_result", &row).unwrap();
        let text = std::str::from_utf8(&frame).unwrap();
        let data = text
            .strip_prefix("event: tool_result\ndata: ")
            .and_then(|rest| rest.strip_suffix("\n\n"))
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(data).unwrap();
        assert_eq!(
            value,
            json!({"day": "2024-03-01", "at": "2024-03-01T12:30:00", "amount": 12.5})
        );
    }

    #[test]
    fn test_unserializable_payload_fails() {
        struct Broken;
        impl Serialize for Broken {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("not serializable"))
            }
        }
        let err = encode("done", &Broken).unwrap_err();
        assert!(err.to_string().contains("done"));
    }
}
