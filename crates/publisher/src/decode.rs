//! Subscriber-side decoding of report events.

use crate::encode::gzip_decompress;
use crate::events::ZIP_EVENT_TOPIC;
use cuckoo_dxl_common::Result;
use serde_json::Value;

/// Decode a received payload into its JSON document.
///
/// Compressed report events are inflated first; every other topic is read as
/// plain UTF-8 JSON.
pub fn decode_event(topic: &str, payload: &[u8]) -> Result<Value> {
    if topic == ZIP_EVENT_TOPIC {
        let inflated = gzip_decompress(payload)?;
        return Ok(serde_json::from_slice(&inflated)?);
    }
    Ok(serde_json::from_slice(payload)?)
}

/// Pretty-print a decoded event with sorted keys.
pub fn render_event(value: &Value) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{gzip_compress, MAX_COMPRESSION_LEVEL};
    use crate::events::REPORT_EVENT_TOPIC;
    use cuckoo_dxl_common::Error;
    use serde_json::json;

    #[test]
    fn test_decode_zip_event() {
        let payload = gzip_compress(br#"{"info":{"id":3}}"#, MAX_COMPRESSION_LEVEL).unwrap();
        let value = decode_event(ZIP_EVENT_TOPIC, &payload).unwrap();
        assert_eq!(value, json!({"info": {"id": 3}}));
    }

    #[test]
    fn test_decode_report_event() {
        let value = decode_event(REPORT_EVENT_TOPIC, br#"{"target":{"file":"x"}}"#).unwrap();
        assert_eq!(value["target"]["file"], "x");
    }

    #[test]
    fn test_zip_event_must_be_compressed() {
        let err = decode_event(ZIP_EVENT_TOPIC, br#"{"info":{}}"#).unwrap_err();
        assert!(matches!(err, Error::Compression(_)));
    }

    #[test]
    fn test_invalid_json() {
        let err = decode_event(REPORT_EVENT_TOPIC, b"\xff\xfe").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_render_sorts_keys() {
        let value: Value = serde_json::from_str(r#"{"target":{},"info":{}}"#).unwrap();
        let rendered = render_event(&value).unwrap();
        assert!(rendered.find("\"info\"").unwrap() < rendered.find("\"target\"").unwrap());
    }
}
