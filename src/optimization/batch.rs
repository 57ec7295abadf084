//! Encoding of flushed message batches.

use std::io::Write;

use base64::Engine as _;
use base64::engine::general_purpose;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::Value;

use crate::domain::BatchEncoding;
use crate::error::CoreError;

/// Encodes `messages` as a JSON array, or as base64 gzip of that array
/// when `compression_level` is set.
///
/// # Errors
///
/// Returns [`CoreError::Internal`] if serialization or compression fails.
pub fn encode_batch(
    messages: Vec<Value>,
    compression_level: Option<u32>,
) -> Result<(BatchEncoding, Value), CoreError> {
    let array = Value::Array(messages);
    let Some(level) = compression_level else {
        return Ok((BatchEncoding::Json, array));
    };
    let bytes = serde_json::to_vec(&array).map_err(|e| CoreError::Internal(e.to_string()))?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder
        .write_all(&bytes)
        .map_err(|e| CoreError::Internal(format!("batch compression failed: {e}")))?;
    let compressed = encoder
        .finish()
        .map_err(|e| CoreError::Internal(format!("batch compression failed: {e}")))?;
    Ok((
        BatchEncoding::GzipBase64,
        Value::String(general_purpose::STANDARD.encode(compressed)),
    ))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;
    use serde_json::json;

    use super::*;

    #[test]
    fn uncompressed_batch_is_plain_array() {
        let Ok((encoding, payload)) = encode_batch(vec![json!({"a": 1})], None) else {
            panic!("encoding should succeed");
        };
        assert_eq!(encoding, BatchEncoding::Json);
        assert_eq!(payload, json!([{"a": 1}]));
    }

    #[test]
    fn compressed_batch_decodes_to_same_messages() {
        let messages = vec![json!({"payment_id": "ch_1"}), json!({"payment_id": "ch_2"})];
        let Ok((encoding, Value::String(encoded))) = encode_batch(messages.clone(), Some(6)) else {
            panic!("expected base64 string payload");
        };
        assert_eq!(encoding, BatchEncoding::GzipBase64);

        let Ok(compressed) = general_purpose::STANDARD.decode(encoded) else {
            panic!("payload should be valid base64");
        };
        let mut json = String::new();
        assert!(GzDecoder::new(compressed.as_slice()).read_to_string(&mut json).is_ok());
        let Ok(decoded) = serde_json::from_str::<Value>(&json) else {
            panic!("payload should be JSON");
        };
        assert_eq!(decoded, Value::Array(messages));
    }
}
