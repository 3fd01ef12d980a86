use ciborium::value::Value as CiboriumValue;
use serde_json::Value as JsonValue;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unable to encode CBOR: {0}")]
    Cbor(#[from] ciborium::ser::Error<std::io::Error>),
}

/// Converts a JSON document to CBOR.
///
/// Object keys stay text strings, so a reading document written as JSON
/// produces the payload a device would send.
///
/// # Examples
///
/// ```
/// use coapum_ingest::helper::json_to_cbor;
///
/// let cbor = json_to_cbor(r#"{"foo": "bar"}"#).unwrap();
/// assert_eq!(cbor, vec![0xA1, 0x63, 0x66, 0x6F, 0x6F, 0x63, 0x62, 0x61, 0x72]);
/// ```
pub fn json_to_cbor(json: &str) -> Result<Vec<u8>, ConversionError> {
    let json_value: JsonValue = serde_json::from_str(json)?;
    json_value_to_cbor(&json_value)
}

pub fn json_value_to_cbor(json: &JsonValue) -> Result<Vec<u8>, ConversionError> {
    let cbor_value: CiboriumValue = serde_json::from_value(json.clone())?;

    let mut buffer = Vec::new();
    ciborium::ser::into_writer(&cbor_value, &mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use coapum_cbor::{decode, CborValue};

    #[test]
    fn test_json_to_cbor() {
        let json = r#"{"age": 30}"#;
        let expected_cbor = vec![
            0xa1, // map(1)
            0x63, 0x61, 0x67, 0x65, // text(3): "age"
            0x18, 0x1e, // unsigned(30)
        ];

        let result = json_to_cbor(json).unwrap();
        assert_eq!(result, expected_cbor);
    }

    #[test]
    fn test_reading_document_decodes() {
        let cbor = json_value_to_cbor(&serde_json::json!({
            "tempSensor": {"temperature": 21.5, "humidity": 55, "ok": true}
        }))
        .unwrap();

        let value = decode(&cbor).unwrap();
        let sensor = value.get("tempSensor").unwrap();
        assert_eq!(sensor.get("temperature"), Some(&CborValue::Float(21.5)));
        assert_eq!(sensor.get("humidity"), Some(&CborValue::Unsigned(55)));
        assert_eq!(sensor.get("ok"), Some(&CborValue::Bool(true)));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            json_to_cbor("{not json"),
            Err(ConversionError::Json(_))
        ));
    }
}
