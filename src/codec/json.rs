//! JSON codec using `serde_json`.
//!
//! The reference backend: payloads are compact JSON text, the encoding the
//! protocol this engine models uses on the wire.

use super::Codec;
use crate::error::Result;
use crate::value::Value;

/// JSON codec for structured payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Map, Value};

    #[test]
    fn test_encode_exact_bytes() {
        let mut map = Map::new();
        map.insert("a".to_owned(), Value::Int(1));
        map.insert("b".to_owned(), Value::Str("x".to_owned()));

        let bytes = JsonCodec.encode(&Value::Object(map)).unwrap();
        assert_eq!(bytes, br#"{"a":1,"b":"x"}"#);
    }

    #[test]
    fn test_decode_round_trip() {
        let mut map = Map::new();
        map.insert("flag".to_owned(), Value::Bool(true));
        map.insert(
            "items".to_owned(),
            Value::Array(vec![Value::Int(1), Value::Num(2.5), Value::Null]),
        );
        let value = Value::Object(map);

        let bytes = JsonCodec.encode(&value).unwrap();
        assert_eq!(JsonCodec.decode(&bytes).unwrap(), value);
    }

    #[test]
    fn test_decode_malformed_fails() {
        assert!(JsonCodec.decode(b"{not json").is_err());
    }
}
