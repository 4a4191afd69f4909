//! MsgPack codec using `rmp-serde`.
//!
//! Uses `to_vec_named` so objects encode as maps with field names rather than
//! positional arrays; a peer decoding with a schemaless MsgPack reader sees
//! the same shapes the JSON backend produces.

use super::Codec;
use crate::error::Result;
use crate::value::Value;

/// MessagePack codec for structured payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackCodec;

impl Codec for MsgPackCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Map, Value};

    #[test]
    fn test_round_trip() {
        let mut map = Map::new();
        map.insert("id".to_owned(), Value::Int(42));
        map.insert("name".to_owned(), Value::Str("hello".to_owned()));
        map.insert(
            "mixed".to_owned(),
            Value::Array(vec![Value::Bool(false), Value::Num(0.5)]),
        );
        let value = Value::Object(map);

        let bytes = MsgPackCodec.encode(&value).unwrap();
        assert_eq!(MsgPackCodec.decode(&bytes).unwrap(), value);
    }

    #[test]
    fn test_decode_malformed_fails() {
        assert!(MsgPackCodec.decode(&[0xc1]).is_err());
    }
}
