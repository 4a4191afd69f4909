//! Codec layer - pluggable serialization backends.
//!
//! A [`Codec`] turns [`Value`] trees into payload bytes and back. The session
//! is generic over the backend: swapping codecs changes the payload encoding
//! without touching framing or dispatch.
//!
//! - [`JsonCodec`] - the reference backend (JSON text payloads)
//! - [`MsgPackCodec`] - binary alternative using `rmp-serde`
//!
//! # Example
//!
//! ```
//! use seqwire::codec::{Codec, JsonCodec};
//! use seqwire::value::to_value;
//!
//! let value = to_value(&vec![1i64, 2, 3]).unwrap();
//! let bytes = JsonCodec.encode(&value).unwrap();
//! assert_eq!(JsonCodec.decode(&bytes).unwrap(), value);
//! ```

mod json;
mod msgpack;

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;

use crate::error::Result;
use crate::value::Value;

/// A serialization backend over [`Value`] trees.
///
/// Object-safe so a session can hold whichever backend it was built with.
pub trait Codec: Send + Sync + 'static {
    /// Encode a value tree into payload bytes.
    fn encode(&self, value: &Value) -> Result<Vec<u8>>;

    /// Decode payload bytes into a value tree.
    fn decode(&self, bytes: &[u8]) -> Result<Value>;
}
