//! Protocol envelope and typed message traits.
//!
//! Every wire message is one envelope: `{seq, type, ...}` with `type` one of
//! `request`, `response` or `event`. [`Envelope`] is the parsed form; the
//! [`Request`] and [`Event`] traits tie wire names to serde-typed payloads so
//! the session can route by name before the payload type is known.
//!
//! # Example
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use seqwire::protocol::Request;
//!
//! #[derive(Serialize, Deserialize)]
//! struct PingArgs {
//!     count: i64,
//! }
//!
//! #[derive(Serialize, Deserialize)]
//! struct PingResult {
//!     echoed: i64,
//! }
//!
//! impl Request for PingArgs {
//!     const COMMAND: &'static str = "ping";
//!     type Response = PingResult;
//! }
//! ```

mod envelope;

pub use envelope::Envelope;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A typed request payload.
///
/// `COMMAND` is the wire identifier carried in the envelope's `command`
/// field; `Response` is the payload type the remote answers with.
pub trait Request: Serialize + DeserializeOwned + Send + 'static {
    /// Wire name of this request.
    const COMMAND: &'static str;

    /// Payload type of the matching response body.
    type Response: Serialize + DeserializeOwned + Send + 'static;
}

/// A typed event payload.
///
/// `EVENT` is the wire identifier carried in the envelope's `event` field.
/// Events are fire-and-forget; no response is correlated.
pub trait Event: Serialize + DeserializeOwned + Send + 'static {
    /// Wire name of this event.
    const EVENT: &'static str;
}
