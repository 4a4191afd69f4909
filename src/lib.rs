//! # seqwire
//!
//! Transport-agnostic request/response/event protocol engine.
//!
//! seqwire frames discrete messages over a raw byte stream with
//! `Content-Length` envelopes, encodes payloads through a pluggable codec,
//! and multiplexes concurrent requests with asynchronous responses over one
//! bidirectional connection. Both endpoints are symmetric: the same
//! [`Session`] type serves as client or server.
//!
//! ## Architecture
//!
//! - **Framing** ([`framing`]): `Content-Length: N\r\n\r\n<payload>`
//!   envelopes over any `AsyncRead`/`AsyncWrite` pair
//! - **Values** ([`value`]): the dynamic payload tree every message passes
//!   through, bridged to typed structs by serde
//! - **Codec** ([`codec`]): pluggable payload encoding (JSON reference
//!   backend, MsgPack alternative)
//! - **Protocol** ([`protocol`]): the `{seq, type, ...}` envelope and the
//!   typed [`Request`]/[`Event`] traits
//! - **Session** ([`session`]): sequence numbering, request correlation,
//!   handler dispatch, lifecycle
//!
//! ## Example
//!
//! ```ignore
//! use serde::{Deserialize, Serialize};
//! use seqwire::{Request, Session};
//!
//! #[derive(Serialize, Deserialize)]
//! struct EvaluateArgs {
//!     expression: String,
//! }
//!
//! #[derive(Serialize, Deserialize)]
//! struct EvaluateResult {
//!     value: String,
//! }
//!
//! impl Request for EvaluateArgs {
//!     const COMMAND: &'static str = "evaluate";
//!     type Response = EvaluateResult;
//! }
//!
//! #[tokio::main]
//! async fn main() -> seqwire::Result<()> {
//!     let session = Session::new();
//!     session.on_error(|message| eprintln!("protocol error: {message}"));
//!     session.bind(reader, writer, || println!("peer closed"));
//!
//!     let result = session
//!         .send(EvaluateArgs { expression: "1+1".into() })
//!         .await?;
//!     println!("= {}", result.value);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod framing;
pub mod protocol;
pub mod session;
pub mod value;

mod error;
mod writer;

pub use error::{Error, Result};
pub use protocol::{Envelope, Event, Request};
pub use session::{ResponseFuture, Session, SessionBuilder, SessionHandle};
pub use value::Value;
