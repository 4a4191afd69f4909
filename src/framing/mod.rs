//! Content framing layer.
//!
//! Every message on the wire is one envelope:
//!
//! ```text
//! Content-Length: <decimal byte count>\r\n
//! \r\n
//! <payload bytes>
//! ```
//!
//! This module implements both directions:
//! - [`ContentScanner`] - incremental parser extracting payloads from an
//!   accumulation buffer, tolerant of noise between envelopes
//! - [`ContentReader`] - pulls bounded chunks from an `AsyncRead` until one
//!   full envelope is available
//! - [`ContentWriter`] - writes framed payloads to an `AsyncWrite`

mod reader;
mod scanner;
mod writer;

pub use reader::{ContentReader, DEFAULT_READ_CHUNK_SIZE};
pub use scanner::{ContentScanner, DEFAULT_MAX_PAYLOAD_SIZE};
pub use writer::{encode_frame, ContentWriter};
