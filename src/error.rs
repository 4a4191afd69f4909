//! Error types for seqwire.

use thiserror::Error;

/// Main error type for all seqwire operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the underlying byte stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error from the reference codec.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Conversion between a typed payload and a [`Value`](crate::Value) tree
    /// failed.
    #[error("value error: {0}")]
    Value(#[from] crate::value::ValueError),

    /// Protocol violation (malformed envelope, oversized frame, etc.).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Application-level failure of one request, carried in the `message`
    /// field of a failed response. Does not close the session.
    #[error("{0}")]
    Response(String),

    /// The session has not been connected to a transport yet.
    #[error("session is not connected")]
    NotConnected,

    /// The session was closed before the operation could complete.
    #[error("session closed")]
    SessionClosed,
}

impl Error {
    /// Build an application-level request error with the given message.
    pub fn response(message: impl Into<String>) -> Self {
        Error::Response(message.into())
    }
}

/// Result type alias using seqwire's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
