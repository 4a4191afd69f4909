//! Pending-response table and the single-assignment response future.
//!
//! Each outgoing request registers an entry keyed by its sequence number.
//! The entry owns a typed completion: it decodes the response body and
//! fulfils a oneshot channel exactly once. Dropping an entry without
//! completing it (session teardown) resolves the matching
//! [`ResponseFuture`] with [`Error::SessionClosed`] - outstanding requests
//! never hang a caller past the session's lifetime.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;

use crate::error::Error;
use crate::value::{from_value, Map, Value};

/// Outcome of one incoming response envelope, before typed decoding.
pub(crate) enum ResponseOutcome {
    /// `success: true`; the optional `body` payload.
    Success(Option<Value>),
    /// `success: false`; the `message` payload.
    Failure(String),
}

/// A registered completion awaiting a matching response.
pub(crate) struct PendingEntry {
    complete: Box<dyn FnOnce(ResponseOutcome) -> Result<(), String> + Send>,
}

impl PendingEntry {
    /// Fulfil the entry. `Err` carries a protocol-error message to report
    /// (the future itself has already been resolved either way).
    pub(crate) fn complete(self, outcome: ResponseOutcome) -> Result<(), String> {
        (self.complete)(outcome)
    }
}

/// Table of requests awaiting responses, keyed by sequence number.
pub(crate) struct PendingRequests {
    entries: Mutex<HashMap<i64, PendingEntry>>,
}

impl PendingRequests {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Register a pending response for `seq` and return its future.
    ///
    /// An absent success body decodes as an empty object, so responses whose
    /// payload type has only optional fields still resolve.
    pub(crate) fn register<T>(&self, seq: i64) -> ResponseFuture<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let entry = PendingEntry {
            complete: Box::new(move |outcome| {
                let result = match outcome {
                    ResponseOutcome::Success(body) => {
                        let body = body.unwrap_or_else(|| Value::Object(Map::new()));
                        match from_value::<T>(body) {
                            Ok(response) => Ok(response),
                            Err(e) => {
                                let message = format!("failed to deserialize response body: {e}");
                                let _ = tx.send(Err(Error::Protocol(message.clone())));
                                return Err(message);
                            }
                        }
                    }
                    ResponseOutcome::Failure(message) => Err(Error::Response(message)),
                };
                let _ = tx.send(result);
                Ok(())
            }),
        };
        self.entries.lock().insert(seq, entry);
        ResponseFuture { rx }
    }

    /// Remove and return the entry for `seq`, if any.
    pub(crate) fn take(&self, seq: i64) -> Option<PendingEntry> {
        self.entries.lock().remove(&seq)
    }

    /// Drop every outstanding entry; their futures resolve with
    /// [`Error::SessionClosed`].
    pub(crate) fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Future for the response to one sent request.
///
/// Resolved exactly once: by the matching incoming response, by an
/// immediate send-path failure, or with [`Error::SessionClosed`] when the
/// session goes away first. There is no built-in timeout; wrap the future in
/// `tokio::time::timeout` if one is needed.
pub struct ResponseFuture<T> {
    rx: oneshot::Receiver<Result<T, Error>>,
}

impl<T> ResponseFuture<T> {
    /// A future already resolved with `result`.
    pub(crate) fn resolved(result: Result<T, Error>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }
}

impl<T> Future for ResponseFuture<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx).poll(cx).map(|received| match received {
            Ok(result) => result,
            Err(_) => Err(Error::SessionClosed),
        })
    }
}
