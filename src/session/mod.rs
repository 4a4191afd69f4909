//! Session engine.
//!
//! A [`Session`] is one endpoint of a request/response/event connection,
//! client or server role alike. It owns a framed reader/writer pair and
//! three tasks:
//!
//! ```text
//! transport ─► receive task ─► decode/route ─► job inbox ─► dispatch task
//!                                                              │ handlers
//! transport ◄─ writer task ◄── outbound channel ◄──────────────┘ send()
//! ```
//!
//! The receive task never runs user code: requests and events become jobs
//! executed in arrival order by the dispatch task, and response completions
//! only fulfil a oneshot whose awaiting task runs the continuation. `send()`
//! is therefore safe from any task, including inside a handler.
//!
//! # Example
//!
//! ```ignore
//! use seqwire::{Error, Session};
//!
//! let session = Session::new();
//! session.on_request(|req: LaunchArgs| async move {
//!     Ok(LaunchResult { pid: 1234 })
//! });
//! session.on_error(|message| eprintln!("protocol error: {message}"));
//! session.bind(reader, writer, || println!("peer closed"));
//!
//! let result = session.send(EvaluateArgs { expr: "1+1".into() }).await?;
//! ```

mod pending;
mod registry;

pub use pending::ResponseFuture;

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::codec::{Codec, JsonCodec};
use crate::error::{Error, Result};
use crate::framing::{ContentReader, DEFAULT_MAX_PAYLOAD_SIZE, DEFAULT_READ_CHUNK_SIZE};
use crate::protocol::{Envelope, Event, Request};
use crate::value::{to_value, Map, Value};
use crate::writer::{spawn_writer_task, OutboundHandle};
use pending::{PendingRequests, ResponseOutcome};
use registry::{BoxFuture, Registry};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// One unit of work for the dispatch task.
type Job = BoxFuture<()>;

/// Builder for configuring a [`Session`].
pub struct SessionBuilder {
    codec: Box<dyn Codec>,
    read_chunk_size: usize,
    max_payload_size: usize,
}

impl SessionBuilder {
    /// Create a builder with the JSON codec and default limits.
    pub fn new() -> Self {
        Self {
            codec: Box::new(JsonCodec),
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    /// Use a different serialization backend.
    pub fn codec(mut self, codec: impl Codec) -> Self {
        self.codec = Box::new(codec);
        self
    }

    /// Bytes pulled from the transport per read. Default: 256.
    pub fn read_chunk_size(mut self, bytes: usize) -> Self {
        self.read_chunk_size = bytes;
        self
    }

    /// Largest accepted incoming payload. Default: 1GB.
    pub fn max_payload_size(mut self, bytes: usize) -> Self {
        self.max_payload_size = bytes;
        self
    }

    /// Build the session.
    pub fn build(self) -> Session {
        Session {
            shared: Arc::new(Shared {
                codec: self.codec,
                read_chunk_size: self.read_chunk_size,
                max_payload_size: self.max_payload_size,
                registry: Registry::new(),
                pending: PendingRequests::new(),
                next_seq: AtomicI64::new(1),
                bound: AtomicBool::new(false),
                processing: AtomicBool::new(false),
                close_once: AtomicBool::new(false),
                closed: CancellationToken::new(),
                outbound: Mutex::new(None),
                parked_reader: Mutex::new(None),
            }),
        }
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared between the session, its tasks and its handles.
struct Shared {
    codec: Box<dyn Codec>,
    read_chunk_size: usize,
    max_payload_size: usize,
    registry: Registry,
    pending: PendingRequests,
    /// Next outgoing sequence number, shared by requests, responses and
    /// events from this endpoint.
    next_seq: AtomicI64,
    bound: AtomicBool,
    processing: AtomicBool,
    close_once: AtomicBool,
    closed: CancellationToken,
    outbound: Mutex<Option<OutboundHandle>>,
    /// Reader parked between `connect` and `start_processing`.
    parked_reader: Mutex<Option<ContentReader<BoxedReader>>>,
}

/// One endpoint of a bound connection.
///
/// Dropping the session closes it: tasks stop, the sink shuts down, and
/// every outstanding [`ResponseFuture`] resolves with
/// [`Error::SessionClosed`].
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    /// Create a session with the JSON codec and default limits.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a builder for a customized session.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Install the protocol error handler.
    ///
    /// Only one error handler is active at a time; a later call replaces the
    /// earlier registration.
    pub fn on_error(&self, handler: impl Fn(&str) + Send + Sync + 'static) {
        self.shared.registry.set_error_handler(handler);
    }

    /// Register an async request handler for `R::COMMAND`.
    ///
    /// The handler's result becomes the response envelope: `Ok` encodes as
    /// `{success: true, body}`, `Err` as `{success: false, message}`. The
    /// future may complete long after the handler was entered.
    pub fn on_request<R, F, Fut>(&self, handler: F)
    where
        R: Request,
        F: Fn(R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R::Response, Error>> + Send + 'static,
    {
        self.shared.registry.add_request::<R, _, _>(handler);
    }

    /// Register an event handler for `E::EVENT`.
    pub fn on_event<E, F>(&self, handler: F)
    where
        E: Event,
        F: Fn(E) + Send + Sync + 'static,
    {
        self.shared.registry.add_event::<E, _>(handler);
    }

    /// Register a callback invoked after a response to `R::COMMAND` has been
    /// written (or answered with an error) by this endpoint.
    pub fn on_response_sent<R, F>(&self, handler: F)
    where
        R: Request,
        F: Fn(std::result::Result<&R::Response, &Error>) + Send + Sync + 'static,
    {
        self.shared.registry.add_response_sent::<R, _>(handler);
    }

    /// Connect this session to a transport.
    ///
    /// Can only be called once; repeated calls raise a protocol error and do
    /// nothing else. Sends are legal as soon as the session is connected.
    /// Must be called from within a tokio runtime (the writer task starts
    /// here).
    pub fn connect<R, W>(&self, reader: R, writer: W)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        if self.shared.bound.swap(true, Ordering::SeqCst) {
            self.shared.registry.error("session already connected");
            return;
        }

        let reader = ContentReader::with_config(
            Box::new(reader) as BoxedReader,
            self.shared.read_chunk_size,
            self.shared.max_payload_size,
        );
        *self.shared.parked_reader.lock() = Some(reader);

        let (handle, _task) = spawn_writer_task(writer, self.shared.closed.clone());
        *self.shared.outbound.lock() = Some(handle);
    }

    /// Start the receive and dispatch tasks.
    ///
    /// Can only be called once, after [`connect`](Session::connect); misuse
    /// raises a protocol error and does nothing else.
    pub fn start_processing(&self) {
        if !self.shared.bound.load(Ordering::SeqCst) {
            self.shared
                .registry
                .error("cannot start processing before the session is connected");
            return;
        }
        if self.shared.processing.swap(true, Ordering::SeqCst) {
            self.shared.registry.error("message processing already started");
            return;
        }

        let reader = match self.shared.parked_reader.lock().take() {
            Some(reader) => reader,
            None => return,
        };

        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(receive_loop(self.shared.clone(), reader, inbox_tx));
        tokio::spawn(dispatch_loop(inbox_rx));
    }

    /// Connect and start processing in one call.
    ///
    /// `on_closed` fires once when the peer disconnects or the session is
    /// closed locally.
    pub fn bind<R, W>(&self, reader: R, writer: W, on_closed: impl FnOnce() + Send + 'static)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        self.shared.registry.set_closed_handler(on_closed);
        self.connect(reader, writer);
        self.start_processing();
    }

    /// Send a request and return the future for its response.
    ///
    /// The future resolves exactly once: with the matched response, with an
    /// immediate error if the send itself failed, or with
    /// [`Error::SessionClosed`] at teardown. A send on an unbound or closed
    /// session resolves immediately with an error and also fires the error
    /// handler.
    pub fn send<R: Request>(&self, request: R) -> ResponseFuture<R::Response> {
        send_request(&self.shared, request)
    }

    /// Send a fire-and-forget event.
    pub fn send_event<E: Event>(&self, event: E) -> Result<()> {
        send_event(&self.shared, event)
    }

    /// A cheap cloneable handle for sending from other tasks or from inside
    /// handlers without keeping the session alive.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Close the session: stop the tasks, shut the sink down and resolve
    /// every outstanding response future with [`Error::SessionClosed`].
    pub fn close(&self) {
        close_session(&self.shared);
    }

    /// True once the session has been closed, locally or by the peer.
    pub fn is_closed(&self) -> bool {
        self.shared.close_once.load(Ordering::SeqCst)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        close_session(&self.shared);
    }
}

/// Weak sending handle to a [`Session`].
///
/// Operations on a dropped or closed session resolve with
/// [`Error::SessionClosed`] instead of panicking or hanging.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Weak<Shared>,
}

impl SessionHandle {
    /// Send a request; see [`Session::send`].
    pub fn send<R: Request>(&self, request: R) -> ResponseFuture<R::Response> {
        match self.shared.upgrade() {
            Some(shared) => send_request(&shared, request),
            None => ResponseFuture::resolved(Err(Error::SessionClosed)),
        }
    }

    /// Send an event; see [`Session::send_event`].
    pub fn send_event<E: Event>(&self, event: E) -> Result<()> {
        match self.shared.upgrade() {
            Some(shared) => send_event(&shared, event),
            None => Err(Error::SessionClosed),
        }
    }
}

fn send_request<R: Request>(shared: &Arc<Shared>, request: R) -> ResponseFuture<R::Response> {
    let arguments = match to_value(&request) {
        Ok(arguments) => arguments,
        Err(e) => {
            shared
                .registry
                .error(&format!("failed to encode request '{}': {e}", R::COMMAND));
            return ResponseFuture::resolved(Err(e.into()));
        }
    };

    let seq = shared.next_seq.fetch_add(1, Ordering::Relaxed);
    let future = shared.pending.register::<R::Response>(seq);

    let envelope = Envelope::request(seq, R::COMMAND, Some(arguments));
    if let Err(e) = write_envelope(shared, envelope) {
        shared.pending.take(seq);
        shared
            .registry
            .error(&format!("failed to send request '{}': {e}", R::COMMAND));
        return ResponseFuture::resolved(Err(e));
    }

    future
}

fn send_event<E: Event>(shared: &Shared, event: E) -> Result<()> {
    let body = match to_value(&event) {
        Ok(body) => body,
        Err(e) => {
            shared
                .registry
                .error(&format!("failed to encode event '{}': {e}", E::EVENT));
            return Err(e.into());
        }
    };

    let seq = shared.next_seq.fetch_add(1, Ordering::Relaxed);
    let envelope = Envelope::event(seq, E::EVENT, Some(body));
    if let Err(e) = write_envelope(shared, envelope) {
        shared
            .registry
            .error(&format!("failed to send event '{}': {e}", E::EVENT));
        return Err(e);
    }
    Ok(())
}

/// Encode an envelope and queue it on the writer task.
fn write_envelope(shared: &Shared, envelope: Envelope) -> Result<()> {
    if shared.close_once.load(Ordering::SeqCst) {
        return Err(Error::SessionClosed);
    }
    let bytes = shared.codec.encode(&envelope.into_value())?;
    let guard = shared.outbound.lock();
    match guard.as_ref() {
        Some(handle) => handle.send(Bytes::from(bytes)),
        None => Err(Error::NotConnected),
    }
}

async fn receive_loop(
    shared: Arc<Shared>,
    mut reader: ContentReader<BoxedReader>,
    inbox: mpsc::UnboundedSender<Job>,
) {
    loop {
        let payload = tokio::select! {
            _ = shared.closed.cancelled() => break,
            payload = reader.read() => payload,
        };
        let Some(payload) = payload else { break };

        if let Some(job) = process_payload(&shared, &payload) {
            if inbox.send(job).is_err() {
                break;
            }
        }
    }
    tracing::debug!("receive loop ended");
    close_session(&shared);
}

async fn dispatch_loop(mut inbox: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = inbox.recv().await {
        job.await;
    }
}

/// Decode one framed payload and route it, producing a dispatch job for
/// requests and events. Responses complete their pending entry right here:
/// that only fulfils a oneshot - the caller's continuation runs on the
/// awaiting task - and it lets a handler issue a nested request without
/// deadlocking the dispatch queue behind itself.
fn process_payload(shared: &Arc<Shared>, payload: &[u8]) -> Option<Job> {
    let value = match shared.codec.decode(payload) {
        Ok(value) => value,
        Err(e) => {
            shared.registry.error(&format!("failed to decode message: {e}"));
            return None;
        }
    };

    let envelope = match Envelope::parse(&value) {
        Ok(envelope) => envelope,
        Err(message) => {
            shared.registry.error(&message);
            return None;
        }
    };

    match envelope {
        Envelope::Request {
            seq,
            command,
            arguments,
        } => process_request(shared, seq, command, arguments),
        Envelope::Event { event, body, .. } => process_event(shared, event, body),
        Envelope::Response {
            request_seq,
            success,
            message,
            body,
            ..
        } => {
            process_response(shared, request_seq, success, message, body);
            None
        }
    }
}

fn process_request(
    shared: &Arc<Shared>,
    request_seq: i64,
    command: String,
    arguments: Option<Value>,
) -> Option<Job> {
    let Some(invoke) = shared.registry.request(&command) else {
        shared.registry.error(&format!(
            "no request handler registered for command '{command}'"
        ));
        return None;
    };

    let arguments = arguments.unwrap_or_else(|| Value::Object(Map::new()));
    let handler_future = match invoke(arguments) {
        Ok(future) => future,
        Err(e) => {
            shared
                .registry
                .error(&format!("failed to deserialize request '{command}': {e}"));
            return None;
        }
    };

    let shared = shared.clone();
    Some(Box::pin(async move {
        let result = handler_future.await;

        let seq = shared.next_seq.fetch_add(1, Ordering::Relaxed);
        let envelope = match &result {
            Ok(body) => Envelope::response_success(seq, request_seq, command.clone(), body.clone()),
            Err(e) => Envelope::response_error(seq, request_seq, command.clone(), e.to_string()),
        };
        if let Err(e) = write_envelope(&shared, envelope) {
            shared
                .registry
                .error(&format!("failed to send response for '{command}': {e}"));
        }

        if let Some(sent) = shared.registry.response_sent(&command) {
            match &result {
                Ok(body) => sent(Ok(body)),
                Err(e) => sent(Err(e)),
            }
        }
    }))
}

fn process_event(shared: &Arc<Shared>, event: String, body: Option<Value>) -> Option<Job> {
    let Some(invoke) = shared.registry.event(&event) else {
        shared
            .registry
            .error(&format!("no event handler registered for event '{event}'"));
        return None;
    };

    // Not every event carries a body.
    let body = body.unwrap_or_else(|| Value::Object(Map::new()));
    match invoke(body) {
        Ok(future) => Some(future),
        Err(e) => {
            shared
                .registry
                .error(&format!("failed to deserialize event '{event}' body: {e}"));
            None
        }
    }
}

fn process_response(
    shared: &Arc<Shared>,
    request_seq: i64,
    success: bool,
    message: Option<String>,
    body: Option<Value>,
) {
    let Some(entry) = shared.pending.take(request_seq) else {
        shared
            .registry
            .error(&format!("unknown response with sequence {request_seq}"));
        return;
    };

    let outcome = if success {
        ResponseOutcome::Success(body)
    } else {
        match message {
            Some(message) => ResponseOutcome::Failure(message),
            None => {
                shared
                    .registry
                    .error("response missing string 'message' field");
                ResponseOutcome::Failure("request failed".to_owned())
            }
        }
    };

    if let Err(message) = entry.complete(outcome) {
        shared.registry.error(&message);
    }
}

/// Tear the session down exactly once.
fn close_session(shared: &Shared) {
    if shared.close_once.swap(true, Ordering::SeqCst) {
        return;
    }
    shared.closed.cancel();
    *shared.outbound.lock() = None;
    *shared.parked_reader.lock() = None;
    shared.pending.clear();
    if let Some(on_closed) = shared.registry.take_closed_handler() {
        on_closed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, Default)]
    struct Noop {
        v: i64,
    }

    #[derive(Debug, Serialize, Deserialize, Default)]
    struct NoopResult {
        v: i64,
    }

    impl Request for Noop {
        const COMMAND: &'static str = "noop";
        type Response = NoopResult;
    }

    #[test]
    fn test_builder_defaults() {
        let builder = SessionBuilder::new();
        assert_eq!(builder.read_chunk_size, DEFAULT_READ_CHUNK_SIZE);
        assert_eq!(builder.max_payload_size, DEFAULT_MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn test_builder_configuration() {
        let builder = Session::builder()
            .read_chunk_size(4096)
            .max_payload_size(1024 * 1024);
        assert_eq!(builder.read_chunk_size, 4096);
        assert_eq!(builder.max_payload_size, 1024 * 1024);
    }

    #[test]
    fn test_new_session_is_not_closed() {
        let session = Session::new();
        assert!(!session.is_closed());
        session.close();
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_send_on_unbound_session_resolves_error() {
        let session = Session::new();
        assert!(matches!(
            session.send(Noop { v: 1 }).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_handle_outlives_session_gracefully() {
        let session = Session::new();
        let handle = session.handle();
        drop(session);

        assert!(matches!(
            handle.send(Noop { v: 1 }).await,
            Err(Error::SessionClosed)
        ));
    }
}
