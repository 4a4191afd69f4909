//! Handler tables for routing incoming messages.
//!
//! Handlers are registered against wire names and erased behind closures
//! that decode the payload before calling the typed handler. Each table is
//! guarded by its own mutex; lookups clone the entry out so no lock is held
//! while a handler runs.
//!
//! Registering a second handler for the same wire name is reported through
//! the error handler and the original registration is kept.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Error;
use crate::protocol::{Event, Request};
use crate::value::{from_value, to_value, Value, ValueError};

/// Boxed future used for dispatch jobs.
pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Type-erased request handler: decodes the arguments (failing before any
/// user code runs), then yields a future producing the encoded response body
/// or the error to answer with.
pub(crate) type RequestInvoke =
    Arc<dyn Fn(Value) -> Result<BoxFuture<Result<Value, Error>>, ValueError> + Send + Sync>;

/// Type-erased event handler.
pub(crate) type EventInvoke =
    Arc<dyn Fn(Value) -> Result<BoxFuture<()>, ValueError> + Send + Sync>;

/// Type-erased response-sent callback. `Ok` carries the encoded body that
/// was just written; `Err` the failure that was answered instead.
pub(crate) type SentInvoke = Arc<dyn Fn(Result<&Value, &Error>) + Send + Sync>;

type ErrorHandler = Box<dyn Fn(&str) + Send + Sync>;
type ClosedHandler = Box<dyn FnOnce() + Send>;

/// The session's handler tables.
pub(crate) struct Registry {
    requests: Mutex<HashMap<String, RequestInvoke>>,
    events: Mutex<HashMap<String, EventInvoke>>,
    response_sent: Mutex<HashMap<String, SentInvoke>>,
    error: Mutex<Option<ErrorHandler>>,
    closed: Mutex<Option<ClosedHandler>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
            events: Mutex::new(HashMap::new()),
            response_sent: Mutex::new(HashMap::new()),
            error: Mutex::new(None),
            closed: Mutex::new(None),
        }
    }

    /// Report a protocol error through the registered handler, if any.
    pub(crate) fn error(&self, message: &str) {
        tracing::debug!("protocol error: {message}");
        if let Some(handler) = self.error.lock().as_ref() {
            handler(message);
        }
    }

    /// Install the protocol error handler, replacing any earlier one.
    pub(crate) fn set_error_handler(&self, handler: impl Fn(&str) + Send + Sync + 'static) {
        *self.error.lock() = Some(Box::new(handler));
    }

    /// Install the closed handler, replacing any earlier one.
    pub(crate) fn set_closed_handler(&self, handler: impl FnOnce() + Send + 'static) {
        *self.closed.lock() = Some(Box::new(handler));
    }

    /// Take the closed handler for its single invocation.
    pub(crate) fn take_closed_handler(&self) -> Option<ClosedHandler> {
        self.closed.lock().take()
    }

    /// Register a request handler for `R::COMMAND`.
    pub(crate) fn add_request<R, F, Fut>(&self, handler: F)
    where
        R: Request,
        F: Fn(R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R::Response, Error>> + Send + 'static,
    {
        let invoke: RequestInvoke = Arc::new(move |arguments: Value| {
            let request: R = from_value(arguments)?;
            let fut = handler(request);
            Ok(Box::pin(async move {
                let response = fut.await?;
                Ok(to_value(&response)?)
            }) as BoxFuture<_>)
        });

        let mut guard = self.requests.lock();
        if guard.contains_key(R::COMMAND) {
            drop(guard);
            self.error(&format!(
                "request handler for '{}' already registered",
                R::COMMAND
            ));
            return;
        }
        guard.insert(R::COMMAND.to_owned(), invoke);
    }

    /// Look up the request handler for `command`.
    pub(crate) fn request(&self, command: &str) -> Option<RequestInvoke> {
        self.requests.lock().get(command).cloned()
    }

    /// Register an event handler for `E::EVENT`.
    pub(crate) fn add_event<E, F>(&self, handler: F)
    where
        E: Event,
        F: Fn(E) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let invoke: EventInvoke = Arc::new(move |body: Value| {
            let event: E = from_value(body)?;
            let handler = handler.clone();
            Ok(Box::pin(async move { handler(event) }) as BoxFuture<()>)
        });

        let mut guard = self.events.lock();
        if guard.contains_key(E::EVENT) {
            drop(guard);
            self.error(&format!(
                "event handler for '{}' already registered",
                E::EVENT
            ));
            return;
        }
        guard.insert(E::EVENT.to_owned(), invoke);
    }

    /// Look up the event handler for `name`.
    pub(crate) fn event(&self, name: &str) -> Option<EventInvoke> {
        self.events.lock().get(name).cloned()
    }

    /// Register a response-sent callback for responses to `R::COMMAND`.
    pub(crate) fn add_response_sent<R, F>(&self, handler: F)
    where
        R: Request,
        F: Fn(Result<&R::Response, &Error>) + Send + Sync + 'static,
    {
        let invoke: SentInvoke = Arc::new(move |outcome: Result<&Value, &Error>| match outcome {
            Ok(body) => match from_value::<R::Response>(body.clone()) {
                Ok(response) => handler(Ok(&response)),
                Err(e) => tracing::warn!(
                    "response sent handler for '{}' could not decode body: {e}",
                    R::COMMAND
                ),
            },
            Err(e) => handler(Err(e)),
        });

        let mut guard = self.response_sent.lock();
        if guard.contains_key(R::COMMAND) {
            drop(guard);
            self.error(&format!(
                "response sent handler for '{}' already registered",
                R::COMMAND
            ));
            return;
        }
        guard.insert(R::COMMAND.to_owned(), invoke);
    }

    /// Look up the response-sent callback for `command`.
    pub(crate) fn response_sent(&self, command: &str) -> Option<SentInvoke> {
        self.response_sent.lock().get(command).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Serialize, Deserialize, Default)]
    struct Ping {
        tag: i64,
    }

    #[derive(Debug, Serialize, Deserialize, Default)]
    struct Pong {
        tag: i64,
    }

    impl Request for Ping {
        const COMMAND: &'static str = "ping";
        type Response = Pong;
    }

    #[derive(Debug, Serialize, Deserialize, Default)]
    struct Tick {
        n: i64,
    }

    impl Event for Tick {
        const EVENT: &'static str = "tick";
    }

    #[tokio::test]
    async fn test_request_handler_decodes_and_encodes() {
        let registry = Registry::new();
        registry.add_request::<Ping, _, _>(|req| async move { Ok(Pong { tag: req.tag + 1 }) });

        let invoke = registry.request("ping").unwrap();
        let args = to_value(&Ping { tag: 41 }).unwrap();
        let body = invoke(args).unwrap().await.unwrap();
        assert_eq!(body.get("tag").unwrap().as_i64(), Some(42));
    }

    #[tokio::test]
    async fn test_request_handler_decode_failure_precedes_user_code() {
        let registry = Registry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        registry.add_request::<Ping, _, _>(move |req| {
            calls2.fetch_add(1, Ordering::SeqCst);
            async move { Ok(Pong { tag: req.tag }) }
        });

        let invoke = registry.request("ping").unwrap();
        assert!(invoke(Value::Str("not an object".into())).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_duplicate_request_keeps_first() {
        let registry = Registry::new();
        let errors = Arc::new(AtomicUsize::new(0));
        let errors2 = errors.clone();
        registry.set_error_handler(move |_| {
            errors2.fetch_add(1, Ordering::SeqCst);
        });

        registry.add_request::<Ping, _, _>(|req| async move { Ok(Pong { tag: req.tag }) });
        registry.add_request::<Ping, _, _>(|_req| async move { Ok(Pong { tag: -1 }) });
        assert_eq!(errors.load(Ordering::SeqCst), 1);

        // First handler remains authoritative.
        let invoke = registry.request("ping").unwrap();
        let body = invoke(to_value(&Ping { tag: 7 }).unwrap())
            .unwrap()
            .await
            .unwrap();
        assert_eq!(body.get("tag").unwrap().as_i64(), Some(7));
    }

    #[tokio::test]
    async fn test_event_handler_runs() {
        let registry = Registry::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        registry.add_event::<Tick, _>(move |tick| {
            seen2.store(tick.n as usize, Ordering::SeqCst);
        });

        let invoke = registry.event("tick").unwrap();
        invoke(to_value(&Tick { n: 9 }).unwrap()).unwrap().await;
        assert_eq!(seen.load(Ordering::SeqCst), 9);
    }

    #[test]
    fn test_lookup_missing_returns_none() {
        let registry = Registry::new();
        assert!(registry.request("nope").is_none());
        assert!(registry.event("nope").is_none());
        assert!(registry.response_sent("nope").is_none());
    }

    #[test]
    fn test_error_handler_replaced_by_later_registration() {
        let registry = Registry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let c = first.clone();
        registry.set_error_handler(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let c = second.clone();
        registry.set_error_handler(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        registry.error("boom");
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_response_sent_decodes_typed_body() {
        let registry = Registry::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        registry.add_response_sent::<Ping, _>(move |outcome| {
            if let Ok(pong) = outcome {
                seen2.store(pong.tag as usize, Ordering::SeqCst);
            }
        });

        let invoke = registry.response_sent("ping").unwrap();
        let body = to_value(&Pong { tag: 5 }).unwrap();
        invoke(Ok(&body));
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }
}
