//! Per-request state and its continuation-returning IO operations.

use std::sync::{Arc, Mutex, OnceLock};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::connection::Connection;
use crate::coroutine::Continuation;
use crate::protocol::{IoError, RequestHeader, Response};
use crate::reactor;

/// The result carried by request-context IO continuations: bytes
/// transferred, or the IO-channel error.
pub type IoOutcome = Result<usize, IoError>;

/// One request on one connection.
///
/// Created fresh per request from the shared connection handle, which must
/// outlive it. Move-only; the serving coroutine shares it with responders
/// through an `Arc`. Exactly one header parse is performed against it, and
/// at most one IO operation is outstanding at a time.
pub struct RequestContext<S> {
    connection: Arc<Connection<S>>,
    head: Arc<OnceLock<RequestHeader>>,
    keep_alive_override: Mutex<Option<bool>>,
}

impl<S> RequestContext<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(connection: &Arc<Connection<S>>) -> Self {
        Self {
            connection: connection.clone(),
            head: Arc::new(OnceLock::new()),
            keep_alive_override: Mutex::new(None),
        }
    }

    /// Launches the header read; the returned continuation resolves with
    /// the head size once the parse completes.
    pub fn read_header(&self) -> Continuation<IoOutcome> {
        let then = Continuation::copy();
        let producer = then.clone();
        let connection = self.connection.clone();
        let head_slot = self.head.clone();
        reactor::spawn(async move {
            match connection.read_head().await {
                Ok((header, consumed)) => {
                    let _ = head_slot.set(header);
                    producer.complete(Ok(consumed));
                }
                Err(error) => producer.complete(Err(error)),
            }
        });
        then
    }

    /// Launches the response write; resolves with the bytes written.
    /// Materialized and generate-on-write bodies go through the same path.
    pub fn write(&self, response: Response) -> Continuation<IoOutcome> {
        let then = Continuation::copy();
        let producer = then.clone();
        let connection = self.connection.clone();
        reactor::spawn(async move {
            producer.complete(connection.write_response(response).await);
        });
        then
    }

    /// The keep-alive decision for this request: the override if set,
    /// otherwise the parser's view of the `Connection` header.
    pub fn keep_alive(&self) -> bool {
        if let Some(forced) = *self.keep_alive_override.lock().unwrap() {
            return forced;
        }
        self.head.get().map(|header| header.keep_alive()).unwrap_or(false)
    }

    pub fn force_keep_alive(&self, flag: bool) {
        *self.keep_alive_override.lock().unwrap() = Some(flag);
    }

    /// The parsed request head. Only valid once `read_header` resolved
    /// successfully.
    pub fn request(&self) -> &RequestHeader {
        self.head.get().expect("request head has not been read")
    }

    /// The raw request target, including any query part.
    pub fn target(&self) -> &str {
        self.request()
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    }

    pub fn method_string(&self) -> String {
        self.request().method().to_string()
    }
}
