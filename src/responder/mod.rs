//! Composable request responders.
//!
//! A responder maps `(request context, target)` to a response or a
//! structured protocol error. [`route`] mounts a responder under a
//! regex-matched prefix; [`or_else`] chains responders with fall-through
//! on recoverable errors. A route miss is a recoverable 404 by convention,
//! so sibling routes get their turn.

mod error_handler;
mod static_files;

pub use error_handler::ErrorHandler;
pub use static_files::StaticResponder;

use http::StatusCode;
use regex::Regex;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::connection::RequestContext;
use crate::protocol::Response;
use crate::utils::prefix_match;

/// A protocol-level failure produced by a responder.
///
/// `recoverable` failures permit an [`or_else`] chain to try the next
/// link; non-recoverable ones short-circuit as the final answer.
#[derive(Debug)]
pub struct ProtocolError {
    pub status: StatusCode,
    pub message: String,
    pub recoverable: bool,
}

impl ProtocolError {
    pub fn recoverable(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into(), recoverable: true }
    }

    pub fn fatal(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into(), recoverable: false }
    }
}

pub type RespondOutcome = Result<Response, ProtocolError>;

/// Mounts `upstream` under a route prefix.
///
/// The regex must match at the very start of the target; the matched
/// prefix is stripped and the remainder passed upstream. A miss is a
/// recoverable 404.
pub fn route<S, R>(
    route_regex: Regex,
    upstream: R,
) -> impl Fn(&RequestContext<S>, &str) -> RespondOutcome
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    R: Fn(&RequestContext<S>, &str) -> RespondOutcome,
{
    move |ctx, target| match prefix_match(target, &route_regex) {
        Some(prefix_length) => upstream(ctx, &target[prefix_length..]),
        None => Err(ProtocolError::recoverable(StatusCode::NOT_FOUND, "")),
    }
}

/// Runs `first`; on a recoverable error, falls through to `next`.
pub fn or_else<S, A, B>(first: A, next: B) -> impl Fn(&RequestContext<S>, &str) -> RespondOutcome
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    A: Fn(&RequestContext<S>, &str) -> RespondOutcome,
    B: Fn(&RequestContext<S>, &str) -> RespondOutcome,
{
    move |ctx, target| match first(ctx, target) {
        Ok(response) => Ok(response),
        Err(error) if error.recoverable => next(ctx, target),
        Err(error) => Err(error),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::sync::Arc;
    use tokio::io::{AsyncWriteExt, DuplexStream};

    use crate::connection::{accept_requests, Connection};
    use crate::protocol::Body;

    /// Builds a real request context by feeding raw bytes through the
    /// request stream.
    pub(crate) fn context_for(raw: &str) -> Arc<RequestContext<DuplexStream>> {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        block_on(async {
            client.write_all(raw.as_bytes()).await.unwrap();
        });
        // Keep the client half alive long enough for the parse.
        std::mem::forget(client);

        let mut requests = accept_requests(Connection::new(server));
        block_on(requests.next()).unwrap().unwrap().unwrap()
    }

    fn ok_responder(body: &'static str) -> impl Fn(&RequestContext<DuplexStream>, &str) -> RespondOutcome {
        move |_ctx, _target| {
            Ok(http::Response::builder().status(StatusCode::OK).body(Body::from(body)).unwrap())
        }
    }

    #[test]
    fn route_strips_the_matched_prefix() {
        let ctx = context_for("GET /api/users HTTP/1.1\r\nHost: x\r\n\r\n");
        let seen = std::sync::Mutex::new(String::new());
        let routed = route(Regex::new("/api").unwrap(), |_ctx: &RequestContext<DuplexStream>, rest: &str| {
            *seen.lock().unwrap() = rest.to_string();
            Ok(http::Response::builder().body(Body::Empty).unwrap())
        });

        routed(&ctx, ctx.target()).unwrap();
        assert_eq!(*seen.lock().unwrap(), "/users");
    }

    #[test]
    fn route_miss_is_a_recoverable_404() {
        let ctx = context_for("GET /other HTTP/1.1\r\nHost: x\r\n\r\n");
        let routed = route(Regex::new("/api").unwrap(), ok_responder("unreachable"));

        let error = routed(&ctx, ctx.target()).unwrap_err();
        assert_eq!(error.status, StatusCode::NOT_FOUND);
        assert!(error.recoverable);
    }

    #[test]
    fn mid_target_match_does_not_count() {
        let ctx = context_for("GET /v1/api/users HTTP/1.1\r\nHost: x\r\n\r\n");
        let routed = route(Regex::new("/api").unwrap(), ok_responder("unreachable"));
        assert!(routed(&ctx, ctx.target()).is_err());
    }

    #[test]
    fn or_else_falls_through_on_recoverable_errors() {
        let ctx = context_for("GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        let failing =
            |_: &RequestContext<DuplexStream>, _: &str| -> RespondOutcome {
                Err(ProtocolError::recoverable(StatusCode::NOT_FOUND, "miss"))
            };
        let chain = or_else(failing, ok_responder("fallback"));

        let response = chain(&ctx, ctx.target()).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn or_else_short_circuits_on_fatal_errors() {
        let ctx = context_for("GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        let failing = |_: &RequestContext<DuplexStream>, _: &str| -> RespondOutcome {
            Err(ProtocolError::fatal(StatusCode::BAD_REQUEST, "broken"))
        };
        let chain = or_else(failing, ok_responder("unreachable"));

        let error = chain(&ctx, ctx.target()).unwrap_err();
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert_eq!(error.message, "broken");
    }

    #[test]
    fn first_success_skips_the_fallback() {
        let ctx = context_for("GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        let chain = or_else(ok_responder("first"), ok_responder("second"));
        let response = chain(&ctx, ctx.target()).unwrap();
        match response.into_body() {
            Body::Full(bytes) => assert_eq!(&bytes[..], b"first"),
            _ => panic!("expected an in-memory body"),
        }
    }
}
