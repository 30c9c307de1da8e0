//! The per-connection serve loop: request stream → responder → response.

use http::header;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{error, info};

use crate::connection::{RequestContext, RequestResult};
use crate::coroutine::Yielding;
use crate::protocol::{Body, Response};
use crate::responder::{ErrorHandler, ProtocolError, RespondOutcome};

/// Drives one connection to completion.
///
/// Each request is dispatched through `responder`; a protocol error is
/// turned into a response: through the error handler when one covers the
/// status, otherwise as a `text/html` string body carrying the error
/// message. IO errors on individual requests are logged and the loop moves
/// on; the request stream itself decides when the connection is done.
pub async fn serve_connection<S, R>(
    requests: &mut Yielding<RequestResult<S>>,
    responder: &R,
    server: &str,
    errors: Option<&ErrorHandler>,
) -> crate::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    R: Fn(&RequestContext<S>, &str) -> RespondOutcome,
{
    while let Some(request_or) = requests.next().await? {
        let ctx = match request_or {
            Ok(ctx) => ctx,
            Err(cause) => {
                error!(%cause, "request error");
                continue;
            }
        };

        info!("serving {} {}", ctx.method_string(), ctx.target());

        let target = ctx.target().to_string();
        let response = match responder(&ctx, &target) {
            Ok(response) => response,
            Err(protocol_error) => {
                error!("[HTTP error] {}", protocol_error.message);
                errors
                    .and_then(|handler| {
                        handler.response_for(ctx.request(), &protocol_error, server, ctx.keep_alive())
                    })
                    .unwrap_or_else(|| error_body_response(&ctx, &protocol_error, server))
            }
        };

        if let Err(cause) = ctx.write(response).await? {
            error!(%cause, "failed to write response");
        }
    }
    Ok(())
}

/// The default conversion of a protocol error into a response: the error
/// message as a `text/html` string body, with the configured server string
/// and the request's keep-alive echoed.
pub fn error_body_response<S>(ctx: &RequestContext<S>, error: &ProtocolError, server: &str) -> Response
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    http::Response::builder()
        .status(error.status)
        .version(ctx.request().version())
        .header(header::SERVER, server)
        .header(header::CONTENT_TYPE, "text/html")
        .header(header::CONNECTION, if ctx.keep_alive() { "keep-alive" } else { "close" })
        .body(Body::from(error.message.clone()))
        .expect("error response head is always valid")
}
