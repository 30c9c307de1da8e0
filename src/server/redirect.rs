//! HTTP→HTTPS redirect responder.

use http::{header, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

use crate::connection::RequestContext;
use crate::protocol::Body;
use crate::responder::RespondOutcome;

/// Answers every request with `301 Moved Permanently` pointing at the
/// `https://` origin of the same host and target. The response keeps the
/// connection open so a pipelining client can be bounced in one go.
pub fn redirect_responder<S>(server: String) -> impl Fn(&RequestContext<S>, &str) -> RespondOutcome
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    move |ctx, target| {
        let host = ctx
            .request()
            .headers()
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        let location = format!("https://{host}{target}");

        info!("redirect {} {} to {}", ctx.method_string(), target, location);

        Ok(http::Response::builder()
            .status(StatusCode::MOVED_PERMANENTLY)
            .version(ctx.request().version())
            .header(header::SERVER, server.as_str())
            .header(header::CONTENT_TYPE, "text/html")
            .header(header::LOCATION, location)
            .header(header::CONNECTION, "keep-alive")
            .body(Body::Empty)
            .expect("redirect head is always valid"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responder::tests::context_for;

    #[test]
    fn redirects_to_the_https_origin() {
        let ctx = context_for("GET /path/page?x=1 HTTP/1.1\r\nHost: example.com\r\n\r\n");
        let redirect = redirect_responder(String::from("srv"));

        let response = redirect(&ctx, ctx.target()).unwrap();
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "https://example.com/path/page?x=1"
        );
        assert_eq!(response.headers().get(header::CONNECTION).unwrap(), "keep-alive");
    }
}
