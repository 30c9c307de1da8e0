//! Streams of parsed requests off a connected socket.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

use crate::connection::{Connection, RequestContext};
use crate::coroutine::{yielding, Continuation, Yielding};
use crate::protocol::IoError;
use crate::reactor;
use crate::utils::Defer;

/// One element of a request stream: a context ready for dispatch, or the
/// IO error that ended the connection.
pub type RequestResult<S> = Result<Arc<RequestContext<S>>, IoError>;

/// Produces request contexts in on-wire order until the connection closes
/// or a request turns keep-alive off.
///
/// The consumer must finish with each request, response written, before
/// pulling the next one; the parser state is per-connection and the
/// coroutine only resumes once the previous yield has been consumed.
pub fn accept_requests<S>(connection: Arc<Connection<S>>) -> Yielding<RequestResult<S>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    yielding(move |yielder| async move {
        loop {
            let ctx = Arc::new(RequestContext::new(&connection));
            let status = ctx.read_header().await?;
            if let Err(error) = status {
                if !error.is_clean_close() {
                    yielder.yield_item(Err(error)).await;
                }
                break;
            }

            yielder.yield_item(Ok(ctx.clone())).await;

            if !ctx.keep_alive() {
                break;
            }
        }
        Ok(())
    })
}

/// The plain-TCP request stream.
pub fn http(socket: TcpStream) -> Yielding<RequestResult<TcpStream>> {
    accept_requests(Connection::new(socket))
}

/// The TLS request stream: performs the server-side handshake before the
/// first request, then streams requests like [`http`]. The TLS shutdown is
/// armed as a scoped deferred action so the close-notify goes out on every
/// exit path.
pub fn https(socket: TcpStream, acceptor: TlsAcceptor) -> Yielding<RequestResult<TlsStream<TcpStream>>> {
    yielding(move |yielder| async move {
        let handshake = Continuation::<Result<TlsStream<TcpStream>, IoError>>::copy();
        let producer = handshake.clone();
        reactor::spawn(async move {
            producer.complete(acceptor.accept(socket).await.map_err(IoError::from));
        });

        let stream = match handshake.await? {
            Ok(stream) => stream,
            Err(error) => {
                yielder.yield_item(Err(error)).await;
                return Ok(());
            }
        };

        let connection = Connection::new(stream);
        let guard = connection.clone();
        let _shutdown = Defer::new(move || Connection::spawn_shutdown(guard));

        let mut requests = accept_requests(connection);
        while let Some(request) = requests.next().await? {
            yielder.yield_item(request).await;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use http::{Method, StatusCode};
    use indoc::indoc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    use crate::protocol::Body;

    fn request_stream(raw: &'static str) -> (Yielding<RequestResult<DuplexStream>>, DuplexStream) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let mut client_writer = client;
        block_on(async {
            client_writer.write_all(raw.as_bytes()).await.unwrap();
        });
        (accept_requests(Connection::new(server)), client_writer)
    }

    #[test]
    fn yields_one_request_and_ends_on_close() {
        let raw = "GET /hello HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n";
        let (mut requests, _client) = request_stream(raw);

        let ctx = block_on(requests.next()).unwrap().unwrap().unwrap();
        assert_eq!(ctx.request().method(), &Method::GET);
        assert_eq!(ctx.target(), "/hello");
        assert!(!ctx.keep_alive());

        // Keep-alive gate: nothing more after a close request.
        assert!(block_on(requests.next()).unwrap().is_none());
    }

    #[test]
    fn keep_alive_override_wins_over_the_header() {
        let raw = "GET / HTTP/1.1\r\nHost: x\r\n\r\n";
        let (mut requests, _client) = request_stream(raw);

        let ctx = block_on(requests.next()).unwrap().unwrap().unwrap();
        assert!(ctx.keep_alive());
        ctx.force_keep_alive(false);
        assert!(!ctx.keep_alive());

        assert!(block_on(requests.next()).unwrap().is_none());
    }

    #[test]
    fn pipelined_requests_arrive_in_wire_order() {
        let raw = indoc! {"
            GET / HTTP/1.1\r
            Host: x\r
            Connection: keep-alive\r
            \r
            GET /index.html HTTP/1.1\r
            Host: x\r
            Connection: close\r
            \r
        "};
        let (mut requests, mut client) = request_stream(raw);

        let first = block_on(requests.next()).unwrap().unwrap().unwrap();
        assert_eq!(first.target(), "/");
        assert!(first.keep_alive());

        let response = http::Response::builder()
            .status(StatusCode::OK)
            .body(Body::from("<h1>OK</h1>"))
            .unwrap();
        block_on(first.write(response)).unwrap().unwrap();

        let second = block_on(requests.next()).unwrap().unwrap().unwrap();
        assert_eq!(second.target(), "/index.html");
        assert!(!second.keep_alive());

        // Close gate fires after the second request.
        assert!(block_on(requests.next()).unwrap().is_none());

        let mut written = vec![0u8; 1024];
        let n = block_on(client.read(&mut written)).unwrap();
        let text = String::from_utf8_lossy(&written[..n]);
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("<h1>OK</h1>"));
    }

    #[test]
    fn unread_body_is_drained_before_the_next_head() {
        let raw = indoc! {"
            POST /upload HTTP/1.1\r
            Host: x\r
            Content-Length: 5\r
            \r
            helloGET /after HTTP/1.1\r
            Host: x\r
            Connection: close\r
            \r
        "};
        let (mut requests, _client) = request_stream(raw);

        let post = block_on(requests.next()).unwrap().unwrap().unwrap();
        assert_eq!(post.request().method(), &Method::POST);
        // The responder never reads the body.

        let get = block_on(requests.next()).unwrap().unwrap().unwrap();
        assert_eq!(get.target(), "/after");
    }

    #[test]
    fn immediate_close_terminates_cleanly() {
        let (client, server) = tokio::io::duplex(1024);
        drop(client);
        let mut requests = accept_requests(Connection::new(server));
        assert!(block_on(requests.next()).unwrap().is_none());
    }

    #[test]
    fn mid_header_close_terminates_cleanly() {
        let (client, server) = tokio::io::duplex(1024);
        let mut client = client;
        block_on(async {
            client.write_all(b"GET /partial HTTP/1.1\r\nHost:").await.unwrap();
        });
        drop(client);

        let mut requests = accept_requests(Connection::new(server));
        // partial_message is a clean termination, not a yielded error
        assert!(block_on(requests.next()).unwrap().is_none());
    }

    #[test]
    fn garbage_is_yielded_as_an_error_then_ends() {
        let (client, server) = tokio::io::duplex(1024);
        let mut client = client;
        block_on(async {
            client.write_all(b"\0\0garbage\r\n\r\n").await.unwrap();
        });

        let mut requests = accept_requests(Connection::new(server));
        let first = block_on(requests.next()).unwrap().unwrap();
        assert!(first.is_err());
        assert!(block_on(requests.next()).unwrap().is_none());
    }
}
