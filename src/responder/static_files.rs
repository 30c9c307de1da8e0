//! Serves files from a document root.

use std::fs::File;
use std::io::ErrorKind;
use std::path::PathBuf;

use http::{header, Method, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::connection::RequestContext;
use crate::protocol::{Body, Response};
use crate::responder::{ProtocolError, RespondOutcome};
use crate::utils::mime_type;

/// Serves `GET`/`HEAD` requests for files under a document root.
#[derive(Clone)]
pub struct StaticResponder {
    root: PathBuf,
    index: String,
    server: String,
}

impl StaticResponder {
    pub fn new(root: impl Into<PathBuf>, index: impl Into<String>, server: impl Into<String>) -> Self {
        Self { root: root.into(), index: index.into(), server: server.into() }
    }

    pub fn respond<S>(&self, ctx: &RequestContext<S>, target: &str) -> RespondOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        // Request path must not escape the root.
        if target.contains("..") {
            return Err(ProtocolError::recoverable(StatusCode::BAD_REQUEST, "Bad request"));
        }

        let resource = target.strip_prefix('/').unwrap_or(target);
        let mut file_path = self.root.join(resource);
        if resource.is_empty() || resource.ends_with('/') {
            file_path.push(&self.index);
        }

        let request = ctx.request();
        if request.method() != Method::GET && request.method() != Method::HEAD {
            return Err(ProtocolError::recoverable(
                StatusCode::METHOD_NOT_ALLOWED,
                format!("{} {}", ctx.method_string(), ctx.target()),
            ));
        }

        let file = match File::open(&file_path) {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return Err(ProtocolError::recoverable(StatusCode::NOT_FOUND, target))
            }
            Err(_) => return Err(ProtocolError::recoverable(StatusCode::BAD_REQUEST, "Unknown error")),
        };

        let metadata = match file.metadata() {
            Ok(metadata) if !metadata.is_dir() => metadata,
            _ => return Err(ProtocolError::recoverable(StatusCode::BAD_REQUEST, "Unknown error")),
        };
        let size = metadata.len();

        let builder = http::Response::builder()
            .status(StatusCode::OK)
            .version(request.version())
            .header(header::SERVER, self.server.as_str())
            .header(header::CONTENT_TYPE, mime_type(&file_path))
            .header(header::CONTENT_LENGTH, size)
            .header(
                header::CONNECTION,
                if request.keep_alive() { "keep-alive" } else { "close" },
            );

        let body = if request.method() == Method::HEAD {
            Body::Empty
        } else {
            Body::file(file, size)
        };

        Ok(builder.body(body).expect("static response head is always valid"))
    }
}
