//! Per-status-code error response overrides.
//!
//! The serve loop consults the handler before falling back to the plain
//! string-body conversion of a protocol error. Each status code maps to
//! either a fixed page or a generator closure; an optional default covers
//! every unmapped code.

use std::collections::HashMap;

use http::{header, StatusCode};

use crate::protocol::{Body, RequestHeader, Response};
use crate::responder::ProtocolError;

type Generator = Box<dyn Fn(&RequestHeader, &ProtocolError) -> Response + Send + Sync>;

enum Page {
    Fixed(String),
    Generated(Generator),
}

#[derive(Default)]
pub struct ErrorHandler {
    pages: HashMap<u16, Page>,
    fallback: Option<Page>,
}

impl ErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a fixed HTML page for one status code.
    pub fn set_page(&mut self, status: StatusCode, body: impl Into<String>) {
        self.pages.insert(status.as_u16(), Page::Fixed(body.into()));
    }

    /// Installs a generator for one status code.
    pub fn set_generator(
        &mut self,
        status: StatusCode,
        generator: impl Fn(&RequestHeader, &ProtocolError) -> Response + Send + Sync + 'static,
    ) {
        self.pages.insert(status.as_u16(), Page::Generated(Box::new(generator)));
    }

    /// Installs the page used for every code without its own entry.
    pub fn set_default_page(&mut self, body: impl Into<String>) {
        self.fallback = Some(Page::Fixed(body.into()));
    }

    pub fn set_default_generator(
        &mut self,
        generator: impl Fn(&RequestHeader, &ProtocolError) -> Response + Send + Sync + 'static,
    ) {
        self.fallback = Some(Page::Generated(Box::new(generator)));
    }

    /// The response for `error`, if any page covers its status.
    pub fn response_for(
        &self,
        request: &RequestHeader,
        error: &ProtocolError,
        server: &str,
        keep_alive: bool,
    ) -> Option<Response> {
        let page = self.pages.get(&error.status.as_u16()).or(self.fallback.as_ref())?;
        Some(match page {
            Page::Fixed(body) => fixed_page(request, error, server, keep_alive, body.clone()),
            Page::Generated(generator) => generator(request, error),
        })
    }
}

fn fixed_page(
    request: &RequestHeader,
    error: &ProtocolError,
    server: &str,
    keep_alive: bool,
    body: String,
) -> Response {
    http::Response::builder()
        .status(error.status)
        .version(request.version())
        .header(header::SERVER, server)
        .header(header::CONTENT_TYPE, "text/html")
        .header(header::CONNECTION, if keep_alive { "keep-alive" } else { "close" })
        .body(Body::from(body))
        .expect("error page head is always valid")
}
