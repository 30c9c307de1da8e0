//! Parsed request-head view.

use http::header::{HeaderName, HeaderValue};
use http::{header, HeaderMap, Method, Request, Uri, Version};

/// The head of an HTTP request, as produced by the header decoder.
///
/// Wraps `http::Request<()>` and adds the connection-reuse and
/// body-presence semantics the serving pipeline keys off.
#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

impl RequestHeader {
    /// Assembles the view from one complete `httparse` result. Every token
    /// has been validated by the parser, so the conversions cannot fail.
    pub(crate) fn from_parsed(parsed: httparse::Request<'_, '_>) -> Self {
        let mut inner = Request::new(());

        *inner.method_mut() = Method::from_bytes(parsed.method.expect("complete parse").as_bytes())
            .expect("parser accepted the method token");
        *inner.uri_mut() = parsed
            .path
            .expect("complete parse")
            .parse::<Uri>()
            .expect("parser accepted the request target");
        // httparse only admits HTTP/1.x requests.
        *inner.version_mut() = if parsed.version == Some(0) { Version::HTTP_10 } else { Version::HTTP_11 };

        let headers = inner.headers_mut();
        headers.reserve(parsed.headers.len());
        for field in parsed.headers.iter() {
            let name = HeaderName::from_bytes(field.name.as_bytes());
            let value = HeaderValue::from_bytes(field.value);
            if let (Ok(name), Ok(value)) = (name, value) {
                headers.append(name, value);
            }
        }

        Self { inner }
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Whether a payload may follow this head at all. Only requests that
    /// pass this check get their `Content-Length` honored; the rest are
    /// treated as bodyless no matter what they declare.
    pub fn expects_body(&self) -> bool {
        match self.method() {
            &Method::GET | &Method::HEAD | &Method::DELETE | &Method::OPTIONS | &Method::CONNECT => false,
            _ => true,
        }
    }

    /// The `Connection` header's verdict on reuse: `close` disables it,
    /// `keep-alive` enables it, and the HTTP version decides otherwise
    /// (on by default for 1.1, off for 1.0).
    pub fn keep_alive(&self) -> bool {
        let connection = self
            .headers()
            .get(header::CONNECTION)
            .and_then(|value| value.to_str().ok());

        match connection {
            Some(value) if value.eq_ignore_ascii_case("close") => false,
            Some(value) if value.eq_ignore_ascii_case("keep-alive") => true,
            _ => self.version() == Version::HTTP_11,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use std::mem::MaybeUninit;

    fn parse(raw: &str) -> RequestHeader {
        let mut parsed = httparse::Request::new(&mut []);
        let mut headers: [MaybeUninit<httparse::Header>; 16] = unsafe { MaybeUninit::uninit().assume_init() };
        parsed.parse_with_uninit_headers(raw.as_bytes(), &mut headers).unwrap();
        RequestHeader::from_parsed(parsed)
    }

    #[test]
    fn assembles_the_parsed_head() {
        let header = parse(indoc! {r##"
        GET /index.html?a=1 HTTP/1.1
        Host: 127.0.0.1:8080
        Accept: */*

        "##});

        assert_eq!(header.method(), &Method::GET);
        assert_eq!(header.version(), Version::HTTP_11);
        assert_eq!(header.uri().path(), "/index.html");
        assert_eq!(header.uri().query(), Some("a=1"));
        assert_eq!(header.headers().len(), 2);
        assert!(!header.expects_body());
    }

    #[test]
    fn repeated_header_fields_are_all_kept() {
        let header = parse("GET / HTTP/1.1\r\nCookie: a=1\r\nCookie: b=2\r\n\r\n");
        let cookies: Vec<_> = header.headers().get_all(header::COOKIE).iter().collect();
        assert_eq!(cookies.len(), 2);
    }

    #[test]
    fn body_presence_follows_the_method() {
        assert!(parse("POST /submit HTTP/1.1\r\nHost: x\r\n\r\n").expects_body());
        assert!(parse("PUT /doc HTTP/1.1\r\nHost: x\r\n\r\n").expects_body());
        assert!(!parse("HEAD / HTTP/1.1\r\nHost: x\r\n\r\n").expects_body());
        assert!(!parse("DELETE /doc HTTP/1.1\r\nHost: x\r\n\r\n").expects_body());
    }

    #[test]
    fn keep_alive_defaults_by_version() {
        let http11 = parse("GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        assert!(http11.keep_alive());

        let http10 = parse("GET / HTTP/1.0\r\nHost: x\r\n\r\n");
        assert!(!http10.keep_alive());
    }

    #[test]
    fn connection_header_overrides_the_default() {
        let close = parse("GET / HTTP/1.1\r\nConnection: close\r\n\r\n");
        assert!(!close.keep_alive());

        let keep = parse("GET / HTTP/1.0\r\nConnection: Keep-Alive\r\n\r\n");
        assert!(keep.keep_alive());
    }
}
