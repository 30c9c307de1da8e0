use std::mem::MaybeUninit;

use bytes::{Buf, BytesMut};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::DecodeError;
use crate::codec::DecodeError::{InvalidContentLength, InvalidHeader, TooManyHeaders};
use crate::protocol::RequestHeader;

const MAX_HEADER_NUM: usize = 64;
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Incremental request-head parser.
///
/// `decode` consumes one complete head from the buffer and reports the
/// declared body length alongside it so the connection can drain an unread
/// body before the next head. Partial input leaves the buffer untouched.
pub struct HeaderDecoder;

impl Decoder for HeaderDecoder {
    type Item = (RequestHeader, u64);
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut req = httparse::Request::new(&mut []);
        let mut headers: [MaybeUninit<httparse::Header>; MAX_HEADER_NUM] =
            unsafe { MaybeUninit::uninit().assume_init() };

        let parsed = req.parse_with_uninit_headers(src.as_ref(), &mut headers).map_err(|e| match e {
            Error::TooManyHeaders => TooManyHeaders { max_num: MAX_HEADER_NUM, source: e },
            _ => InvalidHeader { source: e },
        })?;

        match parsed {
            Status::Complete(head_size) => {
                trace!(head_size, "parsed request head");
                if head_size > MAX_HEADER_BYTES {
                    return Err(DecodeError::TooLargeHeader {
                        current_size: head_size,
                        max_size: MAX_HEADER_BYTES,
                    });
                }

                let header = RequestHeader::from_parsed(req);
                let body_length = declared_body_length(&header)?;

                src.advance(head_size);
                Ok(Some((header, body_length)))
            }
            Status::Partial => {
                if src.len() > MAX_HEADER_BYTES {
                    return Err(DecodeError::TooLargeHeader {
                        current_size: src.len(),
                        max_size: MAX_HEADER_BYTES,
                    });
                }
                Ok(None)
            }
        }
    }
}

// refer: https://www.rfc-editor.org/rfc/rfc7230#section-3.3
fn declared_body_length(header: &RequestHeader) -> Result<u64, DecodeError> {
    if !header.expects_body() {
        return Ok(0);
    }

    match header.headers().get(http::header::CONTENT_LENGTH) {
        None => Ok(0),
        Some(value) => {
            let as_str = value
                .to_str()
                .map_err(|_| InvalidContentLength { message: "can't to_str".into() })?;
            as_str
                .trim()
                .parse::<u64>()
                .map_err(|_| InvalidContentLength { message: as_str.into() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderValue, Method, Version};
    use indoc::indoc;

    #[test]
    fn consumes_exactly_the_head() {
        let str = indoc! {r##"
        GET /index.html HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        123"##};

        let mut buf = BytesMut::from(str);
        let (header, body_length) = HeaderDecoder.decode(&mut buf).unwrap().unwrap();

        assert_eq!(body_length, 0);
        assert_eq!(header.method(), &Method::GET);
        assert_eq!(header.version(), Version::HTTP_11);
        assert_eq!(header.uri().path(), "/index.html");
        assert_eq!(header.headers().len(), 3);
        assert_eq!(
            header.headers().get(http::header::HOST),
            Some(&HeaderValue::from_str("127.0.0.1:8080").unwrap())
        );

        // The body bytes stay in the buffer.
        assert_eq!(&buf[..], &b"123"[..]);
    }

    #[test]
    fn partial_head_decodes_to_none() {
        let mut buf = BytesMut::from("GET /index.html HTTP/1.1\r\nHost: 127.0");
        assert!(HeaderDecoder.decode(&mut buf).unwrap().is_none());
        // Nothing consumed; the next read appends to the same buffer.
        assert_eq!(buf.len(), 37);
    }

    #[test]
    fn reports_declared_content_length() {
        let str = indoc! {r##"
        POST /submit HTTP/1.1
        Host: 127.0.0.1:8080
        Content-Length: 11

        hello world"##};

        let mut buf = BytesMut::from(str);
        let (header, body_length) = HeaderDecoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(header.method(), &Method::POST);
        assert_eq!(body_length, 11);
    }

    #[test]
    fn rejects_unparsable_content_length() {
        let str = indoc! {r##"
        POST /submit HTTP/1.1
        Content-Length: eleven

        "##};

        let mut buf = BytesMut::from(str);
        let err = HeaderDecoder.decode(&mut buf).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidContentLength { .. }));
    }

    #[test]
    fn rejects_garbage() {
        let mut buf = BytesMut::from("\0\0\0 nonsense\r\n\r\n");
        assert!(HeaderDecoder.decode(&mut buf).is_err());
    }
}
