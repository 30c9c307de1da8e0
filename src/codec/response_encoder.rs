use bytes::{BufMut, BytesMut};
use http::{header, Version};
use std::io;
use std::io::ErrorKind;
use tokio_util::codec::Encoder;
use tracing::error;

use crate::protocol::{PayloadSize, ResponseHead};

/// Serializes a response head: status line, headers, terminating CRLF.
///
/// A `Content-Length` header is filled in from the payload size unless the
/// responder already set one.
pub struct ResponseEncoder;

impl Encoder<(ResponseHead, PayloadSize)> for ResponseEncoder {
    type Error = io::Error;

    fn encode(&mut self, item: (ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, payload_size) = item;

        match head.version() {
            Version::HTTP_11 => dst.put_slice(b"HTTP/1.1 "),
            Version::HTTP_10 => dst.put_slice(b"HTTP/1.0 "),
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(io::Error::from(ErrorKind::Unsupported));
            }
        }
        dst.put_slice(head.status().as_str().as_bytes());
        dst.put_slice(b" ");
        dst.put_slice(head.status().canonical_reason().unwrap_or("Unknown").as_bytes());
        dst.put_slice(b"\r\n");

        if head.headers().get(header::CONTENT_LENGTH).is_none() {
            let length = match payload_size {
                PayloadSize::Empty => 0,
                PayloadSize::Length(length) => length,
            };
            head.headers_mut().insert(header::CONTENT_LENGTH, length.into());
        }

        for (header_name, header_value) in head.headers().iter() {
            dst.put_slice(header_name.as_str().as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_bytes());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}
