//! HTTP response representation.
//!
//! A [`Response`] is the standard `http::Response` carrying a [`Body`].
//! The body is either materialized up front (empty or in-memory bytes) or
//! generated at write time (a file streamed chunk by chunk); the request
//! context's write operation handles both the same way.

use std::fs::File;

use bytes::Bytes;

/// The header portion of a response, before a body is attached.
pub type ResponseHead = http::Response<()>;

pub type Response = http::Response<Body>;

/// What goes on the wire after the head.
#[derive(Debug)]
pub enum Body {
    Empty,
    Full(Bytes),
    /// Serialized on the fly while writing; never buffered whole.
    File { file: File, length: u64 },
}

impl Body {
    pub fn file(file: File, length: u64) -> Self {
        Body::File { file, length }
    }

    pub fn payload_size(&self) -> PayloadSize {
        match self {
            Body::Empty => PayloadSize::Empty,
            Body::Full(bytes) if bytes.is_empty() => PayloadSize::Empty,
            Body::Full(bytes) => PayloadSize::Length(bytes.len() as u64),
            Body::File { length, .. } => PayloadSize::Length(*length),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Full(bytes)
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Full(Bytes::from(text))
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Body::Full(Bytes::from_static(text.as_bytes()))
    }
}

/// Body size communicated to the response encoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadSize {
    Empty,
    Length(u64),
}
