use std::io;

use thiserror::Error;

use crate::codec::DecodeError;

/// IO-channel errors surfaced through request-context continuations.
///
/// `EndOfStream` and `PartialMessage` mean the client hung up between or
/// inside a request head; the request stream terminates cleanly on them
/// instead of yielding an error.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("end of stream")]
    EndOfStream,

    #[error("partial message")]
    PartialMessage,

    #[error("{source}")]
    Decode {
        #[from]
        source: DecodeError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl IoError {
    /// True for the error codes that mean a clean client-side close.
    pub fn is_clean_close(&self) -> bool {
        matches!(self, IoError::EndOfStream | IoError::PartialMessage)
    }
}
