use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize, source: httparse::Error },

    #[error("invalid header: {source}")]
    InvalidHeader { source: httparse::Error },

    #[error("invalid content-length header: {message}")]
    InvalidContentLength { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
