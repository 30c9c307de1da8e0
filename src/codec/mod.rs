mod error;
mod header_decoder;
mod response_encoder;

pub use error::DecodeError;
pub use header_decoder::HeaderDecoder;
pub use response_encoder::ResponseEncoder;
