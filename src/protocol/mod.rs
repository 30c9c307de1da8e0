mod error;
mod request;
mod response;

pub use error::IoError;
pub use request::RequestHeader;
pub use response::{Body, PayloadSize, Response, ResponseHead};
