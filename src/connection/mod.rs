mod connection;
mod request_context;
mod requests;

pub use connection::Connection;
pub use request_context::{IoOutcome, RequestContext};
pub use requests::{accept_requests, http, https, RequestResult};
