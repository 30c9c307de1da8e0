mod listener;
mod redirect;
mod serve;

pub use listener::{AcceptResult, TcpListener};
pub use redirect::redirect_responder;
pub use serve::{error_body_response, serve_connection};
