pub mod codec;
pub mod connection;
pub mod coroutine;
pub mod executor;
pub mod protocol;
pub mod reactor;
pub mod registry;
pub mod responder;
pub mod server;
pub mod tls;
pub mod utils;

pub type Error = anyhow::Error;
pub type Result<T> = anyhow::Result<T>;
