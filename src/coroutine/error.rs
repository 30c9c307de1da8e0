use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoroutineError {
    #[error("unhandled yield while waiting for return from a coroutine")]
    UnhandledYield,
}
