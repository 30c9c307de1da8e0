//! The host reactor: a process-wide tokio runtime that owns every socket
//! and timer.
//!
//! The pipeline never runs coroutines here. Operation launchers (accept,
//! read_header, write, handshake) spawn a completion task onto the reactor
//! that performs the IO and resolves a [`Continuation`]; the awaiting
//! coroutine is then resumed on its own executor. This mirrors an
//! `io_context` that sockets are implicitly bound to.
//!
//! [`Continuation`]: crate::coroutine::Continuation

use std::future::Future;

use once_cell::sync::Lazy;
use tokio::runtime::{Builder, EnterGuard, Handle, Runtime};
use tokio::task::JoinHandle;

static REACTOR: Lazy<Runtime> = Lazy::new(|| {
    Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("webdonkey-reactor")
        .enable_all()
        .build()
        .expect("failed to start the reactor runtime")
});

pub fn handle() -> &'static Handle {
    REACTOR.handle()
}

/// Spawns an IO completion task onto the reactor.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    REACTOR.spawn(future)
}

/// Enters the reactor context on the current thread, so that sockets
/// created here register with the reactor's driver.
pub fn enter() -> EnterGuard<'static> {
    REACTOR.handle().enter()
}
