//! Accepting TCP listener.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::Notify;
use tracing::error;

use crate::coroutine::{returning, yielding, Continuation, Returning, Yielding};
use crate::executor::{self, Executor, ThreadPool};
use crate::reactor;

const MAX_PENDING_CONNECTIONS: u32 = 1024;

pub type AcceptResult = Result<TcpStream, io::Error>;

struct ListenerState {
    executor: Arc<ThreadPool>,
    acceptor: tokio::net::TcpListener,
    stopped: AtomicBool,
    stop_signal: Notify,
}

impl ListenerState {
    /// Launches one accept; resolves with the peer socket, or with an
    /// `operation aborted` error when the listener is stopped first.
    fn accept(self: &Arc<Self>) -> Continuation<AcceptResult> {
        let then = Continuation::copy();
        let producer = then.clone();
        let state = self.clone();
        reactor::spawn(async move {
            tokio::select! {
                accepted = state.acceptor.accept() => {
                    producer.complete(accepted.map(|(socket, _remote_addr)| socket));
                }
                _ = state.stop_signal.notified() => {
                    producer.complete(Err(io::Error::new(io::ErrorKind::Interrupted, "operation aborted")));
                }
            }
        });
        then
    }

    fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Owns a bound acceptor and hands accepted sockets out, either as a
/// pull-mode stream ([`TcpListener::incoming`]) or pushed into a handler
/// ([`TcpListener::serve`]).
///
/// Dropping the listener latches the stop flag but does not join the
/// accept loop; the executor must outlive the listener.
pub struct TcpListener {
    state: Arc<ListenerState>,
}

impl TcpListener {
    /// Opens, configures and binds the acceptor. Every failure is logged
    /// and returned; binding errors are never silently dropped.
    pub fn bind(endpoint: SocketAddr, executor: Arc<ThreadPool>) -> io::Result<Self> {
        let _reactor = reactor::enter();

        let bound = (|| {
            let socket = if endpoint.is_ipv4() { TcpSocket::new_v4()? } else { TcpSocket::new_v6()? };
            socket.set_reuseaddr(true)?;
            socket.bind(endpoint)?;
            socket.listen(MAX_PENDING_CONNECTIONS)
        })();

        let acceptor = match bound {
            Ok(acceptor) => acceptor,
            Err(cause) => {
                error!(%cause, %endpoint, "failed to bind listener");
                return Err(cause);
            }
        };

        Ok(Self {
            state: Arc::new(ListenerState {
                executor,
                acceptor,
                stopped: AtomicBool::new(false),
                stop_signal: Notify::new(),
            }),
        })
    }

    /// Binds and spawns the push-mode accept loop: each accept result is
    /// passed to `handler`, and the coroutine it returns runs on a fresh
    /// strand so per-socket work never serializes across sockets.
    pub fn serve<H>(endpoint: SocketAddr, executor: Arc<ThreadPool>, handler: H) -> io::Result<Self>
    where
        H: Fn(AcceptResult) -> Returning<()> + Send + Sync + 'static,
    {
        let listener = Self::bind(endpoint, executor.clone())?;
        let state = listener.state.clone();

        let accept_loop = returning(async move {
            while !state.stopped() {
                let accepted = state.accept().await?;
                if state.stopped() {
                    break;
                }
                let strand: Arc<dyn Executor> = state.executor.strand();
                executor::spawn(&strand, handler(accepted));
            }
            Ok(())
        });

        let exec: Arc<dyn Executor> = executor;
        executor::spawn(&exec, accept_loop);
        Ok(listener)
    }

    /// Pull-mode accept stream. Transient accept failures are yielded as
    /// `Err` and the loop continues; the stream ends once [`stop`] is
    /// called.
    ///
    /// [`stop`]: TcpListener::stop
    pub fn incoming(&self) -> Yielding<AcceptResult> {
        let state = self.state.clone();
        yielding(move |yielder| async move {
            while !state.stopped() {
                let accepted = state.accept().await?;
                if state.stopped() {
                    break;
                }
                yielder.yield_item(accepted).await;
            }
            Ok(())
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.state.acceptor.local_addr()
    }

    /// One-way stop latch: the accept loop terminates once its current
    /// pending accept resolves.
    pub fn stop(&self) {
        self.state.stopped.store(true, Ordering::SeqCst);
        self.state.stop_signal.notify_waiters();
    }

    pub fn stopped(&self) -> bool {
        self.state.stopped()
    }
}

impl Drop for TcpListener {
    fn drop(&mut self) {
        self.stop();
    }
}
