//! A coroutine that resumes once, producing a single value or an error.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::FutureExt;

use super::continuation::Continuation;

/// Wraps an async body into a returning coroutine.
///
/// The coroutine is inert until awaited or [`spawn`](crate::executor::spawn)ed;
/// either way its result is latched into a copy-flavor continuation that a
/// second party can observe through [`Returning::continuation`].
pub fn returning<R, Fut>(body: Fut) -> Returning<R>
where
    R: Send + 'static,
    Fut: Future<Output = crate::Result<R>> + Send + 'static,
{
    Returning {
        future: Some(body.boxed()),
        completion: Continuation::copy(),
    }
}

pub struct Returning<R> {
    future: Option<BoxFuture<'static, crate::Result<R>>>,
    completion: Continuation<R>,
}

impl<R: Send + 'static> Returning<R> {
    /// A handle to the return continuation, resolved when the coroutine
    /// completes. This is what `spawn` hands back to the caller.
    pub fn continuation(&self) -> Continuation<R> {
        self.completion.clone()
    }

    /// Converts the coroutine into a detached driver future that resolves
    /// the return continuation instead of handing the value to a direct
    /// awaiter.
    pub(crate) fn into_driver(self) -> impl Future<Output = ()> + Send {
        let Returning { future, completion } = self;
        async move {
            if let Some(body) = future {
                match body.await {
                    Ok(value) => completion.complete(value),
                    Err(error) => completion.complete_error(error),
                }
            }
        }
    }
}

impl<R: Send + 'static> Future for Returning<R> {
    type Output = crate::Result<R>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(body) = self.future.as_mut() {
            match body.poll_unpin(cx) {
                Poll::Ready(Ok(value)) => {
                    self.future = None;
                    self.completion.complete(value);
                }
                Poll::Ready(Err(error)) => {
                    self.future = None;
                    self.completion.complete_error(error);
                }
                Poll::Pending => return Poll::Pending,
            }
        }

        if self.completion.await_ready() {
            return Poll::Ready(self.completion.await_resume());
        }
        Poll::Pending
    }
}
