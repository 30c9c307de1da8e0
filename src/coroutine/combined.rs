//! A coroutine that yields a stream of values and then returns one more.
//!
//! Producer and consumer negotiate two channels through one coroutine, so
//! the consumer declares which one it is waiting on before each drive. A
//! yield that arrives while the consumer awaits the return resolves the
//! return channel with [`CoroutineError::UnhandledYield`]; a return that
//! arrives while the consumer awaits the stream delivers the empty marker
//! first and parks the value for a later [`Combined::wait`].

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::FutureExt;

use super::continuation::Continuation;
use super::error::CoroutineError;
use super::yielding::Yielder;

/// Which channel the consumer is currently waiting on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Expecting {
    Nothing,
    Yield,
    Return,
}

/// Builds a combined coroutine; the body yields through the [`Yielder`]
/// and finishes with `Ok(return_value)`.
pub fn combined<Y, R, F, Fut>(body: F) -> Combined<Y, R>
where
    Y: Send + 'static,
    R: Send + 'static,
    F: FnOnce(Yielder<Y>) -> Fut,
    Fut: Future<Output = crate::Result<R>> + Send + 'static,
{
    let (yielder, channel) = Yielder::channel();
    Combined {
        future: Some(body(yielder).boxed()),
        yield_channel: channel,
        return_channel: Continuation::copy(),
        expecting: Expecting::Nothing,
        finished: false,
    }
}

pub struct Combined<Y, R> {
    future: Option<BoxFuture<'static, crate::Result<R>>>,
    yield_channel: Continuation<Option<Y>>,
    return_channel: Continuation<R>,
    expecting: Expecting,
    finished: bool,
}

impl<Y: Send + 'static, R: Send + 'static> Combined<Y, R> {
    /// Resumes the coroutine and waits for the next yielded value; `None`
    /// marks the end of the stream.
    pub fn next(&mut self) -> CombinedNext<'_, Y, R> {
        self.expecting = Expecting::Yield;
        CombinedNext { coroutine: self }
    }

    /// Resumes the coroutine and waits for its final return value.
    pub fn wait(&mut self) -> CombinedWait<'_, Y, R> {
        self.expecting = Expecting::Return;
        CombinedWait { coroutine: self }
    }

    /// Drives the producer one step; resolves both channels on completion.
    fn drive(&mut self, cx: &mut Context<'_>) {
        let Some(body) = self.future.as_mut() else { return };
        match body.poll_unpin(cx) {
            Poll::Ready(Ok(value)) => {
                self.future = None;
                if self.expecting == Expecting::Yield && !self.yield_channel.await_ready() {
                    self.yield_channel.complete(None);
                }
                self.return_channel.complete(value);
            }
            Poll::Ready(Err(error)) => {
                self.future = None;
                match self.expecting {
                    Expecting::Return => self.return_channel.complete_error(error),
                    _ => self.yield_channel.complete_error(error),
                }
            }
            Poll::Pending => {}
        }
    }
}

pub struct CombinedNext<'a, Y, R> {
    coroutine: &'a mut Combined<Y, R>,
}

impl<Y: Send + 'static, R: Send + 'static> Future for CombinedNext<'_, Y, R> {
    type Output = crate::Result<Option<Y>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let coroutine = &mut *self.coroutine;
        if coroutine.finished {
            return Poll::Ready(Ok(None));
        }

        if !coroutine.yield_channel.await_ready() {
            coroutine.drive(cx);
        }

        if coroutine.yield_channel.await_ready() {
            let item = coroutine.yield_channel.await_resume()?;
            if item.is_none() {
                coroutine.finished = true;
            }
            return Poll::Ready(Ok(item));
        }
        Poll::Pending
    }
}

pub struct CombinedWait<'a, Y, R> {
    coroutine: &'a mut Combined<Y, R>,
}

impl<Y: Send + 'static, R: Send + 'static> Future for CombinedWait<'_, Y, R> {
    type Output = crate::Result<R>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let coroutine = &mut *self.coroutine;

        if !coroutine.return_channel.await_ready() {
            coroutine.drive(cx);

            // A yield with nobody to consume it poisons the return.
            if coroutine.future.is_some() && coroutine.yield_channel.await_ready() {
                coroutine.return_channel.complete_error(CoroutineError::UnhandledYield.into());
            }
        }

        if coroutine.return_channel.await_ready() {
            return Poll::Ready(coroutine.return_channel.await_resume());
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn yields_then_returns() {
        let mut coroutine = combined(|yielder| async move {
            yielder.yield_item("a").await;
            yielder.yield_item("b").await;
            Ok(100usize)
        });

        assert_eq!(block_on(coroutine.next()).unwrap(), Some("a"));
        assert_eq!(block_on(coroutine.next()).unwrap(), Some("b"));
        assert_eq!(block_on(coroutine.next()).unwrap(), None);
        assert_eq!(block_on(coroutine.wait()).unwrap(), 100);
    }

    #[test]
    fn return_while_expecting_yield_sends_empty_marker_first() {
        let mut coroutine = combined::<&str, _, _, _>(|_yielder| async move { Ok(5usize) });

        assert_eq!(block_on(coroutine.next()).unwrap(), None);
        assert_eq!(block_on(coroutine.wait()).unwrap(), 5);
    }

    #[test]
    fn yield_while_expecting_return_is_an_error() {
        let mut coroutine = combined(|yielder| async move {
            yielder.yield_item(1usize).await;
            Ok("never reached")
        });

        let err = block_on(coroutine.wait()).unwrap_err();
        assert!(err.downcast_ref::<CoroutineError>().is_some());
    }

    // The consumer is free to switch from the stream to the return at any
    // point; the two cases below pin the interleavings that are neither
    // pure-stream nor pure-return.

    #[test]
    fn wait_after_the_last_yield_resumes_through_to_the_return() {
        let mut coroutine = combined(|yielder| async move {
            yielder.yield_item(1usize).await;
            Ok("done")
        });

        // Consume the only yield, then switch to the return without ever
        // pulling the end-of-stream marker.
        assert_eq!(block_on(coroutine.next()).unwrap(), Some(1));
        assert_eq!(block_on(coroutine.wait()).unwrap(), "done");
    }

    #[test]
    fn wait_without_any_next_gets_a_yieldless_return() {
        let mut coroutine = combined::<usize, _, _, _>(|_yielder| async move { Ok(7usize) });
        assert_eq!(block_on(coroutine.wait()).unwrap(), 7);
    }
}
