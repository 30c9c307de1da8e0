//! A coroutine that yields an ordered sequence of values.
//!
//! Rust futures cannot `co_yield`, so the generator pairs a producer future
//! with the continuation it reports through: the body receives a
//! [`Yielder`] and suspends on [`Yielder::yield_item`] until the consumer
//! has taken the value. The consumer drives the producer from inside its
//! own poll, which keeps the two strictly interleaved: the producer can
//! only move past a yield once the previous value has been consumed.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::FutureExt;

use super::continuation::Continuation;

/// Builds a yielding coroutine from an async body.
///
/// The body ends the sequence by returning `Ok(())`; an `Err` is latched
/// into the stream's continuation and surfaces from [`Yielding::next`].
pub fn yielding<Y, F, Fut>(body: F) -> Yielding<Y>
where
    Y: Send + 'static,
    F: FnOnce(Yielder<Y>) -> Fut,
    Fut: Future<Output = crate::Result<()>> + Send + 'static,
{
    let (yielder, channel) = Yielder::channel();
    Yielding {
        future: body(yielder).boxed(),
        channel,
        returned: false,
        finished: false,
    }
}

pub struct Yielding<Y> {
    future: BoxFuture<'static, crate::Result<()>>,
    channel: Continuation<Option<Y>>,
    returned: bool,
    finished: bool,
}

impl<Y: Send + 'static> Yielding<Y> {
    /// Resumes the coroutine and waits for the next value.
    ///
    /// Returns `Ok(Some(value))` per yielded value in production order,
    /// then exactly one `Ok(None)`. An error raised inside the coroutine
    /// body surfaces here as `Err`.
    pub fn next(&mut self) -> Next<'_, Y> {
        Next { stream: self }
    }
}

pub struct Next<'a, Y> {
    stream: &'a mut Yielding<Y>,
}

impl<Y: Send + 'static> Future for Next<'_, Y> {
    type Output = crate::Result<Option<Y>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let stream = &mut *self.stream;
        if stream.finished {
            return Poll::Ready(Ok(None));
        }

        if !stream.returned && !stream.channel.await_ready() {
            match stream.future.poll_unpin(cx) {
                Poll::Ready(Ok(())) => {
                    stream.returned = true;
                    if !stream.channel.await_ready() {
                        stream.channel.complete(None);
                    }
                }
                Poll::Ready(Err(error)) => {
                    stream.returned = true;
                    stream.channel.complete_error(error);
                }
                Poll::Pending => {}
            }
        }

        if stream.channel.await_ready() {
            let item = match stream.channel.await_resume() {
                Ok(item) => item,
                Err(error) => {
                    stream.finished = true;
                    return Poll::Ready(Err(error));
                }
            };
            if item.is_none() {
                stream.finished = true;
            }
            return Poll::Ready(Ok(item));
        }

        Poll::Pending
    }
}

/// The producer-side handle passed into the coroutine body.
pub struct Yielder<Y> {
    channel: Continuation<Option<Y>>,
}

impl<Y: Send + 'static> Yielder<Y> {
    /// Creates a yielder and the continuation it reports through.
    pub(crate) fn channel() -> (Self, Continuation<Option<Y>>) {
        let channel = Continuation::copy();
        (Self { channel: channel.clone() }, channel)
    }

    /// Latches `value` for the consumer and suspends until it is taken.
    pub fn yield_item(&self, value: Y) -> YieldItem<'_, Y> {
        YieldItem { channel: &self.channel, value: Some(value) }
    }
}

pub struct YieldItem<'a, Y> {
    channel: &'a Continuation<Option<Y>>,
    value: Option<Y>,
}

// No field is structurally pinned; the future is just a slot and a
// reference.
impl<Y> Unpin for YieldItem<'_, Y> {}

impl<Y: Send + 'static> Future for YieldItem<'_, Y> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(value) = self.value.take() {
            self.channel.complete(Some(value));
            // The consumer re-polls the coroutine once the value is taken;
            // no waker is needed between the two sides.
            return Poll::Pending;
        }

        if self.channel.await_ready() {
            Poll::Pending
        } else {
            Poll::Ready(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use futures::executor::block_on;

    #[test]
    fn values_arrive_in_production_order() {
        let mut numbers = yielding(|yielder| async move {
            for n in 0..5usize {
                yielder.yield_item(n * n).await;
            }
            Ok(())
        });

        let mut seen = Vec::new();
        while let Some(value) = block_on(numbers.next()).unwrap() {
            seen.push(value);
        }
        assert_eq!(seen, vec![0, 1, 4, 9, 16]);
    }

    #[test]
    fn empty_stream_terminates_immediately() {
        let mut empty = yielding::<usize, _, _>(|_yielder| async move { Ok(()) });
        assert!(block_on(empty.next()).unwrap().is_none());
    }

    #[test]
    fn terminator_is_sent_exactly_once() {
        let mut stream = yielding(|yielder| async move {
            yielder.yield_item(1usize).await;
            Ok(())
        });

        assert_eq!(block_on(stream.next()).unwrap(), Some(1));
        assert_eq!(block_on(stream.next()).unwrap(), None);
        // Driving past the terminator keeps reporting the end.
        assert_eq!(block_on(stream.next()).unwrap(), None);
    }

    #[test]
    fn body_error_surfaces_to_the_consumer() {
        let mut stream = yielding(|yielder| async move {
            yielder.yield_item(1usize).await;
            Err(anyhow!("producer failed"))
        });

        assert_eq!(block_on(stream.next()).unwrap(), Some(1));
        let err = block_on(stream.next()).unwrap_err();
        assert_eq!(err.to_string(), "producer failed");
    }

    #[test]
    fn producer_resumes_only_after_value_consumed() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let steps = Arc::new(AtomicUsize::new(0));
        let recorder = steps.clone();
        let mut stream = yielding(move |yielder| async move {
            recorder.store(1, Ordering::SeqCst);
            yielder.yield_item("first").await;
            recorder.store(2, Ordering::SeqCst);
            yielder.yield_item("second").await;
            Ok(())
        });

        assert_eq!(block_on(stream.next()).unwrap(), Some("first"));
        // The coroutine stays parked at the first yield until we pull again.
        assert_eq!(steps.load(Ordering::SeqCst), 1);
        assert_eq!(block_on(stream.next()).unwrap(), Some("second"));
        assert_eq!(steps.load(Ordering::SeqCst), 2);
    }
}
