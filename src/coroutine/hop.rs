//! A suspension whose sole purpose is to move the consumer onto a chosen
//! executor.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;

use super::continuation::Continuation;
use crate::executor::{self, Executor};

/// Suspends the calling coroutine and resumes it on a worker of `target`.
///
/// The completion is deferred onto `target` immediately, which may run it
/// before the caller has suspended; the blocking flavor makes the producer
/// wait for the suspension, so the hop always actually suspends and the
/// resume never fires into the void. Post-hop code runs on `target`, never
/// inline in the caller's frame. A hop never fails.
pub fn hop(target: Arc<dyn Executor>) -> Hop {
    let continuation = Continuation::<()>::blocking();
    let producer = continuation.clone();
    target.defer(Box::new(move || producer.complete(())));
    Hop { continuation, target, retargeted: false }
}

pub struct Hop {
    continuation: Continuation<()>,
    target: Arc<dyn Executor>,
    retargeted: bool,
}

impl Future for Hop {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if !self.retargeted {
            // Re-home the running task before the producer can fire, so the
            // wake posts it to the target executor.
            executor::retarget_current(&self.target);
            self.retargeted = true;
        }

        match self.continuation.poll_unpin(cx) {
            Poll::Ready(_) => Poll::Ready(()),
            Poll::Pending => Poll::Pending,
        }
    }
}
