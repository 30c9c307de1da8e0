//! One-shot rendezvous between a completion callback and a suspended
//! consumer.
//!
//! A [`Continuation`] is shared by value: the operation launcher keeps one
//! clone for the awaiting coroutine and hands another to the completion
//! callback. The producer latches exactly one value (or one error); the
//! consumer either finds it already latched or registers a resume that the
//! producer fires. Three storage flavors cover the three producer shapes:
//!
//! - [`Flavor::Pointer`]: the producer only has a borrow; the value is
//!   cloned into a boxed slot and the borrow may die as soon as
//!   [`Continuation::complete_borrowed`] returns.
//! - [`Flavor::Copy`]: the producer owns the value and moves it in.
//! - [`Flavor::Blocking`]: the producer parks until a consumer has
//!   suspended, then fires. Used by `hop`, where the completion may run
//!   before the suspension is installed and must not fire into the void.

use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll};

type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Value-storage discipline of a continuation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flavor {
    Pointer,
    Copy,
    Blocking,
}

enum Slot<T> {
    Empty,
    Boxed(Box<T>),
    Inline(T),
}

impl<T> Slot<T> {
    fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }
}

struct Inner<T> {
    slot: Slot<T>,
    error: Option<crate::Error>,
    resume: Option<Callback>,
    suspend: Option<Callback>,
}

struct State<T> {
    flavor: Flavor,
    inner: Mutex<Inner<T>>,
    awaited: Condvar,
}

pub struct Continuation<T> {
    state: Arc<State<T>>,
}

impl<T> Clone for Continuation<T> {
    fn clone(&self) -> Self {
        Self { state: self.state.clone() }
    }
}

impl<T: Send + 'static> Continuation<T> {
    fn with_flavor(flavor: Flavor) -> Self {
        Self {
            state: Arc::new(State {
                flavor,
                inner: Mutex::new(Inner {
                    slot: Slot::Empty,
                    error: None,
                    resume: None,
                    suspend: None,
                }),
                awaited: Condvar::new(),
            }),
        }
    }

    pub fn pointer() -> Self {
        Self::with_flavor(Flavor::Pointer)
    }

    pub fn copy() -> Self {
        Self::with_flavor(Flavor::Copy)
    }

    pub fn blocking() -> Self {
        Self::with_flavor(Flavor::Blocking)
    }

    pub fn flavor(&self) -> Flavor {
        self.state.flavor
    }

    /// True when a value or an error is already latched.
    ///
    /// Blocking continuations always report not-ready: their producer waits
    /// for the suspension, so the consumer must suspend unconditionally.
    pub fn await_ready(&self) -> bool {
        if self.state.flavor == Flavor::Blocking {
            return false;
        }
        let inner = self.state.inner.lock().unwrap();
        !inner.slot.is_empty() || inner.error.is_some()
    }

    /// Registers the resume callback and fires the producer-side
    /// `on_suspend` hook.
    pub fn await_suspend(&self, resume: impl FnOnce() + Send + 'static) {
        let hook = {
            let mut inner = self.state.inner.lock().unwrap();
            inner.resume = Some(Box::new(resume));
            inner.suspend.take()
        };
        if let Some(hook) = hook {
            hook();
        }
        self.state.awaited.notify_all();
    }

    /// Takes the latched result, clearing the slot.
    ///
    /// A latched error wins over a concurrently latched value. Panics when
    /// called again after the result has been consumed; a one-shot
    /// rendezvous has nothing more to deliver and waiting forever would
    /// hide the bug.
    pub fn await_resume(&self) -> crate::Result<T> {
        let mut inner = self.state.inner.lock().unwrap();
        if let Some(error) = inner.error.take() {
            return Err(error);
        }

        match mem::replace(&mut inner.slot, Slot::Empty) {
            Slot::Boxed(value) => Ok(*value),
            Slot::Inline(value) => Ok(value),
            Slot::Empty => panic!("continuation awaited after its result was consumed"),
        }
    }

    /// Installs the producer-side notification fired when a consumer
    /// suspends.
    pub fn on_suspend(&self, hook: impl FnOnce() + Send + 'static) {
        let mut inner = self.state.inner.lock().unwrap();
        inner.suspend = Some(Box::new(hook));
    }

    /// Producer path: latches `value` and resumes a suspended consumer.
    ///
    /// In the blocking flavor this parks until a consumer registers its
    /// resume.
    pub fn complete(&self, value: T) {
        let resume = {
            let mut inner = self.state.inner.lock().unwrap();
            if self.state.flavor == Flavor::Blocking {
                while inner.resume.is_none() {
                    inner = self.state.awaited.wait(inner).unwrap();
                }
            }
            inner.slot = match self.state.flavor {
                Flavor::Copy => Slot::Inline(value),
                Flavor::Pointer | Flavor::Blocking => Slot::Boxed(Box::new(value)),
            };
            inner.resume.take()
        };
        if let Some(resume) = resume {
            resume();
        }
    }

    /// Producer path for borrowed values (pointer flavor).
    ///
    /// The value is cloned into the slot; the caller's borrow may be
    /// released the moment this returns.
    pub fn complete_borrowed(&self, value: &T)
    where
        T: Clone,
    {
        let resume = {
            let mut inner = self.state.inner.lock().unwrap();
            inner.slot = Slot::Boxed(Box::new(value.clone()));
            inner.resume.take()
        };
        if let Some(resume) = resume {
            resume();
        }
    }

    /// Producer path for failures; the error is re-raised at
    /// [`Continuation::await_resume`].
    pub fn complete_error(&self, error: crate::Error) {
        let resume = {
            let mut inner = self.state.inner.lock().unwrap();
            if self.state.flavor == Flavor::Blocking {
                while inner.resume.is_none() {
                    inner = self.state.awaited.wait(inner).unwrap();
                }
            }
            inner.error = Some(error);
            inner.resume.take()
        };
        if let Some(resume) = resume {
            resume();
        }
    }

    pub fn has_error(&self) -> bool {
        self.state.inner.lock().unwrap().error.is_some()
    }
}

impl<T: Send + 'static> Future for Continuation<T> {
    type Output = crate::Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let hook = {
            let mut inner = self.state.inner.lock().unwrap();

            if let Some(error) = inner.error.take() {
                return Poll::Ready(Err(error));
            }
            match mem::replace(&mut inner.slot, Slot::Empty) {
                Slot::Boxed(value) => return Poll::Ready(Ok(*value)),
                Slot::Inline(value) => return Poll::Ready(Ok(value)),
                Slot::Empty => {}
            }

            let waker = cx.waker().clone();
            inner.resume = Some(Box::new(move || waker.wake()));
            inner.suspend.take()
        };
        if let Some(hook) = hook {
            hook();
        }
        self.state.awaited.notify_all();
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use futures::executor::block_on;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn value_latched_before_consumer_arrives() {
        let cont = Continuation::<usize>::copy();
        cont.complete(42);
        assert!(cont.await_ready());
        assert_eq!(block_on(cont.clone()).unwrap(), 42);
    }

    #[test]
    fn consumer_waits_for_producer_thread() {
        let cont = Continuation::<String>::copy();
        let producer = cont.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.complete("done".to_string());
        });
        assert_eq!(block_on(cont.clone()).unwrap(), "done");
    }

    #[test]
    fn error_wins_over_value() {
        let cont = Continuation::<usize>::copy();
        cont.complete(1);
        cont.complete_error(anyhow!("boom"));
        let err = block_on(cont.clone()).unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn resume_fires_exactly_once() {
        let cont = Continuation::<usize>::copy();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        cont.await_suspend(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        cont.complete(1);
        cont.complete(2);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[should_panic(expected = "awaited after its result was consumed")]
    fn second_await_after_consumption_panics() {
        let cont = Continuation::<usize>::copy();
        cont.complete(7);
        assert_eq!(cont.await_resume().unwrap(), 7);
        let _ = cont.await_resume();
    }

    #[test]
    fn pointer_flavor_copies_the_borrow() {
        let cont = Continuation::<Vec<u8>>::pointer();
        {
            let short_lived = vec![1, 2, 3];
            cont.complete_borrowed(&short_lived);
            // `short_lived` is dropped here; the continuation owns a copy.
        }
        assert_eq!(block_on(cont.clone()).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn on_suspend_hook_fires_when_consumer_suspends() {
        let cont = Continuation::<usize>::copy();
        let notified = Arc::new(AtomicUsize::new(0));
        let hook_target = notified.clone();
        cont.on_suspend(move || {
            hook_target.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(notified.load(Ordering::SeqCst), 0);
        cont.await_suspend(|| {});
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn blocking_producer_parks_until_consumer_suspends() {
        let cont = Continuation::<usize>::blocking();
        let producer = cont.clone();
        let completed = Arc::new(AtomicUsize::new(0));
        let flag = completed.clone();

        let handle = thread::spawn(move || {
            producer.complete(9);
            flag.store(1, Ordering::SeqCst);
        });

        // The producer must still be parked: nobody has suspended yet.
        thread::sleep(Duration::from_millis(30));
        assert_eq!(completed.load(Ordering::SeqCst), 0);

        assert_eq!(block_on(cont.clone()).unwrap(), 9);
        handle.join().unwrap();
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn blocking_flavor_never_reports_ready() {
        let cont = Continuation::<usize>::blocking();
        assert!(!cont.await_ready());
    }
}
