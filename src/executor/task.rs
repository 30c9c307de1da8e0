use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::task::{waker_ref, ArcWake};
use tracing::error;

use super::Executor;

thread_local! {
    static CURRENT_TASK: RefCell<Option<Arc<Task>>> = const { RefCell::new(None) };
}

/// A coroutine scheduled on an [`Executor`].
///
/// The task re-posts itself to its current home executor on every wake;
/// `hop` moves a running task by swapping that home out from under it.
pub(crate) struct Task {
    future: Mutex<Option<BoxFuture<'static, ()>>>,
    home: Mutex<Arc<dyn Executor>>,
    /// The executor whose `join` accounting tracks this task. Fixed at
    /// spawn time even if the task later hops elsewhere.
    tracker: Arc<dyn Executor>,
    repoll: AtomicBool,
}

impl Task {
    pub(crate) fn spawn(executor: &Arc<dyn Executor>, future: BoxFuture<'static, ()>) {
        let task = Arc::new(Task {
            future: Mutex::new(Some(future)),
            home: Mutex::new(executor.clone()),
            tracker: executor.clone(),
            repoll: AtomicBool::new(false),
        });
        executor.work_started();
        let runnable = task.clone();
        executor.post(Box::new(move || runnable.run()));
    }

    pub(crate) fn retarget(&self, executor: Arc<dyn Executor>) {
        *self.home.lock().unwrap() = executor;
    }

    fn run(self: Arc<Self>) {
        let mut slot = match self.future.try_lock() {
            Ok(slot) => slot,
            Err(_) => {
                // Another worker is polling; it will reschedule when done.
                self.repoll.store(true, Ordering::SeqCst);
                return;
            }
        };
        let Some(future) = slot.as_mut() else { return };

        self.repoll.store(false, Ordering::SeqCst);
        let waker = waker_ref(&self);
        let mut cx = Context::from_waker(&waker);

        CURRENT_TASK.with(|current| *current.borrow_mut() = Some(self.clone()));
        let polled = catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx)));
        CURRENT_TASK.with(|current| *current.borrow_mut() = None);

        match polled {
            Ok(Poll::Ready(())) => {
                *slot = None;
                drop(slot);
                self.tracker.work_finished();
            }
            Ok(Poll::Pending) => {
                drop(slot);
                // A wake that raced with this poll was swallowed by the
                // try_lock above; reschedule through the waker so the task
                // lands on its current home, which may have changed.
                if self.repoll.swap(false, Ordering::SeqCst) {
                    ArcWake::wake_by_ref(&self);
                }
            }
            Err(_panic) => {
                *slot = None;
                drop(slot);
                self.tracker.work_finished();
                error!("task panicked; dropping it");
            }
        }
    }
}

impl ArcWake for Task {
    fn wake_by_ref(task: &Arc<Self>) {
        let home = task.home.lock().unwrap().clone();
        let runnable = task.clone();
        home.post(Box::new(move || runnable.run()));
    }
}

/// Moves the task currently being polled on this thread to `executor`.
///
/// Returns false when the caller is not running inside a pool task (e.g. a
/// test driving futures directly); the hop then degrades to a plain
/// suspend-and-resume.
pub(crate) fn retarget_current(executor: &Arc<dyn Executor>) -> bool {
    CURRENT_TASK.with(|current| match current.borrow().as_ref() {
        Some(task) => {
            task.retarget(executor.clone());
            true
        }
        None => false,
    })
}
