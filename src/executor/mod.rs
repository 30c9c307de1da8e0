//! Task executors for the coroutine layer.
//!
//! [`ThreadPool`] is the parallel executor the serving coroutines run on;
//! [`Strand`] derives a serial sub-executor from it so per-connection work
//! never races. The reactor (tokio) only runs IO completion tasks; see
//! [`crate::reactor`].

mod task;

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::JoinHandle;

use futures::FutureExt;
use tracing::error;

use crate::coroutine::{Continuation, Returning};

pub(crate) use task::retarget_current;

pub type Runnable = Box<dyn FnOnce() + Send + 'static>;

/// A sink for closures. `post` runs the closure as soon as a worker is
/// free; `defer` additionally guarantees it never runs inline in the
/// caller's stack frame.
pub trait Executor: Send + Sync {
    fn post(&self, f: Runnable);
    fn defer(&self, f: Runnable);

    /// Join accounting for work that lives across suspensions.
    fn work_started(&self) {}
    fn work_finished(&self) {}
}

/// Spawns a returning coroutine on `executor` and hands back its return
/// continuation, which another coroutine may await.
pub fn spawn<R: Send + 'static>(executor: &Arc<dyn Executor>, coroutine: Returning<R>) -> Continuation<R> {
    let completion = coroutine.continuation();
    task::Task::spawn(executor, coroutine.into_driver().boxed());
    completion
}

struct PoolInner {
    queue: VecDeque<Runnable>,
    outstanding: usize,
    shutdown: bool,
}

struct PoolShared {
    inner: Mutex<PoolInner>,
    available: Condvar,
    idle: Condvar,
}

/// A fixed-size pool of OS worker threads pulling from one queue.
pub struct ThreadPool {
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    pub fn new(threads: usize) -> Arc<Self> {
        Self::with_name("webdonkey-pool", threads)
    }

    /// Worker threads are named `{name}-{index}`, which is how tests pin
    /// down where a hop landed.
    pub fn with_name(name: &str, threads: usize) -> Arc<Self> {
        let shared = Arc::new(PoolShared {
            inner: Mutex::new(PoolInner {
                queue: VecDeque::new(),
                outstanding: 0,
                shutdown: false,
            }),
            available: Condvar::new(),
            idle: Condvar::new(),
        });

        let workers = (0..threads.max(1))
            .map(|index| {
                let shared = shared.clone();
                std::thread::Builder::new()
                    .name(format!("{name}-{index}"))
                    .spawn(move || Self::work(shared))
                    .expect("failed to spawn pool worker")
            })
            .collect();

        Arc::new(Self { shared, workers: Mutex::new(workers) })
    }

    fn work(shared: Arc<PoolShared>) {
        loop {
            let job = {
                let mut inner = shared.inner.lock().unwrap();
                loop {
                    if let Some(job) = inner.queue.pop_front() {
                        break job;
                    }
                    if inner.shutdown {
                        return;
                    }
                    inner = shared.available.wait(inner).unwrap();
                }
            };

            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                error!("pool job panicked");
            }

            let mut inner = shared.inner.lock().unwrap();
            inner.outstanding -= 1;
            if inner.outstanding == 0 {
                shared.idle.notify_all();
            }
        }
    }

    /// Derives a serial sub-executor from this pool.
    pub fn strand(self: &Arc<Self>) -> Arc<Strand> {
        Strand::new(self.clone())
    }

    /// Blocks the caller until all scheduled work, queued closures and
    /// live coroutines alike, has finished, then shuts the workers down.
    /// Only meant for the top-level pool.
    pub fn join(&self) {
        {
            let mut inner = self.shared.inner.lock().unwrap();
            while inner.outstanding > 0 {
                inner = self.shared.idle.wait(inner).unwrap();
            }
            inner.shutdown = true;
        }
        self.shared.available.notify_all();

        let workers = std::mem::take(&mut *self.workers.lock().unwrap());
        for worker in workers {
            let _ = worker.join();
        }
    }
}

impl Executor for ThreadPool {
    fn post(&self, f: Runnable) {
        {
            let mut inner = self.shared.inner.lock().unwrap();
            inner.outstanding += 1;
            inner.queue.push_back(f);
        }
        self.shared.available.notify_one();
    }

    // Workers only ever pull from the queue, so post already never runs
    // inline; defer exists for API parity with executors where it matters.
    fn defer(&self, f: Runnable) {
        self.post(f)
    }

    fn work_started(&self) {
        self.shared.inner.lock().unwrap().outstanding += 1;
    }

    fn work_finished(&self) {
        let mut inner = self.shared.inner.lock().unwrap();
        inner.outstanding -= 1;
        if inner.outstanding == 0 {
            self.shared.idle.notify_all();
        }
    }
}

#[derive(Default)]
struct StrandState {
    queue: VecDeque<Runnable>,
    running: bool,
}

/// A serial executor: closures posted to the same strand run in post
/// order and never concurrently, on the parent pool's workers.
pub struct Strand {
    parent: Arc<dyn Executor>,
    state: Mutex<StrandState>,
    this: Weak<Strand>,
}

impl Strand {
    pub fn new(parent: Arc<dyn Executor>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            parent,
            state: Mutex::new(StrandState::default()),
            this: this.clone(),
        })
    }

    fn schedule(&self) {
        let Some(strand) = self.this.upgrade() else { return };
        self.parent.post(Box::new(move || strand.run_next()));
    }

    fn run_next(self: Arc<Self>) {
        let job = self.state.lock().unwrap().queue.pop_front();
        if let Some(job) = job {
            job();
        }

        let more = {
            let mut state = self.state.lock().unwrap();
            if state.queue.is_empty() {
                state.running = false;
                false
            } else {
                true
            }
        };
        if more {
            self.schedule();
        }
    }
}

impl Executor for Strand {
    fn post(&self, f: Runnable) {
        let start = {
            let mut state = self.state.lock().unwrap();
            state.queue.push_back(f);
            if state.running {
                false
            } else {
                state.running = true;
                true
            }
        };
        if start {
            self.schedule();
        }
    }

    fn defer(&self, f: Runnable) {
        self.post(f)
    }

    fn work_started(&self) {
        self.parent.work_started()
    }

    fn work_finished(&self) {
        self.parent.work_finished()
    }
}
