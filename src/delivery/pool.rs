//! Fixed-size worker pool backing background delivery.

use super::{panic_message, Job, WorkerPool};
use crate::error::{BusError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Id of the pool owning the current thread, 0 if none.
    static CURRENT_POOL: Cell<u64> = const { Cell::new(0) };
}

/// Worker threads draining a shared job queue.
///
/// A panicking job is caught and logged; the worker keeps running.
pub struct ThreadPool {
    id: u64,
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    /// Spawn `threads` workers named `{name}-{index}`.
    pub fn new(threads: usize, name: &str) -> Result<Self> {
        if threads == 0 {
            return Err(BusError::InvalidArgument(
                "worker pool needs at least one thread".into(),
            ));
        }
        if name.is_empty() {
            return Err(BusError::InvalidArgument(
                "worker thread name must not be empty".into(),
            ));
        }

        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = unbounded::<Job>();

        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || Self::work(id, receiver))?;
            workers.push(handle);
        }

        debug!(pool = id, threads, "Started worker pool");

        Ok(Self {
            id,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        })
    }

    /// Number of live worker threads.
    pub fn threads(&self) -> usize {
        self.workers.lock().len()
    }

    /// Stop accepting jobs, let the workers drain the queue, and join them.
    ///
    /// Called from one of the pool's own workers, that worker is not joined.
    pub fn shutdown(&self) {
        let Some(sender) = self.sender.lock().take() else {
            return;
        };
        drop(sender);

        let current = thread::current().id();
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                error!(pool = self.id, "Worker thread terminated abnormally");
            }
        }

        debug!(pool = self.id, "Worker pool shut down");
    }

    fn work(id: u64, receiver: Receiver<Job>) {
        CURRENT_POOL.with(|current| current.set(id));

        while let Ok(job) = receiver.recv() {
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(job)) {
                error!(
                    pool = id,
                    thread = thread::current().name().unwrap_or("?"),
                    panic = %panic_message(panic.as_ref()),
                    "Subscriber panicked during background delivery"
                );
            }
        }
    }
}

impl WorkerPool for ThreadPool {
    fn is_worker_thread(&self) -> bool {
        CURRENT_POOL.with(|current| current.get() == self.id)
    }

    fn submit(&self, job: Job) {
        match self.sender.lock().as_ref() {
            Some(sender) => {
                if sender.send(job).is_err() {
                    warn!(pool = self.id, "Worker pool disconnected; job dropped");
                }
            }
            None => warn!(pool = self.id, "Worker pool shut down; job dropped"),
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
