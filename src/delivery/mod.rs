//! Message delivery: strategies and the executors they hand work to.
//!
//! - [`Inline`]: run on the publisher's thread
//! - [`Pooled`]: run on a [`WorkerPool`] (default [`ThreadPool`])
//! - [`DesignatedThread`]: run on a [`DesignatedExecutor`] (default [`EventLoop`])
//!
//! The executor contracts are deliberately narrow so applications can plug
//! in their own UI dispatcher or pool.

mod event_loop;
mod pool;
mod strategy;

pub use event_loop::EventLoop;
pub use pool::ThreadPool;
pub use strategy::{DeliveryStrategy, DesignatedThread, Inline, Pooled};

use std::any::Any;

/// A unit of work handed to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Executor backing background delivery.
pub trait WorkerPool: Send + Sync {
    /// True if the calling thread is one of this pool's workers.
    fn is_worker_thread(&self) -> bool;

    fn submit(&self, job: Job);
}

/// Executor backing designated-thread delivery.
pub trait DesignatedExecutor: Send + Sync {
    /// True if the calling thread is the designated thread.
    fn is_designated_thread(&self) -> bool;

    /// Queue `job` to run on the designated thread after work already queued.
    fn enqueue(&self, job: Job);
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
