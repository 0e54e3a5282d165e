//! Strategies deciding which thread runs a subscriber's handler.
//!
//! Every strategy runs the handler inline when the caller already is on the
//! target thread, and only hands the work off when a thread boundary has to
//! be crossed.

use super::{DesignatedExecutor, WorkerPool};
use crate::subscriptions::Subscriber;
use crate::types::Envelope;
use std::sync::Arc;

/// Delivers one message to one subscriber.
///
/// Handler failures are never reported back. An inline handler's panic
/// unwinds into the caller; handed-off work is isolated by the executor
/// that runs it.
pub trait DeliveryStrategy: Send + Sync {
    fn deliver(&self, subscriber: Arc<dyn Subscriber>, message: Arc<Envelope>);
}

/// Runs the handler on the publisher's thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct Inline;

impl DeliveryStrategy for Inline {
    fn deliver(&self, subscriber: Arc<dyn Subscriber>, message: Arc<Envelope>) {
        subscriber.receive(&message);
    }
}

/// Runs the handler on a worker pool.
pub struct Pooled {
    pool: Arc<dyn WorkerPool>,
}

impl Pooled {
    pub fn new(pool: Arc<dyn WorkerPool>) -> Self {
        Self { pool }
    }
}

impl DeliveryStrategy for Pooled {
    fn deliver(&self, subscriber: Arc<dyn Subscriber>, message: Arc<Envelope>) {
        if self.pool.is_worker_thread() {
            subscriber.receive(&message);
        } else {
            self.pool
                .submit(Box::new(move || subscriber.receive(&message)));
        }
    }
}

/// Runs the handler on a single designated thread.
pub struct DesignatedThread {
    executor: Arc<dyn DesignatedExecutor>,
}

impl DesignatedThread {
    pub fn new(executor: Arc<dyn DesignatedExecutor>) -> Self {
        Self { executor }
    }
}

impl DeliveryStrategy for DesignatedThread {
    fn deliver(&self, subscriber: Arc<dyn Subscriber>, message: Arc<Envelope>) {
        if self.executor.is_designated_thread() {
            subscriber.receive(&message);
        } else {
            self.executor
                .enqueue(Box::new(move || subscriber.receive(&message)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::Job;
    use crate::types::MessageType;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug)]
    struct Ping;
    impl MessageType for Ping {}

    /// Queues jobs instead of running them; `on_target` fakes the thread check.
    #[derive(Default)]
    struct FakeExecutor {
        on_target: AtomicBool,
        queued: Mutex<Vec<Job>>,
    }

    impl FakeExecutor {
        fn run_queued(&self) {
            let jobs: Vec<Job> = std::mem::take(&mut *self.queued.lock());
            for job in jobs {
                job();
            }
        }
    }

    impl WorkerPool for FakeExecutor {
        fn is_worker_thread(&self) -> bool {
            self.on_target.load(Ordering::SeqCst)
        }

        fn submit(&self, job: Job) {
            self.queued.lock().push(job);
        }
    }

    impl DesignatedExecutor for FakeExecutor {
        fn is_designated_thread(&self) -> bool {
            self.on_target.load(Ordering::SeqCst)
        }

        fn enqueue(&self, job: Job) {
            self.queued.lock().push(job);
        }
    }

    fn counter() -> (Arc<dyn Subscriber>, Arc<Mutex<usize>>) {
        let count = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        let subscriber: Arc<dyn Subscriber> = Arc::new(move |_: &Arc<Envelope>| {
            *sink.lock() += 1;
        });
        (subscriber, count)
    }

    fn message() -> Arc<Envelope> {
        Arc::new(Envelope::new(Ping))
    }

    #[test]
    fn test_inline_runs_immediately() {
        let (subscriber, count) = counter();
        Inline.deliver(subscriber, message());
        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn test_pooled_hands_off_from_foreign_thread() {
        let executor = Arc::new(FakeExecutor::default());
        let strategy = Pooled::new(executor.clone());
        let (subscriber, count) = counter();

        strategy.deliver(subscriber, message());
        assert_eq!(*count.lock(), 0);
        assert_eq!(executor.queued.lock().len(), 1);

        executor.run_queued();
        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn test_pooled_runs_inline_on_worker() {
        let executor = Arc::new(FakeExecutor::default());
        executor.on_target.store(true, Ordering::SeqCst);
        let strategy = Pooled::new(executor.clone());
        let (subscriber, count) = counter();

        strategy.deliver(subscriber, message());
        assert_eq!(*count.lock(), 1);
        assert!(executor.queued.lock().is_empty());
    }

    #[test]
    fn test_designated_enqueues_from_foreign_thread() {
        let executor = Arc::new(FakeExecutor::default());
        let strategy = DesignatedThread::new(executor.clone());
        let (subscriber, count) = counter();

        strategy.deliver(Arc::clone(&subscriber), message());
        strategy.deliver(subscriber, message());
        assert_eq!(*count.lock(), 0);

        executor.run_queued();
        assert_eq!(*count.lock(), 2);
    }

    #[test]
    fn test_designated_runs_inline_on_designated_thread() {
        let executor = Arc::new(FakeExecutor::default());
        executor.on_target.store(true, Ordering::SeqCst);
        let strategy = DesignatedThread::new(executor.clone());
        let (subscriber, count) = counter();

        strategy.deliver(subscriber, message());
        assert_eq!(*count.lock(), 1);
    }
}
