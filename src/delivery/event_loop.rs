//! Single designated thread running queued work in FIFO order.

use super::{panic_message, DesignatedExecutor, Job};
use crate::error::{BusError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, error, warn};

/// A cooperative event loop bound to one thread.
///
/// Either spawned on its own thread with [`EventLoop::spawn`], or bound to
/// the calling thread with [`EventLoop::attach`], in which case that thread
/// drives it by calling [`EventLoop::run_pending`] (e.g. from a UI main
/// loop). Jobs run strictly in enqueue order.
pub struct EventLoop {
    thread: ThreadId,
    sender: Mutex<Option<Sender<Job>>>,
    receiver: Receiver<Job>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl EventLoop {
    /// Spawn a dedicated thread named `name` running the loop.
    pub fn spawn(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(BusError::InvalidArgument(
                "event loop thread name must not be empty".into(),
            ));
        }

        let (sender, receiver) = unbounded::<Job>();
        let loop_receiver = receiver.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Ok(job) = loop_receiver.recv() {
                    run_job(job);
                }
            })?;

        debug!(thread = name, "Started event loop");

        Ok(Self {
            thread: handle.thread().id(),
            sender: Mutex::new(Some(sender)),
            receiver,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Designate the calling thread. Nothing runs until that thread calls
    /// [`run_pending`](Self::run_pending).
    pub fn attach() -> Self {
        let (sender, receiver) = unbounded::<Job>();
        Self {
            thread: thread::current().id(),
            sender: Mutex::new(Some(sender)),
            receiver,
            handle: Mutex::new(None),
        }
    }

    /// Run every queued job. Returns how many ran.
    ///
    /// Only the designated thread may drain the queue; from any other
    /// thread this returns 0 without running anything.
    pub fn run_pending(&self) -> usize {
        if !self.is_designated_thread() {
            return 0;
        }

        let mut ran = 0;
        while let Ok(job) = self.receiver.try_recv() {
            run_job(job);
            ran += 1;
        }
        ran
    }

    /// Jobs waiting to run.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Stop accepting jobs. A spawned loop finishes its queue and is joined
    /// (unless called from the loop thread itself).
    pub fn shutdown(&self) {
        let Some(sender) = self.sender.lock().take() else {
            return;
        };
        drop(sender);

        if let Some(handle) = self.handle.lock().take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!("Event loop thread terminated abnormally");
            }
        }

        debug!("Event loop shut down");
    }
}

impl DesignatedExecutor for EventLoop {
    fn is_designated_thread(&self) -> bool {
        thread::current().id() == self.thread
    }

    fn enqueue(&self, job: Job) {
        match self.sender.lock().as_ref() {
            Some(sender) => {
                if sender.send(job).is_err() {
                    warn!("Event loop disconnected; job dropped");
                }
            }
            None => warn!("Event loop shut down; job dropped"),
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_job(job: Job) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(job)) {
        error!(
            thread = thread::current().name().unwrap_or("?"),
            panic = %panic_message(panic.as_ref()),
            "Subscriber panicked on designated thread"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_spawned_loop_runs_in_order_on_its_thread() {
        let event_loop = Arc::new(EventLoop::spawn("test-loop").unwrap());
        assert!(!event_loop.is_designated_thread());

        let (tx, rx) = unbounded();
        for i in 0..20 {
            let tx = tx.clone();
            let inner = Arc::clone(&event_loop);
            event_loop.enqueue(Box::new(move || {
                tx.send((i, inner.is_designated_thread())).unwrap();
            }));
        }

        let received: Vec<(i32, bool)> = (0..20)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        let expected: Vec<(i32, bool)> = (0..20).map(|i| (i, true)).collect();
        assert_eq!(received, expected);
    }

    #[test]
    fn test_attached_loop_runs_only_when_driven() {
        let event_loop = EventLoop::attach();
        assert!(event_loop.is_designated_thread());

        let (tx, rx) = unbounded();
        for i in 0..3 {
            let tx = tx.clone();
            event_loop.enqueue(Box::new(move || tx.send(i).unwrap()));
        }
        assert_eq!(event_loop.pending(), 3);
        assert!(rx.try_recv().is_err());

        assert_eq!(event_loop.run_pending(), 3);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_run_pending_refused_off_thread() {
        let event_loop = Arc::new(EventLoop::attach());
        event_loop.enqueue(Box::new(|| {}));

        let remote = Arc::clone(&event_loop);
        let ran = thread::spawn(move || remote.run_pending()).join().unwrap();
        assert_eq!(ran, 0);
        assert_eq!(event_loop.pending(), 1);
    }

    #[test]
    fn test_survives_panicking_job() {
        let event_loop = EventLoop::spawn("test-loop").unwrap();
        event_loop.enqueue(Box::new(|| panic!("boom")));

        let (tx, rx) = bounded(1);
        event_loop.enqueue(Box::new(move || tx.send(7).unwrap()));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
    }

    #[test]
    fn test_rejects_empty_name() {
        assert!(matches!(
            EventLoop::spawn(""),
            Err(BusError::InvalidArgument(_))
        ));
    }
}
