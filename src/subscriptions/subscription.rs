//! A single registration of a subscriber for a message type.

use super::reference::SubscriberReference;
use super::types::SubscriptionToken;
use crate::delivery::DeliveryStrategy;
use crate::types::{Envelope, MessageId};
use parking_lot::Mutex;
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Binds a subscriber to a delivery strategy with a priority.
///
/// Ordered by priority, then by registration order.
pub struct Subscription {
    token: SubscriptionToken,
    reference: SubscriberReference,
    priority: i32,
    accepts_child_messages: bool,
    strategy: Arc<dyn DeliveryStrategy>,
    /// Registration order, breaks priority ties.
    sequence: u64,
    /// Set while historic messages are being replayed; live messages are
    /// parked in `pending` until the replay finishes.
    replaying: AtomicBool,
    pending: Mutex<Vec<Arc<Envelope>>>,
}

impl Subscription {
    pub fn new(
        token: SubscriptionToken,
        reference: SubscriberReference,
        priority: i32,
        accepts_child_messages: bool,
        strategy: Arc<dyn DeliveryStrategy>,
    ) -> Self {
        Self {
            token,
            reference,
            priority,
            accepts_child_messages,
            strategy,
            sequence: NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            replaying: AtomicBool::new(false),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Start in replay mode: live deliveries are buffered until
    /// [`replay`](Self::replay) completes.
    pub(crate) fn replaying(self) -> Self {
        self.replaying.store(true, Ordering::Release);
        self
    }

    pub fn token(&self) -> SubscriptionToken {
        self.token
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn accepts_child_messages(&self) -> bool {
        self.accepts_child_messages
    }

    pub fn is_alive(&self) -> bool {
        self.reference.is_alive()
    }

    /// Hand a live message to the delivery strategy. No-op for a dead
    /// subscriber.
    pub fn deliver(&self, message: &Arc<Envelope>) {
        if self.replaying.load(Ordering::Acquire) {
            let mut pending = self.pending.lock();
            if self.replaying.load(Ordering::Acquire) {
                pending.push(Arc::clone(message));
                return;
            }
        }
        self.dispatch(message);
    }

    /// Deliver retained messages synchronously on the calling thread, each
    /// as a historic view, then release live messages that arrived meanwhile.
    ///
    /// A live message that was also part of the replay is not delivered
    /// again.
    pub(crate) fn replay(&self, historic: &[Arc<Envelope>]) {
        let guard = ReplayGuard(self);
        let mut replayed: HashSet<MessageId> = HashSet::with_capacity(historic.len());

        if let Some(subscriber) = self.reference.get() {
            for message in historic {
                subscriber.receive(&message.with_historic(true));
                replayed.insert(message.id());
            }
        }

        loop {
            let batch = {
                let mut pending = self.pending.lock();
                if pending.is_empty() {
                    self.replaying.store(false, Ordering::Release);
                    break;
                }
                std::mem::take(&mut *pending)
            };

            for message in batch {
                if !replayed.contains(&message.id()) {
                    self.dispatch(&message);
                }
            }
        }

        drop(guard);
    }

    fn dispatch(&self, message: &Arc<Envelope>) {
        if let Some(subscriber) = self.reference.get() {
            self.strategy.deliver(subscriber, Arc::clone(message));
        }
    }
}

/// Leaves replay mode if the subscriber panics mid-replay, so the
/// subscription does not buffer forever.
struct ReplayGuard<'a>(&'a Subscription);

impl Drop for ReplayGuard<'_> {
    fn drop(&mut self) {
        if self.0.replaying.load(Ordering::Acquire) {
            let mut pending = self.0.pending.lock();
            pending.clear();
            self.0.replaying.store(false, Ordering::Release);
        }
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl Eq for Subscription {}

impl PartialOrd for Subscription {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Subscription {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then(self.sequence.cmp(&other.sequence))
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("token", &self.token)
            .field("priority", &self.priority)
            .field("accepts_child_messages", &self.accepts_child_messages)
            .field("alive", &self.is_alive())
            .finish()
    }
}
