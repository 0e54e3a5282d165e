//! Ownership of a subscriber by its subscription.

use super::types::Subscriber;
use std::sync::{Arc, Weak};

/// How a subscription holds its subscriber.
pub enum SubscriberReference {
    /// Keeps the subscriber alive until the subscription is removed.
    Strong(Arc<dyn Subscriber>),
    /// Dies with the last `Arc` held outside the bus.
    Weak(Weak<dyn Subscriber>),
}

impl SubscriberReference {
    pub fn new(subscriber: Arc<dyn Subscriber>, keep_alive: bool) -> Self {
        if keep_alive {
            SubscriberReference::Strong(subscriber)
        } else {
            SubscriberReference::Weak(Arc::downgrade(&subscriber))
        }
    }

    /// The subscriber, if it is still alive.
    pub fn get(&self) -> Option<Arc<dyn Subscriber>> {
        match self {
            SubscriberReference::Strong(subscriber) => Some(Arc::clone(subscriber)),
            SubscriberReference::Weak(subscriber) => subscriber.upgrade(),
        }
    }

    pub fn is_alive(&self) -> bool {
        match self {
            SubscriberReference::Strong(_) => true,
            SubscriberReference::Weak(subscriber) => subscriber.strong_count() > 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Envelope;

    fn noop() -> Arc<dyn Subscriber> {
        Arc::new(|_: &Arc<Envelope>| {})
    }

    #[test]
    fn test_strong_outlives_caller() {
        let reference = SubscriberReference::new(noop(), true);
        assert!(reference.is_alive());
        assert!(reference.get().is_some());
    }

    #[test]
    fn test_weak_dies_with_caller() {
        let subscriber = noop();
        let reference = SubscriberReference::new(Arc::clone(&subscriber), false);
        assert!(reference.is_alive());
        assert!(reference.get().is_some());

        drop(subscriber);
        assert!(!reference.is_alive());
        assert!(reference.get().is_none());
    }
}
