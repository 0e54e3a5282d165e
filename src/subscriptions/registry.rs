//! Subscription registry: message type to bucket of subscriptions.

use super::subscription::Subscription;
use super::types::SubscriptionToken;
use crate::types::TypeKey;
use parking_lot::Mutex;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

type Bucket = HashMap<SubscriptionToken, Arc<Subscription>>;

/// Subscriptions grouped by the exact type they were registered for, keyed
/// by token within a bucket.
///
/// All mutation and every matching snapshot run inside one critical
/// section. No subscriber code runs while the lock is held.
pub struct SubscriptionRegistry {
    buckets: Mutex<HashMap<TypeId, Bucket>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Add a subscription to the bucket for `message_type`.
    ///
    /// An existing entry with the same token is replaced, so re-subscribing
    /// never produces duplicate deliveries. Returns true if the replaced
    /// entry was still live.
    pub fn add(&self, message_type: TypeKey, subscription: Arc<Subscription>) -> bool {
        self.buckets
            .lock()
            .entry(message_type.type_id())
            .or_default()
            .insert(subscription.token(), subscription)
            .is_some_and(|replaced| replaced.is_alive())
    }

    /// Remove the subscription holding `token`. Returns true if one was found.
    pub fn remove(&self, message_type: TypeKey, token: SubscriptionToken) -> bool {
        let mut buckets = self.buckets.lock();
        let Some(bucket) = buckets.get_mut(&message_type.type_id()) else {
            return false;
        };

        let removed = bucket.remove(&token).is_some();
        if bucket.is_empty() {
            buckets.remove(&message_type.type_id());
        }
        removed
    }

    /// Live subscriptions matching a message of type `concrete`, sorted by
    /// priority, then registration order.
    ///
    /// Every live entry in the exact-type bucket matches. Entries in an
    /// ancestor's bucket match only if they accept child messages. Dead
    /// entries found along the way are purged.
    pub fn snapshot_matching(
        &self,
        concrete: TypeKey,
        ancestors: &[TypeKey],
    ) -> Vec<Arc<Subscription>> {
        let mut snapshot = Vec::new();
        let mut purged = 0;

        {
            let mut buckets = self.buckets.lock();
            purged += Self::collect(&mut buckets, concrete, false, &mut snapshot);
            for ancestor in ancestors {
                purged += Self::collect(&mut buckets, *ancestor, true, &mut snapshot);
            }
        }

        if purged > 0 {
            debug!(
                message_type = concrete.name(),
                purged, "Purged stale subscriptions"
            );
        }

        snapshot.sort();
        snapshot
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.buckets.lock().clear();
    }

    /// Number of non-empty buckets.
    pub fn len(&self) -> usize {
        self.buckets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.lock().is_empty()
    }

    /// Total subscriptions across all buckets, stale ones included.
    pub fn subscription_count(&self) -> usize {
        self.buckets.lock().values().map(HashMap::len).sum()
    }

    /// Scan one bucket. Returns the number of dead entries removed.
    fn collect(
        buckets: &mut HashMap<TypeId, Bucket>,
        message_type: TypeKey,
        by_ancestor: bool,
        out: &mut Vec<Arc<Subscription>>,
    ) -> usize {
        let Some(bucket) = buckets.get_mut(&message_type.type_id()) else {
            return 0;
        };

        let before = bucket.len();
        bucket.retain(|_, subscription| {
            if !subscription.is_alive() {
                return false;
            }
            if !by_ancestor || subscription.accepts_child_messages() {
                out.push(Arc::clone(subscription));
            }
            true
        });
        let purged = before - bucket.len();

        if bucket.is_empty() {
            buckets.remove(&message_type.type_id());
        }
        purged
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
