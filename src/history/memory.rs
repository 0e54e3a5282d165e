//! In-memory history store.

use super::HistoryStore;
use crate::hierarchy::TypeHierarchy;
use crate::types::{Envelope, MessageId, TypeKey};
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

struct Bucket {
    message_type: TypeKey,
    messages: BTreeMap<MessageId, Arc<Envelope>>,
}

/// Retained messages grouped by concrete type, guarded by a lock of its own.
pub struct InMemoryHistory {
    hierarchy: Arc<TypeHierarchy>,
    buckets: RwLock<HashMap<TypeId, Bucket>>,
}

impl InMemoryHistory {
    /// Create a store resolving subtypes through `hierarchy`.
    pub fn new(hierarchy: Arc<TypeHierarchy>) -> Self {
        Self {
            hierarchy,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// Number of concrete types with retained messages.
    pub fn type_count(&self) -> usize {
        self.buckets.read().len()
    }
}

impl HistoryStore for InMemoryHistory {
    fn store(&self, message: Arc<Envelope>) {
        let message_type = message.type_key();
        let mut buckets = self.buckets.write();
        let bucket = buckets
            .entry(message_type.type_id())
            .or_insert_with(|| Bucket {
                message_type,
                messages: BTreeMap::new(),
            });

        if bucket.messages.contains_key(&message.id()) {
            return;
        }
        debug!(
            message_type = message_type.name(),
            message = %message.id(),
            "Retained message"
        );
        bucket.messages.insert(message.id(), message);
    }

    fn remove(&self, message: &Envelope) -> bool {
        let type_id = message.type_key().type_id();
        let mut buckets = self.buckets.write();
        let Some(bucket) = buckets.get_mut(&type_id) else {
            return false;
        };

        let removed = bucket.messages.remove(&message.id()).is_some();
        if bucket.messages.is_empty() {
            buckets.remove(&type_id);
        }
        removed
    }

    fn remove_all(&self) {
        self.buckets.write().clear();
    }

    fn find(&self, contract: TypeKey, include_subtypes: bool) -> Vec<Arc<Envelope>> {
        let buckets = self.buckets.read();
        let mut found: Vec<Arc<Envelope>> = buckets
            .values()
            .filter(|bucket| {
                bucket.message_type == contract
                    || (include_subtypes
                        && self.hierarchy.is_subtype(bucket.message_type, contract))
            })
            .flat_map(|bucket| bucket.messages.values().cloned())
            .collect();

        found.sort_by_key(|message| message.id());
        found
    }

    fn size(&self) -> usize {
        self.buckets
            .read()
            .values()
            .map(|bucket| bucket.messages.len())
            .sum()
    }
}
