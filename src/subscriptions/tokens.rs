//! Subscription token issuing.

use super::types::{Subscriber, SubscriptionToken};
use crate::types::TypeKey;
use parking_lot::Mutex;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Mints new subscription tokens.
pub trait TokenGenerator: Send + Sync {
    fn generate(&self, message_type: TypeKey) -> SubscriptionToken;
}

/// Hands out increasing ids starting at 1.
pub struct SequentialTokenGenerator {
    next_id: AtomicU64,
}

impl SequentialTokenGenerator {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for SequentialTokenGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenGenerator for SequentialTokenGenerator {
    fn generate(&self, message_type: TypeKey) -> SubscriptionToken {
        SubscriptionToken::new(self.next_id.fetch_add(1, Ordering::SeqCst), message_type)
    }
}

struct Issued {
    subscriber: Weak<dyn Subscriber>,
    token: SubscriptionToken,
}

/// Keeps one token per (subscriber, message type) while the subscription is
/// outstanding.
///
/// Subscribers are tracked by identity and held weakly, so an issued token
/// never keeps its subscriber alive.
pub struct TokenIssuer {
    generator: Arc<dyn TokenGenerator>,
    issued: Mutex<HashMap<(usize, TypeId), Issued>>,
}

impl TokenIssuer {
    pub fn new(generator: Arc<dyn TokenGenerator>) -> Self {
        Self {
            generator,
            issued: Mutex::new(HashMap::new()),
        }
    }

    /// The outstanding token for this pair, or a freshly minted one.
    pub fn token_for(
        &self,
        subscriber: &Arc<dyn Subscriber>,
        message_type: TypeKey,
    ) -> SubscriptionToken {
        let key = (identity(subscriber), message_type.type_id());
        let mut issued = self.issued.lock();

        if let Some(existing) = issued.get(&key) {
            if existing.subscriber.strong_count() > 0 {
                return existing.token;
            }
        }

        // Entries of dropped subscribers are stale; their address may be
        // reused by a new allocation.
        issued.retain(|_, entry| entry.subscriber.strong_count() > 0);

        let token = self.generator.generate(message_type);
        issued.insert(
            key,
            Issued {
                subscriber: Arc::downgrade(subscriber),
                token,
            },
        );
        token
    }

    /// The outstanding token for this pair, without minting.
    pub fn find(
        &self,
        subscriber: &Arc<dyn Subscriber>,
        message_type: TypeKey,
    ) -> Option<SubscriptionToken> {
        let key = (identity(subscriber), message_type.type_id());
        self.issued
            .lock()
            .get(&key)
            .filter(|entry| entry.subscriber.strong_count() > 0)
            .map(|entry| entry.token)
    }

    /// Forget `token`. Returns true if it was outstanding.
    pub fn release(&self, token: SubscriptionToken) -> bool {
        let mut issued = self.issued.lock();
        let key = issued
            .iter()
            .find(|(_, entry)| entry.token == token)
            .map(|(key, _)| *key);

        key.and_then(|key| issued.remove(&key)).is_some()
    }

    pub fn clear(&self) {
        self.issued.lock().clear();
    }

    /// Number of outstanding tokens.
    pub fn len(&self) -> usize {
        self.issued.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.lock().is_empty()
    }
}

fn identity(subscriber: &Arc<dyn Subscriber>) -> usize {
    Arc::as_ptr(subscriber) as *const () as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Envelope, MessageType};

    struct Ping;
    impl MessageType for Ping {}

    struct Pong;
    impl MessageType for Pong {}

    fn noop() -> Arc<dyn Subscriber> {
        Arc::new(|_: &Arc<Envelope>| {})
    }

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(Arc::new(SequentialTokenGenerator::new()))
    }

    #[test]
    fn test_same_pair_reuses_token() {
        let issuer = issuer();
        let subscriber = noop();
        let ping = TypeKey::of::<Ping>();

        let first = issuer.token_for(&subscriber, ping);
        let second = issuer.token_for(&subscriber, ping);
        assert_eq!(first, second);
        assert_eq!(issuer.len(), 1);
    }

    #[test]
    fn test_distinct_pairs_get_distinct_tokens() {
        let issuer = issuer();
        let a = noop();
        let b = noop();

        let a_ping = issuer.token_for(&a, TypeKey::of::<Ping>());
        let a_pong = issuer.token_for(&a, TypeKey::of::<Pong>());
        let b_ping = issuer.token_for(&b, TypeKey::of::<Ping>());

        assert_ne!(a_ping, a_pong);
        assert_ne!(a_ping, b_ping);
        assert_eq!(a_pong.message_type(), TypeKey::of::<Pong>());
    }

    #[test]
    fn test_release_then_reissue() {
        let issuer = issuer();
        let subscriber = noop();
        let ping = TypeKey::of::<Ping>();

        let first = issuer.token_for(&subscriber, ping);
        assert!(issuer.release(first));
        assert!(!issuer.release(first));
        assert!(issuer.find(&subscriber, ping).is_none());

        let second = issuer.token_for(&subscriber, ping);
        assert_ne!(first, second);
    }

    #[test]
    fn test_does_not_keep_subscriber_alive() {
        let issuer = issuer();
        let subscriber = noop();
        let weak = Arc::downgrade(&subscriber);

        issuer.token_for(&subscriber, TypeKey::of::<Ping>());
        drop(subscriber);

        assert!(weak.upgrade().is_none());
    }
}
