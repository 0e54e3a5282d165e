//! Subscription types: the subscriber contract, tokens and options.

use crate::delivery::DeliveryStrategy;
use crate::types::{Envelope, TypeKey};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Receives messages from the bus.
///
/// Implemented for every `Fn(&Arc<Envelope>)` closure that is
/// `Send + Sync + 'static`.
pub trait Subscriber: Send + Sync + 'static {
    fn receive(&self, message: &Arc<Envelope>);
}

impl<F> Subscriber for F
where
    F: Fn(&Arc<Envelope>) + Send + Sync + 'static,
{
    fn receive(&self, message: &Arc<Envelope>) {
        self(message)
    }
}

/// Identifies one subscription of one subscriber to one message type.
///
/// Equal iff the ids match.
#[derive(Clone, Copy)]
pub struct SubscriptionToken {
    id: u64,
    message_type: TypeKey,
}

impl SubscriptionToken {
    pub fn new(id: u64, message_type: TypeKey) -> Self {
        Self { id, message_type }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The message type this token was issued for.
    pub fn message_type(&self) -> TypeKey {
        self.message_type
    }
}

impl PartialEq for SubscriptionToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SubscriptionToken {}

impl Hash for SubscriptionToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionToken({}, {})", self.id, self.message_type)
    }
}

/// Which thread runs a subscriber's handler.
#[derive(Clone, Default)]
pub enum DeliveryPolicy {
    /// The publisher's thread.
    #[default]
    Publisher,
    /// A worker of the bus's thread pool.
    Background,
    /// The designated thread (e.g. a UI thread).
    Designated,
    /// A caller-supplied strategy.
    Custom(Arc<dyn DeliveryStrategy>),
}

impl fmt::Debug for DeliveryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryPolicy::Publisher => f.write_str("Publisher"),
            DeliveryPolicy::Background => f.write_str("Background"),
            DeliveryPolicy::Designated => f.write_str("Designated"),
            DeliveryPolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Options for a subscription.
#[derive(Clone, Debug)]
pub struct SubscribeOptions {
    /// Lower values are delivered first.
    /// Default: 0
    pub priority: i32,

    /// Also receive messages whose type is a subtype of the subscribed type.
    /// Default: true
    pub accepts_child_messages: bool,

    /// Replay retained messages before `subscribe` returns.
    /// Default: false
    pub receive_historic: bool,

    /// Default: [`DeliveryPolicy::Publisher`]
    pub delivery: DeliveryPolicy,

    /// Hold the subscriber strongly until unsubscribed. When false the bus
    /// only keeps a weak reference and the subscription goes stale once the
    /// caller drops its last `Arc`.
    /// Default: false
    pub keep_alive: bool,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            accepts_child_messages: true,
            receive_historic: false,
            delivery: DeliveryPolicy::Publisher,
            keep_alive: false,
        }
    }
}

impl SubscribeOptions {
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Only receive messages of exactly the subscribed type.
    pub fn exact_type_only(mut self) -> Self {
        self.accepts_child_messages = false;
        self
    }

    pub fn with_history(mut self) -> Self {
        self.receive_historic = true;
        self
    }

    pub fn with_delivery(mut self, delivery: DeliveryPolicy) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn keep_alive(mut self) -> Self {
        self.keep_alive = true;
        self
    }
}
