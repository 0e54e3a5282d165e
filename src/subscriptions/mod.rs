//! Subscriptions: who receives which messages, and how.
//!
//! - [`SubscriberReference`]: strong or weak ownership of a subscriber
//! - [`Subscription`]: token, priority, child acceptance and delivery strategy
//! - [`SubscriptionRegistry`]: per-type buckets with lazy purge of stale entries
//! - [`TokenIssuer`]: one stable token per (subscriber, message type)

mod reference;
mod registry;
mod subscription;
mod tokens;
mod types;

pub use reference::SubscriberReference;
pub use registry::SubscriptionRegistry;
pub use subscription::Subscription;
pub use tokens::{SequentialTokenGenerator, TokenGenerator, TokenIssuer};
pub use types::{DeliveryPolicy, SubscribeOptions, Subscriber, SubscriptionToken};
