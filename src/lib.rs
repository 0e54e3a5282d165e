//! # Courier
//!
//! An in-process publish/subscribe message bus that decouples the parts of
//! an application which produce messages from the parts which react to them.
//!
//! ## Core Concepts
//!
//! - **Messages**: Any `MessageType`, wrapped in an `Envelope` with a unique id
//! - **Hierarchy**: Subscribing to a parent type also receives its subtypes
//! - **Delivery**: Publisher thread, worker pool, or a designated thread
//! - **History**: Retained messages replayed to late subscribers
//! - **Liveness**: Subscribers are held weakly unless kept alive
//!
//! ## Example
//!
//! ```ignore
//! use courier::{BusConfig, MessageBus, MessageType, PublishOptions, SubscribeOptions};
//!
//! #[derive(Debug)]
//! struct Login { user: String }
//! impl MessageType for Login {}
//!
//! let bus = MessageBus::new(BusConfig::default())?;
//!
//! let token = bus.subscribe_fn::<Login, _>(
//!     |message| println!("{:?}", message.downcast_ref::<Login>()),
//!     SubscribeOptions::default().with_history(),
//! )?;
//!
//! bus.publish(Login { user: "ada".into() }, PublishOptions::retained())?;
//! bus.unsubscribe(&token);
//! ```

pub mod bus;
pub mod delivery;
pub mod error;
pub mod hierarchy;
pub mod history;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use bus::{BusBuilder, BusConfig, MessageBus, PublishCallback, PublishOptions, PublishOutcome};
pub use delivery::{
    DeliveryStrategy, DesignatedExecutor, DesignatedThread, EventLoop, Inline, Job, Pooled,
    ThreadPool, WorkerPool,
};
pub use error::{BusError, Result};
pub use hierarchy::TypeHierarchy;
pub use history::{HistoryStore, InMemoryHistory};
pub use subscriptions::{
    DeliveryPolicy, SequentialTokenGenerator, SubscribeOptions, Subscriber, SubscriberReference,
    Subscription, SubscriptionToken, TokenGenerator,
};
pub use types::{Envelope, Message, MessageId, MessageType, TypeKey};
