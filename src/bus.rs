//! The message bus facade tying all components together.

use crate::delivery::{
    DeliveryStrategy, DesignatedExecutor, DesignatedThread, EventLoop, Inline, Pooled,
    ThreadPool, WorkerPool,
};
use crate::error::{BusError, Result};
use crate::hierarchy::TypeHierarchy;
use crate::history::{HistoryStore, InMemoryHistory};
use crate::subscriptions::{
    DeliveryPolicy, SequentialTokenGenerator, SubscribeOptions, Subscriber, SubscriberReference,
    Subscription, SubscriptionRegistry, SubscriptionToken, TokenGenerator, TokenIssuer,
};
use crate::types::{Envelope, Message, MessageType, TypeKey};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, trace};

/// Bus configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Worker threads for background delivery.
    /// Default: available parallelism
    pub worker_threads: usize,

    /// Worker threads are named `{worker_thread_name}-{index}`.
    pub worker_thread_name: String,

    /// Spawn a designated thread for designated-thread delivery.
    pub spawn_event_loop: bool,

    pub event_loop_thread_name: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            worker_threads: thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            worker_thread_name: "courier-worker".to_string(),
            spawn_event_loop: true,
            event_loop_thread_name: "courier-main".to_string(),
        }
    }
}

/// What a publish found, reported before any delivery happens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// No live subscription matched.
    NoSubscriber,
    /// At least one subscription matched and the message is on its way.
    Enqueued,
}

/// Lets the bus tell the publisher whether anyone is listening.
///
/// Implemented for every `Fn(PublishOutcome)`.
pub trait PublishCallback {
    fn no_subscriber(&self) {}

    fn message_enqueued(&self) {}
}

impl<F> PublishCallback for F
where
    F: Fn(PublishOutcome),
{
    fn no_subscriber(&self) {
        self(PublishOutcome::NoSubscriber)
    }

    fn message_enqueued(&self) {
        self(PublishOutcome::Enqueued)
    }
}

/// Options for a single publish.
#[derive(Clone, Copy, Default)]
pub struct PublishOptions<'a> {
    /// Retain the message for subscribers that ask for history.
    pub keep_in_history: bool,

    pub callback: Option<&'a dyn PublishCallback>,
}

impl<'a> PublishOptions<'a> {
    /// Keep the message in history.
    pub fn retained() -> Self {
        Self {
            keep_in_history: true,
            callback: None,
        }
    }

    pub fn with_callback(mut self, callback: &'a dyn PublishCallback) -> Self {
        self.callback = Some(callback);
        self
    }
}

/// Assembles a bus from caller-supplied collaborators.
///
/// Without a worker pool or designated executor, subscriptions asking for
/// those policies are rejected.
#[derive(Default)]
pub struct BusBuilder {
    pool: Option<Arc<dyn WorkerPool>>,
    executor: Option<Arc<dyn DesignatedExecutor>>,
    history: Option<Arc<dyn HistoryStore>>,
    tokens: Option<Arc<dyn TokenGenerator>>,
    hierarchy: Option<Arc<TypeHierarchy>>,
}

impl BusBuilder {
    pub fn worker_pool(mut self, pool: Arc<dyn WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn designated_executor(mut self, executor: Arc<dyn DesignatedExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn token_generator(mut self, tokens: Arc<dyn TokenGenerator>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Share a hierarchy cache, e.g. with a custom history store.
    pub fn hierarchy(mut self, hierarchy: Arc<TypeHierarchy>) -> Self {
        self.hierarchy = Some(hierarchy);
        self
    }

    pub fn build(self) -> MessageBus {
        let hierarchy = self.hierarchy.unwrap_or_default();
        let history = self
            .history
            .unwrap_or_else(|| Arc::new(InMemoryHistory::new(Arc::clone(&hierarchy))));
        let tokens = self
            .tokens
            .unwrap_or_else(|| Arc::new(SequentialTokenGenerator::new()));

        MessageBus {
            registry: SubscriptionRegistry::new(),
            hierarchy,
            history,
            tokens: TokenIssuer::new(tokens),
            inline: Arc::new(Inline),
            pooled: self
                .pool
                .map(|pool| Arc::new(Pooled::new(pool)) as Arc<dyn DeliveryStrategy>),
            designated: self.executor.map(|executor| {
                Arc::new(DesignatedThread::new(executor)) as Arc<dyn DeliveryStrategy>
            }),
            owned_pool: None,
            owned_loop: None,
            closed: AtomicBool::new(false),
        }
    }
}

/// In-process publish/subscribe message bus.
///
/// Provides:
/// - Typed subscriptions with priorities and subtype matching
/// - Delivery on the publisher's thread, a worker pool, or a designated thread
/// - Retained messages replayed to late subscribers
/// - Weak subscriptions that go stale when the subscriber is dropped
pub struct MessageBus {
    registry: SubscriptionRegistry,
    hierarchy: Arc<TypeHierarchy>,
    history: Arc<dyn HistoryStore>,
    tokens: TokenIssuer,

    inline: Arc<dyn DeliveryStrategy>,
    pooled: Option<Arc<dyn DeliveryStrategy>>,
    designated: Option<Arc<dyn DeliveryStrategy>>,

    /// Executors created by [`MessageBus::new`], shut down with the bus.
    owned_pool: Option<Arc<ThreadPool>>,
    owned_loop: Option<Arc<EventLoop>>,

    closed: AtomicBool,
}

impl MessageBus {
    /// Create a bus owning its worker pool and event loop.
    pub fn new(config: BusConfig) -> Result<Self> {
        let pool = Arc::new(ThreadPool::new(
            config.worker_threads,
            &config.worker_thread_name,
        )?);

        let mut builder = BusBuilder::default().worker_pool(pool.clone());
        let event_loop = if config.spawn_event_loop {
            let event_loop = Arc::new(EventLoop::spawn(&config.event_loop_thread_name)?);
            builder = builder.designated_executor(event_loop.clone());
            Some(event_loop)
        } else {
            None
        };

        let mut bus = builder.build();
        bus.owned_pool = Some(pool);
        bus.owned_loop = event_loop;
        Ok(bus)
    }

    pub fn builder() -> BusBuilder {
        BusBuilder::default()
    }

    // --- Subscriptions ---

    /// Subscribe to messages of type `M`.
    ///
    /// Subscribing the same subscriber to the same type again returns the
    /// same token and replaces the earlier options. With
    /// [`SubscribeOptions::receive_historic`], retained messages are delivered
    /// on the calling thread before this returns, unless the subscriber was
    /// already subscribed and so has seen them live.
    pub fn subscribe<M: ?Sized + MessageType>(
        &self,
        subscriber: Arc<dyn Subscriber>,
        options: SubscribeOptions,
    ) -> Result<SubscriptionToken> {
        self.subscribe_to(TypeKey::of::<M>(), subscriber, options)
    }

    /// Subscribe a closure to messages of type `M`.
    ///
    /// The bus owns the closure, so the subscription is always kept alive
    /// until unsubscribed.
    pub fn subscribe_fn<M, F>(
        &self,
        handler: F,
        options: SubscribeOptions,
    ) -> Result<SubscriptionToken>
    where
        M: ?Sized + MessageType,
        F: Fn(&Arc<Envelope>) + Send + Sync + 'static,
    {
        let options = SubscribeOptions {
            keep_alive: true,
            ..options
        };
        self.subscribe_to(TypeKey::of::<M>(), Arc::new(handler), options)
    }

    /// Subscribe to an explicitly given message type.
    pub fn subscribe_to(
        &self,
        message_type: TypeKey,
        subscriber: Arc<dyn Subscriber>,
        options: SubscribeOptions,
    ) -> Result<SubscriptionToken> {
        self.ensure_open()?;
        let strategy = self.strategy_for(&options.delivery)?;
        let token = self.tokens.token_for(&subscriber, message_type);

        let mut subscription = Subscription::new(
            token,
            SubscriberReference::new(Arc::clone(&subscriber), options.keep_alive),
            options.priority,
            options.accepts_child_messages,
            strategy,
        );
        if options.receive_historic {
            subscription = subscription.replaying();
        }
        let subscription = Arc::new(subscription);

        let resubscribed = self.registry.add(message_type, Arc::clone(&subscription));
        debug!(
            message_type = message_type.name(),
            token = token.id(),
            priority = options.priority,
            delivery = ?options.delivery,
            resubscribed,
            "Subscribed"
        );

        if options.receive_historic {
            // The replay still runs when empty, to release buffered live
            // messages.
            let historic = if resubscribed {
                Vec::new()
            } else {
                self.history
                    .find(message_type, options.accepts_child_messages)
            };
            debug!(
                message_type = message_type.name(),
                token = token.id(),
                count = historic.len(),
                "Replaying history"
            );
            subscription.replay(&historic);
        }

        Ok(token)
    }

    /// Cancel a subscription. Returns true if it was active.
    ///
    /// Deliveries already handed to another thread still run.
    pub fn unsubscribe(&self, token: &SubscriptionToken) -> bool {
        let removed = self.registry.remove(token.message_type(), *token);
        self.tokens.release(*token);
        if removed {
            debug!(
                message_type = token.message_type().name(),
                token = token.id(),
                "Unsubscribed"
            );
        }
        removed
    }

    /// Cancel `subscriber`'s subscription to `M`, if any.
    pub fn unsubscribe_subscriber<M: ?Sized + MessageType>(
        &self,
        subscriber: Arc<dyn Subscriber>,
    ) -> bool {
        match self.tokens.find(&subscriber, TypeKey::of::<M>()) {
            Some(token) => self.unsubscribe(&token),
            None => false,
        }
    }

    // --- Publishing ---

    /// Publish a message.
    pub fn publish<M: Message>(
        &self,
        message: M,
        options: PublishOptions<'_>,
    ) -> Result<PublishOutcome> {
        self.publish_envelope(Arc::new(Envelope::new(message)), options)
    }

    /// Publish an already wrapped message.
    ///
    /// Subscribers run in ascending priority. Inline subscribers have run
    /// by the time this returns; others may still be pending. A panic in an
    /// inline subscriber propagates to the caller.
    ///
    /// A historic copy received during replay is published as a live message.
    pub fn publish_envelope(
        &self,
        message: Arc<Envelope>,
        options: PublishOptions<'_>,
    ) -> Result<PublishOutcome> {
        self.ensure_open()?;
        let message = if message.is_historic() {
            message.with_historic(false)
        } else {
            message
        };

        let concrete = message.type_key();
        let ancestors = self.hierarchy.ancestors_of(concrete);
        let snapshot = self.registry.snapshot_matching(concrete, &ancestors);

        let outcome = if snapshot.is_empty() {
            PublishOutcome::NoSubscriber
        } else {
            PublishOutcome::Enqueued
        };
        if let Some(callback) = options.callback {
            match outcome {
                PublishOutcome::NoSubscriber => callback.no_subscriber(),
                PublishOutcome::Enqueued => callback.message_enqueued(),
            }
        }

        trace!(
            message_type = concrete.name(),
            message = %message.id(),
            subscribers = snapshot.len(),
            "Dispatching message"
        );
        for subscription in &snapshot {
            subscription.deliver(&message);
        }

        if options.keep_in_history {
            self.history.store(message);
        }
        Ok(outcome)
    }

    // --- History ---

    /// Drop a retained message. Returns true if it was retained.
    pub fn remove_from_history(&self, message: &Envelope) -> bool {
        self.history.remove(message)
    }

    pub fn clear_history(&self) {
        self.history.remove_all();
    }

    /// Number of retained messages.
    pub fn history_count(&self) -> usize {
        self.history.size()
    }

    /// Retained messages of type `M` (and its subtypes if asked), in publish
    /// order.
    pub fn retained<M: ?Sized + MessageType>(
        &self,
        include_subtypes: bool,
    ) -> Vec<Arc<Envelope>> {
        self.history.find(TypeKey::of::<M>(), include_subtypes)
    }

    // --- Lifecycle & diagnostics ---

    /// Resolve `M`'s ancestors now rather than on its first publish.
    pub fn register<M: ?Sized + MessageType>(&self) {
        self.hierarchy.ancestors_of(TypeKey::of::<M>());
    }

    /// Close the bus: drop all subscriptions and stop the executors it owns.
    ///
    /// Later subscribe and publish calls fail with [`BusError::ShutDown`].
    /// Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.registry.clear();
        self.tokens.clear();
        if let Some(pool) = &self.owned_pool {
            pool.shutdown();
        }
        if let Some(event_loop) = &self.owned_loop {
            event_loop.shutdown();
        }
        debug!("Message bus shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Subscriptions currently registered, stale ones included until the
    /// next publish of their type purges them.
    pub fn subscription_count(&self) -> usize {
        self.registry.subscription_count()
    }

    pub fn hierarchy(&self) -> &Arc<TypeHierarchy> {
        &self.hierarchy
    }

    /// The event loop created by [`MessageBus::new`], if any.
    pub fn event_loop(&self) -> Option<&Arc<EventLoop>> {
        self.owned_loop.as_ref()
    }

    /// The worker pool created by [`MessageBus::new`], if any.
    pub fn worker_pool(&self) -> Option<&Arc<ThreadPool>> {
        self.owned_pool.as_ref()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_shut_down() {
            Err(BusError::ShutDown)
        } else {
            Ok(())
        }
    }

    fn strategy_for(&self, policy: &DeliveryPolicy) -> Result<Arc<dyn DeliveryStrategy>> {
        match policy {
            DeliveryPolicy::Publisher => Ok(Arc::clone(&self.inline)),
            DeliveryPolicy::Background => self.pooled.clone().ok_or(BusError::NoWorkerPool),
            DeliveryPolicy::Designated => self
                .designated
                .clone()
                .ok_or(BusError::NoDesignatedExecutor),
            DeliveryPolicy::Custom(strategy) => Ok(Arc::clone(strategy)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug)]
    struct Ping(u32);
    impl MessageType for Ping {}

    fn inline_bus() -> MessageBus {
        MessageBus::builder().build()
    }

    #[test]
    fn test_default_config() {
        let config = BusConfig::default();
        assert!(config.worker_threads >= 1);
        assert!(config.spawn_event_loop);
        assert_eq!(config.worker_thread_name, "courier-worker");
    }

    #[test]
    fn test_callback_reports_outcome() {
        let bus = inline_bus();
        let outcomes = Mutex::new(Vec::new());
        let callback = |outcome: PublishOutcome| outcomes.lock().push(outcome);

        bus.publish(Ping(1), PublishOptions::default().with_callback(&callback))
            .unwrap();

        let _token = bus
            .subscribe_fn::<Ping, _>(|_| {}, SubscribeOptions::default())
            .unwrap();
        bus.publish(Ping(2), PublishOptions::default().with_callback(&callback))
            .unwrap();

        assert_eq!(
            *outcomes.lock(),
            vec![PublishOutcome::NoSubscriber, PublishOutcome::Enqueued]
        );
    }

    #[test]
    fn test_missing_executors_are_rejected() {
        let bus = inline_bus();
        let background = SubscribeOptions::default().with_delivery(DeliveryPolicy::Background);
        let designated = SubscribeOptions::default().with_delivery(DeliveryPolicy::Designated);

        assert!(matches!(
            bus.subscribe_fn::<Ping, _>(|_| {}, background),
            Err(BusError::NoWorkerPool)
        ));
        assert!(matches!(
            bus.subscribe_fn::<Ping, _>(|_| {}, designated),
            Err(BusError::NoDesignatedExecutor)
        ));
        assert_eq!(bus.subscription_count(), 0);
    }

    #[test]
    fn test_register_warms_hierarchy() {
        let bus = inline_bus();
        bus.register::<Ping>();
        assert_eq!(bus.hierarchy().cached_types(), 1);
    }

    #[test]
    fn test_shutdown_closes_bus() {
        let bus = MessageBus::new(BusConfig {
            worker_threads: 1,
            ..Default::default()
        })
        .unwrap();
        bus.subscribe_fn::<Ping, _>(|_| {}, SubscribeOptions::default())
            .unwrap();

        bus.shutdown();
        bus.shutdown();

        assert!(bus.is_shut_down());
        assert_eq!(bus.subscription_count(), 0);
        assert!(matches!(
            bus.publish(Ping(1), PublishOptions::default()),
            Err(BusError::ShutDown)
        ));
        assert!(matches!(
            bus.subscribe_fn::<Ping, _>(|_| {}, SubscribeOptions::default()),
            Err(BusError::ShutDown)
        ));
        assert_eq!(bus.worker_pool().unwrap().threads(), 0);
    }
}
