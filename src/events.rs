//! In-process publish/subscribe bus
//!
//! Topics are plain strings, one per player. `publish` never waits on a
//! subscriber: each handler runs as its own tokio task, so a slow or stuck
//! connection cannot delay the publisher or the other subscribers. Delivery
//! is best-effort; a topic with no handlers drops the event.

use crate::account::{Money, PlayerId};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex, MutexGuard, Weak},
};
use tracing::debug;

/// Process-unique subscription handle
pub type HandlerId = u64;

type Handler<E> = Arc<dyn Fn(E) -> BoxFuture<'static, ()> + Send + Sync>;

/// Committed balances of one player
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceEvent {
    pub wallet: Money,
    pub bet_balance: Money,
}

/// Topic carrying balance updates for a player
pub fn balance_topic(player: PlayerId) -> String {
    format!("BalanceUpdate_{}", player)
}

struct Registry<E> {
    listeners: HashMap<String, HashMap<HandlerId, Handler<E>>>,
    next_id: HandlerId,
}

/// Topic-keyed handler registry
pub struct EventBus<E> {
    registry: Mutex<Registry<E>>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            registry: Mutex::new(Registry {
                listeners: HashMap::new(),
                next_id: 0,
            }),
        }
    }
}

impl<E: Clone + Send + 'static> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry<E>> {
        // A panicking handler registration cannot leave the maps half-written
        self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a handler for `topic` and return its id
    pub fn subscribe<F, Fut>(&self, topic: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Handler<E> =
            Arc::new(move |event| -> BoxFuture<'static, ()> { Box::pin(handler(event)) });
        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .listeners
            .entry(topic.into())
            .or_default()
            .insert(id, handler);
        id
    }

    /// Remove a handler; unknown topics and ids are ignored
    pub fn unsubscribe(&self, topic: &str, id: HandlerId) {
        let mut registry = self.lock();
        if let Some(handlers) = registry.listeners.get_mut(topic) {
            handlers.remove(&id);
            if handlers.is_empty() {
                registry.listeners.remove(topic);
            }
        }
    }

    /// Dispatch `event` to every handler of `topic` and return how many
    /// were started. Must be called from within a tokio runtime.
    pub fn publish(&self, topic: &str, event: E) -> usize {
        let handlers: Vec<Handler<E>> = match self.lock().listeners.get(topic) {
            Some(handlers) => handlers.values().cloned().collect(),
            None => {
                debug!("No listeners for event: {}", topic);
                return 0;
            }
        };

        for handler in &handlers {
            tokio::spawn(handler(event.clone()));
        }
        handlers.len()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.lock().listeners.get(topic).map_or(0, HashMap::len)
    }

    pub fn topic_count(&self) -> usize {
        self.lock().listeners.len()
    }
}

impl<E: Clone + Send + 'static> EventBus<E> {
    /// Subscribe and tie the registration to the returned guard's lifetime
    pub fn subscribe_scoped<F, Fut>(
        self: &Arc<Self>,
        topic: impl Into<String>,
        handler: F,
    ) -> Subscription<E>
    where
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let topic = topic.into();
        let id = self.subscribe(topic.clone(), handler);
        Subscription {
            bus: Arc::downgrade(self),
            topic,
            id,
        }
    }
}

/// Unsubscribes on drop
pub struct Subscription<E: Clone + Send + 'static> {
    bus: Weak<EventBus<E>>,
    topic: String,
    id: HandlerId,
}

impl<E: Clone + Send + 'static> Subscription<E> {
    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl<E: Clone + Send + 'static> Drop for Subscription<E> {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(&self.topic, self.id);
        }
    }
}
