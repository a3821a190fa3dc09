//! Event Bus - typed publish/subscribe dispatcher
//!
//! `publish` fans an event out to every handler subscribed to its topic,
//! runs them concurrently and waits for all of them. A failing (or
//! panicking) handler is logged and counted; it never affects its siblings
//! or the publisher. Delivery is in-memory only, with no retry.

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error};

use super::event::{Event, EventPayload, EventType};
use crate::error::Result;

/// Value a handler may hand back to a `publish_and_wait` caller
pub type HandlerOutput = Option<EventPayload>;

/// A bus subscriber
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    async fn handle(&self, event: Arc<Event>) -> Result<HandlerOutput>;
}

type HandlerFn = dyn Fn(Arc<Event>) -> BoxFuture<'static, Result<HandlerOutput>> + Send + Sync;

/// Adapts an async closure into an [`EventHandler`]
pub struct FnHandler {
    name: String,
    f: Box<HandlerFn>,
}

impl FnHandler {
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HandlerOutput>> + Send + 'static,
    {
        Self {
            name: name.into(),
            f: Box::new(move |event| f(event).boxed()),
        }
    }
}

#[async_trait]
impl EventHandler for FnHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: Arc<Event>) -> Result<HandlerOutput> {
        (self.f)(event).await
    }
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    handler: Arc<dyn EventHandler>,
}

/// Result of one `publish`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Bus counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusStats {
    pub events_published: u64,
    pub handler_invocations: u64,
    pub handler_failures: u64,
}

/// In-process event bus. Construct once and share by `Arc`.
pub struct EventBus {
    handlers: RwLock<HashMap<EventType, Vec<Subscription>>>,
    next_id: AtomicU64,
    events_published: AtomicU64,
    handler_invocations: AtomicU64,
    handler_failures: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            events_published: AtomicU64::new(0),
            handler_invocations: AtomicU64::new(0),
            handler_failures: AtomicU64::new(0),
        }
    }

    /// Register a handler for a topic. Several handlers per topic are allowed
    /// and their invocation order is unspecified.
    pub async fn subscribe(&self, topic: EventType, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!("Subscribing {} to {}", handler.name(), topic);
        self.handlers
            .write()
            .await
            .entry(topic)
            .or_default()
            .push(Subscription { id, handler });
        id
    }

    /// Register an async closure for a topic
    pub async fn subscribe_fn<F, Fut>(&self, topic: EventType, name: &str, f: F) -> SubscriptionId
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HandlerOutput>> + Send + 'static,
    {
        self.subscribe(topic, Arc::new(FnHandler::new(name, f))).await
    }

    pub async fn unsubscribe(&self, topic: EventType, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().await;
        match handlers.get_mut(&topic) {
            Some(subs) => {
                let before = subs.len();
                subs.retain(|s| s.id != id);
                before != subs.len()
            }
            None => false,
        }
    }

    /// Deliver to every handler of the event's topic and wait for all of them
    pub async fn publish(&self, event: Event) -> PublishReport {
        let outcomes = self.dispatch(event).await;
        let failed = outcomes.iter().filter(|o| o.is_err()).count();
        PublishReport {
            delivered: outcomes.len() - failed,
            failed,
        }
    }

    /// Like `publish`, returning the outputs of the handlers that succeeded
    pub async fn publish_and_wait(&self, event: Event) -> Vec<HandlerOutput> {
        self.dispatch(event)
            .await
            .into_iter()
            .filter_map(|o| o.ok())
            .collect()
    }

    async fn dispatch(&self, event: Event) -> Vec<std::result::Result<HandlerOutput, String>> {
        self.events_published.fetch_add(1, Ordering::Relaxed);
        let topic = event.event_type();

        // Snapshot so handlers may (un)subscribe while running
        let subs = self
            .handlers
            .read()
            .await
            .get(&topic)
            .cloned()
            .unwrap_or_default();

        if subs.is_empty() {
            debug!("No subscribers for {} from {}", topic, event.source);
            return Vec::new();
        }

        let event = Arc::new(event);
        self.handler_invocations
            .fetch_add(subs.len() as u64, Ordering::Relaxed);

        let calls = subs.into_iter().map(|sub| {
            let event = Arc::clone(&event);
            async move {
                let handler = sub.handler;
                let outcome = AssertUnwindSafe(handler.handle(event)).catch_unwind().await;
                match outcome {
                    Ok(Ok(output)) => Ok(output),
                    Ok(Err(e)) => {
                        error!("Handler {} failed on {}: {}", handler.name(), topic, e);
                        Err(e.to_string())
                    }
                    Err(_) => {
                        error!("Handler {} panicked on {}", handler.name(), topic);
                        Err(format!("handler {} panicked", handler.name()))
                    }
                }
            }
        });

        let outcomes = join_all(calls).await;
        let failures = outcomes.iter().filter(|o| o.is_err()).count() as u64;
        if failures > 0 {
            self.handler_failures.fetch_add(failures, Ordering::Relaxed);
        }
        outcomes
    }

    pub async fn subscriber_count(&self, topic: EventType) -> usize {
        self.handlers
            .read()
            .await
            .get(&topic)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    pub async fn subscriber_counts(&self) -> HashMap<EventType, usize> {
        self.handlers
            .read()
            .await
            .iter()
            .map(|(topic, subs)| (*topic, subs.len()))
            .collect()
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            events_published: self.events_published.load(Ordering::Relaxed),
            handler_invocations: self.handler_invocations.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
        }
    }

    /// Drop every subscription
    pub async fn clear(&self) {
        self.handlers.write().await.clear();
    }
}
