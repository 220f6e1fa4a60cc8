// ABOUTME: Group-scoped listener table with cached per-event load orders
// ABOUTME: Fires listeners sequentially, honoring skips and containing failures

use super::firing::EventFiring;
use super::order::{resolve_load_order, OrderNode};
use super::payload::EventPayload;
use crate::error::EventError;
use crate::metrics;
use crate::traits::EventSource;
use async_trait::async_trait;
use futures_util::FutureExt;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

/// A listener registered for one event under one group
#[async_trait]
pub trait EventListener: Send + Sync {
    async fn on_event(&self, firing: &mut EventFiring, payload: &EventPayload) -> anyhow::Result<()>;
}

/// Listener backed by a synchronous closure
pub struct FnListener<F>(F);

#[async_trait]
impl<F> EventListener for FnListener<F>
where
    F: Fn(&mut EventFiring, &EventPayload) -> anyhow::Result<()> + Send + Sync,
{
    async fn on_event(&self, firing: &mut EventFiring, payload: &EventPayload) -> anyhow::Result<()> {
        (self.0)(firing, payload)
    }
}

/// Wrap a closure as an [`EventListener`]
pub fn listener_fn<F>(f: F) -> Arc<dyn EventListener>
where
    F: Fn(&mut EventFiring, &EventPayload) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(FnListener(f))
}

/// Ordering constraints for a registration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventOrder {
    /// Groups that must run before this listener
    pub before: Vec<String>,
    /// Groups that must run after this listener
    pub after: Vec<String>,
}

impl EventOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before(mut self, group: impl Into<String>) -> Self {
        self.before.push(group.into());
        self
    }

    pub fn after(mut self, group: impl Into<String>) -> Self {
        self.after.push(group.into());
        self
    }
}

struct HandlerEntry {
    order: EventOrder,
    listener: Arc<dyn EventListener>,
}

#[derive(Default)]
struct State {
    /// group -> event -> handler, both in first-registration order
    groups: IndexMap<String, IndexMap<String, HandlerEntry>>,
    load_orders: HashMap<String, Arc<[String]>>,
    hooked: HashSet<String>,
}

impl State {
    fn compute(&self, event: &str) -> Result<Vec<String>, EventError> {
        let nodes: Vec<OrderNode<'_>> = self
            .groups
            .iter()
            .filter_map(|(group, events)| {
                events.get(event).map(|entry| OrderNode {
                    group: group.as_str(),
                    before: &entry.order.before,
                    after: &entry.order.after,
                })
            })
            .collect();
        resolve_load_order(event, &nodes)
    }

    fn refresh(&mut self, event: &str) {
        match self.compute(event) {
            Ok(order) => {
                self.load_orders.insert(event.to_string(), order.into());
            }
            Err(e) => {
                tracing::warn!(event, error = %e, "Could not recompute load order");
            }
        }
    }
}

struct Inner {
    state: RwLock<State>,
    source: Option<Arc<dyn EventSource>>,
}

/// Handle to the event registry; clones share the same table.
#[derive(Clone)]
pub struct EventRegistry {
    inner: Arc<Inner>,
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRegistry {
    /// Registry with no upstream source; events only arrive through `emit`.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Registry that subscribes to `source` the first time each event is registered.
    pub fn with_source(source: Arc<dyn EventSource>) -> Self {
        Self::build(Some(source))
    }

    fn build(source: Option<Arc<dyn EventSource>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(State::default()),
                source,
            }),
        }
    }

    /// Register `listener` for `event` under `group`, replacing any previous
    /// listener of that group for the same event.
    ///
    /// Fails without changing anything if the ordering constraints form a cycle.
    pub fn register(
        &self,
        group: &str,
        event: &str,
        listener: Arc<dyn EventListener>,
        order: EventOrder,
    ) -> Result<(), EventError> {
        let newly_hooked = {
            let mut state = self.inner.state.write();
            let created = !state.groups.contains_key(group);
            let previous = state
                .groups
                .entry(group.to_string())
                .or_default()
                .insert(event.to_string(), HandlerEntry { order, listener });

            match state.compute(event) {
                Ok(load_order) => {
                    state.load_orders.insert(event.to_string(), load_order.into());
                }
                Err(e) => {
                    if created {
                        state.groups.shift_remove(group);
                    } else if let Some(events) = state.groups.get_mut(group) {
                        match previous {
                            Some(entry) => {
                                events.insert(event.to_string(), entry);
                            }
                            None => {
                                events.shift_remove(event);
                            }
                        }
                    }
                    return Err(e);
                }
            }
            state.hooked.insert(event.to_string())
        };

        tracing::debug!(group, event, "Registered event listener");

        if newly_hooked {
            if let Some(source) = &self.inner.source {
                source.subscribe(event, self.sink(event));
            }
        }
        Ok(())
    }

    /// Remove one group's listener for `event`. Returns whether one existed.
    pub fn unregister(&self, group: &str, event: &str) -> bool {
        let mut state = self.inner.state.write();
        let removed = state
            .groups
            .get_mut(group)
            .and_then(|events| events.shift_remove(event))
            .is_some();
        if removed {
            state.refresh(event);
            tracing::debug!(group, event, "Unregistered event listener");
        }
        removed
    }

    /// Remove every listener of `group`. Only the load orders of events the
    /// group was registered for are recomputed.
    pub fn unregister_group(&self, group: &str) -> bool {
        let mut state = self.inner.state.write();
        let Some(events) = state.groups.shift_remove(group) else {
            return false;
        };
        for event in events.keys() {
            state.refresh(event);
        }
        tracing::debug!(group, events = events.len(), "Unregistered event group");
        true
    }

    /// Fire `event` without waiting; failures never reach the caller.
    pub fn emit(&self, event: &str, payload: EventPayload) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let registry = self.clone();
                let event = event.to_string();
                handle.spawn(async move {
                    registry.emit_async(&event, payload).await;
                });
            }
            Err(_) => {
                tracing::warn!(event, "No async runtime available, dropping event");
            }
        }
    }

    /// Fire `event` and wait for every listener to finish.
    ///
    /// Listeners run one at a time in load order. A failing or panicking
    /// listener is logged and the chain continues. Returns the firing so the
    /// caller can inspect what listeners left in it.
    pub async fn emit_async(&self, event: &str, payload: EventPayload) -> EventFiring {
        let load_order = self.cached_order(event);
        let mut firing = EventFiring::new(event);
        metrics::record_event_emitted(event);

        for group in load_order.iter() {
            if firing.is_skipped(group) {
                continue;
            }
            // Looked up per step so listeners removed mid-firing are not called
            let Some(listener) = self.listener(group, event) else {
                continue;
            };

            match AssertUnwindSafe(listener.on_event(&mut firing, &payload))
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(event, group = %group, error = %e, "Event listener failed");
                    metrics::record_listener_failure(event, group);
                }
                Err(panic) => {
                    tracing::error!(
                        event,
                        group = %group,
                        panic = %panic_message(&*panic),
                        "Event listener panicked"
                    );
                    metrics::record_listener_failure(event, group);
                }
            }
        }

        firing
    }

    /// Current load order for `event`
    pub fn load_order(&self, event: &str) -> Vec<String> {
        self.cached_order(event).to_vec()
    }

    /// Registered groups in registration order
    pub fn groups(&self) -> Vec<String> {
        self.inner.state.read().groups.keys().cloned().collect()
    }

    /// Events `group` has listeners for
    pub fn events_for(&self, group: &str) -> Vec<String> {
        self.inner
            .state
            .read()
            .groups
            .get(group)
            .map(|events| events.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_listener(&self, group: &str, event: &str) -> bool {
        self.inner
            .state
            .read()
            .groups
            .get(group)
            .is_some_and(|events| events.contains_key(event))
    }

    /// Handle that feeds occurrences of `event` into this registry
    pub fn sink(&self, event: &str) -> EventSink {
        EventSink {
            registry: Arc::downgrade(&self.inner),
            event: event.to_string(),
        }
    }

    fn cached_order(&self, event: &str) -> Arc<[String]> {
        if let Some(order) = self.inner.state.read().load_orders.get(event) {
            return order.clone();
        }
        let mut state = self.inner.state.write();
        state.refresh(event);
        state
            .load_orders
            .get(event)
            .cloned()
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    fn listener(&self, group: &str, event: &str) -> Option<Arc<dyn EventListener>> {
        self.inner
            .state
            .read()
            .groups
            .get(group)
            .and_then(|events| events.get(event))
            .map(|entry| entry.listener.clone())
    }
}

/// Upstream entry point for one event name.
///
/// Holds the registry weakly, so a dropped client stops accepting events.
#[derive(Clone)]
pub struct EventSink {
    registry: Weak<Inner>,
    event: String,
}

impl EventSink {
    pub fn event(&self) -> &str {
        &self.event
    }

    fn registry(&self) -> Option<EventRegistry> {
        self.registry.upgrade().map(|inner| EventRegistry { inner })
    }

    /// Fire-and-forget delivery
    pub fn emit(&self, payload: EventPayload) {
        if let Some(registry) = self.registry() {
            registry.emit(&self.event, payload);
        }
    }

    /// Deliver and wait for all listeners; `None` if the registry is gone
    pub async fn emit_async(&self, payload: EventPayload) -> Option<EventFiring> {
        let registry = self.registry()?;
        Some(registry.emit_async(&self.event, payload).await)
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
