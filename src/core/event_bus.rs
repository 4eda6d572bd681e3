//! Pub/Sub event bus for document change notifications.
//!
//! Architecture:
//! - Observers subscribe to event types with callbacks (immediate invocation)
//! - publish() invokes callbacks synchronously AND queues for deferred processing
//! - poll() returns queued events for batch processing in the host's main loop
//!
//! Callback order: FIFO (first-subscribed, first-called) within same event type.
//! Cross-type order undefined - don't rely on ordering between different event types.
//!
//! A panicking observer is isolated: the panic is caught, logged, and the
//! remaining observers for that event still run. Publishing happens after a
//! transaction has committed, so an observer failure can never corrupt the
//! document itself.
//!
//! Each document owns its own bus instance; there is no global bus.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, RwLock};

use log::{error, warn};

use crate::config::MAX_EVENT_QUEUE;

/// Marker trait for events. Events must be Send + Sync + 'static.
pub trait Event: Any + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

// Blanket impl for all qualifying types
impl<T: Any + Send + Sync + 'static> Event for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Type-erased callback
type Callback = Arc<dyn Fn(&dyn Any) + Send + Sync>;

/// Boxed event for queue storage
pub type BoxedEvent = Box<dyn Event>;

/// Handle returned by `subscribe`; pass to `unsubscribe` to detach.
///
/// A subscription is live exactly between `subscribe` and `unsubscribe`.
/// Collaborators tie this to their own scoped lifetime: subscribe on
/// creation, unsubscribe at teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Pub/Sub event bus with deferred processing support.
///
/// Two modes of operation:
/// 1. Immediate: subscribe() + publish() triggers callbacks instantly
/// 2. Deferred: publish() also queues events for poll() in the main loop
///
/// Both modes work together - callbacks fire immediately, and events
/// are also available for batch processing via poll().
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<RwLock<HashMap<TypeId, Vec<(SubscriptionId, Callback)>>>>,
    queue: Arc<Mutex<Vec<BoxedEvent>>>,
    next_id: Arc<Mutex<u64>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            queue: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(Mutex::new(0)),
        }
    }

    // ========== Pub/Sub (immediate) ==========

    /// Subscribe to events of type E. Returns a handle for `unsubscribe`.
    ///
    /// Callback is invoked synchronously on the publishing thread. Heavy
    /// work belongs in the host's poll() loop, not in the callback.
    pub fn subscribe<E, F>(&self, callback: F) -> SubscriptionId
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = {
            let mut next = self.next_id.lock().unwrap_or_else(|e| e.into_inner());
            *next += 1;
            SubscriptionId(*next)
        };
        let wrapped: Callback = Arc::new(move |any: &dyn Any| {
            if let Some(event) = any.downcast_ref::<E>() {
                callback(event);
            }
        });
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(TypeId::of::<E>())
            .or_default()
            .push((id, wrapped));
        id
    }

    /// Detach a subscription. Returns false if the handle was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        for list in subs.values_mut() {
            let before = list.len();
            list.retain(|(sid, _)| *sid != id);
            if list.len() != before {
                return true;
            }
        }
        false
    }

    /// Publish event: invoke callbacks immediately AND queue for deferred
    /// processing.
    ///
    /// Observers run in subscription order. A panicking observer is logged
    /// and skipped; the remaining observers still run.
    pub fn publish<E: Event + Clone>(&self, event: E) {
        let type_id = TypeId::of::<E>();

        // Snapshot callbacks so observers may subscribe/unsubscribe reentrantly.
        let callbacks: Vec<Callback> = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&type_id)
            .map(|list| list.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();

        for cb in callbacks {
            let result = catch_unwind(AssertUnwindSafe(|| cb(&event)));
            if result.is_err() {
                error!("observer panicked handling {}; continuing", event.type_name());
            }
        }

        // Queue for deferred processing with eviction
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() >= MAX_EVENT_QUEUE {
            let evict_count = queue.len() / 2;
            warn!(
                "EventBus queue full ({} events), evicting oldest {}",
                queue.len(),
                evict_count
            );
            queue.drain(0..evict_count);
        }
        queue.push(Box::new(event));
    }

    // ========== Deferred Processing ==========

    /// Poll all queued events for batch processing.
    ///
    /// Returns all events published since last poll. The host drains this at
    /// its own scheduling point, so observers that only need the batched view
    /// never see intermediate state.
    pub fn poll(&self) -> Vec<BoxedEvent> {
        std::mem::take(&mut *self.queue.lock().unwrap_or_else(|e| e.into_inner()))
    }

    // ========== Utilities ==========

    /// Check if there are subscribers for event type E
    pub fn has_subscribers<E: Event>(&self) -> bool {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&TypeId::of::<E>())
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    }

    /// Check queue length
    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field(
                "subscriber_types",
                &self.subscribers.read().map(|s| s.len()).unwrap_or(0),
            )
            .field("queue_len", &self.queue.lock().map(|q| q.len()).unwrap_or(0))
            .finish()
    }
}

/// Helper: downcast BoxedEvent to concrete type
///
/// IMPORTANT: Must explicitly deref to `dyn Event` before calling `as_any()`.
/// Without explicit deref, the blanket impl `Event for Box<dyn Event>` intercepts
/// the call and returns `&dyn Any` containing `Box<dyn Event>` instead of the
/// original type, causing downcast to always fail.
#[inline]
pub fn downcast_event<E: Event>(event: &BoxedEvent) -> Option<&E> {
    (**event).as_any().downcast_ref::<E>()
}
