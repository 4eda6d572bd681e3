//! Core infrastructure: event bus and event payload types.

pub mod event_bus;
pub mod events;

pub use event_bus::{BoxedEvent, Event, EventBus, SubscriptionId, downcast_event};
