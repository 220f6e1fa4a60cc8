// ABOUTME: Event registry: group-owned listeners fired in a computed, deterministic order
// ABOUTME: Re-exports the firing context, payloads, and ordering primitives

pub mod firing;
pub mod order;
pub mod payload;
pub mod registry;

pub use firing::EventFiring;
pub use order::{resolve_load_order, OrderNode};
pub use payload::{names, EventPayload};
pub use registry::{listener_fn, EventListener, EventOrder, EventRegistry, EventSink, FnListener};
