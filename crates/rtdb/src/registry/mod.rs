//! Subscription layer: fan-out of backend events to listener callbacks.
//!
//! # Modules
//!
//! - [`event`]: [`EventType`] enum.
//! - [`event_emitter`]: generic typed pub/sub ([`EventEmitter<T>`]), used
//!   for the error stream.
//! - [`subscriptions`]: [`SubscriptionRegistry`], the per-handle
//!   demultiplexer.

pub mod event;
pub mod event_emitter;
pub mod subscriptions;

pub use event::EventType;
pub use event_emitter::{EventEmitter, ListenerId};
pub use subscriptions::{
    callback, handle_key, Dispatch, EventCallback, HandlePhase, SubscriptionRegistry,
};
