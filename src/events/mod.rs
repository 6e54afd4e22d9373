//! Typed events with cancellation, and the bus that dispatches them.
//!
//! Instrumented host methods construct an event object, hand it to
//! [`EventBus::publish`] and then branch on [`Event::is_allowed`] or read back
//! output fields the subscribers may have changed. Subscribers run
//! synchronously on the publishing thread, in registration order, each one
//! isolated from the faults of the others.
//!
//! # Key Components
//!
//! - [`EventBus`] - Per-type ordered subscriber lists with tombstone removal
//! - [`Event`] / [`Cancellable`] - The event contract and the veto flag
//! - [`Subscription`] - Handle for unsubscribing
//! - [`args`] - Payloads raised by instrumented host methods
//!
//! # Cancellation Convention
//!
//! The cancellation flag starts `true`. A handler that wants to veto calls
//! [`Cancellable::deny`]; handlers never set the flag back to `true` after
//! observing `false`. The flag itself is last-write-wins.

pub mod args;
mod bus;
mod event;

pub use args::{
    AddingTarget, GainingLevel, GeneratorId, ItemSerial, PlayerId, TogglingFlashlight,
    UnlockingGenerator,
};
pub use bus::{EventBus, Subscription};
pub use event::{Cancellable, Event};

pub(crate) use event::cancellable_event;
