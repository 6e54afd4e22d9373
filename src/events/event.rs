//! Event and cancellation traits.

use std::any::Any;

/// A value published through the [`crate::events::EventBus`].
///
/// Event objects carry immutable input fields, zero or more mutable output
/// fields and, for cancellable events, the cancellation flag. One object is
/// constructed per publication and never shared between publications.
pub trait Event: Any + Send {
    /// Name used in diagnostics, e.g. `"TogglingFlashlight"`.
    const NAME: &'static str;

    /// Whether the outcome of the event is still allowed.
    ///
    /// Non-cancellable events are always allowed.
    fn is_allowed(&self) -> bool {
        true
    }
}

/// An event whose subscribers may veto the outcome.
///
/// The flag starts `true`. Correct handlers only ever move it to `false`
/// through [`Cancellable::deny`]; [`Cancellable::set_allowed`] is the raw,
/// last-write-wins setter.
pub trait Cancellable: Event {
    /// Overwrites the cancellation flag.
    fn set_allowed(&mut self, allowed: bool);

    /// Vetoes the outcome.
    fn deny(&mut self) {
        self.set_allowed(false);
    }
}

/// Implements [`Event`] and [`Cancellable`] for a struct with an
/// `is_allowed: bool` field.
macro_rules! cancellable_event {
    ($ty:ty, $name:literal) => {
        impl $crate::events::Event for $ty {
            const NAME: &'static str = $name;

            fn is_allowed(&self) -> bool {
                self.is_allowed
            }
        }

        impl $crate::events::Cancellable for $ty {
            fn set_allowed(&mut self, allowed: bool) {
                self.is_allowed = allowed;
            }
        }
    };
}

pub(crate) use cancellable_event;
