//! The typed, fault-isolating event bus.
//!
//! [`EventBus`] keeps one subscriber list per event type. Lists are
//! append-only [`boxcar::Vec`]s; unsubscribing sets a tombstone on the entry
//! instead of removing it, so a publication iterating a list is never
//! invalidated by a concurrent subscribe or unsubscribe. A publication reads
//! the list length once before it starts: handlers registered while it runs
//! (including by its own handlers) only see later publications.
//!
//! Every handler invocation is isolated. A handler returning an error or
//! panicking is logged with its name and the event name; the remaining
//! handlers still run and the publisher never sees the fault.
//!
//! # Examples
//!
//! ```rust
//! use hostpatch::events::{Cancellable, EventBus, GainingLevel, PlayerId};
//!
//! let bus = EventBus::new();
//! bus.subscribe_named("cap-level", |ev: &mut GainingLevel| {
//!     if ev.new_level() > 3 {
//!         ev.deny();
//!     }
//! });
//!
//! let mut ev = GainingLevel::new(PlayerId(1), 5);
//! assert!(!bus.publish(&mut ev));
//! ```

use std::{
    any::{Any, TypeId},
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use boxcar::Vec as BoxcarVec;
use dashmap::DashMap;

use crate::{events::event::Event, Result};

type HandlerFn<E> = dyn Fn(&mut E) -> Result<()> + Send + Sync;

struct HandlerEntry<E> {
    id: u64,
    name: Arc<str>,
    handler: Box<HandlerFn<E>>,
    removed: AtomicBool,
}

struct HandlerList<E> {
    entries: BoxcarVec<HandlerEntry<E>>,
}

trait ErasedList: Send + Sync {
    fn remove(&self, id: u64) -> bool;
    fn live_count(&self) -> usize;
    fn clear(&self);
    fn as_any(&self) -> &dyn Any;
}

impl<E: Event> ErasedList for HandlerList<E> {
    fn remove(&self, id: u64) -> bool {
        self.entries
            .iter()
            .find(|(_, entry)| entry.id == id)
            .is_some_and(|(_, entry)| !entry.removed.swap(true, Ordering::AcqRel))
    }

    fn live_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.removed.load(Ordering::Acquire))
            .count()
    }

    fn clear(&self) {
        for (_, entry) in self.entries.iter() {
            entry.removed.store(true, Ordering::Release);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Handle returned by the subscribe methods, used to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    event: TypeId,
    event_name: &'static str,
    id: u64,
}

impl Subscription {
    /// Name of the event type this subscription listens to.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        self.event_name
    }
}

/// Ordered publish/subscribe hub keyed by event type.
///
/// `EventBus` is `Send + Sync`; share it behind an [`Arc`].
#[derive(Default)]
pub struct EventBus {
    lists: DashMap<TypeId, Arc<dyn ErasedList>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `handler` to events of type `E`, naming it after its type.
    pub fn subscribe<E, F>(&self, handler: F) -> Subscription
    where
        E: Event,
        F: Fn(&mut E) + Send + Sync + 'static,
    {
        self.subscribe_named(std::any::type_name::<F>(), handler)
    }

    /// Subscribes `handler` under `name`, used when its faults are logged.
    pub fn subscribe_named<E, F>(&self, name: impl Into<Arc<str>>, handler: F) -> Subscription
    where
        E: Event,
        F: Fn(&mut E) + Send + Sync + 'static,
    {
        self.subscribe_fallible(name, move |event: &mut E| {
            handler(event);
            Ok(())
        })
    }

    /// Subscribes a handler that reports failures through its return value.
    pub fn subscribe_fallible<E, F>(&self, name: impl Into<Arc<str>>, handler: F) -> Subscription
    where
        E: Event,
        F: Fn(&mut E) -> Result<()> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let list = self.list::<E>();
        match list.as_any().downcast_ref::<HandlerList<E>>() {
            Some(list) => {
                list.entries.push(HandlerEntry {
                    id,
                    name: name.into(),
                    handler: Box::new(handler),
                    removed: AtomicBool::new(false),
                });
            }
            None => log::error!("subscriber list for {} has an unexpected type", E::NAME),
        }

        Subscription {
            event: TypeId::of::<E>(),
            event_name: E::NAME,
            id,
        }
    }

    /// Removes a subscription. Returns `false` if it was already removed.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let list = self
            .lists
            .get(&subscription.event)
            .map(|entry| Arc::clone(entry.value()));
        list.is_some_and(|list| list.remove(subscription.id))
    }

    /// Number of live subscribers for `E`.
    #[must_use]
    pub fn subscriber_count<E: Event>(&self) -> usize {
        self.lists
            .get(&TypeId::of::<E>())
            .map_or(0, |entry| entry.value().live_count())
    }

    /// Removes every subscriber for `E`.
    pub fn clear<E: Event>(&self) {
        let list = self
            .lists
            .get(&TypeId::of::<E>())
            .map(|entry| Arc::clone(entry.value()));
        if let Some(list) = list {
            list.clear();
        }
    }

    /// Invokes every live handler for `E` in subscription order and returns
    /// the event's final [`Event::is_allowed`].
    pub fn publish<E: Event>(&self, event: &mut E) -> bool {
        // Clone the list out so no map guard is held while handlers run
        let list = self
            .lists
            .get(&TypeId::of::<E>())
            .map(|entry| Arc::clone(entry.value()));

        let Some(list) = list else {
            return event.is_allowed();
        };
        let Some(list) = list.as_any().downcast_ref::<HandlerList<E>>() else {
            return event.is_allowed();
        };

        let len = list.entries.count();
        for index in 0..len {
            let Some(entry) = list.entries.get(index) else {
                continue;
            };
            if entry.removed.load(Ordering::Acquire) {
                continue;
            }
            invoke(entry, event);
        }

        event.is_allowed()
    }

    fn list<E: Event>(&self) -> Arc<dyn ErasedList> {
        let entry = self.lists.entry(TypeId::of::<E>()).or_insert_with(|| {
            let list: Arc<dyn ErasedList> = Arc::new(HandlerList::<E> {
                entries: BoxcarVec::new(),
            });
            list
        });
        Arc::clone(entry.value())
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("event_types", &self.lists.len())
            .finish_non_exhaustive()
    }
}

fn invoke<E: Event>(entry: &HandlerEntry<E>, event: &mut E) {
    match panic::catch_unwind(AssertUnwindSafe(|| (entry.handler)(event))) {
        Ok(Ok(())) => {}
        Ok(Err(error)) => {
            log::error!("handler '{}' failed on {}: {}", entry.name, E::NAME, error);
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            log::error!("handler '{}' panicked on {}: {}", entry.name, E::NAME, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        events::{
            args::{AddingTarget, GainingLevel, PlayerId},
            Cancellable,
        },
        Error,
    };

    fn level() -> GainingLevel {
        GainingLevel::new(PlayerId(7), 1)
    }

    #[test]
    fn test_order_and_mutation_visibility() {
        let bus = EventBus::new();
        bus.subscribe(|ev: &mut GainingLevel| ev.set_new_level(ev.new_level() * 10));
        bus.subscribe(|ev: &mut GainingLevel| {
            if ev.new_level() == 10 {
                ev.deny();
            }
        });

        let mut ev = level();
        assert!(!bus.publish(&mut ev));
        assert_eq!(ev.new_level(), 10);
    }

    #[test]
    fn test_faults_are_isolated() {
        let bus = EventBus::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&calls);
        bus.subscribe_named("first", move |_: &mut GainingLevel| seen.lock().unwrap().push(1));
        bus.subscribe_named("panics", |_: &mut GainingLevel| panic!("handler bug"));
        bus.subscribe_fallible("errors", |_: &mut GainingLevel| {
            Err(Error::Handler("refused".to_string()))
        });
        let seen = Arc::clone(&calls);
        bus.subscribe_named("last", move |_: &mut GainingLevel| seen.lock().unwrap().push(4));

        let mut ev = level();
        assert!(bus.publish(&mut ev));
        assert!(bus.publish(&mut ev));
        assert_eq!(*calls.lock().unwrap(), vec![1, 4, 1, 4]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let sub = bus.subscribe(|ev: &mut GainingLevel| ev.deny());
        assert_eq!(bus.subscriber_count::<GainingLevel>(), 1);
        assert_eq!(sub.event_name(), "GainingLevel");

        assert!(bus.unsubscribe(&sub));
        assert!(!bus.unsubscribe(&sub));
        assert_eq!(bus.subscriber_count::<GainingLevel>(), 0);
        assert!(bus.publish(&mut level()));
    }

    #[test]
    fn test_types_are_separate() {
        let bus = EventBus::new();
        bus.subscribe(|ev: &mut AddingTarget| ev.deny());
        assert!(bus.publish(&mut level()));
        assert!(!bus.publish(&mut AddingTarget::new(PlayerId(1), PlayerId(2), 3.0)));

        bus.clear::<AddingTarget>();
        assert_eq!(bus.subscriber_count::<AddingTarget>(), 0);
        assert!(bus.publish(&mut AddingTarget::new(PlayerId(1), PlayerId(2), 3.0)));
    }

    #[test]
    fn test_subscription_during_publish() {
        let bus = Arc::new(EventBus::new());
        let calls = Arc::new(Mutex::new(0));

        let inner_bus = Arc::clone(&bus);
        let inner_calls = Arc::clone(&calls);
        bus.subscribe(move |_: &mut GainingLevel| {
            let counter = Arc::clone(&inner_calls);
            inner_bus.subscribe(move |_: &mut GainingLevel| *counter.lock().unwrap() += 1);
        });

        bus.publish(&mut level());
        assert_eq!(*calls.lock().unwrap(), 0);
        bus.publish(&mut level());
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_bus_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EventBus>();
    }
}
