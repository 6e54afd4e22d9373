//! Cooperative tick scheduler.
//!
//! Routines are resumed once per [`Scheduler::tick`] in spawn order. A
//! routine either yields, to be resumed on the next tick, or reports that it
//! is done and is dropped. Nothing here blocks or spawns threads.

use std::{fmt, sync::Arc};

use crate::{
    events::EventBus,
    round::{host::RoundHost, machine::RoundLifecycle},
};

/// Outcome of resuming a routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Resume again next tick.
    Yield,
    /// Finished; drop the routine.
    Done,
}

/// A resumable unit of work.
pub trait Routine {
    /// Runs until the next yield point.
    fn resume(&mut self) -> Step;
}

impl<F: FnMut() -> Step> Routine for F {
    fn resume(&mut self) -> Step {
        self()
    }
}

type OwnerAlive = Box<dyn Fn() -> bool>;

struct Scheduled {
    name: String,
    routine: Box<dyn Routine>,
    owner: Option<OwnerAlive>,
}

/// Owns named routines and resumes them once per tick.
#[derive(Default)]
pub struct Scheduler {
    routines: Vec<Scheduled>,
}

impl Scheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a routine that runs until it reports [`Step::Done`].
    pub fn spawn(&mut self, name: impl Into<String>, routine: impl Routine + 'static) {
        self.push(name.into(), Box::new(routine), None);
    }

    /// Adds a routine that is also dropped, without being resumed, as soon
    /// as `owner_alive` returns `false`.
    pub fn spawn_cancel_with(
        &mut self,
        name: impl Into<String>,
        routine: impl Routine + 'static,
        owner_alive: impl Fn() -> bool + 'static,
    ) {
        self.push(name.into(), Box::new(routine), Some(Box::new(owner_alive)));
    }

    fn push(&mut self, name: String, routine: Box<dyn Routine>, owner: Option<OwnerAlive>) {
        log::debug!("spawning routine '{}'", name);
        self.routines.push(Scheduled {
            name,
            routine,
            owner,
        });
    }

    /// Resumes every routine once and returns how many are still running.
    pub fn tick(&mut self) -> usize {
        self.routines.retain_mut(|scheduled| {
            if let Some(owner) = &scheduled.owner {
                if !owner() {
                    log::debug!("routine '{}' cancelled, owner is gone", scheduled.name);
                    return false;
                }
            }
            match scheduled.routine.resume() {
                Step::Yield => true,
                Step::Done => {
                    log::debug!("routine '{}' finished", scheduled.name);
                    false
                }
            }
        });
        self.routines.len()
    }

    /// Drops every routine named `name`. Returns whether any was running.
    pub fn kill(&mut self, name: &str) -> bool {
        let before = self.routines.len();
        self.routines.retain(|scheduled| scheduled.name != name);
        before != self.routines.len()
    }

    /// Whether a routine named `name` is running.
    #[must_use]
    pub fn is_running(&self, name: &str) -> bool {
        self.routines.iter().any(|scheduled| scheduled.name == name)
    }

    /// Number of running routines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routines.len()
    }

    /// Returns true if nothing is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.routines.iter().map(|s| s.name.as_str()).collect();
        f.debug_struct("Scheduler").field("routines", &names).finish()
    }
}

/// Runs a [`RoundLifecycle`] against a host until the host's round owner
/// disappears.
pub struct RoundRoutine<H> {
    lifecycle: RoundLifecycle,
    host: H,
    bus: Arc<EventBus>,
}

impl<H: RoundHost> RoundRoutine<H> {
    /// Binds `lifecycle` to `host`, publishing lifecycle events on `bus`.
    pub fn new(lifecycle: RoundLifecycle, host: H, bus: Arc<EventBus>) -> Self {
        Self {
            lifecycle,
            host,
            bus,
        }
    }

    /// The driven state machine.
    pub fn lifecycle(&self) -> &RoundLifecycle {
        &self.lifecycle
    }

    /// The host.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// The host, mutably.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }
}

impl<H: RoundHost> Routine for RoundRoutine<H> {
    fn resume(&mut self) -> Step {
        if !self.host.round_owner_alive() {
            log::debug!("round owner is gone, stopping the round routine");
            return Step::Done;
        }
        self.lifecycle.tick(&mut self.host, &self.bus);
        Step::Yield
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::{Cell, RefCell},
        rc::Rc,
    };

    use super::*;
    use crate::{round::snapshot::RoleType, test::MockHost};

    #[test]
    fn test_routines_resume_in_order_until_done() {
        let trace = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new();

        let seen = Rc::clone(&trace);
        let mut left = 2;
        scheduler.spawn("a", move || {
            seen.borrow_mut().push('a');
            left -= 1;
            if left == 0 {
                Step::Done
            } else {
                Step::Yield
            }
        });
        let seen = Rc::clone(&trace);
        scheduler.spawn("b", move || {
            seen.borrow_mut().push('b');
            Step::Yield
        });

        assert_eq!(scheduler.tick(), 2);
        assert_eq!(scheduler.tick(), 1);
        assert_eq!(scheduler.tick(), 1);
        assert_eq!(*trace.borrow(), vec!['a', 'b', 'a', 'b', 'b']);
        assert!(!scheduler.is_running("a"));
        assert!(scheduler.kill("b"));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_cancel_with_drops_before_resume() {
        let alive = Rc::new(Cell::new(true));
        let runs = Rc::new(Cell::new(0));
        let mut scheduler = Scheduler::new();

        let counter = Rc::clone(&runs);
        let owner = Rc::clone(&alive);
        scheduler.spawn_cancel_with(
            "owned",
            move || {
                counter.set(counter.get() + 1);
                Step::Yield
            },
            move || owner.get(),
        );

        scheduler.tick();
        alive.set(false);
        assert_eq!(scheduler.tick(), 0);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn test_round_routine_stops_with_owner() {
        let host = MockHost::with_roles(&[RoleType::ClassD, RoleType::Scientist]);
        let mut routine = RoundRoutine::new(
            RoundLifecycle::default(),
            host,
            Arc::new(EventBus::new()),
        );

        assert_eq!(routine.resume(), Step::Yield);
        assert_eq!(routine.lifecycle().state(), crate::round::RoundState::InProgress);
        routine.host_mut().owner_alive = false;
        assert_eq!(routine.resume(), Step::Done);
        assert!(routine.host().restarts.is_empty());
    }
}
