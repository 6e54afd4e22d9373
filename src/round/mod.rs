//! Round lifecycle: deciding when a round ends and driving the restart.
//!
//! [`RoundLifecycle`] is a tick-driven state machine over a [`RoundHost`]. On
//! every tick of an active round it captures a [`ClassList`] snapshot, checks
//! the end condition, lets subscribers of [`EndingRound`] veto or force the
//! verdict, and once the round is over publishes [`RoundEnded`] and counts
//! down to the host restart.
//!
//! ```text
//! Idle -> InProgress -> EndingEvaluation -> Ending -> Ended -> Restarting -> Idle
//!             ^                               |
//!             +----------- veto --------------+
//! ```
//!
//! [`Scheduler`] resumes cooperative [`Routine`]s once per tick;
//! [`RoundRoutine`] wraps the lifecycle, its host and the bus into one.

mod config;
mod events;
mod host;
mod machine;
mod scheduler;
mod snapshot;

pub use config::{RoundConfig, RESTART_DELAY_BOUNDS};
pub use events::{EndingRound, RoundEnded};
pub use host::{RestartMode, RoundHost};
pub use machine::{RoundLifecycle, RoundState};
pub use scheduler::{Routine, RoundRoutine, Scheduler, Step};
pub use snapshot::{ClassList, LeadingTeam, RoleType, Team};
