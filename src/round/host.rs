//! The host surface consumed by the round lifecycle.

use strum::Display;

use crate::{
    events::PlayerId,
    round::{events::RoundEnded, snapshot::ClassList, snapshot::RoleType},
};

/// How the host restarts the round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
pub enum RestartMode {
    /// Reload the round without disconnecting players.
    Quiet,
    /// Full restart; players reconnect.
    #[default]
    Full,
}

/// Round state and primitives the host exposes to [`crate::round::RoundLifecycle`].
///
/// Reads must not mutate host state.
pub trait RoundHost {
    /// Whether a round is running.
    fn round_in_progress(&self) -> bool;

    /// Whether an operator has locked the round open.
    fn round_locked(&self) -> bool;

    /// Whether the round should keep waiting while fewer than two
    /// participants are connected.
    fn keep_round_on_one(&self) -> bool;

    /// Currently connected participants.
    fn participants(&self) -> Vec<PlayerId>;

    /// Role of `player`, or `None` if it disconnected since
    /// [`RoundHost::participants`] was read.
    fn role_of(&self, player: PlayerId) -> Option<RoleType>;

    /// Kills caused by the warhead, or `None` while it has not detonated.
    fn warhead_kills(&self) -> Option<i32>;

    /// Class-D that escaped this round.
    fn escaped_class_ds(&self) -> u32;

    /// Scientists that escaped this round.
    fn escaped_scientists(&self) -> u32;

    /// Seconds since the round started.
    fn elapsed_seconds(&self) -> i32;

    /// Counts captured when the round started.
    fn round_start_counts(&self) -> ClassList;

    /// Configured restart delay in seconds, unclamped.
    fn restart_delay_seconds(&self) -> i32;

    /// Whether the object that owns the round loop still exists.
    fn round_owner_alive(&self) -> bool;

    /// Shows the end-of-round summary to every player.
    fn show_summary(&mut self, summary: &RoundEnded);

    /// Fades every player's screen out ahead of the restart.
    fn dim_screen(&mut self);

    /// Restarts the round.
    fn restart(&mut self, mode: RestartMode);
}
