//! Timing and policy for the round lifecycle.

use crate::round::host::RestartMode;

/// Configuration for [`crate::round::RoundLifecycle`].
///
/// All durations are in ticks of the cooperative scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundConfig {
    /// Ticks between the end verdict and [`crate::round::RoundEnded`] (default: 75).
    pub summary_delay_ticks: u32,

    /// Scheduler ticks per second, used to convert the host restart delay (default: 50).
    pub ticks_per_second: u32,

    /// Ticks before the restart at which the host screen is dimmed (default: 50).
    pub dim_lead_ticks: u32,

    /// How the host restarts the round (default: [`RestartMode::Full`]).
    pub restart_mode: RestartMode,

    /// Publish [`crate::round::EndingRound`] on every poll, not only when an
    /// end condition holds (default: false).
    pub publish_every_poll: bool,
}

/// Bounds applied to the host restart delay, in seconds.
pub const RESTART_DELAY_BOUNDS: (i32, i32) = (5, 1000);

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            summary_delay_ticks: 75,
            ticks_per_second: 50,
            dim_lead_ticks: 50,
            restart_mode: RestartMode::Full,
            publish_every_poll: false,
        }
    }
}

impl RoundConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the summary delay.
    #[must_use]
    pub fn with_summary_delay_ticks(mut self, ticks: u32) -> Self {
        self.summary_delay_ticks = ticks;
        self
    }

    /// Sets the scheduler rate.
    #[must_use]
    pub fn with_ticks_per_second(mut self, ticks: u32) -> Self {
        self.ticks_per_second = ticks;
        self
    }

    /// Sets how long before the restart the screen is dimmed.
    #[must_use]
    pub fn with_dim_lead_ticks(mut self, ticks: u32) -> Self {
        self.dim_lead_ticks = ticks;
        self
    }

    /// Sets the restart mode.
    #[must_use]
    pub fn with_restart_mode(mut self, mode: RestartMode) -> Self {
        self.restart_mode = mode;
        self
    }

    /// Enables publishing the ending event on every poll.
    #[must_use]
    pub fn with_publish_every_poll(mut self, enabled: bool) -> Self {
        self.publish_every_poll = enabled;
        self
    }

    /// Converts a host restart delay in seconds into ticks, after clamping
    /// it to [`RESTART_DELAY_BOUNDS`].
    #[must_use]
    pub fn restart_delay_ticks(&self, seconds: i32) -> u32 {
        let (min, max) = RESTART_DELAY_BOUNDS;
        clamp_seconds(seconds, min, max).saturating_mul(self.ticks_per_second)
    }
}

fn clamp_seconds(seconds: i32, min: i32, max: i32) -> u32 {
    u32::try_from(seconds.clamp(min, max)).unwrap_or(0)
}
