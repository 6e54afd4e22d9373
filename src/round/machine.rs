//! The round lifecycle state machine.
//!
//! [`RoundLifecycle::tick`] is driven once per scheduler tick. It never
//! blocks: waiting states count ticks down and return.

use strum::Display;

use crate::{
    events::EventBus,
    round::{
        config::RoundConfig,
        events::{EndingRound, RoundEnded},
        host::RoundHost,
        snapshot::{escape_ratio, ClassList, LeadingTeam},
    },
};

/// Observable lifecycle state.
///
/// `EndingEvaluation` and `Ending` are passed through within a single tick;
/// [`RoundLifecycle::tick`] reports the state it rests in afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RoundState {
    /// Waiting for an unlocked round with enough participants.
    Idle,
    /// Polling for an end condition.
    InProgress,
    /// Computing a snapshot.
    EndingEvaluation,
    /// Publishing the ending event.
    Ending,
    /// Waiting to show the summary.
    Ended,
    /// Counting down to the restart.
    Restarting,
}

#[derive(Debug, Clone)]
enum Phase {
    Idle,
    InProgress,
    Ended {
        remaining: u32,
        leading_team: LeadingTeam,
        class_list: ClassList,
    },
    Restarting {
        remaining: u32,
        dimmed: bool,
    },
}

impl Phase {
    fn state(&self) -> RoundState {
        match self {
            Phase::Idle => RoundState::Idle,
            Phase::InProgress => RoundState::InProgress,
            Phase::Ended { .. } => RoundState::Ended,
            Phase::Restarting { .. } => RoundState::Restarting,
        }
    }
}

/// Drives a round from start to restart.
#[derive(Debug, Clone)]
pub struct RoundLifecycle {
    config: RoundConfig,
    phase: Phase,
}

impl Default for RoundLifecycle {
    fn default() -> Self {
        Self::new(RoundConfig::default())
    }
}

impl RoundLifecycle {
    /// Creates an idle lifecycle.
    #[must_use]
    pub fn new(config: RoundConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &RoundConfig {
        &self.config
    }

    /// The state the last tick rested in.
    #[must_use]
    pub fn state(&self) -> RoundState {
        self.phase.state()
    }

    /// Advances the machine by one tick.
    pub fn tick<H: RoundHost + ?Sized>(&mut self, host: &mut H, bus: &EventBus) -> RoundState {
        let before = self.phase.state();
        let phase = std::mem::replace(&mut self.phase, Phase::Idle);

        self.phase = match phase {
            Phase::Idle => {
                if is_active(host) {
                    Phase::InProgress
                } else {
                    Phase::Idle
                }
            }
            Phase::InProgress => self.poll(host, bus),
            Phase::Ended {
                remaining,
                leading_team,
                class_list,
            } => {
                let remaining = remaining.saturating_sub(1);
                if remaining > 0 {
                    Phase::Ended {
                        remaining,
                        leading_team,
                        class_list,
                    }
                } else {
                    self.finish(host, bus, leading_team, class_list)
                }
            }
            Phase::Restarting { remaining, dimmed } => self.count_down(host, remaining, dimmed),
        };

        let after = self.phase.state();
        if before != after {
            log::debug!("round state {} -> {}", before, after);
        }
        after
    }

    fn poll<H: RoundHost + ?Sized>(&self, host: &mut H, bus: &EventBus) -> Phase {
        if !is_active(host) {
            return Phase::Idle;
        }

        let class_list = ClassList::capture(&*host);
        let verdict = class_list.is_end_condition();
        if !verdict && !self.config.publish_every_poll {
            return Phase::InProgress;
        }

        let leading_team = class_list.leading_team(host.escaped_class_ds());
        log::debug!(
            "round state {} -> {} (verdict {}, leading {})",
            RoundState::EndingEvaluation,
            RoundState::Ending,
            verdict,
            leading_team
        );

        let mut event = EndingRound::new(class_list, leading_team, verdict);
        let allowed = bus.publish(&mut event);
        if !(allowed && event.is_round_ended()) {
            if verdict {
                log::debug!("round end vetoed by a subscriber");
            }
            return Phase::InProgress;
        }

        log_result(host, &class_list, event.leading_team());
        Phase::Ended {
            remaining: self.config.summary_delay_ticks,
            leading_team: event.leading_team(),
            class_list,
        }
    }

    fn finish<H: RoundHost + ?Sized>(
        &self,
        host: &mut H,
        bus: &EventBus,
        leading_team: LeadingTeam,
        class_list: ClassList,
    ) -> Phase {
        if !host.round_owner_alive() {
            log::warn!("round owner is gone, skipping the round summary");
            return Phase::Idle;
        }

        let seconds = host.restart_delay_seconds();
        let remaining = self.config.restart_delay_ticks(seconds);
        let time_to_restart = i32::try_from(remaining / self.config.ticks_per_second.max(1))
            .unwrap_or(i32::MAX);

        let mut event = RoundEnded::new(leading_team, class_list, time_to_restart);
        bus.publish(&mut event);
        host.show_summary(&event);

        let dimmed = remaining <= self.config.dim_lead_ticks;
        if dimmed {
            host.dim_screen();
        }
        Phase::Restarting { remaining, dimmed }
    }

    fn count_down<H: RoundHost + ?Sized>(&self, host: &mut H, remaining: u32, dimmed: bool) -> Phase {
        let remaining = remaining.saturating_sub(1);
        let dimmed = if !dimmed && remaining <= self.config.dim_lead_ticks {
            host.dim_screen();
            true
        } else {
            dimmed
        };

        if remaining > 0 {
            return Phase::Restarting { remaining, dimmed };
        }

        if host.round_owner_alive() {
            log::info!("restarting round ({})", self.config.restart_mode);
            host.restart(self.config.restart_mode);
        } else {
            log::warn!("round owner is gone, skipping restart");
        }
        Phase::Idle
    }
}

fn is_active<H: RoundHost + ?Sized>(host: &H) -> bool {
    host.round_in_progress()
        && !host.round_locked()
        && !(host.keep_round_on_one() && host.participants().len() < 2)
}

fn log_result<H: RoundHost + ?Sized>(host: &H, class_list: &ClassList, leading_team: LeadingTeam) {
    let start = host.round_start_counts();
    let class_d_escaped = escape_ratio(
        host.escaped_class_ds(),
        class_list.class_ds,
        start.class_ds,
        0.0,
    );
    let scientists_escaped = escape_ratio(
        host.escaped_scientists(),
        class_list.scientists,
        start.scientists,
        1.0,
    );

    log::info!(
        "round finished after {}s, {} leading: anomalies {} | insurgency {} | facility forces {} | class-D escaped {:.0}% | scientists escaped {:.0}%",
        class_list.time - start.time,
        leading_team,
        class_list.anomalies(),
        class_list.insurgency(),
        class_list.facility_forces(),
        class_d_escaped * 100.0,
        scientists_escaped * 100.0
    );
}
