//! Events raised by the round lifecycle.

use crate::{
    events::{cancellable_event, Event},
    round::snapshot::{ClassList, LeadingTeam},
};

/// The round looks finished; subscribers may veto or change the verdict.
///
/// The round ends only if both [`EndingRound::is_round_ended`] and the
/// cancellation flag are still `true` after publication.
#[derive(Debug, Clone, PartialEq)]
pub struct EndingRound {
    class_list: ClassList,
    leading_team: LeadingTeam,
    is_round_ended: bool,
    is_allowed: bool,
}

impl EndingRound {
    /// Creates the event for `class_list` with the provisional outcome.
    #[must_use]
    pub fn new(class_list: ClassList, leading_team: LeadingTeam, is_round_ended: bool) -> Self {
        Self {
            class_list,
            leading_team,
            is_round_ended,
            is_allowed: true,
        }
    }

    /// The snapshot the verdict was computed from.
    #[must_use]
    pub fn class_list(&self) -> &ClassList {
        &self.class_list
    }

    /// The side credited with the round.
    #[must_use]
    pub fn leading_team(&self) -> LeadingTeam {
        self.leading_team
    }

    /// Overrides the credited side.
    pub fn set_leading_team(&mut self, team: LeadingTeam) {
        self.leading_team = team;
    }

    /// Whether the round should end.
    #[must_use]
    pub fn is_round_ended(&self) -> bool {
        self.is_round_ended
    }

    /// Forces or withdraws the end verdict.
    pub fn set_round_ended(&mut self, ended: bool) {
        self.is_round_ended = ended;
    }
}

cancellable_event!(EndingRound, "EndingRound");

/// The round is over and a restart is scheduled.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundEnded {
    leading_team: LeadingTeam,
    class_list: ClassList,
    time_to_restart: i32,
}

impl RoundEnded {
    /// Creates the event.
    #[must_use]
    pub fn new(leading_team: LeadingTeam, class_list: ClassList, time_to_restart: i32) -> Self {
        Self {
            leading_team,
            class_list,
            time_to_restart,
        }
    }

    /// The winning side.
    #[must_use]
    pub fn leading_team(&self) -> LeadingTeam {
        self.leading_team
    }

    /// The final snapshot.
    #[must_use]
    pub fn class_list(&self) -> &ClassList {
        &self.class_list
    }

    /// Seconds until the restart.
    #[must_use]
    pub fn time_to_restart(&self) -> i32 {
        self.time_to_restart
    }
}

impl Event for RoundEnded {
    const NAME: &'static str = "RoundEnded";
}
