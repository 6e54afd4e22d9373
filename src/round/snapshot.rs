//! Per-poll faction counts and the end-of-round verdict.

use strum::{Display, EnumIter};

use crate::round::host::RoundHost;

/// Allegiance of a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Team {
    /// Anomalies, including zombies.
    Scp,
    /// Facility guards and mobile task force operatives.
    Mtf,
    /// Chaos insurgency.
    Chi,
    /// Scientists.
    Rsc,
    /// Class-D personnel.
    Cdp,
    /// Spectators and unspawned players.
    Ride,
    /// Tutorial players.
    Tut,
}

/// A participant's role as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[allow(missing_docs)]
pub enum RoleType {
    ClassD,
    Scientist,
    FacilityGuard,
    NtfPrivate,
    NtfSergeant,
    NtfSpecialist,
    NtfCaptain,
    ChaosConscript,
    ChaosRifleman,
    ChaosRepressor,
    ChaosMarauder,
    Scp049,
    Scp0492,
    Scp079,
    Scp096,
    Scp106,
    Scp173,
    Scp93953,
    Scp93989,
    Tutorial,
    Spectator,
}

impl RoleType {
    /// The team this role fights for.
    #[must_use]
    pub fn team(self) -> Team {
        match self {
            RoleType::ClassD => Team::Cdp,
            RoleType::Scientist => Team::Rsc,
            RoleType::FacilityGuard
            | RoleType::NtfPrivate
            | RoleType::NtfSergeant
            | RoleType::NtfSpecialist
            | RoleType::NtfCaptain => Team::Mtf,
            RoleType::ChaosConscript
            | RoleType::ChaosRifleman
            | RoleType::ChaosRepressor
            | RoleType::ChaosMarauder => Team::Chi,
            RoleType::Scp049
            | RoleType::Scp0492
            | RoleType::Scp079
            | RoleType::Scp096
            | RoleType::Scp106
            | RoleType::Scp173
            | RoleType::Scp93953
            | RoleType::Scp93989 => Team::Scp,
            RoleType::Tutorial => Team::Tut,
            RoleType::Spectator => Team::Ride,
        }
    }
}

/// Side credited with the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum LeadingTeam {
    /// Guards, operatives and scientists.
    FacilityForces,
    /// Insurgents and class-D.
    ChaosInsurgency,
    /// Anomalies and zombies.
    Anomalies,
    /// Nobody.
    Draw,
}

/// Faction counts taken at one instant of the round.
///
/// Computing a snapshot only reads host state, so two captures of an
/// unchanged host are equal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassList {
    /// Living anomalies other than zombies.
    pub anomalies_except_zombies: u32,
    /// Living zombies.
    pub zombies: u32,
    /// Living guards and task force operatives.
    pub facility_guards_and_operatives: u32,
    /// Living insurgents.
    pub insurgents: u32,
    /// Living scientists.
    pub scientists: u32,
    /// Living class-D.
    pub class_ds: u32,
    /// Warhead kills, `-1` while the warhead has not detonated.
    pub warhead_kills: i32,
    /// Round wall time in seconds.
    pub time: i32,
}

impl ClassList {
    /// Counts the connected participants of `host`.
    ///
    /// Participants whose role the host can no longer resolve are skipped.
    pub fn capture<H: RoundHost + ?Sized>(host: &H) -> Self {
        let mut list = ClassList {
            warhead_kills: host.warhead_kills().unwrap_or(-1),
            time: host.elapsed_seconds(),
            ..ClassList::default()
        };

        for player in host.participants() {
            if let Some(role) = host.role_of(player) {
                list.count(role);
            } else {
                log::debug!("skipping {:?}: role no longer resolvable", player);
            }
        }
        list
    }

    /// Builds a snapshot from explicit roles.
    #[must_use]
    pub fn from_roles(roles: impl IntoIterator<Item = RoleType>) -> Self {
        let mut list = ClassList {
            warhead_kills: -1,
            ..ClassList::default()
        };
        for role in roles {
            list.count(role);
        }
        list
    }

    fn count(&mut self, role: RoleType) {
        match role.team() {
            Team::Scp if role == RoleType::Scp0492 => self.zombies += 1,
            Team::Scp => self.anomalies_except_zombies += 1,
            Team::Mtf => self.facility_guards_and_operatives += 1,
            Team::Chi => self.insurgents += 1,
            Team::Rsc => self.scientists += 1,
            Team::Cdp => self.class_ds += 1,
            Team::Ride | Team::Tut => {}
        }
    }

    /// Operatives plus scientists.
    #[must_use]
    pub fn facility_forces(&self) -> u32 {
        self.facility_guards_and_operatives + self.scientists
    }

    /// Insurgents plus class-D.
    #[must_use]
    pub fn insurgency(&self) -> u32 {
        self.insurgents + self.class_ds
    }

    /// Anomalies plus zombies.
    #[must_use]
    pub fn anomalies(&self) -> u32 {
        self.anomalies_except_zombies + self.zombies
    }

    /// Whether the round has reached an end condition.
    ///
    /// True when no class-D and no facility forces remain, or when at most
    /// one of the three factions still has living members.
    #[must_use]
    pub fn is_end_condition(&self) -> bool {
        if self.class_ds == 0 && self.facility_forces() == 0 {
            return true;
        }

        let alive = [self.facility_forces(), self.insurgency(), self.anomalies()]
            .into_iter()
            .filter(|&count| count > 0)
            .count();
        alive <= 1
    }

    /// The provisional winner given the cumulative class-D escapes.
    ///
    /// Facility forces lead whenever any are alive and no class-D escaped;
    /// scientist escapes are not required. Any class-D escape hands the lead
    /// to the insurgency, even with facility forces alive.
    #[must_use]
    pub fn leading_team(&self, escaped_class_ds: u32) -> LeadingTeam {
        if self.facility_forces() > 0 && escaped_class_ds == 0 {
            LeadingTeam::FacilityForces
        } else if escaped_class_ds > 0 {
            LeadingTeam::ChaosInsurgency
        } else if self.anomalies() > 0 {
            LeadingTeam::Anomalies
        } else {
            LeadingTeam::Draw
        }
    }
}

/// Share of `start` accounted for by `escaped + alive`, or `empty` when the
/// round started without any.
pub(crate) fn escape_ratio(escaped: u32, alive: u32, start: u32, empty: f32) -> f32 {
    if start == 0 {
        empty
    } else {
        (escaped + alive) as f32 / start as f32
    }
}
