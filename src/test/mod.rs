//! Shared fixtures for unit tests.

use crate::{
    events::PlayerId,
    round::{ClassList, RestartMode, RoleType, RoundEnded, RoundHost},
};

/// In-memory [`RoundHost`] recording every primitive it is asked to run.
#[derive(Debug, Clone)]
pub struct MockHost {
    pub in_progress: bool,
    pub locked: bool,
    pub keep_round_on_one: bool,
    pub players: Vec<(PlayerId, Option<RoleType>)>,
    pub warhead_kills: Option<i32>,
    pub escaped_class_ds: u32,
    pub escaped_scientists: u32,
    pub elapsed: i32,
    pub start: ClassList,
    pub restart_delay: i32,
    pub owner_alive: bool,
    pub summaries: Vec<RoundEnded>,
    pub dims: u32,
    pub restarts: Vec<RestartMode>,
}

impl MockHost {
    pub fn with_roles(roles: &[RoleType]) -> Self {
        let mut host = MockHost {
            in_progress: true,
            locked: false,
            keep_round_on_one: false,
            players: Vec::new(),
            warhead_kills: None,
            escaped_class_ds: 0,
            escaped_scientists: 0,
            elapsed: 0,
            start: ClassList::from_roles(roles.iter().copied()),
            restart_delay: 10,
            owner_alive: true,
            summaries: Vec::new(),
            dims: 0,
            restarts: Vec::new(),
        };
        for &role in roles {
            host.add(role);
        }
        host
    }

    pub fn add(&mut self, role: RoleType) -> PlayerId {
        let id = PlayerId(u32::try_from(self.players.len()).unwrap_or(u32::MAX) + 1);
        self.players.push((id, Some(role)));
        id
    }
}

impl RoundHost for MockHost {
    fn round_in_progress(&self) -> bool {
        self.in_progress
    }

    fn round_locked(&self) -> bool {
        self.locked
    }

    fn keep_round_on_one(&self) -> bool {
        self.keep_round_on_one
    }

    fn participants(&self) -> Vec<PlayerId> {
        self.players.iter().map(|(id, _)| *id).collect()
    }

    fn role_of(&self, player: PlayerId) -> Option<RoleType> {
        self.players
            .iter()
            .find(|(id, _)| *id == player)
            .and_then(|(_, role)| *role)
    }

    fn warhead_kills(&self) -> Option<i32> {
        self.warhead_kills
    }

    fn escaped_class_ds(&self) -> u32 {
        self.escaped_class_ds
    }

    fn escaped_scientists(&self) -> u32 {
        self.escaped_scientists
    }

    fn elapsed_seconds(&self) -> i32 {
        self.elapsed
    }

    fn round_start_counts(&self) -> ClassList {
        self.start
    }

    fn restart_delay_seconds(&self) -> i32 {
        self.restart_delay
    }

    fn round_owner_alive(&self) -> bool {
        self.owner_alive
    }

    fn show_summary(&mut self, summary: &RoundEnded) {
        self.summaries.push(summary.clone());
    }

    fn dim_screen(&mut self) {
        self.dims += 1;
    }

    fn restart(&mut self, mode: RestartMode) {
        self.restarts.push(mode);
    }
}
