//! Event payloads raised by instrumented host methods.
//!
//! Every payload follows the same shape: immutable inputs exposed through
//! getters, mutable outputs exposed through getter/setter pairs and the
//! cancellation flag, which starts `true`.

use crate::events::event::cancellable_event;

/// Identity of a connected participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub u32);

/// Serial number of an inventory item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemSerial(pub u16);

/// Identity of a facility generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeneratorId(pub u32);

/// A player switches their flashlight on or off.
#[derive(Debug, Clone, PartialEq)]
pub struct TogglingFlashlight {
    player: PlayerId,
    item: ItemSerial,
    new_state: bool,
    is_allowed: bool,
}

impl TogglingFlashlight {
    /// Creates the event for `player` toggling `item` to `new_state`.
    #[must_use]
    pub fn new(player: PlayerId, item: ItemSerial, new_state: bool) -> Self {
        Self {
            player,
            item,
            new_state,
            is_allowed: true,
        }
    }

    /// The toggling player.
    #[must_use]
    pub fn player(&self) -> PlayerId {
        self.player
    }

    /// The flashlight.
    #[must_use]
    pub fn item(&self) -> ItemSerial {
        self.item
    }

    /// Whether the light ends up on.
    #[must_use]
    pub fn new_state(&self) -> bool {
        self.new_state
    }

    /// Overrides the resulting light state.
    pub fn set_new_state(&mut self, on: bool) {
        self.new_state = on;
    }
}

cancellable_event!(TogglingFlashlight, "TogglingFlashlight");

/// SCP-096 gains a target.
#[derive(Debug, Clone, PartialEq)]
pub struct AddingTarget {
    scp: PlayerId,
    target: PlayerId,
    enrage_time_to_add: f32,
    is_allowed: bool,
}

impl AddingTarget {
    /// Creates the event; `enrage_time_to_add` is the host's per-target reset time.
    #[must_use]
    pub fn new(scp: PlayerId, target: PlayerId, enrage_time_to_add: f32) -> Self {
        Self {
            scp,
            target,
            enrage_time_to_add,
            is_allowed: true,
        }
    }

    /// The SCP-096 player.
    #[must_use]
    pub fn scp(&self) -> PlayerId {
        self.scp
    }

    /// The player being added as a target.
    #[must_use]
    pub fn target(&self) -> PlayerId {
        self.target
    }

    /// Seconds added to the rage.
    #[must_use]
    pub fn enrage_time_to_add(&self) -> f32 {
        self.enrage_time_to_add
    }

    /// Overrides the seconds added to the rage.
    pub fn set_enrage_time_to_add(&mut self, seconds: f32) {
        self.enrage_time_to_add = seconds;
    }
}

cancellable_event!(AddingTarget, "AddingTarget");

/// A player unlocks a generator.
#[derive(Debug, Clone, PartialEq)]
pub struct UnlockingGenerator {
    player: PlayerId,
    generator: GeneratorId,
    is_allowed: bool,
}

impl UnlockingGenerator {
    /// Creates the event.
    #[must_use]
    pub fn new(player: PlayerId, generator: GeneratorId) -> Self {
        Self {
            player,
            generator,
            is_allowed: true,
        }
    }

    /// The unlocking player.
    #[must_use]
    pub fn player(&self) -> PlayerId {
        self.player
    }

    /// The generator.
    #[must_use]
    pub fn generator(&self) -> GeneratorId {
        self.generator
    }
}

cancellable_event!(UnlockingGenerator, "UnlockingGenerator");

/// SCP-079 reaches a new tier.
#[derive(Debug, Clone, PartialEq)]
pub struct GainingLevel {
    player: PlayerId,
    new_level: i32,
    is_allowed: bool,
}

impl GainingLevel {
    /// Creates the event.
    #[must_use]
    pub fn new(player: PlayerId, new_level: i32) -> Self {
        Self {
            player,
            new_level,
            is_allowed: true,
        }
    }

    /// The SCP-079 player.
    #[must_use]
    pub fn player(&self) -> PlayerId {
        self.player
    }

    /// The level reached.
    #[must_use]
    pub fn new_level(&self) -> i32 {
        self.new_level
    }

    /// Overrides the level reached.
    pub fn set_new_level(&mut self, level: i32) {
        self.new_level = level;
    }
}

cancellable_event!(GainingLevel, "GainingLevel");
