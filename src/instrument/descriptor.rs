//! Patch descriptors: the ordered rewrite recipe for one host method.
//!
//! A [`PatchDescriptor`] names its target method and lists [`PatchStep`]s.
//! Steps run strictly in declared order and every step re-resolves its anchor
//! against the buffer as the previous steps left it, so the order is part of
//! the recipe: two steps anchored on "the last `ldfld`" address different
//! instructions if a step between them removed one.
//!
//! # Examples
//!
//! ```rust
//! use hostpatch::assembly::{MethodRef, Opcode, TypeRef};
//! use hostpatch::instrument::{AnchorRule, EventBinding, EventSite, Fragment, PatchDescriptor};
//!
//! let host = TypeRef::new("", "Generator079");
//! let args = TypeRef::new("Exiled.Events.EventArgs", "UnlockingGeneratorEventArgs");
//! let binding = EventBinding::new(
//!     args.clone(),
//!     2,
//!     MethodRef::new(TypeRef::new("Exiled.Events.Handlers", "Player"), "OnUnlockingGenerator")
//!         .with_params(1),
//! );
//!
//! let descriptor = PatchDescriptor::new(MethodRef::instance(host, "OpenClose").with_params(1))
//!     .declare_local("ev", args)
//!     .label_exit("ret", AnchorRule::opcode(Opcode::Ret).last())
//!     .raise_event(
//!         EventSite::new(AnchorRule::opcode(Opcode::Ldarg0), binding, "ev", "ret")
//!             .with_arguments(Fragment::new().ldarg(1)),
//!     );
//! assert_eq!(descriptor.steps().len(), 3);
//! ```

use std::fmt;

use crate::{
    assembly::{MethodRef, Opcode, TypeRef},
    instrument::{anchor::AnchorRule, fragment::Fragment},
};

/// Where a fragment goes relative to its anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    /// The first inserted instruction takes the anchor's position
    #[default]
    Before,
    /// The first inserted instruction takes the position after the anchor
    After,
}

/// The event type and entry points an instrumented site calls into.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBinding {
    /// Event object constructor, including the trailing `is_allowed` parameter
    pub ctor: MethodRef,
    /// Static publisher taking the event object
    pub publish: MethodRef,
    /// Getter reading the cancellation field after publication
    pub allowed_getter: MethodRef,
}

impl EventBinding {
    /// Binds `event_type`, constructed with `ctor_params` arguments (the last
    /// one being `is_allowed`) and published through `publish`.
    #[must_use]
    pub fn new(event_type: TypeRef, ctor_params: u8, publish: MethodRef) -> Self {
        Self {
            ctor: MethodRef::constructor(event_type.clone(), ctor_params),
            allowed_getter: MethodRef::getter(event_type, "IsAllowed"),
            publish,
        }
    }

    /// Overrides the cancellation getter.
    #[must_use]
    pub fn with_allowed_getter(mut self, getter: MethodRef) -> Self {
        self.allowed_getter = getter;
        self
    }
}

/// An event-raising splice.
///
/// Emits, at the anchor:
///
/// ```text
/// <arguments>
/// ldc.i4.1                // is_allowed = true
/// newobj   <ctor>
/// dup
/// dup
/// stloc    <local>
/// call     <publish>
/// callvirt <get_IsAllowed>
/// brfalse.s <exit>
/// ```
#[derive(Debug, Clone)]
pub struct EventSite {
    /// Splice position
    pub anchor: AnchorRule,
    /// Before or after the anchor
    pub placement: Placement,
    /// Pushes every constructor argument except `is_allowed`
    pub arguments: Fragment,
    /// Event entry points
    pub binding: EventBinding,
    /// Key of the local receiving the event object
    pub local: String,
    /// Key of the label taken when the event is denied
    pub exit: String,
}

impl EventSite {
    /// Creates an event site inserted before `anchor`.
    #[must_use]
    pub fn new(
        anchor: AnchorRule,
        binding: EventBinding,
        local: impl Into<String>,
        exit: impl Into<String>,
    ) -> Self {
        Self {
            anchor,
            placement: Placement::Before,
            arguments: Fragment::new(),
            binding,
            local: local.into(),
            exit: exit.into(),
        }
    }

    /// Inserts the site after the anchor instead.
    #[must_use]
    pub fn after(mut self) -> Self {
        self.placement = Placement::After;
        self
    }

    /// Sets the constructor argument pushes.
    #[must_use]
    pub fn with_arguments(mut self, arguments: Fragment) -> Self {
        self.arguments = arguments;
        self
    }

    /// Builds the full spliced sequence.
    #[must_use]
    pub fn fragment(&self) -> Fragment {
        self.arguments
            .clone()
            .ldc_i4(1)
            .newobj(self.binding.ctor.clone())
            .dup()
            .dup()
            .store_local(self.local.clone())
            .call(self.binding.publish.clone())
            .callvirt(self.binding.allowed_getter.clone())
            .branch(Opcode::BrfalseS, self.exit.clone())
    }
}

/// Replacement of the instruction run producing a value.
#[derive(Debug, Clone)]
pub struct ValueOverride {
    /// First instruction of the run to delete
    pub anchor: AnchorRule,
    /// Length of the run to delete
    pub count: usize,
    /// Substituted instructions; must have the same net stack effect
    pub replacement: Fragment,
}

impl ValueOverride {
    /// Replaces `count` instructions at `anchor` with `replacement`.
    #[must_use]
    pub fn new(anchor: AnchorRule, count: usize, replacement: Fragment) -> Self {
        Self {
            anchor,
            count,
            replacement,
        }
    }

    /// Replaces the run with `ldloc <local>; callvirt <getter>`, reading an
    /// output field back off the event object.
    #[must_use]
    pub fn read_back(
        anchor: AnchorRule,
        count: usize,
        local: impl Into<String>,
        getter: MethodRef,
    ) -> Self {
        Self::new(
            anchor,
            count,
            Fragment::new().load_local(local).callvirt(getter),
        )
    }
}

/// One rewrite step.
#[derive(Debug, Clone)]
pub enum PatchStep {
    /// Allocates a fresh local of type `ty`, addressable by `key`
    DeclareLocal {
        /// Context key
        key: String,
        /// Local type
        ty: TypeRef,
    },
    /// Records the label already attached to the anchored instruction
    CaptureLabel {
        /// Context key
        key: String,
        /// Labelled instruction
        anchor: AnchorRule,
    },
    /// Labels an existing exit instruction, reusing a label it already has
    LabelExit {
        /// Context key
        key: String,
        /// A `ret` or an existing branch target
        anchor: AnchorRule,
    },
    /// Splices an event construction, publication and cancellation check
    RaiseEvent(EventSite),
    /// Splices an arbitrary fragment
    Insert {
        /// Splice position
        anchor: AnchorRule,
        /// Before or after the anchor
        placement: Placement,
        /// Inserted instructions
        fragment: Fragment,
    },
    /// Deletes a run, moving its markers onto the following instruction
    Remove {
        /// First deleted instruction
        anchor: AnchorRule,
        /// Number of deleted instructions
        count: usize,
    },
    /// Replaces a value-producing run
    OverrideValue(ValueOverride),
}

impl PatchStep {
    /// Short name of the step kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            PatchStep::DeclareLocal { .. } => "declare-local",
            PatchStep::CaptureLabel { .. } => "capture-label",
            PatchStep::LabelExit { .. } => "label-exit",
            PatchStep::RaiseEvent(_) => "raise-event",
            PatchStep::Insert { .. } => "insert",
            PatchStep::Remove { .. } => "remove",
            PatchStep::OverrideValue(_) => "override-value",
        }
    }
}

impl fmt::Display for PatchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchStep::DeclareLocal { key, ty } => write!(f, "declare-local {key}: {ty}"),
            PatchStep::CaptureLabel { key, anchor } => write!(f, "capture-label {key} at {anchor}"),
            PatchStep::LabelExit { key, anchor } => write!(f, "label-exit {key} at {anchor}"),
            PatchStep::RaiseEvent(site) => {
                write!(f, "raise-event {} at {}", site.binding.ctor.declaring_type(), site.anchor)
            }
            PatchStep::Insert { anchor, fragment, .. } => {
                write!(f, "insert {} instructions at {anchor}", fragment.len())
            }
            PatchStep::Remove { anchor, count } => write!(f, "remove {count} at {anchor}"),
            PatchStep::OverrideValue(value) => {
                write!(f, "override-value {} at {}", value.count, value.anchor)
            }
        }
    }
}

/// Ordered rewrite recipe for one host method.
#[derive(Debug, Clone)]
pub struct PatchDescriptor {
    target: MethodRef,
    steps: Vec<PatchStep>,
}

impl PatchDescriptor {
    /// Creates an empty descriptor for `target`.
    #[must_use]
    pub fn new(target: MethodRef) -> Self {
        Self {
            target,
            steps: Vec::new(),
        }
    }

    /// The patched method.
    #[must_use]
    pub fn target(&self) -> &MethodRef {
        &self.target
    }

    /// Steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[PatchStep] {
        &self.steps
    }

    /// Appends a step.
    #[must_use]
    pub fn step(mut self, step: PatchStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Appends a [`PatchStep::DeclareLocal`].
    #[must_use]
    pub fn declare_local(self, key: impl Into<String>, ty: TypeRef) -> Self {
        self.step(PatchStep::DeclareLocal {
            key: key.into(),
            ty,
        })
    }

    /// Appends a [`PatchStep::CaptureLabel`].
    #[must_use]
    pub fn capture_label(self, key: impl Into<String>, anchor: AnchorRule) -> Self {
        self.step(PatchStep::CaptureLabel {
            key: key.into(),
            anchor,
        })
    }

    /// Appends a [`PatchStep::LabelExit`].
    #[must_use]
    pub fn label_exit(self, key: impl Into<String>, anchor: AnchorRule) -> Self {
        self.step(PatchStep::LabelExit {
            key: key.into(),
            anchor,
        })
    }

    /// Appends a [`PatchStep::RaiseEvent`].
    #[must_use]
    pub fn raise_event(self, site: EventSite) -> Self {
        self.step(PatchStep::RaiseEvent(site))
    }

    /// Appends a [`PatchStep::Insert`].
    #[must_use]
    pub fn insert(self, anchor: AnchorRule, placement: Placement, fragment: Fragment) -> Self {
        self.step(PatchStep::Insert {
            anchor,
            placement,
            fragment,
        })
    }

    /// Appends a [`PatchStep::Remove`].
    #[must_use]
    pub fn remove(self, anchor: AnchorRule, count: usize) -> Self {
        self.step(PatchStep::Remove { anchor, count })
    }

    /// Appends a [`PatchStep::OverrideValue`].
    #[must_use]
    pub fn override_value(self, value: ValueOverride) -> Self {
        self.step(PatchStep::OverrideValue(value))
    }
}
