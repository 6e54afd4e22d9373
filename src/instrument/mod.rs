//! Method instrumentation: rewriting host method bodies to raise events.
//!
//! The engine takes a decoded [`crate::assembly::InstructionBuffer`] and a
//! [`PatchDescriptor`] and splices event construction, publication,
//! cancellation checks and value read-backs into it, keeping every branch
//! target and exception region intact.
//!
//! # Architecture
//!
//! - [`anchor`] - Structural rules locating splice points
//! - [`fragment`] - Symbolic instruction sequences to splice
//! - [`descriptor`] - The ordered rewrite recipe for one method
//! - [`engine`] - [`Instrumenter`], applying one descriptor to one body
//! - [`pass`] - [`PatchSet`], the load-time pass over all host methods
//! - [`patches`] - Recipes for the instrumented host methods
//!
//! # Patch Shape
//!
//! A typical event site, spliced before the anchor and returning through an
//! exit label the host body already has:
//!
//! ```text
//!           ldloc.0                          \
//!           call    Player::Get(1)            | constructor arguments
//!           ...                              /
//!           ldc.i4.1                         is_allowed
//!           newobj  TogglingFlashlightEventArgs::.ctor(4)
//!           dup
//!           dup
//!           stloc.s ev
//!           call    Handlers.Player::OnTogglingFlashlight(1)
//!           callvirt TogglingFlashlightEventArgs::get_IsAllowed(0)
//!           brfalse.s RET
//! anchor:   ldloc.1
//!           ...
//! RET:      ret
//! ```
//!
//! # Failure Semantics
//!
//! A descriptor either applies completely and yields a valid buffer, or fails
//! with an [`crate::Error`] and leaves the host method untouched. The
//! [`PatchSet`] pass logs each failure and continues with the next method.

pub mod anchor;
pub mod descriptor;
pub mod engine;
pub mod fragment;
pub mod pass;
pub mod patches;

pub use anchor::{
    AnchorRule, Direction, Expect, InstructionMatcher, MemberMatcher, OpcodeMatcher,
    OperandMatcher, PredicateMatcher,
};
pub use descriptor::{EventBinding, EventSite, PatchDescriptor, PatchStep, Placement, ValueOverride};
pub use engine::{Instrumenter, PatchContext};
pub use fragment::Fragment;
pub use pass::{MethodSource, PatchFailure, PatchReport, PatchSet};
