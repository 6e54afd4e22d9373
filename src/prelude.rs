//! # hostpatch Prelude
//!
//! The types needed to write patch descriptors, subscribe to events and
//! drive the round lifecycle, importable with a single glob.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all hostpatch operations
pub use crate::Error;

/// The result type used throughout hostpatch
pub use crate::Result;

// ================================================================================================
// Instruction Model
// ================================================================================================

pub use crate::assembly::{
    ExceptionBlock, FieldRef, FlowType, Immediate, Instruction, InstructionBuffer, Label,
    MethodRef, Opcode, Operand, TypeRef,
};

// ================================================================================================
// Instrumentation
// ================================================================================================

pub use crate::instrument::{
    AnchorRule, Direction, EventBinding, EventSite, Fragment, Instrumenter, MethodSource,
    PatchDescriptor, PatchReport, PatchSet, PatchStep, Placement, ValueOverride,
};

// ================================================================================================
// Events
// ================================================================================================

pub use crate::events::{
    AddingTarget, Cancellable, Event, EventBus, GainingLevel, GeneratorId, ItemSerial, PlayerId,
    Subscription, TogglingFlashlight, UnlockingGenerator,
};

// ================================================================================================
// Round Lifecycle
// ================================================================================================

pub use crate::round::{
    ClassList, EndingRound, LeadingTeam, RestartMode, RoleType, RoundConfig, RoundEnded,
    RoundHost, RoundLifecycle, RoundRoutine, RoundState, Routine, Scheduler, Step,
};
