//! Decoded method body model.
//!
//! This module provides the structural representation the instrumentation
//! engine rewrites: a method body as an ordered sequence of [`Instruction`]s
//! with symbolic branch [`Label`]s and [`ExceptionBlock`] markers attached to
//! the instructions they target.
//!
//! # Architecture
//!
//! - [`opcodes`] - The CIL opcodes used by host bodies and spliced fragments
//! - [`instruction`] - Instructions, operands, flow and stack metadata
//! - [`members`] - Structural references to host types, methods and fields
//! - [`exceptions`] - Block markers and recovery of the handler table
//! - [`buffer`] - The mutable [`InstructionBuffer`] with marker-preserving splices
//!
//! # Key Components
//!
//! - [`InstructionBuffer`] - One method body with locals and a label allocator
//! - [`Instruction`] - One operation plus the markers that target it
//! - [`Opcode`] - Operation code with encoding, flow and stack behavior
//! - [`MethodRef`] / [`FieldRef`] / [`TypeRef`] - Operand identities used by anchors
//!
//! # Invariants
//!
//! After every splice primitive, and checked by [`InstructionBuffer::validate`]:
//!
//! - every label referenced by a branch is attached to exactly one instruction
//! - exception block markers are balanced and correctly nested

pub mod buffer;
pub mod exceptions;
pub mod instruction;
pub mod members;
pub mod opcodes;

pub use buffer::{net_stack_effect, InstructionBuffer, LocalVariable};
pub use exceptions::{scan_regions, ExceptionBlock, ExceptionHandlerFlags, ExceptionRegion};
pub use instruction::{FlowType, Immediate, Instruction, Label, Operand, StackBehavior};
pub use members::{FieldRef, MethodRef, TypeRef};
pub use opcodes::{Opcode, OperandKind};
