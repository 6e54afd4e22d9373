//! Instruction fragments spliced into host methods.
//!
//! A [`Fragment`] is a short instruction sequence written against *symbolic*
//! locals and labels: the event local declared by an earlier step, the exit
//! label captured from the host body. Keys are resolved against the
//! [`PatchContext`] when the step runs, so one descriptor can be written
//! without knowing which slot numbers or label ids the host body will hand
//! out.
//!
//! Numeric loads pick the shortest encoding, the way a compiler would emit
//! them (`ldarg.1`, `ldc.i4.s 70`, `ldloc.s 4`).
//!
//! ```rust
//! use hostpatch::assembly::{Opcode, Operand};
//! use hostpatch::instrument::{Fragment, PatchContext};
//!
//! let mut context = PatchContext::default();
//! context.bind_local("ev", 5);
//!
//! let code = Fragment::new().ldarg(1).load_local("ev").ldc_i4(70).resolve(&context)?;
//! assert_eq!(code[0].opcode, Opcode::Ldarg1);
//! assert_eq!(code[1].opcode, Opcode::LdlocS);
//! assert_eq!(code[1].operand, Operand::Local(5));
//! assert_eq!(code[2].opcode, Opcode::LdcI4S);
//! # Ok::<(), hostpatch::Error>(())
//! ```

use crate::{
    assembly::{FieldRef, Immediate, Instruction, MethodRef, Opcode, OperandKind, Operand},
    instrument::engine::PatchContext,
    Result,
};

#[derive(Debug, Clone, PartialEq)]
enum FragmentOp {
    Emit(Instruction),
    LoadLocal(String),
    StoreLocal(String),
    Branch(Opcode, String),
}

/// A symbolic instruction sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    ops: Vec<FragmentOp>,
}

impl Fragment {
    /// Creates an empty fragment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of instructions the fragment emits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns `true` if the fragment emits nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Appends a concrete instruction.
    #[must_use]
    pub fn instruction(mut self, instruction: Instruction) -> Self {
        self.ops.push(FragmentOp::Emit(instruction));
        self
    }

    /// Appends an operand-less instruction.
    #[must_use]
    pub fn op(self, opcode: Opcode) -> Self {
        self.instruction(Instruction::new(opcode))
    }

    /// Appends all instructions of `other`.
    #[must_use]
    pub fn append(mut self, other: Fragment) -> Self {
        self.ops.extend(other.ops);
        self
    }

    /// Loads argument `index`.
    #[must_use]
    pub fn ldarg(self, index: u16) -> Self {
        self.instruction(load_argument(index))
    }

    /// Loads local slot `slot` of the host body.
    #[must_use]
    pub fn ldloc(self, slot: u16) -> Self {
        self.instruction(load_local(slot))
    }

    /// Stores into local slot `slot` of the host body.
    #[must_use]
    pub fn stloc(self, slot: u16) -> Self {
        self.instruction(store_local(slot))
    }

    /// Loads the local declared under `key`.
    #[must_use]
    pub fn load_local(mut self, key: impl Into<String>) -> Self {
        self.ops.push(FragmentOp::LoadLocal(key.into()));
        self
    }

    /// Stores into the local declared under `key`.
    #[must_use]
    pub fn store_local(mut self, key: impl Into<String>) -> Self {
        self.ops.push(FragmentOp::StoreLocal(key.into()));
        self
    }

    /// Branches with `opcode` to the label bound under `key`.
    #[must_use]
    pub fn branch(mut self, opcode: Opcode, key: impl Into<String>) -> Self {
        self.ops.push(FragmentOp::Branch(opcode, key.into()));
        self
    }

    /// Pushes a 32-bit integer constant.
    #[must_use]
    pub fn ldc_i4(self, value: i32) -> Self {
        self.instruction(load_int(value))
    }

    /// Pushes a 32-bit float constant.
    #[must_use]
    pub fn ldc_r4(self, value: f32) -> Self {
        self.instruction(Instruction::with_operand(
            Opcode::LdcR4,
            Operand::Immediate(Immediate::Float32(value)),
        ))
    }

    /// Loads an instance field off the object on the stack.
    #[must_use]
    pub fn ldfld(self, field: FieldRef) -> Self {
        self.instruction(Instruction::with_operand(Opcode::Ldfld, Operand::Field(field)))
    }

    /// Loads a static field.
    #[must_use]
    pub fn ldsfld(self, field: FieldRef) -> Self {
        self.instruction(Instruction::with_operand(Opcode::Ldsfld, Operand::Field(field)))
    }

    /// Calls `method` non-virtually.
    #[must_use]
    pub fn call(self, method: MethodRef) -> Self {
        self.instruction(Instruction::with_operand(Opcode::Call, Operand::Method(method)))
    }

    /// Calls `method` virtually.
    #[must_use]
    pub fn callvirt(self, method: MethodRef) -> Self {
        self.instruction(Instruction::with_operand(Opcode::Callvirt, Operand::Method(method)))
    }

    /// Constructs an object through `ctor`.
    #[must_use]
    pub fn newobj(self, ctor: MethodRef) -> Self {
        self.instruction(Instruction::with_operand(Opcode::Newobj, Operand::Method(ctor)))
    }

    /// Duplicates the top of the stack.
    #[must_use]
    pub fn dup(self) -> Self {
        self.op(Opcode::Dup)
    }

    /// Resolves symbolic locals and labels into concrete instructions.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidDescriptor`] if a key is not bound in
    /// `context` or a branch uses an opcode that takes no label.
    pub fn resolve(&self, context: &PatchContext) -> Result<Vec<Instruction>> {
        self.ops
            .iter()
            .map(|op| match op {
                FragmentOp::Emit(instruction) => Ok(instruction.clone()),
                FragmentOp::LoadLocal(key) => Ok(load_local(context.local(key)?)),
                FragmentOp::StoreLocal(key) => Ok(store_local(context.local(key)?)),
                FragmentOp::Branch(opcode, key) => {
                    if opcode.operand_kind() != OperandKind::Label {
                        return Err(patch_error!("{} does not branch to a label", opcode));
                    }
                    Ok(Instruction::with_operand(
                        *opcode,
                        Operand::Label(context.label(key)?),
                    ))
                }
            })
            .collect()
    }
}

/// Shortest encoding of a load of argument `index`.
#[must_use]
pub fn load_argument(index: u16) -> Instruction {
    match index {
        0 => Instruction::new(Opcode::Ldarg0),
        1 => Instruction::new(Opcode::Ldarg1),
        2 => Instruction::new(Opcode::Ldarg2),
        3 => Instruction::new(Opcode::Ldarg3),
        4..=255 => Instruction::with_operand(Opcode::LdargS, Operand::Argument(index)),
        _ => Instruction::with_operand(Opcode::Ldarg, Operand::Argument(index)),
    }
}

/// Shortest encoding of a load of local `slot`.
#[must_use]
pub fn load_local(slot: u16) -> Instruction {
    match slot {
        0 => Instruction::new(Opcode::Ldloc0),
        1 => Instruction::new(Opcode::Ldloc1),
        2 => Instruction::new(Opcode::Ldloc2),
        3 => Instruction::new(Opcode::Ldloc3),
        4..=255 => Instruction::with_operand(Opcode::LdlocS, Operand::Local(slot)),
        _ => Instruction::with_operand(Opcode::Ldloc, Operand::Local(slot)),
    }
}

/// Shortest encoding of a store into local `slot`.
#[must_use]
pub fn store_local(slot: u16) -> Instruction {
    match slot {
        0 => Instruction::new(Opcode::Stloc0),
        1 => Instruction::new(Opcode::Stloc1),
        2 => Instruction::new(Opcode::Stloc2),
        3 => Instruction::new(Opcode::Stloc3),
        4..=255 => Instruction::with_operand(Opcode::StlocS, Operand::Local(slot)),
        _ => Instruction::with_operand(Opcode::Stloc, Operand::Local(slot)),
    }
}

/// Shortest encoding of a 32-bit integer constant.
#[must_use]
pub fn load_int(value: i32) -> Instruction {
    match value {
        -1 => Instruction::new(Opcode::LdcI4M1),
        0 => Instruction::new(Opcode::LdcI40),
        1 => Instruction::new(Opcode::LdcI41),
        2 => Instruction::new(Opcode::LdcI42),
        3 => Instruction::new(Opcode::LdcI43),
        4 => Instruction::new(Opcode::LdcI44),
        5 => Instruction::new(Opcode::LdcI45),
        6 => Instruction::new(Opcode::LdcI46),
        7 => Instruction::new(Opcode::LdcI47),
        8 => Instruction::new(Opcode::LdcI48),
        _ => match i8::try_from(value) {
            Ok(small) => Instruction::with_operand(
                Opcode::LdcI4S,
                Operand::Immediate(Immediate::Int8(small)),
            ),
            Err(_) => Instruction::with_operand(
                Opcode::LdcI4,
                Operand::Immediate(Immediate::Int32(value)),
            ),
        },
    }
}
