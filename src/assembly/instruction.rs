//! Instruction representation, operand types and flow metadata.
//!
//! An [`Instruction`] in this crate is already decoded: branch operands point at
//! symbolic [`Label`]s instead of byte offsets, member operands are structural
//! references, and the labels and exception block markers that *target* the
//! instruction are stored on it. Moving an instruction therefore moves
//! everything that refers to its position.
//!
//! # Key Components
//!
//! - [`Instruction`] - One operation with its incoming labels and block markers
//! - [`Operand`] - Type-safe operand representation
//! - [`Immediate`] - Immediate constant values
//! - [`Label`] - Symbolic branch target
//! - [`FlowType`] - Control flow behavior classification
//! - [`StackBehavior`] - Stack effect metadata
//!
//! # Usage Examples
//!
//! ```rust
//! use hostpatch::assembly::{Instruction, Label, Opcode, Operand};
//!
//! let exit = Label::new(7);
//! let branch = Instruction::with_operand(Opcode::BrfalseS, Operand::Label(exit));
//! assert!(branch.is_branch());
//! assert_eq!(branch.branch_targets(), vec![exit]);
//! ```

use std::fmt;

use crate::assembly::{
    exceptions::ExceptionBlock,
    members::{FieldRef, MethodRef, TypeRef},
    opcodes::{OperandKind, Opcode},
};

/// Symbolic branch target.
///
/// A label is resolved by finding the single instruction whose `labels` contain
/// it. Labels are allocated by [`crate::assembly::InstructionBuffer::define_label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(u32);

impl Label {
    /// Creates a label with the given id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the label id.
    #[must_use]
    pub const fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L_{:04}", self.0)
    }
}

/// Represents an immediate value type embedded in an instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// Signed 8-bit immediate value
    Int8(i8),
    /// Signed 32-bit immediate value
    Int32(i32),
    /// Signed 64-bit immediate value
    Int64(i64),
    /// 32-bit floating point immediate value
    Float32(f32),
    /// 64-bit floating point immediate value
    Float64(f64),
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int8(value) => write!(f, "{value}"),
            Immediate::Int32(value) => write!(f, "{value}"),
            Immediate::Int64(value) => write!(f, "{value}"),
            Immediate::Float32(value) => write!(f, "{value}"),
            Immediate::Float64(value) => write!(f, "{value}"),
        }
    }
}

/// Instruction operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand present
    None,
    /// Immediate value (constant embedded in instruction)
    Immediate(Immediate),
    /// Local variable index
    Local(u16),
    /// Method argument index
    Argument(u16),
    /// Branch target
    Label(Label),
    /// Switch table
    Switch(Vec<Label>),
    /// Called or constructed method
    Method(MethodRef),
    /// Accessed field
    Field(FieldRef),
    /// Referenced type
    Type(TypeRef),
    /// String literal
    String(String),
}

impl Operand {
    fn kind(&self) -> OperandKind {
        match self {
            Operand::None => OperandKind::None,
            Operand::Immediate(Immediate::Int8(_)) => OperandKind::Int8,
            Operand::Immediate(Immediate::Int32(_)) => OperandKind::Int32,
            Operand::Immediate(Immediate::Int64(_)) => OperandKind::Int64,
            Operand::Immediate(Immediate::Float32(_)) => OperandKind::Float32,
            Operand::Immediate(Immediate::Float64(_)) => OperandKind::Float64,
            Operand::Local(_) => OperandKind::Local,
            Operand::Argument(_) => OperandKind::Argument,
            Operand::Label(_) => OperandKind::Label,
            Operand::Switch(_) => OperandKind::Switch,
            Operand::Method(_) => OperandKind::Method,
            Operand::Field(_) => OperandKind::Field,
            Operand::Type(_) => OperandKind::Type,
            Operand::String(_) => OperandKind::String,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Immediate(imm) => write!(f, "{imm}"),
            Operand::Local(l) => write!(f, "V_{l}"),
            Operand::Argument(a) => write!(f, "A_{a}"),
            Operand::Label(label) => write!(f, "{label}"),
            Operand::Switch(labels) => {
                let names: Vec<String> = labels.iter().map(ToString::to_string).collect();
                write!(f, "({})", names.join(", "))
            }
            Operand::Method(m) => write!(f, "{m}"),
            Operand::Field(field) => write!(f, "{field}"),
            Operand::Type(ty) => write!(f, "{ty}"),
            Operand::String(s) => write!(f, "{s:?}"),
        }
    }
}

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Conditional branch to another location
    ConditionalBranch,
    /// Always branches to another location (unconditional jump)
    UnconditionalBranch,
    /// Call to another method
    Call,
    /// Returns from current method
    Return,
    /// Multi-way branch (switch statement)
    Switch,
    /// Exception throwing
    Throw,
    /// End of finally or filter block
    EndFinally,
    /// Leave protected region (try/catch/finally)
    Leave,
}

/// Stack effect of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackBehavior {
    /// Number of items popped from stack
    pub pops: u16,
    /// Number of items pushed to stack
    pub pushes: u8,
}

impl StackBehavior {
    /// Creates a stack behavior from its pop and push counts.
    #[must_use]
    pub const fn new(pops: u16, pushes: u8) -> Self {
        Self { pops, pushes }
    }

    /// Net effect on stack depth (pushes - pops)
    #[must_use]
    pub const fn net_effect(self) -> i32 {
        self.pushes as i32 - self.pops as i32
    }
}

/// A decoded instruction together with the labels and exception block markers
/// that point at it.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The operation
    pub opcode: Opcode,
    /// The operand data for this instruction
    pub operand: Operand,
    /// Labels resolving to this instruction, in attachment order
    pub labels: Vec<Label>,
    /// Exception block boundaries positioned before this instruction
    pub blocks: Vec<ExceptionBlock>,
}

impl Instruction {
    /// Creates an instruction without operand.
    #[must_use]
    pub fn new(opcode: Opcode) -> Self {
        Self::with_operand(opcode, Operand::None)
    }

    /// Creates an instruction with the given operand.
    ///
    /// The operand kind is checked in debug builds.
    #[must_use]
    pub fn with_operand(opcode: Opcode, operand: Operand) -> Self {
        debug_assert_eq!(
            opcode.operand_kind(),
            operand.kind(),
            "operand {operand:?} does not fit {opcode}"
        );
        Self {
            opcode,
            operand,
            labels: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Attaches a label to this instruction.
    #[must_use]
    pub fn with_label(mut self, label: Label) -> Self {
        self.labels.push(label);
        self
    }

    /// Attaches several labels to this instruction.
    #[must_use]
    pub fn with_labels(mut self, labels: impl IntoIterator<Item = Label>) -> Self {
        self.labels.extend(labels);
        self
    }

    /// Attaches an exception block marker to this instruction.
    #[must_use]
    pub fn with_block(mut self, block: ExceptionBlock) -> Self {
        self.blocks.push(block);
        self
    }

    /// Moves all labels and block markers from `other` onto this instruction,
    /// leaving `other` without any.
    #[must_use]
    pub fn move_markers_from(mut self, other: &mut Instruction) -> Self {
        self.take_markers_from(other);
        self
    }

    /// In-place form of [`Instruction::move_markers_from`]. Markers already on
    /// `self` stay first.
    pub fn take_markers_from(&mut self, other: &mut Instruction) {
        self.labels.append(&mut other.labels);
        self.blocks.append(&mut other.blocks);
    }

    /// Removes and returns the labels of this instruction.
    pub fn extract_labels(&mut self) -> Vec<Label> {
        std::mem::take(&mut self.labels)
    }

    /// Returns `true` if anything targets this instruction.
    #[must_use]
    pub fn has_markers(&self) -> bool {
        !self.labels.is_empty() || !self.blocks.is_empty()
    }

    /// How this instruction affects control flow.
    #[must_use]
    pub fn flow_type(&self) -> FlowType {
        self.opcode.flow_type()
    }

    /// Check if this instruction is a branch instruction.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(
            self.flow_type(),
            FlowType::ConditionalBranch
                | FlowType::UnconditionalBranch
                | FlowType::Switch
                | FlowType::Leave
        )
    }

    /// Check if execution can never fall through to the next instruction.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.flow_type(),
            FlowType::UnconditionalBranch
                | FlowType::Return
                | FlowType::Throw
                | FlowType::EndFinally
                | FlowType::Leave
        )
    }

    /// Labels this instruction can branch to.
    #[must_use]
    pub fn branch_targets(&self) -> Vec<Label> {
        match &self.operand {
            Operand::Label(label) => vec![*label],
            Operand::Switch(labels) => labels.clone(),
            _ => Vec::new(),
        }
    }

    /// Stack effect of this instruction.
    ///
    /// `method_returns_value` describes the enclosing method and is only
    /// consulted for `ret`.
    #[must_use]
    pub fn stack_behavior(&self, method_returns_value: bool) -> StackBehavior {
        if let Some(fixed) = self.opcode.fixed_stack_behavior() {
            return fixed;
        }

        match (&self.opcode, &self.operand) {
            (Opcode::Ret, _) => StackBehavior::new(u16::from(method_returns_value), 0),
            (Opcode::Newobj, Operand::Method(ctor)) => {
                StackBehavior::new(u16::from(ctor.param_count()), 1)
            }
            (Opcode::Call | Opcode::Callvirt, Operand::Method(method)) => StackBehavior::new(
                u16::from(method.param_count()) + u16::from(method.has_this()),
                u8::from(method.returns_value()),
            ),
            _ => StackBehavior::new(0, 0),
        }
    }

    /// Local slot accessed by this instruction, including the short forms.
    #[must_use]
    pub fn local_index(&self) -> Option<u16> {
        if !(self.opcode.is_ldloc()
            || self.opcode.is_stloc()
            || matches!(self.opcode, Opcode::LdlocaS))
        {
            return None;
        }
        match (self.opcode.implicit_slot(), &self.operand) {
            (Some(slot), _) => Some(slot),
            (None, Operand::Local(slot)) => Some(*slot),
            _ => None,
        }
    }

    /// Argument slot accessed by this instruction, including the short forms.
    #[must_use]
    pub fn argument_index(&self) -> Option<u16> {
        match (self.opcode.implicit_slot(), &self.operand) {
            (Some(slot), _) if self.opcode.is_ldarg() => Some(slot),
            (None, Operand::Argument(slot)) => Some(*slot),
            _ => None,
        }
    }

    /// The method operand, if any.
    #[must_use]
    pub fn method(&self) -> Option<&MethodRef> {
        match &self.operand {
            Operand::Method(method) => Some(method),
            _ => None,
        }
    }

    /// The field operand, if any.
    #[must_use]
    pub fn field(&self) -> Option<&FieldRef> {
        match &self.operand {
            Operand::Field(field) => Some(field),
            _ => None,
        }
    }

    /// Returns `true` if this instruction calls (or constructs through) `method`.
    #[must_use]
    pub fn calls(&self, method: &MethodRef) -> bool {
        matches!(self.opcode, Opcode::Call | Opcode::Callvirt | Opcode::Newobj)
            && self.method() == Some(method)
    }

    /// Returns `true` if this instruction loads the value of `field`.
    #[must_use]
    pub fn loads_field(&self, field: &FieldRef) -> bool {
        matches!(self.opcode, Opcode::Ldfld | Opcode::Ldsfld) && self.field() == Some(field)
    }

    /// Returns `true` if this instruction stores into `field`.
    #[must_use]
    pub fn stores_field(&self, field: &FieldRef) -> bool {
        matches!(self.opcode, Opcode::Stfld | Opcode::Stsfld) && self.field() == Some(field)
    }

    /// Returns `true` if this instruction loads local `slot`.
    #[must_use]
    pub fn loads_local(&self, slot: u16) -> bool {
        self.opcode.is_ldloc() && self.local_index() == Some(slot)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for label in &self.labels {
            write!(f, "{label}: ")?;
        }
        write!(f, "{}", self.opcode)?;
        if self.operand != Operand::None {
            write!(f, " {}", self.operand)?;
        }
        for block in &self.blocks {
            write!(f, " [{block:?}]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_type() -> TypeRef {
        TypeRef::new("Exiled.Events.EventArgs", "TogglingFlashlightEventArgs")
    }

    #[test]
    fn test_stack_behavior_calls() {
        let ctor = MethodRef::constructor(event_type(), 4);
        let newobj = Instruction::with_operand(Opcode::Newobj, Operand::Method(ctor));
        assert_eq!(newobj.stack_behavior(false), StackBehavior::new(4, 1));

        let getter = MethodRef::getter(event_type(), "IsAllowed");
        let callvirt = Instruction::with_operand(Opcode::Callvirt, Operand::Method(getter));
        assert_eq!(callvirt.stack_behavior(false).net_effect(), 0);

        let publish = MethodRef::new(TypeRef::new("Handlers", "Player"), "OnTogglingFlashlight")
            .with_params(1);
        let call = Instruction::with_operand(Opcode::Call, Operand::Method(publish));
        assert_eq!(call.stack_behavior(false).net_effect(), -1);
    }

    #[test]
    fn test_stack_behavior_widest_instance_call() {
        let wide = MethodRef::instance(event_type(), "Wide").with_params(u8::MAX);
        let call = Instruction::with_operand(Opcode::Callvirt, Operand::Method(wide));
        assert_eq!(call.stack_behavior(false).pops, 256);
        assert_eq!(call.stack_behavior(false).net_effect(), -256);
    }

    #[test]
    fn test_ret_depends_on_method() {
        let ret = Instruction::new(Opcode::Ret);
        assert_eq!(ret.stack_behavior(false).pops, 0);
        assert_eq!(ret.stack_behavior(true).pops, 1);
    }

    #[test]
    fn test_local_and_argument_indices() {
        assert_eq!(Instruction::new(Opcode::Ldloc1).local_index(), Some(1));
        assert_eq!(
            Instruction::with_operand(Opcode::StlocS, Operand::Local(9)).local_index(),
            Some(9)
        );
        assert_eq!(Instruction::new(Opcode::Ldarg1).local_index(), None);
        assert_eq!(Instruction::new(Opcode::Ldarg1).argument_index(), Some(1));
        assert!(Instruction::new(Opcode::Ldloc1).loads_local(1));
        assert!(!Instruction::new(Opcode::Stloc1).loads_local(1));
    }

    #[test]
    fn test_move_markers() {
        let mut original = Instruction::new(Opcode::Ldloc1)
            .with_label(Label::new(3))
            .with_block(ExceptionBlock::BeginTry);
        let moved = Instruction::new(Opcode::Ldloc0).move_markers_from(&mut original);

        assert_eq!(moved.labels, vec![Label::new(3)]);
        assert_eq!(moved.blocks, vec![ExceptionBlock::BeginTry]);
        assert!(!original.has_markers());
    }

    #[test]
    fn test_terminal_and_targets() {
        let switch = Instruction::with_operand(
            Opcode::Switch,
            Operand::Switch(vec![Label::new(1), Label::new(2)]),
        );
        assert!(switch.is_branch());
        assert!(!switch.is_terminal());
        assert_eq!(switch.branch_targets().len(), 2);
        assert!(Instruction::new(Opcode::Ret).is_terminal());
        assert!(!Instruction::new(Opcode::Dup).is_terminal());
    }

    #[test]
    fn test_display() {
        let field = FieldRef::new(TypeRef::new("", "FlashlightMessage"), "NewState");
        let instruction =
            Instruction::with_operand(Opcode::Ldfld, Operand::Field(field)).with_label(Label::new(2));
        assert_eq!(instruction.to_string(), "L_0002: ldfld FlashlightMessage::NewState");
    }
}
