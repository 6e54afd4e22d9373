//! Mutable method body: instructions, locals and a label allocator.
//!
//! [`InstructionBuffer`] is the unit the instrumentation engine rewrites. Every
//! splice primitive on it keeps the structural invariants intact:
//!
//! - inserting moves the labels and block markers of the instruction at the
//!   insertion point onto the first inserted instruction, so branches into the
//!   old position now run the inserted code first;
//! - removing moves the markers of the removed run onto the instruction that
//!   follows it, so no branch is left dangling;
//! - replacing moves the markers of the removed run onto the first replacement
//!   instruction, leaving the follower untouched.
//!
//! [`InstructionBuffer::validate`] checks the invariants explicitly: every
//! branch target resolves to exactly one instruction and exception block
//! markers are balanced and correctly nested.
//!
//! # Examples
//!
//! ```rust
//! use hostpatch::assembly::{Instruction, InstructionBuffer, Opcode, Operand};
//!
//! let mut buffer = InstructionBuffer::new();
//! let exit = buffer.define_label();
//! buffer.push(Instruction::new(Opcode::Ldarg0));
//! buffer.push(Instruction::with_operand(Opcode::BrfalseS, Operand::Label(exit)));
//! buffer.push(Instruction::new(Opcode::Nop));
//! buffer.push(Instruction::new(Opcode::Ret).with_label(exit));
//! buffer.validate()?;
//!
//! // Dropping the nop keeps the buffer valid
//! buffer.remove_range(2, 1)?;
//! assert_eq!(buffer.len(), 3);
//! buffer.validate()?;
//! # Ok::<(), hostpatch::Error>(())
//! ```

use std::{collections::HashMap, fmt, ops::Range};

use crate::{
    assembly::{
        exceptions::{scan_regions, ExceptionBlock, ExceptionRegion},
        instruction::{Instruction, Label},
        members::TypeRef,
    },
    Error, Result,
};

/// A declared local variable slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    /// Slot index
    pub index: u16,
    /// Declared type
    pub ty: TypeRef,
}

/// Net stack effect of a run of instructions.
///
/// `returns_value` describes the enclosing method and only matters if the run
/// contains `ret`.
#[must_use]
pub fn net_stack_effect(instructions: &[Instruction], returns_value: bool) -> i32 {
    instructions
        .iter()
        .map(|instruction| instruction.stack_behavior(returns_value).net_effect())
        .sum()
}

/// Decoded body of one method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstructionBuffer {
    instructions: Vec<Instruction>,
    locals: Vec<LocalVariable>,
    next_label: u32,
    returns_value: bool,
}

impl InstructionBuffer {
    /// Creates an empty buffer for a method returning `void`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer from already decoded instructions.
    ///
    /// The label allocator starts above every label id found in the input, so
    /// labels defined afterwards never collide with existing ones.
    #[must_use]
    pub fn from_instructions(instructions: Vec<Instruction>) -> Self {
        let next_label = instructions
            .iter()
            .flat_map(|instruction| {
                instruction
                    .labels
                    .iter()
                    .copied()
                    .chain(instruction.branch_targets())
            })
            .map(|label| label.id() + 1)
            .max()
            .unwrap_or(0);

        Self {
            instructions,
            next_label,
            ..Self::default()
        }
    }

    /// Declares the given locals, in slot order, before any local added by a
    /// patch.
    #[must_use]
    pub fn with_locals(mut self, types: impl IntoIterator<Item = TypeRef>) -> Self {
        for ty in types {
            self.declare_local(ty);
        }
        self
    }

    /// Marks the method as returning a value (`ret` pops one item).
    #[must_use]
    pub fn returning(mut self) -> Self {
        self.returns_value = true;
        self
    }

    /// Whether the method returns a value.
    #[must_use]
    pub fn returns_value(&self) -> bool {
        self.returns_value
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` if the buffer holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Instruction at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    /// Mutable instruction at `index`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Instruction> {
        self.instructions.get_mut(index)
    }

    /// All instructions in order.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Iterates over the instructions in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }

    /// Consumes the buffer, returning its instructions.
    #[must_use]
    pub fn into_instructions(self) -> Vec<Instruction> {
        self.instructions
    }

    /// Declared local variables, in slot order.
    #[must_use]
    pub fn locals(&self) -> &[LocalVariable] {
        &self.locals
    }

    /// Appends an instruction.
    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Declares a fresh local variable and returns its slot.
    pub fn declare_local(&mut self, ty: TypeRef) -> u16 {
        let index = u16::try_from(self.locals.len()).unwrap_or(u16::MAX);
        self.locals.push(LocalVariable { index, ty });
        index
    }

    /// Allocates a label that is not yet attached to any instruction.
    pub fn define_label(&mut self) -> Label {
        let label = Label::new(self.next_label);
        self.next_label += 1;
        label
    }

    /// Index of the first instruction satisfying `predicate`.
    pub fn find_index(&self, predicate: impl Fn(&Instruction) -> bool) -> Option<usize> {
        self.instructions.iter().position(predicate)
    }

    /// Index of the last instruction satisfying `predicate`.
    pub fn find_last_index(&self, predicate: impl Fn(&Instruction) -> bool) -> Option<usize> {
        self.instructions.iter().rposition(predicate)
    }

    /// Indices of every instruction satisfying `predicate`, ascending.
    pub fn positions(&self, predicate: impl Fn(&Instruction) -> bool) -> Vec<usize> {
        self.instructions
            .iter()
            .enumerate()
            .filter(|(_, instruction)| predicate(instruction))
            .map(|(index, _)| index)
            .collect()
    }

    /// Index of the instruction carrying `label`.
    #[must_use]
    pub fn label_target(&self, label: Label) -> Option<usize> {
        self.find_index(|instruction| instruction.labels.contains(&label))
    }

    /// Returns a label for the instruction at `index`, reusing its first
    /// existing label or attaching a newly allocated one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index` is outside the buffer.
    pub fn label_at(&mut self, index: usize) -> Result<Label> {
        let len = self.len();
        if let Some(existing) = self
            .instructions
            .get(index)
            .and_then(|instruction| instruction.labels.first())
        {
            return Ok(*existing);
        }
        if index >= len {
            return Err(out_of_range(index, len));
        }

        let label = self.define_label();
        self.instructions[index].labels.push(label);
        Ok(label)
    }

    /// Inserts `fragment` so that its first instruction ends up at `index`.
    ///
    /// Labels and block markers of the instruction previously at `index` move
    /// onto the first inserted instruction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index > len`.
    pub fn insert_range(&mut self, index: usize, mut fragment: Vec<Instruction>) -> Result<()> {
        if index > self.len() {
            return Err(out_of_range(index, self.len()));
        }
        if fragment.is_empty() {
            return Ok(());
        }

        if let Some(displaced) = self.instructions.get_mut(index) {
            fragment[0].take_markers_from(displaced);
        }
        self.instructions.splice(index..index, fragment);
        Ok(())
    }

    /// Removes `count` instructions starting at `index` and returns them.
    ///
    /// Labels and block markers of the removed run move onto the instruction
    /// that follows it, ahead of that instruction's own markers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if the run exceeds the buffer, or
    /// [`Error::UnresolvedLabel`] / [`Error::UnbalancedExceptionBlock`] if the
    /// run carries markers and nothing follows it.
    pub fn remove_range(&mut self, index: usize, count: usize) -> Result<Vec<Instruction>> {
        let range = self.checked_range(index, count)?;
        if range.end == self.len() {
            let run = &self.instructions[range.clone()];
            if let Some(label) = run.iter().flat_map(|i| i.labels.iter()).next() {
                return Err(Error::UnresolvedLabel(*label));
            }
            if run.iter().any(|i| !i.blocks.is_empty()) {
                return Err(Error::UnbalancedExceptionBlock {
                    index: range.start,
                    message: "removed run carries block markers but ends the method".to_string(),
                });
            }
        }

        let (labels, blocks) = self.drain_markers(range.clone());
        if let Some(follower) = self.instructions.get_mut(range.end) {
            prepend_markers(follower, labels, blocks);
        }

        Ok(self.instructions.drain(range).collect())
    }

    /// Replaces `count` instructions starting at `index` with `replacement`
    /// and returns the removed run.
    ///
    /// Labels and block markers of the removed run move onto the first
    /// replacement instruction. An empty replacement behaves like
    /// [`InstructionBuffer::remove_range`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if the run exceeds the buffer.
    pub fn replace_range(
        &mut self,
        index: usize,
        count: usize,
        mut replacement: Vec<Instruction>,
    ) -> Result<Vec<Instruction>> {
        if replacement.is_empty() {
            return self.remove_range(index, count);
        }

        let range = self.checked_range(index, count)?;
        let (labels, blocks) = self.drain_markers(range.clone());
        prepend_markers(&mut replacement[0], labels, blocks);

        Ok(self.instructions.splice(range, replacement).collect())
    }

    /// Net stack effect of the instructions in `range`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if the range exceeds the buffer.
    pub fn stack_effect(&self, range: Range<usize>) -> Result<i32> {
        let range = self.checked_range(range.start, range.end.saturating_sub(range.start))?;
        Ok(net_stack_effect(
            &self.instructions[range],
            self.returns_value,
        ))
    }

    /// Recovers the exception handler table, innermost clauses first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnbalancedExceptionBlock`] if the markers do not nest.
    pub fn exception_regions(&self) -> Result<Vec<ExceptionRegion>> {
        scan_regions(&self.instructions)
    }

    /// Checks the structural invariants of the buffer.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateLabel`] if a label is attached to two instructions
    /// - [`Error::UnresolvedLabel`] if a branch targets an unattached label
    /// - [`Error::UnbalancedExceptionBlock`] if block markers do not nest
    pub fn validate(&self) -> Result<()> {
        let mut targets: HashMap<Label, usize> = HashMap::new();
        for (index, instruction) in self.instructions.iter().enumerate() {
            for label in &instruction.labels {
                if targets.insert(*label, index).is_some() {
                    return Err(Error::DuplicateLabel(*label));
                }
            }
        }

        for instruction in &self.instructions {
            for label in instruction.branch_targets() {
                if !targets.contains_key(&label) {
                    return Err(Error::UnresolvedLabel(label));
                }
            }
        }

        scan_regions(&self.instructions).map(|_| ())
    }

    fn checked_range(&self, index: usize, count: usize) -> Result<Range<usize>> {
        let end = index.saturating_add(count);
        if end > self.len() {
            return Err(out_of_range(end, self.len()));
        }
        Ok(index..end)
    }

    fn drain_markers(&mut self, range: Range<usize>) -> (Vec<Label>, Vec<ExceptionBlock>) {
        let mut labels = Vec::new();
        let mut blocks = Vec::new();
        for instruction in &mut self.instructions[range] {
            labels.append(&mut instruction.labels);
            blocks.append(&mut instruction.blocks);
        }
        (labels, blocks)
    }
}

fn prepend_markers(target: &mut Instruction, mut labels: Vec<Label>, mut blocks: Vec<ExceptionBlock>) {
    labels.append(&mut target.labels);
    blocks.append(&mut target.blocks);
    target.labels = labels;
    target.blocks = blocks;
}

fn out_of_range(index: usize, len: usize) -> Error {
    Error::IndexOutOfRange {
        index: isize::try_from(index).unwrap_or(isize::MAX),
        len,
    }
}

impl<'a> IntoIterator for &'a InstructionBuffer {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for InstructionBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for local in &self.locals {
            writeln!(f, ".local V_{} {}", local.index, local.ty)?;
        }
        for (index, instruction) in self.instructions.iter().enumerate() {
            writeln!(f, "{index:04}  {instruction}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{Opcode, Operand};

    fn guarded_body() -> (InstructionBuffer, Label) {
        let mut buffer = InstructionBuffer::new();
        let exit = buffer.define_label();
        buffer.push(Instruction::new(Opcode::Ldarg1));
        buffer.push(Instruction::with_operand(Opcode::BrfalseS, Operand::Label(exit)));
        buffer.push(Instruction::new(Opcode::Ldarg0));
        buffer.push(Instruction::new(Opcode::Pop));
        buffer.push(Instruction::new(Opcode::Ret).with_label(exit));
        (buffer, exit)
    }

    #[test]
    fn test_from_instructions_allocates_fresh_labels() {
        let (buffer, exit) = guarded_body();
        let mut rebuilt = InstructionBuffer::from_instructions(buffer.into_instructions());
        let fresh = rebuilt.define_label();
        assert!(fresh.id() > exit.id());
    }

    #[test]
    fn test_insert_moves_markers_to_first() {
        let (mut buffer, exit) = guarded_body();
        buffer
            .insert_range(4, vec![Instruction::new(Opcode::Nop), Instruction::new(Opcode::Nop)])
            .unwrap();

        assert_eq!(buffer.label_target(exit), Some(4));
        assert!(buffer.get(6).unwrap().labels.is_empty());
        buffer.validate().unwrap();
    }

    #[test]
    fn test_insert_at_end() {
        let (mut buffer, _) = guarded_body();
        buffer.insert_range(5, vec![Instruction::new(Opcode::Nop)]).unwrap();
        assert_eq!(buffer.len(), 6);
        assert!(matches!(
            buffer.insert_range(9, vec![Instruction::new(Opcode::Nop)]),
            Err(Error::IndexOutOfRange { index: 9, len: 6 })
        ));
    }

    #[test]
    fn test_remove_moves_markers_to_follower() {
        let (mut buffer, exit) = guarded_body();
        let inner = buffer.define_label();
        buffer.get_mut(2).unwrap().labels.push(inner);

        let removed = buffer.remove_range(2, 2).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(removed[0].labels.is_empty());

        let ret = buffer.get(2).unwrap();
        assert_eq!(ret.labels, vec![inner, exit]);
    }

    #[test]
    fn test_remove_trailing_labelled_run_fails() {
        let (mut buffer, exit) = guarded_body();
        assert!(matches!(
            buffer.remove_range(4, 1),
            Err(Error::UnresolvedLabel(label)) if label == exit
        ));
        assert!(buffer.remove_range(3, 5).is_err());
    }

    #[test]
    fn test_replace_keeps_follower_labels() {
        let (mut buffer, exit) = guarded_body();
        let start = buffer.label_at(2).unwrap();
        buffer
            .replace_range(2, 2, vec![Instruction::new(Opcode::Nop)])
            .unwrap();

        assert_eq!(buffer.get(2).unwrap().labels, vec![start]);
        assert_eq!(buffer.label_target(exit), Some(3));
        buffer.validate().unwrap();
    }

    #[test]
    fn test_label_at_reuses_existing() {
        let (mut buffer, exit) = guarded_body();
        assert_eq!(buffer.label_at(4).unwrap(), exit);
        let new = buffer.label_at(0).unwrap();
        assert_ne!(new, exit);
        assert_eq!(buffer.label_target(new), Some(0));
        assert!(buffer.label_at(10).is_err());
    }

    #[test]
    fn test_validate_detects_broken_labels() {
        let (mut buffer, exit) = guarded_body();
        buffer.get_mut(0).unwrap().labels.push(exit);
        assert!(matches!(buffer.validate(), Err(Error::DuplicateLabel(_))));

        let (mut buffer, _) = guarded_body();
        buffer.get_mut(4).unwrap().labels.clear();
        assert!(matches!(buffer.validate(), Err(Error::UnresolvedLabel(_))));
    }

    #[test]
    fn test_stack_effect() {
        let (buffer, _) = guarded_body();
        assert_eq!(buffer.stack_effect(0..2).unwrap(), 0);
        assert_eq!(buffer.stack_effect(2..3).unwrap(), 1);
        assert!(buffer.stack_effect(3..7).is_err());
    }

    #[test]
    fn test_declare_local() {
        let mut buffer = InstructionBuffer::new().with_locals([TypeRef::new("", "ReferenceHub")]);
        let slot = buffer.declare_local(TypeRef::new("System", "Single"));
        assert_eq!(slot, 1);
        assert_eq!(buffer.locals()[1].ty.name(), "Single");
    }
}
