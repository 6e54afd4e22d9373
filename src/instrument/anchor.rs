//! Anchor rules locating splice points inside a method body.
//!
//! An [`AnchorRule`] addresses an instruction structurally: by opcode, by the
//! identity of the member or value it references, or by an arbitrary
//! predicate. Positions are never hard-coded, because earlier patch steps in
//! the same pass shift every index after them.
//!
//! # Available Matchers
//!
//! | Matcher | Description |
//! |---------|-------------|
//! | [`OpcodeMatcher`] | Match by opcode |
//! | [`OperandMatcher`] | Match by exact operand |
//! | [`MemberMatcher`] | Match calls of a method or accesses of a field |
//! | [`PredicateMatcher`] | Match by an arbitrary predicate |
//!
//! All matchers on a rule must match (AND semantics).
//!
//! # Resolution
//!
//! Matches are collected in buffer order, then the rule picks the
//! `occurrence`-th match counting in its [`Direction`] (`Last` counts from the
//! end), and finally applies the signed `offset`. With [`Expect::Unique`] the
//! rule fails unless exactly one instruction matches.
//!
//! ```rust
//! use hostpatch::assembly::{Instruction, InstructionBuffer, Opcode};
//! use hostpatch::instrument::AnchorRule;
//!
//! let buffer = InstructionBuffer::from_instructions(vec![
//!     Instruction::new(Opcode::Ldloc1),
//!     Instruction::new(Opcode::Pop),
//!     Instruction::new(Opcode::Ldloc1),
//!     Instruction::new(Opcode::Ret),
//! ]);
//!
//! assert_eq!(AnchorRule::opcode(Opcode::Ldloc1).resolve(&buffer)?, 0);
//! assert_eq!(AnchorRule::opcode(Opcode::Ldloc1).last().resolve(&buffer)?, 2);
//! assert_eq!(AnchorRule::opcode(Opcode::Ret).offset(-1).resolve(&buffer)?, 2);
//! assert!(AnchorRule::opcode(Opcode::Ldloc1).unique().resolve(&buffer).is_err());
//! # Ok::<(), hostpatch::Error>(())
//! ```

use std::{fmt, sync::Arc};

use crate::{
    assembly::{FieldRef, Instruction, InstructionBuffer, MethodRef, Opcode, Operand},
    Error, Result,
};

/// Type alias for predicate matchers.
pub type InstructionPredicate = dyn Fn(&Instruction) -> bool + Send + Sync;

/// A single matching criterion for anchor rules.
pub trait InstructionMatcher: Send + Sync {
    /// Checks if this matcher accepts `instruction`.
    fn matches(&self, instruction: &Instruction) -> bool;

    /// Returns a short description of this matcher for diagnostics.
    fn description(&self) -> String;
}

/// Matches instructions with a given opcode.
#[derive(Debug, Clone, Copy)]
pub struct OpcodeMatcher(pub Opcode);

impl InstructionMatcher for OpcodeMatcher {
    fn matches(&self, instruction: &Instruction) -> bool {
        instruction.opcode == self.0
    }

    fn description(&self) -> String {
        format!("opcode={}", self.0)
    }
}

/// Matches instructions whose operand equals a given operand.
#[derive(Debug, Clone)]
pub struct OperandMatcher(pub Operand);

impl InstructionMatcher for OperandMatcher {
    fn matches(&self, instruction: &Instruction) -> bool {
        instruction.operand == self.0
    }

    fn description(&self) -> String {
        format!("operand={}", self.0)
    }
}

/// Matches instructions referencing a host member.
#[derive(Debug, Clone)]
pub enum MemberMatcher {
    /// `call`, `callvirt` or `newobj` of the method
    Calls(MethodRef),
    /// `ldfld` or `ldsfld` of the field
    LoadsField(FieldRef),
    /// `stfld` or `stsfld` of the field
    StoresField(FieldRef),
}

impl InstructionMatcher for MemberMatcher {
    fn matches(&self, instruction: &Instruction) -> bool {
        match self {
            MemberMatcher::Calls(method) => instruction.calls(method),
            MemberMatcher::LoadsField(field) => instruction.loads_field(field),
            MemberMatcher::StoresField(field) => instruction.stores_field(field),
        }
    }

    fn description(&self) -> String {
        match self {
            MemberMatcher::Calls(method) => format!("calls={method}"),
            MemberMatcher::LoadsField(field) => format!("loads={field}"),
            MemberMatcher::StoresField(field) => format!("stores={field}"),
        }
    }
}

/// Matches instructions by an arbitrary predicate.
pub struct PredicateMatcher {
    name: String,
    predicate: Arc<InstructionPredicate>,
}

impl PredicateMatcher {
    /// Creates a predicate matcher with a diagnostic name.
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Instruction) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }
}

impl InstructionMatcher for PredicateMatcher {
    fn matches(&self, instruction: &Instruction) -> bool {
        (self.predicate)(instruction)
    }

    fn description(&self) -> String {
        format!("predicate={}", self.name)
    }
}

/// Which end of the buffer occurrences are counted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Count matches from the start of the buffer
    #[default]
    First,
    /// Count matches from the end of the buffer
    Last,
}

/// How many matches a rule tolerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expect {
    /// Any number of matches, as long as the requested occurrence exists
    #[default]
    Any,
    /// Exactly one instruction must match
    Unique,
}

/// A structural rule addressing one instruction.
#[derive(Clone, Default)]
pub struct AnchorRule {
    matchers: Vec<Arc<dyn InstructionMatcher>>,
    direction: Direction,
    occurrence: usize,
    offset: isize,
    expect: Expect,
}

impl AnchorRule {
    /// Creates a rule without matchers; it matches every instruction.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rule matching instructions with `opcode`.
    #[must_use]
    pub fn opcode(opcode: Opcode) -> Self {
        Self::new().with_matcher(OpcodeMatcher(opcode))
    }

    /// Rule matching `opcode` with exactly `operand`.
    #[must_use]
    pub fn instruction(opcode: Opcode, operand: Operand) -> Self {
        Self::opcode(opcode).with_matcher(OperandMatcher(operand))
    }

    /// Rule matching any call or construction through `method`.
    #[must_use]
    pub fn calls(method: MethodRef) -> Self {
        Self::new().with_matcher(MemberMatcher::Calls(method))
    }

    /// Rule matching loads of `field`.
    #[must_use]
    pub fn loads_field(field: FieldRef) -> Self {
        Self::new().with_matcher(MemberMatcher::LoadsField(field))
    }

    /// Rule matching stores into `field`.
    #[must_use]
    pub fn stores_field(field: FieldRef) -> Self {
        Self::new().with_matcher(MemberMatcher::StoresField(field))
    }

    /// Rule matching instructions accepted by `predicate`.
    #[must_use]
    pub fn matching<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Instruction) -> bool + Send + Sync + 'static,
    {
        Self::new().with_matcher(PredicateMatcher::new(name, predicate))
    }

    /// Adds a matcher; all matchers must accept an instruction.
    #[must_use]
    pub fn with_matcher(mut self, matcher: impl InstructionMatcher + 'static) -> Self {
        self.matchers.push(Arc::new(matcher));
        self
    }

    /// Counts occurrences from the start of the buffer (the default).
    #[must_use]
    pub fn first(mut self) -> Self {
        self.direction = Direction::First;
        self
    }

    /// Counts occurrences from the end of the buffer.
    #[must_use]
    pub fn last(mut self) -> Self {
        self.direction = Direction::Last;
        self
    }

    /// Selects the `n`-th match (zero based) in the search direction.
    #[must_use]
    pub fn nth(mut self, n: usize) -> Self {
        self.occurrence = n;
        self
    }

    /// Shifts the resolved position by `offset` instructions.
    #[must_use]
    pub fn offset(mut self, offset: isize) -> Self {
        self.offset = offset;
        self
    }

    /// Requires exactly one matching instruction.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.expect = Expect::Unique;
        self
    }

    /// Search direction.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Checks whether `instruction` satisfies every matcher.
    #[must_use]
    pub fn matches(&self, instruction: &Instruction) -> bool {
        self.matchers.iter().all(|m| m.matches(instruction))
    }

    /// Resolves the rule to an instruction index in `buffer`.
    ///
    /// # Errors
    ///
    /// - [`Error::AnchorNotFound`] if fewer than `occurrence + 1` instructions match
    /// - [`Error::AnchorAmbiguous`] if the rule is unique and several match
    /// - [`Error::IndexOutOfRange`] if the offset leaves the buffer
    pub fn resolve(&self, buffer: &InstructionBuffer) -> Result<usize> {
        let matches = buffer.positions(|instruction| self.matches(instruction));

        if self.expect == Expect::Unique && matches.len() > 1 {
            return Err(Error::AnchorAmbiguous {
                rule: self.to_string(),
                count: matches.len(),
            });
        }

        let found = match self.direction {
            Direction::First => matches.get(self.occurrence),
            Direction::Last => matches.iter().rev().nth(self.occurrence),
        };
        let Some(&index) = found else {
            return Err(Error::AnchorNotFound(self.to_string()));
        };

        let shifted = isize::try_from(index)
            .ok()
            .and_then(|index| index.checked_add(self.offset));
        match shifted.and_then(|shifted| usize::try_from(shifted).ok()) {
            Some(position) if position < buffer.len() => Ok(position),
            _ => Err(Error::IndexOutOfRange {
                index: shifted.unwrap_or(if self.offset < 0 { isize::MIN } else { isize::MAX }),
                len: buffer.len(),
            }),
        }
    }
}

impl fmt::Display for AnchorRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let matchers: Vec<String> = self.matchers.iter().map(|m| m.description()).collect();
        let direction = match self.direction {
            Direction::First => "first",
            Direction::Last => "last",
        };
        write!(f, "{direction}[{}] {{{}}}", self.occurrence, matchers.join(", "))?;
        if self.offset != 0 {
            write!(f, " {:+}", self.offset)?;
        }
        if self.expect == Expect::Unique {
            write!(f, " unique")?;
        }
        Ok(())
    }
}

impl fmt::Debug for AnchorRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnchorRule({self})")
    }
}
