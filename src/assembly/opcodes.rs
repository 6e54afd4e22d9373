//! CIL opcodes understood by the instruction buffer.
//!
//! Only the subset of ECMA-335 opcodes that host method bodies and spliced
//! fragments actually use is modelled. Each [`Opcode`] knows its encoded value,
//! its mnemonic, the kind of operand it takes, how it affects control flow and
//! (where fixed) how it affects the evaluation stack.
//!
//! Mnemonics round-trip through [`std::str::FromStr`] and [`std::fmt::Display`]:
//!
//! ```rust
//! use hostpatch::assembly::Opcode;
//!
//! let op: Opcode = "brfalse.s".parse().unwrap();
//! assert_eq!(op, Opcode::BrfalseS);
//! assert_eq!(op.to_string(), "brfalse.s");
//! assert_eq!(op.value(), 0x2C);
//! ```

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::assembly::instruction::{FlowType, StackBehavior};

/// Kind of operand an opcode expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operand present
    None,
    /// Signed 8-bit immediate
    Int8,
    /// Signed 32-bit immediate
    Int32,
    /// Signed 64-bit immediate
    Int64,
    /// 32-bit floating point immediate
    Float32,
    /// 64-bit floating point immediate
    Float64,
    /// Local variable slot
    Local,
    /// Argument slot
    Argument,
    /// Branch target label
    Label,
    /// Switch table of labels
    Switch,
    /// Method reference
    Method,
    /// Field reference
    Field,
    /// Type reference
    Type,
    /// String literal
    String,
}

/// A CIL opcode.
///
/// Short and long encodings are distinct opcodes, exactly as they are in the
/// encoded instruction stream.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[allow(missing_docs)]
pub enum Opcode {
    #[strum(serialize = "nop")]
    Nop,
    #[strum(serialize = "ldarg.0")]
    Ldarg0,
    #[strum(serialize = "ldarg.1")]
    Ldarg1,
    #[strum(serialize = "ldarg.2")]
    Ldarg2,
    #[strum(serialize = "ldarg.3")]
    Ldarg3,
    #[strum(serialize = "ldloc.0")]
    Ldloc0,
    #[strum(serialize = "ldloc.1")]
    Ldloc1,
    #[strum(serialize = "ldloc.2")]
    Ldloc2,
    #[strum(serialize = "ldloc.3")]
    Ldloc3,
    #[strum(serialize = "stloc.0")]
    Stloc0,
    #[strum(serialize = "stloc.1")]
    Stloc1,
    #[strum(serialize = "stloc.2")]
    Stloc2,
    #[strum(serialize = "stloc.3")]
    Stloc3,
    #[strum(serialize = "ldarg.s")]
    LdargS,
    #[strum(serialize = "ldarga.s")]
    LdargaS,
    #[strum(serialize = "starg.s")]
    StargS,
    #[strum(serialize = "ldloc.s")]
    LdlocS,
    #[strum(serialize = "ldloca.s")]
    LdlocaS,
    #[strum(serialize = "stloc.s")]
    StlocS,
    #[strum(serialize = "ldnull")]
    Ldnull,
    #[strum(serialize = "ldc.i4.m1")]
    LdcI4M1,
    #[strum(serialize = "ldc.i4.0")]
    LdcI40,
    #[strum(serialize = "ldc.i4.1")]
    LdcI41,
    #[strum(serialize = "ldc.i4.2")]
    LdcI42,
    #[strum(serialize = "ldc.i4.3")]
    LdcI43,
    #[strum(serialize = "ldc.i4.4")]
    LdcI44,
    #[strum(serialize = "ldc.i4.5")]
    LdcI45,
    #[strum(serialize = "ldc.i4.6")]
    LdcI46,
    #[strum(serialize = "ldc.i4.7")]
    LdcI47,
    #[strum(serialize = "ldc.i4.8")]
    LdcI48,
    #[strum(serialize = "ldc.i4.s")]
    LdcI4S,
    #[strum(serialize = "ldc.i4")]
    LdcI4,
    #[strum(serialize = "ldc.i8")]
    LdcI8,
    #[strum(serialize = "ldc.r4")]
    LdcR4,
    #[strum(serialize = "ldc.r8")]
    LdcR8,
    #[strum(serialize = "dup")]
    Dup,
    #[strum(serialize = "pop")]
    Pop,
    #[strum(serialize = "call")]
    Call,
    #[strum(serialize = "ret")]
    Ret,
    #[strum(serialize = "br.s")]
    BrS,
    #[strum(serialize = "brfalse.s")]
    BrfalseS,
    #[strum(serialize = "brtrue.s")]
    BrtrueS,
    #[strum(serialize = "beq.s")]
    BeqS,
    #[strum(serialize = "bge.s")]
    BgeS,
    #[strum(serialize = "bgt.s")]
    BgtS,
    #[strum(serialize = "ble.s")]
    BleS,
    #[strum(serialize = "blt.s")]
    BltS,
    #[strum(serialize = "bne.un.s")]
    BneUnS,
    #[strum(serialize = "bgt.un.s")]
    BgtUnS,
    #[strum(serialize = "blt.un.s")]
    BltUnS,
    #[strum(serialize = "br")]
    Br,
    #[strum(serialize = "brfalse")]
    Brfalse,
    #[strum(serialize = "brtrue")]
    Brtrue,
    #[strum(serialize = "beq")]
    Beq,
    #[strum(serialize = "bge")]
    Bge,
    #[strum(serialize = "bgt")]
    Bgt,
    #[strum(serialize = "ble")]
    Ble,
    #[strum(serialize = "blt")]
    Blt,
    #[strum(serialize = "bne.un")]
    BneUn,
    #[strum(serialize = "bgt.un")]
    BgtUn,
    #[strum(serialize = "blt.un")]
    BltUn,
    #[strum(serialize = "switch")]
    Switch,
    #[strum(serialize = "add")]
    Add,
    #[strum(serialize = "sub")]
    Sub,
    #[strum(serialize = "mul")]
    Mul,
    #[strum(serialize = "div")]
    Div,
    #[strum(serialize = "rem")]
    Rem,
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "or")]
    Or,
    #[strum(serialize = "xor")]
    Xor,
    #[strum(serialize = "neg")]
    Neg,
    #[strum(serialize = "not")]
    Not,
    #[strum(serialize = "conv.i4")]
    ConvI4,
    #[strum(serialize = "conv.r4")]
    ConvR4,
    #[strum(serialize = "conv.r8")]
    ConvR8,
    #[strum(serialize = "callvirt")]
    Callvirt,
    #[strum(serialize = "ldstr")]
    Ldstr,
    #[strum(serialize = "newobj")]
    Newobj,
    #[strum(serialize = "castclass")]
    Castclass,
    #[strum(serialize = "isinst")]
    Isinst,
    #[strum(serialize = "throw")]
    Throw,
    #[strum(serialize = "ldfld")]
    Ldfld,
    #[strum(serialize = "ldflda")]
    Ldflda,
    #[strum(serialize = "stfld")]
    Stfld,
    #[strum(serialize = "ldsfld")]
    Ldsfld,
    #[strum(serialize = "stsfld")]
    Stsfld,
    #[strum(serialize = "box")]
    Box,
    #[strum(serialize = "unbox.any")]
    UnboxAny,
    #[strum(serialize = "ldlen")]
    Ldlen,
    #[strum(serialize = "endfinally")]
    Endfinally,
    #[strum(serialize = "leave")]
    Leave,
    #[strum(serialize = "leave.s")]
    LeaveS,
    #[strum(serialize = "ceq")]
    Ceq,
    #[strum(serialize = "cgt")]
    Cgt,
    #[strum(serialize = "clt")]
    Clt,
    #[strum(serialize = "ldarg")]
    Ldarg,
    #[strum(serialize = "starg")]
    Starg,
    #[strum(serialize = "ldloc")]
    Ldloc,
    #[strum(serialize = "stloc")]
    Stloc,
    #[strum(serialize = "endfilter")]
    Endfilter,
    #[strum(serialize = "rethrow")]
    Rethrow,
}

/// Marker for opcodes whose stack effect depends on their operand.
const VARIABLE: Option<(u16, u8)> = None;

impl Opcode {
    /// Returns the encoded opcode value. Two-byte opcodes carry the `0xFE`
    /// prefix in the high byte.
    #[must_use]
    pub const fn value(self) -> u16 {
        match self {
            Opcode::Nop => 0x00,
            Opcode::Ldarg0 => 0x02,
            Opcode::Ldarg1 => 0x03,
            Opcode::Ldarg2 => 0x04,
            Opcode::Ldarg3 => 0x05,
            Opcode::Ldloc0 => 0x06,
            Opcode::Ldloc1 => 0x07,
            Opcode::Ldloc2 => 0x08,
            Opcode::Ldloc3 => 0x09,
            Opcode::Stloc0 => 0x0A,
            Opcode::Stloc1 => 0x0B,
            Opcode::Stloc2 => 0x0C,
            Opcode::Stloc3 => 0x0D,
            Opcode::LdargS => 0x0E,
            Opcode::LdargaS => 0x0F,
            Opcode::StargS => 0x10,
            Opcode::LdlocS => 0x11,
            Opcode::LdlocaS => 0x12,
            Opcode::StlocS => 0x13,
            Opcode::Ldnull => 0x14,
            Opcode::LdcI4M1 => 0x15,
            Opcode::LdcI40 => 0x16,
            Opcode::LdcI41 => 0x17,
            Opcode::LdcI42 => 0x18,
            Opcode::LdcI43 => 0x19,
            Opcode::LdcI44 => 0x1A,
            Opcode::LdcI45 => 0x1B,
            Opcode::LdcI46 => 0x1C,
            Opcode::LdcI47 => 0x1D,
            Opcode::LdcI48 => 0x1E,
            Opcode::LdcI4S => 0x1F,
            Opcode::LdcI4 => 0x20,
            Opcode::LdcI8 => 0x21,
            Opcode::LdcR4 => 0x22,
            Opcode::LdcR8 => 0x23,
            Opcode::Dup => 0x25,
            Opcode::Pop => 0x26,
            Opcode::Call => 0x28,
            Opcode::Ret => 0x2A,
            Opcode::BrS => 0x2B,
            Opcode::BrfalseS => 0x2C,
            Opcode::BrtrueS => 0x2D,
            Opcode::BeqS => 0x2E,
            Opcode::BgeS => 0x2F,
            Opcode::BgtS => 0x30,
            Opcode::BleS => 0x31,
            Opcode::BltS => 0x32,
            Opcode::BneUnS => 0x33,
            Opcode::BgtUnS => 0x35,
            Opcode::BltUnS => 0x37,
            Opcode::Br => 0x38,
            Opcode::Brfalse => 0x39,
            Opcode::Brtrue => 0x3A,
            Opcode::Beq => 0x3B,
            Opcode::Bge => 0x3C,
            Opcode::Bgt => 0x3D,
            Opcode::Ble => 0x3E,
            Opcode::Blt => 0x3F,
            Opcode::BneUn => 0x40,
            Opcode::BgtUn => 0x42,
            Opcode::BltUn => 0x44,
            Opcode::Switch => 0x45,
            Opcode::Add => 0x58,
            Opcode::Sub => 0x59,
            Opcode::Mul => 0x5A,
            Opcode::Div => 0x5B,
            Opcode::Rem => 0x5D,
            Opcode::And => 0x5F,
            Opcode::Or => 0x60,
            Opcode::Xor => 0x61,
            Opcode::Neg => 0x65,
            Opcode::Not => 0x66,
            Opcode::ConvI4 => 0x69,
            Opcode::ConvR4 => 0x6B,
            Opcode::ConvR8 => 0x6C,
            Opcode::Callvirt => 0x6F,
            Opcode::Ldstr => 0x72,
            Opcode::Newobj => 0x73,
            Opcode::Castclass => 0x74,
            Opcode::Isinst => 0x75,
            Opcode::Throw => 0x7A,
            Opcode::Ldfld => 0x7B,
            Opcode::Ldflda => 0x7C,
            Opcode::Stfld => 0x7D,
            Opcode::Ldsfld => 0x7E,
            Opcode::Stsfld => 0x80,
            Opcode::Box => 0x8C,
            Opcode::UnboxAny => 0xA5,
            Opcode::Ldlen => 0x8E,
            Opcode::Endfinally => 0xDC,
            Opcode::Leave => 0xDD,
            Opcode::LeaveS => 0xDE,
            Opcode::Ceq => 0xFE01,
            Opcode::Cgt => 0xFE02,
            Opcode::Clt => 0xFE04,
            Opcode::Ldarg => 0xFE09,
            Opcode::Starg => 0xFE0B,
            Opcode::Ldloc => 0xFE0C,
            Opcode::Stloc => 0xFE0E,
            Opcode::Endfilter => 0xFE11,
            Opcode::Rethrow => 0xFE1A,
        }
    }

    /// Returns the mnemonic, e.g. `"ldloc.s"`.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }

    /// Returns the kind of operand this opcode carries.
    #[must_use]
    pub const fn operand_kind(self) -> OperandKind {
        match self {
            Opcode::LdargS | Opcode::LdargaS | Opcode::StargS | Opcode::Ldarg | Opcode::Starg => {
                OperandKind::Argument
            }
            Opcode::LdlocS | Opcode::LdlocaS | Opcode::StlocS | Opcode::Ldloc | Opcode::Stloc => {
                OperandKind::Local
            }
            Opcode::LdcI4S => OperandKind::Int8,
            Opcode::LdcI4 => OperandKind::Int32,
            Opcode::LdcI8 => OperandKind::Int64,
            Opcode::LdcR4 => OperandKind::Float32,
            Opcode::LdcR8 => OperandKind::Float64,
            Opcode::Call | Opcode::Callvirt | Opcode::Newobj => OperandKind::Method,
            Opcode::Ldfld | Opcode::Ldflda | Opcode::Stfld | Opcode::Ldsfld | Opcode::Stsfld => {
                OperandKind::Field
            }
            Opcode::Castclass | Opcode::Isinst | Opcode::Box | Opcode::UnboxAny => {
                OperandKind::Type
            }
            Opcode::Ldstr => OperandKind::String,
            Opcode::Switch => OperandKind::Switch,
            op if op.is_branch_opcode() => OperandKind::Label,
            _ => OperandKind::None,
        }
    }

    const fn is_branch_opcode(self) -> bool {
        matches!(
            self,
            Opcode::BrS
                | Opcode::BrfalseS
                | Opcode::BrtrueS
                | Opcode::BeqS
                | Opcode::BgeS
                | Opcode::BgtS
                | Opcode::BleS
                | Opcode::BltS
                | Opcode::BneUnS
                | Opcode::BgtUnS
                | Opcode::BltUnS
                | Opcode::Br
                | Opcode::Brfalse
                | Opcode::Brtrue
                | Opcode::Beq
                | Opcode::Bge
                | Opcode::Bgt
                | Opcode::Ble
                | Opcode::Blt
                | Opcode::BneUn
                | Opcode::BgtUn
                | Opcode::BltUn
                | Opcode::Leave
                | Opcode::LeaveS
        )
    }

    /// Returns how this opcode affects control flow.
    #[must_use]
    pub const fn flow_type(self) -> FlowType {
        match self {
            Opcode::Br | Opcode::BrS => FlowType::UnconditionalBranch,
            Opcode::Leave | Opcode::LeaveS => FlowType::Leave,
            Opcode::Switch => FlowType::Switch,
            Opcode::Ret => FlowType::Return,
            Opcode::Throw | Opcode::Rethrow => FlowType::Throw,
            Opcode::Endfinally | Opcode::Endfilter => FlowType::EndFinally,
            Opcode::Call | Opcode::Callvirt | Opcode::Newobj => FlowType::Call,
            op if op.is_branch_opcode() => FlowType::ConditionalBranch,
            _ => FlowType::Sequential,
        }
    }

    /// Returns the fixed stack behavior of this opcode, or `None` when the
    /// effect depends on the operand (calls) or the enclosing method (`ret`).
    #[must_use]
    pub const fn fixed_stack_behavior(self) -> Option<StackBehavior> {
        let pops_pushes = match self {
            Opcode::Nop | Opcode::Br | Opcode::BrS | Opcode::Rethrow | Opcode::Endfinally => {
                Some((0, 0))
            }
            // leave empties the evaluation stack, modelled separately by depth analysis
            Opcode::Leave | Opcode::LeaveS => Some((0, 0)),
            Opcode::Ldarg0
            | Opcode::Ldarg1
            | Opcode::Ldarg2
            | Opcode::Ldarg3
            | Opcode::Ldloc0
            | Opcode::Ldloc1
            | Opcode::Ldloc2
            | Opcode::Ldloc3
            | Opcode::LdargS
            | Opcode::LdargaS
            | Opcode::LdlocS
            | Opcode::LdlocaS
            | Opcode::Ldarg
            | Opcode::Ldloc
            | Opcode::Ldnull
            | Opcode::LdcI4M1
            | Opcode::LdcI40
            | Opcode::LdcI41
            | Opcode::LdcI42
            | Opcode::LdcI43
            | Opcode::LdcI44
            | Opcode::LdcI45
            | Opcode::LdcI46
            | Opcode::LdcI47
            | Opcode::LdcI48
            | Opcode::LdcI4S
            | Opcode::LdcI4
            | Opcode::LdcI8
            | Opcode::LdcR4
            | Opcode::LdcR8
            | Opcode::Ldstr
            | Opcode::Ldsfld => Some((0, 1)),
            Opcode::Stloc0
            | Opcode::Stloc1
            | Opcode::Stloc2
            | Opcode::Stloc3
            | Opcode::StlocS
            | Opcode::Stloc
            | Opcode::StargS
            | Opcode::Starg
            | Opcode::Pop
            | Opcode::BrfalseS
            | Opcode::BrtrueS
            | Opcode::Brfalse
            | Opcode::Brtrue
            | Opcode::Switch
            | Opcode::Throw
            | Opcode::Stsfld
            | Opcode::Endfilter => Some((1, 0)),
            Opcode::Dup => Some((1, 2)),
            Opcode::BeqS
            | Opcode::BgeS
            | Opcode::BgtS
            | Opcode::BleS
            | Opcode::BltS
            | Opcode::BneUnS
            | Opcode::BgtUnS
            | Opcode::BltUnS
            | Opcode::Beq
            | Opcode::Bge
            | Opcode::Bgt
            | Opcode::Ble
            | Opcode::Blt
            | Opcode::BneUn
            | Opcode::BgtUn
            | Opcode::BltUn
            | Opcode::Stfld => Some((2, 0)),
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Rem
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::Ceq
            | Opcode::Cgt
            | Opcode::Clt => Some((2, 1)),
            Opcode::Neg
            | Opcode::Not
            | Opcode::ConvI4
            | Opcode::ConvR4
            | Opcode::ConvR8
            | Opcode::Castclass
            | Opcode::Isinst
            | Opcode::Ldfld
            | Opcode::Ldflda
            | Opcode::Box
            | Opcode::UnboxAny
            | Opcode::Ldlen => Some((1, 1)),
            Opcode::Call | Opcode::Callvirt | Opcode::Newobj | Opcode::Ret => VARIABLE,
        };

        match pops_pushes {
            Some((pops, pushes)) => Some(StackBehavior::new(pops, pushes)),
            None => None,
        }
    }

    /// Returns the implicit slot index of the short local/argument forms
    /// (`ldloc.1` -> `Some(1)`), `None` for every other opcode.
    #[must_use]
    pub const fn implicit_slot(self) -> Option<u16> {
        match self {
            Opcode::Ldarg0 | Opcode::Ldloc0 | Opcode::Stloc0 => Some(0),
            Opcode::Ldarg1 | Opcode::Ldloc1 | Opcode::Stloc1 => Some(1),
            Opcode::Ldarg2 | Opcode::Ldloc2 | Opcode::Stloc2 => Some(2),
            Opcode::Ldarg3 | Opcode::Ldloc3 | Opcode::Stloc3 => Some(3),
            _ => None,
        }
    }

    /// Returns `true` for every opcode that loads a local variable's value.
    #[must_use]
    pub const fn is_ldloc(self) -> bool {
        matches!(
            self,
            Opcode::Ldloc0
                | Opcode::Ldloc1
                | Opcode::Ldloc2
                | Opcode::Ldloc3
                | Opcode::LdlocS
                | Opcode::Ldloc
        )
    }

    /// Returns `true` for every opcode that stores into a local variable.
    #[must_use]
    pub const fn is_stloc(self) -> bool {
        matches!(
            self,
            Opcode::Stloc0
                | Opcode::Stloc1
                | Opcode::Stloc2
                | Opcode::Stloc3
                | Opcode::StlocS
                | Opcode::Stloc
        )
    }

    /// Returns `true` for every opcode that loads an argument's value.
    #[must_use]
    pub const fn is_ldarg(self) -> bool {
        matches!(
            self,
            Opcode::Ldarg0
                | Opcode::Ldarg1
                | Opcode::Ldarg2
                | Opcode::Ldarg3
                | Opcode::LdargS
                | Opcode::Ldarg
        )
    }
}
