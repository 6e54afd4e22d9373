//! Exception block markers and the protected regions they describe.
//!
//! Decoded method bodies do not carry an exception handler table next to the
//! instructions. Instead, each instruction that starts or ends a block carries
//! an [`ExceptionBlock`] marker, and markers travel with their instruction when
//! the buffer is rewritten. The handler table is recovered on demand by
//! [`scan_regions`], which doubles as the balance and nesting check.
//!
//! # Layout
//!
//! ```text
//! [BeginTry]         ldarg.0          <- try_range.start
//!                    ...
//!                    leave.s IL_END
//! [BeginCatch(T)]    pop              <- try_range.end / handler_range.start
//!                    leave.s IL_END
//! [EndBlock]  IL_END ret              <- handler_range.end
//! ```
//!
//! All markers are positioned *before* the instruction that carries them, so
//! the end marker sits on the first instruction after the block.

use std::ops::Range;

use bitflags::bitflags;

use crate::{
    assembly::{instruction::Instruction, members::TypeRef},
    Error, Result,
};

bitflags! {
    /// Exception handler flags defining the type of exception handling clause.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause.
        const EXCEPTION = 0x0000;
        /// An exception filter and handler clause.
        const FILTER = 0x0001;
        /// A finally clause.
        const FINALLY = 0x0002;
        /// A fault clause (finally that executes only on exception).
        const FAULT = 0x0004;
    }
}

/// A block boundary attached to an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExceptionBlock {
    /// A protected region starts at this instruction.
    BeginTry,
    /// A typed catch handler starts at this instruction.
    BeginCatch(TypeRef),
    /// A filter expression starts at this instruction; the following
    /// [`ExceptionBlock::BeginCatch`] starts its handler.
    BeginFilter,
    /// A finally handler starts at this instruction.
    BeginFinally,
    /// A fault handler starts at this instruction.
    BeginFault,
    /// The innermost open try/handler construct ends before this instruction.
    EndBlock,
}

impl ExceptionBlock {
    /// Returns `true` if the marker opens a handler (or filter) block.
    #[must_use]
    pub fn is_handler_start(&self) -> bool {
        matches!(
            self,
            ExceptionBlock::BeginCatch(_)
                | ExceptionBlock::BeginFilter
                | ExceptionBlock::BeginFinally
                | ExceptionBlock::BeginFault
        )
    }
}

/// One clause of the recovered exception handler table, in instruction indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionRegion {
    /// Kind of clause
    pub flags: ExceptionHandlerFlags,
    /// Protected instructions
    pub try_range: Range<usize>,
    /// Handler instructions
    pub handler_range: Range<usize>,
    /// First instruction of the filter expression, for filter clauses
    pub filter_start: Option<usize>,
    /// Caught exception type, for typed clauses
    pub catch_type: Option<TypeRef>,
}

enum OpenHandler {
    Typed { start: usize, ty: TypeRef },
    Filter { start: usize, handler: Option<usize> },
    Finally { start: usize },
    Fault { start: usize },
}

struct Frame {
    try_start: usize,
    try_end: Option<usize>,
    open: Option<OpenHandler>,
    closed: Vec<ExceptionRegion>,
}

impl Frame {
    fn close(&mut self, end: usize, index: usize) -> Result<()> {
        let Some(open) = self.open.take() else {
            return Ok(());
        };
        let try_range = self.try_start..self.try_end.unwrap_or(self.try_start);
        let region = match open {
            OpenHandler::Typed { start, ty } => ExceptionRegion {
                flags: ExceptionHandlerFlags::EXCEPTION,
                try_range,
                handler_range: start..end,
                filter_start: None,
                catch_type: Some(ty),
            },
            OpenHandler::Filter { start, handler } => {
                let Some(handler) = handler else {
                    return Err(unbalanced(index, "filter block closed without a handler"));
                };
                ExceptionRegion {
                    flags: ExceptionHandlerFlags::FILTER,
                    try_range,
                    handler_range: handler..end,
                    filter_start: Some(start),
                    catch_type: None,
                }
            }
            OpenHandler::Finally { start } => ExceptionRegion {
                flags: ExceptionHandlerFlags::FINALLY,
                try_range,
                handler_range: start..end,
                filter_start: None,
                catch_type: None,
            },
            OpenHandler::Fault { start } => ExceptionRegion {
                flags: ExceptionHandlerFlags::FAULT,
                try_range,
                handler_range: start..end,
                filter_start: None,
                catch_type: None,
            },
        };
        self.closed.push(region);
        Ok(())
    }
}

fn unbalanced(index: usize, message: &str) -> Error {
    Error::UnbalancedExceptionBlock {
        index,
        message: message.to_string(),
    }
}

/// Walks the block markers of `instructions`, checking that they are balanced
/// and correctly nested, and returns the recovered clauses ordered innermost
/// first (the order an exception handler table requires).
///
/// # Errors
///
/// Returns [`Error::UnbalancedExceptionBlock`] if a handler starts outside a
/// try block, a try block ends without any handler, a filter has no handler,
/// or a block is still open at the end of the buffer.
pub fn scan_regions(instructions: &[Instruction]) -> Result<Vec<ExceptionRegion>> {
    let mut frames: Vec<Frame> = Vec::new();
    let mut regions = Vec::new();

    for (index, instruction) in instructions.iter().enumerate() {
        for block in &instruction.blocks {
            match block {
                ExceptionBlock::BeginTry => frames.push(Frame {
                    try_start: index,
                    try_end: None,
                    open: None,
                    closed: Vec::new(),
                }),
                ExceptionBlock::BeginCatch(ty) => {
                    let frame = frames
                        .last_mut()
                        .ok_or_else(|| unbalanced(index, "catch outside of a try block"))?;
                    if let Some(OpenHandler::Filter {
                        handler: handler @ None,
                        ..
                    }) = &mut frame.open
                    {
                        *handler = Some(index);
                        continue;
                    }
                    frame.close(index, index)?;
                    frame.try_end.get_or_insert(index);
                    frame.open = Some(OpenHandler::Typed {
                        start: index,
                        ty: ty.clone(),
                    });
                }
                ExceptionBlock::BeginFilter
                | ExceptionBlock::BeginFinally
                | ExceptionBlock::BeginFault => {
                    let frame = frames
                        .last_mut()
                        .ok_or_else(|| unbalanced(index, "handler outside of a try block"))?;
                    frame.close(index, index)?;
                    frame.try_end.get_or_insert(index);
                    frame.open = Some(match block {
                        ExceptionBlock::BeginFilter => OpenHandler::Filter {
                            start: index,
                            handler: None,
                        },
                        ExceptionBlock::BeginFinally => OpenHandler::Finally { start: index },
                        _ => OpenHandler::Fault { start: index },
                    });
                }
                ExceptionBlock::EndBlock => {
                    let mut frame = frames
                        .pop()
                        .ok_or_else(|| unbalanced(index, "end of block without a try block"))?;
                    if frame.open.is_none() {
                        return Err(unbalanced(index, "try block ends without a handler"));
                    }
                    frame.close(index, index)?;
                    regions.extend(frame.closed);
                }
            }
        }
    }

    if !frames.is_empty() {
        return Err(unbalanced(
            instructions.len(),
            "exception block still open at end of method",
        ));
    }

    Ok(regions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{instruction::Instruction, opcodes::Opcode, Label, Operand};

    fn exception_type() -> TypeRef {
        TypeRef::new("System", "Exception")
    }

    #[test]
    fn test_try_catch_region() {
        let end = Label::new(0);
        let instructions = vec![
            Instruction::new(Opcode::Nop).with_block(ExceptionBlock::BeginTry),
            Instruction::with_operand(Opcode::LeaveS, Operand::Label(end)),
            Instruction::new(Opcode::Pop).with_block(ExceptionBlock::BeginCatch(exception_type())),
            Instruction::with_operand(Opcode::LeaveS, Operand::Label(end)),
            Instruction::new(Opcode::Ret)
                .with_label(end)
                .with_block(ExceptionBlock::EndBlock),
        ];

        let regions = scan_regions(&instructions).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].flags, ExceptionHandlerFlags::EXCEPTION);
        assert_eq!(regions[0].try_range, 0..2);
        assert_eq!(regions[0].handler_range, 2..4);
        assert_eq!(regions[0].catch_type, Some(exception_type()));
    }

    #[test]
    fn test_nested_regions_innermost_first() {
        let instructions = vec![
            Instruction::new(Opcode::Nop).with_block(ExceptionBlock::BeginTry),
            Instruction::new(Opcode::Nop).with_block(ExceptionBlock::BeginTry),
            Instruction::new(Opcode::Endfinally).with_block(ExceptionBlock::BeginFinally),
            Instruction::new(Opcode::Endfinally)
                .with_block(ExceptionBlock::EndBlock)
                .with_block(ExceptionBlock::BeginFault),
            Instruction::new(Opcode::Ret).with_block(ExceptionBlock::EndBlock),
        ];

        let regions = scan_regions(&instructions).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].flags, ExceptionHandlerFlags::FINALLY);
        assert_eq!(regions[0].try_range, 1..2);
        assert_eq!(regions[1].flags, ExceptionHandlerFlags::FAULT);
        assert_eq!(regions[1].try_range, 0..3);
        assert_eq!(regions[1].handler_range, 3..4);
    }

    #[test]
    fn test_filter_region() {
        let instructions = vec![
            Instruction::new(Opcode::Nop).with_block(ExceptionBlock::BeginTry),
            Instruction::new(Opcode::Pop).with_block(ExceptionBlock::BeginFilter),
            Instruction::new(Opcode::Endfilter),
            Instruction::new(Opcode::Pop).with_block(ExceptionBlock::BeginCatch(exception_type())),
            Instruction::new(Opcode::Ret).with_block(ExceptionBlock::EndBlock),
        ];

        let regions = scan_regions(&instructions).unwrap();
        assert_eq!(regions[0].flags, ExceptionHandlerFlags::FILTER);
        assert_eq!(regions[0].filter_start, Some(1));
        assert_eq!(regions[0].handler_range, 3..4);
    }

    #[test]
    fn test_unbalanced_blocks() {
        let open = vec![Instruction::new(Opcode::Nop).with_block(ExceptionBlock::BeginTry)];
        assert!(matches!(
            scan_regions(&open),
            Err(Error::UnbalancedExceptionBlock { index: 1, .. })
        ));

        let stray_end = vec![Instruction::new(Opcode::Ret).with_block(ExceptionBlock::EndBlock)];
        assert!(scan_regions(&stray_end).is_err());

        let no_handler = vec![
            Instruction::new(Opcode::Nop).with_block(ExceptionBlock::BeginTry),
            Instruction::new(Opcode::Ret).with_block(ExceptionBlock::EndBlock),
        ];
        assert!(scan_regions(&no_handler).is_err());
    }
}
