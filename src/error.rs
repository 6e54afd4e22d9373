use thiserror::Error;

use crate::assembly::{Label, MethodRef};

macro_rules! patch_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::InvalidDescriptor {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::InvalidDescriptor {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Instrumentation Errors
/// - [`Error::AnchorNotFound`] - An anchor rule matched nothing
/// - [`Error::AnchorAmbiguous`] - A unique anchor rule matched more than once
/// - [`Error::InvalidDescriptor`] - A patch descriptor is internally inconsistent
/// - [`Error::StackMismatch`] - A value override would change the stack depth
/// - [`Error::MethodNotFound`] - The host no longer exposes a patched method
///
/// ## Buffer Structure Errors
/// - [`Error::UnresolvedLabel`] - A branch targets a label attached to no instruction
/// - [`Error::DuplicateLabel`] - A label is attached to more than one instruction
/// - [`Error::UnbalancedExceptionBlock`] - Exception block markers do not nest
/// - [`Error::IndexOutOfRange`] - A splice position lies outside the buffer
///
/// ## Event Errors
/// - [`Error::Handler`] - A subscriber reported a failure
///
/// # Examples
///
/// ```rust
/// use hostpatch::{Error, assembly::InstructionBuffer};
///
/// let buffer = InstructionBuffer::new();
/// match buffer.validate() {
///     Ok(()) => println!("buffer is structurally valid"),
///     Err(Error::UnresolvedLabel(label)) => eprintln!("dangling {label}"),
///     Err(e) => eprintln!("other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// No instruction satisfied an anchor rule.
    ///
    /// Usually means the host binary changed shape since the rule was written.
    #[error("Anchor not found - {0}")]
    AnchorNotFound(String),

    /// An anchor rule that must match exactly once matched several instructions.
    #[error("Anchor matched {count} instructions, expected exactly one - {rule}")]
    AnchorAmbiguous {
        /// Description of the rule that was searched for
        rule: String,
        /// How many instructions matched
        count: usize,
    },

    /// The descriptor cannot be applied as written.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of the inconsistency
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Invalid descriptor - {file}:{line}: {message}")]
    InvalidDescriptor {
        /// The message to be printed for the InvalidDescriptor error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A replacement run leaves a different number of values on the stack than
    /// the run it replaces.
    #[error("Stack effect mismatch - removed run nets {removed}, replacement nets {replacement}")]
    StackMismatch {
        /// Net stack effect of the deleted instructions
        removed: i32,
        /// Net stack effect of the substituted instructions
        replacement: i32,
    },

    /// A branch references a label that no instruction carries.
    #[error("Branch target {0} does not resolve to any instruction")]
    UnresolvedLabel(Label),

    /// A label is attached to more than one instruction.
    #[error("Label {0} is attached to more than one instruction")]
    DuplicateLabel(Label),

    /// Exception block markers are not balanced or not correctly nested.
    #[error("Unbalanced exception block at instruction {index}: {message}")]
    UnbalancedExceptionBlock {
        /// Index of the offending instruction
        index: usize,
        /// What went wrong
        message: String,
    },

    /// A position computed from an anchor lies outside the buffer.
    #[error("Index {index} is out of range for a buffer of {len} instructions")]
    IndexOutOfRange {
        /// The computed index
        index: isize,
        /// Length of the buffer at that time
        len: usize,
    },

    /// The host does not expose a body for the requested method.
    #[error("Method not found - {0}")]
    MethodNotFound(MethodRef),

    /// A subscriber returned an error.
    #[error("{0}")]
    Handler(String),
}
