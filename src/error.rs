use thiserror::Error;

use crate::assembly::OpCode;

macro_rules! corrupt_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Corrupt {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Corrupt {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Decoding Errors
/// - [`Error::Corrupt`] - Malformed container, bytecode unit or method body
/// - [`Error::OutOfBounds`] - Input ended before a declared structure did
/// - [`Error::NotSupported`] - Unknown container signature
/// - [`Error::Empty`] - Empty input provided
///
/// ## Encoding and Mutation Errors
/// - [`Error::LayoutDivergence`] - Branch layout did not reach a fixed point
/// - [`Error::TargetStillReferenced`] - Removal would orphan a branch target
///
/// ## Analysis Errors
/// - [`Error::UnsupportedStructure`] - Message layout depends on runtime control flow
/// - [`Error::UnclassifiedValue`] - An instruction the structure analysis was never taught
/// - [`Error::RecursionLimit`] - Class hierarchy walk exceeded the configured depth
///
/// # Examples
///
/// ```rust,no_run
/// use swfscope::{Error, Game};
/// use std::path::Path;
///
/// match Game::from_file(Path::new("client.swf")) {
///     Ok(game) => println!("{} messages", game.messages().map_or(0, |m| m.len())),
///     Err(Error::Corrupt { message, file, line }) => {
///         eprintln!("Corrupt input: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The input is damaged and could not be decoded.
    ///
    /// Raised on length mismatches, out-of-range pool indices, unknown opcodes and
    /// branch offsets that do not land on an instruction boundary. Carries the source
    /// location where the problem was detected.
    #[error("Corrupt - {file}:{line}: {message}")]
    Corrupt {
        /// The message to be printed for the Corrupt error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while decoding.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// This file type is not supported.
    #[error("This file type is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// The branch layout of a method body did not converge.
    ///
    /// The associated value is the iteration bound that was exceeded.
    #[error("Instruction layout did not converge after {0} iterations")]
    LayoutDivergence(usize),

    /// A removal would have dropped an instruction that a branch or switch
    /// outside the removed range still targets.
    ///
    /// The associated value is the index of the referenced instruction.
    #[error("Instruction {0} is still referenced by a branch")]
    TargetStillReferenced(usize),

    /// The field layout of a message could not be determined statically.
    #[error("Unsupported message structure - {0}")]
    UnsupportedStructure(String),

    /// Structure analysis met a value-producing instruction it cannot classify.
    #[error("Cannot classify the value produced by {0} before a register store")]
    UnclassifiedValue(OpCode),

    /// Recursion limit reached.
    ///
    /// The associated value shows the recursion limit that was reached.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),
}

impl Error {
    /// Returns `true` for every error that means the input itself is malformed.
    #[must_use]
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Error::Corrupt { .. } | Error::OutOfBounds)
    }
}
