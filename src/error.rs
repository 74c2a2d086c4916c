//! Error types for the method-body analysis pipeline.
//!
//! The main type exported is the [`Error`] enum, covering structural failures
//! while disassembling a method, semantic failures while tracing it, and the
//! handful of IO/conversion errors that show up at the envelope boundary.

use std::num::TryFromIntError;
use std::string::FromUtf8Error;

/// A specialized [`Result`](core::result::Result) type with the error type
/// defaulting to [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors that can occur while decoding, disassembling, tracing, or
/// reassembling a method body.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    // --- envelope / structural -------------------------------------------------
    /// The method has no `Code` attribute.
    #[error("method has no Code attribute")]
    NoCodeAttribute,
    /// The method declares more than one `Code` attribute.
    #[error("method declares more than one Code attribute")]
    DuplicateCodeAttribute,
    /// Decode encountered a byte that is not a defined opcode.
    #[error("invalid opcode {0:#04x} at offset {1}")]
    BadOpcode(u8, u32),
    /// A jump or exception-table boundary lands inside another instruction's
    /// operand bytes.
    #[error("jump into operand bytes at offset {0}")]
    JumpIntoOperand(u32),
    /// A jump target or exception-table boundary lies outside the method's
    /// code array.
    #[error("offset {0} lies outside the method body")]
    OutOfMethod(u32),
    /// Invalid constant pool index.
    #[error("invalid constant pool index {0}")]
    InvalidConstantPoolIndex(u16),
    /// Constant pool entry exists but has the wrong tag for the access.
    #[error("invalid constant pool index type at {0}")]
    InvalidConstantPoolIndexType(u16),
    /// Invalid constant tag byte.
    #[error("invalid constant tag: {0}")]
    InvalidConstantTag(u8),
    /// Invalid base type descriptor code.
    #[error("invalid base type code {0}")]
    InvalidBaseTypeCode(char),
    /// Invalid field type descriptor code.
    #[error("invalid field type code {0}")]
    InvalidFieldTypeCode(char),
    /// Malformed field or method descriptor string.
    #[error("invalid field type descriptor {0}")]
    InvalidFieldTypeDescriptor(String),
    /// Malformed method descriptor string.
    #[error("invalid method descriptor: {0}")]
    InvalidMethodDescriptor(String),
    /// A `wide`-prefixed opcode that is not one of the widenable forms.
    #[error("invalid wide instruction: {0:#04x}")]
    InvalidWideInstruction(u8),
    /// Invalid verification-type tag encountered while decoding a
    /// `StackMapTable` frame.
    #[error("invalid verification type tag: {0}")]
    InvalidVerificationTypeTag(u8),

    // --- semantic / tracer -------------------------------------------------
    /// An entry failed an `assignable` check against an expected type.
    #[error("type conflict at offset {offset}: expected {expected}, found {found}")]
    TypeConflict {
        offset: u32,
        expected: String,
        found: String,
    },
    /// A `ret` instruction could not be matched to a dominating `jsr`.
    #[error("unresolved subroutine return at offset {0}")]
    UnresolvedSubroutine(u32),
    /// The tracer exceeded its bounded pass budget without reaching a fixed
    /// point.
    #[error("trace did not converge after {0} passes")]
    TraceDivergence(usize),

    // --- IO / conversion -----------------------------------------------------
    /// Fewer bytes were available than the declared structure required.
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },
    /// Writing the reassembled bytecode failed.
    #[error("failed to write bytecode: {0}")]
    WriteFailed(String),
    /// Error when attempting to convert a numeric value to a different type.
    #[error(transparent)]
    TryFromIntError(#[from] TryFromIntError),
    /// Error when attempting to create a UTF-8 string from bytes.
    #[error("invalid UTF-8 sequence: {0}")]
    FromUtf8Error(String),
    /// Underlying IO error.
    #[error("IO error: {0}")]
    IoError(String),
}

impl From<FromUtf8Error> for Error {
    fn from(error: FromUtf8Error) -> Self {
        Error::FromUtf8Error(error.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::WriteFailed(error.to_string())
    }
}
