//! Bytecode model errors definitions.

use thiserror::Error;

/// An alias for result that can be a [`BytecodeError`].
pub type BytecodeResult<T> = Result<T, BytecodeError>;

/// The bytecode model error type.
#[derive(Debug, Error)]
pub enum BytecodeError {
    /// A type descriptor string could not be parsed.
    #[error("could not convert {from} into {to}")]
    Conversion { from: String, to: String },

    /// The type is not a class type where a class type was expected.
    #[error("invalid type: {0}")]
    InvalidType(String),

    /// An instruction graph refers to an instruction that does not exist.
    #[error("instruction {index} has invalid predecessor {pred} (graph has {len} instructions)")]
    InvalidPredecessor { index: usize, pred: usize, len: usize },

    /// An instruction graph description is not consistent.
    #[error("malformed instruction graph: {0}")]
    MalformedGraph(String),
}
