//! Global error handling.
//!
//! Each sub-crate of the project defines its own type error. They are
//! unified here when winding results at the top-level.
//!
//! ```rust
//! use droidreach::prelude::*;
//!
//! fn main() -> DrResult<()> {
//!    let descr: MethodDescr = "Lapp/Main;->onCreate(Landroid/os/Bundle;)V".parse()?; // can return a BytecodeError
//!    assert_eq!(descr.name(), "onCreate");
//!    Ok(())
//! }
//! ```

use dr_analysis::errors::AnalysisError;
use dr_bytecode::errors::BytecodeError;
use std::io;
use thiserror::Error;

/// An alias for result that can be a [`DrError`].
pub type DrResult<T> = Result<T, DrError>;

/// The main error type for error winding at the top-level.
/// It mainly consists of transparent wrapper over error types that
/// are defined in dependencies.
#[derive(Debug, Error)]
pub enum DrError {
    /// Custom error for reporting bad command line arguments usage.
    #[error("bad arguments: {0}")]
    BadArguments(String),

    /// Error that can be returned from [I/O operations](std::io).
    #[error(transparent)]
    IO(#[from] io::Error),

    /// Error that can be returned when reading or writing JSON bundles.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Error that can be returned from regex compilation.
    #[error(transparent)]
    Regex(#[from] regex::Error),

    /// Error that can be returned from [`dr_analysis`] functions.
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    /// Error that can be returned from [`dr_bytecode`] functions.
    #[error(transparent)]
    Bytecode(#[from] BytecodeError),
}
