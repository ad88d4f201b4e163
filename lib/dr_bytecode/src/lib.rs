//! This crate provides the read model of disassembled Android bytecode used
//! by the `DroidReach` analyses: type and method descriptors, registers,
//! instructions folded by opcode family, per-method instruction graphs and
//! class definitions.
//!
//! Loading and disassembling the application is not done here: any
//! disassembler can produce these structures, either directly or through
//! their serde representation.
//!
//! ```rust
//! use dr_bytecode::{Instr, InstrGraph, Reg};
//!
//! let code = InstrGraph::sequential(vec![
//!     Instr::ConstClass { dst: Reg::from(0u8), class: "app/Target".to_string() },
//!     Instr::Return { src: None },
//! ]);
//! assert_eq!(code.predecessors(1).collect::<Vec<_>>(), vec![0]);
//! ```

pub mod classes;
pub mod descriptors;
pub mod errors;
pub mod graph;
pub mod instrs;
pub mod registers;
pub mod types;

pub use classes::{Annotation, ClassDef, FieldDef, MethodDef, ParamSlot};
pub use descriptors::{FieldDescr, MethodDescr};
pub use errors::{BytecodeError, BytecodeResult};
pub use graph::{InstrGraph, RawCode};
pub use instrs::{Instr, InvokeKind, OpCategory};
pub use registers::{Reg, RegList};
pub use types::Type;
