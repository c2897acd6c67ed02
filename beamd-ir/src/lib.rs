//! Plain data produced by the BEAM disassembler.
//!
//! Nothing here is tied to one output format: every type derives
//! `serde::Serialize` and the presentation layer decides how to render it.

pub mod function;
pub mod graph;
pub mod instruction;
pub mod operand;
pub mod source;

pub use function::{Function, RawFunction};
pub use graph::CallGraph;
pub use instruction::{Instruction, RawInstruction};
pub use operand::{AllocList, ExtFunc, Operand, Term};
pub use source::{RenderMode, SourceGroup};
