//! Disassembly, source correlation and call graph extraction for BEAM
//! modules.

pub mod abstract_code;
pub mod callgraph;
pub mod correlate;
pub mod disasm;
pub mod dot;
pub mod format;
pub mod listing;
pub mod module;
pub mod source;

pub use callgraph::extract_call_graph;
pub use correlate::{correlate, merge};
pub use disasm::disassemble;
pub use format::{format_instruction, format_operand};
pub use module::{FunctionListing, ModuleAnalysis, analyze};
pub use source::{SourceText, debug_source, load_source, reconstruct_source};

/// Default truncation threshold for literal operands, in characters.
pub const DEFAULT_LITERAL_WIDTH: usize = 60;

/// Rendering and correlation knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Literal terms rendering longer than this are cut and suffixed with
    /// `...`. Operand lists such as jump tables are never cut.
    pub literal_width: usize,
    /// When set, a group is Distant once its line is more than this many
    /// lines past the function's first line. When unset, the function's
    /// range ends where the next function begins.
    pub near_window: Option<u32>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            literal_width: DEFAULT_LITERAL_WIDTH,
            near_window: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    File(#[from] beamd_file::Error),

    #[error("Function {0} not found")]
    FunctionNotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;
