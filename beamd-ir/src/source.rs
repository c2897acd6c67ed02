use serde::Serialize;

use crate::instruction::Instruction;

/// How a source group should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Source text shown next to the instructions.
    Inline,
    /// Source exists but belongs elsewhere (e.g. inlined code); shown as a
    /// cross-reference.
    Distant,
    /// No source text; a placeholder is shown instead.
    Unavailable,
}

/// A run of instructions attributed to one source line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceGroup {
    /// `None` until the first line marker has been seen.
    pub line: Option<u32>,
    pub source: Option<String>,
    pub instructions: Vec<Instruction>,
    pub mode: RenderMode,
}
