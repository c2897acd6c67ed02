use std::collections::BTreeMap;

use beamd_file::LineTable;
use beamd_ir::{Function, RawFunction};

use crate::Options;
use crate::format::format_instruction;

/// Format every instruction of `raw` and record the line each line marker
/// resolves to.
pub fn disassemble(raw: &RawFunction, lines: &LineTable, opts: &Options) -> Function {
    let instructions = raw
        .code
        .iter()
        .map(|insn| format_instruction(insn, opts))
        .collect();

    let mut resolved = BTreeMap::new();
    for index in raw.code.iter().filter_map(|insn| insn.line_index()) {
        resolved.insert(index, lines.resolve(index));
    }

    log::debug!(
        "disassembled {}/{}: {} instructions, {} line markers",
        raw.name,
        raw.arity,
        raw.code.len(),
        resolved.len()
    );

    Function {
        name: raw.name.clone(),
        arity: raw.arity,
        entry: raw.entry,
        raw: raw.code.clone(),
        instructions,
        lines: resolved,
    }
}
