//! Whole-module pipeline: tokenize, disassemble, correlate, extract calls.

use std::collections::BTreeMap;

use beamd_file::{BeamFile, LineTable};
use beamd_ir::{CallGraph, Function, RawFunction, RenderMode, SourceGroup};
use beamd_isa::Category;
use serde::Serialize;

use crate::source::SourceText;
use crate::{Error, Options, Result, correlate, disassemble, extract_call_graph};

/// One disassembled function with its source groups.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionListing {
    pub signature: String,
    pub entry: u32,
    /// First resolved source line, if the function has line markers.
    pub anchor: Option<u32>,
    pub categories: BTreeMap<Category, usize>,
    pub groups: Vec<SourceGroup>,
    #[serde(skip)]
    pub function: Function,
}

/// Everything the presentation layer needs for one module.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleAnalysis {
    pub module: String,
    pub exports: Vec<String>,
    pub functions: Vec<FunctionListing>,
    pub call_graph: CallGraph,
}

impl ModuleAnalysis {
    /// Look up a function by `name/arity`.
    pub fn function(&self, signature: &str) -> Result<&FunctionListing> {
        self.functions
            .iter()
            .find(|f| f.signature == signature)
            .ok_or_else(|| Error::FunctionNotFound(signature.to_owned()))
    }

    pub fn instruction_count(&self) -> usize {
        self.functions
            .iter()
            .map(|f| f.function.instructions.len())
            .sum()
    }
}

/// Run the full pipeline over `file`.
///
/// A missing or malformed line table only degrades line numbers; missing
/// source only degrades groups to placeholders. Neither stops formatting or
/// call graph extraction.
pub fn analyze(file: &BeamFile, source: Option<&SourceText>, opts: &Options) -> Result<ModuleAnalysis> {
    let module = file.module_name()?;
    let atoms = file.atoms()?;
    let exports = match file.exports() {
        Ok(table) => table
            .names(&atoms)
            .map(|(name, arity)| format!("{name}/{arity}"))
            .collect(),
        Err(e) => {
            log::warn!("{module}: cannot read export table: {e}");
            Vec::new()
        }
    };
    let raw = file.functions()?;
    let lines = file.line_table();
    Ok(analyze_functions(module, exports, &raw, &lines, source, opts))
}

/// Pipeline over already tokenized functions.
pub fn analyze_functions(
    module: String,
    exports: Vec<String>,
    raw: &[RawFunction],
    lines: &LineTable,
    source: Option<&SourceText>,
    opts: &Options,
) -> ModuleAnalysis {
    let call_graph = extract_call_graph(&module, raw);

    let mut functions: Vec<FunctionListing> = raw
        .iter()
        .map(|r| {
            let function = disassemble(r, lines, opts);
            let groups = correlate(&function, lines, source);
            let anchor = r
                .code
                .iter()
                .find_map(|insn| insn.line_index())
                .map(|index| lines.resolve(index));
            FunctionListing {
                signature: function.signature(),
                entry: function.entry,
                anchor,
                categories: function.category_counts(),
                groups,
                function,
            }
        })
        .collect();

    let anchors: Vec<Option<u32>> = functions.iter().map(|f| f.anchor).collect();
    for (i, listing) in functions.iter_mut().enumerate() {
        let Some(anchor) = listing.anchor else {
            continue;
        };
        let end = match opts.near_window {
            Some(window) => Some(anchor.saturating_add(window).saturating_add(1)),
            None => anchors[i + 1..].iter().flatten().copied().find(|&a| a > anchor),
        };
        mark_distant(&mut listing.groups, anchor, end);
    }

    ModuleAnalysis {
        module,
        exports,
        functions,
        call_graph,
    }
}

/// Turn Inline groups whose line lies outside `[start, end)` into Distant
/// ones. `end == None` leaves the range open.
pub fn mark_distant(groups: &mut [SourceGroup], start: u32, end: Option<u32>) {
    for group in groups {
        let Some(line) = group.line else {
            continue;
        };
        let near = line >= start && end.is_none_or(|end| line < end);
        if group.mode == RenderMode::Inline && !near {
            group.mode = RenderMode::Distant;
        }
    }
}
