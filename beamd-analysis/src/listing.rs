//! Plain text listing.

use std::fmt::Write;

use beamd_ir::RenderMode;

use crate::module::{FunctionListing, ModuleAnalysis};

const INSN_INDENT: &str = "        ";

/// Render a whole module.
pub fn render_module(analysis: &ModuleAnalysis) -> String {
    let mut out = String::new();
    let _ = writeln!(out, ";; module {}", analysis.module);
    if !analysis.exports.is_empty() {
        let _ = writeln!(out, ";; exports {}", analysis.exports.join(", "));
    }
    let _ = writeln!(
        out,
        ";; {} functions, {} instructions",
        analysis.functions.len(),
        analysis.instruction_count()
    );
    for listing in &analysis.functions {
        out.push('\n');
        out.push_str(&render_function(listing));
    }
    out
}

/// Render one function: header, then each group's source line or
/// placeholder followed by its instructions.
pub fn render_function(listing: &FunctionListing) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} (entry f({}))", listing.signature, listing.entry);

    for group in &listing.groups {
        match (group.mode, group.line, group.source.as_deref()) {
            (RenderMode::Inline, Some(line), Some(text)) => {
                let _ = writeln!(out, "  {line:>5}| {text}");
            }
            (RenderMode::Distant, Some(line), Some(text)) => {
                let _ = writeln!(out, "  # from line {line}: {}", text.trim());
            }
            (_, Some(line), _) => {
                let _ = writeln!(out, "  # line {line}");
            }
            (_, None, _) => {}
        }
        for insn in &group.instructions {
            let _ = writeln!(out, "{INSN_INDENT}{insn}");
        }
    }
    out
}

/// Per-category instruction counts with their share of the function.
pub fn render_stats(listing: &FunctionListing) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}:", listing.signature);
    for (&category, &count) in &listing.categories {
        let share = listing.function.category_fraction(category) * 100.0;
        let _ = writeln!(out, "  {:<10}{count:>6}  {share:5.1}%", category.name());
    }
    out
}
