//! Grouping of instructions by originating source line.

use beamd_file::LineTable;
use beamd_ir::{Function, Instruction, RenderMode, SourceGroup};

use crate::source::SourceText;

/// Split `function` into runs of instructions that share a resolved line.
///
/// Line markers start a new run and are not part of any group. Instructions
/// before the first marker form a group with no line. Runs with no
/// instructions are dropped and adjacent runs with the same line are merged.
///
/// `source` is `None` when no text was loaded at all; every group is then
/// [`RenderMode::Unavailable`]. Distance from the function's own range is
/// left to the caller.
pub fn correlate(function: &Function, lines: &LineTable, source: Option<&SourceText>) -> Vec<SourceGroup> {
    let mut groups = Vec::new();
    let mut current = None;
    let mut run = Vec::new();

    for (raw, insn) in function.raw.iter().zip(&function.instructions) {
        match raw.line_index() {
            Some(index) => {
                flush(&mut groups, current, std::mem::take(&mut run), source);
                current = Some(lines.resolve(index));
            }
            None => run.push(insn.clone()),
        }
    }
    flush(&mut groups, current, run, source);

    groups
}

fn flush(groups: &mut Vec<SourceGroup>, line: Option<u32>, run: Vec<Instruction>, source: Option<&SourceText>) {
    if run.is_empty() {
        return;
    }
    let text = source
        .zip(line)
        .and_then(|(src, line)| src.get(&line))
        .filter(|text| !text.trim().is_empty());
    let group = SourceGroup {
        line,
        source: text.cloned(),
        mode: if text.is_some() {
            RenderMode::Inline
        } else {
            RenderMode::Unavailable
        },
        instructions: run,
    };
    push(groups, group);
}

fn push(groups: &mut Vec<SourceGroup>, group: SourceGroup) {
    match groups.last_mut() {
        Some(last) if last.line == group.line => last.instructions.extend(group.instructions),
        _ => groups.push(group),
    }
}

/// Concatenate two group sequences, coalescing the boundary groups when
/// they share a line.
///
/// Associative: `merge(merge(a, b), c) == merge(a, merge(b, c))`.
pub fn merge(left: Vec<SourceGroup>, right: Vec<SourceGroup>) -> Vec<SourceGroup> {
    let mut out = left;
    for group in right {
        push(&mut out, group);
    }
    out
}
