//! Source text providers.

use std::collections::BTreeMap;
use std::path::Path;

use beamd_file::BeamFile;

use crate::abstract_code::forms_to_source;

/// 1-based line number -> line text.
pub type SourceText = BTreeMap<u32, String>;

/// Read a source file. I/O failures are logged and yield `None`.
pub fn load_source(path: &Path) -> Option<SourceText> {
    match std::fs::read_to_string(path) {
        Ok(text) => Some(number_lines(&text, 1)),
        Err(e) => {
            log::warn!("cannot read source {}: {e}", path.display());
            None
        }
    }
}

fn number_lines(text: &str, first: u32) -> SourceText {
    text.lines()
        .zip(first..=u32::MAX)
        .map(|(line, n)| (n, line.to_owned()))
        .collect()
}

/// Lay out pretty-printed forms, each anchored at its start line.
///
/// Forms are placed in line order. A form whose start is already covered by
/// an earlier one is pushed down below it, so the result only approximates
/// the original layout.
pub fn reconstruct_source(forms: &[(u32, String)]) -> SourceText {
    let mut ordered: Vec<&(u32, String)> = forms.iter().collect();
    ordered.sort_by_key(|(line, _)| *line);

    let mut out = SourceText::new();
    let mut next_free = 1;
    for (line, text) in ordered {
        let start = (*line).max(next_free);
        if start != *line {
            log::debug!("form at line {line} pushed down to {start}");
        }
        let placed = number_lines(text, start);
        let height = u32::try_from(placed.len().max(1)).unwrap_or(u32::MAX);
        next_free = start.saturating_add(height);
        out.extend(placed);
    }
    out
}

/// Pseudo-source rebuilt from the module's debug metadata, for modules
/// whose source file is not at hand. `None` when the module carries no
/// abstract code.
pub fn debug_source(file: &BeamFile) -> Option<SourceText> {
    let forms = match file.abstract_forms() {
        Ok(Some(forms)) => forms,
        Ok(None) => return None,
        Err(e) => {
            log::warn!("unreadable debug info: {e}");
            return None;
        }
    };
    let text = reconstruct_source(&forms_to_source(&forms));
    (!text.is_empty()).then_some(text)
}
