//! Operand and instruction rendering.
//!
//! Every function here is total: any operand the tokenizer can produce gets
//! some text, falling back to a structural rendering for shapes without a
//! dedicated rule.

use std::fmt::Write;

use beamd_ir::{AllocList, Instruction, Operand, RawInstruction, Term};

use crate::Options;

const ELLIPSIS: &str = "...";

/// Instruction families whose trailing list is a flat key/value sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairShape {
    /// `get_map_elements Fail Src [Key Dst ...]`, rendered `key: dst`.
    Extract,
    /// `put_map_* Fail Src Dst Live [Key Value ...]`, rendered `key => value`.
    Construct,
}

impl PairShape {
    fn for_mnemonic(mnemonic: &str) -> Option<(Self, usize)> {
        match mnemonic {
            "get_map_elements" => Some((PairShape::Extract, 2)),
            "put_map_assoc" | "put_map_exact" => Some((PairShape::Construct, 4)),
            _ => None,
        }
    }

    fn separator(self) -> &'static str {
        match self {
            PairShape::Extract => ": ",
            PairShape::Construct => " => ",
        }
    }
}

/// Format one raw instruction.
///
/// Unknown opcodes keep their operands and get the mnemonic `opcode_<id>`.
pub fn format_instruction(raw: &RawInstruction, opts: &Options) -> Instruction {
    let info = raw.info();
    let mnemonic = if info.is_placeholder() {
        format!("opcode_{}", raw.opcode)
    } else {
        info.mnemonic().to_owned()
    };

    let operands = match PairShape::for_mnemonic(&mnemonic) {
        Some((shape, fixed)) => format_paired(&raw.operands, shape, fixed, opts),
        // A label definition carries its number untagged.
        None if mnemonic == "label" => raw
            .operands
            .iter()
            .map(|op| match op {
                Operand::Unsigned(n) => format!("f({n})"),
                other => format_operand(other, opts),
            })
            .collect(),
        None => raw
            .operands
            .iter()
            .map(|op| format_operand(op, opts))
            .collect(),
    };

    Instruction {
        category: info.category(),
        mnemonic,
        operands,
    }
}

/// Render the fixed prefix normally, then one entry per key/value pair.
///
/// Accepts both the canonical shape (pairs wrapped in a trailing list) and
/// the legacy one (pairs spread over the remaining operands). A dangling key
/// is rendered on its own.
fn format_paired(operands: &[Operand], shape: PairShape, fixed: usize, opts: &Options) -> Vec<String> {
    if operands.len() < fixed {
        return operands.iter().map(|op| format_operand(op, opts)).collect();
    }

    let (prefix, rest) = operands.split_at(fixed);
    let flat = match rest {
        [Operand::List(items)] => items.as_slice(),
        _ => rest,
    };

    let mut out: Vec<String> = prefix.iter().map(|op| format_operand(op, opts)).collect();
    for pair in flat.chunks(2) {
        match pair {
            [key, value] => out.push(format!(
                "{}{}{}",
                format_operand(key, opts),
                shape.separator(),
                format_operand(value, opts)
            )),
            [key] => out.push(format_operand(key, opts)),
            _ => {}
        }
    }
    out
}

/// Format one operand.
pub fn format_operand(op: &Operand, opts: &Options) -> String {
    match op {
        Operand::X(n) => format!("x({n})"),
        Operand::Y(n) => format!("y({n})"),
        Operand::Fr(n) => format!("fr({n})"),
        Operand::Label(n) => format!("f({n})"),
        Operand::Atom(name) => format_atom(name),
        Operand::Nil => "[]".to_owned(),
        Operand::Integer(n) => n.to_string(),
        Operand::Unsigned(n) => n.to_string(),
        Operand::Float(f) => format!("{f:?}"),
        Operand::Literal(term) => format_literal(term, opts.literal_width),
        Operand::LiteralRef(n) => format!("lit({n})"),
        Operand::ExtFunc(func) => func.to_string(),
        Operand::Typed { reg, .. } => format_operand(reg, opts),
        Operand::Alloc(alloc) => format_alloc(alloc),
        // Jump tables and element lists: every entry is kept.
        Operand::List(items) => delimited(items, "[", "]", opts),
        Operand::Tuple(items) => delimited(items, "{", "}", opts),
        Operand::Other(text) => text.clone(),
    }
}

fn delimited(items: &[Operand], open: &str, close: &str, opts: &Options) -> String {
    let mut out = String::from(open);
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&format_operand(item, opts));
    }
    out.push_str(close);
    out
}

/// `:name`, or `:"quoted name"` when the atom is not a plain identifier.
pub fn format_atom(name: &str) -> String {
    let mut chars = name.chars();
    let plain = chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '@');
    if plain {
        format!(":{name}")
    } else {
        format!(":\"{}\"", escape(name))
    }
}

/// `words:N,floats:N,funs:N` without the zero components.
pub fn format_alloc(alloc: &AllocList) -> String {
    let parts: Vec<String> = [
        ("words", alloc.words),
        ("floats", alloc.floats),
        ("funs", alloc.funs),
    ]
    .into_iter()
    .filter(|&(_, n)| n != 0)
    .map(|(key, n)| format!("{key}:{n}"))
    .collect();

    if parts.is_empty() {
        "words:0".to_owned()
    } else {
        parts.join(",")
    }
}

/// Render a literal term, keeping the result within `width` characters plus
/// the ellipsis. Binaries also carry their full byte length.
pub fn format_literal(term: &Term, width: usize) -> String {
    let mut body = String::new();
    write_term(&mut body, term);
    match term {
        Term::Binary(bytes) => {
            let suffix = format!(" ({} bytes)", bytes.len());
            match width.checked_sub(suffix.chars().count()) {
                Some(budget) => format!("{}{suffix}", truncate(&body, budget)),
                None => truncate(&(body + &suffix), width),
            }
        }
        _ => truncate(&body, width),
    }
}

fn write_term(out: &mut String, term: &Term) {
    match term {
        Term::Atom(name) => out.push_str(&format_atom(name)),
        Term::Integer(n) => {
            let _ = write!(out, "{n}");
        }
        Term::Float(f) => {
            let _ = write!(out, "{f:?}");
        }
        Term::Binary(bytes) => write_binary(out, bytes),
        Term::Nil => out.push_str("[]"),
        Term::List(items) => write_terms(out, items, "[", "]"),
        Term::ImproperList(items, tail) => {
            write_terms(out, items, "[", "");
            out.push_str(" | ");
            write_term(out, tail);
            out.push(']');
        }
        Term::Tuple(items) => write_terms(out, items, "{", "}"),
        Term::Other(text) => out.push_str(text),
        Term::Map(pairs) => {
            out.push_str("#{");
            for (i, (key, value)) in pairs.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_term(out, key);
                out.push_str(" => ");
                write_term(out, value);
            }
            out.push('}');
        }
    }
}

fn write_terms(out: &mut String, items: &[Term], open: &str, close: &str) {
    out.push_str(open);
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_term(out, item);
    }
    out.push_str(close);
}

fn write_binary(out: &mut String, bytes: &[u8]) {
    match std::str::from_utf8(bytes) {
        Ok(text) if !text.chars().any(char::is_control) => {
            let _ = write!(out, "<<\"{}\">>", escape(text));
        }
        _ => {
            out.push_str("<<");
            for (i, b) in bytes.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{b}");
            }
            out.push_str(">>");
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Cut `text` to `width` characters and append `...` when anything was cut.
pub fn truncate(text: &str, width: usize) -> String {
    match text.char_indices().nth(width) {
        Some((cut, _)) => format!("{}{ELLIPSIS}", &text[..cut]),
        None => text.to_owned(),
    }
}
