// Build script for beamd-isa.
//
// Two phases:
//   1. Parse `isa/genop.tab` (the generic instruction set) and
//      `isa/categories.yaml` (semantic categories and call shapes).
//   2. Cross-check the two and emit `generated.rs`, a dense static table
//      indexed by opcode id.
//
// A non-deprecated opcode without a category is a build failure: every
// instruction the loader accepts must be classified before it ships.

use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fmt::Write as _;
use std::path::PathBuf;

use serde::Deserialize;

#[derive(Deserialize)]
struct CategoryFile {
    categories: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    call_shapes: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    line_marker: Vec<String>,
    #[serde(default)]
    import_operand: BTreeMap<String, u8>,
}

struct Definition {
    id: u8,
    name: String,
    arity: u8,
    deprecated: bool,
    doc: Option<String>,
    operand_names: Vec<String>,
}

struct GenOp {
    format_number: u32,
    defs: Vec<Definition>,
}

fn main() {
    let manifest = env::var("CARGO_MANIFEST_DIR").unwrap();
    let out_dir = env::var("OUT_DIR").unwrap();

    let genop_path = format!("{manifest}/isa/genop.tab");
    let categories_path = format!("{manifest}/isa/categories.yaml");

    // Phase 1: parse inputs
    let genop_src = std::fs::read_to_string(&genop_path)
        .unwrap_or_else(|e| panic!("failed to read {genop_path}: {e}"));
    let genop = parse_genop(&genop_src);

    let categories_src = std::fs::read_to_string(&categories_path)
        .unwrap_or_else(|e| panic!("failed to read {categories_path}: {e}"));
    let categories: CategoryFile = serde_yaml::from_str(&categories_src)
        .unwrap_or_else(|e| panic!("invalid {categories_path}: {e}"));

    // Phase 2: classify and emit
    let generated = generate(&genop, &categories);
    let out_path = PathBuf::from(&out_dir).join("generated.rs");
    std::fs::write(&out_path, generated).expect("failed to write generated.rs");

    println!("cargo:rerun-if-changed=isa/genop.tab");
    println!("cargo:rerun-if-changed=isa/categories.yaml");
}

/// Parse the opcode definitions in genop.tab.
///
/// Doc blocks (`## ...`) accumulate until the next definition line, attach
/// to it, and reset.
fn parse_genop(src: &str) -> GenOp {
    let mut format_number = 0;
    let mut defs: Vec<Definition> = Vec::new();
    let mut doc_lines: Vec<String> = Vec::new();
    let mut operand_names: Vec<String> = Vec::new();
    let mut in_doc = false;

    for (lineno, raw) in src.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(num) = line.strip_prefix("BEAM_FORMAT_NUMBER=") {
            format_number = num
                .trim()
                .parse()
                .unwrap_or_else(|e| panic!("genop.tab:{}: bad format number: {e}", lineno + 1));
            continue;
        }
        if let Some(annotation) = line.strip_prefix("##") {
            let annotation = annotation.trim();
            if let Some(spec) = annotation.strip_prefix("@spec") {
                operand_names = spec.split_whitespace().skip(1).map(str::to_owned).collect();
                in_doc = false;
            } else if let Some(doc) = annotation.strip_prefix("@doc") {
                doc_lines.push(doc.trim().to_owned());
                in_doc = true;
            } else if in_doc {
                doc_lines.push(annotation.to_owned());
            }
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        let (id, rest) = line
            .split_once(':')
            .unwrap_or_else(|| panic!("genop.tab:{}: expected `ID: name/arity`", lineno + 1));
        let id: u8 = id
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("genop.tab:{}: bad opcode id: {e}", lineno + 1));
        let (name, arity) = rest
            .trim()
            .split_once('/')
            .unwrap_or_else(|| panic!("genop.tab:{}: expected `name/arity`", lineno + 1));
        let arity: u8 = arity
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("genop.tab:{}: bad arity: {e}", lineno + 1));
        let (deprecated, name) = match name.strip_prefix('-') {
            Some(n) => (true, n),
            None => (false, name),
        };

        if id == 0 {
            panic!("genop.tab:{}: opcode 0 is reserved", lineno + 1);
        }
        if defs.iter().any(|d| d.id == id || d.name == name) {
            panic!("genop.tab:{}: duplicate definition of {name} ({id})", lineno + 1);
        }

        let doc = if doc_lines.is_empty() {
            None
        } else {
            Some(doc_lines.join("\n").trim_end().to_owned())
        };
        defs.push(Definition {
            id,
            name: name.to_owned(),
            arity,
            deprecated,
            doc,
            operand_names: std::mem::take(&mut operand_names),
        });
        doc_lines.clear();
        in_doc = false;
    }

    GenOp {
        format_number,
        defs,
    }
}

fn category_variant(key: &str) -> &'static str {
    match key {
        "call" => "Call",
        "stack" => "Stack",
        "data" => "Data",
        "control" => "Control",
        "return" => "Return",
        "exception" => "Exception",
        "error" => "Error",
        "message" => "Message",
        "binary" => "Binary",
        "float" => "Float",
        "meta" => "Meta",
        other => panic!("categories.yaml: unknown category `{other}`"),
    }
}

fn shape_flag(key: &str) -> &'static str {
    match key {
        "local_call" => "LOCAL_CALL",
        "external_call" => "EXTERNAL_CALL",
        "bif_call" => "BIF_CALL",
        "dynamic_call" => "DYNAMIC_CALL",
        "tail_call" => "TAIL_CALL",
        other => panic!("categories.yaml: unknown call shape `{other}`"),
    }
}

fn generate(genop: &GenOp, file: &CategoryFile) -> String {
    let known: BTreeSet<&str> = genop.defs.iter().map(|d| d.name.as_str()).collect();
    let check_known = |section: &str, name: &str| {
        if !known.contains(name) {
            panic!("categories.yaml: `{section}` names unknown opcode `{name}`");
        }
    };

    let mut category_of: BTreeMap<&str, &'static str> = BTreeMap::new();
    for (key, names) in &file.categories {
        let variant = category_variant(key);
        for name in names {
            check_known(key, name);
            if let Some(prev) = category_of.insert(name.as_str(), variant) {
                panic!("categories.yaml: `{name}` listed under both {prev} and {variant}");
            }
        }
    }

    let mut flags_of: BTreeMap<&str, Vec<&'static str>> = BTreeMap::new();
    for (key, names) in &file.call_shapes {
        let flag = shape_flag(key);
        for name in names {
            check_known(key, name);
            flags_of.entry(name.as_str()).or_default().push(flag);
        }
    }
    for name in &file.line_marker {
        check_known("line_marker", name);
        flags_of.entry(name.as_str()).or_default().push("LINE_MARKER");
    }
    for name in file.import_operand.keys() {
        check_known("import_operand", name);
    }

    let unclassified: Vec<&str> = genop
        .defs
        .iter()
        .filter(|d| !d.deprecated && !category_of.contains_key(d.name.as_str()))
        .map(|d| d.name.as_str())
        .collect();
    if !unclassified.is_empty() {
        panic!(
            "categories.yaml: opcodes without a category: {}",
            unclassified.join(", ")
        );
    }

    let max_opcode = genop.defs.iter().map(|d| d.id).max().unwrap_or(0);

    let mut out = String::new();
    writeln!(out, "// @generated by build.rs from isa/genop.tab and isa/categories.yaml").unwrap();
    writeln!(out).unwrap();
    writeln!(out, "/// `BEAM_FORMAT_NUMBER` declared by the instruction set.").unwrap();
    writeln!(out, "pub const FORMAT_NUMBER: u32 = {};", genop.format_number).unwrap();
    writeln!(out).unwrap();
    writeln!(out, "/// Highest opcode id known to this build.").unwrap();
    writeln!(out, "pub const MAX_OPCODE: u8 = {max_opcode};").unwrap();
    writeln!(out).unwrap();
    writeln!(
        out,
        "static OPCODES: [Option<OpcodeInfo>; {}] = [",
        max_opcode as usize + 1
    )
    .unwrap();

    for id in 0..=max_opcode {
        let Some(def) = genop.defs.iter().find(|d| d.id == id) else {
            writeln!(out, "    None,").unwrap();
            continue;
        };

        let category = category_of.get(def.name.as_str()).copied().unwrap_or("Unknown");
        let mut flags = String::from("OpcodeFlags::empty()");
        if def.deprecated {
            flags.push_str(".union(OpcodeFlags::DEPRECATED)");
        }
        for flag in flags_of.get(def.name.as_str()).into_iter().flatten() {
            write!(flags, ".union(OpcodeFlags::{flag})").unwrap();
        }
        let import_operand = match file.import_operand.get(def.name.as_str()) {
            Some(pos) if *pos < def.arity => format!("Some({pos})"),
            Some(pos) => panic!(
                "categories.yaml: import operand {pos} out of range for {}/{}",
                def.name, def.arity
            ),
            None => "None".to_owned(),
        };
        let doc = match &def.doc {
            Some(d) => format!("Some({d:?})"),
            None => "None".to_owned(),
        };
        let operand_names = def
            .operand_names
            .iter()
            .map(|n| format!("{n:?}"))
            .collect::<Vec<_>>()
            .join(", ");

        writeln!(out, "    Some(OpcodeInfo {{").unwrap();
        writeln!(out, "        id: {},", def.id).unwrap();
        writeln!(out, "        mnemonic: {:?},", def.name).unwrap();
        writeln!(out, "        arity: {},", def.arity).unwrap();
        writeln!(out, "        category: Category::{category},").unwrap();
        writeln!(out, "        flags: {flags},").unwrap();
        writeln!(out, "        import_operand: {import_operand},").unwrap();
        writeln!(out, "        doc: {doc},").unwrap();
        writeln!(out, "        operand_names: &[{operand_names}],").unwrap();
        writeln!(out, "    }}),").unwrap();
    }
    writeln!(out, "];").unwrap();

    out
}
