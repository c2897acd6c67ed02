//! Whole-pipeline tests over hand-assembled module files.

use std::io::Write;

use beamd_analysis::{Options, SourceText, analyze, correlate, debug_source, listing};
use beamd_file::BeamFile;
use beamd_file::compact::{Tag, encode};
use beamd_ir::{RenderMode, Term};
use beamd_isa::{Category, lookup_name};
use flate2::Compression;
use flate2::write::ZlibEncoder;

/// Minimal assembler for test bodies.
struct Asm {
    bytes: Vec<u8>,
}

impl Asm {
    fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    fn op(mut self, mnemonic: &str, operands: &[(Tag, i64)]) -> Self {
        let info = lookup_name(mnemonic).unwrap();
        assert_eq!(info.arity() as usize, operands.len(), "{mnemonic}");
        self.bytes.push(info.id());
        for &(tag, value) in operands {
            self.bytes.extend(encode(tag, value));
        }
        self
    }

    /// An instruction whose first operand is a literal table reference.
    fn op_lit(mut self, mnemonic: &str, literal: i64, rest: &[(Tag, i64)]) -> Self {
        let info = lookup_name(mnemonic).unwrap();
        assert_eq!(info.arity() as usize, rest.len() + 1, "{mnemonic}");
        self.bytes.push(info.id());
        self.bytes.extend(encode(Tag::Extended, 4));
        self.bytes.extend(encode(Tag::Unsigned, literal));
        for &(tag, value) in rest {
            self.bytes.extend(encode(tag, value));
        }
        self
    }
}

const U: Tag = Tag::Unsigned;
const I: Tag = Tag::Integer;
const A: Tag = Tag::Atom;
const X: Tag = Tag::X;
const Y: Tag = Tag::Y;
const F: Tag = Tag::Label;

fn u32s(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

fn atom_chunk(names: &[&str]) -> Vec<u8> {
    let mut data = u32s(&[names.len() as u32]);
    for n in names {
        data.push(n.len() as u8);
        data.extend_from_slice(n.as_bytes());
    }
    data
}

fn code_chunk(asm: Asm, labels: u32, functions: u32) -> Vec<u8> {
    let mut data = u32s(&[16, 0, beamd_isa::MAX_OPCODE as u32, labels, functions]);
    data.extend(asm.bytes);
    data
}

fn line_chunk(lines: &[i64]) -> Vec<u8> {
    let n = lines.len() as u32;
    let mut data = u32s(&[0, 0, n, n, 0]);
    for &l in lines {
        data.extend(encode(Tag::Integer, l));
    }
    data
}

fn container(chunks: &[(&[u8; 4], Vec<u8>)]) -> Vec<u8> {
    let mut body = b"BEAM".to_vec();
    for (id, payload) in chunks {
        body.extend_from_slice(*id);
        body.extend(u32s(&[payload.len() as u32]));
        body.extend_from_slice(payload);
        while body.len() % 4 != 0 {
            body.push(0);
        }
    }
    let mut data = b"FOR1".to_vec();
    data.extend(u32s(&[body.len() as u32]));
    data.extend(body);
    data
}

/// ```erlang
/// -module(math).
/// -export([factorial/1]).
/// factorial(0) -> 1;
/// factorial(N) -> N * factorial(N - 1).
/// ```
fn factorial_code() -> Asm {
    Asm::new()
        .op("label", &[(U, 1)])
        .op("line", &[(U, 0)])
        .op("func_info", &[(A, 1), (A, 2), (U, 1)])
        .op("label", &[(U, 2)])
        .op("is_eq_exact", &[(F, 3), (X, 0), (I, 0)])
        .op("move", &[(I, 1), (X, 0)])
        .op("return", &[])
        .op("label", &[(U, 3)])
        .op("line", &[(U, 1)])
        // import 0: erlang:'-'/2
        .op("gc_bif2", &[(F, 0), (U, 1), (U, 0), (X, 0), (I, 1), (X, 1)])
        .op("allocate", &[(U, 1), (U, 1)])
        .op("move", &[(X, 0), (Y, 0)])
        .op("move", &[(X, 1), (X, 0)])
        .op("line", &[(U, 1)])
        .op("call", &[(U, 1), (F, 2)])
        .op("line", &[(U, 1)])
        // import 1: erlang:'*'/2
        .op("gc_bif2", &[(F, 0), (U, 1), (U, 1), (Y, 0), (X, 0), (X, 0)])
        .op("deallocate", &[(U, 1)])
        .op("return", &[])
        .op("int_code_end", &[])
}

fn factorial_file(line: Option<Vec<u8>>) -> BeamFile {
    let mut chunks = vec![
        (
            b"AtU8",
            atom_chunk(&["math", "factorial", "erlang", "-", "*"]),
        ),
        (b"Code", code_chunk(factorial_code(), 4, 1)),
        (b"ImpT", u32s(&[2, 3, 4, 2, 3, 5, 2])),
        (b"ExpT", u32s(&[1, 2, 1, 2])),
    ];
    if let Some(line) = line {
        chunks.push((b"Line", line));
    }
    BeamFile::parse(container(&chunks)).unwrap()
}

fn factorial_source() -> SourceText {
    [
        "-module(math).",
        "-export([factorial/1]).",
        "factorial(0) -> 1;",
        "factorial(N) -> N * factorial(N - 1).",
    ]
    .into_iter()
    .zip(1..)
    .map(|(text, n)| (n, text.to_owned()))
    .collect()
}

#[test]
fn factorial_call_graph() {
    let file = factorial_file(Some(line_chunk(&[3, 4])));
    let analysis = analyze(&file, None, &Options::default()).unwrap();

    assert_eq!(analysis.module, "math");
    assert_eq!(analysis.exports, ["factorial/1"]);

    let g = &analysis.call_graph;
    assert!(g.contains_edge("math.factorial/1", "math.factorial/1"));
    assert!(g.contains_edge("math.factorial/1", "erlang.*/2"));
    assert!(g.contains_edge("math.factorial/1", "erlang.-/2"));
    assert_eq!(g.edge_count(), 3);
    for (caller, callee) in g.edges() {
        assert!(g.contains_node(caller) && g.contains_node(callee));
    }
}

#[test]
fn factorial_disassembly() {
    let file = factorial_file(Some(line_chunk(&[3, 4])));
    let analysis = analyze(&file, None, &Options::default()).unwrap();
    let listing = analysis.function("factorial/1").unwrap();
    let f = &listing.function;

    assert_eq!(f.entry, 2);
    assert!(f.category_fraction(Category::Control) > 0.0);
    assert!(listing.categories[&Category::Call] >= 3);
    assert_eq!(f.lines.get(&0), Some(&3));
    assert_eq!(f.lines.get(&1), Some(&4));

    let text: Vec<String> = f.instructions.iter().map(ToString::to_string).collect();
    assert!(text.contains(&"func_info :math, :factorial, 1".to_owned()));
    assert!(text.contains(&"is_eq_exact f(3), x(0), 0".to_owned()));
    assert!(text.contains(&"gc_bif2 f(0), 1, erlang:-/2, x(0), 1, x(1)".to_owned()));
    assert!(text.contains(&"call 1, f(2)".to_owned()));
    assert!(text.contains(&"move x(0), y(0)".to_owned()));
}

#[test]
fn factorial_with_source() {
    let file = factorial_file(Some(line_chunk(&[3, 4])));
    let source = factorial_source();
    let analysis = analyze(&file, Some(&source), &Options::default()).unwrap();
    let func = analysis.function("factorial/1").unwrap();

    let lines: Vec<_> = func.groups.iter().map(|g| (g.line, g.mode)).collect();
    assert_eq!(
        lines,
        [
            (None, RenderMode::Unavailable),
            (Some(3), RenderMode::Inline),
            (Some(4), RenderMode::Inline),
        ]
    );

    let text = listing::render_function(func);
    assert!(text.contains("      3| factorial(0) -> 1;\n"));
    assert!(text.contains("gc_bif2 f(0), 1, erlang:*/2, y(0), x(0), x(0)"));
}

#[test]
fn missing_line_chunk_degrades_to_indices() {
    let file = factorial_file(None);
    let analysis = analyze(&file, None, &Options::default()).unwrap();
    let f = &analysis.function("factorial/1").unwrap().function;
    assert_eq!(f.lines.get(&0), Some(&0));
    assert_eq!(f.lines.get(&1), Some(&1));
    assert_eq!(analysis.call_graph.edge_count(), 3);
}

#[test]
fn malformed_line_chunk_does_not_stop_analysis() {
    let mut line = line_chunk(&[3, 4]);
    // Claim more entries than encoded.
    line[12..16].copy_from_slice(&50u32.to_be_bytes());
    let file = factorial_file(Some(line));
    assert!(file.line_table().is_empty());

    let analysis = analyze(&file, None, &Options::default()).unwrap();
    assert_eq!(analysis.functions.len(), 1);
    assert!(analysis.call_graph.contains_edge("math.factorial/1", "math.factorial/1"));
}

#[test]
fn analysis_is_deterministic() {
    let file = factorial_file(Some(line_chunk(&[3, 4])));
    let source = factorial_source();
    let a = analyze(&file, Some(&source), &Options::default()).unwrap();
    let b = analyze(&file, Some(&source), &Options::default()).unwrap();
    assert_eq!(a.call_graph, b.call_graph);
    assert_eq!(a.functions[0].groups, b.functions[0].groups);

    let lines = file.line_table();
    let f = &a.functions[0].function;
    assert_eq!(correlate(f, &lines, Some(&source)), a.functions[0].groups);
}

#[test]
fn dynamic_calls_only() {
    // apply_fun(F, X) -> F(X).
    let code = Asm::new()
        .op("label", &[(U, 1)])
        .op("func_info", &[(A, 1), (A, 2), (U, 2)])
        .op("label", &[(U, 2)])
        .op("move", &[(X, 0), (X, 2)])
        .op("move", &[(X, 1), (X, 0)])
        .op("move", &[(X, 2), (X, 1)])
        .op("call_fun", &[(U, 1)])
        .op("return", &[])
        .op("int_code_end", &[]);
    let file = BeamFile::parse(container(&[
        (b"AtU8", atom_chunk(&["dyn", "apply_fun"])),
        (b"Code", code_chunk(code, 3, 1)),
        (b"ImpT", u32s(&[0])),
        (b"ExpT", u32s(&[0])),
    ]))
    .unwrap();

    let analysis = analyze(&file, None, &Options::default()).unwrap();
    assert_eq!(analysis.call_graph.edge_count(), 0);
    assert!(analysis.call_graph.node_count() > 0);
    assert!(analysis.call_graph.contains_node("dyn.apply_fun/2"));
}

/// Serialize a term the way the runtime does, minus compression.
fn term_to_binary(term: &Term) -> Vec<u8> {
    fn put(out: &mut Vec<u8>, term: &Term) {
        match term {
            Term::Atom(name) => {
                out.push(119);
                out.push(name.len() as u8);
                out.extend_from_slice(name.as_bytes());
            }
            Term::Integer(n) => {
                out.push(98);
                out.extend((*n as i32).to_be_bytes());
            }
            Term::Binary(bytes) => {
                out.push(109);
                out.extend((bytes.len() as u32).to_be_bytes());
                out.extend_from_slice(bytes);
            }
            Term::Nil => out.push(106),
            Term::List(items) => {
                out.push(108);
                out.extend((items.len() as u32).to_be_bytes());
                for item in items {
                    put(out, item);
                }
                out.push(106);
            }
            Term::Tuple(items) => {
                out.push(104);
                out.push(items.len() as u8);
                for item in items {
                    put(out, item);
                }
            }
            other => panic!("unsupported in test encoder: {other:?}"),
        }
    }
    let mut out = vec![131];
    put(&mut out, term);
    out
}

fn literal_chunk(terms: &[Term]) -> Vec<u8> {
    let mut table = u32s(&[terms.len() as u32]);
    for term in terms {
        let bytes = term_to_binary(term);
        table.extend(u32s(&[bytes.len() as u32]));
        table.extend(bytes);
    }
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(&table).unwrap();
    let mut chunk = u32s(&[table.len() as u32]);
    chunk.extend(enc.finish().unwrap());
    chunk
}

#[test]
fn literal_binaries_render_with_length() {
    // greeting() -> <<"hello">>.
    let code = Asm::new()
        .op("label", &[(U, 1)])
        .op("func_info", &[(A, 1), (A, 2), (U, 0)])
        .op("label", &[(U, 2)])
        .op_lit("move", 0, &[(X, 0)])
        .op("return", &[])
        .op("int_code_end", &[]);
    let file = BeamFile::parse(container(&[
        (b"AtU8", atom_chunk(&["lits", "greeting"])),
        (b"Code", code_chunk(code, 3, 1)),
        (b"ImpT", u32s(&[0])),
        (b"ExpT", u32s(&[0])),
        (b"LitT", literal_chunk(&[Term::Binary(b"hello".to_vec())])),
    ]))
    .unwrap();

    let analysis = analyze(&file, None, &Options::default()).unwrap();
    let f = &analysis.function("greeting/0").unwrap().function;
    let text: Vec<String> = f.instructions.iter().map(ToString::to_string).collect();
    assert!(text.contains(&"move <<\"hello\">> (5 bytes), x(0)".to_owned()));

    // Without the literal chunk the operand stays a reference.
    let code = Asm::new()
        .op("label", &[(U, 1)])
        .op("func_info", &[(A, 1), (A, 2), (U, 0)])
        .op("label", &[(U, 2)])
        .op_lit("move", 0, &[(X, 0)])
        .op("return", &[])
        .op("int_code_end", &[]);
    let bare = BeamFile::parse(container(&[
        (b"AtU8", atom_chunk(&["lits", "greeting"])),
        (b"Code", code_chunk(code, 3, 1)),
        (b"ImpT", u32s(&[0])),
        (b"ExpT", u32s(&[0])),
    ]))
    .unwrap();
    let analysis = analyze(&bare, None, &Options::default()).unwrap();
    let f = &analysis.function("greeting/0").unwrap().function;
    assert!(f.instructions.iter().any(|i| i.to_string() == "move lit(0), x(0)"));
}

fn form(items: Vec<Term>) -> Term {
    Term::Tuple(items)
}

fn a(name: &str) -> Term {
    Term::Atom(name.into())
}

fn expr(kind: &str, line: i64, rest: Vec<Term>) -> Term {
    let mut items = vec![a(kind), Term::Integer(line)];
    items.extend(rest);
    form(items)
}

/// Abstract code of the factorial module.
fn factorial_forms() -> Term {
    let n = || expr("var", 4, vec![a("N")]);
    let int = |line, v| expr("integer", line, vec![Term::Integer(v)]);
    let clause = |line, patterns, body| {
        expr("clause", line, vec![Term::List(patterns), Term::Nil, Term::List(body)])
    };
    let recurse = expr(
        "call",
        4,
        vec![
            expr("atom", 4, vec![a("factorial")]),
            Term::List(vec![expr("op", 4, vec![a("-"), n(), int(4, 1)])]),
        ],
    );
    Term::List(vec![
        expr("attribute", 1, vec![a("module"), a("math")]),
        expr(
            "attribute",
            2,
            vec![a("export"), Term::List(vec![form(vec![a("factorial"), Term::Integer(1)])])],
        ),
        expr(
            "function",
            3,
            vec![
                a("factorial"),
                Term::Integer(1),
                Term::List(vec![
                    clause(3, vec![int(3, 0)], vec![int(3, 1)]),
                    clause(4, vec![n()], vec![expr("op", 4, vec![a("*"), n(), recurse])]),
                ]),
            ],
        ),
        form(vec![a("eof"), Term::Integer(5)]),
    ])
}

#[test]
fn debug_info_stands_in_for_missing_source() {
    let abst = term_to_binary(&form(vec![a("raw_abstract_v1"), factorial_forms()]));
    let mut chunks = vec![
        (b"AtU8", atom_chunk(&["math", "factorial", "erlang", "-", "*"])),
        (b"Code", code_chunk(factorial_code(), 4, 1)),
        (b"ImpT", u32s(&[2, 3, 4, 2, 3, 5, 2])),
        (b"ExpT", u32s(&[1, 2, 1, 2])),
        (b"Line", line_chunk(&[3, 4])),
    ];
    chunks.push((b"Abst", abst));
    let file = BeamFile::parse(container(&chunks)).unwrap();

    let source = debug_source(&file).unwrap();
    assert_eq!(source[&1], "-module(math).");
    assert_eq!(source[&3], "factorial(0) -> 1;");
    assert_eq!(source[&4], "factorial(N) -> N * factorial(N - 1).");

    let analysis = analyze(&file, Some(&source), &Options::default()).unwrap();
    let func = analysis.function("factorial/1").unwrap();
    let modes: Vec<_> = func.groups.iter().map(|g| (g.line, g.mode)).collect();
    assert_eq!(
        modes,
        [
            (None, RenderMode::Unavailable),
            (Some(3), RenderMode::Inline),
            (Some(4), RenderMode::Inline),
        ]
    );

    // Stripped modules have nothing to offer.
    assert!(debug_source(&factorial_file(None)).is_none());
}
