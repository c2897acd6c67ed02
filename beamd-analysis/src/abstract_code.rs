//! Pseudo-source from Erlang abstract code.
//!
//! Forms are printed as Erlang-like text, one fragment per source line the
//! annotations point at, so that [`reconstruct_source`](crate::reconstruct_source)
//! can lay them out close to where they were written. Shapes without a rule
//! print as `...`.

use beamd_ir::Term;

const UNKNOWN: &str = "...";

/// Precedence of atomic expressions; never parenthesized.
const PREC_PRIMARY: u8 = 10;
const PREC_PREFIX: u8 = 8;
const PREC_MATCH: u8 = 1;
const PREC_CATCH: u8 = 0;

const RESERVED: &[&str] = &[
    "after", "and", "andalso", "band", "begin", "bnot", "bor", "bsl", "bsr", "bxor", "case",
    "catch", "cond", "div", "else", "end", "fun", "if", "let", "maybe", "not", "of", "or",
    "orelse", "receive", "rem", "try", "when", "xor",
];

/// Turn a module's forms into `(line, text)` fragments.
pub fn forms_to_source(forms: &[Term]) -> Vec<(u32, String)> {
    let mut out = Vec::new();
    for form in forms {
        render_form(form, &mut out);
    }
    out
}

fn render_form(form: &Term, out: &mut Vec<(u32, String)>) {
    let Some(items) = form.as_tuple() else {
        return;
    };
    let Some(kind) = items.first().and_then(Term::as_atom) else {
        return;
    };
    match (kind, &items[1..]) {
        ("attribute", [anno, name, value]) => {
            if let Some(text) = name.as_atom().and_then(|n| attribute(n, value)) {
                out.push((anno_line(anno), text));
            }
        }
        ("function", [_, name, _, clauses]) => {
            let name = atom_name(name.as_atom().unwrap_or("?"));
            let clauses = clauses.as_list().unwrap_or_default();
            for (i, clause) in clauses.iter().enumerate() {
                let end = if i + 1 == clauses.len() { "." } else { ";" };
                function_clause(&name, clause, end, out);
            }
        }
        _ => {}
    }
}

fn attribute(name: &str, value: &Term) -> Option<String> {
    Some(match name {
        "file" | "spec" | "type" | "opaque" | "callback" => return None,
        "export" | "export_type" => format!("-{name}([{}]).", name_arities(value)),
        "import" => match value.as_tuple() {
            Some([module, funs]) => format!("-import({}, [{}]).", literal(module), name_arities(funs)),
            _ => return None,
        },
        "record" => match value.as_tuple() {
            Some([record, fields]) => {
                let fields: Vec<String> = fields
                    .as_list()
                    .unwrap_or_default()
                    .iter()
                    .map(record_field)
                    .collect();
                format!("-record({}, {{{}}}).", literal(record), fields.join(", "))
            }
            _ => return None,
        },
        _ => format!("-{}({}).", atom_name(name), literal(value)),
    })
}

fn name_arities(list: &Term) -> String {
    let items: Vec<String> = list
        .as_list()
        .unwrap_or_default()
        .iter()
        .filter_map(|pair| match pair.as_tuple() {
            Some([f, a]) => Some(format!("{}/{}", atom_name(f.as_atom()?), a.as_integer()?)),
            _ => None,
        })
        .collect();
    items.join(", ")
}

fn record_field(field: &Term) -> String {
    let field = match field.as_tuple() {
        Some([kind, inner, _type]) if kind.as_atom() == Some("typed_record_field") => inner,
        _ => field,
    };
    match field.as_tuple() {
        Some([_, _, name]) => expr(name),
        Some([_, _, name, default]) => format!("{} = {}", expr(name), expr(default)),
        _ => UNKNOWN.to_owned(),
    }
}

/// One function clause. The head and any body expressions sharing its line
/// form one fragment; each later line starts a new, indented one.
fn function_clause(name: &str, clause: &Term, end: &str, out: &mut Vec<(u32, String)>) {
    let Some([_, anno, patterns, guards, body]) = clause.as_tuple() else {
        return;
    };
    let mut head = format!("{name}({})", exprs(patterns));
    push_guards(&mut head, guards);
    head.push_str(" ->");

    let body = body.as_list().unwrap_or_default();
    let mut current = (anno_line(anno), head);
    for (i, e) in body.iter().enumerate() {
        let sep = if i + 1 == body.len() { end } else { "," };
        let text = format!("{}{sep}", expr(e));
        let line = line_of(e);
        if line <= current.0 {
            current.1.push(' ');
            current.1.push_str(&text);
        } else {
            out.push(std::mem::replace(&mut current, (line, format!("    {text}"))));
        }
    }
    out.push(current);
}

/// Line of an annotation: `L`, `{L, Col}` or a property list holding
/// `{location, Loc}`. Unknown shapes give 0.
fn anno_line(anno: &Term) -> u32 {
    let line = match anno {
        Term::Integer(n) => Some(*n),
        Term::Tuple(items) => items.first().and_then(Term::as_integer),
        Term::List(props) => {
            return props
                .iter()
                .filter_map(Term::as_tuple)
                .find_map(|p| match p {
                    [key, loc] if key.as_atom() == Some("location") => Some(anno_line(loc)),
                    _ => None,
                })
                .unwrap_or(0);
        }
        _ => None,
    };
    line.and_then(|l| u32::try_from(l).ok()).unwrap_or(0)
}

fn line_of(e: &Term) -> u32 {
    e.as_tuple()
        .and_then(|items| items.get(1))
        .map_or(0, anno_line)
}

fn push_guards(head: &mut String, guards: &Term) {
    let alternatives: Vec<String> = guards
        .as_list()
        .unwrap_or_default()
        .iter()
        .map(exprs)
        .collect();
    if !alternatives.is_empty() {
        head.push_str(" when ");
        head.push_str(&alternatives.join("; "));
    }
}

fn exprs(list: &Term) -> String {
    match list.as_list() {
        Some(items) => join(items),
        None => UNKNOWN.to_owned(),
    }
}

fn join(items: &[Term]) -> String {
    items.iter().map(expr).collect::<Vec<_>>().join(", ")
}

fn expr(e: &Term) -> String {
    expr_prec(e).0
}

/// Render `e`, parenthesized when it binds looser than `min`.
fn operand(e: &Term, min: u8) -> String {
    let (text, prec) = expr_prec(e);
    if prec < min { format!("({text})") } else { text }
}

fn expr_prec(e: &Term) -> (String, u8) {
    let Some(items) = e.as_tuple() else {
        return (UNKNOWN.to_owned(), PREC_PRIMARY);
    };
    let Some(kind) = items.first().and_then(Term::as_atom) else {
        return (UNKNOWN.to_owned(), PREC_PRIMARY);
    };

    let text = match (kind, &items[1..]) {
        ("var", [_, name]) => name.as_atom().unwrap_or("_").to_owned(),
        ("integer" | "float" | "atom", [_, value]) => literal(value),
        ("char", [_, c]) => char_literal(c),
        ("string", [_, s]) => string_literal(s),
        ("nil", [_]) => "[]".to_owned(),
        ("cons", [_, head, tail]) => cons(head, tail),
        ("tuple", [_, es]) => format!("{{{}}}", exprs(es)),
        ("map", [_, assocs]) => format!("#{{{}}}", exprs(assocs)),
        ("map", [_, base, assocs]) => format!("{}#{{{}}}", operand(base, PREC_PRIMARY), exprs(assocs)),
        ("map_field_assoc", [_, k, v]) => format!("{} => {}", expr(k), expr(v)),
        ("map_field_exact", [_, k, v]) => format!("{} := {}", expr(k), expr(v)),
        ("bin", [_, elems]) => format!("<<{}>>", exprs(elems)),
        ("bin_element", [_, value, size, types]) => bin_element(value, size, types),
        ("match", [_, pattern, value]) => {
            let text = format!("{} = {}", operand(pattern, PREC_MATCH + 1), operand(value, PREC_MATCH));
            return (text, PREC_MATCH);
        }
        ("maybe_match", [_, pattern, value]) => {
            let text = format!("{} ?= {}", operand(pattern, PREC_MATCH + 1), operand(value, PREC_MATCH));
            return (text, PREC_MATCH);
        }
        ("op", [_, op, lhs, rhs]) => {
            let op = op.as_atom().unwrap_or("?");
            let (prec, right_assoc) = binary_precedence(op);
            let (l, r) = if right_assoc { (prec + 1, prec) } else { (prec, prec + 1) };
            return (format!("{} {op} {}", operand(lhs, l), operand(rhs, r)), prec);
        }
        ("op", [_, op, arg]) => {
            let op = op.as_atom().unwrap_or("?");
            let space = if op.chars().all(char::is_alphabetic) { " " } else { "" };
            return (format!("{op}{space}{}", operand(arg, PREC_PREFIX)), PREC_PREFIX);
        }
        ("call", [_, callee, args]) => format!("{}({})", function_ref(callee), exprs(args)),
        ("remote", [_, module, function]) => {
            format!("{}:{}", operand(module, PREC_PRIMARY), operand(function, PREC_PRIMARY))
        }
        ("case", [_, subject, cs]) => format!("case {} of {} end", expr(subject), clauses(cs, Head::Patterns)),
        ("if", [_, cs]) => format!("if {} end", clauses(cs, Head::Guards)),
        ("receive", [_, cs]) => format!("receive {} end", clauses(cs, Head::Patterns)),
        ("receive", [_, cs, timeout, body]) => {
            let mut text = String::from("receive ");
            if cs.as_list().is_some_and(|c| !c.is_empty()) {
                text.push_str(&clauses(cs, Head::Patterns));
                text.push(' ');
            }
            text.push_str(&format!("after {} -> {} end", expr(timeout), exprs(body)));
            text
        }
        ("try", [_, body, cases, catches, after]) => try_expr(body, cases, catches, after),
        ("catch", [_, inner]) => return (format!("catch {}", expr(inner)), PREC_CATCH),
        ("block", [_, es]) => format!("begin {} end", exprs(es)),
        ("lc", [_, e, qs]) => format!("[{} || {}]", expr(e), exprs(qs)),
        ("bc", [_, e, qs]) => format!("<<{} || {}>>", expr(e), exprs(qs)),
        ("mc", [_, e, qs]) => format!("#{{{} || {}}}", expr(e), exprs(qs)),
        ("generate" | "m_generate", [_, p, e]) => format!("{} <- {}", expr(p), expr(e)),
        ("b_generate", [_, p, e]) => format!("{} <= {}", expr(p), expr(e)),
        ("fun", [_, body]) => fun_expr(body),
        ("named_fun", [_, name, cs]) => {
            let name = name.as_atom().unwrap_or("_");
            format!("fun {} end", clauses(cs, Head::Named(name)))
        }
        ("record", [_, name, fields]) => format!("#{}{{{}}}", literal(name), exprs(fields)),
        ("record", [_, base, name, fields]) => {
            format!("{}#{}{{{}}}", operand(base, PREC_PRIMARY), literal(name), exprs(fields))
        }
        ("record_field", [_, field, value]) => format!("{} = {}", expr(field), expr(value)),
        ("record_field", [_, base, name, field]) => {
            format!("{}#{}.{}", operand(base, PREC_PRIMARY), literal(name), expr(field))
        }
        ("record_index", [_, name, field]) => format!("#{}.{}", literal(name), expr(field)),
        _ => UNKNOWN.to_owned(),
    };
    (text, PREC_PRIMARY)
}

fn binary_precedence(op: &str) -> (u8, bool) {
    match op {
        "=" | "!" => (1, true),
        "orelse" => (2, true),
        "andalso" => (3, true),
        "++" | "--" => (5, true),
        "+" | "-" | "bor" | "bxor" | "bsl" | "bsr" | "or" | "xor" => (6, false),
        "*" | "/" | "div" | "rem" | "band" | "and" => (7, false),
        // Comparisons.
        _ => (4, false),
    }
}

fn function_ref(callee: &Term) -> String {
    match callee.as_tuple() {
        Some([kind, _, name]) if kind.as_atom() == Some("atom") => literal(name),
        _ => operand(callee, PREC_PRIMARY),
    }
}

#[derive(Clone, Copy)]
enum Head<'a> {
    /// `Pattern when Guard ->`
    Patterns,
    /// `Guard ->`
    Guards,
    /// `(Args) when Guard ->`
    Fun,
    /// `Name(Args) when Guard ->`
    Named(&'a str),
    /// `Class:Reason:Stack when Guard ->`
    Catch,
}

fn clauses(list: &Term, head: Head<'_>) -> String {
    let rendered: Vec<String> = list
        .as_list()
        .unwrap_or_default()
        .iter()
        .map(|c| clause(c, head))
        .collect();
    rendered.join("; ")
}

fn clause(c: &Term, head: Head<'_>) -> String {
    let Some([_, _, patterns, guards, body]) = c.as_tuple() else {
        return UNKNOWN.to_owned();
    };
    let mut text = match head {
        Head::Patterns => exprs(patterns),
        Head::Guards => String::new(),
        Head::Fun => format!("({})", exprs(patterns)),
        Head::Named(name) => format!("{name}({})", exprs(patterns)),
        Head::Catch => catch_pattern(patterns),
    };
    if matches!(head, Head::Guards) {
        let alternatives: Vec<String> = guards
            .as_list()
            .unwrap_or_default()
            .iter()
            .map(exprs)
            .collect();
        text.push_str(&alternatives.join("; "));
    } else {
        push_guards(&mut text, guards);
    }
    format!("{text} -> {}", exprs(body))
}

fn catch_pattern(patterns: &Term) -> String {
    let parts = patterns
        .as_list()
        .and_then(|p| p.first())
        .and_then(Term::as_tuple)
        .and_then(|t| match t {
            [kind, _, parts] if kind.as_atom() == Some("tuple") => parts.as_list(),
            _ => None,
        });
    match parts {
        Some([class, reason, stack]) => {
            let mut text = format!("{}:{}", expr(class), expr(reason));
            if expr(stack) != "_" {
                text.push(':');
                text.push_str(&expr(stack));
            }
            text
        }
        _ => exprs(patterns),
    }
}

fn try_expr(body: &Term, cases: &Term, catches: &Term, after: &Term) -> String {
    let mut text = format!("try {}", exprs(body));
    let non_empty = |t: &Term| t.as_list().is_some_and(|l| !l.is_empty());
    if non_empty(cases) {
        text.push_str(&format!(" of {}", clauses(cases, Head::Patterns)));
    }
    if non_empty(catches) {
        text.push_str(&format!(" catch {}", clauses(catches, Head::Catch)));
    }
    if non_empty(after) {
        text.push_str(&format!(" after {}", exprs(after)));
    }
    text.push_str(" end");
    text
}

fn fun_expr(body: &Term) -> String {
    let Some(items) = body.as_tuple() else {
        return UNKNOWN.to_owned();
    };
    match items {
        [kind, name, arity] if kind.as_atom() == Some("function") => {
            format!("fun {}/{}", literal(name), literal(arity))
        }
        [kind, module, name, arity] if kind.as_atom() == Some("function") => {
            let part = |t: &Term| match t {
                Term::Tuple(_) => expr(t),
                _ => literal(t),
            };
            format!("fun {}:{}/{}", part(module), part(name), part(arity))
        }
        [kind, cs] if kind.as_atom() == Some("clauses") => {
            format!("fun {} end", clauses(cs, Head::Fun))
        }
        _ => UNKNOWN.to_owned(),
    }
}

fn cons(head: &Term, tail: &Term) -> String {
    let mut items = vec![expr(head)];
    let mut rest = tail;
    loop {
        match rest.as_tuple() {
            Some([kind, _, h, t]) if kind.as_atom() == Some("cons") => {
                items.push(expr(h));
                rest = t;
            }
            Some([kind, _]) if kind.as_atom() == Some("nil") => {
                return format!("[{}]", items.join(", "));
            }
            _ => return format!("[{} | {}]", items.join(", "), expr(rest)),
        }
    }
}

fn bin_element(value: &Term, size: &Term, types: &Term) -> String {
    let mut text = operand(value, PREC_PRIMARY);
    if size.as_atom() != Some("default") {
        text.push(':');
        text.push_str(&operand(size, PREC_PRIMARY));
    }
    if let Some(types) = types.as_list().filter(|t| !t.is_empty()) {
        let specs: Vec<String> = types
            .iter()
            .map(|t| match t {
                Term::Atom(name) => name.clone(),
                Term::Tuple(kv) => match kv.as_slice() {
                    [Term::Atom(k), v] => format!("{k}:{}", literal(v)),
                    _ => UNKNOWN.to_owned(),
                },
                _ => UNKNOWN.to_owned(),
            })
            .collect();
        text.push('/');
        text.push_str(&specs.join("-"));
    }
    text
}

fn char_literal(c: &Term) -> String {
    let c = c
        .as_integer()
        .and_then(|n| u32::try_from(n).ok())
        .and_then(char::from_u32);
    match c {
        Some('\n') => "$\\n".to_owned(),
        Some('\t') => "$\\t".to_owned(),
        Some(' ') => "$\\s".to_owned(),
        Some(c) => format!("${c}"),
        None => UNKNOWN.to_owned(),
    }
}

fn string_literal(s: &Term) -> String {
    match s.as_string() {
        Some(text) => quote_string(&text),
        None => literal(s),
    }
}

fn quote_string(text: &str) -> String {
    let mut out = String::from("\"");
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// An atom as Erlang writes it: bare when possible, otherwise quoted.
fn atom_name(name: &str) -> String {
    let mut chars = name.chars();
    let bare = chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '@')
        && !RESERVED.contains(&name);
    if bare {
        name.to_owned()
    } else {
        format!("'{}'", name.replace('\\', "\\\\").replace('\'', "\\'"))
    }
}

/// A plain term in Erlang syntax.
fn literal(term: &Term) -> String {
    match term {
        Term::Atom(name) => atom_name(name),
        Term::Integer(n) => n.to_string(),
        Term::Float(f) => format!("{f:?}"),
        Term::Binary(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => format!("<<{}>>", quote_string(text)),
            Err(_) => {
                let parts: Vec<String> = bytes.iter().map(u8::to_string).collect();
                format!("<<{}>>", parts.join(","))
            }
        },
        Term::Nil => "[]".to_owned(),
        Term::List(items) => match term.as_string().filter(|s| s.chars().all(|c| !c.is_control())) {
            Some(text) => quote_string(&text),
            None => format!("[{}]", literals(items)),
        },
        Term::ImproperList(items, tail) => format!("[{} | {}]", literals(items), literal(tail)),
        Term::Tuple(items) => format!("{{{}}}", literals(items)),
        Term::Map(pairs) => {
            let pairs: Vec<String> = pairs
                .iter()
                .map(|(k, v)| format!("{} => {}", literal(k), literal(v)))
                .collect();
            format!("#{{{}}}", pairs.join(", "))
        }
        Term::Other(text) => text.clone(),
    }
}

fn literals(items: &[Term]) -> String {
    items.iter().map(literal).collect::<Vec<_>>().join(", ")
}
