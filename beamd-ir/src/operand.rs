use std::fmt;

use serde::Serialize;

/// A decoded operand from a bytecode instruction.
///
/// The vocabulary is open: tokenizers for newer instruction sets may emit
/// [`Operand::Other`] for shapes this crate does not model.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Operand {
    /// X register index.
    X(u32),
    /// Y (stack) register index.
    Y(u32),
    /// Float register index.
    Fr(u32),
    /// Label reference.
    Label(u32),
    /// Literal atom.
    Atom(String),
    /// The empty list.
    Nil,
    /// Tagged integer literal.
    Integer(i64),
    /// Untagged number (counts, sizes, arities).
    Unsigned(u64),
    /// Float literal.
    Float(f64),
    /// Decoded literal term.
    Literal(Term),
    /// Unresolved index into the literal table.
    LiteralRef(u32),
    /// External function reference.
    ExtFunc(ExtFunc),
    /// Register with a type hint; the hint does not affect rendering.
    Typed { reg: Box<Operand>, type_index: u32 },
    /// Allocation descriptor.
    Alloc(AllocList),
    /// Operand list (select lists, map pairs, element lists).
    List(Vec<Operand>),
    /// Tuple of operands.
    Tuple(Vec<Operand>),
    /// Anything else, kept as an opaque description.
    Other(String),
}

impl Operand {
    /// Wrap a string as an atom operand.
    pub fn atom(name: impl Into<String>) -> Self {
        Operand::Atom(name.into())
    }

    /// Build an external function reference operand.
    pub fn ext(module: impl Into<String>, function: impl Into<String>, arity: u32) -> Self {
        Operand::ExtFunc(ExtFunc::new(module, function, arity))
    }

    /// The external function this operand names, if any.
    pub fn as_ext_func(&self) -> Option<&ExtFunc> {
        match self {
            Operand::ExtFunc(f) => Some(f),
            _ => None,
        }
    }

    /// Numeric payload of a plain number or label.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Operand::Unsigned(n) => Some(*n),
            Operand::Integer(n) if *n >= 0 => Some(*n as u64),
            Operand::Label(n) => Some(*n as u64),
            _ => None,
        }
    }
}

/// `module:function/arity`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ExtFunc {
    pub module: String,
    pub function: String,
    pub arity: u32,
}

impl ExtFunc {
    pub fn new(module: impl Into<String>, function: impl Into<String>, arity: u32) -> Self {
        Self {
            module: module.into(),
            function: function.into(),
            arity,
        }
    }
}

impl fmt::Display for ExtFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.module, self.function, self.arity)
    }
}

/// Heap/stack need as encoded by an allocation list operand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AllocList {
    pub words: u32,
    pub floats: u32,
    pub funs: u32,
}

/// A literal term.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Term {
    Atom(String),
    Integer(i64),
    Float(f64),
    Binary(Vec<u8>),
    Nil,
    List(Vec<Term>),
    /// List whose tail is not `[]`.
    ImproperList(Vec<Term>, Box<Term>),
    Tuple(Vec<Term>),
    Map(Vec<(Term, Term)>),
    /// Terms without a structural model here (funs, pids, bitstrings),
    /// kept as display text.
    Other(String),
}

impl Term {
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Term::Atom(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Term::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Elements of a proper list; `[]` is the empty slice.
    pub fn as_list(&self) -> Option<&[Term]> {
        match self {
            Term::List(items) => Some(items),
            Term::Nil => Some(&[]),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Term]> {
        match self {
            Term::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Text of a list of character codes, as strings appear in terms.
    pub fn as_string(&self) -> Option<String> {
        self.as_list()?
            .iter()
            .map(|t| {
                t.as_integer()
                    .and_then(|c| u32::try_from(c).ok())
                    .and_then(char::from_u32)
            })
            .collect()
    }
}
