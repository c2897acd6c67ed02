//! Tokenizer for the `Code` chunk.
//!
//! Binary layout:
//! ```text
//! Code {
//!     sub_size:         u32 BE   // size of the fields below, up to the code
//!     instruction_set:  u32 BE
//!     max_opcode:       u32 BE
//!     label_count:      u32 BE
//!     function_count:   u32 BE
//!     code:             [opcode u8, operand compact * arity]*
//! }
//! ```
//!
//! Extended (`z`) operands:
//! ```text
//! 1  list            u(len) then len operands
//! 2  float register  u(index)
//! 3  allocation list u(count) then count * (u(kind), u(value))
//! 4  literal         u(index into the literal table)
//! 5  typed register  register operand then u(type index)
//! ```

use beamd_ir::{AllocList, Operand, RawFunction, RawInstruction};
use beamd_isa::{OpcodeInfo, lookup_name};

use crate::compact::{self, Compact, Tag};
use crate::error::{Error, Result};
use crate::literal::LiteralTable;
use crate::symbols::{AtomTable, ImportTable};

const EXT_LIST: i64 = 1;
const EXT_FLOAT_REG: i64 = 2;
const EXT_ALLOC_LIST: i64 = 3;
const EXT_LITERAL: i64 = 4;
const EXT_TYPED_REG: i64 = 5;

const ALLOC_WORDS: i64 = 0;
const ALLOC_FLOATS: i64 = 1;
const ALLOC_FUNS: i64 = 2;

/// Fixed header of the code chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeHeader {
    pub instruction_set: u32,
    pub max_opcode: u32,
    pub label_count: u32,
    pub function_count: u32,
    /// Offset of the first opcode within the chunk.
    pub code_offset: usize,
}

impl CodeHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let r = |off: usize| -> Result<u32> {
            let b = data.get(off..off + 4).ok_or(Error::Truncated(off))?;
            Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        };
        let sub_size = r(0)? as usize;
        let code_offset = 4 + sub_size;
        if sub_size < 16 || code_offset > data.len() {
            return Err(Error::Truncated(data.len()));
        }
        Ok(Self {
            instruction_set: r(4)?,
            max_opcode: r(8)?,
            label_count: r(12)?,
            function_count: r(16)?,
            code_offset,
        })
    }
}

/// Decodes the opcode stream of one code chunk.
pub struct Tokenizer<'a> {
    data: &'a [u8],
    pos: usize,
    atoms: &'a AtomTable,
    imports: &'a ImportTable,
    literals: Option<&'a LiteralTable>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(data: &'a [u8], pos: usize, atoms: &'a AtomTable, imports: &'a ImportTable) -> Self {
        Self {
            data,
            pos,
            atoms,
            imports,
            literals: None,
        }
    }

    /// Resolve literal operands against `literals`; without a table they
    /// stay [`Operand::LiteralRef`].
    pub fn with_literals(mut self, literals: &'a LiteralTable) -> Self {
        self.literals = Some(literals);
        self
    }

    /// Decode instructions up to and including `int_code_end` (or the end
    /// of the data).
    pub fn instructions(&mut self) -> Result<Vec<RawInstruction>> {
        let end_op = lookup_name("int_code_end").map(OpcodeInfo::id);
        let mut instructions = Vec::new();

        while self.pos < self.data.len() {
            let offset = self.pos;
            let opcode = self.data[offset];
            let info = beamd_isa::lookup(opcode).ok_or(Error::UnknownOpcode(opcode, offset))?;
            self.pos += 1;

            let mut operands = Vec::with_capacity(info.arity() as usize);
            for _ in 0..info.arity() {
                operands.push(self.operand()?);
            }
            if let Some(idx) = info.import_operand() {
                self.resolve_import(&mut operands[idx], offset);
            }

            instructions.push(RawInstruction::new(opcode, operands));
            if Some(opcode) == end_op {
                break;
            }
        }

        Ok(instructions)
    }

    fn resolve_import(&self, operand: &mut Operand, offset: usize) {
        let Operand::Unsigned(index) = *operand else {
            return;
        };
        match self.imports.resolve(index, self.atoms) {
            Some(func) => *operand = Operand::ExtFunc(func),
            None => log::warn!("unresolved import {index} at offset {offset:#x}"),
        }
    }

    fn next(&mut self) -> Result<(Compact, usize)> {
        let offset = self.pos;
        let (c, consumed) = compact::decode(self.data, offset)?;
        self.pos += consumed;
        Ok((c, offset))
    }

    /// Read a value that must carry the `u` tag.
    fn unsigned(&mut self) -> Result<u64> {
        let (c, offset) = self.next()?;
        if c.tag != Tag::Unsigned || c.value < 0 {
            return Err(Error::InvalidTag(self.data[offset], offset));
        }
        Ok(c.value as u64)
    }

    fn operand(&mut self) -> Result<Operand> {
        let (c, offset) = self.next()?;
        let small = |v: i64| u32::try_from(v).map_err(|_| Error::Overflow(offset));

        Ok(match c.tag {
            Tag::Unsigned => Operand::Unsigned(c.value as u64),
            Tag::Integer | Tag::Char => Operand::Integer(c.value),
            Tag::Atom if c.value == 0 => Operand::Nil,
            Tag::Atom => {
                let name = self
                    .atoms
                    .get(c.value as u64)
                    .ok_or(Error::IndexOutOfRange("atom", c.value as u64))?;
                Operand::Atom(name.to_owned())
            }
            Tag::X => Operand::X(small(c.value)?),
            Tag::Y => Operand::Y(small(c.value)?),
            Tag::Label => Operand::Label(small(c.value)?),
            Tag::Extended => self.extended(c.value, offset)?,
        })
    }

    fn extended(&mut self, kind: i64, offset: usize) -> Result<Operand> {
        let small = |v: u64| u32::try_from(v).map_err(|_| Error::Overflow(offset));

        match kind {
            EXT_LIST => {
                let len = self.unsigned()?;
                // Each element needs at least one byte.
                if len > (self.data.len() - self.pos) as u64 {
                    return Err(Error::Truncated(offset));
                }
                let mut items = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    items.push(self.operand()?);
                }
                Ok(Operand::List(items))
            }
            EXT_FLOAT_REG => Ok(Operand::Fr(small(self.unsigned()?)?)),
            EXT_ALLOC_LIST => {
                let count = self.unsigned()?;
                let mut alloc = AllocList::default();
                for _ in 0..count {
                    let kind = self.unsigned()? as i64;
                    let value = small(self.unsigned()?)?;
                    match kind {
                        ALLOC_WORDS => alloc.words = value,
                        ALLOC_FLOATS => alloc.floats = value,
                        ALLOC_FUNS => alloc.funs = value,
                        _ => return Err(Error::UnsupportedExtended(kind, offset)),
                    }
                }
                Ok(Operand::Alloc(alloc))
            }
            EXT_LITERAL => {
                let index = small(self.unsigned()?)?;
                match self.literals.and_then(|lits| lits.get(index)) {
                    Some(term) => Ok(Operand::Literal(term.clone())),
                    None => Ok(Operand::LiteralRef(index)),
                }
            }
            EXT_TYPED_REG => {
                let reg = self.operand()?;
                let type_index = small(self.unsigned()?)?;
                Ok(Operand::Typed {
                    reg: Box::new(reg),
                    type_index,
                })
            }
            other => Err(Error::UnsupportedExtended(other, offset)),
        }
    }
}

/// Tokenize a complete code chunk and split it into functions.
pub fn tokenize(
    chunk: &[u8],
    atoms: &AtomTable,
    imports: &ImportTable,
    literals: &LiteralTable,
) -> Result<Vec<RawFunction>> {
    let header = CodeHeader::parse(chunk)?;
    if header.max_opcode > beamd_isa::MAX_OPCODE as u32 {
        log::warn!(
            "code chunk uses opcodes up to {}, this build knows up to {}",
            header.max_opcode,
            beamd_isa::MAX_OPCODE
        );
    }

    let instructions = Tokenizer::new(chunk, header.code_offset, atoms, imports)
        .with_literals(literals)
        .instructions()?;
    let functions = split_functions(instructions);
    if functions.len() != header.function_count as usize {
        log::warn!(
            "code header declares {} functions, found {}",
            header.function_count,
            functions.len()
        );
    }
    Ok(functions)
}

/// Split a flat instruction stream at each `func_info`.
///
/// A function starts at the labels and line markers directly preceding its
/// `func_info`; its entry is the first label after it. `int_code_end` and
/// anything before the first function is dropped.
pub fn split_functions(instructions: Vec<RawInstruction>) -> Vec<RawFunction> {
    let (Some(func_info), Some(label), Some(end)) = (
        lookup_name("func_info"),
        lookup_name("label"),
        lookup_name("int_code_end"),
    ) else {
        return Vec::new();
    };

    let mut starts = Vec::new();
    for (i, insn) in instructions.iter().enumerate() {
        if insn.opcode != func_info.id() {
            continue;
        }
        let mut start = i;
        while start > 0 {
            let prev = &instructions[start - 1];
            if prev.opcode == label.id() || prev.info().is_line_marker() {
                start -= 1;
            } else {
                break;
            }
        }
        starts.push((start, i));
    }

    let stop = instructions
        .iter()
        .position(|insn| insn.opcode == end.id())
        .unwrap_or(instructions.len());

    let mut functions = Vec::with_capacity(starts.len());
    for (n, &(start, info_at)) in starts.iter().enumerate() {
        let finish = starts
            .get(n + 1)
            .map_or(stop, |&(next, _)| next)
            .max(info_at + 1);
        let code = instructions[start..finish].to_vec();

        let info_ops = &instructions[info_at].operands;
        let name = match info_ops.get(1) {
            Some(Operand::Atom(name)) => name.clone(),
            _ => String::from("?"),
        };
        let arity = info_ops
            .get(2)
            .and_then(Operand::as_u64)
            .and_then(|a| u32::try_from(a).ok())
            .unwrap_or(0);
        let entry = code[info_at - start..]
            .iter()
            .find(|insn| insn.opcode == label.id())
            .and_then(|insn| insn.operands.first())
            .and_then(Operand::as_u64)
            .and_then(|l| u32::try_from(l).ok())
            .unwrap_or(0);

        functions.push(RawFunction {
            name,
            arity,
            entry,
            code,
        });
    }

    functions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compact::encode;
    use crate::symbols::Import;
    use beamd_ir::Term;

    fn op(name: &str) -> u8 {
        lookup_name(name).unwrap().id()
    }

    fn header(body: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        for field in [16u32, 0, beamd_isa::MAX_OPCODE as u32, 4, 1] {
            data.extend_from_slice(&field.to_be_bytes());
        }
        data.extend_from_slice(body);
        data
    }

    fn tables() -> (AtomTable, ImportTable) {
        let atoms = AtomTable::from_names(["math", "double", "erlang", "*"]);
        let imports = ImportTable::from_imports(vec![Import {
            module: 3,
            function: 4,
            arity: 2,
        }]);
        (atoms, imports)
    }

    /// double(X) -> X * 2.
    fn double_body() -> Vec<u8> {
        let mut b = Vec::new();
        b.push(op("label"));
        b.extend(encode(Tag::Unsigned, 1));
        b.push(op("line"));
        b.extend(encode(Tag::Unsigned, 1));
        b.push(op("func_info"));
        b.extend(encode(Tag::Atom, 1));
        b.extend(encode(Tag::Atom, 2));
        b.extend(encode(Tag::Unsigned, 1));
        b.push(op("label"));
        b.extend(encode(Tag::Unsigned, 2));
        b.push(op("gc_bif2"));
        b.extend(encode(Tag::Label, 0));
        b.extend(encode(Tag::Unsigned, 1));
        b.extend(encode(Tag::Unsigned, 0)); // import 0: erlang:'*'/2
        b.extend(encode(Tag::X, 0));
        b.extend(encode(Tag::Integer, 2));
        b.extend(encode(Tag::X, 0));
        b.push(op("return"));
        b.push(op("int_code_end"));
        b
    }

    #[test]
    fn parse_header() {
        let data = header(&[]);
        let h = CodeHeader::parse(&data).unwrap();
        assert_eq!(h.code_offset, 20);
        assert_eq!(h.label_count, 4);
        assert_eq!(h.function_count, 1);
    }

    #[test]
    fn short_header_is_truncated() {
        assert!(CodeHeader::parse(&[0, 0, 0, 16, 0, 0]).is_err());
    }

    #[test]
    fn tokenize_single_function() {
        let (atoms, imports) = tables();
        let functions =
            tokenize(&header(&double_body()), &atoms, &imports, &LiteralTable::empty()).unwrap();
        assert_eq!(functions.len(), 1);

        let f = &functions[0];
        assert_eq!(f.name, "double");
        assert_eq!(f.arity, 1);
        assert_eq!(f.entry, 2);
        // label, line, func_info, label, gc_bif2, return
        assert_eq!(f.code.len(), 6);
        assert_eq!(f.code[1].line_index(), Some(1));

        let bif = &f.code[4];
        assert_eq!(bif.opcode, op("gc_bif2"));
        assert_eq!(bif.operands[2], Operand::ext("erlang", "*", 2));
        assert_eq!(bif.operands[4], Operand::Integer(2));
    }

    #[test]
    fn extended_operands() {
        let (atoms, imports) = tables();
        let mut body = vec![op("test_heap")];
        // alloc list: 2 entries, words 3, floats 1
        body.push(0x37);
        for v in [2, 0, 3, 1, 1] {
            body.extend(encode(Tag::Unsigned, v));
        }
        body.extend(encode(Tag::Unsigned, 2));
        body.push(op("select_val"));
        // typed register x(1), type 0
        body.push(0x57);
        body.extend(encode(Tag::X, 1));
        body.extend(encode(Tag::Unsigned, 0));
        body.extend(encode(Tag::Label, 9));
        // list of [atom 1, f(3)]
        body.push(0x17);
        body.extend(encode(Tag::Unsigned, 2));
        body.extend(encode(Tag::Atom, 1));
        body.extend(encode(Tag::Label, 3));
        body.push(op("move"));
        body.push(0x47);
        body.extend(encode(Tag::Unsigned, 7));
        body.push(0x27);
        body.extend(encode(Tag::Unsigned, 2));

        let insns = Tokenizer::new(&body, 0, &atoms, &imports)
            .instructions()
            .unwrap();
        assert_eq!(insns.len(), 3);
        assert_eq!(
            insns[0].operands,
            [
                Operand::Alloc(AllocList {
                    words: 3,
                    floats: 1,
                    funs: 0
                }),
                Operand::Unsigned(2)
            ]
        );
        assert_eq!(
            insns[1].operands,
            [
                Operand::Typed {
                    reg: Box::new(Operand::X(1)),
                    type_index: 0
                },
                Operand::Label(9),
                Operand::List(vec![Operand::atom("math"), Operand::Label(3)]),
            ]
        );
        assert_eq!(insns[2].operands, [Operand::LiteralRef(7), Operand::Fr(2)]);
    }

    #[test]
    fn literals_resolve_through_the_table() {
        let (atoms, imports) = tables();
        let mut chunk = 0u32.to_be_bytes().to_vec();
        chunk.extend(1u32.to_be_bytes());
        let bin = [131, 109, 0, 0, 0, 2, b'h', b'i'];
        chunk.extend((bin.len() as u32).to_be_bytes());
        chunk.extend(bin);
        let literals = LiteralTable::parse(&chunk).unwrap();

        let mut body = Vec::new();
        for index in [0, 5] {
            body.push(op("move"));
            body.push(0x47);
            body.extend(encode(Tag::Unsigned, index));
            body.extend(encode(Tag::X, 0));
        }

        let insns = Tokenizer::new(&body, 0, &atoms, &imports)
            .with_literals(&literals)
            .instructions()
            .unwrap();
        assert_eq!(insns[0].operands[0], Operand::Literal(Term::Binary(b"hi".to_vec())));
        // Out of range: left unresolved.
        assert_eq!(insns[1].operands[0], Operand::LiteralRef(5));
    }

    #[test]
    fn unknown_opcode_is_an_error() {
        let (atoms, imports) = tables();
        let body = [0xfe];
        let err = Tokenizer::new(&body, 0, &atoms, &imports)
            .instructions()
            .unwrap_err();
        assert!(matches!(err, Error::UnknownOpcode(0xfe, 0)));
    }

    #[test]
    fn unknown_atom_is_an_error() {
        let (atoms, imports) = tables();
        let mut body = vec![op("move")];
        body.extend(encode(Tag::Atom, 40));
        body.extend(encode(Tag::X, 0));
        assert!(
            Tokenizer::new(&body, 0, &atoms, &imports)
                .instructions()
                .is_err()
        );
    }

    #[test]
    fn split_keeps_leading_labels_with_their_function() {
        let (atoms, imports) = tables();
        let mut body = double_body();
        body.pop(); // int_code_end
        let mut second = double_body();
        // renumber labels 1, 2 -> 3, 4
        second[1] = encode(Tag::Unsigned, 3)[0];
        second[9] = encode(Tag::Unsigned, 4)[0];
        body.extend(second);

        let insns = Tokenizer::new(&body, 0, &atoms, &imports)
            .instructions()
            .unwrap();
        let functions = split_functions(insns);
        assert_eq!(functions.len(), 2);
        assert_eq!(functions[0].code.len(), 6);
        assert_eq!(functions[1].code.len(), 6);
        assert_eq!(functions[1].entry, 4);
        assert_eq!(functions[1].code[0].operands, [Operand::Unsigned(3)]);
    }
}
