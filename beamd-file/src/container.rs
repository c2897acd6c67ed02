//! The IFF container: `FOR1`, total size, `BEAM`, then 4-byte aligned chunks.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use beamd_ir::{RawFunction, Term};
use memmap2::Mmap;

use crate::code;
use crate::error::{Error, Result};
use crate::line::LineTable;
use crate::literal::LiteralTable;
use crate::symbols::{AtomTable, FunctionTable, ImportTable};
use crate::term::decode_term;

/// `FOR1` + size + `BEAM`.
const HEADER_SIZE: usize = 12;

enum Backing {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Backing {
    fn bytes(&self) -> &[u8] {
        match self {
            Backing::Mapped(map) => map,
            Backing::Owned(data) => data,
        }
    }
}

/// A parsed module file providing access to its chunks.
pub struct BeamFile {
    data: Backing,
    /// Chunk id -> payload range, in file order.
    chunks: Vec<([u8; 4], std::ops::Range<usize>)>,
    index: HashMap<[u8; 4], usize>,
}

impl BeamFile {
    /// Parse a module from owned bytes.
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        Self::from_backing(Backing::Owned(data))
    }

    /// Map a module file into memory and parse it.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::Io(format!("{}: {e}", path.display())))?;
        // SAFETY: the mapping is read-only and lives as long as `self`;
        // concurrent truncation of the file by another process is not
        // supported.
        let map = unsafe { Mmap::map(&file) }.map_err(|e| Error::Io(e.to_string()))?;
        Self::from_backing(Backing::Mapped(map))
    }

    fn from_backing(data: Backing) -> Result<Self> {
        let chunks = scan_chunks(data.bytes())?;
        let mut index = HashMap::with_capacity(chunks.len());
        for (i, (id, _)) in chunks.iter().enumerate() {
            // First occurrence wins.
            index.entry(*id).or_insert(i);
        }
        Ok(Self {
            data,
            chunks,
            index,
        })
    }

    /// Raw file bytes.
    pub fn data(&self) -> &[u8] {
        self.data.bytes()
    }

    /// Chunk ids in file order.
    pub fn chunk_ids(&self) -> impl Iterator<Item = String> + '_ {
        self.chunks
            .iter()
            .map(|(id, _)| String::from_utf8_lossy(id).into_owned())
    }

    /// `(id, payload length)` for every chunk, in file order.
    pub fn chunk_sizes(&self) -> impl Iterator<Item = (String, usize)> + '_ {
        self.chunks
            .iter()
            .map(|(id, range)| (String::from_utf8_lossy(id).into_owned(), range.len()))
    }

    /// Payload of chunk `id`, if present.
    pub fn chunk_opt(&self, id: &str) -> Option<&[u8]> {
        let key: [u8; 4] = id.as_bytes().try_into().ok()?;
        let &i = self.index.get(&key)?;
        self.data.bytes().get(self.chunks[i].1.clone())
    }

    /// Payload of chunk `id`.
    pub fn chunk(&self, id: &str) -> Result<&[u8]> {
        self.chunk_opt(id)
            .ok_or_else(|| Error::ChunkNotFound(id.to_owned()))
    }

    /// Atom table from `AtU8`, falling back to the Latin-1 `Atom` chunk.
    pub fn atoms(&self) -> Result<AtomTable> {
        if let Some(chunk) = self.chunk_opt("AtU8") {
            return AtomTable::parse(chunk, false);
        }
        AtomTable::parse(self.chunk("Atom")?, true)
    }

    pub fn imports(&self) -> Result<ImportTable> {
        ImportTable::parse(self.chunk("ImpT")?)
    }

    pub fn exports(&self) -> Result<FunctionTable> {
        FunctionTable::parse(self.chunk("ExpT")?)
    }

    /// Local functions; empty when the chunk was stripped.
    pub fn locals(&self) -> Result<FunctionTable> {
        match self.chunk_opt("LocT") {
            Some(chunk) => FunctionTable::parse(chunk),
            None => Ok(FunctionTable::default()),
        }
    }

    /// Line table, or an empty one when the chunk is missing or malformed.
    pub fn line_table(&self) -> LineTable {
        LineTable::from_chunk_or_empty(self.chunk_opt("Line"))
    }

    /// Literal table, or an empty one when the chunk is missing or
    /// malformed.
    pub fn literals(&self) -> LiteralTable {
        LiteralTable::from_chunk_or_empty(self.chunk_opt("LitT"))
    }

    /// Tokenize the code chunk into functions.
    pub fn functions(&self) -> Result<Vec<RawFunction>> {
        let atoms = self.atoms()?;
        let imports = self.imports()?;
        let literals = self.literals();
        code::tokenize(self.chunk("Code")?, &atoms, &imports, &literals)
    }

    /// Abstract code forms from the debug metadata.
    ///
    /// Reads `Dbgi` written by the Erlang compiler backend, then the older
    /// `Abst` chunk. `Ok(None)` when neither carries forms (stripped
    /// modules, other language backends).
    pub fn abstract_forms(&self) -> Result<Option<Vec<Term>>> {
        if let Some(chunk) = self.chunk_opt("Dbgi").filter(|c| !c.is_empty()) {
            let term = decode_term(chunk)?;
            return Ok(match term.as_tuple() {
                Some([version, backend, data])
                    if version.as_atom() == Some("debug_info_v1")
                        && backend.as_atom() == Some("erl_abstract_code") =>
                {
                    match data.as_tuple() {
                        Some([forms, _opts]) => forms.as_list().map(<[Term]>::to_vec),
                        _ => None,
                    }
                }
                _ => {
                    log::debug!("Dbgi chunk has no Erlang abstract code");
                    None
                }
            });
        }

        if let Some(chunk) = self.chunk_opt("Abst").filter(|c| !c.is_empty()) {
            let term = decode_term(chunk)?;
            return Ok(match term.as_tuple() {
                Some([version, forms]) if version.as_atom() == Some("raw_abstract_v1") => {
                    forms.as_list().map(<[Term]>::to_vec)
                }
                _ => None,
            });
        }

        Ok(None)
    }

    /// Module name (atom 1).
    pub fn module_name(&self) -> Result<String> {
        let atoms = self.atoms()?;
        atoms
            .module_name()
            .map(str::to_owned)
            .ok_or(Error::IndexOutOfRange("atom", 1))
    }
}

fn read_u32(data: &[u8], pos: usize) -> Result<u32> {
    let b = data.get(pos..pos + 4).ok_or(Error::Truncated(pos))?;
    Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn scan_chunks(data: &[u8]) -> Result<Vec<([u8; 4], std::ops::Range<usize>)>> {
    if data.len() < HEADER_SIZE {
        return Err(Error::FileTooSmall(data.len()));
    }
    if &data[0..4] != b"FOR1" || &data[8..12] != b"BEAM" {
        return Err(Error::InvalidMagic);
    }

    // The declared size counts from after the size field.
    let declared = read_u32(data, 4)? as usize;
    let end = 8usize.saturating_add(declared).min(data.len());
    if end < data.len() {
        log::debug!("ignoring {} trailing bytes", data.len() - end);
    } else if 8 + declared > data.len() {
        log::warn!(
            "container declares {} bytes, file has {}",
            8 + declared,
            data.len()
        );
    }

    let mut chunks = Vec::new();
    let mut pos = HEADER_SIZE;
    while pos + 8 <= end {
        let mut id = [0u8; 4];
        id.copy_from_slice(&data[pos..pos + 4]);
        let len = read_u32(data, pos + 4)? as usize;
        let start = pos + 8;
        let stop = start.checked_add(len).ok_or(Error::Truncated(pos))?;
        if stop > end {
            return Err(Error::Truncated(pos));
        }
        chunks.push((id, start..stop));
        pos = stop.next_multiple_of(4);
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(chunks: &[(&[u8; 4], Vec<u8>)]) -> Vec<u8> {
        let mut body = b"BEAM".to_vec();
        for (id, payload) in chunks {
            body.extend_from_slice(*id);
            body.extend_from_slice(&(payload.len() as u32).to_be_bytes());
            body.extend_from_slice(payload);
            while body.len() % 4 != 0 {
                body.push(0);
            }
        }
        let mut data = b"FOR1".to_vec();
        data.extend_from_slice(&(body.len() as u32).to_be_bytes());
        data.extend(body);
        data
    }

    fn atoms(names: &[&str]) -> Vec<u8> {
        let mut data = (names.len() as u32).to_be_bytes().to_vec();
        for n in names {
            data.push(n.len() as u8);
            data.extend_from_slice(n.as_bytes());
        }
        data
    }

    #[test]
    fn chunks_in_file_order() {
        let data = container(&[
            (b"AtU8", atoms(&["m"])),
            (b"Code", vec![1, 2, 3]),
            (b"ImpT", 0u32.to_be_bytes().to_vec()),
        ]);
        let file = BeamFile::parse(data).unwrap();
        assert_eq!(file.chunk_ids().collect::<Vec<_>>(), ["AtU8", "Code", "ImpT"]);
        assert_eq!(file.chunk("Code").unwrap(), [1, 2, 3]);
        assert_eq!(file.module_name().unwrap(), "m");
        assert!(file.imports().unwrap().is_empty());
    }

    #[test]
    fn missing_chunk() {
        let file = BeamFile::parse(container(&[(b"AtU8", atoms(&["m"]))])).unwrap();
        assert!(matches!(file.chunk("Code"), Err(Error::ChunkNotFound(id)) if id == "Code"));
        assert!(file.chunk_opt("Line").is_none());
        assert!(file.line_table().is_empty());
        assert!(file.locals().unwrap().is_empty());
    }

    #[test]
    fn latin1_atom_chunk_fallback() {
        let file = BeamFile::parse(container(&[(b"Atom", atoms(&["legacy"]))])).unwrap();
        assert_eq!(file.module_name().unwrap(), "legacy");
    }

    #[test]
    fn literal_chunk_is_optional() {
        let mut lit = 0u32.to_be_bytes().to_vec();
        lit.extend(1u32.to_be_bytes());
        lit.extend(5u32.to_be_bytes());
        lit.extend([131, 119, 2, b'o', b'k']);
        let file = BeamFile::parse(container(&[(b"LitT", lit)])).unwrap();
        assert_eq!(file.literals().get(0), Some(&Term::Atom("ok".into())));

        let bare = BeamFile::parse(container(&[])).unwrap();
        assert!(bare.literals().is_empty());
    }

    #[test]
    fn abstract_forms_from_debug_chunks() {
        // {debug_info_v1, erl_abstract_code, {[{eof, 9}], []}}
        let mut dbgi = vec![131, 104, 3];
        dbgi.extend([119, 13]);
        dbgi.extend(b"debug_info_v1");
        dbgi.extend([119, 17]);
        dbgi.extend(b"erl_abstract_code");
        dbgi.extend([104, 2, 108, 0, 0, 0, 1, 104, 2, 119, 3]);
        dbgi.extend(b"eof");
        dbgi.extend([97, 9, 106, 106]);
        let file = BeamFile::parse(container(&[(b"Dbgi", dbgi)])).unwrap();
        let forms = file.abstract_forms().unwrap().unwrap();
        assert_eq!(
            forms,
            [Term::Tuple(vec![Term::Atom("eof".into()), Term::Integer(9)])]
        );

        // {raw_abstract_v1, []}
        let mut abst = vec![131, 104, 2, 119, 15];
        abst.extend(b"raw_abstract_v1");
        abst.push(106);
        let file = BeamFile::parse(container(&[(b"Abst", abst)])).unwrap();
        assert_eq!(file.abstract_forms().unwrap(), Some(Vec::new()));

        // Compiled without debug_info: empty Abst.
        let file = BeamFile::parse(container(&[(b"Abst", Vec::new())])).unwrap();
        assert_eq!(file.abstract_forms().unwrap(), None);
    }

    #[test]
    fn bad_magic() {
        let mut data = container(&[]);
        data[8..12].copy_from_slice(b"ELF\0");
        assert!(matches!(BeamFile::parse(data), Err(Error::InvalidMagic)));
        assert!(matches!(
            BeamFile::parse(b"FOR1".to_vec()),
            Err(Error::FileTooSmall(4))
        ));
    }

    #[test]
    fn chunk_past_end_is_truncated() {
        let mut data = container(&[(b"Code", vec![0; 8])]);
        data.truncate(data.len() - 4);
        let declared = (data.len() - 8) as u32;
        data[4..8].copy_from_slice(&declared.to_be_bytes());
        assert!(matches!(BeamFile::parse(data), Err(Error::Truncated(12))));
    }
}
