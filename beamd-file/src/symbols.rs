//! Atom, import, export and local function tables.

use beamd_ir::ExtFunc;

use crate::compact;
use crate::error::{Error, Result};

fn read_u32(data: &[u8], pos: usize) -> Result<u32> {
    let bytes = data.get(pos..pos + 4).ok_or(Error::Truncated(pos))?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Atoms of a module. Index 1 is the module name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtomTable {
    atoms: Vec<String>,
}

impl AtomTable {
    /// Parse an `AtU8` (UTF-8) or legacy `Atom` (Latin-1) chunk.
    ///
    /// A negative count means atom lengths are compact-encoded rather than
    /// single bytes.
    pub fn parse(chunk: &[u8], latin1: bool) -> Result<Self> {
        let raw_count = read_u32(chunk, 0)? as i32;
        let compact_lengths = raw_count < 0;
        let count = raw_count.unsigned_abs() as usize;

        let mut atoms = Vec::with_capacity(count.min(chunk.len()));
        let mut pos = 4;
        for _ in 0..count {
            let len = if compact_lengths {
                let (c, consumed) = compact::decode(chunk, pos)?;
                pos += consumed;
                usize::try_from(c.value).map_err(|_| Error::Overflow(pos))?
            } else {
                let len = *chunk.get(pos).ok_or(Error::Truncated(pos))?;
                pos += 1;
                len as usize
            };
            let bytes = chunk.get(pos..pos + len).ok_or(Error::Truncated(pos))?;
            let name = if latin1 {
                bytes.iter().map(|&b| b as char).collect()
            } else {
                std::str::from_utf8(bytes)
                    .map_err(|_| Error::InvalidUtf8(pos))?
                    .to_owned()
            };
            atoms.push(name);
            pos += len;
        }

        Ok(Self { atoms })
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            atoms: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Atom by 1-based index.
    pub fn get(&self, index: u64) -> Option<&str> {
        let i = usize::try_from(index).ok()?.checked_sub(1)?;
        self.atoms.get(i).map(String::as_str)
    }

    /// The module name (atom 1).
    pub fn module_name(&self) -> Option<&str> {
        self.get(1)
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }
}

/// One `ImpT` entry, as atom indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Import {
    pub module: u32,
    pub function: u32,
    pub arity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportTable {
    imports: Vec<Import>,
}

impl ImportTable {
    pub fn parse(chunk: &[u8]) -> Result<Self> {
        let count = read_u32(chunk, 0)? as usize;
        let mut imports = Vec::with_capacity(count.min(chunk.len() / 12));
        let mut pos = 4;
        for _ in 0..count {
            imports.push(Import {
                module: read_u32(chunk, pos)?,
                function: read_u32(chunk, pos + 4)?,
                arity: read_u32(chunk, pos + 8)?,
            });
            pos += 12;
        }
        Ok(Self { imports })
    }

    pub fn from_imports(imports: Vec<Import>) -> Self {
        Self { imports }
    }

    /// Import by 0-based index.
    pub fn get(&self, index: u64) -> Option<&Import> {
        self.imports.get(usize::try_from(index).ok()?)
    }

    /// Resolve import `index` to a named external function.
    pub fn resolve(&self, index: u64, atoms: &AtomTable) -> Option<ExtFunc> {
        let import = self.get(index)?;
        Some(ExtFunc::new(
            atoms.get(import.module as u64)?,
            atoms.get(import.function as u64)?,
            import.arity,
        ))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Import> {
        self.imports.iter()
    }

    pub fn len(&self) -> usize {
        self.imports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.imports.is_empty()
    }
}

/// One `ExpT` or `LocT` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionEntry {
    pub function: u32,
    pub arity: u32,
    pub label: u32,
}

/// Exported (`ExpT`) or local (`LocT`) function table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionTable {
    entries: Vec<FunctionEntry>,
}

impl FunctionTable {
    pub fn parse(chunk: &[u8]) -> Result<Self> {
        let count = read_u32(chunk, 0)? as usize;
        let mut entries = Vec::with_capacity(count.min(chunk.len() / 12));
        let mut pos = 4;
        for _ in 0..count {
            entries.push(FunctionEntry {
                function: read_u32(chunk, pos)?,
                arity: read_u32(chunk, pos + 4)?,
                label: read_u32(chunk, pos + 8)?,
            });
            pos += 12;
        }
        Ok(Self { entries })
    }

    pub fn iter(&self) -> impl Iterator<Item = &FunctionEntry> {
        self.entries.iter()
    }

    /// `(name, arity)` pairs resolved through `atoms`.
    pub fn names<'a>(&'a self, atoms: &'a AtomTable) -> impl Iterator<Item = (&'a str, u32)> + 'a {
        self.entries
            .iter()
            .filter_map(|e| Some((atoms.get(e.function as u64)?, e.arity)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
