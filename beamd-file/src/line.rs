//! Line table extraction from the `Line` chunk.
//!
//! Binary layout:
//! ```text
//! Line {
//!     version:            u32 BE
//!     flags:              u32 BE
//!     num_line_instrs:    u32 BE
//!     num_line_entries:   u32 BE
//!     num_file_names:     u32 BE
//!     entries:            [compact; num_line_entries]
//!     file_names:         [u16 BE length + bytes; num_file_names]
//! }
//! ```
//!
//! Each entry's low 24 bits are a source line number; the high bits index
//! the file name table.

use crate::compact::{self, Tag};
use crate::error::{Error, Result};

/// Mask selecting the line number from a line entry.
pub const LINE_MASK: i64 = 0x00ff_ffff;

/// Fixed header of the line chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineChunkHeader {
    pub version: u32,
    pub flags: u32,
    pub instruction_count: u32,
    pub line_count: u32,
    pub file_name_count: u32,
}

impl LineChunkHeader {
    /// Header size in bytes: 5 * 4.
    pub const SIZE: usize = 20;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::Truncated(data.len()));
        }
        let r = |off: usize| {
            u32::from_be_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
        };
        Ok(Self {
            version: r(0),
            flags: r(4),
            instruction_count: r(8),
            line_count: r(12),
            file_name_count: r(16),
        })
    }
}

/// Bytecode line index -> source line number.
///
/// Indices are dense and 0-based in decode order. An empty table is the
/// degraded mode: every lookup falls back to the index itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineTable {
    lines: Vec<u32>,
}

impl LineTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a complete `Line` chunk.
    ///
    /// Any decode error aborts the whole build; a partial table is never
    /// returned.
    pub fn parse(chunk: &[u8]) -> Result<Self> {
        let header = LineChunkHeader::parse(chunk)?;
        Self::from_entries(&header, chunk)
    }

    /// Decode exactly `header.line_count` entries following the header.
    ///
    /// Compilers emit `a`-tagged file-switch items between entries of
    /// multi-file modules (included headers) without counting them in
    /// `line_count`. They are decoded like any other entry here, so lines
    /// after the first switch are shifted; a warning is logged when one is
    /// seen.
    pub fn from_entries(header: &LineChunkHeader, chunk: &[u8]) -> Result<Self> {
        let mut pos = LineChunkHeader::SIZE;
        // Entries are at least one byte each; don't trust the count for capacity.
        let remaining = chunk.len().saturating_sub(pos);
        let mut lines = Vec::with_capacity((header.line_count as usize).min(remaining));
        let mut switched = false;

        for _ in 0..header.line_count {
            let (entry, consumed) = compact::decode(chunk, pos)?;
            if entry.tag == Tag::Atom && !switched {
                log::warn!(
                    "line table switches source file at offset {pos:#x}; later lines may be shifted"
                );
                switched = true;
            }
            pos += consumed;
            lines.push((entry.value & LINE_MASK) as u32);
        }

        Ok(Self { lines })
    }

    /// Like [`parse`](Self::parse), but a missing or malformed chunk yields
    /// an empty table instead of an error.
    pub fn from_chunk_or_empty(chunk: Option<&[u8]>) -> Self {
        let Some(chunk) = chunk else {
            log::debug!("no Line chunk; falling back to raw line indices");
            return Self::empty();
        };
        match Self::parse(chunk) {
            Ok(table) => table,
            Err(e) => {
                log::warn!("ignoring malformed Line chunk: {e}");
                Self::empty()
            }
        }
    }

    /// Source line for `index`, if the table has one.
    #[inline]
    pub fn get(&self, index: u32) -> Option<u32> {
        self.lines.get(index as usize).copied()
    }

    /// Source line for `index`, falling back to the index itself.
    #[inline]
    pub fn resolve(&self, index: u32) -> u32 {
        self.get(index).unwrap_or(index)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// `(index, line)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.lines
            .iter()
            .enumerate()
            .map(|(i, &line)| (i as u32, line))
    }
}
