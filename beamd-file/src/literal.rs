//! Literal table from the `LitT` chunk.
//!
//! Binary layout:
//! ```text
//! LitT {
//!     uncompressed_size: u32 BE   // 0: the table is stored uncompressed
//!     table:             zlib(Table) | Table
//! }
//! Table {
//!     count:   u32 BE
//!     entries: [u32 BE size + serialized term; count]
//! }
//! ```

use beamd_ir::Term;

use crate::error::{Error, Result};
use crate::term::{decode_term, inflate, read_u32};

/// Literal index -> decoded term.
///
/// An entry that fails to decode is kept as a hole so later indices stay
/// aligned; operands referring to it stay unresolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiteralTable {
    terms: Vec<Option<Term>>,
}

impl LiteralTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn parse(chunk: &[u8]) -> Result<Self> {
        let size = read_u32(chunk, 0)? as usize;
        let table = if size == 0 {
            chunk[4..].to_vec()
        } else {
            inflate(&chunk[4..], size)?
        };

        let count = read_u32(&table, 0)? as usize;
        let mut pos = 4;
        // Each entry carries at least its size field.
        let mut terms = Vec::with_capacity(count.min(table.len() / 4));
        for index in 0..count {
            let len = read_u32(&table, pos)? as usize;
            let start = pos + 4;
            let end = start.checked_add(len).ok_or(Error::Truncated(pos))?;
            let bytes = table.get(start..end).ok_or(Error::Truncated(pos))?;
            match decode_term(bytes) {
                Ok(term) => terms.push(Some(term)),
                Err(e) => {
                    log::warn!("literal {index} undecodable: {e}");
                    terms.push(None);
                }
            }
            pos = end;
        }

        Ok(Self { terms })
    }

    /// Like [`parse`](Self::parse), but a missing or malformed chunk yields
    /// an empty table.
    pub fn from_chunk_or_empty(chunk: Option<&[u8]>) -> Self {
        let Some(chunk) = chunk else {
            return Self::empty();
        };
        match Self::parse(chunk) {
            Ok(table) => table,
            Err(e) => {
                log::warn!("ignoring malformed LitT chunk: {e}");
                Self::empty()
            }
        }
    }

    pub fn get(&self, index: u32) -> Option<&Term> {
        self.terms.get(index as usize)?.as_ref()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}
