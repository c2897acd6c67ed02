//! Generic BEAM instruction set, generated from `isa/genop.tab`.
//!
//! This crate provides the opcode table used by the rest of the workspace:
//! numeric and symbolic opcode identity, declared arity, deprecation, a
//! semantic [`Category`], and the call shapes the call graph relies on.
//!
//! The table is built once at compile time and never mutated.

mod category;
mod opcode;

pub use category::Category;
pub use opcode::{
    FORMAT_NUMBER, MAX_OPCODE, OpcodeFlags, OpcodeInfo, describe, lookup, lookup_name,
    opcode_count, opcode_table,
};
