//! Reader for BEAM module files.
//!
//! [`BeamFile`] splits the IFF container into chunks; the submodules decode
//! the chunks this disassembler needs: atoms, imports, exports, literals,
//! the line table, debug forms and the code itself.

pub mod code;
pub mod compact;
pub mod container;
pub mod error;
pub mod line;
pub mod literal;
pub mod symbols;
pub mod term;

pub use container::BeamFile;
pub use error::{Error, Result};
pub use line::LineTable;
pub use literal::LiteralTable;
pub use symbols::{AtomTable, FunctionTable, ImportTable};
