use beamd_isa::{Category, OpcodeInfo};
use serde::Serialize;

use crate::operand::Operand;

/// An instruction as produced by the tokenizer: opcode id plus operands.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawInstruction {
    pub opcode: u8,
    pub operands: Vec<Operand>,
}

impl RawInstruction {
    pub fn new(opcode: u8, operands: Vec<Operand>) -> Self {
        Self { opcode, operands }
    }

    /// Build an instruction by mnemonic. Returns `None` for unknown names.
    pub fn named(mnemonic: &str, operands: Vec<Operand>) -> Option<Self> {
        let info = beamd_isa::lookup_name(mnemonic)?;
        Some(Self::new(info.id(), operands))
    }

    /// Opcode metadata; a placeholder for ids this build does not know.
    pub fn info(&self) -> OpcodeInfo {
        beamd_isa::describe(self.opcode)
    }

    /// Line table index carried by a line marker.
    pub fn line_index(&self) -> Option<u32> {
        if !self.info().is_line_marker() {
            return None;
        }
        self.operands
            .first()
            .and_then(Operand::as_u64)
            .and_then(|n| u32::try_from(n).ok())
    }
}

/// A formatted instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instruction {
    pub category: Category,
    pub mnemonic: String,
    pub operands: Vec<String>,
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.operands.is_empty() {
            f.write_str(&self.mnemonic)
        } else {
            write!(f, "{} {}", self.mnemonic, self.operands.join(", "))
        }
    }
}
