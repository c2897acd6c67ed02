use std::collections::BTreeMap;

use beamd_isa::Category;
use serde::Serialize;

use crate::instruction::{Instruction, RawInstruction};

/// A function as split out of the code chunk, before formatting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawFunction {
    pub name: String,
    pub arity: u32,
    /// Label of the first instruction after `func_info`.
    pub entry: u32,
    pub code: Vec<RawInstruction>,
}

/// A disassembled function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Function {
    pub name: String,
    pub arity: u32,
    pub entry: u32,
    #[serde(skip)]
    pub raw: Vec<RawInstruction>,
    /// Formatted instructions, parallel to `raw`.
    pub instructions: Vec<Instruction>,
    /// Line table index -> source line for every line marker in the body.
    pub lines: BTreeMap<u32, u32>,
}

impl Function {
    /// `name/arity`.
    pub fn signature(&self) -> String {
        format!("{}/{}", self.name, self.arity)
    }

    pub fn category_counts(&self) -> BTreeMap<Category, usize> {
        let mut counts = BTreeMap::new();
        for insn in &self.instructions {
            *counts.entry(insn.category).or_insert(0) += 1;
        }
        counts
    }

    /// Share of instructions in `category`, in `0.0..=1.0`.
    pub fn category_fraction(&self, category: Category) -> f64 {
        if self.instructions.is_empty() {
            return 0.0;
        }
        let n = self
            .instructions
            .iter()
            .filter(|i| i.category == category)
            .count();
        n as f64 / self.instructions.len() as f64
    }
}
