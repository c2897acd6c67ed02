use std::collections::HashMap;
use std::sync::LazyLock;

use crate::Category;

bitflags::bitflags! {
    /// Static properties of an opcode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpcodeFlags: u16 {
        /// Marked with `-` in genop.tab; no longer emitted by the compiler.
        const DEPRECATED    = 1 << 0;
        /// Calls a label in the same module.
        const LOCAL_CALL    = 1 << 1;
        /// Calls an imported function.
        const EXTERNAL_CALL = 1 << 2;
        /// Invokes a built-in function through the import table.
        const BIF_CALL      = 1 << 3;
        /// Calls a fun or applies a runtime module/function pair.
        const DYNAMIC_CALL  = 1 << 4;
        /// Does not return to the caller.
        const TAIL_CALL     = 1 << 5;
        /// Pseudo-instruction carrying a line table index.
        const LINE_MARKER   = 1 << 6;
    }
}

/// Metadata for a single opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    id: u8,
    mnemonic: &'static str,
    arity: u8,
    category: Category,
    flags: OpcodeFlags,
    import_operand: Option<u8>,
    doc: Option<&'static str>,
    operand_names: &'static [&'static str],
}

include!(concat!(env!("OUT_DIR"), "/generated.rs"));

impl OpcodeInfo {
    /// Placeholder for an id this build does not know about.
    const fn placeholder(id: u8) -> Self {
        Self {
            id,
            mnemonic: "unknown",
            arity: 0,
            category: Category::Unknown,
            flags: OpcodeFlags::empty(),
            import_operand: None,
            doc: None,
            operand_names: &[],
        }
    }

    #[inline]
    pub fn id(&self) -> u8 {
        self.id
    }

    #[inline]
    pub fn mnemonic(&self) -> &'static str {
        self.mnemonic
    }

    #[inline]
    pub fn arity(&self) -> u8 {
        self.arity
    }

    #[inline]
    pub fn category(&self) -> Category {
        self.category
    }

    #[inline]
    pub fn flags(&self) -> OpcodeFlags {
        self.flags
    }

    #[inline]
    pub fn is_deprecated(&self) -> bool {
        self.flags.contains(OpcodeFlags::DEPRECATED)
    }

    /// `true` for the synthetic descriptor returned by [`describe`] for
    /// ids outside the table.
    pub fn is_placeholder(&self) -> bool {
        self.mnemonic == "unknown" && self.category == Category::Unknown
    }

    /// Any call-shaped instruction (local, external, BIF or dynamic).
    pub fn is_call(&self) -> bool {
        self.flags.intersects(
            OpcodeFlags::LOCAL_CALL
                | OpcodeFlags::EXTERNAL_CALL
                | OpcodeFlags::BIF_CALL
                | OpcodeFlags::DYNAMIC_CALL,
        )
    }

    #[inline]
    pub fn is_line_marker(&self) -> bool {
        self.flags.contains(OpcodeFlags::LINE_MARKER)
    }

    /// Position of the operand that names an import table entry, if any.
    #[inline]
    pub fn import_operand(&self) -> Option<usize> {
        self.import_operand.map(usize::from)
    }

    /// Documentation text from the `## @doc` block, if present.
    #[inline]
    pub fn doc(&self) -> Option<&'static str> {
        self.doc
    }

    /// Operand names from the `## @spec` line, if present.
    #[inline]
    pub fn operand_names(&self) -> &'static [&'static str] {
        self.operand_names
    }
}

static BY_NAME: LazyLock<HashMap<&'static str, &'static OpcodeInfo>> = LazyLock::new(|| {
    OPCODES
        .iter()
        .flatten()
        .map(|info| (info.mnemonic, info))
        .collect()
});

/// Look up an opcode by numeric id.
#[inline]
pub fn lookup(id: u8) -> Option<&'static OpcodeInfo> {
    OPCODES.get(id as usize).and_then(Option::as_ref)
}

/// Look up an opcode by mnemonic.
pub fn lookup_name(name: &str) -> Option<&'static OpcodeInfo> {
    BY_NAME.get(name).copied()
}

/// Like [`lookup`], but never fails: unknown ids yield a placeholder with
/// [`Category::Unknown`] so analysis can continue past newer instructions.
pub fn describe(id: u8) -> OpcodeInfo {
    lookup(id).copied().unwrap_or(OpcodeInfo::placeholder(id))
}

/// Iterate over every opcode in id order.
pub fn opcode_table() -> impl Iterator<Item = &'static OpcodeInfo> {
    OPCODES.iter().flatten()
}

/// Number of opcodes defined in the table.
pub fn opcode_count() -> usize {
    opcode_table().count()
}
