use std::fmt;

use serde::Serialize;

/// Semantic category of an instruction, used for highlighting and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Call,
    Stack,
    Data,
    Control,
    Return,
    Exception,
    Error,
    Message,
    Binary,
    Float,
    Meta,
    /// Unclassified. Only deprecated or unknown opcodes end up here.
    Unknown,
}

impl Category {
    /// Every category, in declaration order.
    pub const ALL: [Category; 12] = [
        Category::Call,
        Category::Stack,
        Category::Data,
        Category::Control,
        Category::Return,
        Category::Exception,
        Category::Error,
        Category::Message,
        Category::Binary,
        Category::Float,
        Category::Meta,
        Category::Unknown,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Category::Call => "call",
            Category::Stack => "stack",
            Category::Data => "data",
            Category::Control => "control",
            Category::Return => "return",
            Category::Exception => "exception",
            Category::Error => "error",
            Category::Message => "message",
            Category::Binary => "binary",
            Category::Float => "float",
            Category::Meta => "meta",
            Category::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
