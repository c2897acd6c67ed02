use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("File too small: {0} bytes")]
    FileTooSmall(usize),

    #[error("Invalid magic: expected FOR1....BEAM")]
    InvalidMagic,

    #[error("Chunk {0:?} not found")]
    ChunkNotFound(String),

    #[error("Truncated data at offset {0:#x}")]
    Truncated(usize),

    #[error("Invalid tag byte {0:#04x} at offset {1:#x}")]
    InvalidTag(u8, usize),

    #[error("Value does not fit in 64 bits at offset {0:#x}")]
    Overflow(usize),

    #[error("Unsupported extended operand kind {0} at offset {1:#x}")]
    UnsupportedExtended(i64, usize),

    #[error("Unknown opcode {0} at offset {1:#x}")]
    UnknownOpcode(u8, usize),

    #[error("{0} index {1} out of range")]
    IndexOutOfRange(&'static str, u64),

    #[error("Invalid UTF-8 at offset {0:#x}")]
    InvalidUtf8(usize),

    #[error("Invalid term tag {0} at offset {1:#x}")]
    InvalidTerm(u8, usize),

    #[error("Term nested too deeply at offset {0:#x}")]
    TermTooDeep(usize),

    #[error("Decompression failed: {0}")]
    Decompress(String),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, Error>;
