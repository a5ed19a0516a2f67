use std::io;

use lyric_common::ErrorDomain;

use super::{HEADER_SIZE, VERSION};

/// Object load/validation error.
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("invalid magic: expected LYO1")]
    InvalidMagic,
    #[error("unsupported version: {0} (expected {VERSION})")]
    UnsupportedVersion(u32),
    #[error("file too small: {0} bytes (minimum {HEADER_SIZE})")]
    FileTooSmall(usize),
    #[error("size mismatch: header says {header} bytes, got {actual}")]
    SizeMismatch { header: u32, actual: usize },
    #[error("checksum mismatch: header says {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("section `{section}` out of bounds")]
    SectionOutOfBounds { section: &'static str },
    #[error("invalid string id {0}")]
    InvalidStringId(u32),
    #[error("invalid opcode {opcode:#04x} at offset {offset}")]
    InvalidOpcode { opcode: u8, offset: u32 },
    #[error("invalid operand at offset {0}")]
    InvalidOperand(u32),
    #[error("truncated instruction at offset {0}")]
    TruncatedInstruction(u32),
    #[error("invalid proc at offset {offset}: {reason}")]
    InvalidProc { offset: u32, reason: String },
    #[error("invalid descriptor tables: {0}")]
    Decode(#[from] postcard::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl ObjectError {
    pub fn domain(&self) -> ErrorDomain {
        ErrorDomain::Object
    }

    /// Errors that can only come from a broken writer, never from a
    /// truncated or foreign file.
    pub fn is_invariant(&self) -> bool {
        matches!(
            self,
            Self::InvalidProc { .. }
                | Self::InvalidOpcode { .. }
                | Self::InvalidOperand(_)
                | Self::InvalidStringId(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ObjectError>;
