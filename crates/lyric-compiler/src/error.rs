use lyric_assembler::AssemblerError;
use lyric_common::{CommonError, ErrorDomain};
use lyric_object::{LoaderError, ObjectError};

use crate::diagnostics::Diagnostics;

#[derive(Debug, thiserror::Error)]
pub enum CompilerError {
    /// Archetype shape the passes rely on was violated.
    #[error("compiler invariant violated: {0}")]
    Invariant(String),
    /// Well-formed archetype that the language does not accept.
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("invalid literal: {0}")]
    InvalidLiteral(String),
    #[error("archetype parse failed with {} errors", .0.error_count())]
    Parse(Diagnostics),
    #[error("compilation failed with {} errors", .0.error_count())]
    Compile(Diagnostics),
    #[error(transparent)]
    Assembler(#[from] AssemblerError),
    #[error(transparent)]
    Common(#[from] CommonError),
    #[error(transparent)]
    Object(#[from] ObjectError),
    #[error(transparent)]
    Load(#[from] LoaderError),
}

impl CompilerError {
    pub fn domain(&self) -> ErrorDomain {
        match self {
            Self::Assembler(e) => e.domain(),
            Self::Common(e) => e.domain(),
            Self::Object(e) => e.domain(),
            Self::Load(e) => e.domain(),
            _ => ErrorDomain::Compiler,
        }
    }

    pub fn is_invariant(&self) -> bool {
        match self {
            Self::Invariant(_) => true,
            Self::Assembler(e) => e.is_invariant(),
            Self::Object(e) => e.is_invariant(),
            _ => false,
        }
    }

    /// Diagnostics carried by a parse or compile failure.
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            Self::Parse(d) | Self::Compile(d) => Some(d),
            _ => None,
        }
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant(message.into())
    }

    pub(crate) fn syntax(message: impl Into<String>) -> Self {
        Self::Syntax(message.into())
    }

    pub(crate) fn literal(message: impl Into<String>) -> Self {
        Self::InvalidLiteral(message.into())
    }
}

pub type Result<T> = std::result::Result<T, CompilerError>;
