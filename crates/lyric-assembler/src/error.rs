use lyric_common::{CommonError, ErrorDomain, ModuleLocation, SymbolUrl, TypeDef};
use lyric_object::{LoaderError, ObjectError};

#[derive(Debug, thiserror::Error)]
pub enum AssemblerError {
    /// Internal consistency violation; never caused by well-formed input.
    #[error("assembler invariant violated: {0}")]
    Invariant(String),
    #[error("symbol `{0}` is already defined")]
    SymbolAlreadyDefined(SymbolUrl),
    #[error("`{0}` is already bound in this block")]
    NameAlreadyBound(String),
    #[error("missing symbol `{0}`")]
    MissingSymbol(SymbolUrl),
    #[error("symbol `{0}` not found")]
    SymbolNotFound(String),
    #[error("missing module `{0}`")]
    MissingModule(ModuleLocation),
    #[error("call `{0}` is already defined")]
    CallAlreadyDefined(SymbolUrl),
    #[error("`{0}` was declared but never finalized")]
    Unfinalized(SymbolUrl),
    #[error("cannot link `{0}`: module is not imported")]
    UnresolvedLink(SymbolUrl),
    #[error("type mismatch: expected `{expected}`, found `{actual}`")]
    TypeMismatch { expected: TypeDef, actual: TypeDef },
    #[error("`{symbol}` cannot extend `{superclass}`")]
    InvalidSuperclass { symbol: SymbolUrl, superclass: SymbolUrl },
    #[error("`{0}` is not a concept")]
    NotAConcept(SymbolUrl),
    #[error("`{0}` is not assignable")]
    NotAssignable(SymbolUrl),
    #[error(transparent)]
    Common(#[from] CommonError),
    #[error(transparent)]
    Object(#[from] ObjectError),
    #[error(transparent)]
    Load(#[from] LoaderError),
}

impl AssemblerError {
    pub fn domain(&self) -> ErrorDomain {
        ErrorDomain::Assembler
    }

    pub fn is_invariant(&self) -> bool {
        match self {
            Self::Invariant(_) => true,
            Self::Object(e) => e.is_invariant(),
            _ => false,
        }
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant(message.into())
    }
}

pub type Result<T> = std::result::Result<T, AssemblerError>;
