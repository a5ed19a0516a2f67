use lyric_common::{CommonError, ErrorDomain};
use lyric_object::{LoaderError, ObjectError};

#[derive(Debug, thiserror::Error)]
pub enum InterpreterError {
    /// Bytecode or runtime state the interpreter relies on was violated.
    #[error("interpreter invariant violated: {0}")]
    Invariant(String),
    #[error("invalid data stack: {0}")]
    InvalidDataStack(String),
    #[error("invalid operand: {0}")]
    InvalidOperand(String),
    #[error("module `{0}` not found")]
    ModuleNotFound(String),
    #[error("module `{0}` has no `$entry` call")]
    MissingEntry(String),
    #[error("unresolved link `{path}` in `{location}`")]
    UnresolvedLink { location: String, path: String },
    #[error("no native plugin registered for `{0}`")]
    PluginNotFound(String),
    #[error("trap {0} is not defined")]
    MissingTrap(u32),
    #[error("execution exceeded fuel limit of {0} instructions")]
    ExecFuelExhausted(u64),
    #[error("subinterpreter recursion exceeded limit of {0}")]
    RecursionLimitExceeded(u32),
    #[error("call depth exceeded limit of {0}")]
    CallDepthExceeded(usize),
    #[error("execution aborted")]
    Aborted,
    #[error("uncaught exception: {0}")]
    Uncaught(String),
    #[error(transparent)]
    Common(#[from] CommonError),
    #[error(transparent)]
    Object(#[from] ObjectError),
    #[error(transparent)]
    Load(#[from] LoaderError),
}

impl InterpreterError {
    pub fn domain(&self) -> ErrorDomain {
        match self {
            Self::Common(e) => e.domain(),
            Self::Object(e) => e.domain(),
            Self::Load(e) => e.domain(),
            _ => ErrorDomain::Runtime,
        }
    }

    pub fn is_invariant(&self) -> bool {
        match self {
            Self::Invariant(_) | Self::InvalidDataStack(_) => true,
            Self::Object(e) => e.is_invariant(),
            _ => false,
        }
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant(message.into())
    }

    pub(crate) fn stack(message: impl Into<String>) -> Self {
        Self::InvalidDataStack(message.into())
    }

    pub(crate) fn operand(message: impl Into<String>) -> Self {
        Self::InvalidOperand(message.into())
    }
}

pub type Result<T> = std::result::Result<T, InterpreterError>;
