use lyric_common::CommonError;
use lyric_compiler::CompilerError;
use lyric_object::ObjectError;
use lyric_runtime::InterpreterError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("failed to read `{path}`: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to write `{path}`: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot derive a module location from `{0}`; pass --location")]
    NoLocation(String),
    /// Rendered compiler diagnostics.
    #[error("{0}")]
    Diagnostics(String),
    #[error(transparent)]
    Common(#[from] CommonError),
    #[error(transparent)]
    Compiler(#[from] CompilerError),
    #[error(transparent)]
    Object(#[from] ObjectError),
    #[error(transparent)]
    Runtime(#[from] InterpreterError),
}

impl CliError {
    /// Print to stderr and exit with status 1.
    pub fn exit(self) -> ! {
        match self {
            // already formatted, with its own `error:` headers
            CliError::Diagnostics(rendered) => eprintln!("{rendered}"),
            other => eprintln!("error: {other}"),
        }
        std::process::exit(1);
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
