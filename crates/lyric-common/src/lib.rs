#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Identifiers shared by every stage of the Lyric toolchain.
//!
//! - [`ModuleLocation`]: where a module lives (`scheme://origin/path` or `/path`)
//! - [`SymbolPath`] / [`SymbolUrl`]: `#`-separated symbol names, optionally anchored to a module
//! - [`TypeDef`]: structural type descriptors, canonicalized so equality is identity
//! - [`Interner`]: string deduplication for serialized string tables

mod interner;
mod module_location;
mod symbol_path;
mod type_def;

#[cfg(test)]
mod interner_tests;
#[cfg(test)]
mod module_location_tests;
#[cfg(test)]
mod symbol_path_tests;
#[cfg(test)]
mod type_def_tests;

pub use interner::{Interner, StringId};
pub use module_location::ModuleLocation;
pub use symbol_path::{SymbolPath, SymbolUrl};
pub use type_def::TypeDef;

/// Location of the bootstrap prelude every module imports implicitly.
pub const PRELUDE_LOCATION: &str = "lyric://bootstrap/prelude";

/// Errors produced when parsing identifiers from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommonError {
    #[error("invalid module location `{0}`")]
    InvalidLocation(String),
    #[error("invalid symbol path `{0}`")]
    InvalidSymbolPath(String),
    #[error("invalid symbol url `{0}`")]
    InvalidSymbolUrl(String),
}

pub type Result<T> = std::result::Result<T, CommonError>;

/// Subsystem an error originates from.
///
/// Every toolchain error type reports its domain, so callers can ask
/// "did this fail in the assembler" without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorDomain {
    Common,
    Object,
    Load,
    Assembler,
    Compiler,
    Runtime,
}

impl CommonError {
    pub fn domain(&self) -> ErrorDomain {
        ErrorDomain::Common
    }
}
