#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Assembler state shared by every pipeline stage.
//!
//! An [`ObjectState`] holds everything known about one module while it is
//! symbolized, analyzed and compiled: the [`TypeCache`], the [`SymbolCache`],
//! the [`ImportCache`] backed by a shared [`ModuleCache`], the lexical
//! [`BlockArena`] and one [`ProcHandle`] per call. [`ObjectWriter`] freezes
//! the state into a serialized object.

mod block;
mod code;
mod error;
mod fundamentals;
mod import_cache;
mod module_cache;
mod object_state;
mod object_writer;
mod optimizer;
mod proc_handle;
mod symbol;
mod symbol_cache;
mod type_cache;

#[cfg(test)]
mod test_utils;

#[cfg(test)]
mod code_tests;
#[cfg(test)]
mod import_cache_tests;
#[cfg(test)]
mod object_writer_tests;

pub use block::{Binding, BindingKind, BlockAddress, BlockArena, BlockHandle, BlockOwner};
pub use code::{
    AssembledCode, CodeFragment, FragmentItem, Label, LiteralValue, OperandResolver,
    PendingOperand,
};
pub use error::{AssemblerError, Result};
pub use fundamentals::{Fundamental, Fundamentals, PRELUDE_LOCATION};
pub use import_cache::{ImportCache, ImportEntry};
pub use module_cache::ModuleCache;
pub use object_state::{
    CTOR_NAME, CompositeSpec, ENTRY_CALL, ExistentialSpec, GLOBAL_NAMESPACE, INITIALIZER_NAME,
    ObjectState, ObjectStateOptions,
};
pub use object_writer::{ObjectWriter, WriterOptions};
pub use optimizer::{optimize_fragment, optimize_proc};
pub use proc_handle::{CatchRegion, CheckRegion, LexicalRef, ProcHandle};
pub use symbol::{
    ActionSymbol, BindingType, CallSymbol, CompositeSymbol, ConceptSymbol, ExistentialSymbol,
    FieldSymbol, LexicalSymbol, NamespaceSymbol, Parameter, StaticSymbol, Symbol, SymbolKind,
    SymbolType, VariableSymbol, symbol_type_to_linkage_section,
};
pub use symbol_cache::{SymbolAddress, SymbolCache};
pub use type_cache::{TypeAddress, TypeCache};
