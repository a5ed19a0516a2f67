#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Lyric compiler: archetype trees in, object files out.
//!
//! An [`Archetype`] is the language-neutral syntax tree a parser produces.
//! Three passes walk it through the [`scan`](scan::scan) protocol:
//!
//! - the symbolizer records what a module defines, as linkage placeholders;
//! - the analyzer declares typed signatures without code;
//! - the compiler generates code for everything.
//!
//! ```
//! use lyric_common::ModuleLocation;
//! use lyric_compiler::{CompileOptions, bootstrap_modules, compile_source};
//!
//! let modules = bootstrap_modules().unwrap();
//! let location = ModuleLocation::parse("/demo").unwrap();
//! let source = r#"(Block (Add (Integer :value "1") (Integer :value "2")))"#;
//! let compiled = compile_source(source, location, modules, &CompileOptions::default()).unwrap();
//! assert!(compiled.diagnostics.is_empty());
//! ```

pub mod analyze;
pub mod archetype;
pub mod compile;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod scan;
pub mod symbolize;

mod declare;
mod pipeline;
mod prelude;
mod signature;

#[cfg(test)]
mod test_utils;

pub use archetype::{Archetype, ArchetypeBuilder, AstClass, NodeId};
pub use diagnostics::{DiagnosticKind, Diagnostics, DiagnosticsPrinter, Severity};
pub use error::{CompilerError, Result};
pub use pipeline::{
    Compilation, CompileOptions, analyze_module, compile_module, compile_source, symbolize_module,
};
pub use prelude::{bootstrap_modules, minimal_prelude, prelude_loader};
