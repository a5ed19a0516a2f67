//! Entry points that run one pass over a whole module.

use std::sync::Arc;

use lyric_assembler::{ModuleCache, ObjectStateOptions};
use lyric_common::ModuleLocation;
use lyric_object::LyricObject;

use crate::analyze::analyze;
use crate::archetype::Archetype;
use crate::compile::compile;
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::symbolize::symbolize;

#[derive(Clone, Debug)]
pub struct CompileOptions {
    pub state: ObjectStateOptions,
    /// Run the peephole optimizer over every proc before writing.
    pub optimize: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            state: ObjectStateOptions::default(),
            optimize: false,
        }
    }
}

/// A compiled module and the warnings raised while compiling it.
#[derive(Debug)]
pub struct Compilation {
    pub object: LyricObject,
    pub diagnostics: Diagnostics,
}

/// Linkage-only object naming what the module defines.
pub fn symbolize_module(
    archetype: &Archetype,
    location: ModuleLocation,
    modules: Arc<ModuleCache>,
) -> Result<LyricObject> {
    symbolize(archetype, location, modules)
}

/// Interface object with typed declarations and no code.
pub fn analyze_module(
    archetype: &Archetype,
    location: ModuleLocation,
    modules: Arc<ModuleCache>,
    options: &CompileOptions,
) -> Result<LyricObject> {
    analyze(archetype, location, modules, options.state.clone())
}

pub fn compile_module(
    archetype: &Archetype,
    location: ModuleLocation,
    modules: Arc<ModuleCache>,
    options: &CompileOptions,
) -> Result<Compilation> {
    let mut driver = compile(archetype, location, modules, options.state.clone())?;
    if options.optimize {
        driver.state_mut().optimize();
    }
    let object = driver.to_object()?;
    let (_, diagnostics) = driver.into_parts();
    Ok(Compilation {
        object,
        diagnostics,
    })
}

/// Read an s-expression archetype and compile it.
pub fn compile_source(
    source: &str,
    location: ModuleLocation,
    modules: Arc<ModuleCache>,
    options: &CompileOptions,
) -> Result<Compilation> {
    let archetype = Archetype::read(source)?;
    compile_module(&archetype, location, modules, options)
}
