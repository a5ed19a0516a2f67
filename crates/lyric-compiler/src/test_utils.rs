use std::sync::Arc;

use lyric_assembler::{ModuleCache, ObjectStateOptions};
use lyric_common::ModuleLocation;
use lyric_object::{LyricObject, dump};

use crate::archetype::Archetype;
use crate::compile::{CompilerDriver, compile};
use crate::error::{CompilerError, Result};
use crate::prelude::bootstrap_modules;

pub(crate) const TEST_LOCATION: &str = "/test";

pub(crate) fn location() -> ModuleLocation {
    ModuleLocation::parse(TEST_LOCATION).unwrap()
}

pub(crate) fn modules() -> Arc<ModuleCache> {
    bootstrap_modules().unwrap()
}

pub(crate) fn read(source: &str) -> Archetype {
    Archetype::read(source).unwrap()
}

pub(crate) fn try_compile(source: &str) -> Result<CompilerDriver> {
    let archetype = Archetype::read(source)?;
    compile(&archetype, location(), modules(), ObjectStateOptions::default())
}

pub(crate) fn compile_object(source: &str) -> LyricObject {
    try_compile(source).unwrap().to_object().unwrap()
}

pub(crate) fn compile_dump(source: &str) -> String {
    dump(&compile_object(source))
}

/// Rendered diagnostics of a failed compile.
pub(crate) fn compile_error(source: &str) -> String {
    let err = match try_compile(source) {
        Ok(_) => panic!("expected compilation to fail"),
        Err(err) => err,
    };
    match &err {
        CompilerError::Compile(diagnostics) | CompilerError::Parse(diagnostics) => {
            diagnostics.render()
        }
        other => other.to_string(),
    }
}
