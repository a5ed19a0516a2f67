use std::fs;
use std::path::PathBuf;

use lyric_common::ModuleLocation;
use lyric_compiler::{
    CompileOptions, CompilerError, Diagnostics, DiagnosticsPrinter, compile_source,
};
use lyric_object::OBJECT_EXTENSION;

use super::error::{CliError, Result};
use super::modules::{module_cache, module_location};

pub struct CompileArgs {
    pub archetype_path: PathBuf,
    pub output: Option<PathBuf>,
    pub location: Option<String>,
    pub system_dir: Option<PathBuf>,
    pub local_dir: Option<PathBuf>,
    pub optimize: bool,
    pub color: bool,
}

pub struct CompileReport {
    pub output: PathBuf,
    pub location: ModuleLocation,
    /// Rendered warnings; empty when there were none.
    pub warnings: String,
}

pub fn run(args: CompileArgs) {
    match compile(&args) {
        Ok(report) => {
            if !report.warnings.is_empty() {
                eprintln!("{}", report.warnings);
            }
        }
        Err(err) => err.exit(),
    }
}

/// Compile the archetype and write the object file.
pub fn compile(args: &CompileArgs) -> Result<CompileReport> {
    let path = args.archetype_path.display().to_string();
    let source = fs::read_to_string(&args.archetype_path).map_err(|source| CliError::Read {
        path: path.clone(),
        source,
    })?;

    let location = module_location(args.location.as_deref(), &args.archetype_path)?;
    let modules = module_cache(args.system_dir.as_deref(), args.local_dir.as_deref())?;
    let options = CompileOptions {
        optimize: args.optimize,
        ..CompileOptions::default()
    };

    let compilation = compile_source(&source, location.clone(), modules, &options)
        .map_err(|err| failure(err, &source, &path, args.color))?;

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.archetype_path.with_extension(OBJECT_EXTENSION));
    fs::write(&output, compilation.object.as_bytes()).map_err(|source| CliError::Write {
        path: output.display().to_string(),
        source,
    })?;

    let warnings = if compilation.diagnostics.is_empty() {
        String::new()
    } else {
        render(&compilation.diagnostics, &source, &path, args.color)
    };

    Ok(CompileReport {
        output,
        location,
        warnings,
    })
}

fn failure(err: CompilerError, source: &str, path: &str, color: bool) -> CliError {
    match err.diagnostics() {
        Some(diagnostics) => CliError::Diagnostics(render(diagnostics, source, path, color)),
        None => err.into(),
    }
}

fn render(diagnostics: &Diagnostics, source: &str, path: &str, color: bool) -> String {
    DiagnosticsPrinter::new(diagnostics)
        .source(source)
        .path(path)
        .colored(color)
        .cascades(false)
        .render()
}
