//! Module locations and loaders shared by compile and exec.

use std::path::Path;
use std::sync::Arc;

use lyric_assembler::ModuleCache;
use lyric_common::ModuleLocation;
use lyric_compiler::{bootstrap_modules, prelude_loader};
use lyric_object::{ChainLoader, DirectoryLoader, Loader};

use super::error::{CliError, Result};

/// Scheme and origin of system modules (`lyric://bootstrap/...`).
const SYSTEM_SCHEME: &str = "lyric";
const SYSTEM_ORIGIN: &str = "bootstrap";

/// `--location` if given, else `/` followed by the file stem.
pub fn module_location(explicit: Option<&str>, path: &Path) -> Result<ModuleLocation> {
    if let Some(text) = explicit {
        return Ok(ModuleLocation::parse(text)?);
    }
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CliError::NoLocation(path.display().to_string()))?;
    Ok(ModuleLocation::relative(&format!("/{stem}"))?)
}

/// Serves `lyric://bootstrap/<name>` from `<dir>/<name>.lyo`.
pub fn system_loader(dir: &Path) -> DirectoryLoader {
    DirectoryLoader::new(dir).with_origin(SYSTEM_SCHEME, SYSTEM_ORIGIN)
}

/// Module cache for compiling: local modules first, then the system
/// library or the built-in prelude.
pub fn module_cache(
    system_dir: Option<&Path>,
    local_dir: Option<&Path>,
) -> Result<Arc<ModuleCache>> {
    let mut cache = match system_dir {
        Some(dir) => ModuleCache::new().with_system(system_loader(dir)),
        None if local_dir.is_none() => return Ok(bootstrap_modules()?),
        None => ModuleCache::new().with_system(prelude_loader()?),
    };
    if let Some(dir) = local_dir {
        cache = cache.with_local(DirectoryLoader::new(dir));
    }
    Ok(cache.into_shared())
}

/// Loader for running: `first` (usually the main object), then local
/// modules, then the system library or the built-in prelude.
pub fn runtime_loader(
    first: impl Loader + 'static,
    system_dir: Option<&Path>,
    local_dir: Option<&Path>,
) -> Result<ChainLoader> {
    let mut loader = ChainLoader::new().with(first);
    if let Some(dir) = local_dir {
        loader.push(DirectoryLoader::new(dir));
    }
    match system_dir {
        Some(dir) => loader.push(system_loader(dir)),
        None => loader.push(prelude_loader()?),
    }
    Ok(loader)
}
