//! Module loaders.
//!
//! A [`Loader`] maps a [`ModuleLocation`] to an object. Loaders compose with
//! [`ChainLoader`], which asks each member in order, so a local loader placed
//! before a system loader shadows it for identical paths.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use lyric_common::{ErrorDomain, ModuleLocation};

use super::error::ObjectError;
use super::object::LyricObject;

/// File extension of objects on disk.
pub const OBJECT_EXTENSION: &str = "lyo";

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("failed to load `{location}`: {source}")]
    Object {
        location: String,
        #[source]
        source: ObjectError,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoaderError {
    pub fn domain(&self) -> ErrorDomain {
        ErrorDomain::Load
    }
}

pub trait Loader: Send + Sync {
    fn has_module(&self, location: &ModuleLocation) -> Result<bool, LoaderError>;

    /// `Ok(None)` when this loader does not know the module.
    fn load_module(&self, location: &ModuleLocation) -> Result<Option<LyricObject>, LoaderError>;
}

/// Objects held in memory, keyed by location.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    modules: HashMap<ModuleLocation, Vec<u8>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, location: ModuleLocation, bytes: Vec<u8>) {
        self.modules.insert(location, bytes);
    }

    pub fn with_module(mut self, location: ModuleLocation, bytes: Vec<u8>) -> Self {
        self.insert(location, bytes);
        self
    }
}

impl Loader for MemoryLoader {
    fn has_module(&self, location: &ModuleLocation) -> Result<bool, LoaderError> {
        Ok(self.modules.contains_key(location))
    }

    fn load_module(&self, location: &ModuleLocation) -> Result<Option<LyricObject>, LoaderError> {
        let Some(bytes) = self.modules.get(location) else {
            return Ok(None);
        };
        LyricObject::from_bytes(bytes.clone())
            .map(Some)
            .map_err(|source| LoaderError::Object {
                location: location.to_string(),
                source,
            })
    }
}

/// Objects stored as `<root><path>.lyo`.
///
/// Relative locations always map under `root`. Absolute locations map only
/// when an origin is configured and matches.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
    origin: Option<(String, String)>,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            origin: None,
        }
    }

    /// Also serve absolute locations under `scheme://origin`.
    pub fn with_origin(mut self, scheme: impl Into<String>, origin: impl Into<String>) -> Self {
        self.origin = Some((scheme.into(), origin.into()));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File that would hold `location`, if this loader serves it.
    pub fn module_path(&self, location: &ModuleLocation) -> Option<PathBuf> {
        if let ModuleLocation::Absolute { scheme, origin, .. } = location {
            let (s, o) = self.origin.as_ref()?;
            if s != scheme || o != origin {
                return None;
            }
        }
        let relative = location.path().trim_start_matches('/');
        if relative.is_empty() {
            return None;
        }
        let mut path = self.root.join(relative);
        path.set_extension(OBJECT_EXTENSION);
        Some(path)
    }
}

impl Loader for DirectoryLoader {
    fn has_module(&self, location: &ModuleLocation) -> Result<bool, LoaderError> {
        Ok(self.module_path(location).is_some_and(|p| p.is_file()))
    }

    fn load_module(&self, location: &ModuleLocation) -> Result<Option<LyricObject>, LoaderError> {
        let Some(path) = self.module_path(location) else {
            return Ok(None);
        };
        if !path.is_file() {
            return Ok(None);
        }
        LyricObject::from_path(&path)
            .map(Some)
            .map_err(|source| LoaderError::Object {
                location: location.to_string(),
                source,
            })
    }
}

/// Loaders consulted in order; the first that has the module wins.
#[derive(Default)]
pub struct ChainLoader {
    loaders: Vec<Box<dyn Loader>>,
}

impl ChainLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, loader: impl Loader + 'static) {
        self.loaders.push(Box::new(loader));
    }

    pub fn with(mut self, loader: impl Loader + 'static) -> Self {
        self.push(loader);
        self
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

impl Loader for ChainLoader {
    fn has_module(&self, location: &ModuleLocation) -> Result<bool, LoaderError> {
        for loader in &self.loaders {
            if loader.has_module(location)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn load_module(&self, location: &ModuleLocation) -> Result<Option<LyricObject>, LoaderError> {
        for loader in &self.loaders {
            if loader.has_module(location)? {
                return loader.load_module(location);
            }
        }
        Ok(None)
    }
}
