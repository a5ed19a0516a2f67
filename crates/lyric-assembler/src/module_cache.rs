//! Shared cache of loaded modules.
//!
//! One `ModuleCache` may serve several object states compiling in parallel.
//! The map is behind an `RwLock`; each location has its own `Mutex`d slot,
//! so two importers of the same module serialize on that slot and the module
//! is loaded at most once, while importers of different modules proceed
//! independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use lyric_common::ModuleLocation;
use lyric_object::{Loader, LyricObject};

use crate::error::Result;

type Slot = Arc<Mutex<Option<Arc<LyricObject>>>>;

#[derive(Default)]
pub struct ModuleCache {
    local: Option<Box<dyn Loader>>,
    system: Option<Box<dyn Loader>>,
    slots: RwLock<HashMap<ModuleLocation, Slot>>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader for modules of the current project. Consulted first.
    pub fn with_local(mut self, loader: impl Loader + 'static) -> Self {
        self.local = Some(Box::new(loader));
        self
    }

    /// Loader for installed libraries and the prelude.
    pub fn with_system(mut self, loader: impl Loader + 'static) -> Self {
        self.system = Some(Box::new(loader));
        self
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn slot(&self, location: &ModuleLocation) -> Slot {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(location)
        {
            return slot.clone();
        }
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(location.clone())
            .or_default()
            .clone()
    }

    /// Make an already built object available at `location`.
    pub fn insert(&self, location: ModuleLocation, object: Arc<LyricObject>) {
        let slot = self.slot(&location);
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(object);
    }

    /// Load `location`, consulting the local loader before the system one.
    ///
    /// `Ok(None)` when no loader has the module.
    pub fn get_or_load(&self, location: &ModuleLocation) -> Result<Option<Arc<LyricObject>>> {
        let slot = self.slot(location);
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(object) = guard.as_ref() {
            return Ok(Some(object.clone()));
        }

        for loader in [&self.local, &self.system].into_iter().flatten() {
            if let Some(object) = loader.load_module(location)? {
                let object = Arc::new(object);
                *guard = Some(object.clone());
                return Ok(Some(object));
            }
        }
        Ok(None)
    }

    pub fn has_module(&self, location: &ModuleLocation) -> Result<bool> {
        if self.is_loaded(location) {
            return Ok(true);
        }
        for loader in [&self.local, &self.system].into_iter().flatten() {
            if loader.has_module(location)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn is_loaded(&self, location: &ModuleLocation) -> bool {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots
            .get(location)
            .is_some_and(|s| s.lock().unwrap_or_else(PoisonError::into_inner).is_some())
    }
}
