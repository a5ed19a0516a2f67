//! Native plugins: host functions invoked from bytecode by trap number.
//!
//! An object that declares a [`PluginSpecifier`] is paired with a native
//! library when its segment loads. The library's [`NATIVE_INIT`] entry point
//! yields a [`NativeInterface`], whose traps are indexed once into a
//! [`TrapIndex`].

use std::collections::HashMap;
use std::fmt;

use lyric_common::ModuleLocation;
use lyric_object::PluginSpecifier;

use crate::coroutine::StackfulCoroutine;
use crate::data_cell::{DataCell, SegmentId};
use crate::error::{InterpreterError, Result};
use crate::heap::Heap;
use crate::status::{StatusCode, StatusRef};

/// Name of the entry point every native library exports.
pub const NATIVE_INIT: &str = "native_init";

/// Host function behind a `TRAP` instruction.
pub type NativeTrap = fn(&mut TrapContext<'_>) -> Result<()>;

/// Entry point of a native library.
pub type NativeInit = fn() -> Box<dyn NativeInterface>;

/// The segment a plugin is being attached to or detached from.
#[derive(Debug, Clone, Copy)]
pub struct SegmentInfo<'a> {
    pub id: SegmentId,
    pub location: &'a ModuleLocation,
}

pub trait NativeInterface {
    fn load(&self, segment: SegmentInfo<'_>) -> Result<()>;
    fn unload(&self, segment: SegmentInfo<'_>) -> Result<()>;
    fn get_trap(&self, index: u32) -> Option<NativeTrap>;
    fn num_traps(&self) -> u32;
}

/// What a trap sees of the interpreter.
pub struct TrapContext<'a> {
    coroutine: &'a mut StackfulCoroutine,
    heap: &'a Heap,
    raised: Option<DataCell>,
}

impl<'a> TrapContext<'a> {
    pub(crate) fn new(coroutine: &'a mut StackfulCoroutine, heap: &'a Heap) -> Self {
        Self {
            coroutine,
            heap,
            raised: None,
        }
    }

    pub fn pop(&mut self) -> Result<DataCell> {
        self.coroutine.pop_data()
    }

    pub fn push(&mut self, cell: DataCell) {
        self.coroutine.push_data(cell);
    }

    pub fn peek(&self, offset: usize) -> Result<&DataCell> {
        self.coroutine.peek_data(offset)
    }

    pub fn heap(&self) -> &Heap {
        self.heap
    }

    /// Raise `value` once the trap returns.
    pub fn raise(&mut self, value: DataCell) {
        self.raised = Some(value);
    }

    pub fn raise_status(&mut self, code: StatusCode, message: impl Into<String>) -> Result<()> {
        let status = self.heap.allocate(StatusRef::new(code, message))?;
        self.raise(DataCell::Ref(status));
        Ok(())
    }

    pub(crate) fn into_raised(self) -> Option<DataCell> {
        self.raised
    }
}

/// Traps of one plugin, resolved up front.
pub struct TrapIndex {
    traps: Vec<NativeTrap>,
}

impl TrapIndex {
    pub fn new(interface: &dyn NativeInterface) -> Result<Self> {
        let traps = (0..interface.num_traps())
            .map(|index| {
                interface
                    .get_trap(index)
                    .ok_or(InterpreterError::MissingTrap(index))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { traps })
    }

    pub fn get(&self, index: u32) -> Option<NativeTrap> {
        self.traps.get(index as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.traps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traps.is_empty()
    }
}

impl fmt::Debug for TrapIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrapIndex")
            .field("traps", &self.traps.len())
            .finish()
    }
}

/// Exported symbols of a native library.
#[derive(Clone, Default)]
pub struct NativeLibrary {
    symbols: HashMap<String, NativeInit>,
}

impl NativeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Library exporting `init` under [`NATIVE_INIT`].
    pub fn with_init(init: NativeInit) -> Self {
        Self::new().with_symbol(NATIVE_INIT, init)
    }

    pub fn with_symbol(mut self, name: impl Into<String>, init: NativeInit) -> Self {
        self.symbols.insert(name.into(), init);
        self
    }

    pub fn symbol(&self, name: &str) -> Option<NativeInit> {
        self.symbols.get(name).copied()
    }
}

/// Native libraries available to an interpreter, keyed by the module they
/// belong to and the platform they were built for.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    libraries: HashMap<(ModuleLocation, PluginSpecifier), NativeLibrary>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        location: ModuleLocation,
        specifier: PluginSpecifier,
        library: NativeLibrary,
    ) {
        self.libraries.insert((location, specifier), library);
    }

    pub fn with(
        mut self,
        location: ModuleLocation,
        specifier: PluginSpecifier,
        library: NativeLibrary,
    ) -> Self {
        self.register(location, specifier, library);
        self
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    /// Instantiate the plugin of `location`, or `Ok(None)` when no library
    /// is registered for it.
    pub fn load_plugin(
        &self,
        location: &ModuleLocation,
        specifier: &PluginSpecifier,
    ) -> Result<Option<Box<dyn NativeInterface>>> {
        let Some(library) = self
            .libraries
            .get(&(location.clone(), specifier.clone()))
        else {
            return Ok(None);
        };
        let init = library.symbol(NATIVE_INIT).ok_or_else(|| {
            InterpreterError::PluginNotFound(format!("{location} (no `{NATIVE_INIT}` symbol)"))
        })?;
        Ok(Some(init()))
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("libraries", &self.libraries.len())
            .finish()
    }
}
