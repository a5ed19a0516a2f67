#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Lyric runtime: executes compiled objects.
//!
//! - [`SegmentManager`]: loads objects as segments and resolves links between them
//! - [`Heap`]: reference-counted objects behind [`RefHandle`]s, with a cycle collector
//! - [`StackfulCoroutine`]: call, data and guard stacks of one execution
//! - [`BytecodeInterpreter`]: the dispatch loop, generic over an [`Inspector`]
//! - [`NativeInterface`]: host traps provided by native plugins

pub mod coroutine;
pub mod data_cell;
pub mod error;
pub mod heap;
pub mod inspector;
pub mod interpreter;
pub mod native;
pub mod refs;
pub mod segment;
pub mod status;
pub mod types;

#[cfg(test)]
mod test_utils;

#[cfg(test)]
mod heap_tests;
#[cfg(test)]
mod native_tests;
#[cfg(test)]
mod segment_tests;

pub use coroutine::{CallCell, StackfulCoroutine};
pub use data_cell::{DataCell, DescriptorRef, SegmentId, TypeAddress};
pub use error::{InterpreterError, Result};
pub use heap::{AbstractRef, Heap, HeapHandle, HeapId, Marker, RefHandle};
pub use inspector::{Inspector, Interrupt, NoopInspector, PrintInspector, Verbosity};
pub use interpreter::{
    BytecodeInterpreter, ENTRY_CALL, InterpreterBuilder, InterpreterLimits, RunOutcome,
};
pub use native::{
    NATIVE_INIT, NativeInit, NativeInterface, NativeLibrary, NativeTrap, PluginRegistry,
    SegmentInfo, TrapContext, TrapIndex,
};
pub use refs::{InstanceRef, StringRef};
pub use segment::{Segment, SegmentManager, StaticSlot};
pub use status::{StatusCode, StatusRef};
pub use types::{RuntimeType, TypeComparison, TypeManager};
