//! Bytecode interpreter.
//!
//! [`BytecodeInterpreter`] executes the `$entry` call of a main module on a
//! single [`StackfulCoroutine`]. Execution can suspend (an `INTERRUPT`
//! instruction, or an inspector asking for it at the end of a time slice)
//! and resume with another call to [`BytecodeInterpreter::run`].
//!
//! Static initializers and singleton constructors run re-entrantly: the
//! current call depth is pushed onto the guard stack and the dispatch loop
//! runs until control returns to it.

mod calls;
mod dispatch;
mod raise;

use std::sync::Arc;

use lyric_common::ModuleLocation;
use lyric_object::{INVALID_ADDRESS, LinkageSection, Loader, ObjectError, OpCell};

use crate::coroutine::StackfulCoroutine;
use crate::data_cell::{DataCell, DescriptorRef};
use crate::error::{InterpreterError, Result};
use crate::heap::Heap;
use crate::inspector::{Inspector, Interrupt, NoopInspector};
use crate::native::PluginRegistry;
use crate::segment::SegmentManager;
use crate::types::TypeManager;

/// Name of the call every executable module defines.
pub const ENTRY_CALL: &str = "$entry";

/// Runtime limits for execution.
#[derive(Clone, Copy, Debug)]
pub struct InterpreterLimits {
    /// Maximum instructions over the whole run (default: 1,000,000).
    pub(crate) exec_fuel: u64,
    /// Maximum nesting of re-entrant runs (default: 128).
    pub(crate) recursion_limit: u32,
    /// Maximum call stack depth (default: 1,024).
    pub(crate) call_depth: usize,
    /// Instructions between time slice checks; 0 disables them (default: 64).
    pub(crate) time_slice: u64,
}

impl Default for InterpreterLimits {
    fn default() -> Self {
        Self {
            exec_fuel: 1_000_000,
            recursion_limit: 128,
            call_depth: 1024,
            time_slice: 64,
        }
    }
}

impl InterpreterLimits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exec_fuel(mut self, fuel: u64) -> Self {
        self.exec_fuel = fuel;
        self
    }

    pub fn recursion_limit(mut self, limit: u32) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn call_depth(mut self, depth: usize) -> Self {
        self.call_depth = depth;
        self
    }

    pub fn time_slice(mut self, instructions: u64) -> Self {
        self.time_slice = instructions;
        self
    }

    pub fn get_exec_fuel(&self) -> u64 {
        self.exec_fuel
    }
    pub fn get_recursion_limit(&self) -> u32 {
        self.recursion_limit
    }
    pub fn get_call_depth(&self) -> usize {
        self.call_depth
    }
    pub fn get_time_slice(&self) -> u64 {
        self.time_slice
    }
}

/// How a call to [`BytecodeInterpreter::run`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// `$entry` returned or the program halted with this value.
    Completed(DataCell),
    /// Execution paused; call `run` again to resume.
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Ready,
    Suspended,
    Finished,
}

/// Non-local exits of the dispatch loop.
#[derive(Debug)]
pub(crate) enum Unwind {
    /// A bytecode exception looking for a handler.
    Raise(DataCell),
    Halt(DataCell),
    Fatal(InterpreterError),
}

impl From<InterpreterError> for Unwind {
    fn from(error: InterpreterError) -> Self {
        Self::Fatal(error)
    }
}

impl From<ObjectError> for Unwind {
    fn from(error: ObjectError) -> Self {
        Self::Fatal(error.into())
    }
}

pub(crate) type Flow<T> = std::result::Result<T, Unwind>;

/// What one instruction asks of the loop.
enum Step {
    Continue,
    /// Control returned to the guarded call depth with this result.
    Return(DataCell),
    Suspend,
}

/// Why the loop stopped without an unwind.
enum Exit {
    Returned(DataCell),
    Suspended,
}

/// Builder for [`BytecodeInterpreter`] instances.
pub struct InterpreterBuilder<I: Inspector = NoopInspector> {
    loader: Arc<dyn Loader>,
    main: ModuleLocation,
    plugins: PluginRegistry,
    limits: InterpreterLimits,
    inspector: I,
}

impl InterpreterBuilder {
    pub fn new(loader: Arc<dyn Loader>, main: ModuleLocation) -> Self {
        Self {
            loader,
            main,
            plugins: PluginRegistry::new(),
            limits: InterpreterLimits::default(),
            inspector: NoopInspector,
        }
    }
}

impl<I: Inspector> InterpreterBuilder<I> {
    pub fn limits(mut self, limits: InterpreterLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn exec_fuel(mut self, fuel: u64) -> Self {
        self.limits = self.limits.exec_fuel(fuel);
        self
    }

    pub fn recursion_limit(mut self, limit: u32) -> Self {
        self.limits = self.limits.recursion_limit(limit);
        self
    }

    pub fn call_depth(mut self, depth: usize) -> Self {
        self.limits = self.limits.call_depth(depth);
        self
    }

    pub fn time_slice(mut self, instructions: u64) -> Self {
        self.limits = self.limits.time_slice(instructions);
        self
    }

    pub fn plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn inspector<J: Inspector>(self, inspector: J) -> InterpreterBuilder<J> {
        InterpreterBuilder {
            loader: self.loader,
            main: self.main,
            plugins: self.plugins,
            limits: self.limits,
            inspector,
        }
    }

    /// Load the main module and locate its `$entry` call.
    pub fn build(self) -> Result<BytecodeInterpreter<I>> {
        let mut segments = SegmentManager::new(self.loader, self.plugins);
        let main = segments.load_main(&self.main)?;
        let entry = segments
            .segment(main)?
            .object()
            .find_symbol(ENTRY_CALL)
            .filter(|s| s.section == LinkageSection::Call && s.index != INVALID_ADDRESS)
            .map(|s| DescriptorRef::new(main, LinkageSection::Call, s.index))
            .ok_or_else(|| InterpreterError::MissingEntry(self.main.to_string()))?;

        Ok(BytecodeInterpreter {
            segments,
            types: TypeManager::new(),
            heap: Heap::new(),
            coroutine: StackfulCoroutine::new(),
            limits: self.limits,
            inspector: self.inspector,
            entry,
            executed: 0,
            slice_executed: 0,
            state: RunState::Ready,
            current: None,
        })
    }
}

pub struct BytecodeInterpreter<I: Inspector = NoopInspector> {
    segments: SegmentManager,
    types: TypeManager,
    heap: Heap,
    coroutine: StackfulCoroutine,
    limits: InterpreterLimits,
    inspector: I,
    entry: DescriptorRef,
    executed: u64,
    slice_executed: u64,
    state: RunState,
    /// Instruction being executed, for error reporting.
    current: Option<OpCell>,
}

impl BytecodeInterpreter {
    pub fn builder(loader: impl Loader + 'static, main: ModuleLocation) -> InterpreterBuilder {
        InterpreterBuilder::new(Arc::new(loader), main)
    }
}

impl<I: Inspector> BytecodeInterpreter<I> {
    /// Run `$entry`, or resume it after a suspension.
    pub fn run(&mut self) -> Result<RunOutcome> {
        match self.state {
            RunState::Ready => {
                if let Err(unwind) = self.enter_call(self.entry, 0, None, None) {
                    return Err(self.finish_with(unwind));
                }
            }
            RunState::Suspended => {
                self.coroutine.resume()?;
                self.slice_executed = 0;
            }
            RunState::Finished => {
                return Err(InterpreterError::invariant("interpreter already finished"));
            }
        }

        match self.execute(0) {
            Ok(Exit::Returned(value)) => {
                self.inspector.on_halt(&value);
                self.state = RunState::Finished;
                Ok(RunOutcome::Completed(value))
            }
            Ok(Exit::Suspended) => {
                self.coroutine.suspend();
                self.state = RunState::Suspended;
                Ok(RunOutcome::Suspended)
            }
            Err(Unwind::Halt(value)) => {
                self.inspector.on_halt(&value);
                self.state = RunState::Finished;
                self.coroutine.reset();
                Ok(RunOutcome::Completed(value))
            }
            Err(unwind) => Err(self.finish_with(unwind)),
        }
    }

    /// Run, resuming after every suspension, until the program completes.
    pub fn run_until_done(&mut self) -> Result<DataCell> {
        loop {
            if let RunOutcome::Completed(value) = self.run()? {
                return Ok(value);
            }
        }
    }

    /// Invoke `call` with `arguments` on top of the current execution and
    /// run it to completion.
    pub fn run_subinterpreter(
        &mut self,
        call: DescriptorRef,
        arguments: Vec<DataCell>,
    ) -> Result<DataCell> {
        match self.run_nested(call, arguments, None, None) {
            Ok(value) => Ok(value),
            Err(Unwind::Halt(value)) => {
                self.inspector.on_halt(&value);
                Ok(value)
            }
            Err(Unwind::Raise(value)) => {
                let error = InterpreterError::Uncaught(value.to_string());
                self.inspector.on_error(self.current.as_ref(), &error);
                Err(error)
            }
            Err(Unwind::Fatal(error)) => {
                self.inspector.on_error(self.current.as_ref(), &error);
                Err(error)
            }
        }
    }

    /// Public call of the main module named `path`.
    pub fn find_call(&self, path: &str) -> Result<Option<DescriptorRef>> {
        let main = self.entry.segment;
        Ok(self
            .segments
            .segment(main)?
            .object()
            .find_symbol(path)
            .filter(|s| s.section == LinkageSection::Call && s.index != INVALID_ADDRESS)
            .map(|s| DescriptorRef::new(main, LinkageSection::Call, s.index)))
    }

    /// Free heap objects unreachable from the stacks, statics and
    /// singletons, cycles included. Returns how many were freed.
    pub fn collect_garbage(&self) -> Result<usize> {
        let roots = self.coroutine.roots().chain(self.segments.roots());
        self.heap.collect(roots)
    }

    /// Detach native plugins. The interpreter cannot run afterwards.
    pub fn shutdown(&mut self) -> Result<()> {
        self.state = RunState::Finished;
        self.coroutine.reset();
        self.segments.unload()
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn segments(&self) -> &SegmentManager {
        &self.segments
    }

    pub fn coroutine(&self) -> &StackfulCoroutine {
        &self.coroutine
    }

    pub fn inspector(&self) -> &I {
        &self.inspector
    }

    pub fn inspector_mut(&mut self) -> &mut I {
        &mut self.inspector
    }

    /// Instructions executed so far.
    pub fn instruction_count(&self) -> u64 {
        self.executed
    }

    pub fn is_finished(&self) -> bool {
        self.state == RunState::Finished
    }

    /// Report a terminal unwind and leave the interpreter finished.
    fn finish_with(&mut self, unwind: Unwind) -> InterpreterError {
        let error = match unwind {
            Unwind::Raise(value) => InterpreterError::Uncaught(value.to_string()),
            Unwind::Halt(_) => InterpreterError::invariant("halt escaped the dispatch loop"),
            Unwind::Fatal(error) => error,
        };
        self.inspector.on_error(self.current.as_ref(), &error);
        self.state = RunState::Finished;
        self.coroutine.reset();
        error
    }

    /// Fetch and execute instructions until control returns to call depth
    /// `guard`, execution suspends, or an unwind escapes.
    fn execute(&mut self, guard: usize) -> Flow<Exit> {
        loop {
            if self.executed >= self.limits.exec_fuel {
                return Err(InterpreterError::ExecFuelExhausted(self.limits.exec_fuel).into());
            }

            let nested = self.coroutine.guard_depth() > 0;
            if !nested
                && self.limits.time_slice > 0
                && self.slice_executed >= self.limits.time_slice
            {
                self.slice_executed = 0;
                let interrupt = Interrupt::TimeSlice {
                    executed: self.executed,
                };
                if self.inspector.on_interrupt(&interrupt) {
                    return Ok(Exit::Suspended);
                }
            }

            if !self.coroutine.check_guard() {
                return Err(InterpreterError::invariant("stack guard violated").into());
            }

            let segment = self.coroutine.segment();
            let cell = self
                .segments
                .segment(segment)?
                .object()
                .decode(self.coroutine.ip())?;
            self.current = Some(cell);

            self.inspector.before_op(segment, &cell, &self.coroutine)?;
            self.executed += 1;
            self.slice_executed += 1;
            self.coroutine.jump(cell.next_offset());

            match self.dispatch(&cell, guard) {
                Ok(Step::Continue) => {}
                Ok(Step::Return(value)) => {
                    self.inspector.after_op(segment, &cell, &self.coroutine)?;
                    return Ok(Exit::Returned(value));
                }
                Ok(Step::Suspend) => return Ok(Exit::Suspended),
                Err(Unwind::Raise(value)) => self.unwind(value, cell.offset, guard)?,
                Err(other) => return Err(other),
            }

            self.inspector.after_op(segment, &cell, &self.coroutine)?;
        }
    }
}
