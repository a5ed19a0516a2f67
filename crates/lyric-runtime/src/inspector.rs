//! Execution hooks.
//!
//! The interpreter is generic over its [`Inspector`]. [`NoopInspector`]
//! compiles away entirely; [`PrintInspector`] collects a line per event for
//! `--trace` output and tests.

use lyric_object::{OpCell, format_op};

use crate::coroutine::StackfulCoroutine;
use crate::data_cell::{DataCell, SegmentId};
use crate::error::{InterpreterError, Result};

/// Why execution is about to pause.
#[derive(Debug, Clone, PartialEq)]
pub enum Interrupt {
    /// An `INTERRUPT` instruction, with the value it popped.
    Instruction(DataCell),
    /// The time slice ran out after `executed` instructions.
    TimeSlice { executed: u64 },
}

pub trait Inspector {
    /// Called before each instruction. An error stops execution.
    fn before_op(
        &mut self,
        segment: SegmentId,
        cell: &OpCell,
        coroutine: &StackfulCoroutine,
    ) -> Result<()>;

    fn after_op(
        &mut self,
        segment: SegmentId,
        cell: &OpCell,
        coroutine: &StackfulCoroutine,
    ) -> Result<()>;

    fn on_error(&mut self, cell: Option<&OpCell>, error: &InterpreterError);

    fn on_halt(&mut self, result: &DataCell);

    /// Whether to suspend. Instruction interrupts always suspend.
    fn on_interrupt(&mut self, interrupt: &Interrupt) -> bool;
}

pub struct NoopInspector;

impl Inspector for NoopInspector {
    #[inline(always)]
    fn before_op(&mut self, _: SegmentId, _: &OpCell, _: &StackfulCoroutine) -> Result<()> {
        Ok(())
    }

    #[inline(always)]
    fn after_op(&mut self, _: SegmentId, _: &OpCell, _: &StackfulCoroutine) -> Result<()> {
        Ok(())
    }

    #[inline(always)]
    fn on_error(&mut self, _: Option<&OpCell>, _: &InterpreterError) {}

    #[inline(always)]
    fn on_halt(&mut self, _: &DataCell) {}

    #[inline(always)]
    fn on_interrupt(&mut self, _: &Interrupt) -> bool {
        false
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Verbosity {
    /// One line per instruction.
    #[default]
    Default,
    /// Also the operand stack after each instruction.
    Verbose,
}

/// Collects a textual trace.
#[derive(Debug, Default)]
pub struct PrintInspector {
    verbosity: Verbosity,
    suspend_on_time_slice: bool,
    lines: Vec<String>,
}

impl PrintInspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Suspend when a time slice runs out instead of continuing.
    pub fn suspend_on_time_slice(mut self, suspend: bool) -> Self {
        self.suspend_on_time_slice = suspend;
        self
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn output(&self) -> String {
        self.lines.join("\n")
    }
}

impl Inspector for PrintInspector {
    fn before_op(
        &mut self,
        segment: SegmentId,
        cell: &OpCell,
        coroutine: &StackfulCoroutine,
    ) -> Result<()> {
        let code_offset = coroutine
            .peek_call()
            .map(|call| call.proc.code_offset)
            .unwrap_or(0);
        let rel = cell.offset.saturating_sub(code_offset);
        self.lines.push(format!(
            "{segment}:{rel:04} {}{}",
            "  ".repeat(coroutine.call_depth().saturating_sub(1)),
            format_op(cell, code_offset)
        ));
        Ok(())
    }

    fn after_op(
        &mut self,
        _segment: SegmentId,
        _cell: &OpCell,
        coroutine: &StackfulCoroutine,
    ) -> Result<()> {
        if self.verbosity == Verbosity::Verbose {
            let stack: Vec<String> = coroutine
                .data_stack()
                .iter()
                .map(DataCell::to_string)
                .collect();
            self.lines.push(format!("       [{}]", stack.join(", ")));
        }
        Ok(())
    }

    fn on_error(&mut self, cell: Option<&OpCell>, error: &InterpreterError) {
        match cell {
            Some(cell) => self
                .lines
                .push(format!("error at {}: {error}", cell.opcode.mnemonic())),
            None => self.lines.push(format!("error: {error}")),
        }
    }

    fn on_halt(&mut self, result: &DataCell) {
        self.lines.push(format!("halt {result}"));
    }

    fn on_interrupt(&mut self, interrupt: &Interrupt) -> bool {
        match interrupt {
            Interrupt::Instruction(value) => {
                self.lines.push(format!("interrupt {value}"));
                true
            }
            Interrupt::TimeSlice { executed } => {
                self.lines.push(format!("time slice after {executed}"));
                self.suspend_on_time_slice
            }
        }
    }
}
