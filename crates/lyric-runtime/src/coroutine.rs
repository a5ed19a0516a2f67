//! One thread of bytecode execution: call stack, data stack, guard stack.

use std::rc::Rc;

use lyric_object::ProcLayout;

use crate::data_cell::{DataCell, DescriptorRef, SegmentId};
use crate::error::{InterpreterError, Result};

/// Activation record of one proc.
///
/// Arguments occupy the data stack from `base`, locals follow them, and the
/// operand stack of the activation starts after the locals.
#[derive(Debug, Clone)]
pub struct CallCell {
    pub call: DescriptorRef,
    pub proc: Rc<ProcLayout>,
    pub base: usize,
    pub rest: Vec<DataCell>,
    pub receiver: Option<DataCell>,
    /// Instance pushed in place of the result when the call is a constructor
    /// run by `NEW`.
    pub constructed: Option<DataCell>,
    pub return_segment: SegmentId,
    pub return_ip: u32,
}

impl CallCell {
    pub fn segment(&self) -> SegmentId {
        self.call.segment
    }

    pub fn num_arguments(&self) -> usize {
        self.proc.num_arguments as usize
    }

    pub fn num_locals(&self) -> usize {
        self.proc.num_locals as usize
    }

    pub fn locals_base(&self) -> usize {
        self.base + self.num_arguments()
    }

    /// First operand slot above the locals.
    pub fn frame_top(&self) -> usize {
        self.locals_base() + self.num_locals()
    }
}

#[derive(Debug, Default)]
pub struct StackfulCoroutine {
    call_stack: Vec<CallCell>,
    data_stack: Vec<DataCell>,
    guard_stack: Vec<usize>,
    segment: SegmentId,
    ip: u32,
    suspended: bool,
}

impl StackfulCoroutine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ip(&self) -> u32 {
        self.ip
    }

    pub fn segment(&self) -> SegmentId {
        self.segment
    }

    /// Transfer control to `ip` in `segment`.
    pub fn transfer(&mut self, segment: SegmentId, ip: u32) {
        self.segment = segment;
        self.ip = ip;
    }

    /// Move the IP within the current segment.
    pub fn jump(&mut self, ip: u32) {
        self.ip = ip;
    }

    pub fn push_call(&mut self, cell: CallCell) {
        self.call_stack.push(cell);
    }

    pub fn pop_call(&mut self) -> Result<CallCell> {
        self.call_stack
            .pop()
            .ok_or_else(|| InterpreterError::invariant("call stack underflow"))
    }

    pub fn peek_call(&self) -> Result<&CallCell> {
        self.call_stack
            .last()
            .ok_or_else(|| InterpreterError::invariant("no active call"))
    }

    pub fn peek_call_mut(&mut self) -> Result<&mut CallCell> {
        self.call_stack
            .last_mut()
            .ok_or_else(|| InterpreterError::invariant("no active call"))
    }

    pub fn call_depth(&self) -> usize {
        self.call_stack.len()
    }

    /// Activations from the outermost to the innermost.
    pub fn calls(&self) -> &[CallCell] {
        &self.call_stack
    }

    pub fn push_data(&mut self, cell: DataCell) {
        self.data_stack.push(cell);
    }

    pub fn pop_data(&mut self) -> Result<DataCell> {
        self.data_stack
            .pop()
            .ok_or_else(|| InterpreterError::stack("data stack underflow"))
    }

    /// Pop `n` cells, returned in push order.
    pub fn pop_data_n(&mut self, n: usize) -> Result<Vec<DataCell>> {
        let len = self.data_stack.len();
        if n > len {
            return Err(InterpreterError::stack(format!(
                "cannot pop {n} cells from a stack of {len}"
            )));
        }
        Ok(self.data_stack.split_off(len - n))
    }

    /// Cell `offset` places below the top; `0` is the top.
    pub fn peek_data(&self, offset: usize) -> Result<&DataCell> {
        let len = self.data_stack.len();
        if offset >= len {
            return Err(InterpreterError::stack(format!(
                "peek offset {offset} beyond stack of {len}"
            )));
        }
        Ok(&self.data_stack[len - 1 - offset])
    }

    pub fn data_len(&self) -> usize {
        self.data_stack.len()
    }

    pub fn data(&self, index: usize) -> Result<&DataCell> {
        self.data_stack
            .get(index)
            .ok_or_else(|| InterpreterError::stack(format!("no stack slot {index}")))
    }

    /// Replace the cell at absolute `index`, returning the previous value.
    pub fn set_data(&mut self, index: usize, cell: DataCell) -> Result<DataCell> {
        let slot = self
            .data_stack
            .get_mut(index)
            .ok_or_else(|| InterpreterError::stack(format!("no stack slot {index}")))?;
        Ok(std::mem::replace(slot, cell))
    }

    pub fn remove_data(&mut self, index: usize) -> Result<DataCell> {
        if index >= self.data_stack.len() {
            return Err(InterpreterError::stack(format!("no stack slot {index}")));
        }
        Ok(self.data_stack.remove(index))
    }

    pub fn truncate_data(&mut self, len: usize) {
        self.data_stack.truncate(len);
    }

    pub fn data_stack(&self) -> &[DataCell] {
        &self.data_stack
    }

    /// Mark the current call depth as the floor of a nested run.
    pub fn push_guard(&mut self, depth: usize) {
        self.guard_stack.push(depth);
    }

    pub fn pop_guard(&mut self) -> Result<usize> {
        self.guard_stack
            .pop()
            .ok_or_else(|| InterpreterError::invariant("guard stack underflow"))
    }

    pub fn peek_guard(&self) -> Option<usize> {
        self.guard_stack.last().copied()
    }

    pub fn guard_depth(&self) -> usize {
        self.guard_stack.len()
    }

    /// Whether the innermost guard still lies within the call stack.
    pub fn check_guard(&self) -> bool {
        self.peek_guard()
            .is_none_or(|guard| guard <= self.call_stack.len())
    }

    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    pub fn resume(&mut self) -> Result<()> {
        if !self.suspended {
            return Err(InterpreterError::invariant("coroutine is not suspended"));
        }
        self.suspended = false;
        Ok(())
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Every value the coroutine keeps alive.
    pub fn roots(&self) -> impl Iterator<Item = &DataCell> {
        let frames = self.call_stack.iter().flat_map(|call| {
            call.rest
                .iter()
                .chain(call.receiver.iter())
                .chain(call.constructed.iter())
        });
        self.data_stack.iter().chain(frames)
    }

    /// Drop all activations and values.
    pub fn reset(&mut self) {
        self.call_stack.clear();
        self.data_stack.clear();
        self.guard_stack.clear();
        self.suspended = false;
    }
}
