//! Exception unwinding through proc check regions.

use lyric_object::{INVALID_ADDRESS, NO_PARENT_CHECK, ProcLayout};

use super::{BytecodeInterpreter, Flow, Unwind};
use crate::data_cell::{DataCell, SegmentId};
use crate::error::Result;
use crate::inspector::Inspector;
use crate::status::{StatusCode, StatusRef};

impl<I: Inspector> BytecodeInterpreter<I> {
    /// Allocate a status and raise it.
    pub(super) fn raise_status(&self, code: StatusCode, message: impl Into<String>) -> Unwind {
        match self.heap.allocate(StatusRef::new(code, message)) {
            Ok(handle) => Unwind::Raise(DataCell::Ref(handle)),
            Err(error) => Unwind::Fatal(error),
        }
    }

    /// Transfer control to the nearest handler for `value`, popping frames
    /// above call depth `guard` that have none. `offset` is the absolute
    /// offset of the raising instruction.
    ///
    /// Fails with the exception itself when no frame above `guard` catches
    /// it.
    pub(super) fn unwind(&mut self, value: DataCell, offset: u32, guard: usize) -> Flow<()> {
        let mut offset = offset;
        loop {
            if self.coroutine.call_depth() <= guard {
                return Err(Unwind::Raise(value));
            }
            let frame = self.coroutine.peek_call()?;
            let proc = frame.proc.clone();
            let segment = frame.segment();
            let frame_top = frame.frame_top();

            if let Some(catch_offset) = self.find_handler(segment, &proc, offset, &value)? {
                self.coroutine.truncate_data(frame_top);
                self.coroutine.push_data(value);
                self.coroutine.transfer(segment, proc.code_offset + catch_offset);
                return Ok(());
            }

            let frame = self.coroutine.pop_call()?;
            self.coroutine.truncate_data(frame.base);
            self.coroutine
                .transfer(frame.return_segment, frame.return_ip);
            // Any offset inside the calling instruction selects its check.
            offset = frame.return_ip.saturating_sub(1);
        }
    }

    /// Catch offset of the first exception, innermost check first, whose
    /// type matches `value`.
    fn find_handler(
        &mut self,
        segment: SegmentId,
        proc: &ProcLayout,
        offset: u32,
        value: &DataCell,
    ) -> Result<Option<u32>> {
        let Some((mut index, _)) = proc.innermost_check(offset) else {
            return Ok(None);
        };
        for _ in 0..proc.checks.len() {
            let Some(check) = proc.checks.get(index) else {
                return Ok(None);
            };
            for exception in proc.check_exceptions(check) {
                if exception.exception_type == INVALID_ADDRESS {
                    return Ok(Some(exception.catch_offset));
                }
                let ty = self
                    .types
                    .resolve(&self.segments, segment, exception.exception_type)?;
                if self.types.value_matches(&mut self.segments, value, ty)? {
                    return Ok(Some(exception.catch_offset));
                }
            }
            if check.parent_check == NO_PARENT_CHECK {
                return Ok(None);
            }
            index = check.parent_check as usize;
        }
        Ok(None)
    }
}
