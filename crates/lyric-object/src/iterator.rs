use super::error::Result;
use super::instruction::OpCell;

/// Sequential decoder over a range of bytecode.
///
/// Yields `Err` once and stops when an instruction fails to decode.
pub struct BytecodeIterator<'a> {
    code: &'a [u8],
    offset: u32,
    end: u32,
    failed: bool,
}

impl<'a> BytecodeIterator<'a> {
    pub fn new(code: &'a [u8], start: u32, end: u32) -> Self {
        Self {
            code,
            offset: start,
            end: end.min(code.len() as u32),
            failed: false,
        }
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }
}

impl Iterator for BytecodeIterator<'_> {
    type Item = Result<OpCell>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.end {
            return None;
        }
        match OpCell::decode(&self.code[..self.end as usize], self.offset) {
            Ok(cell) => {
                self.offset = cell.next_offset();
                Some(Ok(cell))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
