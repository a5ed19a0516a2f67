//! Proc layout in the bytecode section.
//!
//! ```text
//! u32 size | u16 num_arguments | u16 num_locals | u16 num_lexicals | u32 trailer_size
//! lexicals   (num_lexicals x 9 bytes)
//! code       (size - header - lexicals - trailer)
//! trailer:   u16 num_checks | u16 num_exceptions | u16 num_cleanups
//!            checks (14 bytes) | exceptions (12 bytes) | cleanups (8 bytes)
//! ```
//!
//! `size` covers the whole proc, header included. Check and exception
//! offsets are relative to the start of the code.

use super::address::Address;
use super::error::{ObjectError, Result};

pub const PROC_HEADER_SIZE: usize = 14;

const LEXICAL_SIZE: usize = 9;
const TRAILER_HEADER_SIZE: usize = 6;
const CHECK_SIZE: usize = 14;
const EXCEPTION_SIZE: usize = 12;
const CLEANUP_SIZE: usize = 8;

/// No enclosing check.
pub const NO_PARENT_CHECK: u16 = 0xFFFF;

/// Lexical target kinds.
pub const LEXICAL_ARGUMENT: u8 = 1;
pub const LEXICAL_LOCAL: u8 = 2;

/// A variable captured from an enclosing activation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcLexical {
    /// Call whose nearest active frame holds the variable.
    pub activation_call: Address,
    pub target_offset: u32,
    /// [`LEXICAL_ARGUMENT`] or [`LEXICAL_LOCAL`].
    pub lexical_target: u8,
}

/// Protected code interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcCheck {
    pub interval_offset: u32,
    pub interval_size: u32,
    pub parent_check: u16,
    pub first_exception: u16,
    pub num_exceptions: u16,
}

impl ProcCheck {
    #[inline]
    pub fn contains(&self, code_offset: u32) -> bool {
        code_offset >= self.interval_offset
            && code_offset - self.interval_offset < self.interval_size
    }
}

/// Typed catch target of a check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcException {
    /// Type index, or `INVALID_ADDRESS` to catch anything.
    pub exception_type: u32,
    pub catch_offset: u32,
    pub catch_size: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcCleanup {
    pub cleanup_offset: u32,
    pub cleanup_size: u32,
}

/// Everything needed to encode one proc.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcInfo {
    pub num_arguments: u16,
    pub num_locals: u16,
    pub lexicals: Vec<ProcLexical>,
    pub code: Vec<u8>,
    pub checks: Vec<ProcCheck>,
    pub exceptions: Vec<ProcException>,
    pub cleanups: Vec<ProcCleanup>,
}

/// Append an encoded proc to `out`, returning the proc's offset.
pub fn encode_proc(info: &ProcInfo, out: &mut Vec<u8>) -> Result<u32> {
    let offset = out.len() as u32;
    let invalid = |reason: &str| ObjectError::InvalidProc {
        offset,
        reason: reason.to_owned(),
    };

    let num_lexicals = u16::try_from(info.lexicals.len()).map_err(|_| invalid("too many lexicals"))?;
    let num_checks = u16::try_from(info.checks.len()).map_err(|_| invalid("too many checks"))?;
    let num_exceptions =
        u16::try_from(info.exceptions.len()).map_err(|_| invalid("too many exceptions"))?;
    let num_cleanups =
        u16::try_from(info.cleanups.len()).map_err(|_| invalid("too many cleanups"))?;

    let trailer_size = TRAILER_HEADER_SIZE
        + info.checks.len() * CHECK_SIZE
        + info.exceptions.len() * EXCEPTION_SIZE
        + info.cleanups.len() * CLEANUP_SIZE;
    let size = PROC_HEADER_SIZE + info.lexicals.len() * LEXICAL_SIZE + info.code.len() + trailer_size;
    let size = u32::try_from(size).map_err(|_| invalid("proc too large"))?;

    for check in &info.checks {
        let end = check.interval_offset as usize + check.interval_size as usize;
        if end > info.code.len() {
            return Err(invalid("check interval past end of code"));
        }
        if check.first_exception as usize + check.num_exceptions as usize > info.exceptions.len() {
            return Err(invalid("check refers to missing exceptions"));
        }
    }

    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(&info.num_arguments.to_le_bytes());
    out.extend_from_slice(&info.num_locals.to_le_bytes());
    out.extend_from_slice(&num_lexicals.to_le_bytes());
    out.extend_from_slice(&(trailer_size as u32).to_le_bytes());

    for lexical in &info.lexicals {
        out.extend_from_slice(&lexical.activation_call.to_le_bytes());
        out.extend_from_slice(&lexical.target_offset.to_le_bytes());
        out.push(lexical.lexical_target);
    }

    out.extend_from_slice(&info.code);

    out.extend_from_slice(&num_checks.to_le_bytes());
    out.extend_from_slice(&num_exceptions.to_le_bytes());
    out.extend_from_slice(&num_cleanups.to_le_bytes());
    for check in &info.checks {
        out.extend_from_slice(&check.interval_offset.to_le_bytes());
        out.extend_from_slice(&check.interval_size.to_le_bytes());
        out.extend_from_slice(&check.parent_check.to_le_bytes());
        out.extend_from_slice(&check.first_exception.to_le_bytes());
        out.extend_from_slice(&check.num_exceptions.to_le_bytes());
    }
    for exception in &info.exceptions {
        out.extend_from_slice(&exception.exception_type.to_le_bytes());
        out.extend_from_slice(&exception.catch_offset.to_le_bytes());
        out.extend_from_slice(&exception.catch_size.to_le_bytes());
    }
    for cleanup in &info.cleanups {
        out.extend_from_slice(&cleanup.cleanup_offset.to_le_bytes());
        out.extend_from_slice(&cleanup.cleanup_size.to_le_bytes());
    }

    Ok(offset)
}

/// Parsed proc header and trailer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcLayout {
    pub offset: u32,
    pub size: u32,
    pub num_arguments: u16,
    pub num_locals: u16,
    pub lexicals: Vec<ProcLexical>,
    /// Absolute offset of the first instruction in the bytecode section.
    pub code_offset: u32,
    pub code_size: u32,
    pub checks: Vec<ProcCheck>,
    pub exceptions: Vec<ProcException>,
    pub cleanups: Vec<ProcCleanup>,
}

struct Cursor<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl Cursor<'_> {
    fn u8(&mut self) -> u8 {
        let v = self.bytes[self.at];
        self.at += 1;
        v
    }

    fn u16(&mut self) -> u16 {
        let v = u16::from_le_bytes([self.bytes[self.at], self.bytes[self.at + 1]]);
        self.at += 2;
        v
    }

    fn u32(&mut self) -> u32 {
        let b = &self.bytes[self.at..self.at + 4];
        self.at += 4;
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }
}

impl ProcLayout {
    /// Parse the proc starting at `offset` in the bytecode section.
    pub fn parse(bytecode: &[u8], offset: u32) -> Result<Self> {
        let invalid = |reason: &str| ObjectError::InvalidProc {
            offset,
            reason: reason.to_owned(),
        };
        let start = offset as usize;
        if start + PROC_HEADER_SIZE > bytecode.len() {
            return Err(invalid("header past end of bytecode"));
        }

        let mut cur = Cursor {
            bytes: bytecode,
            at: start,
        };
        let size = cur.u32();
        let num_arguments = cur.u16();
        let num_locals = cur.u16();
        let num_lexicals = cur.u16() as usize;
        let trailer_size = cur.u32() as usize;

        let end = start + size as usize;
        let lexicals_size = num_lexicals * LEXICAL_SIZE;
        if end > bytecode.len() {
            return Err(invalid("size past end of bytecode"));
        }
        if PROC_HEADER_SIZE + lexicals_size + trailer_size > size as usize
            || trailer_size < TRAILER_HEADER_SIZE
        {
            return Err(invalid("inconsistent section sizes"));
        }

        let lexicals = (0..num_lexicals)
            .map(|_| ProcLexical {
                activation_call: cur.u32(),
                target_offset: cur.u32(),
                lexical_target: cur.u8(),
            })
            .collect();

        let code_offset = cur.at as u32;
        let code_size = (size as usize - PROC_HEADER_SIZE - lexicals_size - trailer_size) as u32;

        cur.at = end - trailer_size;
        let num_checks = cur.u16() as usize;
        let num_exceptions = cur.u16() as usize;
        let num_cleanups = cur.u16() as usize;
        let expected = TRAILER_HEADER_SIZE
            + num_checks * CHECK_SIZE
            + num_exceptions * EXCEPTION_SIZE
            + num_cleanups * CLEANUP_SIZE;
        if expected != trailer_size {
            return Err(invalid("trailer size mismatch"));
        }

        let checks = (0..num_checks)
            .map(|_| ProcCheck {
                interval_offset: cur.u32(),
                interval_size: cur.u32(),
                parent_check: cur.u16(),
                first_exception: cur.u16(),
                num_exceptions: cur.u16(),
            })
            .collect();
        let exceptions = (0..num_exceptions)
            .map(|_| ProcException {
                exception_type: cur.u32(),
                catch_offset: cur.u32(),
                catch_size: cur.u32(),
            })
            .collect();
        let cleanups = (0..num_cleanups)
            .map(|_| ProcCleanup {
                cleanup_offset: cur.u32(),
                cleanup_size: cur.u32(),
            })
            .collect();

        Ok(Self {
            offset,
            size,
            num_arguments,
            num_locals,
            lexicals,
            code_offset,
            code_size,
            checks,
            exceptions,
            cleanups,
        })
    }

    #[inline]
    pub fn code_end(&self) -> u32 {
        self.code_offset + self.code_size
    }

    /// Whether an absolute bytecode offset falls inside this proc's code.
    #[inline]
    pub fn contains(&self, ip: u32) -> bool {
        ip >= self.code_offset && ip < self.code_end()
    }

    /// Innermost check whose interval covers the absolute offset `ip`.
    pub fn innermost_check(&self, ip: u32) -> Option<(usize, &ProcCheck)> {
        let rel = ip.checked_sub(self.code_offset)?;
        self.checks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.contains(rel))
            .min_by_key(|(_, c)| c.interval_size)
    }

    /// Exceptions registered on a check.
    pub fn check_exceptions(&self, check: &ProcCheck) -> &[ProcException] {
        let first = check.first_exception as usize;
        let last = (first + check.num_exceptions as usize).min(self.exceptions.len());
        &self.exceptions[first.min(last)..last]
    }
}
