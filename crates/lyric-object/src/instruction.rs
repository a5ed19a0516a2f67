//! Instruction decoding and encoding.
//!
//! An instruction is one opcode byte followed by little-endian operands
//! laid out per [`OperandLayout`]. Jump operands are relative to the
//! offset of the next instruction.

use super::error::{ObjectError, Result};
use super::opcode::{Opcode, OperandLayout};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Operands {
    None,
    I64(i64),
    Dbl(f64),
    Chr(char),
    Address(u32),
    Type(u8),
    FlagsAddress { flags: u8, address: u32 },
    FlagsAddressPlacement { flags: u8, address: u32, placement: u16 },
    Offset(u16),
    Jump(i16),
}

impl Operands {
    pub fn layout(&self) -> OperandLayout {
        match self {
            Self::None => OperandLayout::None,
            Self::I64(_) => OperandLayout::ImmediateI64,
            Self::Dbl(_) => OperandLayout::ImmediateDbl,
            Self::Chr(_) => OperandLayout::ImmediateChr,
            Self::Address(_) => OperandLayout::AddressU32,
            Self::Type(_) => OperandLayout::TypeU8,
            Self::FlagsAddress { .. } => OperandLayout::FlagsAddress,
            Self::FlagsAddressPlacement { .. } => OperandLayout::FlagsAddressPlacement,
            Self::Offset(_) => OperandLayout::OffsetU16,
            Self::Jump(_) => OperandLayout::JumpI16,
        }
    }
}

/// A decoded instruction and the bytecode offset it was read from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OpCell {
    pub opcode: Opcode,
    pub operands: Operands,
    pub offset: u32,
}

#[inline]
fn le<const N: usize>(bytes: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[at..at + N]);
    out
}

impl OpCell {
    pub fn new(opcode: Opcode, operands: Operands) -> Self {
        Self {
            opcode,
            operands,
            offset: 0,
        }
    }

    /// Decode the instruction at `offset` in `code`.
    pub fn decode(code: &[u8], offset: u32) -> Result<Self> {
        let at = offset as usize;
        let Some(&byte) = code.get(at) else {
            return Err(ObjectError::TruncatedInstruction(offset));
        };
        let opcode = Opcode::from_u8(byte).ok_or(ObjectError::InvalidOpcode {
            opcode: byte,
            offset,
        })?;
        if at + opcode.size() > code.len() {
            return Err(ObjectError::TruncatedInstruction(offset));
        }

        let p = at + 1;
        let operands = match opcode.layout() {
            OperandLayout::None => Operands::None,
            OperandLayout::ImmediateI64 => Operands::I64(i64::from_le_bytes(le(code, p))),
            OperandLayout::ImmediateDbl => Operands::Dbl(f64::from_le_bytes(le(code, p))),
            OperandLayout::ImmediateChr => {
                let raw = u32::from_le_bytes(le(code, p));
                Operands::Chr(char::from_u32(raw).ok_or(ObjectError::InvalidOperand(offset))?)
            }
            OperandLayout::AddressU32 => Operands::Address(u32::from_le_bytes(le(code, p))),
            OperandLayout::TypeU8 => Operands::Type(code[p]),
            OperandLayout::FlagsAddress => Operands::FlagsAddress {
                flags: code[p],
                address: u32::from_le_bytes(le(code, p + 1)),
            },
            OperandLayout::FlagsAddressPlacement => Operands::FlagsAddressPlacement {
                flags: code[p],
                address: u32::from_le_bytes(le(code, p + 1)),
                placement: u16::from_le_bytes(le(code, p + 5)),
            },
            OperandLayout::OffsetU16 => Operands::Offset(u16::from_le_bytes(le(code, p))),
            OperandLayout::JumpI16 => Operands::Jump(i16::from_le_bytes(le(code, p))),
        };

        Ok(Self {
            opcode,
            operands,
            offset,
        })
    }

    /// Append the encoded instruction to `out`.
    ///
    /// Fails when the operands do not match the opcode's layout.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        if self.operands.layout() != self.opcode.layout() {
            return Err(ObjectError::InvalidOperand(out.len() as u32));
        }
        out.push(self.opcode as u8);
        match self.operands {
            Operands::None => {}
            Operands::I64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Operands::Dbl(v) => out.extend_from_slice(&v.to_le_bytes()),
            Operands::Chr(c) => out.extend_from_slice(&(c as u32).to_le_bytes()),
            Operands::Address(a) => out.extend_from_slice(&a.to_le_bytes()),
            Operands::Type(t) => out.push(t),
            Operands::FlagsAddress { flags, address } => {
                out.push(flags);
                out.extend_from_slice(&address.to_le_bytes());
            }
            Operands::FlagsAddressPlacement {
                flags,
                address,
                placement,
            } => {
                out.push(flags);
                out.extend_from_slice(&address.to_le_bytes());
                out.extend_from_slice(&placement.to_le_bytes());
            }
            Operands::Offset(o) => out.extend_from_slice(&o.to_le_bytes()),
            Operands::Jump(j) => out.extend_from_slice(&j.to_le_bytes()),
        }
        Ok(())
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.opcode.size()
    }

    /// Offset of the instruction that follows this one.
    #[inline]
    pub fn next_offset(&self) -> u32 {
        self.offset + self.size() as u32
    }

    /// Absolute target of a branch instruction.
    pub fn jump_target(&self) -> Option<u32> {
        match self.operands {
            Operands::Jump(delta) => {
                let target = self.next_offset() as i64 + delta as i64;
                u32::try_from(target).ok()
            }
            _ => None,
        }
    }
}
