//! Bytecode with symbolic operands.
//!
//! Procs are emitted into [`CodeFragment`]s whose instructions refer to
//! symbols by url and to branch targets by [`Label`]. Layout happens when the
//! object is written: label offsets are computed from fixed instruction
//! sizes, then every operand is resolved through an [`OperandResolver`].

use std::collections::BTreeMap;

use lyric_common::SymbolUrl;
use lyric_object::{Address, OpCell, Opcode, Operands};

use crate::error::{AssemblerError, Result};

/// Symbolic branch target, resolved to a code offset at layout time.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Label(pub u32);

impl Label {
    #[inline]
    pub fn resolve(self, map: &BTreeMap<Label, u32>) -> Result<u32> {
        map.get(&self)
            .copied()
            .ok_or_else(|| AssemblerError::invariant(format!("label {} was never placed", self.0)))
    }
}

/// Constant stored in the object's literal table.
#[derive(Clone, Debug, PartialEq)]
pub enum LiteralValue {
    Nil,
    Undef,
    Bool(bool),
    I64(i64),
    Dbl(f64),
    Chr(char),
    Utf8(String),
}

/// Operand as emitted, before symbol addresses are known.
#[derive(Clone, Debug, PartialEq)]
pub enum PendingOperand {
    None,
    I64(i64),
    Dbl(f64),
    Chr(char),
    Type(u8),
    Offset(u16),
    Literal(LiteralValue),
    /// Argument, local or lexical slot; resolved without the writer.
    Slot { flags: u8, index: u32 },
    /// Descriptor reference, e.g. `LOAD FIELD` or `DESCRIPTOR`.
    Symbol { flags: u8, url: SymbolUrl },
    /// Call or construction with an argument count.
    Invoke {
        flags: u8,
        url: SymbolUrl,
        placement: u16,
    },
    Trap { flags: u8, index: u32 },
}

impl PendingOperand {
    pub fn symbol(&self) -> Option<&SymbolUrl> {
        match self {
            Self::Symbol { url, .. } | Self::Invoke { url, .. } => Some(url),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FragmentItem {
    Op {
        opcode: Opcode,
        operand: PendingOperand,
    },
    Label(Label),
    Jump {
        opcode: Opcode,
        target: Label,
    },
    Fragment(CodeFragment),
}

/// Resolves symbolic operands while a fragment is assembled.
pub trait OperandResolver {
    fn symbol_address(&mut self, url: &SymbolUrl) -> Result<Address>;
    fn literal_address(&mut self, literal: &LiteralValue) -> Result<Address>;
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CodeFragment {
    items: Vec<FragmentItem>,
}

impl CodeFragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[FragmentItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.iter().all(|item| match item {
            FragmentItem::Fragment(inner) => inner.is_empty(),
            FragmentItem::Label(_) => true,
            _ => false,
        })
    }

    pub fn emit(&mut self, opcode: Opcode) {
        self.emit_with(opcode, PendingOperand::None);
    }

    pub fn emit_with(&mut self, opcode: Opcode, operand: PendingOperand) {
        self.items.push(FragmentItem::Op { opcode, operand });
    }

    pub fn emit_jump(&mut self, opcode: Opcode, target: Label) {
        self.items.push(FragmentItem::Jump { opcode, target });
    }

    pub fn place_label(&mut self, label: Label) {
        self.items.push(FragmentItem::Label(label));
    }

    pub fn append_fragment(&mut self, fragment: CodeFragment) {
        self.items.push(FragmentItem::Fragment(fragment));
    }

    /// Opcode of the last instruction, looking through nested fragments.
    pub fn last_opcode(&self) -> Option<Opcode> {
        self.items.iter().rev().find_map(|item| match item {
            FragmentItem::Op { opcode, .. } | FragmentItem::Jump { opcode, .. } => Some(*opcode),
            FragmentItem::Fragment(inner) => inner.last_opcode(),
            FragmentItem::Label(_) => None,
        })
    }

    /// Every symbol referenced by an operand.
    pub fn symbol_references(&self) -> Vec<&SymbolUrl> {
        let mut out = Vec::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols<'a>(&'a self, out: &mut Vec<&'a SymbolUrl>) {
        for item in &self.items {
            match item {
                FragmentItem::Op { operand, .. } => out.extend(operand.symbol()),
                FragmentItem::Fragment(inner) => inner.collect_symbols(out),
                FragmentItem::Label(_) | FragmentItem::Jump { .. } => {}
            }
        }
    }

    /// Nested fragments spliced in place.
    pub fn flatten(self) -> Vec<FragmentItem> {
        let mut out = Vec::with_capacity(self.items.len());
        flatten_into(self.items, &mut out);
        out
    }

    pub fn from_items(items: Vec<FragmentItem>) -> Self {
        Self { items }
    }

    /// Lay out the fragment and encode it.
    pub fn assemble(&self, resolver: &mut dyn OperandResolver) -> Result<AssembledCode> {
        let items = self.clone().flatten();

        let mut labels = BTreeMap::new();
        let mut offset = 0u32;
        for item in &items {
            match item {
                FragmentItem::Label(label) => {
                    if labels.insert(*label, offset).is_some() {
                        return Err(AssemblerError::invariant(format!(
                            "label {} placed twice",
                            label.0
                        )));
                    }
                }
                FragmentItem::Op { opcode, .. } | FragmentItem::Jump { opcode, .. } => {
                    offset += opcode.size() as u32;
                }
                FragmentItem::Fragment(_) => {}
            }
        }

        let mut code = Vec::with_capacity(offset as usize);
        for item in &items {
            let cell = match item {
                FragmentItem::Label(_) | FragmentItem::Fragment(_) => continue,
                FragmentItem::Op { opcode, operand } => {
                    let operands = resolve_operand(operand, resolver)?;
                    OpCell::new(*opcode, operands)
                }
                FragmentItem::Jump { opcode, target } => {
                    let next = code.len() as i64 + opcode.size() as i64;
                    let delta = i64::from(target.resolve(&labels)?) - next;
                    let delta = i16::try_from(delta).map_err(|_| {
                        AssemblerError::invariant(format!("jump distance {delta} out of range"))
                    })?;
                    OpCell::new(*opcode, Operands::Jump(delta))
                }
            };
            cell.encode(&mut code)?;
        }

        Ok(AssembledCode { code, labels })
    }
}

fn flatten_into(items: Vec<FragmentItem>, out: &mut Vec<FragmentItem>) {
    for item in items {
        match item {
            FragmentItem::Fragment(inner) => flatten_into(inner.items, out),
            other => out.push(other),
        }
    }
}

fn resolve_operand(operand: &PendingOperand, resolver: &mut dyn OperandResolver) -> Result<Operands> {
    let resolved = match operand {
        PendingOperand::None => Operands::None,
        PendingOperand::I64(v) => Operands::I64(*v),
        PendingOperand::Dbl(v) => Operands::Dbl(*v),
        PendingOperand::Chr(v) => Operands::Chr(*v),
        PendingOperand::Type(v) => Operands::Type(*v),
        PendingOperand::Offset(v) => Operands::Offset(*v),
        PendingOperand::Literal(literal) => Operands::Address(resolver.literal_address(literal)?),
        PendingOperand::Slot { flags, index } => Operands::FlagsAddress {
            flags: *flags,
            address: *index,
        },
        PendingOperand::Symbol { flags, url } => Operands::FlagsAddress {
            flags: *flags,
            address: resolver.symbol_address(url)?,
        },
        PendingOperand::Invoke {
            flags,
            url,
            placement,
        } => Operands::FlagsAddressPlacement {
            flags: *flags,
            address: resolver.symbol_address(url)?,
            placement: *placement,
        },
        PendingOperand::Trap { flags, index } => Operands::FlagsAddress {
            flags: *flags,
            address: *index,
        },
    };
    Ok(resolved)
}

/// Encoded code plus the offset of every placed label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssembledCode {
    pub code: Vec<u8>,
    pub labels: BTreeMap<Label, u32>,
}
