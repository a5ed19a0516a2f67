//! Per-call emission state.

use lyric_common::{SymbolUrl, TypeDef};

use crate::block::BlockAddress;
use crate::code::{CodeFragment, Label};
use crate::error::{AssemblerError, Result};

/// Variable captured from an enclosing proc's frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LexicalRef {
    /// Call whose nearest active frame holds the variable.
    pub activation_call: SymbolUrl,
    pub target_offset: u32,
    /// `LEXICAL_ARGUMENT` or `LEXICAL_LOCAL`.
    pub target_kind: u8,
    /// The captured variable symbol.
    pub target: SymbolUrl,
}

/// Typed catch handler of a protected region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatchRegion {
    /// `None` catches anything.
    pub exception_type: Option<TypeDef>,
    pub start: Label,
    pub end: Label,
}

/// Protected code interval with its handlers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckRegion {
    pub start: Label,
    pub end: Label,
    pub parent: Option<usize>,
    pub catches: Vec<CatchRegion>,
}

#[derive(Clone, Debug)]
pub struct ProcHandle {
    call: SymbolUrl,
    block: BlockAddress,
    num_arguments: u16,
    num_locals: u16,
    lexicals: Vec<LexicalRef>,
    code: CodeFragment,
    next_label: u32,
    checks: Vec<CheckRegion>,
    exit_types: Vec<TypeDef>,
}

impl ProcHandle {
    pub fn new(call: SymbolUrl, block: BlockAddress) -> Self {
        Self {
            call,
            block,
            num_arguments: 0,
            num_locals: 0,
            lexicals: Vec::new(),
            code: CodeFragment::new(),
            next_label: 0,
            checks: Vec::new(),
            exit_types: Vec::new(),
        }
    }

    pub fn call(&self) -> &SymbolUrl {
        &self.call
    }

    pub fn block(&self) -> BlockAddress {
        self.block
    }

    pub fn num_arguments(&self) -> u16 {
        self.num_arguments
    }

    pub(crate) fn set_num_arguments(&mut self, n: u16) {
        self.num_arguments = n;
    }

    pub fn num_locals(&self) -> u16 {
        self.num_locals
    }

    pub fn allocate_local(&mut self) -> Result<u32> {
        let offset = self.num_locals;
        self.num_locals = offset
            .checked_add(1)
            .ok_or_else(|| AssemblerError::invariant(format!("too many locals in `{}`", self.call)))?;
        Ok(u32::from(offset))
    }

    pub fn lexicals(&self) -> &[LexicalRef] {
        &self.lexicals
    }

    /// Index of the lexical capturing `target`, added if new.
    pub fn capture(&mut self, lexical: LexicalRef) -> u32 {
        if let Some(i) = self.lexicals.iter().position(|l| l.target == lexical.target) {
            return i as u32;
        }
        self.lexicals.push(lexical);
        (self.lexicals.len() - 1) as u32
    }

    pub fn code(&self) -> &CodeFragment {
        &self.code
    }

    pub fn code_mut(&mut self) -> &mut CodeFragment {
        &mut self.code
    }

    pub fn replace_code(&mut self, code: CodeFragment) -> CodeFragment {
        std::mem::replace(&mut self.code, code)
    }

    pub fn has_code(&self) -> bool {
        !self.code.is_empty()
    }

    pub fn make_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Open a protected region spanning `start..end`.
    pub fn add_check(&mut self, start: Label, end: Label, parent: Option<usize>) -> Result<usize> {
        if let Some(parent) = parent
            && parent >= self.checks.len()
        {
            return Err(AssemblerError::invariant(format!("unknown parent check {parent}")));
        }
        self.checks.push(CheckRegion {
            start,
            end,
            parent,
            catches: Vec::new(),
        });
        Ok(self.checks.len() - 1)
    }

    pub fn add_catch(&mut self, check: usize, region: CatchRegion) -> Result<()> {
        let check = self
            .checks
            .get_mut(check)
            .ok_or_else(|| AssemblerError::invariant(format!("unknown check {check}")))?;
        check.catches.push(region);
        Ok(())
    }

    pub fn checks(&self) -> &[CheckRegion] {
        &self.checks
    }

    /// Record the type produced by one exit path.
    pub fn put_exit_type(&mut self, type_def: TypeDef) {
        self.exit_types.push(type_def);
    }

    pub fn exit_types(&self) -> &[TypeDef] {
        &self.exit_types
    }
}
