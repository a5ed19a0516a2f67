//! Stack of the declarations a pass is currently inside.

use std::fmt;

use lyric_assembler::BlockAddress;
use lyric_common::SymbolUrl;

use crate::error::{CompilerError, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DriverContext {
    Namespace { url: SymbolUrl, block: BlockAddress },
    Class { url: SymbolUrl, block: BlockAddress },
    Function { call: SymbolUrl, block: BlockAddress },
    Block { block: BlockAddress },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextKind {
    Namespace,
    Class,
    Function,
    Block,
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Namespace => "namespace",
            Self::Class => "class",
            Self::Function => "function",
            Self::Block => "block",
        };
        f.write_str(name)
    }
}

impl DriverContext {
    pub fn kind(&self) -> ContextKind {
        match self {
            Self::Namespace { .. } => ContextKind::Namespace,
            Self::Class { .. } => ContextKind::Class,
            Self::Function { .. } => ContextKind::Function,
            Self::Block { .. } => ContextKind::Block,
        }
    }

    /// Block declarations made in this context are bound in.
    pub fn block(&self) -> BlockAddress {
        match self {
            Self::Namespace { block, .. }
            | Self::Class { block, .. }
            | Self::Function { block, .. }
            | Self::Block { block } => *block,
        }
    }
}

/// Push on entering a construct, pop on leaving it. Popping an empty stack
/// or a context of the wrong kind is an invariant violation.
#[derive(Clone, Debug, Default)]
pub struct ContextStack {
    contexts: Vec<DriverContext>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn push(&mut self, context: DriverContext) {
        self.contexts.push(context);
    }

    pub fn pop(&mut self, expected: ContextKind) -> Result<DriverContext> {
        match self.contexts.last() {
            None => Err(CompilerError::invariant(format!(
                "cannot pop {expected} context: stack is empty"
            ))),
            Some(top) if top.kind() != expected => Err(CompilerError::invariant(format!(
                "cannot pop {expected} context: top is {}",
                top.kind()
            ))),
            Some(_) => self
                .contexts
                .pop()
                .ok_or_else(|| CompilerError::invariant("context stack is empty")),
        }
    }

    pub fn current(&self) -> Result<&DriverContext> {
        self.contexts
            .last()
            .ok_or_else(|| CompilerError::invariant("context stack is empty"))
    }

    pub fn current_block(&self) -> Result<BlockAddress> {
        Ok(self.current()?.block())
    }

    /// Innermost call whose proc receives emitted code.
    pub fn current_call(&self) -> Result<&SymbolUrl> {
        self.contexts
            .iter()
            .rev()
            .find_map(|c| match c {
                DriverContext::Function { call, .. } => Some(call),
                _ => None,
            })
            .ok_or_else(|| CompilerError::invariant("no enclosing function context"))
    }

    /// Class being defined, if the innermost definition is inside one.
    pub fn enclosing_class(&self) -> Option<&SymbolUrl> {
        self.contexts.iter().rev().find_map(|c| match c {
            DriverContext::Class { url, .. } => Some(url),
            _ => None,
        })
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &DriverContext> {
        self.contexts.iter()
    }
}
