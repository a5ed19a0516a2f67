//! Lexical scopes.
//!
//! Blocks live in a [`BlockArena`] and refer to their parent by
//! [`BlockAddress`]. A name is bound at most once per block; shadowing only
//! happens across blocks, and lookups walk outward through the parent chain.

use indexmap::IndexMap;
use lyric_common::{SymbolUrl, TypeDef};

use crate::error::{AssemblerError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockAddress(u32);

impl BlockAddress {
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

/// How a name is bound in a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingKind {
    /// Immutable variable.
    Value,
    /// Reassignable variable.
    Variable,
    /// Declaration (class, call, namespace, ...) or `using` alias.
    Descriptor,
    /// Name reserved by the symbolizer, shape not known yet.
    Placeholder,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    pub url: SymbolUrl,
    pub type_def: Option<TypeDef>,
    pub kind: BindingKind,
}

impl Binding {
    pub fn descriptor(url: SymbolUrl) -> Self {
        Self {
            url,
            type_def: None,
            kind: BindingKind::Descriptor,
        }
    }
}

/// What a block belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockOwner {
    /// Aliases of the prelude's top-level symbols.
    Prelude,
    Namespace(SymbolUrl),
    Proc(SymbolUrl),
    Composite(SymbolUrl),
    Concept(SymbolUrl),
    /// Nested `{}` region inside a proc.
    Nested,
}

#[derive(Clone, Debug)]
pub struct BlockHandle {
    parent: Option<BlockAddress>,
    owner: BlockOwner,
    bindings: IndexMap<String, Binding>,
}

impl BlockHandle {
    pub fn parent(&self) -> Option<BlockAddress> {
        self.parent
    }

    pub fn owner(&self) -> &BlockOwner {
        &self.owner
    }

    pub fn bindings(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct BlockArena {
    blocks: Vec<BlockHandle>,
}

impl BlockArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, parent: Option<BlockAddress>, owner: BlockOwner) -> BlockAddress {
        let address = BlockAddress(self.blocks.len() as u32);
        self.blocks.push(BlockHandle {
            parent,
            owner,
            bindings: IndexMap::new(),
        });
        address
    }

    pub fn get(&self, address: BlockAddress) -> Result<&BlockHandle> {
        self.blocks
            .get(address.0 as usize)
            .ok_or_else(|| AssemblerError::invariant(format!("invalid block {}", address.0)))
    }

    fn get_mut(&mut self, address: BlockAddress) -> Result<&mut BlockHandle> {
        self.blocks
            .get_mut(address.0 as usize)
            .ok_or_else(|| AssemblerError::invariant(format!("invalid block {}", address.0)))
    }

    /// Bind `name` in `block`. Fails if `name` is already bound there.
    pub fn bind(&mut self, block: BlockAddress, name: &str, binding: Binding) -> Result<()> {
        let handle = self.get_mut(block)?;
        if handle.bindings.contains_key(name) {
            return Err(AssemblerError::NameAlreadyBound(name.to_owned()));
        }
        handle.bindings.insert(name.to_owned(), binding);
        Ok(())
    }

    /// Fails if [`BlockArena::rebind`] would refuse `name` in `block`.
    pub fn check_rebind(&self, block: BlockAddress, name: &str) -> Result<()> {
        match self.get(block)?.bindings.get(name) {
            Some(existing) if existing.kind != BindingKind::Placeholder => {
                Err(AssemblerError::NameAlreadyBound(name.to_owned()))
            }
            _ => Ok(()),
        }
    }

    /// Replace a placeholder binding once its declaration is known.
    pub fn rebind(&mut self, block: BlockAddress, name: &str, binding: Binding) -> Result<()> {
        let handle = self.get_mut(block)?;
        match handle.bindings.get_mut(name) {
            Some(existing) if existing.kind == BindingKind::Placeholder => {
                *existing = binding;
                Ok(())
            }
            Some(_) => Err(AssemblerError::NameAlreadyBound(name.to_owned())),
            None => {
                handle.bindings.insert(name.to_owned(), binding);
                Ok(())
            }
        }
    }

    pub fn lookup_local(&self, block: BlockAddress, name: &str) -> Option<&Binding> {
        self.blocks.get(block.0 as usize)?.bindings.get(name)
    }

    /// Nearest binding of `name`, walking from `block` to the outermost scope.
    pub fn find_binding(&self, block: BlockAddress, name: &str) -> Option<(BlockAddress, &Binding)> {
        self.ancestors(block)
            .find_map(|(address, handle)| handle.bindings.get(name).map(|b| (address, b)))
    }

    /// `block` itself followed by each enclosing block.
    pub fn ancestors(&self, block: BlockAddress) -> Ancestors<'_> {
        Ancestors {
            arena: self,
            next: Some(block),
        }
    }

    /// Nearest block owned by a proc, and that proc's call.
    pub fn enclosing_proc(&self, block: BlockAddress) -> Option<(BlockAddress, &SymbolUrl)> {
        self.ancestors(block).find_map(|(address, handle)| match &handle.owner {
            BlockOwner::Proc(call) => Some((address, call)),
            _ => None,
        })
    }

    /// Nearest enclosing definition whose path prefixes nested declarations.
    pub fn enclosing_definition(&self, block: BlockAddress) -> Option<&SymbolUrl> {
        self.ancestors(block).find_map(|(_, handle)| match &handle.owner {
            BlockOwner::Namespace(url)
            | BlockOwner::Proc(url)
            | BlockOwner::Composite(url)
            | BlockOwner::Concept(url) => Some(url),
            BlockOwner::Prelude | BlockOwner::Nested => None,
        })
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

pub struct Ancestors<'a> {
    arena: &'a BlockArena,
    next: Option<BlockAddress>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = (BlockAddress, &'a BlockHandle);

    fn next(&mut self) -> Option<Self::Item> {
        let address = self.next?;
        let handle = self.arena.blocks.get(address.0 as usize)?;
        self.next = handle.parent;
        Some((address, handle))
    }
}
