//! Arena of symbols keyed by url.

use std::collections::HashMap;

use indexmap::IndexSet;
use lyric_common::SymbolUrl;

use crate::error::{AssemblerError, Result};
use crate::symbol::{Symbol, SymbolKind};

/// Stable index of a symbol in the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolAddress(u32);

impl SymbolAddress {
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct SymbolCache {
    symbols: Vec<Symbol>,
    index: HashMap<SymbolUrl, SymbolAddress>,
    touched: IndexSet<SymbolAddress>,
}

impl SymbolCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a symbol under its url.
    ///
    /// An existing `Undeclared` placeholder is replaced by anything. An
    /// existing `Linkage` placeholder is replaced by a symbol of the same
    /// linkage section. Any other existing binding is a duplicate definition.
    pub fn insert_symbol(&mut self, symbol: Symbol) -> Result<SymbolAddress> {
        let Some(&address) = self.index.get(&symbol.url) else {
            let address = SymbolAddress(self.symbols.len() as u32);
            self.index.insert(symbol.url.clone(), address);
            self.symbols.push(symbol);
            return Ok(address);
        };

        let existing = &mut self.symbols[address.0 as usize];
        match existing.kind {
            SymbolKind::Undeclared => {}
            SymbolKind::Linkage(section) => {
                if symbol.is_placeholder() || symbol.linkage_section() != section {
                    return Err(AssemblerError::invariant(format!(
                        "cannot replace {section} linkage `{}` with a {:?}",
                        symbol.url,
                        symbol.symbol_type()
                    )));
                }
            }
            _ => return Err(AssemblerError::SymbolAlreadyDefined(symbol.url)),
        }
        *existing = symbol;
        Ok(address)
    }

    pub fn contains(&self, url: &SymbolUrl) -> bool {
        self.index.contains_key(url)
    }

    pub fn address_of(&self, url: &SymbolUrl) -> Option<SymbolAddress> {
        self.index.get(url).copied()
    }

    /// `None` when absent; callers decide whether that is an error.
    pub fn get_symbol(&self, url: &SymbolUrl) -> Option<&Symbol> {
        let address = self.index.get(url)?;
        self.symbols.get(address.0 as usize)
    }

    pub fn get_symbol_mut(&mut self, url: &SymbolUrl) -> Option<&mut Symbol> {
        let address = self.index.get(url)?;
        self.symbols.get_mut(address.0 as usize)
    }

    pub fn symbol_or_err(&self, url: &SymbolUrl) -> Result<&Symbol> {
        self.get_symbol(url)
            .ok_or_else(|| AssemblerError::MissingSymbol(url.clone()))
    }

    pub fn symbol_mut_or_err(&mut self, url: &SymbolUrl) -> Result<&mut Symbol> {
        self.get_symbol_mut(url)
            .ok_or_else(|| AssemblerError::MissingSymbol(url.clone()))
    }

    pub fn get(&self, address: SymbolAddress) -> Option<&Symbol> {
        self.symbols.get(address.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolAddress, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (SymbolAddress(i as u32), s))
    }

    /// Mark a symbol as used, so the writer emits it even when no
    /// descriptor or instruction refers to it.
    pub fn touch(&mut self, url: &SymbolUrl) -> Result<()> {
        let address = self
            .address_of(url)
            .ok_or_else(|| AssemblerError::MissingSymbol(url.clone()))?;
        self.touched.insert(address);
        Ok(())
    }

    pub fn is_touched(&self, url: &SymbolUrl) -> bool {
        self.address_of(url)
            .is_some_and(|a| self.touched.contains(&a))
    }

    pub fn touched(&self) -> impl Iterator<Item = &Symbol> {
        self.touched.iter().filter_map(|a| self.get(*a))
    }
}
