//! Canonical type storage.
//!
//! Types are interned by structural value into an append-only vector, so a
//! [`TypeAddress`] stays valid for the lifetime of the cache. The cache also
//! records the declared supertype of every concrete type it knows about,
//! which is what [`TypeCache::is_subtype`] walks.

use std::collections::HashMap;

use lyric_common::{SymbolUrl, TypeDef};

use crate::error::{AssemblerError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeAddress(u32);

impl TypeAddress {
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Clone, Copy, Debug)]
struct TemplateState {
    num_placeholders: u32,
    closed: bool,
}

const MAX_SUPERTYPE_DEPTH: usize = 256;

#[derive(Debug, Default)]
pub struct TypeCache {
    types: Vec<TypeDef>,
    index: HashMap<TypeDef, TypeAddress>,
    templates: HashMap<SymbolUrl, TemplateState>,
    supertypes: HashMap<SymbolUrl, Option<TypeDef>>,
    top: Option<SymbolUrl>,
}

impl TypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every type is a subtype of the concrete type at `url`.
    pub fn set_top(&mut self, url: SymbolUrl) {
        self.top = Some(url);
    }

    pub fn top(&self) -> Option<&SymbolUrl> {
        self.top.as_ref()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Intern `type_def` and, recursively, every type it is built from.
    ///
    /// Structurally equal inputs always yield the same address.
    pub fn intern_type(&mut self, type_def: &TypeDef) -> Result<TypeAddress> {
        if let Some(&address) = self.index.get(type_def) {
            return Ok(address);
        }

        match type_def {
            TypeDef::Invalid => {
                return Err(AssemblerError::invariant("cannot intern an invalid type"));
            }
            TypeDef::Placeholder { template, index } => {
                let state = self.templates.get(template).ok_or_else(|| {
                    AssemblerError::invariant(format!("unknown template `{template}`"))
                })?;
                if !state.closed {
                    return Err(AssemblerError::invariant(format!(
                        "placeholder refers to open template `{template}`"
                    )));
                }
                if *index >= state.num_placeholders {
                    return Err(AssemblerError::invariant(format!(
                        "template `{template}` has no placeholder {index}"
                    )));
                }
            }
            TypeDef::Concrete { args, .. } => {
                for arg in args {
                    self.intern_type(arg)?;
                }
            }
            TypeDef::Union(members) | TypeDef::Intersection(members) => {
                for member in members {
                    self.intern_type(member)?;
                }
            }
            TypeDef::SelfType | TypeDef::NoReturn => {}
        }

        let address = TypeAddress(self.types.len() as u32);
        self.types.push(type_def.clone());
        self.index.insert(type_def.clone(), address);
        Ok(address)
    }

    /// Address of an already interned type.
    pub fn find_type(&self, type_def: &TypeDef) -> Option<TypeAddress> {
        self.index.get(type_def).copied()
    }

    pub fn resolve_type(&self, address: TypeAddress) -> Result<&TypeDef> {
        self.types
            .get(address.0 as usize)
            .ok_or_else(|| AssemblerError::invariant(format!("invalid type address {}", address.0)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeAddress, &TypeDef)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, t)| (TypeAddress(i as u32), t))
    }

    /// Open a template with `num_placeholders` parameters.
    pub fn declare_template(&mut self, url: SymbolUrl, num_placeholders: u32) -> Result<()> {
        if self.templates.contains_key(&url) {
            return Err(AssemblerError::SymbolAlreadyDefined(url));
        }
        self.templates.insert(
            url,
            TemplateState {
                num_placeholders,
                closed: false,
            },
        );
        Ok(())
    }

    pub fn close_template(&mut self, url: &SymbolUrl) -> Result<()> {
        let state = self
            .templates
            .get_mut(url)
            .ok_or_else(|| AssemblerError::MissingSymbol(url.clone()))?;
        state.closed = true;
        Ok(())
    }

    /// Record that the concrete type at `url` extends `supertype`.
    pub fn declare_subtype(&mut self, url: SymbolUrl, supertype: Option<TypeDef>) -> Result<()> {
        if self.supertypes.contains_key(&url) {
            return Err(AssemblerError::invariant(format!(
                "type `{url}` is already declared"
            )));
        }
        self.supertypes.insert(url, supertype);
        Ok(())
    }

    pub fn has_type_declaration(&self, url: &SymbolUrl) -> bool {
        self.supertypes.contains_key(url)
    }

    pub fn supertype(&self, url: &SymbolUrl) -> Option<&TypeDef> {
        self.supertypes.get(url)?.as_ref()
    }

    /// Whether a value of type `sub` can be used where `sup` is expected.
    pub fn is_subtype(&self, sub: &TypeDef, sup: &TypeDef) -> bool {
        self.is_subtype_at(sub, sup, 0)
    }

    fn is_subtype_at(&self, sub: &TypeDef, sup: &TypeDef, depth: usize) -> bool {
        if sub == sup {
            return true;
        }
        if depth > MAX_SUPERTYPE_DEPTH || !sub.is_valid() || !sup.is_valid() {
            return false;
        }
        if let TypeDef::Concrete { url, args } = sup
            && args.is_empty()
            && self.top.as_ref() == Some(url)
        {
            return true;
        }

        match (sub, sup) {
            (TypeDef::NoReturn, _) => true,
            (TypeDef::Union(members), _) => {
                members.iter().all(|m| self.is_subtype_at(m, sup, depth + 1))
            }
            (_, TypeDef::Union(members)) => {
                members.iter().any(|m| self.is_subtype_at(sub, m, depth + 1))
            }
            (_, TypeDef::Intersection(members)) => {
                members.iter().all(|m| self.is_subtype_at(sub, m, depth + 1))
            }
            (TypeDef::Intersection(members), _) => {
                members.iter().any(|m| self.is_subtype_at(m, sup, depth + 1))
            }
            (TypeDef::Concrete { url, .. }, TypeDef::Concrete { .. }) => match self.supertype(url) {
                Some(parent) => self.is_subtype_at(parent, sup, depth + 1),
                None => false,
            },
            _ => false,
        }
    }

    /// Smallest type both `a` and `b` conform to: the wider of the two when
    /// one extends the other, their union otherwise.
    pub fn unify(&self, a: &TypeDef, b: &TypeDef) -> TypeDef {
        if self.is_subtype(a, b) {
            b.clone()
        } else if self.is_subtype(b, a) {
            a.clone()
        } else {
            TypeDef::union([a.clone(), b.clone()])
        }
    }
}
