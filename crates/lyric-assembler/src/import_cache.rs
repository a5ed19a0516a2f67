//! Cross-module symbol resolution.
//!
//! Importing a symbol reads its descriptor from the imported object and
//! inserts a read-only stub (`imported == true`) into the symbol cache. The
//! stub carries what the compiler needs to type-check uses of the symbol:
//! signatures, member names, supertypes.

use std::sync::Arc;

use indexmap::IndexMap;
use lyric_common::{ModuleLocation, SymbolPath, SymbolUrl, TypeDef};
use lyric_object::{
    Address, CallFlags, CompositeDescriptor, ImportFlags, LinkageSection, LyricObject,
    ParameterDescriptor, SymbolDescriptor, TypeKind, is_far, is_valid,
};

use crate::error::{AssemblerError, Result};
use crate::module_cache::ModuleCache;
use crate::symbol::{
    ActionSymbol, BindingType, CallSymbol, CompositeSymbol, ConceptSymbol, ExistentialSymbol,
    FieldSymbol, NamespaceSymbol, Parameter, StaticSymbol, Symbol, SymbolKind,
};
use crate::symbol_cache::{SymbolAddress, SymbolCache};
use crate::type_cache::TypeCache;

#[derive(Debug, Clone)]
pub struct ImportEntry {
    pub location: ModuleLocation,
    pub flags: ImportFlags,
    pub object: Arc<LyricObject>,
}

pub struct ImportCache {
    modules: Arc<ModuleCache>,
    imports: IndexMap<ModuleLocation, ImportEntry>,
}

impl ImportCache {
    pub fn new(modules: Arc<ModuleCache>) -> Self {
        Self {
            modules,
            imports: IndexMap::new(),
        }
    }

    pub fn module_cache(&self) -> &Arc<ModuleCache> {
        &self.modules
    }

    /// Import a whole module. Importing it again merges `flags`.
    pub fn import_module(
        &mut self,
        location: &ModuleLocation,
        flags: ImportFlags,
    ) -> Result<Arc<LyricObject>> {
        if let Some(entry) = self.imports.get_mut(location) {
            entry.flags = entry.flags.union(flags);
            return Ok(entry.object.clone());
        }
        let object = self
            .modules
            .get_or_load(location)?
            .ok_or_else(|| AssemblerError::MissingModule(location.clone()))?;
        self.imports.insert(
            location.clone(),
            ImportEntry {
                location: location.clone(),
                flags,
                object: object.clone(),
            },
        );
        Ok(object)
    }

    pub fn has_import(&self, location: &ModuleLocation) -> bool {
        self.imports.contains_key(location)
    }

    pub fn get_import(&self, location: &ModuleLocation) -> Option<&ImportEntry> {
        self.imports.get(location)
    }

    pub fn imports(&self) -> impl Iterator<Item = &ImportEntry> {
        self.imports.values()
    }

    /// Anchor an import location written in `base`.
    pub fn resolve_import_location(
        &self,
        location: &ModuleLocation,
        base: &ModuleLocation,
    ) -> ModuleLocation {
        location.resolve(base)
    }

    /// Import the symbol at `url`, returning the cached stub on repeat calls.
    ///
    /// The module is imported implicitly if needed. A module that lacks the
    /// path yields `MissingSymbol`.
    pub fn import_symbol(
        &mut self,
        url: &SymbolUrl,
        symbols: &mut SymbolCache,
        types: &mut TypeCache,
    ) -> Result<SymbolAddress> {
        if let Some(address) = symbols.address_of(url) {
            return Ok(address);
        }
        let location = url
            .location()
            .ok_or_else(|| AssemblerError::invariant(format!("cannot import relative url `{url}`")))?;
        let object = self.import_module(location, ImportFlags::NONE)?;
        let descriptor = object
            .find_symbol(&url.path().to_string())
            .ok_or_else(|| AssemblerError::MissingSymbol(url.clone()))?;

        let reader = StubReader {
            object: &object,
            location,
        };
        let kind = reader.kind(descriptor)?;
        let supertype = match &kind {
            SymbolKind::Class(c)
            | SymbolKind::Struct(c)
            | SymbolKind::Instance(c)
            | SymbolKind::Enum(c) => Some(c.superclass.clone()),
            SymbolKind::Existential(e) => Some(e.superclass.clone()),
            _ => None,
        };
        if let Some(superclass) = supertype
            && !types.has_type_declaration(url)
        {
            types.declare_subtype(url.clone(), superclass.map(TypeDef::concrete))?;
        }
        symbols.insert_symbol(Symbol::imported(url.clone(), kind))
    }

    /// Urls of every unenclosed public symbol of an imported module.
    pub fn top_level_symbols(&self, location: &ModuleLocation) -> Result<Vec<SymbolUrl>> {
        let entry = self
            .imports
            .get(location)
            .ok_or_else(|| AssemblerError::MissingModule(location.clone()))?;
        let mut urls = Vec::new();
        for symbol in entry.object.symbols() {
            let path = entry.object.string_or_err(symbol.path)?;
            let path = SymbolPath::parse(path)?;
            if !path.is_enclosed() {
                urls.push(SymbolUrl::new(location.clone(), path));
            }
        }
        Ok(urls)
    }
}

/// Rebuilds symbol summaries from the descriptors of one imported object.
struct StubReader<'a> {
    object: &'a LyricObject,
    location: &'a ModuleLocation,
}

impl StubReader<'_> {
    fn url_at(&self, section: LinkageSection, address: Address) -> Option<SymbolUrl> {
        if !is_valid(address) {
            return None;
        }
        if is_far(address) {
            let link = self.object.link(address)?;
            let location = self.object.import_location(link.import)?.resolve(self.location);
            let path = SymbolPath::parse(self.object.string(link.path)?).ok()?;
            return Some(SymbolUrl::new(location, path));
        }
        let path = self.object.symbol_path(section, address)?;
        Some(SymbolUrl::new(self.location.clone(), path))
    }

    fn type_at(&self, index: u32) -> TypeDef {
        self.type_at_depth(index, 0)
    }

    fn type_at_depth(&self, index: u32, depth: usize) -> TypeDef {
        let Some(descriptor) = self.object.tables().types.get(index as usize) else {
            return TypeDef::Invalid;
        };
        if depth > 64 {
            return TypeDef::Invalid;
        }
        let url = descriptor
            .url
            .and_then(|id| self.object.string(id))
            .and_then(|s| SymbolUrl::parse(s).ok())
            .map(|u| u.resolve(self.location));
        let members = || {
            descriptor
                .members
                .iter()
                .map(|m| self.type_at_depth(*m, depth + 1))
        };
        match (descriptor.kind, url) {
            (TypeKind::Concrete, Some(url)) => TypeDef::concrete_with_args(url, members().collect()),
            (TypeKind::Placeholder, Some(url)) => {
                TypeDef::placeholder(url, descriptor.members.first().copied().unwrap_or(0))
            }
            (TypeKind::Union, _) => TypeDef::union(members()),
            (TypeKind::Intersection, _) => TypeDef::intersection(members()),
            (TypeKind::SelfType, _) => TypeDef::SelfType,
            (TypeKind::NoReturn, _) => TypeDef::NoReturn,
            _ => TypeDef::Invalid,
        }
    }

    fn parameter(&self, param: &ParameterDescriptor) -> Parameter {
        Parameter {
            name: self.object.string(param.name).unwrap_or_default().to_owned(),
            type_def: self.type_at(param.param_type),
            binding: if param.is_variable {
                BindingType::Variable
            } else {
                BindingType::Value
            },
        }
    }

    fn named(
        &self,
        section: LinkageSection,
        addresses: impl IntoIterator<Item = Address>,
    ) -> IndexMap<String, SymbolUrl> {
        addresses
            .into_iter()
            .filter_map(|a| self.url_at(section, a))
            .map(|url| (url.name().to_owned(), url))
            .collect()
    }

    fn composite(&self, section: LinkageSection, d: &CompositeDescriptor) -> CompositeSymbol {
        CompositeSymbol {
            access: d.access,
            derive: d.derive,
            is_abstract: d.is_abstract,
            superclass: self.url_at(section, d.superclass),
            ctor: self.url_at(LinkageSection::Call, d.ctor),
            members: self.named(LinkageSection::Field, d.fields.iter().copied()),
            methods: self.named(LinkageSection::Call, d.methods.iter().map(|m| m.call)),
            type_def: self.type_at(d.instance_type),
            block: None,
        }
    }

    fn kind(&self, descriptor: &SymbolDescriptor) -> Result<SymbolKind> {
        let tables = self.object.tables();
        let i = descriptor.index as usize;
        let section = descriptor.section;
        let missing = || {
            AssemblerError::invariant(format!(
                "import `{}` has no {section} descriptor {i}",
                self.location
            ))
        };

        let kind = match section {
            LinkageSection::Class
            | LinkageSection::Struct
            | LinkageSection::Instance
            | LinkageSection::Enum => {
                let d = tables
                    .composites(section)
                    .and_then(|t| t.get(i))
                    .ok_or_else(missing)?;
                let composite = self.composite(section, d);
                match section {
                    LinkageSection::Class => SymbolKind::Class(composite),
                    LinkageSection::Struct => SymbolKind::Struct(composite),
                    LinkageSection::Instance => SymbolKind::Instance(composite),
                    _ => SymbolKind::Enum(composite),
                }
            }
            LinkageSection::Call => {
                let d = tables.calls.get(i).ok_or_else(missing)?;
                SymbolKind::Call(CallSymbol {
                    access: d.access,
                    mode: d.mode,
                    receiver: self.url_at(d.receiver_section, d.receiver),
                    parameters: d.parameters.iter().map(|p| self.parameter(p)).collect(),
                    rest: d.rest.as_ref().map(|p| self.parameter(p)),
                    result_type: Some(self.type_at(d.result_type)),
                    is_initializer: d.flags.contains(CallFlags::INITIALIZER),
                    defined: true,
                    finalized: true,
                    proc: None,
                })
            }
            LinkageSection::Field => {
                let d = tables.fields.get(i).ok_or_else(missing)?;
                SymbolKind::Field(FieldSymbol {
                    access: d.access,
                    binding: if d.is_variable {
                        BindingType::Variable
                    } else {
                        BindingType::Value
                    },
                    type_def: self.type_at(d.field_type),
                })
            }
            LinkageSection::Static => {
                let d = tables.statics.get(i).ok_or_else(missing)?;
                SymbolKind::Static(StaticSymbol {
                    binding: if d.is_variable {
                        BindingType::Variable
                    } else {
                        BindingType::Value
                    },
                    type_def: self.type_at(d.static_type),
                    initializer: self.url_at(LinkageSection::Call, d.initializer),
                })
            }
            LinkageSection::Namespace => {
                let d = tables.namespaces.get(i).ok_or_else(missing)?;
                let members = d
                    .bindings
                    .iter()
                    .filter_map(|b| {
                        let name = self.object.string(b.name)?;
                        Some((name.to_owned(), self.url_at(b.section, b.address)?))
                    })
                    .collect();
                SymbolKind::Namespace(NamespaceSymbol {
                    access: d.access,
                    members,
                    block: None,
                })
            }
            LinkageSection::Existential => {
                let d = tables.existentials.get(i).ok_or_else(missing)?;
                SymbolKind::Existential(ExistentialSymbol {
                    access: d.access,
                    derive: d.derive,
                    intrinsic: d.intrinsic,
                    superclass: self.url_at(LinkageSection::Existential, d.superclass),
                    methods: self.named(LinkageSection::Call, d.methods.iter().map(|m| m.call)),
                    type_def: self.type_at(d.existential_type),
                })
            }
            LinkageSection::Concept => {
                let d = tables.concepts.get(i).ok_or_else(missing)?;
                SymbolKind::Concept(ConceptSymbol {
                    access: d.access,
                    actions: self.named(LinkageSection::Action, d.actions.iter().copied()),
                    type_def: self.type_at(d.concept_type),
                    block: None,
                })
            }
            LinkageSection::Action => {
                let d = tables.actions.get(i).ok_or_else(missing)?;
                SymbolKind::Action(ActionSymbol {
                    receiver: self.url_at(LinkageSection::Concept, d.receiver),
                    parameters: d.parameters.iter().map(|p| self.parameter(p)).collect(),
                    rest: d.rest.as_ref().map(|p| self.parameter(p)),
                    result_type: Some(self.type_at(d.result_type)),
                })
            }
            LinkageSection::Type | LinkageSection::Literal | LinkageSection::Invalid => {
                return Err(AssemblerError::invariant(format!(
                    "symbol in non-symbol section {section}"
                )));
            }
        };
        Ok(kind)
    }
}
