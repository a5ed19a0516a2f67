//! The aggregate root of one module being assembled.
//!
//! [`ObjectState`] owns the type cache, symbol cache, import cache, block
//! arena and every proc. Pipeline drivers mutate it through the
//! declare / define / finalize vocabulary below and freeze it with
//! [`ObjectState::to_object`].

use std::collections::HashSet;
use std::sync::Arc;

use lyric_common::{ModuleLocation, SymbolPath, SymbolUrl, TypeDef};
use lyric_object::{
    AccessType, CallMode, DeriveType, ImportFlags, Intrinsic, LEXICAL_ARGUMENT, LEXICAL_LOCAL,
    LinkageSection, LyricObject, Opcode, op_flags,
};

use crate::block::{BindingKind, Binding, BlockAddress, BlockArena, BlockOwner};
use crate::code::PendingOperand;
use crate::error::{AssemblerError, Result};
use crate::fundamentals::{Fundamental, Fundamentals, PRELUDE_LOCATION};
use crate::import_cache::ImportCache;
use crate::module_cache::ModuleCache;
use crate::object_writer::{ObjectWriter, WriterOptions};
use crate::proc_handle::{LexicalRef, ProcHandle};
use crate::symbol::{
    ActionSymbol, BindingType, CallSymbol, CompositeSymbol, ConceptSymbol, ExistentialSymbol,
    FieldSymbol, LexicalSymbol, NamespaceSymbol, Parameter, StaticSymbol, Symbol, SymbolKind,
    VariableSymbol,
};
use crate::symbol_cache::SymbolCache;
use crate::type_cache::TypeCache;

pub const ENTRY_CALL: &str = "$entry";
pub const GLOBAL_NAMESPACE: &str = "$global";
pub const CTOR_NAME: &str = "$ctor";
pub const INITIALIZER_NAME: &str = "$init";

#[derive(Clone, Debug)]
pub struct ObjectStateOptions {
    /// Module imported implicitly into every root block. `None` assembles a
    /// module with no prelude, which is how the prelude itself is built.
    pub prelude_location: Option<ModuleLocation>,
    /// Extra modules whose top-level symbols are visible without `using`.
    pub environment_modules: Vec<ModuleLocation>,
    /// Write an import entry for every imported module, used or not.
    pub touch_unused_imports: bool,
}

impl Default for ObjectStateOptions {
    fn default() -> Self {
        Self {
            prelude_location: ModuleLocation::parse(PRELUDE_LOCATION).ok(),
            environment_modules: Vec::new(),
            touch_unused_imports: false,
        }
    }
}

impl ObjectStateOptions {
    pub fn without_prelude() -> Self {
        Self {
            prelude_location: None,
            ..Self::default()
        }
    }
}

/// Shape of a class, struct, instance or enum declaration.
#[derive(Clone, Debug, Default)]
pub struct CompositeSpec {
    pub access: AccessType,
    pub derive: DeriveType,
    pub is_abstract: bool,
    /// Classes without one extend the prelude's `Object`.
    pub superclass: Option<SymbolUrl>,
    /// Concepts whose actions the composite's methods implement.
    pub concepts: Vec<SymbolUrl>,
}

#[derive(Clone, Debug)]
pub struct ExistentialSpec {
    pub access: AccessType,
    pub derive: DeriveType,
    pub intrinsic: Intrinsic,
    pub superclass: Option<SymbolUrl>,
}

/// Handles created by [`ObjectState::define_root`].
#[derive(Clone, Debug)]
struct RootState {
    root_block: BlockAddress,
    global: SymbolUrl,
    entry: SymbolUrl,
    entry_block: BlockAddress,
}

pub struct ObjectState {
    location: ModuleLocation,
    options: ObjectStateOptions,
    fundamentals: Fundamentals,
    types: TypeCache,
    symbols: SymbolCache,
    imports: ImportCache,
    blocks: BlockArena,
    procs: Vec<ProcHandle>,
    root: Option<RootState>,
}

impl ObjectState {
    pub fn new(
        location: ModuleLocation,
        modules: Arc<ModuleCache>,
        options: ObjectStateOptions,
    ) -> Self {
        let fundamentals = Fundamentals::new(
            options
                .prelude_location
                .clone()
                .unwrap_or_else(|| location.clone()),
        );
        Self {
            location,
            options,
            fundamentals,
            types: TypeCache::new(),
            symbols: SymbolCache::new(),
            imports: ImportCache::new(modules),
            blocks: BlockArena::new(),
            procs: Vec::new(),
            root: None,
        }
    }

    pub fn location(&self) -> &ModuleLocation {
        &self.location
    }

    pub fn options(&self) -> &ObjectStateOptions {
        &self.options
    }

    pub fn fundamentals(&self) -> &Fundamentals {
        &self.fundamentals
    }

    pub fn fundamental_type(&self, fundamental: Fundamental) -> TypeDef {
        self.fundamentals.type_def(fundamental)
    }

    pub fn types(&self) -> &TypeCache {
        &self.types
    }

    pub fn types_mut(&mut self) -> &mut TypeCache {
        &mut self.types
    }

    pub fn symbols(&self) -> &SymbolCache {
        &self.symbols
    }

    pub fn imports(&self) -> &ImportCache {
        &self.imports
    }

    pub fn blocks(&self) -> &BlockArena {
        &self.blocks
    }

    pub fn procs(&self) -> &[ProcHandle] {
        &self.procs
    }

    pub(crate) fn procs_mut(&mut self) -> &mut [ProcHandle] {
        &mut self.procs
    }

    fn root(&self) -> Result<&RootState> {
        self.root
            .as_ref()
            .ok_or_else(|| AssemblerError::invariant("root is not defined"))
    }

    pub fn root_block(&self) -> Result<BlockAddress> {
        Ok(self.root()?.root_block)
    }

    pub fn entry_block(&self) -> Result<BlockAddress> {
        Ok(self.root()?.entry_block)
    }

    pub fn entry_call(&self) -> Result<&SymbolUrl> {
        Ok(&self.root()?.entry)
    }

    pub fn global_namespace(&self) -> Result<&SymbolUrl> {
        Ok(&self.root()?.global)
    }

    pub fn local_url(&self, path: SymbolPath) -> SymbolUrl {
        SymbolUrl::new(self.location.clone(), path)
    }

    pub fn is_local(&self, url: &SymbolUrl) -> bool {
        url.location().is_none_or(|l| *l == self.location)
    }

    /// Import the prelude and environment modules, then create the root
    /// block, the `$global` namespace and the `$entry` call.
    pub fn define_root(&mut self) -> Result<()> {
        if self.root.is_some() {
            return Err(AssemblerError::invariant("root is already defined"));
        }

        let mut parent = None;
        if let Some(prelude) = self.options.prelude_location.clone() {
            let block = self.blocks.create(None, BlockOwner::Prelude);
            self.alias_module(block, &prelude, ImportFlags::SYSTEM_BOOTSTRAP)?;
            self.types.set_top(self.fundamentals.url(Fundamental::Any));
            parent = Some(block);
        }
        for location in self.options.environment_modules.clone() {
            let block = self.blocks.create(parent, BlockOwner::Prelude);
            self.alias_module(block, &location, ImportFlags::NONE)?;
            parent = Some(block);
        }

        let global = self.local_url(SymbolPath::from_name(GLOBAL_NAMESPACE)?);
        let root_block = self
            .blocks
            .create(parent, BlockOwner::Namespace(global.clone()));
        self.symbols.insert_symbol(Symbol::new(
            global.clone(),
            SymbolKind::Namespace(NamespaceSymbol {
                access: AccessType::Public,
                members: Default::default(),
                block: Some(root_block),
            }),
        ))?;

        let entry = self.local_url(SymbolPath::from_name(ENTRY_CALL)?);
        let entry_block = self.blocks.create(Some(root_block), BlockOwner::Proc(entry.clone()));
        let proc = self.push_proc(entry.clone(), entry_block);
        self.symbols.insert_symbol(Symbol::new(
            entry.clone(),
            SymbolKind::Call(CallSymbol {
                access: AccessType::Public,
                mode: CallMode::Normal,
                receiver: None,
                parameters: Vec::new(),
                rest: None,
                result_type: None,
                is_initializer: false,
                defined: true,
                finalized: false,
                proc: Some(proc),
            }),
        ))?;

        self.root = Some(RootState {
            root_block,
            global,
            entry,
            entry_block,
        });
        Ok(())
    }

    fn alias_module(
        &mut self,
        block: BlockAddress,
        location: &ModuleLocation,
        flags: ImportFlags,
    ) -> Result<()> {
        self.imports.import_module(location, flags)?;
        for url in self.imports.top_level_symbols(location)? {
            self.imports
                .import_symbol(&url, &mut self.symbols, &mut self.types)?;
            let name = url.name().to_owned();
            self.blocks.bind(block, &name, Binding::descriptor(url))?;
        }
        Ok(())
    }

    pub fn import_module(&mut self, location: &ModuleLocation, flags: ImportFlags) -> Result<()> {
        self.imports.import_module(location, flags).map(|_| ())
    }

    /// The symbol at `url`, importing it first if it lives in another module.
    pub fn get_or_import_symbol(&mut self, url: &SymbolUrl) -> Result<&Symbol> {
        if !self.symbols.contains(url) {
            if self.is_local(url) {
                return Err(AssemblerError::MissingSymbol(url.clone()));
            }
            self.imports
                .import_symbol(url, &mut self.symbols, &mut self.types)?;
        }
        self.symbols.symbol_or_err(url)
    }

    pub fn touch(&mut self, url: &SymbolUrl) -> Result<()> {
        self.symbols.touch(url)
    }

    fn push_proc(&mut self, call: SymbolUrl, block: BlockAddress) -> usize {
        self.procs.push(ProcHandle::new(call, block));
        self.procs.len() - 1
    }

    pub fn proc(&self, call: &SymbolUrl) -> Result<&ProcHandle> {
        let index = self.proc_index(call)?;
        Ok(&self.procs[index])
    }

    pub fn proc_mut(&mut self, call: &SymbolUrl) -> Result<&mut ProcHandle> {
        let index = self.proc_index(call)?;
        Ok(&mut self.procs[index])
    }

    fn proc_index(&self, call: &SymbolUrl) -> Result<usize> {
        self.symbols
            .symbol_or_err(call)?
            .as_call()
            .and_then(|c| c.proc)
            .filter(|&i| i < self.procs.len())
            .ok_or_else(|| AssemblerError::invariant(format!("`{call}` has no proc")))
    }

    /// Call owning the proc that `block` belongs to.
    pub fn enclosing_call(&self, block: BlockAddress) -> Result<SymbolUrl> {
        self.blocks
            .enclosing_proc(block)
            .map(|(_, call)| call.clone())
            .ok_or_else(|| AssemblerError::invariant(format!("block {} is not in a proc", block.index())))
    }

    pub fn create_block(&mut self, parent: BlockAddress) -> Result<BlockAddress> {
        self.blocks.get(parent)?;
        Ok(self.blocks.create(Some(parent), BlockOwner::Nested))
    }

    /// Block a declaration made in `block` is bound in. Top-level
    /// declarations in the entry proc belong to the root block.
    fn declaration_block(&self, block: BlockAddress) -> BlockAddress {
        match &self.root {
            Some(root) if block == root.entry_block => root.root_block,
            _ => block,
        }
    }

    /// Fails before any state changes if `name` cannot be declared in `block`.
    fn check_declarable(&self, block: BlockAddress, name: &str) -> Result<()> {
        self.blocks.check_rebind(self.declaration_block(block), name)
    }

    /// Url of a declaration named `name` made in `block`.
    pub fn make_symbol_url(&self, block: BlockAddress, name: &str) -> Result<SymbolUrl> {
        let enclosing = self.blocks.enclosing_definition(block).filter(|url| {
            self.root
                .as_ref()
                .is_none_or(|root| **url != root.entry && **url != root.global)
        });
        let path = match enclosing {
            Some(url) => url.path().child(name)?,
            None => SymbolPath::from_name(name)?,
        };
        Ok(self.local_url(path))
    }

    /// Unused child url of `parent`: `name`, then `name$1`, `name$2`, ...
    fn unique_child(&self, parent: &SymbolUrl, name: &str) -> Result<SymbolUrl> {
        let mut url = parent.child(name)?;
        let mut n = 0u32;
        while self.symbols.contains(&url) {
            n += 1;
            url = parent.child(&format!("{name}${n}"))?;
        }
        Ok(url)
    }

    /// Insert a declaration, bind its name and register it with the
    /// enclosing namespace.
    fn put_declaration(
        &mut self,
        block: BlockAddress,
        name: &str,
        symbol: Symbol,
        kind: BindingKind,
        type_def: Option<TypeDef>,
    ) -> Result<SymbolUrl> {
        self.check_declarable(block, name)?;
        let url = symbol.url.clone();
        let declared_in = self.declaration_block(block);
        self.symbols.insert_symbol(symbol)?;
        self.blocks.rebind(
            declared_in,
            name,
            Binding {
                url: url.clone(),
                type_def,
                kind,
            },
        )?;
        if let BlockOwner::Namespace(namespace) = self.blocks.get(declared_in)?.owner().clone()
            && let Some(ns) = self.symbols.get_symbol_mut(&namespace)
            && let Some(ns) = ns.as_namespace_mut()
        {
            ns.members.insert(name.to_owned(), url.clone());
        }
        Ok(url)
    }

    pub fn declare_namespace(
        &mut self,
        block: BlockAddress,
        name: &str,
        access: AccessType,
    ) -> Result<SymbolUrl> {
        self.check_declarable(block, name)?;
        let url = self.make_symbol_url(block, name)?;
        let parent = self.declaration_block(block);
        let ns_block = self
            .blocks
            .create(Some(parent), BlockOwner::Namespace(url.clone()));
        let symbol = Symbol::new(
            url,
            SymbolKind::Namespace(NamespaceSymbol {
                access,
                members: Default::default(),
                block: Some(ns_block),
            }),
        );
        self.put_declaration(block, name, symbol, BindingKind::Descriptor, None)
    }

    pub fn namespace_block(&self, namespace: &SymbolUrl) -> Result<BlockAddress> {
        self.symbols
            .symbol_or_err(namespace)?
            .as_namespace()
            .and_then(|n| n.block)
            .ok_or_else(|| AssemblerError::invariant(format!("`{namespace}` has no block")))
    }

    /// Reserve `name` for a definition whose shape is not known yet.
    pub fn declare_linkage(
        &mut self,
        block: BlockAddress,
        name: &str,
        section: LinkageSection,
    ) -> Result<SymbolUrl> {
        let url = self.make_symbol_url(block, name)?;
        let symbol = Symbol::new(url, SymbolKind::Linkage(section));
        self.put_declaration(block, name, symbol, BindingKind::Placeholder, None)
    }

    fn check_superclass(&mut self, url: &SymbolUrl, superclass: &SymbolUrl, section: LinkageSection) -> Result<()> {
        let local = self.is_local(superclass);
        let symbol = self.get_or_import_symbol(superclass)?;
        let invalid = || AssemblerError::InvalidSuperclass {
            symbol: url.clone(),
            superclass: superclass.clone(),
        };
        if symbol.linkage_section() != section {
            return Err(invalid());
        }
        let derive = match &symbol.kind {
            SymbolKind::Existential(e) => e.derive,
            _ => symbol.as_composite().map(|c| c.derive).unwrap_or_default(),
        };
        match derive {
            DeriveType::Final => Err(invalid()),
            DeriveType::Sealed if !local => Err(invalid()),
            _ => Ok(()),
        }
    }

    fn declare_composite(
        &mut self,
        block: BlockAddress,
        name: &str,
        section: LinkageSection,
        spec: CompositeSpec,
    ) -> Result<SymbolUrl> {
        self.check_declarable(block, name)?;
        let url = self.make_symbol_url(block, name)?;
        let superclass = match spec.superclass {
            Some(superclass) => Some(superclass),
            None if section == LinkageSection::Class
                && self.options.prelude_location.is_some() =>
            {
                Some(self.fundamentals.url(Fundamental::Object))
            }
            None => None,
        };
        if let Some(superclass) = &superclass {
            self.check_superclass(&url, superclass, section)?;
        }

        for concept in &spec.concepts {
            if !matches!(self.get_or_import_symbol(concept)?.kind, SymbolKind::Concept(_)) {
                return Err(AssemblerError::NotAConcept(concept.clone()));
            }
        }

        let type_def = TypeDef::concrete(url.clone());
        if !self.types.has_type_declaration(&url) {
            let supertypes: Vec<TypeDef> = superclass
                .iter()
                .chain(&spec.concepts)
                .cloned()
                .map(TypeDef::concrete)
                .collect();
            let supertype = (!supertypes.is_empty()).then(|| TypeDef::intersection(supertypes));
            self.types.declare_subtype(url.clone(), supertype)?;
        }

        let parent = self.declaration_block(block);
        let composite_block = self
            .blocks
            .create(Some(parent), BlockOwner::Composite(url.clone()));
        let ctor = url.child(CTOR_NAME)?;
        let composite = CompositeSymbol {
            access: spec.access,
            derive: spec.derive,
            is_abstract: spec.is_abstract,
            superclass,
            ctor: Some(ctor.clone()),
            members: Default::default(),
            methods: Default::default(),
            type_def: type_def.clone(),
            block: Some(composite_block),
        };
        let kind = match section {
            LinkageSection::Class => SymbolKind::Class(composite),
            LinkageSection::Struct => SymbolKind::Struct(composite),
            LinkageSection::Instance => SymbolKind::Instance(composite),
            LinkageSection::Enum => SymbolKind::Enum(composite),
            other => {
                return Err(AssemblerError::invariant(format!(
                    "{other} is not a composite section"
                )));
            }
        };
        let url = self.put_declaration(
            block,
            name,
            Symbol::new(url, kind),
            BindingKind::Descriptor,
            Some(type_def),
        )?;

        let ctor_block = self
            .blocks
            .create(Some(composite_block), BlockOwner::Proc(ctor.clone()));
        let proc = self.push_proc(ctor.clone(), ctor_block);
        self.symbols.insert_symbol(Symbol::new(
            ctor,
            SymbolKind::Call(CallSymbol {
                access: AccessType::Public,
                mode: CallMode::Constructor,
                receiver: Some(url.clone()),
                parameters: Vec::new(),
                rest: None,
                result_type: None,
                is_initializer: false,
                defined: false,
                finalized: false,
                proc: Some(proc),
            }),
        ))?;
        Ok(url)
    }

    /// Declare a class with an implicit `$ctor`. Final superclasses, and
    /// sealed superclasses from other modules, are rejected.
    pub fn declare_class(
        &mut self,
        block: BlockAddress,
        name: &str,
        spec: CompositeSpec,
    ) -> Result<SymbolUrl> {
        self.declare_composite(block, name, LinkageSection::Class, spec)
    }

    pub fn declare_struct(&mut self, block: BlockAddress, name: &str, spec: CompositeSpec) -> Result<SymbolUrl> {
        self.declare_composite(block, name, LinkageSection::Struct, spec)
    }

    pub fn declare_instance(&mut self, block: BlockAddress, name: &str, spec: CompositeSpec) -> Result<SymbolUrl> {
        self.declare_composite(block, name, LinkageSection::Instance, spec)
    }

    pub fn declare_enum(&mut self, block: BlockAddress, name: &str, spec: CompositeSpec) -> Result<SymbolUrl> {
        self.declare_composite(block, name, LinkageSection::Enum, spec)
    }

    fn composite(&self, url: &SymbolUrl) -> Result<&CompositeSymbol> {
        self.symbols
            .symbol_or_err(url)?
            .as_composite()
            .ok_or_else(|| AssemblerError::invariant(format!("`{url}` is not a composite")))
    }

    pub fn composite_block(&self, url: &SymbolUrl) -> Result<BlockAddress> {
        self.composite(url)?
            .block
            .ok_or_else(|| AssemblerError::invariant(format!("`{url}` has no block")))
    }

    /// Constructor the `$ctor` of `composite` chains to, if any.
    pub fn superclass_ctor(&mut self, composite: &SymbolUrl) -> Result<Option<SymbolUrl>> {
        let Some(superclass) = self.composite(composite)?.superclass.clone() else {
            return Ok(None);
        };
        let ctor = self
            .get_or_import_symbol(&superclass)?
            .as_composite()
            .and_then(|c| c.ctor.clone());
        if let Some(ctor) = &ctor {
            self.get_or_import_symbol(ctor)?;
        }
        Ok(ctor)
    }

    pub fn declare_field(
        &mut self,
        composite: &SymbolUrl,
        name: &str,
        access: AccessType,
        binding: BindingType,
        type_def: TypeDef,
    ) -> Result<SymbolUrl> {
        self.types.intern_type(&type_def)?;
        let block = self.composite_block(composite)?;
        let url = composite.child(name)?;
        self.symbols.insert_symbol(Symbol::new(
            url.clone(),
            SymbolKind::Field(FieldSymbol {
                access,
                binding,
                type_def: type_def.clone(),
            }),
        ))?;
        self.blocks.bind(
            block,
            name,
            Binding {
                url: url.clone(),
                type_def: Some(type_def),
                kind: BindingKind::Descriptor,
            },
        )?;
        let symbol = self.symbols.symbol_mut_or_err(composite)?;
        if let Some(c) = symbol.as_composite_mut() {
            c.members.insert(name.to_owned(), url.clone());
        }
        Ok(url)
    }

    /// Every field of `composite`, superclass fields first.
    pub fn all_fields(&mut self, composite: &SymbolUrl) -> Result<Vec<SymbolUrl>> {
        let mut chain = Vec::new();
        let mut next = Some(composite.clone());
        while let Some(url) = next {
            if chain.len() > 256 {
                return Err(AssemblerError::invariant(format!("superclass cycle at `{url}`")));
            }
            let symbol = self.get_or_import_symbol(&url)?;
            let Some(c) = symbol.as_composite() else {
                break;
            };
            next = c.superclass.clone();
            chain.push(c.members.values().cloned().collect::<Vec<_>>());
        }
        Ok(chain.into_iter().rev().flatten().collect())
    }

    fn new_call(
        &mut self,
        url: SymbolUrl,
        parent: BlockAddress,
        access: AccessType,
        receiver: Option<SymbolUrl>,
    ) -> (Symbol, usize) {
        let block = self.blocks.create(Some(parent), BlockOwner::Proc(url.clone()));
        let proc = self.push_proc(url.clone(), block);
        let symbol = Symbol::new(
            url,
            SymbolKind::Call(CallSymbol {
                access,
                mode: CallMode::Normal,
                receiver,
                parameters: Vec::new(),
                rest: None,
                result_type: None,
                is_initializer: false,
                defined: false,
                finalized: false,
                proc: Some(proc),
            }),
        );
        (symbol, proc)
    }

    pub fn declare_method(
        &mut self,
        composite: &SymbolUrl,
        name: &str,
        access: AccessType,
    ) -> Result<SymbolUrl> {
        let block = self.composite_block(composite)?;
        if self.blocks.lookup_local(block, name).is_some() {
            return Err(AssemblerError::NameAlreadyBound(name.to_owned()));
        }
        let url = composite.child(name)?;
        let (symbol, _) = self.new_call(url.clone(), block, access, Some(composite.clone()));
        self.symbols.insert_symbol(symbol)?;
        self.blocks.bind(block, name, Binding::descriptor(url.clone()))?;
        let symbol = self.symbols.symbol_mut_or_err(composite)?;
        if let Some(c) = symbol.as_composite_mut() {
            c.methods.insert(name.to_owned(), url.clone());
        }
        Ok(url)
    }

    /// Find `name` among the methods of `composite` and its superclasses.
    pub fn find_method(&mut self, composite: &SymbolUrl, name: &str) -> Result<Option<SymbolUrl>> {
        let mut next = Some(composite.clone());
        let mut depth = 0;
        while let Some(url) = next {
            depth += 1;
            if depth > 256 {
                break;
            }
            let symbol = self.get_or_import_symbol(&url)?;
            let (methods, superclass) = match &symbol.kind {
                SymbolKind::Existential(e) => (&e.methods, e.superclass.clone()),
                _ => match symbol.as_composite() {
                    Some(c) => (&c.methods, c.superclass.clone()),
                    None => return Ok(None),
                },
            };
            if let Some(method) = methods.get(name) {
                let method = method.clone();
                self.get_or_import_symbol(&method)?;
                return Ok(Some(method));
            }
            next = superclass;
        }
        Ok(None)
    }

    pub fn declare_function(
        &mut self,
        block: BlockAddress,
        name: &str,
        access: AccessType,
    ) -> Result<SymbolUrl> {
        self.check_declarable(block, name)?;
        let url = self.make_symbol_url(block, name)?;
        let (symbol, _) = self.new_call(url, block, access, None);
        self.put_declaration(block, name, symbol, BindingKind::Descriptor, None)
    }

    /// Attach a signature to a declared call and bind its arguments.
    pub fn define_call(
        &mut self,
        call: &SymbolUrl,
        parameters: Vec<Parameter>,
        rest: Option<Parameter>,
        result_type: Option<TypeDef>,
    ) -> Result<()> {
        let symbol = self.symbols.symbol_or_err(call)?;
        let existing = symbol
            .as_call()
            .ok_or_else(|| AssemblerError::invariant(format!("`{call}` is not a call")))?;
        if symbol.imported {
            return Err(AssemblerError::invariant(format!("cannot define imported `{call}`")));
        }
        if existing.defined {
            return Err(AssemblerError::CallAlreadyDefined(call.clone()));
        }

        for param in parameters.iter().chain(rest.iter()) {
            self.types.intern_type(&param.type_def)?;
        }
        if let Some(t) = &result_type {
            self.types.intern_type(t)?;
        }

        let block = self.proc(call)?.block();
        let mut names = HashSet::new();
        for param in &parameters {
            if !names.insert(param.name.as_str())
                || self.blocks.lookup_local(block, &param.name).is_some()
            {
                return Err(AssemblerError::NameAlreadyBound(param.name.clone()));
            }
        }
        for (offset, param) in parameters.iter().enumerate() {
            let url = self.unique_child(call, &param.name)?;
            self.symbols.insert_symbol(Symbol::new(
                url.clone(),
                SymbolKind::Argument(VariableSymbol {
                    name: param.name.clone(),
                    binding: param.binding,
                    type_def: param.type_def.clone(),
                    offset: offset as u32,
                    proc_call: call.clone(),
                }),
            ))?;
            self.blocks.bind(
                block,
                &param.name,
                Binding {
                    url,
                    type_def: Some(param.type_def.clone()),
                    kind: binding_kind(param.binding),
                },
            )?;
        }
        let num_arguments = u16::try_from(parameters.len())
            .map_err(|_| AssemblerError::invariant(format!("too many parameters in `{call}`")))?;
        self.proc_mut(call)?.set_num_arguments(num_arguments);

        let symbol = self.symbols.symbol_mut_or_err(call)?;
        if let Some(c) = symbol.as_call_mut() {
            c.parameters = parameters;
            c.rest = rest;
            c.result_type = result_type;
            c.defined = true;
        }
        Ok(())
    }

    /// Close a call and return its result type.
    ///
    /// Every exit type must be a subtype of the declared result type. A call
    /// without a declared result type gets the unification of its exits.
    pub fn finalize_call(&mut self, call: &SymbolUrl) -> Result<TypeDef> {
        let symbol = self.symbols.symbol_or_err(call)?;
        let declared = symbol
            .as_call()
            .ok_or_else(|| AssemblerError::invariant(format!("`{call}` is not a call")))?
            .result_type
            .clone();
        let exits = self.proc(call)?.exit_types().to_vec();

        let result = match declared {
            Some(declared) => {
                for exit in &exits {
                    if !self.types.is_subtype(exit, &declared) {
                        return Err(AssemblerError::TypeMismatch {
                            expected: declared,
                            actual: exit.clone(),
                        });
                    }
                }
                declared
            }
            None => {
                let mut exits = exits.into_iter();
                match exits.next() {
                    Some(first) => exits.fold(first, |acc, t| self.types.unify(&acc, &t)),
                    None => TypeDef::NoReturn,
                }
            }
        };
        self.types.intern_type(&result)?;

        let symbol = self.symbols.symbol_mut_or_err(call)?;
        if let Some(c) = symbol.as_call_mut() {
            c.result_type = Some(result.clone());
            c.defined = true;
            c.finalized = true;
        }
        Ok(result)
    }

    /// Declare a static and its `$init` initializer call.
    pub fn declare_static(
        &mut self,
        block: BlockAddress,
        name: &str,
        binding: BindingType,
        type_def: TypeDef,
    ) -> Result<SymbolUrl> {
        self.check_declarable(block, name)?;
        self.types.intern_type(&type_def)?;
        let url = self.make_symbol_url(block, name)?;
        let init = url.child(INITIALIZER_NAME)?;
        let parent = self.declaration_block(block);
        let (mut init_symbol, _) = self.new_call(init.clone(), parent, AccessType::Public, None);
        if let Some(c) = init_symbol.as_call_mut() {
            c.is_initializer = true;
            c.defined = true;
            c.result_type = Some(type_def.clone());
        }
        let symbol = Symbol::new(
            url,
            SymbolKind::Static(StaticSymbol {
                binding,
                type_def: type_def.clone(),
                initializer: Some(init),
            }),
        );
        let url = self.put_declaration(block, name, symbol, binding_kind(binding), Some(type_def))?;
        self.symbols.insert_symbol(init_symbol)?;
        Ok(url)
    }

    pub fn static_initializer(&self, url: &SymbolUrl) -> Result<SymbolUrl> {
        match &self.symbols.symbol_or_err(url)?.kind {
            SymbolKind::Static(StaticSymbol {
                initializer: Some(init),
                ..
            }) => Ok(init.clone()),
            _ => Err(AssemblerError::invariant(format!("`{url}` has no initializer"))),
        }
    }

    pub fn finalize_initializer(&mut self, url: &SymbolUrl) -> Result<TypeDef> {
        let init = self.static_initializer(url)?;
        self.finalize_call(&init)
    }

    pub fn declare_existential(
        &mut self,
        block: BlockAddress,
        name: &str,
        spec: ExistentialSpec,
    ) -> Result<SymbolUrl> {
        self.check_declarable(block, name)?;
        let url = self.make_symbol_url(block, name)?;
        if let Some(superclass) = &spec.superclass {
            self.check_superclass(&url, superclass, LinkageSection::Existential)?;
        }
        let type_def = TypeDef::concrete(url.clone());
        self.types
            .declare_subtype(url.clone(), spec.superclass.clone().map(TypeDef::concrete))?;
        if spec.intrinsic == Intrinsic::Any && self.types.top().is_none() {
            self.types.set_top(url.clone());
        }
        let symbol = Symbol::new(
            url,
            SymbolKind::Existential(ExistentialSymbol {
                access: spec.access,
                derive: spec.derive,
                intrinsic: spec.intrinsic,
                superclass: spec.superclass,
                methods: Default::default(),
                type_def: type_def.clone(),
            }),
        );
        self.put_declaration(block, name, symbol, BindingKind::Descriptor, Some(type_def))
    }

    /// Method of an existential, implemented by a proc or a trap.
    pub fn declare_existential_method(
        &mut self,
        existential: &SymbolUrl,
        name: &str,
        access: AccessType,
    ) -> Result<SymbolUrl> {
        let parent = match &self.root {
            Some(root) => root.root_block,
            None => self.blocks.create(None, BlockOwner::Nested),
        };
        let url = existential.child(name)?;
        let (symbol, _) = self.new_call(url.clone(), parent, access, Some(existential.clone()));
        self.symbols.insert_symbol(symbol)?;
        let symbol = self.symbols.symbol_mut_or_err(existential)?;
        match &mut symbol.kind {
            SymbolKind::Existential(e) => {
                e.methods.insert(name.to_owned(), url.clone());
            }
            _ => {
                return Err(AssemblerError::invariant(format!(
                    "`{existential}` is not an existential"
                )));
            }
        }
        Ok(url)
    }

    pub fn declare_concept(
        &mut self,
        block: BlockAddress,
        name: &str,
        access: AccessType,
    ) -> Result<SymbolUrl> {
        self.check_declarable(block, name)?;
        let url = self.make_symbol_url(block, name)?;
        let parent = self.declaration_block(block);
        let concept_block = self
            .blocks
            .create(Some(parent), BlockOwner::Concept(url.clone()));
        let type_def = TypeDef::concrete(url.clone());
        self.types.declare_subtype(url.clone(), None)?;
        let symbol = Symbol::new(
            url,
            SymbolKind::Concept(ConceptSymbol {
                access,
                actions: Default::default(),
                type_def: type_def.clone(),
                block: Some(concept_block),
            }),
        );
        self.put_declaration(block, name, symbol, BindingKind::Descriptor, Some(type_def))
    }

    pub fn declare_action(
        &mut self,
        concept: &SymbolUrl,
        name: &str,
        parameters: Vec<Parameter>,
        rest: Option<Parameter>,
        result_type: TypeDef,
    ) -> Result<SymbolUrl> {
        for param in parameters.iter().chain(rest.iter()) {
            self.types.intern_type(&param.type_def)?;
        }
        self.types.intern_type(&result_type)?;
        let url = concept.child(name)?;
        self.symbols.insert_symbol(Symbol::new(
            url.clone(),
            SymbolKind::Action(ActionSymbol {
                receiver: Some(concept.clone()),
                parameters,
                rest,
                result_type: Some(result_type),
            }),
        ))?;
        match &mut self.symbols.symbol_mut_or_err(concept)?.kind {
            SymbolKind::Concept(c) => {
                c.actions.insert(name.to_owned(), url.clone());
                Ok(url)
            }
            _ => Err(AssemblerError::invariant(format!("`{concept}` is not a concept"))),
        }
    }

    /// Declare a local of the proc enclosing `block`.
    ///
    /// Fails only if `name` is already bound in `block` itself.
    pub fn declare_variable(
        &mut self,
        block: BlockAddress,
        name: &str,
        type_def: TypeDef,
        binding: BindingType,
    ) -> Result<SymbolUrl> {
        if self.blocks.lookup_local(block, name).is_some() {
            return Err(AssemblerError::NameAlreadyBound(name.to_owned()));
        }
        self.types.intern_type(&type_def)?;
        let call = self.enclosing_call(block)?;
        let offset = self.proc_mut(&call)?.allocate_local()?;
        let url = self.unique_child(&call, name)?;
        self.symbols.insert_symbol(Symbol::new(
            url.clone(),
            SymbolKind::Local(VariableSymbol {
                name: name.to_owned(),
                binding,
                type_def: type_def.clone(),
                offset,
                proc_call: call,
            }),
        ))?;
        self.blocks.bind(
            block,
            name,
            Binding {
                url: url.clone(),
                type_def: Some(type_def),
                kind: binding_kind(binding),
            },
        )?;
        Ok(url)
    }

    /// Bind `name` to an existing symbol.
    pub fn declare_alias(&mut self, block: BlockAddress, name: &str, url: &SymbolUrl) -> Result<()> {
        self.get_or_import_symbol(url)?;
        self.blocks.bind(block, name, Binding::descriptor(url.clone()))
    }

    /// Make `url` visible in `block` under its name (or `alias`).
    ///
    /// Repeating the same `using` is a no-op; binding a different symbol
    /// under a taken name fails.
    pub fn use_symbol(
        &mut self,
        block: BlockAddress,
        url: &SymbolUrl,
        alias: Option<&str>,
    ) -> Result<()> {
        self.get_or_import_symbol(url)?;
        let name = alias.unwrap_or(url.name()).to_owned();
        if let Some(existing) = self.blocks.lookup_local(block, &name) {
            if existing.url == *url {
                return Ok(());
            }
            return Err(AssemblerError::NameAlreadyBound(name));
        }
        self.blocks.bind(block, &name, Binding::descriptor(url.clone()))
    }

    /// Resolve `name` from `block` outward.
    ///
    /// A variable owned by another proc is captured as a lexical of the
    /// current proc; the lexical's url is returned instead.
    pub fn resolve_reference(&mut self, block: BlockAddress, name: &str) -> Result<SymbolUrl> {
        let (found_in, binding) = self
            .blocks
            .find_binding(block, name)
            .ok_or_else(|| AssemblerError::SymbolNotFound(name.to_owned()))?;
        let url = binding.url.clone();
        let kind = binding.kind;

        if !matches!(kind, BindingKind::Value | BindingKind::Variable) {
            return Ok(url);
        }
        let target = match &self.symbols.symbol_or_err(&url)?.kind {
            SymbolKind::Argument(_) | SymbolKind::Local(_) => url.clone(),
            SymbolKind::Lexical(l) => l.target.clone(),
            _ => return Ok(url),
        };
        let (Some((_, owner)), Some((current_block, current))) = (
            self.blocks.enclosing_proc(found_in),
            self.blocks.enclosing_proc(block),
        ) else {
            return Ok(url);
        };
        if owner == current {
            return Ok(url);
        }
        let current = current.clone();
        self.capture(current_block, &current, name, &target)
    }

    fn capture(
        &mut self,
        proc_block: BlockAddress,
        call: &SymbolUrl,
        name: &str,
        target: &SymbolUrl,
    ) -> Result<SymbolUrl> {
        let (variable, target_kind) = match &self.symbols.symbol_or_err(target)?.kind {
            SymbolKind::Argument(v) => (v.clone(), LEXICAL_ARGUMENT),
            SymbolKind::Local(v) => (v.clone(), LEXICAL_LOCAL),
            _ => {
                return Err(AssemblerError::invariant(format!(
                    "cannot capture `{target}`"
                )));
            }
        };
        let offset = self.proc_mut(call)?.capture(LexicalRef {
            activation_call: variable.proc_call.clone(),
            target_offset: variable.offset,
            target_kind,
            target: target.clone(),
        });
        let url = self.unique_child(call, name)?;
        self.symbols.insert_symbol(Symbol::new(
            url.clone(),
            SymbolKind::Lexical(LexicalSymbol {
                name: name.to_owned(),
                binding: variable.binding,
                type_def: variable.type_def.clone(),
                offset,
                target: target.clone(),
            }),
        ))?;
        self.blocks.bind(
            proc_block,
            name,
            Binding {
                url: url.clone(),
                type_def: Some(variable.type_def),
                kind: binding_kind(variable.binding),
            },
        )?;
        Ok(url)
    }

    /// Resolve a dotted path: the first segment by scope, the rest as members.
    pub fn resolve_binding(&mut self, block: BlockAddress, path: &[&str]) -> Result<SymbolUrl> {
        let (first, rest) = path
            .split_first()
            .ok_or_else(|| AssemblerError::invariant("empty binding path"))?;
        let mut url = self.resolve_reference(block, first)?;
        for segment in rest {
            let symbol = self.get_or_import_symbol(&url)?;
            url = symbol
                .member(segment)
                .cloned()
                .ok_or_else(|| AssemblerError::SymbolNotFound(path.join(".")))?;
        }
        self.get_or_import_symbol(&url)?;
        Ok(url)
    }

    /// Value type of the symbol at `url`.
    pub fn symbol_type(&mut self, url: &SymbolUrl) -> Result<TypeDef> {
        let fundamentals = self.fundamentals.clone();
        let symbol = self.get_or_import_symbol(url)?;
        let type_def = match &symbol.kind {
            SymbolKind::Call(_) => fundamentals.type_def(Fundamental::Call),
            SymbolKind::Namespace(_) => fundamentals.type_def(Fundamental::Namespace),
            _ => symbol.type_def().cloned().unwrap_or(TypeDef::Invalid),
        };
        Ok(type_def)
    }

    /// Opcode and operand that push the value of `url`.
    pub fn load_operand(&mut self, url: &SymbolUrl) -> Result<(Opcode, PendingOperand)> {
        let symbol = self.get_or_import_symbol(url)?;
        let slot = |flags, index| (Opcode::Load, PendingOperand::Slot { flags, index });
        let by_url = |flags| {
            (
                Opcode::Load,
                PendingOperand::Symbol {
                    flags,
                    url: url.clone(),
                },
            )
        };
        let access = match &symbol.kind {
            SymbolKind::Argument(v) => slot(op_flags::ARGUMENT, v.offset),
            SymbolKind::Local(v) => slot(op_flags::LOCAL, v.offset),
            SymbolKind::Lexical(l) => slot(op_flags::LEXICAL, l.offset),
            SymbolKind::Field(_) => by_url(op_flags::FIELD),
            SymbolKind::Static(_) => by_url(op_flags::STATIC),
            SymbolKind::Instance(_) => by_url(op_flags::INSTANCE),
            SymbolKind::Enum(_) => by_url(op_flags::ENUM),
            _ => {
                let section = symbol.linkage_section();
                if section == LinkageSection::Invalid {
                    return Err(AssemblerError::invariant(format!(
                        "`{url}` has no runtime value"
                    )));
                }
                (
                    Opcode::Descriptor,
                    PendingOperand::Symbol {
                        flags: section.as_u8(),
                        url: url.clone(),
                    },
                )
            }
        };
        Ok(access)
    }

    /// Operand of a `STORE` to `url`. Value bindings may only be stored
    /// while `initializing`.
    pub fn store_operand(&mut self, url: &SymbolUrl, initializing: bool) -> Result<PendingOperand> {
        let symbol = self.get_or_import_symbol(url)?;
        let binding = match &symbol.kind {
            SymbolKind::Argument(v) | SymbolKind::Local(v) => v.binding,
            SymbolKind::Lexical(l) => l.binding,
            SymbolKind::Field(f) => f.binding,
            SymbolKind::Static(s) => s.binding,
            _ => return Err(AssemblerError::NotAssignable(url.clone())),
        };
        if binding == BindingType::Value && !initializing {
            return Err(AssemblerError::NotAssignable(url.clone()));
        }
        let operand = match &symbol.kind {
            SymbolKind::Argument(v) => PendingOperand::Slot {
                flags: op_flags::ARGUMENT,
                index: v.offset,
            },
            SymbolKind::Local(v) => PendingOperand::Slot {
                flags: op_flags::LOCAL,
                index: v.offset,
            },
            SymbolKind::Lexical(l) => PendingOperand::Slot {
                flags: op_flags::LEXICAL,
                index: l.offset,
            },
            SymbolKind::Field(_) => PendingOperand::Symbol {
                flags: op_flags::FIELD,
                url: url.clone(),
            },
            _ => PendingOperand::Symbol {
                flags: op_flags::STATIC,
                url: url.clone(),
            },
        };
        Ok(operand)
    }

    /// Run the peephole optimizer over every proc.
    pub fn optimize(&mut self) {
        for proc in self.procs_mut() {
            crate::optimizer::optimize_proc(proc);
        }
    }

    /// Serialize with default writer options.
    pub fn to_object(&self) -> Result<LyricObject> {
        self.to_object_with(WriterOptions {
            touch_unused_imports: self.options.touch_unused_imports,
            ..WriterOptions::default()
        })
    }

    pub fn to_object_with(&self, options: WriterOptions) -> Result<LyricObject> {
        Ok(LyricObject::from_bytes(self.to_bytes_with(options)?)?)
    }

    pub fn to_bytes_with(&self, options: WriterOptions) -> Result<Vec<u8>> {
        ObjectWriter::new(self, options).write()
    }
}

fn binding_kind(binding: BindingType) -> BindingKind {
    match binding {
        BindingType::Value => BindingKind::Value,
        BindingType::Variable => BindingKind::Variable,
    }
}
