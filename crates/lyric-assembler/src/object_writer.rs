//! Serialization of an [`ObjectState`] into the object format.
//!
//! Writing happens in two passes. The first walks the symbol graph from a
//! fixed set of roots and assigns every reachable symbol its address: a
//! descriptor index for local symbols, a link for imported ones. The second
//! emits descriptors and assembles procs, resolving every reference through
//! the address map built by the first.

use std::collections::{HashMap, VecDeque};

use indexmap::IndexSet;
use lyric_common::{SymbolUrl, TypeDef};
use lyric_object::{
    Address, BindingDescriptor, CallDescriptor, CallFlags, CompositeDescriptor,
    ConceptDescriptor, ActionDescriptor, ExistentialDescriptor, FieldDescriptor, INVALID_ADDRESS,
    LinkageSection, LiteralDescriptor, MethodDescriptor, NO_PARENT_CHECK, NamespaceDescriptor,
    ObjectBuilder, ParameterDescriptor, ProcCheck, ProcException, ProcInfo, ProcLexical,
    StaticDescriptor, TypeDescriptor, TypeKind,
};

use crate::code::{LiteralValue, OperandResolver};
use crate::error::{AssemblerError, Result};
use crate::object_state::ObjectState;
use crate::proc_handle::ProcHandle;
use crate::symbol::{BindingType, CompositeSymbol, Parameter, Symbol, SymbolKind};

#[derive(Clone, Copy, Debug)]
pub struct WriterOptions {
    /// Emit `$global`, and `$entry` when the entry proc has code.
    pub root_symbols: bool,
    /// Emit an import for every module the state imported.
    pub touch_unused_imports: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            root_symbols: true,
            touch_unused_imports: false,
        }
    }
}

pub struct ObjectWriter<'a> {
    state: &'a ObjectState,
    options: WriterOptions,
    builder: ObjectBuilder,
    queue: VecDeque<SymbolUrl>,
    seen: IndexSet<SymbolUrl>,
    addresses: HashMap<SymbolUrl, Address>,
    /// Local symbols per section, in descriptor index order.
    sections: HashMap<LinkageSection, Vec<SymbolUrl>>,
    types: HashMap<TypeDef, u32>,
}

impl<'a> ObjectWriter<'a> {
    pub fn new(state: &'a ObjectState, options: WriterOptions) -> Self {
        Self {
            state,
            options,
            builder: ObjectBuilder::new(),
            queue: VecDeque::new(),
            seen: IndexSet::new(),
            addresses: HashMap::new(),
            sections: HashMap::new(),
            types: HashMap::new(),
        }
    }

    pub fn write(mut self) -> Result<Vec<u8>> {
        self.layout()?;
        self.finish()
    }

    /// First pass: give every written symbol its address.
    pub fn layout(&mut self) -> Result<()> {
        self.check_finalized()?;
        self.seed()?;
        while let Some(url) = self.queue.pop_front() {
            self.place(url)?;
        }
        Ok(())
    }

    /// Section and address of every symbol placed so far, in placement order.
    pub fn placements(&self) -> Vec<(SymbolUrl, LinkageSection, Address)> {
        self.seen
            .iter()
            .filter_map(|url| {
                let address = *self.addresses.get(url)?;
                Some((url.clone(), self.section_of(Some(url)), address))
            })
            .collect()
    }

    /// Second pass: emit descriptors and procs, then lay out the object.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        self.emit_descriptors()?;
        Ok(self.builder.build()?)
    }

    fn enqueue(&mut self, url: &SymbolUrl) {
        if !self.seen.contains(url) {
            self.queue.push_back(url.clone());
        }
    }

    /// Every local call must be closed, written or not. A code-less
    /// `$entry` is the one exception since it is never emitted.
    fn check_finalized(&self) -> Result<()> {
        let state = self.state;
        let entry = state.entry_call().ok();
        for (_, symbol) in state.symbols().iter() {
            let Some(call) = symbol.as_call() else {
                continue;
            };
            if symbol.imported || call.finalized {
                continue;
            }
            if Some(&symbol.url) == entry && !state.proc(&symbol.url)?.has_code() {
                continue;
            }
            return Err(AssemblerError::Unfinalized(symbol.url.clone()));
        }
        Ok(())
    }

    fn seed(&mut self) -> Result<()> {
        let state = self.state;
        let mut global = None;
        if let (Ok(entry), Ok(g)) = (state.entry_call(), state.global_namespace()) {
            global = Some(g.clone());
            if self.options.root_symbols {
                if state.proc(entry)?.has_code() {
                    self.enqueue(entry);
                }
                self.enqueue(g);
            }
        }

        for (_, symbol) in state.symbols().iter() {
            if symbol.imported {
                continue;
            }
            let seeded = match &symbol.kind {
                SymbolKind::Namespace(ns) => {
                    ns.access == lyric_object::AccessType::Public
                        && Some(&symbol.url) != global.as_ref()
                }
                SymbolKind::Linkage(_) => true,
                _ => false,
            };
            if seeded {
                self.enqueue(&symbol.url);
            }
        }
        for symbol in state.symbols().touched() {
            self.enqueue(&symbol.url);
        }

        if self.options.touch_unused_imports {
            for import in state.imports().imports() {
                self.builder
                    .add_import(&import.location.to_string(), import.flags);
            }
        }
        Ok(())
    }

    /// Assign an address to `url` and queue what its descriptor refers to.
    fn place(&mut self, url: SymbolUrl) -> Result<()> {
        if !self.seen.insert(url.clone()) {
            return Ok(());
        }
        let state = self.state;
        let symbol = state
            .symbols()
            .get_symbol(&url)
            .ok_or_else(|| AssemblerError::MissingSymbol(url.clone()))?;
        let section = symbol.linkage_section();

        if symbol.imported {
            let location = url
                .location()
                .ok_or_else(|| AssemblerError::UnresolvedLink(url.clone()))?;
            let import = state
                .imports()
                .get_import(location)
                .ok_or_else(|| AssemblerError::UnresolvedLink(url.clone()))?;
            let import = self
                .builder
                .add_import(&location.to_string(), import.flags);
            let address = self
                .builder
                .add_link(import, &url.path().to_string(), section);
            self.addresses.insert(url, address);
            return Ok(());
        }

        let path = url.path().to_string();
        if let SymbolKind::Linkage(section) = symbol.kind {
            self.builder.add_symbol(&path, section, INVALID_ADDRESS);
            self.addresses.insert(url, INVALID_ADDRESS);
            return Ok(());
        }
        if section == LinkageSection::Invalid {
            return Err(AssemblerError::invariant(format!(
                "`{url}` is a {:?} and cannot be written",
                symbol.symbol_type()
            )));
        }
        let entries = self.sections.entry(section).or_default();
        let index = entries.len() as u32;
        entries.push(url.clone());
        self.builder.add_symbol(&path, section, index);
        self.addresses.insert(url.clone(), index);

        for dependency in dependencies(state, symbol)? {
            self.enqueue(&dependency);
        }
        Ok(())
    }

    fn address(&self, url: Option<&SymbolUrl>) -> Result<Address> {
        match url {
            None => Ok(INVALID_ADDRESS),
            Some(url) => self.addresses.get(url).copied().ok_or_else(|| {
                AssemblerError::invariant(format!("`{url}` was referenced but not placed"))
            }),
        }
    }

    fn section_of(&self, url: Option<&SymbolUrl>) -> LinkageSection {
        url.and_then(|u| self.state.symbols().get_symbol(u))
            .map(Symbol::linkage_section)
            .unwrap_or(LinkageSection::Invalid)
    }

    fn emit_descriptors(&mut self) -> Result<()> {
        let state = self.state;
        for section in LinkageSection::ALL {
            let Some(urls) = self.sections.get(&section).cloned() else {
                continue;
            };
            for url in urls {
                let symbol = state.symbols().symbol_or_err(&url)?;
                self.emit_descriptor(symbol)?;
            }
        }
        Ok(())
    }

    fn emit_descriptor(&mut self, symbol: &'a Symbol) -> Result<()> {
        let state = self.state;
        let path = self.builder.intern(&symbol.url.path().to_string());
        match &symbol.kind {
            SymbolKind::Class(c)
            | SymbolKind::Struct(c)
            | SymbolKind::Instance(c)
            | SymbolKind::Enum(c) => {
                let section = symbol.linkage_section();
                let descriptor = self.composite(path, c)?;
                if let Some(table) = self.builder.tables_mut().composites_mut(section) {
                    table.push(descriptor);
                }
            }
            SymbolKind::Call(call) => {
                let mut flags = CallFlags::NONE;
                if call.receiver.is_some() {
                    flags = flags.union(CallFlags::BOUND);
                }
                if call.result_type == Some(TypeDef::NoReturn) {
                    flags = flags.union(CallFlags::NO_RETURN);
                }
                if call.is_initializer {
                    flags = flags.union(CallFlags::INITIALIZER);
                }
                let parameters = call
                    .parameters
                    .iter()
                    .map(|p| self.parameter(p))
                    .collect::<Result<Vec<_>>>()?;
                let rest = call.rest.as_ref().map(|p| self.parameter(p)).transpose()?;
                let result_type = self.type_index(call.result_type.as_ref().unwrap_or(&TypeDef::NoReturn))?;
                let proc_offset = match call.proc {
                    Some(index) => match state.procs().get(index) {
                        Some(proc) => self.emit_proc(proc)?,
                        None => INVALID_ADDRESS,
                    },
                    None => INVALID_ADDRESS,
                };
                let descriptor = CallDescriptor {
                    path,
                    access: call.access,
                    mode: call.mode,
                    flags,
                    receiver: self.address(call.receiver.as_ref())?,
                    receiver_section: self.section_of(call.receiver.as_ref()),
                    parameters,
                    rest,
                    result_type,
                    proc_offset,
                };
                self.builder.tables_mut().calls.push(descriptor);
            }
            SymbolKind::Field(f) => {
                let field_type = self.type_index(&f.type_def)?;
                self.builder.tables_mut().fields.push(FieldDescriptor {
                    path,
                    access: f.access,
                    is_variable: f.binding == BindingType::Variable,
                    field_type,
                });
            }
            SymbolKind::Static(s) => {
                let static_type = self.type_index(&s.type_def)?;
                let initializer = self.address(s.initializer.as_ref())?;
                self.builder.tables_mut().statics.push(StaticDescriptor {
                    path,
                    is_variable: s.binding == BindingType::Variable,
                    static_type,
                    initializer,
                });
            }
            SymbolKind::Namespace(ns) => {
                let mut bindings = Vec::with_capacity(ns.members.len());
                for (name, member) in &ns.members {
                    let name = self.builder.intern(name);
                    bindings.push(BindingDescriptor {
                        name,
                        section: self.section_of(Some(member)),
                        address: self.address(Some(member))?,
                    });
                }
                self.builder.tables_mut().namespaces.push(NamespaceDescriptor {
                    path,
                    access: ns.access,
                    bindings,
                });
            }
            SymbolKind::Existential(e) => {
                let methods = self.methods(e.methods.iter())?;
                let existential_type = self.type_index(&e.type_def)?;
                let superclass = self.address(e.superclass.as_ref())?;
                self.builder
                    .tables_mut()
                    .existentials
                    .push(ExistentialDescriptor {
                        path,
                        access: e.access,
                        derive: e.derive,
                        intrinsic: e.intrinsic,
                        superclass,
                        methods,
                        existential_type,
                    });
            }
            SymbolKind::Concept(c) => {
                let actions = c
                    .actions
                    .values()
                    .map(|a| self.address(Some(a)))
                    .collect::<Result<Vec<_>>>()?;
                let concept_type = self.type_index(&c.type_def)?;
                self.builder.tables_mut().concepts.push(ConceptDescriptor {
                    path,
                    access: c.access,
                    actions,
                    concept_type,
                });
            }
            SymbolKind::Action(a) => {
                let parameters = a
                    .parameters
                    .iter()
                    .map(|p| self.parameter(p))
                    .collect::<Result<Vec<_>>>()?;
                let rest = a.rest.as_ref().map(|p| self.parameter(p)).transpose()?;
                let result_type = self.type_index(a.result_type.as_ref().unwrap_or(&TypeDef::NoReturn))?;
                let receiver = self.address(a.receiver.as_ref())?;
                self.builder.tables_mut().actions.push(ActionDescriptor {
                    path,
                    receiver,
                    parameters,
                    rest,
                    result_type,
                });
            }
            other => {
                return Err(AssemblerError::invariant(format!(
                    "no descriptor for {other:?}"
                )));
            }
        }
        Ok(())
    }

    fn composite(
        &mut self,
        path: lyric_common::StringId,
        c: &CompositeSymbol,
    ) -> Result<CompositeDescriptor> {
        let fields = c
            .members
            .values()
            .map(|f| self.address(Some(f)))
            .collect::<Result<Vec<_>>>()?;
        Ok(CompositeDescriptor {
            path,
            access: c.access,
            derive: c.derive,
            is_abstract: c.is_abstract,
            superclass: self.address(c.superclass.as_ref())?,
            ctor: self.address(c.ctor.as_ref())?,
            fields,
            methods: self.methods(c.methods.iter())?,
            instance_type: self.type_index(&c.type_def)?,
        })
    }

    fn methods<'m>(
        &mut self,
        methods: impl Iterator<Item = (&'m String, &'m SymbolUrl)>,
    ) -> Result<Vec<MethodDescriptor>> {
        let mut out = Vec::new();
        for (name, call) in methods {
            let call = self.address(Some(call))?;
            out.push(MethodDescriptor {
                name: self.builder.intern(name),
                call,
            });
        }
        Ok(out)
    }

    fn parameter(&mut self, param: &Parameter) -> Result<ParameterDescriptor> {
        Ok(ParameterDescriptor {
            name: self.builder.intern(&param.name),
            param_type: self.type_index(&param.type_def)?,
            is_variable: param.binding == BindingType::Variable,
        })
    }

    /// Url text stored in a type descriptor: `#path` for local symbols.
    fn type_url(&mut self, url: &SymbolUrl) -> lyric_common::StringId {
        let text = if self.state.is_local(url) {
            format!("#{}", url.path())
        } else {
            url.to_string()
        };
        self.builder.intern(&text)
    }

    fn type_index(&mut self, type_def: &TypeDef) -> Result<u32> {
        if let Some(&index) = self.types.get(type_def) {
            return Ok(index);
        }
        let descriptor = match type_def {
            TypeDef::Concrete { url, args } => {
                let members = args
                    .iter()
                    .map(|a| self.type_index(a))
                    .collect::<Result<Vec<_>>>()?;
                TypeDescriptor {
                    kind: TypeKind::Concrete,
                    url: Some(self.type_url(url)),
                    members,
                }
            }
            TypeDef::Placeholder { template, index } => TypeDescriptor {
                kind: TypeKind::Placeholder,
                url: Some(self.type_url(template)),
                members: vec![*index],
            },
            TypeDef::Union(members) | TypeDef::Intersection(members) => {
                let kind = if matches!(type_def, TypeDef::Union(_)) {
                    TypeKind::Union
                } else {
                    TypeKind::Intersection
                };
                let members = members
                    .iter()
                    .map(|m| self.type_index(m))
                    .collect::<Result<Vec<_>>>()?;
                TypeDescriptor {
                    kind,
                    url: None,
                    members,
                }
            }
            TypeDef::SelfType => TypeDescriptor {
                kind: TypeKind::SelfType,
                url: None,
                members: Vec::new(),
            },
            TypeDef::NoReturn => TypeDescriptor {
                kind: TypeKind::NoReturn,
                url: None,
                members: Vec::new(),
            },
            TypeDef::Invalid => {
                return Err(AssemblerError::invariant("cannot write an invalid type"));
            }
        };
        let tables = self.builder.tables_mut();
        let index = tables.types.len() as u32;
        tables.types.push(descriptor);
        self.types.insert(type_def.clone(), index);
        Ok(index)
    }

    fn emit_proc(&mut self, proc: &ProcHandle) -> Result<u32> {
        if !proc.has_code() {
            return Ok(INVALID_ADDRESS);
        }

        let assembled = {
            let mut resolver = WriterResolver {
                addresses: &self.addresses,
                builder: &mut self.builder,
            };
            proc.code().assemble(&mut resolver)?
        };

        let lexicals = proc
            .lexicals()
            .iter()
            .map(|l| {
                Ok(ProcLexical {
                    activation_call: self.address(Some(&l.activation_call))?,
                    target_offset: l.target_offset,
                    lexical_target: l.target_kind,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut checks = Vec::with_capacity(proc.checks().len());
        let mut exceptions = Vec::new();
        for region in proc.checks() {
            let start = region.start.resolve(&assembled.labels)?;
            let end = region.end.resolve(&assembled.labels)?;
            let first_exception = exceptions.len();
            for catch in &region.catches {
                let catch_start = catch.start.resolve(&assembled.labels)?;
                let catch_end = catch.end.resolve(&assembled.labels)?;
                let exception_type = match &catch.exception_type {
                    Some(t) => self.type_index(t)?,
                    None => INVALID_ADDRESS,
                };
                exceptions.push(ProcException {
                    exception_type,
                    catch_offset: catch_start,
                    catch_size: catch_end.saturating_sub(catch_start),
                });
            }
            let parent_check = match region.parent {
                Some(p) => u16::try_from(p)
                    .map_err(|_| AssemblerError::invariant("too many checks"))?,
                None => NO_PARENT_CHECK,
            };
            checks.push(ProcCheck {
                interval_offset: start,
                interval_size: end.saturating_sub(start),
                parent_check,
                first_exception: u16::try_from(first_exception)
                    .map_err(|_| AssemblerError::invariant("too many exceptions"))?,
                num_exceptions: u16::try_from(region.catches.len())
                    .map_err(|_| AssemblerError::invariant("too many exceptions"))?,
            });
        }

        let info = ProcInfo {
            num_arguments: proc.num_arguments(),
            num_locals: proc.num_locals(),
            lexicals,
            code: assembled.code,
            checks,
            exceptions,
            cleanups: Vec::new(),
        };
        Ok(self.builder.add_proc(&info)?)
    }
}

struct WriterResolver<'w> {
    addresses: &'w HashMap<SymbolUrl, Address>,
    builder: &'w mut ObjectBuilder,
}

impl OperandResolver for WriterResolver<'_> {
    fn symbol_address(&mut self, url: &SymbolUrl) -> Result<Address> {
        self.addresses.get(url).copied().ok_or_else(|| {
            AssemblerError::invariant(format!("`{url}` is referenced by code but not placed"))
        })
    }

    fn literal_address(&mut self, literal: &LiteralValue) -> Result<Address> {
        let descriptor = match literal {
            LiteralValue::Nil => LiteralDescriptor::Nil,
            LiteralValue::Undef => LiteralDescriptor::Undef,
            LiteralValue::Bool(b) => LiteralDescriptor::Bool(*b),
            LiteralValue::I64(v) => LiteralDescriptor::I64(*v),
            LiteralValue::Dbl(v) => LiteralDescriptor::Dbl(*v),
            LiteralValue::Chr(c) => LiteralDescriptor::Chr(*c),
            LiteralValue::Utf8(s) => LiteralDescriptor::Utf8(self.builder.intern(s)),
        };
        let literals = &mut self.builder.tables_mut().literals;
        let existing = literals.iter().position(|l| same_literal(l, &descriptor));
        let index = existing.unwrap_or_else(|| {
            literals.push(descriptor);
            literals.len() - 1
        });
        Ok(index as Address)
    }
}

/// Literal equality with floats compared bitwise, so NaN literals dedup.
fn same_literal(a: &LiteralDescriptor, b: &LiteralDescriptor) -> bool {
    match (a, b) {
        (LiteralDescriptor::Dbl(x), LiteralDescriptor::Dbl(y)) => x.to_bits() == y.to_bits(),
        _ => a == b,
    }
}

/// Symbols the descriptor of `symbol` refers to.
fn dependencies(state: &ObjectState, symbol: &Symbol) -> Result<Vec<SymbolUrl>> {
    let mut out = Vec::new();
    match &symbol.kind {
        SymbolKind::Class(c)
        | SymbolKind::Struct(c)
        | SymbolKind::Instance(c)
        | SymbolKind::Enum(c) => {
            out.extend(c.superclass.iter().cloned());
            out.extend(c.ctor.iter().cloned());
            out.extend(c.members.values().cloned());
            out.extend(c.methods.values().cloned());
        }
        SymbolKind::Call(call) => {
            out.extend(call.receiver.iter().cloned());
            if let Some(index) = call.proc {
                let proc = state.procs().get(index).ok_or_else(|| {
                    AssemblerError::invariant(format!("`{}` has no proc", symbol.url))
                })?;
                out.extend(proc.code().symbol_references().into_iter().cloned());
                out.extend(proc.lexicals().iter().map(|l| l.activation_call.clone()));
            }
        }
        SymbolKind::Static(s) => out.extend(s.initializer.iter().cloned()),
        SymbolKind::Namespace(ns) => out.extend(ns.members.values().cloned()),
        SymbolKind::Existential(e) => {
            out.extend(e.superclass.iter().cloned());
            out.extend(e.methods.values().cloned());
        }
        SymbolKind::Concept(c) => out.extend(c.actions.values().cloned()),
        SymbolKind::Action(a) => out.extend(a.receiver.iter().cloned()),
        _ => {}
    }
    Ok(out)
}
