//! Symbol model.
//!
//! Every named entity the assembler tracks is one [`Symbol`]: a url, an
//! imported flag, and a [`SymbolKind`] payload. The kind is a closed sum, so
//! the writer and the resolvers match exhaustively on it.

use indexmap::IndexMap;
use lyric_common::{SymbolUrl, TypeDef};
use lyric_object::{AccessType, CallMode, DeriveType, Intrinsic, LinkageSection};

use crate::block::BlockAddress;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SymbolType {
    Class,
    Instance,
    Struct,
    Enum,
    Concept,
    Call,
    Field,
    Action,
    Namespace,
    Existential,
    Static,
    Linkage,
    Synthetic,
    Typename,
    Undeclared,
    Argument,
    Local,
    Lexical,
}

/// Whether a variable may be reassigned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BindingType {
    #[default]
    Value,
    Variable,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub type_def: TypeDef,
    pub binding: BindingType,
}

impl Parameter {
    pub fn new(name: impl Into<String>, type_def: TypeDef) -> Self {
        Self {
            name: name.into(),
            type_def,
            binding: BindingType::Value,
        }
    }
}

/// Class, struct, instance or enum.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompositeSymbol {
    pub access: AccessType,
    pub derive: DeriveType,
    pub is_abstract: bool,
    pub superclass: Option<SymbolUrl>,
    pub ctor: Option<SymbolUrl>,
    /// Field name to field symbol.
    pub members: IndexMap<String, SymbolUrl>,
    /// Method name to call symbol.
    pub methods: IndexMap<String, SymbolUrl>,
    pub type_def: TypeDef,
    pub block: Option<BlockAddress>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallSymbol {
    pub access: AccessType,
    pub mode: CallMode,
    /// Composite or existential a method or constructor is bound to.
    pub receiver: Option<SymbolUrl>,
    pub parameters: Vec<Parameter>,
    pub rest: Option<Parameter>,
    pub result_type: Option<TypeDef>,
    pub is_initializer: bool,
    pub defined: bool,
    pub finalized: bool,
    /// Index into the object state's procs; `None` for imported calls.
    pub proc: Option<usize>,
}

impl CallSymbol {
    pub fn is_bound(&self) -> bool {
        self.receiver.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSymbol {
    pub access: AccessType,
    pub binding: BindingType,
    pub type_def: TypeDef,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticSymbol {
    pub binding: BindingType,
    pub type_def: TypeDef,
    pub initializer: Option<SymbolUrl>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespaceSymbol {
    pub access: AccessType,
    pub members: IndexMap<String, SymbolUrl>,
    pub block: Option<BlockAddress>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExistentialSymbol {
    pub access: AccessType,
    pub derive: DeriveType,
    pub intrinsic: Intrinsic,
    pub superclass: Option<SymbolUrl>,
    pub methods: IndexMap<String, SymbolUrl>,
    pub type_def: TypeDef,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConceptSymbol {
    pub access: AccessType,
    pub actions: IndexMap<String, SymbolUrl>,
    pub type_def: TypeDef,
    pub block: Option<BlockAddress>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionSymbol {
    pub receiver: Option<SymbolUrl>,
    pub parameters: Vec<Parameter>,
    pub rest: Option<Parameter>,
    pub result_type: Option<TypeDef>,
}

/// Argument or local variable of a proc.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariableSymbol {
    pub name: String,
    pub binding: BindingType,
    pub type_def: TypeDef,
    pub offset: u32,
    /// Call whose frame holds the variable.
    pub proc_call: SymbolUrl,
}

/// Variable captured from an enclosing proc.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LexicalSymbol {
    pub name: String,
    pub binding: BindingType,
    pub type_def: TypeDef,
    pub offset: u32,
    /// Captured argument or local.
    pub target: SymbolUrl,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    Class(CompositeSymbol),
    Instance(CompositeSymbol),
    Struct(CompositeSymbol),
    Enum(CompositeSymbol),
    Concept(ConceptSymbol),
    Call(CallSymbol),
    Field(FieldSymbol),
    Action(ActionSymbol),
    Namespace(NamespaceSymbol),
    Existential(ExistentialSymbol),
    Static(StaticSymbol),
    /// Placeholder for a definition whose shape is not known yet.
    Linkage(LinkageSection),
    Synthetic(TypeDef),
    Typename,
    Undeclared,
    Argument(VariableSymbol),
    Local(VariableSymbol),
    Lexical(LexicalSymbol),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symbol {
    pub url: SymbolUrl,
    pub imported: bool,
    pub kind: SymbolKind,
}

impl Symbol {
    pub fn new(url: SymbolUrl, kind: SymbolKind) -> Self {
        Self {
            url,
            imported: false,
            kind,
        }
    }

    pub fn imported(url: SymbolUrl, kind: SymbolKind) -> Self {
        Self {
            url,
            imported: true,
            kind,
        }
    }

    pub fn symbol_type(&self) -> SymbolType {
        match &self.kind {
            SymbolKind::Class(_) => SymbolType::Class,
            SymbolKind::Instance(_) => SymbolType::Instance,
            SymbolKind::Struct(_) => SymbolType::Struct,
            SymbolKind::Enum(_) => SymbolType::Enum,
            SymbolKind::Concept(_) => SymbolType::Concept,
            SymbolKind::Call(_) => SymbolType::Call,
            SymbolKind::Field(_) => SymbolType::Field,
            SymbolKind::Action(_) => SymbolType::Action,
            SymbolKind::Namespace(_) => SymbolType::Namespace,
            SymbolKind::Existential(_) => SymbolType::Existential,
            SymbolKind::Static(_) => SymbolType::Static,
            SymbolKind::Linkage(_) => SymbolType::Linkage,
            SymbolKind::Synthetic(_) => SymbolType::Synthetic,
            SymbolKind::Typename => SymbolType::Typename,
            SymbolKind::Undeclared => SymbolType::Undeclared,
            SymbolKind::Argument(_) => SymbolType::Argument,
            SymbolKind::Local(_) => SymbolType::Local,
            SymbolKind::Lexical(_) => SymbolType::Lexical,
        }
    }

    pub fn linkage_section(&self) -> LinkageSection {
        match &self.kind {
            SymbolKind::Linkage(section) => *section,
            _ => symbol_type_to_linkage_section(self.symbol_type()),
        }
    }

    /// Type of a value bound to this symbol, if it has one.
    pub fn type_def(&self) -> Option<&TypeDef> {
        match &self.kind {
            SymbolKind::Class(c)
            | SymbolKind::Instance(c)
            | SymbolKind::Struct(c)
            | SymbolKind::Enum(c) => Some(&c.type_def),
            SymbolKind::Concept(c) => Some(&c.type_def),
            SymbolKind::Existential(e) => Some(&e.type_def),
            SymbolKind::Field(f) => Some(&f.type_def),
            SymbolKind::Static(s) => Some(&s.type_def),
            SymbolKind::Synthetic(t) => Some(t),
            SymbolKind::Argument(v) | SymbolKind::Local(v) => Some(&v.type_def),
            SymbolKind::Lexical(l) => Some(&l.type_def),
            SymbolKind::Call(c) => c.result_type.as_ref(),
            SymbolKind::Action(a) => a.result_type.as_ref(),
            SymbolKind::Namespace(_)
            | SymbolKind::Linkage(_)
            | SymbolKind::Typename
            | SymbolKind::Undeclared => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(
            self.kind,
            SymbolKind::Linkage(_) | SymbolKind::Undeclared | SymbolKind::Typename
        )
    }

    pub fn is_variable(&self) -> bool {
        matches!(
            self.kind,
            SymbolKind::Argument(_) | SymbolKind::Local(_) | SymbolKind::Lexical(_)
        )
    }

    pub fn access(&self) -> AccessType {
        match &self.kind {
            SymbolKind::Class(c)
            | SymbolKind::Instance(c)
            | SymbolKind::Struct(c)
            | SymbolKind::Enum(c) => c.access,
            SymbolKind::Concept(c) => c.access,
            SymbolKind::Call(c) => c.access,
            SymbolKind::Field(f) => f.access,
            SymbolKind::Namespace(n) => n.access,
            SymbolKind::Existential(e) => e.access,
            _ => AccessType::Public,
        }
    }

    pub fn as_composite(&self) -> Option<&CompositeSymbol> {
        match &self.kind {
            SymbolKind::Class(c)
            | SymbolKind::Instance(c)
            | SymbolKind::Struct(c)
            | SymbolKind::Enum(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_composite_mut(&mut self) -> Option<&mut CompositeSymbol> {
        match &mut self.kind {
            SymbolKind::Class(c)
            | SymbolKind::Instance(c)
            | SymbolKind::Struct(c)
            | SymbolKind::Enum(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_call(&self) -> Option<&CallSymbol> {
        match &self.kind {
            SymbolKind::Call(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_call_mut(&mut self) -> Option<&mut CallSymbol> {
        match &mut self.kind {
            SymbolKind::Call(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_namespace(&self) -> Option<&NamespaceSymbol> {
        match &self.kind {
            SymbolKind::Namespace(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_namespace_mut(&mut self) -> Option<&mut NamespaceSymbol> {
        match &mut self.kind {
            SymbolKind::Namespace(n) => Some(n),
            _ => None,
        }
    }

    /// Member lookup used by dotted path resolution.
    pub fn member(&self, name: &str) -> Option<&SymbolUrl> {
        match &self.kind {
            SymbolKind::Namespace(n) => n.members.get(name),
            SymbolKind::Class(c)
            | SymbolKind::Instance(c)
            | SymbolKind::Struct(c)
            | SymbolKind::Enum(c) => c.members.get(name).or_else(|| c.methods.get(name)),
            SymbolKind::Existential(e) => e.methods.get(name),
            SymbolKind::Concept(c) => c.actions.get(name),
            _ => None,
        }
    }
}

/// Descriptor table a symbol of the given type is written to.
pub fn symbol_type_to_linkage_section(symbol_type: SymbolType) -> LinkageSection {
    match symbol_type {
        SymbolType::Class => LinkageSection::Class,
        SymbolType::Instance => LinkageSection::Instance,
        SymbolType::Struct => LinkageSection::Struct,
        SymbolType::Enum => LinkageSection::Enum,
        SymbolType::Concept => LinkageSection::Concept,
        SymbolType::Call => LinkageSection::Call,
        SymbolType::Field => LinkageSection::Field,
        SymbolType::Action => LinkageSection::Action,
        SymbolType::Namespace => LinkageSection::Namespace,
        SymbolType::Existential => LinkageSection::Existential,
        SymbolType::Static => LinkageSection::Static,
        SymbolType::Linkage
        | SymbolType::Synthetic
        | SymbolType::Typename
        | SymbolType::Undeclared
        | SymbolType::Argument
        | SymbolType::Local
        | SymbolType::Lexical => LinkageSection::Invalid,
    }
}
