//! Descriptor tables.
//!
//! All tables are plain serde structs, postcard-encoded into the tables
//! section. Names are [`StringId`]s into the object's string table. Symbol
//! references are [`Address`]es: near addresses index the table implied by
//! the referring field, far addresses index [`ObjectTables::links`].
//! Type references (`*_type`) index [`ObjectTables::types`].

use lyric_common::StringId;
use serde::{Deserialize, Serialize};

use super::address::Address;
use super::linkage::{AccessType, CallMode, DeriveType, ImportFlags, Intrinsic, LinkageSection};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingDescriptor {
    pub name: StringId,
    pub section: LinkageSection,
    pub address: Address,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceDescriptor {
    pub path: StringId,
    pub access: AccessType,
    pub bindings: Vec<BindingDescriptor>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: StringId,
    pub call: Address,
}

/// Shared shape of class, struct, instance and enum descriptors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeDescriptor {
    pub path: StringId,
    pub access: AccessType,
    pub derive: DeriveType,
    pub is_abstract: bool,
    /// Same section as the composite itself; `INVALID_ADDRESS` for roots.
    pub superclass: Address,
    pub ctor: Address,
    pub fields: Vec<Address>,
    pub methods: Vec<MethodDescriptor>,
    pub instance_type: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub name: StringId,
    pub param_type: u32,
    pub is_variable: bool,
}

/// Call flag bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallFlags(u8);

impl CallFlags {
    pub const NONE: CallFlags = CallFlags(0);
    /// The call takes a receiver (method or constructor).
    pub const BOUND: CallFlags = CallFlags(0x01);
    /// The proc never returns normally.
    pub const NO_RETURN: CallFlags = CallFlags(0x02);
    /// Initializer of a static.
    pub const INITIALIZER: CallFlags = CallFlags(0x04);

    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn contains(self, other: CallFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn union(self, other: CallFlags) -> CallFlags {
        CallFlags(self.0 | other.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallDescriptor {
    pub path: StringId,
    pub access: AccessType,
    pub mode: CallMode,
    pub flags: CallFlags,
    /// Composite or existential the call is bound to, if any.
    pub receiver: Address,
    pub receiver_section: LinkageSection,
    pub parameters: Vec<ParameterDescriptor>,
    pub rest: Option<ParameterDescriptor>,
    pub result_type: u32,
    /// Byte offset of the proc in the bytecode section.
    pub proc_offset: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub path: StringId,
    pub access: AccessType,
    pub is_variable: bool,
    pub field_type: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticDescriptor {
    pub path: StringId,
    pub is_variable: bool,
    pub static_type: u32,
    /// Initializer call, evaluated on first load.
    pub initializer: Address,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistentialDescriptor {
    pub path: StringId,
    pub access: AccessType,
    pub derive: DeriveType,
    pub intrinsic: Intrinsic,
    pub superclass: Address,
    pub methods: Vec<MethodDescriptor>,
    pub existential_type: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptDescriptor {
    pub path: StringId,
    pub access: AccessType,
    pub actions: Vec<Address>,
    pub concept_type: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub path: StringId,
    pub receiver: Address,
    pub parameters: Vec<ParameterDescriptor>,
    pub rest: Option<ParameterDescriptor>,
    pub result_type: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    Concrete,
    Placeholder,
    Union,
    Intersection,
    SelfType,
    NoReturn,
}

/// One canonical type.
///
/// `url` names the concrete symbol (or the template of a placeholder); it is
/// a `#path` relative url for symbols of this object. `members` holds type
/// arguments, union/intersection members, or `[index]` for a placeholder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub kind: TypeKind,
    pub url: Option<StringId>,
    pub members: Vec<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LiteralDescriptor {
    Nil,
    Undef,
    Bool(bool),
    I64(i64),
    Dbl(f64),
    Chr(char),
    Utf8(StringId),
}

/// Public symbol: `path` resolves to entry `index` of `section`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolDescriptor {
    pub path: StringId,
    pub section: LinkageSection,
    pub index: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportDescriptor {
    pub location: StringId,
    pub flags: ImportFlags,
}

/// Reference to a symbol of an imported object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDescriptor {
    pub import: u32,
    pub path: StringId,
    pub section: LinkageSection,
}

/// Identifies the native companion library of an object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PluginSpecifier {
    pub system_name: String,
    pub architecture: String,
    pub system_version: String,
    pub compiler_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectTables {
    pub namespaces: Vec<NamespaceDescriptor>,
    pub classes: Vec<CompositeDescriptor>,
    pub structs: Vec<CompositeDescriptor>,
    pub instances: Vec<CompositeDescriptor>,
    pub enums: Vec<CompositeDescriptor>,
    pub calls: Vec<CallDescriptor>,
    pub fields: Vec<FieldDescriptor>,
    pub statics: Vec<StaticDescriptor>,
    pub existentials: Vec<ExistentialDescriptor>,
    pub concepts: Vec<ConceptDescriptor>,
    pub actions: Vec<ActionDescriptor>,
    pub types: Vec<TypeDescriptor>,
    pub literals: Vec<LiteralDescriptor>,
    pub symbols: Vec<SymbolDescriptor>,
    pub imports: Vec<ImportDescriptor>,
    pub links: Vec<LinkDescriptor>,
    pub plugin: Option<PluginSpecifier>,
}

impl ObjectTables {
    /// Number of entries in a section's table.
    pub fn section_len(&self, section: LinkageSection) -> usize {
        match section {
            LinkageSection::Invalid => 0,
            LinkageSection::Type => self.types.len(),
            LinkageSection::Existential => self.existentials.len(),
            LinkageSection::Literal => self.literals.len(),
            LinkageSection::Call => self.calls.len(),
            LinkageSection::Field => self.fields.len(),
            LinkageSection::Static => self.statics.len(),
            LinkageSection::Action => self.actions.len(),
            LinkageSection::Class => self.classes.len(),
            LinkageSection::Struct => self.structs.len(),
            LinkageSection::Instance => self.instances.len(),
            LinkageSection::Concept => self.concepts.len(),
            LinkageSection::Enum => self.enums.len(),
            LinkageSection::Namespace => self.namespaces.len(),
        }
    }

    /// Composite table for a composite section.
    pub fn composites(&self, section: LinkageSection) -> Option<&[CompositeDescriptor]> {
        match section {
            LinkageSection::Class => Some(&self.classes),
            LinkageSection::Struct => Some(&self.structs),
            LinkageSection::Instance => Some(&self.instances),
            LinkageSection::Enum => Some(&self.enums),
            _ => None,
        }
    }

    pub fn composites_mut(
        &mut self,
        section: LinkageSection,
    ) -> Option<&mut Vec<CompositeDescriptor>> {
        match section {
            LinkageSection::Class => Some(&mut self.classes),
            LinkageSection::Struct => Some(&mut self.structs),
            LinkageSection::Instance => Some(&mut self.instances),
            LinkageSection::Enum => Some(&mut self.enums),
            _ => None,
        }
    }

    /// String id of the path of descriptor `index` in `section`.
    pub fn descriptor_path(&self, section: LinkageSection, index: u32) -> Option<StringId> {
        let i = index as usize;
        match section {
            LinkageSection::Existential => self.existentials.get(i).map(|d| d.path),
            LinkageSection::Call => self.calls.get(i).map(|d| d.path),
            LinkageSection::Field => self.fields.get(i).map(|d| d.path),
            LinkageSection::Static => self.statics.get(i).map(|d| d.path),
            LinkageSection::Action => self.actions.get(i).map(|d| d.path),
            LinkageSection::Concept => self.concepts.get(i).map(|d| d.path),
            LinkageSection::Namespace => self.namespaces.get(i).map(|d| d.path),
            s if s.is_composite() => self.composites(s)?.get(i).map(|d| d.path),
            _ => None,
        }
    }
}
