//! Enumerations shared by descriptors and the assembler.

use serde::{Deserialize, Serialize};

/// Descriptor table a symbol lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum LinkageSection {
    Invalid = 0,
    Type = 1,
    Existential = 2,
    Literal = 3,
    Call = 4,
    Field = 5,
    Static = 6,
    Action = 7,
    Class = 8,
    Struct = 9,
    Instance = 10,
    Concept = 11,
    Enum = 12,
    Namespace = 13,
}

impl LinkageSection {
    pub const ALL: [LinkageSection; 13] = [
        Self::Type,
        Self::Existential,
        Self::Literal,
        Self::Call,
        Self::Field,
        Self::Static,
        Self::Action,
        Self::Class,
        Self::Struct,
        Self::Instance,
        Self::Concept,
        Self::Enum,
        Self::Namespace,
    ];

    pub fn from_u8(v: u8) -> Option<Self> {
        let section = match v {
            0 => Self::Invalid,
            1 => Self::Type,
            2 => Self::Existential,
            3 => Self::Literal,
            4 => Self::Call,
            5 => Self::Field,
            6 => Self::Static,
            7 => Self::Action,
            8 => Self::Class,
            9 => Self::Struct,
            10 => Self::Instance,
            11 => Self::Concept,
            12 => Self::Enum,
            13 => Self::Namespace,
            _ => return None,
        };
        Some(section)
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Invalid => "Invalid",
            Self::Type => "Type",
            Self::Existential => "Existential",
            Self::Literal => "Literal",
            Self::Call => "Call",
            Self::Field => "Field",
            Self::Static => "Static",
            Self::Action => "Action",
            Self::Class => "Class",
            Self::Struct => "Struct",
            Self::Instance => "Instance",
            Self::Concept => "Concept",
            Self::Enum => "Enum",
            Self::Namespace => "Namespace",
        }
    }

    /// Sections whose descriptors carry an allocator and a constructor.
    pub fn is_composite(self) -> bool {
        matches!(
            self,
            Self::Class | Self::Struct | Self::Instance | Self::Enum
        )
    }
}

impl std::fmt::Display for LinkageSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessType {
    #[default]
    Public,
    Protected,
    Private,
}

/// How a composite may be extended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeriveType {
    #[default]
    Any,
    /// Only the defining module may extend it.
    Sealed,
    Final,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallMode {
    #[default]
    Normal,
    Constructor,
    Inline,
}

/// Built-in meaning attached to an existential.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intrinsic {
    #[default]
    None,
    Any,
    Nil,
    Undef,
    Bool,
    Int,
    Float,
    Char,
    String,
    Namespace,
    Call,
    Status,
    Descriptor,
    Type,
}

/// Import flag bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImportFlags(u8);

impl ImportFlags {
    pub const NONE: ImportFlags = ImportFlags(0);
    /// Imported implicitly by the root block (the prelude).
    pub const SYSTEM_BOOTSTRAP: ImportFlags = ImportFlags(0x01);
    /// Imported by an explicit `import` in source.
    pub const API_LINKAGE: ImportFlags = ImportFlags(0x02);

    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn contains(self, other: ImportFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn union(self, other: ImportFlags) -> ImportFlags {
        ImportFlags(self.0 | other.0)
    }
}
