//! Names of the built-in types every module can rely on.

use lyric_common::{ModuleLocation, SymbolPath, SymbolUrl, TypeDef};
use lyric_object::Intrinsic;

pub use lyric_common::PRELUDE_LOCATION;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Fundamental {
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
    Object,
}

impl Fundamental {
    pub const ALL: [Fundamental; 12] = [
        Self::Any,
        Self::Nil,
        Self::Undef,
        Self::Bool,
        Self::Int,
        Self::Float,
        Self::Char,
        Self::String,
        Self::Namespace,
        Self::Call,
        Self::Status,
        Self::Object,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Any => "Any",
            Self::Nil => "Nil",
            Self::Undef => "Undef",
            Self::Bool => "Bool",
            Self::Int => "Int",
            Self::Float => "Float",
            Self::Char => "Char",
            Self::String => "String",
            Self::Namespace => "Namespace",
            Self::Call => "Call",
            Self::Status => "Status",
            Self::Object => "Object",
        }
    }

    /// Intrinsic behind an existential fundamental; `None` for `Object`.
    pub fn intrinsic(self) -> Option<Intrinsic> {
        let intrinsic = match self {
            Self::Any => Intrinsic::Any,
            Self::Nil => Intrinsic::Nil,
            Self::Undef => Intrinsic::Undef,
            Self::Bool => Intrinsic::Bool,
            Self::Int => Intrinsic::Int,
            Self::Float => Intrinsic::Float,
            Self::Char => Intrinsic::Char,
            Self::String => Intrinsic::String,
            Self::Namespace => Intrinsic::Namespace,
            Self::Call => Intrinsic::Call,
            Self::Status => Intrinsic::Status,
            Self::Object => return None,
        };
        Some(intrinsic)
    }
}

/// Urls of the fundamentals within one prelude.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fundamentals {
    location: ModuleLocation,
}

impl Fundamentals {
    pub fn new(location: ModuleLocation) -> Self {
        Self { location }
    }

    pub fn location(&self) -> &ModuleLocation {
        &self.location
    }

    pub fn url(&self, fundamental: Fundamental) -> SymbolUrl {
        let path = SymbolPath::from_name(fundamental.name())
            .unwrap_or_else(|_| unreachable!("fundamental names are valid segments"));
        SymbolUrl::new(self.location.clone(), path)
    }

    pub fn type_def(&self, fundamental: Fundamental) -> TypeDef {
        TypeDef::concrete(self.url(fundamental))
    }

    pub fn is(&self, fundamental: Fundamental, type_def: &TypeDef) -> bool {
        *type_def == self.type_def(fundamental)
    }
}

impl Default for Fundamentals {
    fn default() -> Self {
        let location = ModuleLocation::parse(PRELUDE_LOCATION)
            .unwrap_or_else(|_| unreachable!("prelude location is well formed"));
        Self::new(location)
    }
}
