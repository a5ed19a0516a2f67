//! Structural type descriptors.
//!
//! Constructors canonicalize unions and intersections (flattened, sorted,
//! deduplicated), so two `TypeDef`s describing the same structure compare
//! equal and hash identically. Caches rely on that for deduplication.

use std::fmt;

use crate::SymbolUrl;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeDef {
    /// A named type applied to zero or more type arguments.
    Concrete { url: SymbolUrl, args: Vec<TypeDef> },
    /// The `index`-th type parameter of the template at `template`.
    Placeholder { template: SymbolUrl, index: u32 },
    Union(Vec<TypeDef>),
    Intersection(Vec<TypeDef>),
    /// The receiver type inside a class or concept body.
    SelfType,
    NoReturn,
    Invalid,
}

impl TypeDef {
    pub fn concrete(url: SymbolUrl) -> Self {
        Self::Concrete {
            url,
            args: Vec::new(),
        }
    }

    pub fn concrete_with_args(url: SymbolUrl, args: Vec<TypeDef>) -> Self {
        Self::Concrete { url, args }
    }

    pub fn placeholder(template: SymbolUrl, index: u32) -> Self {
        Self::Placeholder { template, index }
    }

    /// Canonical union. A single distinct member collapses to that member;
    /// nested unions are flattened. No members yields `Invalid`.
    pub fn union(members: impl IntoIterator<Item = TypeDef>) -> Self {
        let mut flat = Vec::new();
        for member in members {
            match member {
                Self::Union(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        canonical_set(flat, Self::Union)
    }

    /// Canonical intersection, same rules as [`TypeDef::union`].
    pub fn intersection(members: impl IntoIterator<Item = TypeDef>) -> Self {
        let mut flat = Vec::new();
        for member in members {
            match member {
                Self::Intersection(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        canonical_set(flat, Self::Intersection)
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Self::Invalid => false,
            Self::Concrete { args, .. } => args.iter().all(TypeDef::is_valid),
            Self::Union(members) | Self::Intersection(members) => {
                members.len() > 1 && members.iter().all(TypeDef::is_valid)
            }
            Self::Placeholder { .. } | Self::SelfType | Self::NoReturn => true,
        }
    }

    pub fn concrete_url(&self) -> Option<&SymbolUrl> {
        match self {
            Self::Concrete { url, .. } => Some(url),
            _ => None,
        }
    }

    pub fn type_arguments(&self) -> &[TypeDef] {
        match self {
            Self::Concrete { args, .. } => args,
            _ => &[],
        }
    }

    /// Members of a union or intersection; the type itself otherwise.
    pub fn members(&self) -> &[TypeDef] {
        match self {
            Self::Union(members) | Self::Intersection(members) => members,
            other => std::slice::from_ref(other),
        }
    }
}

fn canonical_set(mut members: Vec<TypeDef>, make: fn(Vec<TypeDef>) -> TypeDef) -> TypeDef {
    members.sort();
    members.dedup();
    match members.len() {
        0 => TypeDef::Invalid,
        1 => members.pop().unwrap_or(TypeDef::Invalid),
        _ => make(members),
    }
}

impl fmt::Display for TypeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Concrete { url, args } => {
                write!(f, "{url}")?;
                if !args.is_empty() {
                    f.write_str("[")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    f.write_str("]")?;
                }
                Ok(())
            }
            Self::Placeholder { template, index } => write!(f, "{template}${index}"),
            Self::Union(members) => write_joined(f, members, " | "),
            Self::Intersection(members) => write_joined(f, members, " & "),
            Self::SelfType => f.write_str("Self"),
            Self::NoReturn => f.write_str("NoReturn"),
            Self::Invalid => f.write_str("<invalid>"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, members: &[TypeDef], sep: &str) -> fmt::Result {
    for (i, member) in members.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{member}")?;
    }
    Ok(())
}
