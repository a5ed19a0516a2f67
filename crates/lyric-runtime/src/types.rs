//! Runtime types: interned from type descriptors and compared by walking
//! superclass links across segments.

use std::collections::HashMap;

use lyric_common::{ModuleLocation, PRELUDE_LOCATION};
use lyric_object::{INVALID_ADDRESS, LinkageSection, TypeKind};

use crate::data_cell::{DataCell, SegmentId, TypeAddress};
use crate::error::{InterpreterError, Result};
use crate::segment::SegmentManager;

/// Bound on superclass chains, so a malformed cycle cannot hang a type test.
const MAX_ANCESTRY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuntimeType {
    /// Absolute `location#path` url of a class or existential.
    Concrete(String),
    Union(Vec<TypeAddress>),
    Intersection(Vec<TypeAddress>),
    Placeholder(u32),
    SelfType,
    NoReturn,
}

/// Result of `TYPE_CMP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeComparison {
    Equal,
    Extends,
    Super,
    Disjoint,
}

impl TypeComparison {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Equal => 0,
            Self::Extends => -1,
            Self::Super => 1,
            Self::Disjoint => 2,
        }
    }
}

fn intrinsic_url(name: &str) -> String {
    format!("{PRELUDE_LOCATION}#{name}")
}

#[derive(Debug, Default)]
pub struct TypeManager {
    types: Vec<RuntimeType>,
    interned: HashMap<RuntimeType, TypeAddress>,
    resolved: HashMap<(SegmentId, u32), TypeAddress>,
    superclasses: HashMap<String, Option<String>>,
}

impl TypeManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, ty: RuntimeType) -> TypeAddress {
        if let Some(&address) = self.interned.get(&ty) {
            return address;
        }
        let address = TypeAddress(self.types.len() as u32);
        self.types.push(ty.clone());
        self.interned.insert(ty, address);
        address
    }

    pub fn get(&self, address: TypeAddress) -> Result<&RuntimeType> {
        self.types
            .get(address.0 as usize)
            .ok_or_else(|| InterpreterError::invariant(format!("no type {}", address.0)))
    }

    /// Type of a prelude fundamental such as `Int`.
    pub fn fundamental(&mut self, name: &str) -> TypeAddress {
        self.intern(RuntimeType::Concrete(intrinsic_url(name)))
    }

    pub fn render(&self, address: TypeAddress) -> String {
        match self.get(address) {
            Ok(RuntimeType::Concrete(url)) => url.clone(),
            Ok(RuntimeType::Union(members)) => self.render_members(members, " | "),
            Ok(RuntimeType::Intersection(members)) => self.render_members(members, " & "),
            Ok(RuntimeType::Placeholder(index)) => format!("?{index}"),
            Ok(RuntimeType::SelfType) => "Self".to_owned(),
            Ok(RuntimeType::NoReturn) => "NoReturn".to_owned(),
            Err(_) => "<invalid>".to_owned(),
        }
    }

    fn render_members(&self, members: &[TypeAddress], separator: &str) -> String {
        let parts: Vec<String> = members.iter().map(|m| self.render(*m)).collect();
        parts.join(separator)
    }

    /// Intern entry `index` of `segment`'s type table.
    pub fn resolve(
        &mut self,
        segments: &SegmentManager,
        segment: SegmentId,
        index: u32,
    ) -> Result<TypeAddress> {
        if let Some(&address) = self.resolved.get(&(segment, index)) {
            return Ok(address);
        }
        let source = segments.segment(segment)?;
        let descriptor = source
            .tables()
            .types
            .get(index as usize)
            .ok_or_else(|| InterpreterError::invariant(format!("no type {index} in segment {segment}")))?
            .clone();

        let ty = match descriptor.kind {
            TypeKind::Concrete => {
                let url = descriptor
                    .url
                    .ok_or_else(|| InterpreterError::invariant("concrete type without url"))?;
                RuntimeType::Concrete(absolute_url(source.location(), source.string(url)?)?)
            }
            TypeKind::Union | TypeKind::Intersection => {
                let mut members = Vec::with_capacity(descriptor.members.len());
                for member in &descriptor.members {
                    members.push(self.resolve(segments, segment, *member)?);
                }
                if descriptor.kind == TypeKind::Union {
                    RuntimeType::Union(members)
                } else {
                    RuntimeType::Intersection(members)
                }
            }
            TypeKind::Placeholder => {
                RuntimeType::Placeholder(descriptor.members.first().copied().unwrap_or(0))
            }
            TypeKind::SelfType => RuntimeType::SelfType,
            TypeKind::NoReturn => RuntimeType::NoReturn,
        };
        let address = self.intern(ty);
        self.resolved.insert((segment, index), address);
        Ok(address)
    }

    /// Runtime type of a value.
    pub fn type_of(&mut self, segments: &SegmentManager, value: &DataCell) -> Result<TypeAddress> {
        let name = match value {
            DataCell::Invalid => {
                return Err(InterpreterError::operand("invalid cell has no type"));
            }
            DataCell::Nil => "Nil",
            DataCell::Undef => "Undef",
            DataCell::Bool(_) => "Bool",
            DataCell::I64(_) => "Int",
            DataCell::Dbl(_) => "Float",
            DataCell::Chr(_) => "Char",
            DataCell::Utf8(_) => "String",
            DataCell::Status(_) => "Status",
            DataCell::Type(_) => "Any",
            DataCell::Descriptor(d) => match d.section {
                LinkageSection::Call => "Call",
                LinkageSection::Namespace => "Namespace",
                _ => "Any",
            },
            DataCell::Ref(handle) => {
                let (class, status, string) = handle.with(|object| {
                    (
                        object.class(),
                        object.status().is_some(),
                        object.utf8_value().is_some(),
                    )
                })?;
                match class {
                    Some(class) => {
                        let url = segments.url_of(class)?;
                        return Ok(self.intern(RuntimeType::Concrete(url)));
                    }
                    None if status => "Status",
                    None if string => "String",
                    None => "Any",
                }
            }
        };
        Ok(self.fundamental(name))
    }

    pub fn is_subtype(
        &mut self,
        segments: &mut SegmentManager,
        sub: TypeAddress,
        sup: TypeAddress,
    ) -> Result<bool> {
        if sub == sup {
            return Ok(true);
        }
        let a = self.get(sub)?.clone();
        let b = self.get(sup)?.clone();
        match (&a, &b) {
            (_, RuntimeType::Concrete(url)) if *url == intrinsic_url("Any") => Ok(true),
            (RuntimeType::NoReturn, _) => Ok(true),
            (RuntimeType::Union(members), _) => {
                for member in members {
                    if !self.is_subtype(segments, *member, sup)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (_, RuntimeType::Union(members)) => {
                for member in members {
                    if self.is_subtype(segments, sub, *member)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            (_, RuntimeType::Intersection(members)) => {
                for member in members {
                    if !self.is_subtype(segments, sub, *member)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (RuntimeType::Intersection(members), _) => {
                for member in members {
                    if self.is_subtype(segments, *member, sup)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            (RuntimeType::Concrete(sub_url), RuntimeType::Concrete(sup_url)) => {
                self.extends(segments, sub_url, sup_url)
            }
            _ => Ok(false),
        }
    }

    fn extends(&mut self, segments: &mut SegmentManager, sub: &str, sup: &str) -> Result<bool> {
        let mut current = sub.to_owned();
        for _ in 0..MAX_ANCESTRY {
            if current == sup {
                return Ok(true);
            }
            match self.superclass_url(segments, &current)? {
                Some(next) => current = next,
                None => return Ok(false),
            }
        }
        Err(InterpreterError::invariant(format!(
            "superclass chain of `{sub}` does not terminate"
        )))
    }

    fn superclass_url(&mut self, segments: &mut SegmentManager, url: &str) -> Result<Option<String>> {
        if let Some(cached) = self.superclasses.get(url) {
            return Ok(cached.clone());
        }
        let parent = match segments.find_descriptor(url)? {
            Some(descriptor) => {
                let superclass = match descriptor.section {
                    section if section.is_composite() => segments.composite(descriptor)?.superclass,
                    LinkageSection::Existential => segments.existential(descriptor)?.superclass,
                    _ => INVALID_ADDRESS,
                };
                if superclass == INVALID_ADDRESS {
                    None
                } else {
                    let resolved =
                        segments.resolve(descriptor.segment, descriptor.section, superclass)?;
                    Some(segments.url_of(resolved)?)
                }
            }
            None => None,
        };
        self.superclasses.insert(url.to_owned(), parent.clone());
        Ok(parent)
    }

    pub fn compare(
        &mut self,
        segments: &mut SegmentManager,
        a: TypeAddress,
        b: TypeAddress,
    ) -> Result<TypeComparison> {
        if a == b {
            return Ok(TypeComparison::Equal);
        }
        if self.is_subtype(segments, a, b)? {
            return Ok(TypeComparison::Extends);
        }
        if self.is_subtype(segments, b, a)? {
            return Ok(TypeComparison::Super);
        }
        Ok(TypeComparison::Disjoint)
    }

    pub fn value_matches(
        &mut self,
        segments: &mut SegmentManager,
        value: &DataCell,
        ty: TypeAddress,
    ) -> Result<bool> {
        let actual = self.type_of(segments, value)?;
        self.is_subtype(segments, actual, ty)
    }
}

/// Anchor a descriptor url against the segment that holds it: `#path` names
/// a symbol of the segment itself, a relative module location is resolved
/// against the segment's location.
fn absolute_url(base: &ModuleLocation, url: &str) -> Result<String> {
    let (location, path) = url.split_once('#').unwrap_or((url, ""));
    if location.is_empty() {
        return Ok(format!("{base}#{path}"));
    }
    let location = ModuleLocation::parse(location)?.resolve(base);
    Ok(format!("{location}#{path}"))
}
