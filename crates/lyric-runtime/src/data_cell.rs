//! Values on the data stack, in locals and in object fields.

use std::fmt;
use std::rc::Rc;

use lyric_object::LinkageSection;

use crate::heap::RefHandle;
use crate::status::StatusCode;

/// Index of a loaded segment within its [`SegmentManager`](crate::SegmentManager).
pub type SegmentId = u32;

/// A resolved descriptor: entry `index` of `section` in segment `segment`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DescriptorRef {
    pub segment: SegmentId,
    pub section: LinkageSection,
    pub index: u32,
}

impl DescriptorRef {
    pub fn new(segment: SegmentId, section: LinkageSection, index: u32) -> Self {
        Self {
            segment,
            section,
            index,
        }
    }
}

impl fmt::Display for DescriptorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.section.name(), self.segment, self.index)
    }
}

/// Address of an interned runtime type, see [`TypeManager`](crate::TypeManager).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeAddress(pub(crate) u32);

impl TypeAddress {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum DataCell {
    #[default]
    Invalid,
    Nil,
    Undef,
    Bool(bool),
    I64(i64),
    Dbl(f64),
    Chr(char),
    Utf8(Rc<str>),
    Ref(RefHandle),
    Type(TypeAddress),
    Descriptor(DescriptorRef),
    Status(StatusCode),
}

impl DataCell {
    pub fn utf8(s: &str) -> Self {
        Self::Utf8(Rc::from(s))
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid)
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I64(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_dbl(&self) -> Option<f64> {
        match self {
            Self::Dbl(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_chr(&self) -> Option<char> {
        match self {
            Self::Chr(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<&RefHandle> {
        match self {
            Self::Ref(handle) => Some(handle),
            _ => None,
        }
    }

    /// Text of a string value, whether inline or heap allocated.
    pub fn utf8_value(&self) -> Option<String> {
        match self {
            Self::Utf8(s) => Some(s.to_string()),
            Self::Ref(handle) => handle
                .with(|object| object.utf8_value().map(str::to_owned))
                .ok()
                .flatten(),
            _ => None,
        }
    }

    /// Short name of the value's kind, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Invalid => "Invalid",
            Self::Nil => "Nil",
            Self::Undef => "Undef",
            Self::Bool(_) => "Bool",
            Self::I64(_) => "Int",
            Self::Dbl(_) => "Float",
            Self::Chr(_) => "Char",
            Self::Utf8(_) => "String",
            Self::Ref(_) => "Ref",
            Self::Type(_) => "Type",
            Self::Descriptor(_) => "Descriptor",
            Self::Status(_) => "Status",
        }
    }
}

impl fmt::Display for DataCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid => f.write_str("<invalid>"),
            Self::Nil => f.write_str("nil"),
            Self::Undef => f.write_str("undef"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::I64(i) => write!(f, "{i}"),
            Self::Dbl(d) => write!(f, "{d:?}"),
            Self::Chr(c) => write!(f, "'{c}'"),
            Self::Utf8(s) => write!(f, "{s:?}"),
            Self::Ref(handle) => match handle.with(|object| object.describe()) {
                Ok(text) => f.write_str(&text),
                Err(_) => f.write_str("<freed>"),
            },
            Self::Type(t) => write!(f, "<type {}>", t.0),
            Self::Descriptor(d) => write!(f, "<{d}>"),
            Self::Status(code) => write!(f, "Status({})", code.name()),
        }
    }
}
