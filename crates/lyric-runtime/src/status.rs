//! Status codes and the heap object that carries a status with a message.

use std::any::Any;
use std::fmt;

use crate::data_cell::DataCell;
use crate::heap::{AbstractRef, Marker};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    Cancelled,
    InvalidArgument,
    NotFound,
    ArithmeticOverflow,
    DivisionByZero,
    InvalidOperand,
    IndexOutOfRange,
    Unimplemented,
    Internal,
}

impl StatusCode {
    pub const ALL: [StatusCode; 10] = [
        Self::Ok,
        Self::Cancelled,
        Self::InvalidArgument,
        Self::NotFound,
        Self::ArithmeticOverflow,
        Self::DivisionByZero,
        Self::InvalidOperand,
        Self::IndexOutOfRange,
        Self::Unimplemented,
        Self::Internal,
    ];

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Ok => "Ok",
            Self::Cancelled => "Cancelled",
            Self::InvalidArgument => "InvalidArgument",
            Self::NotFound => "NotFound",
            Self::ArithmeticOverflow => "ArithmeticOverflow",
            Self::DivisionByZero => "DivisionByZero",
            Self::InvalidOperand => "InvalidOperand",
            Self::IndexOutOfRange => "IndexOutOfRange",
            Self::Unimplemented => "Unimplemented",
            Self::Internal => "Internal",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A raised status: what went wrong and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRef {
    code: StatusCode,
    message: String,
}

impl StatusRef {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl AbstractRef for StatusRef {
    fn type_name(&self) -> &str {
        "Status"
    }

    fn equals(&self, other: &dyn AbstractRef) -> bool {
        other
            .as_any()
            .downcast_ref::<StatusRef>()
            .is_some_and(|other| other == self)
    }

    fn status(&self) -> Option<StatusCode> {
        Some(self.code)
    }

    fn set_members_reachable(&self, _marker: &mut Marker) {}

    fn clear_members_reachable(&self, _marker: &mut Marker) {}

    fn release_members(&mut self) -> Vec<DataCell> {
        Vec::new()
    }

    fn describe(&self) -> String {
        format!("Status({}: {})", self.code, self.message)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
