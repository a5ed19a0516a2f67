//! Module locations.
//!
//! A location is either absolute (`scheme://origin/path`) or relative
//! (`/path`). Relative locations name modules of the package being compiled
//! and are anchored with [`ModuleLocation::resolve`].

use std::fmt;
use std::str::FromStr;

use crate::{CommonError, Result};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModuleLocation {
    Absolute {
        scheme: String,
        origin: String,
        path: String,
    },
    Relative {
        path: String,
    },
}

impl ModuleLocation {
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || CommonError::InvalidLocation(text.to_owned());

        if text.starts_with('/') {
            validate_path(text).ok_or_else(invalid)?;
            return Ok(Self::Relative {
                path: text.to_owned(),
            });
        }

        let (scheme, rest) = text.split_once("://").ok_or_else(invalid)?;
        if scheme.is_empty() || !scheme.chars().all(is_scheme_char) {
            return Err(invalid());
        }
        let (origin, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };
        if origin.is_empty() {
            return Err(invalid());
        }
        validate_path(path).ok_or_else(invalid)?;

        Ok(Self::Absolute {
            scheme: scheme.to_owned(),
            origin: origin.to_owned(),
            path: path.to_owned(),
        })
    }

    pub fn relative(path: &str) -> Result<Self> {
        match Self::parse(path)? {
            relative @ Self::Relative { .. } => Ok(relative),
            Self::Absolute { .. } => Err(CommonError::InvalidLocation(path.to_owned())),
        }
    }

    pub fn is_absolute(&self) -> bool {
        matches!(self, Self::Absolute { .. })
    }

    pub fn is_relative(&self) -> bool {
        matches!(self, Self::Relative { .. })
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Absolute { path, .. } | Self::Relative { path } => path,
        }
    }

    /// Last path segment, or the origin for a location without a path.
    pub fn module_name(&self) -> &str {
        let path = self.path();
        match path.rsplit('/').find(|s| !s.is_empty()) {
            Some(name) => name,
            None => match self {
                Self::Absolute { origin, .. } => origin,
                Self::Relative { .. } => path,
            },
        }
    }

    /// Anchor a relative location against `base`. Absolute locations and
    /// relative locations resolved against relative bases are returned as is.
    pub fn resolve(&self, base: &ModuleLocation) -> ModuleLocation {
        match (self, base) {
            (Self::Relative { path }, Self::Absolute { scheme, origin, .. }) => Self::Absolute {
                scheme: scheme.clone(),
                origin: origin.clone(),
                path: path.clone(),
            },
            _ => self.clone(),
        }
    }
}

fn is_scheme_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')
}

/// Paths start with `/` and contain no empty or `#`-bearing segments.
fn validate_path(path: &str) -> Option<()> {
    if !path.starts_with('/') || path.contains('#') {
        return None;
    }
    if path == "/" {
        return Some(());
    }
    path[1..]
        .split('/')
        .all(|segment| !segment.is_empty())
        .then_some(())
}

impl fmt::Display for ModuleLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute {
                scheme,
                origin,
                path,
            } => write!(f, "{scheme}://{origin}{path}"),
            Self::Relative { path } => f.write_str(path),
        }
    }
}

impl FromStr for ModuleLocation {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ModuleLocation {
    type Error = CommonError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ModuleLocation> for String {
    fn from(value: ModuleLocation) -> Self {
        value.to_string()
    }
}
