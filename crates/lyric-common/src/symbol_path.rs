//! Symbol paths and urls.
//!
//! A [`SymbolPath`] names a symbol inside a module (`Outer#Inner#name`).
//! A [`SymbolUrl`] pairs a path with the module that defines it; a url
//! without a location refers to the module currently being compiled.

use std::fmt;
use std::str::FromStr;

use crate::{CommonError, ModuleLocation, Result};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SymbolPath {
    segments: Vec<String>,
}

impl SymbolPath {
    pub fn new<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() || segments.iter().any(|s| !is_valid_segment(s)) {
            return Err(CommonError::InvalidSymbolPath(segments.join("#")));
        }
        Ok(Self { segments })
    }

    /// Single-segment path. `name` must be a valid segment.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::new([name])
    }

    pub fn parse(text: &str) -> Result<Self> {
        Self::new(text.split('#'))
            .map_err(|_| CommonError::InvalidSymbolPath(text.to_owned()))
    }

    /// Path of a symbol nested inside this one.
    pub fn child(&self, name: &str) -> Result<Self> {
        if !is_valid_segment(name) {
            return Err(CommonError::InvalidSymbolPath(format!("{self}#{name}")));
        }
        let mut segments = self.segments.clone();
        segments.push(name.to_owned());
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Final segment.
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// All segments but the last.
    pub fn enclosure(&self) -> &[String] {
        &self.segments[..self.segments.len() - 1]
    }

    pub fn is_enclosed(&self) -> bool {
        self.segments.len() > 1
    }

    /// Path of the enclosing symbol, if any.
    pub fn parent(&self) -> Option<SymbolPath> {
        self.is_enclosed().then(|| SymbolPath {
            segments: self.enclosure().to_vec(),
        })
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty() && !segment.contains(['#', '/']) && !segment.contains(char::is_whitespace)
}

impl fmt::Display for SymbolPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("#"))
    }
}

impl FromStr for SymbolPath {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SymbolPath {
    type Error = CommonError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<SymbolPath> for String {
    fn from(value: SymbolPath) -> Self {
        value.to_string()
    }
}

/// Global symbol identity: `(location, path)`. Equality is structural.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SymbolUrl {
    location: Option<ModuleLocation>,
    path: SymbolPath,
}

impl SymbolUrl {
    pub fn new(location: ModuleLocation, path: SymbolPath) -> Self {
        Self {
            location: Some(location),
            path,
        }
    }

    /// Url relative to the module being compiled.
    pub fn from_path(path: SymbolPath) -> Self {
        Self {
            location: None,
            path,
        }
    }

    /// `location#path` or `#path`.
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || CommonError::InvalidSymbolUrl(text.to_owned());
        let (location, path) = text.split_once('#').ok_or_else(invalid)?;
        let path = SymbolPath::parse(path).map_err(|_| invalid())?;
        if location.is_empty() {
            return Ok(Self::from_path(path));
        }
        let location = ModuleLocation::parse(location).map_err(|_| invalid())?;
        Ok(Self::new(location, path))
    }

    pub fn location(&self) -> Option<&ModuleLocation> {
        self.location.as_ref()
    }

    pub fn path(&self) -> &SymbolPath {
        &self.path
    }

    pub fn name(&self) -> &str {
        self.path.name()
    }

    pub fn is_relative(&self) -> bool {
        self.location.is_none()
    }

    /// Anchor a location-less url at `location`; urls that already carry a
    /// location are returned unchanged.
    pub fn resolve(&self, location: &ModuleLocation) -> SymbolUrl {
        match &self.location {
            Some(_) => self.clone(),
            None => Self::new(location.clone(), self.path.clone()),
        }
    }

    /// Url of a symbol nested inside this one, in the same module.
    pub fn child(&self, name: &str) -> Result<SymbolUrl> {
        Ok(Self {
            location: self.location.clone(),
            path: self.path.child(name)?,
        })
    }
}

impl fmt::Display for SymbolUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(location) = &self.location {
            write!(f, "{location}")?;
        }
        write!(f, "#{}", self.path)
    }
}

impl FromStr for SymbolUrl {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SymbolUrl {
    type Error = CommonError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<SymbolUrl> for String {
    fn from(value: SymbolUrl) -> Self {
        value.to_string()
    }
}
