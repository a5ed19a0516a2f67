//! String interning for object string tables.
//!
//! Every name that ends up in a serialized object (symbol paths, import
//! locations, string literals) goes through one [`Interner`], so the string
//! section holds each distinct string once and descriptors refer to it by
//! [`StringId`].

use std::collections::HashMap;

/// Index of a string in an [`Interner`] (and in the object string table).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct StringId(u32);

impl StringId {
    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Only for decoding ids read back from an object.
    #[inline]
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }
}

/// Append-only string table. Ids are handed out in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Interner {
    ids: HashMap<String, StringId>,
    strings: Vec<String>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `s`, returning the existing id when the string was seen before.
    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(&id) = self.ids.get(s) {
            return id;
        }
        let id = StringId(self.strings.len() as u32);
        self.strings.push(s.to_owned());
        self.ids.insert(s.to_owned(), id);
        id
    }

    /// Look up a string without inserting it.
    pub fn get(&self, s: &str) -> Option<StringId> {
        self.ids.get(s).copied()
    }

    /// # Panics
    /// Panics if `id` was not produced by this interner.
    #[inline]
    pub fn resolve(&self, id: StringId) -> &str {
        &self.strings[id.0 as usize]
    }

    #[inline]
    pub fn try_resolve(&self, id: StringId) -> Option<&str> {
        self.strings.get(id.0 as usize).map(String::as_str)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StringId, &str)> {
        self.strings
            .iter()
            .enumerate()
            .map(|(i, s)| (StringId(i as u32), s.as_str()))
    }

    /// Concatenated UTF-8 bytes plus one offset per string and a trailing
    /// sentinel equal to the blob length.
    pub fn to_blob(&self) -> (Vec<u8>, Vec<u32>) {
        let mut blob = Vec::new();
        let mut offsets = Vec::with_capacity(self.strings.len() + 1);
        for s in &self.strings {
            offsets.push(blob.len() as u32);
            blob.extend_from_slice(s.as_bytes());
        }
        offsets.push(blob.len() as u32);
        (blob, offsets)
    }
}
