//! Loaded, validated object.

use std::collections::HashMap;
use std::fs::File;
use std::ops::Deref;
use std::path::Path;

use lyric_common::{ModuleLocation, StringId, SymbolPath};
use memmap2::Mmap;

use super::address::{Address, descriptor_offset, link_offset};
use super::descriptors::{
    ImportDescriptor, LinkDescriptor, ObjectTables, PluginSpecifier, SymbolDescriptor,
};
use super::error::{ObjectError, Result};
use super::header::Header;
use super::instruction::OpCell;
use super::iterator::BytecodeIterator;
use super::linkage::LinkageSection;
use super::proc::ProcLayout;
use super::HEADER_SIZE;

/// Backing bytes of an object.
#[derive(Debug)]
pub enum ByteStorage {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

impl Deref for ByteStorage {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Owned(v) => v.as_slice(),
            Self::Mapped(m) => &m[..],
        }
    }
}

impl ByteStorage {
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self::Owned(bytes)
    }

    /// Memory-map a file.
    pub fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::open(path)?;
        // SAFETY: objects are immutable once written; a concurrent truncation
        // is caught by the size and checksum validation that follows.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self::Mapped(map))
    }
}

/// A compiled Lyric object.
///
/// Construction validates the header, section bounds and checksum, decodes
/// the string table and descriptor tables once, and indexes public symbols
/// by path. Bytecode is decoded lazily through [`decode`](Self::decode).
#[derive(Debug)]
pub struct LyricObject {
    storage: ByteStorage,
    header: Header,
    strings: Vec<String>,
    tables: ObjectTables,
    symbol_index: HashMap<String, u32>,
}

fn section<'a>(
    bytes: &'a [u8],
    offset: u32,
    size: u32,
    name: &'static str,
) -> Result<&'a [u8]> {
    let start = offset as usize;
    let end = start
        .checked_add(size as usize)
        .ok_or(ObjectError::SectionOutOfBounds { section: name })?;
    if start < HEADER_SIZE || end > bytes.len() {
        return Err(ObjectError::SectionOutOfBounds { section: name });
    }
    Ok(&bytes[start..end])
}

impl LyricObject {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_storage(ByteStorage::from_vec(bytes))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_storage(ByteStorage::from_file(path)?)
    }

    pub fn from_storage(storage: ByteStorage) -> Result<Self> {
        if storage.len() < HEADER_SIZE {
            return Err(ObjectError::FileTooSmall(storage.len()));
        }

        let header = Header::from_bytes(&storage[..HEADER_SIZE]);
        if !header.validate_magic() {
            return Err(ObjectError::InvalidMagic);
        }
        if !header.validate_version() {
            return Err(ObjectError::UnsupportedVersion(header.version));
        }
        if header.total_size as usize != storage.len() {
            return Err(ObjectError::SizeMismatch {
                header: header.total_size,
                actual: storage.len(),
            });
        }
        let actual = crc32fast::hash(&storage[HEADER_SIZE..]);
        if actual != header.checksum {
            return Err(ObjectError::ChecksumMismatch {
                expected: header.checksum,
                actual,
            });
        }

        let strings = decode_strings(&storage, &header)?;
        let tables_bytes = section(&storage, header.tables_offset, header.tables_size, "tables")?;
        let tables: ObjectTables = postcard::from_bytes(tables_bytes)?;
        section(
            &storage,
            header.bytecode_offset,
            header.bytecode_size,
            "bytecode",
        )?;

        let mut symbol_index = HashMap::with_capacity(tables.symbols.len());
        for (i, symbol) in tables.symbols.iter().enumerate() {
            let path = strings
                .get(symbol.path.as_u32() as usize)
                .ok_or(ObjectError::InvalidStringId(symbol.path.as_u32()))?;
            symbol_index.insert(path.clone(), i as u32);
        }

        Ok(Self {
            storage,
            header,
            strings,
            tables,
            symbol_index,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn tables(&self) -> &ObjectTables {
        &self.tables
    }

    /// Raw file bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.storage
    }

    pub fn bytecode(&self) -> &[u8] {
        let start = self.header.bytecode_offset as usize;
        &self.storage[start..start + self.header.bytecode_size as usize]
    }

    pub fn string(&self, id: StringId) -> Option<&str> {
        self.strings.get(id.as_u32() as usize).map(String::as_str)
    }

    pub fn string_or_err(&self, id: StringId) -> Result<&str> {
        self.string(id)
            .ok_or(ObjectError::InvalidStringId(id.as_u32()))
    }

    pub fn strings(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(String::as_str)
    }

    pub fn symbol_count(&self) -> usize {
        self.tables.symbols.len()
    }

    pub fn symbols(&self) -> &[SymbolDescriptor] {
        &self.tables.symbols
    }

    pub fn find_symbol(&self, path: &str) -> Option<&SymbolDescriptor> {
        let index = *self.symbol_index.get(path)?;
        self.tables.symbols.get(index as usize)
    }

    /// Path of the public symbol living at `(section, index)`.
    pub fn symbol_path(&self, section: LinkageSection, index: u32) -> Option<SymbolPath> {
        let id = self.tables.descriptor_path(section, index)?;
        SymbolPath::parse(self.string(id)?).ok()
    }

    pub fn imports(&self) -> &[ImportDescriptor] {
        &self.tables.imports
    }

    pub fn import_count(&self) -> usize {
        self.tables.imports.len()
    }

    pub fn import_location(&self, index: u32) -> Option<ModuleLocation> {
        let import = self.tables.imports.get(index as usize)?;
        ModuleLocation::parse(self.string(import.location)?).ok()
    }

    pub fn links(&self) -> &[LinkDescriptor] {
        &self.tables.links
    }

    /// Link behind a far address.
    pub fn link(&self, address: Address) -> Option<&LinkDescriptor> {
        self.tables.links.get(link_offset(address)? as usize)
    }

    /// Index behind a near address, bounds-checked against `section`.
    pub fn near_index(&self, section: LinkageSection, address: Address) -> Option<u32> {
        let index = descriptor_offset(address)?;
        ((index as usize) < self.tables.section_len(section)).then_some(index)
    }

    pub fn plugin(&self) -> Option<&PluginSpecifier> {
        self.tables.plugin.as_ref()
    }

    /// Decode the instruction at an absolute bytecode offset.
    pub fn decode(&self, offset: u32) -> Result<OpCell> {
        OpCell::decode(self.bytecode(), offset)
    }

    pub fn proc(&self, offset: u32) -> Result<ProcLayout> {
        ProcLayout::parse(self.bytecode(), offset)
    }

    /// Iterate the code of a proc.
    pub fn iter_proc<'a>(&'a self, layout: &ProcLayout) -> BytecodeIterator<'a> {
        BytecodeIterator::new(self.bytecode(), layout.code_offset, layout.code_end())
    }
}

fn decode_strings(bytes: &[u8], header: &Header) -> Result<Vec<String>> {
    let count = header.str_table_count as usize;
    let table = section(
        bytes,
        header.str_table_offset,
        ((count + 1) * 4) as u32,
        "string table",
    )?;
    let blob = section(bytes, header.str_blob_offset, header.str_blob_size, "string blob")?;

    let offset_at = |i: usize| {
        let b = &table[i * 4..i * 4 + 4];
        u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize
    };

    let mut strings = Vec::with_capacity(count);
    for i in 0..count {
        let (start, end) = (offset_at(i), offset_at(i + 1));
        if start > end || end > blob.len() {
            return Err(ObjectError::InvalidStringId(i as u32));
        }
        let s = std::str::from_utf8(&blob[start..end])
            .map_err(|_| ObjectError::InvalidStringId(i as u32))?;
        strings.push(s.to_owned());
    }
    Ok(strings)
}
