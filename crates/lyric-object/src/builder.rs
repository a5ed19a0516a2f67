//! Object emission.

use lyric_common::{Interner, StringId};

use super::address::{Address, link_address};
use super::descriptors::{
    ImportDescriptor, LinkDescriptor, ObjectTables, PluginSpecifier, SymbolDescriptor,
};
use super::error::Result;
use super::header::Header;
use super::linkage::{ImportFlags, LinkageSection};
use super::object::LyricObject;
use super::proc::{ProcInfo, encode_proc};
use super::{HEADER_SIZE, SECTION_ALIGN};

/// Accumulates strings, tables and procs, then lays them out as an object.
#[derive(Debug, Default)]
pub struct ObjectBuilder {
    strings: Interner,
    tables: ObjectTables,
    bytecode: Vec<u8>,
}

fn pad_to_section(out: &mut Vec<u8>) {
    let rem = out.len() % SECTION_ALIGN;
    if rem != 0 {
        out.resize(out.len() + SECTION_ALIGN - rem, 0);
    }
}

impl ObjectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, s: &str) -> StringId {
        self.strings.intern(s)
    }

    pub fn tables(&self) -> &ObjectTables {
        &self.tables
    }

    pub fn tables_mut(&mut self) -> &mut ObjectTables {
        &mut self.tables
    }

    pub fn add_symbol(&mut self, path: &str, section: LinkageSection, index: u32) {
        let path = self.intern(path);
        self.tables.symbols.push(SymbolDescriptor {
            path,
            section,
            index,
        });
    }

    /// Register an import, returning its index. Repeated locations are merged.
    pub fn add_import(&mut self, location: &str, flags: ImportFlags) -> u32 {
        let location = self.intern(location);
        if let Some(i) = self.tables.imports.iter().position(|i| i.location == location) {
            let import = &mut self.tables.imports[i];
            import.flags = import.flags.union(flags);
            return i as u32;
        }
        self.tables.imports.push(ImportDescriptor { location, flags });
        (self.tables.imports.len() - 1) as u32
    }

    /// Register a link, returning its far address. Repeated links are merged.
    pub fn add_link(&mut self, import: u32, path: &str, section: LinkageSection) -> Address {
        let path = self.intern(path);
        let link = LinkDescriptor {
            import,
            path,
            section,
        };
        let offset = match self.tables.links.iter().position(|l| *l == link) {
            Some(i) => i,
            None => {
                self.tables.links.push(link);
                self.tables.links.len() - 1
            }
        };
        link_address(offset as u32)
    }

    /// Append a proc to the bytecode section, returning its offset.
    pub fn add_proc(&mut self, proc: &ProcInfo) -> Result<u32> {
        encode_proc(proc, &mut self.bytecode)
    }

    pub fn set_plugin(&mut self, plugin: PluginSpecifier) {
        self.tables.plugin = Some(plugin);
    }

    /// Lay out and checksum the object.
    pub fn build(self) -> Result<Vec<u8>> {
        let mut out = vec![0u8; HEADER_SIZE];
        let mut header = Header::default();
        header.set_has_plugin(self.tables.plugin.is_some());

        let (blob, offsets) = self.strings.to_blob();
        header.str_blob_offset = out.len() as u32;
        header.str_blob_size = blob.len() as u32;
        out.extend_from_slice(&blob);
        pad_to_section(&mut out);

        header.str_table_offset = out.len() as u32;
        header.str_table_count = self.strings.len() as u32;
        for offset in &offsets {
            out.extend_from_slice(&offset.to_le_bytes());
        }
        pad_to_section(&mut out);

        let tables = postcard::to_allocvec(&self.tables)?;
        header.tables_offset = out.len() as u32;
        header.tables_size = tables.len() as u32;
        out.extend_from_slice(&tables);
        pad_to_section(&mut out);

        header.bytecode_offset = out.len() as u32;
        header.bytecode_size = self.bytecode.len() as u32;
        out.extend_from_slice(&self.bytecode);
        pad_to_section(&mut out);

        header.total_size = out.len() as u32;
        header.checksum = crc32fast::hash(&out[HEADER_SIZE..]);
        out[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        Ok(out)
    }

    pub fn build_object(self) -> Result<LyricObject> {
        LyricObject::from_bytes(self.build()?)
    }
}
