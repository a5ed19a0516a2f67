//! Object file header (64 bytes).

use super::{HEADER_SIZE, MAGIC, VERSION};

/// Header flags (bit field).
pub mod flags {
    /// The descriptor tables carry a plugin specifier.
    pub const HAS_PLUGIN: u16 = 0x0001;
}

/// File header: the first 64 bytes of an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C, align(64))]
pub struct Header {
    /// Magic bytes: b"LYO1"
    pub magic: [u8; 4],
    pub version: u32,
    /// CRC32 of everything after the header.
    pub checksum: u32,
    pub total_size: u32,

    // Absolute section offsets
    pub str_blob_offset: u32,
    pub str_table_offset: u32,
    pub tables_offset: u32,
    pub bytecode_offset: u32,

    pub str_table_count: u32,
    pub str_blob_size: u32,
    pub tables_size: u32,
    pub bytecode_size: u32,
    pub flags: u16,
    pub(crate) _reserved: [u8; 14],
}

const _: () = assert!(std::mem::size_of::<Header>() == HEADER_SIZE);

impl Default for Header {
    fn default() -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            checksum: 0,
            total_size: 0,
            str_blob_offset: 0,
            str_table_offset: 0,
            tables_offset: 0,
            bytecode_offset: 0,
            str_table_count: 0,
            str_blob_size: 0,
            tables_size: 0,
            bytecode_size: 0,
            flags: 0,
            _reserved: [0; 14],
        }
    }
}

#[inline]
fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

impl Header {
    /// Decode the header from the first 64 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        assert!(bytes.len() >= HEADER_SIZE, "header too short");

        let mut reserved = [0u8; 14];
        reserved.copy_from_slice(&bytes[50..64]);

        Self {
            magic: [bytes[0], bytes[1], bytes[2], bytes[3]],
            version: read_u32(bytes, 4),
            checksum: read_u32(bytes, 8),
            total_size: read_u32(bytes, 12),
            str_blob_offset: read_u32(bytes, 16),
            str_table_offset: read_u32(bytes, 20),
            tables_offset: read_u32(bytes, 24),
            bytecode_offset: read_u32(bytes, 28),
            str_table_count: read_u32(bytes, 32),
            str_blob_size: read_u32(bytes, 36),
            tables_size: read_u32(bytes, 40),
            bytecode_size: read_u32(bytes, 44),
            flags: u16::from_le_bytes([bytes[48], bytes[49]]),
            _reserved: reserved,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..8].copy_from_slice(&self.version.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.checksum.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.total_size.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.str_blob_offset.to_le_bytes());
        bytes[20..24].copy_from_slice(&self.str_table_offset.to_le_bytes());
        bytes[24..28].copy_from_slice(&self.tables_offset.to_le_bytes());
        bytes[28..32].copy_from_slice(&self.bytecode_offset.to_le_bytes());
        bytes[32..36].copy_from_slice(&self.str_table_count.to_le_bytes());
        bytes[36..40].copy_from_slice(&self.str_blob_size.to_le_bytes());
        bytes[40..44].copy_from_slice(&self.tables_size.to_le_bytes());
        bytes[44..48].copy_from_slice(&self.bytecode_size.to_le_bytes());
        bytes[48..50].copy_from_slice(&self.flags.to_le_bytes());
        bytes[50..64].copy_from_slice(&self._reserved);
        bytes
    }

    pub fn validate_magic(&self) -> bool {
        self.magic == MAGIC
    }

    pub fn validate_version(&self) -> bool {
        self.version == VERSION
    }

    pub fn has_plugin(&self) -> bool {
        self.flags & flags::HAS_PLUGIN != 0
    }

    pub fn set_has_plugin(&mut self, value: bool) {
        if value {
            self.flags |= flags::HAS_PLUGIN;
        } else {
            self.flags &= !flags::HAS_PLUGIN;
        }
    }
}
