use crate::{Header, MAGIC, VERSION, flags};

#[test]
fn header_size() {
    assert_eq!(std::mem::size_of::<Header>(), 64);
}

#[test]
fn header_default() {
    let h = Header::default();
    assert!(h.validate_magic());
    assert!(h.validate_version());
    assert_eq!(h.total_size, 0);
    assert!(!h.has_plugin());
}

#[test]
fn header_roundtrip() {
    let h = Header {
        magic: MAGIC,
        version: VERSION,
        checksum: 0xDEADBEEF,
        total_size: 512,
        str_blob_offset: 64,
        str_table_offset: 128,
        tables_offset: 192,
        bytecode_offset: 320,
        str_table_count: 7,
        str_blob_size: 40,
        tables_size: 90,
        bytecode_size: 33,
        flags: flags::HAS_PLUGIN,
        ..Default::default()
    };

    let bytes = h.to_bytes();
    assert_eq!(&bytes[0..4], b"LYO1");

    let decoded = Header::from_bytes(&bytes);
    assert_eq!(decoded, h);
    assert!(decoded.has_plugin());
}

#[test]
fn plugin_flag_toggles() {
    let mut h = Header::default();

    h.set_has_plugin(true);
    assert_eq!(h.flags, flags::HAS_PLUGIN);

    h.set_has_plugin(false);
    assert_eq!(h.flags, 0);
}
