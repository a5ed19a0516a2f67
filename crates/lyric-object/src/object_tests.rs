use crate::builder_tests::entry_object;
use crate::{
    ByteStorage, HEADER_SIZE, LinkageSection, LyricObject, ObjectError, Opcode, Operands,
    PluginSpecifier, descriptor_address, is_far, is_near, link_address,
};

fn minimal_bytes() -> Vec<u8> {
    entry_object(&[(Opcode::Nil, Operands::None), (Opcode::Return, Operands::None)])
        .build()
        .unwrap()
}

#[test]
fn byte_storage_from_vec() {
    let storage = ByteStorage::from_vec(vec![1, 2, 3]);
    assert_eq!(&*storage, &[1, 2, 3]);
    assert_eq!(storage.len(), 3);
}

#[test]
fn object_error_display() {
    let err = ObjectError::InvalidMagic;
    assert_eq!(err.to_string(), "invalid magic: expected LYO1");

    let err = ObjectError::SizeMismatch {
        header: 100,
        actual: 50,
    };
    assert!(err.to_string().contains("100"));
    assert!(err.to_string().contains("50"));
    assert!(!err.is_invariant());
    assert!(ObjectError::InvalidStringId(3).is_invariant());
}

#[test]
fn rejects_short_file() {
    let err = LyricObject::from_bytes(vec![0; 10]).unwrap_err();
    assert!(matches!(err, ObjectError::FileTooSmall(10)));
}

#[test]
fn rejects_bad_magic() {
    let mut bytes = minimal_bytes();
    bytes[0] = b'X';
    let err = LyricObject::from_bytes(bytes).unwrap_err();
    assert!(matches!(err, ObjectError::InvalidMagic));
}

#[test]
fn rejects_bad_version() {
    let mut bytes = minimal_bytes();
    bytes[4] = 9;
    let err = LyricObject::from_bytes(bytes).unwrap_err();
    assert!(matches!(err, ObjectError::UnsupportedVersion(9)));
}

#[test]
fn rejects_size_mismatch() {
    let mut bytes = minimal_bytes();
    bytes.push(0);
    let err = LyricObject::from_bytes(bytes).unwrap_err();
    assert!(matches!(err, ObjectError::SizeMismatch { .. }));
}

#[test]
fn rejects_corrupted_body() {
    let mut bytes = minimal_bytes();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    let err = LyricObject::from_bytes(bytes).unwrap_err();
    assert!(matches!(err, ObjectError::ChecksumMismatch { .. }));
}

#[test]
fn strings_and_symbols() {
    let object = LyricObject::from_bytes(minimal_bytes()).unwrap();
    let strings: Vec<_> = object.strings().collect();
    assert!(strings.contains(&"$entry"));
    assert!(strings.contains(&"#Int"));

    assert_eq!(object.symbol_count(), 1);
    assert!(object.find_symbol("missing").is_none());
    let path = object.symbol_path(LinkageSection::Call, 0).unwrap();
    assert_eq!(path.to_string(), "$entry");
    assert!(object.symbol_path(LinkageSection::Call, 1).is_none());
    assert_eq!(object.as_bytes().len(), object.header().total_size as usize);
    assert!(object.as_bytes().len() > HEADER_SIZE);
}

#[test]
fn plugin_specifier_sets_header_flag() {
    let mut builder = entry_object(&[(Opcode::Return, Operands::None)]);
    builder.set_plugin(PluginSpecifier {
        system_name: "linux".into(),
        architecture: "x86_64".into(),
        system_version: "6".into(),
        compiler_id: "rustc".into(),
    });
    let object = builder.build_object().unwrap();
    assert!(object.header().has_plugin());
    assert_eq!(object.plugin().unwrap().architecture, "x86_64");
}

#[test]
fn near_and_far_addresses() {
    let near = descriptor_address(5);
    let far = link_address(5);
    assert!(is_near(near));
    assert!(!is_far(near));
    assert!(is_far(far));
    assert!(!is_near(far));
    assert_eq!(descriptor_address(0x8000_0000), crate::INVALID_ADDRESS);

    let object = LyricObject::from_bytes(minimal_bytes()).unwrap();
    assert_eq!(object.near_index(LinkageSection::Call, 0), Some(0));
    assert_eq!(object.near_index(LinkageSection::Call, 1), None);
    assert_eq!(object.near_index(LinkageSection::Call, far), None);
    assert!(object.link(far).is_none());
}
