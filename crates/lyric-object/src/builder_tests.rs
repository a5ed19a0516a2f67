use crate::{
    CallDescriptor, CallFlags, CallMode, HEADER_SIZE, ImportFlags, LinkageSection, ObjectBuilder,
    OpCell, Opcode, Operands, ProcInfo, SECTION_ALIGN, TypeDescriptor, TypeKind, link_offset,
};
use crate::{AccessType, INVALID_ADDRESS};

pub(crate) fn entry_object(code: &[(Opcode, Operands)]) -> ObjectBuilder {
    let mut builder = ObjectBuilder::new();
    let mut bytes = Vec::new();
    for (opcode, operands) in code {
        OpCell::new(*opcode, *operands).encode(&mut bytes).unwrap();
    }
    let proc_offset = builder
        .add_proc(&ProcInfo {
            code: bytes,
            ..Default::default()
        })
        .unwrap();

    let int = builder.intern("#Int");
    builder.tables_mut().types.push(TypeDescriptor {
        kind: TypeKind::Concrete,
        url: Some(int),
        members: vec![],
    });
    let path = builder.intern("$entry");
    builder.tables_mut().calls.push(CallDescriptor {
        path,
        access: AccessType::Public,
        mode: CallMode::Normal,
        flags: CallFlags::NONE,
        receiver: INVALID_ADDRESS,
        receiver_section: LinkageSection::Invalid,
        parameters: vec![],
        rest: None,
        result_type: 0,
        proc_offset,
    });
    builder.add_symbol("$entry", LinkageSection::Call, 0);
    builder
}

#[test]
fn sections_are_aligned() {
    let bytes = entry_object(&[(Opcode::Nil, Operands::None), (Opcode::Return, Operands::None)])
        .build()
        .unwrap();
    assert_eq!(bytes.len() % SECTION_ALIGN, 0);

    let header = crate::Header::from_bytes(&bytes[..HEADER_SIZE]);
    for offset in [
        header.str_blob_offset,
        header.str_table_offset,
        header.tables_offset,
        header.bytecode_offset,
    ] {
        assert_eq!(offset as usize % SECTION_ALIGN, 0);
    }
    assert_eq!(header.total_size as usize, bytes.len());
    assert!(!header.has_plugin());
}

#[test]
fn imports_and_links_are_deduplicated() {
    let mut builder = ObjectBuilder::new();
    let a = builder.add_import("/prelude", ImportFlags::SYSTEM_BOOTSTRAP);
    let b = builder.add_import("/prelude", ImportFlags::API_LINKAGE);
    assert_eq!(a, b);
    assert_eq!(builder.tables().imports.len(), 1);
    let flags = builder.tables().imports[0].flags;
    assert!(flags.contains(ImportFlags::SYSTEM_BOOTSTRAP));
    assert!(flags.contains(ImportFlags::API_LINKAGE));

    let first = builder.add_link(a, "Object", LinkageSection::Class);
    let again = builder.add_link(a, "Object", LinkageSection::Class);
    let other = builder.add_link(a, "Int", LinkageSection::Existential);
    assert_eq!(first, again);
    assert_eq!(link_offset(first), Some(0));
    assert_eq!(link_offset(other), Some(1));
}

#[test]
fn build_object_round_trips_tables() {
    let object = entry_object(&[(Opcode::Undef, Operands::None), (Opcode::Return, Operands::None)])
        .build_object()
        .unwrap();

    let symbol = object.find_symbol("$entry").unwrap();
    assert_eq!(symbol.section, LinkageSection::Call);
    assert_eq!(symbol.index, 0);

    let call = &object.tables().calls[0];
    let layout = object.proc(call.proc_offset).unwrap();
    let ops: Vec<_> = object
        .iter_proc(&layout)
        .map(|c| c.unwrap().opcode)
        .collect();
    assert_eq!(ops, vec![Opcode::Undef, Opcode::Return]);
}
