use crate::builder_tests::entry_object;
use crate::{ImportFlags, LinkageSection, Opcode, Operands, dump};

#[test]
fn dump_entry_proc() {
    let object = entry_object(&[
        (Opcode::I64, Operands::I64(1)),
        (Opcode::I64, Operands::I64(2)),
        (Opcode::I64Add, Operands::None),
        (Opcode::Return, Operands::None),
    ])
    .build_object()
    .unwrap();

    insta::assert_snapshot!(dump(&object), @r"
    [symbols]
    $entry = Call #0

    [types]
    T0 #Int

    [calls]
    C0 $entry (0 params) -> #Int
      args=0 locals=0 lexicals=0 checks=0
      0000 I64 1
      0009 I64 2
      0018 I64_ADD
      0019 RETURN
    ");
}

#[test]
fn dump_imports_links_and_jumps() {
    let mut builder = entry_object(&[
        (Opcode::True, Operands::None),
        (Opcode::IfFalse, Operands::Jump(3)),
        (Opcode::Jump, Operands::Jump(-6)),
        (Opcode::Return, Operands::None),
    ]);
    let import = builder.add_import("lyric://bootstrap/prelude", ImportFlags::SYSTEM_BOOTSTRAP);
    builder.add_link(import, "Object", LinkageSection::Class);
    let object = builder.build_object().unwrap();

    insta::assert_snapshot!(dump(&object), @r"
    [symbols]
    $entry = Call #0

    [imports]
    I0 lyric://bootstrap/prelude flags=0x01

    [links]
    L0 I0#Object (Class)

    [types]
    T0 #Int

    [calls]
    C0 $entry (0 params) -> #Int
      args=0 locals=0 lexicals=0 checks=0
      0000 TRUE
      0001 IF_FALSE @0007
      0004 JUMP @0001
      0007 RETURN
    ");
}
