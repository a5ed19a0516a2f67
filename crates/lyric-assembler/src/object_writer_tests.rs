use lyric_object::{
    AccessType, INVALID_ADDRESS, LinkageSection, LyricObject, MemoryLoader, Opcode, dump, op_flags,
};

use crate::test_utils::{location, prelude_bytes, state, state_at};
use crate::{
    AssemblerError, CompositeSpec, Fundamental, ModuleCache, ObjectState, ObjectStateOptions,
    ObjectWriter, PRELUDE_LOCATION, PendingOperand, WriterOptions,
};

fn one_plus_one(state: &mut ObjectState) {
    let entry = state.entry_call().unwrap().clone();
    let int = state.fundamental_type(Fundamental::Int);
    let proc = state.proc_mut(&entry).unwrap();
    proc.code_mut().emit_with(Opcode::I64, PendingOperand::I64(1));
    proc.code_mut().emit_with(Opcode::I64, PendingOperand::I64(1));
    proc.code_mut().emit(Opcode::I64Add);
    proc.code_mut().emit(Opcode::Return);
    proc.put_exit_type(int);
    state.finalize_call(&entry).unwrap();
}

/// `defclass Class {}` with its implicit constructor.
fn class_module(state: &mut ObjectState) {
    let root = state.root_block().unwrap();
    let class = state
        .declare_class(root, "Class", CompositeSpec::default())
        .unwrap();
    let ctor = class.child("$ctor").unwrap();
    let super_ctor = state.superclass_ctor(&class).unwrap().unwrap();
    let nil = state.fundamental_type(Fundamental::Nil);
    state.define_call(&ctor, vec![], None, Some(nil.clone())).unwrap();

    let proc = state.proc_mut(&ctor).unwrap();
    let code = proc.code_mut();
    code.emit_with(Opcode::Synthetic, PendingOperand::Type(op_flags::SYNTHETIC_THIS));
    code.emit_with(
        Opcode::CallStatic,
        PendingOperand::Invoke {
            flags: op_flags::CALL_RECEIVER_FOLLOWS,
            url: super_ctor,
            placement: 0,
        },
    );
    code.emit(Opcode::Pop);
    code.emit(Opcode::Nil);
    code.emit(Opcode::Return);
    proc.put_exit_type(nil);
    state.finalize_call(&ctor).unwrap();
}

#[test]
fn entry_expression() {
    let mut state = state();
    one_plus_one(&mut state);

    let object = state.to_object().unwrap();

    assert_eq!(object.symbol_count(), 2);
    assert_eq!(object.import_count(), 0);
    insta::assert_snapshot!(dump(&object), @r"
    [symbols]
    $entry = Call #0
    $global = Namespace #0

    [types]
    T0 lyric://bootstrap/prelude#Int

    [calls]
    C0 $entry (0 params) -> lyric://bootstrap/prelude#Int
      args=0 locals=0 lexicals=0 checks=0
      0000 I64 1
      0009 I64 1
      0018 I64_ADD
      0019 RETURN
    ");
}

#[test]
fn optimized_entry_expression() {
    let mut state = state();
    one_plus_one(&mut state);
    state.optimize();

    let object = state.to_object().unwrap();
    let call = &object.tables().calls[0];
    let layout = object.proc(call.proc_offset).unwrap();
    let ops: Vec<_> = object
        .iter_proc(&layout)
        .map(|cell| cell.unwrap().opcode)
        .collect();

    assert_eq!(ops, vec![Opcode::I64, Opcode::Return]);
}

#[test]
fn class_with_constructor() {
    let mut state = state();
    class_module(&mut state);

    let object = state.to_object().unwrap();

    assert_eq!(object.symbol_count(), 3);
    assert_eq!(object.import_count(), 1);
    insta::assert_snapshot!(dump(&object), @r"
    [symbols]
    $global = Namespace #0
    Class = Class #0
    Class#$ctor = Call #0

    [imports]
    I0 lyric://bootstrap/prelude flags=0x01

    [links]
    L0 I0#Object (Class)
    L1 I0#Object#$ctor (Call)

    [types]
    T0 lyric://bootstrap/prelude#Nil
    T1 #Class

    [calls]
    C0 Class#$ctor (0 params) -> lyric://bootstrap/prelude#Nil
      args=0 locals=0 lexicals=0 checks=0
      0000 SYNTHETIC 1
      0002 CALL_STATIC 0x01 L1 0
      0010 POP
      0011 NIL
      0012 RETURN
    ");
}

#[test]
fn unfinalized_call_is_rejected() {
    let mut state = state();
    let root = state.root_block().unwrap();
    state
        .declare_function(root, "pending", AccessType::Public)
        .unwrap();

    let err = state.to_object().unwrap_err();

    assert!(matches!(err, AssemblerError::Unfinalized(_)));
    insta::assert_snapshot!(err, @"`/test#pending` was declared but never finalized");
}

#[test]
fn unreachable_unfinalized_call_is_rejected() {
    let mut state = state();
    one_plus_one(&mut state);
    let entry = state.entry_block().unwrap();
    let nested = state.create_block(entry).unwrap();
    state
        .declare_function(nested, "pending", AccessType::Public)
        .unwrap();

    let err = state.to_object().unwrap_err();

    assert!(matches!(err, AssemblerError::Unfinalized(_)));
    insta::assert_snapshot!(err, @"`/test#pending` was declared but never finalized");
}

#[test]
fn placements_survive_serialization() {
    let mut state = state();
    one_plus_one(&mut state);
    class_module(&mut state);
    let root = state.root_block().unwrap();
    let later = state
        .declare_linkage(root, "Later", LinkageSection::Class)
        .unwrap();

    let mut writer = ObjectWriter::new(&state, WriterOptions::default());
    writer.layout().unwrap();
    let placements = writer.placements();
    let object = LyricObject::from_bytes(writer.finish().unwrap()).unwrap();

    let mut links = 0;
    for (url, section, address) in &placements {
        let path = url.path().to_string();
        if state.symbols().get_symbol(url).unwrap().imported {
            let link = object.link(*address).unwrap();
            assert_eq!(object.string(link.path), Some(path.as_str()));
            assert_eq!(link.section, *section, "{url}");
            assert_eq!(object.import_location(link.import).as_ref(), url.location());
            links += 1;
        } else {
            let symbol = object
                .find_symbol(&path)
                .unwrap_or_else(|| panic!("`{path}` was not written"));
            assert_eq!((symbol.section, symbol.index), (*section, *address), "{path}");
        }
    }
    assert!(links > 0);
    assert!(
        placements
            .iter()
            .any(|(url, section, address)| *url == later
                && *section == LinkageSection::Class
                && *address == INVALID_ADDRESS)
    );
}

#[test]
fn linkage_is_written_with_invalid_address() {
    let mut state = state();
    let root = state.root_block().unwrap();
    state
        .declare_linkage(root, "Later", LinkageSection::Class)
        .unwrap();

    let object = state.to_object().unwrap();

    insta::assert_snapshot!(dump(&object), @r"
    [symbols]
    $global = Namespace #0
    Later = Class #4294967295
    ");
}

#[test]
fn unused_imports_are_written_on_request() {
    let mut state = state();
    assert_eq!(state.to_object().unwrap().import_count(), 0);

    let mut touched = ObjectState::new(
        location("/test"),
        crate::test_utils::module_cache(),
        ObjectStateOptions {
            touch_unused_imports: true,
            ..Default::default()
        },
    );
    touched.define_root().unwrap();
    let object = touched.to_object().unwrap();

    assert_eq!(object.import_count(), 1);
    assert_eq!(
        object.import_location(0).unwrap(),
        location(PRELUDE_LOCATION)
    );
    state.touch(&crate::test_utils::prelude_url("Int")).unwrap();
    assert_eq!(state.to_object().unwrap().import_count(), 1);
}

#[test]
fn written_class_can_be_extended() {
    let mut library = state_at(
        "/lib",
        crate::test_utils::module_cache(),
    );
    class_module(&mut library);
    let bytes = library.to_bytes_with(Default::default()).unwrap();

    let loader = MemoryLoader::new()
        .with_module(location(PRELUDE_LOCATION), prelude_bytes())
        .with_module(location("/lib"), bytes);
    let mut app = state_at("/app", ModuleCache::new().with_system(loader).into_shared());
    let root = app.root_block().unwrap();
    let base = crate::test_utils::url("/lib#Class");

    let derived = app
        .declare_class(
            root,
            "Derived",
            CompositeSpec {
                superclass: Some(base.clone()),
                ..Default::default()
            },
        )
        .unwrap();

    let imported = app.symbols().get_symbol(&base).unwrap();
    assert!(imported.imported);
    assert_eq!(
        imported.as_composite().unwrap().superclass,
        Some(crate::test_utils::prelude_url("Object"))
    );
    assert_eq!(
        app.superclass_ctor(&derived).unwrap(),
        Some(crate::test_utils::url("/lib#Class#$ctor"))
    );
    assert!(app.types().is_subtype(
        &lyric_common::TypeDef::concrete(derived),
        &app.fundamental_type(Fundamental::Object)
    ));
}
