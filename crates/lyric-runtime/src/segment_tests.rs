use std::sync::Arc;

use lyric_object::{
    Address, INVALID_ADDRESS, ImportFlags, LinkageSection, MemoryLoader, Opcode, Operands,
    StaticDescriptor, descriptor_address,
};

use crate::data_cell::{DataCell, DescriptorRef};
use crate::error::InterpreterError;
use crate::interpreter::BytecodeInterpreter;
use crate::native::PluginRegistry;
use crate::segment::{SegmentManager, StaticSlot};
use crate::test_utils::{MAIN, TestModule, location};

const LIB: &str = "/lib";

/// `/lib` defines `answer`, returning 42.
fn lib_object() -> Vec<u8> {
    let mut module = TestModule::new();
    module.call(
        "answer",
        0,
        &[
            (Opcode::I64, Operands::I64(42)),
            (Opcode::Return, Operands::None),
        ],
    );
    module.build()
}

/// Main module whose `$entry` calls the linked `path` of `import`.
fn main_object(import: &str, path: &str, section: LinkageSection) -> (Vec<u8>, Address) {
    let mut module = TestModule::new();
    let builder = module.builder_mut();
    let index = builder.add_import(import, ImportFlags::API_LINKAGE);
    let link = builder.add_link(index, path, section);
    module.entry(&[
        (
            Opcode::CallStatic,
            Operands::FlagsAddressPlacement {
                flags: 0,
                address: link,
                placement: 0,
            },
        ),
        (Opcode::Return, Operands::None),
    ]);
    (module.build(), link)
}

fn loader(main: Vec<u8>) -> MemoryLoader {
    MemoryLoader::new()
        .with_module(location(MAIN), main)
        .with_module(location(LIB), lib_object())
}

fn manager(main: Vec<u8>) -> SegmentManager {
    let mut segments = SegmentManager::new(Arc::new(loader(main)), PluginRegistry::new());
    segments.load_main(&location(MAIN)).unwrap();
    segments
}

#[test]
fn links_load_their_module_on_first_use() {
    let (main, link) = main_object(LIB, "answer", LinkageSection::Call);
    let mut segments = manager(main);
    assert_eq!(segments.len(), 1);

    let resolved = segments.resolve(0, LinkageSection::Call, link).unwrap();

    assert_eq!(resolved, DescriptorRef::new(1, LinkageSection::Call, 0));
    assert_eq!(segments.find_segment(&location(LIB)), Some(1));
    assert_eq!(segments.url_of(resolved).unwrap(), "/lib#answer");
    // cached: a second resolution loads nothing new
    assert_eq!(segments.resolve(0, LinkageSection::Call, link).unwrap(), resolved);
    assert_eq!(segments.len(), 2);
}

#[test]
fn near_addresses_stay_in_their_segment() {
    let (main, _) = main_object(LIB, "answer", LinkageSection::Call);
    let mut segments = manager(main);

    let entry = segments
        .resolve(0, LinkageSection::Call, descriptor_address(0))
        .unwrap();

    assert_eq!(entry, DescriptorRef::new(0, LinkageSection::Call, 0));
    assert_eq!(segments.descriptor_path(entry).unwrap(), "$entry");
    let err = segments
        .resolve(0, LinkageSection::Call, descriptor_address(9))
        .unwrap_err();
    assert!(err.is_invariant());
}

#[test]
fn missing_symbol_is_an_unresolved_link() {
    let (main, link) = main_object(LIB, "question", LinkageSection::Call);
    let mut segments = manager(main);

    let err = segments.resolve(0, LinkageSection::Call, link).unwrap_err();

    insta::assert_snapshot!(err, @"unresolved link `question` in `/lib`");
}

#[test]
fn link_section_must_match_the_symbol() {
    let (main, link) = main_object(LIB, "answer", LinkageSection::Static);
    let mut segments = manager(main);

    let err = segments.resolve_link(0, link).unwrap_err();

    assert!(matches!(err, InterpreterError::UnresolvedLink { .. }));
}

#[test]
fn missing_module_is_reported() {
    let (main, link) = main_object("/nowhere", "answer", LinkageSection::Call);
    let mut segments = manager(main);

    let err = segments.resolve(0, LinkageSection::Call, link).unwrap_err();

    insta::assert_snapshot!(err, @"module `/nowhere` not found");
}

#[test]
fn calls_cross_segments() {
    let (main, _) = main_object(LIB, "answer", LinkageSection::Call);

    let result = BytecodeInterpreter::builder(loader(main), location(MAIN))
        .build()
        .unwrap()
        .run_until_done()
        .unwrap();

    assert_eq!(result, DataCell::I64(42));
}

#[test]
fn static_slots_track_initialization() {
    let mut module = TestModule::new();
    let name = module.builder_mut().intern("counter");
    module
        .builder_mut()
        .tables_mut()
        .statics
        .push(StaticDescriptor {
            path: name,
            is_variable: true,
            static_type: 0,
            initializer: INVALID_ADDRESS,
        });
    let mut segments = manager(module.build());
    let counter = DescriptorRef::new(0, LinkageSection::Static, 0);

    assert!(matches!(
        segments.static_slot(counter).unwrap(),
        StaticSlot::Uninitialized
    ));
    segments
        .set_static(counter, StaticSlot::Ready(DataCell::I64(1)))
        .unwrap();
    assert_eq!(segments.roots().count(), 1);

    segments.unload().unwrap();
    assert!(matches!(
        segments.static_slot(counter).unwrap(),
        StaticSlot::Uninitialized
    ));
}

#[test]
fn unload_happens_once() {
    let (main, _) = main_object(LIB, "answer", LinkageSection::Call);
    let mut segments = manager(main);

    segments.unload().unwrap();

    assert!(segments.is_unloaded());
    assert!(segments.unload().unwrap_err().is_invariant());
    assert!(segments.load_segment(&location(LIB)).unwrap_err().is_invariant());
}
