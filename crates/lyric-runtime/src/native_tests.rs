use std::sync::atomic::{AtomicUsize, Ordering};

use lyric_object::{Opcode, Operands, PluginSpecifier, op_flags};

use crate::data_cell::DataCell;
use crate::error::{InterpreterError, Result};
use crate::native::{
    NativeInterface, NativeLibrary, NativeTrap, PluginRegistry, SegmentInfo, TrapContext,
    TrapIndex,
};
use crate::status::StatusCode;
use crate::test_utils::{MAIN, TestModule, interpreter_for, location};

fn specifier() -> PluginSpecifier {
    PluginSpecifier {
        system_name: "linux".to_owned(),
        architecture: "x86_64".to_owned(),
        system_version: "6".to_owned(),
        compiler_id: "rustc".to_owned(),
    }
}

fn add(cx: &mut TrapContext<'_>) -> Result<()> {
    let rhs = cx.pop()?;
    let lhs = cx.pop()?;
    match (lhs.as_i64(), rhs.as_i64()) {
        (Some(a), Some(b)) => cx.push(DataCell::I64(a + b)),
        _ => cx.raise_status(StatusCode::InvalidArgument, "add expects two Ints")?,
    }
    Ok(())
}

fn fail(cx: &mut TrapContext<'_>) -> Result<()> {
    cx.raise_status(StatusCode::InvalidArgument, "nope")
}

struct MathPlugin;

impl NativeInterface for MathPlugin {
    fn load(&self, _segment: SegmentInfo<'_>) -> Result<()> {
        Ok(())
    }

    fn unload(&self, _segment: SegmentInfo<'_>) -> Result<()> {
        Ok(())
    }

    fn get_trap(&self, index: u32) -> Option<NativeTrap> {
        match index {
            0 => Some(add as NativeTrap),
            1 => Some(fail as NativeTrap),
            _ => None,
        }
    }

    fn num_traps(&self) -> u32 {
        2
    }
}

fn math_plugin() -> Box<dyn NativeInterface> {
    Box::new(MathPlugin)
}

fn math_registry() -> PluginRegistry {
    PluginRegistry::new().with(
        location(MAIN),
        specifier(),
        NativeLibrary::with_init(math_plugin),
    )
}

/// Object with a plugin whose `$entry` runs `ops`.
fn plugin_object(ops: &[(Opcode, Operands)]) -> Vec<u8> {
    let mut module = TestModule::new();
    module.builder_mut().set_plugin(specifier());
    module.entry(ops);
    module.build()
}

fn trap(index: u32) -> (Opcode, Operands) {
    (
        Opcode::Trap,
        Operands::FlagsAddress {
            flags: 0,
            address: index,
        },
    )
}

fn run_with(registry: PluginRegistry, ops: &[(Opcode, Operands)]) -> Result<DataCell> {
    interpreter_for(plugin_object(ops))
        .plugins(registry)
        .build()?
        .run_until_done()
}

#[test]
fn trap_operates_on_the_data_stack() {
    let result = run_with(
        math_registry(),
        &[
            (Opcode::I64, Operands::I64(2)),
            (Opcode::I64, Operands::I64(3)),
            trap(0),
            (Opcode::Return, Operands::None),
        ],
    )
    .unwrap();

    assert_eq!(result, DataCell::I64(5));
}

#[test]
fn trap_index_can_follow_on_the_stack() {
    let result = run_with(
        math_registry(),
        &[
            (Opcode::I64, Operands::I64(40)),
            (Opcode::I64, Operands::I64(2)),
            (Opcode::I64, Operands::I64(0)),
            (
                Opcode::Trap,
                Operands::FlagsAddress {
                    flags: op_flags::TRAP_INDEX_FOLLOWS,
                    address: 0,
                },
            ),
            (Opcode::Return, Operands::None),
        ],
    )
    .unwrap();

    assert_eq!(result, DataCell::I64(42));
}

#[test]
fn trap_raises_into_bytecode() {
    let err = run_with(
        math_registry(),
        &[trap(1), (Opcode::Return, Operands::None)],
    )
    .unwrap_err();

    insta::assert_snapshot!(err, @"uncaught exception: Status(InvalidArgument: nope)");
}

#[test]
fn undefined_trap_is_fatal() {
    let err = run_with(
        math_registry(),
        &[trap(7), (Opcode::Return, Operands::None)],
    )
    .unwrap_err();

    assert!(matches!(err, InterpreterError::MissingTrap(7)));
}

#[test]
fn object_with_plugin_needs_a_registered_library() {
    let err = run_with(
        PluginRegistry::new(),
        &[(Opcode::Nil, Operands::None), (Opcode::Return, Operands::None)],
    )
    .unwrap_err();

    insta::assert_snapshot!(err, @"no native plugin registered for `/test`");
}

#[test]
fn library_without_native_init_is_rejected() {
    let registry = PluginRegistry::new().with(
        location(MAIN),
        specifier(),
        NativeLibrary::new().with_symbol("other_init", math_plugin),
    );

    let err = run_with(
        registry,
        &[(Opcode::Nil, Operands::None), (Opcode::Return, Operands::None)],
    )
    .unwrap_err();

    insta::assert_snapshot!(err, @"no native plugin registered for `/test (no `native_init` symbol)`");
}

#[test]
fn specifier_must_match_the_platform() {
    let mut other = specifier();
    other.architecture = "aarch64".to_owned();
    let registry = PluginRegistry::new().with(
        location(MAIN),
        other,
        NativeLibrary::with_init(math_plugin),
    );

    let err = run_with(
        registry,
        &[(Opcode::Nil, Operands::None), (Opcode::Return, Operands::None)],
    )
    .unwrap_err();

    assert!(matches!(err, InterpreterError::PluginNotFound(_)));
}

struct Gappy;

impl NativeInterface for Gappy {
    fn load(&self, _segment: SegmentInfo<'_>) -> Result<()> {
        Ok(())
    }

    fn unload(&self, _segment: SegmentInfo<'_>) -> Result<()> {
        Ok(())
    }

    fn get_trap(&self, index: u32) -> Option<NativeTrap> {
        (index == 0).then_some(add as NativeTrap)
    }

    fn num_traps(&self) -> u32 {
        3
    }
}

#[test]
fn trap_index_requires_every_declared_trap() {
    let err = TrapIndex::new(&Gappy).unwrap_err();

    assert!(matches!(err, InterpreterError::MissingTrap(1)));
    let index = TrapIndex::new(&MathPlugin).unwrap();
    assert_eq!(index.len(), 2);
    assert!(index.get(2).is_none());
}

static LOADS: AtomicUsize = AtomicUsize::new(0);
static UNLOADS: AtomicUsize = AtomicUsize::new(0);

struct Counting;

impl NativeInterface for Counting {
    fn load(&self, segment: SegmentInfo<'_>) -> Result<()> {
        assert_eq!(segment.location.to_string(), MAIN);
        LOADS.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn unload(&self, _segment: SegmentInfo<'_>) -> Result<()> {
        UNLOADS.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get_trap(&self, _index: u32) -> Option<NativeTrap> {
        None
    }

    fn num_traps(&self) -> u32 {
        0
    }
}

fn counting_plugin() -> Box<dyn NativeInterface> {
    Box::new(Counting)
}

#[test]
fn plugins_load_and_unload_once() {
    let registry = PluginRegistry::new().with(
        location(MAIN),
        specifier(),
        NativeLibrary::with_init(counting_plugin),
    );
    let mut interpreter = interpreter_for(plugin_object(&[
        (Opcode::Nil, Operands::None),
        (Opcode::Return, Operands::None),
    ]))
    .plugins(registry)
    .build()
    .unwrap();

    interpreter.run_until_done().unwrap();
    assert_eq!(LOADS.load(Ordering::SeqCst), 1);

    interpreter.shutdown().unwrap();
    assert_eq!(UNLOADS.load(Ordering::SeqCst), 1);
    assert!(interpreter.shutdown().is_err());
    drop(interpreter);
    assert_eq!(UNLOADS.load(Ordering::SeqCst), 1);
}
