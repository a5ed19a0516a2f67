use lyric_common::ModuleLocation;

use crate::builder_tests::entry_object;
use crate::{ChainLoader, DirectoryLoader, Loader, LoaderError, MemoryLoader, Opcode, Operands};

fn object_bytes(op: Opcode) -> Vec<u8> {
    entry_object(&[(op, Operands::None), (Opcode::Return, Operands::None)])
        .build()
        .unwrap()
}

fn first_op(object: &crate::LyricObject) -> Opcode {
    let layout = object.proc(object.tables().calls[0].proc_offset).unwrap();
    object.iter_proc(&layout).next().unwrap().unwrap().opcode
}

fn loc(s: &str) -> ModuleLocation {
    ModuleLocation::parse(s).unwrap()
}

#[test]
fn memory_loader() {
    let loader = MemoryLoader::new().with_module(loc("/app"), object_bytes(Opcode::Nil));

    assert!(loader.has_module(&loc("/app")).unwrap());
    assert!(!loader.has_module(&loc("/other")).unwrap());
    assert!(loader.load_module(&loc("/other")).unwrap().is_none());

    let object = loader.load_module(&loc("/app")).unwrap().unwrap();
    assert_eq!(first_op(&object), Opcode::Nil);
}

#[test]
fn memory_loader_reports_corrupt_object() {
    let loader = MemoryLoader::new().with_module(loc("/bad"), vec![0; 80]);
    let err = loader.load_module(&loc("/bad")).unwrap_err();
    assert!(matches!(err, LoaderError::Object { .. }));
    assert!(err.to_string().contains("/bad"));
}

#[test]
fn directory_loader_maps_paths() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("lib")).unwrap();
    std::fs::write(dir.path().join("lib/util.lyo"), object_bytes(Opcode::True)).unwrap();

    let loader = DirectoryLoader::new(dir.path());
    assert_eq!(
        loader.module_path(&loc("/lib/util")).unwrap(),
        dir.path().join("lib/util.lyo")
    );
    assert!(loader.has_module(&loc("/lib/util")).unwrap());
    assert!(!loader.has_module(&loc("/lib/missing")).unwrap());

    let object = loader.load_module(&loc("/lib/util")).unwrap().unwrap();
    assert_eq!(first_op(&object), Opcode::True);

    // Absolute locations need a matching origin.
    assert!(loader.module_path(&loc("dev://local/lib/util")).is_none());
    let loader = loader.with_origin("dev", "local");
    assert!(loader.has_module(&loc("dev://local/lib/util")).unwrap());
    assert!(!loader.has_module(&loc("dev://remote/lib/util")).unwrap());
}

#[test]
fn chain_loader_prefers_earlier_loaders() {
    let local = MemoryLoader::new().with_module(loc("/shared"), object_bytes(Opcode::True));
    let system = MemoryLoader::new()
        .with_module(loc("/shared"), object_bytes(Opcode::False))
        .with_module(loc("/system-only"), object_bytes(Opcode::Undef));
    let chain = ChainLoader::new().with(local).with(system);
    assert_eq!(chain.len(), 2);

    let shared = chain.load_module(&loc("/shared")).unwrap().unwrap();
    assert_eq!(first_op(&shared), Opcode::True);

    let system_only = chain.load_module(&loc("/system-only")).unwrap().unwrap();
    assert_eq!(first_op(&system_only), Opcode::Undef);

    assert!(!chain.has_module(&loc("/nowhere")).unwrap());
    assert!(chain.load_module(&loc("/nowhere")).unwrap().is_none());
}
