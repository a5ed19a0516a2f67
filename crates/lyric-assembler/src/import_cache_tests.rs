use lyric_common::TypeDef;
use lyric_object::{CallMode, ImportFlags, Intrinsic};

use crate::test_utils::{location, module_cache, prelude_url};
use crate::{AssemblerError, ImportCache, PRELUDE_LOCATION, SymbolCache, SymbolKind, TypeCache};

fn caches() -> (ImportCache, SymbolCache, TypeCache) {
    (ImportCache::new(module_cache()), SymbolCache::new(), TypeCache::new())
}

#[test]
fn import_module_merges_flags() {
    let (mut imports, _, _) = caches();
    let prelude = location(PRELUDE_LOCATION);

    imports.import_module(&prelude, ImportFlags::NONE).unwrap();
    imports
        .import_module(&prelude, ImportFlags::SYSTEM_BOOTSTRAP)
        .unwrap();

    assert_eq!(imports.imports().count(), 1);
    assert_eq!(
        imports.get_import(&prelude).unwrap().flags,
        ImportFlags::SYSTEM_BOOTSTRAP
    );
}

#[test]
fn missing_module() {
    let (mut imports, mut symbols, mut types) = caches();

    let err = imports
        .import_module(&location("/absent"), ImportFlags::NONE)
        .unwrap_err();
    assert!(matches!(err, AssemblerError::MissingModule(_)));

    let err = imports
        .import_symbol(&crate::test_utils::url("/absent#X"), &mut symbols, &mut types)
        .unwrap_err();
    insta::assert_snapshot!(err, @"missing module `/absent`");
}

#[test]
fn missing_symbol() {
    let (mut imports, mut symbols, mut types) = caches();

    let err = imports
        .import_symbol(&prelude_url("Nothing"), &mut symbols, &mut types)
        .unwrap_err();

    assert!(matches!(err, AssemblerError::MissingSymbol(_)));
    // the module itself was still imported
    assert!(imports.has_import(&location(PRELUDE_LOCATION)));
}

#[test]
fn import_symbol_is_idempotent() {
    let (mut imports, mut symbols, mut types) = caches();
    let int = prelude_url("Int");

    let first = imports.import_symbol(&int, &mut symbols, &mut types).unwrap();
    let second = imports.import_symbol(&int, &mut symbols, &mut types).unwrap();

    assert_eq!(first, second);
    assert_eq!(symbols.len(), 1);
    let symbol = symbols.get(first).unwrap();
    assert!(symbol.imported);
    let SymbolKind::Existential(existential) = &symbol.kind else {
        panic!("expected existential, got {:?}", symbol.kind);
    };
    assert_eq!(existential.intrinsic, Intrinsic::Int);
    assert_eq!(existential.type_def, TypeDef::concrete(int.clone()));
    assert!(types.has_type_declaration(&int));
}

#[test]
fn imported_class_stub() {
    let (mut imports, mut symbols, mut types) = caches();
    let object = prelude_url("Object");

    imports.import_symbol(&object, &mut symbols, &mut types).unwrap();
    let class = symbols.get_symbol(&object).unwrap().as_composite().unwrap();
    let ctor = class.ctor.clone().unwrap();
    assert_eq!(class.superclass, None);
    insta::assert_snapshot!(ctor, @"lyric://bootstrap/prelude#Object#$ctor");

    imports.import_symbol(&ctor, &mut symbols, &mut types).unwrap();
    let call = symbols.get_symbol(&ctor).unwrap().as_call().unwrap();
    assert_eq!(call.mode, CallMode::Constructor);
    assert_eq!(call.receiver.as_ref(), Some(&object));
    assert_eq!(call.result_type, Some(TypeDef::concrete(prelude_url("Nil"))));
    assert!(call.finalized);
    assert_eq!(call.proc, None);
}

#[test]
fn top_level_symbols_skip_enclosed() {
    let (mut imports, _, _) = caches();
    let prelude = location(PRELUDE_LOCATION);
    imports.import_module(&prelude, ImportFlags::NONE).unwrap();

    let names: Vec<_> = imports
        .top_level_symbols(&prelude)
        .unwrap()
        .iter()
        .map(|u| u.name().to_owned())
        .collect();

    insta::assert_snapshot!(names.join(" "), @"Any Nil Undef Bool Int Float Char String Namespace Call Status Object");
}
