use std::sync::Arc;

use lyric_common::{ModuleLocation, SymbolUrl};
use lyric_object::{AccessType, DeriveType, MemoryLoader, Opcode};

use crate::{
    CompositeSpec, ExistentialSpec, Fundamental, ModuleCache, ObjectState, ObjectStateOptions,
    PRELUDE_LOCATION, WriterOptions,
};

pub(crate) fn location(text: &str) -> ModuleLocation {
    ModuleLocation::parse(text).unwrap()
}

pub(crate) fn url(text: &str) -> SymbolUrl {
    SymbolUrl::parse(text).unwrap()
}

pub(crate) fn prelude_url(name: &str) -> SymbolUrl {
    url(&format!("{PRELUDE_LOCATION}#{name}"))
}

/// A prelude with every fundamental existential and a root `Object` class.
pub(crate) fn prelude_bytes() -> Vec<u8> {
    let mut state = ObjectState::new(
        location(PRELUDE_LOCATION),
        ModuleCache::new().into_shared(),
        ObjectStateOptions::without_prelude(),
    );
    state.define_root().unwrap();
    let root = state.root_block().unwrap();

    let mut declared = Vec::new();
    for fundamental in Fundamental::ALL {
        let url = match fundamental.intrinsic() {
            Some(intrinsic) => state
                .declare_existential(
                    root,
                    fundamental.name(),
                    ExistentialSpec {
                        access: AccessType::Public,
                        derive: DeriveType::Final,
                        intrinsic,
                        superclass: None,
                    },
                )
                .unwrap(),
            None => state
                .declare_class(root, fundamental.name(), CompositeSpec::default())
                .unwrap(),
        };
        declared.push(url);
    }

    let object = state.fundamentals().url(Fundamental::Object);
    let ctor = object.child("$ctor").unwrap();
    let nil = state.fundamental_type(Fundamental::Nil);
    state.define_call(&ctor, vec![], None, Some(nil.clone())).unwrap();
    let proc = state.proc_mut(&ctor).unwrap();
    proc.code_mut().emit(Opcode::Nil);
    proc.code_mut().emit(Opcode::Return);
    proc.put_exit_type(nil);
    state.finalize_call(&ctor).unwrap();

    for url in &declared {
        state.touch(url).unwrap();
    }
    state
        .to_bytes_with(WriterOptions {
            root_symbols: false,
            touch_unused_imports: false,
        })
        .unwrap()
}

pub(crate) fn module_cache() -> Arc<ModuleCache> {
    let loader = MemoryLoader::new().with_module(location(PRELUDE_LOCATION), prelude_bytes());
    ModuleCache::new().with_system(loader).into_shared()
}

/// A state at `/test` with the test prelude and a defined root.
pub(crate) fn state() -> ObjectState {
    state_at("/test", module_cache())
}

pub(crate) fn state_at(at: &str, modules: Arc<ModuleCache>) -> ObjectState {
    let mut state = ObjectState::new(location(at), modules, ObjectStateOptions::default());
    state.define_root().unwrap();
    state
}
