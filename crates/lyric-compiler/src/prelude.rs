//! Bootstrap prelude used when no system library is configured.

use std::sync::Arc;

use lyric_assembler::{
    CTOR_NAME, CompositeSpec, ExistentialSpec, Fundamental, ModuleCache, ObjectState,
    ObjectStateOptions, PRELUDE_LOCATION, PendingOperand, WriterOptions,
};
use lyric_common::ModuleLocation;
use lyric_object::{AccessType, DeriveType, MemoryLoader, Opcode, op_flags};

use crate::error::Result;

/// Serialized prelude: every fundamental as a final existential, plus the
/// root class `Object` with a constructor that does nothing and `Int#abs`.
pub fn minimal_prelude() -> Result<Vec<u8>> {
    let location = ModuleLocation::parse(PRELUDE_LOCATION)?;
    let mut state = ObjectState::new(
        location,
        ModuleCache::new().into_shared(),
        ObjectStateOptions::without_prelude(),
    );
    state.define_root()?;
    let root = state.root_block()?;

    let mut declared = Vec::with_capacity(Fundamental::ALL.len());
    for fundamental in Fundamental::ALL {
        let url = match fundamental.intrinsic() {
            Some(intrinsic) => state.declare_existential(
                root,
                fundamental.name(),
                ExistentialSpec {
                    access: AccessType::Public,
                    derive: DeriveType::Final,
                    intrinsic,
                    superclass: None,
                },
            )?,
            None => state.declare_class(root, fundamental.name(), CompositeSpec::default())?,
        };
        declared.push(url);
    }

    let ctor = state.fundamentals().url(Fundamental::Object).child(CTOR_NAME)?;
    let nil = state.fundamental_type(Fundamental::Nil);
    state.define_call(&ctor, Vec::new(), None, Some(nil.clone()))?;
    let proc = state.proc_mut(&ctor)?;
    proc.code_mut().emit(Opcode::Nil);
    proc.code_mut().emit(Opcode::Return);
    proc.put_exit_type(nil);
    state.finalize_call(&ctor)?;
    define_int_abs(&mut state)?;

    for url in &declared {
        state.touch(url)?;
    }
    Ok(state.to_bytes_with(WriterOptions {
        root_symbols: false,
        touch_unused_imports: false,
    })?)
}

fn define_int_abs(state: &mut ObjectState) -> Result<()> {
    let int_url = state.fundamentals().url(Fundamental::Int);
    let int = state.fundamental_type(Fundamental::Int);
    let abs = state.declare_existential_method(&int_url, "abs", AccessType::Public)?;
    state.define_call(&abs, Vec::new(), None, Some(int.clone()))?;

    let proc = state.proc_mut(&abs)?;
    let non_negative = proc.make_label();
    let this = || PendingOperand::Type(op_flags::SYNTHETIC_THIS);
    let code = proc.code_mut();
    code.emit_with(Opcode::Synthetic, this());
    code.emit_jump(Opcode::IfGe, non_negative);
    code.emit_with(Opcode::Synthetic, this());
    code.emit(Opcode::I64Neg);
    code.emit(Opcode::Return);
    code.place_label(non_negative);
    code.emit_with(Opcode::Synthetic, this());
    code.emit(Opcode::Return);
    proc.put_exit_type(int);
    state.finalize_call(&abs)?;
    Ok(())
}

/// Loader serving the minimal prelude at its bootstrap location.
pub fn prelude_loader() -> Result<MemoryLoader> {
    let location = ModuleLocation::parse(PRELUDE_LOCATION)?;
    Ok(MemoryLoader::new().with_module(location, minimal_prelude()?))
}

/// Module cache whose system library is the minimal prelude.
pub fn bootstrap_modules() -> Result<Arc<ModuleCache>> {
    Ok(ModuleCache::new().with_system(prelude_loader()?).into_shared())
}
