use lyric_common::{ModuleLocation, PRELUDE_LOCATION};
use lyric_compiler::{CompileOptions, bootstrap_modules, compile_source, prelude_loader};
use lyric_object::{
    AccessType, CallDescriptor, CallFlags, CallMode, ChainLoader, INVALID_ADDRESS, LinkageSection,
    MemoryLoader, ObjectBuilder, OpCell, Opcode, Operands, ParameterDescriptor, ProcInfo,
    TypeDescriptor, TypeKind,
};

use crate::data_cell::DataCell;
use crate::error::Result;
use crate::interpreter::{BytecodeInterpreter, InterpreterBuilder};

pub(crate) const MAIN: &str = "/test";

pub(crate) fn location(text: &str) -> ModuleLocation {
    ModuleLocation::parse(text).unwrap()
}

pub(crate) fn compile(source: &str) -> Vec<u8> {
    let compilation = compile_source(
        source,
        location(MAIN),
        bootstrap_modules().unwrap(),
        &CompileOptions::default(),
    )
    .unwrap();
    compilation.object.as_bytes().to_vec()
}

/// The main object at [`MAIN`] plus the bootstrap prelude.
pub(crate) fn loader_for(main: Vec<u8>) -> ChainLoader {
    ChainLoader::new()
        .with(MemoryLoader::new().with_module(location(MAIN), main))
        .with(prelude_loader().unwrap())
}

pub(crate) fn interpreter_for(main: Vec<u8>) -> InterpreterBuilder {
    BytecodeInterpreter::builder(loader_for(main), location(MAIN))
}

pub(crate) fn run_object(main: Vec<u8>) -> Result<DataCell> {
    interpreter_for(main).build()?.run_until_done()
}

pub(crate) fn run_source(source: &str) -> Result<DataCell> {
    run_object(compile(source))
}

pub(crate) fn code(ops: &[(Opcode, Operands)]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for (opcode, operands) in ops {
        OpCell::new(*opcode, *operands).encode(&mut bytes).unwrap();
    }
    bytes
}

/// Hand-assembled object for bytecode the compiler never emits.
pub(crate) struct TestModule {
    builder: ObjectBuilder,
    any: u32,
}

impl TestModule {
    pub(crate) fn new() -> Self {
        let mut builder = ObjectBuilder::new();
        let url = builder.intern(&format!("{PRELUDE_LOCATION}#Any"));
        builder.tables_mut().types.push(TypeDescriptor {
            kind: TypeKind::Concrete,
            url: Some(url),
            members: vec![],
        });
        Self { builder, any: 0 }
    }

    pub(crate) fn builder_mut(&mut self) -> &mut ObjectBuilder {
        &mut self.builder
    }

    /// Add a call with `info` as its proc, returning its call index.
    pub(crate) fn call_with(&mut self, path: &str, info: ProcInfo, rest: bool) -> u32 {
        let proc_offset = self.builder.add_proc(&info).unwrap();
        let param = |builder: &mut ObjectBuilder, any| ParameterDescriptor {
            name: builder.intern("p"),
            param_type: any,
            is_variable: false,
        };
        let parameters = (0..info.num_arguments)
            .map(|_| param(&mut self.builder, self.any))
            .collect();
        let rest = rest.then(|| param(&mut self.builder, self.any));
        let path_id = self.builder.intern(path);
        let tables = self.builder.tables_mut();
        tables.calls.push(CallDescriptor {
            path: path_id,
            access: AccessType::Public,
            mode: CallMode::Normal,
            flags: CallFlags::NONE,
            receiver: INVALID_ADDRESS,
            receiver_section: LinkageSection::Invalid,
            parameters,
            rest,
            result_type: self.any,
            proc_offset,
        });
        let index = (tables.calls.len() - 1) as u32;
        self.builder.add_symbol(path, LinkageSection::Call, index);
        index
    }

    pub(crate) fn call(&mut self, path: &str, num_arguments: u16, ops: &[(Opcode, Operands)]) -> u32 {
        self.call_with(
            path,
            ProcInfo {
                num_arguments,
                code: code(ops),
                ..Default::default()
            },
            false,
        )
    }

    pub(crate) fn entry(&mut self, ops: &[(Opcode, Operands)]) -> u32 {
        self.call("$entry", 0, ops)
    }

    pub(crate) fn build(self) -> Vec<u8> {
        self.builder.build().unwrap()
    }
}

/// Object whose `$entry` runs `ops`.
pub(crate) fn entry_object(ops: &[(Opcode, Operands)]) -> Vec<u8> {
    let mut module = TestModule::new();
    module.entry(ops);
    module.build()
}
