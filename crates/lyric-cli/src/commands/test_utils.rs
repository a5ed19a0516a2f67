use std::fs;
use std::path::{Path, PathBuf};

use super::compile::{CompileArgs, compile};
use super::exec::ExecArgs;

pub(crate) const ONE_PLUS_ONE: &str = r#"(Block (Add (Integer :value "1") (Integer :value "1")))"#;

pub(crate) fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

pub(crate) fn compile_args(archetype: &Path) -> CompileArgs {
    CompileArgs {
        archetype_path: archetype.to_path_buf(),
        output: None,
        location: None,
        system_dir: None,
        local_dir: None,
        optimize: false,
        color: false,
    }
}

pub(crate) fn exec_args(object: &Path) -> ExecArgs {
    ExecArgs {
        object_path: object.to_path_buf(),
        location: None,
        system_dir: None,
        local_dir: None,
        fuel: 1_000_000,
        trace: false,
        verbose: false,
        json: false,
    }
}

/// Write `source` as `<name>.lya` in `dir`, compile it, return the object path.
pub(crate) fn compiled(dir: &Path, name: &str, source: &str) -> PathBuf {
    let archetype = write(dir, &format!("{name}.lya"), source);
    compile(&compile_args(&archetype)).unwrap().output
}
