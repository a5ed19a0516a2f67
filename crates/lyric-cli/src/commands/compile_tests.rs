use std::fs;

use lyric_compiler::minimal_prelude;
use lyric_object::{LyricObject, dump};

use super::compile::compile;
use super::error::CliError;
use super::exec::execute;
use super::test_utils::{ONE_PLUS_ONE, compile_args, exec_args, write};

#[test]
fn object_lands_next_to_the_archetype() {
    let dir = tempfile::tempdir().unwrap();
    let archetype = write(dir.path(), "app.lya", ONE_PLUS_ONE);

    let report = compile(&compile_args(&archetype)).unwrap();

    assert_eq!(report.output, dir.path().join("app.lyo"));
    assert_eq!(report.location.to_string(), "/app");
    assert!(report.warnings.is_empty());
    let object = LyricObject::from_path(&report.output).unwrap();
    assert!(dump(&object).contains("$entry"));
}

#[test]
fn explicit_output_and_location() {
    let dir = tempfile::tempdir().unwrap();
    let archetype = write(dir.path(), "app.lya", ONE_PLUS_ONE);
    let mut args = compile_args(&archetype);
    args.output = Some(dir.path().join("main.lyo"));
    args.location = Some("/util/main".to_owned());

    let report = compile(&args).unwrap();

    assert!(report.output.is_file());
    assert!(!dir.path().join("app.lyo").exists());
    assert_eq!(report.location.to_string(), "/util/main");
}

#[test]
fn optimized_object_still_runs() {
    let dir = tempfile::tempdir().unwrap();
    let archetype = write(dir.path(), "app.lya", ONE_PLUS_ONE);
    let mut args = compile_args(&archetype);
    args.optimize = true;

    let report = compile(&args).unwrap();
    let run = execute(&exec_args(&report.output)).unwrap();

    assert_eq!(run.outcome.unwrap().text, "2");
}

#[test]
fn diagnostics_are_rendered_against_the_source() {
    let dir = tempfile::tempdir().unwrap();
    let archetype = write(
        dir.path(),
        "broken.lya",
        r#"(Block (Name :identifier "missing"))"#,
    );

    let err = compile(&compile_args(&archetype)).err().unwrap();

    let CliError::Diagnostics(rendered) = err else {
        panic!("expected diagnostics, got {err}");
    };
    assert!(rendered.contains("`missing` is not defined"));
    assert!(rendered.contains("broken.lya"));
    assert!(!dir.path().join("broken.lyo").exists());
}

#[test]
fn unreadable_archetype() {
    let dir = tempfile::tempdir().unwrap();

    let err = compile(&compile_args(&dir.path().join("absent.lya")))
        .err()
        .unwrap();

    assert!(matches!(err, CliError::Read { .. }));
}

#[test]
fn location_must_be_a_module_path() {
    let dir = tempfile::tempdir().unwrap();
    let archetype = write(dir.path(), "app.lya", ONE_PLUS_ONE);
    let mut args = compile_args(&archetype);
    args.location = Some("app".to_owned());

    let err = compile(&args).err().unwrap();

    insta::assert_snapshot!(err, @"invalid module location `app`");
}

#[test]
fn system_dir_replaces_the_builtin_prelude() {
    let dir = tempfile::tempdir().unwrap();
    let system = dir.path().join("sys");
    fs::create_dir(&system).unwrap();
    fs::write(system.join("prelude.lyo"), minimal_prelude().unwrap()).unwrap();
    let archetype = write(dir.path(), "app.lya", ONE_PLUS_ONE);
    let mut args = compile_args(&archetype);
    args.system_dir = Some(system.clone());

    let report = compile(&args).unwrap();
    let mut run = exec_args(&report.output);
    run.system_dir = Some(system);

    assert_eq!(execute(&run).unwrap().outcome.unwrap().text, "2");
}

#[test]
fn empty_system_dir_has_no_prelude() {
    let dir = tempfile::tempdir().unwrap();
    let archetype = write(dir.path(), "app.lya", ONE_PLUS_ONE);
    let mut args = compile_args(&archetype);
    args.system_dir = Some(dir.path().to_path_buf());

    assert!(compile(&args).is_err());
}
