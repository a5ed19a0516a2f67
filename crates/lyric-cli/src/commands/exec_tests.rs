use indoc::indoc;
use lyric_runtime::{DataCell, InterpreterError};
use serde_json::json;

use super::error::CliError;
use super::exec::{execute, to_json};
use super::test_utils::{ONE_PLUS_ONE, compiled, exec_args};

const COUNT_TO_THREE: &str = indoc! {r#"
    (Block
      (Var :identifier "i" (Integer :value "0"))
      (While (IsLt (Name :identifier "i") (Integer :value "3"))
        (InplaceAdd :identifier "i" (Integer :value "1")))
      (Name :identifier "i"))
"#};

#[test]
fn runs_the_entry_call() {
    let dir = tempfile::tempdir().unwrap();
    let object = compiled(dir.path(), "app", COUNT_TO_THREE);

    let report = execute(&exec_args(&object)).unwrap();

    let value = report.outcome.unwrap();
    assert_eq!(value.text, "3");
    assert_eq!(value.json, json!(3));
    assert!(report.instructions > 0);
    assert!(report.trace.is_none());
}

#[test]
fn json_report_carries_the_result() {
    let dir = tempfile::tempdir().unwrap();
    let object = compiled(dir.path(), "app", ONE_PLUS_ONE);

    let report = execute(&exec_args(&object)).unwrap();
    let json = report.to_json();

    assert_eq!(json["result"], json!(2));
    assert_eq!(json["instructions"], json!(report.instructions));
    assert!(json.get("error").is_none());
}

#[test]
fn trace_ends_with_the_result() {
    let dir = tempfile::tempdir().unwrap();
    let object = compiled(dir.path(), "app", ONE_PLUS_ONE);
    let mut args = exec_args(&object);
    args.trace = true;

    let report = execute(&args).unwrap();
    let trace = report.trace.unwrap();

    assert!(trace.starts_with("0:0000 "));
    assert_eq!(trace.lines().last(), Some("halt 2"));
}

#[test]
fn verbose_trace_shows_the_stack() {
    let dir = tempfile::tempdir().unwrap();
    let object = compiled(dir.path(), "app", ONE_PLUS_ONE);
    let mut args = exec_args(&object);
    args.trace = true;
    args.verbose = true;

    let trace = execute(&args).unwrap().trace.unwrap();

    assert!(trace.lines().any(|line| line.trim() == "[2]"));
}

#[test]
fn fuel_limit_is_reported_in_the_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let object = compiled(dir.path(), "app", COUNT_TO_THREE);
    let mut args = exec_args(&object);
    args.fuel = 10;

    let report = execute(&args).unwrap();

    assert_eq!(report.instructions, 10);
    let err = report.outcome.as_ref().unwrap_err();
    insta::assert_snapshot!(err, @"execution exceeded fuel limit of 10 instructions");
    insta::assert_snapshot!(
        report.to_json()["error"],
        @r#""execution exceeded fuel limit of 10 instructions""#
    );
}

#[test]
fn uncaught_exception() {
    let dir = tempfile::tempdir().unwrap();
    let object = compiled(dir.path(), "app", r#"(Block (Raise (New :type "Object")))"#);

    let err = execute(&exec_args(&object)).unwrap().outcome.unwrap_err();

    assert!(matches!(err, InterpreterError::Uncaught(_)));
}

#[test]
fn module_without_entry_fails_before_running() {
    let dir = tempfile::tempdir().unwrap();
    let object = compiled(dir.path(), "lib", "(Block)");

    let err = execute(&exec_args(&object)).err().unwrap();

    insta::assert_snapshot!(err, @"module `/lib` has no `$entry` call");
}

#[test]
fn location_override_names_the_module() {
    let dir = tempfile::tempdir().unwrap();
    let object = compiled(dir.path(), "lib", "(Block)");
    let mut args = exec_args(&object);
    args.location = Some("/renamed".to_owned());

    let err = execute(&args).err().unwrap();

    insta::assert_snapshot!(err, @"module `/renamed` has no `$entry` call");
}

#[test]
fn missing_object_file() {
    let dir = tempfile::tempdir().unwrap();

    let err = execute(&exec_args(&dir.path().join("absent.lyo")))
        .err()
        .unwrap();

    assert!(matches!(err, CliError::Read { .. }));
}

#[test]
fn json_values() {
    assert_eq!(to_json(&DataCell::Nil), json!(null));
    assert_eq!(to_json(&DataCell::Bool(true)), json!(true));
    assert_eq!(to_json(&DataCell::Dbl(1.5)), json!(1.5));
    assert_eq!(to_json(&DataCell::Dbl(f64::NAN)), json!(null));
    assert_eq!(to_json(&DataCell::Chr('x')), json!("x"));
    assert_eq!(to_json(&DataCell::utf8("hi")), json!("hi"));
}
