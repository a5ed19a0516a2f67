//! Tests for CLI dispatch logic.

use std::path::PathBuf;

use super::*;
use crate::cli::commands::{compile_command, dump_command, exec_command};
use crate::commands::exec::ExecArgs;

#[test]
fn compile_defaults() {
    let m = compile_command()
        .try_get_matches_from(["compile", "app.lya"])
        .unwrap();
    let params = CompileParams::from_matches(&m);

    assert_eq!(params.archetype_path, PathBuf::from("app.lya"));
    assert_eq!(params.output, None);
    assert_eq!(params.location, None);
    assert!(!params.optimize);
    assert_eq!(params.color, ColorChoice::Auto);
}

#[test]
fn compile_extracts_all_flags() {
    let m = compile_command()
        .try_get_matches_from([
            "compile",
            "app.lya",
            "-o",
            "out/app.lyo",
            "--location",
            "/util/app",
            "--system-dir",
            "sys",
            "--local-dir",
            "build",
            "-O",
            "--color",
            "never",
        ])
        .unwrap();
    let params = CompileParams::from_matches(&m);

    assert_eq!(params.output, Some(PathBuf::from("out/app.lyo")));
    assert_eq!(params.location.as_deref(), Some("/util/app"));
    assert_eq!(params.system_dir, Some(PathBuf::from("sys")));
    assert_eq!(params.local_dir, Some(PathBuf::from("build")));
    assert!(params.optimize);
    assert_eq!(params.color, ColorChoice::Never);
}

#[test]
fn compile_requires_an_archetype() {
    let result = compile_command().try_get_matches_from(["compile"]);

    assert!(result.is_err());
}

#[test]
fn dump_takes_one_object() {
    let m = dump_command()
        .try_get_matches_from(["dump", "app.lyo"])
        .unwrap();

    assert_eq!(
        DumpParams::from_matches(&m).object_path,
        PathBuf::from("app.lyo")
    );
    assert!(dump_command().try_get_matches_from(["dump"]).is_err());
}

#[test]
fn exec_defaults() {
    let m = exec_command()
        .try_get_matches_from(["exec", "app.lyo"])
        .unwrap();
    let params = ExecParams::from_matches(&m);

    assert_eq!(params.fuel, 1_000_000);
    assert!(!params.trace);
    assert!(!params.json);
    assert_eq!(params.verbose, 0);
}

#[test]
fn exec_extracts_runtime_flags() {
    let m = exec_command()
        .try_get_matches_from([
            "exec",
            "app.lyo",
            "--fuel",
            "500",
            "--trace",
            "--json",
            "--system-dir",
            "sys",
            "--local-dir",
            "build",
        ])
        .unwrap();
    let params = ExecParams::from_matches(&m);

    assert_eq!(params.fuel, 500);
    assert!(params.trace);
    assert!(params.json);
    assert_eq!(params.system_dir, Some(PathBuf::from("sys")));
    assert_eq!(params.local_dir, Some(PathBuf::from("build")));
}

#[test]
fn exec_rejects_non_numeric_fuel() {
    let result = exec_command().try_get_matches_from(["exec", "app.lyo", "--fuel", "lots"]);

    assert!(result.is_err());
}

#[test]
fn verbose_implies_trace() {
    let m = exec_command()
        .try_get_matches_from(["exec", "app.lyo", "-v"])
        .unwrap();
    let args: ExecArgs = ExecParams::from_matches(&m).into();

    assert!(args.trace);
    assert!(args.verbose);
}

#[test]
fn unknown_subcommand_is_rejected() {
    let result = build_cli().try_get_matches_from(["lyric", "run", "app.lyo"]);

    assert!(result.is_err());
}
