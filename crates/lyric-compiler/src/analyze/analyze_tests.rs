use indoc::indoc;
use lyric_assembler::ObjectStateOptions;
use lyric_object::{LinkageSection, LyricObject, dump};

use super::analyze;
use crate::diagnostics::DiagnosticKind;
use crate::error::Result;
use crate::test_utils::{location, modules, read};

fn try_analyze(source: &str) -> Result<LyricObject> {
    analyze(&read(source), location(), modules(), ObjectStateOptions::default())
}

/// The `[calls]` header line of the call at `path`.
fn signature(object: &LyricObject, path: &str) -> String {
    let prefix = format!(" {path} (");
    dump(object)
        .lines()
        .find(|line| line.starts_with('C') && line.contains(&prefix))
        .unwrap_or_else(|| panic!("no call `{path}`"))
        .split_once(' ')
        .map(|(_, rest)| rest.to_owned())
        .unwrap()
}

#[test]
fn function_signature_is_declared() {
    let source = indoc! {r#"
        (Block
          (Def :identifier "f" :type "Int"
            (Param :identifier "a" :type "Int")
            (Name :identifier "a")))
    "#};
    let object = try_analyze(source).unwrap();

    assert_eq!(
        object.find_symbol("f").map(|s| s.section),
        Some(LinkageSection::Call)
    );
    insta::assert_snapshot!(signature(&object, "f"), @"f (1 params) -> lyric://bootstrap/prelude#Int");
}

#[test]
fn undeclared_result_is_any() {
    let object = try_analyze(r#"(Block (Def :identifier "g" (Integer :value "1")))"#).unwrap();

    insta::assert_snapshot!(signature(&object, "g"), @"g (0 params) -> lyric://bootstrap/prelude#Any");
}

#[test]
fn bodies_are_not_visited() {
    let source = r#"(Block (Def :identifier "h" (Name :identifier "missing")))"#;

    assert!(try_analyze(source).is_ok());
}

#[test]
fn class_declares_constructor_and_methods() {
    let source = indoc! {r#"
        (Block
          (DefClass :identifier "Point"
            (Val :identifier "x" :type "Int")
            (Init (Param :identifier "x0" :type "Int")
              (Set :identifier "x" (Name :identifier "x0")))
            (Def :identifier "getX" :type "Int" (Name :identifier "x"))))
    "#};
    let object = try_analyze(source).unwrap();

    assert_eq!(
        object.find_symbol("Point").map(|s| s.section),
        Some(LinkageSection::Class)
    );
    assert!(signature(&object, "Point#$ctor").starts_with("Point#$ctor (1 params)"));
    insta::assert_snapshot!(
        signature(&object, "Point#getX"),
        @"Point#getX (0 params) -> lyric://bootstrap/prelude#Int"
    );
}

#[test]
fn static_declares_its_initializer() {
    let source = r#"(Block (DefStatic :identifier "limit" :type "Int" (Integer :value "10")))"#;
    let object = try_analyze(source).unwrap();

    assert_eq!(
        object.find_symbol("limit").map(|s| s.section),
        Some(LinkageSection::Static)
    );
    assert!(signature(&object, "limit#$init").ends_with("#Int"));
}

#[test]
fn namespace_members_are_declared() {
    let source = indoc! {r#"
        (Block
          (Namespace :identifier "N"
            (Def :identifier "one" :type "Int" (Integer :value "1"))))
    "#};
    let object = try_analyze(source).unwrap();

    assert_eq!(
        object.find_symbol("N").map(|s| s.section),
        Some(LinkageSection::Namespace)
    );
    assert_eq!(
        object.find_symbol("N#one").map(|s| s.section),
        Some(LinkageSection::Call)
    );
}

#[test]
fn root_must_be_a_block() {
    let err = try_analyze(r#"(Nil)"#).unwrap_err();

    let diagnostics = err.diagnostics().unwrap();
    let message = diagnostics.iter().next().unwrap();
    assert_eq!(message.kind(), DiagnosticKind::UnexpectedNode);
    assert_eq!(message.message(), "archetype root must be a Block, found Nil");
}

#[test]
fn concept_declared_after_its_implementor() {
    let source = indoc! {r#"
        (Block
          (DefStruct :identifier "Square" :implements "Shape"
            (Def :identifier "area" :type "Int" (Integer :value "4")))
          (DefConcept :identifier "Shape"
            (DefAction :identifier "area" :type "Int")))
    "#};
    let object = try_analyze(source).unwrap();

    assert_eq!(
        object.find_symbol("Shape").map(|s| s.section),
        Some(LinkageSection::Concept)
    );
    assert_eq!(
        object.find_symbol("Square").map(|s| s.section),
        Some(LinkageSection::Struct)
    );
    assert_eq!(
        object.find_symbol("Shape#area").map(|s| s.section),
        Some(LinkageSection::Action)
    );
    insta::assert_snapshot!(
        signature(&object, "Square#area"),
        @"Square#area (0 params) -> lyric://bootstrap/prelude#Int"
    );
}
