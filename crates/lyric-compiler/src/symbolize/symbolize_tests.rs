use indoc::indoc;
use lyric_object::{INVALID_ADDRESS, LinkageSection, LyricObject, dump};

use super::symbolize;
use crate::error::{CompilerError, Result};
use crate::test_utils::{location, modules, read};

fn try_symbolize(source: &str) -> Result<LyricObject> {
    symbolize(&read(source), location(), modules())
}

fn section_of(object: &LyricObject, path: &str) -> Option<LinkageSection> {
    object.find_symbol(path).map(|s| s.section)
}

#[test]
fn namespace_becomes_a_symbol() {
    let object = try_symbolize(r#"(Block (Namespace :identifier "N"))"#).unwrap();

    assert_eq!(object.symbol_count(), 1);
    assert_eq!(object.import_count(), 0);
    assert_eq!(section_of(&object, "N"), Some(LinkageSection::Namespace));
}

#[test]
fn definitions_become_linkages() {
    let source = indoc! {r#"
        (Block
          (Def :identifier "f" (Param :identifier "a") (Name :identifier "a"))
          (DefClass :identifier "C")
          (DefStatic :identifier "s" (Integer :value "1"))
          (Integer :value "2"))
    "#};
    let object = try_symbolize(source).unwrap();

    assert_eq!(object.symbol_count(), 3);
    assert_eq!(section_of(&object, "f"), Some(LinkageSection::Call));
    assert_eq!(section_of(&object, "C"), Some(LinkageSection::Class));
    assert_eq!(section_of(&object, "s"), Some(LinkageSection::Static));
    assert!(object.symbols().iter().all(|s| s.index == INVALID_ADDRESS));
    assert!(object.tables().calls.is_empty());
    assert!(dump(&object).contains("f = Call #4294967295"));
}

#[test]
fn namespace_members_are_linked_by_path() {
    let source = indoc! {r#"
        (Block
          (Namespace :identifier "Geometry"
            (Def :identifier "area" :type "Float" (Float :value "1.0"))))
    "#};
    let object = try_symbolize(source).unwrap();

    assert_eq!(section_of(&object, "Geometry"), Some(LinkageSection::Namespace));
    assert_eq!(section_of(&object, "Geometry#area"), Some(LinkageSection::Call));
}

#[test]
fn nested_definitions_are_skipped() {
    let source = indoc! {r#"
        (Block
          (Def :identifier "outer"
            (Def :identifier "inner" (Nil))
            (Nil)))
    "#};
    let object = try_symbolize(source).unwrap();

    assert_eq!(object.symbol_count(), 1);
    assert!(object.find_symbol("inner").is_none());
}

#[test]
fn module_import_is_api_linkage() {
    let source = r#"(Block (ImportModule :location "lyric://bootstrap/prelude"))"#;
    let object = try_symbolize(source).unwrap();

    assert_eq!(object.import_count(), 1);
    insta::assert_snapshot!(dump(&object), @r"
    [symbols]

    [imports]
    I0 lyric://bootstrap/prelude flags=0x02

    [links]
    ");
}

#[test]
fn root_must_be_a_block() {
    let err = try_symbolize(r#"(Integer :value "1")"#).unwrap_err();

    let diagnostics = err.diagnostics().unwrap();
    assert!(matches!(err, CompilerError::Compile(_)));
    insta::assert_snapshot!(
        diagnostics.render(),
        @"error at 0..20: archetype root must be a Block, found Integer"
    );
}

#[test]
fn every_composite_kind_has_its_own_section() {
    let source = indoc! {r#"
        (Block
          (DefStruct :identifier "P")
          (DefInstance :identifier "I")
          (DefEnum :identifier "E")
          (DefConcept :identifier "K" (DefAction :identifier "a")))
    "#};
    let object = try_symbolize(source).unwrap();

    assert_eq!(object.symbol_count(), 4);
    assert_eq!(section_of(&object, "P"), Some(LinkageSection::Struct));
    assert_eq!(section_of(&object, "I"), Some(LinkageSection::Instance));
    assert_eq!(section_of(&object, "E"), Some(LinkageSection::Enum));
    assert_eq!(section_of(&object, "K"), Some(LinkageSection::Concept));
}
