use indoc::indoc;

use super::*;
use crate::diagnostics::DiagnosticKind;
use crate::error::CompilerError;

fn kinds(source: &str) -> Vec<TokenKind> {
    lex(source).into_iter().map(|t| t.kind).collect()
}

fn parse_errors(source: &str) -> Vec<DiagnosticKind> {
    match Archetype::read(source) {
        Err(CompilerError::Parse(diagnostics)) => diagnostics.iter().map(|d| d.kind()).collect(),
        other => panic!("expected a parse failure, got {other:?}"),
    }
}

fn render_errors(source: &str) -> String {
    match Archetype::read(source) {
        Err(CompilerError::Parse(diagnostics)) => diagnostics.render(),
        other => panic!("expected a parse failure, got {other:?}"),
    }
}

#[test]
fn lexes_nodes_keys_and_values() {
    assert_eq!(
        kinds(r#"(Val :identifier x "1")"#),
        vec![
            TokenKind::ParenOpen,
            TokenKind::Word,
            TokenKind::Key,
            TokenKind::Word,
            TokenKind::Str,
            TokenKind::ParenClose,
        ]
    );
}

#[test]
fn comments_and_whitespace_are_skipped() {
    assert_eq!(
        kinds("; leading\n(Nil) ; trailing"),
        vec![TokenKind::ParenOpen, TokenKind::Word, TokenKind::ParenClose]
    );
}

#[test]
fn unrecognized_characters_coalesce() {
    let tokens = lex("(Nil \"open");

    let garbage: Vec<_> = tokens
        .iter()
        .filter(|t| t.kind == TokenKind::Garbage)
        .collect();
    assert_eq!(garbage.len(), 1);
    assert_eq!(u32::from(garbage[0].span.start()), 5);
}

#[test]
fn reads_nested_nodes() {
    let source = indoc! {r#"
        (Block
          ; a binding
          (Val :identifier x :type "Int" (Integer :value "1"))
          (Name :identifier x))
    "#};
    let archetype = Archetype::read(source).unwrap();

    insta::assert_snapshot!(archetype.dump(), @r#"
    (Block
      (Val :identifier "x" :type "Int"
        (Integer :value "1")
      )
      (Name :identifier "x")
    )
    "#);
}

#[test]
fn node_range_covers_both_parens() {
    let archetype = Archetype::read("(Block (Nil))").unwrap();
    let root = archetype.root().unwrap();
    let nil = archetype.ensure_child(root, 0).unwrap();

    assert_eq!(archetype.range(root).unwrap(), TextRange::new(0.into(), 13.into()));
    assert_eq!(archetype.range(nil).unwrap(), TextRange::new(7.into(), 12.into()));
}

#[test]
fn string_escapes_are_resolved() {
    let archetype = Archetype::read(r#"(String :value "a\"b\n")"#).unwrap();
    let root = archetype.root().unwrap();

    assert_eq!(archetype.attr(root, "value"), Some("a\"b\n"));
}

#[test]
fn unclosed_node() {
    insta::assert_snapshot!(
        render_errors("(Block"),
        @"error at 6..6: missing closing `)` (related: node starts here at 0..1)"
    );
}

#[test]
fn unknown_node_class() {
    insta::assert_snapshot!(render_errors("(Blok)"), @"error at 1..5: `Blok` is not a node class");
}

#[test]
fn bare_value() {
    assert_eq!(parse_errors(r#"(Block "x")"#), vec![DiagnosticKind::BareValue]);
}

#[test]
fn missing_attribute_value() {
    assert_eq!(
        parse_errors("(Name :identifier)"),
        vec![DiagnosticKind::ExpectedAttributeValue]
    );
}

#[test]
fn missing_node_class() {
    assert_eq!(parse_errors("(:value 1)"), vec![
            DiagnosticKind::ExpectedNodeClass,
            DiagnosticKind::UnexpectedToken,
            DiagnosticKind::UnexpectedToken,
        ]);
}

#[test]
fn multiple_roots() {
    assert_eq!(parse_errors("(Block) (Block)"), vec![DiagnosticKind::MultipleRoots]);
}

#[test]
fn empty_input() {
    assert_eq!(parse_errors("  ; nothing\n"), vec![DiagnosticKind::MissingRoot]);
}
