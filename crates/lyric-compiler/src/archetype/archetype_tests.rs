use rowan::TextRange;

use super::*;

fn range(start: u32, end: u32) -> TextRange {
    TextRange::new(start.into(), end.into())
}

fn sample() -> Archetype {
    let mut builder = ArchetypeBuilder::new();
    let block = builder.push(AstClass::Block, range(0, 40));
    let val = builder.push(AstClass::Val, range(7, 39));
    builder.set_attr(val, "identifier", "x").unwrap();
    let one = builder.push(AstClass::Integer, range(22, 38));
    builder.set_attr(one, "value", "1").unwrap();
    builder.append_child(val, one).unwrap();
    builder.append_child(block, val).unwrap();
    builder.build(block).unwrap()
}

#[test]
fn builder_links_children() {
    let archetype = sample();
    let root = archetype.root().unwrap();

    assert_eq!(archetype.len(), 3);
    assert_eq!(archetype.class(root).unwrap(), AstClass::Block);
    let val = archetype.ensure_child(root, 0).unwrap();
    assert_eq!(archetype.class(val).unwrap(), AstClass::Val);
    assert_eq!(archetype.attr(val, "identifier"), Some("x"));
    assert_eq!(archetype.range(val).unwrap(), range(7, 39));
}

#[test]
fn children_of_class_filters_in_order() {
    let archetype = Archetype::read(
        r#"(Def :identifier "f" (Param :identifier "a") (Nil) (Param :identifier "b"))"#,
    )
    .unwrap();
    let root = archetype.root().unwrap();

    let names: Vec<_> = archetype
        .children_of_class(root, AstClass::Param)
        .unwrap()
        .map(|p| archetype.attr(p, "identifier").unwrap())
        .collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn missing_attribute_is_a_syntax_error() {
    let archetype = sample();
    let root = archetype.root().unwrap();

    let err = archetype.ensure_attr(root, "identifier").unwrap_err();
    insta::assert_snapshot!(err, @"syntax error: Block node is missing `:identifier`");
    let err = archetype.ensure_child(root, 3).unwrap_err();
    insta::assert_snapshot!(err, @"syntax error: Block node has no child 3");
}

#[test]
fn unknown_node_is_an_invariant() {
    let archetype = sample();

    let err = archetype.node(NodeId(9)).unwrap_err();
    assert!(err.is_invariant());
}

#[test]
fn builder_rejects_dangling_ids() {
    let mut builder = ArchetypeBuilder::new();
    let block = builder.push(AstClass::Block, range(0, 1));

    assert!(builder.append_child(block, NodeId(5)).is_err());
    assert!(ArchetypeBuilder::new().build(NodeId(0)).is_err());
}

#[test]
fn dump_renders_reader_syntax() {
    insta::assert_snapshot!(sample().dump(), @r#"
    (Block
      (Val :identifier "x"
        (Integer :value "1")
      )
    )
    "#);
}

#[test]
fn class_names_round_trip() {
    for class in AstClass::ALL {
        assert_eq!(AstClass::from_name(class.name()), Some(class));
    }
    assert_eq!(AstClass::from_name("Blok"), None);
}
