use crate::{SymbolUrl, TypeDef};

fn named(text: &str) -> TypeDef {
    TypeDef::concrete(SymbolUrl::parse(text).unwrap())
}

#[test]
fn union_is_order_independent() {
    let a = TypeDef::union([named("/p#Int"), named("/p#Nil")]);
    let b = TypeDef::union([named("/p#Nil"), named("/p#Int")]);

    assert_eq!(a, b);
    assert_eq!(a.to_string(), "/p#Int | /p#Nil");
}

#[test]
fn union_flattens_and_dedups() {
    let inner = TypeDef::union([named("/p#Int"), named("/p#Nil")]);
    let outer = TypeDef::union([inner, named("/p#Int"), named("/p#Bool")]);

    assert_eq!(outer.members().len(), 3);
}

#[test]
fn single_member_collapses() {
    assert_eq!(TypeDef::union([named("/p#Int"), named("/p#Int")]), named("/p#Int"));
    assert_eq!(TypeDef::intersection(Vec::new()), TypeDef::Invalid);
}

#[test]
fn intersection_is_distinct_from_union() {
    let u = TypeDef::union([named("/p#A"), named("/p#B")]);
    let i = TypeDef::intersection([named("/p#A"), named("/p#B")]);

    assert_ne!(u, i);
    assert_eq!(i.to_string(), "/p#A & /p#B");
}

#[test]
fn validity() {
    let generic = TypeDef::concrete_with_args(
        SymbolUrl::parse("/p#Seq").unwrap(),
        vec![TypeDef::Invalid],
    );

    assert!(named("/p#Int").is_valid());
    assert!(TypeDef::NoReturn.is_valid());
    assert!(!TypeDef::Invalid.is_valid());
    assert!(!generic.is_valid());
}

#[test]
fn display_generic_and_placeholder() {
    let template = SymbolUrl::parse("/p#Map").unwrap();
    let map = TypeDef::concrete_with_args(
        template.clone(),
        vec![TypeDef::placeholder(template, 0), named("/p#Int")],
    );

    assert_eq!(map.to_string(), "/p#Map[/p#Map$0, /p#Int]");
    assert_eq!(map.type_arguments().len(), 2);
}
