use crate::{CommonError, ModuleLocation, SymbolPath, SymbolUrl};

#[test]
fn path_parse_and_display() {
    let path = SymbolPath::parse("Outer#Inner#value").unwrap();

    assert_eq!(path.segments(), ["Outer", "Inner", "value"]);
    assert_eq!(path.name(), "value");
    assert_eq!(path.enclosure(), ["Outer", "Inner"]);
    assert!(path.is_enclosed());
    assert_eq!(path.to_string(), "Outer#Inner#value");
}

#[test]
fn path_rejects_empty_segments() {
    assert!(SymbolPath::parse("").is_err());
    assert!(SymbolPath::parse("A##B").is_err());
    assert!(SymbolPath::parse("A#").is_err());
    assert!(SymbolPath::new(Vec::<String>::new()).is_err());
    assert!(SymbolPath::from_name("has space").is_err());
}

#[test]
fn path_child_and_parent() {
    let class = SymbolPath::from_name("Class").unwrap();
    let ctor = class.child("$ctor").unwrap();

    assert_eq!(ctor.to_string(), "Class#$ctor");
    assert_eq!(ctor.parent(), Some(class.clone()));
    assert_eq!(class.parent(), None);
    assert_eq!(
        class.child("a#b"),
        Err(CommonError::InvalidSymbolPath("Class#a#b".into()))
    );
}

#[test]
fn url_with_and_without_location() {
    let absolute = SymbolUrl::parse("lyric://bootstrap/prelude#Int").unwrap();
    let relative = SymbolUrl::parse("#Class#$ctor").unwrap();

    assert_eq!(absolute.name(), "Int");
    assert!(!absolute.is_relative());
    assert_eq!(absolute.to_string(), "lyric://bootstrap/prelude#Int");

    assert!(relative.is_relative());
    assert_eq!(relative.path().to_string(), "Class#$ctor");
    assert_eq!(relative.to_string(), "#Class#$ctor");
}

#[test]
fn url_resolve_anchors_relative_only() {
    let main = ModuleLocation::parse("/main").unwrap();
    let other = ModuleLocation::parse("/other").unwrap();
    let relative = SymbolUrl::from_path(SymbolPath::from_name("x").unwrap());
    let anchored = relative.resolve(&main);

    assert_eq!(anchored.to_string(), "/main#x");
    assert_eq!(anchored.resolve(&other), anchored);
}

#[test]
fn url_equality_is_structural() {
    let a = SymbolUrl::parse("/m#A#b").unwrap();
    let b = SymbolUrl::new(
        ModuleLocation::parse("/m").unwrap(),
        SymbolPath::new(["A", "b"]).unwrap(),
    );
    let c = SymbolUrl::parse("/n#A#b").unwrap();

    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn url_rejects_missing_hash() {
    assert_eq!(
        SymbolUrl::parse("/m"),
        Err(CommonError::InvalidSymbolUrl("/m".into()))
    );
}
