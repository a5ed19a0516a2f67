use crate::{CommonError, ModuleLocation};

#[test]
fn parse_relative() {
    let loc = ModuleLocation::parse("/app/main").unwrap();

    assert!(loc.is_relative());
    assert_eq!(loc.path(), "/app/main");
    assert_eq!(loc.module_name(), "main");
    assert_eq!(loc.to_string(), "/app/main");
}

#[test]
fn parse_absolute() {
    let loc = ModuleLocation::parse("lyric://bootstrap/prelude").unwrap();

    assert_eq!(
        loc,
        ModuleLocation::Absolute {
            scheme: "lyric".into(),
            origin: "bootstrap".into(),
            path: "/prelude".into(),
        }
    );
    assert_eq!(loc.to_string(), "lyric://bootstrap/prelude");
}

#[test]
fn absolute_without_path_gets_root() {
    let loc = ModuleLocation::parse("dev.zuri://std").unwrap();

    assert_eq!(loc.path(), "/");
    assert_eq!(loc.module_name(), "std");
}

#[test]
fn rejects_malformed_locations() {
    for text in ["", "app/main", "://x/y", "lyric:///p", "/a//b", "/a#b", "/a/"] {
        assert_eq!(
            ModuleLocation::parse(text),
            Err(CommonError::InvalidLocation(text.to_owned())),
            "{text}"
        );
    }
}

#[test]
fn resolve_relative_against_absolute() {
    let base = ModuleLocation::parse("lyric://pkg.example/main").unwrap();
    let rel = ModuleLocation::parse("/util").unwrap();

    assert_eq!(rel.resolve(&base).to_string(), "lyric://pkg.example/util");
    assert_eq!(base.resolve(&rel), base);
}

#[test]
fn relative_constructor_rejects_absolute() {
    assert!(ModuleLocation::relative("/ok").is_ok());
    assert!(ModuleLocation::relative("lyric://x/y").is_err());
}

#[test]
fn serde_uses_text_form() {
    let loc = ModuleLocation::parse("/app/main").unwrap();
    let json = serde_json::to_string(&loc).unwrap();

    assert_eq!(json, "\"/app/main\"");
    assert_eq!(serde_json::from_str::<ModuleLocation>(&json).unwrap(), loc);
}
