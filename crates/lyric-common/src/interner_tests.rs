use crate::{Interner, StringId};

#[test]
fn intern_deduplicates() {
    let mut interner = Interner::new();

    let a = interner.intern("$global");
    let b = interner.intern("$global");
    let c = interner.intern("$entry");

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(interner.len(), 2);
}

#[test]
fn get_does_not_insert() {
    let mut interner = Interner::new();
    interner.intern("Int");

    assert_eq!(interner.get("Int"), Some(StringId::from_raw(0)));
    assert_eq!(interner.get("Float"), None);
    assert_eq!(interner.len(), 1);
}

#[test]
fn try_resolve_out_of_range() {
    let interner = Interner::new();
    assert_eq!(interner.try_resolve(StringId::from_raw(3)), None);
}

#[test]
fn blob_offsets_end_with_sentinel() {
    let mut interner = Interner::new();
    interner.intern("ab");
    interner.intern("cde");
    interner.intern("ab");

    let (blob, offsets) = interner.to_blob();

    assert_eq!(blob, b"abcde");
    assert_eq!(offsets, vec![0, 2, 5]);
}

#[test]
fn iter_follows_insertion_order() {
    let mut interner = Interner::new();
    interner.intern("z");
    interner.intern("a");

    let collected: Vec<_> = interner.iter().map(|(_, s)| s).collect();
    assert_eq!(collected, vec!["z", "a"]);
}
