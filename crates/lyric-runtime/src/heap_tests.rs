use lyric_object::LinkageSection;

use crate::data_cell::{DataCell, DescriptorRef};
use crate::heap::Heap;
use crate::refs::{InstanceRef, StringRef};
use crate::status::{StatusCode, StatusRef};

fn class() -> DescriptorRef {
    DescriptorRef::new(0, LinkageSection::Class, 0)
}

fn field(index: u32) -> DescriptorRef {
    DescriptorRef::new(0, LinkageSection::Field, index)
}

fn node() -> InstanceRef {
    let mut instance = InstanceRef::new(class(), "Node");
    instance.declare_field(field(0), "next");
    instance
}

#[test]
fn clone_and_drop_balance_the_count() {
    let heap = Heap::new();
    let handle = heap.allocate(StringRef::new("hello")).unwrap();

    assert_eq!(heap.refcount(&handle), Some(1));
    let copy = handle.clone();
    assert_eq!(heap.refcount(&handle), Some(2));
    drop(copy);
    assert_eq!(heap.refcount(&handle), Some(1));
    assert_eq!(heap.live_count(), 1);

    drop(handle);
    assert_eq!(heap.live_count(), 0);
}

#[test]
fn freeing_an_object_releases_its_fields() {
    let heap = Heap::new();
    let outer = heap.allocate(node()).unwrap();
    let inner = heap.allocate(StringRef::new("inner")).unwrap();
    outer
        .set_field(field(0), DataCell::Ref(inner.clone()))
        .unwrap();
    drop(inner);
    assert_eq!(heap.live_count(), 2);

    drop(outer);
    assert_eq!(heap.live_count(), 0);
}

#[test]
fn cycles_survive_counting_but_not_collection() {
    let heap = Heap::new();
    let a = heap.allocate(node()).unwrap();
    let b = heap.allocate(node()).unwrap();
    a.set_field(field(0), DataCell::Ref(b.clone())).unwrap();
    b.set_field(field(0), DataCell::Ref(a.clone())).unwrap();
    drop(a);
    drop(b);
    assert_eq!(heap.live_count(), 2);

    let freed = heap.collect(std::iter::empty()).unwrap();

    assert_eq!(freed, 2);
    assert_eq!(heap.live_count(), 0);
}

#[test]
fn collection_keeps_everything_reachable_from_roots() {
    let heap = Heap::new();
    let root = heap.allocate(node()).unwrap();
    let child = heap.allocate(node()).unwrap();
    root.set_field(field(0), DataCell::Ref(child.clone()))
        .unwrap();
    child
        .set_field(field(0), DataCell::Ref(root.clone()))
        .unwrap();
    drop(child);
    let orphan = heap.allocate(node()).unwrap();
    orphan
        .set_field(field(0), DataCell::Ref(orphan.clone()))
        .unwrap();
    drop(orphan);

    let roots = [DataCell::Ref(root.clone())];
    let freed = heap.collect(roots.iter()).unwrap();

    assert_eq!(freed, 1);
    assert_eq!(heap.live_count(), 2);
    // marks are cleared, so a second pass frees nothing more
    assert_eq!(heap.collect(roots.iter()).unwrap(), 0);
}

#[test]
fn replacing_a_field_releases_the_old_value() {
    let heap = Heap::new();
    let holder = heap.allocate(node()).unwrap();
    let first = heap.allocate(StringRef::new("first")).unwrap();
    holder
        .set_field(field(0), DataCell::Ref(first))
        .unwrap();
    assert_eq!(heap.live_count(), 2);

    holder.set_field(field(0), DataCell::I64(1)).unwrap();

    assert_eq!(heap.live_count(), 1);
    assert_eq!(holder.get_field(&field(0)).unwrap(), Some(DataCell::I64(1)));
}

#[test]
fn unknown_fields_are_rejected() {
    let heap = Heap::new();
    let holder = heap.allocate(node()).unwrap();

    assert!(holder.set_field(field(7), DataCell::Nil).is_err());
    assert_eq!(holder.get_field(&field(7)).unwrap(), None);
}

#[test]
fn freed_slots_are_not_confused_with_new_objects() {
    let heap = Heap::new();
    let first = heap.allocate(StringRef::new("a")).unwrap();
    let id = first.id();
    drop(first);
    let second = heap.allocate(StringRef::new("b")).unwrap();

    assert_eq!(second.id().index(), id.index());
    assert_ne!(second.id(), id);
}

#[test]
fn describe_renders_instances_and_statuses() {
    let heap = Heap::new();
    let point = heap.allocate(node()).unwrap();
    point.set_field(field(0), DataCell::I64(3)).unwrap();
    let status = heap
        .allocate(StatusRef::new(StatusCode::NotFound, "missing"))
        .unwrap();

    insta::assert_snapshot!(DataCell::Ref(point).to_string(), @"Node{next: 3}");
    insta::assert_snapshot!(DataCell::Ref(status).to_string(), @"Status(NotFound: missing)");
}

#[test]
fn strings_compare_by_content() {
    let heap = Heap::new();
    let a = heap.allocate(StringRef::new("same")).unwrap();
    let b = heap.allocate(StringRef::new("same")).unwrap();

    assert!(a.equals(&b));
    assert_ne!(a, b);
    assert_eq!(DataCell::Ref(a).utf8_value().as_deref(), Some("same"));
}
