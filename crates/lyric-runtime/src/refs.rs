//! Instances and strings on the heap.

use std::any::Any;

use indexmap::IndexMap;

use crate::data_cell::{DataCell, DescriptorRef};
use crate::error::{InterpreterError, Result};
use crate::heap::{AbstractRef, Marker};

#[derive(Debug)]
struct Member {
    name: String,
    value: DataCell,
}

/// Instance of a class, struct, singleton instance or enum.
///
/// Fields are keyed by their resolved field descriptor and kept in
/// declaration order, superclass fields first.
#[derive(Debug)]
pub struct InstanceRef {
    class: DescriptorRef,
    class_name: String,
    fields: IndexMap<DescriptorRef, Member>,
}

impl InstanceRef {
    pub fn new(class: DescriptorRef, class_name: impl Into<String>) -> Self {
        Self {
            class,
            class_name: class_name.into(),
            fields: IndexMap::new(),
        }
    }

    /// Declare a field holding `undef` until a constructor stores to it.
    pub fn declare_field(&mut self, key: DescriptorRef, name: impl Into<String>) {
        self.fields.entry(key).or_insert_with(|| Member {
            name: name.into(),
            value: DataCell::Undef,
        });
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

fn render_member(value: &DataCell) -> String {
    match value {
        DataCell::Ref(handle) => handle
            .with(|object| object.type_name().to_owned())
            .unwrap_or_else(|_| "<freed>".to_owned()),
        other => other.to_string(),
    }
}

impl AbstractRef for InstanceRef {
    fn type_name(&self) -> &str {
        &self.class_name
    }

    fn get_field(&self, key: &DescriptorRef) -> Option<DataCell> {
        self.fields.get(key).map(|member| member.value.clone())
    }

    fn set_field(&mut self, key: DescriptorRef, value: DataCell) -> Result<DataCell> {
        match self.fields.get_mut(&key) {
            Some(member) => Ok(std::mem::replace(&mut member.value, value)),
            None => Err(InterpreterError::operand(format!(
                "{} has no field {key}",
                self.class_name
            ))),
        }
    }

    fn equals(&self, other: &dyn AbstractRef) -> bool {
        other
            .as_any()
            .downcast_ref::<InstanceRef>()
            .is_some_and(|other| std::ptr::eq(self, other))
    }

    fn class(&self) -> Option<DescriptorRef> {
        Some(self.class)
    }

    fn set_members_reachable(&self, marker: &mut Marker) {
        for member in self.fields.values() {
            marker.reach(&member.value);
        }
    }

    fn clear_members_reachable(&self, marker: &mut Marker) {
        for member in self.fields.values() {
            marker.reach(&member.value);
        }
    }

    fn release_members(&mut self) -> Vec<DataCell> {
        self.fields
            .values_mut()
            .map(|member| std::mem::take(&mut member.value))
            .collect()
    }

    fn describe(&self) -> String {
        if self.fields.is_empty() {
            return self.class_name.clone();
        }
        let fields: Vec<String> = self
            .fields
            .values()
            .map(|member| format!("{}: {}", member.name, render_member(&member.value)))
            .collect();
        format!("{}{{{}}}", self.class_name, fields.join(", "))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Heap-allocated string, produced by natives that build text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringRef {
    value: String,
}

impl StringRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl AbstractRef for StringRef {
    fn type_name(&self) -> &str {
        "String"
    }

    fn equals(&self, other: &dyn AbstractRef) -> bool {
        other.utf8_value() == Some(self.value.as_str())
    }

    fn utf8_value(&self) -> Option<&str> {
        Some(&self.value)
    }

    fn set_members_reachable(&self, _marker: &mut Marker) {}

    fn clear_members_reachable(&self, _marker: &mut Marker) {}

    fn release_members(&mut self) -> Vec<DataCell> {
        Vec::new()
    }

    fn describe(&self) -> String {
        format!("{:?}", self.value)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
