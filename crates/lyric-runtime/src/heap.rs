//! Reference-counted heap with a cycle-collecting mark-sweep pass.
//!
//! Heap objects are only reachable through [`RefHandle`]s. Cloning a handle
//! retains its object, dropping one releases it, and the object is freed as
//! soon as the count reaches zero. Counts alone never free a cycle, so
//! [`Heap::collect`] marks everything reachable from a root set, frees the
//! rest and clears the marks again.
//!
//! Each interpreter owns one heap; handles are `!Send` and counts are plain
//! cells.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::data_cell::{DataCell, DescriptorRef};
use crate::error::{InterpreterError, Result};
use crate::status::StatusCode;

/// Behavior shared by every heap object.
pub trait AbstractRef: fmt::Debug + Any {
    fn type_name(&self) -> &str;

    fn get_field(&self, _key: &DescriptorRef) -> Option<DataCell> {
        None
    }

    /// Replace a field, returning the previous value.
    fn set_field(&mut self, key: DescriptorRef, _value: DataCell) -> Result<DataCell> {
        Err(InterpreterError::operand(format!(
            "{} has no field {key}",
            self.type_name()
        )))
    }

    fn equals(&self, other: &dyn AbstractRef) -> bool;

    fn utf8_value(&self) -> Option<&str> {
        None
    }

    fn status(&self) -> Option<StatusCode> {
        None
    }

    /// Class of an instance.
    fn class(&self) -> Option<DescriptorRef> {
        None
    }

    /// Report every handle this object holds to `marker`.
    fn set_members_reachable(&self, marker: &mut Marker);

    /// Report every handle whose mark should be cleared after a collection.
    fn clear_members_reachable(&self, marker: &mut Marker);

    /// Move out every held value so a dead object releases its references.
    fn release_members(&mut self) -> Vec<DataCell>;

    fn describe(&self) -> String;

    fn as_any(&self) -> &dyn Any;
}

/// Slot index plus generation, so a freed slot is never confused with its
/// next occupant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HeapId {
    index: u32,
    generation: u32,
}

impl HeapId {
    pub fn index(self) -> u32 {
        self.index
    }
}

/// Worklist of handles discovered while tracing.
#[derive(Debug, Default)]
pub struct Marker {
    pending: Vec<HeapId>,
}

impl Marker {
    pub fn reach(&mut self, cell: &DataCell) {
        if let DataCell::Ref(handle) = cell {
            self.pending.push(handle.id);
        }
    }
}

struct Entry {
    object: Box<dyn AbstractRef>,
    refcount: Cell<usize>,
    marked: bool,
}

#[derive(Default)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

#[derive(Default)]
struct HeapInner {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl HeapInner {
    fn entry(&self, id: HeapId) -> Option<&Entry> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn entry_mut(&mut self, id: HeapId) -> Option<&mut Entry> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    fn insert(&mut self, object: Box<dyn AbstractRef>) -> HeapId {
        let entry = Entry {
            object,
            refcount: Cell::new(1),
            marked: false,
        };
        self.live += 1;
        if let Some(index) = self.free.pop()
            && let Some(slot) = self.slots.get_mut(index as usize)
        {
            slot.entry = Some(entry);
            return HeapId {
                index,
                generation: slot.generation,
            };
        }
        self.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        HeapId {
            index: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }

    fn remove(&mut self, id: HeapId) -> Option<Box<dyn AbstractRef>> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(entry.object)
    }

    fn remove_if_unreferenced(&mut self, id: HeapId) -> Option<Box<dyn AbstractRef>> {
        if self.entry(id)?.refcount.get() != 0 {
            return None;
        }
        self.remove(id)
    }

    fn mark(&mut self, marker: &mut Marker) {
        while let Some(id) = marker.pending.pop() {
            let Some(entry) = self.entry_mut(id) else {
                continue;
            };
            if entry.marked {
                continue;
            }
            entry.marked = true;
            entry.object.set_members_reachable(marker);
        }
    }

    fn clear(&mut self, marker: &mut Marker) {
        while let Some(id) = marker.pending.pop() {
            let Some(entry) = self.entry_mut(id) else {
                continue;
            };
            if !entry.marked {
                continue;
            }
            entry.marked = false;
            entry.object.clear_members_reachable(marker);
        }
    }

    fn sweep(&mut self) -> Vec<(Box<dyn AbstractRef>, Vec<DataCell>)> {
        let dead: Vec<HeapId> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match &slot.entry {
                Some(entry) if !entry.marked => Some(HeapId {
                    index: index as u32,
                    generation: slot.generation,
                }),
                _ => None,
            })
            .collect();

        let mut garbage = Vec::with_capacity(dead.len());
        for id in dead {
            if let Some(mut object) = self.remove(id) {
                let members = object.release_members();
                garbage.push((object, members));
            }
        }
        garbage
    }
}

#[derive(Clone, Copy, Debug)]
enum Pending {
    Retain(HeapId),
    Release(HeapId),
    Reclaim(HeapId),
}

/// Count updates that arrive while the heap is borrowed are queued and
/// applied by the next operation that can borrow it.
#[derive(Default)]
struct Shared {
    inner: RefCell<HeapInner>,
    deferred: RefCell<VecDeque<Pending>>,
}

impl Shared {
    fn defer(&self, pending: Pending) {
        if let Ok(mut deferred) = self.deferred.try_borrow_mut() {
            deferred.push_back(pending);
        }
    }

    fn allocate(self: &Rc<Self>, object: Box<dyn AbstractRef>) -> Result<RefHandle> {
        self.settle();
        let id = self
            .inner
            .try_borrow_mut()
            .map_err(|_| InterpreterError::invariant("heap is borrowed during allocation"))?
            .insert(object);
        Ok(RefHandle {
            shared: Rc::downgrade(self),
            id,
        })
    }

    fn retain(&self, id: HeapId) {
        match self.inner.try_borrow() {
            Ok(inner) => {
                if let Some(entry) = inner.entry(id) {
                    entry.refcount.set(entry.refcount.get() + 1);
                }
            }
            Err(_) => self.defer(Pending::Retain(id)),
        }
    }

    fn release(&self, id: HeapId) {
        let unreferenced = match self.inner.try_borrow() {
            Ok(inner) => match inner.entry(id) {
                Some(entry) => {
                    let count = entry.refcount.get().saturating_sub(1);
                    entry.refcount.set(count);
                    count == 0
                }
                None => false,
            },
            Err(_) => {
                self.defer(Pending::Release(id));
                false
            }
        };
        if unreferenced {
            self.reclaim(id);
        }
    }

    fn reclaim(&self, id: HeapId) {
        let freed = match self.inner.try_borrow_mut() {
            Ok(mut inner) => inner.remove_if_unreferenced(id),
            Err(_) => {
                self.defer(Pending::Reclaim(id));
                None
            }
        };
        // the object's members release their own targets here, outside the borrow
        drop(freed);
        self.settle();
    }

    fn settle(&self) {
        loop {
            if self.inner.try_borrow_mut().is_err() {
                return;
            }
            let next = match self.deferred.try_borrow_mut() {
                Ok(mut deferred) => deferred.pop_front(),
                Err(_) => return,
            };
            match next {
                Some(Pending::Retain(id)) => self.retain(id),
                Some(Pending::Release(id)) => self.release(id),
                Some(Pending::Reclaim(id)) => self.reclaim(id),
                None => return,
            }
        }
    }
}

/// Counted reference to a heap object.
pub struct RefHandle {
    shared: Weak<Shared>,
    id: HeapId,
}

impl RefHandle {
    pub fn id(&self) -> HeapId {
        self.id
    }

    fn shared(&self) -> Result<Rc<Shared>> {
        self.shared
            .upgrade()
            .ok_or_else(|| InterpreterError::invariant("reference outlived its heap"))
    }

    /// Borrow the referenced object.
    pub fn with<R>(&self, f: impl FnOnce(&dyn AbstractRef) -> R) -> Result<R> {
        let shared = self.shared()?;
        let inner = shared
            .inner
            .try_borrow()
            .map_err(|_| InterpreterError::invariant("heap is mutably borrowed"))?;
        let entry = inner.entry(self.id).ok_or_else(|| {
            InterpreterError::invariant(format!("dangling reference to slot {}", self.id.index))
        })?;
        Ok(f(entry.object.as_ref()))
    }

    /// Mutably borrow the referenced object. Values replaced inside `f`
    /// should be returned out of it rather than dropped in place.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut dyn AbstractRef) -> R) -> Result<R> {
        let shared = self.shared()?;
        let mut inner = shared
            .inner
            .try_borrow_mut()
            .map_err(|_| InterpreterError::invariant("heap is already borrowed"))?;
        let entry = inner.entry_mut(self.id).ok_or_else(|| {
            InterpreterError::invariant(format!("dangling reference to slot {}", self.id.index))
        })?;
        Ok(f(entry.object.as_mut()))
    }

    pub fn get_field(&self, key: &DescriptorRef) -> Result<Option<DataCell>> {
        self.with(|object| object.get_field(key))
    }

    pub fn set_field(&self, key: DescriptorRef, value: DataCell) -> Result<()> {
        let previous = self.with_mut(|object| object.set_field(key, value))??;
        drop(previous);
        Ok(())
    }

    pub fn equals(&self, other: &RefHandle) -> bool {
        if self == other {
            return true;
        }
        self.with(|a| other.with(|b| a.equals(b)).unwrap_or(false))
            .unwrap_or(false)
    }
}

impl Clone for RefHandle {
    fn clone(&self) -> Self {
        if let Some(shared) = self.shared.upgrade() {
            shared.retain(self.id);
        }
        Self {
            shared: self.shared.clone(),
            id: self.id,
        }
    }
}

impl Drop for RefHandle {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.release(self.id);
        }
    }
}

impl PartialEq for RefHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Weak::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for RefHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RefHandle(#{})", self.id.index)
    }
}

/// Allocation entry point that does not keep the heap alive.
#[derive(Clone)]
pub struct HeapHandle {
    shared: Weak<Shared>,
}

impl HeapHandle {
    pub fn allocate(&self, object: impl AbstractRef) -> Result<RefHandle> {
        let shared = self
            .shared
            .upgrade()
            .ok_or_else(|| InterpreterError::invariant("heap was dropped"))?;
        shared.allocate(Box::new(object))
    }
}

impl fmt::Debug for HeapHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HeapHandle")
    }
}

#[derive(Default)]
pub struct Heap {
    shared: Rc<Shared>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> HeapHandle {
        HeapHandle {
            shared: Rc::downgrade(&self.shared),
        }
    }

    pub fn allocate(&self, object: impl AbstractRef) -> Result<RefHandle> {
        self.shared.allocate(Box::new(object))
    }

    /// Number of objects currently allocated.
    pub fn live_count(&self) -> usize {
        self.shared.settle();
        self.shared.inner.try_borrow().map_or(0, |inner| inner.live)
    }

    pub fn refcount(&self, handle: &RefHandle) -> Option<usize> {
        self.shared.settle();
        let inner = self.shared.inner.try_borrow().ok()?;
        inner.entry(handle.id).map(|entry| entry.refcount.get())
    }

    /// Free every object not reachable from `roots`, returning how many
    /// were freed.
    pub fn collect<'a>(&self, roots: impl IntoIterator<Item = &'a DataCell>) -> Result<usize> {
        self.shared.settle();
        let mut marker = Marker::default();
        for root in roots {
            marker.reach(root);
        }
        let root_ids = marker.pending.clone();

        let garbage = {
            let mut inner = self
                .shared
                .inner
                .try_borrow_mut()
                .map_err(|_| InterpreterError::invariant("heap is borrowed during collection"))?;
            inner.mark(&mut marker);
            let garbage = inner.sweep();
            marker.pending = root_ids;
            inner.clear(&mut marker);
            garbage
        };
        let freed = garbage.len();
        drop(garbage);
        self.shared.settle();
        Ok(freed)
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("live", &self.live_count())
            .finish()
    }
}
