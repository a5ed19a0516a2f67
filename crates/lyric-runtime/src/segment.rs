//! Loaded objects and the links between them.
//!
//! Every object the interpreter touches becomes a [`Segment`]. The main
//! module is loaded up front; imported modules load the first time a link
//! into them is resolved. Resolved links are cached per segment.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use lyric_common::{ModuleLocation, StringId};
use lyric_object::{
    Address, CallDescriptor, CompositeDescriptor, ExistentialDescriptor, FieldDescriptor,
    INVALID_ADDRESS, LinkageSection, LiteralDescriptor, Loader, LyricObject, ObjectTables,
    ProcLayout, StaticDescriptor, is_near, link_offset,
};

use crate::data_cell::{DataCell, DescriptorRef, SegmentId};
use crate::error::{InterpreterError, Result};
use crate::native::{NativeInterface, NativeTrap, PluginRegistry, SegmentInfo, TrapIndex};

/// Lifecycle of a static: initialized by running its initializer the first
/// time it is loaded.
#[derive(Debug, Clone, Default)]
pub enum StaticSlot {
    #[default]
    Uninitialized,
    Initializing,
    Ready(DataCell),
}

pub struct Segment {
    id: SegmentId,
    location: ModuleLocation,
    object: Arc<LyricObject>,
    links: Vec<Option<DescriptorRef>>,
    statics: Vec<StaticSlot>,
    singletons: HashMap<DescriptorRef, DataCell>,
    procs: HashMap<u32, Rc<ProcLayout>>,
    plugin: Option<Box<dyn NativeInterface>>,
    traps: Option<TrapIndex>,
}

impl Segment {
    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn location(&self) -> &ModuleLocation {
        &self.location
    }

    pub fn object(&self) -> &LyricObject {
        &self.object
    }

    pub fn tables(&self) -> &ObjectTables {
        self.object.tables()
    }

    pub fn string(&self, id: StringId) -> Result<&str> {
        Ok(self.object.string_or_err(id)?)
    }

    pub fn has_plugin(&self) -> bool {
        self.plugin.is_some()
    }

    fn info(&self) -> SegmentInfo<'_> {
        SegmentInfo {
            id: self.id,
            location: &self.location,
        }
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("id", &self.id)
            .field("location", &self.location)
            .field("plugin", &self.plugin.is_some())
            .finish()
    }
}

pub struct SegmentManager {
    loader: Arc<dyn Loader>,
    plugins: PluginRegistry,
    segments: Vec<Segment>,
    by_location: HashMap<ModuleLocation, SegmentId>,
    main: Option<SegmentId>,
    unloaded: bool,
}

impl SegmentManager {
    pub fn new(loader: Arc<dyn Loader>, plugins: PluginRegistry) -> Self {
        Self {
            loader,
            plugins,
            segments: Vec::new(),
            by_location: HashMap::new(),
            main: None,
            unloaded: false,
        }
    }

    /// Load the module execution starts in.
    pub fn load_main(&mut self, location: &ModuleLocation) -> Result<SegmentId> {
        let id = self.load_segment(location)?;
        self.main = Some(id);
        Ok(id)
    }

    pub fn main(&self) -> Option<SegmentId> {
        self.main
    }

    /// Segment for `location`, loading the module and attaching its native
    /// plugin on first use.
    pub fn load_segment(&mut self, location: &ModuleLocation) -> Result<SegmentId> {
        if let Some(&id) = self.by_location.get(location) {
            return Ok(id);
        }
        if self.unloaded {
            return Err(InterpreterError::invariant(format!(
                "cannot load `{location}` after unload"
            )));
        }
        let object = self
            .loader
            .load_module(location)?
            .ok_or_else(|| InterpreterError::ModuleNotFound(location.to_string()))?;

        let id = self.segments.len() as SegmentId;
        let (plugin, traps) = match object.plugin() {
            Some(specifier) => {
                let plugin = self
                    .plugins
                    .load_plugin(location, specifier)?
                    .ok_or_else(|| InterpreterError::PluginNotFound(location.to_string()))?;
                plugin.load(SegmentInfo { id, location })?;
                let traps = TrapIndex::new(plugin.as_ref())?;
                (Some(plugin), Some(traps))
            }
            None => (None, None),
        };

        let tables = object.tables();
        let segment = Segment {
            id,
            location: location.clone(),
            links: vec![None; tables.links.len()],
            statics: vec![StaticSlot::Uninitialized; tables.statics.len()],
            singletons: HashMap::new(),
            procs: HashMap::new(),
            plugin,
            traps,
            object: Arc::new(object),
        };
        self.segments.push(segment);
        self.by_location.insert(location.clone(), id);
        Ok(id)
    }

    pub fn segment(&self, id: SegmentId) -> Result<&Segment> {
        self.segments
            .get(id as usize)
            .ok_or_else(|| InterpreterError::invariant(format!("no segment {id}")))
    }

    fn segment_mut(&mut self, id: SegmentId) -> Result<&mut Segment> {
        self.segments
            .get_mut(id as usize)
            .ok_or_else(|| InterpreterError::invariant(format!("no segment {id}")))
    }

    pub fn find_segment(&self, location: &ModuleLocation) -> Option<SegmentId> {
        self.by_location.get(location).copied()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Resolve an operand address of `segment` into a descriptor of
    /// `section`, following links into other segments.
    pub fn resolve(
        &mut self,
        segment: SegmentId,
        section: LinkageSection,
        address: Address,
    ) -> Result<DescriptorRef> {
        if is_near(address) {
            let index = self
                .segment(segment)?
                .object
                .near_index(section, address)
                .ok_or_else(|| {
                    InterpreterError::invariant(format!(
                        "{} address {address} out of range in segment {segment}",
                        section.name()
                    ))
                })?;
            return Ok(DescriptorRef::new(segment, section, index));
        }
        let resolved = self.resolve_link(segment, address)?;
        if resolved.section != section {
            return Err(InterpreterError::invariant(format!(
                "link {address:#x} resolves to {}, expected {}",
                resolved.section.name(),
                section.name()
            )));
        }
        Ok(resolved)
    }

    /// Resolve a far address through the link table.
    pub fn resolve_link(&mut self, segment: SegmentId, address: Address) -> Result<DescriptorRef> {
        let offset = link_offset(address)
            .ok_or_else(|| InterpreterError::invariant(format!("{address:#x} is not a link")))?
            as usize;
        let source = self.segment(segment)?;
        if let Some(Some(cached)) = source.links.get(offset) {
            return Ok(*cached);
        }

        let link = source
            .object
            .link(address)
            .ok_or_else(|| InterpreterError::invariant(format!("no link {offset}")))?;
        let location = source
            .object
            .import_location(link.import)
            .ok_or_else(|| InterpreterError::invariant(format!("no import {}", link.import)))?
            .resolve(&source.location);
        let path = source.string(link.path)?.to_owned();
        let section = link.section;

        let target = self.load_segment(&location)?;
        let unresolved = || InterpreterError::UnresolvedLink {
            location: location.to_string(),
            path: path.clone(),
        };
        let target_object = &self.segment(target)?.object;
        let symbol = target_object.find_symbol(&path).ok_or_else(unresolved)?;
        let in_range = (symbol.index as usize) < target_object.tables().section_len(section);
        if symbol.section != section || symbol.index == INVALID_ADDRESS || !in_range {
            return Err(unresolved());
        }
        let resolved = DescriptorRef::new(target, section, symbol.index);

        if let Some(slot) = self.segment_mut(segment)?.links.get_mut(offset) {
            *slot = Some(resolved);
        }
        Ok(resolved)
    }

    /// Public symbol named by an absolute `location#path` url.
    pub fn find_descriptor(&mut self, url: &str) -> Result<Option<DescriptorRef>> {
        let Some((location, path)) = url.split_once('#') else {
            return Ok(None);
        };
        let location = ModuleLocation::parse(location)?;
        let segment = self.load_segment(&location)?;
        let symbol = self.segment(segment)?.object.find_symbol(path);
        Ok(symbol
            .filter(|s| s.index != INVALID_ADDRESS)
            .map(|s| DescriptorRef::new(segment, s.section, s.index)))
    }

    pub fn descriptor_path(&self, descriptor: DescriptorRef) -> Result<&str> {
        let segment = self.segment(descriptor.segment)?;
        let id = segment
            .tables()
            .descriptor_path(descriptor.section, descriptor.index)
            .ok_or_else(|| InterpreterError::invariant(format!("no descriptor {descriptor}")))?;
        segment.string(id)
    }

    /// Absolute url `location#path` of a descriptor.
    pub fn url_of(&self, descriptor: DescriptorRef) -> Result<String> {
        let path = self.descriptor_path(descriptor)?;
        let location = self.segment(descriptor.segment)?.location();
        Ok(format!("{location}#{path}"))
    }

    fn entry<'a, T>(
        &'a self,
        descriptor: DescriptorRef,
        table: impl FnOnce(&'a ObjectTables) -> Option<&'a [T]>,
    ) -> Result<&'a T> {
        let tables = self.segment(descriptor.segment)?.tables();
        table(tables)
            .and_then(|entries| entries.get(descriptor.index as usize))
            .ok_or_else(|| InterpreterError::invariant(format!("no descriptor {descriptor}")))
    }

    pub fn call(&self, descriptor: DescriptorRef) -> Result<&CallDescriptor> {
        self.entry(descriptor, |t| Some(t.calls.as_slice()))
    }

    pub fn composite(&self, descriptor: DescriptorRef) -> Result<&CompositeDescriptor> {
        self.entry(descriptor, |t| t.composites(descriptor.section))
    }

    pub fn field(&self, descriptor: DescriptorRef) -> Result<&FieldDescriptor> {
        self.entry(descriptor, |t| Some(t.fields.as_slice()))
    }

    pub fn static_descriptor(&self, descriptor: DescriptorRef) -> Result<&StaticDescriptor> {
        self.entry(descriptor, |t| Some(t.statics.as_slice()))
    }

    pub fn existential(&self, descriptor: DescriptorRef) -> Result<&ExistentialDescriptor> {
        self.entry(descriptor, |t| Some(t.existentials.as_slice()))
    }

    /// Literal `index` of `segment` as a value.
    pub fn literal(&self, segment: SegmentId, index: u32) -> Result<DataCell> {
        let segment = self.segment(segment)?;
        let literal = segment
            .tables()
            .literals
            .get(index as usize)
            .ok_or_else(|| InterpreterError::invariant(format!("no literal {index}")))?;
        Ok(match literal {
            LiteralDescriptor::Nil => DataCell::Nil,
            LiteralDescriptor::Undef => DataCell::Undef,
            LiteralDescriptor::Bool(b) => DataCell::Bool(*b),
            LiteralDescriptor::I64(i) => DataCell::I64(*i),
            LiteralDescriptor::Dbl(d) => DataCell::Dbl(*d),
            LiteralDescriptor::Chr(c) => DataCell::Chr(*c),
            LiteralDescriptor::Utf8(id) => DataCell::utf8(segment.string(*id)?),
        })
    }

    /// Parsed layout of the proc behind a call, cached per segment.
    pub fn proc(&mut self, call: DescriptorRef) -> Result<Rc<ProcLayout>> {
        let offset = self.call(call)?.proc_offset;
        let segment = self.segment_mut(call.segment)?;
        if let Some(layout) = segment.procs.get(&offset) {
            return Ok(layout.clone());
        }
        let layout = Rc::new(segment.object.proc(offset)?);
        segment.procs.insert(offset, layout.clone());
        Ok(layout)
    }

    pub fn static_slot(&self, descriptor: DescriptorRef) -> Result<&StaticSlot> {
        self.segment(descriptor.segment)?
            .statics
            .get(descriptor.index as usize)
            .ok_or_else(|| InterpreterError::invariant(format!("no static {descriptor}")))
    }

    /// Replace a static's slot, returning the previous one.
    pub fn set_static(&mut self, descriptor: DescriptorRef, slot: StaticSlot) -> Result<StaticSlot> {
        let current = self
            .segment_mut(descriptor.segment)?
            .statics
            .get_mut(descriptor.index as usize)
            .ok_or_else(|| InterpreterError::invariant(format!("no static {descriptor}")))?;
        Ok(std::mem::replace(current, slot))
    }

    pub fn singleton(&self, descriptor: DescriptorRef) -> Option<&DataCell> {
        self.segment(descriptor.segment)
            .ok()?
            .singletons
            .get(&descriptor)
    }

    pub fn set_singleton(&mut self, descriptor: DescriptorRef, value: DataCell) -> Result<()> {
        self.segment_mut(descriptor.segment)?
            .singletons
            .insert(descriptor, value);
        Ok(())
    }

    pub fn trap(&self, segment: SegmentId, index: u32) -> Result<NativeTrap> {
        self.segment(segment)?
            .traps
            .as_ref()
            .and_then(|traps| traps.get(index))
            .ok_or(InterpreterError::MissingTrap(index))
    }

    /// Values held by statics and singletons.
    pub fn roots(&self) -> impl Iterator<Item = &DataCell> {
        self.segments.iter().flat_map(|segment| {
            let statics = segment.statics.iter().filter_map(|slot| match slot {
                StaticSlot::Ready(value) => Some(value),
                _ => None,
            });
            statics.chain(segment.singletons.values())
        })
    }

    pub fn is_unloaded(&self) -> bool {
        self.unloaded
    }

    /// Detach every native plugin. Must be called exactly once.
    pub fn unload(&mut self) -> Result<()> {
        if self.unloaded {
            return Err(InterpreterError::invariant("segments were already unloaded"));
        }
        self.unloaded = true;
        let mut first_error = None;
        for segment in &self.segments {
            if let Some(plugin) = &segment.plugin
                && let Err(e) = plugin.unload(segment.info())
            {
                first_error.get_or_insert(e);
            }
        }
        for segment in &mut self.segments {
            segment.statics.fill(StaticSlot::Uninitialized);
            segment.singletons.clear();
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for SegmentManager {
    fn drop(&mut self) {
        if !self.unloaded {
            let _ = self.unload();
        }
    }
}

impl std::fmt::Debug for SegmentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentManager")
            .field("segments", &self.segments)
            .field("unloaded", &self.unloaded)
            .finish()
    }
}
