//! Symbolizer pass: the skeleton of a module's public surface.
//!
//! Definitions made directly in a namespace become linkage placeholders,
//! namespaces become real namespace symbols and module imports are recorded
//! as API linkage. Nothing is typed and no code is emitted, so the pass needs
//! no prelude.

#[cfg(test)]
mod symbolize_tests;

use std::sync::Arc;

use lyric_assembler::{ModuleCache, ObjectState, ObjectStateOptions, WriterOptions};
use lyric_common::ModuleLocation;
use lyric_object::{AccessType, ImportFlags, LinkageSection, LyricObject};

use crate::archetype::{Archetype, AstClass, NodeId};
use crate::context::{ContextKind, ContextStack, DriverContext};
use crate::declare::{import_module, in_namespace};
use crate::error::{CompilerError, Result};
use crate::scan::{ScanDriver, VisitorContext, scan};
use crate::signature::identifier;

pub struct SymbolizerDriver {
    state: ObjectState,
    contexts: ContextStack,
}

impl SymbolizerDriver {
    pub fn new(location: ModuleLocation, modules: Arc<ModuleCache>) -> Result<Self> {
        let mut state = ObjectState::new(
            location,
            modules,
            ObjectStateOptions {
                touch_unused_imports: true,
                ..ObjectStateOptions::without_prelude()
            },
        );
        state.define_root()?;
        let mut contexts = ContextStack::new();
        contexts.push(DriverContext::Namespace {
            url: state.global_namespace()?.clone(),
            block: state.root_block()?,
        });
        Ok(Self { state, contexts })
    }

    pub fn state(&self) -> &ObjectState {
        &self.state
    }

    pub fn to_object(&self) -> Result<LyricObject> {
        Ok(self.state.to_object_with(WriterOptions {
            root_symbols: false,
            touch_unused_imports: true,
        })?)
    }
}

fn linkage_section(class: AstClass) -> Option<LinkageSection> {
    match class {
        AstClass::Def => Some(LinkageSection::Call),
        AstClass::DefClass => Some(LinkageSection::Class),
        AstClass::DefStruct => Some(LinkageSection::Struct),
        AstClass::DefInstance => Some(LinkageSection::Instance),
        AstClass::DefEnum => Some(LinkageSection::Enum),
        AstClass::DefConcept => Some(LinkageSection::Concept),
        AstClass::DefStatic => Some(LinkageSection::Static),
        _ => None,
    }
}

impl ScanDriver for SymbolizerDriver {
    fn enter(&mut self, archetype: &Archetype, node: NodeId, ctx: &mut VisitorContext) -> Result<()> {
        let class = archetype.class(node)?;
        if ctx.parent().is_none() {
            if class != AstClass::Block {
                return Err(CompilerError::syntax(format!("archetype root must be a Block, found {class}")));
            }
            return Ok(());
        }
        if !in_namespace(archetype, ctx.parent())? {
            ctx.skip_children();
            return Ok(());
        }

        let block = self.contexts.current_block()?;
        match class {
            AstClass::Namespace => {
                let name = identifier(archetype, node)?;
                let url = self.state.declare_namespace(block, name, AccessType::Public)?;
                let block = self.state.namespace_block(&url)?;
                self.contexts.push(DriverContext::Namespace { url, block });
            }
            AstClass::ImportModule => {
                import_module(&mut self.state, archetype, node, ImportFlags::API_LINKAGE)?;
                ctx.skip_children();
            }
            _ => {
                if let Some(section) = linkage_section(class) {
                    let name = identifier(archetype, node)?;
                    self.state.declare_linkage(block, name, section)?;
                }
                ctx.skip_children();
            }
        }
        Ok(())
    }

    fn exit(&mut self, archetype: &Archetype, node: NodeId, ctx: &VisitorContext) -> Result<()> {
        if archetype.class(node)? == AstClass::Namespace && in_namespace(archetype, ctx.parent())? {
            self.contexts.pop(ContextKind::Namespace)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.contexts.pop(ContextKind::Namespace)?;
        if !self.contexts.is_empty() {
            return Err(CompilerError::invariant("unbalanced symbolizer contexts"));
        }
        Ok(())
    }
}

/// Symbolize `archetype` as the module at `location`.
pub fn symbolize(
    archetype: &Archetype,
    location: ModuleLocation,
    modules: Arc<ModuleCache>,
) -> Result<LyricObject> {
    let mut driver = SymbolizerDriver::new(location, modules)?;
    scan(archetype, &mut driver)?;
    driver.to_object()
}
