//! Analyzer pass: typed declarations without code.
//!
//! Produces an interface object: every function, composite, concept,
//! namespace and static a module defines at namespace level, with signatures. Undeclared result
//! types are `Any`. Bodies are not visited.

#[cfg(test)]
mod analyze_tests;

use std::sync::Arc;

use lyric_assembler::{ModuleCache, ObjectState, ObjectStateOptions, WriterOptions};
use lyric_common::{ModuleLocation, SymbolUrl};
use lyric_object::{AccessType, ImportFlags, LyricObject};

use crate::archetype::{Archetype, AstClass, NodeId};
use crate::context::{ContextKind, ContextStack, DriverContext};
use crate::declare::{
    ResultPolicy, declare_composite, declare_concept, declare_function, declare_static,
    import_module, in_namespace, using,
};
use crate::error::{CompilerError, Result};
use crate::scan::{ScanDriver, VisitorContext, scan};
use crate::signature::identifier;

pub struct AnalyzerDriver {
    state: ObjectState,
    contexts: ContextStack,
    declared: Vec<SymbolUrl>,
}

impl AnalyzerDriver {
    pub fn new(
        location: ModuleLocation,
        modules: Arc<ModuleCache>,
        options: ObjectStateOptions,
    ) -> Result<Self> {
        let mut state = ObjectState::new(location, modules, options);
        state.define_root()?;
        let mut contexts = ContextStack::new();
        contexts.push(DriverContext::Namespace {
            url: state.global_namespace()?.clone(),
            block: state.root_block()?,
        });
        Ok(Self {
            state,
            contexts,
            declared: Vec::new(),
        })
    }

    pub fn state(&self) -> &ObjectState {
        &self.state
    }

    pub fn to_object(&self) -> Result<LyricObject> {
        Ok(self.state.to_object_with(WriterOptions {
            root_symbols: false,
            touch_unused_imports: self.state.options().touch_unused_imports,
        })?)
    }

    fn declare(&mut self, archetype: &Archetype, node: NodeId, class: AstClass) -> Result<()> {
        let block = self.contexts.current_block()?;
        match class {
            AstClass::Def => {
                let call = declare_function(&mut self.state, block, archetype, node, ResultPolicy::Any)?;
                self.state.finalize_call(&call)?;
                self.declared.push(call);
            }
            class if class.is_composite() => {
                let class =
                    declare_composite(&mut self.state, block, archetype, node, ResultPolicy::Any)?;
                for (_, method) in &class.methods {
                    self.state.finalize_call(method)?;
                }
                self.state.finalize_call(&class.ctor)?;
                self.declared.push(class.url);
            }
            AstClass::DefStatic => {
                let url = declare_static(&mut self.state, block, archetype, node)?;
                self.state.finalize_initializer(&url)?;
                self.declared.push(url);
            }
            AstClass::ImportModule => {
                import_module(&mut self.state, archetype, node, ImportFlags::NONE)?;
            }
            AstClass::Using => {
                using(&mut self.state, block, archetype, node)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Concepts of `scope` are declared up front so composites may implement
    /// them regardless of source order.
    fn declare_concepts(&mut self, archetype: &Archetype, scope: NodeId) -> Result<()> {
        let block = self.contexts.current_block()?;
        let concepts: Vec<NodeId> = archetype
            .children_of_class(scope, AstClass::DefConcept)?
            .collect();
        for node in concepts {
            let url = declare_concept(&mut self.state, block, archetype, node)?;
            self.declared.push(url);
        }
        Ok(())
    }
}

impl ScanDriver for AnalyzerDriver {
    fn enter(&mut self, archetype: &Archetype, node: NodeId, ctx: &mut VisitorContext) -> Result<()> {
        let class = archetype.class(node)?;
        if ctx.parent().is_none() {
            if class != AstClass::Block {
                return Err(CompilerError::syntax(format!("archetype root must be a Block, found {class}")));
            }
            return self.declare_concepts(archetype, node);
        }
        if !in_namespace(archetype, ctx.parent())? {
            ctx.skip_children();
            return Ok(());
        }

        if class == AstClass::Namespace {
            let block = self.contexts.current_block()?;
            let name = identifier(archetype, node)?;
            let url = self
                .state
                .declare_namespace(block, name, AccessType::Public)?;
            let block = self.state.namespace_block(&url)?;
            self.declared.push(url.clone());
            self.contexts.push(DriverContext::Namespace { url, block });
            return self.declare_concepts(archetype, node);
        }

        self.declare(archetype, node, class)?;
        ctx.skip_children();
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
        for url in std::mem::take(&mut self.declared) {
            self.state.touch(&url)?;
        }
        Ok(())
    }
}

/// Analyze `archetype` as the module at `location`.
pub fn analyze(
    archetype: &Archetype,
    location: ModuleLocation,
    modules: Arc<ModuleCache>,
    options: ObjectStateOptions,
) -> Result<LyricObject> {
    let mut driver = AnalyzerDriver::new(location, modules, options)?;
    scan(archetype, &mut driver)?;
    driver.to_object()
}
