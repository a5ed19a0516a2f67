//! Declarations shared by the analyzer and the code generator.
//!
//! Both passes declare functions, composites, concepts and statics the same
//! way; they differ only in whether undeclared result types default to `Any`
//! or are inferred from the emitted code.

use lyric_assembler::{
    AssemblerError, BlockAddress, CompositeSpec, Fundamental, ObjectState, SymbolKind,
};
use lyric_common::{ModuleLocation, SymbolUrl};
use lyric_object::{AccessType, ImportFlags};

use crate::archetype::{Archetype, AstClass, NodeId};
use crate::error::{CompilerError, Result};
use crate::signature::{
    binding_type, concepts, declared_type, declared_type_or_any, identifier, parameters,
    superclass,
};

/// How a call without `:type` gets its result type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultPolicy {
    /// Declare `Any`.
    Any,
    /// Leave it open; the result is unified from the call's exits.
    Infer,
}

/// A declared class, struct, instance or enum and the calls its body will
/// fill in.
#[derive(Clone, Debug)]
pub struct DeclaredClass {
    pub url: SymbolUrl,
    pub ctor: SymbolUrl,
    /// Method urls keyed by their `Def` node.
    pub methods: Vec<(NodeId, SymbolUrl)>,
    pub init: Option<NodeId>,
}

impl DeclaredClass {
    pub fn method(&self, node: NodeId) -> Option<&SymbolUrl> {
        self.methods.iter().find(|(n, _)| *n == node).map(|(_, url)| url)
    }
}

/// Whether children of `parent` are namespace members: the root block's
/// children and a namespace's children.
pub fn in_namespace(archetype: &Archetype, parent: Option<NodeId>) -> Result<bool> {
    let Some(parent) = parent else {
        return Ok(false);
    };
    Ok(match archetype.class(parent)? {
        AstClass::Namespace => true,
        AstClass::Block => Some(parent) == archetype.root().ok(),
        _ => false,
    })
}

/// Declare and define the function at a `Def` node.
pub fn declare_function(
    state: &mut ObjectState,
    block: BlockAddress,
    archetype: &Archetype,
    node: NodeId,
    policy: ResultPolicy,
) -> Result<SymbolUrl> {
    let name = identifier(archetype, node)?;
    let url = state.declare_function(block, name, AccessType::Public)?;
    define_signature(state, block, archetype, node, &url, policy)?;
    Ok(url)
}

fn define_signature(
    state: &mut ObjectState,
    block: BlockAddress,
    archetype: &Archetype,
    node: NodeId,
    call: &SymbolUrl,
    policy: ResultPolicy,
) -> Result<()> {
    let params = parameters(state, block, archetype, node)?;
    let result = match policy {
        ResultPolicy::Any => Some(declared_type_or_any(state, block, archetype, node)?),
        ResultPolicy::Infer => declared_type(state, block, archetype, node)?,
    };
    state.define_call(call, params, None, result)?;
    Ok(())
}

/// Declare the composite at a `DefClass`, `DefStruct`, `DefInstance` or
/// `DefEnum` node with its fields, methods and constructor signature. Method
/// bodies are left to the caller.
pub fn declare_composite(
    state: &mut ObjectState,
    block: BlockAddress,
    archetype: &Archetype,
    node: NodeId,
    policy: ResultPolicy,
) -> Result<DeclaredClass> {
    let class = archetype.class(node)?;
    let name = identifier(archetype, node)?;
    let spec = CompositeSpec {
        superclass: superclass(state, block, archetype, node)?,
        concepts: concepts(state, block, archetype, node)?,
        ..CompositeSpec::default()
    };
    let implements = spec.concepts.clone();
    let url = match class {
        AstClass::DefClass => state.declare_class(block, name, spec)?,
        AstClass::DefStruct => state.declare_struct(block, name, spec)?,
        AstClass::DefInstance => state.declare_instance(block, name, spec)?,
        AstClass::DefEnum => state.declare_enum(block, name, spec)?,
        other => return Err(CompilerError::invariant(format!("{other} is not a composite"))),
    };
    let singleton = matches!(class, AstClass::DefInstance | AstClass::DefEnum);
    let class_block = state.composite_block(&url)?;
    let ctor = state
        .get_or_import_symbol(&url)?
        .as_composite()
        .and_then(|c| c.ctor.clone())
        .ok_or_else(|| CompilerError::invariant(format!("`{url}` has no constructor")))?;

    let mut methods = Vec::new();
    let mut init = None;
    for &member in archetype.children(node)? {
        match archetype.class(member)? {
            AstClass::Val | AstClass::Var => {
                if !archetype.children(member)?.is_empty() {
                    return Err(CompilerError::syntax(
                        "field initializers belong in the class `Init`",
                    ));
                }
                let field = identifier(archetype, member)?;
                let type_def = declared_type_or_any(state, class_block, archetype, member)?;
                let binding = binding_type(archetype, member)?;
                state.declare_field(&url, field, AccessType::Public, binding, type_def)?;
            }
            AstClass::Def => {
                let method = identifier(archetype, member)?;
                let call = state.declare_method(&url, method, AccessType::Public)?;
                define_signature(state, class_block, archetype, member, &call, policy)?;
                methods.push((member, call));
            }
            AstClass::Init => {
                if init.is_some() {
                    return Err(CompilerError::syntax(format!("a {class} has at most one `Init`")));
                }
                let params = parameters(state, class_block, archetype, member)?;
                if singleton && !params.is_empty() {
                    return Err(CompilerError::syntax(format!(
                        "`Init` of {class} `{name}` takes no parameters"
                    )));
                }
                let nil = state.fundamental_type(Fundamental::Nil);
                state.define_call(&ctor, params, None, Some(nil))?;
                init = Some(member);
            }
            other => {
                return Err(CompilerError::syntax(format!(
                    "{other} is not allowed in a {class} body"
                )));
            }
        }
    }
    if init.is_none() {
        let nil = state.fundamental_type(Fundamental::Nil);
        state.define_call(&ctor, Vec::new(), None, Some(nil))?;
    }
    for concept in &implements {
        check_conformance(state, &url, concept)?;
    }

    Ok(DeclaredClass {
        url,
        ctor,
        methods,
        init,
    })
}

/// Every action of `concept` needs a method of the same name and arity.
fn check_conformance(state: &mut ObjectState, composite: &SymbolUrl, concept: &SymbolUrl) -> Result<()> {
    let actions: Vec<SymbolUrl> = match &state.get_or_import_symbol(concept)?.kind {
        SymbolKind::Concept(c) => c.actions.values().cloned().collect(),
        _ => return Err(AssemblerError::NotAConcept(concept.clone()).into()),
    };
    for action in actions {
        let arity = match &state.get_or_import_symbol(&action)?.kind {
            SymbolKind::Action(a) => a.parameters.len(),
            _ => return Err(CompilerError::invariant(format!("`{action}` is not an action"))),
        };
        let method = state.find_method(composite, action.name())?;
        let implemented = match method {
            Some(method) => state
                .get_or_import_symbol(&method)?
                .as_call()
                .is_some_and(|c| c.parameters.len() == arity),
            None => false,
        };
        if !implemented {
            return Err(CompilerError::syntax(format!(
                "`{}` does not implement `{}` of `{}` with {arity} parameter(s)",
                composite.name(),
                action.name(),
                concept.name()
            )));
        }
    }
    Ok(())
}

/// Declare the concept at a `DefConcept` node with its actions.
pub fn declare_concept(
    state: &mut ObjectState,
    block: BlockAddress,
    archetype: &Archetype,
    node: NodeId,
) -> Result<SymbolUrl> {
    let name = identifier(archetype, node)?;
    let url = state.declare_concept(block, name, AccessType::Public)?;
    for &member in archetype.children(node)? {
        match archetype.class(member)? {
            AstClass::DefAction => {
                let action = identifier(archetype, member)?;
                let params = parameters(state, block, archetype, member)?;
                let result = declared_type_or_any(state, block, archetype, member)?;
                state.declare_action(&url, action, params, None, result)?;
            }
            other => {
                return Err(CompilerError::syntax(format!(
                    "{other} is not allowed in a concept body"
                )));
            }
        }
    }
    Ok(url)
}

/// Declare the static at a `DefStatic` node.
pub fn declare_static(
    state: &mut ObjectState,
    block: BlockAddress,
    archetype: &Archetype,
    node: NodeId,
) -> Result<SymbolUrl> {
    let name = identifier(archetype, node)?;
    let type_def = declared_type_or_any(state, block, archetype, node)?;
    let binding = binding_type(archetype, node)?;
    Ok(state.declare_static(block, name, binding, type_def)?)
}

/// Import the module named by an `ImportModule` node.
pub fn import_module(
    state: &mut ObjectState,
    archetype: &Archetype,
    node: NodeId,
    flags: ImportFlags,
) -> Result<ModuleLocation> {
    let location = ModuleLocation::parse(archetype.ensure_attr(node, "location")?)?;
    let location = location.resolve(state.location());
    state.import_module(&location, flags)?;
    Ok(location)
}

/// Bind the symbol named by a `Using` node's `:url` in `block`.
pub fn using(
    state: &mut ObjectState,
    block: BlockAddress,
    archetype: &Archetype,
    node: NodeId,
) -> Result<SymbolUrl> {
    let url = SymbolUrl::parse(archetype.ensure_attr(node, "url")?)?;
    let url = url.resolve(state.location());
    state.use_symbol(block, &url, archetype.attr(node, "alias"))?;
    Ok(url)
}
