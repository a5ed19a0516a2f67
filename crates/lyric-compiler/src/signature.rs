//! Reading declared names, types and parameters off archetype nodes.

use lyric_assembler::{BindingType, BlockAddress, Fundamental, ObjectState, Parameter, SymbolKind};
use lyric_common::{SymbolUrl, TypeDef};

use crate::archetype::{Archetype, AstClass, NodeId};
use crate::error::{CompilerError, Result};

pub const IDENTIFIER: &str = "identifier";
pub const TYPE: &str = "type";
pub const BINDING: &str = "binding";
pub const EXTENDS: &str = "extends";
pub const IMPLEMENTS: &str = "implements";
pub const VALUE: &str = "value";

pub fn identifier(archetype: &Archetype, node: NodeId) -> Result<&str> {
    archetype.ensure_attr(node, IDENTIFIER)
}

/// Split a dotted reference such as `ns.Point`.
pub fn path_segments(text: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = text.split('.').map(str::trim).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(CompilerError::syntax(format!("invalid reference `{text}`")));
    }
    Ok(segments)
}

/// Resolve type text: a dotted type name, or names joined by `|` or `&`.
pub fn resolve_type(state: &mut ObjectState, block: BlockAddress, text: &str) -> Result<TypeDef> {
    if text.contains('|') {
        let members = text
            .split('|')
            .map(|m| resolve_type(state, block, m))
            .collect::<Result<Vec<_>>>()?;
        return Ok(TypeDef::union(members));
    }
    if text.contains('&') {
        let members = text
            .split('&')
            .map(|m| resolve_type(state, block, m))
            .collect::<Result<Vec<_>>>()?;
        return Ok(TypeDef::intersection(members));
    }

    let path = path_segments(text.trim())?;
    let url = state.resolve_binding(block, &path)?;
    let symbol = state.get_or_import_symbol(&url)?;
    match &symbol.kind {
        SymbolKind::Class(c)
        | SymbolKind::Struct(c)
        | SymbolKind::Instance(c)
        | SymbolKind::Enum(c) => Ok(c.type_def.clone()),
        SymbolKind::Existential(e) => Ok(e.type_def.clone()),
        SymbolKind::Concept(c) => Ok(c.type_def.clone()),
        _ => Err(CompilerError::syntax(format!("`{}` is not a type", text.trim()))),
    }
}

/// The node's `:type`, or `None` when absent.
pub fn declared_type(
    state: &mut ObjectState,
    block: BlockAddress,
    archetype: &Archetype,
    node: NodeId,
) -> Result<Option<TypeDef>> {
    archetype
        .attr(node, TYPE)
        .map(|text| resolve_type(state, block, text))
        .transpose()
}

/// The node's `:type`, defaulting to `Any`.
pub fn declared_type_or_any(
    state: &mut ObjectState,
    block: BlockAddress,
    archetype: &Archetype,
    node: NodeId,
) -> Result<TypeDef> {
    Ok(match declared_type(state, block, archetype, node)? {
        Some(t) => t,
        None => state.fundamental_type(Fundamental::Any),
    })
}

/// `Var` nodes and `:binding var` bind variables; everything else values.
pub fn binding_type(archetype: &Archetype, node: NodeId) -> Result<BindingType> {
    if archetype.class(node)? == AstClass::Var {
        return Ok(BindingType::Variable);
    }
    match archetype.attr(node, BINDING) {
        None | Some("val") => Ok(BindingType::Value),
        Some("var") => Ok(BindingType::Variable),
        Some(other) => Err(CompilerError::syntax(format!("unknown binding `{other}`"))),
    }
}

/// Parameters declared by the `Param` children of `node`.
pub fn parameters(
    state: &mut ObjectState,
    block: BlockAddress,
    archetype: &Archetype,
    node: NodeId,
) -> Result<Vec<Parameter>> {
    let params: Vec<NodeId> = archetype.children_of_class(node, AstClass::Param)?.collect();
    let mut out = Vec::with_capacity(params.len());
    for param in params {
        let name = identifier(archetype, param)?;
        if out.iter().any(|p: &Parameter| p.name == name) {
            return Err(CompilerError::syntax(format!("duplicate parameter `{name}`")));
        }
        let type_def = declared_type_or_any(state, block, archetype, param)?;
        let mut parameter = Parameter::new(name, type_def);
        parameter.binding = binding_type(archetype, param)?;
        out.push(parameter);
    }
    Ok(out)
}

/// Superclass named by `:extends`, if any.
pub fn superclass(
    state: &mut ObjectState,
    block: BlockAddress,
    archetype: &Archetype,
    node: NodeId,
) -> Result<Option<SymbolUrl>> {
    let Some(text) = archetype.attr(node, EXTENDS) else {
        return Ok(None);
    };
    let path = path_segments(text)?;
    Ok(Some(state.resolve_binding(block, &path)?))
}

/// Concepts named by `:implements`, joined by `&`.
pub fn concepts(
    state: &mut ObjectState,
    block: BlockAddress,
    archetype: &Archetype,
    node: NodeId,
) -> Result<Vec<SymbolUrl>> {
    let Some(text) = archetype.attr(node, IMPLEMENTS) else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for name in text.split('&') {
        let path = path_segments(name.trim())?;
        let url = state.resolve_binding(block, &path)?;
        if !matches!(state.get_or_import_symbol(&url)?.kind, SymbolKind::Concept(_)) {
            return Err(CompilerError::syntax(format!("`{}` is not a concept", name.trim())));
        }
        out.push(url);
    }
    Ok(out)
}
