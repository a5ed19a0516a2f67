//! Archetype: the parsed syntax tree every pass walks.
//!
//! Nodes live in one arena and refer to their children by [`NodeId`]. Each
//! node carries its [`AstClass`], string attributes and the source range it
//! was read from, so later passes can attach diagnostics to it.

mod class;
mod reader;

#[cfg(test)]
mod archetype_tests;
#[cfg(test)]
mod reader_tests;

use indexmap::IndexMap;
use rowan::TextRange;

use crate::error::{CompilerError, Result};

pub use class::AstClass;
pub use reader::{Token, TokenKind, lex};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchetypeNode {
    pub class: AstClass,
    pub attrs: IndexMap<String, String>,
    pub children: Vec<NodeId>,
    pub range: TextRange,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Archetype {
    nodes: Vec<ArchetypeNode>,
    root: Option<NodeId>,
}

impl Archetype {
    /// Read the s-expression form, e.g. `(Block (Integer :value "1"))`.
    pub fn read(source: &str) -> Result<Self> {
        reader::read(source)
    }

    pub fn root(&self) -> Result<NodeId> {
        self.root
            .ok_or_else(|| CompilerError::invariant("archetype has no root"))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Result<&ArchetypeNode> {
        self.nodes
            .get(id.index())
            .ok_or_else(|| CompilerError::invariant(format!("no archetype node {}", id.0)))
    }

    pub fn class(&self, id: NodeId) -> Result<AstClass> {
        Ok(self.node(id)?.class)
    }

    pub fn range(&self, id: NodeId) -> Result<TextRange> {
        Ok(self.node(id)?.range)
    }

    pub fn children(&self, id: NodeId) -> Result<&[NodeId]> {
        Ok(&self.node(id)?.children)
    }

    pub fn attr(&self, id: NodeId, key: &str) -> Option<&str> {
        self.nodes
            .get(id.index())
            .and_then(|n| n.attrs.get(key))
            .map(String::as_str)
    }

    /// Attribute the node's class requires.
    pub fn ensure_attr(&self, id: NodeId, key: &str) -> Result<&str> {
        let node = self.node(id)?;
        node.attrs.get(key).map(String::as_str).ok_or_else(|| {
            CompilerError::syntax(format!("{} node is missing `:{key}`", node.class))
        })
    }

    pub fn ensure_child(&self, id: NodeId, index: usize) -> Result<NodeId> {
        let node = self.node(id)?;
        node.children.get(index).copied().ok_or_else(|| {
            CompilerError::syntax(format!("{} node has no child {index}", node.class))
        })
    }

    /// Children whose class is `class`, in order.
    pub fn children_of_class(
        &self,
        id: NodeId,
        class: AstClass,
    ) -> Result<impl Iterator<Item = NodeId> + '_> {
        Ok(self
            .children(id)?
            .iter()
            .copied()
            .filter(move |child| self.nodes[child.index()].class == class))
    }

    /// Render back to the reader's syntax, one node per line.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        if let Some(root) = self.root {
            self.dump_node(root, 0, &mut out);
        }
        out
    }

    fn dump_node(&self, id: NodeId, depth: usize, out: &mut String) {
        let Some(node) = self.nodes.get(id.index()) else {
            return;
        };
        out.push_str(&"  ".repeat(depth));
        out.push('(');
        out.push_str(node.class.name());
        for (key, value) in &node.attrs {
            out.push_str(&format!(" :{key} {value:?}"));
        }
        if node.children.is_empty() {
            out.push_str(")\n");
            return;
        }
        out.push('\n');
        for child in &node.children {
            self.dump_node(*child, depth + 1, out);
        }
        out.push_str(&"  ".repeat(depth));
        out.push_str(")\n");
    }
}

/// Builds an [`Archetype`] node by node.
#[derive(Debug, Default)]
pub struct ArchetypeBuilder {
    nodes: Vec<ArchetypeNode>,
}

impl ArchetypeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, class: AstClass, range: TextRange) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(ArchetypeNode {
            class,
            attrs: IndexMap::new(),
            children: Vec::new(),
            range,
        });
        id
    }

    pub fn set_attr(&mut self, id: NodeId, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let node = self.node_mut(id)?;
        node.attrs.insert(key.into(), value.into());
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if child.index() >= self.nodes.len() {
            return Err(CompilerError::invariant(format!("no archetype node {}", child.0)));
        }
        self.node_mut(parent)?.children.push(child);
        Ok(())
    }

    pub fn set_range(&mut self, id: NodeId, range: TextRange) -> Result<()> {
        self.node_mut(id)?.range = range;
        Ok(())
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut ArchetypeNode> {
        self.nodes
            .get_mut(id.index())
            .ok_or_else(|| CompilerError::invariant(format!("no archetype node {}", id.0)))
    }

    pub fn build(self, root: NodeId) -> Result<Archetype> {
        if root.index() >= self.nodes.len() {
            return Err(CompilerError::invariant(format!("no archetype node {}", root.0)));
        }
        Ok(Archetype {
            nodes: self.nodes,
            root: Some(root),
        })
    }
}
