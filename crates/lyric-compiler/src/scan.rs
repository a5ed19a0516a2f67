//! Depth-first archetype walk shared by every pass.
//!
//! [`scan`] calls [`ScanDriver::enter`] before a node's children and
//! [`ScanDriver::exit`] after them, using an explicit stack so deeply nested
//! archetypes cannot overflow the native stack. A failure stops the walk;
//! user-facing failures are located at the node being visited and turned
//! into a [`CompilerError::Compile`] diagnostic.

use lyric_assembler::AssemblerError;

use crate::archetype::{Archetype, NodeId};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::{CompilerError, Result};

/// Position of the visited node and walk control.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisitorContext {
    parent: Option<NodeId>,
    index: usize,
    skip_children: bool,
}

impl VisitorContext {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Index of the node among its parent's children.
    pub fn child_index(&self) -> usize {
        self.index
    }

    /// Do not descend into the node being entered. `exit` is still called.
    pub fn skip_children(&mut self) {
        self.skip_children = true;
    }

    pub fn is_skipping_children(&self) -> bool {
        self.skip_children
    }
}

pub trait ScanDriver {
    fn enter(&mut self, archetype: &Archetype, node: NodeId, ctx: &mut VisitorContext) -> Result<()>;

    fn exit(&mut self, archetype: &Archetype, node: NodeId, ctx: &VisitorContext) -> Result<()>;

    /// Called once after the root has been exited.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

enum Step {
    Enter {
        node: NodeId,
        parent: Option<NodeId>,
        index: usize,
    },
    Exit {
        node: NodeId,
        ctx: VisitorContext,
    },
}

pub fn scan<D: ScanDriver + ?Sized>(archetype: &Archetype, driver: &mut D) -> Result<()> {
    let root = archetype.root()?;
    let mut stack = vec![Step::Enter {
        node: root,
        parent: None,
        index: 0,
    }];

    while let Some(step) = stack.pop() {
        match step {
            Step::Enter {
                node,
                parent,
                index,
            } => {
                let mut ctx = VisitorContext {
                    parent,
                    index,
                    skip_children: false,
                };
                driver
                    .enter(archetype, node, &mut ctx)
                    .map_err(|e| locate(archetype, node, e))?;
                let skip = ctx.skip_children;
                stack.push(Step::Exit { node, ctx });
                if !skip {
                    let children = archetype.children(node)?;
                    for (i, child) in children.iter().enumerate().rev() {
                        stack.push(Step::Enter {
                            node: *child,
                            parent: Some(node),
                            index: i,
                        });
                    }
                }
            }
            Step::Exit { node, ctx } => {
                driver
                    .exit(archetype, node, &ctx)
                    .map_err(|e| locate(archetype, node, e))?;
            }
        }
    }

    driver.finish()
}

/// Turn a user-facing failure at `node` into a located diagnostic.
/// Invariant violations and already-located failures pass through.
pub(crate) fn locate(archetype: &Archetype, node: NodeId, err: CompilerError) -> CompilerError {
    if err.is_invariant() {
        return err;
    }
    let Some((kind, detail)) = classify(&err) else {
        return err;
    };
    let Ok(range) = archetype.range(node) else {
        return err;
    };
    let mut diagnostics = Diagnostics::new();
    diagnostics.report(kind, range).message(detail).emit();
    CompilerError::Compile(diagnostics)
}

fn classify(err: &CompilerError) -> Option<(DiagnosticKind, String)> {
    let classified = match err {
        CompilerError::Syntax(message) => (DiagnosticKind::UnexpectedNode, message.clone()),
        CompilerError::InvalidLiteral(message) => (DiagnosticKind::InvalidLiteral, message.clone()),
        CompilerError::Assembler(e) => match e {
            AssemblerError::SymbolNotFound(name) => (DiagnosticKind::UndefinedReference, name.clone()),
            AssemblerError::MissingSymbol(url) => (DiagnosticKind::UndefinedReference, url.to_string()),
            AssemblerError::SymbolAlreadyDefined(url) | AssemblerError::CallAlreadyDefined(url) => {
                (DiagnosticKind::DuplicateDefinition, url.name().to_owned())
            }
            AssemblerError::NameAlreadyBound(name) => (DiagnosticKind::DuplicateDefinition, name.clone()),
            AssemblerError::MissingModule(location) => (DiagnosticKind::MissingModule, location.to_string()),
            AssemblerError::TypeMismatch { expected, actual } => (
                DiagnosticKind::IncompatibleTypes,
                format!("expected `{expected}`, found `{actual}`"),
            ),
            AssemblerError::InvalidSuperclass { symbol, superclass } => (
                DiagnosticKind::InvalidSuperclass,
                format!("`{}` cannot extend `{superclass}`", symbol.name()),
            ),
            AssemblerError::NotAConcept(url) => (
                DiagnosticKind::InvalidSuperclass,
                format!("`{}` is not a concept", url.name()),
            ),
            AssemblerError::NotAssignable(url) => (DiagnosticKind::NotAssignable, url.name().to_owned()),
            _ => return None,
        },
        CompilerError::Common(e) => (DiagnosticKind::InvalidLiteral, e.to_string()),
        _ => return None,
    };
    Some(classified)
}
