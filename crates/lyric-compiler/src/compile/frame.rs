//! Per-node state kept while a node's children are compiled.

use lyric_assembler::Label;
use lyric_common::{SymbolUrl, TypeDef};
use lyric_object::Opcode;

use crate::archetype::{AstClass, NodeId};

/// What a compiled child left behind.
///
/// `None` means nothing was pushed. `Some(TypeDef::NoReturn)` means control
/// never leaves the child.
pub type ChildResult = Option<TypeDef>;

pub fn diverges(result: &ChildResult) -> bool {
    matches!(result, Some(TypeDef::NoReturn))
}

/// Whether the child left a value on the operand stack.
pub fn pushed(result: &ChildResult) -> bool {
    result.is_some() && !diverges(result)
}

/// How a call reaches its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Static,
    /// Method looked up on the receiver's class.
    Virtual,
    /// Action resolved to the receiver's method of the same name.
    Concept,
    /// Method of a fundamental type.
    Existential,
}

impl Dispatch {
    pub fn opcode(self) -> Opcode {
        match self {
            Self::Static => Opcode::CallStatic,
            Self::Virtual => Opcode::CallVirtual,
            Self::Concept => Opcode::CallConcept,
            Self::Existential => Opcode::CallExistential,
        }
    }
}

#[derive(Clone, Debug)]
pub enum FrameState {
    Plain,
    /// Children run in order; every value but the last is dropped.
    Sequence {
        value: ChildResult,
        warned: bool,
    },
    If {
        else_label: Label,
        end_label: Label,
        has_else: bool,
    },
    While {
        top: Label,
        end: Label,
    },
    Cond {
        end: Label,
    },
    Case {
        next: Label,
    },
    Try {
        check: usize,
        end: Label,
        done: Label,
        in_body: bool,
        body: ChildResult,
    },
    Catch {
        start: Label,
        exception_type: Option<TypeDef>,
        value: ChildResult,
        warned: bool,
    },
    /// Call of `target`, a call or an action.
    Call {
        target: SymbolUrl,
        dispatch: Dispatch,
    },
    /// Construction of a class or struct; `new_type` is the `NEW` flag.
    New {
        class: SymbolUrl,
        ctor: SymbolUrl,
        new_type: u8,
    },
    /// Assignment to `target`, a field when `field` is set.
    Assign {
        target: SymbolUrl,
        field: bool,
    },
    Super {
        ctor: SymbolUrl,
    },
}

#[derive(Clone, Debug)]
pub struct Frame {
    pub node: NodeId,
    pub class: AstClass,
    pub results: Vec<ChildResult>,
    /// Values this frame currently holds on the operand stack.
    pub pending: usize,
    pub state: FrameState,
}

impl Frame {
    pub fn new(node: NodeId, class: AstClass) -> Self {
        Self {
            node,
            class,
            results: Vec::new(),
            pending: 0,
            state: FrameState::Plain,
        }
    }

    pub fn with_state(mut self, state: FrameState) -> Self {
        self.state = state;
        self
    }

    pub fn sequence(node: NodeId, class: AstClass) -> Self {
        Self::new(node, class).with_state(FrameState::Sequence {
            value: None,
            warned: false,
        })
    }

    /// Frames whose code goes into a proc of their own.
    pub fn is_proc_boundary(&self, root: NodeId) -> bool {
        self.node == root || matches!(self.class, AstClass::Def | AstClass::Init | AstClass::DefStatic)
    }

    /// Value of a sequence frame: its last child's result.
    pub fn sequence_value(&self) -> ChildResult {
        match &self.state {
            FrameState::Sequence { value, .. } | FrameState::Catch { value, .. } => value.clone(),
            _ => None,
        }
    }
}
