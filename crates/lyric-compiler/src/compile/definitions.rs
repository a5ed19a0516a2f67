//! Functions, classes, constructors, statics, namespaces and local bindings.

use lyric_assembler::{Fundamental, PendingOperand};
use lyric_common::{SymbolUrl, TypeDef};
use lyric_object::{ImportFlags, Opcode, op_flags};

use super::frame::{ChildResult, Frame, FrameState, diverges, pushed};
use super::{CompilerDriver, Hoisted};
use crate::archetype::{Archetype, AstClass, NodeId};
use crate::context::{ContextKind, DriverContext};
use crate::declare::{import_module, using};
use crate::error::{CompilerError, Result};
use crate::signature::{binding_type, declared_type, identifier};

impl CompilerDriver {
    fn enter_proc(&mut self, call: SymbolUrl) -> Result<()> {
        let block = self.state.proc(&call)?.block();
        self.contexts.push(DriverContext::Function { call, block });
        Ok(())
    }

    /// Pop the current proc context and close its call.
    fn leave_proc(&mut self) -> Result<()> {
        let DriverContext::Function { call, .. } = self.contexts.pop(ContextKind::Function)? else {
            return Err(CompilerError::invariant("function context expected"));
        };
        self.state.finalize_call(&call)?;
        Ok(())
    }

    /// Return the value a body left, or `Nil` when it left none.
    fn return_body_value(&mut self, value: ChildResult) -> Result<()> {
        match value {
            Some(TypeDef::NoReturn) => Ok(()),
            Some(value) => self.emit_return(value),
            None => self.return_nil(),
        }
    }

    fn return_nil(&mut self) -> Result<()> {
        self.emit(Opcode::Nil)?;
        self.emit(Opcode::Return)?;
        let nil = self.fundamental(Fundamental::Nil);
        self.put_exit_type(nil)
    }

    pub(super) fn enter_def(&mut self, archetype: &Archetype, node: NodeId) -> Result<Frame> {
        let url = match self.hoisted.get(&node) {
            Some(Hoisted::Function(url)) => url.clone(),
            _ => {
                let parent = self.frame()?;
                if !parent.class.is_composite() {
                    return Err(CompilerError::invariant("function was not declared"));
                }
                self.hoisted_class(parent.node)?
                    .method(node)
                    .cloned()
                    .ok_or_else(|| CompilerError::invariant("method was not declared"))?
            }
        };
        self.enter_proc(url)?;
        let block = self.block()?;
        self.hoist(archetype, node, block)?;
        Ok(Frame::sequence(node, AstClass::Def))
    }

    pub(super) fn exit_def(&mut self, frame: &Frame) -> Result<ChildResult> {
        self.return_body_value(frame.sequence_value())?;
        self.leave_proc()?;
        Ok(None)
    }

    pub(super) fn enter_class(&mut self, node: NodeId, class: AstClass) -> Result<Frame> {
        let url = self.hoisted_class(node)?.url.clone();
        let block = self.state.composite_block(&url)?;
        self.contexts.push(DriverContext::Class { url, block });
        Ok(Frame::new(node, class))
    }

    /// Chain to the superclass constructor without arguments.
    fn call_super_implicitly(&mut self, class: &SymbolUrl) -> Result<()> {
        let Some(super_ctor) = self.state.superclass_ctor(class)? else {
            return Ok(());
        };
        let call = self.call_symbol(&super_ctor)?;
        if !call.parameters.is_empty() {
            return Err(CompilerError::syntax(format!(
                "superclass constructor of `{}` takes arguments; call Super explicitly",
                class.name()
            )));
        }
        self.emit_this()?;
        self.emit_with(
            Opcode::CallStatic,
            PendingOperand::Invoke {
                flags: op_flags::CALL_RECEIVER_FOLLOWS,
                url: super_ctor,
                placement: 0,
            },
        )?;
        self.emit(Opcode::Pop)
    }

    pub(super) fn exit_class(&mut self, frame: &Frame) -> Result<ChildResult> {
        let class = self.hoisted_class(frame.node)?.clone();
        if class.init.is_none() {
            self.enter_proc(class.ctor.clone())?;
            self.call_super_implicitly(&class.url)?;
            self.return_nil()?;
            self.leave_proc()?;
        }
        self.contexts.pop(ContextKind::Class)?;
        Ok(None)
    }

    pub(super) fn enter_init(&mut self, archetype: &Archetype, node: NodeId) -> Result<Frame> {
        let parent = self.frame()?;
        if !parent.class.is_composite() {
            return Err(CompilerError::syntax("Init is only allowed in a class body"));
        }
        let class = self.hoisted_class(parent.node)?.clone();
        let supers = archetype.children_of_class(node, AstClass::Super)?.count();
        if supers > 1 {
            return Err(CompilerError::syntax("Init may call Super only once"));
        }
        self.enter_proc(class.ctor)?;
        let block = self.block()?;
        self.hoist(archetype, node, block)?;
        if supers == 0 {
            self.call_super_implicitly(&class.url)?;
        }
        Ok(Frame::sequence(node, AstClass::Init))
    }

    pub(super) fn exit_init(&mut self, frame: &Frame) -> Result<ChildResult> {
        let value = frame.sequence_value();
        if pushed(&value) {
            self.emit(Opcode::Pop)?;
        }
        if !diverges(&value) {
            self.return_nil()?;
        }
        self.leave_proc()?;
        Ok(None)
    }

    pub(super) fn enter_super(&mut self, node: NodeId) -> Result<Frame> {
        let parent = self.frame()?;
        if parent.class != AstClass::Init || parent.results.iter().any(Option::is_some) {
            return Err(CompilerError::syntax("Super must open the body of an Init"));
        }
        let class = self
            .receiver_class()?
            .ok_or_else(|| CompilerError::invariant("constructor without receiver"))?;
        let ctor = self.state.superclass_ctor(&class)?.ok_or_else(|| {
            CompilerError::syntax(format!("`{}` has no superclass", class.name()))
        })?;
        self.emit_this()?;
        let mut frame = Frame::new(node, AstClass::Super).with_state(FrameState::Super { ctor });
        frame.pending = 1;
        Ok(frame)
    }

    pub(super) fn exit_super(&mut self, frame: &Frame) -> Result<ChildResult> {
        let FrameState::Super { ctor } = &frame.state else {
            return Err(CompilerError::invariant("super frame without constructor"));
        };
        let call = self.signature(ctor)?;
        let argc = self.check_arguments(&call, "Super", frame)?;
        self.emit_with(
            Opcode::CallStatic,
            PendingOperand::Invoke {
                flags: op_flags::CALL_RECEIVER_FOLLOWS,
                url: ctor.clone(),
                placement: argc,
            },
        )?;
        self.emit(Opcode::Pop)?;
        Ok(None)
    }

    pub(super) fn enter_static(&mut self, node: NodeId) -> Result<Frame> {
        let Some(Hoisted::Static(url)) = self.hoisted.get(&node) else {
            return Err(CompilerError::syntax("statics may only be declared at module level"));
        };
        let init = self.state.static_initializer(url)?;
        self.enter_proc(init)?;
        Ok(Frame::sequence(node, AstClass::DefStatic))
    }

    pub(super) fn exit_static(&mut self, frame: &Frame) -> Result<ChildResult> {
        let Some(Hoisted::Static(url)) = self.hoisted.get(&frame.node).cloned() else {
            return Err(CompilerError::invariant("static was not declared"));
        };
        let value = self.value_of(&frame.sequence_value(), "DefStatic")?;
        if value != TypeDef::NoReturn {
            let declared = self.state.symbol_type(&url)?;
            self.check_assignable(&value, &declared)?;
            self.emit_return(value)?;
        }
        self.leave_proc()?;
        Ok(None)
    }

    pub(super) fn enter_namespace(&mut self, node: NodeId) -> Result<Frame> {
        let Some(Hoisted::Namespace(url)) = self.hoisted.get(&node).cloned() else {
            return Err(CompilerError::syntax("namespaces may only be declared at module level"));
        };
        let block = self.state.namespace_block(&url)?;
        self.contexts.push(DriverContext::Namespace { url, block });
        Ok(Frame::new(node, AstClass::Namespace))
    }

    pub(super) fn exit_namespace(&mut self) -> Result<ChildResult> {
        self.contexts.pop(ContextKind::Namespace)?;
        Ok(None)
    }

    pub(super) fn compile_import(
        &mut self,
        archetype: &Archetype,
        node: NodeId,
        class: AstClass,
    ) -> Result<()> {
        match class {
            AstClass::Using => {
                let block = self.block()?;
                using(&mut self.state, block, archetype, node)?;
            }
            _ => {
                import_module(&mut self.state, archetype, node, ImportFlags::NONE)?;
            }
        }
        Ok(())
    }

    /// Bind a `Val` or `Var` in the current block to its initial value.
    pub(super) fn exit_binding(&mut self, archetype: &Archetype, frame: &Frame) -> Result<ChildResult> {
        if self.frame()?.class.is_composite() {
            return Ok(None);
        }
        let name = identifier(archetype, frame.node)?;
        let [value] = frame.results.as_slice() else {
            return Err(CompilerError::syntax(format!("`{name}` needs exactly one initial value")));
        };
        let value = self.value_of(value, &format!("`{name}`"))?;
        if value == TypeDef::NoReturn {
            return Err(CompilerError::syntax(format!("initial value of `{name}` never completes")));
        }
        let block = self.block()?;
        let type_def = match declared_type(&mut self.state, block, archetype, frame.node)? {
            Some(declared) => {
                self.check_assignable(&value, &declared)?;
                declared
            }
            None => value,
        };
        let binding = binding_type(archetype, frame.node)?;
        let url = self.state.declare_variable(block, name, type_def, binding)?;
        let operand = self.state.store_operand(&url, true)?;
        self.emit_with(Opcode::Store, operand)?;
        Ok(None)
    }
}
