//! Blocks, branches, loops, protected regions and early exits.

use lyric_assembler::{BindingType, CatchRegion, Fundamental, Label};
use lyric_common::TypeDef;
use lyric_object::Opcode;

use super::frame::{ChildResult, Frame, FrameState, diverges, pushed};
use super::CompilerDriver;
use crate::archetype::{Archetype, AstClass, NodeId};
use crate::context::{ContextKind, DriverContext};
use crate::error::{CompilerError, Result};
use crate::signature::{IDENTIFIER, declared_type};

impl CompilerDriver {
    pub(super) fn exit_block(&mut self, frame: &Frame) -> Result<ChildResult> {
        self.contexts.pop(ContextKind::Block)?;
        Ok(frame.sequence_value())
    }

    /// Require a `Bool` test and branch to `target` when it is false.
    pub(super) fn branch_on_false(&mut self, test: &ChildResult, target: Label) -> Result<()> {
        let test = self.value_of(test, "test")?;
        let bool_type = self.fundamental(Fundamental::Bool);
        self.check_assignable(&test, &bool_type)?;
        self.emit_jump(Opcode::IfFalse, target)
    }

    fn unify_all<'a>(&self, results: impl IntoIterator<Item = &'a ChildResult>) -> ChildResult {
        results
            .into_iter()
            .flatten()
            .cloned()
            .reduce(|a, b| self.state.types().unify(&a, &b))
    }

    pub(super) fn enter_if(&mut self, archetype: &Archetype, node: NodeId) -> Result<Frame> {
        let has_else = match archetype.children(node)?.len() {
            2 => false,
            3 => true,
            _ => return Err(CompilerError::syntax("If takes a test, a branch and an optional else")),
        };
        let else_label = self.make_label()?;
        let end_label = self.make_label()?;
        Ok(Frame::new(node, AstClass::If).with_state(FrameState::If {
            else_label,
            end_label,
            has_else,
        }))
    }

    pub(super) fn after_if_child(
        &mut self,
        index: usize,
        result: ChildResult,
        else_label: Label,
        end_label: Label,
        has_else: bool,
    ) -> Result<ChildResult> {
        match index {
            0 => self.branch_on_false(&result, else_label)?,
            1 if has_else => {
                if !diverges(&result) {
                    self.emit_jump(Opcode::Jump, end_label)?;
                }
                self.place_label(else_label)?;
            }
            1 => {
                if pushed(&result) {
                    self.emit(Opcode::Pop)?;
                }
                self.place_label(else_label)?;
                self.place_label(end_label)?;
            }
            _ => {
                let then_value = self.frame()?.results.get(1).cloned().flatten().is_some();
                let result = match (then_value, result) {
                    (true, None) => {
                        self.emit(Opcode::Nil)?;
                        Some(self.fundamental(Fundamental::Nil))
                    }
                    (false, result) => {
                        if pushed(&result) {
                            self.emit(Opcode::Pop)?;
                        }
                        None
                    }
                    (true, result) => result,
                };
                self.place_label(end_label)?;
                return Ok(result);
            }
        }
        Ok(result)
    }

    pub(super) fn exit_if(&mut self, frame: &Frame) -> Result<ChildResult> {
        match frame.results.as_slice() {
            [_, Some(_), _] => Ok(self.unify_all(&frame.results[1..])),
            _ => Ok(None),
        }
    }

    pub(super) fn enter_while(&mut self, node: NodeId) -> Result<Frame> {
        let top = self.make_label()?;
        let end = self.make_label()?;
        self.place_label(top)?;
        Ok(Frame::new(node, AstClass::While).with_state(FrameState::While { top, end }))
    }

    pub(super) fn after_while_child(
        &mut self,
        index: usize,
        result: ChildResult,
        top: Label,
        end: Label,
    ) -> Result<ChildResult> {
        match index {
            0 => self.branch_on_false(&result, end)?,
            1 => {
                if pushed(&result) {
                    self.emit(Opcode::Pop)?;
                }
                if !diverges(&result) {
                    self.emit_jump(Opcode::Jump, top)?;
                }
                self.place_label(end)?;
            }
            _ => return Err(CompilerError::syntax("While takes a test and a body")),
        }
        Ok(result)
    }

    pub(super) fn enter_cond(&mut self, node: NodeId) -> Result<Frame> {
        let end = self.make_label()?;
        Ok(Frame::new(node, AstClass::Cond).with_state(FrameState::Cond { end }))
    }

    pub(super) fn exit_cond(&mut self, archetype: &Archetype, frame: &Frame) -> Result<ChildResult> {
        let FrameState::Cond { end } = frame.state else {
            return Err(CompilerError::invariant("cond frame without end label"));
        };
        let children = archetype.children(frame.node)?;
        let (last, cases) = children
            .split_last()
            .ok_or_else(|| CompilerError::syntax("Cond needs at least one Case"))?;
        for &case in cases {
            if archetype.class(case)? != AstClass::Case {
                return Err(CompilerError::syntax("only the last member of a Cond may be a default"));
            }
        }

        let mut results = frame.results.clone();
        let has_default = archetype.class(*last)? != AstClass::Case;
        let default = if has_default { results.pop().flatten() } else { None };
        let default = match default {
            Some(value) => value,
            None => {
                self.emit(Opcode::Nil)?;
                self.fundamental(Fundamental::Nil)
            }
        };
        self.place_label(end)?;
        results.push(Some(default));
        Ok(self.unify_all(&results))
    }

    pub(super) fn enter_case(&mut self, node: NodeId) -> Result<Frame> {
        if self.frame()?.class != AstClass::Cond {
            return Err(CompilerError::syntax("Case is only allowed inside Cond"));
        }
        let next = self.make_label()?;
        Ok(Frame::new(node, AstClass::Case).with_state(FrameState::Case { next }))
    }

    pub(super) fn exit_case(&mut self, frame: &Frame) -> Result<ChildResult> {
        let FrameState::Case { next } = frame.state else {
            return Err(CompilerError::invariant("case frame without next label"));
        };
        let [_, body] = frame.results.as_slice() else {
            return Err(CompilerError::syntax("Case takes a test and a body"));
        };
        let FrameState::Cond { end } = self.frame()?.state else {
            return Err(CompilerError::invariant("case outside cond"));
        };
        let body = match body {
            Some(body) => body.clone(),
            None => {
                self.emit(Opcode::Nil)?;
                self.fundamental(Fundamental::Nil)
            }
        };
        if body != TypeDef::NoReturn {
            self.emit_jump(Opcode::Jump, end)?;
        }
        self.place_label(next)?;
        Ok(Some(body))
    }

    pub(super) fn enter_try(&mut self, node: NodeId) -> Result<Frame> {
        if self.operand_depth()? != 0 {
            return Err(CompilerError::syntax("Try cannot be used as an operand"));
        }
        let start = self.make_label()?;
        let end = self.make_label()?;
        let done = self.make_label()?;
        let parent = self.enclosing_check()?;
        let call = self.contexts.current_call()?.clone();
        let check = self.state.proc_mut(&call)?.add_check(start, end, parent)?;
        self.place_label(start)?;
        Ok(Frame::new(node, AstClass::Try).with_state(FrameState::Try {
            check,
            end,
            done,
            in_body: true,
            body: None,
        }))
    }

    pub(super) fn after_try_body(
        &mut self,
        result: ChildResult,
        end: Label,
        done: Label,
    ) -> Result<ChildResult> {
        self.place_label(end)?;
        if !diverges(&result) {
            self.emit_jump(Opcode::Jump, done)?;
        }
        if let FrameState::Try { in_body, body, .. } = &mut self.frame_mut()?.state {
            *in_body = false;
            *body = result.clone();
        }
        Ok(result)
    }

    pub(super) fn exit_try(&mut self, frame: &Frame) -> Result<ChildResult> {
        let FrameState::Try { done, .. } = frame.state else {
            return Err(CompilerError::invariant("try frame without labels"));
        };
        if frame.results.len() < 2 {
            return Err(CompilerError::syntax("Try needs at least one Catch"));
        }
        self.place_label(done)?;
        match frame.results.first() {
            Some(Some(_)) => Ok(self.unify_all(&frame.results)),
            _ => Ok(None),
        }
    }

    /// A catch handler starts with the exception on the operand stack.
    pub(super) fn enter_catch(&mut self, archetype: &Archetype, node: NodeId) -> Result<Frame> {
        if !matches!(
            self.frame()?.state,
            FrameState::Try { in_body: false, .. }
        ) {
            return Err(CompilerError::syntax("Catch must follow the body of a Try"));
        }
        let start = self.make_label()?;
        self.place_label(start)?;
        let outer = self.block()?;
        let exception_type = declared_type(&mut self.state, outer, archetype, node)?;
        let block = self.state.create_block(outer)?;
        self.contexts.push(DriverContext::Block { block });

        match archetype.attr(node, IDENTIFIER) {
            Some(name) => {
                let type_def = exception_type
                    .clone()
                    .unwrap_or_else(|| self.fundamental(Fundamental::Any));
                let url = self
                    .state
                    .declare_variable(block, name, type_def, BindingType::Value)?;
                let operand = self.state.store_operand(&url, true)?;
                self.emit_with(Opcode::Store, operand)?;
            }
            None => self.emit(Opcode::Pop)?,
        }

        Ok(Frame::new(node, AstClass::Catch).with_state(FrameState::Catch {
            start,
            exception_type,
            value: None,
            warned: false,
        }))
    }

    pub(super) fn exit_catch(&mut self, frame: &Frame) -> Result<ChildResult> {
        let FrameState::Catch {
            start,
            exception_type,
            ..
        } = &frame.state
        else {
            return Err(CompilerError::invariant("catch frame without region"));
        };
        let FrameState::Try {
            check, done, body, ..
        } = self.frame()?.state.clone()
        else {
            return Err(CompilerError::invariant("catch outside try"));
        };

        let value = frame.sequence_value();
        let value = if body.is_some() {
            match value {
                Some(value) => Some(value),
                None => {
                    self.emit(Opcode::Nil)?;
                    Some(self.fundamental(Fundamental::Nil))
                }
            }
        } else {
            if pushed(&value) {
                self.emit(Opcode::Pop)?;
            }
            value.filter(|v| *v == TypeDef::NoReturn)
        };
        if !diverges(&value) {
            self.emit_jump(Opcode::Jump, done)?;
        }
        let end = self.make_label()?;
        self.place_label(end)?;

        let call = self.contexts.current_call()?.clone();
        self.state.proc_mut(&call)?.add_catch(
            check,
            CatchRegion {
                exception_type: exception_type.clone(),
                start: *start,
                end,
            },
        )?;
        self.contexts.pop(ContextKind::Block)?;
        Ok(value)
    }

    /// Return the value on top of the stack from the current call.
    ///
    /// An `Any` value returned where a result type is declared is checked at
    /// run time, so the exit counts as the declared type.
    pub(super) fn emit_return(&mut self, value: TypeDef) -> Result<()> {
        self.emit(Opcode::Return)?;
        let call = self.contexts.current_call()?.clone();
        let declared = self.call_symbol(&call)?.result_type;
        let exit = match declared {
            Some(declared) if self.is(Fundamental::Any, &value) => declared,
            _ => value,
        };
        self.put_exit_type(exit)
    }

    pub(super) fn compile_raise(&mut self, frame: &Frame) -> Result<ChildResult> {
        let [exception] = frame.results.as_slice() else {
            return Err(CompilerError::syntax("Raise takes one operand"));
        };
        self.value_of(exception, "Raise")?;
        self.emit(Opcode::Raise)?;
        Ok(Some(TypeDef::NoReturn))
    }

    pub(super) fn compile_return(&mut self, frame: &Frame) -> Result<ChildResult> {
        match frame.results.as_slice() {
            [] => {
                self.emit(Opcode::Nil)?;
                self.emit(Opcode::Return)?;
                let nil = self.fundamental(Fundamental::Nil);
                self.put_exit_type(nil)?;
            }
            [value] => {
                let value = self.value_of(value, "Return")?;
                self.emit_return(value)?;
            }
            _ => return Err(CompilerError::syntax("Return takes at most one operand")),
        }
        Ok(Some(TypeDef::NoReturn))
    }
}
