//! Code generation pass.
//!
//! [`CompilerDriver`] walks the archetype once. Entering a node pushes a
//! [`Frame`]; leaving it pops the frame and reports a [`ChildResult`] to the
//! parent, which emits whatever belongs between its children. Definitions a
//! scope contains are declared when the scope is entered, so references may
//! precede definitions.
//!
//! Top-level code goes into the module's `$entry` call.

mod control;
mod definitions;
mod expressions;
mod frame;

#[cfg(test)]
mod compile_tests;

use std::collections::HashMap;
use std::sync::Arc;

use lyric_assembler::{
    AssemblerError, BlockAddress, Fundamental, Label, ModuleCache, ObjectState,
    ObjectStateOptions, PendingOperand,
};
use lyric_common::{ModuleLocation, SymbolUrl, TypeDef};
use lyric_object::{AccessType, LyricObject, Opcode};

use crate::archetype::{Archetype, AstClass, NodeId};
use crate::context::{ContextStack, DriverContext};
use crate::declare::{
    DeclaredClass, ResultPolicy, declare_composite, declare_concept, declare_function,
    declare_static,
};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::{CompilerError, Result};
use crate::scan::{ScanDriver, VisitorContext, locate, scan};
use crate::signature::identifier;

pub use frame::{ChildResult, Frame, FrameState, diverges, pushed};

/// Declarations made when their enclosing scope was entered.
#[derive(Clone, Debug)]
enum Hoisted {
    Namespace(SymbolUrl),
    Concept(SymbolUrl),
    Class(DeclaredClass),
    Function(SymbolUrl),
    Static(SymbolUrl),
}

pub struct CompilerDriver {
    state: ObjectState,
    contexts: ContextStack,
    frames: Vec<Frame>,
    hoisted: HashMap<NodeId, Hoisted>,
    diagnostics: Diagnostics,
    root: Option<NodeId>,
}

impl CompilerDriver {
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
        contexts.push(DriverContext::Function {
            call: state.entry_call()?.clone(),
            block: state.entry_block()?,
        });
        Ok(Self {
            state,
            contexts,
            frames: Vec::new(),
            hoisted: HashMap::new(),
            diagnostics: Diagnostics::new(),
            root: None,
        })
    }

    pub fn state(&self) -> &ObjectState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ObjectState {
        &mut self.state
    }

    /// Warnings collected so far.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn to_object(&self) -> Result<LyricObject> {
        Ok(self.state.to_object()?)
    }

    pub fn into_parts(self) -> (ObjectState, Diagnostics) {
        (self.state, self.diagnostics)
    }

    fn block(&self) -> Result<BlockAddress> {
        self.contexts.current_block()
    }

    fn emit(&mut self, opcode: Opcode) -> Result<()> {
        let call = self.contexts.current_call()?;
        self.state.proc_mut(call)?.code_mut().emit(opcode);
        Ok(())
    }

    fn emit_with(&mut self, opcode: Opcode, operand: PendingOperand) -> Result<()> {
        let call = self.contexts.current_call()?;
        self.state.proc_mut(call)?.code_mut().emit_with(opcode, operand);
        Ok(())
    }

    fn emit_jump(&mut self, opcode: Opcode, target: Label) -> Result<()> {
        let call = self.contexts.current_call()?;
        self.state.proc_mut(call)?.code_mut().emit_jump(opcode, target);
        Ok(())
    }

    fn make_label(&mut self) -> Result<Label> {
        let call = self.contexts.current_call()?;
        Ok(self.state.proc_mut(call)?.make_label())
    }

    fn place_label(&mut self, label: Label) -> Result<()> {
        let call = self.contexts.current_call()?;
        self.state.proc_mut(call)?.code_mut().place_label(label);
        Ok(())
    }

    fn put_exit_type(&mut self, type_def: TypeDef) -> Result<()> {
        let call = self.contexts.current_call()?;
        self.state.proc_mut(call)?.put_exit_type(type_def);
        Ok(())
    }

    fn fundamental(&self, fundamental: Fundamental) -> TypeDef {
        self.state.fundamental_type(fundamental)
    }

    fn is(&self, fundamental: Fundamental, type_def: &TypeDef) -> bool {
        self.state.fundamentals().is(fundamental, type_def)
    }

    /// `actual` may be used where `expected` is required. `Any` values are
    /// checked at run time.
    fn check_assignable(&self, actual: &TypeDef, expected: &TypeDef) -> Result<()> {
        if self.is(Fundamental::Any, actual) || self.state.types().is_subtype(actual, expected) {
            return Ok(());
        }
        Err(AssemblerError::TypeMismatch {
            expected: expected.clone(),
            actual: actual.clone(),
        }
        .into())
    }

    fn frame(&self) -> Result<&Frame> {
        self.frames
            .last()
            .ok_or_else(|| CompilerError::invariant("frame stack is empty"))
    }

    fn frame_mut(&mut self) -> Result<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or_else(|| CompilerError::invariant("frame stack is empty"))
    }

    fn root(&self) -> Result<NodeId> {
        self.root
            .ok_or_else(|| CompilerError::invariant("root was not entered"))
    }

    /// Values on the operand stack of the current proc.
    fn operand_depth(&self) -> Result<usize> {
        let root = self.root()?;
        let mut depth = 0;
        for frame in self.frames.iter().rev() {
            depth += frame.pending;
            if frame.is_proc_boundary(root) {
                break;
            }
        }
        Ok(depth)
    }

    /// Innermost protected region in the current proc, if any.
    fn enclosing_check(&self) -> Result<Option<usize>> {
        let root = self.root()?;
        for frame in self.frames.iter().rev() {
            if let FrameState::Try {
                check,
                in_body: true,
                ..
            } = frame.state
            {
                return Ok(Some(check));
            }
            if frame.is_proc_boundary(root) {
                break;
            }
        }
        Ok(None)
    }

    /// Class whose instance the current proc receives as `this`.
    fn receiver_class(&mut self) -> Result<Option<SymbolUrl>> {
        let call = self.contexts.current_call()?.clone();
        Ok(self
            .state
            .get_or_import_symbol(&call)?
            .as_call()
            .and_then(|c| c.receiver.clone()))
    }

    fn value_of(&self, result: &ChildResult, what: &str) -> Result<TypeDef> {
        result
            .clone()
            .ok_or_else(|| CompilerError::syntax(format!("{what} needs a value")))
    }

    /// Declare the namespaces, concepts, composites, statics and functions
    /// `node` contains. Namespace members are declared transitively at module
    /// level. Concepts come before the composites that implement them.
    fn hoist(&mut self, archetype: &Archetype, node: NodeId, block: BlockAddress) -> Result<()> {
        let module_level = node == self.root()? || archetype.class(node)? == AstClass::Namespace;
        let mut scopes = vec![(node, block)];
        if module_level {
            let mut i = 0;
            while let Some(&(scope, scope_block)) = scopes.get(i) {
                i += 1;
                let namespaces: Vec<NodeId> = archetype
                    .children_of_class(scope, AstClass::Namespace)?
                    .collect();
                for child in namespaces {
                    let declared = self.hoist_namespace(archetype, child, scope_block);
                    let url = declared.map_err(|e| locate(archetype, child, e))?;
                    let child_block = self.state.namespace_block(&url)?;
                    self.hoisted.insert(child, Hoisted::Namespace(url));
                    scopes.push((child, child_block));
                }
            }
        }

        for &(scope, scope_block) in &scopes {
            let concepts: Vec<NodeId> = archetype
                .children_of_class(scope, AstClass::DefConcept)?
                .collect();
            for child in concepts {
                let url = declare_concept(&mut self.state, scope_block, archetype, child)
                    .map_err(|e| locate(archetype, child, e))?;
                self.hoisted.insert(child, Hoisted::Concept(url));
            }
        }

        for &(scope, scope_block) in &scopes {
            for &child in archetype.children(scope)? {
                let hoisted = match archetype.class(child)? {
                    class if class.is_composite() => declare_composite(
                        &mut self.state,
                        scope_block,
                        archetype,
                        child,
                        ResultPolicy::Infer,
                    )
                    .map(Hoisted::Class),
                    AstClass::DefStatic if module_level => {
                        declare_static(&mut self.state, scope_block, archetype, child)
                            .map(Hoisted::Static)
                    }
                    _ => continue,
                };
                let hoisted = hoisted.map_err(|e| locate(archetype, child, e))?;
                self.hoisted.insert(child, hoisted);
            }
        }

        for &(scope, scope_block) in &scopes {
            let functions: Vec<NodeId> = archetype.children_of_class(scope, AstClass::Def)?.collect();
            for child in functions {
                let url = declare_function(
                    &mut self.state,
                    scope_block,
                    archetype,
                    child,
                    ResultPolicy::Infer,
                )
                .map_err(|e| locate(archetype, child, e))?;
                self.hoisted.insert(child, Hoisted::Function(url));
            }
        }
        Ok(())
    }

    fn hoist_namespace(
        &mut self,
        archetype: &Archetype,
        node: NodeId,
        block: BlockAddress,
    ) -> Result<SymbolUrl> {
        let name = identifier(archetype, node)?;
        Ok(self.state.declare_namespace(block, name, AccessType::Public)?)
    }

    fn hoisted_class(&self, node: NodeId) -> Result<&DeclaredClass> {
        match self.hoisted.get(&node) {
            Some(Hoisted::Class(class)) => Ok(class),
            _ => Err(CompilerError::invariant("class was not declared")),
        }
    }

    fn enter_root(&mut self, archetype: &Archetype, node: NodeId, class: AstClass) -> Result<()> {
        if class != AstClass::Block {
            return Err(CompilerError::syntax(format!(
                "archetype root must be a Block, found {class}"
            )));
        }
        self.root = Some(node);
        let block = self.state.entry_block()?;
        self.hoist(archetype, node, block)?;
        self.frames.push(Frame::sequence(node, class));
        Ok(())
    }

    /// Work a parent does before a child of class `class` is compiled.
    fn before_child(&mut self, archetype: &Archetype, node: NodeId, class: AstClass) -> Result<()> {
        let parent = self.frame()?;
        let in_sequence = matches!(
            parent.state,
            FrameState::Sequence { .. } | FrameState::Catch { .. }
        );
        if parent.class == AstClass::Namespace && !class.is_namespace_member() {
            return Err(CompilerError::syntax(format!(
                "{class} is not allowed in a namespace; namespaces may only contain definitions"
            )));
        }
        if in_sequence && !matches!(class, AstClass::Param | AstClass::Super) {
            self.drop_sequence_value(archetype, node)?;
        }
        Ok(())
    }

    /// Drop the previous value of the current sequence before `next` runs.
    fn drop_sequence_value(&mut self, archetype: &Archetype, next: NodeId) -> Result<()> {
        let frame = self.frame_mut()?;
        let (value, warn) = match &mut frame.state {
            FrameState::Sequence { value, warned } | FrameState::Catch { value, warned, .. } => {
                let value = value.take();
                let warn = diverges(&value) && !*warned;
                if warn {
                    *warned = true;
                }
                (value, warn)
            }
            _ => return Ok(()),
        };
        if pushed(&value) {
            frame.pending = frame.pending.saturating_sub(1);
            self.emit(Opcode::Pop)?;
        }
        if warn {
            let range = archetype.range(next)?;
            self.diagnostics
                .report(DiagnosticKind::UnreachableCode, range)
                .emit();
        }
        Ok(())
    }

    fn enter_node(
        &mut self,
        archetype: &Archetype,
        node: NodeId,
        class: AstClass,
        ctx: &mut VisitorContext,
    ) -> Result<Frame> {
        let frame = Frame::new(node, class);
        let is_member = self.frame()?.class == AstClass::Deref && ctx.child_index() == 1;
        let frame = match class {
            AstClass::Block => {
                let block = self.state.create_block(self.block()?)?;
                self.contexts.push(DriverContext::Block { block });
                self.hoist(archetype, node, block)?;
                Frame::sequence(node, class)
            }
            AstClass::If => self.enter_if(archetype, node)?,
            AstClass::While => self.enter_while(node)?,
            AstClass::Cond => self.enter_cond(node)?,
            AstClass::Case => self.enter_case(node)?,
            AstClass::Try => self.enter_try(node)?,
            AstClass::Catch => self.enter_catch(archetype, node)?,

            AstClass::Name if is_member => frame,
            AstClass::Call if is_member => self.enter_member_call(archetype, node)?,
            AstClass::Call => self.enter_call(archetype, node)?,
            AstClass::New => self.enter_new(archetype, node)?,
            AstClass::Set => self.enter_set(archetype, node)?,
            AstClass::InplaceAdd
            | AstClass::InplaceSub
            | AstClass::InplaceMul
            | AstClass::InplaceDiv => self.enter_inplace(archetype, node, class)?,

            AstClass::Param => {
                ctx.skip_children();
                frame
            }
            AstClass::Val | AstClass::Var if self.frame()?.class.is_composite() => {
                ctx.skip_children();
                frame
            }
            AstClass::Def => self.enter_def(archetype, node)?,
            AstClass::DefClass | AstClass::DefStruct | AstClass::DefInstance | AstClass::DefEnum => {
                self.enter_class(node, class)?
            }
            AstClass::DefConcept => {
                if let Some(Hoisted::Concept(url)) = self.hoisted.get(&node) {
                    self.state.touch(url)?;
                }
                ctx.skip_children();
                frame
            }
            AstClass::DefAction => {
                return Err(CompilerError::syntax("DefAction is only allowed in a concept body"));
            }
            AstClass::Init => self.enter_init(archetype, node)?,
            AstClass::Super => self.enter_super(node)?,
            AstClass::DefStatic => self.enter_static(node)?,
            AstClass::Namespace => self.enter_namespace(node)?,
            AstClass::Using | AstClass::ImportModule => {
                self.compile_import(archetype, node, class)?;
                ctx.skip_children();
                frame
            }
            _ => frame,
        };
        Ok(frame)
    }

    fn exit_node(&mut self, archetype: &Archetype, frame: Frame, is_member: bool) -> Result<ChildResult> {
        let node = frame.node;
        match frame.class {
            AstClass::Nil
            | AstClass::Undef
            | AstClass::True
            | AstClass::False
            | AstClass::Integer
            | AstClass::Float
            | AstClass::Char
            | AstClass::String => self.compile_literal(archetype, node, frame.class),

            AstClass::Add | AstClass::Sub | AstClass::Mul | AstClass::Div | AstClass::Neg => {
                self.compile_arithmetic(&frame)
            }
            AstClass::IsEq | AstClass::IsLt | AstClass::IsLe | AstClass::IsGt | AstClass::IsGe => {
                self.compile_comparison(&frame)
            }
            AstClass::And | AstClass::Or | AstClass::Not => self.compile_logical(&frame),

            AstClass::Name if is_member => self.compile_member_name(archetype, node),
            AstClass::Name => self.compile_name(archetype, node),
            AstClass::This => self.compile_this(),
            AstClass::Deref => self.exit_deref(&frame),
            AstClass::Call => self.exit_call(&frame),
            AstClass::New => self.exit_new(&frame),
            AstClass::Set => self.exit_set(&frame),
            AstClass::InplaceAdd
            | AstClass::InplaceSub
            | AstClass::InplaceMul
            | AstClass::InplaceDiv => self.exit_inplace(&frame),

            AstClass::Block => self.exit_block(&frame),
            AstClass::If => self.exit_if(&frame),
            AstClass::While => Ok(None),
            AstClass::Cond => self.exit_cond(archetype, &frame),
            AstClass::Case => self.exit_case(&frame),
            AstClass::Try => self.exit_try(&frame),
            AstClass::Catch => self.exit_catch(&frame),
            AstClass::Raise => self.compile_raise(&frame),
            AstClass::Return => self.compile_return(&frame),

            AstClass::Val | AstClass::Var => self.exit_binding(archetype, &frame),
            AstClass::Param => Ok(None),
            AstClass::Def => self.exit_def(&frame),
            AstClass::DefClass | AstClass::DefStruct | AstClass::DefInstance | AstClass::DefEnum => {
                self.exit_class(&frame)
            }
            AstClass::DefConcept | AstClass::DefAction => Ok(None),
            AstClass::Init => self.exit_init(&frame),
            AstClass::Super => self.exit_super(&frame),
            AstClass::DefStatic => self.exit_static(&frame),
            AstClass::Namespace => self.exit_namespace(),
            AstClass::Using | AstClass::ImportModule => Ok(None),
        }
    }

    /// Record `result` in the parent frame and emit what follows the child.
    fn after_child(&mut self, index: usize, result: ChildResult) -> Result<()> {
        let state = self.frame()?.state.clone();
        let result = match state {
            FrameState::Sequence { .. } | FrameState::Catch { .. } => {
                let frame = self.frame_mut()?;
                if pushed(&result) {
                    frame.pending += 1;
                }
                if let FrameState::Sequence { value, .. } | FrameState::Catch { value, .. } =
                    &mut frame.state
                {
                    *value = result.clone();
                }
                result
            }
            FrameState::If {
                else_label,
                end_label,
                has_else,
            } => self.after_if_child(index, result, else_label, end_label, has_else)?,
            FrameState::While { top, end } => self.after_while_child(index, result, top, end)?,
            FrameState::Case { next } => {
                if index == 0 {
                    self.branch_on_false(&result, next)?;
                }
                result
            }
            FrameState::Cond { .. } => result,
            FrameState::Try { end, done, .. } if index == 0 => {
                self.after_try_body(result, end, done)?
            }
            FrameState::Try { .. } => result,
            _ => {
                if pushed(&result) {
                    self.frame_mut()?.pending += 1;
                }
                result
            }
        };
        self.frame_mut()?.results.push(result);
        Ok(())
    }

    /// Close the `$entry` call.
    fn exit_root(&mut self, frame: &Frame) -> Result<()> {
        let entry = self.state.entry_call()?.clone();
        match frame.sequence_value() {
            Some(TypeDef::NoReturn) => {}
            Some(value) => self.emit_return(value)?,
            None => {
                if self.state.proc(&entry)?.has_code() {
                    self.emit(Opcode::Nil)?;
                    self.emit(Opcode::Return)?;
                    let nil = self.fundamental(Fundamental::Nil);
                    self.put_exit_type(nil)?;
                }
            }
        }
        self.state.finalize_call(&entry)?;
        Ok(())
    }
}

impl ScanDriver for CompilerDriver {
    fn enter(&mut self, archetype: &Archetype, node: NodeId, ctx: &mut VisitorContext) -> Result<()> {
        let class = archetype.class(node)?;
        if ctx.parent().is_none() {
            return self.enter_root(archetype, node, class);
        }
        self.before_child(archetype, node, class)?;
        let frame = self.enter_node(archetype, node, class, ctx)?;
        self.frames.push(frame);
        Ok(())
    }

    fn exit(&mut self, archetype: &Archetype, node: NodeId, ctx: &VisitorContext) -> Result<()> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| CompilerError::invariant("frame stack is empty"))?;
        if frame.node != node {
            return Err(CompilerError::invariant("frame does not match the node being left"));
        }
        if ctx.parent().is_none() {
            return self.exit_root(&frame);
        }
        let is_member = self.frame()?.class == AstClass::Deref && ctx.child_index() == 1;
        let result = self.exit_node(archetype, frame, is_member)?;
        self.after_child(ctx.child_index(), result)
    }
}

/// Compile `archetype` as the module at `location`.
pub fn compile(
    archetype: &Archetype,
    location: ModuleLocation,
    modules: Arc<ModuleCache>,
    options: ObjectStateOptions,
) -> Result<CompilerDriver> {
    let mut driver = CompilerDriver::new(location, modules, options)?;
    scan(archetype, &mut driver)?;
    Ok(driver)
}
