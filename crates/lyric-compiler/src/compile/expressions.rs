//! Literals, operators, references, calls and assignment.

use lyric_assembler::{
    AssemblerError, CTOR_NAME, CallSymbol, Fundamental, LiteralValue, Parameter, PendingOperand,
    SymbolKind,
};
use lyric_common::{SymbolUrl, TypeDef};
use lyric_object::{Opcode, op_flags};

use super::frame::{ChildResult, Dispatch, Frame, FrameState};
use super::CompilerDriver;
use crate::archetype::{Archetype, AstClass, NodeId};
use crate::error::{CompilerError, Result};
use crate::signature::{TYPE, VALUE, identifier, path_segments};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Numeric {
    Int,
    Float,
}

/// Parameters and result of a call or an action.
pub(super) struct Signature {
    parameters: Vec<Parameter>,
    rest: Option<Parameter>,
    result_type: Option<TypeDef>,
}

impl From<CallSymbol> for Signature {
    fn from(call: CallSymbol) -> Self {
        Self {
            parameters: call.parameters,
            rest: call.rest,
            result_type: call.result_type,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Comparable {
    Bool,
    Int,
    Float,
    Char,
}

impl CompilerDriver {
    pub(super) fn compile_literal(
        &mut self,
        archetype: &Archetype,
        node: NodeId,
        class: AstClass,
    ) -> Result<ChildResult> {
        let type_def = match class {
            AstClass::Nil => {
                self.emit(Opcode::Nil)?;
                self.fundamental(Fundamental::Nil)
            }
            AstClass::Undef => {
                self.emit(Opcode::Undef)?;
                self.fundamental(Fundamental::Undef)
            }
            AstClass::True | AstClass::False => {
                self.emit(if class == AstClass::True { Opcode::True } else { Opcode::False })?;
                self.fundamental(Fundamental::Bool)
            }
            AstClass::Integer => {
                let text = archetype.ensure_attr(node, VALUE)?;
                let value: i64 = text
                    .trim()
                    .parse()
                    .map_err(|_| CompilerError::literal(format!("`{text}` is not an integer")))?;
                self.emit_with(Opcode::I64, PendingOperand::I64(value))?;
                self.fundamental(Fundamental::Int)
            }
            AstClass::Float => {
                let text = archetype.ensure_attr(node, VALUE)?;
                let value: f64 = text
                    .trim()
                    .parse()
                    .map_err(|_| CompilerError::literal(format!("`{text}` is not a float")))?;
                self.emit_with(Opcode::Dbl, PendingOperand::Dbl(value))?;
                self.fundamental(Fundamental::Float)
            }
            AstClass::Char => {
                let text = archetype.ensure_attr(node, VALUE)?;
                let mut chars = text.chars();
                let (Some(c), None) = (chars.next(), chars.next()) else {
                    return Err(CompilerError::literal(format!("`{text}` is not one character")));
                };
                self.emit_with(Opcode::Chr, PendingOperand::Chr(c))?;
                self.fundamental(Fundamental::Char)
            }
            AstClass::String => {
                let text = archetype.ensure_attr(node, VALUE)?.to_owned();
                self.emit_with(
                    Opcode::String,
                    PendingOperand::Literal(LiteralValue::Utf8(text)),
                )?;
                self.fundamental(Fundamental::String)
            }
            other => {
                return Err(CompilerError::invariant(format!("{other} is not a literal")));
            }
        };
        Ok(Some(type_def))
    }

    fn operands(&self, frame: &Frame, arity: usize) -> Result<Vec<TypeDef>> {
        if frame.results.len() != arity {
            return Err(CompilerError::syntax(format!(
                "{} takes {arity} operand(s), found {}",
                frame.class,
                frame.results.len()
            )));
        }
        frame
            .results
            .iter()
            .map(|r| self.value_of(r, &format!("operand of {}", frame.class)))
            .collect()
    }

    fn numeric_kind(&self, type_def: &TypeDef) -> Option<Numeric> {
        if self.is(Fundamental::Int, type_def) {
            Some(Numeric::Int)
        } else if self.is(Fundamental::Float, type_def) {
            Some(Numeric::Float)
        } else {
            None
        }
    }

    /// Numeric type both operands share; `Any` takes the other side's type.
    fn shared_numeric(&self, class: AstClass, left: &TypeDef, right: &TypeDef) -> Result<Numeric> {
        let any = |t: &TypeDef| self.is(Fundamental::Any, t);
        match (self.numeric_kind(left), self.numeric_kind(right)) {
            (Some(l), Some(r)) if l == r => Ok(l),
            (Some(l), None) if any(right) => Ok(l),
            (None, Some(r)) if any(left) => Ok(r),
            (Some(_), _) => Err(mismatch(left, right)),
            (None, _) if any(left) && any(right) => Err(CompilerError::syntax(format!(
                "cannot tell whether {class} operands are Int or Float"
            ))),
            (None, _) => Err(CompilerError::syntax(format!(
                "{class} needs Int or Float operands, found `{left}`"
            ))),
        }
    }

    fn arithmetic_opcode(class: AstClass, numeric: Numeric) -> Result<Opcode> {
        let opcode = match (class, numeric) {
            (AstClass::Add | AstClass::InplaceAdd, Numeric::Int) => Opcode::I64Add,
            (AstClass::Sub | AstClass::InplaceSub, Numeric::Int) => Opcode::I64Sub,
            (AstClass::Mul | AstClass::InplaceMul, Numeric::Int) => Opcode::I64Mul,
            (AstClass::Div | AstClass::InplaceDiv, Numeric::Int) => Opcode::I64Div,
            (AstClass::Neg, Numeric::Int) => Opcode::I64Neg,
            (AstClass::Add | AstClass::InplaceAdd, Numeric::Float) => Opcode::DblAdd,
            (AstClass::Sub | AstClass::InplaceSub, Numeric::Float) => Opcode::DblSub,
            (AstClass::Mul | AstClass::InplaceMul, Numeric::Float) => Opcode::DblMul,
            (AstClass::Div | AstClass::InplaceDiv, Numeric::Float) => Opcode::DblDiv,
            (AstClass::Neg, Numeric::Float) => Opcode::DblNeg,
            (other, _) => {
                return Err(CompilerError::invariant(format!("{other} is not arithmetic")));
            }
        };
        Ok(opcode)
    }

    fn numeric_type(&self, numeric: Numeric) -> TypeDef {
        match numeric {
            Numeric::Int => self.fundamental(Fundamental::Int),
            Numeric::Float => self.fundamental(Fundamental::Float),
        }
    }

    pub(super) fn compile_arithmetic(&mut self, frame: &Frame) -> Result<ChildResult> {
        let numeric = if frame.class == AstClass::Neg {
            let [operand] = <[TypeDef; 1]>::try_from(self.operands(frame, 1)?)
                .map_err(|_| CompilerError::invariant("operand count"))?;
            self.shared_numeric(frame.class, &operand, &operand)?
        } else {
            let [left, right] = <[TypeDef; 2]>::try_from(self.operands(frame, 2)?)
                .map_err(|_| CompilerError::invariant("operand count"))?;
            self.shared_numeric(frame.class, &left, &right)?
        };
        self.emit(Self::arithmetic_opcode(frame.class, numeric)?)?;
        Ok(Some(self.numeric_type(numeric)))
    }

    fn comparable(&self, type_def: &TypeDef) -> Option<Comparable> {
        [
            (Fundamental::Bool, Comparable::Bool),
            (Fundamental::Int, Comparable::Int),
            (Fundamental::Float, Comparable::Float),
            (Fundamental::Char, Comparable::Char),
        ]
        .into_iter()
        .find(|(f, _)| self.is(*f, type_def))
        .map(|(_, c)| c)
    }

    pub(super) fn compile_comparison(&mut self, frame: &Frame) -> Result<ChildResult> {
        let [left, right] = <[TypeDef; 2]>::try_from(self.operands(frame, 2)?)
            .map_err(|_| CompilerError::invariant("operand count"))?;
        let any = |t: &TypeDef| self.is(Fundamental::Any, t);
        let kind = match (self.comparable(&left), self.comparable(&right)) {
            (Some(l), Some(r)) if l == r => l,
            (Some(l), None) if any(&right) => l,
            (None, Some(r)) if any(&left) => r,
            (Some(_), _) => return Err(mismatch(&left, &right)),
            _ => {
                return Err(CompilerError::syntax(format!(
                    "{} cannot compare `{left}` and `{right}`",
                    frame.class
                )));
            }
        };
        let compare = match kind {
            Comparable::Bool => Opcode::BoolCmp,
            Comparable::Int => Opcode::I64Cmp,
            Comparable::Float => Opcode::DblCmp,
            Comparable::Char => Opcode::ChrCmp,
        };
        // Branch to `is_false` when the comparison result rules the test out.
        let unless = match frame.class {
            AstClass::IsEq => Opcode::IfNotZero,
            AstClass::IsLt => Opcode::IfGe,
            AstClass::IsLe => Opcode::IfGt,
            AstClass::IsGt => Opcode::IfLe,
            AstClass::IsGe => Opcode::IfLt,
            other => {
                return Err(CompilerError::invariant(format!("{other} is not a comparison")));
            }
        };
        let is_false = self.make_label()?;
        let end = self.make_label()?;
        self.emit(compare)?;
        self.emit_jump(unless, is_false)?;
        self.emit(Opcode::True)?;
        self.emit_jump(Opcode::Jump, end)?;
        self.place_label(is_false)?;
        self.emit(Opcode::False)?;
        self.place_label(end)?;
        Ok(Some(self.fundamental(Fundamental::Bool)))
    }

    pub(super) fn compile_logical(&mut self, frame: &Frame) -> Result<ChildResult> {
        let (arity, opcode) = match frame.class {
            AstClass::And => (2, Opcode::LogicalAnd),
            AstClass::Or => (2, Opcode::LogicalOr),
            _ => (1, Opcode::LogicalNot),
        };
        let bool_type = self.fundamental(Fundamental::Bool);
        for operand in self.operands(frame, arity)? {
            self.check_assignable(&operand, &bool_type)?;
        }
        self.emit(opcode)?;
        Ok(Some(bool_type))
    }

    /// Resolve a possibly dotted name from the current block.
    pub(super) fn resolve_name(&mut self, text: &str) -> Result<SymbolUrl> {
        let path = path_segments(text)?;
        let block = self.block()?;
        Ok(self.state.resolve_binding(block, &path)?)
    }

    fn is_field(&mut self, url: &SymbolUrl) -> Result<bool> {
        Ok(matches!(
            self.state.get_or_import_symbol(url)?.kind,
            SymbolKind::Field(_)
        ))
    }

    /// Push the receiver of the current method.
    pub(super) fn emit_this(&mut self) -> Result<SymbolUrl> {
        let class = self
            .receiver_class()?
            .ok_or_else(|| CompilerError::syntax("`this` is only available inside methods"))?;
        self.emit_with(
            Opcode::Synthetic,
            PendingOperand::Type(op_flags::SYNTHETIC_THIS),
        )?;
        Ok(class)
    }

    fn emit_load(&mut self, url: &SymbolUrl) -> Result<()> {
        let (opcode, operand) = self.state.load_operand(url)?;
        self.emit_with(opcode, operand)
    }

    pub(super) fn compile_name(&mut self, archetype: &Archetype, node: NodeId) -> Result<ChildResult> {
        let url = self.resolve_name(identifier(archetype, node)?)?;
        if self.is_field(&url)? {
            self.emit_this()?;
        }
        self.emit_load(&url)?;
        Ok(Some(self.state.symbol_type(&url)?))
    }

    pub(super) fn compile_this(&mut self) -> Result<ChildResult> {
        let class = self.emit_this()?;
        Ok(Some(TypeDef::concrete(class)))
    }

    /// Composite whose members a value of `type_def` has.
    fn member_owner(&mut self, type_def: &TypeDef) -> Result<SymbolUrl> {
        let no_members = || CompilerError::syntax(format!("values of `{type_def}` have no members"));
        let TypeDef::Concrete { url, .. } = type_def else {
            return Err(no_members());
        };
        match self.state.get_or_import_symbol(url)?.as_composite() {
            Some(_) => Ok(url.clone()),
            None => Err(no_members()),
        }
    }

    /// Type of the receiver a `Deref` member applies to.
    fn deref_receiver(&self) -> Result<TypeDef> {
        let frame = self.frame()?;
        let receiver = frame
            .results
            .first()
            .ok_or_else(|| CompilerError::invariant("member before receiver"))?;
        self.value_of(receiver, "receiver")
    }

    pub(super) fn compile_member_name(
        &mut self,
        archetype: &Archetype,
        node: NodeId,
    ) -> Result<ChildResult> {
        let name = identifier(archetype, node)?;
        let receiver = self.deref_receiver()?;
        let owner = self.member_owner(&receiver)?;
        let field = self
            .state
            .all_fields(&owner)?
            .into_iter()
            .rev()
            .find(|f| f.name() == name)
            .ok_or_else(|| AssemblerError::SymbolNotFound(format!("{owner}.{name}")))?;
        self.emit_load(&field)?;
        Ok(Some(self.state.symbol_type(&field)?))
    }

    pub(super) fn exit_deref(&mut self, frame: &Frame) -> Result<ChildResult> {
        match frame.results.as_slice() {
            [_, member] => Ok(member.clone()),
            _ => Err(CompilerError::syntax("Deref takes a receiver and a member")),
        }
    }

    pub(super) fn call_symbol(&mut self, url: &SymbolUrl) -> Result<CallSymbol> {
        self.state
            .get_or_import_symbol(url)?
            .as_call()
            .cloned()
            .ok_or_else(|| CompilerError::syntax(format!("`{}` is not callable", url.name())))
    }

    pub(super) fn enter_call(&mut self, archetype: &Archetype, node: NodeId) -> Result<Frame> {
        let target = self.resolve_name(identifier(archetype, node)?)?;
        let call = self.call_symbol(&target)?;
        let mut frame = Frame::new(node, AstClass::Call);
        if call.is_bound() {
            self.emit_this()?;
            frame.pending = 1;
        }
        let dispatch = if call.is_bound() {
            Dispatch::Virtual
        } else {
            Dispatch::Static
        };
        Ok(frame.with_state(FrameState::Call { target, dispatch }))
    }

    pub(super) fn enter_member_call(&mut self, archetype: &Archetype, node: NodeId) -> Result<Frame> {
        let name = identifier(archetype, node)?;
        let receiver = self.deref_receiver()?;
        let (target, dispatch) = self.method_of(&receiver, name)?;
        Ok(Frame::new(node, AstClass::Call).with_state(FrameState::Call { target, dispatch }))
    }

    /// Method or action `name` of values of `receiver`, with how to reach it.
    fn method_of(&mut self, receiver: &TypeDef, name: &str) -> Result<(SymbolUrl, Dispatch)> {
        let no_members = || CompilerError::syntax(format!("values of `{receiver}` have no members"));
        let TypeDef::Concrete { url: owner, .. } = receiver else {
            return Err(no_members());
        };
        let not_found = || AssemblerError::SymbolNotFound(format!("{owner}.{name}"));
        let symbol = self.state.get_or_import_symbol(owner)?;
        match &symbol.kind {
            SymbolKind::Concept(concept) => {
                let action = concept.actions.get(name).cloned().ok_or_else(not_found)?;
                Ok((action, Dispatch::Concept))
            }
            SymbolKind::Existential(_) => {
                let method = self.state.find_method(owner, name)?.ok_or_else(not_found)?;
                Ok((method, Dispatch::Existential))
            }
            _ if symbol.as_composite().is_some() => {
                let method = self.state.find_method(owner, name)?.ok_or_else(not_found)?;
                Ok((method, Dispatch::Virtual))
            }
            _ => Err(no_members()),
        }
    }

    pub(super) fn signature(&mut self, url: &SymbolUrl) -> Result<Signature> {
        match &self.state.get_or_import_symbol(url)?.kind {
            SymbolKind::Call(call) => Ok(Signature::from(call.clone())),
            SymbolKind::Action(action) => Ok(Signature {
                parameters: action.parameters.clone(),
                rest: action.rest.clone(),
                result_type: action.result_type.clone(),
            }),
            _ => Err(CompilerError::syntax(format!("`{}` is not callable", url.name()))),
        }
    }

    /// Check call arguments against `call`'s parameters and return the count.
    pub(super) fn check_arguments(&self, call: &Signature, name: &str, frame: &Frame) -> Result<u16> {
        let args = frame
            .results
            .iter()
            .map(|r| self.value_of(r, "argument"))
            .collect::<Result<Vec<_>>>()?;
        let arity_ok = match &call.rest {
            Some(_) => args.len() >= call.parameters.len(),
            None => args.len() == call.parameters.len(),
        };
        if !arity_ok {
            return Err(CompilerError::syntax(format!(
                "`{name}` takes {} argument(s), found {}",
                call.parameters.len(),
                args.len()
            )));
        }
        for (i, arg) in args.iter().enumerate() {
            let param = call.parameters.get(i).or(call.rest.as_ref());
            if let Some(param) = param {
                self.check_assignable(arg, &param.type_def)?;
            }
        }
        u16::try_from(args.len()).map_err(|_| CompilerError::syntax(format!("too many arguments to `{name}`")))
    }

    pub(super) fn exit_call(&mut self, frame: &Frame) -> Result<ChildResult> {
        let FrameState::Call { target, dispatch } = &frame.state else {
            return Err(CompilerError::invariant("call frame without target"));
        };
        let call = self.signature(target)?;
        let argc = self.check_arguments(&call, target.name(), frame)?;
        self.emit_with(
            dispatch.opcode(),
            PendingOperand::Invoke {
                flags: 0,
                url: target.clone(),
                placement: argc,
            },
        )?;
        let result = call
            .result_type
            .unwrap_or_else(|| self.fundamental(Fundamental::Any));
        Ok(Some(result))
    }

    pub(super) fn enter_new(&mut self, archetype: &Archetype, node: NodeId) -> Result<Frame> {
        let text = archetype.ensure_attr(node, TYPE)?;
        let class = self.resolve_name(text)?;
        let symbol = self.state.get_or_import_symbol(&class)?;
        let (new_type, ctor) = match &symbol.kind {
            SymbolKind::Class(c) if !c.is_abstract => (op_flags::NEW_CLASS, c.ctor.clone()),
            SymbolKind::Struct(c) => (op_flags::NEW_STRUCT, c.ctor.clone()),
            SymbolKind::Instance(_) | SymbolKind::Enum(_) => {
                return Err(CompilerError::syntax(format!(
                    "`{text}` is a singleton and is referred to by name"
                )));
            }
            _ => (op_flags::NEW_CLASS, None),
        };
        let ctor = ctor
            .ok_or_else(|| CompilerError::syntax(format!("`{text}` is not a constructible class")))?;
        Ok(Frame::new(node, AstClass::New).with_state(FrameState::New {
            class,
            ctor,
            new_type,
        }))
    }

    pub(super) fn exit_new(&mut self, frame: &Frame) -> Result<ChildResult> {
        let FrameState::New {
            class,
            ctor,
            new_type,
        } = &frame.state
        else {
            return Err(CompilerError::invariant("new frame without class"));
        };
        let call = self.signature(ctor)?;
        let argc = self.check_arguments(&call, class.name(), frame)?;
        self.emit_with(
            Opcode::New,
            PendingOperand::Invoke {
                flags: op_flags::make_new_flags(*new_type, 0),
                url: class.clone(),
                placement: argc,
            },
        )?;
        Ok(Some(TypeDef::concrete(class.clone())))
    }

    pub(super) fn enter_set(&mut self, archetype: &Archetype, node: NodeId) -> Result<Frame> {
        let target = self.resolve_name(identifier(archetype, node)?)?;
        let field = self.is_field(&target)?;
        let mut frame = Frame::new(node, AstClass::Set);
        if field {
            self.emit_this()?;
            frame.pending = 1;
        }
        Ok(frame.with_state(FrameState::Assign { target, field }))
    }

    fn store(&mut self, target: &SymbolUrl, value: &TypeDef, initializing: bool) -> Result<()> {
        let target_type = self.state.symbol_type(target)?;
        self.check_assignable(value, &target_type)?;
        let operand = self.state.store_operand(target, initializing)?;
        self.emit_with(Opcode::Store, operand)
    }

    /// Constructors may set fields declared with `Val`.
    fn in_constructor(&self) -> Result<bool> {
        Ok(self.contexts.current_call()?.name() == CTOR_NAME)
    }

    pub(super) fn exit_set(&mut self, frame: &Frame) -> Result<ChildResult> {
        let FrameState::Assign { target, field } = &frame.state else {
            return Err(CompilerError::invariant("set frame without target"));
        };
        let [value] = <[TypeDef; 1]>::try_from(self.operands(frame, 1)?)
            .map_err(|_| CompilerError::invariant("operand count"))?;
        let initializing = *field && self.in_constructor()?;
        self.store(target, &value, initializing)?;
        Ok(None)
    }

    pub(super) fn enter_inplace(
        &mut self,
        archetype: &Archetype,
        node: NodeId,
        class: AstClass,
    ) -> Result<Frame> {
        let target = self.resolve_name(identifier(archetype, node)?)?;
        // Fail before any code is emitted for the right-hand side.
        self.state.store_operand(&target, false)?;
        let field = self.is_field(&target)?;
        let mut frame = Frame::new(node, class);
        if field {
            self.emit_this()?;
            self.emit(Opcode::Dup)?;
            frame.pending = 1;
        }
        self.emit_load(&target)?;
        frame.pending += 1;
        Ok(frame.with_state(FrameState::Assign { target, field }))
    }

    pub(super) fn exit_inplace(&mut self, frame: &Frame) -> Result<ChildResult> {
        let FrameState::Assign { target, .. } = &frame.state else {
            return Err(CompilerError::invariant("assignment frame without target"));
        };
        let [value] = <[TypeDef; 1]>::try_from(self.operands(frame, 1)?)
            .map_err(|_| CompilerError::invariant("operand count"))?;
        let current = self.state.symbol_type(target)?;
        let numeric = self.shared_numeric(frame.class, &current, &value)?;
        self.emit(Self::arithmetic_opcode(frame.class, numeric)?)?;
        let result = self.numeric_type(numeric);
        self.store(target, &result, false)?;
        Ok(None)
    }
}

fn mismatch(expected: &TypeDef, actual: &TypeDef) -> CompilerError {
    AssemblerError::TypeMismatch {
        expected: expected.clone(),
        actual: actual.clone(),
    }
    .into()
}
