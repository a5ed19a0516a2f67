//! Per-opcode semantics.

use std::cmp::Ordering;

use lyric_object::{
    LEXICAL_ARGUMENT, LEXICAL_LOCAL, LinkageSection, OpCell, Opcode, Operands, op_flags,
};

use super::{BytecodeInterpreter, Flow, Step, Unwind};
use crate::data_cell::DataCell;
use crate::error::InterpreterError;
use crate::inspector::{Inspector, Interrupt};
use crate::native::TrapContext;
use crate::segment::StaticSlot;
use crate::status::StatusCode;

fn ordering(ordering: Ordering) -> DataCell {
    DataCell::I64(match ordering {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    })
}

fn bad_operands(cell: &OpCell) -> Unwind {
    Unwind::Fatal(InterpreterError::operand(format!(
        "{} at {} has malformed operands",
        cell.opcode.mnemonic(),
        cell.offset
    )))
}

impl<I: Inspector> BytecodeInterpreter<I> {
    pub(super) fn dispatch(&mut self, cell: &OpCell, guard: usize) -> Flow<Step> {
        match cell.opcode {
            Opcode::Noop => {}
            Opcode::Nil => self.coroutine.push_data(DataCell::Nil),
            Opcode::Undef => self.coroutine.push_data(DataCell::Undef),
            Opcode::True => self.coroutine.push_data(DataCell::Bool(true)),
            Opcode::False => self.coroutine.push_data(DataCell::Bool(false)),
            Opcode::I64 => match cell.operands {
                Operands::I64(v) => self.coroutine.push_data(DataCell::I64(v)),
                _ => return Err(bad_operands(cell)),
            },
            Opcode::Dbl => match cell.operands {
                Operands::Dbl(v) => self.coroutine.push_data(DataCell::Dbl(v)),
                _ => return Err(bad_operands(cell)),
            },
            Opcode::Chr => match cell.operands {
                Operands::Chr(v) => self.coroutine.push_data(DataCell::Chr(v)),
                _ => return Err(bad_operands(cell)),
            },
            Opcode::Literal | Opcode::String => {
                let Operands::Address(index) = cell.operands else {
                    return Err(bad_operands(cell));
                };
                let value = self.segments.literal(self.coroutine.segment(), index)?;
                if cell.opcode == Opcode::String && !matches!(value, DataCell::Utf8(_)) {
                    return Err(InterpreterError::invariant(format!(
                        "literal {index} is not a string"
                    ))
                    .into());
                }
                self.coroutine.push_data(value);
            }
            Opcode::Synthetic => {
                let Operands::Type(kind) = cell.operands else {
                    return Err(bad_operands(cell));
                };
                if kind != op_flags::SYNTHETIC_THIS {
                    return Err(
                        InterpreterError::operand(format!("invalid synthetic {kind}")).into(),
                    );
                }
                let receiver = self
                    .coroutine
                    .peek_call()?
                    .receiver
                    .clone()
                    .ok_or_else(|| InterpreterError::invariant("activation has no receiver"))?;
                self.coroutine.push_data(receiver);
            }
            Opcode::Descriptor => {
                let Operands::FlagsAddress { flags, address } = cell.operands else {
                    return Err(bad_operands(cell));
                };
                let section = LinkageSection::from_u8(flags).ok_or_else(|| {
                    InterpreterError::operand(format!("invalid descriptor section {flags}"))
                })?;
                let descriptor = self
                    .segments
                    .resolve(self.coroutine.segment(), section, address)?;
                self.coroutine.push_data(DataCell::Descriptor(descriptor));
            }
            Opcode::Load => {
                let Operands::FlagsAddress { flags, address } = cell.operands else {
                    return Err(bad_operands(cell));
                };
                self.load(flags, address)?;
            }
            Opcode::Store => {
                let Operands::FlagsAddress { flags, address } = cell.operands else {
                    return Err(bad_operands(cell));
                };
                self.store(flags, address)?;
            }
            Opcode::VaLoad => {
                let index = self.pop_i64()?;
                let value = usize::try_from(index)
                    .ok()
                    .and_then(|i| self.coroutine.peek_call().ok()?.rest.get(i).cloned());
                match value {
                    Some(value) => self.coroutine.push_data(value),
                    None => {
                        return Err(self.raise_status(
                            StatusCode::IndexOutOfRange,
                            format!("no rest argument {index}"),
                        ));
                    }
                }
            }
            Opcode::VaSize => {
                let size = self.coroutine.peek_call()?.rest.len();
                self.coroutine.push_data(DataCell::I64(size as i64));
            }

            Opcode::Pop => {
                self.coroutine.pop_data()?;
            }
            Opcode::Dup => {
                let top = self.coroutine.peek_data(0)?.clone();
                self.coroutine.push_data(top);
            }
            Opcode::Pick | Opcode::Drop | Opcode::RPick | Opcode::RDrop => {
                let Operands::Offset(offset) = cell.operands else {
                    return Err(bad_operands(cell));
                };
                self.stack_op(cell.opcode, offset as usize)?;
            }

            Opcode::I64Add | Opcode::I64Sub | Opcode::I64Mul | Opcode::I64Div => {
                let rhs = self.pop_i64()?;
                let lhs = self.pop_i64()?;
                let result = match cell.opcode {
                    Opcode::I64Add => lhs.checked_add(rhs),
                    Opcode::I64Sub => lhs.checked_sub(rhs),
                    Opcode::I64Mul => lhs.checked_mul(rhs),
                    _ => {
                        if rhs == 0 {
                            return Err(self.raise_status(
                                StatusCode::DivisionByZero,
                                format!("{lhs} / 0"),
                            ));
                        }
                        lhs.checked_div(rhs)
                    }
                };
                let value = result.ok_or_else(|| {
                    self.raise_status(
                        StatusCode::ArithmeticOverflow,
                        format!("{} overflows with {lhs} and {rhs}", cell.opcode.mnemonic()),
                    )
                })?;
                self.coroutine.push_data(DataCell::I64(value));
            }
            Opcode::I64Neg => {
                let v = self.pop_i64()?;
                let value = v.checked_neg().ok_or_else(|| {
                    self.raise_status(StatusCode::ArithmeticOverflow, format!("-({v}) overflows"))
                })?;
                self.coroutine.push_data(DataCell::I64(value));
            }
            Opcode::DblAdd | Opcode::DblSub | Opcode::DblMul | Opcode::DblDiv => {
                let rhs = self.pop_dbl()?;
                let lhs = self.pop_dbl()?;
                let value = match cell.opcode {
                    Opcode::DblAdd => lhs + rhs,
                    Opcode::DblSub => lhs - rhs,
                    Opcode::DblMul => lhs * rhs,
                    _ => lhs / rhs,
                };
                self.coroutine.push_data(DataCell::Dbl(value));
            }
            Opcode::DblNeg => {
                let v = self.pop_dbl()?;
                self.coroutine.push_data(DataCell::Dbl(-v));
            }

            Opcode::BoolCmp => {
                let rhs = self.pop_bool()?;
                let lhs = self.pop_bool()?;
                self.coroutine.push_data(ordering(lhs.cmp(&rhs)));
            }
            Opcode::I64Cmp => {
                let rhs = self.pop_i64()?;
                let lhs = self.pop_i64()?;
                self.coroutine.push_data(ordering(lhs.cmp(&rhs)));
            }
            Opcode::DblCmp => {
                let rhs = self.pop_dbl()?;
                let lhs = self.pop_dbl()?;
                let order = lhs.partial_cmp(&rhs).ok_or_else(|| {
                    self.raise_status(
                        StatusCode::InvalidOperand,
                        format!("{lhs} and {rhs} are unordered"),
                    )
                })?;
                self.coroutine.push_data(ordering(order));
            }
            Opcode::ChrCmp => {
                let rhs = self.pop_chr()?;
                let lhs = self.pop_chr()?;
                self.coroutine.push_data(ordering(lhs.cmp(&rhs)));
            }
            Opcode::TypeCmp => {
                let rhs = self.pop_operand("Type", |c| match c {
                    DataCell::Type(t) => Some(*t),
                    _ => None,
                })?;
                let lhs = self.pop_operand("Type", |c| match c {
                    DataCell::Type(t) => Some(*t),
                    _ => None,
                })?;
                let comparison = self.types.compare(&mut self.segments, lhs, rhs)?;
                self.coroutine
                    .push_data(DataCell::I64(comparison.as_i64()));
            }
            Opcode::LogicalAnd | Opcode::LogicalOr => {
                let rhs = self.pop_bool()?;
                let lhs = self.pop_bool()?;
                let value = if cell.opcode == Opcode::LogicalAnd {
                    lhs && rhs
                } else {
                    lhs || rhs
                };
                self.coroutine.push_data(DataCell::Bool(value));
            }
            Opcode::LogicalNot => {
                let v = self.pop_bool()?;
                self.coroutine.push_data(DataCell::Bool(!v));
            }

            Opcode::IfNil | Opcode::IfNotNil => {
                let nil = self.coroutine.pop_data()?.is_nil();
                self.branch_if(cell, nil == (cell.opcode == Opcode::IfNil))?;
            }
            Opcode::IfTrue | Opcode::IfFalse => {
                let v = self.pop_bool()?;
                self.branch_if(cell, v == (cell.opcode == Opcode::IfTrue))?;
            }
            Opcode::IfZero | Opcode::IfNotZero | Opcode::IfGt | Opcode::IfGe | Opcode::IfLt | Opcode::IfLe => {
                let v = self.pop_i64()?;
                let taken = match cell.opcode {
                    Opcode::IfZero => v == 0,
                    Opcode::IfNotZero => v != 0,
                    Opcode::IfGt => v > 0,
                    Opcode::IfGe => v >= 0,
                    Opcode::IfLt => v < 0,
                    _ => v <= 0,
                };
                self.branch_if(cell, taken)?;
            }
            Opcode::Jump => self.branch_if(cell, true)?,

            Opcode::CallStatic | Opcode::CallVirtual | Opcode::CallConcept | Opcode::CallExistential => {
                let Operands::FlagsAddressPlacement {
                    flags,
                    address,
                    placement,
                } = cell.operands
                else {
                    return Err(bad_operands(cell));
                };
                self.call(cell.opcode, flags, address, placement as usize)?;
            }
            Opcode::Trap => {
                let Operands::FlagsAddress { flags, address } = cell.operands else {
                    return Err(bad_operands(cell));
                };
                self.trap(flags, address)?;
            }
            Opcode::Return => return self.return_from_call(guard),
            Opcode::New => {
                let Operands::FlagsAddressPlacement {
                    flags,
                    address,
                    placement,
                } = cell.operands
                else {
                    return Err(bad_operands(cell));
                };
                self.new_instance(flags, address, placement as usize)?;
            }
            Opcode::TypeOf => {
                let value = self.coroutine.pop_data()?;
                let ty = self.types.type_of(&self.segments, &value)?;
                self.coroutine.push_data(DataCell::Type(ty));
            }
            Opcode::Raise => {
                let value = self.coroutine.pop_data()?;
                return Err(Unwind::Raise(value));
            }

            Opcode::Interrupt => {
                if self.coroutine.guard_depth() > 0 {
                    return Err(InterpreterError::invariant(
                        "INTERRUPT inside a nested run",
                    )
                    .into());
                }
                let value = self.coroutine.pop_data()?;
                self.inspector.on_interrupt(&Interrupt::Instruction(value));
                return Ok(Step::Suspend);
            }
            Opcode::Halt => {
                let value = if self.coroutine.data_len() > 0 {
                    self.coroutine.pop_data()?
                } else {
                    DataCell::Nil
                };
                return Err(Unwind::Halt(value));
            }
            Opcode::Abort => return Err(InterpreterError::Aborted.into()),
        }
        Ok(Step::Continue)
    }

    fn branch_if(&mut self, cell: &OpCell, taken: bool) -> Flow<()> {
        if taken {
            let target = cell.jump_target().ok_or_else(|| bad_operands(cell))?;
            self.coroutine.jump(target);
        }
        Ok(())
    }

    /// Pop a value of the expected kind, raising `InvalidOperand` otherwise.
    fn pop_operand<T>(
        &mut self,
        expected: &str,
        extract: impl FnOnce(&DataCell) -> Option<T>,
    ) -> Flow<T> {
        let value = self.coroutine.pop_data()?;
        match extract(&value) {
            Some(v) => Ok(v),
            None => Err(self.raise_status(
                StatusCode::InvalidOperand,
                format!("expected {expected}, found {}", value.kind_name()),
            )),
        }
    }

    fn pop_i64(&mut self) -> Flow<i64> {
        self.pop_operand("Int", DataCell::as_i64)
    }

    fn pop_dbl(&mut self) -> Flow<f64> {
        self.pop_operand("Float", DataCell::as_dbl)
    }

    fn pop_bool(&mut self) -> Flow<bool> {
        self.pop_operand("Bool", DataCell::as_bool)
    }

    fn pop_chr(&mut self) -> Flow<char> {
        self.pop_operand("Char", DataCell::as_chr)
    }

    /// `PICK`/`DROP` address the stack from the activation's base,
    /// `RPICK`/`RDROP` from the top.
    fn stack_op(&mut self, opcode: Opcode, offset: usize) -> Flow<()> {
        let index = match opcode {
            Opcode::Pick | Opcode::Drop => self.coroutine.peek_call()?.base + offset,
            _ => self
                .coroutine
                .data_len()
                .checked_sub(offset + 1)
                .ok_or_else(|| InterpreterError::stack(format!("no cell {offset} below top")))?,
        };
        match opcode {
            Opcode::Pick | Opcode::RPick => {
                let value = self.coroutine.data(index)?.clone();
                self.coroutine.push_data(value);
            }
            _ => {
                self.coroutine.remove_data(index)?;
            }
        }
        Ok(())
    }

    /// Absolute data stack index of an argument, local or lexical slot.
    fn slot_index(&mut self, flags: u8, address: u32) -> Flow<usize> {
        let frame = self.coroutine.peek_call()?;
        let offset = address as usize;
        match flags {
            op_flags::ARGUMENT if offset < frame.num_arguments() => Ok(frame.base + offset),
            op_flags::LOCAL if offset < frame.num_locals() => Ok(frame.locals_base() + offset),
            op_flags::LEXICAL => {
                let lexical = *frame.proc.lexicals.get(offset).ok_or_else(|| {
                    InterpreterError::invariant(format!("no lexical {offset}"))
                })?;
                let segment = frame.segment();
                let activation = self.segments.resolve(
                    segment,
                    LinkageSection::Call,
                    lexical.activation_call,
                )?;
                let calls = self.coroutine.calls();
                let enclosing = calls[..calls.len().saturating_sub(1)]
                    .iter()
                    .rev()
                    .find(|call| call.call == activation)
                    .ok_or_else(|| {
                        InterpreterError::invariant(format!(
                            "no active frame of {activation} for lexical {offset}"
                        ))
                    })?;
                let target = lexical.target_offset as usize;
                match lexical.lexical_target {
                    LEXICAL_ARGUMENT => Ok(enclosing.base + target),
                    LEXICAL_LOCAL => Ok(enclosing.locals_base() + target),
                    other => {
                        Err(InterpreterError::operand(format!("invalid lexical target {other}"))
                            .into())
                    }
                }
            }
            op_flags::ARGUMENT | op_flags::LOCAL => Err(InterpreterError::invariant(format!(
                "slot {offset} out of range for {}",
                frame.call
            ))
            .into()),
            other => Err(InterpreterError::operand(format!("invalid slot flags {other}")).into()),
        }
    }

    fn load(&mut self, flags: u8, address: u32) -> Flow<()> {
        let segment = self.coroutine.segment();
        let value = match flags {
            op_flags::ARGUMENT | op_flags::LOCAL | op_flags::LEXICAL => {
                let index = self.slot_index(flags, address)?;
                self.coroutine.data(index)?.clone()
            }
            op_flags::FIELD => {
                let key = self
                    .segments
                    .resolve(segment, LinkageSection::Field, address)?;
                let receiver = self.coroutine.pop_data()?;
                let Some(handle) = receiver.as_handle() else {
                    return Err(self.raise_status(
                        StatusCode::InvalidOperand,
                        format!("cannot load a field of {}", receiver.kind_name()),
                    ));
                };
                match handle.get_field(&key)? {
                    Some(value) => value,
                    None => {
                        return Err(self.raise_status(
                            StatusCode::InvalidOperand,
                            format!("{receiver} has no field {key}"),
                        ));
                    }
                }
            }
            op_flags::STATIC => {
                let descriptor = self
                    .segments
                    .resolve(segment, LinkageSection::Static, address)?;
                self.load_static(descriptor)?
            }
            op_flags::INSTANCE | op_flags::ENUM => {
                let section = if flags == op_flags::INSTANCE {
                    LinkageSection::Instance
                } else {
                    LinkageSection::Enum
                };
                let descriptor = self.segments.resolve(segment, section, address)?;
                self.load_singleton(descriptor)?
            }
            other => {
                return Err(InterpreterError::operand(format!("invalid LOAD flags {other}")).into());
            }
        };
        self.coroutine.push_data(value);
        Ok(())
    }

    fn store(&mut self, flags: u8, address: u32) -> Flow<()> {
        let segment = self.coroutine.segment();
        match flags {
            op_flags::ARGUMENT | op_flags::LOCAL | op_flags::LEXICAL => {
                let index = self.slot_index(flags, address)?;
                let value = self.coroutine.pop_data()?;
                self.coroutine.set_data(index, value)?;
            }
            op_flags::FIELD => {
                let key = self
                    .segments
                    .resolve(segment, LinkageSection::Field, address)?;
                let value = self.coroutine.pop_data()?;
                let receiver = self.coroutine.pop_data()?;
                let Some(handle) = receiver.as_handle() else {
                    return Err(self.raise_status(
                        StatusCode::InvalidOperand,
                        format!("cannot store a field of {}", receiver.kind_name()),
                    ));
                };
                if let Err(error) = handle.set_field(key, value) {
                    return Err(self.raise_status(StatusCode::InvalidOperand, error.to_string()));
                }
            }
            op_flags::STATIC => {
                let descriptor = self
                    .segments
                    .resolve(segment, LinkageSection::Static, address)?;
                let value = self.coroutine.pop_data()?;
                self.segments
                    .set_static(descriptor, StaticSlot::Ready(value))?;
            }
            other => {
                return Err(
                    InterpreterError::operand(format!("invalid STORE flags {other}")).into(),
                );
            }
        }
        Ok(())
    }

    fn call(&mut self, opcode: Opcode, flags: u8, address: u32, argc: usize) -> Flow<()> {
        let segment = self.coroutine.segment();
        match opcode {
            Opcode::CallStatic => {
                let target = self
                    .segments
                    .resolve(segment, LinkageSection::Call, address)?;
                let receiver = if op_flags::call_flags(flags) & op_flags::CALL_RECEIVER_FOLLOWS != 0 {
                    Some(self.take_receiver(argc)?)
                } else {
                    None
                };
                self.enter_call(target, argc, receiver, None)
            }
            Opcode::CallVirtual => {
                let target = self
                    .segments
                    .resolve(segment, LinkageSection::Call, address)?;
                let receiver = self.take_receiver(argc)?;
                let target = self.virtual_target(&receiver, target)?;
                self.enter_call(target, argc, Some(receiver), None)
            }
            Opcode::CallConcept => {
                let action = self
                    .segments
                    .resolve(segment, LinkageSection::Action, address)?;
                let receiver = self.take_receiver(argc)?;
                let target = self.concept_target(&receiver, action)?;
                self.enter_call(target, argc, Some(receiver), None)
            }
            _ => {
                let target = self
                    .segments
                    .resolve(segment, LinkageSection::Call, address)?;
                let receiver = self.take_receiver(argc)?;
                self.enter_call(target, argc, Some(receiver), None)
            }
        }
    }

    fn trap(&mut self, flags: u8, address: u32) -> Flow<()> {
        let index = if flags & op_flags::TRAP_INDEX_FOLLOWS != 0 {
            let index = self.pop_i64()?;
            u32::try_from(index)
                .map_err(|_| InterpreterError::stack(format!("invalid trap index {index}")))?
        } else {
            address
        };
        let trap = self.segments.trap(self.coroutine.segment(), index)?;
        let mut context = TrapContext::new(&mut self.coroutine, &self.heap);
        trap(&mut context)?;
        match context.into_raised() {
            Some(value) => Err(Unwind::Raise(value)),
            None => Ok(()),
        }
    }
}
