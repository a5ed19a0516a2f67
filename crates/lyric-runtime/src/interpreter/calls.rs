//! Activations: entering and leaving procs, method dispatch, construction,
//! lazily initialized statics and singletons.

use lyric_object::{INVALID_ADDRESS, LinkageSection, op_flags};

use super::{BytecodeInterpreter, Exit, Flow, Step, Unwind};
use crate::coroutine::CallCell;
use crate::data_cell::{DataCell, DescriptorRef};
use crate::error::{InterpreterError, Result};
use crate::heap::RefHandle;
use crate::inspector::Inspector;
use crate::refs::InstanceRef;
use crate::segment::StaticSlot;
use crate::status::StatusCode;

/// Bound on superclass chains walked during dispatch and construction.
const MAX_ANCESTRY: usize = 256;

fn last_segment(path: &str) -> &str {
    path.rsplit('#').next().unwrap_or(path)
}

impl<I: Inspector> BytecodeInterpreter<I> {
    /// Push an activation of `call` whose `argc` arguments are on top of the
    /// data stack and transfer control to its first instruction.
    ///
    /// Arguments beyond the declared parameters move into the rest list.
    pub(super) fn enter_call(
        &mut self,
        call: DescriptorRef,
        argc: usize,
        receiver: Option<DataCell>,
        constructed: Option<DataCell>,
    ) -> Flow<()> {
        if self.coroutine.call_depth() >= self.limits.call_depth {
            return Err(InterpreterError::CallDepthExceeded(self.limits.call_depth).into());
        }
        let proc = self.segments.proc(call)?;
        let has_rest = self.segments.call(call)?.rest.is_some();
        let params = proc.num_arguments as usize;

        if argc < params {
            return Err(InterpreterError::invariant(format!(
                "{} expects {params} arguments, got {argc}",
                self.segments.descriptor_path(call)?
            ))
            .into());
        }
        let rest = if argc > params {
            if !has_rest {
                return Err(InterpreterError::invariant(format!(
                    "{} takes no rest arguments, got {argc}",
                    self.segments.descriptor_path(call)?
                ))
                .into());
            }
            self.coroutine.pop_data_n(argc - params)?
        } else {
            Vec::new()
        };

        let base = self
            .coroutine
            .data_len()
            .checked_sub(params)
            .ok_or_else(|| InterpreterError::stack("missing call arguments"))?;
        for _ in 0..proc.num_locals {
            self.coroutine.push_data(DataCell::Undef);
        }

        let code_offset = proc.code_offset;
        self.coroutine.push_call(CallCell {
            call,
            proc,
            base,
            rest,
            receiver,
            constructed,
            return_segment: self.coroutine.segment(),
            return_ip: self.coroutine.ip(),
        });
        self.coroutine.transfer(call.segment, code_offset);
        Ok(())
    }

    /// `RETURN`: pop the activation and hand its result to the caller.
    pub(super) fn return_from_call(&mut self, guard: usize) -> Flow<Step> {
        let value = self.coroutine.pop_data()?;
        let frame = self.coroutine.pop_call()?;
        self.coroutine.truncate_data(frame.base);
        let result = frame.constructed.unwrap_or(value);

        let depth = self.coroutine.call_depth();
        if depth < guard {
            return Err(InterpreterError::invariant("returned below the stack guard").into());
        }
        if depth == guard {
            return Ok(Step::Return(result));
        }
        self.coroutine
            .transfer(frame.return_segment, frame.return_ip);
        self.coroutine.push_data(result);
        Ok(Step::Continue)
    }

    /// Remove the receiver sitting below `argc` arguments.
    pub(super) fn take_receiver(&mut self, argc: usize) -> Flow<DataCell> {
        let index = self
            .coroutine
            .data_len()
            .checked_sub(argc + 1)
            .ok_or_else(|| InterpreterError::stack("missing call receiver"))?;
        Ok(self.coroutine.remove_data(index)?)
    }

    fn receiver_class(&self, receiver: &DataCell) -> Result<Option<DescriptorRef>> {
        match receiver {
            DataCell::Ref(handle) => handle.with(|object| object.class()),
            _ => Ok(None),
        }
    }

    /// Call named `name` among the methods of `class` or its ancestors.
    fn find_method(&mut self, class: DescriptorRef, name: &str) -> Result<Option<DescriptorRef>> {
        let mut current = class;
        for _ in 0..MAX_ANCESTRY {
            let composite = self.segments.composite(current)?;
            let segment = self.segments.segment(current.segment)?;
            let mut found = None;
            for method in &composite.methods {
                if segment.string(method.name)? == name {
                    found = Some(method.call);
                    break;
                }
            }
            let superclass = composite.superclass;

            if let Some(call) = found {
                return Ok(Some(self.segments.resolve(
                    current.segment,
                    LinkageSection::Call,
                    call,
                )?));
            }
            if superclass == INVALID_ADDRESS {
                return Ok(None);
            }
            current = self
                .segments
                .resolve(current.segment, current.section, superclass)?;
        }
        Err(InterpreterError::invariant(format!(
            "superclass chain of {class} does not terminate"
        )))
    }

    /// Override of `target` for the receiver's class, or `target` itself.
    pub(super) fn virtual_target(
        &mut self,
        receiver: &DataCell,
        target: DescriptorRef,
    ) -> Result<DescriptorRef> {
        let Some(class) = self.receiver_class(receiver)? else {
            return Ok(target);
        };
        let name = last_segment(self.segments.descriptor_path(target)?).to_owned();
        Ok(self.find_method(class, &name)?.unwrap_or(target))
    }

    /// Implementation of `action` on the receiver's class.
    pub(super) fn concept_target(
        &mut self,
        receiver: &DataCell,
        action: DescriptorRef,
    ) -> Flow<DescriptorRef> {
        let name = last_segment(self.segments.descriptor_path(action)?).to_owned();
        let found = match self.receiver_class(receiver)? {
            Some(class) => self.find_method(class, &name)?,
            None => None,
        };
        found.ok_or_else(|| {
            self.raise_status(
                StatusCode::Unimplemented,
                format!("{} does not implement `{name}`", receiver.kind_name()),
            )
        })
    }

    /// Allocate an instance of `class` with every declared field, superclass
    /// fields first, set to `undef`.
    fn construct(&mut self, class: DescriptorRef) -> Flow<RefHandle> {
        let mut chain = Vec::new();
        let mut current = Some(class);
        while let Some(composite) = current {
            if chain.len() >= MAX_ANCESTRY {
                return Err(InterpreterError::invariant(format!(
                    "superclass chain of {class} does not terminate"
                ))
                .into());
            }
            chain.push(composite);
            let superclass = self.segments.composite(composite)?.superclass;
            current = if superclass == INVALID_ADDRESS {
                None
            } else {
                Some(
                    self.segments
                        .resolve(composite.segment, composite.section, superclass)?,
                )
            };
        }
        if self.segments.composite(class)?.is_abstract {
            return Err(InterpreterError::invariant(format!(
                "cannot construct abstract {}",
                self.segments.descriptor_path(class)?
            ))
            .into());
        }

        let mut instance = InstanceRef::new(class, self.segments.descriptor_path(class)?);
        for composite in chain.iter().rev() {
            let fields = self.segments.composite(*composite)?.fields.clone();
            for field in fields {
                let key = self
                    .segments
                    .resolve(composite.segment, LinkageSection::Field, field)?;
                let name = last_segment(self.segments.descriptor_path(key)?).to_owned();
                instance.declare_field(key, name);
            }
        }
        Ok(self.heap.allocate(instance)?)
    }

    /// `NEW`: construct an instance and enter its constructor, which
    /// returns the instance.
    pub(super) fn new_instance(&mut self, flags: u8, address: u32, argc: usize) -> Flow<()> {
        let section = match op_flags::new_type(flags) {
            op_flags::NEW_CLASS => LinkageSection::Class,
            op_flags::NEW_ENUM => LinkageSection::Enum,
            op_flags::NEW_INSTANCE => LinkageSection::Instance,
            op_flags::NEW_STRUCT => LinkageSection::Struct,
            other => {
                return Err(InterpreterError::operand(format!("invalid NEW type {other}")).into());
            }
        };
        let class = self
            .segments
            .resolve(self.coroutine.segment(), section, address)?;
        let instance = DataCell::Ref(self.construct(class)?);

        let ctor = self.segments.composite(class)?.ctor;
        if ctor == INVALID_ADDRESS {
            if argc > 0 {
                return Err(InterpreterError::invariant(format!(
                    "{} has no constructor but got {argc} arguments",
                    self.segments.descriptor_path(class)?
                ))
                .into());
            }
            self.coroutine.push_data(instance);
            return Ok(());
        }
        let ctor = self
            .segments
            .resolve(class.segment, LinkageSection::Call, ctor)?;
        self.enter_call(ctor, argc, Some(instance.clone()), Some(instance))
    }

    /// Value of a static, running its initializer on first load.
    pub(super) fn load_static(&mut self, descriptor: DescriptorRef) -> Flow<DataCell> {
        match self.segments.static_slot(descriptor)? {
            StaticSlot::Ready(value) => return Ok(value.clone()),
            StaticSlot::Initializing => {
                return Err(InterpreterError::invariant(format!(
                    "static {} is read while it initializes",
                    self.segments.descriptor_path(descriptor)?
                ))
                .into());
            }
            StaticSlot::Uninitialized => {}
        }

        let initializer = self.segments.static_descriptor(descriptor)?.initializer;
        if initializer == INVALID_ADDRESS {
            return Ok(DataCell::Undef);
        }
        let initializer =
            self.segments
                .resolve(descriptor.segment, LinkageSection::Call, initializer)?;

        self.segments
            .set_static(descriptor, StaticSlot::Initializing)?;
        match self.run_nested(initializer, Vec::new(), None, None) {
            Ok(value) => {
                self.segments
                    .set_static(descriptor, StaticSlot::Ready(value.clone()))?;
                Ok(value)
            }
            Err(unwind) => {
                self.segments
                    .set_static(descriptor, StaticSlot::Uninitialized)?;
                Err(unwind)
            }
        }
    }

    /// The singleton of an instance or enum, constructed on first load.
    pub(super) fn load_singleton(&mut self, descriptor: DescriptorRef) -> Flow<DataCell> {
        if let Some(value) = self.segments.singleton(descriptor) {
            return Ok(value.clone());
        }
        let value = DataCell::Ref(self.construct(descriptor)?);
        let ctor = self.segments.composite(descriptor)?.ctor;
        if ctor != INVALID_ADDRESS {
            let ctor = self
                .segments
                .resolve(descriptor.segment, LinkageSection::Call, ctor)?;
            self.run_nested(ctor, Vec::new(), Some(value.clone()), None)?;
        }
        self.segments.set_singleton(descriptor, value.clone())?;
        Ok(value)
    }

    /// Run `call` to completion on top of the current activation, then
    /// restore the instruction pointer.
    pub(super) fn run_nested(
        &mut self,
        call: DescriptorRef,
        arguments: Vec<DataCell>,
        receiver: Option<DataCell>,
        constructed: Option<DataCell>,
    ) -> Flow<DataCell> {
        if self.coroutine.guard_depth() >= self.limits.recursion_limit as usize {
            return Err(InterpreterError::RecursionLimitExceeded(self.limits.recursion_limit).into());
        }
        let saved_segment = self.coroutine.segment();
        let saved_ip = self.coroutine.ip();
        let saved_current = self.current;

        let depth = self.coroutine.call_depth();
        self.coroutine.push_guard(depth);
        let argc = arguments.len();
        for argument in arguments {
            self.coroutine.push_data(argument);
        }
        let result = self
            .enter_call(call, argc, receiver, constructed)
            .and_then(|()| self.execute(depth));

        let popped = self.coroutine.pop_guard();
        self.coroutine.transfer(saved_segment, saved_ip);
        self.current = saved_current;
        popped?;

        match result? {
            Exit::Returned(value) => Ok(value),
            Exit::Suspended => Err(Unwind::Fatal(InterpreterError::invariant(
                "nested run cannot suspend",
            ))),
        }
    }
}
