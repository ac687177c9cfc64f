//! Linked body execution

use std::borrow::Cow;

use weave_bytecode::{Instruction, TypeRef, UnitDescriptor};

use crate::advice::{InterceptorChain, Invocation};
use crate::descriptor::{MethodDescriptor, MethodId, TargetDescriptor};
use crate::dispatch::convert::{check_arguments, check_cast, conform_return, unbox};
use crate::dispatch::link::{LinkedBody, ReturnConversion};
use crate::error::CallError;
use crate::stats::EngineStats;
use crate::target::Target;
use crate::value::Value;

/// Everything a linked body may touch during one call
pub(crate) struct CallFrame<'a> {
    pub(crate) target: &'a dyn Target,
    pub(crate) descriptor: &'a TargetDescriptor,
    pub(crate) chains: &'a [InterceptorChain],
    pub(crate) unit: &'a UnitDescriptor,
    pub(crate) stats: Option<&'a EngineStats>,
}

enum Operand<'a> {
    Target,
    Value(Value),
    Pending {
        method: &'a MethodDescriptor,
        args: Vec<Value>,
    },
}

impl<'a> CallFrame<'a> {
    /// Run `body` for `method`; `args` must already match its parameters
    pub(crate) fn dispatch(
        &self,
        method: &'a MethodDescriptor,
        body: &LinkedBody,
        args: &'a [Value],
    ) -> Result<Value, CallError> {
        match body {
            LinkedBody::Forward => {
                if let Some(stats) = self.stats {
                    stats.record_direct_forward();
                }
                let value = self.target.invoke(method, args)?;
                Ok(conform_return(method, value)?)
            }
            LinkedBody::Chain { chain, ret } => {
                let chain = self.chain(method, *chain, 0)?;
                let value = self.run_chain(method, Cow::Borrowed(args), chain)?;
                Ok(match ret {
                    ReturnConversion::Discard => Value::Void,
                    ReturnConversion::Unbox(p) => unbox(method, *p, value)?,
                    ReturnConversion::Cast(ty) => check_cast(method, ty, value)?,
                    ReturnConversion::Passthrough => value,
                })
            }
            LinkedBody::Program(code) => self.interpret(method, code, args),
        }
    }

    fn run_chain(
        &self,
        method: &'a MethodDescriptor,
        args: Cow<'a, [Value]>,
        chain: &'a InterceptorChain,
    ) -> Result<Value, CallError> {
        if let Some(stats) = self.stats {
            stats.record_invocation();
        }
        Invocation::new(self.target, method, args, chain).run()
    }

    fn chain(
        &self,
        method: &MethodDescriptor,
        index: usize,
        offset: usize,
    ) -> Result<&'a InterceptorChain, CallError> {
        self.chains
            .get(index)
            .ok_or_else(|| malformed(method, offset, "chain slot out of range"))
    }

    fn interpret(
        &self,
        method: &'a MethodDescriptor,
        code: &[(usize, Instruction)],
        args: &'a [Value],
    ) -> Result<Value, CallError> {
        let mut stack: Vec<Operand<'a>> = Vec::with_capacity(8);

        for &(offset, instruction) in code {
            match instruction {
                Instruction::Nop => {}
                Instruction::Pop => {
                    stack
                        .pop()
                        .ok_or_else(|| malformed(method, offset, "stack underflow"))?;
                }
                Instruction::LoadTarget => stack.push(Operand::Target),
                Instruction::LoadArg(index) => {
                    let arg = args
                        .get(index as usize)
                        .cloned()
                        .ok_or_else(|| malformed(method, offset, "argument index out of range"))?;
                    stack.push(Operand::Value(arg));
                }
                Instruction::Box(p) => {
                    let value = pop_value(&mut stack, method, offset)?;
                    if !value.conforms_to(&TypeRef::Primitive(p)) {
                        return Err(malformed(method, offset, "box of a non-primitive"));
                    }
                    stack.push(Operand::Value(value));
                }
                Instruction::Unbox(p) => {
                    let value = pop_value(&mut stack, method, offset)?;
                    stack.push(Operand::Value(unbox(method, p, value)?));
                }
                Instruction::CheckCast(index) => {
                    let ty = self
                        .unit
                        .type_at(index)
                        .ok_or_else(|| malformed(method, offset, "type index out of range"))?;
                    let value = pop_value(&mut stack, method, offset)?;
                    stack.push(Operand::Value(check_cast(method, ty, value)?));
                }
                Instruction::InvokeTarget { slot, argc } => {
                    let callee = self.callee(method, slot, offset)?;
                    let call_args = pop_values(&mut stack, argc as usize, method, offset)?;
                    match stack.pop() {
                        Some(Operand::Target) => {}
                        _ => return Err(malformed(method, offset, "missing target reference")),
                    }
                    check_arguments(callee, &call_args)?;
                    if let Some(stats) = self.stats {
                        stats.record_direct_forward();
                    }
                    let value = self.target.invoke(callee, &call_args)?;
                    if !callee.ret().is_void() {
                        stack.push(Operand::Value(conform_return(callee, value)?));
                    }
                }
                Instruction::NewInvocation { slot, argc } => {
                    let callee = self.callee(method, slot, offset)?;
                    let call_args = pop_values(&mut stack, argc as usize, method, offset)?;
                    check_arguments(callee, &call_args)?;
                    stack.push(Operand::Pending {
                        method: callee,
                        args: call_args,
                    });
                }
                Instruction::DispatchChain(index) => {
                    let chain = self.chain(method, index as usize, offset)?;
                    let Some(Operand::Pending {
                        method: callee,
                        args: call_args,
                    }) = stack.pop()
                    else {
                        return Err(malformed(method, offset, "missing invocation record"));
                    };
                    let value = self.run_chain(callee, Cow::Owned(call_args), chain)?;
                    stack.push(Operand::Value(value));
                }
                Instruction::Return => return pop_value(&mut stack, method, offset),
                Instruction::ReturnVoid => return Ok(Value::Void),
            }
        }

        let end = code.last().map(|(offset, _)| *offset).unwrap_or(0);
        Err(malformed(method, end, "fell off the end of the stub"))
    }

    fn callee(
        &self,
        method: &MethodDescriptor,
        slot: u16,
        offset: usize,
    ) -> Result<&'a MethodDescriptor, CallError> {
        self.descriptor
            .method(MethodId(slot as usize))
            .ok_or_else(|| malformed(method, offset, "method slot out of range"))
    }
}

fn malformed(method: &MethodDescriptor, offset: usize, reason: &'static str) -> CallError {
    CallError::MalformedStub {
        method: method.to_string(),
        offset,
        reason,
    }
}

fn pop_value(
    stack: &mut Vec<Operand<'_>>,
    method: &MethodDescriptor,
    offset: usize,
) -> Result<Value, CallError> {
    match stack.pop() {
        Some(Operand::Value(value)) => Ok(value),
        Some(_) => Err(malformed(method, offset, "expected a value operand")),
        None => Err(malformed(method, offset, "stack underflow")),
    }
}

fn pop_values(
    stack: &mut Vec<Operand<'_>>,
    count: usize,
    method: &MethodDescriptor,
    offset: usize,
) -> Result<Vec<Value>, CallError> {
    if stack.len() < count {
        return Err(malformed(method, offset, "stack underflow"));
    }
    stack
        .split_off(stack.len() - count)
        .into_iter()
        .map(|operand| match operand {
            Operand::Value(value) => Ok(value),
            _ => Err(malformed(method, offset, "expected a value operand")),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_bytecode::UnitBuilder;

    use crate::advice::AdviceSpec;
    use crate::dispatch::link::LinkedUnit;
    use crate::target::FnTarget;

    fn descriptor() -> TargetDescriptor {
        TargetDescriptor::builder("Calc")
            .method(MethodDescriptor::new("add", vec![TypeRef::I32, TypeRef::I32], TypeRef::I32))
            .method(MethodDescriptor::new("reset", vec![], TypeRef::Void))
            .build()
    }

    fn unit_for(desc: &TargetDescriptor) -> UnitDescriptor {
        let mut builder = UnitBuilder::new("Calc$$Weave", "Calc");
        let chain = builder.add_chain().unwrap();
        let mut m = builder.begin_method(desc.methods()[0].signature().clone()).unwrap();
        m.emit_chain_invoke(chain).unwrap();
        m.finish().unwrap();
        let mut m = builder.begin_method(desc.methods()[1].signature().clone()).unwrap();
        m.emit_direct_forward().unwrap();
        m.finish().unwrap();
        builder.finish()
    }

    fn calc() -> impl Target {
        FnTarget::new("Calc", |m: &MethodDescriptor, args: &[Value]| match m.name() {
            "add" => Ok(Value::I32(
                args[0].as_i32().unwrap_or_default() + args[1].as_i32().unwrap_or_default(),
            )),
            _ => Ok(Value::Void),
        })
    }

    #[test]
    fn test_fused_and_interpreted_agree() {
        let desc = descriptor();
        let unit = unit_for(&desc);
        let chains = vec![InterceptorChain::build(vec![AdviceSpec::after_returning(
            "double",
            |_, v: Value| Ok(Value::I32(v.as_i32().unwrap_or_default() * 2)),
        )])];
        let target = calc();
        let stats = EngineStats::new();
        let frame = CallFrame {
            target: &target,
            descriptor: &desc,
            chains: &chains,
            unit: &unit,
            stats: Some(&stats),
        };
        let args = [Value::I32(2), Value::I32(5)];

        for fuse in [true, false] {
            let linked = LinkedUnit::link(&unit, 1, 2, fuse).unwrap();
            let add = frame
                .dispatch(&desc.methods()[0], linked.body(0).unwrap(), &args)
                .unwrap();
            assert_eq!(add, Value::I32(14));
            let reset = frame
                .dispatch(&desc.methods()[1], linked.body(1).unwrap(), &[])
                .unwrap();
            assert_eq!(reset, Value::Void);
        }

        let snap = stats.snapshot();
        assert_eq!(snap.invocations_created, 2);
        assert_eq!(snap.direct_forwards, 2);
    }

    #[test]
    fn test_interpreter_reports_malformed_stub() {
        let desc = descriptor();
        let unit = unit_for(&desc);
        let target = calc();
        let frame = CallFrame {
            target: &target,
            descriptor: &desc,
            chains: &[],
            unit: &unit,
            stats: None,
        };
        let code = vec![(0, Instruction::Pop)];
        let err = frame
            .interpret(&desc.methods()[1], &code, &[])
            .unwrap_err();
        assert!(matches!(err, CallError::MalformedStub { offset: 0, .. }));

        let code = vec![(0, Instruction::Nop)];
        assert!(frame.interpret(&desc.methods()[1], &code, &[]).is_err());
    }

    #[test]
    fn test_null_from_chain_into_primitive_fails() {
        let desc = descriptor();
        let unit = unit_for(&desc);
        let chains = vec![InterceptorChain::build(vec![AdviceSpec::around(
            "null",
            |_: &mut Invocation<'_>| Ok(Value::Null),
        )])];
        let target = calc();
        let frame = CallFrame {
            target: &target,
            descriptor: &desc,
            chains: &chains,
            unit: &unit,
            stats: None,
        };
        let linked = LinkedUnit::link(&unit, 1, 2, true).unwrap();
        let err = frame
            .dispatch(&desc.methods()[0], linked.body(0).unwrap(), &[Value::I32(1), Value::I32(2)])
            .unwrap_err();
        assert!(matches!(err, CallError::Conversion(_)));
    }
}
