//! Core execution loop
//!
//! This module contains the step() function - the heart of the renderer.
//! It executes one instruction at a time and turns every failure into
//! `Control::Throw`, which the next step unwinds to the innermost guard.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::compiler::Instr;
use crate::error::Failure;
use crate::syntax::{BinOp, UnaryOp};

use super::filters;
use super::ops;
use super::vm::{Control, Guard, Step, VM};
use super::{UndefinedBehavior, Value};

/* ===================== Public API ===================== */

/// Run the VM until it completes, fails or suspends
///
/// After completion, inspect `vm.control` for the final state.
pub fn run_until_done(vm: &mut VM) {
    loop {
        match step(vm) {
            Step::Continue => continue,
            Step::Done => break,
        }
    }
}

/// Execute one step of the VM
pub fn step(vm: &mut VM) -> Step {
    match &vm.control {
        Control::None => {}
        Control::Throw(_) => return unwind(vm),
        Control::Suspend(_) => return Step::Done,
    }

    let program = Arc::clone(&vm.program);
    let Some(instr) = program.code.get(vm.pc) else {
        return Step::Done;
    };

    if let Err(failure) = execute(vm, instr) {
        vm.control = Control::Throw(failure);
    }
    Step::Continue
}

/* ===================== Control Flow ===================== */

/// Hand a thrown failure to the innermost armed guard
///
/// Every stack is restored to its depth when the guard was armed, which
/// drops the guard's buffer along with any partial output in it. Failures
/// that are not catchable, or that no guard covers, end the render.
fn unwind(vm: &mut VM) -> Step {
    let Control::Throw(failure) = &vm.control else {
        return Step::Continue;
    };
    if !failure.is_catchable() {
        debug!(pc = vm.pc, "render cancelled, skipping armed guards");
        return Step::Done;
    }
    let Some(guard) = vm.guards.pop() else {
        return Step::Done;
    };

    debug!(
        pc = vm.pc,
        handler = guard.handler,
        kind = %failure.kind(),
        message = failure.message(),
        "guard caught failure"
    );

    vm.stack.truncate(guard.stack_depth);
    vm.buffers.truncate(guard.buffer_depth);
    vm.scopes.truncate(guard.scope_depth);
    vm.loops.truncate(guard.loop_depth);

    if let Control::Throw(failure) = std::mem::replace(&mut vm.control, Control::None) {
        vm.pending = Some(failure);
    }
    vm.pc = guard.handler;
    Step::Continue
}

/* ===================== Instructions ===================== */

fn execute(vm: &mut VM, instr: &Instr) -> Result<(), Failure> {
    let mut next = vm.pc + 1;

    match instr {
        Instr::EmitData(text) => vm.buffers.write_data(text),
        Instr::Output => {
            let value = pop(vm)?;
            output(vm, value)?;
        }

        Instr::Const(value) => vm.stack.push(value.clone()),
        Instr::LoadName(name) => {
            let value = vm
                .scopes
                .get(name)
                .cloned()
                .unwrap_or_else(|| Value::undefined_name(name));
            vm.stack.push(value);
        }
        Instr::StoreName(name) => {
            let value = pop(vm)?;
            vm.scopes.set(name.clone(), value);
        }
        Instr::GetAttr(attr) => {
            let object = pop(vm)?;
            vm.stack.push(ops::get_attr(&object, attr)?);
        }
        Instr::GetItem => {
            let index = pop(vm)?;
            let object = pop(vm)?;
            vm.stack.push(ops::get_item(&object, &index)?);
        }
        Instr::Call { argc } => {
            let args = pop_n(vm, *argc)?;
            let func = pop(vm)?;
            vm.stack.push(ops::call(&func, &args)?);
        }
        Instr::CallMethod { name, argc } => {
            let args = pop_n(vm, *argc)?;
            let object = pop(vm)?;
            vm.stack.push(ops::call_method(&object, name, &args)?);
        }
        Instr::Filter { name, argc } => {
            let args = pop_n(vm, *argc)?;
            let mut value = pop(vm)?;
            if let Value::Undefined(message) = &value {
                if !filters::accepts_undefined(name) {
                    match vm.undefined {
                        UndefinedBehavior::Strict => return Err(Failure::undefined(message.clone())),
                        UndefinedBehavior::Lenient => value = Value::Str(String::new()),
                    }
                }
            }
            vm.stack.push(filters::apply_filter(name, &value, &args)?);
        }
        Instr::Test {
            name,
            argc,
            negated,
        } => {
            let args = pop_n(vm, *argc)?;
            let value = pop(vm)?;
            if let Value::Undefined(message) = &value {
                if filters::test_needs_value(name) {
                    return Err(Failure::undefined(message.clone()));
                }
            }
            let result = filters::apply_test(name, &value, &args)?;
            vm.stack.push(Value::Bool(result != *negated));
        }
        Instr::Binary(op) => {
            let right = pop(vm)?;
            let left = pop(vm)?;
            check_operands(vm, *op, &left, &right)?;
            vm.stack.push(ops::binary(*op, &left, &right)?);
        }
        Instr::Unary(op) => {
            let value = pop(vm)?;
            if let Value::Undefined(message) = &value {
                if *op != UnaryOp::Not || vm.undefined == UndefinedBehavior::Strict {
                    return Err(Failure::undefined(message.clone()));
                }
            }
            vm.stack.push(ops::unary(*op, &value)?);
        }
        Instr::BuildList(count) => {
            let items = pop_n(vm, *count)?;
            vm.stack.push(Value::list(items));
        }
        Instr::BuildMap(count) => {
            let flat = pop_n(vm, count * 2)?;
            let mut map = BTreeMap::new();
            let mut entries = flat.into_iter();
            while let (Some(key), Some(value)) = (entries.next(), entries.next()) {
                map.insert(map_key(&key)?, value);
            }
            vm.stack.push(Value::map(map));
        }
        Instr::Await => {
            if let Some(Value::Awaitable(_)) = vm.stack.last() {
                if let Some(Value::Awaitable(awaitable)) = vm.stack.pop() {
                    trace!(pc = vm.pc, id = awaitable.id(), "suspending on awaitable");
                    vm.control = Control::Suspend(awaitable);
                }
            }
        }
        Instr::Pop => {
            pop(vm)?;
        }

        Instr::Jump(target) => next = *target,
        Instr::JumpIfFalse(target) => {
            let value = pop(vm)?;
            if !truthy(vm, &value)? {
                next = *target;
            }
        }
        Instr::JumpIfFalseOrPop(target) => {
            let value = peek(vm)?;
            if truthy(vm, &value)? {
                vm.stack.pop();
            } else {
                next = *target;
            }
        }
        Instr::JumpIfTrueOrPop(target) => {
            let value = peek(vm)?;
            if truthy(vm, &value)? {
                next = *target;
            } else {
                vm.stack.pop();
            }
        }

        Instr::PushScope => vm.scopes.push(),
        Instr::PopScope => vm.scopes.pop(),
        Instr::IterStart => {
            let iterable = pop(vm)?;
            let items = match (&iterable, vm.undefined) {
                (Value::Undefined(_), UndefinedBehavior::Lenient) => Vec::new(),
                _ => ops::iterate(&iterable)?,
            };
            vm.loops.push(items.into_iter());
        }
        Instr::IterNext { target, exit } => {
            match vm.loops.last_mut().and_then(|items| items.next()) {
                Some(item) => vm.scopes.set(target.clone(), item),
                None => {
                    vm.loops.pop();
                    next = *exit;
                }
            }
        }

        Instr::EnterGuard { handler, sink } => {
            vm.guards.push(Guard {
                handler: *handler,
                stack_depth: vm.stack.len(),
                buffer_depth: vm.buffers.depth(),
                scope_depth: vm.scopes.depth(),
                loop_depth: vm.loops.len(),
            });
            vm.buffers.push(*sink);
            trace!(pc = vm.pc, depth = vm.guards.len(), "guard armed");
        }
        Instr::ExitGuard => {
            vm.guards.pop();
            vm.buffers.flush();
            trace!(pc = vm.pc, depth = vm.guards.len(), "guard flushed");
        }
        Instr::BindFailure(name) => {
            let failure = vm
                .pending
                .take()
                .ok_or_else(|| Failure::raised("no caught failure to bind"))?;
            vm.scopes.set(name.clone(), Value::Failure(failure));
        }
        Instr::DiscardFailure => vm.pending = None,
    }

    vm.pc = next;
    Ok(())
}

/* ===================== Helpers ===================== */

fn pop(vm: &mut VM) -> Result<Value, Failure> {
    vm.stack
        .pop()
        .ok_or_else(|| Failure::raised("operand stack underflow"))
}

fn peek(vm: &VM) -> Result<Value, Failure> {
    vm.stack
        .last()
        .cloned()
        .ok_or_else(|| Failure::raised("operand stack underflow"))
}

fn pop_n(vm: &mut VM, count: usize) -> Result<Vec<Value>, Failure> {
    let len = vm.stack.len();
    if count > len {
        return Err(Failure::raised("operand stack underflow"));
    }
    Ok(vm.stack.split_off(len - count))
}

/// Write a value to the current sink
fn output(vm: &mut VM, value: Value) -> Result<(), Failure> {
    match value {
        Value::Undefined(message) => match vm.undefined {
            UndefinedBehavior::Strict => Err(Failure::undefined(message)),
            UndefinedBehavior::Lenient => {
                vm.buffers.write_data("");
                Ok(())
            }
        },
        Value::Awaitable(_) => Err(Failure::type_error(
            "awaitable value cannot be rendered without async mode",
        )),
        value => {
            vm.buffers.write_value(value);
            Ok(())
        }
    }
}

fn truthy(vm: &VM, value: &Value) -> Result<bool, Failure> {
    match (value, vm.undefined) {
        (Value::Undefined(message), UndefinedBehavior::Strict) => {
            Err(Failure::undefined(message.clone()))
        }
        _ => Ok(value.is_truthy()),
    }
}

/// Undefined operands raise, except for equality and `~` in lenient mode
fn check_operands(vm: &VM, op: BinOp, left: &Value, right: &Value) -> Result<(), Failure> {
    let lenient_ok = vm.undefined == UndefinedBehavior::Lenient
        && matches!(op, BinOp::Eq | BinOp::Ne | BinOp::Concat);
    if lenient_ok {
        return Ok(());
    }
    for value in [left, right] {
        if let Value::Undefined(message) = value {
            return Err(Failure::undefined(message.clone()));
        }
    }
    Ok(())
}

fn map_key(key: &Value) -> Result<String, Failure> {
    match key {
        Value::Str(s) => Ok(s.clone()),
        Value::Int(_) | Value::Float(_) | Value::Bool(_) | Value::None => Ok(key.to_string()),
        other => Err(Failure::type_error(format!(
            "unhashable type: '{}'",
            other.type_name()
        ))),
    }
}
