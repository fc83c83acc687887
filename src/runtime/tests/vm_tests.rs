//! Step-level tests for guards, suspension and unwinding

use std::collections::HashMap;
use std::sync::Arc;

use super::helpers::env_for;
use crate::compiler::{CompileMode, Instr};
use crate::error::{Failure, RenderError};
use crate::runtime::{run_until_done, step, Control, Guard, Step, UndefinedBehavior, Value, VM};

fn vm_for(mode: CompileMode, source: &str, vars: HashMap<String, Value>) -> VM {
    let template = env_for(mode).from_string(source).unwrap();
    VM::new(
        Arc::new(template.program().clone()),
        vars,
        UndefinedBehavior::Strict,
    )
}

fn ready(value: Value) -> Value {
    Value::awaitable(async move { Ok(value) })
}

fn handler_of(vm: &VM) -> usize {
    vm.program
        .code
        .iter()
        .find_map(|instr| match instr {
            Instr::EnterGuard { handler, .. } => Some(*handler),
            _ => None,
        })
        .unwrap()
}

#[test]
fn test_suspends_inside_guard_then_fails() {
    let vars = HashMap::from([("job".to_string(), ready(Value::Int(1)))]);
    let mut vm = vm_for(
        CompileMode::ASYNC,
        "{% try %}a{{ job }}{% catch %}{{ exception }}{% endtry %}",
        vars,
    );

    run_until_done(&mut vm);
    assert!(vm.is_suspended());
    assert_eq!(vm.guards.len(), 1);
    assert_eq!(vm.buffers.depth(), 2);

    vm.resume(Err(Failure::raised("late")));
    run_until_done(&mut vm);
    assert_eq!(vm.control, Control::None);
    assert!(vm.guards.is_empty());
    assert_eq!(vm.finish().unwrap(), Value::from("late"));
}

#[test]
fn test_resume_with_value_continues() {
    let vars = HashMap::from([("job".to_string(), ready(Value::Int(1)))]);
    let mut vm = vm_for(CompileMode::NATIVE_ASYNC, "{% try %}{{ job }}{% endtry %}", vars);

    run_until_done(&mut vm);
    assert!(vm.is_suspended());
    vm.resume(Ok(Value::Int(7)));
    run_until_done(&mut vm);
    assert_eq!(vm.finish().unwrap(), Value::Int(7));
}

#[test]
fn test_await_on_plain_value_does_not_suspend() {
    let vars = HashMap::from([("x".to_string(), Value::Int(3))]);
    let mut vm = vm_for(CompileMode::ASYNC, "{{ x }}", vars);
    run_until_done(&mut vm);
    assert!(!vm.is_suspended());
    assert_eq!(vm.finish().unwrap(), Value::from("3"));
}

#[test]
fn test_cancellation_skips_armed_guard() {
    let vars = HashMap::from([("job".to_string(), ready(Value::None))]);
    let mut vm = vm_for(
        CompileMode::ASYNC,
        "{% try %}{{ job }}{% catch %}caught{% endtry %}",
        vars,
    );

    run_until_done(&mut vm);
    vm.resume(Err(Failure::cancelled()));
    run_until_done(&mut vm);
    assert_eq!(vm.guards.len(), 1);
    assert!(matches!(vm.finish(), Err(RenderError::Cancelled)));
}

#[test]
fn test_guard_records_depths() {
    let mut vm = vm_for(
        CompileMode::SYNC,
        "{% for i in [1] %}{% try %}{{ missing }}{% endtry %}{% endfor %}",
        HashMap::new(),
    );
    let handler = handler_of(&vm);

    while vm.guards.is_empty() {
        assert_eq!(step(&mut vm), Step::Continue);
    }
    assert_eq!(
        vm.guards[0],
        Guard {
            handler,
            stack_depth: 0,
            buffer_depth: 1,
            scope_depth: 2,
            loop_depth: 1,
        }
    );
}

#[test]
fn test_unwind_restores_every_stack() {
    let mut vm = vm_for(
        CompileMode::SYNC,
        "{% for i in [1] %}{% try %}{% for j in [1, 2] %}x{{ 1 + missing }}{% endfor %}{% endtry %}{% endfor %}",
        HashMap::new(),
    );
    let handler = handler_of(&vm);

    while vm.pending.is_none() {
        assert_eq!(step(&mut vm), Step::Continue);
    }
    assert_eq!(vm.pc, handler);
    assert!(vm.stack.is_empty());
    assert_eq!(vm.buffers.depth(), 1);
    assert_eq!(vm.scopes.depth(), 2);
    assert_eq!(vm.loops.len(), 1);
    assert!(vm.guards.is_empty());

    run_until_done(&mut vm);
    assert!(vm.pending.is_none());
    assert_eq!(vm.finish().unwrap(), Value::from(""));
}

#[test]
fn test_uncaught_failure_stops_render() {
    let mut vm = vm_for(CompileMode::SYNC, "a{{ missing }}b", HashMap::new());
    run_until_done(&mut vm);
    assert!(matches!(vm.control, Control::Throw(_)));

    let err = vm.finish().unwrap_err();
    assert_eq!(
        err.failure().map(Failure::message),
        Some("'missing' is undefined")
    );
}

#[test]
fn test_sync_driver_rejects_suspension() {
    let vars = HashMap::from([("job".to_string(), ready(Value::None))]);
    let vm = vm_for(CompileMode::ASYNC, "{{ job }}", vars);
    assert!(matches!(
        crate::runtime::run_sync(vm),
        Err(RenderError::Internal(_))
    ));
}
