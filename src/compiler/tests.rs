//! Tests for code generation

use std::sync::Arc;

use super::*;
use crate::ext::{ExprStmtExtension, TagRegistry, TryCatchExtension};
use crate::runtime::Value;
use crate::syntax::{self, LexerOptions};

fn registry() -> TagRegistry {
    let mut registry = TagRegistry::new();
    registry.register(Arc::new(TryCatchExtension));
    registry.register(Arc::new(ExprStmtExtension));
    registry
}

fn compile_source(source: &str, mode: CompileMode) -> Program {
    let nodes = syntax::parse(source, LexerOptions::default(), &registry()).unwrap();
    compile(&nodes, mode)
}

#[test]
fn test_try_without_catch_sync() {
    let program = compile_source("{% try %}a{% endtry %}", CompileMode::SYNC);
    assert_eq!(
        program.code,
        vec![
            Instr::EnterGuard {
                handler: 6,
                sink: SinkKind::Text
            },
            Instr::PushScope,
            Instr::EmitData("a".into()),
            Instr::PopScope,
            Instr::ExitGuard,
            Instr::Jump(8),
            Instr::DiscardFailure,
            Instr::EmitData(String::new()),
        ]
    );
    assert_eq!(program.sink, SinkKind::Text);
}

#[test]
fn test_try_with_catch_binds_exception() {
    let program = compile_source("{% try %}a{% catch %}{{ exception }}{% endtry %}", CompileMode::SYNC);
    assert_eq!(
        program.code,
        vec![
            Instr::EnterGuard {
                handler: 6,
                sink: SinkKind::Text
            },
            Instr::PushScope,
            Instr::EmitData("a".into()),
            Instr::PopScope,
            Instr::ExitGuard,
            Instr::Jump(11),
            Instr::PushScope,
            Instr::BindFailure("exception".into()),
            Instr::LoadName("exception".into()),
            Instr::Output,
            Instr::PopScope,
        ]
    );
}

#[test]
fn test_native_mode_uses_fragment_sinks() {
    let program = compile_source("{% try %}a{% endtry %}", CompileMode::NATIVE);
    assert_eq!(program.sink, SinkKind::Fragments);
    assert_eq!(
        program.code[0],
        Instr::EnterGuard {
            handler: 6,
            sink: SinkKind::Fragments
        }
    );
}

#[test]
fn test_async_mode_inserts_await_points() {
    let program = compile_source("{{ user.name }}", CompileMode::ASYNC);
    assert_eq!(
        program.code,
        vec![
            Instr::LoadName("user".into()),
            Instr::Await,
            Instr::GetAttr("name".into()),
            Instr::Await,
            Instr::Output,
        ]
    );

    let sync = compile_source("{{ user.name }}", CompileMode::SYNC);
    assert!(!sync.code.contains(&Instr::Await));
}

#[test]
fn test_same_nodes_compile_in_every_mode() {
    let nodes = syntax::parse(
        "{% try %}{{ x }}{% catch %}no{% endtry %}",
        LexerOptions::default(),
        &registry(),
    )
    .unwrap();
    let sync = compile(&nodes, CompileMode::SYNC);
    let native_async = compile(&nodes, CompileMode::NATIVE_ASYNC);
    assert_eq!(sync.mode, CompileMode::SYNC);
    assert_eq!(native_async.mode, CompileMode::NATIVE_ASYNC);
    assert!(native_async.code.contains(&Instr::Await));
    assert_eq!(native_async.sink, SinkKind::Fragments);
}

#[test]
fn test_method_call_and_do() {
    let program = compile_source("{% do items.append(1) %}", CompileMode::SYNC);
    assert_eq!(
        program.code,
        vec![
            Instr::LoadName("items".into()),
            Instr::Const(Value::Int(1)),
            Instr::CallMethod {
                name: "append".into(),
                argc: 1
            },
            Instr::Pop,
        ]
    );
}

#[test]
fn test_for_loop_layout() {
    let program = compile_source("{% for c in s %}{{ c }}{% endfor %}", CompileMode::SYNC);
    assert_eq!(
        program.code,
        vec![
            Instr::LoadName("s".into()),
            Instr::IterStart,
            Instr::PushScope,
            Instr::IterNext {
                target: "c".into(),
                exit: 7
            },
            Instr::LoadName("c".into()),
            Instr::Output,
            Instr::Jump(3),
            Instr::PopScope,
        ]
    );
}

#[test]
fn test_and_short_circuits() {
    let program = compile_source("{{ a and b }}", CompileMode::SYNC);
    assert_eq!(
        program.code,
        vec![
            Instr::LoadName("a".into()),
            Instr::JumpIfFalseOrPop(3),
            Instr::LoadName("b".into()),
            Instr::Output,
        ]
    );
}

#[test]
fn test_strategy_per_mode() {
    assert_eq!(CompileMode::SYNC.strategy().name(), "sync");
    assert_eq!(CompileMode::ASYNC.strategy().name(), "async");
    assert_eq!(CompileMode::NATIVE.strategy().name(), "native");
    assert_eq!(CompileMode::NATIVE_ASYNC.strategy().name(), "native-async");
    assert!(CompileMode::ASYNC.strategy().suspends());
    assert!(!CompileMode::NATIVE.strategy().suspends());
}
