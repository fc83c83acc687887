//! Tests for async rendering: suspension, resumption and cancellation

use std::collections::BTreeMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::helpers::{env_for, render_with};
use crate::error::{Failure, RenderError};
use crate::runtime::{Context, Value};
use crate::CompileMode;

const ASYNC_MODES: [CompileMode; 2] = [CompileMode::ASYNC, CompileMode::NATIVE_ASYNC];

fn ready(value: impl Into<Value>) -> Value {
    let value = value.into();
    Value::awaitable(async move { Ok(value) })
}

fn failing(message: &'static str) -> Value {
    Value::awaitable(async move {
        tokio::task::yield_now().await;
        Err(Failure::raised(message))
    })
}

#[tokio::test]
async fn test_awaited_value_renders() {
    let env = env_for(CompileMode::ASYNC);
    let template = env.from_string("{% try %}{{ job }}{% endtry %}").unwrap();
    let out = template
        .render_async(&Context::new().with("job", ready("done")))
        .await
        .unwrap();
    assert_eq!(out, Value::from("done"));
}

#[test]
fn test_awaited_failure_caught_like_sync() {
    let source = "{% try %}a{{ job }}b{% catch %}{{ exception }}{% endtry %}";
    for mode in ASYNC_MODES {
        let ctx = Context::new().with("job", failing("backend down"));
        // Native mode hands back the failure value itself
        let out = render_with(&env_for(mode), source, &ctx).unwrap();
        assert_eq!(out.to_string(), "backend down", "{:?}", mode);
    }

    // Same template, same failure raised synchronously
    let ctx = Context::new().with(
        "job",
        Value::from_fn("job", |_| Err(Failure::raised("backend down"))),
    );
    let sync = render_with(
        &env_for(CompileMode::SYNC),
        "{% try %}a{{ job() }}b{% catch %}{{ exception }}{% endtry %}",
        &ctx,
    )
    .unwrap();
    assert_eq!(sync, Value::from("backend down"));
}

#[test]
fn test_awaited_attribute_chain() {
    for mode in ASYNC_MODES {
        let mut user = BTreeMap::new();
        user.insert("name".to_string(), ready("Ada"));
        let ctx = Context::new().with("user", ready(Value::map(user)));
        let out = render_with(&env_for(mode), "{{ user.name }}", &ctx).unwrap();
        assert_eq!(out, Value::from("Ada"));
    }
}

#[test]
fn test_awaited_value_in_fallback() {
    let source = "{% try %}{{ missing }}{% catch %}{{ job }}{% endtry %}";
    for mode in ASYNC_MODES {
        let ctx = Context::new().with("job", ready(3));
        let out = render_with(&env_for(mode), source, &ctx).unwrap();
        assert_eq!(out.to_string(), "3");
    }
}

#[test]
fn test_reused_awaitable_fails() {
    let source = "{{ job }}{% try %}{{ job }}{% catch %}:{{ exception }}{% endtry %}";
    let ctx = Context::new().with("job", ready(1));
    let out = render_with(&env_for(CompileMode::ASYNC), source, &ctx).unwrap();
    assert_eq!(out, Value::from("1:cannot reuse already awaited coroutine"));
}

#[tokio::test]
async fn test_spawned_task_value() {
    let env = env_for(CompileMode::NATIVE_ASYNC);
    let template = env.from_string("{% try %}{{ total }}{% endtry %}").unwrap();
    let handle = tokio::spawn(async { Ok::<_, Failure>(Value::Int(42)) });
    let out = template
        .render_async(&Context::new().with("total", Value::spawned(handle)))
        .await
        .unwrap();
    assert_eq!(out, Value::Int(42));
}

#[tokio::test]
async fn test_cancellation_is_not_caught() {
    let env = env_for(CompileMode::ASYNC);
    let template = env
        .from_string("{% try %}{{ slow }}{% catch %}caught{% endtry %}")
        .unwrap();
    let ctx = Context::new().with(
        "slow",
        Value::awaitable(std::future::pending::<Result<Value, Failure>>()),
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let err = template
        .render_async_with_cancel(&ctx, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, RenderError::Cancelled), "got {:?}", err);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let env = env_for(CompileMode::ASYNC);
    let template = env.from_string("{% try %}a{% catch %}b{% endtry %}").unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = template
        .render_async_with_cancel(&Context::new(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, RenderError::Cancelled));
}

#[tokio::test]
async fn test_cancelled_spawned_task_is_not_caught() {
    let env = env_for(CompileMode::ASYNC);
    let template = env
        .from_string("{% try %}{{ job }}{% catch %}caught{% endtry %}")
        .unwrap();
    let handle = tokio::spawn(std::future::pending::<Result<Value, Failure>>());
    handle.abort();

    let err = template
        .render_async(&Context::new().with("job", Value::spawned(handle)))
        .await
        .unwrap_err();
    assert!(matches!(err, RenderError::Cancelled));
}

#[test]
fn test_blocking_render_of_async_template() {
    let env = env_for(CompileMode::ASYNC);
    let template = env
        .from_string("{% try %}{{ job }}{% catch %}{{ exception }}{% endtry %}")
        .unwrap();
    let out = template
        .render(&Context::new().with("job", failing("nope")))
        .unwrap();
    assert_eq!(out, Value::from("nope"));
}

#[tokio::test]
async fn test_blocking_render_inside_runtime() {
    let env = env_for(CompileMode::ASYNC);
    let template = env.from_string("x").unwrap();
    let err = template.render(&Context::new()).unwrap_err();
    assert!(matches!(err, RenderError::NestedRuntime));
}

#[tokio::test]
async fn test_render_async_requires_async_environment() {
    let env = env_for(CompileMode::SYNC);
    let template = env.from_string("x").unwrap();
    let err = template.render_async(&Context::new()).await.unwrap_err();
    assert!(matches!(err, RenderError::AsyncDisabled));
}

#[test]
fn test_awaitable_in_sync_environment() {
    let env = env_for(CompileMode::SYNC);
    let ctx = Context::new().with("job", ready(1));
    let err = render_with(&env, "{{ job }}", &ctx).unwrap_err();
    assert_eq!(
        err.failure().map(Failure::message),
        Some("awaitable value cannot be rendered without async mode")
    );

    let ctx = Context::new().with("job", ready(1));
    let caught = render_with(
        &env,
        "{% try %}{{ job }}{% catch %}{{ exception.kind }}{% endtry %}",
        &ctx,
    )
    .unwrap();
    assert_eq!(caught, Value::from("TypeError"));
}
