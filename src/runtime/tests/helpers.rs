//! Test helpers for runtime tests
//!
//! Common utilities for building environments and rendering in every mode

use crate::compiler::{CompileMode, Execution};
use crate::environment::Environment;
use crate::error::RenderError;
use crate::ext::{ExprStmtExtension, TryCatchExtension};
use crate::runtime::{Context, UndefinedBehavior, Value};

/// Every combination of sync/async and text/native
pub const MODES: [CompileMode; 4] = [
    CompileMode::SYNC,
    CompileMode::ASYNC,
    CompileMode::NATIVE,
    CompileMode::NATIVE_ASYNC,
];

/// Install a subscriber once so `RUST_LOG=debug` shows guard activity
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Environment with the try/catch and `do` extensions and strict undefined
pub fn env_for(mode: CompileMode) -> Environment {
    env_with(mode, UndefinedBehavior::Strict)
}

pub fn env_with(mode: CompileMode, undefined: UndefinedBehavior) -> Environment {
    init_tracing();
    Environment::builder()
        .extension(TryCatchExtension)
        .extension(ExprStmtExtension)
        .enable_async(mode.execution == Execution::Async)
        .native(mode.native)
        .undefined(undefined)
        .build()
}

/// Compile and render `source` in `mode`
///
/// Async modes are driven through `render_async` on a test runtime.
pub fn render_in(mode: CompileMode, source: &str, ctx: &Context) -> Result<Value, RenderError> {
    render_with(&env_for(mode), source, ctx)
}

pub fn render_with(env: &Environment, source: &str, ctx: &Context) -> Result<Value, RenderError> {
    let template = env.from_string(source).expect("template should compile");
    if env.is_async() {
        tokio_test::block_on(template.render_async(ctx))
    } else {
        template.render(ctx)
    }
}

/// The value a render in `mode` should produce for `native`
///
/// Text modes render the value's string form.
pub fn expected(mode: CompileMode, native: Value) -> Value {
    if mode.native {
        native
    } else {
        Value::Str(native.to_string())
    }
}

pub fn render_text(mode: CompileMode, source: &str, ctx: &Context) -> String {
    render_in(mode, source, ctx)
        .unwrap_or_else(|e| panic!("render failed in {:?}: {}", mode, e))
        .to_string()
}
