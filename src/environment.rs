//! Environment and compiled templates
//!
//! The environment owns the tag registry and the evaluation mode. Every
//! template it compiles uses that mode; two environments with different
//! modes can compile the same source independently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::compiler::{self, CompileMode, Execution, Program};
use crate::config::EnvConfig;
use crate::error::{ConfigError, RenderError, SyntaxError};
use crate::ext::{builtin_extension, Extension, TagRegistry};
use crate::runtime::{self, filters, Context, UndefinedBehavior, Value, VM};
use crate::syntax::{self, LexerOptions, Node};

/* ===================== Environment ===================== */

#[derive(Debug, Clone)]
pub struct Environment {
    registry: TagRegistry,
    mode: CompileMode,
    undefined: UndefinedBehavior,
    lexer: LexerOptions,
    globals: Arc<HashMap<String, Value>>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Environment {
    /// Plain environment without extensions
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::default()
    }

    /// Environment described by `config`, resolving extensions by name
    pub fn from_config(config: &EnvConfig) -> Result<Self, ConfigError> {
        let mut builder = Self::builder()
            .enable_async(config.enable_async)
            .native(config.native)
            .undefined(config.undefined)
            .trim_blocks(config.trim_blocks)
            .keep_trailing_newline(config.keep_trailing_newline);
        for name in &config.extensions {
            let extension = builtin_extension(name)
                .ok_or_else(|| ConfigError::UnknownExtension(name.clone()))?;
            builder = builder.extension_arc(extension);
        }
        Ok(builder.build())
    }

    pub fn mode(&self) -> CompileMode {
        self.mode
    }

    pub fn is_async(&self) -> bool {
        self.mode.is_async()
    }

    pub fn undefined(&self) -> UndefinedBehavior {
        self.undefined
    }

    pub fn extension_names(&self) -> Vec<&'static str> {
        self.registry.extension_names()
    }

    /// Parse without compiling
    pub fn parse(&self, source: &str) -> Result<Vec<Node>, SyntaxError> {
        syntax::parse(source, self.lexer, &self.registry)
    }

    /// Compile a template for this environment's mode
    pub fn from_string(&self, source: &str) -> Result<Template, SyntaxError> {
        let nodes = self.parse(source)?;
        let program = compiler::compile(&nodes, self.mode);
        Ok(Template {
            program: Arc::new(program),
            undefined: self.undefined,
            globals: Arc::clone(&self.globals),
        })
    }
}

/* ===================== Builder ===================== */

#[derive(Debug)]
pub struct EnvironmentBuilder {
    registry: TagRegistry,
    mode: CompileMode,
    undefined: UndefinedBehavior,
    lexer: LexerOptions,
    globals: HashMap<String, Value>,
}

impl Default for EnvironmentBuilder {
    fn default() -> Self {
        let mut globals = HashMap::new();
        globals.insert("range".to_string(), Value::from_fn("range", filters::range));
        Self {
            registry: TagRegistry::new(),
            mode: CompileMode::default(),
            undefined: UndefinedBehavior::default(),
            lexer: LexerOptions::default(),
            globals,
        }
    }
}

impl EnvironmentBuilder {
    pub fn extension<E: Extension + 'static>(self, extension: E) -> Self {
        self.extension_arc(Arc::new(extension))
    }

    pub fn extension_arc(mut self, extension: Arc<dyn Extension>) -> Self {
        self.registry.register(extension);
        self
    }

    pub fn enable_async(mut self, enabled: bool) -> Self {
        self.mode.execution = if enabled {
            Execution::Async
        } else {
            Execution::Sync
        };
        self
    }

    /// Render typed values instead of text
    pub fn native(mut self, native: bool) -> Self {
        self.mode.native = native;
        self
    }

    pub fn undefined(mut self, undefined: UndefinedBehavior) -> Self {
        self.undefined = undefined;
        self
    }

    pub fn trim_blocks(mut self, enabled: bool) -> Self {
        self.lexer.trim_blocks = enabled;
        self
    }

    pub fn keep_trailing_newline(mut self, enabled: bool) -> Self {
        self.lexer.keep_trailing_newline = enabled;
        self
    }

    /// Variable visible to every render; context variables shadow it
    pub fn global(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.globals.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> Environment {
        debug!(
            extensions = ?self.registry.extension_names(),
            mode = self.mode.strategy().name(),
            "environment built"
        );
        Environment {
            registry: self.registry,
            mode: self.mode,
            undefined: self.undefined,
            lexer: self.lexer,
            globals: Arc::new(self.globals),
        }
    }
}

/* ===================== Template ===================== */

/// A compiled template, cheap to clone and render concurrently
#[derive(Debug, Clone)]
pub struct Template {
    program: Arc<Program>,
    undefined: UndefinedBehavior,
    globals: Arc<HashMap<String, Value>>,
}

impl Template {
    pub fn program(&self) -> &Program {
        &self.program
    }

    fn vm(&self, ctx: &Context) -> VM {
        let mut vars = (*self.globals).clone();
        vars.extend(ctx.vars().iter().map(|(k, v)| (k.clone(), v.clone())));
        VM::new(Arc::clone(&self.program), vars, self.undefined)
    }

    /// Render to a value: a string, or any value in native mode
    ///
    /// Async templates are driven on a private current-thread runtime, so
    /// this must not be called from inside a tokio runtime.
    pub fn render(&self, ctx: &Context) -> Result<Value, RenderError> {
        let vm = self.vm(ctx);
        if !self.program.mode.is_async() {
            return runtime::run_sync(vm);
        }
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(RenderError::NestedRuntime);
        }
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let cancel = CancellationToken::new();
        rt.block_on(runtime::run_async(vm, &cancel))
    }

    /// Render an async template
    pub async fn render_async(&self, ctx: &Context) -> Result<Value, RenderError> {
        self.render_async_with_cancel(ctx, &CancellationToken::new())
            .await
    }

    /// Render an async template, stopping when `cancel` fires
    pub async fn render_async_with_cancel(
        &self,
        ctx: &Context,
        cancel: &CancellationToken,
    ) -> Result<Value, RenderError> {
        if !self.program.mode.is_async() {
            return Err(RenderError::AsyncDisabled);
        }
        runtime::run_async(self.vm(ctx), cancel).await
    }

    /// Render and convert the result to text
    pub fn render_to_string(&self, ctx: &Context) -> Result<String, RenderError> {
        self.render(ctx).map(|value| value.to_string())
    }
}
