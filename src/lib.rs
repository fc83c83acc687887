//! # jinja-try-catch
//!
//! A small Jinja-style template compiler extended with a `{% try %}` block.
//!
//! ```text
//! {% try %}
//!     The thing: {{- i_do_not_exist -}}
//! {% catch -%}
//!     Error: {{ exception }}
//! {% endtry %}
//! ```
//!
//! If the protected region fails at render time, none of its partial output
//! is emitted and the `catch` region is rendered instead, with the failure
//! bound to `exception`. Without a `catch` region the block renders nothing.
//!
//! Templates compile to one of three strategies chosen by the environment:
//! synchronous text, asynchronous text (values may suspend) and native
//! rendering, which yields a typed [`Value`] instead of a string.
//!
//! ```
//! use jinja_try_catch::{Context, Environment, TryCatchExtension, Value};
//!
//! let env = Environment::builder().extension(TryCatchExtension).build();
//! let tmpl = env
//!     .from_string("{% try %}{{ 1/0 }}{% catch %}Can't divide by zero!{% endtry %}")
//!     .unwrap();
//! assert_eq!(
//!     tmpl.render(&Context::new()).unwrap(),
//!     Value::from("Can't divide by zero!")
//! );
//! ```

pub mod compiler;
pub mod config;
pub mod environment;
pub mod error;
pub mod ext;
pub mod runtime;
pub mod syntax;

// Re-export main types
pub use compiler::{CompileMode, Execution};
pub use config::EnvConfig;
pub use environment::{Environment, EnvironmentBuilder, Template};
pub use error::{ConfigError, Error, Failure, FailureKind, RenderError, SyntaxError};
pub use ext::{ExprStmtExtension, Extension, ExtensionNode, TryCatchExtension};
pub use runtime::{Context, UndefinedBehavior, Value};
