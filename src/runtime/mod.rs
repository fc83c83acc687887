//! # Runtime - Resumable Stack-Driven Renderer
//!
//! ## Core Principles
//!
//! 1. **Flat execution**: compiled [`Instr`](crate::compiler::Instr)s, no recursion
//! 2. **Centralized control flow**: `Control` carries throws and suspensions
//! 3. **Guards restore state**: a caught failure resets every stack to the
//!    depth recorded when its guard was armed
//! 4. **Pure executor**: the VM never awaits; the driver resolves suspensions

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub mod buffer;
pub mod driver;
pub mod exec_loop;
pub mod filters;
pub mod native;
pub mod ops;
pub mod scope;
pub mod value;
pub mod vm;

#[cfg(test)]
mod tests;

pub use buffer::{BufferStack, Sink, SinkKind};
pub use driver::{run_async, run_sync};
pub use exec_loop::{run_until_done, step};
pub use native::native_concat;
pub use value::{Awaitable, Function, Value};
pub use vm::{Control, Guard, Step, VM};

/// How undefined values behave when used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UndefinedBehavior {
    /// Render as empty and iterate as empty
    #[default]
    Lenient,
    /// Raise whenever the value is rendered, iterated, tested for truth or
    /// filtered
    Strict,
}

/* ===================== Context ===================== */

/// Variables passed to a render
#[derive(Debug, Clone, Default)]
pub struct Context {
    vars: HashMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Builder-style [`Context::insert`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Context from a JSON object; anything else gives an empty context
    pub fn from_json(json: serde_json::Value) -> Self {
        let vars = match json {
            serde_json::Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| (k, Value::from_json(v)))
                .collect(),
            _ => HashMap::new(),
        };
        Self { vars }
    }

    pub(crate) fn vars(&self) -> &HashMap<String, Value> {
        &self.vars
    }
}

impl From<HashMap<String, Value>> for Context {
    fn from(vars: HashMap<String, Value>) -> Self {
        Self { vars }
    }
}
