//! Virtual Machine state
//!
//! The VM holds all render state:
//! - pc and operand stack for the compiled program
//! - buffers: one output sink per armed guard, above the root output
//! - scopes and loops
//! - guards: the armed `try` regions, innermost last
//! - control: current control flow state (throw, suspend)

use std::collections::HashMap;
use std::sync::Arc;

use crate::compiler::Program;
use crate::error::{Failure, FailureKind, RenderError};

use super::buffer::{BufferStack, Sink};
use super::native::native_concat;
use super::scope::ScopeStack;
use super::value::Awaitable;
use super::{UndefinedBehavior, Value};

/* ===================== Control Flow ===================== */

/// Control flow state
///
/// When control is `Throw`, the next step unwinds to the innermost armed
/// guard. `Suspend` stops execution until [`VM::resume`] supplies the
/// awaited result.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    None,
    Throw(Failure),
    Suspend(Awaitable),
}

/// Result of executing one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Continue to next step
    Continue,
    /// Execution complete, failed or suspended; inspect `vm.control`
    Done,
}

/* ===================== Guards ===================== */

/// An armed `try` region
///
/// Records how deep every stack was when the guard was armed so a failure
/// can restore them exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guard {
    pub handler: usize,
    pub stack_depth: usize,
    pub buffer_depth: usize,
    pub scope_depth: usize,
    pub loop_depth: usize,
}

/* ===================== VM ===================== */

#[derive(Debug)]
pub struct VM {
    pub program: Arc<Program>,
    pub pc: usize,
    pub stack: Vec<Value>,
    pub buffers: BufferStack,
    pub scopes: ScopeStack,
    /// Remaining items of each active `for` loop
    pub loops: Vec<std::vec::IntoIter<Value>>,
    pub guards: Vec<Guard>,
    /// Failure caught by the last unwind, waiting for its handler to bind it
    pub pending: Option<Failure>,
    pub control: Control,
    pub undefined: UndefinedBehavior,
}

impl VM {
    /// Create a VM positioned at the start of `program`
    ///
    /// `vars` becomes the outermost scope.
    pub fn new(
        program: Arc<Program>,
        vars: HashMap<String, Value>,
        undefined: UndefinedBehavior,
    ) -> Self {
        let buffers = BufferStack::new(program.sink);
        VM {
            program,
            pc: 0,
            stack: Vec::new(),
            buffers,
            scopes: ScopeStack::new(vars),
            loops: Vec::new(),
            guards: Vec::new(),
            pending: None,
            control: Control::None,
            undefined,
        }
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self.control, Control::Suspend(_))
    }

    /// Continue after a suspension with the awaited result
    ///
    /// A failed result is thrown at the resumed position, so a guard armed
    /// before the suspension still intercepts it.
    pub fn resume(&mut self, result: Result<Value, Failure>) {
        match result {
            Ok(value) => {
                self.stack.push(value);
                self.control = Control::None;
            }
            Err(failure) => self.control = Control::Throw(failure),
        }
    }

    /// Consume a finished VM, producing the render result
    pub fn finish(self) -> Result<Value, RenderError> {
        match self.control {
            Control::None => Ok(match self.buffers.into_root() {
                Sink::Text(text) => Value::Str(text),
                Sink::Fragments(fragments) => native_concat(fragments),
            }),
            Control::Throw(failure) if failure.kind() == FailureKind::Cancelled => {
                Err(RenderError::Cancelled)
            }
            Control::Throw(failure) => Err(RenderError::Failure(failure)),
            Control::Suspend(_) => Err(RenderError::Internal(
                "render stopped on a pending value".to_string(),
            )),
        }
    }
}
