//! Instruction set executed by the runtime VM
//!
//! Jump targets are absolute indices into the program.

use crate::runtime::buffer::SinkKind;
use crate::runtime::Value;
use crate::syntax::{BinOp, UnaryOp};

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /* ----- output ----- */
    /// Write literal template text to the current sink
    EmitData(String),
    /// Pop a value and write it to the current sink
    Output,

    /* ----- expressions ----- */
    Const(Value),
    /// Push a variable, or an undefined marker if it does not resolve
    LoadName(String),
    /// Pop a value into the innermost scope
    StoreName(String),
    GetAttr(String),
    GetItem,
    Call { argc: usize },
    CallMethod { name: String, argc: usize },
    Filter { name: String, argc: usize },
    Test { name: String, argc: usize, negated: bool },
    Binary(BinOp),
    Unary(UnaryOp),
    BuildList(usize),
    BuildMap(usize),
    /// Suspension point: if the top of the stack is awaitable, suspend until
    /// it resolves and replace it with its result
    Await,
    Pop,

    /* ----- control flow ----- */
    Jump(usize),
    /// Pop a value, jump if it is falsy
    JumpIfFalse(usize),
    /// `and`: jump keeping the value if falsy, otherwise pop it
    JumpIfFalseOrPop(usize),
    /// `or`: jump keeping the value if truthy, otherwise pop it
    JumpIfTrueOrPop(usize),

    /* ----- scopes and loops ----- */
    PushScope,
    PopScope,
    /// Pop an iterable and start a loop over a snapshot of its items
    IterStart,
    /// Bind the next item to `target`, or finish the loop and jump to `exit`
    IterNext { target: String, exit: usize },

    /* ----- guarded regions ----- */
    /// Arm a failure guard and redirect output into a fresh buffer
    ///
    /// A catchable failure raised while the guard is armed discards the
    /// buffer and jumps to `handler` with the failure pending.
    EnterGuard { handler: usize, sink: SinkKind },
    /// Disarm the innermost guard and flush its buffer into the parent sink
    ExitGuard,
    /// Bind the pending failure to a name in the innermost scope
    BindFailure(String),
    /// Drop the pending failure
    DiscardFailure,
}
