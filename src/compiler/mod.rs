//! Code generator
//!
//! Lowers template nodes into a flat [`Program`] for the runtime VM. The
//! evaluation mode is a property of the environment: the same nodes can be
//! compiled once per mode, and each compilation is independent.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::runtime::buffer::SinkKind;
use crate::syntax::{BinOp, Expr, Node};

pub mod instr;
pub mod strategy;

#[cfg(test)]
mod tests;

pub use instr::Instr;
pub use strategy::{AsyncStrategy, NativeStrategy, RenderStrategy, SyncStrategy};

/* ===================== Modes ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Execution {
    #[default]
    Sync,
    /// Values may be awaitable; rendering can suspend
    Async,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompileMode {
    pub execution: Execution,
    /// Render typed fragments instead of text
    pub native: bool,
}

impl CompileMode {
    pub const SYNC: CompileMode = CompileMode {
        execution: Execution::Sync,
        native: false,
    };
    pub const ASYNC: CompileMode = CompileMode {
        execution: Execution::Async,
        native: false,
    };
    pub const NATIVE: CompileMode = CompileMode {
        execution: Execution::Sync,
        native: true,
    };
    pub const NATIVE_ASYNC: CompileMode = CompileMode {
        execution: Execution::Async,
        native: true,
    };

    pub fn is_async(&self) -> bool {
        self.execution == Execution::Async
    }

    /// The strategy that emits code for this mode
    pub fn strategy(&self) -> &'static dyn RenderStrategy {
        match (self.execution, self.native) {
            (Execution::Sync, false) => &strategy::SYNC,
            (Execution::Async, false) => &strategy::ASYNC,
            (Execution::Sync, true) => &strategy::NATIVE,
            (Execution::Async, true) => &strategy::NATIVE_ASYNC,
        }
    }
}

/* ===================== Program ===================== */

/// Compiled template
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub code: Vec<Instr>,
    pub mode: CompileMode,
    /// Kind of the root output sink
    pub sink: SinkKind,
}

/// Compile `nodes` for `mode`
pub fn compile(nodes: &[Node], mode: CompileMode) -> Program {
    let mut codegen = CodeGenerator::new(mode);
    codegen.compile_body(nodes);
    codegen.finish()
}

/* ===================== Code Generator ===================== */

pub struct CodeGenerator<'s> {
    code: Vec<Instr>,
    mode: CompileMode,
    strategy: &'s dyn RenderStrategy,
}

impl CodeGenerator<'static> {
    pub fn new(mode: CompileMode) -> Self {
        Self {
            code: Vec::new(),
            mode,
            strategy: mode.strategy(),
        }
    }
}

impl<'s> CodeGenerator<'s> {
    /// Generator driven by a caller-supplied strategy
    pub fn with_strategy(mode: CompileMode, strategy: &'s dyn RenderStrategy) -> Self {
        Self {
            code: Vec::new(),
            mode,
            strategy,
        }
    }

    pub fn mode(&self) -> CompileMode {
        self.mode
    }

    pub fn strategy(&self) -> &'s dyn RenderStrategy {
        self.strategy
    }

    pub fn finish(self) -> Program {
        debug!(
            strategy = self.strategy.name(),
            instructions = self.code.len(),
            "compiled template"
        );
        Program {
            code: self.code,
            mode: self.mode,
            sink: self.strategy.sink(),
        }
    }

    /* ===================== Emission ===================== */

    /// Append an instruction, returning its index
    pub fn emit(&mut self, instr: Instr) -> usize {
        self.code.push(instr);
        self.code.len() - 1
    }

    /// Index the next emitted instruction will get
    pub fn next_pc(&self) -> usize {
        self.code.len()
    }

    /// Point the jump-like instruction at `at` to `target`
    pub fn patch(&mut self, at: usize, target: usize) {
        match &mut self.code[at] {
            Instr::Jump(t)
            | Instr::JumpIfFalse(t)
            | Instr::JumpIfFalseOrPop(t)
            | Instr::JumpIfTrueOrPop(t)
            | Instr::EnterGuard { handler: t, .. }
            | Instr::IterNext { exit: t, .. } => *t = target,
            other => panic!("Internal error: patching non-jump instruction {:?}", other),
        }
    }

    /// Emit a suspension point if the strategy needs one
    fn await_point(&mut self) {
        if self.strategy.suspends() {
            self.emit(Instr::Await);
        }
    }

    /* ===================== Statements ===================== */

    pub fn compile_body(&mut self, nodes: &[Node]) {
        for node in nodes {
            self.compile_node(node);
        }
    }

    pub fn compile_node(&mut self, node: &Node) {
        match node {
            Node::Data { text, .. } => {
                self.emit(Instr::EmitData(text.clone()));
            }
            Node::Output { expr, .. } => {
                self.compile_expr(expr);
                self.emit(Instr::Output);
            }
            Node::If {
                branches,
                else_body,
                ..
            } => {
                let mut exits = Vec::new();
                for (test, body) in branches {
                    self.compile_expr(test);
                    let skip = self.emit(Instr::JumpIfFalse(0));
                    self.compile_body(body);
                    exits.push(self.emit(Instr::Jump(0)));
                    let next = self.next_pc();
                    self.patch(skip, next);
                }
                if let Some(body) = else_body {
                    self.compile_body(body);
                }
                let end = self.next_pc();
                for exit in exits {
                    self.patch(exit, end);
                }
            }
            Node::For {
                target, iter, body, ..
            } => {
                self.compile_expr(iter);
                self.emit(Instr::IterStart);
                self.emit(Instr::PushScope);
                let top = self.emit(Instr::IterNext {
                    target: target.clone(),
                    exit: 0,
                });
                self.compile_body(body);
                self.emit(Instr::Jump(top));
                let exit = self.next_pc();
                self.patch(top, exit);
                self.emit(Instr::PopScope);
            }
            Node::Set { name, expr, .. } => {
                self.compile_expr(expr);
                self.emit(Instr::StoreName(name.clone()));
            }
            Node::Extension(ext) => ext.compile(self),
        }
    }

    /* ===================== Expressions ===================== */

    pub fn compile_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Const(value) => {
                self.emit(Instr::Const(value.clone()));
            }
            Expr::List(items) => {
                for item in items {
                    self.compile_expr(item);
                }
                self.emit(Instr::BuildList(items.len()));
            }
            Expr::Dict(entries) => {
                for (key, value) in entries {
                    self.compile_expr(key);
                    self.compile_expr(value);
                }
                self.emit(Instr::BuildMap(entries.len()));
            }
            Expr::Name(name) => {
                self.emit(Instr::LoadName(name.clone()));
                self.await_point();
            }
            Expr::GetAttr { object, attr } => {
                self.compile_expr(object);
                self.emit(Instr::GetAttr(attr.clone()));
                self.await_point();
            }
            Expr::GetItem { object, index } => {
                self.compile_expr(object);
                self.compile_expr(index);
                self.emit(Instr::GetItem);
                self.await_point();
            }
            Expr::Call { func, args } => {
                if let Expr::GetAttr { object, attr } = func.as_ref() {
                    self.compile_expr(object);
                    self.compile_args(args);
                    self.emit(Instr::CallMethod {
                        name: attr.clone(),
                        argc: args.len(),
                    });
                } else {
                    self.compile_expr(func);
                    self.compile_args(args);
                    self.emit(Instr::Call { argc: args.len() });
                }
                self.await_point();
            }
            Expr::Filter { expr, name, args } => {
                self.compile_expr(expr);
                self.compile_args(args);
                self.emit(Instr::Filter {
                    name: name.clone(),
                    argc: args.len(),
                });
                self.await_point();
            }
            Expr::Test {
                expr,
                name,
                args,
                negated,
            } => {
                self.compile_expr(expr);
                self.compile_args(args);
                self.emit(Instr::Test {
                    name: name.clone(),
                    argc: args.len(),
                    negated: *negated,
                });
            }
            Expr::Binary { op, left, right } => {
                self.compile_expr(left);
                match op {
                    BinOp::And | BinOp::Or => {
                        let jump = if *op == BinOp::And {
                            self.emit(Instr::JumpIfFalseOrPop(0))
                        } else {
                            self.emit(Instr::JumpIfTrueOrPop(0))
                        };
                        self.compile_expr(right);
                        let end = self.next_pc();
                        self.patch(jump, end);
                    }
                    _ => {
                        self.compile_expr(right);
                        self.emit(Instr::Binary(*op));
                    }
                }
            }
            Expr::Unary { op, expr } => {
                self.compile_expr(expr);
                self.emit(Instr::Unary(*op));
            }
        }
    }

    fn compile_args(&mut self, args: &[Expr]) {
        for arg in args {
            self.compile_expr(arg);
        }
    }
}
