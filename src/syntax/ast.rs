//! Abstract Syntax Tree node types

use serde::{Deserialize, Serialize};

use crate::ext::ExtensionNode;
use crate::runtime::Value;

/// Source location span for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Span {
    /// Start byte offset
    pub start: usize,
    /// End byte offset
    pub end: usize,
    /// Start line (0-indexed)
    pub start_line: usize,
    /// Start column (0-indexed)
    pub start_col: usize,
    /// End line (0-indexed)
    pub end_line: usize,
    /// End column (0-indexed)
    pub end_col: usize,
}

impl Span {
    pub fn new(
        start: usize,
        end: usize,
        start_line: usize,
        start_col: usize,
        end_line: usize,
        end_col: usize,
    ) -> Self {
        Self {
            start,
            end,
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Create a span that covers both self and other
    pub fn merge(&self, other: &Span) -> Span {
        let (start, start_line, start_col) = if self.start <= other.start {
            (self.start, self.start_line, self.start_col)
        } else {
            (other.start, other.start_line, other.start_col)
        };
        let (end, end_line, end_col) = if self.end >= other.end {
            (self.end, self.end_line, self.end_col)
        } else {
            (other.end, other.end_line, other.end_col)
        };
        Span {
            start,
            end,
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }
}

/* ===================== Statements ===================== */

/// Template node
#[derive(Debug)]
pub enum Node {
    /// Literal template text
    Data { text: String, span: Span },
    /// `{{ expr }}`
    Output { expr: Expr, span: Span },
    If {
        branches: Vec<(Expr, Vec<Node>)>,
        else_body: Option<Vec<Node>>,
        span: Span,
    },
    For {
        target: String,
        iter: Expr,
        body: Vec<Node>,
        span: Span,
    },
    Set { name: String, expr: Expr, span: Span },
    /// Node contributed by an extension
    Extension(Box<dyn ExtensionNode>),
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::Data { span, .. }
            | Node::Output { span, .. }
            | Node::If { span, .. }
            | Node::For { span, .. }
            | Node::Set { span, .. } => *span,
            Node::Extension(node) => node.span(),
        }
    }

    /// Child statement sequences, in source order
    pub fn children(&self) -> Vec<&[Node]> {
        match self {
            Node::Data { .. } | Node::Output { .. } | Node::Set { .. } => vec![],
            Node::If {
                branches,
                else_body,
                ..
            } => {
                let mut out: Vec<&[Node]> = branches.iter().map(|(_, b)| b.as_slice()).collect();
                if let Some(body) = else_body {
                    out.push(body);
                }
                out
            }
            Node::For { body, .. } => vec![body.as_slice()],
            Node::Extension(node) => node.children(),
        }
    }

    /// Depth-first walk over this node and every descendant
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Node)) {
        visit(self);
        for body in self.children() {
            for child in body {
                child.walk(visit);
            }
        }
    }

    /// Name of the extension that produced this node, if any
    pub fn extension_name(&self) -> Option<&'static str> {
        match self {
            Node::Extension(node) => Some(node.name()),
            _ => None,
        }
    }
}

/* ===================== Expressions ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    /// `~` string concatenation
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::Concat => "~",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::In => "in",
            BinOp::NotIn => "not in",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
}

/// Expression AST node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(Value),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Name(String),
    GetAttr { object: Box<Expr>, attr: String },
    GetItem { object: Box<Expr>, index: Box<Expr> },
    Call { func: Box<Expr>, args: Vec<Expr> },
    Filter { expr: Box<Expr>, name: String, args: Vec<Expr> },
    Test {
        expr: Box<Expr>,
        name: String,
        args: Vec<Expr>,
        negated: bool,
    },
    Binary { op: BinOp, left: Box<Expr>, right: Box<Expr> },
    Unary { op: UnaryOp, expr: Box<Expr> },
}
