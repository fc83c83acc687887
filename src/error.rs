//! Error types
//!
//! Compile-time problems are [`SyntaxError`]s and are never visible to a
//! rendering template. Everything raised while rendering is a [`Failure`];
//! these are the values a `{% try %}` block intercepts and exposes as
//! `exception`.

use std::fmt;

use thiserror::Error;

use crate::syntax::Span;

/* ===================== Compile Time ===================== */

/// Malformed template source
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} (line {}, column {})", .span.start_line + 1, .span.start_col + 1)]
pub struct SyntaxError {
    pub message: String,
    pub span: Span,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }

    /// 1-based line number, the way template authors count lines
    pub fn line(&self) -> usize {
        self.span.start_line + 1
    }
}

/* ===================== Render Time ===================== */

/// Category of a render-time failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// An undefined value was used
    Undefined,
    /// Division or modulo by zero
    ZeroDivision,
    /// Operation applied to a value of the wrong type
    Type,
    /// Missing attribute or method
    Attribute,
    /// Bad argument value
    Value,
    /// Index or key lookup failed
    Lookup,
    /// Integer arithmetic overflowed
    Overflow,
    /// Raised by a procedure called from the template
    Raised,
    /// The enclosing render was cancelled; never caught by `try`
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Undefined => "UndefinedError",
            FailureKind::ZeroDivision => "ZeroDivisionError",
            FailureKind::Type => "TypeError",
            FailureKind::Attribute => "AttributeError",
            FailureKind::Value => "ValueError",
            FailureKind::Lookup => "LookupError",
            FailureKind::Overflow => "OverflowError",
            FailureKind::Raised => "RuntimeError",
            FailureKind::Cancelled => "CancelledError",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A render-time failure
///
/// Its `Display` output is the message alone, which is also how `{{ exception }}`
/// renders inside a catch block.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct Failure {
    kind: FailureKind,
    message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn undefined(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Undefined, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Type, message)
    }

    pub fn attribute(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Attribute, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Value, message)
    }

    pub fn zero_division(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ZeroDivision, message)
    }

    /// Failure raised by user code (a context function or awaited value)
    pub fn raised(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Raised, message)
    }

    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "render cancelled")
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether a `try` guard may intercept this failure
    pub fn is_catchable(&self) -> bool {
        self.kind != FailureKind::Cancelled
    }
}

/// Why a render did not produce output
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Failure(#[from] Failure),

    #[error("render was cancelled")]
    Cancelled,

    #[error("the environment was not created with async mode enabled")]
    AsyncDisabled,

    #[error("cannot block on an async template inside a running tokio runtime, use render_async")]
    NestedRuntime,

    #[error("failed to start render runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("virtual machine stopped in an unexpected state: {0}")]
    Internal(String),
}

impl RenderError {
    /// The underlying template failure, if that is what stopped the render
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            RenderError::Failure(f) => Some(f),
            _ => None,
        }
    }
}

/* ===================== Configuration ===================== */

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unknown extension '{0}'")]
    UnknownExtension(String),
}

/// Umbrella error for callers that compile and render in one go
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
