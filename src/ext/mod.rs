//! Extension protocol
//!
//! An [`Extension`] contributes block tags to the parser. When the parser
//! meets one of its opening tags it hands control to [`Extension::parse`],
//! which consumes tokens and returns a single node. Nodes contributed this
//! way implement [`ExtensionNode`], the capability set every compilable node
//! must provide.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use tracing::warn;

use crate::compiler::CodeGenerator;
use crate::error::SyntaxError;
use crate::syntax::{BlockTag, Node, Parser, Span};

pub mod expr_stmt;
pub mod try_catch;

pub use expr_stmt::{ExprStmt, ExprStmtExtension};
pub use try_catch::{TryCatch, TryCatchExtension, EXCEPTION_VAR};

/* ===================== Traits ===================== */

/// A parser extension activated through the environment's extension list
pub trait Extension: Send + Sync {
    /// Name used to activate the extension from configuration
    fn name(&self) -> &'static str;

    /// Opening tags this extension parses
    fn tags(&self) -> &'static [&'static str];

    /// Parse one construct
    ///
    /// Called with the parser positioned just after the opening `tag`.
    fn parse(&self, parser: &mut Parser<'_>, tag: &BlockTag) -> Result<Node, SyntaxError>;
}

/// AST node provided by an extension
pub trait ExtensionNode: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn span(&self) -> Span;

    /// Child statement sequences, in source order
    fn children(&self) -> Vec<&[Node]>;

    /// Emit code for the mode `codegen` is compiling for
    fn compile(&self, codegen: &mut CodeGenerator<'_>);
}

/* ===================== Tag Registry ===================== */

/// Maps opening tag keywords to the extension that parses them
#[derive(Clone, Default)]
pub struct TagRegistry {
    tags: HashMap<String, Arc<dyn Extension>>,
    extensions: Vec<Arc<dyn Extension>>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every tag of `extension`
    ///
    /// A tag already claimed by another extension is taken over by the new
    /// one.
    pub fn register(&mut self, extension: Arc<dyn Extension>) {
        for tag in extension.tags() {
            if let Some(previous) = self.tags.insert(tag.to_string(), extension.clone()) {
                warn!(
                    tag = *tag,
                    previous = previous.name(),
                    extension = extension.name(),
                    "tag registered twice, later extension wins"
                );
            }
        }
        self.extensions.push(extension);
    }

    pub fn get(&self, tag: &str) -> Option<&Arc<dyn Extension>> {
        self.tags.get(tag)
    }

    /// Names of the registered extensions, in registration order
    pub fn extension_names(&self) -> Vec<&'static str> {
        self.extensions.iter().map(|e| e.name()).collect()
    }
}

impl Debug for TagRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagRegistry")
            .field("extensions", &self.extension_names())
            .finish()
    }
}

/// Look up a built-in extension by its configuration name
pub fn builtin_extension(name: &str) -> Option<Arc<dyn Extension>> {
    match name {
        "try_catch" => Some(Arc::new(TryCatchExtension)),
        "do" => Some(Arc::new(ExprStmtExtension)),
        _ => None,
    }
}
