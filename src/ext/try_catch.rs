//! `{% try %} … [{% catch %} …] {% endtry %}`
//!
//! The protected region renders into its own buffer. If it raises a runtime
//! failure the buffer is dropped, the failure is bound to [`EXCEPTION_VAR`]
//! inside the fallback region and the fallback renders in its place. Without
//! a `catch` clause the construct renders nothing on failure.

use crate::compiler::{CodeGenerator, Instr};
use crate::error::SyntaxError;
use crate::syntax::{BlockTag, Node, Parser, Span};

use super::{Extension, ExtensionNode};

/// Name the captured failure is bound to inside the fallback region
pub const EXCEPTION_VAR: &str = "exception";

/* ===================== Extension ===================== */

#[derive(Debug, Clone, Copy, Default)]
pub struct TryCatchExtension;

impl TryCatchExtension {
    fn parse_region(
        parser: &mut Parser<'_>,
        end_tags: &[&str],
        span: Span,
    ) -> Result<Vec<Node>, SyntaxError> {
        let body = parser.parse_statements(end_tags)?;
        if body.is_empty() {
            // Keeps native rendering of an empty region a string
            return Ok(vec![Node::Data {
                text: String::new(),
                span,
            }]);
        }
        Ok(body)
    }
}

impl Extension for TryCatchExtension {
    fn name(&self) -> &'static str {
        "try_catch"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["try"]
    }

    fn parse(&self, parser: &mut Parser<'_>, tag: &BlockTag) -> Result<Node, SyntaxError> {
        tag.expect_no_args()?;

        let protected_body = Self::parse_region(parser, &["catch", "endtry"], tag.span)?;
        let fallback_body = match parser.skip_tag("catch")? {
            Some(catch) => Some(Self::parse_region(parser, &["endtry"], catch.span)?),
            None => None,
        };
        let end = parser.expect_tag("endtry")?;

        Ok(Node::Extension(Box::new(TryCatch {
            protected_body,
            fallback_body,
            span: tag.span.merge(&end.span),
        })))
    }
}

/* ===================== Node ===================== */

/// One `try` construct
#[derive(Debug)]
pub struct TryCatch {
    pub protected_body: Vec<Node>,
    /// `None` when there is no `catch` clause
    pub fallback_body: Option<Vec<Node>>,
    pub span: Span,
}

impl ExtensionNode for TryCatch {
    fn name(&self) -> &'static str {
        "try_catch"
    }

    fn span(&self) -> Span {
        self.span
    }

    fn children(&self) -> Vec<&[Node]> {
        let mut out: Vec<&[Node]> = vec![self.protected_body.as_slice()];
        if let Some(fallback) = &self.fallback_body {
            out.push(fallback.as_slice());
        }
        out
    }

    fn compile(&self, codegen: &mut CodeGenerator<'_>) {
        let sink = codegen.strategy().sink();
        let guard = codegen.emit(Instr::EnterGuard { handler: 0, sink });

        codegen.emit(Instr::PushScope);
        codegen.compile_body(&self.protected_body);
        codegen.emit(Instr::PopScope);
        codegen.emit(Instr::ExitGuard);
        let done = codegen.emit(Instr::Jump(0));

        let handler = codegen.next_pc();
        codegen.patch(guard, handler);
        match &self.fallback_body {
            Some(fallback) => {
                codegen.emit(Instr::PushScope);
                codegen.emit(Instr::BindFailure(EXCEPTION_VAR.to_string()));
                codegen.compile_body(fallback);
                codegen.emit(Instr::PopScope);
            }
            None => {
                codegen.emit(Instr::DiscardFailure);
                // A swallowed failure still renders as an empty string
                codegen.emit(Instr::EmitData(String::new()));
            }
        }

        let end = codegen.next_pc();
        codegen.patch(done, end);
    }
}
