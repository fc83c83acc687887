//! `{% do expr %}`: evaluate an expression and drop its result

use crate::compiler::{CodeGenerator, Instr};
use crate::error::SyntaxError;
use crate::syntax::{BlockTag, Expr, Node, Parser, Span};

use super::{Extension, ExtensionNode};

#[derive(Debug, Clone, Copy, Default)]
pub struct ExprStmtExtension;

impl Extension for ExprStmtExtension {
    fn name(&self) -> &'static str {
        "do"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["do"]
    }

    fn parse(&self, parser: &mut Parser<'_>, tag: &BlockTag) -> Result<Node, SyntaxError> {
        let expr = parser.parse_expression(&tag.args, tag.span)?;
        Ok(Node::Extension(Box::new(ExprStmt {
            expr,
            span: tag.span,
        })))
    }
}

#[derive(Debug)]
pub struct ExprStmt {
    pub expr: Expr,
    pub span: Span,
}

impl ExtensionNode for ExprStmt {
    fn name(&self) -> &'static str {
        "do"
    }

    fn span(&self) -> Span {
        self.span
    }

    fn children(&self) -> Vec<&[Node]> {
        vec![]
    }

    fn compile(&self, codegen: &mut CodeGenerator<'_>) {
        codegen.compile_expr(&self.expr);
        codegen.emit(Instr::Pop);
    }
}
