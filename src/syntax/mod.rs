//! Template syntax: tokenizer, expression grammar, block parser and AST

pub mod ast;
pub mod expressions;
pub mod lexer;
pub mod parser;

#[cfg(test)]
mod tests;

pub use ast::{BinOp, Expr, Node, Span, UnaryOp};
pub use lexer::LexerOptions;
pub use parser::{BlockTag, Parser};

use crate::error::SyntaxError;
use crate::ext::TagRegistry;

/// Parse template source into nodes using the tags in `registry`
pub fn parse(
    source: &str,
    options: LexerOptions,
    registry: &TagRegistry,
) -> Result<Vec<Node>, SyntaxError> {
    Parser::new(source, options, registry)?.parse()
}
