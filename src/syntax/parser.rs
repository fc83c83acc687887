//! Block parser
//!
//! Turns the token stream into [`Node`]s. Built-in tags (`if`, `for`, `set`)
//! are handled here; every other opening tag is looked up in the
//! [`TagRegistry`] and parsed by the extension that registered it.

use crate::error::SyntaxError;
use crate::ext::TagRegistry;

use super::ast::{Expr, Node, Span};
use super::expressions;
use super::lexer::{self, LexerOptions, Token, TokenKind};

/* ===================== Block Tags ===================== */

/// A `{% name args %}` tag, split into its keyword and argument text
#[derive(Debug, Clone, PartialEq)]
pub struct BlockTag {
    pub name: String,
    pub args: String,
    pub span: Span,
}

impl BlockTag {
    fn from_token(inner: &str, span: Span) -> Result<Self, SyntaxError> {
        let trimmed = inner.trim();
        let name_len = trimmed
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(trimmed.len());
        if name_len == 0 {
            return Err(SyntaxError::new("tag name expected", span));
        }
        Ok(Self {
            name: trimmed[..name_len].to_string(),
            args: trimmed[name_len..].trim().to_string(),
            span,
        })
    }

    /// Fail unless the tag carries nothing after its keyword
    pub fn expect_no_args(&self) -> Result<(), SyntaxError> {
        if self.args.is_empty() {
            Ok(())
        } else {
            Err(SyntaxError::new(
                format!("expected end of statement block, got '{}'", self.args),
                self.span,
            ))
        }
    }
}

/* ===================== Parser ===================== */

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    registry: &'a TagRegistry,
    /// Opening tags whose bodies are currently being parsed
    tag_stack: Vec<String>,
    /// End tags each enclosing `parse_statements` call is waiting for
    end_tag_stack: Vec<Vec<String>>,
    eof_span: Span,
}

impl<'a> Parser<'a> {
    pub fn new(
        source: &str,
        options: LexerOptions,
        registry: &'a TagRegistry,
    ) -> Result<Self, SyntaxError> {
        let tokens = lexer::tokenize(source, options)?;
        let eof_span = lexer::LineIndex::new(source).span(source.len(), source.len());
        Ok(Self {
            tokens,
            pos: 0,
            registry,
            tag_stack: Vec::new(),
            end_tag_stack: Vec::new(),
            eof_span,
        })
    }

    /// Parse the whole template
    pub fn parse(mut self) -> Result<Vec<Node>, SyntaxError> {
        self.parse_statements(&[])
    }

    /// Parse nodes until a block tag named in `end_tags`
    ///
    /// The terminating tag is left unconsumed so the caller can inspect it
    /// with [`Parser::current_tag`], [`Parser::skip_tag`] or
    /// [`Parser::expect_tag`]. Running out of input is an error unless
    /// `end_tags` is empty.
    pub fn parse_statements(&mut self, end_tags: &[&str]) -> Result<Vec<Node>, SyntaxError> {
        self.end_tag_stack
            .push(end_tags.iter().map(|t| t.to_string()).collect());
        let result = self.parse_until(end_tags);
        self.end_tag_stack.pop();
        result
    }

    fn parse_until(&mut self, end_tags: &[&str]) -> Result<Vec<Node>, SyntaxError> {
        let mut body = Vec::new();
        loop {
            let Some(token) = self.tokens.get(self.pos) else {
                if end_tags.is_empty() {
                    return Ok(body);
                }
                return Err(self.eof_error(end_tags));
            };

            match &token.kind {
                TokenKind::Data(text) => {
                    body.push(Node::Data {
                        text: text.clone(),
                        span: token.span,
                    });
                    self.pos += 1;
                }
                TokenKind::Variable(source) => {
                    let expr = expressions::parse_expression(source, token.span)?;
                    body.push(Node::Output {
                        expr,
                        span: token.span,
                    });
                    self.pos += 1;
                }
                TokenKind::Block(inner) => {
                    let tag = BlockTag::from_token(inner, token.span)?;
                    if end_tags.contains(&tag.name.as_str()) {
                        return Ok(body);
                    }
                    self.pos += 1;
                    body.push(self.parse_statement(tag)?);
                }
            }
        }
    }

    /// The block tag at the current position, if the next token is one
    pub fn current_tag(&self) -> Option<BlockTag> {
        match self.tokens.get(self.pos) {
            Some(Token {
                kind: TokenKind::Block(inner),
                span,
                ..
            }) => BlockTag::from_token(inner, *span).ok(),
            _ => None,
        }
    }

    /// Consume the current tag if it is named `name`
    pub fn skip_tag(&mut self, name: &str) -> Result<Option<BlockTag>, SyntaxError> {
        match self.current_tag() {
            Some(tag) if tag.name == name => {
                tag.expect_no_args()?;
                self.pos += 1;
                Ok(Some(tag))
            }
            _ => Ok(None),
        }
    }

    /// Consume the current tag, which must be named `name`
    pub fn expect_tag(&mut self, name: &str) -> Result<BlockTag, SyntaxError> {
        if let Some(tag) = self.skip_tag(name)? {
            return Ok(tag);
        }
        match self.tokens.get(self.pos) {
            None => Err(self.eof_error(&[name])),
            Some(token) => Err(SyntaxError::new(
                format!("expected '{}' tag", name),
                token.span,
            )),
        }
    }

    /// Parse an expression found inside a tag
    pub fn parse_expression(&self, source: &str, span: Span) -> Result<Expr, SyntaxError> {
        expressions::parse_expression(source, span)
    }

    /* ===================== Statements ===================== */

    fn parse_statement(&mut self, tag: BlockTag) -> Result<Node, SyntaxError> {
        let name = tag.name.clone();
        self.tag_stack.push(name.clone());
        let result = match name.as_str() {
            "if" => self.parse_if(tag),
            "for" => self.parse_for(tag),
            "set" => self.parse_set(tag),
            name => {
                let registry = self.registry;
                match registry.get(name) {
                    Some(extension) => extension.parse(self, &tag),
                    None => Err(self.unknown_tag(&tag)),
                }
            }
        };
        self.tag_stack.pop();
        result
    }

    fn parse_if(&mut self, tag: BlockTag) -> Result<Node, SyntaxError> {
        let mut branches = Vec::new();
        let mut else_body = None;
        let mut test = self.parse_expression(&tag.args, tag.span)?;

        let end = loop {
            let body = self.parse_statements(&["elif", "else", "endif"])?;
            branches.push((test, body));

            if let Some(elif) = self.current_tag().filter(|t| t.name == "elif") {
                self.pos += 1;
                test = self.parse_expression(&elif.args, elif.span)?;
                continue;
            }
            if self.skip_tag("else")?.is_some() {
                else_body = Some(self.parse_statements(&["endif"])?);
            }
            break self.expect_tag("endif")?;
        };

        Ok(Node::If {
            branches,
            else_body,
            span: tag.span.merge(&end.span),
        })
    }

    fn parse_for(&mut self, tag: BlockTag) -> Result<Node, SyntaxError> {
        let (target, iter) = expressions::parse_for_head(&tag.args, tag.span)?;
        let body = self.parse_statements(&["endfor"])?;
        let end = self.expect_tag("endfor")?;
        Ok(Node::For {
            target,
            iter,
            body,
            span: tag.span.merge(&end.span),
        })
    }

    fn parse_set(&mut self, tag: BlockTag) -> Result<Node, SyntaxError> {
        let (name, expr) = expressions::parse_assignment(&tag.args, tag.span)?;
        Ok(Node::Set {
            name,
            expr,
            span: tag.span,
        })
    }

    /* ===================== Diagnostics ===================== */

    fn unknown_tag(&self, tag: &BlockTag) -> SyntaxError {
        let mut message = format!("encountered unknown tag '{}'", tag.name);
        if let Some(expected) = self.end_tag_stack.last().filter(|e| !e.is_empty()) {
            message.push_str(&format!(", expected {}", quote_list(expected)));
            // The unknown tag itself sits on top of tag_stack
            if let Some(open) = self.tag_stack.iter().rev().nth(1) {
                message.push_str(&format!(
                    "; the innermost block that needs to be closed is '{}'",
                    open
                ));
            }
        }
        SyntaxError::new(message, tag.span)
    }

    fn eof_error(&self, expected: &[&str]) -> SyntaxError {
        let expected: Vec<String> = expected.iter().map(|t| t.to_string()).collect();
        let mut message = format!(
            "unexpected end of template, expected {}",
            quote_list(&expected)
        );
        if let Some(open) = self.tag_stack.last() {
            message.push_str(&format!(
                "; the innermost block that needs to be closed is '{}'",
                open
            ));
        }
        SyntaxError::new(message, self.eof_span)
    }
}

fn quote_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("'{}'", n))
        .collect::<Vec<_>>()
        .join(" or ")
}
