//! Template tokenizer
//!
//! Splits template source into text, `{{ variable }}` and `{% block %}`
//! tokens. Tag interiors are left as raw text; expressions inside them are
//! parsed later by the pest grammar.

use crate::error::SyntaxError;

use super::ast::Span;

/// Lexer options taken from the environment
#[derive(Debug, Clone, Copy, Default)]
pub struct LexerOptions {
    /// Remove the first newline after a block tag
    pub trim_blocks: bool,
    /// Keep a single trailing newline at the end of the source
    pub keep_trailing_newline: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Literal text between tags
    Data(String),
    /// Raw interior of `{{ ... }}`
    Variable(String),
    /// Raw interior of `{% ... %}`
    Block(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// Byte offset of the tag interior within the source (for expression spans)
    pub inner_start: usize,
}

#[derive(Clone, Copy, PartialEq)]
enum TagKind {
    Variable,
    Block,
    Comment,
}

impl TagKind {
    fn close(&self) -> &'static str {
        match self {
            TagKind::Variable => "}}",
            TagKind::Block => "%}",
            TagKind::Comment => "#}",
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            TagKind::Variable => "end of print statement",
            TagKind::Block => "end of statement block",
            TagKind::Comment => "end of comment",
        }
    }
}

/* ===================== Line Index ===================== */

/// Maps byte offsets to 0-indexed line/column pairs
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { line_starts }
    }

    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        (line, offset - self.line_starts[line])
    }

    pub fn span(&self, start: usize, end: usize) -> Span {
        let (start_line, start_col) = self.line_col(start);
        let (end_line, end_col) = self.line_col(end);
        Span::new(start, end, start_line, start_col, end_line, end_col)
    }
}

/* ===================== Tokenizer ===================== */

/// Tokenize template source
pub fn tokenize(source: &str, options: LexerOptions) -> Result<Vec<Token>, SyntaxError> {
    let source = if !options.keep_trailing_newline {
        source.strip_suffix('\n').unwrap_or(source)
    } else {
        source
    };
    let index = LineIndex::new(source);
    let mut tokens = Vec::new();
    let mut pos = 0;
    // Set by a `-` before a closing delimiter, or by trim_blocks after `%}`
    let mut strip_next = false;
    let mut trim_newline = false;

    while pos < source.len() {
        let Some((open_at, kind)) = find_open(source, pos) else {
            push_data(&mut tokens, &index, source, pos, source.len(), strip_next, trim_newline, false);
            break;
        };

        let after_open = open_at + 2;
        let strip_before = source[after_open..].starts_with('-');
        push_data(&mut tokens, &index, source, pos, open_at, strip_next, trim_newline, strip_before);

        let mut inner_start = after_open;
        if strip_before || source[after_open..].starts_with('+') {
            inner_start += 1;
        }

        let Some(close_at) = find_close(source, inner_start, kind) else {
            return Err(SyntaxError::new(
                format!("unexpected end of template, expected '{}'", kind.describe()),
                index.span(open_at, source.len()),
            ));
        };

        let mut inner_end = close_at;
        strip_next = false;
        if inner_end > inner_start {
            match source.as_bytes()[inner_end - 1] {
                b'-' => {
                    strip_next = true;
                    inner_end -= 1;
                }
                b'+' if kind == TagKind::Block => inner_end -= 1,
                _ => {}
            }
        }
        let end = close_at + 2;
        trim_newline = kind == TagKind::Block && options.trim_blocks;

        let span = index.span(open_at, end);
        let inner = source[inner_start..inner_end].to_string();
        match kind {
            TagKind::Variable => tokens.push(Token {
                kind: TokenKind::Variable(inner),
                span,
                inner_start,
            }),
            TagKind::Block => tokens.push(Token {
                kind: TokenKind::Block(inner),
                span,
                inner_start,
            }),
            TagKind::Comment => {}
        }
        pos = end;
    }

    Ok(tokens)
}

#[allow(clippy::too_many_arguments)]
fn push_data(
    tokens: &mut Vec<Token>,
    index: &LineIndex,
    source: &str,
    start: usize,
    end: usize,
    strip_leading: bool,
    trim_newline: bool,
    strip_trailing: bool,
) {
    let mut text = &source[start..end];
    let mut from = start;
    if strip_leading {
        let trimmed = text.trim_start();
        from += text.len() - trimmed.len();
        text = trimmed;
    } else if trim_newline {
        if let Some(rest) = text.strip_prefix("\r\n").or_else(|| text.strip_prefix('\n')) {
            from += text.len() - rest.len();
            text = rest;
        }
    }
    if strip_trailing {
        text = text.trim_end();
    }
    if text.is_empty() {
        return;
    }
    tokens.push(Token {
        kind: TokenKind::Data(text.to_string()),
        span: index.span(from, from + text.len()),
        inner_start: from,
    });
}

/// Find the next opening delimiter at or after `from`
fn find_open(source: &str, from: usize) -> Option<(usize, TagKind)> {
    let bytes = source.as_bytes();
    let mut i = from;
    while i + 1 < bytes.len() {
        if bytes[i] == b'{' {
            let kind = match bytes[i + 1] {
                b'{' => Some(TagKind::Variable),
                b'%' => Some(TagKind::Block),
                b'#' => Some(TagKind::Comment),
                _ => None,
            };
            if let Some(kind) = kind {
                return Some((i, kind));
            }
        }
        i += 1;
    }
    None
}

/// Find the closing delimiter for `kind`, skipping over quoted strings
fn find_close(source: &str, from: usize, kind: TagKind) -> Option<usize> {
    let close = kind.close().as_bytes();
    let bytes = source.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = from;
    while i + 1 < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None if kind != TagKind::Comment && (b == b'\'' || b == b'"') => quote = Some(b),
            None => {
                if b == close[0] && bytes[i + 1] == close[1] {
                    return Some(i);
                }
            }
        }
        i += 1;
    }
    None
}
