//! Expression parser - pest grammar plus Pratt precedence climbing
//!
//! Produces [`Expr`] trees for the interiors of `{{ }}` and for the argument
//! part of block tags.

use std::sync::OnceLock;

use pest::iterators::{Pair, Pairs};
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use pest_derive::Parser;

use crate::error::SyntaxError;
use crate::runtime::{filters, Value};

use super::ast::{BinOp, Expr, Span, UnaryOp};

/* ===================== PEST Parser ===================== */

#[derive(Parser)]
#[grammar = "syntax/expr.pest"]
struct ExprParser;

fn pratt() -> &'static PrattParser<Rule> {
    static PRATT: OnceLock<PrattParser<Rule>> = OnceLock::new();
    PRATT.get_or_init(|| {
        PrattParser::new()
            .op(Op::infix(Rule::op_or, Assoc::Left))
            .op(Op::infix(Rule::op_and, Assoc::Left))
            .op(Op::prefix(Rule::op_not))
            .op(Op::infix(Rule::op_eq, Assoc::Left)
                | Op::infix(Rule::op_ne, Assoc::Left)
                | Op::infix(Rule::op_lt, Assoc::Left)
                | Op::infix(Rule::op_le, Assoc::Left)
                | Op::infix(Rule::op_gt, Assoc::Left)
                | Op::infix(Rule::op_ge, Assoc::Left)
                | Op::infix(Rule::op_in, Assoc::Left)
                | Op::infix(Rule::op_not_in, Assoc::Left))
            .op(Op::infix(Rule::op_add, Assoc::Left) | Op::infix(Rule::op_sub, Assoc::Left))
            .op(Op::infix(Rule::op_concat, Assoc::Left))
            .op(Op::infix(Rule::op_mul, Assoc::Left)
                | Op::infix(Rule::op_div, Assoc::Left)
                | Op::infix(Rule::op_floordiv, Assoc::Left)
                | Op::infix(Rule::op_mod, Assoc::Left))
            .op(Op::infix(Rule::op_pow, Assoc::Right))
            .op(Op::prefix(Rule::op_neg) | Op::prefix(Rule::op_pos))
            .op(Op::postfix(Rule::filter) | Op::postfix(Rule::test))
    })
}

/* ===================== Public API ===================== */

/// Parse a complete expression
///
/// `span` locates the tag the expression came from; it is attached to any
/// error so messages point at the template line.
pub fn parse_expression(source: &str, span: Span) -> Result<Expr, SyntaxError> {
    let mut pairs = ExprParser::parse(Rule::expression_root, source)
        .map_err(|e| pest_error(e, span))?;
    let root = next_inner(&mut pairs, span)?;
    let expr = next_inner(&mut root.into_inner(), span)?;
    build_expression(expr, span)
}

/// Parse `target in iterable` from a `for` tag
pub fn parse_for_head(source: &str, span: Span) -> Result<(String, Expr), SyntaxError> {
    let mut pairs = ExprParser::parse(Rule::for_root, source).map_err(|e| pest_error(e, span))?;
    let mut inner = next_inner(&mut pairs, span)?.into_inner();
    let target = next_inner(&mut inner, span)?.as_str().to_string();
    // kw_in
    next_inner(&mut inner, span)?;
    let iter = build_expression(next_inner(&mut inner, span)?, span)?;
    Ok((target, iter))
}

/// Parse `name = expr` from a `set` tag
pub fn parse_assignment(source: &str, span: Span) -> Result<(String, Expr), SyntaxError> {
    let mut pairs = ExprParser::parse(Rule::set_root, source).map_err(|e| pest_error(e, span))?;
    let mut inner = next_inner(&mut pairs, span)?.into_inner();
    let name = next_inner(&mut inner, span)?.as_str().to_string();
    let expr = build_expression(next_inner(&mut inner, span)?, span)?;
    Ok((name, expr))
}

/// Evaluate `source` as a Python-style literal, if it is one
///
/// Used by native rendering to turn concatenated output back into a typed
/// value. Anything that is not a plain literal yields `None`.
pub fn literal_eval(source: &str) -> Option<Value> {
    let mut pairs = ExprParser::parse(Rule::literal_root, source).ok()?;
    let root = pairs.next()?;
    let literal = root.into_inner().next()?;
    build_py_literal(literal)
}

/* ===================== AST Builder ===================== */

fn build_expression(pair: Pair<Rule>, span: Span) -> Result<Expr, SyntaxError> {
    pratt()
        .map_primary(|primary| build_operand(primary, span))
        .map_prefix(|op, rhs| {
            let op = match op.as_rule() {
                Rule::op_not => UnaryOp::Not,
                Rule::op_neg => UnaryOp::Neg,
                _ => UnaryOp::Pos,
            };
            Ok(Expr::Unary {
                op,
                expr: Box::new(rhs?),
            })
        })
        .map_postfix(|lhs, op| build_postfix(lhs?, op, span))
        .map_infix(|lhs, op, rhs| {
            let op = match op.as_rule() {
                Rule::op_or => BinOp::Or,
                Rule::op_and => BinOp::And,
                Rule::op_eq => BinOp::Eq,
                Rule::op_ne => BinOp::Ne,
                Rule::op_lt => BinOp::Lt,
                Rule::op_le => BinOp::Le,
                Rule::op_gt => BinOp::Gt,
                Rule::op_ge => BinOp::Ge,
                Rule::op_in => BinOp::In,
                Rule::op_not_in => BinOp::NotIn,
                Rule::op_add => BinOp::Add,
                Rule::op_sub => BinOp::Sub,
                Rule::op_concat => BinOp::Concat,
                Rule::op_mul => BinOp::Mul,
                Rule::op_div => BinOp::Div,
                Rule::op_floordiv => BinOp::FloorDiv,
                Rule::op_mod => BinOp::Mod,
                Rule::op_pow => BinOp::Pow,
                rule => {
                    return Err(SyntaxError::new(
                        format!("unexpected operator rule: {:?}", rule),
                        span,
                    ))
                }
            };
            Ok(Expr::Binary {
                op,
                left: Box::new(lhs?),
                right: Box::new(rhs?),
            })
        })
        .parse(pair.into_inner())
}

fn build_postfix(lhs: Expr, op: Pair<Rule>, span: Span) -> Result<Expr, SyntaxError> {
    match op.as_rule() {
        Rule::filter => {
            // filter = { "|" ~ identifier ~ call_args? }
            let mut inner = op.into_inner();
            let name = next_inner(&mut inner, span)?.as_str().to_string();
            if !filters::is_filter(&name) {
                return Err(SyntaxError::new(format!("no filter named '{}'", name), span));
            }
            let args = match inner.next() {
                Some(call) => build_call_args(call, span)?,
                None => vec![],
            };
            Ok(Expr::Filter {
                expr: Box::new(lhs),
                name,
                args,
            })
        }
        Rule::test => {
            // test = { kw_is ~ test_not? ~ attr_name ~ call_args? }
            let mut negated = false;
            let mut name = String::new();
            let mut args = vec![];
            for part in op.into_inner() {
                match part.as_rule() {
                    Rule::kw_is => {}
                    Rule::test_not => negated = true,
                    Rule::attr_name => name = part.as_str().to_string(),
                    Rule::call_args => args = build_call_args(part, span)?,
                    rule => {
                        return Err(SyntaxError::new(
                            format!("unexpected test rule: {:?}", rule),
                            span,
                        ))
                    }
                }
            }
            if !filters::is_test(&name) {
                return Err(SyntaxError::new(format!("no test named '{}'", name), span));
            }
            Ok(Expr::Test {
                expr: Box::new(lhs),
                name,
                args,
                negated,
            })
        }
        rule => Err(SyntaxError::new(
            format!("unexpected postfix rule: {:?}", rule),
            span,
        )),
    }
}

fn build_operand(pair: Pair<Rule>, span: Span) -> Result<Expr, SyntaxError> {
    // operand = { primary ~ accessor* }
    let mut inner = pair.into_inner();
    let mut expr = build_primary(next_inner(&mut inner, span)?, span)?;

    // Chain accessors left-to-right
    for accessor in inner {
        expr = match accessor.as_rule() {
            Rule::attr_access => {
                let attr = next_inner(&mut accessor.into_inner(), span)?.as_str().to_string();
                Expr::GetAttr {
                    object: Box::new(expr),
                    attr,
                }
            }
            Rule::subscript => {
                let index = build_expression(next_inner(&mut accessor.into_inner(), span)?, span)?;
                Expr::GetItem {
                    object: Box::new(expr),
                    index: Box::new(index),
                }
            }
            Rule::call_args => Expr::Call {
                func: Box::new(expr),
                args: build_call_args(accessor, span)?,
            },
            rule => {
                return Err(SyntaxError::new(
                    format!("unexpected accessor rule: {:?}", rule),
                    span,
                ))
            }
        };
    }

    Ok(expr)
}

fn build_primary(pair: Pair<Rule>, span: Span) -> Result<Expr, SyntaxError> {
    match pair.as_rule() {
        Rule::none_lit => Ok(Expr::Const(Value::None)),
        Rule::true_lit => Ok(Expr::Const(Value::Bool(true))),
        Rule::false_lit => Ok(Expr::Const(Value::Bool(false))),
        Rule::integer => {
            let text = pair.as_str();
            let value = text.parse::<i64>().map_err(|e| {
                SyntaxError::new(format!("invalid integer literal '{}': {}", text, e), span)
            })?;
            Ok(Expr::Const(Value::Int(value)))
        }
        Rule::float => {
            let text = pair.as_str();
            let value = text.parse::<f64>().map_err(|e| {
                SyntaxError::new(format!("invalid float literal '{}': {}", text, e), span)
            })?;
            Ok(Expr::Const(Value::Float(value)))
        }
        Rule::string => {
            let content = next_inner(&mut pair.into_inner(), span)?;
            Ok(Expr::Const(Value::Str(unescape(content.as_str()))))
        }
        Rule::identifier => Ok(Expr::Name(pair.as_str().to_string())),
        Rule::paren => build_expression(next_inner(&mut pair.into_inner(), span)?, span),
        Rule::list => {
            let items = pair
                .into_inner()
                .map(|item| build_expression(item, span))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::List(items))
        }
        Rule::dict => {
            let mut entries = Vec::new();
            for entry in pair.into_inner() {
                let mut kv = entry.into_inner();
                let key = build_expression(next_inner(&mut kv, span)?, span)?;
                let value = build_expression(next_inner(&mut kv, span)?, span)?;
                entries.push((key, value));
            }
            Ok(Expr::Dict(entries))
        }
        rule => Err(SyntaxError::new(
            format!("unexpected expression rule: {:?}", rule),
            span,
        )),
    }
}

fn build_call_args(pair: Pair<Rule>, span: Span) -> Result<Vec<Expr>, SyntaxError> {
    pair.into_inner()
        .map(|arg| build_expression(arg, span))
        .collect()
}

fn build_py_literal(pair: Pair<Rule>) -> Option<Value> {
    match pair.as_rule() {
        Rule::py_none => Some(Value::None),
        Rule::py_true => Some(Value::Bool(true)),
        Rule::py_false => Some(Value::Bool(false)),
        Rule::py_number => {
            let text = pair.as_str();
            if text.contains('.') {
                text.parse::<f64>().ok().map(Value::Float)
            } else {
                text.parse::<i64>().ok().map(Value::Int)
            }
        }
        Rule::string => {
            let content = pair.into_inner().next()?;
            Some(Value::Str(unescape(content.as_str())))
        }
        Rule::py_list => {
            let items = pair
                .into_inner()
                .map(build_py_literal)
                .collect::<Option<Vec<_>>>()?;
            Some(Value::list(items))
        }
        _ => None,
    }
}

/* ===================== Helpers ===================== */

fn next_inner<'i>(pairs: &mut Pairs<'i, Rule>, span: Span) -> Result<Pair<'i, Rule>, SyntaxError> {
    pairs
        .next()
        .ok_or_else(|| SyntaxError::new("unexpected end of expression", span))
}

fn pest_error(err: pest::error::Error<Rule>, span: Span) -> SyntaxError {
    let detail = match &err.variant {
        pest::error::ErrorVariant::ParsingError { .. } => {
            let (_, col) = match err.line_col {
                pest::error::LineColLocation::Pos(pos) => pos,
                pest::error::LineColLocation::Span(start, _) => start,
            };
            format!("unexpected token at position {} of '{}'", col, err.line().trim())
        }
        pest::error::ErrorVariant::CustomError { message } => message.clone(),
    };
    SyntaxError::new(format!("invalid expression: {}", detail), span)
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
