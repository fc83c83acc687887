//! Built-in filters and tests
//!
//! Names are checked at parse time through [`is_filter`] and [`is_test`], so
//! a misspelled filter is a syntax error rather than a render failure.

use crate::error::{Failure, FailureKind};
use crate::syntax::BinOp;

use super::ops;
use super::value::lock;
use super::Value;

const FILTERS: &[&str] = &[
    "join", "upper", "lower", "length", "count", "default", "d", "string", "int", "float", "abs",
    "first", "last", "list", "reverse", "trim", "replace", "title",
];

const TESTS: &[&str] = &[
    "defined", "undefined", "none", "number", "integer", "float", "string", "sequence", "mapping",
    "iterable", "callable", "boolean", "true", "false", "even", "odd", "divisibleby", "eq", "ne",
    "lt", "gt", "in",
];

pub fn is_filter(name: &str) -> bool {
    FILTERS.contains(&name)
}

pub fn is_test(name: &str) -> bool {
    TESTS.contains(&name)
}

/// Filters that accept an undefined input without raising
pub fn accepts_undefined(name: &str) -> bool {
    matches!(name, "default" | "d")
}

/// Tests that operate on the value itself and so raise on an undefined input
pub fn test_needs_value(name: &str) -> bool {
    matches!(name, "even" | "odd" | "divisibleby" | "lt" | "gt" | "in")
}

/* ===================== Filters ===================== */

pub fn apply_filter(name: &str, value: &Value, args: &[Value]) -> Result<Value, Failure> {
    match name {
        "default" | "d" => {
            let fallback = args.first().cloned().unwrap_or(Value::Str(String::new()));
            let boolean = args.get(1).map(Value::is_truthy).unwrap_or(false);
            if value.is_undefined() || (boolean && !value.is_truthy()) {
                Ok(fallback)
            } else {
                Ok(value.clone())
            }
        }
        "join" => {
            let sep = match args.first() {
                Some(sep) => sep.to_string(),
                None => String::new(),
            };
            let parts: Vec<String> = ops::iterate(value)?
                .iter()
                .map(Value::to_string)
                .collect();
            Ok(Value::Str(parts.join(&sep)))
        }
        "upper" => Ok(Value::Str(value.to_string().to_uppercase())),
        "lower" => Ok(Value::Str(value.to_string().to_lowercase())),
        "trim" => Ok(Value::Str(value.to_string().trim().to_string())),
        "title" => Ok(Value::Str(title_case(&value.to_string()))),
        "string" => Ok(Value::Str(value.to_string())),
        "replace" => {
            let (Some(old), Some(new)) = (args.first(), args.get(1)) else {
                return Err(Failure::type_error(
                    "replace() expects an old and a new string",
                ));
            };
            let text = value.to_string();
            let (old, new) = (old.to_string(), new.to_string());
            Ok(Value::Str(match args.get(2) {
                Some(Value::Int(count)) if *count >= 0 => {
                    text.replacen(&old, &new, *count as usize)
                }
                _ => text.replace(&old, &new),
            }))
        }
        "length" | "count" => length(value).map(|n| Value::Int(n as i64)),
        "int" => {
            let fallback = args.first().cloned().unwrap_or(Value::Int(0));
            Ok(to_int(value).map(Value::Int).unwrap_or(fallback))
        }
        "float" => {
            let fallback = args.first().cloned().unwrap_or(Value::Float(0.0));
            Ok(to_float(value).map(Value::Float).unwrap_or(fallback))
        }
        "abs" => match value {
            Value::Int(i) => i
                .checked_abs()
                .map(Value::Int)
                .ok_or_else(|| Failure::new(FailureKind::Overflow, "integer overflow")),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            other => Err(Failure::type_error(format!(
                "bad operand type for abs(): '{}'",
                other.type_name()
            ))),
        },
        "first" => Ok(ops::iterate(value)?
            .into_iter()
            .next()
            .unwrap_or_else(|| Value::Undefined("No first item, sequence was empty.".into()))),
        "last" => Ok(ops::iterate(value)?
            .into_iter()
            .next_back()
            .unwrap_or_else(|| Value::Undefined("No last item, sequence was empty.".into()))),
        "list" => ops::iterate(value).map(Value::list),
        "reverse" => match value {
            Value::Str(s) => Ok(Value::Str(s.chars().rev().collect())),
            other => {
                let mut items = ops::iterate(other)?;
                items.reverse();
                Ok(Value::list(items))
            }
        },
        _ => Err(Failure::new(
            FailureKind::Lookup,
            format!("no filter named '{}'", name),
        )),
    }
}

fn length(value: &Value) -> Result<usize, Failure> {
    match value {
        Value::Str(s) => Ok(s.chars().count()),
        Value::List(items) => Ok(lock(items).len()),
        Value::Map(map) => Ok(map.len()),
        other => Err(Failure::type_error(format!(
            "object of type '{}' has no len()",
            other.type_name()
        ))),
    }
}

fn to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Float(f) if f.is_finite() => Some(f.trunc() as i64),
        Value::Str(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
        }
        _ => None,
    }
}

fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Bool(b) => Some(f64::from(u8::from(*b))),
        Value::Float(f) => Some(*f),
        Value::Str(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut start = true;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            start = false;
        } else {
            out.push(c);
            start = true;
        }
    }
    out
}

/* ===================== Tests ===================== */

pub fn apply_test(name: &str, value: &Value, args: &[Value]) -> Result<bool, Failure> {
    let other = || {
        args.first().ok_or_else(|| {
            Failure::type_error(format!("test '{}' expects an argument", name))
        })
    };
    match name {
        "defined" => Ok(!value.is_undefined()),
        "undefined" => Ok(value.is_undefined()),
        "none" => Ok(matches!(value, Value::None)),
        "number" => Ok(matches!(value, Value::Int(_) | Value::Float(_))),
        "integer" => Ok(matches!(value, Value::Int(_))),
        "float" => Ok(matches!(value, Value::Float(_))),
        "string" => Ok(matches!(value, Value::Str(_))),
        "boolean" => Ok(matches!(value, Value::Bool(_))),
        "true" => Ok(matches!(value, Value::Bool(true))),
        "false" => Ok(matches!(value, Value::Bool(false))),
        "mapping" => Ok(matches!(value, Value::Map(_))),
        "sequence" | "iterable" => Ok(matches!(
            value,
            Value::Str(_) | Value::List(_) | Value::Map(_)
        )),
        "callable" => Ok(matches!(value, Value::Function(_))),
        "even" | "odd" => {
            let rem = ops::binary(BinOp::Mod, value, &Value::Int(2))?;
            Ok((rem == Value::Int(0)) == (name == "even"))
        }
        "divisibleby" => {
            let rem = ops::binary(BinOp::Mod, value, other()?)?;
            Ok(rem == Value::Int(0))
        }
        "eq" => Ok(value == other()?),
        "ne" => Ok(value != other()?),
        "lt" => ops::binary(BinOp::Lt, value, other()?).map(|v| v.is_truthy()),
        "gt" => ops::binary(BinOp::Gt, value, other()?).map(|v| v.is_truthy()),
        "in" => ops::contains(other()?, value),
        _ => Err(Failure::new(
            FailureKind::Lookup,
            format!("no test named '{}'", name),
        )),
    }
}

/* ===================== Globals ===================== */

/// `range([start,] stop[, step])`
pub fn range(args: &[Value]) -> Result<Value, Failure> {
    let ints: Vec<i64> = args
        .iter()
        .map(|a| match a {
            Value::Int(i) => Ok(*i),
            other => Err(Failure::type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                other.type_name()
            ))),
        })
        .collect::<Result<_, _>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => {
            return Err(Failure::type_error(format!(
                "range expected 1 to 3 arguments, got {}",
                ints.len()
            )))
        }
    };
    if step == 0 {
        return Err(Failure::value_error("range() arg 3 must not be zero"));
    }
    let mut items = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        items.push(Value::Int(i));
        i = match i.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(Value::list(items))
}
