//! Operators, lookups and calls
//!
//! Failure messages follow the wording template authors know from Jinja,
//! since they are what `{{ exception }}` renders inside a catch block.

use std::cmp::Ordering;

use crate::error::{Failure, FailureKind};
use crate::syntax::{BinOp, UnaryOp};

use super::value::lock;
use super::Value;

/* ===================== Operators ===================== */

/// Apply an eager binary operator (everything except `and`/`or`)
pub fn binary(op: BinOp, left: &Value, right: &Value) -> Result<Value, Failure> {
    match op {
        BinOp::Add => add(left, right),
        BinOp::Sub => arith(op, left, right, i64::checked_sub, |a, b| a - b),
        BinOp::Mul => mul(left, right),
        BinOp::Div => div(left, right),
        BinOp::FloorDiv => floor_div(left, right),
        BinOp::Mod => modulo(left, right),
        BinOp::Pow => pow(left, right),
        BinOp::Concat => Ok(Value::Str(format!("{}{}", left, right))),
        BinOp::Eq => Ok(Value::Bool(left == right)),
        BinOp::Ne => Ok(Value::Bool(left != right)),
        BinOp::Lt => compare(op, left, right).map(|o| Value::Bool(o == Ordering::Less)),
        BinOp::Le => compare(op, left, right).map(|o| Value::Bool(o != Ordering::Greater)),
        BinOp::Gt => compare(op, left, right).map(|o| Value::Bool(o == Ordering::Greater)),
        BinOp::Ge => compare(op, left, right).map(|o| Value::Bool(o != Ordering::Less)),
        BinOp::In => contains(right, left).map(Value::Bool),
        BinOp::NotIn => contains(right, left).map(|found| Value::Bool(!found)),
        BinOp::And | BinOp::Or => Err(Failure::new(
            FailureKind::Raised,
            format!("'{}' is evaluated lazily", op.symbol()),
        )),
    }
}

pub fn unary(op: UnaryOp, value: &Value) -> Result<Value, Failure> {
    match (op, value) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
        (UnaryOp::Neg, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(overflow),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Value::Int(_) | Value::Float(_)) => Ok(value.clone()),
        (UnaryOp::Neg | UnaryOp::Pos, v) => Err(Failure::type_error(format!(
            "bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            v.type_name()
        ))),
    }
}

fn unsupported(op: BinOp, left: &Value, right: &Value) -> Failure {
    Failure::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

fn overflow() -> Failure {
    Failure::new(FailureKind::Overflow, "integer overflow")
}

/// Numeric view of a value; booleans count as integers
fn as_number(value: &Value) -> Option<Number> {
    match value {
        Value::Int(i) => Some(Number::Int(*i)),
        Value::Bool(b) => Some(Number::Int(i64::from(*b))),
        Value::Float(f) => Some(Number::Float(*f)),
        _ => None,
    }
}

#[derive(Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

fn arith(
    op: BinOp,
    left: &Value,
    right: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, Failure> {
    match (as_number(left), as_number(right)) {
        (Some(Number::Int(a)), Some(Number::Int(b))) => {
            int_op(a, b).map(Value::Int).ok_or_else(overflow)
        }
        (Some(a), Some(b)) => Ok(Value::Float(float_op(a.as_f64(), b.as_f64()))),
        _ => Err(unsupported(op, left, right)),
    }
}

fn add(left: &Value, right: &Value) -> Result<Value, Failure> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
        (Value::Str(_), other) => Err(Failure::type_error(format!(
            "can only concatenate str (not \"{}\") to str",
            other.type_name()
        ))),
        (Value::List(a), Value::List(b)) => {
            let mut items = lock(a).clone();
            items.extend(lock(b).iter().cloned());
            Ok(Value::list(items))
        }
        _ => arith(BinOp::Add, left, right, i64::checked_add, |a, b| a + b),
    }
}

fn mul(left: &Value, right: &Value) -> Result<Value, Failure> {
    match (left, right) {
        (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
            Ok(Value::Str(s.repeat((*n).max(0) as usize)))
        }
        (Value::List(items), Value::Int(n)) | (Value::Int(n), Value::List(items)) => {
            let items = lock(items);
            let mut out = Vec::with_capacity(items.len() * (*n).max(0) as usize);
            for _ in 0..(*n).max(0) {
                out.extend(items.iter().cloned());
            }
            Ok(Value::list(out))
        }
        _ => arith(BinOp::Mul, left, right, i64::checked_mul, |a, b| a * b),
    }
}

fn div(left: &Value, right: &Value) -> Result<Value, Failure> {
    match (as_number(left), as_number(right)) {
        (Some(a), Some(b)) => {
            if b.as_f64() == 0.0 {
                let message = match (a, b) {
                    (Number::Int(_), Number::Int(_)) => "division by zero",
                    _ => "float division by zero",
                };
                return Err(Failure::zero_division(message));
            }
            Ok(Value::Float(a.as_f64() / b.as_f64()))
        }
        _ => Err(unsupported(BinOp::Div, left, right)),
    }
}

fn floor_div(left: &Value, right: &Value) -> Result<Value, Failure> {
    match (as_number(left), as_number(right)) {
        (Some(Number::Int(a)), Some(Number::Int(b))) => {
            if b == 0 {
                return Err(Failure::zero_division("integer division or modulo by zero"));
            }
            let (q, r) = (a.wrapping_div(b), a.wrapping_rem(b));
            // Round towards negative infinity
            let q = if r != 0 && ((r < 0) != (b < 0)) { q - 1 } else { q };
            Ok(Value::Int(q))
        }
        (Some(a), Some(b)) => {
            if b.as_f64() == 0.0 {
                return Err(Failure::zero_division("float floor division by zero"));
            }
            Ok(Value::Float((a.as_f64() / b.as_f64()).floor()))
        }
        _ => Err(unsupported(BinOp::FloorDiv, left, right)),
    }
}

fn modulo(left: &Value, right: &Value) -> Result<Value, Failure> {
    match (as_number(left), as_number(right)) {
        (Some(Number::Int(a)), Some(Number::Int(b))) => {
            if b == 0 {
                return Err(Failure::zero_division("integer modulo by zero"));
            }
            let r = a.wrapping_rem(b);
            // Result takes the sign of the divisor
            let r = if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r };
            Ok(Value::Int(r))
        }
        (Some(a), Some(b)) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            if b == 0.0 {
                return Err(Failure::zero_division("float modulo by zero"));
            }
            let r = a % b;
            let r = if r != 0.0 && ((r < 0.0) != (b < 0.0)) { r + b } else { r };
            Ok(Value::Float(r))
        }
        _ => Err(unsupported(BinOp::Mod, left, right)),
    }
}

fn pow(left: &Value, right: &Value) -> Result<Value, Failure> {
    match (as_number(left), as_number(right)) {
        (Some(Number::Int(a)), Some(Number::Int(b))) if b >= 0 => {
            let exp = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exp).map(Value::Int).ok_or_else(overflow)
        }
        (Some(a), Some(b)) => {
            if a.as_f64() == 0.0 && b.as_f64() < 0.0 {
                return Err(Failure::zero_division(
                    "0.0 cannot be raised to a negative power",
                ));
            }
            Ok(Value::Float(a.as_f64().powf(b.as_f64())))
        }
        _ => Err(unsupported(BinOp::Pow, left, right)),
    }
}

fn compare(op: BinOp, left: &Value, right: &Value) -> Result<Ordering, Failure> {
    let ordering = match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => match (as_number(left), as_number(right)) {
            (Some(a), Some(b)) => a.as_f64().partial_cmp(&b.as_f64()),
            _ => None,
        },
    };
    ordering.ok_or_else(|| {
        Failure::type_error(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ))
    })
}

/// Membership test: `item in container`
pub fn contains(container: &Value, item: &Value) -> Result<bool, Failure> {
    match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(needle.as_str())),
            other => Err(Failure::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => Ok(lock(items).iter().any(|v| v == item)),
        Value::Map(map) => Ok(match item {
            Value::Str(key) => map.contains_key(key),
            _ => false,
        }),
        other => Err(Failure::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

/* ===================== Lookups ===================== */

/// `value.name`
///
/// Missing attributes produce an undefined marker rather than failing, so
/// `is defined` and the `default` filter can inspect them.
pub fn get_attr(value: &Value, name: &str) -> Result<Value, Failure> {
    match value {
        Value::Undefined(message) => Err(Failure::undefined(message.clone())),
        Value::Map(map) => Ok(map
            .get(name)
            .cloned()
            .unwrap_or_else(|| no_attribute(value, name))),
        Value::Failure(failure) => Ok(match name {
            "message" => Value::Str(failure.message().to_string()),
            "kind" => Value::Str(failure.kind().as_str().to_string()),
            _ => no_attribute(value, name),
        }),
        other => Ok(no_attribute(other, name)),
    }
}

/// `value[index]`
pub fn get_item(value: &Value, index: &Value) -> Result<Value, Failure> {
    match (value, index) {
        (Value::Undefined(message), _) => Err(Failure::undefined(message.clone())),
        (Value::Map(map), Value::Str(key)) => Ok(map
            .get(key)
            .cloned()
            .unwrap_or_else(|| no_attribute(value, key))),
        (Value::List(items), Value::Int(i)) => {
            let items = lock(items);
            Ok(resolve_index(*i, items.len())
                .map(|idx| items[idx].clone())
                .unwrap_or_else(|| no_element(value, *i)))
        }
        (Value::Str(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(resolve_index(*i, chars.len())
                .map(|idx| Value::Str(chars[idx].to_string()))
                .unwrap_or_else(|| no_element(value, *i)))
        }
        (_, Value::Str(key)) => get_attr(value, key),
        (other, index) => Ok(Value::Undefined(format!(
            "'{} object' has no element {}",
            other.type_name(),
            index.repr()
        ))),
    }
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let idx = if index < 0 { index + len } else { index };
    if (0..len).contains(&idx) {
        usize::try_from(idx).ok()
    } else {
        None
    }
}

fn no_attribute(value: &Value, name: &str) -> Value {
    Value::Undefined(format!(
        "'{} object' has no attribute '{}'",
        value.type_name(),
        name
    ))
}

fn no_element(value: &Value, index: i64) -> Value {
    Value::Undefined(format!(
        "'{} object' has no element {}",
        value.type_name(),
        index
    ))
}

/// Items visited by `for` and by sequence filters
pub fn iterate(value: &Value) -> Result<Vec<Value>, Failure> {
    match value {
        Value::List(items) => Ok(lock(items).clone()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::Map(map) => Ok(map.keys().map(|k| Value::Str(k.clone())).collect()),
        Value::Undefined(message) => Err(Failure::undefined(message.clone())),
        other => Err(Failure::type_error(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

/* ===================== Calls ===================== */

pub fn call(func: &Value, args: &[Value]) -> Result<Value, Failure> {
    match func {
        Value::Function(f) => f.call(args),
        Value::Undefined(message) => Err(Failure::undefined(message.clone())),
        other => Err(Failure::type_error(format!(
            "'{}' object is not callable",
            other.type_name()
        ))),
    }
}

/// `object.name(args)`
pub fn call_method(object: &Value, name: &str, args: &[Value]) -> Result<Value, Failure> {
    match object {
        Value::Undefined(message) => Err(Failure::undefined(message.clone())),
        Value::List(items) => list_method(object, items, name, args),
        Value::Str(s) => str_method(object, s, name, args),
        Value::Map(_) => match name {
            "get" => {
                let key = arg(args, 0)?;
                let found = match key {
                    Value::Str(k) => match object {
                        Value::Map(map) => map.get(k).cloned(),
                        _ => None,
                    },
                    _ => None,
                };
                Ok(found.unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
            }
            "keys" => iterate(object).map(Value::list),
            "values" | "items" => {
                let Value::Map(map) = object else {
                    return Err(missing_method(object, name));
                };
                Ok(Value::list(if name == "values" {
                    map.values().cloned().collect()
                } else {
                    map.iter()
                        .map(|(k, v)| Value::list(vec![Value::Str(k.clone()), v.clone()]))
                        .collect()
                }))
            }
            // A function stored under the key is callable as a method
            _ => call(&get_attr(object, name)?, args)
                .map_err(|f| match f.kind() {
                    FailureKind::Undefined => missing_method(object, name),
                    _ => f,
                }),
        },
        Value::Failure(_) => call(&get_attr(object, name)?, args),
        other => Err(missing_method(other, name)),
    }
}

fn list_method(
    object: &Value,
    items: &std::sync::Mutex<Vec<Value>>,
    name: &str,
    args: &[Value],
) -> Result<Value, Failure> {
    match name {
        "append" => {
            lock(items).push(arg(args, 0)?.clone());
            Ok(Value::None)
        }
        "pop" => {
            let mut items = lock(items);
            let len = items.len();
            let idx = match args.first() {
                Some(Value::Int(i)) => resolve_index(*i, len),
                Some(other) => {
                    return Err(Failure::type_error(format!(
                        "'{}' object cannot be interpreted as an integer",
                        other.type_name()
                    )))
                }
                None => len.checked_sub(1),
            };
            match idx {
                Some(idx) => Ok(items.remove(idx)),
                None if len == 0 => Err(Failure::new(FailureKind::Lookup, "pop from empty list")),
                None => Err(Failure::new(FailureKind::Lookup, "pop index out of range")),
            }
        }
        _ => Err(missing_method(object, name)),
    }
}

fn str_method(object: &Value, s: &str, name: &str, args: &[Value]) -> Result<Value, Failure> {
    let text = |i: usize| str_arg(args, i);
    match name {
        "upper" => Ok(Value::Str(s.to_uppercase())),
        "lower" => Ok(Value::Str(s.to_lowercase())),
        "strip" => Ok(Value::Str(s.trim().to_string())),
        "startswith" => Ok(Value::Bool(s.starts_with(text(0)?))),
        "endswith" => Ok(Value::Bool(s.ends_with(text(0)?))),
        "replace" => Ok(Value::Str(s.replace(text(0)?, text(1)?))),
        "split" => {
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::None) => s
                    .split_whitespace()
                    .map(|p| Value::Str(p.to_string()))
                    .collect(),
                Some(_) => {
                    let sep = text(0)?;
                    if sep.is_empty() {
                        return Err(Failure::value_error("empty separator"));
                    }
                    s.split(sep).map(|p| Value::Str(p.to_string())).collect()
                }
            };
            Ok(Value::list(parts))
        }
        _ => Err(missing_method(object, name)),
    }
}

fn arg(args: &[Value], index: usize) -> Result<&Value, Failure> {
    args.get(index).ok_or_else(|| {
        Failure::type_error(format!(
            "expected at least {} argument{}, got {}",
            index + 1,
            if index == 0 { "" } else { "s" },
            args.len()
        ))
    })
}

fn str_arg(args: &[Value], index: usize) -> Result<&str, Failure> {
    match arg(args, index)? {
        Value::Str(t) => Ok(t.as_str()),
        other => Err(Failure::type_error(format!(
            "must be str, not {}",
            other.type_name()
        ))),
    }
}

fn missing_method(value: &Value, name: &str) -> Failure {
    Failure::undefined(format!(
        "'{} object' has no attribute '{}'",
        value.type_name(),
        name
    ))
}
