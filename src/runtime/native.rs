//! Native rendering: recover a typed value from output fragments

use crate::syntax::expressions::literal_eval;

use super::Value;

/// Concatenate the fragments a native render produced
///
/// No fragments give `None`. A single fragment that is not a string is
/// returned as is. Anything else is joined into text, which is then read
/// back as a literal if it is one and returned as a string otherwise.
pub fn native_concat(fragments: Vec<Value>) -> Value {
    let raw = match fragments.len() {
        0 => return Value::None,
        1 => match fragments.into_iter().next() {
            Some(Value::Str(text)) => text,
            Some(value) => return value,
            None => return Value::None,
        },
        _ => fragments.iter().map(Value::to_string).collect::<String>(),
    };
    literal_eval(&raw).unwrap_or(Value::Str(raw))
}
