//! Runtime value types

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;

use crate::error::{Failure, FailureKind};

/// Future resolved at an `Await` suspension point
pub type BoxedFuture = Pin<Box<dyn Future<Output = Result<Value, Failure>> + Send>>;

type NativeFn = dyn Fn(&[Value]) -> Result<Value, Failure> + Send + Sync;

static NEXT_AWAITABLE_ID: AtomicU64 = AtomicU64::new(1);

/* ===================== Value ===================== */

/// Runtime value type
#[derive(Debug, Clone)]
pub enum Value {
    /// A name or lookup that did not resolve; carries the message raised
    /// when the value is used
    Undefined(String),
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Shared so `{% do items.append(x) %}` is visible through every alias
    List(Arc<Mutex<Vec<Value>>>),
    Map(Arc<BTreeMap<String, Value>>),
    Function(Function),
    Awaitable(Awaitable),
    /// A failure captured by a `try` guard
    Failure(Failure),
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(Mutex::new(items)))
    }

    pub fn map(entries: BTreeMap<String, Value>) -> Self {
        Value::Map(Arc::new(entries))
    }

    /// Undefined marker for a name missing from every scope
    pub fn undefined_name(name: &str) -> Self {
        Value::Undefined(format!("'{}' is undefined", name))
    }

    /// Wrap a host function callable from templates
    pub fn from_fn<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, Failure> + Send + Sync + 'static,
    {
        Value::Function(Function {
            name: name.into(),
            func: Arc::new(func),
        })
    }

    /// A value the async runtime resolves by awaiting `future`
    pub fn awaitable<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, Failure>> + Send + 'static,
    {
        Value::Awaitable(Awaitable::new(Box::pin(future)))
    }

    /// A value resolved from a spawned tokio task
    pub fn spawned(handle: JoinHandle<Result<Value, Failure>>) -> Self {
        Value::awaitable(async move {
            match handle.await {
                Ok(result) => result,
                Err(err) if err.is_cancelled() => Err(Failure::cancelled()),
                Err(err) => Err(Failure::raised(err.to_string())),
            }
        })
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined(_))
    }

    /// Python truthiness
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined(_) | Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !lock(items).is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Function(_) | Value::Awaitable(_) | Value::Failure(_) => true,
        }
    }

    /// Type name used in failure messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined(_) => "Undefined",
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "dict",
            Value::Function(_) => "function",
            Value::Awaitable(_) => "coroutine",
            Value::Failure(f) => f.kind().as_str(),
        }
    }

    /// Snapshot of a list's items
    pub fn list_items(&self) -> Option<Vec<Value>> {
        match self {
            Value::List(items) => Some(lock(items).clone()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Python `repr()`
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => quote(s),
            Value::Undefined(_) => "Undefined".to_string(),
            Value::Failure(f) => format!("{}({})", f.kind(), quote(f.message())),
            other => other.to_string(),
        }
    }

    /// Build from JSON; objects become maps, numbers keep their int/float shape
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::list(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::map(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// Lock a shared list, ignoring poisoning
pub(crate) fn lock(items: &Mutex<Vec<Value>>) -> MutexGuard<'_, Vec<Value>> {
    items.lock().unwrap_or_else(PoisonError::into_inner)
}

fn quote(s: &str) -> String {
    let delim = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(delim);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if c == delim => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(delim);
    out
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

/* ===================== Display ===================== */

/// Python `str()`: the text a value renders as
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined(_) => Ok(()),
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                let items = lock(items);
                let parts: Vec<String> = items.iter().map(Value::repr).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Map(map) => {
                let parts: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", quote(k), v.repr()))
                    .collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Value::Function(func) => write!(f, "<function {}>", func.name),
            Value::Awaitable(a) => write!(f, "<awaitable {}>", a.id),
            Value::Failure(failure) => f.write_str(failure.message()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined(_), Value::Undefined(_)) => true,
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let left = lock(a).clone();
                let right = lock(b).clone();
                left == right
            }
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(&a.func, &b.func),
            (Value::Awaitable(a), Value::Awaitable(b)) => a == b,
            (Value::Failure(a), Value::Failure(b)) => a == b,
            _ => false,
        }
    }
}

/* ===================== Conversions ===================== */

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::map(map)
    }
}

impl From<Failure> for Value {
    fn from(failure: Failure) -> Self {
        Value::Failure(failure)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::None, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(json)
    }
}

/* ===================== Callables ===================== */

/// Host function exposed to templates
#[derive(Clone)]
pub struct Function {
    name: String,
    func: Arc<NativeFn>,
}

impl Function {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, Failure> {
        (self.func)(args)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function").field("name", &self.name).finish()
    }
}

/// A pending value; its future can be taken exactly once
#[derive(Clone)]
pub struct Awaitable {
    id: u64,
    future: Arc<Mutex<Option<BoxedFuture>>>,
}

impl Awaitable {
    pub fn new(future: BoxedFuture) -> Self {
        Self {
            id: NEXT_AWAITABLE_ID.fetch_add(1, Ordering::Relaxed),
            future: Arc::new(Mutex::new(Some(future))),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Take the future out, or fail if it was already awaited
    pub fn take(&self) -> Result<BoxedFuture, Failure> {
        self.future
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| {
                Failure::new(
                    FailureKind::Raised,
                    "cannot reuse already awaited coroutine",
                )
            })
    }
}

impl PartialEq for Awaitable {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for Awaitable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Awaitable").field("id", &self.id).finish()
    }
}
