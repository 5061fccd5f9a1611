use crate::core::{Function, JSObject, JSObjectPtr};
use crate::js_promise::Promise;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Error object created by the engine itself, e.g. the TypeError a
/// promise is rejected with when it is resolved with itself.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorObject {
    inner: Rc<ErrorData>,
}

#[derive(Debug, PartialEq)]
struct ErrorData {
    name: String,
    message: String,
}

impl ErrorObject {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        ErrorObject {
            inner: Rc::new(ErrorData {
                name: name.into(),
                message: message.into(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn message(&self) -> &str {
        &self.inner.message
    }
}

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<Vec<Value>>),
    Object(JSObjectPtr),
    Function(Function),
    Promise(Promise),
    Error(ErrorObject),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&ErrorObject> {
        match self {
            Value::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(items))
    }

    /// Identity for reference values, structural equality otherwise.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Promise(a), Value::Promise(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Error(a), Value::Error(b)) => Rc::ptr_eq(&a.inner, &b.inner),
            _ => self == other,
        }
    }

    /// Render through `serde_json`. Objects already being rendered further
    /// up show as `"[Circular]"`; cells that are mutably borrowed right now
    /// render as a placeholder instead of panicking.
    pub fn to_json(&self) -> serde_json::Value {
        to_json_inner(self, &mut Vec::new())
    }
}

fn to_json_inner(value: &Value, ancestors: &mut Vec<*const RefCell<JSObject>>) -> serde_json::Value {
    use serde_json::Value as Json;
    match value {
        Value::Undefined | Value::Null => Json::Null,
        Value::Boolean(b) => Json::Bool(*b),
        Value::Number(n) => {
            if n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER {
                Json::from(*n as i64)
            } else {
                serde_json::Number::from_f64(*n).map(Json::Number).unwrap_or(Json::Null)
            }
        }
        Value::String(s) => Json::String(s.to_string()),
        Value::Array(items) => Json::Array(items.iter().map(|item| to_json_inner(item, ancestors)).collect()),
        Value::Object(obj) => {
            let ptr = Rc::as_ptr(obj);
            if ancestors.contains(&ptr) {
                return Json::String("[Circular]".to_string());
            }
            let Ok(borrowed) = obj.try_borrow() else {
                return Json::String("[Object <borrowed>]".to_string());
            };
            ancestors.push(ptr);
            let map = borrowed
                .data_entries()
                .map(|(key, value)| (key.to_string(), to_json_inner(value, ancestors)))
                .collect::<serde_json::Map<_, _>>();
            ancestors.pop();
            Json::Object(map)
        }
        Value::Function(f) => Json::String(format!("[Function: {}]", f.name())),
        Value::Promise(p) => Json::String(format!("[{p:?}]")),
        Value::Error(e) => {
            let mut map = serde_json::Map::new();
            map.insert("name".to_string(), Json::String(e.name().to_string()));
            map.insert("message".to_string(), Json::String(e.message().to_string()));
            Json::Object(map)
        }
    }
}

// 2^53: every integer below it is exact in an f64 and fits an i64.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Number(n) => number_to_string(*n),
        Value::String(s) => s.to_string(),
        Value::Error(e) if e.message().is_empty() => e.name().to_string(),
        Value::Error(e) => format!("{}: {}", e.name(), e.message()),
        other => other.to_json().to_string(),
    }
}

fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else if n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER {
        format!("{}", n as i64)
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Promise(a), Value::Promise(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&value_to_string(self))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s:?}"),
            Value::Function(func) => write!(f, "Function({})", func.name()),
            Value::Promise(p) => write!(f, "{p:?}"),
            other => f.write_str(&value_to_string(other)),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

impl From<Promise> for Value {
    fn from(p: Promise) -> Self {
        Value::Promise(p)
    }
}

impl From<JSObjectPtr> for Value {
    fn from(obj: JSObjectPtr) -> Self {
        Value::Object(obj)
    }
}

impl From<ErrorObject> for Value {
    fn from(e: ErrorObject) -> Self {
        Value::Error(e)
    }
}
