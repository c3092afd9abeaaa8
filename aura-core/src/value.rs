//! Dynamic Values
//!
//! Everything a template can see lives in a [`Value`]: plain data (numbers,
//! strings, arrays, objects), callable functions, and the two reactive handle
//! kinds ([`Reactive`] objects and [`Ref`] cells).
//!
//! # Reactive handles
//!
//! Handles are shared, not copied. Cloning a `Value::Ref` clones the handle,
//! so writes through either clone reach the same cell and notify the same
//! subscribers. Plain arrays and objects, by contrast, are owned data and are
//! deep-copied on clone.
//!
//! A cell is its own variant. An `Object` that happens to carry a `value` key
//! is never mistaken for a [`Ref`].
//!
//! # Semantics
//!
//! Truthiness, string conversion and equality follow the loose rules template
//! authors expect from a scripting language: `0`, `""`, `null` and `undefined`
//! are falsy, `1 + "a"` concatenates, and `null == undefined`.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::dom::NodeId;
use crate::reactive::{Reactive, Ref};

/// Ordered string-keyed map of values.
pub type Object = IndexMap<String, Value>;

/// A callable value.
///
/// Functions receive their arguments as a slice and return a value. Event
/// handlers receive a single event object argument.
#[derive(Clone)]
pub struct Function(Arc<dyn Fn(&[Value]) -> Value + Send + Sync>);

impl Function {
    /// Wrap a closure taking arguments and returning a value.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Wrap a closure that ignores its arguments and returns nothing.
    pub fn handler<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self(Arc::new(move |_| {
            f();
            Value::Undefined
        }))
    }

    /// Invoke the function.
    pub fn call(&self, args: &[Value]) -> Value {
        (self.0)(args)
    }

    /// Whether both handles point at the same closure.
    pub fn ptr_eq(&self, other: &Function) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Function")
    }
}

/// A dynamically typed template value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(Object),
    Function(Function),
    /// A reactive object. Property reads through it are tracked.
    Reactive(Reactive),
    /// A reactive cell. Reads of `.value` are tracked.
    Ref(Ref),
    /// A rendered node handle, assigned through template refs.
    Node(NodeId),
}

impl Value {
    /// `null` or `undefined`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Reactive objects and cells, the two shared handle kinds.
    pub fn is_handle(&self) -> bool {
        matches!(self, Value::Reactive(_) | Value::Ref(_))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
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

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Value::Node(id) => Some(*id),
            _ => None,
        }
    }

    /// Numeric coercion (`Number(v)`).
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            Value::Array(items) => match items.as_slice() {
                [] => 0.0,
                [single] => single.to_number(),
                _ => f64::NAN,
            },
            Value::Ref(cell) => cell.get().to_number(),
            _ => f64::NAN,
        }
    }

    /// String conversion (`String(v)`).
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    if item.is_nullish() {
                        String::new()
                    } else {
                        item.to_display_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) | Value::Reactive(_) => "[object Object]".to_string(),
            Value::Function(_) => "function".to_string(),
            Value::Ref(cell) => cell.get().to_display_string(),
            Value::Node(_) => "[object HTMLElement]".to_string(),
        }
    }

    /// Unwrap one level of cell indirection (`unref`).
    pub fn unwrap_ref(&self) -> Value {
        match self {
            Value::Ref(cell) => cell.get(),
            other => other.clone(),
        }
    }

    /// Property access (`v.key`).
    ///
    /// Reads through reactive handles are tracked. Returns `None` when the
    /// receiver cannot carry properties at all (`null` / `undefined`).
    pub fn member(&self, key: &str) -> Option<Value> {
        let value = match self {
            Value::Undefined | Value::Null => return None,
            Value::Object(map) => map.get(key).cloned().unwrap_or_default(),
            Value::Array(items) => match key {
                "length" => Value::Number(items.len() as f64),
                _ => key
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or_default(),
            },
            Value::String(s) => match key {
                "length" => Value::Number(s.chars().count() as f64),
                _ => key
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| s.chars().nth(i))
                    .map(|c| Value::String(c.to_string()))
                    .unwrap_or_default(),
            },
            Value::Reactive(object) => object.get(key),
            Value::Ref(cell) => match key {
                "value" => cell.get(),
                _ => Value::Undefined,
            },
            _ => Value::Undefined,
        };
        Some(value)
    }

    /// Strict equality (`===`). Handles compare by identity.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.strict_eq(y))
            }
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .all(|(k, v)| b.get(k).is_some_and(|other| v.strict_eq(other)))
            }
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Reactive(a), Value::Reactive(b)) => a.ptr_eq(b),
            (Value::Ref(a), Value::Ref(b)) => a.ptr_eq(b),
            (Value::Node(a), Value::Node(b)) => a == b,
            _ => false,
        }
    }

    /// Loose equality (`==`).
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
            (Value::Number(_), Value::String(_))
            | (Value::String(_), Value::Number(_))
            | (Value::Bool(_), _)
            | (_, Value::Bool(_)) => {
                let (a, b) = (self.to_number(), other.to_number());
                a == b
            }
            _ => self.strict_eq(other),
        }
    }

    /// Plain JSON view of the value. Handles are read without tracking.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Undefined | Value::Null | Value::Function(_) | Value::Node(_) => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Reactive(object) => Json::Object(
                object
                    .to_object_untracked()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Ref(cell) => cell.get_untracked().to_json(),
        }
    }
}

/// Format a number the way template text expects: integers without a
/// trailing `.0`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let sign = if n > 0.0 { "" } else { "-" };
        format!("{sign}Infinity")
    } else if n == n.trunc() && n.abs() < 1e21 {
        // -0 prints as 0
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_eq(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Array(items) => f.debug_list().entries(items).finish(),
            Value::Object(map) => f.debug_map().entries(map.iter()).finish(),
            Value::Function(func) => func.fmt(f),
            Value::Reactive(object) => object.fmt(f),
            Value::Ref(cell) => cell.fmt(f),
            Value::Node(id) => id.fmt(f),
        }
    }
}

// ----------------------------------------------------------------------------
// Conversions
// ----------------------------------------------------------------------------

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! impl_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_number!(i32, i64, u32, u64, usize, f32, f64);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<Object> for Value {
    fn from(map: Object) -> Self {
        Value::Object(map)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

impl From<Reactive> for Value {
    fn from(object: Reactive) -> Self {
        Value::Reactive(object)
    }
}

impl From<Ref> for Value {
    fn from(cell: Ref) -> Self {
        Value::Ref(cell)
    }
}

impl From<NodeId> for Value {
    fn from(id: NodeId) -> Self {
        Value::Node(id)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Json::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness_follows_script_rules() {
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(!Value::from(f64::NAN).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("0").is_truthy());
        assert!(Value::Array(vec![]).is_truthy());
        assert!(Value::Object(Object::new()).is_truthy());
    }

    #[test]
    fn numbers_display_without_trailing_zero() {
        assert_eq!(Value::from(3).to_display_string(), "3");
        assert_eq!(Value::from(2.5).to_display_string(), "2.5");
        assert_eq!(Value::from(-0.0).to_display_string(), "0");
        assert_eq!(Value::from(f64::NAN).to_display_string(), "NaN");
    }

    #[test]
    fn arrays_display_comma_joined() {
        let v = Value::from(json!([1, "a", null, true]));
        assert_eq!(v.to_display_string(), "1,a,,true");
    }

    #[test]
    fn loose_equality_coerces() {
        assert!(Value::Null.loose_eq(&Value::Undefined));
        assert!(Value::from(1).loose_eq(&Value::from("1")));
        assert!(Value::from(true).loose_eq(&Value::from(1)));
        assert!(!Value::from(1).strict_eq(&Value::from("1")));
        assert!(!Value::Null.loose_eq(&Value::from(0)));
    }

    #[test]
    fn object_with_value_key_is_not_a_cell() {
        let plain = Value::from(json!({ "value": 3 }));
        assert!(!plain.is_handle());
        assert_eq!(plain.unwrap_ref(), plain);
    }

    #[test]
    fn member_access_on_builtins() {
        let list = Value::from(json!(["a", "b"]));
        assert_eq!(list.member("length"), Some(Value::from(2)));
        assert_eq!(list.member("1"), Some(Value::from("b")));
        assert_eq!(Value::from("héllo").member("length"), Some(Value::from(5)));
        assert_eq!(Value::Null.member("x"), None);
    }

    #[test]
    fn json_conversion_drops_functions() {
        let mut map = Object::new();
        map.insert("n".to_string(), Value::from(2));
        map.insert("f".to_string(), Value::Function(Function::handler(|| {})));
        assert_eq!(Value::Object(map).to_json(), json!({ "n": 2.0, "f": null }));
    }
}
