use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::thenable::{Callback, FnThenable, Thenable};
use crate::Promise;

/// Anything a promise can be fulfilled or rejected with.
///
/// Thenables are carried as trait objects so that a value produced by some
/// other promise implementation can be adopted like one of ours.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    /// An error object, carrying its message.
    Error(String),
    Thenable(Rc<dyn Thenable>),
}

impl Value {
    /// Builds an error value with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Value::Error(message.into())
    }

    /// Wraps a foreign `then`-shaped closure so it can be assimilated.
    ///
    /// ```
    /// use deferred_promise::{EventLoop, Promise, Value};
    ///
    /// let mut rt = EventLoop::new();
    /// let foreign = Value::thenable(|on_fulfilled, _on_rejected| on_fulfilled(7.into()));
    /// let promise = Promise::resolve(&rt.host(), foreign);
    /// assert_eq!(rt.block_on(promise).unwrap(), Ok(Value::from(7)));
    /// ```
    pub fn thenable<F>(attach: F) -> Self
    where
        F: Fn(Callback, Callback) + 'static,
    {
        Value::Thenable(Rc::new(FnThenable::new(attach)))
    }

    /// The capability check: `Some` only for values exposing `attach`.
    pub fn as_thenable(&self) -> Option<&Rc<dyn Thenable>> {
        match self {
            Value::Thenable(thenable) => Some(thenable),
            _ => None,
        }
    }

    pub fn is_thenable(&self) -> bool {
        self.as_thenable().is_some()
    }

    /// Only arrays count as ordered sequences.
    pub fn is_sequence(&self) -> bool {
        matches!(self, Value::Array(_))
    }

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

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Message of an error value, or the text of a string value.
    pub fn message(&self) -> Option<&str> {
        match self {
            Value::Error(message) | Value::String(message) => Some(message),
            _ => None,
        }
    }

    /// Converts into JSON. Thenables have no JSON form and yield `None`,
    /// as do non-finite numbers. Errors become their message.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        use serde_json::Value as Json;
        Some(match self {
            Value::Undefined | Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => Json::Number(serde_json::Number::from_f64(*n)?),
            Value::String(s) | Value::Error(s) => Json::String(s.clone()),
            Value::Array(items) => {
                Json::Array(items.iter().map(Value::to_json).collect::<Option<_>>()?)
            }
            Value::Object(fields) => Json::Object(
                fields
                    .iter()
                    .map(|(k, v)| Some((k.clone(), v.to_json()?)))
                    .collect::<Option<_>>()?,
            ),
            Value::Thenable(_) => return None,
        })
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_owned(),
            Value::Null => "null".to_owned(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            Value::Array(_) => "[array]".to_owned(),
            Value::Object(_) => "[object Object]".to_owned(),
            Value::Error(message) => format!("Error: {message}"),
            Value::Thenable(_) => "[thenable]".to_owned(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("Undefined"),
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Value::String(s) => f.debug_tuple("String").field(s).finish(),
            Value::Array(items) => f.debug_tuple("Array").field(items).finish(),
            Value::Object(fields) => f.debug_tuple("Object").field(fields).finish(),
            Value::Error(message) => f.debug_tuple("Error").field(message).finish(),
            Value::Thenable(t) => write!(f, "Thenable({:p})", Rc::as_ptr(t)),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Thenable(a), Value::Thenable(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Undefined
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! from_number {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Value::Number(n as f64)
            }
        })*
    };
}

from_number!(i8, i16, i32, i64, u8, u16, u32, u64, usize, f32, f64);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Promise> for Value {
    fn from(promise: Promise) -> Self {
        Value::Thenable(Rc::new(promise))
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => n.as_f64().map_or(Value::Null, Value::Number),
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Json::Object(fields) => {
                Value::Object(fields.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Value;
    use serde_json::json;

    #[test]
    fn test_json_conversion() {
        let value = Value::from(json!({"a": [1, "b", null], "c": true}));
        assert_eq!(value.to_json(), Some(json!({"a": [1.0, "b", null], "c": true})));
    }

    #[test]
    fn test_thenable_has_no_json_form() {
        let value = Value::Array(vec![1.into(), Value::thenable(|_, _| {})]);
        assert_eq!(value.to_json(), None);
    }

    #[test]
    fn test_only_arrays_are_sequences() {
        assert!(Value::Array(vec![]).is_sequence());
        assert!(!Value::Object(Default::default()).is_sequence());
        assert!(!Value::from(42).is_sequence());
        assert!(!Value::from("abc").is_sequence());
    }

    #[test]
    fn test_thenables_compare_by_identity() {
        let a = Value::thenable(|_, _| {});
        let b = Value::thenable(|_, _| {});
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_message() {
        assert_eq!(Value::error("e").message(), Some("e"));
        assert_eq!(Value::from("plain").message(), Some("plain"));
        assert_eq!(Value::from(1).message(), None);
    }
}
