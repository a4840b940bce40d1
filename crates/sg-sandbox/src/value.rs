// value.rs — Runtime values seen by sandboxed scripts.
//
// Every value maps to exactly one `TypeKind`; the gate dispatches on that
// tag instead of on reflection. Host classes enter through the
// `HostObject` trait and are identified by their declared class name.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use sg_registry::TypeKind;

use crate::error::GateError;

/// Signature of a native function callable from scripts.
pub type NativeFn = dyn Fn(&[Value]) -> Result<Value, GateError> + Send + Sync;

/// Signature of a native method: receiver, then arguments.
pub type MethodFn = dyn Fn(&Value, &[Value]) -> Result<Value, GateError> + Send + Sync;

/// A class instance exposed by the host.
///
/// Implementations resolve members by name. They are only consulted by the
/// gate, after the attribute registry has allowed the access.
pub trait HostObject: Send + Sync {
    /// The declared class name, used for custom-class whitelist lookups.
    fn class_name(&self) -> &str;

    /// The value of a data member or constant.
    fn field(&self, _name: &str) -> Option<Value> {
        None
    }

    fn has_method(&self, _name: &str) -> bool {
        false
    }

    fn call_method(&self, name: &str, _args: &[Value]) -> Result<Value, GateError> {
        Err(GateError::NotCallable {
            type_name: format!("{}.{}", self.class_name(), name),
        })
    }
}

/// A named native function.
#[derive(Clone)]
pub struct NativeFunction {
    name: String,
    func: Arc<NativeFn>,
}

impl NativeFunction {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&[Value]) -> Result<Value, GateError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, GateError> {
        (self.func)(args)
    }
}

/// A method resolved through the gate, bound to its receiver.
///
/// Carries the capabilities its whitelist rule demanded so they can be
/// re-checked when the method is eventually called.
#[derive(Clone)]
pub struct BoundMethod {
    receiver: Box<Value>,
    name: String,
    requires: BTreeSet<String>,
    func: Arc<MethodFn>,
}

impl BoundMethod {
    pub(crate) fn new(
        receiver: Value,
        name: impl Into<String>,
        requires: BTreeSet<String>,
        func: Arc<MethodFn>,
    ) -> Self {
        Self {
            receiver: Box::new(receiver),
            name: name.into(),
            requires,
            func,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn receiver(&self) -> &Value {
        &self.receiver
    }

    pub fn required_capabilities(&self) -> &BTreeSet<String> {
        &self.requires
    }

    /// Invoke without capability checks; callers go through the gate.
    pub(crate) fn invoke(&self, args: &[Value]) -> Result<Value, GateError> {
        (self.func)(&self.receiver, args)
    }
}

/// A sandbox value.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    /// A user-constructed record with textual keys. Plain data.
    Map(BTreeMap<String, Value>),
    Pattern(Arc<Regex>),
    Function(NativeFunction),
    BoundMethod(BoundMethod),
    Object(Arc<dyn HostObject>),
}

impl Value {
    /// Compile `source` into a pattern value.
    pub fn pattern(source: &str) -> Result<Value, regex::Error> {
        Ok(Value::Pattern(Arc::new(Regex::new(source)?)))
    }

    pub fn object(object: impl HostObject + 'static) -> Value {
        Value::Object(Arc::new(object))
    }

    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Value
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// The concrete runtime type.
    pub fn type_kind(&self) -> TypeKind {
        match self {
            Value::Null => TypeKind::Null,
            Value::Bool(_) => TypeKind::Bool,
            Value::Int(_) => TypeKind::Int,
            Value::Float(_) => TypeKind::Float,
            Value::Str(_) => TypeKind::Str,
            Value::List(_) => TypeKind::List,
            Value::Map(_) => TypeKind::Map,
            Value::Pattern(_) => TypeKind::Pattern,
            Value::Function(_) => TypeKind::Function,
            Value::BoundMethod(_) => TypeKind::BoundMethod,
            Value::Object(object) => TypeKind::Custom(object.class_name().to_string()),
        }
    }

    /// Plain data cannot reach host internals, so keyed lookup on it
    /// bypasses the registry.
    pub fn is_plain_data(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::BoundMethod(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Pattern(a), Value::Pattern(b)) => a.as_str() == b.as_str(),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(&a.func, &b.func),
            (Value::BoundMethod(a), Value::BoundMethod(b)) => {
                a.name == b.name && a.receiver == b.receiver
            }
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::List(items) => f.debug_list().entries(items).finish(),
            Value::Map(entries) => f.debug_map().entries(entries).finish(),
            Value::Pattern(re) => write!(f, "<Pattern /{}/>", re.as_str()),
            Value::Function(func) => write!(f, "<function {}>", func.name),
            Value::BoundMethod(method) => write!(f, "<method {}>", method.name),
            Value::Object(object) => write!(f, "<{} object>", object.class_name()),
        }
    }
}

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

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
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
        Value::List(items)
    }
}
