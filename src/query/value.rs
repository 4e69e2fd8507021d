//! Query option trees.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::Op;
use crate::source::Model;

/// A non-plain value embedded in query options.
///
/// Markers are opaque to the caching layer; they are flattened to a stable
/// label by a [`FlattenHook`](crate::key::FlattenHook) before hashing.
pub trait Marker: fmt::Debug + Send + Sync {
    /// Stable label identifying what this marker means.
    fn label(&self) -> String;
}

/// Shared, mutable option node. May form cycles.
pub type SharedValue = Arc<RwLock<QueryValue>>;

/// Map key inside query options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Name(String),
    Op(Op),
}

impl From<&str> for Field {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for Field {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<Op> for Field {
    fn from(op: Op) -> Self {
        Self::Op(op)
    }
}

/// Handle to a collection definition embedded in options (e.g. an include).
///
/// Only the collection name takes part in key derivation.
#[derive(Clone)]
pub struct ModelRef(Arc<dyn Model>);

impl ModelRef {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self(model)
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }
}

impl fmt::Debug for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModelRef").field(&self.name()).finish()
    }
}

/// Arbitrary nested query options.
#[derive(Clone)]
pub enum QueryValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<QueryValue>),
    /// Entries in insertion order; keys may be operators.
    Map(Vec<(Field, QueryValue)>),
    Op(Op),
    Marker(Arc<dyn Marker>),
    Model(ModelRef),
    Shared(SharedValue),
}

impl QueryValue {
    /// Build a map from `(key, value)` pairs.
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Field>,
        V: Into<QueryValue>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build a list from values.
    pub fn list<V: Into<QueryValue>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }

    /// Wrap a value in a shared node that other nodes can point back to.
    pub fn shared(value: QueryValue) -> SharedValue {
        Arc::new(RwLock::new(value))
    }

    /// Embed a marker value.
    pub fn marker(marker: impl Marker + 'static) -> Self {
        Self::Marker(Arc::new(marker))
    }

    /// Embed a collection handle.
    pub fn model(model: Arc<dyn Model>) -> Self {
        Self::Model(ModelRef::new(model))
    }

    /// Insert or replace an entry; only meaningful on maps.
    pub fn insert(&mut self, key: impl Into<Field>, value: impl Into<QueryValue>) {
        if let Self::Map(entries) = self {
            let key = key.into();
            let value = value.into();
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => entries.push((key, value)),
            }
        }
    }

    /// Look up a named entry on a map.
    pub fn get(&self, name: &str) -> Option<&QueryValue> {
        match self {
            Self::Map(entries) => entries.iter().find_map(|(k, v)| match k {
                Field::Name(n) if n == name => Some(v),
                _ => None,
            }),
            _ => None,
        }
    }
}

// Shared nodes are printed by address so cyclic options don't recurse forever.
impl fmt::Debug for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Self::Int(v) => f.debug_tuple("Int").field(v).finish(),
            Self::Float(v) => f.debug_tuple("Float").field(v).finish(),
            Self::Str(v) => f.debug_tuple("Str").field(v).finish(),
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
            Self::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
            Self::Op(op) => f.debug_tuple("Op").field(op).finish(),
            Self::Marker(marker) => f.debug_tuple("Marker").field(marker).finish(),
            Self::Model(model) => model.fmt(f),
            Self::Shared(node) => write!(f, "Shared({:p})", Arc::as_ptr(node)),
        }
    }
}

impl From<bool> for QueryValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for QueryValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for QueryValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for QueryValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for QueryValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Op> for QueryValue {
    fn from(op: Op) -> Self {
        Self::Op(op)
    }
}

impl From<SharedValue> for QueryValue {
    fn from(node: SharedValue) -> Self {
        Self::Shared(node)
    }
}

impl<V: Into<QueryValue>> From<Vec<V>> for QueryValue {
    fn from(values: Vec<V>) -> Self {
        Self::list(values)
    }
}

impl<V: Into<QueryValue>> From<Option<V>> for QueryValue {
    fn from(value: Option<V>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<serde_json::Value> for QueryValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::Str(s),
            Value::Array(items) => Self::list(items),
            Value::Object(map) => Self::map(map),
        }
    }
}
