//! Data source module - What the cache sits in front of.
//!
//! The caching layer never executes queries itself. It resolves a retrieval
//! [`Method`] on a [`Model`] (a collection handle) or hands a SQL string to a
//! [`QueryRunner`], and caches whatever comes back.
//!
//! Results are described by [`Fetched`]. Single live records are reduced
//! to their plain attributes before caching, see [`Fetched::normalize`].

mod table;

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::query::{Method, QueryValue, RawOptions};

pub use table::TableModel;

/// A live record returned by a data source.
///
/// Only the plain attribute map is ever cached; any behaviour attached to
/// the record is dropped.
pub trait Record: fmt::Debug + Send + Sync {
    /// Plain attribute representation of this record.
    fn attributes(&self) -> Value;
}

impl Record for serde_json::Map<String, Value> {
    fn attributes(&self) -> Value {
        Value::Object(self.clone())
    }
}

/// Shape of a data source result.
#[derive(Debug)]
pub enum Fetched {
    /// Nothing matched.
    Absent,
    /// A sequence of records, cached as-is.
    Rows(Vec<Value>),
    /// A single live record.
    Record(Box<dyn Record>),
    /// Any other shape (counts, aggregates, `{count, rows}` pairs).
    Value(Value),
}

impl Fetched {
    /// Wrap a single record.
    pub fn record(record: impl Record + 'static) -> Self {
        Self::Record(Box::new(record))
    }

    /// Reduce the result to the plain value that gets cached and returned.
    pub fn normalize(self) -> Value {
        match self {
            Self::Absent => Value::Null,
            Self::Rows(rows) => Value::Array(rows),
            Self::Record(record) => record.attributes(),
            Self::Value(value) => value,
        }
    }
}

impl From<Value> for Fetched {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// A collection exposing named retrieval methods.
#[async_trait]
pub trait Model: Send + Sync {
    /// Collection name, used in cache keys.
    fn name(&self) -> &str;

    /// Whether `method` can be resolved on this collection.
    fn supports(&self, _method: Method) -> bool {
        true
    }

    /// Run `method` with the given options.
    async fn retrieve(&self, method: Method, options: Option<&QueryValue>) -> anyhow::Result<Fetched>;
}

/// Executes raw SQL against the data source.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    async fn query(&self, sql: &str, options: &RawOptions) -> anyhow::Result<Fetched>;
}
