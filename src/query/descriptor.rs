//! Immutable descriptions of a single cacheable query.

use std::fmt;

use super::{Method, QueryValue};

/// One structured query: which method, on which collection, with which
/// options. Built once per operation and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct QueryDescriptor {
    method: Method,
    collection: String,
    options: Option<QueryValue>,
    extra_keys: Vec<String>,
}

impl QueryDescriptor {
    pub fn new(method: Method, collection: impl Into<String>, options: Option<QueryValue>) -> Self {
        Self {
            method,
            collection: collection.into(),
            options,
            extra_keys: Vec::new(),
        }
    }

    /// Append caller-chosen key components, kept in the given order.
    #[must_use]
    pub fn with_extra_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn options(&self) -> Option<&QueryValue> {
        self.options.as_ref()
    }

    pub fn extra_keys(&self) -> &[String] {
        &self.extra_keys
    }
}

/// Kind of statement a raw query runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryType {
    #[default]
    Select,
    Insert,
    Update,
    Delete,
    Upsert,
    Raw,
}

impl QueryType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Upsert => "UPSERT",
            Self::Raw => "RAW",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution options for a raw query. Defaults to a plain `SELECT`.
#[derive(Debug, Clone, Default)]
pub struct RawOptions {
    pub query_type: QueryType,
    /// Bind parameters or replacements passed to the runner.
    pub params: Option<QueryValue>,
}

impl RawOptions {
    pub fn new(query_type: QueryType) -> Self {
        Self {
            query_type,
            params: None,
        }
    }

    #[must_use]
    pub fn params(mut self, params: impl Into<QueryValue>) -> Self {
        self.params = Some(params.into());
        self
    }

    /// Option tree used for key derivation.
    pub fn to_value(&self) -> QueryValue {
        let mut value = QueryValue::map([("type", self.query_type.as_str())]);
        if let Some(params) = &self.params {
            value.insert("params", params.clone());
        }
        value
    }
}
