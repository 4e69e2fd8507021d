//! Registry-backed model: a name plus a table of retrieval closures.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;

use super::{Fetched, Model};
use crate::query::{Method, QueryValue};

type Retrieval = Arc<dyn Fn(Option<QueryValue>) -> BoxFuture<'static, anyhow::Result<Fetched>> + Send + Sync>;

/// A [`Model`] assembled from closures, one per supported method.
///
/// ## Example
///
/// ```rust,ignore
/// let users = TableModel::new("users")
///     .with_method(Method::FindAll, |_options| async { Ok(Fetched::Rows(vec![])) })
///     .with_method(Method::Count, |_options| async { Ok(Fetched::from(json!(0))) });
/// ```
#[derive(Clone)]
pub struct TableModel {
    name: String,
    methods: HashMap<Method, Retrieval>,
}

impl TableModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    /// Register the closure that answers `method`.
    #[must_use]
    pub fn with_method<F, Fut>(mut self, method: Method, retrieve: F) -> Self
    where
        F: Fn(Option<QueryValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Fetched>> + Send + 'static,
    {
        self.methods
            .insert(method, Arc::new(move |options| retrieve(options).boxed()));
        self
    }
}

#[async_trait]
impl Model for TableModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, method: Method) -> bool {
        self.methods.contains_key(&method)
    }

    async fn retrieve(&self, method: Method, options: Option<&QueryValue>) -> anyhow::Result<Fetched> {
        let retrieve = self
            .methods
            .get(&method)
            .cloned()
            .ok_or_else(|| anyhow!("{} does not implement {}", self.name, method))?;
        retrieve(options.cloned()).await
    }
}

impl std::fmt::Debug for TableModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableModel")
            .field("name", &self.name)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}
