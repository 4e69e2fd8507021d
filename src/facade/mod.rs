//! Facade module - The configure-then-query surface.
//!
//! [`Cacher`] is an immutable configuration value: every setter returns a
//! new `Cacher`, and every query builds its own [`QueryDescriptor`] from it.
//! Concurrent callers can share one `Cacher` (or clones of it) freely.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let cacher = Cacher::new(store)
//!     .with_model(users)
//!     .with_prefix("app")
//!     .with_ttl(60);
//!
//! let adults = cacher.find_all(Some(options), &[]).await?;
//! if adults.cache_hit {
//!     // served from the store
//! }
//!
//! cacher.invalidate("users");
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::CacherConfig;
use crate::error::{CacherError, Result};
use crate::fetch::{Cached, Fetcher};
use crate::invalidate::{InvalidationOutcome, Invalidator};
use crate::key::{FlattenHook, KeyDeriver};
use crate::query::{Method, QueryDescriptor, QueryValue, RawOptions};
use crate::source::{Model, QueryRunner};
use crate::store::CacheStore;

/// Entry point for cached queries against one store.
///
/// Cloning is cheap: the store, the in-flight tables and the model are
/// shared.
#[derive(Clone)]
pub struct Cacher {
    fetcher: Fetcher,
    invalidator: Invalidator,
    model: Option<Arc<dyn Model>>,
    runner: Option<Arc<dyn QueryRunner>>,
    method: Method,
}

impl Cacher {
    /// Create a cacher with the default configuration.
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_config(store, CacherConfig::default())
    }

    /// Create a cacher from an explicit configuration.
    pub fn with_config(store: Arc<dyn CacheStore>, config: CacherConfig) -> Self {
        debug!(
            "Cacher created (store {}, prefix {}, ttl {:?})",
            store.provider_name(),
            config.prefix,
            config.ttl
        );

        Self {
            fetcher: Fetcher::new(Arc::clone(&store), &config),
            invalidator: Invalidator::new(store, &config),
            model: None,
            runner: None,
            method: Method::FindAll,
        }
    }

    /// Set the target collection.
    #[must_use]
    pub fn with_model(mut self, model: Arc<dyn Model>) -> Self {
        self.model = Some(model);
        self
    }

    /// Set the runner used for raw queries.
    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn QueryRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Set the cache key prefix.
    #[must_use]
    pub fn with_prefix(self, prefix: &str) -> Self {
        let keys = self.fetcher.keys().clone().with_prefix(prefix);
        self.with_keys(keys)
    }

    /// Set the hook flattening placeholder values in options.
    #[must_use]
    pub fn with_hook(self, hook: Arc<dyn FlattenHook>) -> Self {
        let keys = self.fetcher.keys().clone().with_hook(hook);
        self.with_keys(keys)
    }

    /// Set the TTL of new entries in seconds. `0` disables expiry.
    #[must_use]
    pub fn with_ttl(mut self, secs: u64) -> Self {
        let ttl = (secs > 0).then(|| Duration::from_secs(secs));
        self.fetcher = self.fetcher.with_ttl(ttl);
        self
    }

    /// Set the method [`execute`](Self::execute) runs.
    ///
    /// Fails with [`CacherError::InvalidMethod`] for names outside the
    /// supported set.
    pub fn with_method(mut self, name: &str) -> Result<Self> {
        self.method = name.parse()?;
        Ok(self)
    }

    fn with_keys(mut self, keys: KeyDeriver) -> Self {
        self.fetcher = self.fetcher.with_keys(keys.clone());
        self.invalidator = self.invalidator.with_keys(keys);
        self
    }

    /// The method [`execute`](Self::execute) runs.
    pub fn method(&self) -> Method {
        self.method
    }

    pub fn prefix(&self) -> &str {
        self.fetcher.keys().prefix()
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.fetcher.ttl()
    }

    /// Name of the target collection, if one is set.
    pub fn model_name(&self) -> Option<&str> {
        self.model.as_deref().map(|model| model.name())
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub fn invalidator(&self) -> &Invalidator {
        &self.invalidator
    }

    /// Build the descriptor a retrieval call would run.
    pub fn descriptor(
        &self,
        method: Method,
        options: Option<QueryValue>,
        extra_keys: &[&str],
    ) -> Result<QueryDescriptor> {
        let model = self.model.as_deref().ok_or(CacherError::ModelNotSet)?;
        Ok(QueryDescriptor::new(method, model.name(), options).with_extra_keys(extra_keys.iter().copied()))
    }

    /// Cache key a retrieval call would use.
    pub fn key_for(&self, method: Method, options: Option<QueryValue>, extra_keys: &[&str]) -> Result<String> {
        let descriptor = self.descriptor(method, options, extra_keys)?;
        Ok(self.fetcher.keys().derive_key(&descriptor))
    }

    /// Run the configured method.
    pub async fn execute(&self, options: Option<QueryValue>, extra_keys: &[&str]) -> Result<Cached> {
        self.run(self.method, options, extra_keys).await
    }

    /// Run a method given by name.
    pub async fn call(&self, method: &str, options: Option<QueryValue>, extra_keys: &[&str]) -> Result<Cached> {
        let method = method.parse()?;
        self.run(method, options, extra_keys).await
    }

    pub async fn find(&self, options: Option<QueryValue>, extra_keys: &[&str]) -> Result<Cached> {
        self.run(Method::Find, options, extra_keys).await
    }

    pub async fn find_one(&self, options: Option<QueryValue>, extra_keys: &[&str]) -> Result<Cached> {
        self.run(Method::FindOne, options, extra_keys).await
    }

    pub async fn find_all(&self, options: Option<QueryValue>, extra_keys: &[&str]) -> Result<Cached> {
        self.run(Method::FindAll, options, extra_keys).await
    }

    pub async fn find_and_count(&self, options: Option<QueryValue>, extra_keys: &[&str]) -> Result<Cached> {
        self.run(Method::FindAndCount, options, extra_keys).await
    }

    pub async fn find_and_count_all(&self, options: Option<QueryValue>, extra_keys: &[&str]) -> Result<Cached> {
        self.run(Method::FindAndCountAll, options, extra_keys).await
    }

    pub async fn all(&self, options: Option<QueryValue>, extra_keys: &[&str]) -> Result<Cached> {
        self.run(Method::All, options, extra_keys).await
    }

    pub async fn min(&self, options: Option<QueryValue>, extra_keys: &[&str]) -> Result<Cached> {
        self.run(Method::Min, options, extra_keys).await
    }

    pub async fn max(&self, options: Option<QueryValue>, extra_keys: &[&str]) -> Result<Cached> {
        self.run(Method::Max, options, extra_keys).await
    }

    pub async fn sum(&self, options: Option<QueryValue>, extra_keys: &[&str]) -> Result<Cached> {
        self.run(Method::Sum, options, extra_keys).await
    }

    pub async fn count(&self, options: Option<QueryValue>, extra_keys: &[&str]) -> Result<Cached> {
        self.run(Method::Count, options, extra_keys).await
    }

    /// Run raw SQL through the cache. Defaults to a `SELECT`.
    pub async fn query(&self, sql: &str, options: Option<RawOptions>) -> Result<Cached> {
        let runner = self.runner.as_deref().ok_or(CacherError::RunnerNotSet)?;
        self.fetcher.fetch_raw(sql, options.as_ref(), runner).await
    }

    /// Invalidate every key containing `pattern`, in the background.
    ///
    /// Returns `None` if the same pattern is already being invalidated.
    pub fn invalidate(&self, pattern: &str) -> Option<JoinHandle<InvalidationOutcome>> {
        self.invalidator.invalidate(pattern)
    }

    /// Invalidate every key containing `pattern` and wait for the outcome.
    pub async fn invalidate_and_wait(&self, pattern: &str) -> InvalidationOutcome {
        self.invalidator.run(pattern).await
    }

    async fn run(&self, method: Method, options: Option<QueryValue>, extra_keys: &[&str]) -> Result<Cached> {
        let model = self.model.as_deref().ok_or(CacherError::ModelNotSet)?;
        let descriptor = QueryDescriptor::new(method, model.name(), options).with_extra_keys(extra_keys.iter().copied());
        self.fetcher.fetch(&descriptor, model).await
    }
}

impl std::fmt::Debug for Cacher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cacher")
            .field("model", &self.model_name())
            .field("method", &self.method)
            .field("fetcher", &self.fetcher)
            .field("runner", &self.runner.is_some())
            .finish()
    }
}
