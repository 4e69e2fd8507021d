//! Error types for the caching layer.

use thiserror::Error;

use crate::store::StoreError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CacherError>;

/// Everything a cache operation can fail with.
#[derive(Debug, Error)]
pub enum CacherError {
    /// The cache store failed a GET/SET/SCAN/DELETE.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The data source failed; the error is passed through as-is.
    #[error(transparent)]
    Source(anyhow::Error),

    /// The retrieval method is unknown or not supported by the collection.
    #[error("invalid retrieval method: {0}")]
    InvalidMethod(String),

    /// A retrieval method was called before a target collection was set.
    #[error("no target model configured")]
    ModelNotSet,

    /// A raw query was issued without a query runner.
    #[error("no query runner configured")]
    RunnerNotSet,

    /// A cached payload could not be decoded. The entry is left in place.
    #[error("cached payload at '{key}' is not valid JSON: {source}")]
    Deserialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A fetched result could not be encoded for caching.
    #[error("failed to encode result for caching: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl CacherError {
    /// Whether this error was raised before any I/O was attempted.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::InvalidMethod(_) | Self::ModelNotSet | Self::RunnerNotSet
        )
    }
}
