use gaugemon_common::types::MetricKind;

/// Errors returned by every [`MetricStore`](crate::MetricStore) backend.
///
/// Both backends report a never-written name the same way, so callers can
/// match on [`StorageError::NotFound`] without knowing which one is active.
///
/// # Examples
///
/// ```rust
/// use gaugemon_common::types::MetricKind;
/// use gaugemon_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     kind: MetricKind::Counter,
///     name: "PollCount".to_string(),
/// };
/// assert!(err.is_not_found());
/// assert_eq!(err.to_string(), "Storage: counter 'PollCount' not found");
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The metric was never written.
    #[error("Storage: {kind} '{name}' not found")]
    NotFound { kind: MetricKind, name: String },

    /// An underlying database error. Transient connection failures only
    /// reach this variant after the retry schedule is exhausted.
    #[error("Storage: database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl StorageError {
    pub fn not_found(kind: MetricKind, name: &str) -> Self {
        StorageError::NotFound {
            kind,
            name: name.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
