/// Cache error.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A caller-supplied argument was rejected: zero capacity, or an item
    /// whose own weight exceeds the cache capacity.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The recency order and the backing map disagree.
    #[error("consistency violation: {0}")]
    ConsistencyViolation(String),
    /// The reclamation sweeper thread could not be started.
    #[error("failed to spawn sweeper thread: {0}")]
    Spawn(#[from] std::io::Error),
    /// The data source behind a [`CachedAccessor`](crate::accessor::CachedAccessor) failed.
    #[error("data source error: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub(crate) fn consistency(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!(%msg, "cache consistency violation");
        Self::ConsistencyViolation(msg)
    }
}

/// Cache result.
pub type Result<T> = std::result::Result<T, Error>;
