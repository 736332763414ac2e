use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Corpus empty, malformed or unreadable while building the index.
    #[error("Build failed: {0}")]
    Build(String),

    /// Caller supplied an unusable query (blank text, non-positive top_k).
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// No usable index and building on demand is not allowed.
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn build(msg: impl Into<String>) -> Self { Self::Build(msg.into()) }

    pub fn invalid_query(msg: impl Into<String>) -> Self { Self::InvalidQuery(msg.into()) }

    pub fn index_unavailable(msg: impl Into<String>) -> Self { Self::IndexUnavailable(msg.into()) }

    pub fn embedding(msg: impl Into<String>) -> Self { Self::Embedding(msg.into()) }

    pub fn storage(msg: impl Into<String>) -> Self { Self::Storage(msg.into()) }

    /// True when the failure was caused by the caller's input rather than the service.
    pub fn is_client_error(&self) -> bool { matches!(self, Self::InvalidQuery(_)) }
}

pub type Result<T> = std::result::Result<T, Error>;
