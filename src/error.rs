pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Persisted artifacts exist for the collection but fail to parse, or
    /// their document counts diverge. Never repaired silently; the caller
    /// decides whether to treat the collection as absent or to alert.
    #[error("collection '{collection}' has inconsistent persisted state: {detail}")]
    InconsistentState { collection: String, detail: String },

    /// The embedding provider or reranker failed. Retry policy belongs to
    /// the caller, not the retrieval core.
    #[error("upstream model call failed: {0}")]
    Upstream(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}
