use thiserror::Error;

/// Stable error kinds surfaced by [`crate::vector_index::VectorIndex`] and
/// [`crate::document_index::DocumentIndex`].
///
/// Internal plumbing uses `anyhow::Result` for glue code (file I/O, JSON
/// parsing context); this enum is what crosses the public API boundary so
/// callers can match on *kind* instead of grepping error strings.
#[derive(Debug, Error)]
pub enum VectraError {
    /// A call violated the transaction state machine or an insert/create
    /// precondition. Fatal to the call; state is left unchanged.
    #[error("precondition violated: {0}")]
    PreconditionViolation(String),

    /// A lookup found nothing where something was required (querying an
    /// index that was never created, a sidecar file an item points at).
    #[error("not found: {0}")]
    NotFound(String),

    /// `index.json` / `catalog.json` failed to parse.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// The embeddings collaborator returned a non-success status.
    #[error("provider error: {0}")]
    ProviderError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VectraError>;
