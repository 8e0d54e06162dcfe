use thiserror::Error;

/// Errors surfaced by the scoring core to its callers.
///
/// Scoring computations themselves never fail; everything here comes from
/// the mutation path or from lookups against the signal store.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The referenced article, cluster, or user does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A report already exists for this article from the same user or
    /// anonymous fingerprint.
    #[error("article already reported")]
    DuplicateReport,

    /// Required identifiers were missing from the request; rejected before
    /// touching the store.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The underlying store failed mid-operation. The whole event was rolled
    /// back and is safe to retry.
    #[error("store error: {0}")]
    TransientStore(#[from] sqlx::Error),
}

impl CoreError {
    /// True when the failing insert hit one of the report uniqueness indexes.
    pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db_err) => {
                db_err.message().contains("UNIQUE constraint failed")
            }
            _ => false,
        }
    }
}
