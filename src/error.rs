use thiserror::Error;

/// Errors returned by the source and entry stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An entry with the same (source, link) pair is already stored.
    #[error("entry already exists for this source")]
    DuplicateEntry,

    /// The update or delete matched no rows.
    #[error("record not found")]
    NotFound,

    /// The input failed validation before reaching the database.
    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::DuplicateEntry)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::DuplicateEntry
            }
            _ => StoreError::Database(err),
        }
    }
}

/// Whole-document failures while retrieving or reading a remote feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, timeout, bad URL)
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Response with a non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),

    /// Payload could not be read as an RSS, Atom or JSON feed
    #[error("parse error: {0}")]
    Parse(#[from] feed_rs::parser::ParseFeedError),
}

impl FetchError {
    pub fn is_parse(&self) -> bool {
        matches!(self, FetchError::Parse(_))
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("source {0} not found")]
    SourceNotFound(i64),

    #[error("sync failed for source {source_id}: {source}")]
    Failed {
        source_id: i64,
        #[source]
        source: FetchError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
