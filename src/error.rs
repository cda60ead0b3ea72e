//! Error types for the document store and its adapters.

use thiserror::Error;

use crate::codec::CodecError;

pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors raised by the cluster, its collections and the store adapters.
///
/// Absence of a record is never one of these: lookups return `Ok(None)`
/// (or the zero state) instead.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("invalid connection string {0:?}")]
    InvalidConnectionString(String),

    /// Bucket, scope or collection name that cannot become a table name.
    #[error("invalid name {0:?}: expected ASCII letters, digits, '_' or '-'")]
    InvalidName(String),

    #[error("ready timeout must be positive, got {0:?}")]
    InvalidReadyTimeout(std::time::Duration),

    #[error("connection pool: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("database: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("document: {0}")]
    Document(#[from] serde_json::Error),

    #[error("codec: {0}")]
    Codec(#[from] CodecError),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<StorageError>,
    },
}

impl StorageError {
    /// Innermost error, skipping `Context` layers.
    pub fn root(&self) -> &StorageError {
        match self {
            StorageError::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Attach an operation/key description to a failed storage call.
pub trait ResultExt<T> {
    fn context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<StorageError>,
{
    fn context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|err| StorageError::Context {
            context: f(),
            source: Box::new(err.into()),
        })
    }
}
