use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in erpsync-core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("invalid column type for '{column}': expected {expected}, got {actual}")]
    InvalidColumnType {
        column: String,
        expected: String,
        actual: String,
    },

    #[error("invalid value for '{column}': {message}")]
    InvalidValue { column: String, message: String },

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("out-of-order row for {entity}: {row} does not sort after {previous}")]
    OutOfOrder {
        entity: String,
        row: String,
        previous: String,
    },

    #[error("source error: {0}")]
    Source(String),

    #[error("fetch for {entity} timed out after {after:?}")]
    Timeout { entity: String, after: Duration },

    #[error("replica error: {0}")]
    Replica(String),

    #[error("cursor store error: {0}")]
    Cursor(String),

    #[error("schema provisioning failed: {0}")]
    Schema(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("sync failed for entity {entity}")]
    EntityFailed {
        entity: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// True for errors caused by the shape of a source row rather than I/O.
    pub fn is_data_error(&self) -> bool {
        match self {
            Error::MissingColumn(_)
            | Error::InvalidColumnType { .. }
            | Error::InvalidValue { .. }
            | Error::InvalidTimestamp(_)
            | Error::OutOfOrder { .. } => true,
            Error::EntityFailed { source, .. } => source.is_data_error(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
