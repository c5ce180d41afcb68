use thiserror::Error;

#[derive(Debug, Error)]
pub enum PgError {
    /// The server rejected a statement.
    #[error("{severity} {code}: {message}")]
    Database {
        severity: String,
        code: String,
        message: String,
    },

    /// Anything else the driver reports: closed sockets, protocol errors.
    #[error("postgres error: {0}")]
    Driver(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("stored cursor for {entity} is unreadable: {message}")]
    CorruptCursor { entity: String, message: String },
}

impl From<tokio_postgres::Error> for PgError {
    fn from(e: tokio_postgres::Error) -> Self {
        match e.as_db_error() {
            Some(db) => PgError::Database {
                severity: db.severity().to_string(),
                code: db.code().code().to_string(),
                message: db.message().to_string(),
            },
            None => PgError::Driver(e.to_string()),
        }
    }
}

impl From<PgError> for erpsync_core::Error {
    fn from(e: PgError) -> Self {
        erpsync_core::Error::Replica(e.to_string())
    }
}

pub type PgResult<T> = Result<T, PgError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_error_display() {
        let err = PgError::Database {
            severity: "ERROR".into(),
            code: "42P01".into(),
            message: "relation \"items\" does not exist".into(),
        };
        assert_eq!(err.to_string(), "ERROR 42P01: relation \"items\" does not exist");
    }

    #[test]
    fn test_maps_to_replica_error() {
        let err: erpsync_core::Error = PgError::Connection("refused".into()).into();
        assert!(matches!(err, erpsync_core::Error::Replica(ref m) if m.contains("refused")));
        assert!(!err.is_data_error());
    }
}
