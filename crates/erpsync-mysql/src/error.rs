use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid source url: {0}")]
    Url(#[from] mysql_async::UrlError),

    #[error("mysql error: {0}")]
    MySql(String),

    #[error("cannot decode column '{column}': {message}")]
    Decode { column: String, message: String },
}

impl From<mysql_async::Error> for SourceError {
    fn from(e: mysql_async::Error) -> Self {
        // Server errors carry a code and SQL state worth keeping.
        if let mysql_async::Error::Server(ref server) = e {
            SourceError::MySql(format!(
                "{} (code: {}, state: {})",
                server.message, server.code, server.state
            ))
        } else {
            SourceError::MySql(e.to_string())
        }
    }
}

impl From<SourceError> for erpsync_core::Error {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Decode { column, message } => {
                erpsync_core::Error::InvalidValue { column, message }
            }
            other => erpsync_core::Error::Source(other.to_string()),
        }
    }
}

pub type SourceResult<T> = Result<T, SourceError>;
