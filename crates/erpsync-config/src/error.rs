use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("missing required setting: {field}")]
    MissingField { field: String },

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("unknown entities in allow-list: {0}")]
    UnknownEntities(String),

    #[error("invalid table for {entity}: {source}")]
    InvalidTable {
        entity: String,
        #[source]
        source: erpsync_core::Error,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
