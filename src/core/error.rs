use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Schema inference error: {0}")]
    SchemaInference(String),

    #[error("Unknown session '{0}'")]
    UnknownSession(String),

    #[error("Statement not allowed: {0}")]
    DisallowedStatement(String),

    #[error("SQL execution error: {0}")]
    SqlExecution(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query exceeded the statement timeout of {0:?}")]
    QueryTimeout(Duration),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl DbError {
    /// Stable machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SchemaInference(_) => "SchemaInferenceError",
            Self::UnknownSession(_) => "UnknownSessionError",
            Self::DisallowedStatement(_) => "DisallowedStatementError",
            Self::SqlExecution(_) => "SqlExecutionError",
            Self::Storage(_) => "StorageError",
            Self::QueryTimeout(_) => "QueryTimeoutError",
            Self::LockError(_) => "StorageError",
            Self::Configuration(_) => "ConfigurationError",
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        Self::SchemaInference(format!("invalid JSON: {}", err))
    }
}

impl From<sqlparser::parser::ParserError> for DbError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        Self::SqlExecution(err.to_string())
    }
}

impl From<tokio::task::JoinError> for DbError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Storage(format!("background task failed: {}", err))
    }
}
