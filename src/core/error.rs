use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Table '{0}' has no configuration entry")]
    TableNotConfigured(String),

    #[error("Table '{table}' is configured with primary key '{configured}' but the record declares '{declared}'")]
    PrimaryKeyMismatch {
        table: String,
        configured: String,
        declared: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage file '{0}' is locked by another handle")]
    Locked(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl From<tokio::task::JoinError> for DbError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Runtime(err.to_string())
    }
}

impl DbError {
    /// Configuration errors are raised at open time and never swallowed.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::TableNotConfigured(_) | Self::PrimaryKeyMismatch { .. }
        )
    }
}
