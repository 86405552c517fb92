use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum MigrationError {
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("malformed reference: {0}")]
    MalformedReference(String),

    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("missing config file cellset-migrate.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config value: {0}")]
    InvalidConfig(String),

    #[error("object storage request failed: {0}")]
    StorageHttp(String),

    #[error("object storage returned status {status}: {message}")]
    StorageStatus { status: u16, message: String },

    #[error("failed to read dump {path}: {message}")]
    DumpRead { path: PathBuf, message: String },

    #[error("failed to decode document: {0}")]
    Decode(String),

    #[error("failed to write row to {table}: {message}")]
    SqlWrite { table: &'static str, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("invalid {kind} value: {value}")]
    InvalidEnum { kind: &'static str, value: String },
}

impl MigrationError {
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        MigrationError::NotFound {
            kind,
            key: key.into(),
        }
    }

    /// Coarse class used in batch reports.
    pub fn category(&self) -> &'static str {
        match self {
            MigrationError::NotFound { .. } => "not_found",
            MigrationError::MalformedReference(_)
            | MigrationError::Decode(_)
            | MigrationError::InvalidEnum { .. } => "malformed_reference",
            MigrationError::Precondition(_) => "precondition",
            MigrationError::StorageHttp(_)
            | MigrationError::StorageStatus { .. }
            | MigrationError::DumpRead { .. }
            | MigrationError::SqlWrite { .. }
            | MigrationError::Filesystem(_) => "io",
            MigrationError::MissingConfig
            | MigrationError::ConfigRead(_)
            | MigrationError::ConfigParse(_)
            | MigrationError::InvalidConfig(_) => "config",
        }
    }
}
