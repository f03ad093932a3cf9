use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Invalid database credentials: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("Document store error: {0}")]
    Documents(#[from] mongodb::error::Error),

    #[error("Invalid working directory provided: {}", .0.display())]
    InvalidWorkingDir(PathBuf),

    #[error("Unsupported database connection string: {0}")]
    UnsupportedDatabase(String),

    #[error("No purge threshold configured")]
    MissingThreshold,

    #[error("Purge threshold must be a whole number of GiB, got {0:?}")]
    InvalidThreshold(String),

    #[error("Error writing to log file: {}: {source}", path.display())]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Error creating {kind} archival folder {}: {source}", path.display())]
    ArchiveFolder {
        kind: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}
