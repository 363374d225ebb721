use crate::model::Environment;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("metadata serialization error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("connection to {host} failed: {message}")]
    ConnectionFailed { host: String, message: String },

    #[error("remote command exited with status {exit_code}: {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    #[error("scan of {path} failed: {message}")]
    ScanFailed { path: String, message: String },

    #[error("backup '{backup_id}' failed: {message}")]
    BackupFailed { backup_id: String, message: String },

    #[error("backup '{backup_id}' not found under {backup_root}")]
    BackupNotFound {
        backup_id: String,
        backup_root: String,
    },

    #[error("backup size {actual} bytes exceeds limit of {limit} bytes")]
    BackupSizeExceeded { actual: u64, limit: u64 },

    #[error("an operation on backup '{backup_id}' is already in flight")]
    BackupInFlight { backup_id: String },

    #[error("move precondition violated: {0}")]
    MovePrecondition(String),

    #[error("move of {path} failed on {environment}: {message}")]
    MoveFailed {
        path: String,
        environment: Environment,
        message: String,
    },

    #[error("setting permissions on {path} failed: {message}")]
    PermissionFailed { path: String, message: String },

    #[error("directory creation at {path} failed: {message}")]
    DirectoryCreationFailed { path: String, message: String },

    #[error("sync failed: {0}")]
    SyncFailed(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("{0}")]
    Other(String),
}
