use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// The caller stopped waiting; the work itself may still be running.
    #[error("Execution timed out after {0:?}")]
    ExecutionTimeout(Duration),

    /// Any failure raised by an injected work function.
    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Checkpoint IO error at {path}: {source}")]
    CheckpointIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

impl Error {
    /// Shorthand for wrapping a work-function failure.
    pub fn execution(msg: impl Into<String>) -> Self {
        Error::Execution(msg.into())
    }

    pub(crate) fn checkpoint_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::CheckpointIo {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
