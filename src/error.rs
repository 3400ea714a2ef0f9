use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building a classifier or selecting a prompt.
///
/// Model and parse failures never surface here: the orchestrator turns them
/// into logged attempt failures and an absent result.
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("unknown prompt strategy: {0}")]
    InvalidStrategy(String),

    #[error("event configuration file not found: {}", .0.display())]
    ConfigurationNotFound(PathBuf),

    #[error("invalid event configuration in {}: {source}", path.display())]
    InvalidConfiguration {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("event configuration defines no categories")]
    EmptyCategorySet,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClassifierError>;
