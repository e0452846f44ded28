use std::path::PathBuf;

use thiserror::Error;

/// Application-specific errors for the CLI
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Source directory does not exist: {path:?}")]
    MissingSourceDir { path: PathBuf },

    #[error("Failed to write report {path:?}: {source}")]
    Report {
        path: PathBuf,
        #[source]
        source: climcomp::Error,
    },

    #[error(transparent)]
    Config(#[from] climcomp::ConfigError),

    #[error(transparent)]
    Pipeline(#[from] climcomp::Error),
}
