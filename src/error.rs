//! Crate-level error type and `Result` alias for startup-fatal failures.
//! Per-file, per-job and per-transfer problems never surface here; they are
//! recorded in the run report instead.
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("template store unreadable: {0}")]
    TemplateStore(#[source] std::io::Error),

    #[error("cannot scan source directory {path:?}: {reason}")]
    SourceDir { path: PathBuf, reason: String },

    #[error("worker pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("report serialization error: {0}")]
    Report(#[from] serde_json::Error),
}
