//! Publishing rendered artifacts to remote targets.
//!
//! Every target implements `RemoteTarget`; the dispatcher owns retry with
//! backoff, cancellation and the temp-name-then-rename publish protocol, so SFTP and FTP
//! only provide raw session operations.
pub mod ftp;
pub mod sftp;

pub use ftp::FtpTarget;
pub use sftp::SftpTarget;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::NaiveDate;
use rayon::prelude::*;
use retry_policies::policies::ExponentialBackoff;
use retry_policies::{RetryDecision, RetryPolicy as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::batch::CancellationToken;
use crate::core::processing::compositor::Artifact;
use crate::types::TargetKind;

/// Suffix of in-flight uploads.
pub const PARTIAL_SUFFIX: &str = ".part";

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum TransferError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    #[error("remote rejected the operation: {0}")]
    RemoteRejected(String),
    #[error("cancelled")]
    Cancelled,
}

impl TransferError {
    pub fn kind(&self) -> &'static str {
        match self {
            TransferError::ConnectionFailed(_) => "ConnectionFailed",
            TransferError::AuthFailed(_) => "AuthFailed",
            TransferError::RemoteRejected(_) => "RemoteRejected",
            TransferError::Cancelled => "Cancelled",
        }
    }

    /// Only connection-level failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferError::ConnectionFailed(_))
    }

    /// Classify an I/O error raised mid-session.
    pub(crate) fn from_io(context: &str, e: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        match e.kind() {
            TimedOut | WouldBlock | ConnectionRefused | ConnectionReset | ConnectionAborted
            | BrokenPipe | UnexpectedEof | NotConnected => {
                TransferError::ConnectionFailed(format!("{}: {}", context, e))
            }
            _ => TransferError::RemoteRejected(format!("{}: {}", context, e)),
        }
    }
}

/// An open connection to a remote target.
pub trait RemoteSession {
    /// Create `path` and any missing parents.
    fn ensure_dir(&mut self, path: &str) -> Result<(), TransferError>;

    fn put(&mut self, local: &Path, remote: &str) -> Result<(), TransferError>;

    /// Move `from` onto `to`, replacing an existing `to`.
    fn rename(&mut self, from: &str, to: &str) -> Result<(), TransferError>;

    fn supports_atomic_rename(&self) -> bool {
        true
    }

    /// Entries directly below `dir`, without `.` and `..`.
    fn list(&mut self, dir: &str) -> Result<Vec<RemoteEntry>, TransferError>;

    fn remove_file(&mut self, path: &str) -> Result<(), TransferError>;

    /// Remove an empty directory.
    fn remove_dir(&mut self, path: &str) -> Result<(), TransferError>;

    fn close(self: Box<Self>) -> Result<(), TransferError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub is_dir: bool,
}

fn child_path(dir: &str, name: &str) -> String {
    match dir {
        "." => name.to_string(),
        "/" => format!("/{}", name),
        _ => format!("{}/{}", dir.trim_end_matches('/'), name),
    }
}

/// Delete `path` and everything below it, depth first.
pub fn remove_tree(session: &mut dyn RemoteSession, path: &str) -> Result<(), TransferError> {
    for entry in session.list(path)? {
        let child = child_path(path, &entry.name);
        if entry.is_dir {
            remove_tree(session, &child)?;
        } else {
            session.remove_file(&child)?;
        }
    }
    session.remove_dir(path)
}

/// A remote publish destination.
pub trait RemoteTarget: Send + Sync {
    fn kind(&self) -> TargetKind;

    fn connect(&self) -> Result<Box<dyn RemoteSession>, TransferError>;
}

/// Bounded retry with exponential backoff between `backoff_ms` and
/// `max_backoff_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> ExponentialBackoff {
        let min = Duration::from_millis(self.backoff_ms);
        let max = Duration::from_millis(self.max_backoff_ms).max(min);
        ExponentialBackoff::builder()
            .retry_bounds(min, max)
            .build_with_max_retries(self.max_attempts.saturating_sub(1))
    }
}

/// Where artifacts land on the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    pub remote_dir: String,
    /// Adds a `YYYY-MM-DD` folder below `remote_dir` when set
    pub date: Option<NaiveDate>,
    /// Dated folders older than this many days are pruned
    pub keep_days: Option<u32>,
}

impl RemoteLayout {
    pub fn remote_path(&self, relative_path: &str) -> String {
        let mut parts: Vec<String> = Vec::new();
        let base = self.remote_dir.trim_end_matches('/');
        if !base.is_empty() {
            parts.push(base.to_string());
        }
        if let Some(date) = self.date {
            parts.push(date.format("%Y-%m-%d").to_string());
        }
        parts.push(relative_path.trim_start_matches('/').to_string());
        parts.join("/")
    }

    /// Whether `name` is a `YYYY-MM-DD` folder more than `keep_days` before
    /// `today`. Always false without a retention window.
    pub fn is_expired(&self, name: &str, today: NaiveDate) -> bool {
        let Some(keep_days) = self.keep_days else {
            return false;
        };
        match NaiveDate::parse_from_str(name, "%Y-%m-%d") {
            Ok(date) if date.format("%Y-%m-%d").to_string() == name => {
                (today - date).num_days() > i64::from(keep_days)
            }
            _ => false,
        }
    }
}

/// Result of pruning one expired folder on one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PruneRecord {
    pub target: TargetKind,
    pub remote_path: String,
    pub outcome: TransferOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TransferOutcome {
    Success,
    Failure(TransferError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferRecord {
    pub file: PathBuf,
    pub remote_path: String,
    pub target: TargetKind,
    pub outcome: TransferOutcome,
    pub attempts: u32,
}

impl TransferRecord {
    pub fn is_success(&self) -> bool {
        self.outcome == TransferOutcome::Success
    }
}

pub struct TransferDispatcher {
    targets: Vec<Arc<dyn RemoteTarget>>,
    layout: RemoteLayout,
    retry: RetryPolicy,
    pool: rayon::ThreadPool,
    cancel: CancellationToken,
}

impl TransferDispatcher {
    pub fn new(
        targets: Vec<Arc<dyn RemoteTarget>>,
        layout: RemoteLayout,
        retry: RetryPolicy,
        concurrency: usize,
    ) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(concurrency.max(1))
            .thread_name(|i| format!("transfer-{}", i))
            .build()?;
        Ok(Self {
            targets,
            layout,
            retry,
            pool,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Upload every artifact to every target. One record per pair, ordered by
    /// artifact then target.
    pub fn dispatch(&self, artifacts: &[Artifact]) -> Vec<TransferRecord> {
        let pairs: Vec<(&Artifact, &Arc<dyn RemoteTarget>)> = artifacts
            .iter()
            .flat_map(|a| self.targets.iter().map(move |t| (a, t)))
            .collect();
        info!(
            "Publishing {} artifacts to {} targets",
            artifacts.len(),
            self.targets.len()
        );
        let records: Vec<TransferRecord> = self.pool.install(|| {
            pairs
                .par_iter()
                .map(|(artifact, target)| self.transfer(artifact, target.as_ref()))
                .collect()
        });
        let failed = records.iter().filter(|r| !r.is_success()).count();
        info!(
            "Transfers complete: {} succeeded, {} failed",
            records.len() - failed,
            failed
        );
        records
    }

    /// Remove expired dated folders below `remote_dir` on every target.
    /// A target that cannot be listed yields a single failed record for
    /// `remote_dir`.
    pub fn prune(&self, today: NaiveDate) -> Vec<PruneRecord> {
        if self.layout.keep_days.is_none() {
            return Vec::new();
        }
        let records: Vec<Vec<PruneRecord>> = self.pool.install(|| {
            self.targets
                .par_iter()
                .map(|target| self.prune_target(target.as_ref(), today))
                .collect()
        });
        records.into_iter().flatten().collect()
    }

    fn prune_target(&self, target: &dyn RemoteTarget, today: NaiveDate) -> Vec<PruneRecord> {
        let root = match self.layout.remote_dir.trim_end_matches('/') {
            "" if self.layout.remote_dir.starts_with('/') => "/".to_string(),
            "" => ".".to_string(),
            dir => dir.to_string(),
        };
        let record = |remote_path: String, outcome| PruneRecord {
            target: target.kind(),
            remote_path,
            outcome,
        };
        if self.cancel.is_cancelled() {
            return vec![record(root, TransferOutcome::Failure(TransferError::Cancelled))];
        }
        let mut session = match target.connect() {
            Ok(session) => session,
            Err(e) => {
                warn!("{} prune of {} skipped: {}", target.kind(), root, e);
                return vec![record(root, TransferOutcome::Failure(e))];
            }
        };
        let expired = match session.list(&root) {
            Ok(entries) => entries
                .into_iter()
                .filter(|e| e.is_dir && self.layout.is_expired(&e.name, today))
                .map(|e| child_path(&root, &e.name))
                .collect::<Vec<_>>(),
            Err(e) => {
                warn!("{} prune of {} skipped: {}", target.kind(), root, e);
                if let Err(close) = session.close() {
                    debug!("{} close after prune: {}", target.kind(), close);
                }
                return vec![record(root, TransferOutcome::Failure(e))];
            }
        };
        let records = expired
            .into_iter()
            .map(|path| match remove_tree(session.as_mut(), &path) {
                Ok(()) => {
                    info!("{} removed expired folder {}", target.kind(), path);
                    record(path, TransferOutcome::Success)
                }
                Err(e) => {
                    warn!("{} could not remove {}: {}", target.kind(), path, e);
                    record(path, TransferOutcome::Failure(e))
                }
            })
            .collect();
        if let Err(e) = session.close() {
            debug!("{} close after prune: {}", target.kind(), e);
        }
        records
    }

    fn transfer(&self, artifact: &Artifact, target: &dyn RemoteTarget) -> TransferRecord {
        let remote_path = self.layout.remote_path(&artifact.relative_path);
        let backoff = self.retry.backoff();
        let started = SystemTime::now();
        let mut attempts = 0;
        let outcome = loop {
            if self.cancel.is_cancelled() {
                break TransferOutcome::Failure(TransferError::Cancelled);
            }
            attempts += 1;
            let error = match publish(target, &artifact.local_path, &remote_path) {
                Ok(()) => {
                    debug!("{} <- {} (attempt {})", target.kind(), remote_path, attempts);
                    break TransferOutcome::Success;
                }
                Err(e) => e,
            };
            let decision = if error.is_retryable() {
                backoff.should_retry(started, attempts - 1)
            } else {
                RetryDecision::DoNotRetry
            };
            match decision {
                RetryDecision::Retry { execute_after } => {
                    let delay = execute_after
                        .duration_since(SystemTime::now())
                        .unwrap_or(Duration::ZERO);
                    warn!(
                        "{} upload of {} failed (attempt {}/{}): {}; retrying in {:?}",
                        target.kind(),
                        remote_path,
                        attempts,
                        self.retry.max_attempts,
                        error,
                        delay
                    );
                    std::thread::sleep(delay);
                }
                RetryDecision::DoNotRetry => {
                    warn!(
                        "{} upload of {} failed after {} attempt(s): {}",
                        target.kind(),
                        remote_path,
                        attempts,
                        error
                    );
                    break TransferOutcome::Failure(error);
                }
            }
        };
        TransferRecord {
            file: artifact.local_path.clone(),
            remote_path,
            target: target.kind(),
            outcome,
            attempts,
        }
    }
}

/// One publish attempt on a fresh session: upload under a temporary name, then
/// rename onto the final path.
fn publish(target: &dyn RemoteTarget, local: &Path, remote_path: &str) -> Result<(), TransferError> {
    let mut session = target.connect()?;
    let result = (|| {
        if let Some((dir, _)) = remote_path.rsplit_once('/') {
            session.ensure_dir(dir)?;
        }
        if session.supports_atomic_rename() {
            let partial = format!("{}{}", remote_path, PARTIAL_SUFFIX);
            session.put(local, &partial)?;
            session.rename(&partial, remote_path)
        } else {
            warn!(
                "{} does not support rename; uploading {} in place",
                target.kind(),
                remote_path
            );
            session.put(local, remote_path)
        }
    })();
    if let Err(e) = session.close() {
        debug!("{} close failed: {}", target.kind(), e);
    }
    result
}
