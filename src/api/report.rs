use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::batch::{BatchReport, JobFailure};
use crate::error::Result;
use crate::transfer::{PruneRecord, TransferOutcome, TransferRecord};
use crate::types::{Language, TargetKind, Variant};

/// Pipeline stage a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Parse,
    Resolve,
    Composite,
    Transfer,
    Prune,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Parse => "parse",
            Stage::Resolve => "resolve",
            Stage::Composite => "composite",
            Stage::Transfer => "transfer",
            Stage::Prune => "prune",
        };
        write!(f, "{}", name)
    }
}

/// One failed unit of work, enough to re-run it selectively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureEntry {
    pub stage: Stage,
    pub kind: String,
    pub file: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<Variant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetKind>,
    pub reason: String,
}

impl fmt::Display for FailureEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}", self.stage, self.kind, self.file.display())?;
        if let (Some(language), Some(variant)) = (self.language, self.variant) {
            write!(f, " ({}/{})", variant, language)?;
        }
        if let Some(target) = self.target {
            write!(f, " -> {}", target)?;
        }
        write!(f, ": {}", self.reason)
    }
}

/// Everything a run did: compositing results, transfer records and removed
/// remote folders.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub batch: BatchReport,
    pub transfers: Vec<TransferRecord>,
    pub pruned: Vec<PruneRecord>,
}

impl RunReport {
    pub fn failures(&self) -> Vec<FailureEntry> {
        let mut failures: Vec<FailureEntry> = self
            .batch
            .parse_failures
            .iter()
            .map(|p| FailureEntry {
                stage: Stage::Parse,
                kind: p.error.kind().to_string(),
                file: p.path.clone(),
                language: None,
                variant: None,
                target: None,
                reason: p.error.to_string(),
            })
            .collect();

        for result in &self.batch.results {
            if let Some(failure) = result.failure() {
                let stage = match failure {
                    JobFailure::Resolution(_) => Stage::Resolve,
                    JobFailure::Composite(_) | JobFailure::Cancelled => Stage::Composite,
                };
                failures.push(FailureEntry {
                    stage,
                    kind: failure.kind().to_string(),
                    file: result.job.source.clone(),
                    language: Some(result.job.key.language),
                    variant: Some(result.job.key.variant),
                    target: None,
                    reason: failure.to_string(),
                });
            }
        }

        for record in &self.transfers {
            if let TransferOutcome::Failure(error) = &record.outcome {
                failures.push(FailureEntry {
                    stage: Stage::Transfer,
                    kind: error.kind().to_string(),
                    file: record.file.clone(),
                    language: None,
                    variant: None,
                    target: Some(record.target),
                    reason: format!("{} after {} attempt(s)", error, record.attempts),
                });
            }
        }

        for record in &self.pruned {
            if let TransferOutcome::Failure(error) = &record.outcome {
                failures.push(FailureEntry {
                    stage: Stage::Prune,
                    kind: error.kind().to_string(),
                    file: PathBuf::from(&record.remote_path),
                    language: None,
                    variant: None,
                    target: Some(record.target),
                    reason: error.to_string(),
                });
            }
        }
        failures
    }

    pub fn is_success(&self) -> bool {
        self.batch.is_success()
            && self.transfers.iter().all(TransferRecord::is_success)
            && self.pruned.iter().all(|r| r.outcome == TransferOutcome::Success)
    }

    pub fn to_json(&self) -> Result<String> {
        #[derive(Serialize)]
        struct Document<'a> {
            success: bool,
            composited: usize,
            uploaded: usize,
            failures: Vec<FailureEntry>,
            report: &'a RunReport,
        }
        let document = Document {
            success: self.is_success(),
            composited: self.batch.succeeded(),
            uploaded: self.transfers.iter().filter(|r| r.is_success()).count(),
            failures: self.failures(),
            report: self,
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let uploaded = self.transfers.iter().filter(|r| r.is_success()).count();
        writeln!(
            f,
            "Composited: {} ok, {} failed, {} skipped",
            self.batch.succeeded(),
            self.batch.failed(),
            self.batch.parse_failures.len()
        )?;
        writeln!(
            f,
            "Transfers: {} ok, {} failed",
            uploaded,
            self.transfers.len() - uploaded
        )?;
        for failure in self.failures() {
            writeln!(f, "  {}", failure)?;
        }
        Ok(())
    }
}
