//! Batch orchestration: sources × languages × variants on a bounded worker pool.
//!
//! Every source is parsed once and loaded at most once. Each (language, variant)
//! pair becomes a `CompositeJob` driven through
//! `Pending -> Resolving -> Compositing -> Succeeded | Failed`. Per-job failures
//! are recorded in the report, never returned as errors.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::OnceCell;
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::core::naming::{ParameterIdentity, ParseError, parse};
use crate::core::processing::compositor::{Artifact, CompositeError, RasterCompositor};
use crate::core::processing::grid::GeoRaster;
use crate::core::template::{ResolutionError, TemplateResolver};
use crate::types::{Language, TemplateKey, Variant};

/// Run-level cancellation signal shared by the batch and transfer stages.
///
/// Cancelling stops new jobs and transfers from starting; work already in
/// flight completes normally.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Pending,
    Resolving,
    Compositing,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Pending, Resolving)
                | (Pending, Failed)
                | (Resolving, Compositing)
                | (Resolving, Failed)
                | (Compositing, Succeeded)
                | (Compositing, Failed)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid job transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: JobState,
    pub to: JobState,
}

/// One (source, language, variant) unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompositeJob {
    pub source: PathBuf,
    pub identity: ParameterIdentity,
    pub key: TemplateKey,
    state: JobState,
}

impl CompositeJob {
    pub fn new(source: PathBuf, identity: ParameterIdentity, key: TemplateKey) -> Self {
        Self {
            source,
            identity,
            key,
            state: JobState::Pending,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn advance(&mut self, next: JobState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum JobFailure {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Composite(#[from] CompositeError),
    #[error("cancelled before start")]
    Cancelled,
}

impl JobFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            JobFailure::Resolution(e) => e.kind(),
            JobFailure::Composite(e) => e.kind(),
            JobFailure::Cancelled => "Cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum JobOutcome {
    Success(Artifact),
    Failure(JobFailure),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompositeResult {
    pub job: CompositeJob,
    pub outcome: JobOutcome,
}

impl CompositeResult {
    pub fn artifact(&self) -> Option<&Artifact> {
        match &self.outcome {
            JobOutcome::Success(artifact) => Some(artifact),
            JobOutcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&JobFailure> {
        match &self.outcome {
            JobOutcome::Success(_) => None,
            JobOutcome::Failure(failure) => Some(failure),
        }
    }
}

/// Why a source file produced no jobs.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum SourceError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Another source with the same canonical stem came first in path order;
    /// both would render to the same output files.
    #[error("{name} has the same identity as {first:?}")]
    DuplicateIdentity { name: String, first: PathBuf },
}

impl SourceError {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Parse(e) => e.kind(),
            SourceError::DuplicateIdentity { .. } => "DuplicateIdentity",
        }
    }
}

/// A source skipped before any job was built for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseFailure {
    pub path: PathBuf,
    pub error: SourceError,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// Unparsable names and duplicate identities, ordered by path
    pub parse_failures: Vec<ParseFailure>,
    /// Ordered by (source, language, variant)
    pub results: Vec<CompositeResult>,
}

impl BatchReport {
    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.results.iter().filter_map(CompositeResult::artifact)
    }

    pub fn succeeded(&self) -> usize {
        self.artifacts().count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn is_success(&self) -> bool {
        self.parse_failures.is_empty() && self.failed() == 0
    }
}

pub struct BatchOrchestrator {
    resolver: TemplateResolver,
    compositor: Arc<RasterCompositor>,
    pool: rayon::ThreadPool,
    cancel: CancellationToken,
}

impl BatchOrchestrator {
    /// `workers == 0` sizes the pool to the available parallelism.
    pub fn new(
        resolver: TemplateResolver,
        compositor: Arc<RasterCompositor>,
        workers: usize,
    ) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("composite-{}", i))
            .build()?;
        Ok(Self {
            resolver,
            compositor,
            pool,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn run(&self, sources: &[PathBuf], languages: &[Language], variants: &[Variant]) -> BatchReport {
        let mut keys: Vec<TemplateKey> = languages
            .iter()
            .flat_map(|&language| variants.iter().map(move |&variant| TemplateKey::new(language, variant)))
            .collect();
        keys.sort();
        keys.dedup();

        info!(
            "Compositing {} sources x {} templates on {} workers",
            sources.len(),
            keys.len(),
            self.pool.current_num_threads()
        );

        let (parsed, skipped) = admit_sources(sources);
        let per_source: Vec<Vec<CompositeResult>> = self.pool.install(|| {
            parsed
                .par_iter()
                .map(|(path, identity)| self.run_source(path, identity, &keys))
                .collect()
        });

        let mut report = BatchReport {
            parse_failures: skipped,
            results: per_source.into_iter().flatten().collect(),
        };
        report.parse_failures.sort_by(|a, b| a.path.cmp(&b.path));
        report
            .results
            .sort_by(|a, b| (&a.job.source, a.job.key).cmp(&(&b.job.source, b.job.key)));

        info!(
            "Batch complete: {} succeeded, {} failed, {} skipped",
            report.succeeded(),
            report.failed(),
            report.parse_failures.len()
        );
        report
    }

    fn run_source(
        &self,
        path: &Path,
        identity: &ParameterIdentity,
        keys: &[TemplateKey],
    ) -> Vec<CompositeResult> {
        // Decoded on first use, shared by every job of this source
        let source: OnceCell<Result<GeoRaster, CompositeError>> = OnceCell::new();
        keys.par_iter()
            .map(|&key| {
                let job = CompositeJob::new(path.to_path_buf(), identity.clone(), key);
                self.drive(job, &source)
            })
            .collect()
    }

    fn drive(
        &self,
        mut job: CompositeJob,
        source: &OnceCell<Result<GeoRaster, CompositeError>>,
    ) -> CompositeResult {
        if self.cancel.is_cancelled() {
            return finish(job, Err(JobFailure::Cancelled));
        }

        enter(&mut job, JobState::Resolving);
        if !self.compositor.knows(&job.identity.code) {
            let failure = CompositeError::UnknownParameter {
                code: job.identity.code.clone(),
            };
            return finish(job, Err(failure.into()));
        }
        let template = match self.resolver.resolve(job.key, &job.identity) {
            Ok(template) => template,
            Err(e) => return finish(job, Err(e.into())),
        };

        enter(&mut job, JobState::Compositing);
        let raster = match source.get_or_init(|| self.compositor.load_source(&job.source)) {
            Ok(raster) => raster,
            Err(e) => return finish(job, Err(e.clone().into())),
        };
        let outcome = self
            .compositor
            .composite(raster, &template, &job.identity, job.key)
            .map_err(JobFailure::from);
        finish(job, outcome)
    }
}

/// Parse every source and keep the first of each canonical stem in path order.
fn admit_sources(sources: &[PathBuf]) -> (Vec<(PathBuf, ParameterIdentity)>, Vec<ParseFailure>) {
    let mut ordered: Vec<&PathBuf> = sources.iter().collect();
    ordered.sort();
    ordered.dedup();

    let mut first_by_stem: HashMap<String, PathBuf> = HashMap::new();
    let mut parsed = Vec::new();
    let mut skipped = Vec::new();
    for path in ordered {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let error = match parse(&name) {
            Ok(identity) => match first_by_stem.get(&identity.canonical_stem()) {
                Some(first) => SourceError::DuplicateIdentity {
                    name,
                    first: first.clone(),
                },
                None => {
                    first_by_stem.insert(identity.canonical_stem(), path.clone());
                    parsed.push((path.clone(), identity));
                    continue;
                }
            },
            Err(e) => e.into(),
        };
        warn!("Skipping {:?}: {}", path, error);
        skipped.push(ParseFailure {
            path: path.clone(),
            error,
        });
    }
    (parsed, skipped)
}

fn enter(job: &mut CompositeJob, next: JobState) {
    if let Err(e) = job.advance(next) {
        warn!("{}: {}", job.identity, e);
    }
}

fn finish(mut job: CompositeJob, outcome: Result<Artifact, JobFailure>) -> CompositeResult {
    let outcome = match outcome {
        Ok(artifact) => {
            enter(&mut job, JobState::Succeeded);
            JobOutcome::Success(artifact)
        }
        Err(failure) => {
            warn!(
                "{} [{}] failed: {}",
                job.source.display(),
                job.key,
                failure
            );
            enter(&mut job, JobState::Failed);
            JobOutcome::Failure(failure)
        }
    };
    CompositeResult { job, outcome }
}
