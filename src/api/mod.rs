//! High-level library API: discover source rasters, composite them onto every
//! requested template and publish the results. Prefer these entrypoints over the
//! low-level `core` modules when embedding climcomp.
mod report;

pub use report::{FailureEntry, RunReport, Stage};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use tracing::info;
use walkdir::WalkDir;

use crate::config::TransferConfig;
use crate::core::batch::{BatchOrchestrator, CancellationToken};
use crate::core::params::PipelineConfig;
use crate::core::processing::compositor::{RasterCompositor, RenderOptions};
use crate::core::template::{TemplateResolver, TemplateStore};
use crate::error::{Error, Result};
use crate::io::RasterEngine;
use crate::transfer::{FtpTarget, RemoteLayout, RemoteTarget, SftpTarget, TransferDispatcher};

fn is_source_raster(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
        .unwrap_or(false)
}

/// Recursively list `.tif`/`.tiff` files under `dir`, sorted by path.
pub fn collect_source_rasters(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut sources = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|e| Error::SourceDir {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        if entry.file_type().is_file() && is_source_raster(entry.path()) {
            sources.push(entry.into_path());
        }
    }
    sources.sort();
    Ok(sources)
}

/// The SFTP and FTP publish targets.
pub fn remote_targets(config: &TransferConfig) -> Vec<Arc<dyn RemoteTarget>> {
    vec![
        Arc::new(SftpTarget::new(config.sftp.clone())),
        Arc::new(FtpTarget::new(config.ftp.clone())),
    ]
}

/// A configured pipeline run: compositing plus optional publishing.
pub struct Pipeline {
    config: PipelineConfig,
    engine: Arc<dyn RasterEngine>,
    store: Arc<dyn TemplateStore>,
    targets: Vec<Arc<dyn RemoteTarget>>,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        engine: Arc<dyn RasterEngine>,
        store: Arc<dyn TemplateStore>,
    ) -> Self {
        Self {
            config,
            engine,
            store,
            targets: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Publish successful artifacts to `targets`. Without targets nothing is uploaded.
    pub fn with_targets(mut self, targets: Vec<Arc<dyn RemoteTarget>>) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run_directory(&self, source_dir: &Path) -> Result<RunReport> {
        let sources = collect_source_rasters(source_dir)?;
        info!("Found {} source rasters in {:?}", sources.len(), source_dir);
        self.run(&sources)
    }

    /// Composite `sources` onto every configured language/variant and publish.
    ///
    /// Only an unreadable template store or an unusable output root fail the
    /// run; everything else is recorded in the report.
    pub fn run(&self, sources: &[PathBuf]) -> Result<RunReport> {
        let config = &self.config;
        std::fs::create_dir_all(&config.output_root)?;
        let resolver = TemplateResolver::new(self.store.clone()).map_err(Error::TemplateStore)?;

        let compositor = RasterCompositor::new(
            self.engine.clone(),
            Arc::new(config.parameters.clone()),
            RenderOptions {
                output_root: config.output_root.clone(),
                format: config.output_format,
                jpeg_quality: config.jpeg_quality,
            },
        );
        let orchestrator = BatchOrchestrator::new(resolver, Arc::new(compositor), config.workers)?
            .with_cancellation(self.cancel.clone());
        let batch = orchestrator.run(sources, &config.languages, &config.variants);

        if self.targets.is_empty() {
            info!("Upload disabled");
            return Ok(RunReport {
                batch,
                ..RunReport::default()
            });
        }

        let today = Local::now().date_naive();
        let layout = RemoteLayout {
            remote_dir: config.remote_dir.clone(),
            date: config.dated_remote_dirs.then_some(today),
            keep_days: config.keep_days,
        };
        let artifacts: Vec<_> = batch.artifacts().cloned().collect();
        let dispatcher = TransferDispatcher::new(
            self.targets.clone(),
            layout,
            config.retry,
            config.transfer_concurrency,
        )?
        .with_cancellation(self.cancel.clone());
        let transfers = dispatcher.dispatch(&artifacts);
        let pruned = dispatcher.prune(today);

        Ok(RunReport {
            batch,
            transfers,
            pruned,
        })
    }
}
