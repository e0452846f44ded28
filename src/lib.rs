#![doc = r#"
climcomp — climate map compositing and publishing.

This crate turns raw climate-parameter rasters (available-water metrics AWD / AWR /
AWP at soil depths, fire-weather indices, thermal-comfort indices) into finished web
maps: every source raster is aligned onto the pre-authored background template of
each language and template variant, classified into the parameter's colour legend,
rendered to PNG or JPEG, and published to an SFTP and an FTP server.

Requirements
------------
- GDAL development headers and runtime, plus `gdalwarp` on `PATH` for reprojection.
- libssh2 (via the `ssh2` crate) for SFTP uploads.
- Rust 2024 edition toolchain.

Naming
------
Source rasters and their templates share a canonical stem:
`bg_<PARAM>[_<low>-<high>cm]`, e.g. `bg_AWD_0-40cm.tif` and
`<template_root>/normal/en/bg_AWD_0-40cm.png`. The rendered map is written to
`<output_root>/<variant>/<language>/<PARAM>[_<low>-<high>cm].png` and uploaded to
the same relative path below the remote directory.

Quick start
-----------
```rust,no_run
use std::path::Path;
use std::sync::Arc;
use climcomp::{
    FsTemplateStore, GdalEngine, Pipeline, PipelineConfig, TransferConfig, remote_targets,
};

fn main() -> climcomp::Result<()> {
    let config = PipelineConfig::load(Path::new("config/pipeline.yaml"))?;
    let store = Arc::new(FsTemplateStore::new(&config.template_root));
    let targets = remote_targets(&TransferConfig::from_env()?);

    let report = Pipeline::new(config, Arc::new(GdalEngine::new()), store)
        .with_targets(targets)
        .run_directory(Path::new("/data/2024-07-01"))?;

    print!("{report}");
    Ok(())
}
```

Error handling
--------------
Only startup problems (configuration, template store, source directory) are returned
as `climcomp::Error`. Everything that goes wrong for a single file, job or upload is
recorded in the `RunReport`, each failure with a stable `kind` string:

```rust,no_run
# fn report() -> climcomp::RunReport { unimplemented!() }
let report = report();
for failure in report.failures() {
    eprintln!("{} {} {}", failure.stage, failure.kind, failure.file.display());
}
```

Useful modules
--------------
- [`api`] — high-level run entry points and the run report.
- [`core`] — filename grammar, symbology, templates, compositing, batch orchestration.
- [`io`] — the GDAL raster engine and PNG/JPEG writers.
- [`transfer`] — the remote publish targets and retrying dispatcher.
- [`config`] — environment-sourced transfer credentials.
- [`error`] — crate-level `Error` and `Result`.
"#]

// Core modules (public)
pub mod api;
pub mod config;
pub mod core;
pub mod error;
pub mod io;
pub mod transfer;
pub mod types;

// Curated public API surface
// Types
pub use core::params::PipelineConfig;
pub use error::{Error, Result};
pub use types::{Language, OutputFormat, Resampling, TargetKind, TemplateKey, Variant};

// Pipeline building blocks
pub use core::batch::{BatchOrchestrator, BatchReport, CancellationToken, JobFailure, JobState, ParseFailure, SourceError};
pub use core::naming::{ParameterIdentity, ParseError, parse};
pub use core::processing::compositor::{Artifact, CompositeError, RasterCompositor};
pub use core::symbology::{ParameterStyle, Symbology};
pub use core::template::{FsTemplateStore, ResolutionError, TemplateResolver, TemplateStore};
pub use io::gdal::{GdalEngine, RasterEngine, RasterError};

// Configuration and transfer
pub use config::{ConfigError, Endpoint, TransferConfig};
pub use transfer::{
    PruneRecord, RemoteTarget, RetryPolicy, TransferDispatcher, TransferError, TransferRecord,
};

// High-level API re-exports
pub use api::{FailureEntry, Pipeline, RunReport, Stage, collect_source_rasters, remote_targets};
