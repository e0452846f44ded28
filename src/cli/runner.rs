use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use climcomp::{
    FsTemplateStore, GdalEngine, Pipeline, PipelineConfig, RunReport, TransferConfig,
    remote_targets,
};

use super::args::CliArgs;
use super::errors::AppError;

const EXIT_PARTIAL_FAILURE: u8 = 1;
const EXIT_STARTUP: u8 = 2;

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Load configuration and apply command line overrides.
fn load_config(args: &CliArgs) -> Result<PipelineConfig, AppError> {
    let mut config = PipelineConfig::load(&args.config)?;
    if !args.languages.is_empty() {
        config.languages = args.languages.clone();
    }
    if !args.variants.is_empty() {
        config.variants = args.variants.clone();
    }
    if let Some(output_dir) = &args.output_dir {
        config.output_root = output_dir.clone();
    }
    if let Some(format) = args.format {
        config.output_format = format;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    Ok(config)
}

fn execute(args: &CliArgs) -> Result<RunReport, AppError> {
    if !args.source_dir.is_dir() {
        return Err(AppError::MissingSourceDir {
            path: args.source_dir.clone(),
        });
    }
    let config = load_config(args)?;

    // Credentials are only required when publishing
    let targets = if args.no_upload {
        Vec::new()
    } else {
        remote_targets(&TransferConfig::from_env()?)
    };

    info!("Source directory: {:?}", args.source_dir);
    info!("Output directory: {:?}", config.output_root);
    info!(
        "Languages: {:?}, variants: {:?}",
        config.languages, config.variants
    );

    let store = Arc::new(FsTemplateStore::new(&config.template_root));
    let report = Pipeline::new(config, Arc::new(GdalEngine::new()), store)
        .with_targets(targets)
        .run_directory(&args.source_dir)?;

    if let Some(path) = &args.report {
        report.write_json(path).map_err(|source| AppError::Report {
            path: path.clone(),
            source,
        })?;
        info!("Report written to {:?}", path);
    }
    Ok(report)
}

pub fn run(args: CliArgs) -> ExitCode {
    init_logging(args.log);

    match execute(&args) {
        Ok(report) => {
            print!("{}", report);
            if report.is_success() {
                info!("Run complete");
                ExitCode::SUCCESS
            } else {
                warn!("Run finished with {} failure(s)", report.failures().len());
                ExitCode::from(EXIT_PARTIAL_FAILURE)
            }
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_STARTUP)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    const CONFIG: &str = r#"
workers: 6
parameters:
  HI:
    classes:
      - { low: -.inf, high: 32, color: [254, 229, 217] }
"#;

    fn args_with(workers: &[&str]) -> (tempfile::TempDir, CliArgs) {
        let tmp = tempfile::tempdir().unwrap();
        let config = tmp.path().join("pipeline.yaml");
        std::fs::write(&config, CONFIG).unwrap();
        let mut argv = vec![
            "climcomp".to_string(),
            "--source-dir".to_string(),
            tmp.path().display().to_string(),
            "--config".to_string(),
            config.display().to_string(),
        ];
        argv.extend(workers.iter().map(|s| s.to_string()));
        (tmp, CliArgs::parse_from(argv))
    }

    #[test]
    fn zero_workers_flag_means_available_parallelism() {
        let (_tmp, args) = args_with(&["--workers", "0"]);
        assert_eq!(load_config(&args).unwrap().workers, 0);
    }

    #[test]
    fn workers_flag_overrides_config() {
        let (_tmp, args) = args_with(&["--workers", "3"]);
        assert_eq!(load_config(&args).unwrap().workers, 3);

        let (_tmp, args) = args_with(&[]);
        assert_eq!(load_config(&args).unwrap().workers, 6);
    }
}
