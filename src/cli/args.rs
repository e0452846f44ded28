use clap::Parser;
use std::path::PathBuf;

use climcomp::types::{Language, OutputFormat, Variant};

#[derive(Parser)]
#[command(name = "climcomp", version, about = "Composite climate rasters onto map templates and publish them")]
pub struct CliArgs {
    /// Directory searched recursively for bg_<PARAM>[_<low>-<high>cm].tif rasters
    #[arg(long, env = "CLIMCOMP_SOURCE_DIR")]
    pub source_dir: PathBuf,

    /// Pipeline configuration (YAML)
    #[arg(long, env = "CLIMCOMP_CONFIG", default_value = "config/pipeline.yaml")]
    pub config: PathBuf,

    /// Template languages to render; repeat for several (default: from config)
    #[arg(long = "language", value_enum)]
    pub languages: Vec<Language>,

    /// Template variants to render; repeat for several (default: from config)
    #[arg(long = "variant", value_enum)]
    pub variants: Vec<Variant>,

    /// Override the output directory from the config
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Override the output format from the config (png or jpeg)
    #[arg(short = 'f', long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Override the number of compositing workers; 0 uses all available cores
    #[arg(long)]
    pub workers: Option<usize>,

    /// Composite only; skip SFTP/FTP publishing and credential loading
    #[arg(long, default_value_t = false)]
    pub no_upload: bool,

    /// Write the full run report as JSON to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, default_value_t = false)]
    pub log: bool,
}
