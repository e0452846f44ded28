use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::ConfigError;
use crate::core::symbology::Symbology;
use crate::transfer::RetryPolicy;
use crate::types::{Language, OutputFormat, Variant};

fn default_template_root() -> PathBuf {
    PathBuf::from("data/raster_templates/background_templates")
}

fn default_output_root() -> PathBuf {
    PathBuf::from("output")
}

fn default_jpeg_quality() -> u8 {
    crate::io::writers::jpeg::DEFAULT_QUALITY
}

fn default_transfer_concurrency() -> usize {
    4
}

fn default_languages() -> Vec<Language> {
    Language::ALL.to_vec()
}

fn default_variants() -> Vec<Variant> {
    Variant::ALL.to_vec()
}

/// Pipeline settings, loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_template_root")]
    pub template_root: PathBuf,
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Compositing threads; 0 means available parallelism
    #[serde(default)]
    pub workers: usize,
    #[serde(default = "default_transfer_concurrency")]
    pub transfer_concurrency: usize,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub remote_dir: String,
    /// Publish below a `YYYY-MM-DD` folder in `remote_dir`
    #[serde(default)]
    pub dated_remote_dirs: bool,
    /// Remove dated remote folders older than this many days; unset keeps all
    #[serde(default)]
    pub keep_days: Option<u32>,
    #[serde(default = "default_languages")]
    pub languages: Vec<Language>,
    #[serde(default = "default_variants")]
    pub variants: Vec<Variant>,
    /// Display convention per parameter code; its keys are the known catalog
    pub parameters: Symbology,
}

impl PipelineConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parameters.validate()?;
        let invalid = |field: &'static str, reason: &str| ConfigError::InvalidSetting {
            field,
            reason: reason.to_string(),
        };
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(invalid("jpeg_quality", "must be within 1..=100"));
        }
        if self.transfer_concurrency == 0 {
            return Err(invalid("transfer_concurrency", "must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be at least 1"));
        }
        if self.retry.max_backoff_ms < self.retry.backoff_ms {
            return Err(invalid("retry.max_backoff_ms", "must not be below retry.backoff_ms"));
        }
        if self.languages.is_empty() {
            return Err(invalid("languages", "must not be empty"));
        }
        if self.variants.is_empty() {
            return Err(invalid("variants", "must not be empty"));
        }
        Ok(())
    }
}
