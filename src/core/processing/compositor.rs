//! Compositing one source raster onto one background template.
//!
//! Steps: style lookup, validity check, optional reprojection into the template
//! CRS, resampling onto the map frame grid, classification into legend colours,
//! overlay onto the background and rendering to the output tree.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use super::grid::{GeoRaster, crs_matches};
use super::overlay::{classify_to_colors, overlay_onto};
use super::resample::resample_to_grid;
use crate::core::naming::ParameterIdentity;
use crate::core::symbology::{ParameterStyle, Symbology};
use crate::core::template::TemplateAsset;
use crate::io::RasterEngine;
use crate::io::writers::write_image;
use crate::types::{OutputFormat, TemplateKey};

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum CompositeError {
    #[error("parameter '{code}' has no display convention")]
    UnknownParameter { code: String },
    #[error("source {name} has no valid pixels")]
    EmptySource { name: String },
    #[error("reprojection of {name} failed: {reason}")]
    ReprojectionFailed { name: String, reason: String },
    #[error("failed to read {path:?}: {reason}")]
    ReadFailed { path: PathBuf, reason: String },
    #[error("failed to render {path:?}: {reason}")]
    RenderFailed { path: PathBuf, reason: String },
}

impl CompositeError {
    pub fn kind(&self) -> &'static str {
        match self {
            CompositeError::UnknownParameter { .. } => "UnknownParameter",
            CompositeError::EmptySource { .. } => "EmptySource",
            CompositeError::ReprojectionFailed { .. } => "ReprojectionFailed",
            CompositeError::ReadFailed { .. } => "ReadFailed",
            CompositeError::RenderFailed { .. } => "RenderFailed",
        }
    }
}

/// A rendered image on local disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub local_path: PathBuf,
    /// `<variant>/<language>/<output_stem>.<ext>`, also the remote path suffix
    pub relative_path: String,
}

/// Output settings for rendered composites.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub output_root: PathBuf,
    pub format: OutputFormat,
    pub jpeg_quality: u8,
}

pub struct RasterCompositor {
    engine: Arc<dyn RasterEngine>,
    symbology: Arc<Symbology>,
    options: RenderOptions,
}

impl RasterCompositor {
    pub fn new(
        engine: Arc<dyn RasterEngine>,
        symbology: Arc<Symbology>,
        options: RenderOptions,
    ) -> Self {
        Self {
            engine,
            symbology,
            options,
        }
    }

    /// True when `code` has a display convention.
    pub fn knows(&self, code: &str) -> bool {
        self.symbology.is_known(code)
    }

    /// Decode a source raster. Failures become per-job `ReadFailed`.
    pub fn load_source(&self, path: &Path) -> Result<GeoRaster, CompositeError> {
        self.engine
            .open(path)
            .map_err(|e| CompositeError::ReadFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// Relative output path for an identity and template key.
    pub fn relative_path(&self, identity: &ParameterIdentity, key: TemplateKey) -> String {
        format!(
            "{}/{}/{}.{}",
            key.variant,
            key.language,
            identity.output_stem(),
            self.options.format.extension()
        )
    }

    pub fn composite(
        &self,
        source: &GeoRaster,
        template: &TemplateAsset,
        identity: &ParameterIdentity,
        key: TemplateKey,
    ) -> Result<Artifact, CompositeError> {
        let style = self.symbology.style(&identity.code).ok_or_else(|| {
            CompositeError::UnknownParameter {
                code: identity.code.clone(),
            }
        })?;

        let masked = mask_invalid(source, style);
        if masked.data.iter().all(|v| v.is_nan()) {
            return Err(CompositeError::EmptySource {
                name: identity.raw_name.clone(),
            });
        }

        let reprojection_failed = |reason: String| CompositeError::ReprojectionFailed {
            name: identity.raw_name.clone(),
            reason,
        };
        if masked.projection.trim().is_empty() {
            return Err(reprojection_failed("source has no projection".into()));
        }
        let aligned = if crs_matches(&masked.projection, &template.projection) {
            masked
        } else {
            self.engine
                .reproject(&masked, &template.projection, style.resampling)
                .map_err(|e| reprojection_failed(e.to_string()))?
                .with_nan_nodata()
        };

        let values = resample_to_grid(&aligned, &template.grid(), style.resampling)
            .ok_or_else(|| reprojection_failed("singular geotransform".into()))?;
        let covered = values.iter().filter(|v| !v.is_nan()).count();
        debug!(
            "{} on {}: {}/{} frame pixels covered",
            identity,
            key,
            covered,
            values.len()
        );

        let layer = classify_to_colors(&values, style);
        let rendered = overlay_onto(
            &template.background,
            &template.frame,
            &template.reserved,
            &layer,
        );

        let relative_path = self.relative_path(identity, key);
        let local_path = self.options.output_root.join(&relative_path);
        self.write_atomically(&rendered, &local_path)?;
        info!("Rendered {:?}", local_path);

        Ok(Artifact {
            local_path,
            relative_path,
        })
    }

    /// Render into a temporary sibling and rename it into place.
    fn write_atomically(
        &self,
        image: &image::RgbaImage,
        path: &Path,
    ) -> Result<(), CompositeError> {
        let render_failed = |reason: String| CompositeError::RenderFailed {
            path: path.to_path_buf(),
            reason,
        };
        let dir = path
            .parent()
            .ok_or_else(|| render_failed("output path has no parent".into()))?;
        std::fs::create_dir_all(dir).map_err(|e| render_failed(e.to_string()))?;

        let tmp = tempfile::Builder::new()
            .prefix(".climcomp_")
            .suffix(".part")
            .tempfile_in(dir)
            .map_err(|e| render_failed(e.to_string()))?;
        write_image(
            tmp.path(),
            image,
            self.options.format,
            self.options.jpeg_quality,
        )
        .map_err(|e| render_failed(e.to_string()))?;
        tmp.persist(path)
            .map_err(|e| render_failed(e.error.to_string()))?;
        Ok(())
    }
}

/// Copy of `source` with raster nodata and style sentinels replaced by NaN.
fn mask_invalid(source: &GeoRaster, style: &ParameterStyle) -> GeoRaster {
    let mut out = source.clone();
    out.data.mapv_inplace(|v| {
        if source.is_nodata(v) || !style.is_valid(v) {
            f64::NAN
        } else {
            v
        }
    });
    out.nodata = None;
    out
}
