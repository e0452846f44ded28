use gdal::raster::Buffer;
use gdal::{Dataset, DriverManager, errors::GdalError as GdalCrateError};
use ndarray::Array2;
use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::processing::grid::{GeoRaster, normalize_crs};
use crate::types::Resampling;

/// Errors raised by a raster engine
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] GdalCrateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Dimension mismatch: expected {0}x{1}, got {2} values")]
    DimensionMismatch(usize, usize, usize),
    #[error("gdalwarp failed: {0}")]
    Warp(String),
}

/// Raster decode and reprojection capability.
///
/// The compositor only talks to this trait, so tests can drive the whole
/// pipeline with in-memory rasters.
pub trait RasterEngine: Send + Sync {
    /// Read band 1 of a georeferenced raster.
    fn open(&self, path: &Path) -> Result<GeoRaster, RasterError>;

    /// Reproject `raster` into `target_crs` (e.g. `EPSG:3857`). NaN marks no-data
    /// in both input and output.
    fn reproject(
        &self,
        raster: &GeoRaster,
        target_crs: &str,
        resampling: Resampling,
    ) -> Result<GeoRaster, RasterError>;
}

/// GDAL-backed engine: decoding through the `gdal` crate, reprojection through `gdalwarp`.
#[derive(Debug, Clone, Default)]
pub struct GdalEngine;

impl GdalEngine {
    pub fn new() -> Self {
        Self
    }

    fn read_dataset(dataset: &Dataset) -> Result<GeoRaster, RasterError> {
        if dataset.raster_count() == 0 {
            return Err(RasterError::UnsupportedFormat("No raster bands found".into()));
        }
        let (size_x, size_y) = dataset.raster_size();
        let geotransform = dataset
            .geo_transform()
            .map_err(|_| RasterError::UnsupportedFormat("raster has no geotransform".into()))?;
        let projection = normalize_crs(&dataset.projection());

        let band = dataset.rasterband(1)?;
        let nodata = band.no_data_value();
        let buf = band.read_as::<f64>((0, 0), (size_x, size_y), (size_x, size_y), None)?;
        let data_vec = buf.data().to_vec();
        let len = data_vec.len();
        let data = Array2::from_shape_vec((size_y, size_x), data_vec)
            .map_err(|_| RasterError::DimensionMismatch(size_x, size_y, len))?;

        Ok(GeoRaster {
            data,
            geotransform,
            projection,
            nodata,
        })
    }

    /// Write `raster` as a single-band Float64 GeoTIFF with NaN nodata.
    fn write_gtiff(raster: &GeoRaster, path: &Path) -> Result<(), RasterError> {
        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let (rows, cols) = raster.data.dim();
        let mut dataset = driver.create_with_band_type::<f64, _>(path, cols, rows, 1)?;
        dataset.set_geo_transform(&raster.geotransform)?;
        dataset.set_projection(&raster.projection)?;

        let mut band = dataset.rasterband(1)?;
        band.set_no_data_value(Some(f64::NAN))?;
        let values: Vec<f64> = raster.with_nan_nodata().data.iter().copied().collect();
        let mut buffer = Buffer::new((cols, rows), values);
        band.write((0, 0), (cols, rows), &mut buffer)?;
        Ok(())
    }
}

impl RasterEngine for GdalEngine {
    fn open(&self, path: &Path) -> Result<GeoRaster, RasterError> {
        let dataset = Dataset::open(path)?;
        let raster = Self::read_dataset(&dataset)?;
        debug!(
            "Opened {:?}: {}x{} {}",
            path,
            raster.cols(),
            raster.rows(),
            raster.projection
        );
        Ok(raster)
    }

    fn reproject(
        &self,
        raster: &GeoRaster,
        target_crs: &str,
        resampling: Resampling,
    ) -> Result<GeoRaster, RasterError> {
        info!(
            "Warping {} -> {} ({})",
            raster.projection, target_crs, resampling
        );
        // Temp files are removed when the handles drop
        let tmp_in = tempfile::Builder::new()
            .prefix("climcomp_")
            .suffix("_src.tif")
            .tempfile()?;
        let tmp_out = tempfile::Builder::new()
            .prefix("climcomp_")
            .suffix("_warped.tif")
            .tempfile()?;
        Self::write_gtiff(raster, tmp_in.path())?;

        let output = Command::new("gdalwarp")
            .arg("-q")
            .args(["-of", "GTiff", "-overwrite"])
            .args(["-r", resampling.gdal_name()])
            .args(["-t_srs", target_crs])
            .args(["-dstnodata", "nan"])
            .arg(tmp_in.path())
            .arg(tmp_out.path())
            .output()
            .map_err(|e| RasterError::Warp(format!("gdalwarp exec error: {}", e)))?;
        if !output.status.success() {
            return Err(RasterError::Warp(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let dataset = Dataset::open(tmp_out.path())?;
        Self::read_dataset(&dataset)
    }
}
