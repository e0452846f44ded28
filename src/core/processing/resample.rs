//! Resampling a raster onto a target grid in the same CRS.
//!
//! Each target pixel centre is mapped through the source's inverse geotransform.
//! Target pixels that fall outside the source footprint become NaN, so partial
//! coverage of a template extent yields no-data rather than an error.
use ndarray::{Array2, Zip};

use super::grid::{GeoRaster, GridSpec, invert_geotransform, pixel_to_world};
use crate::types::Resampling;

/// Resample `src` (NaN marks no-data) onto `grid`. Returns `None` when the
/// source geotransform cannot be inverted.
pub fn resample_to_grid(src: &GeoRaster, grid: &GridSpec, method: Resampling) -> Option<Array2<f64>> {
    let inverse = invert_geotransform(&src.geotransform)?;
    let mut out = Array2::<f64>::from_elem((grid.rows, grid.cols), f64::NAN);
    if src.rows() == 0 || src.cols() == 0 {
        return Some(out);
    }

    Zip::indexed(&mut out).par_for_each(|(row, col), value| {
        let (x, y) = pixel_to_world(&grid.geotransform, col as f64 + 0.5, row as f64 + 0.5);
        let (px, py) = pixel_to_world(&inverse, x, y);
        *value = match method {
            Resampling::Nearest => sample_nearest(src, px, py),
            Resampling::Bilinear => sample_bilinear(src, px, py),
        };
    });

    Some(out)
}

#[inline]
fn inside(src: &GeoRaster, px: f64, py: f64) -> bool {
    px >= 0.0 && py >= 0.0 && px < src.cols() as f64 && py < src.rows() as f64
}

#[inline]
fn sample_nearest(src: &GeoRaster, px: f64, py: f64) -> f64 {
    if !inside(src, px, py) {
        return f64::NAN;
    }
    src.data[[py.floor() as usize, px.floor() as usize]]
}

fn sample_bilinear(src: &GeoRaster, px: f64, py: f64) -> f64 {
    if !inside(src, px, py) {
        return f64::NAN;
    }
    let (cols, rows) = (src.cols(), src.rows());

    // Interpolate between pixel centres
    let fx = px - 0.5;
    let fy = py - 0.5;
    let x1 = (fx.floor().max(0.0) as usize).min(cols - 1);
    let y1 = (fy.floor().max(0.0) as usize).min(rows - 1);
    let x2 = (x1 + 1).min(cols - 1);
    let y2 = (y1 + 1).min(rows - 1);
    let dx = (fx - x1 as f64).clamp(0.0, 1.0);
    let dy = (fy - y1 as f64).clamp(0.0, 1.0);

    let v11 = src.data[[y1, x1]];
    let v21 = src.data[[y1, x2]];
    let v12 = src.data[[y2, x1]];
    let v22 = src.data[[y2, x2]];

    // Never blend no-data into a valid value
    if v11.is_nan() || v21.is_nan() || v12.is_nan() || v22.is_nan() {
        return sample_nearest(src, px, py);
    }

    let v1 = v11 * (1.0 - dx) + v21 * dx;
    let v2 = v12 * (1.0 - dx) + v22 * dx;
    v1 * (1.0 - dy) + v2 * dy
}
