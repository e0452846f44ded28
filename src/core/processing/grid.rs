use ndarray::Array2;

/// Affine geotransform coefficients
/// ([origin_x, pixel_width, rot_x, origin_y, rot_y, pixel_height]), GDAL order.
pub type GeoTransform = [f64; 6];

/// Single-band raster with its geospatial reference.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoRaster {
    /// Values of shape (rows, cols)
    pub data: Array2<f64>,
    pub geotransform: GeoTransform,
    /// `EPSG:XXXX` when an authority code is known, WKT otherwise, empty if unset
    pub projection: String,
    pub nodata: Option<f64>,
}

impl GeoRaster {
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    #[inline]
    pub fn is_nodata(&self, value: f64) -> bool {
        !value.is_finite() || self.nodata.is_some_and(|nd| nd == value)
    }

    /// Copy of the raster with the nodata value (if any) replaced by NaN.
    pub fn with_nan_nodata(&self) -> GeoRaster {
        let mut out = self.clone();
        if let Some(nd) = self.nodata {
            out.data.mapv_inplace(|v| if v == nd { f64::NAN } else { v });
        }
        out.nodata = None;
        out
    }
}

/// Target grid a raster is aligned to.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    pub cols: usize,
    pub rows: usize,
    pub geotransform: GeoTransform,
}

impl GridSpec {
    /// North-up grid covering `extent` ([min_x, min_y, max_x, max_y]) with the given size.
    pub fn from_extent(extent: [f64; 4], cols: usize, rows: usize) -> Self {
        let [min_x, min_y, max_x, max_y] = extent;
        let geotransform = [
            min_x,
            (max_x - min_x) / cols as f64,
            0.0,
            max_y,
            0.0,
            -(max_y - min_y) / rows as f64,
        ];
        Self {
            cols,
            rows,
            geotransform,
        }
    }
}

/// World coordinates of a fractional pixel position.
#[inline]
pub fn pixel_to_world(gt: &GeoTransform, px: f64, py: f64) -> (f64, f64) {
    (
        gt[0] + px * gt[1] + py * gt[2],
        gt[3] + px * gt[4] + py * gt[5],
    )
}

/// Inverse of a geotransform, `None` when it is singular.
pub fn invert_geotransform(gt: &GeoTransform) -> Option<GeoTransform> {
    let det = gt[1] * gt[5] - gt[2] * gt[4];
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    let inv_det = 1.0 / det;
    let a = gt[5] * inv_det;
    let b = -gt[2] * inv_det;
    let d = -gt[4] * inv_det;
    let e = gt[1] * inv_det;
    Some([
        -(a * gt[0] + b * gt[3]),
        a,
        b,
        -(d * gt[0] + e * gt[3]),
        d,
        e,
    ])
}

// Helper to extract EPSG code from WKT authority tag
fn parse_epsg(wkt: &str) -> Option<String> {
    const KEY: &str = "AUTHORITY[\"EPSG\",\"";
    if let Some(idx) = wkt.rfind(KEY) {
        let start = idx + KEY.len();
        if let Some(end) = wkt[start..].find('"') {
            let code = &wkt[start..start + end];
            return Some(format!("EPSG:{}", code));
        }
    }
    None
}

/// Normalise a projection string to `EPSG:XXXX` where possible.
pub fn normalize_crs(projection: &str) -> String {
    let trimmed = projection.trim();
    if trimmed.len() > 5 && trimmed[..5].eq_ignore_ascii_case("epsg:") {
        return format!("EPSG:{}", &trimmed[5..]);
    }
    parse_epsg(trimmed).unwrap_or_else(|| trimmed.to_string())
}

pub fn crs_matches(a: &str, b: &str) -> bool {
    normalize_crs(a).eq_ignore_ascii_case(&normalize_crs(b))
}
