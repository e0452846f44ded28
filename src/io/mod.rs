//! I/O layer: the GDAL-backed raster engine and the PNG/JPEG `writers`
//! for composited output.
pub mod gdal;
pub use gdal::{GdalEngine, RasterEngine, RasterError};

pub mod writers;
