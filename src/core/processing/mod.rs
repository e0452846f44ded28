//! Raster processing: grid geometry, resampling, classification/overlay and
//! the compositor that ties them together.
pub mod compositor;
pub mod grid;
pub mod overlay;
pub mod resample;
