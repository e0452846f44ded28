//! Output encoders for composited maps.
pub mod jpeg;
pub mod png;

use image::RgbaImage;
use std::path::Path;

use crate::types::OutputFormat;

/// Encode `image` to `output` in the requested format.
pub fn write_image(
    output: &Path,
    image: &RgbaImage,
    format: OutputFormat,
    jpeg_quality: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Png => png::write_rgba_png(output, image),
        OutputFormat::Jpeg => jpeg::write_rgba_as_jpeg(output, image, jpeg_quality),
    }
}
