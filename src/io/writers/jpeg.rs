use image::RgbaImage;
use jpeg_encoder::{ColorType, Encoder};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Default JPEG quality for web uploads.
pub const DEFAULT_QUALITY: u8 = 50;

pub fn write_rgb_jpeg(
    output: &Path,
    cols: usize,
    rows: usize,
    rgb_data: &[u8],
    quality: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    if cols > u16::MAX as usize || rows > u16::MAX as usize {
        return Err(format!("{}x{} exceeds the JPEG size limit", cols, rows).into());
    }
    let file = File::create(output)?;
    let mut writer = BufWriter::new(file);
    let encoder = Encoder::new(&mut writer, quality.clamp(1, 100));
    encoder.encode(rgb_data, cols as u16, rows as u16, ColorType::Rgb)?;
    Ok(())
}

/// Encode an RGBA image as JPEG; alpha is dropped since templates are opaque.
pub fn write_rgba_as_jpeg(
    output: &Path,
    image: &RgbaImage,
    quality: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    let (width, height) = image.dimensions();
    let rgb: Vec<u8> = image
        .pixels()
        .flat_map(|p| [p.0[0], p.0[1], p.0[2]])
        .collect();
    write_rgb_jpeg(output, width as usize, height as usize, &rgb, quality)
}
