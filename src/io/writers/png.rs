use image::{ImageFormat, RgbaImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

pub fn write_rgba_png(output: &Path, image: &RgbaImage) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::create(output)?;
    let mut writer = BufWriter::new(file);
    image.write_to(&mut writer, ImageFormat::Png)?;
    Ok(())
}
