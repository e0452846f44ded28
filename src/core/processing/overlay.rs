use image::{Rgba, RgbaImage};
use ndarray::{Array2, Zip};
use tracing::debug;

use crate::core::symbology::ParameterStyle;
use crate::core::template::PixelRect;

/// Map every value to its legend colour (RGBA), no-data to the style's no-data symbol.
pub fn classify_to_colors(values: &Array2<f64>, style: &ParameterStyle) -> Array2<[u8; 4]> {
    Zip::from(values).par_map_collect(|&v| style.color_for(v))
}

/// Draw `layer` into `frame` of a copy of `background`.
///
/// Pixels inside any `reserved` region keep the background. Fully transparent
/// layer pixels keep the background, partially transparent ones are blended.
pub fn overlay_onto(
    background: &RgbaImage,
    frame: &PixelRect,
    reserved: &[PixelRect],
    layer: &Array2<[u8; 4]>,
) -> RgbaImage {
    let mut out = background.clone();
    let (width, height) = out.dimensions();
    let (rows, cols) = layer.dim();

    let mut skipped_reserved = 0usize;
    for row in 0..rows {
        let y = frame.y + row as u32;
        if y >= height {
            break;
        }
        for col in 0..cols {
            let x = frame.x + col as u32;
            if x >= width {
                break;
            }
            if reserved.iter().any(|r| r.contains(x, y)) {
                skipped_reserved += 1;
                continue;
            }
            let src = layer[[row, col]];
            match src[3] {
                0 => {}
                255 => out.put_pixel(x, y, Rgba(src)),
                _ => {
                    let dst = out.get_pixel(x, y).0;
                    out.put_pixel(x, y, Rgba(blend(dst, src)));
                }
            }
        }
    }
    debug!(
        "Overlay {}x{} at ({}, {}); {} pixels kept for reserved regions",
        cols, rows, frame.x, frame.y, skipped_reserved
    );
    out
}

/// Source-over compositing of `src` onto `dst`.
fn blend(dst: [u8; 4], src: [u8; 4]) -> [u8; 4] {
    let sa = src[3] as u32;
    let da = dst[3] as u32;
    // Output alpha scaled by 255
    let out_a = sa * 255 + da * (255 - sa);
    if out_a == 0 {
        return [0, 0, 0, 0];
    }
    let mut out = [0u8; 4];
    for i in 0..3 {
        let c = src[i] as u32 * sa * 255 + dst[i] as u32 * da * (255 - sa);
        out[i] = ((c + out_a / 2) / out_a) as u8;
    }
    out[3] = ((out_a + 127) / 255) as u8;
    out
}
