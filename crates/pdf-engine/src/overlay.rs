//! Outline drawing for bounding-box overlays on rendered pages.

use crate::{ClipRect, PixelRegion, RgbaImage};
use image::Rgba;

/// Converts a page-space rectangle into pixels of an image rendered at
/// `scale`, where the image's top-left sits at `origin` (points).
pub fn to_pixels(rect: ClipRect, scale: f32, origin: (f32, f32)) -> Option<PixelRegion> {
    let x0 = ((rect.x - origin.0) * scale).round();
    let y0 = ((rect.y - origin.1) * scale).round();
    let x1 = ((rect.x + rect.width - origin.0) * scale).round();
    let y1 = ((rect.y + rect.height - origin.1) * scale).round();

    if x1 <= 0.0 || y1 <= 0.0 || x1 <= x0 || y1 <= y0 {
        return None;
    }

    let x = x0.max(0.0) as u32;
    let y = y0.max(0.0) as u32;
    Some(PixelRegion { x, y, width: x1 as u32 - x, height: y1 as u32 - y })
}

/// Strokes the border of `region`, clipped to the image.
pub fn stroke_rect(image: &mut RgbaImage, region: PixelRegion, color: Rgba<u8>, thickness: u32) {
    let (width, height) = image.dimensions();
    if region.x >= width || region.y >= height || thickness == 0 {
        return;
    }

    let right = (region.x + region.width).min(width);
    let bottom = (region.y + region.height).min(height);

    for y in region.y..bottom {
        for x in region.x..right {
            let on_edge = x < region.x + thickness
                || y < region.y + thickness
                || x + thickness >= region.x + region.width
                || y + thickness >= region.y + region.height;
            if on_edge {
                image.put_pixel(x, y, color);
            }
        }
    }
}
