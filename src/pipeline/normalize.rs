//! Bitmap normalisation ahead of WebP encoding.
//!
//! Every image leaves here as opaque 8-bit RGB no wider than `max_width`:
//! transparency is composited onto white, and oversized images are resized
//! with Lanczos3 preserving aspect ratio.

use image::{imageops, DynamicImage, Rgb, RgbImage};
use tracing::debug;

/// Composite any alpha channel onto an opaque white background.
pub fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (dst, src) in out.pixels_mut().zip(rgba.pixels()) {
        let [r, g, b, a] = src.0;
        let a = a as u32;
        let blend = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        *dst = Rgb([blend(r), blend(g), blend(b)]);
    }
    out
}

/// Output dimensions for an image of `width`×`height` capped at `max_width`.
///
/// Height is rounded to nearest and never reaches zero.
pub fn target_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width || width == 0 {
        return (width, height);
    }
    let (w, h, m) = (width as u64, height as u64, max_width as u64);
    let scaled = (h * m * 2 + w) / (w * 2);
    (max_width, scaled.max(1) as u32)
}

/// Flatten and, when wider than `max_width`, downscale.
pub fn normalize(img: &DynamicImage, max_width: u32) -> RgbImage {
    let rgb = flatten_onto_white(img);
    let (w, h) = rgb.dimensions();
    let (nw, nh) = target_dimensions(w, h, max_width);
    if (nw, nh) == (w, h) {
        return rgb;
    }
    debug!("Resizing {}x{} → {}x{}", w, h, nw, nh);
    imageops::resize(&rgb, nw, nh, imageops::FilterType::Lanczos3)
}
