//! Image decoding and preprocessing for OCR
//!
//! Every receipt is turned into an 8-bit grayscale PNG with its contrast
//! stretched to the full range and speckle noise removed by a 3x3 median
//! filter before it reaches an OCR engine. Binarization then snaps pixels
//! to black or white at a fixed threshold.
//!
//! HEIC/HEIF photos are decoded through libheif when the `heic` feature is
//! enabled; without it they fail with [`Error::UnsupportedEncoding`].

use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, GrayImage, ImageError, ImageFormat};
use imageproc::filter::median_filter;

use crate::error::{Error, Result};

/// File extensions picked up from the pending area (lowercase)
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "webp", "heic", "heif",
];

/// Threshold used when the config does not set one
pub const DEFAULT_BINARIZE_THRESHOLD: u8 = 150;

const HEIF_EXTENSIONS: &[&str] = &["heic", "heif"];

pub fn is_supported_extension(path: &Path) -> bool {
    extension(path).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Read and preprocess an image file
pub fn preprocess_file(path: &Path, binarize_threshold: Option<u8>) -> Result<Vec<u8>> {
    let bytes = std::fs::read(path)?;
    match extension(path) {
        Some(ext) if HEIF_EXTENSIONS.contains(&ext.as_str()) => {
            let image = heif::decode(&bytes, &ext)?;
            normalize(image, binarize_threshold)
        }
        _ => preprocess(&bytes, binarize_threshold),
    }
}

/// Decode any supported encoding and return a normalized grayscale PNG
pub fn preprocess(bytes: &[u8], binarize_threshold: Option<u8>) -> Result<Vec<u8>> {
    let image = image::load_from_memory(bytes).map_err(|e| match e {
        ImageError::Unsupported(u) => Error::UnsupportedEncoding(u.to_string()),
        other => Error::Image(other),
    })?;
    normalize(image, binarize_threshold)
}

fn normalize(image: DynamicImage, binarize_threshold: Option<u8>) -> Result<Vec<u8>> {
    let mut gray = image.to_luma8();
    stretch_contrast(&mut gray);
    let mut gray = median_filter(&gray, 1, 1);
    if let Some(threshold) = binarize_threshold {
        binarize(&mut gray, threshold);
    }

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(gray).write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

#[cfg(feature = "heic")]
mod heif {
    use image::{DynamicImage, RgbImage};
    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

    use crate::error::{Error, Result};

    pub fn decode(bytes: &[u8], _ext: &str) -> Result<DynamicImage> {
        let failed = |e: libheif_rs::HeifError| Error::InvalidData(format!("HEIF decode failed: {}", e));

        let ctx = HeifContext::read_from_bytes(bytes).map_err(failed)?;
        let handle = ctx.primary_image_handle().map_err(failed)?;
        let decoded = LibHeif::new()
            .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
            .map_err(failed)?;

        let planes = decoded.planes();
        let plane = planes
            .interleaved
            .ok_or_else(|| Error::InvalidData("HEIF image has no RGB plane".into()))?;

        let row_bytes = plane.width as usize * 3;
        let mut pixels = Vec::with_capacity(row_bytes * plane.height as usize);
        for row in plane.data.chunks(plane.stride).take(plane.height as usize) {
            pixels.extend_from_slice(&row[..row_bytes]);
        }
        RgbImage::from_raw(plane.width, plane.height, pixels)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| Error::InvalidData("HEIF plane size mismatch".into()))
    }
}

#[cfg(not(feature = "heic"))]
mod heif {
    use image::DynamicImage;

    use crate::error::{Error, Result};

    pub fn decode(_bytes: &[u8], ext: &str) -> Result<DynamicImage> {
        Err(Error::UnsupportedEncoding(format!(
            "no decoder for .{} images (build with the `heic` feature)",
            ext
        )))
    }
}

/// Linearly map the darkest pixel to 0 and the brightest to 255
fn stretch_contrast(image: &mut GrayImage) {
    let (min, max) = image
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));

    if max <= min {
        return;
    }

    let range = u32::from(max - min);
    for pixel in image.pixels_mut() {
        let v = u32::from(pixel[0] - min);
        pixel[0] = ((v * 255 + range / 2) / range) as u8;
    }
}

fn binarize(image: &mut GrayImage, threshold: u8) {
    for pixel in image.pixels_mut() {
        pixel[0] = if pixel[0] >= threshold { 255 } else { 0 };
    }
}
