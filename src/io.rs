//! Reading and writing images on disk.
//!
//! Decoding and encoding is delegated to the `image` crate. Loaded samples
//! are `f32`; 8- and 16-bit formats are scaled to `[0, 1]`, floating-point
//! formats (OpenEXR, Radiance HDR) keep their values. Saving to `.exr` or
//! `.hdr` writes floats unchanged; every other format is quantized to 8 bits,
//! which clamps to `[0, 1]`.

use crate::core::error::{ToneStackError, ToneStackResult};
use crate::core::image::{Image, Shape};
use image::{DynamicImage, ImageBuffer, Luma, LumaA, Rgb, Rgba};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions picked up when a directory is expanded into a stack.
pub const IMAGE_EXTENSIONS: [&str; 10] = [
    "png", "jpg", "jpeg", "gif", "bmp", "tiff", "tif", "webp", "exr", "hdr",
];

/// Load an image file.
pub fn load(path: impl AsRef<Path>) -> ToneStackResult<Image> {
    let path = path.as_ref();
    let decoded = image::open(path)?;
    let image = from_dynamic(&decoded)?;
    debug!("Loaded {} ({})", path.display(), image.shape());
    Ok(image)
}

/// Load several files as an exposure stack, in the given order.
pub fn load_stack<P: AsRef<Path>>(paths: &[P]) -> ToneStackResult<Vec<Image>> {
    paths.iter().map(load).collect()
}

/// Save the first frame of an image; the format follows the extension.
pub fn save(image: &Image, path: impl AsRef<Path>) -> ToneStackResult<()> {
    let path = path.as_ref();
    let dynamic = to_dynamic(image, &extension(path))?;
    dynamic.save(path)?;
    debug!("Saved {} ({})", path.display(), image.shape());
    Ok(())
}

/// Convert a decoded image to `f32` samples, keeping its channel count.
pub fn from_dynamic(decoded: &DynamicImage) -> ToneStackResult<Image> {
    let (width, height) = (decoded.width() as usize, decoded.height() as usize);
    let (channels, data) = match decoded.color().channel_count() {
        1 => (1, decoded.to_luma32f().into_raw()),
        2 => (2, decoded.to_luma_alpha32f().into_raw()),
        4 => (4, decoded.to_rgba32f().into_raw()),
        _ => (3, decoded.to_rgb32f().into_raw()),
    };
    Ok(Image::from_vec(Shape::new(width, height, channels), data)?)
}

/// Convert the first frame of an image to a `DynamicImage` suited to a file
/// extension.
///
/// `exr` and `hdr` get float RGB(A), with gray replicated to RGB; Radiance
/// HDR has no alpha, so it is dropped there. Other extensions get 8-bit
/// buffers with the image's own channel count. More than four channels are
/// rejected.
pub fn to_dynamic(image: &Image, extension: &str) -> ToneStackResult<DynamicImage> {
    let (width, height) = encoder_dimensions(image.width(), image.height())?;
    let frame_len = image.width() * image.height() * image.channels();
    let frame = &image.data()[..frame_len];
    if image.frames() > 1 {
        warn!("Only frame 0 of {} frames is saved", image.frames());
    }

    let unsupported = || {
        ToneStackError::Other(format!(
            "cannot save a {}-channel image as '{}'",
            image.channels(),
            extension
        ))
    };

    let dynamic = match extension {
        "exr" | "hdr" => {
            let rgba: Vec<f32> = match image.channels() {
                1 => frame.iter().flat_map(|&l| [l, l, l, 1.0]).collect(),
                2 => frame.chunks_exact(2).flat_map(|p| [p[0], p[0], p[0], p[1]]).collect(),
                3 => frame.chunks_exact(3).flat_map(|p| [p[0], p[1], p[2], 1.0]).collect(),
                4 => frame.to_vec(),
                _ => return Err(unsupported()),
            };
            let buffer = ImageBuffer::<Rgba<f32>, _>::from_raw(width, height, rgba)
                .ok_or_else(unsupported)?;
            let has_alpha = matches!(image.channels(), 2 | 4);
            if has_alpha && extension == "exr" {
                DynamicImage::ImageRgba32F(buffer)
            } else {
                DynamicImage::ImageRgb32F(DynamicImage::ImageRgba32F(buffer).to_rgb32f())
            }
        }
        _ => {
            let samples: Vec<u8> = frame.iter().map(|&v| quantize(v)).collect();
            match image.channels() {
                1 => DynamicImage::ImageLuma8(
                    ImageBuffer::<Luma<u8>, _>::from_raw(width, height, samples).ok_or_else(unsupported)?,
                ),
                2 => DynamicImage::ImageLumaA8(
                    ImageBuffer::<LumaA<u8>, _>::from_raw(width, height, samples).ok_or_else(unsupported)?,
                ),
                3 => DynamicImage::ImageRgb8(
                    ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, samples).ok_or_else(unsupported)?,
                ),
                4 => DynamicImage::ImageRgba8(
                    ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, samples).ok_or_else(unsupported)?,
                ),
                _ => return Err(unsupported()),
            }
        }
    };
    Ok(dynamic)
}

/// Image encoders take `u32` sides.
fn encoder_dimensions(width: usize, height: usize) -> ToneStackResult<(u32, u32)> {
    match (u32::try_from(width), u32::try_from(height)) {
        (Ok(w), Ok(h)) => Ok((w, h)),
        _ => Err(ToneStackError::Other(format!(
            "image of {}x{} is too large to encode",
            width, height
        ))),
    }
}

#[inline]
fn quantize(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Expand a stack source into a sorted list of image files.
///
/// A directory is walked recursively for files with an image extension;
/// anything else is treated as a glob pattern.
pub fn expand_stack_source(source: &str) -> ToneStackResult<Vec<PathBuf>> {
    let path = Path::new(source);
    let mut paths: Vec<PathBuf> = if path.is_dir() {
        WalkDir::new(path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| IMAGE_EXTENSIONS.contains(&extension(p).as_str()))
            .collect()
    } else {
        glob::glob(source)?
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Skipping unreadable path: {}", e);
                    None
                }
            })
            .filter(|p| p.is_file())
            .collect()
    };
    paths.sort();
    debug!("Stack source '{}' expanded to {} files", source, paths.len());
    Ok(paths)
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}
