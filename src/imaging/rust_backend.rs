//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::load_from_memory_with_format` |
//! | Crop + resize | `image::imageops::crop_imm` + `resize` with `Lanczos3` |
//! | Orientation | `imageops::flip_*` then `rotate90`/`rotate180`/`rotate270` |
//! | Composite | `imageops::overlay` (source-over) |
//! | Encode → JPEG | `JpegEncoder::new_with_quality` (alpha dropped) |
//! | Encode → PNG / WebP | `PngEncoder`, lossless `WebPEncoder` |
//! | Encode → AVIF | `AvifEncoder` (rav1e, speed 6) |
//!
//! Decode and encode run on the blocking thread pool so pipelines sharing a
//! runtime keep making progress.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::orientation::Transform;
use super::params::{CanvasParams, DrawParams, Fill, Quality};
use async_trait::async_trait;
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

/// Formats whose decoders are compiled in and known to work.
///
/// AVIF is excluded: the `image` crate's `"avif"` feature only enables the
/// **encoder** (rav1e), yet `ImageFormat::reading_enabled()` reports `true`
/// for it.
const DECODE_CANDIDATES: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Tiff,
    ImageFormat::WebP,
];

const ENCODE_CANDIDATES: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Tiff,
    ImageFormat::WebP,
    ImageFormat::Avif,
];

fn decodable_format(mime_type: &str) -> Option<ImageFormat> {
    ImageFormat::from_mime_type(mime_type)
        .filter(|f| DECODE_CANDIDATES.contains(f) && f.reading_enabled())
}

fn encodable_format(mime_type: &str) -> Option<ImageFormat> {
    ImageFormat::from_mime_type(mime_type)
        .filter(|f| ENCODE_CANDIDATES.contains(f) && f.writing_enabled())
}

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn join_error(e: tokio::task::JoinError) -> BackendError {
    BackendError::ProcessingFailed(format!("worker task failed: {e}"))
}

/// Refuse RGBA buffers the `image` crate's default decode limit would refuse.
///
/// `ImageBuffer` panics when the byte count overflows `usize`, so the check
/// has to happen before allocating.
fn check_buffer(width: u32, height: u32) -> Result<(), BackendError> {
    let bytes = u64::from(width)
        .checked_mul(u64::from(height))
        .and_then(|pixels| pixels.checked_mul(4));
    let limit = image::Limits::default().max_alloc.unwrap_or(u64::MAX);
    match bytes {
        Some(bytes) if bytes <= limit && usize::try_from(bytes).is_ok() => Ok(()),
        _ => Err(BackendError::ProcessingFailed(format!(
            "{width}x{height} RGBA buffer exceeds the {limit} byte allocation limit"
        ))),
    }
}

/// Sample `params.source_crop` of `source` into a `width`x`height` layer.
///
/// Parts of the crop outside the source stay transparent, which is how
/// `contain` letterboxes.
fn render_layer(source: &RgbaImage, params: &DrawParams) -> Result<RgbaImage, BackendError> {
    check_buffer(params.width, params.height)?;
    let mut layer = RgbaImage::new(params.width, params.height);
    let crop = params.source_crop;
    if crop.width <= 0.0 || crop.height <= 0.0 {
        return Ok(layer);
    }

    let (sw, sh) = (source.width() as f64, source.height() as f64);
    let x0 = crop.x.max(0.0);
    let y0 = crop.y.max(0.0);
    let x1 = (crop.x + crop.width).min(sw);
    let y1 = (crop.y + crop.height).min(sh);
    if x1 <= x0 || y1 <= y0 {
        return Ok(layer);
    }

    let (px, py) = (x0.floor() as u32, y0.floor() as u32);
    let pw = ((x1 - px as f64).ceil() as u32).clamp(1, source.width() - px);
    let ph = ((y1 - py as f64).ceil() as u32).clamp(1, source.height() - py);
    let visible = imageops::crop_imm(source, px, py, pw, ph).to_image();

    let scale_x = params.width as f64 / crop.width;
    let scale_y = params.height as f64 / crop.height;
    let dest_w = ((x1 - x0) * scale_x).round().clamp(1.0, params.width as f64) as u32;
    let dest_h = ((y1 - y0) * scale_y).round().clamp(1.0, params.height as f64) as u32;
    let resized = if (dest_w, dest_h) == (pw, ph) {
        visible
    } else {
        imageops::resize(&visible, dest_w, dest_h, FilterType::Lanczos3)
    };

    let dx = ((x0 - crop.x) * scale_x).round() as i64;
    let dy = ((y0 - crop.y) * scale_y).round() as i64;
    imageops::replace(&mut layer, &resized, dx, dy);
    Ok(layer)
}

/// Mirror first, then rotate clockwise.
fn orient(layer: RgbaImage, transform: Transform) -> RgbaImage {
    let mut img = layer;
    if transform.scale_x < 0 {
        img = imageops::flip_horizontal(&img);
    }
    if transform.scale_y < 0 {
        img = imageops::flip_vertical(&img);
    }
    match transform.rotate {
        90 => imageops::rotate90(&img),
        -90 | 270 => imageops::rotate270(&img),
        180 | -180 => imageops::rotate180(&img),
        _ => img,
    }
}

fn encode_surface(
    canvas: RgbaImage,
    format: ImageFormat,
    quality: Quality,
) -> Result<Vec<u8>, BackendError> {
    let (width, height) = canvas.dimensions();
    let mut out = Vec::new();

    let result = match format {
        ImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(canvas).into_rgb8();
            JpegEncoder::new_with_quality(&mut out, quality.percent()).write_image(
                rgb.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            )
        }
        ImageFormat::Png => PngEncoder::new(&mut out).write_image(
            canvas.as_raw(),
            width,
            height,
            ExtendedColorType::Rgba8,
        ),
        ImageFormat::WebP => WebPEncoder::new_lossless(&mut out).write_image(
            canvas.as_raw(),
            width,
            height,
            ExtendedColorType::Rgba8,
        ),
        ImageFormat::Avif => AvifEncoder::new_with_speed_quality(&mut out, 6, quality.percent())
            .write_image(canvas.as_raw(), width, height, ExtendedColorType::Rgba8),
        other => DynamicImage::ImageRgba8(canvas).write_to(&mut Cursor::new(&mut out), other),
    };

    result.map_err(|e| BackendError::ProcessingFailed(format!("{format:?} encode failed: {e}")))?;
    Ok(out)
}

#[async_trait]
impl ImageBackend for RustBackend {
    type Surface = RgbaImage;

    fn can_decode(&self, mime_type: &str) -> bool {
        decodable_format(mime_type).is_some()
    }

    fn can_encode(&self, mime_type: &str) -> bool {
        encodable_format(mime_type).is_some()
    }

    async fn decode(&self, bytes: Vec<u8>, mime_type: &str) -> Result<RgbaImage, BackendError> {
        let format = decodable_format(mime_type)
            .ok_or_else(|| BackendError::Unsupported(mime_type.to_string()))?;

        tokio::task::spawn_blocking(move || {
            image::load_from_memory_with_format(&bytes, format)
                .map(DynamicImage::into_rgba8)
                .map_err(|e| BackendError::ProcessingFailed(format!("Failed to decode: {e}")))
        })
        .await
        .map_err(join_error)?
    }

    fn dimensions(&self, surface: &RgbaImage) -> Dimensions {
        Dimensions {
            width: surface.width(),
            height: surface.height(),
        }
    }

    fn create_canvas(&self, params: &CanvasParams) -> Result<RgbaImage, BackendError> {
        let pixel = match params.fill {
            Fill::White => Rgba([255, 255, 255, 255]),
            Fill::Transparent => Rgba([0, 0, 0, 0]),
        };
        check_buffer(params.width, params.height)?;
        Ok(RgbaImage::from_pixel(params.width, params.height, pixel))
    }

    fn draw(
        &self,
        canvas: &mut RgbaImage,
        source: &RgbaImage,
        params: &DrawParams,
    ) -> Result<(), BackendError> {
        let layer = orient(render_layer(source, params)?, params.transform);
        let x = (canvas.width() as i64 - layer.width() as i64) / 2;
        let y = (canvas.height() as i64 - layer.height() as i64) / 2;
        imageops::overlay(canvas, &layer, x, y);
        Ok(())
    }

    async fn encode(
        &self,
        canvas: RgbaImage,
        mime_type: &str,
        quality: Quality,
    ) -> Result<Vec<u8>, BackendError> {
        let format = encodable_format(mime_type)
            .ok_or_else(|| BackendError::Unsupported(mime_type.to_string()))?;

        tokio::task::spawn_blocking(move || encode_surface(canvas, format, quality))
            .await
            .map_err(join_error)?
    }
}
