//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the [`pipeline`](crate::pipeline) (which decides what
//! to draw and encode) and the [`backend`](super::backend) (which does the
//! actual pixel work). This separation allows swapping backends (e.g. for
//! testing with a mock) without changing pipeline logic.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (0.0–1.0, default 0.8). Clamped on construction.
//! - [`ResizeMode`]: How explicit width/height are interpreted: `none`, `contain`, `cover`.
//! - [`Fill`]: Canvas background painted before drawing.
//! - [`CanvasParams`] / [`DrawParams`]: Everything the render step needs.

use super::geometry::Rect;
use super::orientation::Transform;
use serde::{Deserialize, Serialize};

pub const MIME_JPEG: &str = "image/jpeg";
pub const MIME_PNG: &str = "image/png";

/// Quality setting for lossy image encoding (0.0-1.0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quality(f32);

impl Quality {
    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            return Self::default();
        }
        Self(value.clamp(0.0, 1.0))
    }

    pub fn value(self) -> f32 {
        self.0
    }

    /// Quality on the 1-100 scale most encoders take.
    pub fn percent(self) -> u8 {
        ((self.0 * 100.0).round() as u8).max(1)
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(0.8)
    }
}

/// How explicit `width` and `height` options are applied.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    /// Treat width/height as bounds on the natural aspect ratio.
    #[default]
    None,
    /// Output is exactly the container; the whole image fits inside it.
    Contain,
    /// Output is exactly the container; the image fills it, overflow is cropped.
    Cover,
}

/// Whether `value` names an image type (`image/<something>`).
pub fn is_image_type(value: &str) -> bool {
    value
        .strip_prefix("image/")
        .is_some_and(|subtype| !subtype.is_empty())
}

/// File extension for an image mime type, `jpeg` normalized to `jpg`.
///
/// ```
/// # use pixpress::imaging::image_type_to_extension;
/// assert_eq!(image_type_to_extension("image/jpeg"), ".jpg");
/// assert_eq!(image_type_to_extension("image/webp"), ".webp");
/// assert_eq!(image_type_to_extension("text/plain"), ".");
/// ```
pub fn image_type_to_extension(mime_type: &str) -> String {
    let extension = mime_type.strip_prefix("image/").unwrap_or("");
    match extension {
        "jpeg" => ".jpg".to_string(),
        other => format!(".{other}"),
    }
}

/// Background painted onto a fresh canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Fill {
    Transparent,
    /// Opaque white, used for formats without alpha.
    White,
}

impl Fill {
    /// JPEG has no alpha channel: transparent pixels would encode as black.
    pub fn for_mime(mime_type: &str) -> Self {
        if mime_type == MIME_JPEG {
            Fill::White
        } else {
            Fill::Transparent
        }
    }
}

/// A canvas to allocate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasParams {
    pub width: u32,
    pub height: u32,
    pub fill: Fill,
}

/// Draw the source onto the canvas.
///
/// Equivalent to a 2D context transform: translate to the canvas center,
/// rotate, scale, then draw `source_crop` of the source into a
/// `width`x`height` box centered on the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawParams {
    /// Region of the source to sample.
    pub source_crop: Rect,
    /// Destination size in source orientation.
    pub width: u32,
    pub height: u32,
    pub transform: Transform,
}
