//! Output geometry planning.
//!
//! All functions here are pure and testable without any I/O or images.
//!
//! [`plan`] turns a natural (decoded) size plus [`SizeConstraints`] into the
//! final pixel dimensions and, for `contain`/`cover`, the rectangle of the
//! source to sample. The order of operations is fixed:
//!
//! 1. Quarter-turn orientations swap every width/height constraint pair, since
//!    constraints describe the upright result but drawing happens in the
//!    source's own pixel space.
//! 2. Explicit width + height with `contain`/`cover` make the container's
//!    aspect ratio the working ratio; otherwise the natural ratio is used.
//! 3. The max pair is fitted to the working ratio (contain), the min pair
//!    too (cover).
//! 4. The requested size is fitted, unresolved sides default to natural.
//! 5. Clamp into `[min, max]`, correct float drift, floor.
//! 6. The crop rectangle uses the inverse mode against the natural size.

use super::backend::Dimensions;
use super::orientation::Transform;
use super::params::ResizeMode;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("invalid aspect ratio for {width}x{height}")]
    InvalidAspectRatio { width: f64, height: f64 },
    #[error("constraints produce an empty {width}x{height} output")]
    EmptyOutput { width: u32, height: u32 },
    #[error("constraints produce a {width}x{height} output, larger than any image can be")]
    TooLarge { width: f64, height: f64 },
}

/// Sizing constraints, expressed in upright (post-orientation) terms.
///
/// Non-positive `width`/`height` count as unset. A `max_*` of zero or less
/// means unbounded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeConstraints {
    pub max_width: f64,
    pub max_height: f64,
    pub min_width: f64,
    pub min_height: f64,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub resize: ResizeMode,
}

impl Default for SizeConstraints {
    fn default() -> Self {
        Self {
            max_width: f64::INFINITY,
            max_height: f64::INFINITY,
            min_width: 0.0,
            min_height: 0.0,
            width: None,
            height: None,
            resize: ResizeMode::None,
        }
    }
}

/// A size paired with the aspect ratio it is fitted against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Geometry {
    pub aspect_ratio: f64,
    pub width: f64,
    pub height: f64,
}

/// Finite and strictly positive.
fn is_positive(value: f64) -> bool {
    value > 0.0 && value < f64::INFINITY
}

impl Geometry {
    /// Fit this size to `aspect_ratio`.
    ///
    /// With both sides valid, `contain` (and `none`) shrink one side so the
    /// result fits inside, `cover` grow one side so the result fills. With
    /// one valid side the other is derived from it. With none, the size is
    /// returned as is.
    pub fn fit(self, mode: ResizeMode) -> Self {
        let Geometry {
            aspect_ratio,
            mut width,
            mut height,
        } = self;

        match (is_positive(width), is_positive(height)) {
            (true, true) => {
                let adjusted_width = height * aspect_ratio;
                let shrink_height = match mode {
                    ResizeMode::None | ResizeMode::Contain => adjusted_width > width,
                    ResizeMode::Cover => adjusted_width < width,
                };
                if shrink_height {
                    height = width / aspect_ratio;
                } else {
                    width = height * aspect_ratio;
                }
            }
            (true, false) => height = width / aspect_ratio,
            (false, true) => width = height * aspect_ratio,
            (false, false) => {}
        }

        Self {
            aspect_ratio,
            width,
            height,
        }
    }
}

/// Region of the source image to sample, in source pixels.
///
/// May extend past the source bounds (negative offsets) when `contain`
/// letterboxes the image inside the output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn full(natural: Dimensions) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: natural.width as f64,
            height: natural.height as f64,
        }
    }
}

/// Result of [`plan`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlannedGeometry {
    /// Working aspect ratio, which the final size preserves up to flooring.
    pub aspect_ratio: f64,
    /// Draw size in source pixel space (before rotation).
    pub width: u32,
    pub height: u32,
    /// Output size after rotation.
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Sampled source region, for `contain`/`cover` only.
    pub source_crop: Option<Rect>,
}

const DRIFT_RUN: usize = 12;
const DRIFT_SCALE: f64 = 100_000_000_000.0;

/// Undo binary floating-point drift before flooring.
///
/// A value whose shortest decimal form has a run of 12 or more `0`/`9`
/// digits after the point (`599.99999999999994`, `0.30000000000000004`) is
/// rounded to the nearest 1e-11, so flooring does not lose a pixel.
pub fn normalize_decimal(value: f64) -> f64 {
    let text = value.to_string();
    let Some((_, fraction)) = text.split_once('.') else {
        return value;
    };

    let mut run = 0;
    let drifted = fraction.chars().any(|c| {
        run = if c == '0' || c == '9' { run + 1 } else { 0 };
        run >= DRIFT_RUN
    });

    if drifted {
        (value * DRIFT_SCALE).round() / DRIFT_SCALE
    } else {
        value
    }
}

/// Source rectangle to sample for `mode`, centered.
///
/// Uses the inverse mode: `contain` samples a region that covers the
/// geometry's aspect ratio (so the image is letterboxed), `cover` samples
/// the largest region contained in the source (so the overflow is cropped).
pub fn crop_rect(natural: Dimensions, geometry: &Geometry, mode: ResizeMode) -> Rect {
    let inverse = match mode {
        ResizeMode::Contain => ResizeMode::Cover,
        ResizeMode::Cover => ResizeMode::Contain,
        ResizeMode::None => return Rect::full(natural),
    };

    let (nw, nh) = (natural.width as f64, natural.height as f64);
    let sampled = Geometry {
        aspect_ratio: geometry.aspect_ratio,
        width: nw,
        height: nh,
    }
    .fit(inverse);

    Rect {
        x: (nw - sampled.width) / 2.0,
        y: (nh - sampled.height) / 2.0,
        width: sampled.width,
        height: sampled.height,
    }
}

fn positive_or(value: f64, fallback: f64) -> f64 {
    if value > 0.0 { value } else { fallback }
}

/// Compute output dimensions for an image of `natural` size.
///
/// `transform` is the orientation transform that will be applied while
/// drawing; only whether it swaps axes matters here.
pub fn plan(
    natural: Dimensions,
    constraints: &SizeConstraints,
    transform: Transform,
) -> Result<PlannedGeometry, GeometryError> {
    let (nw, nh) = (natural.width as f64, natural.height as f64);
    let natural_ratio = nw / nh;
    if !is_positive(natural_ratio) {
        return Err(GeometryError::InvalidAspectRatio {
            width: nw,
            height: nh,
        });
    }

    let mut max_width = positive_or(constraints.max_width, f64::INFINITY);
    let mut max_height = positive_or(constraints.max_height, f64::INFINITY);
    let mut min_width = positive_or(constraints.min_width, 0.0);
    let mut min_height = positive_or(constraints.min_height, 0.0);
    let mut width = constraints.width.filter(|w| is_positive(*w));
    let mut height = constraints.height.filter(|h| is_positive(*h));

    let swapped = transform.swaps_axes();
    if swapped {
        std::mem::swap(&mut max_width, &mut max_height);
        std::mem::swap(&mut min_width, &mut min_height);
        std::mem::swap(&mut width, &mut height);
    }

    let container = match (constraints.resize, width, height) {
        (ResizeMode::Contain | ResizeMode::Cover, Some(w), Some(h)) => Some((w, h)),
        _ => None,
    };
    let aspect_ratio = container.map_or(natural_ratio, |(w, h)| w / h);

    let max = Geometry {
        aspect_ratio,
        width: max_width,
        height: max_height,
    }
    .fit(ResizeMode::Contain);
    let min = Geometry {
        aspect_ratio,
        width: min_width,
        height: min_height,
    }
    .fit(ResizeMode::Cover);

    let mut target = Geometry {
        aspect_ratio,
        width: width.unwrap_or(0.0),
        height: height.unwrap_or(0.0),
    }
    .fit(constraints.resize);
    if !is_positive(target.width) {
        target.width = nw;
    }
    if !is_positive(target.height) {
        target.height = nh;
    }

    // Not f64::clamp: a min above the max resolves to the max, not a panic
    let final_width = normalize_decimal(target.width.max(min.width).min(max.width)).floor();
    let final_height = normalize_decimal(target.height.max(min.height).min(max.height)).floor();
    if final_width > u32::MAX as f64 || final_height > u32::MAX as f64 {
        return Err(GeometryError::TooLarge {
            width: final_width,
            height: final_height,
        });
    }
    let (width, height) = (final_width as u32, final_height as u32);
    if width == 0 || height == 0 {
        return Err(GeometryError::EmptyOutput { width, height });
    }

    let source_crop = container.map(|_| {
        let geometry = Geometry {
            aspect_ratio,
            width: final_width,
            height: final_height,
        };
        crop_rect(natural, &geometry, constraints.resize)
    });

    let (canvas_width, canvas_height) = if swapped {
        (height, width)
    } else {
        (width, height)
    };

    log::debug!(
        "planned {}x{} -> {width}x{height} (canvas {canvas_width}x{canvas_height}, ratio {aspect_ratio:.4})",
        natural.width,
        natural.height
    );

    Ok(PlannedGeometry {
        aspect_ratio,
        width,
        height,
        canvas_width,
        canvas_height,
        source_crop,
    })
}
