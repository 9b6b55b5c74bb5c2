//! Image handling: JPEG structure, orientation, geometry and rasterizing.
//!
//! | Concern | Module |
//! |---|---|
//! | **JPEG markers** | [`segments`]: iterate header segments up to SOS |
//! | **Orientation** | [`orientation`]: read/reset the Exif tag, map it to a draw transform |
//! | **Exif retention** | [`exif`]: copy APP1 segments out, splice them back in |
//! | **Geometry** | [`geometry`]: output size and source crop from constraints |
//! | **Rasterizing** | [`ImageBackend`] trait + [`RustBackend`] |
//!
//! Everything except the backends is pure and works on byte slices or
//! numbers, so it is unit testable without decoding an image.

pub mod backend;
pub mod exif;
pub mod geometry;
pub mod orientation;
mod params;
pub mod rust_backend;
pub mod segments;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use exif::ExifSegments;
pub use geometry::{GeometryError, PlannedGeometry, Rect, SizeConstraints, plan};
pub use orientation::{
    OrientationCode, Transform, detect_and_reset_orientation, read_orientation,
};
pub use params::{
    CanvasParams, DrawParams, Fill, MIME_JPEG, MIME_PNG, Quality, ResizeMode,
    image_type_to_extension, is_image_type,
};
pub use rust_backend::RustBackend;
