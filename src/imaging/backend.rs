//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait is everything the pipeline needs from a
//! rasterizer: decode bytes to a pixel surface, allocate and draw onto a
//! canvas, encode a canvas back to bytes. The pipeline never touches
//! pixels itself.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate.
//!
//! Decode and encode are `async` because they are the expensive calls and
//! the points where a pipeline may yield to other work. Canvas operations
//! are synchronous: they run between the two, with the draw hooks.

use super::params::{CanvasParams, DrawParams, Quality};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported format: {0}")]
    Unsupported(String),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Pixel size of a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image processing backends.
///
/// `Surface` is the backend's pixel buffer type; it is used both for decoded
/// sources and for canvases.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    type Surface: Send + Sync;

    /// Whether `mime_type` can be decoded.
    fn can_decode(&self, mime_type: &str) -> bool;

    /// Whether `mime_type` can be encoded.
    fn can_encode(&self, mime_type: &str) -> bool;

    /// Decode an encoded image. Must not apply EXIF orientation.
    async fn decode(&self, bytes: Vec<u8>, mime_type: &str)
    -> Result<Self::Surface, BackendError>;

    /// Natural size of a surface.
    fn dimensions(&self, surface: &Self::Surface) -> Dimensions;

    /// Allocate a canvas painted with `params.fill`.
    fn create_canvas(&self, params: &CanvasParams) -> Result<Self::Surface, BackendError>;

    /// Draw `source` onto `canvas` as described by `params`.
    fn draw(
        &self,
        canvas: &mut Self::Surface,
        source: &Self::Surface,
        params: &DrawParams,
    ) -> Result<(), BackendError>;

    /// Encode a finished canvas.
    async fn encode(
        &self,
        canvas: Self::Surface,
        mime_type: &str,
        quality: Quality,
    ) -> Result<Vec<u8>, BackendError>;
}
