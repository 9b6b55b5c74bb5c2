//! The compression pipeline.
//!
//! One [`CompressionPipeline`] compresses one image, moving through a fixed
//! sequence of states:
//!
//! ```text
//! Idle → Loading → Decoding → Planning → Rendering → Encoding → Finalizing → Done
//!            └──────────┴──────────┴──────────┴──────────┴───────────┴──→ Aborted | Failed
//! ```
//!
//! | State | Work |
//! |---|---|
//! | Loading | read the [`ByteSource`], resolve the output type |
//! | Decoding | reset the Exif orientation, store APP1 segments, decode |
//! | Planning | [`plan`] the output geometry |
//! | Rendering | fill a canvas, draw, run [`DrawHooks`] |
//! | Encoding | encode the canvas |
//! | Finalizing | reinject Exif, apply the strict-size policy |
//!
//! The pipeline only suspends while awaiting its collaborators. Abort is
//! cooperative: an [`AbortHandle`] sets a flag that is checked after every
//! await, at the start of rendering, after each hook and before finalizing.
//! Once seen, nothing further is drawn or encoded.

use crate::config::CompressOptions;
use crate::imaging::{
    BackendError, CanvasParams, Dimensions, DrawParams, ExifSegments, Fill, GeometryError,
    ImageBackend, MIME_JPEG, OrientationCode, PlannedGeometry, Rect, Transform,
    detect_and_reset_orientation, is_image_type, plan,
};
use crate::source::{ByteSource, ReadOutcome};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("unsupported environment: {0}")]
    Environment(String),
    #[error("failed to read the image: {0}")]
    Io(String),
    #[error("failed to decode the image: {0}")]
    Decode(#[source] BackendError),
    #[error("failed to render the image: {0}")]
    Render(#[source] BackendError),
    #[error("failed to encode the image: {0}")]
    Encode(#[source] BackendError),
    #[error("invalid geometry: {0}")]
    Domain(#[from] GeometryError),
    #[error("the compression process has been aborted")]
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum PipelineState {
    Idle,
    Loading,
    Decoding,
    Planning,
    Rendering,
    Encoding,
    Finalizing,
    Done,
    Aborted,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted | Self::Failed)
    }
}

/// Cloneable cancellation flag for a running pipeline.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Synchronous callbacks around the draw step.
///
/// Both receive the canvas as it is at that point; whatever they paint ends
/// up in the encoded output.
pub trait DrawHooks<S>: Send + Sync {
    /// After the background fill, before the image is drawn.
    fn after_fill(&self, _canvas: &mut S) {}

    /// After the image is drawn, before encoding.
    fn after_draw(&self, _canvas: &mut S) {}
}

/// Hooks that do nothing.
pub struct NoHooks;

impl<S> DrawHooks<S> for NoHooks {}

/// A finished compression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Compressed {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    /// Type of `bytes`; the input type when `used_original` is set.
    pub mime_type: String,
    pub natural: Dimensions,
    /// Output size in pixels, upright. The stored pixel size of the input
    /// when `used_original` is set.
    pub width: u32,
    pub height: u32,
    /// Orientation applied while drawing. Identity when `used_original` is
    /// set, since the kept bytes still carry their own tag.
    pub orientation: OrientationCode,
    /// Bytes of Exif spliced into the output.
    pub exif_bytes: usize,
    pub original_size: u64,
    /// The strict policy kept the original bytes.
    pub used_original: bool,
}

impl Compressed {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Output type for an input of `source_mime` and `source_size` bytes.
pub fn resolve_output_mime(options: &CompressOptions, source_mime: &str, source_size: u64) -> String {
    let requested = if is_image_type(&options.mime_type) {
        options.mime_type.as_str()
    } else {
        source_mime
    };

    if source_size > options.convert_size && options.convert_types.iter().any(|t| t == requested) {
        log::debug!(
            "{source_size} bytes exceeds convert_size {}, converting {requested} to {MIME_JPEG}",
            options.convert_size
        );
        return MIME_JPEG.to_string();
    }
    requested.to_string()
}

/// Single-use compression of one image.
pub struct CompressionPipeline<'a, B: ImageBackend> {
    backend: &'a B,
    options: CompressOptions,
    hooks: Box<dyn DrawHooks<B::Surface> + 'a>,
    state: PipelineState,
    abort: AbortHandle,
}

impl<'a, B: ImageBackend> CompressionPipeline<'a, B> {
    pub fn new(backend: &'a B, options: CompressOptions) -> Self {
        Self {
            backend,
            options,
            hooks: Box::new(NoHooks),
            state: PipelineState::Idle,
            abort: AbortHandle::default(),
        }
    }

    pub fn with_hooks(mut self, hooks: impl DrawHooks<B::Surface> + 'a) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    /// Share an existing abort flag, so the pipeline can be cancelled before
    /// it is built (for example from a signal handler).
    pub fn with_abort_handle(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn options(&self) -> &CompressOptions {
        &self.options
    }

    /// Handle for aborting from another task while [`run`](Self::run) is in progress.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn abort(&self) {
        self.abort.abort();
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert!(next > self.state, "{:?} -> {next:?}", self.state);
        log::debug!("pipeline {:?} -> {next:?}", self.state);
        self.state = next;
    }

    fn check_abort(&self) -> Result<(), CompressError> {
        if self.abort.is_aborted() {
            log::debug!("abort observed in {:?}", self.state);
            return Err(CompressError::Aborted);
        }
        Ok(())
    }

    /// Compress the image behind `source`.
    ///
    /// A pipeline runs once; calling this again is a validation error.
    pub async fn run(&mut self, source: &mut dyn ByteSource) -> Result<Compressed, CompressError> {
        if self.state != PipelineState::Idle {
            return Err(CompressError::Validation(format!(
                "pipeline already used (state {:?})",
                self.state
            )));
        }

        let result = self.execute(source).await;
        let terminal = match &result {
            Ok(_) => PipelineState::Done,
            Err(CompressError::Aborted) => PipelineState::Aborted,
            Err(_) => PipelineState::Failed,
        };
        if let Err(e) = &result {
            log::debug!("{} failed in {:?}: {e}", source.name(), self.state);
        }
        self.advance(terminal);
        result
    }

    async fn execute(&mut self, source: &mut dyn ByteSource) -> Result<Compressed, CompressError> {
        let source_mime = source.mime_type().to_string();
        if !is_image_type(&source_mime) {
            return Err(CompressError::Validation(format!(
                "the source must be an image, got {source_mime:?}"
            )));
        }
        if !self.backend.can_decode(&source_mime) {
            return Err(CompressError::Environment(format!(
                "no decoder for {source_mime}"
            )));
        }
        let is_jpeg = source_mime == MIME_JPEG;

        self.advance(PipelineState::Loading);
        let outcome = source.read().await;
        self.check_abort()?;
        let original = match outcome {
            ReadOutcome::Bytes(bytes) => bytes,
            ReadOutcome::Failed(reason) => return Err(CompressError::Io(reason)),
            ReadOutcome::Aborted => {
                return Err(CompressError::Io("reading was aborted".to_string()));
            }
        };
        let original_size = original.len() as u64;

        let mime_type = resolve_output_mime(&self.options, &source_mime, original_size);
        if !self.backend.can_encode(&mime_type) {
            return Err(CompressError::Validation(format!(
                "cannot encode to {mime_type}"
            )));
        }

        self.advance(PipelineState::Decoding);
        let mut working = original.clone();
        let (orientation, transform) = if is_jpeg && self.options.check_orientation {
            let code = detect_and_reset_orientation(&mut working);
            (code, code.transform())
        } else {
            (OrientationCode::IDENTITY, Transform::IDENTITY)
        };
        let exif = if is_jpeg && self.options.retain_exif {
            ExifSegments::extract(&working)
        } else {
            ExifSegments::default()
        };

        let decoded = self.backend.decode(working, &source_mime).await;
        self.check_abort()?;
        let image = decoded.map_err(CompressError::Decode)?;

        self.advance(PipelineState::Planning);
        let natural = self.backend.dimensions(&image);
        let geometry = plan(natural, &self.options.constraints(), transform)?;

        self.advance(PipelineState::Rendering);
        self.check_abort()?;
        let canvas = self.render(&image, natural, &geometry, transform, &mime_type)?;
        drop(image);

        self.advance(PipelineState::Encoding);
        let encoded = self
            .backend
            .encode(canvas, &mime_type, self.options.quality)
            .await;
        self.check_abort()?;
        let encoded = encoded.map_err(CompressError::Encode)?;

        self.advance(PipelineState::Finalizing);
        let mut bytes = encoded;
        let mut exif_bytes = 0;
        if mime_type == MIME_JPEG && !exif.is_empty() {
            let before = bytes.len();
            bytes = exif.inject(bytes);
            exif_bytes = bytes.len() - before;
        }

        let mut result = Compressed {
            bytes,
            mime_type,
            natural,
            width: geometry.canvas_width,
            height: geometry.canvas_height,
            orientation,
            exif_bytes,
            original_size,
            used_original: false,
        };

        if self.options.strict && result.size() >= original_size {
            log::debug!(
                "output {} bytes is not smaller than input {original_size}, keeping original",
                result.size()
            );
            result.bytes = original;
            result.mime_type = source_mime;
            result.width = natural.width;
            result.height = natural.height;
            result.orientation = OrientationCode::IDENTITY;
            result.exif_bytes = 0;
            result.used_original = true;
        }
        Ok(result)
    }

    fn render(
        &self,
        image: &B::Surface,
        natural: Dimensions,
        geometry: &PlannedGeometry,
        transform: Transform,
        mime_type: &str,
    ) -> Result<B::Surface, CompressError> {
        let mut canvas = self
            .backend
            .create_canvas(&CanvasParams {
                width: geometry.canvas_width,
                height: geometry.canvas_height,
                fill: Fill::for_mime(mime_type),
            })
            .map_err(CompressError::Render)?;

        self.hooks.after_fill(&mut canvas);
        self.check_abort()?;

        let params = DrawParams {
            source_crop: geometry.source_crop.unwrap_or(Rect::full(natural)),
            width: geometry.width,
            height: geometry.height,
            transform,
        };
        self.backend
            .draw(&mut canvas, image, &params)
            .map_err(CompressError::Render)?;

        self.hooks.after_draw(&mut canvas);
        self.check_abort()?;
        Ok(canvas)
    }
}

/// Compress `source` with a fresh pipeline.
pub async fn compress<B: ImageBackend>(
    source: &mut dyn ByteSource,
    options: CompressOptions,
    backend: &B,
) -> Result<Compressed, CompressError> {
    CompressionPipeline::new(backend, options).run(source).await
}
