//! # pixpress
//!
//! Lossy image compression with orientation correction, resizing and Exif
//! retention. One input image goes through a single-use pipeline and comes
//! out as a (usually smaller) encoded image:
//!
//! ```text
//! bytes ─→ reset orientation ─→ decode ─→ plan size ─→ draw ─→ encode ─→ reinject Exif
//!                                                                   └─→ keep original if not smaller
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`pipeline`] | The compression state machine, abort handling, draw hooks |
//! | [`imaging`] | JPEG segment scanning, Exif orientation and retention, geometry, backends |
//! | [`source`] | Byte sources: in-memory buffers and files |
//! | [`config`] | Options, process-wide defaults, `pixpress.toml` loading and merging |
//! | [`inspect`] | Read-only structural report of a JPEG |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Orientation Is Drawn, Not Trusted
//!
//! Decoders disagree on whether they honour the Exif orientation tag. The
//! pipeline reads the tag, overwrites it with 1 in its own copy of the bytes
//! and applies the rotation itself while drawing. The image is rotated
//! exactly once no matter what the decoder does, and retained Exif never
//! causes a second rotation downstream.
//!
//! ## Collaborators Behind Traits
//!
//! Decoding, drawing and encoding live behind [`imaging::ImageBackend`], and
//! input behind [`source::ByteSource`]. The pipeline logic (state machine,
//! policies, geometry) is tested against a recording mock; the
//! [`imaging::RustBackend`] built on the `image` crate is tested separately.
//!
//! ## Strict By Default
//!
//! Re-encoding an already well-compressed file can make it bigger. With
//! `strict` enabled (the default) the original bytes are returned whenever
//! the output is not smaller.
//!
//! # Example
//!
//! ```no_run
//! use pixpress::config::CompressOptions;
//! use pixpress::imaging::RustBackend;
//! use pixpress::pipeline::compress;
//! use pixpress::source::FileSource;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut source = FileSource::open("photo.jpg").await?;
//! let options = CompressOptions {
//!     max_width: Some(1920.0),
//!     ..CompressOptions::default()
//! };
//! let result = compress(&mut source, options, &RustBackend::new()).await?;
//! std::fs::write("photo.min.jpg", &result.bytes)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod imaging;
pub mod inspect;
pub mod output;
pub mod pipeline;
pub mod source;

#[cfg(test)]
pub(crate) mod test_helpers;
