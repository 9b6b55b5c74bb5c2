//! Shared test utilities for the pixpress test suite.
//!
//! Builds synthetic JPEG streams byte by byte so the scanner, orientation and
//! Exif tests can exercise exact layouts (endianness, truncation, multiple
//! APP1 segments) without fixture files.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let jpeg = JpegBuilder::new()
//!     .app0()
//!     .exif(ExifBuilder::new().orientation(6).build())
//!     .build();
//! ```

use crate::imaging::segments::{APP0, APP1};
use image::ImageEncoder;

// =========================================================================
// Raw JPEG streams
// =========================================================================

/// JFIF APP0 payload: identifier, version 1.1, no density units, 1x1, no thumbnail.
pub const JFIF_PAYLOAD: [u8; 14] = [
    b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00,
];

/// Assembles a JPEG header region: SOI, arbitrary segments, then a minimal
/// SOS + scan data + EOI tail.
#[derive(Debug, Clone)]
pub struct JpegBuilder {
    bytes: Vec<u8>,
}

impl JpegBuilder {
    pub fn new() -> Self {
        Self {
            bytes: vec![0xFF, 0xD8],
        }
    }

    /// Append a segment with a correct length field.
    pub fn segment(mut self, marker: u16, payload: &[u8]) -> Self {
        self.bytes.extend_from_slice(&marker.to_be_bytes());
        self.bytes
            .extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        self.bytes.extend_from_slice(payload);
        self
    }

    /// Append a JFIF APP0 segment.
    pub fn app0(self) -> Self {
        self.segment(APP0, &JFIF_PAYLOAD)
    }

    /// Append an APP1 segment with the given payload (see [`ExifBuilder`]).
    pub fn exif(self, payload: Vec<u8>) -> Self {
        self.segment(APP1, &payload)
    }

    /// Header region only: no SOS, no EOI.
    pub fn build_without_eoi(self) -> Vec<u8> {
        self.bytes
    }

    /// Full stream with a fake scan that contains marker-like bytes.
    pub fn build(mut self) -> Vec<u8> {
        self.bytes
            .extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]);
        self.bytes
            .extend_from_slice(&[0x12, 0xFF, 0x00, 0xFF, 0xE1, 0x34, 0x56]);
        self.bytes.extend_from_slice(&[0xFF, 0xD9]);
        self.bytes
    }
}

impl Default for JpegBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =========================================================================
// Exif payloads
// =========================================================================

/// Builds an APP1 Exif payload: `"Exif\0\0"` + TIFF header + IFD0.
///
/// IFD0 always holds an ImageWidth entry before the orientation entry so
/// the tag search has to walk past a non-matching record.
#[derive(Debug, Clone)]
pub struct ExifBuilder {
    little_endian: bool,
    orientation: Option<u16>,
    ifd_offset: u32,
}

impl ExifBuilder {
    pub fn new() -> Self {
        Self {
            little_endian: false,
            orientation: None,
            ifd_offset: 8,
        }
    }

    pub fn little_endian(mut self) -> Self {
        self.little_endian = true;
        self
    }

    pub fn orientation(mut self, code: u16) -> Self {
        self.orientation = Some(code);
        self
    }

    /// Override the IFD0 offset written into the TIFF header.
    pub fn ifd_offset(mut self, offset: u32) -> Self {
        self.ifd_offset = offset;
        self
    }

    fn u16(&self, v: u16) -> [u8; 2] {
        if self.little_endian {
            v.to_le_bytes()
        } else {
            v.to_be_bytes()
        }
    }

    fn u32(&self, v: u32) -> [u8; 4] {
        if self.little_endian {
            v.to_le_bytes()
        } else {
            v.to_be_bytes()
        }
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = b"Exif\0\0".to_vec();
        out.extend_from_slice(if self.little_endian { b"II" } else { b"MM" });
        out.extend_from_slice(&self.u16(0x002A));
        out.extend_from_slice(&self.u32(self.ifd_offset));

        let mut entries: Vec<(u16, u16, u32, u32)> = vec![(0x0100, 4, 1, 640)];
        if let Some(code) = self.orientation {
            // SHORT values are left-aligned in the 4-byte value field
            let value = if self.little_endian {
                code as u32
            } else {
                (code as u32) << 16
            };
            entries.push((0x0112, 3, 1, value));
        }

        out.extend_from_slice(&self.u16(entries.len() as u16));
        for (tag, typ, count, value) in entries {
            out.extend_from_slice(&self.u16(tag));
            out.extend_from_slice(&self.u16(typ));
            out.extend_from_slice(&self.u32(count));
            out.extend_from_slice(&self.u32(value));
        }
        // Next IFD offset: none
        out.extend_from_slice(&[0, 0, 0, 0]);
        out
    }
}

impl Default for ExifBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Offset of the orientation value inside a stream built as
/// `JpegBuilder::new().app0().exif(ExifBuilder::new().orientation(..))`.
///
/// SOI (2) + APP0 (18) + APP1 header (4) + "Exif\0\0" (6) + TIFF header (8)
/// + entry count (2) + first entry (12) + tag/type/count (8).
pub const ORIENTATION_VALUE_OFFSET: usize = 2 + 18 + 4 + 6 + 8 + 2 + 12 + 8;

// =========================================================================
// Real encoded images
// =========================================================================

/// Encode a gradient RGB image as a baseline JPEG with the `image` crate.
///
/// The encoder writes SOI + JFIF APP0 first, which is what Exif reinjection
/// expects.
pub fn encoded_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 95)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    out
}

/// Encode a gradient RGBA image as PNG.
pub fn encoded_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x % 256) as u8, (y % 256) as u8, 64, 255])
    });
    let mut out = Vec::new();
    image::codecs::png::PngEncoder::new(&mut out)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgba8)
        .unwrap();
    out
}
