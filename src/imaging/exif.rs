//! Exif segment retention across a re-encode.
//!
//! Encoders write a fresh JFIF header and drop everything else, so the
//! original APP1 segments are copied out before decoding and spliced back
//! into the new stream afterwards, right behind its APP0:
//!
//! ```text
//!   before:  SOI | APP0 | DQT ...
//!   after:   SOI | APP0 | APP1 (stored) ... | DQT ...
//! ```

use super::segments::{self, APP0, APP1};

/// Raw APP1 segments (marker, length and payload) in stream order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExifSegments {
    bytes: Vec<u8>,
    count: usize,
}

impl ExifSegments {
    /// Copy every APP1 segment out of `data`.
    ///
    /// Finding none is not an error. A segment whose declared length runs
    /// past the end of the buffer is skipped.
    pub fn extract(data: &[u8]) -> Self {
        let mut store = Self::default();
        for segment in segments::scan(data).filter(|s| s.marker == APP1) {
            match segment.bytes(data) {
                Some(raw) => {
                    store.bytes.extend_from_slice(raw);
                    store.count += 1;
                }
                None => log::warn!(
                    "skipping truncated APP1 segment at offset {} ({} bytes declared)",
                    segment.offset,
                    segment.length
                ),
            }
        }
        store
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of stored segments.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Total stored size in bytes, headers included.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Stored segments concatenated.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Splice the stored segments into `data` right after its APP0 segment.
    ///
    /// `data` must start with SOI immediately followed by APP0; otherwise it
    /// is returned unchanged. The result is exactly `self.len()` bytes longer
    /// than the input.
    pub fn inject(&self, data: Vec<u8>) -> Vec<u8> {
        if self.is_empty() {
            return data;
        }
        if !segments::has_soi(&data) {
            log::debug!("exif not reinjected: output does not start with SOI");
            return data;
        }
        let Some(app0) = segments::scan(&data).next().filter(|s| s.marker == APP0 && s.offset == 2)
        else {
            log::debug!("exif not reinjected: second marker is not APP0");
            return data;
        };
        if app0.end() > data.len() {
            return data;
        }

        let split = app0.end();
        let mut out = Vec::with_capacity(data.len() + self.bytes.len());
        out.extend_from_slice(&data[..split]);
        out.extend_from_slice(&self.bytes);
        out.extend_from_slice(&data[split..]);
        out
    }
}
