//! JPEG marker segment scanning.
//!
//! Walks the header region of a JPEG stream (everything between SOI and the
//! first SOS) and yields one [`Segment`] per marker. Entropy-coded scan data
//! after SOS is never touched: it can contain byte sequences that look like
//! markers.
//!
//! Segment layout on the wire:
//!
//! ```text
//!   FF xx        marker (big-endian u16)
//!   LL LL        length, big-endian, counts itself but not the marker
//!   ...          length - 2 payload bytes
//! ```
//!
//! The scanner is purely structural. A truncated or garbled stream ends the
//! iteration early instead of panicking, so callers treat "fewer segments"
//! as the failure mode.

/// Start of image. Always the first two bytes of a JPEG stream.
pub const SOI: u16 = 0xFFD8;
/// End of image.
pub const EOI: u16 = 0xFFD9;
/// Start of scan. Compressed image data follows.
pub const SOS: u16 = 0xFFDA;
/// APP0, conventionally the JFIF header.
pub const APP0: u16 = 0xFFE0;
/// APP1, conventionally Exif (or XMP).
pub const APP1: u16 = 0xFFE1;

/// A structural unit of a JPEG stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Two-byte marker, e.g. [`APP1`].
    pub marker: u16,
    /// Offset of the marker's `0xFF` byte in the buffer.
    pub offset: usize,
    /// Value of the length field (includes the two length bytes, excludes the marker).
    pub length: usize,
}

impl Segment {
    /// Offset one past the last byte of this segment.
    pub fn end(&self) -> usize {
        self.offset + 2 + self.length
    }

    /// Offset of the first payload byte (after marker and length field).
    pub fn payload_offset(&self) -> usize {
        self.offset + 4
    }

    /// Raw bytes of the whole segment, marker included.
    ///
    /// Returns `None` when the declared length runs past the end of `buffer`.
    pub fn bytes<'a>(&self, buffer: &'a [u8]) -> Option<&'a [u8]> {
        buffer.get(self.offset..self.end())
    }
}

/// Markers that carry no length field.
fn is_standalone(marker: u16) -> bool {
    // TEM, RST0-7, SOI, EOI
    marker == 0xFF01 || (0xFFD0..=0xFFD9).contains(&marker)
}

/// Iterator over the marker segments of a JPEG buffer.
///
/// Created by [`scan`]. A clone continues independently from the same
/// position; call [`scan`] again to start over.
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    data: &'a [u8],
    pos: usize,
    done: bool,
}

/// Scan `data` for marker segments, starting right after SOI.
///
/// The buffer is not required to start with SOI; callers that care check it
/// themselves. Iteration stops at the first SOS (which is not yielded), at
/// the end of the buffer, or at the first structural anomaly.
pub fn scan(data: &[u8]) -> Segments<'_> {
    Segments {
        data,
        pos: 2,
        done: false,
    }
}

impl Segments<'_> {
    fn read_u16(&self, at: usize) -> Option<u16> {
        let bytes = self.data.get(at..at + 2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn stop(&mut self) -> Option<Segment> {
        self.done = true;
        None
    }

    fn bail(&mut self, reason: &str) -> Option<Segment> {
        log::trace!("segment scan stopped at offset {}: {reason}", self.pos);
        self.stop()
    }
}

impl Iterator for Segments<'_> {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        loop {
            if self.done {
                return None;
            }

            let Some(marker) = self.read_u16(self.pos) else {
                return self.stop();
            };
            if marker >> 8 != 0xFF {
                return self.bail("expected marker");
            }
            // Fill bytes: a run of 0xFF before the real marker
            if marker == 0xFFFF {
                self.pos += 1;
                continue;
            }
            if marker == SOS {
                return self.stop();
            }
            if is_standalone(marker) {
                self.pos += 2;
                continue;
            }

            let Some(length) = self.read_u16(self.pos + 2).map(usize::from) else {
                return self.bail("truncated length field");
            };
            if length < 2 {
                return self.bail("invalid segment length");
            }

            let segment = Segment {
                marker,
                offset: self.pos,
                length,
            };
            self.pos = segment.end();
            return Some(segment);
        }
    }
}

/// Whether `data` starts with the SOI marker.
pub fn has_soi(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0xFF && data[1] == 0xD8
}
