//! EXIF orientation: detection, in-place reset, and the draw transform.
//!
//! Reads the Orientation tag (0x0112) from IFD0 of the first APP1 Exif
//! segment. Layout walked, with offsets relative to the APP1 marker:
//!
//! ```text
//!   +0   FF E1          APP1 marker
//!   +2   LL LL          segment length
//!   +4   "Exif" 00 00   identifier
//!   +10  II|MM          TIFF byte order   <- TIFF header start
//!   +12  00 2A          magic (in that byte order)
//!   +14  xx xx xx xx    offset of IFD0 from TIFF header start (>= 8)
//!
//!   IFD0: u16 entry count, then 12-byte entries
//!         { tag: u16, type: u16, count: u32, value: u32 }
//! ```
//!
//! Detection never fails: anything structurally off (no SOI, no APP1, bad
//! magic, truncated IFD) reads as identity.

use super::segments::{self, APP1};

/// Tag number of the Orientation field.
const ORIENTATION_TAG: u16 = 0x0112;

/// TIFF byte order, taken from the first two bytes of the TIFF header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn read_u16(self, data: &[u8], at: usize) -> Option<u16> {
        let b = data.get(at..at + 2)?;
        Some(match self {
            ByteOrder::Little => u16::from_le_bytes([b[0], b[1]]),
            ByteOrder::Big => u16::from_be_bytes([b[0], b[1]]),
        })
    }

    fn read_u32(self, data: &[u8], at: usize) -> Option<u32> {
        let b = data.get(at..at + 4)?;
        Some(match self {
            ByteOrder::Little => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            ByteOrder::Big => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        })
    }

    fn write_u16(self, data: &mut [u8], at: usize, value: u16) {
        let bytes = match self {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        };
        data[at..at + 2].copy_from_slice(&bytes);
    }
}

/// An EXIF orientation code, 1 through 8. 1 is identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct OrientationCode(u16);

impl OrientationCode {
    pub const IDENTITY: Self = Self(1);

    /// Wrap a raw tag value. Anything outside 1-8 becomes identity.
    pub fn new(value: u16) -> Self {
        if (1..=8).contains(&value) {
            Self(value)
        } else {
            Self::IDENTITY
        }
    }

    pub fn value(self) -> u16 {
        self.0
    }

    pub fn is_identity(self) -> bool {
        self.0 == 1
    }

    /// The rotate/flip needed to display the image upright.
    pub fn transform(self) -> Transform {
        Transform::from_code(self.0)
    }
}

impl Default for OrientationCode {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Rotation and flips applied when drawing the decoded image.
///
/// Applied like a 2D canvas transform: scale first (in image space), then
/// rotate clockwise by `rotate` degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Transform {
    /// One of -180, -90, 0, 90.
    pub rotate: i16,
    /// 1 or -1 (-1 mirrors horizontally).
    pub scale_x: i8,
    /// 1 or -1 (-1 mirrors vertically).
    pub scale_y: i8,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        rotate: 0,
        scale_x: 1,
        scale_y: 1,
    };

    /// Fixed lookup from orientation code. Unknown codes map to identity.
    pub fn from_code(code: u16) -> Self {
        let (rotate, scale_x, scale_y) = match code {
            2 => (0, -1, 1),    // flip horizontal
            3 => (-180, 1, 1),  // rotate 180
            4 => (0, 1, -1),    // flip vertical
            5 => (90, 1, -1),   // flip vertical, rotate right
            6 => (90, 1, 1),    // rotate right
            7 => (90, -1, 1),   // flip horizontal, rotate right
            8 => (-90, 1, 1),   // rotate left
            _ => (0, 1, 1),
        };
        Self {
            rotate,
            scale_x,
            scale_y,
        }
    }

    /// Whether drawing with this transform swaps the output width and height.
    pub fn swaps_axes(self) -> bool {
        self.rotate.abs() % 180 == 90
    }

    pub fn is_identity(self) -> bool {
        self == Self::IDENTITY
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Absolute offset of the orientation value and the byte order to use.
fn locate_orientation(data: &[u8]) -> Option<(usize, ByteOrder)> {
    if !segments::has_soi(data) {
        return None;
    }

    let app1 = segments::scan(data).find(|s| s.marker == APP1)?;
    let exif_id = app1.payload_offset();
    if data.get(exif_id..exif_id + 4)? != b"Exif" {
        return None;
    }

    let tiff = app1.offset + 10;
    let order = match data.get(tiff..tiff + 2)? {
        b"II" => ByteOrder::Little,
        b"MM" => ByteOrder::Big,
        _ => return None,
    };
    if order.read_u16(data, tiff + 2)? != 0x002A {
        return None;
    }

    let first_ifd = order.read_u32(data, tiff + 4)?;
    if first_ifd < 8 {
        return None;
    }
    let ifd = tiff.checked_add(first_ifd as usize)?;

    let count = order.read_u16(data, ifd)? as usize;
    (0..count)
        .map(|i| ifd + 2 + i * 12)
        .take_while(|&entry| entry + 12 <= data.len())
        .find(|&entry| order.read_u16(data, entry) == Some(ORIENTATION_TAG))
        .map(|entry| (entry + 8, order))
}

/// Read the orientation code without touching the buffer.
pub fn read_orientation(data: &[u8]) -> OrientationCode {
    locate_orientation(data)
        .and_then(|(at, order)| order.read_u16(data, at))
        .map(OrientationCode::new)
        .unwrap_or_default()
}

/// Read the orientation code and overwrite it in place with 1.
///
/// Returns the code found before the reset. After this call any consumer of
/// `data` that honours EXIF orientation sees identity, so the rotation is
/// applied exactly once (by the pipeline's draw transform). Calling it a
/// second time returns identity and leaves the buffer unchanged.
pub fn detect_and_reset_orientation(data: &mut [u8]) -> OrientationCode {
    let Some((at, order)) = locate_orientation(data) else {
        return OrientationCode::IDENTITY;
    };
    let Some(raw) = order.read_u16(data, at) else {
        return OrientationCode::IDENTITY;
    };
    order.write_u16(data, at, 1);
    log::debug!("exif orientation {raw} reset to 1 at offset {at}");
    OrientationCode::new(raw)
}
