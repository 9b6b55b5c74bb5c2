//! Read-only structural report of a JPEG file, for `pixpress inspect`.

use crate::imaging::{ExifSegments, OrientationCode, Transform, read_orientation, segments};
use serde::Serialize;

/// One marker segment from the header region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentInfo {
    pub name: String,
    pub marker: u16,
    pub offset: usize,
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectReport {
    pub size: usize,
    pub is_jpeg: bool,
    pub segments: Vec<SegmentInfo>,
    pub orientation: OrientationCode,
    pub transform: Transform,
    pub exif_segments: usize,
    pub exif_bytes: usize,
}

/// Conventional short name of a marker.
pub fn marker_name(marker: u16) -> String {
    match marker {
        0xFFE0..=0xFFEF => format!("APP{}", marker - 0xFFE0),
        0xFFC4 => "DHT".to_string(),
        0xFFC8 => "JPG".to_string(),
        0xFFCC => "DAC".to_string(),
        0xFFC0..=0xFFCF => format!("SOF{}", marker - 0xFFC0),
        0xFFDB => "DQT".to_string(),
        0xFFDD => "DRI".to_string(),
        0xFFFE => "COM".to_string(),
        other => format!("{other:04X}"),
    }
}

pub fn inspect(data: &[u8]) -> InspectReport {
    let is_jpeg = segments::has_soi(data);
    let segments = if is_jpeg {
        segments::scan(data)
            .map(|s| SegmentInfo {
                name: marker_name(s.marker),
                marker: s.marker,
                offset: s.offset,
                length: s.length,
            })
            .collect()
    } else {
        Vec::new()
    };
    let orientation = read_orientation(data);
    let exif = ExifSegments::extract(data);

    InspectReport {
        size: data.len(),
        is_jpeg,
        segments,
        orientation,
        transform: orientation.transform(),
        exif_segments: exif.count(),
        exif_bytes: exif.len(),
    }
}
