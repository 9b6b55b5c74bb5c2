//! CLI output formatting.
//!
//! Every `format_*` function is pure and returns lines; the `print_*`
//! wrappers write them to stdout. Each input gets a header line followed by
//! indented detail lines:
//!
//! ## Compress
//!
//! ```text
//! photo.jpg → out/photo.jpg
//!     4000x3000 → 1920x1440 image/jpeg
//!     2.4 MB → 512.3 KB (-78.7%)
//!     Orientation: 6 (rotate 90)
//!     Exif: 1.2 KB retained
//! ```
//!
//! ## Inspect
//!
//! ```text
//! photo.jpg (2.4 MB, JPEG)
//!     APP0  @2      18 bytes
//!     APP1  @20     1182 bytes
//!     DQT   @1202   69 bytes
//!     Orientation: 6 (rotate 90)
//!     Exif: 1 segment, 1.2 KB
//! ```

use crate::imaging::{OrientationCode, Transform};
use crate::inspect::InspectReport;
use crate::pipeline::{CompressError, Compressed};
use std::path::Path;

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human readable byte count, 1024-based.
fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Signed percentage change from `before` to `after`.
fn format_change(before: u64, after: u64) -> String {
    if before == 0 {
        return "n/a".to_string();
    }
    let change = (after as f64 - before as f64) / before as f64 * 100.0;
    format!("{change:+.1}%")
}

fn describe_transform(transform: Transform) -> String {
    let mut parts = Vec::new();
    if transform.scale_x < 0 {
        parts.push("flip horizontal".to_string());
    }
    if transform.scale_y < 0 {
        parts.push("flip vertical".to_string());
    }
    if transform.rotate != 0 {
        parts.push(format!("rotate {}", transform.rotate));
    }
    if parts.is_empty() {
        "upright".to_string()
    } else {
        parts.join(", ")
    }
}

fn orientation_line(code: OrientationCode) -> String {
    format!(
        "{}Orientation: {} ({})",
        indent(1),
        code.value(),
        describe_transform(code.transform())
    )
}

pub fn format_compress_result(input: &Path, output: &Path, result: &Compressed) -> Vec<String> {
    let mut lines = vec![format!("{} → {}", input.display(), output.display())];

    lines.push(format!(
        "{}{}x{} → {}x{} {}",
        indent(1),
        result.natural.width,
        result.natural.height,
        result.width,
        result.height,
        result.mime_type
    ));
    lines.push(format!(
        "{}{} → {} ({})",
        indent(1),
        format_size(result.original_size),
        format_size(result.size()),
        format_change(result.original_size, result.size())
    ));
    if !result.orientation.is_identity() {
        lines.push(orientation_line(result.orientation));
    }
    if result.exif_bytes > 0 {
        lines.push(format!(
            "{}Exif: {} retained",
            indent(1),
            format_size(result.exif_bytes as u64)
        ));
    }
    if result.used_original {
        lines.push(format!(
            "{}Kept original: compressed output was not smaller",
            indent(1)
        ));
    }
    lines
}

pub fn print_compress_result(input: &Path, output: &Path, result: &Compressed) {
    for line in format_compress_result(input, output, result) {
        println!("{}", line);
    }
}

pub fn format_compress_error(input: &Path, error: &CompressError) -> Vec<String> {
    vec![
        format!("{} ✗", input.display()),
        format!("{}{}", indent(1), error),
    ]
}

pub fn print_compress_error(input: &Path, error: &CompressError) {
    for line in format_compress_error(input, error) {
        eprintln!("{}", line);
    }
}

pub fn format_inspect(input: &Path, report: &InspectReport) -> Vec<String> {
    let kind = if report.is_jpeg { "JPEG" } else { "not a JPEG" };
    let mut lines = vec![format!(
        "{} ({}, {})",
        input.display(),
        format_size(report.size as u64),
        kind
    )];

    for segment in &report.segments {
        lines.push(format!(
            "{}{:<5} @{:<6} {} bytes",
            indent(1),
            segment.name,
            segment.offset,
            segment.length + 2
        ));
    }
    if report.is_jpeg {
        lines.push(orientation_line(report.orientation));
        let noun = if report.exif_segments == 1 {
            "segment"
        } else {
            "segments"
        };
        lines.push(format!(
            "{}Exif: {} {noun}, {}",
            indent(1),
            report.exif_segments,
            format_size(report.exif_bytes as u64)
        ));
    }
    lines
}

pub fn print_inspect(input: &Path, report: &InspectReport) {
    for line in format_inspect(input, report) {
        println!("{}", line);
    }
}
