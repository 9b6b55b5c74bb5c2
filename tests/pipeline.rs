//! End-to-end compression with the real `image`-crate backend.

use futures_util::future::join_all;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage, Rgba, RgbaImage};
use pixpress::config::CompressOptions;
use pixpress::imaging::{
    ExifSegments, GeometryError, OrientationCode, ResizeMode, RustBackend, read_orientation,
};
use pixpress::pipeline::{
    AbortHandle, CompressError, CompressionPipeline, PipelineState, compress,
};
use std::sync::Arc;
use pixpress::source::{FileSource, MemorySource};

// =========================================================================
// Fixtures
// =========================================================================

const RED: Rgb<u8> = Rgb([255, 0, 0]);
const BLUE: Rgb<u8> = Rgb([0, 0, 255]);

/// Left half red, right half blue.
fn split_rgb(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, _| if x < width / 2 { RED } else { BLUE })
}

fn noise_rgb(width: u32, height: u32) -> RgbImage {
    let mut state: u32 = 0x1234_5678;
    RgbImage::from_fn(width, height, |_, _| {
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        };
        Rgb([next(), next(), next()])
    })
}

fn jpeg(img: &RgbImage, quality: u8) -> Vec<u8> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgb8)
        .unwrap();
    out
}

fn png(img: &RgbaImage) -> Vec<u8> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgba8)
        .unwrap();
    out
}

/// APP1 payload: big-endian TIFF with a single Orientation entry in IFD0.
fn exif_payload(orientation: u16) -> Vec<u8> {
    let mut p = b"Exif\0\0".to_vec();
    p.extend_from_slice(b"MM\x00\x2A");
    p.extend_from_slice(&8u32.to_be_bytes());
    p.extend_from_slice(&1u16.to_be_bytes());
    p.extend_from_slice(&0x0112u16.to_be_bytes());
    p.extend_from_slice(&3u16.to_be_bytes());
    p.extend_from_slice(&1u32.to_be_bytes());
    p.extend_from_slice(&orientation.to_be_bytes());
    p.extend_from_slice(&[0, 0]);
    p.extend_from_slice(&0u32.to_be_bytes());
    p
}

/// Insert an APP1 segment right after the encoder's APP0.
fn with_orientation(jpeg: &[u8], orientation: u16) -> Vec<u8> {
    assert_eq!(&jpeg[2..4], &[0xFF, 0xE0]);
    let split = 4 + u16::from_be_bytes([jpeg[4], jpeg[5]]) as usize;

    let payload = exif_payload(orientation);
    let mut out = jpeg[..split].to_vec();
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&jpeg[split..]);
    out
}

fn lenient() -> CompressOptions {
    CompressOptions {
        strict: false,
        ..CompressOptions::default()
    }
}

fn is_reddish(p: Rgba<u8>) -> bool {
    p[0] > 180 && p[2] < 90
}

fn is_bluish(p: Rgba<u8>) -> bool {
    p[2] > 180 && p[0] < 90
}

// =========================================================================
// Orientation
// =========================================================================

#[tokio::test]
async fn oriented_jpeg_is_drawn_upright() {
    let input = with_orientation(&jpeg(&split_rgb(64, 32), 95), 6);
    let mut source = MemorySource::new("rotated.jpg", "image/jpeg", input);

    let result = compress(&mut source, lenient(), &RustBackend::new())
        .await
        .unwrap();

    assert_eq!(result.orientation.value(), 6);
    assert_eq!((result.width, result.height), (32, 64));

    let decoded = image::load_from_memory(&result.bytes).unwrap().into_rgba8();
    assert_eq!(decoded.dimensions(), (32, 64));
    // Rotated clockwise: the red left half is now on top
    assert!(is_reddish(*decoded.get_pixel(16, 8)));
    assert!(is_bluish(*decoded.get_pixel(16, 56)));
    // No Exif carried over by default
    assert!(ExifSegments::extract(&result.bytes).is_empty());
}

#[tokio::test]
async fn retained_exif_has_orientation_reset() {
    let input = with_orientation(&jpeg(&split_rgb(64, 32), 95), 8);
    let options = CompressOptions {
        retain_exif: true,
        ..lenient()
    };
    let mut source = MemorySource::new("rotated.jpg", "image/jpeg", input);

    let result = compress(&mut source, options, &RustBackend::new())
        .await
        .unwrap();

    assert!(result.exif_bytes > 0);
    assert_eq!(ExifSegments::extract(&result.bytes).count(), 1);
    assert_eq!(read_orientation(&result.bytes), OrientationCode::IDENTITY);
    assert!(image::load_from_memory(&result.bytes).is_ok());
}

#[tokio::test]
async fn orientation_left_alone_when_check_disabled() {
    let input = with_orientation(&jpeg(&split_rgb(64, 32), 95), 6);
    let options = CompressOptions {
        check_orientation: false,
        ..lenient()
    };
    let mut source = MemorySource::new("rotated.jpg", "image/jpeg", input);

    let result = compress(&mut source, options, &RustBackend::new())
        .await
        .unwrap();
    assert_eq!((result.width, result.height), (64, 32));
}

// =========================================================================
// Geometry
// =========================================================================

#[tokio::test]
async fn max_width_scales_down() {
    let mut source = MemorySource::new("a.jpg", "image/jpeg", jpeg(&split_rgb(400, 300), 90));
    let options = CompressOptions {
        max_width: Some(100.0),
        ..lenient()
    };

    let result = compress(&mut source, options, &RustBackend::new())
        .await
        .unwrap();

    assert_eq!((result.width, result.height), (100, 75));
    let decoded = image::load_from_memory(&result.bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (100, 75));
}

#[tokio::test]
async fn contain_letterboxes_with_transparency() {
    let img = RgbaImage::from_pixel(80, 40, Rgba([255, 0, 0, 255]));
    let mut source = MemorySource::new("wide.png", "image/png", png(&img));
    let options = CompressOptions {
        width: Some(64.0),
        height: Some(64.0),
        resize: ResizeMode::Contain,
        ..lenient()
    };

    let result = compress(&mut source, options, &RustBackend::new())
        .await
        .unwrap();

    assert_eq!(result.mime_type, "image/png");
    let decoded = image::load_from_memory(&result.bytes).unwrap().into_rgba8();
    assert_eq!(decoded.dimensions(), (64, 64));
    // Bands above and below, image in the middle
    assert_eq!(decoded.get_pixel(32, 2)[3], 0);
    assert_eq!(decoded.get_pixel(32, 61)[3], 0);
    assert!(is_reddish(*decoded.get_pixel(32, 32)));
    assert_eq!(decoded.get_pixel(32, 32)[3], 255);
}

#[tokio::test]
async fn cover_crops_to_exact_size() {
    // Red | blue, 2:1; a square cover keeps the middle half
    let mut source = MemorySource::new("wide.jpg", "image/jpeg", jpeg(&split_rgb(128, 64), 95));
    let options = CompressOptions {
        width: Some(32.0),
        height: Some(32.0),
        resize: ResizeMode::Cover,
        ..lenient()
    };

    let result = compress(&mut source, options, &RustBackend::new())
        .await
        .unwrap();

    let decoded = image::load_from_memory(&result.bytes).unwrap().into_rgba8();
    assert_eq!(decoded.dimensions(), (32, 32));
    assert!(is_reddish(*decoded.get_pixel(4, 16)));
    assert!(is_bluish(*decoded.get_pixel(28, 16)));
}

// =========================================================================
// Output type and strict policy
// =========================================================================

#[tokio::test]
async fn large_png_is_converted_to_jpeg_on_white() {
    let img = RgbaImage::from_pixel(16, 16, Rgba([0, 0, 0, 0]));
    let mut source = MemorySource::new("clear.png", "image/png", png(&img));
    let options = CompressOptions {
        convert_size: 10,
        ..lenient()
    };

    let result = compress(&mut source, options, &RustBackend::new())
        .await
        .unwrap();

    assert_eq!(result.mime_type, "image/jpeg");
    let decoded = image::load_from_memory(&result.bytes).unwrap().into_rgb8();
    let p = decoded.get_pixel(8, 8);
    assert!(p[0] > 240 && p[1] > 240 && p[2] > 240, "expected white, got {p:?}");
}

#[tokio::test]
async fn requested_mime_type_is_used() {
    let mut source = MemorySource::new("a.jpg", "image/jpeg", jpeg(&split_rgb(32, 32), 90));
    let options = CompressOptions {
        mime_type: "image/png".into(),
        ..lenient()
    };

    let result = compress(&mut source, options, &RustBackend::new())
        .await
        .unwrap();
    assert_eq!(result.mime_type, "image/png");
    assert_eq!(
        image::guess_format(&result.bytes).unwrap(),
        image::ImageFormat::Png
    );
}

#[tokio::test]
async fn strict_keeps_already_small_original() {
    let input = jpeg(&noise_rgb(64, 64), 10);
    let options = CompressOptions {
        quality: pixpress::imaging::Quality::new(1.0),
        ..CompressOptions::default()
    };
    let mut source = MemorySource::new("small.jpg", "image/jpeg", input.clone());

    let result = compress(&mut source, options, &RustBackend::new())
        .await
        .unwrap();

    assert!(result.used_original);
    assert_eq!(result.bytes, input);
}

#[tokio::test]
async fn strict_original_reports_the_size_it_actually_has() {
    let input = with_orientation(&jpeg(&noise_rgb(64, 64), 10), 6);
    let options = CompressOptions {
        quality: pixpress::imaging::Quality::new(1.0),
        max_width: Some(60.0),
        ..CompressOptions::default()
    };
    let mut source = MemorySource::new("small.jpg", "image/jpeg", input);

    let result = compress(&mut source, options, &RustBackend::new())
        .await
        .unwrap();

    assert!(result.used_original);
    let decoded = image::load_from_memory(&result.bytes).unwrap();
    assert_eq!((result.width, result.height), (decoded.width(), decoded.height()));
    assert_eq!((result.width, result.height), (64, 64));
    assert_eq!(result.orientation, OrientationCode::IDENTITY);
}

// =========================================================================
// Oversized requests
// =========================================================================

#[tokio::test]
async fn width_beyond_u32_is_a_domain_error() {
    let img = RgbaImage::from_pixel(4, 3, Rgba([255, 0, 0, 255]));
    let options = CompressOptions {
        width: Some(1e10),
        ..lenient()
    };
    options.validate().unwrap();
    let mut source = MemorySource::new("tiny.png", "image/png", png(&img));

    let result = compress(&mut source, options, &RustBackend::new()).await;
    assert!(matches!(
        result,
        Err(CompressError::Domain(GeometryError::TooLarge { .. }))
    ));
}

#[tokio::test]
async fn canvas_too_large_to_allocate_is_a_render_error() {
    let img = RgbaImage::from_pixel(4, 3, Rgba([255, 0, 0, 255]));
    let options = CompressOptions {
        min_width: 1e6,
        min_height: 1e6,
        ..lenient()
    };
    options.validate().unwrap();
    let mut source = MemorySource::new("tiny.png", "image/png", png(&img));

    let backend = RustBackend::new();
    let mut pipeline = CompressionPipeline::new(&backend, options);
    let result = pipeline.run(&mut source).await;
    assert!(matches!(result, Err(CompressError::Render(_))));
    assert_eq!(pipeline.state(), PipelineState::Failed);
}

// =========================================================================
// Sources and concurrency
// =========================================================================

#[tokio::test]
async fn compresses_from_file() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("photo.jpg");
    std::fs::write(&path, jpeg(&noise_rgb(200, 100), 100)).unwrap();

    let mut source = FileSource::open(&path).await.unwrap();
    let options = CompressOptions {
        max_width: Some(50.0),
        ..CompressOptions::default()
    };
    let result = compress(&mut source, options, &RustBackend::new())
        .await
        .unwrap();

    assert!(!result.used_original);
    assert!(result.size() < result.original_size);
    assert_eq!((result.width, result.height), (50, 25));
}

#[tokio::test]
async fn extensionless_file_needs_an_explicit_type() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("upload");
    std::fs::write(&path, jpeg(&split_rgb(32, 16), 90)).unwrap();

    let mut guessed = FileSource::open(&path).await.unwrap();
    let result = compress(&mut guessed, lenient(), &RustBackend::new()).await;
    assert!(matches!(result, Err(CompressError::Validation(_))));

    let mut typed = FileSource::open(&path)
        .await
        .unwrap()
        .with_mime_type("image/jpeg");
    let result = compress(&mut typed, lenient(), &RustBackend::new())
        .await
        .unwrap();
    assert_eq!(result.mime_type, "image/jpeg");
    assert_eq!((result.width, result.height), (32, 16));
}

#[tokio::test]
async fn unsupported_input_type_fails_cleanly() {
    let mut source = MemorySource::new("a.avif", "image/avif", vec![0; 32]);
    let result = compress(&mut source, lenient(), &RustBackend::new()).await;
    assert!(matches!(result, Err(CompressError::Environment(_))));
}

#[tokio::test]
async fn pipelines_run_concurrently_and_abort_independently() {
    let backend = RustBackend::new();
    let input = jpeg(&split_rgb(48, 48), 90);

    let mut pipelines: Vec<_> = (0..3)
        .map(|_| CompressionPipeline::new(&backend, lenient()))
        .collect();
    pipelines[1].abort_handle().abort();

    let mut sources: Vec<_> = (0..3)
        .map(|i| MemorySource::new(format!("{i}.jpg"), "image/jpeg", input.clone()))
        .collect();

    let results = join_all(
        pipelines
            .iter_mut()
            .zip(sources.iter_mut())
            .map(|(pipeline, source)| pipeline.run(source)),
    )
    .await;

    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(CompressError::Aborted)));
    assert!(results[2].is_ok());
    assert_eq!(pipelines[0].state(), PipelineState::Done);
    assert_eq!(pipelines[1].state(), PipelineState::Aborted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pipelines_run_on_spawned_tasks() {
    let backend = Arc::new(RustBackend::new());
    let input = jpeg(&split_rgb(48, 48), 90);
    let handles: Vec<AbortHandle> = (0..2).map(|_| AbortHandle::default()).collect();
    handles[1].abort();

    let tasks: Vec<_> = handles
        .iter()
        .cloned()
        .enumerate()
        .map(|(i, abort)| {
            let backend = Arc::clone(&backend);
            let bytes = input.clone();
            tokio::spawn(async move {
                let mut source = MemorySource::new(format!("{i}.jpg"), "image/jpeg", bytes);
                CompressionPipeline::new(backend.as_ref(), lenient())
                    .with_abort_handle(abort)
                    .run(&mut source)
                    .await
            })
        })
        .collect();

    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(CompressError::Aborted)));
}
