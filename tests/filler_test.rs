//! Integration tests for loading still images and filling pooled buffers

mod common;

use common::*;
use stillvid::pixel::{PixelBufferFiller, PixelBufferPool, PoolAttributes};
use stillvid::{PixelFormat, StillImage};
use tempfile::TempDir;

fn pool(width: u32, height: u32, format: PixelFormat) -> PixelBufferPool {
    PixelBufferPool::new(
        PoolAttributes {
            width,
            height,
            format,
        },
        2,
    )
    .unwrap()
}

/// Test loading a JPEG image
#[test]
fn test_load_jpeg() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.jpg");

    let original = generate_test_image(200, 150, [255, 128, 64, 255]);
    save_jpeg(&original, &path, 85).unwrap();

    let loaded = StillImage::from_path(&path).unwrap();
    assert_eq!(loaded.dimensions(), Some((200, 150)));
}

/// Test loading a PNG image
#[test]
fn test_load_png() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.png");

    let original = generate_test_image(200, 150, [255, 128, 64, 255]);
    save_png(&original, &path).unwrap();

    let loaded = StillImage::from_path(&path).unwrap();
    assert_eq!(loaded.dimensions(), Some((200, 150)));
}

/// Test loading a non-existent file
#[test]
fn test_load_nonexistent() {
    assert!(StillImage::from_path("/nonexistent/path/image.png").is_err());
}

/// Encoded bytes are only decoded when a buffer is filled
#[test]
fn test_encoded_image_decodes_lazily() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("lazy.png");
    save_png(&generate_test_image(10, 10, [0, 0, 255, 255]), &path).unwrap();

    let image = StillImage::from_encoded(std::fs::read(&path).unwrap());
    assert_eq!(image.dimensions(), None);

    let pool = pool(10, 10, PixelFormat::Rgba);
    let mut buffer = pool.acquire_buffer().unwrap();
    PixelBufferFiller::new(image).fill(&mut buffer).unwrap();
    assert_eq!(buffer.pixel(0, 0), [0, 0, 255, 255]);
}

/// Scaling covers the buffer: every pixel is written, for up- and downscales
/// and aspect changes
#[test]
fn test_fill_covers_any_target_size() {
    let image = StillImage::from_dynamic_image(image::DynamicImage::ImageRgba8(
        generate_test_image(300, 100, [10, 200, 30, 255]),
    ));
    let mut filler = PixelBufferFiller::new(image);

    for (width, height) in [(64, 48), (640, 480), (100, 300), (1, 1)] {
        let pool = pool(width, height, PixelFormat::Argb);
        let mut buffer = pool.acquire_buffer().unwrap();
        filler.fill(&mut buffer).unwrap();

        for y in 0..height {
            for x in 0..width {
                // buffers start zeroed; opaque alpha means the pixel was written
                assert_eq!(buffer.pixel(x, y)[3], 255, "{}x{} at {},{}", width, height, x, y);
            }
        }
    }
}

/// The same image lands in every channel order
#[test]
fn test_fill_respects_format() {
    let image = StillImage::from_rgba(1, 1, vec![10, 20, 30, 255]).unwrap();
    let mut filler = PixelBufferFiller::new(image);

    for format in [
        PixelFormat::Rgba,
        PixelFormat::Bgra,
        PixelFormat::Argb,
        PixelFormat::Abgr,
    ] {
        let pool = pool(4, 4, format);
        let mut buffer = pool.acquire_buffer().unwrap();
        filler.fill(&mut buffer).unwrap();
        assert_eq!(buffer.pixel(2, 3), [10, 20, 30, 255], "{:?}", format);
    }
}

/// A translucent PNG is premultiplied on the way in
#[test]
fn test_load_png_with_alpha() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("alpha.png");
    let img = image::RgbaImage::from_pixel(4, 4, image::Rgba([255, 255, 255, 51]));
    save_png(&img, &path).unwrap();

    let pool = pool(4, 4, PixelFormat::Argb);
    let mut buffer = pool.acquire_buffer().unwrap();
    PixelBufferFiller::new(StillImage::from_path(&path).unwrap())
        .fill(&mut buffer)
        .unwrap();

    assert_eq!(buffer.pixel(1, 1), [51, 51, 51, 51]);
}

/// A failed fill leaves the buffer as it was
#[test]
fn test_undecodable_fill_leaves_buffer() {
    let pool = pool(8, 8, PixelFormat::Argb);
    let mut buffer = pool.acquire_buffer().unwrap();
    buffer.data_mut().fill(7);

    let mut filler = PixelBufferFiller::new(StillImage::from_encoded(vec![1, 2, 3]));
    assert!(filler.fill(&mut buffer).is_err());
    assert!(buffer.data().iter().all(|b| *b == 7));
}
