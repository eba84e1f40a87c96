//! Common test utilities

#![allow(dead_code)]

use image::{ImageBuffer, Rgba, RgbaImage};
use std::path::Path;

/// Generate a test image with a solid color and optional gradient
pub fn generate_test_image(width: u32, height: u32, base_color: [u8; 4]) -> RgbaImage {
    let mut img = ImageBuffer::new(width, height);

    for (x, y, pixel) in img.enumerate_pixels_mut() {
        // subtle gradient so scaling has something to do
        let r = base_color[0].saturating_add((x % 50) as u8);
        let g = base_color[1].saturating_add((y % 50) as u8);
        let b = base_color[2];
        let a = base_color[3];
        *pixel = Rgba([r, g, b, a]);
    }

    img
}

/// Save a test image as JPEG
pub fn save_jpeg<P: AsRef<Path>>(img: &RgbaImage, path: P, quality: u8) -> std::io::Result<()> {
    // JPEG has no alpha
    let rgb_img: image::RgbImage = image::DynamicImage::ImageRgba8(img.clone()).to_rgb8();

    let file = std::fs::File::create(path)?;
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(file, quality);
    encoder
        .encode_image(&rgb_img)
        .map_err(std::io::Error::other)?;

    Ok(())
}

/// Save a test image as PNG
pub fn save_png<P: AsRef<Path>>(img: &RgbaImage, path: P) -> std::io::Result<()> {
    img.save(path).map_err(std::io::Error::other)
}

/// Verify that a file exists and has non-zero size
pub fn verify_file_exists_with_size<P: AsRef<Path>>(path: P) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => meta.len() > 0,
        Err(_) => false,
    }
}

/// Parse WebM header to verify it's a valid WebM file
pub fn verify_webm_header<P: AsRef<Path>>(path: P) -> bool {
    match std::fs::read(path) {
        // WebM starts with EBML header: 0x1A 0x45 0xDF 0xA3
        Ok(bytes) => bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]),
        Err(_) => false,
    }
}

/// What the tests need to know about a written WebM file
#[derive(Debug, Default)]
pub struct WebmSummary {
    pub doc_type: String,
    pub timestamp_scale_ns: u64,
    pub duration_ms: f64,
    pub codec_id: String,
    pub codec_private_len: usize,
    pub width: u64,
    pub height: u64,
    /// Absolute timestamp of every SimpleBlock, in file order
    pub block_timestamps_ms: Vec<i64>,
    pub keyframes: usize,
}

/// Read an EBML variable-length integer. IDs keep their length marker,
/// sizes do not.
fn read_vint(bytes: &[u8], keep_marker: bool) -> Option<(u64, usize)> {
    let first = *bytes.first()?;
    let len = first.leading_zeros() as usize + 1;
    if len > 8 || bytes.len() < len {
        return None;
    }
    let mut value = if keep_marker {
        first as u64
    } else {
        (first as u64) & (0xFF >> len)
    };
    for b in &bytes[1..len] {
        value = (value << 8) | *b as u64;
    }
    Some((value, len))
}

/// Split `data` into its child elements. An unknown size runs to the end of
/// the parent.
fn children(mut data: &[u8]) -> Vec<(u32, &[u8])> {
    let mut out = Vec::new();
    while !data.is_empty() {
        let Some((id, id_len)) = read_vint(data, true) else {
            break;
        };
        let Some((size, size_len)) = read_vint(&data[id_len..], false) else {
            break;
        };
        let start = id_len + size_len;
        let unknown = size == (1u64 << (7 * size_len)) - 1;
        let end = if unknown {
            data.len()
        } else {
            (start + size as usize).min(data.len())
        };
        out.push((id as u32, &data[start..end]));
        data = &data[end..];
    }
    out
}

fn read_uint(data: &[u8]) -> u64 {
    data.iter().fold(0, |acc, b| (acc << 8) | *b as u64)
}

fn read_float(data: &[u8]) -> f64 {
    match data.len() {
        4 => f32::from_be_bytes([data[0], data[1], data[2], data[3]]) as f64,
        8 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(data);
            f64::from_be_bytes(raw)
        }
        _ => f64::NAN,
    }
}

/// Walk a WebM file and collect header fields and block timestamps
pub fn parse_webm<P: AsRef<Path>>(path: P) -> WebmSummary {
    let bytes = std::fs::read(path).expect("read webm");
    let mut summary = WebmSummary::default();

    for (id, data) in children(&bytes) {
        match id {
            0x1A45DFA3 => {
                for (id, data) in children(data) {
                    if id == 0x4282 {
                        summary.doc_type = String::from_utf8_lossy(data).into_owned();
                    }
                }
            }
            0x18538067 => parse_segment(data, &mut summary),
            _ => {}
        }
    }

    summary
}

fn parse_segment(data: &[u8], summary: &mut WebmSummary) {
    for (id, data) in children(data) {
        match id {
            // Info
            0x1549A966 => {
                for (id, data) in children(data) {
                    match id {
                        0x2AD7B1 => summary.timestamp_scale_ns = read_uint(data),
                        0x4489 => summary.duration_ms = read_float(data),
                        _ => {}
                    }
                }
            }
            // Tracks
            0x1654AE6B => {
                for (_, entry) in children(data) {
                    for (id, data) in children(entry) {
                        match id {
                            0x86 => summary.codec_id = String::from_utf8_lossy(data).into_owned(),
                            0x63A2 => summary.codec_private_len = data.len(),
                            0xE0 => {
                                for (id, data) in children(data) {
                                    match id {
                                        0xB0 => summary.width = read_uint(data),
                                        0xBA => summary.height = read_uint(data),
                                        _ => {}
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
            // Cluster
            0x1F43B675 => {
                let mut cluster_ts = 0i64;
                for (id, data) in children(data) {
                    match id {
                        0xE7 => cluster_ts = read_uint(data) as i64,
                        0xA3 => {
                            let relative = i16::from_be_bytes([data[1], data[2]]) as i64;
                            summary.block_timestamps_ms.push(cluster_ts + relative);
                            if data[3] & 0x80 != 0 {
                                summary.keyframes += 1;
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generate_test_image() {
        let img = generate_test_image(100, 100, [255, 0, 0, 255]);
        assert_eq!(img.width(), 100);
        assert_eq!(img.height(), 100);
    }

    #[test]
    fn test_save_png() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.png");

        let img = generate_test_image(100, 100, [255, 0, 0, 255]);
        save_png(&img, &path).unwrap();

        assert!(verify_file_exists_with_size(&path));
    }

    #[test]
    fn test_read_vint() {
        assert_eq!(read_vint(&[0x81], false), Some((1, 1)));
        assert_eq!(read_vint(&[0x40, 0x02], false), Some((2, 2)));
        assert_eq!(read_vint(&[0x1A, 0x45, 0xDF, 0xA3], true), Some((0x1A45DFA3, 4)));
    }
}
