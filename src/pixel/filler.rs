//! Rasterizing a still image into pixel buffers

use super::{FrameBuffer, PixelFormat};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageReader, RgbaImage};
use std::borrow::Cow;
use std::path::Path;
use thiserror::Error;

/// Reasons a buffer could not be filled
#[derive(Error, Debug)]
pub enum FillError {
    /// The source has no decodable pixel data
    #[error("image could not be decoded: {0}")]
    Undecodable(#[from] image::ImageError),

    /// The decoded image has no pixels
    #[error("image has no pixels")]
    Empty,
}

#[derive(Debug, Clone)]
enum Source {
    Decoded(DynamicImage),
    Encoded(Vec<u8>),
}

/// The source still image for a video
///
/// Either already decoded, or encoded bytes that are decoded when a buffer is
/// first filled.
#[derive(Debug, Clone)]
pub struct StillImage {
    source: Source,
}

impl StillImage {
    /// Load and decode an image file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, image::ImageError> {
        let img = ImageReader::open(path.as_ref())?
            .with_guessed_format()?
            .decode()?;
        Ok(Self::from_dynamic_image(img))
    }

    /// Create from a DynamicImage
    pub fn from_dynamic_image(img: DynamicImage) -> Self {
        Self {
            source: Source::Decoded(img),
        }
    }

    /// Wrap encoded bytes (PNG, JPEG, ...) without decoding them yet
    pub fn from_encoded(bytes: Vec<u8>) -> Self {
        Self {
            source: Source::Encoded(bytes),
        }
    }

    /// Wrap raw straight-alpha RGBA pixels
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        RgbaImage::from_raw(width, height, data)
            .map(|img| Self::from_dynamic_image(DynamicImage::ImageRgba8(img)))
    }

    /// Dimensions, if the image is already decoded
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match &self.source {
            Source::Decoded(img) => Some(img.dimensions()),
            Source::Encoded(_) => None,
        }
    }

    /// Decoded pixels, decoding on demand
    pub fn decode(&self) -> Result<Cow<'_, DynamicImage>, FillError> {
        let img = match &self.source {
            Source::Decoded(img) => Cow::Borrowed(img),
            Source::Encoded(bytes) => Cow::Owned(image::load_from_memory(bytes)?),
        };
        if img.width() == 0 || img.height() == 0 {
            return Err(FillError::Empty);
        }
        Ok(img)
    }
}

/// Fills frame buffers with one still image, scaled and center-cropped to
/// cover the buffer exactly
///
/// The scaled, premultiplied image is computed once per buffer size and
/// reused for every following frame.
#[derive(Debug)]
pub struct PixelBufferFiller {
    image: StillImage,
    scaled: Option<RgbaImage>,
}

impl PixelBufferFiller {
    pub fn new(image: StillImage) -> Self {
        Self {
            image,
            scaled: None,
        }
    }

    /// Write the image into `buffer` using its format, stride and size.
    ///
    /// On error the buffer is left untouched.
    pub fn fill(&mut self, buffer: &mut FrameBuffer) -> Result<(), FillError> {
        let (width, height) = (buffer.width(), buffer.height());
        let format = buffer.format();
        let scaled = self.scaled_for(width, height)?;

        for y in 0..height {
            let row_bytes = width as usize * 4;
            let start = y as usize * row_bytes;
            let src = &scaled.as_raw()[start..start + row_bytes];
            let dst = buffer.row_mut(y);
            for (s, d) in src
                .chunks_exact(4)
                .zip(dst.chunks_exact_mut(PixelFormat::BYTES_PER_PIXEL))
            {
                format.store([s[0], s[1], s[2], s[3]], d);
            }
        }

        Ok(())
    }

    fn scaled_for(&mut self, width: u32, height: u32) -> Result<&RgbaImage, FillError> {
        let stale = self
            .scaled
            .as_ref()
            .map_or(true, |img| img.dimensions() != (width, height));

        if stale {
            let decoded = self.image.decode()?;
            let covered = if decoded.dimensions() == (width, height) {
                decoded.to_rgba8()
            } else {
                decoded
                    .resize_to_fill(width, height, FilterType::Lanczos3)
                    .to_rgba8()
            };
            self.scaled = Some(premultiply(covered));
        }

        self.scaled.as_ref().ok_or(FillError::Empty)
    }
}

fn premultiply(mut img: RgbaImage) -> RgbaImage {
    for px in img.pixels_mut() {
        let a = px[3] as u16;
        if a == 255 {
            continue;
        }
        for c in &mut px.0[..3] {
            *c = ((*c as u16 * a + 127) / 255) as u8;
        }
    }
    img
}
