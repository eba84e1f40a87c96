//! Raw pixel buffers and their formats

pub mod filler;
pub mod pool;

pub use filler::{FillError, PixelBufferFiller, StillImage};
pub use pool::{PixelBufferPool, PoolAttributes, PooledBuffer};

/// Byte order of a 4-byte pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgba,
    Bgra,
    Argb,
    Abgr,
}

impl PixelFormat {
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Byte offsets of the red, green, blue and alpha channels
    pub const fn offsets(self) -> [usize; 4] {
        match self {
            PixelFormat::Rgba => [0, 1, 2, 3],
            PixelFormat::Bgra => [2, 1, 0, 3],
            PixelFormat::Argb => [1, 2, 3, 0],
            PixelFormat::Abgr => [3, 2, 1, 0],
        }
    }

    /// Write one straight RGBA pixel into `dst` in this format
    #[inline]
    pub fn store(self, rgba: [u8; 4], dst: &mut [u8]) {
        let [r, g, b, a] = self.offsets();
        dst[r] = rgba[0];
        dst[g] = rgba[1];
        dst[b] = rgba[2];
        dst[a] = rgba[3];
    }

    /// Read one pixel from `src` as RGBA
    #[inline]
    pub fn load(self, src: &[u8]) -> [u8; 4] {
        let [r, g, b, a] = self.offsets();
        [src[r], src[g], src[b], src[a]]
    }
}

/// A mutable raw pixel buffer
///
/// Rows are `stride` bytes apart; bytes past `width * 4` in each row are
/// padding and never written by the filler.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Allocate a zeroed buffer. `stride` is raised to at least one full row.
    pub fn new(width: u32, height: u32, stride: usize, format: PixelFormat) -> Option<Self> {
        let row = (width as usize).checked_mul(PixelFormat::BYTES_PER_PIXEL)?;
        let stride = stride.max(row);
        let len = stride.checked_mul(height as usize)?;
        Some(Self {
            width,
            height,
            stride,
            format,
            data: vec![0; len],
        })
    }

    /// Zero-sized stand-in left behind when a pooled buffer goes home
    pub(crate) fn detached() -> Self {
        Self {
            width: 0,
            height: 0,
            stride: 0,
            format: PixelFormat::Rgba,
            data: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Pixel bytes of row `y`, without padding
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * PixelFormat::BYTES_PER_PIXEL]
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        let end = start + self.width as usize * PixelFormat::BYTES_PER_PIXEL;
        &mut self.data[start..end]
    }

    /// RGBA value at `(x, y)`
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = x as usize * PixelFormat::BYTES_PER_PIXEL;
        self.format.load(&self.row(y)[offset..offset + 4])
    }
}
