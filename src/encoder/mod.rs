//! Video encoders

pub mod av1;

use crate::error::MediaError;
use crate::pixel::{FrameBuffer, PixelFormat};

pub use av1::Av1Encoder;

/// Encoded video packet
#[derive(Debug, Clone)]
pub struct Packet {
    /// Encoded data
    pub data: Vec<u8>,
    /// Index of the input frame this packet presents
    pub frame_index: u64,
    /// Is this a keyframe?
    pub is_keyframe: bool,
}

/// Video encoder trait
///
/// Packets come out in presentation order, each tagged with the index of the
/// frame that produced it.
pub trait Encoder: Send {
    /// Encode a frame
    fn encode(&mut self, frame: &FrameBuffer) -> Result<Vec<Packet>, MediaError>;

    /// Flush remaining packets
    fn flush(&mut self) -> Result<Vec<Packet>, MediaError>;

    /// Codec configuration record for the container, if the codec has one
    fn codec_config(&self) -> Option<Vec<u8>> {
        None
    }
}

/// Encoder configuration
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Frame rate (frames per second)
    pub fps: u32,
    /// Quality (0-100)
    pub quality: u8,
    /// Speed preset (0-10)
    pub speed: u8,
    /// Worker threads, 0 for automatic
    pub threads: usize,
}

/// Pixel format the encoders expect in their input buffers
pub const INPUT_PIXEL_FORMAT: PixelFormat = PixelFormat::Argb;

/// Smallest frame width or height the AV1 encoder accepts
pub const MIN_DIMENSION: u32 = 16;

/// Largest frame width or height the AV1 encoder accepts
pub const MAX_DIMENSION: u32 = 65535;

/// Create the encoder for the fixed output codec
pub fn create_encoder(config: EncoderConfig) -> Result<Box<dyn Encoder>, MediaError> {
    Ok(Box::new(Av1Encoder::new(config)?))
}
