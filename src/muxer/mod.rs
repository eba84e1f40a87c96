//! Video container muxers

pub mod webm;

use crate::encoder::Packet;
use crate::error::MediaError;
use crate::time::PresentationTime;

pub use webm::WebmMuxer;

/// Video muxer trait
pub trait Muxer: Send {
    /// Write a video packet presented at `timestamp`
    fn write_packet(&mut self, packet: &Packet, timestamp: PresentationTime)
        -> Result<(), MediaError>;

    /// Finalize the output; `duration` is the end of the last frame
    fn finalize(self: Box<Self>, duration: PresentationTime) -> Result<(), MediaError>;
}

/// Muxer configuration
#[derive(Debug, Clone)]
pub struct MuxerConfig {
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Frame rate (fps)
    pub fps: u32,
    /// Codec-specific configuration record
    pub codec_config: Option<Vec<u8>>,
}
