//! stillvid - Still image to video library
//!
//! This library turns one still image into a video of a given duration and
//! frame rate:
//! - `VideoCreator::create_video`: queue a creation, with progress and a
//!   completion callback
//! - `VideoCreator::create_video_blocking`: the same, waiting for the result
//!
//! Output is AV1 in a WebM container.

pub mod creator;
pub mod encoder;
pub mod error;
pub mod ffi;
pub mod muxer;
pub mod options;
pub mod pixel;
pub mod queue;
pub mod synthesis;
pub mod task;
pub mod time;
pub mod writer;

pub use creator::{FileSystem, StdFileSystem, VideoCreator};
pub use error::{InvalidOptions, Result, VideoCreatorError};
pub use options::{EncoderSettings, VideoCreateOptions};
pub use pixel::{PixelFormat, StillImage};
pub use queue::{TaskHandle, TaskQueue};
pub use task::{CancellationToken, ProgressFn, VideoAsset, VideoCreateTask};
pub use time::{FrameSchedule, PresentationTime};
pub use writer::{SessionStatus, WriterSession};

/// Video codec types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub enum Codec {
    /// AV1 codec (using rav1e)
    Av1 = 0,
}

/// Container format types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub enum Container {
    /// WebM container
    WebM = 0,
}

impl Container {
    /// Check if the container supports the given codec
    pub fn supports_codec(&self, codec: Codec) -> bool {
        match (self, codec) {
            (Container::WebM, Codec::Av1) => true,
        }
    }

    /// Conventional file extension
    pub fn extension(&self) -> &'static str {
        match self {
            Container::WebM => "webm",
        }
    }
}
