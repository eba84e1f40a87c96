//! Creation options and encoder settings

use crate::encoder::{MAX_DIMENSION, MIN_DIMENSION};
use crate::error::InvalidOptions;
use std::path::{Path, PathBuf};

/// Upper bound on frames per task, keeps frame indices well inside `i64`
/// millisecond arithmetic
const MAX_TOTAL_FRAMES: f64 = (1u64 << 40) as f64;

/// Options for a single video creation request
///
/// Only constructible through [`VideoCreateOptions::new`], so every value in
/// circulation has an encodable size, a positive frame rate and at least one
/// frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoCreateOptions {
    width: u32,
    height: u32,
    fps: u32,
    duration: f64,
    output_path: PathBuf,
}

impl VideoCreateOptions {
    pub fn new<P: AsRef<Path>>(
        output_size: (u32, u32),
        fps: u32,
        duration: f64,
        output_path: P,
    ) -> Result<Self, InvalidOptions> {
        let (width, height) = output_size;
        if width == 0 || height == 0 {
            return Err(InvalidOptions::EmptySize { width, height });
        }
        let encodable = MIN_DIMENSION..=MAX_DIMENSION;
        if !encodable.contains(&width) || !encodable.contains(&height) {
            return Err(InvalidOptions::UnsupportedSize {
                width,
                height,
                min: MIN_DIMENSION,
                max: MAX_DIMENSION,
            });
        }
        if fps == 0 {
            return Err(InvalidOptions::ZeroFps);
        }
        if !duration.is_finite() || duration <= 0.0 {
            return Err(InvalidOptions::BadDuration(duration));
        }

        let frames = (fps as f64 * duration).round();
        if frames < 1.0 {
            return Err(InvalidOptions::NoFrames { fps, duration });
        }
        if frames > MAX_TOTAL_FRAMES {
            return Err(InvalidOptions::TooManyFrames { fps, duration });
        }

        Ok(Self {
            width,
            height,
            fps,
            duration,
            output_path: output_path.as_ref().to_path_buf(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn output_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Requested duration in seconds
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Number of frames to synthesize: `round(fps * duration)`
    pub fn total_frames(&self) -> u64 {
        (self.fps as f64 * self.duration).round() as u64
    }
}

/// Encoder tuning shared by all tasks of a creator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    /// Quality (0-100, where 100 is highest quality)
    pub quality: u8,
    /// Encoder speed preset (0 slowest - 10 fastest)
    pub speed: u8,
    /// Encoder worker threads, 0 picks automatically
    pub threads: usize,
    /// Frames the track input accepts before reporting it is not ready
    pub max_frames_in_flight: usize,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            quality: 70,
            speed: 6,
            threads: 0,
            max_frames_in_flight: 4,
        }
    }
}

impl EncoderSettings {
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.min(100);
        self
    }

    pub fn with_speed(mut self, speed: u8) -> Self {
        self.speed = speed.min(10);
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_max_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_frames_rounds() {
        let options = VideoCreateOptions::new((1280, 720), 30, 2.0, "/tmp/out.webm").unwrap();
        assert_eq!(options.total_frames(), 60);

        let options = VideoCreateOptions::new((16, 16), 24, 1.02, "/tmp/out.webm").unwrap();
        assert_eq!(options.total_frames(), 24);

        let options = VideoCreateOptions::new((16, 16), 10, 0.24, "/tmp/out.webm").unwrap();
        assert_eq!(options.total_frames(), 2);
    }

    #[test]
    fn test_rejects_degenerate_options() {
        assert_eq!(
            VideoCreateOptions::new((0, 720), 30, 1.0, "out.webm"),
            Err(InvalidOptions::EmptySize {
                width: 0,
                height: 720
            })
        );
        assert_eq!(
            VideoCreateOptions::new((16, 16), 0, 1.0, "out.webm"),
            Err(InvalidOptions::ZeroFps)
        );
        assert!(matches!(
            VideoCreateOptions::new((16, 16), 30, 0.0, "out.webm"),
            Err(InvalidOptions::BadDuration(_))
        ));
        assert!(matches!(
            VideoCreateOptions::new((16, 16), 30, f64::NAN, "out.webm"),
            Err(InvalidOptions::BadDuration(_))
        ));
        assert!(matches!(
            VideoCreateOptions::new((16, 16), 1, 0.2, "out.webm"),
            Err(InvalidOptions::NoFrames { .. })
        ));
    }

    #[test]
    fn test_rejects_sizes_the_encoder_cannot_take() {
        for size in [(8, 8), (15, 720), (1280, 8), (70000, 720)] {
            assert_eq!(
                VideoCreateOptions::new(size, 30, 1.0, "out.webm"),
                Err(InvalidOptions::UnsupportedSize {
                    width: size.0,
                    height: size.1,
                    min: 16,
                    max: 65535
                }),
                "{:?}",
                size
            );
        }
        assert!(VideoCreateOptions::new((16, 65535), 30, 1.0, "out.webm").is_ok());
    }

    #[test]
    fn test_settings_clamp() {
        let settings = EncoderSettings::default()
            .with_quality(250)
            .with_speed(99)
            .with_max_frames_in_flight(0);
        assert_eq!(settings.quality, 100);
        assert_eq!(settings.speed, 10);
        assert_eq!(settings.max_frames_in_flight, 1);
    }
}
