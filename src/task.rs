//! One video creation request and what it resolves to

use crate::creator::FileSystem;
use crate::error::{Result, VideoCreatorError};
use crate::options::{EncoderSettings, VideoCreateOptions};
use crate::pixel::{PixelBufferFiller, StillImage};
use crate::synthesis;
use crate::time::{FrameSchedule, PresentationTime};
use crate::writer::{TrackInputSettings, WriterSession};
use crate::Codec;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Progress callback, called with values in `(0, 1]`
pub type ProgressFn = Box<dyn FnMut(f64) + Send>;

/// Completion callback, called exactly once per task
pub type CompletionFn = Box<dyn FnOnce(Result<VideoAsset>) + Send>;

/// Shared cancellation flag
///
/// Cloning hands out another reference to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A finished video on disk
#[derive(Debug, Clone, PartialEq)]
pub struct VideoAsset {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub frame_count: u64,
    /// End time of the last frame
    pub duration: PresentationTime,
}

impl VideoAsset {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration.seconds()
    }
}

/// A single still-image-to-video job
///
/// Running it clears the destination, opens a writer session, drives the
/// frame synthesis loop and finalizes the file.
pub struct VideoCreateTask {
    image: StillImage,
    options: VideoCreateOptions,
    settings: EncoderSettings,
    file_system: Arc<dyn FileSystem>,
    progress: Option<ProgressFn>,
    cancel: CancellationToken,
}

impl VideoCreateTask {
    pub fn new(
        image: StillImage,
        options: VideoCreateOptions,
        settings: EncoderSettings,
        file_system: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            image,
            options,
            settings,
            file_system,
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Share an existing flag instead of the task's own
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn options(&self) -> &VideoCreateOptions {
        &self.options
    }

    /// Run to completion on the calling thread
    pub fn run(self) -> Result<VideoAsset> {
        let Self {
            image,
            options,
            settings,
            file_system,
            progress,
            cancel,
        } = self;
        let mut progress: ProgressFn = progress.unwrap_or_else(|| Box::new(|_: f64| {}));
        let path = options.output_path();

        if cancel.is_cancelled() {
            return Err(VideoCreatorError::Cancelled);
        }

        log::info!(
            "creating {}x{} @ {} fps, {}s video at {}",
            options.width(),
            options.height(),
            options.fps(),
            options.duration(),
            path.display()
        );

        if file_system.exists(path) {
            file_system
                .remove_file(path)
                .map_err(VideoCreatorError::OutputPathNotEmpty)?;
            log::debug!("removed existing file at {}", path.display());
        }

        let mut session = WriterSession::create(path, options.fps(), settings)?;
        session.add_input(TrackInputSettings {
            codec: Codec::Av1,
            width: options.width(),
            height: options.height(),
        })?;
        session.start_writing()?;

        let (frame_count, duration) = write_and_finish(
            &mut session,
            image,
            &options,
            &cancel,
            &mut *progress,
        )?;
        progress(1.0);

        log::info!(
            "created {} ({} frames, {:.3}s)",
            path.display(),
            frame_count,
            duration.seconds()
        );

        Ok(VideoAsset {
            path: path.to_path_buf(),
            width: options.width(),
            height: options.height(),
            fps: options.fps(),
            frame_count,
            duration,
        })
    }
}

/// Drive the frame loop over a started session and settle it: finished on
/// success, cancelled or failed otherwise
fn write_and_finish(
    session: &mut WriterSession,
    image: StillImage,
    options: &VideoCreateOptions,
    cancel: &CancellationToken,
    progress: &mut dyn FnMut(f64),
) -> Result<(u64, PresentationTime)> {
    let schedule = FrameSchedule::new(options.fps(), options.total_frames());
    let mut filler = PixelBufferFiller::new(image);

    let frame_count = match synthesis::write_frames(session, &mut filler, schedule, cancel, progress)
    {
        Ok(count) => count,
        Err(e) if e.is_cancelled() => {
            session.cancel_writing();
            log::warn!("video creation cancelled: {}", session.path().display());
            return Err(e);
        }
        Err(e) => {
            session.fail_writing();
            log::warn!("video creation failed: {}", e);
            return Err(e);
        }
    };

    // finalization is not interruptible
    let duration = session.finish_writing().inspect_err(|e| {
        log::warn!("video creation failed: {}", e);
    })?;
    Ok((frame_count, duration))
}
