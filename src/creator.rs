//! Video creation service

use crate::error::{Result, VideoCreatorError};
use crate::options::{EncoderSettings, VideoCreateOptions};
use crate::pixel::StillImage;
use crate::queue::{TaskHandle, TaskQueue};
use crate::task::{ProgressFn, VideoAsset, VideoCreateTask};
use std::io;
use std::path::Path;
use std::sync::Arc;

/// File-existence and removal capability used to clear the destination
pub trait FileSystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// [`FileSystem`] backed by `std::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn exists(&self, path: &Path) -> bool {
        // an unreadable entry is reported as present so removal surfaces the error
        path.try_exists().unwrap_or(true)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }
}

/// Turns still images into videos, one at a time
///
/// Every request goes through the creator's own [`TaskQueue`], so at most
/// one video is being written at any moment and requests run in submission
/// order.
///
/// # Example
///
/// ```no_run
/// use stillvid::{StillImage, VideoCreateOptions, VideoCreator};
///
/// let creator = VideoCreator::new();
/// let image = StillImage::from_path("cover.png").unwrap();
/// let options = VideoCreateOptions::new((1280, 720), 30, 2.0, "/tmp/out.webm").unwrap();
///
/// let asset = creator.create_video_blocking(image, options, None).unwrap();
/// assert_eq!(asset.frame_count, 60);
/// ```
pub struct VideoCreator {
    settings: EncoderSettings,
    file_system: Arc<dyn FileSystem>,
    queue: TaskQueue,
}

impl VideoCreator {
    pub fn new() -> Self {
        Self::with_settings(EncoderSettings::default())
    }

    pub fn with_settings(settings: EncoderSettings) -> Self {
        Self {
            settings,
            file_system: Arc::new(StdFileSystem),
            queue: TaskQueue::new(),
        }
    }

    /// Replace the file system used to clear destinations
    pub fn with_file_system(mut self, file_system: Arc<dyn FileSystem>) -> Self {
        self.file_system = file_system;
        self
    }

    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    /// Queue a video of `image` held for `options.duration()` seconds.
    ///
    /// `progress` and `completion` are called on the queue's worker thread.
    /// `completion` is called exactly once.
    pub fn create_video<C>(
        &self,
        image: StillImage,
        options: VideoCreateOptions,
        progress: Option<ProgressFn>,
        completion: C,
    ) -> TaskHandle
    where
        C: FnOnce(Result<VideoAsset>) + Send + 'static,
    {
        let mut task =
            VideoCreateTask::new(image, options, self.settings, Arc::clone(&self.file_system));
        if let Some(progress) = progress {
            task = task.with_progress(progress);
        }
        self.queue.submit(task, Box::new(completion))
    }

    /// Queue a video and wait for it
    ///
    /// Never call this from a progress or completion callback of the same
    /// creator: it would wait on the worker thread it is running on.
    pub fn create_video_blocking(
        &self,
        image: StillImage,
        options: VideoCreateOptions,
        progress: Option<ProgressFn>,
    ) -> Result<VideoAsset> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.create_video(image, options, progress, move |result| {
            let _ = tx.send(result);
        });
        rx.recv().unwrap_or_else(|_| {
            log::error!("task dropped without completing");
            Err(VideoCreatorError::Cancelled)
        })
    }

    /// Cancel every queued and running request
    pub fn cancel_all(&self) {
        self.queue.cancel_all();
    }

    pub fn pending_count(&self) -> usize {
        self.queue.pending_count()
    }
}

impl Default for VideoCreator {
    fn default() -> Self {
        Self::new()
    }
}
