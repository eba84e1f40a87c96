//! Container writer session

pub mod input;

use crate::encoder::{create_encoder, Encoder, EncoderConfig, INPUT_PIXEL_FORMAT};
use crate::error::{Result, VideoCreatorError};
use crate::muxer::{MuxerConfig, WebmMuxer};
use crate::options::EncoderSettings;
use crate::pixel::{PixelBufferPool, PoolAttributes};
use crate::time::PresentationTime;
use crate::Container;
use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

pub use input::{Readiness, TrackInput, TrackInputSettings};

use input::EncodedTrack;

type EncoderThread = JoinHandle<EncodedTrack>;

/// Where a [`WriterSession`] is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Output file open, not writing yet
    Idle,
    Writing,
    /// Output finalized and playable
    Finished,
    /// Writing stopped on an error; whatever was muxed is finalized but the
    /// file is incomplete
    Failed,
    /// Abandoned with [`WriterSession::cancel_writing`]
    Cancelled,
}

/// Owns the output file, the single video track input and the encoder thread
///
/// ```text
/// create -> add_input -> start_writing -> (append)* -> finish_writing
///                                              |-> fail_writing
///                                              \-> cancel_writing
/// ```
///
/// A session dropped before writing starts removes the file it created.
pub struct WriterSession {
    path: PathBuf,
    container: Container,
    fps: u32,
    settings: EncoderSettings,
    file: Option<File>,
    input: Option<TrackInput>,
    pool: Option<PixelBufferPool>,
    worker: Option<EncoderThread>,
    status: SessionStatus,
}

impl WriterSession {
    /// Create the output container at `path`, which must not exist yet
    pub fn create<P: AsRef<Path>>(path: P, fps: u32, settings: EncoderSettings) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(VideoCreatorError::CanNotCreateWriter)?;

        log::debug!("writer session created at {}", path.display());

        Ok(Self {
            path,
            container: Container::WebM,
            fps,
            settings,
            file: Some(file),
            input: None,
            pool: None,
            worker: None,
            status: SessionStatus::Idle,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Add the video track input. Only one input is accepted, and only
    /// before writing starts.
    pub fn add_input(&mut self, settings: TrackInputSettings) -> Result<()> {
        if self.status != SessionStatus::Idle {
            return Err(VideoCreatorError::CanNotAddInput(
                "writing has already begun".to_string(),
            ));
        }
        if self.input.is_some() {
            return Err(VideoCreatorError::CanNotAddInput(format!(
                "{:?} holds a single video track",
                self.container
            )));
        }
        if !self.container.supports_codec(settings.codec) {
            return Err(VideoCreatorError::CanNotAddInput(format!(
                "{:?} does not support {:?}",
                self.container, settings.codec
            )));
        }
        if settings.width == 0 || settings.height == 0 {
            return Err(VideoCreatorError::CanNotAddInput(format!(
                "invalid track size {}x{}",
                settings.width, settings.height
            )));
        }

        self.input = Some(TrackInput::new(
            settings,
            self.settings.max_frames_in_flight,
        ));
        Ok(())
    }

    /// Build the encoder, write the container header and start the encoder
    /// thread.
    ///
    /// The pixel buffer pool is created here too. A pool that cannot be built
    /// does not fail the start; [`pixel_buffer_pool`](Self::pixel_buffer_pool)
    /// returns `None` instead.
    pub fn start_writing(&mut self) -> Result<()> {
        if self.status != SessionStatus::Idle {
            return Err(VideoCreatorError::CanNotStartWriting(None));
        }
        let track = self
            .input
            .as_ref()
            .ok_or(VideoCreatorError::CanNotStartWriting(None))?
            .settings();

        let encoder = create_encoder(EncoderConfig {
            width: track.width,
            height: track.height,
            fps: self.fps,
            quality: self.settings.quality,
            speed: self.settings.speed,
            threads: self.settings.threads,
        })
        .map_err(|e| VideoCreatorError::CanNotStartWriting(Some(e.into())))?;

        self.start_writing_with(encoder)
    }

    /// [`start_writing`](Self::start_writing) with an already built encoder
    pub(crate) fn start_writing_with(&mut self, encoder: Box<dyn Encoder>) -> Result<()> {
        if self.status != SessionStatus::Idle {
            return Err(VideoCreatorError::CanNotStartWriting(None));
        }
        let input = self
            .input
            .as_mut()
            .ok_or(VideoCreatorError::CanNotStartWriting(None))?;
        let file = self
            .file
            .take()
            .ok_or(VideoCreatorError::CanNotStartWriting(None))?;
        let track = input.settings();

        let fail = |e: Box<dyn std::error::Error + Send + Sync>| {
            VideoCreatorError::CanNotStartWriting(Some(e))
        };

        let muxer = WebmMuxer::new(
            BufWriter::new(file),
            MuxerConfig {
                width: track.width,
                height: track.height,
                fps: self.fps,
                codec_config: encoder.codec_config(),
            },
        )
        .map_err(|e| fail(e.into()))?;

        let (frames, gate) = input.attach();
        let worker = std::thread::Builder::new()
            .name("stillvid-encoder".to_string())
            .spawn(move || input::run_encoder(encoder, Box::new(muxer), frames, gate))
            .map_err(|e| fail(e.into()))?;

        let attributes = PoolAttributes {
            width: track.width,
            height: track.height,
            format: INPUT_PIXEL_FORMAT,
        };
        self.pool = match PixelBufferPool::new(attributes, self.settings.max_frames_in_flight + 1) {
            Ok(pool) => Some(pool),
            Err(e) => {
                log::warn!("{}", e);
                None
            }
        };

        self.worker = Some(worker);
        self.status = SessionStatus::Writing;
        log::debug!(
            "writer session started: {}x{} @ {} fps",
            track.width,
            track.height,
            self.fps
        );
        Ok(())
    }

    /// Pool of buffers matching the track input, once writing has started
    pub fn pixel_buffer_pool(&self) -> Option<PixelBufferPool> {
        self.pool.clone()
    }

    pub fn input(&self) -> Option<&TrackInput> {
        self.input.as_ref()
    }

    pub fn input_mut(&mut self) -> Option<&mut TrackInput> {
        self.input.as_mut()
    }

    /// Close the track input, drain the encoder and finalize the container.
    ///
    /// Returns the end time of the last frame. Any encoding failure recorded
    /// while writing, or a failed finalization, leaves the session `Failed`.
    pub fn finish_writing(&mut self) -> Result<PresentationTime> {
        if self.status != SessionStatus::Writing {
            return Err(VideoCreatorError::BufferNotAppended(format!(
                "cannot finish a session that is {:?}",
                self.status
            )));
        }

        let (appended, end_time) = self.close_input();
        match self.drain_and_finalize(appended, end_time) {
            Ok(()) => {
                self.status = SessionStatus::Finished;
                log::debug!(
                    "writer session finished: {} frames, {:.3}s",
                    appended,
                    end_time.seconds()
                );
                Ok(end_time)
            }
            Err(reason) => {
                self.status = SessionStatus::Failed;
                Err(VideoCreatorError::BufferNotAppended(reason))
            }
        }
    }

    /// Stop writing after an error. Frames already queued are still encoded
    /// and the container is finalized as far as it got, then the session is
    /// left `Failed`.
    pub fn fail_writing(&mut self) {
        if self.status != SessionStatus::Writing {
            return;
        }
        let (appended, end_time) = self.close_input();
        if let Err(reason) = self.drain_and_finalize(appended, end_time) {
            log::debug!("encoder after failure: {}", reason);
        }
        self.status = SessionStatus::Failed;
        log::debug!(
            "writer session failed after {} frames: {}",
            appended,
            self.path.display()
        );
    }

    /// Abandon the session. Queued frames are dropped and the partially
    /// written file is left on disk unfinalized.
    pub fn cancel_writing(&mut self) {
        if self.status != SessionStatus::Writing {
            return;
        }
        if let Some(input) = self.input.as_mut() {
            input.abort();
        }
        match self.join_worker() {
            Ok(track) => {
                if let Some(e) = track.failure {
                    log::debug!("encoder stopped during cancellation: {}", e);
                }
            }
            Err(reason) => log::debug!("encoder stopped during cancellation: {}", reason),
        }
        self.status = SessionStatus::Cancelled;
        log::debug!("writer session cancelled: {}", self.path.display());
    }

    /// Mark the input finished; returns the frames it took and the end time
    /// of the last one
    fn close_input(&mut self) -> (u64, PresentationTime) {
        match self.input.as_mut() {
            Some(input) => {
                input.mark_as_finished();
                let end = input
                    .last_time()
                    .map(|t| t + PresentationTime::new(1, self.fps))
                    .unwrap_or(PresentationTime::zero(self.fps));
                (input.appended(), end)
            }
            None => (0, PresentationTime::zero(self.fps)),
        }
    }

    /// Wait for the encoder thread and finalize whatever it muxed.
    /// Finalization runs even when encoding failed.
    fn drain_and_finalize(
        &mut self,
        appended: u64,
        end_time: PresentationTime,
    ) -> std::result::Result<(), String> {
        let EncodedTrack {
            muxer,
            frames,
            failure,
        } = self.join_worker()?;

        let finalized = muxer
            .finalize(end_time)
            .map_err(|e| format!("finalization failed: {}", e));

        if let Some(e) = failure {
            return Err(e.to_string());
        }
        if frames != appended {
            return Err(format!("encoded {} of {} frames", frames, appended));
        }
        finalized
    }

    fn join_worker(&mut self) -> std::result::Result<EncodedTrack, String> {
        let worker = self
            .worker
            .take()
            .ok_or_else(|| "encoder thread not running".to_string())?;
        worker
            .join()
            .map_err(|_| "encoder thread panicked".to_string())
    }

    /// Remove the file this session created before anything was written to it
    fn discard_output(&mut self) {
        drop(self.file.take());
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::debug!("removed unused output {}", self.path.display()),
            Err(e) => log::warn!(
                "failed to remove unused output {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

impl Drop for WriterSession {
    fn drop(&mut self) {
        match self.status {
            SessionStatus::Writing => self.cancel_writing(),
            SessionStatus::Idle => self.discard_output(),
            _ => {}
        }
    }
}
