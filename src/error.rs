//! Error types for stillvid

use thiserror::Error;

/// Result type alias for video creation
pub type Result<T> = std::result::Result<T, VideoCreatorError>;

/// Boxed underlying cause carried by some error kinds
pub type Cause = Box<dyn std::error::Error + Send + Sync>;

/// Failure kinds of a video creation task.
///
/// Every kind is terminal for the task that raised it. Nothing is retried
/// internally.
#[derive(Error, Debug)]
pub enum VideoCreatorError {
    /// An existing file at the destination could not be removed
    #[error("Output path is not empty: {0}")]
    OutputPathNotEmpty(#[source] std::io::Error),

    /// The container could not be created at the destination
    #[error("Can not create writer: {0}")]
    CanNotCreateWriter(#[source] std::io::Error),

    /// The track input was rejected by the session
    #[error("Can not add input: {0}")]
    CanNotAddInput(String),

    /// The writing session failed to begin
    #[error("Can not start writing{}", .0.as_ref().map(|e| format!(": {e}")).unwrap_or_default())]
    CanNotStartWriting(#[source] Option<Cause>),

    /// The session could not supply a compatible pixel buffer pool
    #[error("Pixel buffer pool not created")]
    PixelBufferPoolNotCreated,

    /// A frame failed mid-sequence; a partial file remains on disk
    #[error("Buffer not appended: {0}")]
    BufferNotAppended(String),

    /// The task was cancelled before or during frame synthesis
    #[error("Cancelled")]
    Cancelled,
}

impl VideoCreatorError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, VideoCreatorError::Cancelled)
    }
}

/// Failures inside the encode/mux pipeline
///
/// Never returned to callers directly; the writer session maps each one to
/// the [`VideoCreatorError`] kind of the phase it happened in.
#[derive(Error, Debug)]
pub enum MediaError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding error
    #[error("Encoding error: {0}")]
    Encode(String),

    /// Muxing error
    #[error("Muxing error: {0}")]
    Mux(String),
}

/// Rejection reasons for [`crate::VideoCreateOptions`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidOptions {
    #[error("Output size must be positive, got {width}x{height}")]
    EmptySize { width: u32, height: u32 },

    #[error("Output size {width}x{height} is outside the encodable range {min}-{max}")]
    UnsupportedSize {
        width: u32,
        height: u32,
        min: u32,
        max: u32,
    },

    #[error("Frame rate must be positive")]
    ZeroFps,

    #[error("Duration must be a positive finite number of seconds, got {0}")]
    BadDuration(f64),

    #[error("{fps} fps for {duration}s rounds to zero frames")]
    NoFrames { fps: u32, duration: f64 },

    #[error("{fps} fps for {duration}s exceeds the supported frame count")]
    TooManyFrames { fps: u32, duration: f64 },
}

/// Error code for FFI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub enum ErrorCode {
    /// Success
    Ok = 0,
    /// Invalid input parameter
    InvalidInput = 1,
    /// Existing output file could not be removed
    OutputPathNotEmpty = 2,
    /// Container could not be created
    CanNotCreateWriter = 3,
    /// Track input rejected
    CanNotAddInput = 4,
    /// Session failed to start
    CanNotStartWriting = 5,
    /// Pixel buffer pool unavailable
    PixelBufferPoolNotCreated = 6,
    /// Frame failed to encode
    BufferNotAppended = 7,
    /// Task cancelled
    Cancelled = 8,
}

impl From<&VideoCreatorError> for ErrorCode {
    fn from(err: &VideoCreatorError) -> Self {
        match err {
            VideoCreatorError::OutputPathNotEmpty(_) => ErrorCode::OutputPathNotEmpty,
            VideoCreatorError::CanNotCreateWriter(_) => ErrorCode::CanNotCreateWriter,
            VideoCreatorError::CanNotAddInput(_) => ErrorCode::CanNotAddInput,
            VideoCreatorError::CanNotStartWriting(_) => ErrorCode::CanNotStartWriting,
            VideoCreatorError::PixelBufferPoolNotCreated => ErrorCode::PixelBufferPoolNotCreated,
            VideoCreatorError::BufferNotAppended(_) => ErrorCode::BufferNotAppended,
            VideoCreatorError::Cancelled => ErrorCode::Cancelled,
        }
    }
}

impl From<&InvalidOptions> for ErrorCode {
    fn from(_: &InvalidOptions) -> Self {
        ErrorCode::InvalidInput
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_writing_message_with_and_without_cause() {
        let bare = VideoCreatorError::CanNotStartWriting(None);
        assert_eq!(bare.to_string(), "Can not start writing");

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let caused = VideoCreatorError::CanNotStartWriting(Some(Box::new(io)));
        assert_eq!(caused.to_string(), "Can not start writing: disk full");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ErrorCode::from(&VideoCreatorError::Cancelled),
            ErrorCode::Cancelled
        );
        assert_eq!(
            ErrorCode::from(&VideoCreatorError::PixelBufferPoolNotCreated),
            ErrorCode::PixelBufferPoolNotCreated
        );
        assert_eq!(
            ErrorCode::from(&InvalidOptions::ZeroFps),
            ErrorCode::InvalidInput
        );
    }
}
