//! Frame synthesis loop: one still image, held for every frame of the
//! schedule

use crate::error::{Result, VideoCreatorError};
use crate::pixel::PixelBufferFiller;
use crate::task::CancellationToken;
use crate::time::FrameSchedule;
use crate::writer::{Readiness, WriterSession};

/// Push every frame of `schedule` into a started `session`.
///
/// Each iteration checks `cancel`, waits for the track input to accept data,
/// takes a buffer from the session's pool, fills it with the still image and
/// appends it at the frame's presentation time. `progress` receives
/// `completed / total` after each append, except for the last frame: the
/// final `1.0` belongs to the caller once the session has finalized.
///
/// Returns the number of frames appended. Stops at the first failure.
pub fn write_frames(
    session: &mut WriterSession,
    filler: &mut PixelBufferFiller,
    schedule: FrameSchedule,
    cancel: &CancellationToken,
    progress: &mut dyn FnMut(f64),
) -> Result<u64> {
    let pool = session
        .pixel_buffer_pool()
        .ok_or(VideoCreatorError::PixelBufferPoolNotCreated)?;
    let input = session.input_mut().ok_or_else(|| {
        VideoCreatorError::BufferNotAppended("session has no track input".to_string())
    })?;

    let total = schedule.total_frames();
    let mut appended = 0;

    for (index, time) in schedule {
        if cancel.is_cancelled() {
            log::debug!("cancelled before frame {}", index);
            return Err(VideoCreatorError::Cancelled);
        }

        match input.wait_until_ready(cancel) {
            Readiness::Ready => {}
            Readiness::Cancelled => {
                log::debug!("cancelled while waiting for frame {}", index);
                return Err(VideoCreatorError::Cancelled);
            }
            Readiness::Failed(reason) => {
                return Err(VideoCreatorError::BufferNotAppended(reason));
            }
        }

        let mut buffer = pool
            .acquire_buffer()
            .ok_or(VideoCreatorError::PixelBufferPoolNotCreated)?;

        filler.fill(&mut buffer).map_err(|e| {
            VideoCreatorError::BufferNotAppended(format!("frame {}: {}", index, e))
        })?;

        input.append(buffer, time)?;
        appended += 1;

        if appended < total {
            progress(appended as f64 / total as f64);
        }
    }

    Ok(appended)
}
