//! The video track input: a bounded hand-off from the frame loop to an
//! encoder thread

use crate::encoder::Encoder;
use crate::error::{MediaError, Result, VideoCreatorError};
use crate::muxer::Muxer;
use crate::pixel::PooledBuffer;
use crate::task::CancellationToken;
use crate::time::PresentationTime;
use crate::Codec;
use crossbeam_channel::{Receiver, Sender};
use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// How long a readiness wait blocks before re-checking for cancellation
const READY_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Settings the video track input is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackInputSettings {
    pub codec: Codec,
    pub width: u32,
    pub height: u32,
}

/// Outcome of waiting for the input to accept more data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Cancelled,
    /// The input will never be ready again
    Failed(String),
}

#[derive(Debug, Default)]
struct GateState {
    in_flight: usize,
    failure: Option<String>,
    finished: bool,
    aborted: bool,
}

/// Shared between the input and its encoder thread
#[derive(Debug)]
pub(crate) struct Gate {
    state: Mutex<GateState>,
    changed: Condvar,
    capacity: usize,
}

impl Gate {
    fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(GateState::default()),
            changed: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn release_frame(&self) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        drop(state);
        self.changed.notify_all();
    }

    fn fail(&self, reason: String) {
        let mut state = self.lock();
        state.failure.get_or_insert(reason);
        drop(state);
        self.changed.notify_all();
    }

    fn is_aborted(&self) -> bool {
        self.lock().aborted
    }
}

/// One queued frame
pub(crate) struct SampleFrame {
    buffer: PooledBuffer,
    time: PresentationTime,
}

/// What the encoder thread hands back once its input is closed
pub(crate) struct EncodedTrack {
    pub muxer: Box<dyn Muxer>,
    pub frames: u64,
    /// Why encoding stopped early; packets muxed before it stay in `muxer`
    pub failure: Option<MediaError>,
}

/// Endpoint accepting frames for the single video track
///
/// `is_ready_for_more_media_data` turns false once `capacity` frames are
/// queued or encoding; the producer blocks in
/// [`wait_until_ready`](Self::wait_until_ready) until the encoder thread
/// releases one.
#[derive(Debug)]
pub struct TrackInput {
    settings: TrackInputSettings,
    gate: Arc<Gate>,
    sender: Option<Sender<SampleFrame>>,
    last_time: Option<PresentationTime>,
    appended: u64,
}

impl TrackInput {
    pub(crate) fn new(settings: TrackInputSettings, capacity: usize) -> Self {
        Self {
            settings,
            gate: Arc::new(Gate::new(capacity)),
            sender: None,
            last_time: None,
            appended: 0,
        }
    }

    pub fn settings(&self) -> TrackInputSettings {
        self.settings
    }

    /// Frames accepted so far
    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// Presentation time of the most recent accepted frame
    pub fn last_time(&self) -> Option<PresentationTime> {
        self.last_time
    }

    /// Connect the input to a freshly started encoder thread
    pub(crate) fn attach(&mut self) -> (Receiver<SampleFrame>, Arc<Gate>) {
        let (tx, rx) = crossbeam_channel::bounded(self.gate.capacity);
        self.sender = Some(tx);
        (rx, Arc::clone(&self.gate))
    }

    pub fn is_ready_for_more_media_data(&self) -> bool {
        let state = self.gate.lock();
        self.sender.is_some()
            && !state.finished
            && state.failure.is_none()
            && state.in_flight < self.gate.capacity
    }

    /// Block until the input can take a frame, it fails, or `cancel` fires
    pub fn wait_until_ready(&self, cancel: &CancellationToken) -> Readiness {
        let mut state = self.gate.lock();
        loop {
            if cancel.is_cancelled() {
                return Readiness::Cancelled;
            }
            if let Some(reason) = &state.failure {
                return Readiness::Failed(reason.clone());
            }
            if state.finished || self.sender.is_none() {
                return Readiness::Failed("input is not accepting data".to_string());
            }
            if state.in_flight < self.gate.capacity {
                return Readiness::Ready;
            }
            state = self
                .gate
                .changed
                .wait_timeout(state, READY_POLL_INTERVAL)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
    }

    /// Queue a filled buffer for encoding at `time`.
    ///
    /// Ownership of the buffer moves to the encoder thread, which returns it to
    /// its pool once the frame is encoded.
    pub fn append(&mut self, buffer: PooledBuffer, time: PresentationTime) -> Result<()> {
        let not_appended = |reason: String| Err(VideoCreatorError::BufferNotAppended(reason));

        if let Some(last) = self.last_time {
            if time <= last {
                return not_appended(format!(
                    "presentation time {}/{} does not follow {}/{}",
                    time.value, time.timescale, last.value, last.timescale
                ));
            }
        }
        if buffer.width() != self.settings.width || buffer.height() != self.settings.height {
            return not_appended(format!(
                "buffer is {}x{}, track is {}x{}",
                buffer.width(),
                buffer.height(),
                self.settings.width,
                self.settings.height
            ));
        }

        let sender = match &self.sender {
            Some(sender) => sender,
            None => return not_appended("input is not accepting data".to_string()),
        };

        {
            let mut state = self.gate.lock();
            if let Some(reason) = &state.failure {
                return not_appended(reason.clone());
            }
            if state.finished {
                return not_appended("input already marked as finished".to_string());
            }
            state.in_flight += 1;
        }

        if sender.send(SampleFrame { buffer, time }).is_err() {
            self.gate.fail("encoder stopped".to_string());
            return not_appended("encoder stopped".to_string());
        }

        self.last_time = Some(time);
        self.appended += 1;
        Ok(())
    }

    /// No more frames will be appended. Idempotent.
    pub fn mark_as_finished(&mut self) {
        self.gate.lock().finished = true;
        self.sender = None;
        self.gate.changed.notify_all();
    }

    /// Stop encoding as soon as possible, dropping queued frames
    pub(crate) fn abort(&mut self) {
        self.gate.lock().aborted = true;
        self.mark_as_finished();
    }
}

/// Encoder thread body: encode every queued frame, mux the packets, flush
/// once the input closes
pub(crate) fn run_encoder(
    encoder: Box<dyn Encoder>,
    mut muxer: Box<dyn Muxer>,
    frames: Receiver<SampleFrame>,
    gate: Arc<Gate>,
) -> EncodedTrack {
    let mut encoded = 0;
    let failure = encode_all(encoder, muxer.as_mut(), &frames, &gate, &mut encoded).err();
    if let Some(e) = &failure {
        log::warn!("encoder stopped: {}", e);
        gate.fail(e.to_string());
    }
    EncodedTrack {
        muxer,
        frames: encoded,
        failure,
    }
}

fn encode_all(
    mut encoder: Box<dyn Encoder>,
    muxer: &mut dyn Muxer,
    frames: &Receiver<SampleFrame>,
    gate: &Gate,
    encoded: &mut u64,
) -> std::result::Result<(), MediaError> {
    let mut times = BTreeMap::new();

    for SampleFrame { buffer, time } in frames.iter() {
        if gate.is_aborted() {
            drop(buffer);
            gate.release_frame();
            break;
        }

        times.insert(*encoded, time);
        *encoded += 1;

        let packets = encoder.encode(&buffer);
        drop(buffer);
        gate.release_frame();

        for packet in packets? {
            let time = times.remove(&packet.frame_index).ok_or_else(|| {
                MediaError::Encode(format!("packet for unknown frame {}", packet.frame_index))
            })?;
            muxer.write_packet(&packet, time)?;
        }
    }

    if !gate.is_aborted() {
        for packet in encoder.flush()? {
            let time = times.remove(&packet.frame_index).ok_or_else(|| {
                MediaError::Encode(format!("packet for unknown frame {}", packet.frame_index))
            })?;
            muxer.write_packet(&packet, time)?;
        }
    }

    Ok(())
}
