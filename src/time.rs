//! Rational presentation timestamps

use std::cmp::Ordering;
use std::ops::Add;

/// A rational timestamp: `value / timescale` seconds
#[derive(Debug, Clone, Copy, Eq)]
pub struct PresentationTime {
    pub value: i64,
    pub timescale: u32,
}

impl PresentationTime {
    pub const fn new(value: i64, timescale: u32) -> Self {
        Self { value, timescale }
    }

    pub const fn zero(timescale: u32) -> Self {
        Self::new(0, timescale)
    }

    pub fn seconds(&self) -> f64 {
        self.value as f64 / self.timescale as f64
    }

    /// Nearest whole millisecond, computed from the rational value
    pub fn as_millis(&self) -> i64 {
        let scale = self.timescale as i128;
        let scaled = self.value as i128 * 1000;
        // round half away from zero
        let rounded = if scaled >= 0 {
            (scaled + scale / 2) / scale
        } else {
            (scaled - scale / 2) / scale
        };
        rounded as i64
    }
}

impl PartialEq for PresentationTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for PresentationTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PresentationTime {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.value as i128 * other.timescale as i128;
        let rhs = other.value as i128 * self.timescale as i128;
        lhs.cmp(&rhs)
    }
}

impl Add for PresentationTime {
    type Output = PresentationTime;

    /// Exact when both share a timescale, otherwise the result uses the
    /// product of the two timescales
    fn add(self, rhs: Self) -> Self::Output {
        if self.timescale == rhs.timescale {
            return PresentationTime::new(self.value + rhs.value, self.timescale);
        }
        let timescale = self.timescale as i64 * rhs.timescale as i64;
        let value = self.value * rhs.timescale as i64 + rhs.value * self.timescale as i64;
        match u32::try_from(timescale) {
            Ok(ts) => PresentationTime::new(value, ts),
            // fall back to the finer of the two scales
            Err(_) => {
                let ts = self.timescale.max(rhs.timescale);
                let v = (value as i128 * ts as i128 / timescale as i128) as i64;
                PresentationTime::new(v, ts)
            }
        }
    }
}

/// Count-driven sequence of frame timestamps
///
/// Frame `i` is presented at exactly `i / fps`. Iteration stops once
/// `total_frames` timestamps have been produced; wall-clock time plays no part.
#[derive(Debug, Clone)]
pub struct FrameSchedule {
    fps: u32,
    total_frames: u64,
    next: u64,
}

impl FrameSchedule {
    pub fn new(fps: u32, total_frames: u64) -> Self {
        Self {
            fps,
            total_frames,
            next: 0,
        }
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Duration of one frame, `1 / fps`
    pub fn frame_duration(&self) -> PresentationTime {
        PresentationTime::new(1, self.fps)
    }

    /// Presentation time of frame `index`
    pub fn time_of(&self, index: u64) -> PresentationTime {
        PresentationTime::new(index as i64, self.fps)
    }

    /// End of the last frame, i.e. total playback length
    pub fn end_time(&self) -> PresentationTime {
        self.time_of(self.total_frames)
    }

    /// Fraction of the schedule covered once `completed` frames are written
    pub fn progress(&self, completed: u64) -> f64 {
        completed as f64 / self.total_frames as f64
    }
}

impl Iterator for FrameSchedule {
    type Item = (u64, PresentationTime);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total_frames {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some((index, self.time_of(index)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.total_frames - self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for FrameSchedule {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_is_evenly_spaced() {
        let schedule = FrameSchedule::new(30, 60);
        let step = schedule.frame_duration();
        let times: Vec<_> = schedule.map(|(_, t)| t).collect();

        assert_eq!(times.len(), 60);
        assert_eq!(times[0], PresentationTime::zero(30));
        for pair in times.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[0] + step, pair[1]);
        }
    }

    #[test]
    fn test_schedule_single_frame() {
        let mut schedule = FrameSchedule::new(24, 1);
        assert_eq!(schedule.len(), 1);
        assert_eq!(schedule.next(), Some((0, PresentationTime::zero(24))));
        assert_eq!(schedule.next(), None);
    }

    #[test]
    fn test_no_drift_over_long_sequences() {
        // one hour of frames
        let schedule = FrameSchedule::new(29, 29 * 3600);
        let last = schedule.clone().last().map(|(_, t)| t).unwrap();
        assert_eq!(last.value, 29 * 3600 - 1);
        assert_eq!(schedule.end_time().seconds(), 3600.0);
        assert_eq!(schedule.end_time().as_millis(), 3_600_000);
    }

    #[test]
    fn test_millis_rounding() {
        assert_eq!(PresentationTime::new(1, 30).as_millis(), 33);
        assert_eq!(PresentationTime::new(2, 30).as_millis(), 67);
        assert_eq!(PresentationTime::new(3, 30).as_millis(), 100);
        assert_eq!(PresentationTime::new(1, 25).as_millis(), 40);
    }

    #[test]
    fn test_cross_timescale_compare_and_add() {
        assert_eq!(PresentationTime::new(1, 2), PresentationTime::new(15, 30));
        assert!(PresentationTime::new(1, 3) < PresentationTime::new(1, 2));
        let sum = PresentationTime::new(1, 2) + PresentationTime::new(1, 3);
        assert_eq!(sum, PresentationTime::new(5, 6));
    }

    #[test]
    fn test_progress_reaches_one() {
        let schedule = FrameSchedule::new(30, 7);
        assert_eq!(schedule.progress(7), 1.0);
        assert!(schedule.progress(6) < 1.0);
    }
}
