//! Grain spawn timing.
//!
//! The scheduler counts down in samples and reports when the next grain is
//! due. The countdown is `f64` and intervals are added to it rather than
//! assigned, so non-integer intervals (e.g. 48 000 / 7) average out exactly
//! and integer intervals never drift.
//!
//! | Mode | Interval (base = sample_rate / density) |
//! |------|----------------------------------------|
//! | Synchronous | base |
//! | Asynchronous | base x U(0.5, 1.5) |
//! | QuasiSynchronous | base x U(0.9, 1.1) |
//! | Burst | 4 grains at base/8, then 3.625 x base |
//! | Cloud | base x U(0.05, 0.45) |
//! | Stream | base / 2 |
//!
//! Intervals never drop below one sample.

use resona_core::Rng;

/// How grain onsets are spaced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SchedulingMode {
    /// Fixed interval
    #[default]
    Synchronous,
    /// Interval randomized by ±50%
    Asynchronous,
    /// Interval jittered by ±10%
    QuasiSynchronous,
    /// Short bursts separated by gaps; same average rate
    Burst,
    /// Dense randomized overlap
    Cloud,
    /// Continuous stream at twice the rate
    Stream,
}

impl SchedulingMode {
    /// Every mode.
    pub const ALL: [SchedulingMode; 6] = [
        Self::Synchronous,
        Self::Asynchronous,
        Self::QuasiSynchronous,
        Self::Burst,
        Self::Cloud,
        Self::Stream,
    ];

    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Synchronous => "synchronous",
            Self::Asynchronous => "asynchronous",
            Self::QuasiSynchronous => "quasi-synchronous",
            Self::Burst => "burst",
            Self::Cloud => "cloud",
            Self::Stream => "stream",
        }
    }

    /// Look up a mode by name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name().eq_ignore_ascii_case(name))
    }
}

const BURST_LENGTH: u8 = 4;
const BURST_SPACING: f64 = 0.125;
/// Gap after a burst, chosen so four intervals sum to four base intervals.
const BURST_GAP: f64 = 4.0 - (BURST_LENGTH as f64 - 1.0) * BURST_SPACING;

/// Per-voice spawn clock.
#[derive(Debug, Clone)]
pub struct GrainScheduler {
    countdown: f64,
    burst_index: u8,
}

impl Default for GrainScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl GrainScheduler {
    /// A scheduler whose first grain fires on the first tick.
    pub fn new() -> Self {
        Self {
            countdown: 1.0,
            burst_index: 0,
        }
    }

    /// Restart so the next tick fires.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Advance one sample. Returns `true` when a grain should start now.
    #[inline]
    pub fn tick(&mut self, mode: SchedulingMode, density: f32, sample_rate: f32, rng: &mut Rng) -> bool {
        self.countdown -= 1.0;
        if self.countdown > 0.0 {
            return false;
        }
        let base = f64::from(sample_rate) / f64::from(density.max(1e-3));
        self.countdown += self.interval(mode, base, rng).max(1.0);
        true
    }

    fn interval(&mut self, mode: SchedulingMode, base: f64, rng: &mut Rng) -> f64 {
        match mode {
            SchedulingMode::Synchronous => base,
            SchedulingMode::Asynchronous => base * f64::from(rng.range(0.5, 1.5)),
            SchedulingMode::QuasiSynchronous => base * f64::from(rng.range(0.9, 1.1)),
            SchedulingMode::Burst => {
                self.burst_index = (self.burst_index + 1) % BURST_LENGTH;
                if self.burst_index == 0 {
                    base * BURST_GAP
                } else {
                    base * BURST_SPACING
                }
            }
            SchedulingMode::Cloud => base * f64::from(rng.range(0.05, 0.45)),
            SchedulingMode::Stream => base * 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_times(mode: SchedulingMode, density: f32, spawns: usize) -> Vec<u64> {
        let mut sched = GrainScheduler::new();
        let mut rng = Rng::new(7);
        let mut times = Vec::with_capacity(spawns);
        let mut t = 0u64;
        while times.len() < spawns {
            if sched.tick(mode, density, 48000.0, &mut rng) {
                times.push(t);
            }
            t += 1;
        }
        times
    }

    #[test]
    fn test_synchronous_exact_spacing() {
        let times = spawn_times(SchedulingMode::Synchronous, 200.0, 10_000);
        assert_eq!(times[0], 0);
        for pair in times.windows(2) {
            assert_eq!(pair[1] - pair[0], 240);
        }
        assert_eq!(*times.last().unwrap(), 240 * 9_999);
    }

    #[test]
    fn test_fractional_interval_does_not_drift() {
        // 48000 / 7 = 6857.14...
        let times = spawn_times(SchedulingMode::Synchronous, 7.0, 701);
        let expected = 48000 * 100;
        assert!(times[700].abs_diff(expected) <= 1, "{}", times[700]);
    }

    #[test]
    fn test_burst_keeps_average_rate() {
        let times = spawn_times(SchedulingMode::Burst, 100.0, 401);
        // 100 full bursts of four base intervals each
        assert_eq!(times[400], 480 * 400);
        assert_eq!(times[1] - times[0], 60);
    }

    #[test]
    fn test_stream_doubles_rate() {
        let times = spawn_times(SchedulingMode::Stream, 100.0, 11);
        assert_eq!(times[10], 2400);
    }

    #[test]
    fn test_random_modes_stay_in_range() {
        for (mode, lo, hi) in [
            (SchedulingMode::Asynchronous, 240.0, 720.0),
            (SchedulingMode::QuasiSynchronous, 432.0, 528.0),
            (SchedulingMode::Cloud, 24.0, 216.0),
        ] {
            let times = spawn_times(mode, 100.0, 500);
            for pair in times.windows(2) {
                let gap = (pair[1] - pair[0]) as f64;
                assert!(gap >= lo - 1.0 && gap <= hi + 1.0, "{mode:?}: {gap}");
            }
        }
    }

    #[test]
    fn test_minimum_one_sample() {
        let times = spawn_times(SchedulingMode::Cloud, 1.0e6, 100);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= 1);
        }
    }
}
