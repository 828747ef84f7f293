//! DC blocker for waveguide and modal outputs.
//!
//! First-order highpass `H(z) = (1 - z^-1) / (1 - R z^-1)` (J. O. Smith).
//! Waveguide excitations such as a one-sided pluck leave a DC offset that
//! rings forever in a lossless loop; the blocker sits on the *output* tap
//! only, so the loop itself stays untouched.

use crate::flush_denormal;
use core::f32::consts::TAU;

/// First-order DC blocking filter.
///
/// ```rust
/// use resona_core::DcBlocker;
///
/// let mut blocker = DcBlocker::new(48000.0);
/// let mut y = 0.0;
/// for _ in 0..48000 {
///     y = blocker.process(0.5);
/// }
/// assert!(y.abs() < 0.01);
/// ```
#[derive(Debug, Clone)]
pub struct DcBlocker {
    /// Pole radius R
    coeff: f32,
    x_prev: f32,
    y_prev: f32,
}

impl Default for DcBlocker {
    fn default() -> Self {
        Self::new(48000.0)
    }
}

impl DcBlocker {
    /// Cutoff used by [`new`](Self::new), in Hz.
    pub const DEFAULT_CUTOFF_HZ: f32 = 7.0;

    /// Create a blocker with a ~7 Hz cutoff at `sample_rate`.
    pub fn new(sample_rate: f32) -> Self {
        Self {
            coeff: Self::coeff_for(Self::DEFAULT_CUTOFF_HZ, sample_rate),
            x_prev: 0.0,
            y_prev: 0.0,
        }
    }

    /// Recompute R for a new sample rate. Filter state is kept.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.coeff = Self::coeff_for(Self::DEFAULT_CUTOFF_HZ, sample_rate);
    }

    /// Pole radius R.
    pub fn coeff(&self) -> f32 {
        self.coeff
    }

    /// `y[n] = x[n] - x[n-1] + R * y[n-1]`
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let output = flush_denormal(input - self.x_prev + self.coeff * self.y_prev);
        self.x_prev = input;
        self.y_prev = output;
        output
    }

    /// Zero the filter memory.
    pub fn reset(&mut self) {
        self.x_prev = 0.0;
        self.y_prev = 0.0;
    }

    fn coeff_for(cutoff_hz: f32, sample_rate: f32) -> f32 {
        (1.0 - TAU * cutoff_hz / sample_rate.max(1.0)).clamp(0.9, 0.9999)
    }
}
