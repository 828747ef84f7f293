//! One-pole lowpass filter for waveguide loss and tone shaping.
//!
//! A single-pole IIR lowpass with the difference equation:
//!
//! ```text
//! y[n] = x[n] + coeff * (y[n-1] - x[n])
//!      = (1 - coeff) * x[n] + coeff * y[n-1]
//! ```
//!
//! `coeff = 0` passes the input through unchanged, which is what a waveguide
//! at full brightness wants: no loss filtering at all. Higher coefficients
//! darken the loop.
//!
//! # Usage
//!
//! ```rust
//! use resona_core::OnePole;
//!
//! let mut lp = OnePole::new(48000.0, 4000.0);
//! let filtered = lp.process(1.0);
//! assert!(filtered < 1.0);
//!
//! let mut bypass = OnePole::with_coeff(0.0);
//! assert_eq!(bypass.process(0.3), 0.3);
//! ```

use crate::flush_denormal;
use libm::expf;

/// One-pole (6 dB/oct) lowpass filter.
///
/// # Invariants
///
/// - `coeff` is always in [0, 0.9999] for stable operation
/// - `state` is flushed to zero when below 1e-20 (denormal protection)
#[derive(Debug, Clone)]
pub struct OnePole {
    state: f32,
    coeff: f32,
}

impl Default for OnePole {
    fn default() -> Self {
        Self::with_coeff(0.0)
    }
}

impl OnePole {
    /// Create a lowpass with the given cutoff.
    pub fn new(sample_rate: f32, freq_hz: f32) -> Self {
        let mut filter = Self::with_coeff(0.0);
        filter.set_cutoff(sample_rate, freq_hz);
        filter
    }

    /// Create a filter from a raw pole coefficient.
    pub fn with_coeff(coeff: f32) -> Self {
        Self {
            state: 0.0,
            coeff: coeff.clamp(0.0, 0.9999),
        }
    }

    /// Set the cutoff frequency.
    ///
    /// `coeff = exp(-2π * freq / sample_rate)`; a cutoff at or above Nyquist
    /// still leaves a small amount of smoothing. Use [`set_coeff`](Self::set_coeff)
    /// with 0 for a true bypass.
    pub fn set_cutoff(&mut self, sample_rate: f32, freq_hz: f32) {
        let sr = sample_rate.max(1.0);
        let freq = freq_hz.clamp(0.0, sr * 0.5);
        self.set_coeff(expf(-core::f32::consts::TAU * freq / sr));
    }

    /// Set the pole coefficient directly, clamped to [0, 0.9999].
    pub fn set_coeff(&mut self, coeff: f32) {
        self.coeff = if coeff.is_finite() { coeff.clamp(0.0, 0.9999) } else { 0.0 };
    }

    /// Current pole coefficient.
    pub fn coeff(&self) -> f32 {
        self.coeff
    }

    /// Process one sample.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        self.state = flush_denormal(input + self.coeff * (self.state - input));
        self.state
    }

    /// Reset filter state to zero.
    pub fn reset(&mut self) {
        self.state = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_dc() {
        let mut lp = OnePole::new(48000.0, 1000.0);
        let mut out = 0.0;
        for _ in 0..48000 {
            out = lp.process(1.0);
        }
        assert!((out - 1.0).abs() < 1e-4, "DC should pass through, got {out}");
    }

    #[test]
    fn attenuates_nyquist() {
        let mut lp = OnePole::new(48000.0, 100.0);
        let mut sum = 0.0f32;
        for i in 0..4800 {
            let input = if i % 2 == 0 { 1.0 } else { -1.0 };
            sum += lp.process(input).abs();
        }
        assert!(sum / 4800.0 < 0.05);
    }

    #[test]
    fn zero_coeff_is_identity() {
        let mut lp = OnePole::with_coeff(0.0);
        for x in [0.5, -0.25, 1.0, 0.0, -1.0] {
            assert_eq!(lp.process(x), x);
        }
    }

    #[test]
    fn coeff_is_clamped() {
        assert_eq!(OnePole::with_coeff(2.0).coeff(), 0.9999);
        assert_eq!(OnePole::with_coeff(-1.0).coeff(), 0.0);
        let mut lp = OnePole::default();
        lp.set_coeff(f32::NAN);
        assert_eq!(lp.coeff(), 0.0);
    }

    #[test]
    fn reset_clears_state() {
        let mut lp = OnePole::new(48000.0, 200.0);
        for _ in 0..100 {
            lp.process(1.0);
        }
        lp.reset();
        assert!(lp.process(0.0).abs() < 1e-12);
    }
}
