//! Two-pole resonator for body and formant shaping.
//!
//! Constant-peak-gain form (Smith & Angell):
//!
//! ```text
//! y[n] = g·(x[n] - x[n-2]) + 2r·cos(ω)·y[n-1] - r²·y[n-2]
//! r = 1 - π·bandwidth / sample_rate,  ω = 2π·freq / sample_rate,  g = (1 - r²) / 2
//! ```
//!
//! The zeros at DC and Nyquist hold the peak gain near unity for any center
//! frequency and bandwidth, so banks of resonators can be summed with plain
//! per-band gains.

use crate::flush_denormal;
use core::f32::consts::PI;
use libm::cosf;

/// Two-pole resonant bandpass.
#[derive(Debug, Clone, Default)]
pub struct Resonator {
    b1: f32,
    b2: f32,
    input_gain: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Resonator {
    /// Create a resonator at `freq_hz` with `bandwidth_hz` (-3 dB width, approx.).
    pub fn new(sample_rate: f32, freq_hz: f32, bandwidth_hz: f32) -> Self {
        let mut res = Self::default();
        res.tune(sample_rate, freq_hz, bandwidth_hz);
        res
    }

    /// Retune without clearing state.
    ///
    /// Frequency is clamped below Nyquist and bandwidth to at least 1 Hz.
    pub fn tune(&mut self, sample_rate: f32, freq_hz: f32, bandwidth_hz: f32) {
        let sr = sample_rate.max(1.0);
        let freq = freq_hz.clamp(1.0, sr * 0.49);
        let r = (1.0 - PI * bandwidth_hz.max(1.0) / sr).clamp(0.0, 0.99999);
        let omega = 2.0 * PI * freq / sr;
        self.b1 = 2.0 * r * cosf(omega);
        self.b2 = -r * r;
        self.input_gain = (1.0 - r * r) * 0.5;
    }

    /// Process one sample.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let y = flush_denormal(
            self.input_gain * (input - self.x2) + self.b1 * self.y1 + self.b2 * self.y2,
        );
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }

    /// Clear filter memory.
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libm::sinf;

    fn steady_peak(res: &mut Resonator, freq: f32, sr: f32) -> f32 {
        let mut peak = 0.0f32;
        for i in 0..(sr as usize) {
            let y = res.process(sinf(2.0 * PI * freq * i as f32 / sr));
            if i > (sr as usize) / 2 {
                peak = peak.max(y.abs());
            }
        }
        peak
    }

    #[test]
    fn test_peaks_at_center() {
        let sr = 48000.0;
        let at_center = steady_peak(&mut Resonator::new(sr, 1000.0, 50.0), 1000.0, sr);
        let off_center = steady_peak(&mut Resonator::new(sr, 1000.0, 50.0), 3000.0, sr);
        assert!(at_center > 4.0 * off_center, "{at_center} vs {off_center}");
        assert!((at_center - 1.0).abs() < 0.1, "peak gain {at_center}");
    }

    #[test]
    fn test_impulse_decays() {
        let mut res = Resonator::new(48000.0, 440.0, 20.0);
        res.process(1.0);
        let mut tail = 0.0f32;
        for i in 0..48000 {
            let y = res.process(0.0);
            if i > 47000 {
                tail = tail.max(y.abs());
            }
        }
        assert!(tail < 1e-4);
    }

    #[test]
    fn test_extreme_tuning_is_stable() {
        let mut res = Resonator::new(48000.0, 1e9, 0.0);
        for i in 0..1000 {
            let y = res.process(if i == 0 { 1.0 } else { 0.0 });
            assert!(y.is_finite());
        }
    }
}
