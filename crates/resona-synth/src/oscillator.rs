//! Band-limited audio oscillators.
//!
//! The vector engine's sources are built from these. Saw, square and pulse
//! use a 4th-order PolyBLEP (Polynomial Band-Limited Step) correction at
//! each discontinuity; triangle integrates a corrected square.

use core::f32::consts::PI;
use libm::{floorf, sinf};
use resona_core::Rng;

#[inline]
fn rem_euclid_f32(a: f32, b: f32) -> f32 {
    let r = a - b * floorf(a / b);
    if r < 0.0 { r + b } else { r }
}

/// Oscillator waveform types
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum OscillatorWaveform {
    /// Pure fundamental
    #[default]
    Sine,
    /// Odd harmonics, softer than saw
    Triangle,
    /// All harmonics
    Saw,
    /// 50% duty pulse
    Square,
    /// Pulse with variable duty cycle (0.0 to 1.0)
    Pulse(f32),
    /// White noise
    Noise,
}

/// Phase-accumulating oscillator with PolyBLEP anti-aliasing.
///
/// # Example
///
/// ```rust
/// use resona_synth::{Oscillator, OscillatorWaveform};
///
/// let mut osc = Oscillator::new(48000.0);
/// osc.set_frequency(440.0);
/// osc.set_waveform(OscillatorWaveform::Saw);
/// let sample = osc.advance();
/// assert!(sample.is_finite());
/// ```
#[derive(Debug, Clone)]
pub struct Oscillator {
    /// Current phase position [0.0, 1.0)
    phase: f32,
    /// Phase increment per sample
    phase_inc: f32,
    sample_rate: f32,
    frequency: f32,
    waveform: OscillatorWaveform,
    noise: Rng,
    /// Leaky integrator state for triangle
    integrator: f32,
}

impl Default for Oscillator {
    fn default() -> Self {
        Self::new(48000.0)
    }
}

impl Oscillator {
    /// Create an oscillator at 440 Hz.
    pub fn new(sample_rate: f32) -> Self {
        let sample_rate = sample_rate.max(1.0);
        Self {
            phase: 0.0,
            phase_inc: 440.0 / sample_rate,
            sample_rate,
            frequency: 440.0,
            waveform: OscillatorWaveform::Sine,
            noise: Rng::new(0x1234_5678),
            integrator: 0.0,
        }
    }

    /// Set frequency in Hz (clamped to `[0, sample_rate / 2]`).
    pub fn set_frequency(&mut self, freq_hz: f32) {
        self.frequency = freq_hz.clamp(0.0, self.sample_rate * 0.5);
        self.phase_inc = self.frequency / self.sample_rate;
    }

    /// Current frequency in Hz.
    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    /// Phase increment per sample.
    pub fn phase_increment(&self) -> f32 {
        self.phase_inc
    }

    /// Set waveform type.
    pub fn set_waveform(&mut self, waveform: OscillatorWaveform) {
        self.waveform = waveform;
    }

    /// Current waveform.
    pub fn waveform(&self) -> OscillatorWaveform {
        self.waveform
    }

    /// Set sample rate, keeping the frequency in Hz.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate.max(1.0);
        self.set_frequency(self.frequency);
    }

    /// Reseed the noise generator.
    pub fn set_seed(&mut self, seed: u32) {
        self.noise.reseed(seed);
    }

    /// Reset phase and integrator state.
    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.integrator = 0.0;
    }

    /// Set phase directly (wrapped into `[0, 1)`).
    pub fn set_phase(&mut self, phase: f32) {
        self.phase = rem_euclid_f32(phase, 1.0);
    }

    /// Current phase.
    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Generate the next sample.
    #[inline]
    pub fn advance(&mut self) -> f32 {
        let output = self.sample_at(self.phase);
        self.tick();
        output
    }

    /// Advance the phase without producing a sample.
    ///
    /// Returns `true` when the phase wrapped.
    #[inline]
    pub fn tick(&mut self) -> bool {
        self.phase += self.phase_inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
            true
        } else {
            false
        }
    }

    #[inline]
    fn sample_at(&mut self, phase: f32) -> f32 {
        let dt = self.phase_inc;
        match self.waveform {
            OscillatorWaveform::Sine => sinf(phase * 2.0 * PI),
            OscillatorWaveform::Saw => 2.0 * phase - 1.0 - poly_blep(phase, dt),
            OscillatorWaveform::Square => pulse(phase, 0.5, dt),
            OscillatorWaveform::Pulse(duty) => pulse(phase, duty.clamp(0.01, 0.99), dt),
            OscillatorWaveform::Triangle => {
                let square = pulse(phase, 0.5, dt);
                // Leak scales with frequency so DC stays bounded across the range.
                let leak = 1.0 - dt.min(0.1);
                self.integrator = leak * self.integrator + square * dt * 4.0;
                self.integrator
            }
            OscillatorWaveform::Noise => self.noise.next_bipolar(),
        }
    }
}

#[inline]
fn pulse(phase: f32, duty: f32, dt: f32) -> f32 {
    let naive = if phase < duty { 1.0 } else { -1.0 };
    naive + poly_blep(phase, dt) - poly_blep(rem_euclid_f32(phase - duty + 1.0, 1.0), dt)
}

/// 4th-order PolyBLEP correction.
///
/// C²-continuous degree-4 piecewise polynomial spanning two samples on each
/// side of a unit step at phase 0. Returns 0.0 away from the discontinuity.
/// Subtract from a falling step, add to a rising one, scale for other heights.
///
/// Reference: Välimäki et al., "Antialiasing Oscillators", IEEE Signal
/// Processing Magazine, 2010.
#[inline]
pub fn poly_blep(t: f32, dt: f32) -> f32 {
    //   p1(n) = A4 n^4 + A3 n^3 + A2 n^2 + A0   for n in [0, 1)
    //   p2(n) = C (2 - n)^4                      for n in [1, 2)
    const A4: f32 = -43.0 / 48.0;
    const A3: f32 = 7.0 / 6.0;
    const A2: f32 = 0.5;
    const A0: f32 = -1.0;
    const C: f32 = -11.0 / 48.0;

    if dt <= 0.0 {
        return 0.0;
    }
    let dt2 = 2.0 * dt;
    if t < dt2 {
        let n = t / dt;
        if n < 1.0 {
            let n2 = n * n;
            A4 * n2 * n2 + A3 * n2 * n + A2 * n2 + A0
        } else {
            let u = 2.0 - n;
            let u2 = u * u;
            C * u2 * u2
        }
    } else if t > 1.0 - dt2 {
        let n = (1.0 - t) / dt;
        if n < 1.0 {
            let n2 = n * n;
            -(A4 * n2 * n2 + A3 * n2 * n + A2 * n2 + A0)
        } else {
            let u = 2.0 - n;
            let u2 = u * u;
            -(C * u2 * u2)
        }
    } else {
        0.0
    }
}
