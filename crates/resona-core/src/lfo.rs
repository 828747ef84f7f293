//! Low-frequency oscillator for modulating synthesis parameters.
//!
//! Drives slow periodic motion such as the vector-synthesis joystick path.
//! Free-running by default; with [`Lfo::set_tempo_sync`] the phase locks to
//! an external [`TempoContext`].

use crate::rng::Rng;
use crate::tempo::{NoteDivision, TempoContext};
use core::f32::consts::PI;
use libm::sinf;

/// LFO waveform type
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LfoWaveform {
    /// Smooth sinusoid
    #[default]
    Sine,
    /// Linear up/down ramps
    Triangle,
    /// Rising ramp with an abrupt reset
    Saw,
    /// Binary on/off
    Square,
    /// Random value held for one cycle
    SampleAndHold,
}

/// Low Frequency Oscillator producing values in [-1, 1].
///
/// # Example
///
/// ```rust
/// use resona_core::{Lfo, LfoWaveform};
///
/// let mut lfo = Lfo::new(48000.0, 2.0);
/// lfo.set_waveform(LfoWaveform::Triangle);
/// let value = lfo.next();
/// assert!((-1.0..=1.0).contains(&value));
/// ```
#[derive(Debug, Clone)]
pub struct Lfo {
    /// Current phase position [0.0, 1.0)
    phase: f32,
    /// Phase increment per sample
    phase_inc: f32,
    sample_rate: f32,
    frequency: f32,
    waveform: LfoWaveform,
    sync: Option<NoteDivision>,
    held: f32,
    rng: Rng,
}

impl Default for Lfo {
    fn default() -> Self {
        Self::new(48000.0, 1.0)
    }
}

impl Lfo {
    /// Create an LFO at `freq_hz`.
    pub fn new(sample_rate: f32, freq_hz: f32) -> Self {
        let mut lfo = Self {
            phase: 0.0,
            phase_inc: 0.0,
            sample_rate: sample_rate.max(1.0),
            frequency: 0.0,
            waveform: LfoWaveform::Sine,
            sync: None,
            held: 0.0,
            rng: Rng::new(0x5EED_1F0),
        };
        lfo.set_frequency(freq_hz);
        lfo
    }

    /// Set the free-running rate in Hz (0–100, clamped).
    pub fn set_frequency(&mut self, freq_hz: f32) {
        self.frequency = freq_hz.clamp(0.0, 100.0);
        self.phase_inc = self.frequency / self.sample_rate;
    }

    /// Current rate in Hz.
    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    /// Set waveform.
    pub fn set_waveform(&mut self, waveform: LfoWaveform) {
        self.waveform = waveform;
    }

    /// Current waveform.
    pub fn waveform(&self) -> LfoWaveform {
        self.waveform
    }

    /// Lock the rate and phase to a note division, or `None` to free-run.
    pub fn set_tempo_sync(&mut self, division: Option<NoteDivision>) {
        self.sync = division;
    }

    /// Align to the tempo source. No-op when not synced or the transport is stopped.
    ///
    /// Call once per block with the host's current context.
    pub fn apply_tempo(&mut self, ctx: &TempoContext) {
        if let Some(division) = self.sync {
            if ctx.playing {
                self.phase_inc = division.to_hz(ctx.bpm) / self.sample_rate;
                self.phase = ctx.phase_of(division);
            }
        }
    }

    /// Reset phase to 0.
    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.held = 0.0;
    }

    /// Set phase directly (0.0 - 1.0).
    pub fn set_phase(&mut self, phase: f32) {
        self.phase = phase.clamp(0.0, 1.0);
    }

    /// Current phase (0.0 - 1.0).
    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Next LFO value (-1.0 to 1.0).
    #[inline]
    pub fn next(&mut self) -> f32 {
        let output = match self.waveform {
            LfoWaveform::Sine => sinf(self.phase * 2.0 * PI),
            LfoWaveform::Triangle => {
                if self.phase < 0.5 {
                    4.0 * self.phase - 1.0
                } else {
                    3.0 - 4.0 * self.phase
                }
            }
            LfoWaveform::Saw => 2.0 * self.phase - 1.0,
            LfoWaveform::Square => {
                if self.phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            LfoWaveform::SampleAndHold => {
                if self.phase < self.phase_inc {
                    self.held = self.rng.next_bipolar();
                }
                self.held
            }
        };

        self.phase += self.phase_inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        output
    }

    /// Update sample rate, keeping the rate in Hz.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate.max(1.0);
        self.set_frequency(self.frequency);
    }
}
