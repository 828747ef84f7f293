//! Modal synthesis: a small bank of exponentially decaying sinusoids.
//!
//! Each mode has a fixed frequency ratio to the note, a start amplitude and
//! a relative ring time. Upper modes are scaled by mallet hardness.

use libm::powf;
use resona_core::Tables;

/// Largest mode count of any profile.
pub const MAX_MODES: usize = 9;

/// One mode of a profile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mode {
    /// Frequency relative to the note
    pub ratio: f32,
    /// Start amplitude
    pub amplitude: f32,
    /// Ring time relative to the profile's fundamental ring time
    pub duration: f32,
}

const fn mode(ratio: f32, amplitude: f32, duration: f32) -> Mode {
    Mode {
        ratio,
        amplitude,
        duration,
    }
}

/// Risset's bell partials.
pub const BELL_MODES: [Mode; 9] = [
    mode(0.56, 0.17, 1.0),
    mode(0.92, 0.11, 0.9),
    mode(1.19, 0.17, 0.65),
    mode(1.71, 0.3, 0.55),
    mode(2.0, 0.44, 0.325),
    mode(2.74, 0.28, 0.35),
    mode(3.0, 0.24, 0.25),
    mode(3.76, 0.22, 0.2),
    mode(4.07, 0.22, 0.15),
];

/// Free-free uniform bar (xylophone).
pub const BAR_MODES: [Mode; 4] = [
    mode(1.0, 1.0, 1.0),
    mode(2.76, 0.7, 0.6),
    mode(5.40, 0.4, 0.4),
    mode(8.93, 0.2, 0.25),
];

/// Tuned marimba bar.
pub const MARIMBA_MODES: [Mode; 3] = [mode(1.0, 1.0, 1.0), mode(3.99, 0.5, 0.4), mode(10.65, 0.25, 0.2)];

/// Decaying-sinusoid bank for one voice.
#[derive(Clone, Debug, Default)]
pub(crate) struct ModalBank {
    phases: [f32; MAX_MODES],
    increments: [f32; MAX_MODES],
    amplitudes: [f32; MAX_MODES],
    decays: [f32; MAX_MODES],
    count: usize,
}

impl ModalBank {
    /// Start all modes. Modes at or above Nyquist are silent.
    ///
    /// `ring_time` is the 60 dB decay time of a mode with `duration = 1`.
    pub(crate) fn strike(
        &mut self,
        modes: &[Mode],
        freq: f32,
        sample_rate: f32,
        ring_time: f32,
        hardness: f32,
        amplitude: f32,
    ) {
        let nyquist = sample_rate * 0.5;
        let upper = 0.2 + 0.8 * hardness.clamp(0.0, 1.0);
        self.count = modes.len().min(MAX_MODES);
        for (i, m) in modes.iter().take(MAX_MODES).enumerate() {
            let hz = freq * m.ratio;
            self.phases[i] = 0.0;
            if hz >= nyquist {
                self.increments[i] = 0.0;
                self.amplitudes[i] = 0.0;
                self.decays[i] = 0.0;
                continue;
            }
            self.increments[i] = hz / sample_rate;
            let scale = if i == 0 { 1.0 } else { upper };
            self.amplitudes[i] = m.amplitude * scale * amplitude;
            let t60 = (ring_time * m.duration).max(1e-3);
            // 60 dB down after t60 seconds.
            self.decays[i] = powf(10.0, -3.0 / (t60 * sample_rate));
        }
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    /// One sample; `damping` multiplies every mode's decay (1.0 = natural).
    #[inline]
    pub(crate) fn tick(&mut self, tables: &Tables, damping: f32) -> f32 {
        let mut sum = 0.0;
        for i in 0..self.count {
            let amp = self.amplitudes[i];
            if amp == 0.0 {
                continue;
            }
            sum += amp * tables.sin(self.phases[i]);
            let mut phase = self.phases[i] + self.increments[i];
            if phase >= 1.0 {
                phase -= 1.0;
            }
            self.phases[i] = phase;
            let next = amp * self.decays[i] * damping;
            self.amplitudes[i] = if next.abs() < 1e-9 { 0.0 } else { next };
        }
        sum
    }

    /// Amplitude of the loudest mode.
    pub(crate) fn loudest(&self) -> f32 {
        self.amplitudes[..self.count]
            .iter()
            .fold(0.0f32, |m, a| m.max(a.abs()))
    }
}
