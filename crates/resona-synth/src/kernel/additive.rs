//! Additive synthesis: up to 512 sine partials per voice.
//!
//! Each partial has its own frequency ratio, amplitude, start phase, pan,
//! detune and envelope. Two partial sets (A and B) can be morphed by
//! linear interpolation, and the resulting spectrum is shaped by global
//! controls:
//!
//! ```text
//! ratio'  = ratio^stretch * sqrt(1 + k * ratio^2)       (stiff-string inharmonicity)
//! f       = f0 * ratio' * 2^(detune/1200)
//! gain    = amplitude * 10^(tilt * log2(ratio) / 20)    (spectral tilt, dB/octave)
//!           * odd/even weight * formant bump * spectral envelope band
//! ```
//!
//! Partials at or above Nyquist are skipped. Per-voice gains and phase
//! increments are cached once per block; the per-sample loop is a table
//! lookup, an envelope step and two multiply-adds per partial.

use super::{Kernel, NoteContext};
use crate::envelope::{EnvelopeConfig, EnvelopeState};
use libm::{expf, log2f, powf, sqrtf};
use resona_core::{Tables, cents_to_ratio, db_to_linear, equal_power_pan, lerp, sanitize};

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

/// Maximum partials per voice.
pub const MAX_PARTIALS: usize = 512;

/// Bands in a [`SpectralEnvelope`].
pub const SPECTRAL_BANDS: usize = 32;

const BAND_LOW_HZ: f32 = 20.0;
const BAND_HIGH_HZ: f32 = 20000.0;

/// One sinusoidal component.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Partial {
    /// Linear amplitude (0.0 to 1.0)
    pub amplitude: f32,
    /// Frequency as a multiple of the fundamental
    pub ratio: f32,
    /// Start phase in turns
    pub phase: f32,
    /// Stereo position (-1.0 to 1.0)
    pub pan: f32,
    /// Detune in cents (-100.0 to 100.0)
    pub detune: f32,
}

impl Default for Partial {
    fn default() -> Self {
        Self {
            amplitude: 0.0,
            ratio: 1.0,
            phase: 0.0,
            pan: 0.0,
            detune: 0.0,
        }
    }
}

impl Partial {
    /// Per-field linear interpolation.
    pub fn lerp(&self, other: &Partial, t: f32) -> Partial {
        Partial {
            amplitude: lerp(self.amplitude, other.amplitude, t),
            ratio: lerp(self.ratio, other.ratio, t),
            phase: lerp(self.phase, other.phase, t),
            pan: lerp(self.pan, other.pan, t),
            detune: lerp(self.detune, other.detune, t),
        }
    }
}

/// A full bank of [`MAX_PARTIALS`] partials.
#[derive(Clone, Debug, PartialEq)]
pub struct PartialSet {
    partials: Vec<Partial>,
}

impl Default for PartialSet {
    fn default() -> Self {
        Self::harmonic(MAX_PARTIALS)
    }
}

impl PartialSet {
    /// Every partial silent, harmonic ratios.
    pub fn silent() -> Self {
        let mut set = Self::harmonic(MAX_PARTIALS);
        for p in &mut set.partials {
            p.amplitude = 0.0;
        }
        set
    }

    /// Harmonic series: partial `n` has ratio `n + 1`; the first `count`
    /// have amplitude 1, the rest are silent.
    pub fn harmonic(count: usize) -> Self {
        let partials = (0..MAX_PARTIALS)
            .map(|n| Partial {
                amplitude: if n < count { 1.0 } else { 0.0 },
                ratio: (n + 1) as f32,
                ..Partial::default()
            })
            .collect();
        Self { partials }
    }

    /// Explicit `(ratio, amplitude)` pairs; remaining partials are silent.
    pub fn from_ratios(pairs: &[(f32, f32)]) -> Self {
        let mut set = Self::silent();
        for (p, &(ratio, amplitude)) in set.partials.iter_mut().zip(pairs) {
            p.ratio = ratio;
            p.amplitude = amplitude;
        }
        set
    }

    /// All partials.
    pub fn partials(&self) -> &[Partial] {
        &self.partials
    }

    /// All partials, mutable.
    pub fn partials_mut(&mut self) -> &mut [Partial] {
        &mut self.partials
    }

    /// Partial `index`, if in range.
    pub fn get(&self, index: usize) -> Option<&Partial> {
        self.partials.get(index)
    }

    /// Replace partial `index`. Out-of-range indices are ignored.
    pub fn set(&mut self, index: usize, partial: Partial) {
        if let Some(p) = self.partials.get_mut(index) {
            *p = partial;
        }
    }

    /// Set the amplitude of partial `index`.
    pub fn set_amplitude(&mut self, index: usize, amplitude: f32) {
        if let Some(p) = self.partials.get_mut(index) {
            p.amplitude = amplitude;
        }
    }
}

/// Gaussian resonance bump applied over frequency.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Formant {
    /// Center frequency in Hz
    pub center_hz: f32,
    /// Width (standard deviation) in Hz
    pub width_hz: f32,
    /// Peak boost in dB
    pub gain_db: f32,
}

impl Formant {
    /// Linear gain at `freq_hz`; 1.0 far from the center.
    #[inline]
    pub fn gain_at(&self, freq_hz: f32) -> f32 {
        let width = self.width_hz.max(1.0);
        let d = (freq_hz - self.center_hz) / width;
        1.0 + (db_to_linear(self.gain_db) - 1.0) * expf(-d * d)
    }
}

/// Per-band gain over 20 Hz–20 kHz in [`SPECTRAL_BANDS`] logarithmic bands.
#[derive(Clone, Debug, PartialEq)]
pub struct SpectralEnvelope {
    bands: [f32; SPECTRAL_BANDS],
}

impl Default for SpectralEnvelope {
    fn default() -> Self {
        Self {
            bands: [1.0; SPECTRAL_BANDS],
        }
    }
}

impl SpectralEnvelope {
    /// Set band gain (0.0 to 4.0).
    pub fn set_band(&mut self, band: usize, gain: f32) {
        if let Some(b) = self.bands.get_mut(band) {
            *b = if gain.is_finite() { gain.clamp(0.0, 4.0) } else { 1.0 };
        }
    }

    /// Gain of `band`.
    pub fn band(&self, band: usize) -> f32 {
        self.bands.get(band).copied().unwrap_or(1.0)
    }

    /// Band containing `freq_hz`.
    pub fn band_index(freq_hz: f32) -> usize {
        let span = log2f(BAND_HIGH_HZ / BAND_LOW_HZ);
        let pos = log2f(freq_hz.max(BAND_LOW_HZ) / BAND_LOW_HZ) / span;
        ((pos * SPECTRAL_BANDS as f32) as usize).min(SPECTRAL_BANDS - 1)
    }

    /// Gain applied to a partial at `freq_hz`.
    #[inline]
    pub fn gain_at(&self, freq_hz: f32) -> f32 {
        self.bands[Self::band_index(freq_hz)]
    }
}

/// Factory timbres.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AdditivePreset {
    /// Fundamental only
    Sine,
    /// All harmonics at -6 dB/octave
    #[default]
    Saw,
    /// Odd harmonics at -6 dB/octave
    Square,
    /// Odd harmonics at -12 dB/octave
    Triangle,
    /// Drawbar organ footages
    Organ,
    /// Inharmonic bell partials
    Bell,
    /// Slow-attack bright ensemble
    Strings,
    /// Vowel formant over a soft spectrum
    Choir,
    /// Stretched, dense partials
    Metallic,
    /// Sparse, slowly decaying highs
    Glass,
    /// Stiff-string stretch with faster-decaying uppers
    Piano,
}

impl AdditivePreset {
    /// Every preset, in display order.
    pub const ALL: [AdditivePreset; 11] = [
        Self::Sine,
        Self::Saw,
        Self::Square,
        Self::Triangle,
        Self::Organ,
        Self::Bell,
        Self::Strings,
        Self::Choir,
        Self::Metallic,
        Self::Glass,
        Self::Piano,
    ];

    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sine => "sine",
            Self::Saw => "saw",
            Self::Square => "square",
            Self::Triangle => "triangle",
            Self::Organ => "organ",
            Self::Bell => "bell",
            Self::Strings => "strings",
            Self::Choir => "choir",
            Self::Metallic => "metallic",
            Self::Glass => "glass",
            Self::Piano => "piano",
        }
    }

    /// Look up a preset by name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }
}

/// Additive engine parameters.
///
/// ## Parameters
/// - `morph_position`: Blend from set A to set B (0.0 to 1.0, default 0.0)
/// - `active_partials`: Partials rendered (1 to 512, default 64; 0 after an empty import)
/// - `inharmonicity`: Stiffness coefficient `k` (0.0 to 1.0, default 0.0)
/// - `spectral_stretch`: Ratio exponent (0.5 to 2.0, default 1.0)
/// - `spectral_tilt`: dB per octave (-24.0 to 12.0, default -6.0)
/// - `odd_even_balance`: -1 odd only, +1 even only (default 0.0)
/// - `partial_decay_scaling`: Envelope speed-up per octave of ratio (0.0 to 8.0, default 0.0)
/// - `normalize`: Scale by 1/sqrt(active partials) (default false)
#[derive(Clone, Debug, PartialEq)]
pub struct AdditiveParams {
    set_a: PartialSet,
    set_b: PartialSet,
    morph_position: f32,
    active_partials: usize,
    inharmonicity: f32,
    spectral_stretch: f32,
    spectral_tilt: f32,
    odd_even_balance: f32,
    formant: Option<Formant>,
    spectral_envelope: Option<SpectralEnvelope>,
    normalize: bool,
    partial_decay_scaling: f32,
    /// Envelope applied to every partial
    pub envelope: EnvelopeConfig,
}

impl Default for AdditiveParams {
    fn default() -> Self {
        Self::preset(AdditivePreset::Saw)
    }
}

impl AdditiveParams {
    /// Build a factory preset.
    pub fn preset(preset: AdditivePreset) -> Self {
        let mut p = Self {
            set_a: PartialSet::harmonic(64),
            set_b: PartialSet::harmonic(64),
            morph_position: 0.0,
            active_partials: 64,
            inharmonicity: 0.0,
            spectral_stretch: 1.0,
            spectral_tilt: -6.0,
            odd_even_balance: 0.0,
            formant: None,
            spectral_envelope: None,
            normalize: false,
            partial_decay_scaling: 0.0,
            envelope: EnvelopeConfig::new(0.01, 0.1, 0.7, 0.3),
        };

        match preset {
            AdditivePreset::Sine => {
                p.set_harmonic(1, 0.0);
            }
            AdditivePreset::Saw => {}
            AdditivePreset::Square => {
                p.set_harmonic(63, -6.0);
                p.odd_even_balance = -1.0;
            }
            AdditivePreset::Triangle => {
                p.set_harmonic(31, -12.0);
                p.odd_even_balance = -1.0;
            }
            AdditivePreset::Organ => {
                p.set_spectrum(&[
                    (0.5, 0.8),
                    (1.0, 1.0),
                    (1.5, 0.6),
                    (2.0, 0.8),
                    (3.0, 0.5),
                    (4.0, 0.5),
                    (5.0, 0.3),
                    (6.0, 0.3),
                    (8.0, 0.4),
                ]);
                p.spectral_tilt = 0.0;
                p.envelope = EnvelopeConfig::new(0.01, 0.05, 1.0, 0.1);
            }
            AdditivePreset::Bell => {
                // Risset's bell partials
                p.set_spectrum(&[
                    (0.56, 0.37),
                    (0.92, 0.25),
                    (1.19, 0.37),
                    (1.71, 0.67),
                    (2.0, 1.0),
                    (2.74, 0.62),
                    (3.0, 0.55),
                    (3.76, 0.5),
                    (4.07, 0.5),
                ]);
                p.spectral_tilt = 0.0;
                p.partial_decay_scaling = 1.5;
                p.envelope = EnvelopeConfig::new(0.001, 2.0, 0.0, 3.0);
            }
            AdditivePreset::Strings => {
                p.set_harmonic(48, -3.0);
                p.envelope = EnvelopeConfig::new(0.3, 0.2, 0.8, 0.5);
            }
            AdditivePreset::Choir => {
                p.set_harmonic(32, -5.0);
                p.formant = Some(Formant {
                    center_hz: 800.0,
                    width_hz: 400.0,
                    gain_db: 9.0,
                });
                p.envelope = EnvelopeConfig::new(0.5, 0.3, 0.7, 0.6);
            }
            AdditivePreset::Metallic => {
                p.set_harmonic(64, -2.0);
                p.inharmonicity = 0.002;
                p.spectral_stretch = 1.02;
            }
            AdditivePreset::Glass => {
                p.set_harmonic(24, -8.0);
                p.inharmonicity = 0.0008;
                p.envelope = EnvelopeConfig::new(0.01, 1.0, 0.1, 2.0);
            }
            AdditivePreset::Piano => {
                p.set_harmonic(48, -4.0);
                p.inharmonicity = 0.0004;
                p.spectral_stretch = 1.001;
                p.partial_decay_scaling = 0.5;
                p.envelope = EnvelopeConfig::new(0.001, 0.5, 0.3, 1.0);
            }
        }
        p
    }

    fn set_harmonic(&mut self, count: usize, tilt: f32) {
        self.set_a = PartialSet::harmonic(count);
        self.set_b = self.set_a.clone();
        self.active_partials = count.clamp(1, MAX_PARTIALS);
        self.spectral_tilt = tilt;
    }

    fn set_spectrum(&mut self, pairs: &[(f32, f32)]) {
        self.set_a = PartialSet::from_ratios(pairs);
        self.set_b = self.set_a.clone();
        self.active_partials = pairs.len().clamp(1, MAX_PARTIALS);
    }

    /// Morph source A.
    pub fn set_a(&self) -> &PartialSet {
        &self.set_a
    }

    /// Morph source A, mutable.
    pub fn set_a_mut(&mut self) -> &mut PartialSet {
        &mut self.set_a
    }

    /// Morph target B.
    pub fn set_b(&self) -> &PartialSet {
        &self.set_b
    }

    /// Morph target B, mutable.
    pub fn set_b_mut(&mut self) -> &mut PartialSet {
        &mut self.set_b
    }

    /// Morph position.
    pub fn morph_position(&self) -> f32 {
        self.morph_position
    }

    /// Set morph position (0.0 = A, 1.0 = B).
    pub fn set_morph_position(&mut self, position: f32) {
        self.morph_position = clamp_finite(position, 0.0, 1.0, 0.0);
    }

    /// Number of rendered partials.
    pub fn active_partials(&self) -> usize {
        self.active_partials
    }

    /// Set number of rendered partials (1 to 512).
    pub fn set_active_partials(&mut self, count: usize) {
        self.active_partials = count.clamp(1, MAX_PARTIALS);
    }

    /// Inharmonicity coefficient.
    pub fn inharmonicity(&self) -> f32 {
        self.inharmonicity
    }

    /// Set inharmonicity coefficient `k` (0.0 to 1.0).
    pub fn set_inharmonicity(&mut self, k: f32) {
        self.inharmonicity = clamp_finite(k, 0.0, 1.0, 0.0);
    }

    /// Ratio stretch exponent.
    pub fn spectral_stretch(&self) -> f32 {
        self.spectral_stretch
    }

    /// Set ratio stretch exponent (0.5 to 2.0).
    pub fn set_spectral_stretch(&mut self, stretch: f32) {
        self.spectral_stretch = clamp_finite(stretch, 0.5, 2.0, 1.0);
    }

    /// Spectral tilt in dB per octave.
    pub fn spectral_tilt(&self) -> f32 {
        self.spectral_tilt
    }

    /// Set spectral tilt (-24.0 to 12.0 dB per octave).
    pub fn set_spectral_tilt(&mut self, db_per_octave: f32) {
        self.spectral_tilt = clamp_finite(db_per_octave, -24.0, 12.0, 0.0);
    }

    /// Odd/even balance.
    pub fn odd_even_balance(&self) -> f32 {
        self.odd_even_balance
    }

    /// Set odd/even balance (-1.0 to 1.0).
    pub fn set_odd_even_balance(&mut self, balance: f32) {
        self.odd_even_balance = clamp_finite(balance, -1.0, 1.0, 0.0);
    }

    /// Formant bump, if any.
    pub fn formant(&self) -> Option<Formant> {
        self.formant
    }

    /// Set or clear the formant bump.
    pub fn set_formant(&mut self, formant: Option<Formant>) {
        self.formant = formant;
    }

    /// Spectral envelope, if any.
    pub fn spectral_envelope(&self) -> Option<&SpectralEnvelope> {
        self.spectral_envelope.as_ref()
    }

    /// Set or clear the spectral envelope.
    pub fn set_spectral_envelope(&mut self, envelope: Option<SpectralEnvelope>) {
        self.spectral_envelope = envelope;
    }

    /// Whether output is normalized by partial count.
    pub fn normalize(&self) -> bool {
        self.normalize
    }

    /// Enable 1/sqrt(active partials) normalization.
    pub fn set_normalize(&mut self, normalize: bool) {
        self.normalize = normalize;
    }

    /// Envelope speed-up per octave of partial ratio.
    pub fn partial_decay_scaling(&self) -> f32 {
        self.partial_decay_scaling
    }

    /// Set envelope speed-up per octave (0.0 to 8.0).
    pub fn set_partial_decay_scaling(&mut self, scaling: f32) {
        self.partial_decay_scaling = clamp_finite(scaling, 0.0, 8.0, 0.0);
    }

    /// Amplitudes and ratios of the active partials of set A.
    pub fn export_spectrum(&self) -> (Vec<f32>, Vec<f32>) {
        let active = &self.set_a.partials[..self.active_partials];
        (
            active.iter().map(|p| p.amplitude).collect(),
            active.iter().map(|p| p.ratio).collect(),
        )
    }

    /// Load amplitudes and ratios into set A (and B, so the morph is neutral).
    ///
    /// Values are stored as given; `export_spectrum` returns them bit for bit.
    /// The active partial count becomes the shorter slice length, so an
    /// empty analysis imports as silence.
    pub fn import_from_fft(&mut self, amplitudes: &[f32], ratios: &[f32]) {
        let count = amplitudes.len().min(ratios.len()).min(MAX_PARTIALS);
        let mut set = PartialSet::silent();
        for (p, (&amplitude, &ratio)) in set.partials.iter_mut().zip(amplitudes.iter().zip(ratios)) {
            p.amplitude = amplitude;
            p.ratio = ratio;
        }
        self.set_a = set;
        self.set_b = self.set_a.clone();
        self.active_partials = count;

        #[cfg(feature = "tracing")]
        tracing::debug!(partials = count, "imported additive spectrum");
    }

    /// Pick partials from one FFT magnitude frame.
    ///
    /// Local maxima above -60 dB relative to the loudest bin become partials,
    /// with parabolic interpolation of the peak frequency. Ratios are relative
    /// to `fundamental_hz`; amplitudes are normalized to the loudest peak.
    /// Returns the number of partials found.
    pub fn import_from_magnitudes(&mut self, bins: &[f32], bin_hz: f32, fundamental_hz: f32) -> usize {
        if bins.len() < 3 || bin_hz <= 0.0 || fundamental_hz <= 0.0 {
            return 0;
        }
        let peak = bins.iter().copied().filter(|m| m.is_finite()).fold(0.0_f32, f32::max);
        if peak <= 0.0 {
            return 0;
        }
        let floor = peak * 1e-3;

        let mut amplitudes = Vec::new();
        let mut ratios = Vec::new();
        for k in 1..bins.len() - 1 {
            let (a, b, c) = (bins[k - 1], bins[k], bins[k + 1]);
            if b > floor && b > a && b >= c {
                let denom = a - 2.0 * b + c;
                let offset = if denom.abs() > 1e-12 { 0.5 * (a - c) / denom } else { 0.0 };
                let freq = (k as f32 + offset.clamp(-0.5, 0.5)) * bin_hz;
                amplitudes.push(b / peak);
                ratios.push(freq / fundamental_hz);
                if amplitudes.len() == MAX_PARTIALS {
                    break;
                }
            }
        }
        let found = amplitudes.len();
        if found > 0 {
            self.import_from_fft(&amplitudes, &ratios);
        }
        found
    }

    /// Resynthesize `partials` harmonics of `fundamental_hz` from a recording.
    ///
    /// Correlates the signal against each harmonic and stores the measured
    /// amplitude (peak, clamped to 1) and phase in set A and B.
    pub fn analyze_samples(
        &mut self,
        samples: &[f32],
        sample_rate: f32,
        fundamental_hz: f32,
        partials: usize,
    ) {
        let count = partials.clamp(1, MAX_PARTIALS);
        if samples.is_empty() || sample_rate <= 0.0 || fundamental_hz <= 0.0 {
            return;
        }
        let n = samples.len() as f32;
        let mut set = PartialSet::harmonic(0);
        for (h, partial) in set.partials.iter_mut().take(count).enumerate() {
            let turns_per_sample = fundamental_hz * (h + 1) as f32 / sample_rate;
            if turns_per_sample >= 0.5 {
                break;
            }
            let mut sin_sum = 0.0_f64;
            let mut cos_sum = 0.0_f64;
            for (i, &x) in samples.iter().enumerate() {
                let w = core::f64::consts::TAU * f64::from(turns_per_sample) * i as f64;
                sin_sum += f64::from(x) * libm::sin(w);
                cos_sum += f64::from(x) * libm::cos(w);
            }
            let magnitude = libm::sqrt(sin_sum * sin_sum + cos_sum * cos_sum) as f32 * 2.0 / n;
            partial.amplitude = magnitude.min(1.0);
            // x = A sin(wt + p) correlates to sin_sum ~ cos(p), cos_sum ~ sin(p)
            partial.phase = (libm::atan2(cos_sum, sin_sum) / core::f64::consts::TAU) as f32;
        }
        self.set_a = set;
        self.set_b = self.set_a.clone();
        self.active_partials = count;
        self.spectral_tilt = 0.0;
        self.odd_even_balance = 0.0;
    }

    /// Morphed partial `index`.
    #[inline]
    fn partial(&self, index: usize) -> Partial {
        let a = &self.set_a.partials[index];
        if self.morph_position <= 0.0 {
            *a
        } else {
            a.lerp(&self.set_b.partials[index], self.morph_position)
        }
    }

    /// Effective ratio after stretch and inharmonicity.
    #[inline]
    fn effective_ratio(&self, ratio: f32) -> f32 {
        let stretched = if self.spectral_stretch == 1.0 {
            ratio
        } else {
            powf(ratio, self.spectral_stretch)
        };
        if self.inharmonicity > 0.0 {
            stretched * sqrtf(1.0 + self.inharmonicity * ratio * ratio)
        } else {
            stretched
        }
    }

    #[inline]
    fn odd_even_gain(&self, index: usize) -> f32 {
        // index 0 is the fundamental (odd harmonic)
        if index % 2 == 1 {
            (1.0 + self.odd_even_balance).min(1.0)
        } else {
            (1.0 - self.odd_even_balance).min(1.0)
        }
    }
}

fn clamp_finite(value: f32, lo: f32, hi: f32, fallback: f32) -> f32 {
    if value.is_finite() { value.clamp(lo, hi) } else { fallback }
}

/// Per-partial values derived from parameters once per block.
#[derive(Clone, Copy, Debug, Default)]
struct CachedPartial {
    increment: f32,
    gain_l: f32,
    gain_r: f32,
    /// Envelope time step for this partial
    dt: f32,
}

/// Additive voice state.
#[derive(Debug, Clone)]
pub struct AdditiveVoice {
    phases: Vec<f32>,
    envelopes: Vec<EnvelopeState>,
    cache: Vec<CachedPartial>,
    frequency: f32,
    velocity: f32,
    /// Partials rendered in the last block
    count: usize,
}

impl AdditiveVoice {
    /// Level of partial `index`'s envelope.
    pub fn partial_level(&self, index: usize) -> f32 {
        self.envelopes.get(index).map_or(0.0, EnvelopeState::level)
    }
}

/// Additive synthesis kernel.
#[derive(Debug, Clone)]
pub struct AdditiveKernel {
    sample_rate: f32,
}

impl Default for AdditiveKernel {
    fn default() -> Self {
        Self::new(48000.0)
    }
}

impl AdditiveKernel {
    /// Create a kernel at `sample_rate`.
    pub fn new(sample_rate: f32) -> Self {
        Self { sample_rate }
    }

    fn refresh(&self, voice: &mut AdditiveVoice, params: &AdditiveParams) {
        let count = params.active_partials.min(MAX_PARTIALS);
        let nyquist = self.sample_rate * 0.5;
        let dt = 1.0 / self.sample_rate;
        let norm = if params.normalize {
            1.0 / sqrtf(count.max(1) as f32)
        } else {
            1.0
        };

        for (i, slot) in voice.cache.iter_mut().enumerate().take(count) {
            let p = params.partial(i);
            let ratio = p.ratio.max(0.0);
            let freq = voice.frequency
                * params.effective_ratio(ratio)
                * cents_to_ratio(p.detune.clamp(-100.0, 100.0));
            let octaves = if ratio > 0.0 { log2f(ratio) } else { 0.0 };
            let rate = 1.0 + params.partial_decay_scaling * octaves.max(0.0);
            slot.dt = dt * rate;

            if !(freq > 0.0 && freq < nyquist) {
                *slot = CachedPartial {
                    dt: slot.dt,
                    ..CachedPartial::default()
                };
                continue;
            }

            let mut gain = p.amplitude.clamp(0.0, 1.0)
                * db_to_linear(params.spectral_tilt * octaves)
                * params.odd_even_gain(i)
                * voice.velocity
                * norm;
            if let Some(f) = &params.formant {
                gain *= f.gain_at(freq);
            }
            if let Some(env) = &params.spectral_envelope {
                gain *= env.gain_at(freq);
            }
            let (pl, pr) = equal_power_pan(p.pan.clamp(-1.0, 1.0));
            let gain = sanitize(gain);
            slot.increment = freq / self.sample_rate;
            slot.gain_l = gain * pl;
            slot.gain_r = gain * pr;
        }
        voice.count = count;
    }
}

impl Kernel for AdditiveKernel {
    type Params = AdditiveParams;
    type Voice = AdditiveVoice;

    fn name(&self) -> &'static str {
        "additive"
    }

    fn new_voice(&self) -> AdditiveVoice {
        AdditiveVoice {
            phases: vec![0.0; MAX_PARTIALS],
            envelopes: vec![EnvelopeState::new(); MAX_PARTIALS],
            cache: vec![CachedPartial::default(); MAX_PARTIALS],
            frequency: 0.0,
            velocity: 0.0,
            count: 0,
        }
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    fn start(
        &self,
        voice: &mut AdditiveVoice,
        note: &NoteContext,
        params: &AdditiveParams,
        _tables: &Tables,
    ) {
        voice.frequency = note.frequency;
        voice.velocity = note.velocity;
        for (i, (phase, env)) in voice.phases.iter_mut().zip(&mut voice.envelopes).enumerate() {
            let start = params.partial(i).phase;
            *phase = start - libm::floorf(start);
            env.note_on();
        }
        self.refresh(voice, params);
    }

    fn release(&self, voice: &mut AdditiveVoice, _params: &AdditiveParams) {
        for env in &mut voice.envelopes {
            env.note_off();
        }
    }

    fn reset(&self, voice: &mut AdditiveVoice) {
        voice.phases.fill(0.0);
        for env in &mut voice.envelopes {
            env.reset();
        }
        voice.count = 0;
    }

    #[inline]
    fn render(
        &self,
        voice: &mut AdditiveVoice,
        params: &AdditiveParams,
        tables: &Tables,
    ) -> (f32, f32) {
        let mut left = 0.0;
        let mut right = 0.0;
        let n = voice.count;
        for ((phase, env), c) in voice.phases[..n]
            .iter_mut()
            .zip(&mut voice.envelopes[..n])
            .zip(&voice.cache[..n])
        {
            let level = env.advance(&params.envelope, c.dt);
            if c.increment > 0.0 {
                let s = tables.sin(*phase) * level;
                left += s * c.gain_l;
                right += s * c.gain_r;
                *phase += c.increment;
                if *phase >= 1.0 {
                    *phase -= 1.0;
                }
            }
        }
        (left, right)
    }

    fn render_block(
        &self,
        voice: &mut AdditiveVoice,
        params: &AdditiveParams,
        tables: &Tables,
        left: &mut [f32],
        right: &mut [f32],
    ) {
        self.refresh(voice, params);
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let (a, b) = self.render(voice, params, tables);
            *l += a;
            *r += b;
        }
    }

    fn is_finished(&self, voice: &AdditiveVoice) -> bool {
        voice.envelopes[..voice.count].iter().all(EnvelopeState::is_idle)
    }
}
