//! Six-operator FM (phase modulation).
//!
//! Each operator is a table oscillator with its own envelope. An
//! [`Algorithm`] says which operators modulate which and which are summed
//! to the output. Operators are evaluated from 6 down to 1 so every
//! modulator's current output is ready before its target runs:
//!
//! ```text
//! out_j   = level_j * vel_j * env_j * wave_j(phase_j + pm_j)
//! pm_i    = sum(index_j * out_j for j modulating i) / 2π      (turns)
//!         + feedback * π * (y[n-1] + y[n-2]) / 2 / 2π         (feedback operator only)
//! output  = sum(out_c for carriers c) * (1/sqrt(carriers) if normalized)
//! ```
//!
//! With a single modulator `m` on carrier `c`, fixed frequencies and unit
//! levels this is exactly `sin(2π fc t + I sin(2π fm t))`.

pub mod algorithms;

pub use algorithms::{ALGORITHM_COUNT, ALGORITHMS, Algorithm, OPERATORS};

use super::{Kernel, NoteContext};
use crate::envelope::{EnvelopeConfig, EnvelopeState};
use core::f32::consts::PI;
use libm::sqrtf;
use resona_core::{Tables, cents_to_ratio, sanitize};

const INV_TAU: f32 = 1.0 / (2.0 * PI);

/// Shape an operator produces from its phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OperatorWaveform {
    /// Plain sine
    #[default]
    Sine,
    /// First half-cycle only
    HalfSine,
    /// Rectified sine
    AbsSine,
    /// Double-speed sine gated to the first half-cycle
    PulseSine,
    /// Sine plus half-level second harmonic
    EvenSine,
    /// Sine plus third-level third harmonic
    OddSine,
    /// Sign of the sine
    SquareSine,
}

impl OperatorWaveform {
    /// All waveforms.
    pub const ALL: [OperatorWaveform; 7] = [
        Self::Sine,
        Self::HalfSine,
        Self::AbsSine,
        Self::PulseSine,
        Self::EvenSine,
        Self::OddSine,
        Self::SquareSine,
    ];

    /// Lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sine => "sine",
            Self::HalfSine => "half-sine",
            Self::AbsSine => "abs-sine",
            Self::PulseSine => "pulse-sine",
            Self::EvenSine => "even-sine",
            Self::OddSine => "odd-sine",
            Self::SquareSine => "square-sine",
        }
    }

    /// Parse a name produced by [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|w| w.name() == name)
    }

    /// Evaluate at `phase` (turns, `[0, 1)`).
    #[inline]
    pub fn evaluate(self, tables: &Tables, phase: f32) -> f32 {
        match self {
            Self::Sine => tables.sin(phase),
            Self::HalfSine => {
                if phase < 0.5 {
                    tables.sin(phase)
                } else {
                    0.0
                }
            }
            Self::AbsSine => tables.sin(phase).abs(),
            Self::PulseSine => {
                if phase < 0.5 {
                    tables.sin(2.0 * phase)
                } else {
                    0.0
                }
            }
            Self::EvenSine => tables.sin(phase) + 0.5 * tables.sin(2.0 * phase),
            Self::OddSine => tables.sin(phase) + 0.333 * tables.sin(3.0 * phase),
            Self::SquareSine => {
                let s = tables.sin(phase);
                if s > 0.0 {
                    1.0
                } else if s < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// Settings for one operator.
#[derive(Clone, Debug, PartialEq)]
pub struct OperatorParams {
    ratio: f32,
    detune_hz: f32,
    fixed: bool,
    fixed_hz: f32,
    modulation_index: f32,
    level: f32,
    velocity_sensitivity: f32,
    waveform: OperatorWaveform,
    /// Operator envelope
    pub envelope: EnvelopeConfig,
}

impl Default for OperatorParams {
    fn default() -> Self {
        Self {
            ratio: 1.0,
            detune_hz: 0.0,
            fixed: false,
            fixed_hz: 440.0,
            modulation_index: 1.0,
            level: 1.0,
            velocity_sensitivity: 0.5,
            waveform: OperatorWaveform::Sine,
            envelope: EnvelopeConfig::new(0.005, 0.3, 0.7, 0.3),
        }
    }
}

impl OperatorParams {
    /// Ratio-mode operator.
    pub fn ratio_mode(ratio: f32, level: f32, modulation_index: f32) -> Self {
        let mut op = Self::default();
        op.set_ratio(ratio);
        op.set_level(level);
        op.set_modulation_index(modulation_index);
        op
    }

    /// Fixed-frequency operator.
    pub fn fixed_mode(hz: f32, level: f32, modulation_index: f32) -> Self {
        let mut op = Self::default();
        op.set_fixed(true);
        op.set_fixed_hz(hz);
        op.set_level(level);
        op.set_modulation_index(modulation_index);
        op
    }

    /// Multiple of the note frequency.
    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    /// Set ratio (0.5 to 32.0).
    pub fn set_ratio(&mut self, ratio: f32) {
        self.ratio = ratio.clamp(0.5, 32.0);
    }

    /// Offset added after the ratio, in Hz.
    pub fn detune_hz(&self) -> f32 {
        self.detune_hz
    }

    /// Set detune (-100 to 100 Hz).
    pub fn set_detune_hz(&mut self, hz: f32) {
        self.detune_hz = hz.clamp(-100.0, 100.0);
    }

    /// Whether the operator ignores the note frequency.
    pub fn fixed(&self) -> bool {
        self.fixed
    }

    /// Switch between ratio and fixed-frequency mode.
    pub fn set_fixed(&mut self, fixed: bool) {
        self.fixed = fixed;
    }

    /// Frequency in fixed mode.
    pub fn fixed_hz(&self) -> f32 {
        self.fixed_hz
    }

    /// Set fixed frequency (0 to 20000 Hz).
    pub fn set_fixed_hz(&mut self, hz: f32) {
        self.fixed_hz = hz.clamp(0.0, 20000.0);
    }

    /// Peak phase deviation, in radians, this operator applies to its targets.
    pub fn modulation_index(&self) -> f32 {
        self.modulation_index
    }

    /// Set modulation index (0 to 32 radians).
    pub fn set_modulation_index(&mut self, index: f32) {
        self.modulation_index = index.clamp(0.0, 32.0);
    }

    /// Output level.
    pub fn level(&self) -> f32 {
        self.level
    }

    /// Set output level (0.0 to 1.0).
    pub fn set_level(&mut self, level: f32) {
        self.level = level.clamp(0.0, 1.0);
    }

    /// How much velocity affects this operator.
    pub fn velocity_sensitivity(&self) -> f32 {
        self.velocity_sensitivity
    }

    /// Set velocity sensitivity (0.0 to 1.0).
    pub fn set_velocity_sensitivity(&mut self, sensitivity: f32) {
        self.velocity_sensitivity = sensitivity.clamp(0.0, 1.0);
    }

    /// Operator waveform.
    pub fn waveform(&self) -> OperatorWaveform {
        self.waveform
    }

    /// Set operator waveform.
    pub fn set_waveform(&mut self, waveform: OperatorWaveform) {
        self.waveform = waveform;
    }

    fn frequency(&self, note_hz: f32, tune: f32) -> f32 {
        if self.fixed {
            self.fixed_hz
        } else {
            note_hz * self.ratio * tune + self.detune_hz
        }
    }
}

/// Factory patches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FmPreset {
    /// Tine electric piano
    EPiano,
    /// Punchy bass
    Bass,
    /// Inharmonic bell
    Bell,
    /// Brass section
    Brass,
    /// Drawbar-style organ
    Organ,
}

impl FmPreset {
    /// All presets.
    pub const ALL: [FmPreset; 5] = [Self::EPiano, Self::Bass, Self::Bell, Self::Brass, Self::Organ];

    /// Lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::EPiano => "epiano",
            Self::Bass => "bass",
            Self::Bell => "bell",
            Self::Brass => "brass",
            Self::Organ => "organ",
        }
    }

    /// Parse a name produced by [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

/// Engine parameters for [`FmKernel`].
#[derive(Clone, Debug, PartialEq)]
pub struct FmParams {
    algorithm: u8,
    feedback: f32,
    normalize: bool,
    master_tune_cents: f32,
    /// Operators 1–6 at indices 0–5
    pub operators: [OperatorParams; OPERATORS],
}

impl Default for FmParams {
    fn default() -> Self {
        Self::preset(FmPreset::EPiano)
    }
}

impl FmParams {
    /// Build a factory patch.
    pub fn preset(preset: FmPreset) -> Self {
        let silent = || OperatorParams::ratio_mode(1.0, 0.0, 0.0);
        let mut p = Self {
            algorithm: 1,
            feedback: 0.0,
            normalize: true,
            master_tune_cents: 0.0,
            operators: core::array::from_fn(|_| silent()),
        };
        match preset {
            FmPreset::EPiano => {
                p.algorithm = 5;
                p.feedback = 0.2;
                p.operators = [
                    OperatorParams::ratio_mode(1.0, 1.0, 0.0),
                    OperatorParams::ratio_mode(14.0, 0.6, 1.2),
                    OperatorParams::ratio_mode(1.0, 0.8, 0.0),
                    OperatorParams::ratio_mode(1.0, 0.7, 1.5),
                    OperatorParams::ratio_mode(1.0, 0.5, 0.0),
                    OperatorParams::ratio_mode(3.0, 0.4, 0.8),
                ];
                for op in &mut p.operators {
                    op.envelope = EnvelopeConfig::new(0.001, 1.8, 0.0, 0.4);
                }
                p.operators[1].envelope = EnvelopeConfig::new(0.001, 0.25, 0.0, 0.2);
            }
            FmPreset::Bass => {
                p.algorithm = 1;
                p.feedback = 0.4;
                p.operators[0] = OperatorParams::ratio_mode(1.0, 1.0, 0.0);
                p.operators[1] = OperatorParams::ratio_mode(1.0, 0.9, 3.0);
                p.operators[1].envelope = EnvelopeConfig::new(0.001, 0.2, 0.2, 0.1);
                p.operators[0].envelope = EnvelopeConfig::new(0.001, 0.6, 0.6, 0.1);
            }
            FmPreset::Bell => {
                p.algorithm = 5;
                p.operators[0] = OperatorParams::ratio_mode(1.0, 1.0, 0.0);
                p.operators[1] = OperatorParams::ratio_mode(3.5, 0.8, 4.0);
                p.operators[2] = OperatorParams::ratio_mode(1.0, 0.6, 0.0);
                p.operators[3] = OperatorParams::ratio_mode(1.41, 0.7, 2.5);
                for op in &mut p.operators {
                    op.envelope = EnvelopeConfig::new(0.001, 4.0, 0.0, 3.0);
                }
            }
            FmPreset::Brass => {
                p.algorithm = 22;
                p.feedback = 0.5;
                p.operators[0] = OperatorParams::ratio_mode(1.0, 1.0, 0.0);
                p.operators[1] = OperatorParams::ratio_mode(1.0, 0.8, 1.5);
                p.operators[2] = OperatorParams::ratio_mode(1.0, 0.8, 0.0);
                p.operators[3] = OperatorParams::ratio_mode(1.0, 0.7, 0.0);
                p.operators[4] = OperatorParams::ratio_mode(1.0, 0.6, 0.0);
                p.operators[5] = OperatorParams::ratio_mode(1.0, 0.9, 2.0);
                for op in &mut p.operators {
                    op.envelope = EnvelopeConfig::new(0.06, 0.2, 0.8, 0.2);
                }
            }
            FmPreset::Organ => {
                p.algorithm = 32;
                p.feedback = 0.1;
                let ratios = [0.5, 1.0, 2.0, 3.0, 4.0, 8.0];
                let levels = [0.8, 1.0, 0.7, 0.5, 0.4, 0.3];
                for ((op, ratio), level) in p.operators.iter_mut().zip(ratios).zip(levels) {
                    *op = OperatorParams::ratio_mode(ratio, level, 0.0);
                    op.envelope = EnvelopeConfig::new(0.005, 0.05, 1.0, 0.05);
                }
            }
        }
        p
    }

    /// Routing graph id (1 to 32).
    pub fn algorithm(&self) -> u8 {
        self.algorithm
    }

    /// Select a routing graph; ids outside 1..=32 clamp.
    pub fn set_algorithm(&mut self, id: u8) {
        self.algorithm = id.clamp(1, ALGORITHM_COUNT as u8);
    }

    /// Self-modulation amount.
    pub fn feedback(&self) -> f32 {
        self.feedback
    }

    /// Set feedback (0.0 to 1.0, at most π radians of deviation).
    pub fn set_feedback(&mut self, feedback: f32) {
        self.feedback = feedback.clamp(0.0, 1.0);
    }

    /// Whether carriers are scaled by `1/sqrt(carriers)`.
    pub fn normalize(&self) -> bool {
        self.normalize
    }

    /// Enable or disable carrier normalization.
    pub fn set_normalize(&mut self, normalize: bool) {
        self.normalize = normalize;
    }

    /// Global tuning offset for ratio-mode operators.
    pub fn master_tune_cents(&self) -> f32 {
        self.master_tune_cents
    }

    /// Set master tune (-100 to 100 cents).
    pub fn set_master_tune_cents(&mut self, cents: f32) {
        self.master_tune_cents = cents.clamp(-100.0, 100.0);
    }

    /// The selected routing graph.
    pub fn routing(&self) -> &'static Algorithm {
        Algorithm::get(self.algorithm)
    }
}

/// Per-voice state for [`FmKernel`].
#[derive(Clone, Debug, Default)]
pub struct FmVoice {
    phases: [f32; OPERATORS],
    envelopes: [EnvelopeState; OPERATORS],
    outputs: [f32; OPERATORS],
    feedback_history: [f32; 2],
    increments: [f32; OPERATORS],
    gains: [f32; OPERATORS],
    frequency: f32,
    velocity: f32,
}

impl FmVoice {
    /// Envelope level of zero-based operator `op`.
    pub fn operator_level(&self, op: usize) -> f32 {
        self.envelopes.get(op).map_or(0.0, EnvelopeState::level)
    }
}

/// FM kernel.
#[derive(Clone, Debug)]
pub struct FmKernel {
    sample_rate: f32,
}

impl FmKernel {
    /// Create a kernel at `sample_rate`.
    pub fn new(sample_rate: f32) -> Self {
        Self { sample_rate }
    }

    // Per-block operator increments and gains.
    fn refresh(&self, voice: &mut FmVoice, params: &FmParams) {
        let nyquist = self.sample_rate * 0.5;
        let tune = cents_to_ratio(params.master_tune_cents);
        for (i, op) in params.operators.iter().enumerate() {
            let freq = op.frequency(voice.frequency, tune).clamp(0.0, nyquist);
            voice.increments[i] = freq / self.sample_rate;
            let vel_scale = 1.0 - op.velocity_sensitivity * (1.0 - voice.velocity);
            voice.gains[i] = op.level * vel_scale;
        }
    }
}

impl Kernel for FmKernel {
    type Params = FmParams;
    type Voice = FmVoice;

    fn name(&self) -> &'static str {
        "fm"
    }

    fn new_voice(&self) -> FmVoice {
        FmVoice::default()
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    fn start(&self, voice: &mut FmVoice, note: &NoteContext, params: &FmParams, _tables: &Tables) {
        voice.frequency = note.frequency;
        voice.velocity = note.velocity;
        for env in &mut voice.envelopes {
            env.note_on();
        }
        self.refresh(voice, params);
    }

    fn release(&self, voice: &mut FmVoice, _params: &FmParams) {
        for env in &mut voice.envelopes {
            env.note_off();
        }
    }

    fn reset(&self, voice: &mut FmVoice) {
        *voice = FmVoice::default();
    }

    #[inline]
    fn render(&self, voice: &mut FmVoice, params: &FmParams, tables: &Tables) -> (f32, f32) {
        let alg = params.routing();
        let dt = 1.0 / self.sample_rate;
        let mut sum = 0.0;
        for i in (0..OPERATORS).rev() {
            let op = &params.operators[i];
            let env = voice.envelopes[i].advance(&op.envelope, dt);

            let mut pm = 0.0;
            let mask = alg.modulators[i];
            if mask != 0 {
                for j in (i + 1)..OPERATORS {
                    if mask & (1 << j) != 0 {
                        pm += params.operators[j].modulation_index * voice.outputs[j];
                    }
                }
            }
            if i == alg.feedback && params.feedback > 0.0 {
                let [y1, y2] = voice.feedback_history;
                pm += params.feedback * PI * 0.5 * (y1 + y2);
            }

            let mut phase = voice.phases[i] + pm * INV_TAU;
            phase -= libm::floorf(phase);
            let out = sanitize(op.waveform.evaluate(tables, phase) * voice.gains[i] * env);
            voice.outputs[i] = out;
            if i == alg.feedback {
                voice.feedback_history = [out, voice.feedback_history[0]];
            }
            if alg.is_carrier(i) {
                sum += out;
            }

            let mut next = voice.phases[i] + voice.increments[i];
            if next >= 1.0 {
                next -= 1.0;
            }
            voice.phases[i] = next;
        }
        if params.normalize {
            sum /= sqrtf(alg.carrier_count() as f32);
        }
        (sum, sum)
    }

    fn render_block(
        &self,
        voice: &mut FmVoice,
        params: &FmParams,
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

    fn is_finished(&self, voice: &FmVoice) -> bool {
        voice.envelopes.iter().all(EnvelopeState::is_idle)
    }
}
