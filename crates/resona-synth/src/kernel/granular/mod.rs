//! Granular synthesis over shared source buffers.
//!
//! Each voice runs its own grain cloud: a [`GrainScheduler`] decides when
//! the next grain starts, a fixed pool of [`MAX_GRAINS`] slots tracked by an
//! [`ActiveIndexSet`] holds the live grains, and a voice amplitude envelope
//! shapes the cloud as a whole.
//!
//! A grain reads its source at a fractional position that moves by its
//! pitch ratio per sample (negative when reversed), with linear
//! interpolation and wrap-around at the buffer ends. It is multiplied by a
//! window from the kernel's [`WindowBank`] and stays live while
//! `current < length`; grains that reach their length are retired once per
//! block in [`Kernel::block_end`].
//!
//! Spawning is skipped, never queued, when the grain pool is full or the
//! selected source is missing or empty.

mod scheduler;
mod window;

pub use scheduler::{GrainScheduler, SchedulingMode};
pub use window::{LENGTH_CLASSES, WindowBank, WindowShape};

use super::{Kernel, NoteContext};
use crate::active_set::ActiveIndexSet;
use crate::envelope::{EnvelopeConfig, EnvelopeState};
use libm::{fmod, roundf, sqrtf};
use resona_core::{Rng, Tables, equal_power_pan, midi_to_freq, semitones_to_ratio};

#[cfg(not(feature = "std"))]
use alloc::{sync::Arc, vec, vec::Vec};
#[cfg(feature = "std")]
use std::sync::Arc;

/// Grain slots per voice.
pub const MAX_GRAINS: usize = 256;

/// Source buffer slots.
pub const MAX_SOURCES: usize = 4;

/// Shortest grain in samples.
const MIN_GRAIN_SAMPLES: usize = 2;

/// Factory cloud settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GranularPreset {
    /// Soft overlapping Gaussian grains
    #[default]
    CloudPad,
    /// Short scattered grains with reversal and pitch jumps
    GlitchTexture,
    /// Dense, tightly positioned grains
    TimeStretch,
    /// Long Blackman grains at a fixed position
    SpectralFreeze,
    /// Sparse, regular trapezoid grains
    RhythmicGrain,
    /// Very long, slow grains
    AmbientDrone,
    /// Mid-size Tukey grains with mild detune
    VocalTexture,
    /// Mostly reversed grains with a swelling window
    ReverseCloud,
    /// Octave-up shimmering stream
    ShimmerPad,
}

impl GranularPreset {
    /// Every preset.
    pub const ALL: [GranularPreset; 9] = [
        Self::CloudPad,
        Self::GlitchTexture,
        Self::TimeStretch,
        Self::SpectralFreeze,
        Self::RhythmicGrain,
        Self::AmbientDrone,
        Self::VocalTexture,
        Self::ReverseCloud,
        Self::ShimmerPad,
    ];

    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CloudPad => "cloud-pad",
            Self::GlitchTexture => "glitch-texture",
            Self::TimeStretch => "time-stretch",
            Self::SpectralFreeze => "spectral-freeze",
            Self::RhythmicGrain => "rhythmic-grain",
            Self::AmbientDrone => "ambient-drone",
            Self::VocalTexture => "vocal-texture",
            Self::ReverseCloud => "reverse-cloud",
            Self::ShimmerPad => "shimmer-pad",
        }
    }

    /// Look up a preset by name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }
}

/// Granular cloud parameters.
///
/// ## Parameters
/// - `density`: Grains per second (0.1 to 200.0, default 20.0)
/// - `size_ms`: Grain length in ms (1.0 to 2000.0, default 50.0)
/// - `size_variation`: Random length spread (0.0 to 1.0, default 0.0)
/// - `pitch`: Transposition in semitones (-48.0 to 48.0, default 0.0)
/// - `pitch_spread`: Random transposition range in semitones (0.0 to 48.0, default 0.0)
/// - `position`: Read position in the source (0.0 to 1.0, default 0.5)
/// - `spray`: Random position offset (0.0 to 1.0, default 0.1)
/// - `stereo_spread`: Random pan width (0.0 to 1.0, default 0.5)
/// - `reverse_probability`: Chance a grain plays backwards (0.0 to 1.0, default 0.0)
/// - `gain`: Output gain (0.0 to 2.0, default 1.0)
#[derive(Clone, Debug)]
pub struct GranularParams {
    density: f32,
    size_ms: f32,
    size_variation: f32,
    pitch: f32,
    pitch_spread: f32,
    pitch_quantize: bool,
    position: f32,
    spray: f32,
    stereo_spread: f32,
    reverse_probability: f32,
    window: WindowShape,
    mode: SchedulingMode,
    source_index: usize,
    follow_note: bool,
    root_note: f32,
    gain: f32,
    sources: [Option<Arc<[f32]>>; MAX_SOURCES],
    /// Amplitude envelope of the whole cloud
    pub envelope: EnvelopeConfig,
}

impl Default for GranularParams {
    fn default() -> Self {
        Self {
            density: 20.0,
            size_ms: 50.0,
            size_variation: 0.0,
            pitch: 0.0,
            pitch_spread: 0.0,
            pitch_quantize: false,
            position: 0.5,
            spray: 0.1,
            stereo_spread: 0.5,
            reverse_probability: 0.0,
            window: WindowShape::Hann,
            mode: SchedulingMode::Synchronous,
            source_index: 0,
            follow_note: true,
            root_note: 60.0,
            gain: 1.0,
            sources: Default::default(),
            envelope: EnvelopeConfig::new(0.01, 0.1, 1.0, 0.3),
        }
    }
}

impl GranularParams {
    /// Build a factory preset. Sources are left empty.
    pub fn preset(preset: GranularPreset) -> Self {
        let mut p = Self::default();
        match preset {
            GranularPreset::CloudPad => {
                p.set_size_ms(80.0);
                p.set_density(30.0);
                p.set_spray(0.1);
                p.set_pitch_spread(0.1);
                p.set_stereo_spread(0.8);
                p.window = WindowShape::Gaussian;
                p.mode = SchedulingMode::Asynchronous;
                p.envelope = EnvelopeConfig::new(0.5, 0.2, 0.8, 1.5);
            }
            GranularPreset::GlitchTexture => {
                p.set_size_ms(10.0);
                p.set_size_variation(0.9);
                p.set_density(100.0);
                p.set_spray(0.4);
                p.set_pitch_spread(12.0);
                p.set_stereo_spread(1.0);
                p.set_reverse_probability(0.3);
                p.window = WindowShape::Random;
                p.mode = SchedulingMode::Burst;
            }
            GranularPreset::TimeStretch => {
                p.set_size_ms(50.0);
                p.set_density(40.0);
                p.set_spray(0.02);
                p.set_stereo_spread(0.2);
                p.window = WindowShape::Hann;
                p.mode = SchedulingMode::QuasiSynchronous;
            }
            GranularPreset::SpectralFreeze => {
                p.set_size_ms(200.0);
                p.set_density(20.0);
                p.set_spray(0.01);
                p.set_stereo_spread(0.5);
                p.window = WindowShape::Blackman;
            }
            GranularPreset::RhythmicGrain => {
                p.set_size_ms(25.0);
                p.set_density(8.0);
                p.set_spray(0.0);
                p.set_stereo_spread(0.3);
                p.window = WindowShape::Trapezoid;
            }
            GranularPreset::AmbientDrone => {
                p.set_size_ms(500.0);
                p.set_density(5.0);
                p.set_spray(0.3);
                p.set_pitch_spread(0.5);
                p.set_stereo_spread(1.0);
                p.window = WindowShape::Gaussian;
                p.mode = SchedulingMode::Cloud;
                p.envelope = EnvelopeConfig::new(2.0, 1.0, 0.9, 4.0);
            }
            GranularPreset::VocalTexture => {
                p.set_size_ms(100.0);
                p.set_density(25.0);
                p.set_spray(0.15);
                p.set_pitch_spread(2.0);
                p.set_stereo_spread(0.6);
                p.window = WindowShape::Tukey;
                p.mode = SchedulingMode::Asynchronous;
            }
            GranularPreset::ReverseCloud => {
                p.set_size_ms(150.0);
                p.set_density(15.0);
                p.set_spray(0.2);
                p.set_reverse_probability(0.7);
                p.set_stereo_spread(0.9);
                p.window = WindowShape::ReversedExponential;
                p.mode = SchedulingMode::Asynchronous;
            }
            GranularPreset::ShimmerPad => {
                p.set_size_ms(120.0);
                p.set_density(35.0);
                p.set_spray(0.05);
                p.set_pitch(12.0);
                p.set_pitch_spread(0.2);
                p.set_stereo_spread(1.0);
                p.window = WindowShape::Hann;
                p.mode = SchedulingMode::Stream;
            }
        }
        p
    }

    /// Grains per second.
    pub fn density(&self) -> f32 {
        self.density
    }

    /// Set grains per second (0.1 to 200.0).
    pub fn set_density(&mut self, density: f32) {
        self.density = clamp_finite(density, 0.1, 200.0, 20.0);
    }

    /// Grain length in milliseconds.
    pub fn size_ms(&self) -> f32 {
        self.size_ms
    }

    /// Set grain length (1.0 to 2000.0 ms).
    pub fn set_size_ms(&mut self, ms: f32) {
        self.size_ms = clamp_finite(ms, 1.0, 2000.0, 50.0);
    }

    /// Random length spread.
    pub fn size_variation(&self) -> f32 {
        self.size_variation
    }

    /// Set random length spread (0.0 to 1.0).
    pub fn set_size_variation(&mut self, variation: f32) {
        self.size_variation = clamp_finite(variation, 0.0, 1.0, 0.0);
    }

    /// Transposition in semitones.
    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Set transposition (-48.0 to 48.0 semitones).
    pub fn set_pitch(&mut self, semitones: f32) {
        self.pitch = clamp_finite(semitones, -48.0, 48.0, 0.0);
    }

    /// Random transposition range.
    pub fn pitch_spread(&self) -> f32 {
        self.pitch_spread
    }

    /// Set random transposition range (0.0 to 48.0 semitones).
    pub fn set_pitch_spread(&mut self, semitones: f32) {
        self.pitch_spread = clamp_finite(semitones, 0.0, 48.0, 0.0);
    }

    /// Whether grain transpositions snap to whole semitones.
    pub fn pitch_quantize(&self) -> bool {
        self.pitch_quantize
    }

    /// Snap grain transpositions to whole semitones.
    pub fn set_pitch_quantize(&mut self, quantize: bool) {
        self.pitch_quantize = quantize;
    }

    /// Read position.
    pub fn position(&self) -> f32 {
        self.position
    }

    /// Set read position (0.0 to 1.0 of the source length).
    pub fn set_position(&mut self, position: f32) {
        self.position = clamp_finite(position, 0.0, 1.0, 0.5);
    }

    /// Position randomization.
    pub fn spray(&self) -> f32 {
        self.spray
    }

    /// Set position randomization (0.0 to 1.0).
    pub fn set_spray(&mut self, spray: f32) {
        self.spray = clamp_finite(spray, 0.0, 1.0, 0.0);
    }

    /// Random pan width.
    pub fn stereo_spread(&self) -> f32 {
        self.stereo_spread
    }

    /// Set random pan width (0.0 to 1.0).
    pub fn set_stereo_spread(&mut self, spread: f32) {
        self.stereo_spread = clamp_finite(spread, 0.0, 1.0, 0.0);
    }

    /// Reverse probability.
    pub fn reverse_probability(&self) -> f32 {
        self.reverse_probability
    }

    /// Set reverse probability (0.0 to 1.0).
    pub fn set_reverse_probability(&mut self, probability: f32) {
        self.reverse_probability = clamp_finite(probability, 0.0, 1.0, 0.0);
    }

    /// Window shape.
    pub fn window(&self) -> WindowShape {
        self.window
    }

    /// Set window shape.
    pub fn set_window(&mut self, window: WindowShape) {
        self.window = window;
    }

    /// Scheduling mode.
    pub fn mode(&self) -> SchedulingMode {
        self.mode
    }

    /// Set scheduling mode.
    pub fn set_mode(&mut self, mode: SchedulingMode) {
        self.mode = mode;
    }

    /// Selected source slot.
    pub fn source_index(&self) -> usize {
        self.source_index
    }

    /// Select source slot (0 to 3).
    pub fn set_source_index(&mut self, index: usize) {
        self.source_index = index.min(MAX_SOURCES - 1);
    }

    /// Whether grain pitch follows the played note.
    pub fn follow_note(&self) -> bool {
        self.follow_note
    }

    /// Follow the played note relative to [`root_note`](Self::root_note).
    pub fn set_follow_note(&mut self, follow: bool) {
        self.follow_note = follow;
    }

    /// Note that plays the source at its original pitch.
    pub fn root_note(&self) -> f32 {
        self.root_note
    }

    /// Set root note (0.0 to 127.0).
    pub fn set_root_note(&mut self, note: f32) {
        self.root_note = clamp_finite(note, 0.0, 127.0, 60.0);
    }

    /// Output gain.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Set output gain (0.0 to 2.0).
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = clamp_finite(gain, 0.0, 2.0, 1.0);
    }

    /// Source buffer in `slot`.
    pub fn source(&self, slot: usize) -> Option<&Arc<[f32]>> {
        self.sources.get(slot).and_then(Option::as_ref)
    }

    /// Install or clear a mono source buffer. Out-of-range slots are ignored.
    pub fn set_source(&mut self, slot: usize, buffer: Option<Arc<[f32]>>) {
        if let Some(s) = self.sources.get_mut(slot) {
            *s = buffer;
        }
    }
}

fn clamp_finite(value: f32, lo: f32, hi: f32, fallback: f32) -> f32 {
    if value.is_finite() { value.clamp(lo, hi) } else { fallback }
}

/// One live grain.
#[derive(Clone, Copy, Debug, Default)]
struct Grain {
    source: usize,
    /// Read position in source samples
    position: f64,
    /// Source samples advanced per output sample (negative = reversed)
    increment: f64,
    length: usize,
    current: usize,
    window: WindowShape,
    class: usize,
    gain_l: f32,
    gain_r: f32,
}

/// Granular voice state.
#[derive(Debug, Clone)]
pub struct GranularVoice {
    grains: Vec<Grain>,
    active: ActiveIndexSet,
    scheduler: GrainScheduler,
    rng: Rng,
    envelope: EnvelopeState,
    /// Pitch ratio from the played note
    note_ratio: f32,
    velocity: f32,
    spawned: u64,
    skipped: u64,
}

impl GranularVoice {
    /// Grains currently sounding.
    pub fn active_grains(&self) -> usize {
        self.active.len()
    }

    /// Grains started since note-on.
    pub fn grains_spawned(&self) -> u64 {
        self.spawned
    }

    /// Spawns skipped (pool full or no source) since note-on.
    pub fn spawns_skipped(&self) -> u64 {
        self.skipped
    }
}

/// Granular synthesis kernel.
#[derive(Debug, Clone)]
pub struct GranularKernel {
    sample_rate: f32,
    windows: WindowBank,
}

impl Default for GranularKernel {
    fn default() -> Self {
        Self::new(48000.0)
    }
}

impl GranularKernel {
    /// Create a kernel and build its window bank.
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            windows: WindowBank::new(),
        }
    }

    /// Window tables shared by all voices.
    pub fn windows(&self) -> &WindowBank {
        &self.windows
    }

    fn spawn(&self, voice: &mut GranularVoice, params: &GranularParams) {
        let source = match params.source(params.source_index) {
            Some(s) if !s.is_empty() => s,
            _ => {
                voice.skipped += 1;
                return;
            }
        };
        let Some(slot) = voice.active.acquire() else {
            voice.skipped += 1;
            return;
        };
        let rng = &mut voice.rng;

        let base_len = params.size_ms * 0.001 * self.sample_rate;
        let len_scale = 1.0 + params.size_variation * rng.next_bipolar() * 0.5;
        let length = ((base_len * len_scale + 0.5) as usize).max(MIN_GRAIN_SAMPLES);

        let source_len = source.len() as f32;
        let pos = (params.position + params.spray * rng.next_bipolar() * 0.5).clamp(0.0, 1.0);

        let mut semitones = params.pitch + params.pitch_spread * rng.next_bipolar();
        if params.pitch_quantize {
            semitones = roundf(semitones);
        }
        let ratio = voice.note_ratio * semitones_to_ratio(semitones);
        let reverse = rng.chance(params.reverse_probability);

        let window = match params.window {
            WindowShape::Random => {
                let pick = (rng.next_f32() * WindowShape::TABLED.len() as f32) as usize;
                WindowShape::TABLED[pick.min(WindowShape::TABLED.len() - 1)]
            }
            shape => shape,
        };

        let (pl, pr) = equal_power_pan(params.stereo_spread * rng.next_bipolar());
        let overlap = params.density * params.size_ms * 0.001;
        let gain = params.gain * voice.velocity / sqrtf(overlap.max(1.0));

        voice.grains[slot] = Grain {
            source: params.source_index,
            position: f64::from(pos * (source_len - 1.0).max(0.0)),
            increment: if reverse { -f64::from(ratio) } else { f64::from(ratio) },
            length,
            current: 0,
            window,
            class: WindowBank::class_for(length),
            gain_l: gain * pl,
            gain_r: gain * pr,
        };
        voice.spawned += 1;
    }
}

/// Linear-interpolated read with wrap-around.
#[inline]
fn read_source(source: &[f32], position: f64) -> f32 {
    let len = source.len();
    if len == 0 {
        return 0.0;
    }
    let mut p = fmod(position, len as f64);
    if p < 0.0 {
        p += len as f64;
    }
    let i = (p as usize).min(len - 1);
    let j = if i + 1 == len { 0 } else { i + 1 };
    let frac = (p - i as f64) as f32;
    source[i] + (source[j] - source[i]) * frac
}

impl Kernel for GranularKernel {
    type Params = GranularParams;
    type Voice = GranularVoice;

    fn name(&self) -> &'static str {
        "granular"
    }

    fn new_voice(&self) -> GranularVoice {
        GranularVoice {
            grains: vec![Grain::default(); MAX_GRAINS],
            active: ActiveIndexSet::new(MAX_GRAINS),
            scheduler: GrainScheduler::new(),
            rng: Rng::new(1),
            envelope: EnvelopeState::new(),
            note_ratio: 1.0,
            velocity: 0.0,
            spawned: 0,
            skipped: 0,
        }
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    fn start(
        &self,
        voice: &mut GranularVoice,
        note: &NoteContext,
        params: &GranularParams,
        _tables: &Tables,
    ) {
        voice.note_ratio = if params.follow_note {
            note.frequency / midi_to_freq(params.root_note)
        } else {
            1.0
        };
        if !voice.note_ratio.is_finite() || voice.note_ratio <= 0.0 {
            voice.note_ratio = 1.0;
        }
        voice.velocity = note.velocity;
        voice.rng.reseed(note.seed);
        voice.envelope.note_on();
    }

    fn release(&self, voice: &mut GranularVoice, _params: &GranularParams) {
        voice.envelope.note_off();
    }

    fn reset(&self, voice: &mut GranularVoice) {
        voice.active.clear();
        voice.scheduler.reset();
        voice.envelope.reset();
        voice.spawned = 0;
        voice.skipped = 0;
    }

    #[inline]
    fn render(
        &self,
        voice: &mut GranularVoice,
        params: &GranularParams,
        _tables: &Tables,
    ) -> (f32, f32) {
        let level = voice.envelope.advance(&params.envelope, 1.0 / self.sample_rate);
        if !voice.envelope.is_idle()
            && voice
                .scheduler
                .tick(params.mode, params.density, self.sample_rate, &mut voice.rng)
        {
            self.spawn(voice, params);
        }

        let mut left = 0.0;
        let mut right = 0.0;
        for &slot in voice.active.as_slice() {
            let grain = &mut voice.grains[slot];
            if grain.current >= grain.length {
                continue;
            }
            let Some(source) = params.source(grain.source) else {
                // Source removed mid-grain: let it run out silently.
                grain.current = grain.length;
                continue;
            };
            let x = grain.current as f32 / grain.length as f32;
            let s = read_source(source, grain.position)
                * self.windows.value(grain.window, grain.class, x);
            left += s * grain.gain_l;
            right += s * grain.gain_r;
            grain.position += grain.increment;
            grain.current += 1;
        }
        (left * level, right * level)
    }

    fn block_end(&self, voice: &mut GranularVoice) {
        let mut n = voice.active.len();
        while n > 0 {
            n -= 1;
            let slot = voice.active.get(n);
            let grain = &voice.grains[slot];
            if grain.current >= grain.length {
                voice.active.remove(slot);
            }
        }
    }

    fn is_finished(&self, voice: &GranularVoice) -> bool {
        voice.envelope.is_idle() && voice.active.is_empty()
    }
}
