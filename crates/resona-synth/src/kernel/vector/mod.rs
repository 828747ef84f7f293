//! Vector synthesis: four sources blended by a 2-D joystick position.
//!
//! The position `(x, y)` in `[-1, 1]²` maps to bilinear weights over the
//! four corners:
//!
//! ```text
//!   A (-1, 1) ---- B (1, 1)        u = (x + 1) / 2, v = (y + 1) / 2
//!      |              |            A = (1 - u) v      B = u v
//!   C (-1,-1) ---- D (1,-1)        C = (1 - u)(1 - v) D = u (1 - v)
//! ```
//!
//! The position comes from the manual setting or, when a path has points,
//! from the per-voice [`PathCursor`]. Two LFOs add to x and y before the
//! result is clamped. LFOs run per voice and can lock to a
//! [`TempoContext`] delivered through [`Kernel::set_tempo`].

pub mod path;

pub use path::{MAX_PATH_POINTS, PathCursor, PathPoint, VectorPath};

use super::{Kernel, NoteContext};
use crate::envelope::{EnvelopeConfig, EnvelopeState};
use crate::oscillator::{Oscillator, OscillatorWaveform};
use libm::sqrtf;
use resona_core::{Lfo, LfoWaveform, NoteDivision, Rng, Tables, TempoContext, cents_to_ratio, sanitize};

#[cfg(not(feature = "std"))]
use alloc::sync::Arc;
#[cfg(feature = "std")]
use std::sync::Arc;

/// Sources per voice.
pub const SOURCES: usize = 4;

/// Detuned saws in a super-saw source.
pub const SUPERSAW_VOICES: usize = 7;

const SUPERSAW_OFFSETS: [f32; SUPERSAW_VOICES] = [-1.0, -0.62, -0.28, 0.0, 0.28, 0.62, 1.0];
const SUPERSAW_SIDE_GAIN: f32 = 0.6;
const PWM_RATE_HZ: f32 = 0.7;

/// What one source produces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SourceWaveform {
    /// Sine
    #[default]
    Sine,
    /// PolyBLEP saw
    Saw,
    /// PolyBLEP pulse at the source's pulse width
    Pulse,
    /// Integrated PolyBLEP square
    Triangle,
    /// White noise
    Noise,
    /// Shared single-cycle wavetable (sine when none is loaded)
    Wavetable,
    /// Seven detuned saws
    SuperSaw,
    /// Pulse with slowly swept width
    Pwm,
    /// Saw reset by a master at the note frequency
    HardSync,
    /// Pitch-synchronous vowel formants
    Formant,
}

impl SourceWaveform {
    /// All waveforms.
    pub const ALL: [SourceWaveform; 10] = [
        Self::Sine,
        Self::Saw,
        Self::Pulse,
        Self::Triangle,
        Self::Noise,
        Self::Wavetable,
        Self::SuperSaw,
        Self::Pwm,
        Self::HardSync,
        Self::Formant,
    ];

    /// Lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sine => "sine",
            Self::Saw => "saw",
            Self::Pulse => "pulse",
            Self::Triangle => "triangle",
            Self::Noise => "noise",
            Self::Wavetable => "wavetable",
            Self::SuperSaw => "supersaw",
            Self::Pwm => "pwm",
            Self::HardSync => "hardsync",
            Self::Formant => "formant",
        }
    }

    /// Parse a name produced by [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|w| w.name() == name)
    }
}

/// Vowel for the formant source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Vowel {
    /// "ah"
    #[default]
    A,
    /// "eh"
    E,
    /// "ee"
    I,
    /// "oh"
    O,
    /// "oo"
    U,
}

impl Vowel {
    /// First three formants as `(Hz, gain)`.
    pub fn formants(self) -> [(f32, f32); 3] {
        match self {
            Self::A => [(800.0, 1.0), (1150.0, 0.5), (2900.0, 0.25)],
            Self::E => [(400.0, 1.0), (1700.0, 0.45), (2600.0, 0.25)],
            Self::I => [(270.0, 1.0), (2140.0, 0.3), (2950.0, 0.2)],
            Self::O => [(450.0, 1.0), (800.0, 0.6), (2830.0, 0.15)],
            Self::U => [(325.0, 1.0), (700.0, 0.4), (2700.0, 0.1)],
        }
    }
}

/// Settings for one corner source.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SourceParams {
    waveform: SourceWaveform,
    detune_cents: f32,
    level: f32,
    pulse_width: f32,
    pwm_depth: f32,
    supersaw_spread: f32,
    sync_ratio: f32,
    vowel: Vowel,
}

impl Default for SourceParams {
    fn default() -> Self {
        Self::new(SourceWaveform::Sine)
    }
}

impl SourceParams {
    /// Unit-level source of `waveform`.
    pub fn new(waveform: SourceWaveform) -> Self {
        Self {
            waveform,
            detune_cents: 0.0,
            level: 1.0,
            pulse_width: 0.5,
            pwm_depth: 0.5,
            supersaw_spread: 25.0,
            sync_ratio: 2.0,
            vowel: Vowel::A,
        }
    }

    /// Waveform.
    pub fn waveform(&self) -> SourceWaveform {
        self.waveform
    }

    /// Set waveform.
    pub fn set_waveform(&mut self, waveform: SourceWaveform) {
        self.waveform = waveform;
    }

    /// Detune in cents.
    pub fn detune_cents(&self) -> f32 {
        self.detune_cents
    }

    /// Set detune (-1200 to 1200 cents).
    pub fn set_detune_cents(&mut self, cents: f32) {
        self.detune_cents = cents.clamp(-1200.0, 1200.0);
    }

    /// Output level.
    pub fn level(&self) -> f32 {
        self.level
    }

    /// Set level (0.0 to 1.0).
    pub fn set_level(&mut self, level: f32) {
        self.level = level.clamp(0.0, 1.0);
    }

    /// Pulse width for pulse and PWM sources.
    pub fn pulse_width(&self) -> f32 {
        self.pulse_width
    }

    /// Set pulse width (0.05 to 0.95).
    pub fn set_pulse_width(&mut self, width: f32) {
        self.pulse_width = width.clamp(0.05, 0.95);
    }

    /// Width sweep depth for PWM.
    pub fn pwm_depth(&self) -> f32 {
        self.pwm_depth
    }

    /// Set PWM depth (0.0 to 1.0).
    pub fn set_pwm_depth(&mut self, depth: f32) {
        self.pwm_depth = depth.clamp(0.0, 1.0);
    }

    /// Outer super-saw detune in cents.
    pub fn supersaw_spread(&self) -> f32 {
        self.supersaw_spread
    }

    /// Set super-saw spread (0 to 100 cents).
    pub fn set_supersaw_spread(&mut self, cents: f32) {
        self.supersaw_spread = cents.clamp(0.0, 100.0);
    }

    /// Slave-to-master frequency ratio for hard sync.
    pub fn sync_ratio(&self) -> f32 {
        self.sync_ratio
    }

    /// Set sync ratio (1.0 to 8.0).
    pub fn set_sync_ratio(&mut self, ratio: f32) {
        self.sync_ratio = ratio.clamp(1.0, 8.0);
    }

    /// Formant vowel.
    pub fn vowel(&self) -> Vowel {
        self.vowel
    }

    /// Set formant vowel.
    pub fn set_vowel(&mut self, vowel: Vowel) {
        self.vowel = vowel;
    }
}

/// Settings for one position LFO.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LfoParams {
    rate_hz: f32,
    depth: f32,
    /// LFO shape
    pub waveform: LfoWaveform,
    /// Lock to the tempo source at this division
    pub sync: Option<NoteDivision>,
}

impl Default for LfoParams {
    fn default() -> Self {
        Self {
            rate_hz: 0.25,
            depth: 0.0,
            waveform: LfoWaveform::Sine,
            sync: None,
        }
    }
}

impl LfoParams {
    /// Free-running LFO at `rate_hz` with `depth`.
    pub fn new(rate_hz: f32, depth: f32) -> Self {
        let mut p = Self::default();
        p.set_rate_hz(rate_hz);
        p.set_depth(depth);
        p
    }

    /// Rate in Hz.
    pub fn rate_hz(&self) -> f32 {
        self.rate_hz
    }

    /// Set rate (0 to 20 Hz).
    pub fn set_rate_hz(&mut self, hz: f32) {
        self.rate_hz = hz.clamp(0.0, 20.0);
    }

    /// Depth in position units.
    pub fn depth(&self) -> f32 {
        self.depth
    }

    /// Set depth (0.0 to 1.0).
    pub fn set_depth(&mut self, depth: f32) {
        self.depth = depth.clamp(0.0, 1.0);
    }
}

/// Factory patches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VectorPreset {
    /// Slowly circling pad
    Pad,
    /// Looping square path across all corners
    Sweep,
    /// Hard-sync lead
    SyncLead,
    /// Vowel morph
    Vowels,
    /// Pulse, PWM and noise textures
    Digital,
}

impl VectorPreset {
    /// All presets.
    pub const ALL: [VectorPreset; 5] = [
        Self::Pad,
        Self::Sweep,
        Self::SyncLead,
        Self::Vowels,
        Self::Digital,
    ];

    /// Lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Pad => "pad",
            Self::Sweep => "sweep",
            Self::SyncLead => "sync-lead",
            Self::Vowels => "vowels",
            Self::Digital => "digital",
        }
    }

    /// Parse a name produced by [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

/// Engine parameters for [`VectorKernel`].
#[derive(Clone, Debug, PartialEq)]
pub struct VectorParams {
    /// Sources A, B, C, D
    pub sources: [SourceParams; SOURCES],
    position: (f32, f32),
    /// Breakpoint path; empty means the manual position is used
    pub path: VectorPath,
    /// LFO added to x
    pub lfo_x: LfoParams,
    /// LFO added to y
    pub lfo_y: LfoParams,
    wavetable: Option<Arc<[f32]>>,
    gain: f32,
    /// Amplitude envelope
    pub envelope: EnvelopeConfig,
}

impl Default for VectorParams {
    fn default() -> Self {
        Self::preset(VectorPreset::Pad)
    }
}

impl VectorParams {
    /// Build a factory patch.
    pub fn preset(preset: VectorPreset) -> Self {
        use SourceWaveform as W;
        let mut p = Self {
            sources: [
                SourceParams::new(W::Saw),
                SourceParams::new(W::SuperSaw),
                SourceParams::new(W::Triangle),
                SourceParams::new(W::Sine),
            ],
            position: (0.0, 0.0),
            path: VectorPath::new(),
            lfo_x: LfoParams::new(0.13, 0.6),
            lfo_y: LfoParams::new(0.21, 0.6),
            wavetable: None,
            gain: 0.5,
            envelope: EnvelopeConfig::new(0.4, 0.5, 0.8, 1.2),
        };
        match preset {
            VectorPreset::Pad => {
                p.sources[1].set_detune_cents(7.0);
                p.lfo_y.waveform = LfoWaveform::Triangle;
            }
            VectorPreset::Sweep => {
                p.path = VectorPath::from_points(&[
                    PathPoint::new(-1.0, 1.0, 0.0),
                    PathPoint::new(1.0, 1.0, 1.5),
                    PathPoint::new(1.0, -1.0, 1.5),
                    PathPoint::new(-1.0, -1.0, 1.5),
                    PathPoint::new(-1.0, 1.0, 1.5),
                ]);
                p.path.set_loop(0, 4);
                p.lfo_x = LfoParams::default();
                p.lfo_y = LfoParams::default();
            }
            VectorPreset::SyncLead => {
                p.sources = [
                    SourceParams::new(W::HardSync),
                    SourceParams::new(W::HardSync),
                    SourceParams::new(W::Saw),
                    SourceParams::new(W::Pulse),
                ];
                p.sources[1].set_sync_ratio(3.5);
                p.sources[3].set_pulse_width(0.3);
                p.lfo_x = LfoParams::new(5.0, 0.4);
                p.lfo_y = LfoParams::default();
                p.position = (0.0, 0.6);
                p.envelope = EnvelopeConfig::new(0.005, 0.3, 0.7, 0.2);
            }
            VectorPreset::Vowels => {
                for (src, vowel) in p.sources.iter_mut().zip([Vowel::A, Vowel::E, Vowel::O, Vowel::U]) {
                    *src = SourceParams::new(W::Formant);
                    src.set_vowel(vowel);
                }
                p.lfo_x = LfoParams::new(0.5, 1.0);
                p.lfo_y = LfoParams::new(0.31, 1.0);
            }
            VectorPreset::Digital => {
                p.sources = [
                    SourceParams::new(W::Pulse),
                    SourceParams::new(W::Pwm),
                    SourceParams::new(W::Wavetable),
                    SourceParams::new(W::Noise),
                ];
                p.sources[3].set_level(0.2);
                p.lfo_x = LfoParams::new(2.0, 0.8);
                p.lfo_x.waveform = LfoWaveform::SampleAndHold;
                p.envelope = EnvelopeConfig::new(0.01, 0.2, 0.6, 0.3);
            }
        }
        p
    }

    /// Manual joystick position.
    pub fn position(&self) -> (f32, f32) {
        self.position
    }

    /// Set the manual position (each axis -1.0 to 1.0).
    pub fn set_position(&mut self, x: f32, y: f32) {
        self.position = (x.clamp(-1.0, 1.0), y.clamp(-1.0, 1.0));
    }

    /// Output gain.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Set output gain (0.0 to 2.0).
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain.clamp(0.0, 2.0);
    }

    /// Shared single-cycle wavetable.
    pub fn wavetable(&self) -> Option<&Arc<[f32]>> {
        self.wavetable.as_ref()
    }

    /// Load or clear the wavetable used by [`SourceWaveform::Wavetable`] sources.
    pub fn set_wavetable(&mut self, table: Option<Arc<[f32]>>) {
        self.wavetable = table.filter(|t| !t.is_empty());
    }
}

/// Corner weights `[A, B, C, D]` for a position in `[-1, 1]²`.
#[inline]
pub fn bilinear_weights(x: f32, y: f32) -> [f32; SOURCES] {
    let u = (x.clamp(-1.0, 1.0) + 1.0) * 0.5;
    let v = (y.clamp(-1.0, 1.0) + 1.0) * 0.5;
    [(1.0 - u) * v, u * v, (1.0 - u) * (1.0 - v), u * (1.0 - v)]
}

#[derive(Clone, Debug)]
struct SourceState {
    /// `oscs[0]` is the main oscillator (hard-sync master); all seven are super-saw voices
    oscs: [Oscillator; SUPERSAW_VOICES],
    slave: Oscillator,
    pwm_phase: f32,
}

impl SourceState {
    fn new(sample_rate: f32) -> Self {
        Self {
            oscs: core::array::from_fn(|_| Oscillator::new(sample_rate)),
            slave: Oscillator::new(sample_rate),
            pwm_phase: 0.0,
        }
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        for osc in &mut self.oscs {
            osc.set_sample_rate(sample_rate);
        }
        self.slave.set_sample_rate(sample_rate);
    }

    fn reset(&mut self) {
        for osc in &mut self.oscs {
            osc.reset();
        }
        self.slave.reset();
        self.pwm_phase = 0.0;
    }

    fn configure(&mut self, p: &SourceParams, note_hz: f32) {
        let base = note_hz * cents_to_ratio(p.detune_cents);
        let main = &mut self.oscs[0];
        main.set_frequency(base);
        match p.waveform {
            SourceWaveform::Sine => main.set_waveform(OscillatorWaveform::Sine),
            SourceWaveform::Saw => main.set_waveform(OscillatorWaveform::Saw),
            SourceWaveform::Pulse => main.set_waveform(OscillatorWaveform::Pulse(p.pulse_width)),
            SourceWaveform::Triangle => main.set_waveform(OscillatorWaveform::Triangle),
            SourceWaveform::Noise => main.set_waveform(OscillatorWaveform::Noise),
            SourceWaveform::SuperSaw => {
                for (osc, offset) in self.oscs.iter_mut().zip(SUPERSAW_OFFSETS) {
                    osc.set_frequency(base * cents_to_ratio(offset * p.supersaw_spread));
                    osc.set_waveform(OscillatorWaveform::Saw);
                }
            }
            SourceWaveform::HardSync => {
                self.slave.set_frequency(base * p.sync_ratio);
                self.slave.set_waveform(OscillatorWaveform::Saw);
            }
            SourceWaveform::Wavetable | SourceWaveform::Pwm | SourceWaveform::Formant => {}
        }
    }

    #[inline]
    fn next(
        &mut self,
        p: &SourceParams,
        wavetable: Option<&[f32]>,
        tables: &Tables,
        sample_rate: f32,
    ) -> f32 {
        match p.waveform {
            SourceWaveform::Sine
            | SourceWaveform::Saw
            | SourceWaveform::Pulse
            | SourceWaveform::Triangle
            | SourceWaveform::Noise => self.oscs[0].advance(),
            SourceWaveform::SuperSaw => {
                let norm = 1.0 / sqrtf(1.0 + 6.0 * SUPERSAW_SIDE_GAIN * SUPERSAW_SIDE_GAIN);
                let mut sum = 0.0;
                for (i, osc) in self.oscs.iter_mut().enumerate() {
                    let gain = if i == SUPERSAW_VOICES / 2 { 1.0 } else { SUPERSAW_SIDE_GAIN };
                    sum += osc.advance() * gain;
                }
                sum * norm
            }
            SourceWaveform::Pwm => {
                self.pwm_phase += PWM_RATE_HZ / sample_rate;
                if self.pwm_phase >= 1.0 {
                    self.pwm_phase -= 1.0;
                }
                let duty = (p.pulse_width + p.pwm_depth * 0.45 * tables.sin(self.pwm_phase))
                    .clamp(0.05, 0.95);
                self.oscs[0].set_waveform(OscillatorWaveform::Pulse(duty));
                self.oscs[0].advance()
            }
            SourceWaveform::HardSync => {
                let out = self.slave.advance();
                let master = &mut self.oscs[0];
                if master.tick() {
                    // Place the slave where it would be had it restarted exactly at the wrap.
                    let inc = master.phase_increment();
                    if inc > 0.0 {
                        let since = master.phase() / inc;
                        self.slave.set_phase(since * self.slave.phase_increment());
                    }
                }
                out
            }
            SourceWaveform::Wavetable => {
                let phase = self.oscs[0].phase();
                self.oscs[0].tick();
                match wavetable {
                    Some(table) => read_cycle(table, phase),
                    None => tables.sin(phase),
                }
            }
            SourceWaveform::Formant => {
                let osc = &mut self.oscs[0];
                let phase = osc.phase();
                let f0 = osc.frequency();
                osc.tick();
                if f0 <= 0.0 {
                    return 0.0;
                }
                let nyquist = sample_rate * 0.5;
                let window = 0.5 - 0.5 * tables.cos(phase);
                let mut sum = 0.0;
                for (hz, gain) in p.vowel.formants() {
                    if hz < nyquist {
                        sum += gain * tables.sin(phase * hz / f0);
                    }
                }
                sum * window
            }
        }
    }
}

#[inline]
fn read_cycle(table: &[f32], phase: f32) -> f32 {
    let len = table.len();
    let pos = phase * len as f32;
    let index = (pos as usize).min(len - 1);
    let frac = pos - index as f32;
    let a = table[index];
    let b = table[(index + 1) % len];
    a + (b - a) * frac
}

/// Per-voice state for [`VectorKernel`].
#[derive(Clone, Debug)]
pub struct VectorVoice {
    sources: [SourceState; SOURCES],
    cursor: PathCursor,
    lfo_x: Lfo,
    lfo_y: Lfo,
    envelope: EnvelopeState,
    frequency: f32,
    velocity: f32,
    position: (f32, f32),
}

impl VectorVoice {
    /// Position used for the most recent sample.
    pub fn position(&self) -> (f32, f32) {
        self.position
    }

    /// Current corner weights.
    pub fn weights(&self) -> [f32; SOURCES] {
        bilinear_weights(self.position.0, self.position.1)
    }

    /// Amplitude envelope level.
    pub fn envelope_level(&self) -> f32 {
        self.envelope.level()
    }
}

/// Vector kernel.
#[derive(Clone, Debug)]
pub struct VectorKernel {
    sample_rate: f32,
    tempo: Option<TempoContext>,
}

impl VectorKernel {
    /// Create a kernel at `sample_rate`.
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            tempo: None,
        }
    }

    fn refresh(&self, voice: &mut VectorVoice, params: &VectorParams) {
        for (state, p) in voice.sources.iter_mut().zip(&params.sources) {
            state.configure(p, voice.frequency);
        }
        for (lfo, p) in [(&mut voice.lfo_x, &params.lfo_x), (&mut voice.lfo_y, &params.lfo_y)] {
            lfo.set_frequency(p.rate_hz);
            lfo.set_waveform(p.waveform);
            lfo.set_tempo_sync(p.sync);
            if let Some(ctx) = &self.tempo {
                lfo.apply_tempo(ctx);
            }
        }
    }
}

impl Kernel for VectorKernel {
    type Params = VectorParams;
    type Voice = VectorVoice;

    fn name(&self) -> &'static str {
        "vector"
    }

    fn new_voice(&self) -> VectorVoice {
        VectorVoice {
            sources: core::array::from_fn(|_| SourceState::new(self.sample_rate)),
            cursor: PathCursor::default(),
            lfo_x: Lfo::new(self.sample_rate, 0.0),
            lfo_y: Lfo::new(self.sample_rate, 0.0),
            envelope: EnvelopeState::new(),
            frequency: 0.0,
            velocity: 0.0,
            position: (0.0, 0.0),
        }
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    fn prepare_voice(&self, voice: &mut VectorVoice) {
        for source in &mut voice.sources {
            source.set_sample_rate(self.sample_rate);
        }
        voice.lfo_x.set_sample_rate(self.sample_rate);
        voice.lfo_y.set_sample_rate(self.sample_rate);
    }

    fn set_tempo(&mut self, ctx: &TempoContext) {
        self.tempo = Some(*ctx);
    }

    fn start(
        &self,
        voice: &mut VectorVoice,
        note: &NoteContext,
        params: &VectorParams,
        _tables: &Tables,
    ) {
        voice.frequency = note.frequency;
        voice.velocity = note.velocity;
        let mut rng = Rng::new(note.seed);
        for (i, source) in voice.sources.iter_mut().enumerate() {
            for osc in &mut source.oscs {
                osc.set_seed(note.seed ^ (0x9E37_79B9u32.wrapping_mul(i as u32 + 1)));
            }
            if params.sources[i].waveform == SourceWaveform::SuperSaw {
                for osc in &mut source.oscs {
                    osc.set_phase(rng.next_f32());
                }
            }
        }
        voice.cursor.reset();
        voice.position = if params.path.is_empty() {
            params.position
        } else {
            params.path.position_at_start()
        };
        voice.envelope.note_on();
        self.refresh(voice, params);
    }

    fn release(&self, voice: &mut VectorVoice, _params: &VectorParams) {
        voice.envelope.note_off();
    }

    fn reset(&self, voice: &mut VectorVoice) {
        for source in &mut voice.sources {
            source.reset();
        }
        voice.cursor.reset();
        voice.lfo_x.reset();
        voice.lfo_y.reset();
        voice.envelope.reset();
        voice.position = (0.0, 0.0);
    }

    #[inline]
    fn render(&self, voice: &mut VectorVoice, params: &VectorParams, tables: &Tables) -> (f32, f32) {
        let dt = 1.0 / self.sample_rate;
        let env = voice.envelope.advance(&params.envelope, dt);

        let (bx, by) = if params.path.is_empty() {
            params.position
        } else {
            voice.cursor.advance(&params.path, dt)
        };
        let x = (bx + voice.lfo_x.next() * params.lfo_x.depth).clamp(-1.0, 1.0);
        let y = (by + voice.lfo_y.next() * params.lfo_y.depth).clamp(-1.0, 1.0);
        voice.position = (x, y);
        let weights = bilinear_weights(x, y);

        let wavetable = params.wavetable.as_deref();
        let mut sum = 0.0;
        for ((state, p), w) in voice.sources.iter_mut().zip(&params.sources).zip(weights) {
            let s = state.next(p, wavetable, tables, self.sample_rate);
            sum += s * w * p.level;
        }
        let out = sanitize(sum * env * voice.velocity * params.gain);
        (out, out)
    }

    fn render_block(
        &self,
        voice: &mut VectorVoice,
        params: &VectorParams,
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

    fn is_finished(&self, voice: &VectorVoice) -> bool {
        voice.envelope.is_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    fn started(params: &VectorParams, freq: f32) -> (VectorKernel, VectorVoice) {
        let kernel = VectorKernel::new(SR);
        let mut voice = kernel.new_voice();
        let note = NoteContext {
            note: 57.0,
            frequency: freq,
            velocity: 1.0,
            seed: 7,
        };
        kernel.reset(&mut voice);
        kernel.start(&mut voice, &note, params, Tables::shared());
        (kernel, voice)
    }

    fn static_params(sources: [SourceWaveform; SOURCES], x: f32, y: f32) -> VectorParams {
        let mut params = VectorParams::preset(VectorPreset::Pad);
        params.sources = sources.map(SourceParams::new);
        params.lfo_x = LfoParams::default();
        params.lfo_y = LfoParams::default();
        params.set_position(x, y);
        params.set_gain(1.0);
        params.envelope = EnvelopeConfig::gate();
        params
    }

    fn render(kernel: &VectorKernel, voice: &mut VectorVoice, params: &VectorParams, n: usize) -> Vec<f32> {
        let mut left = vec![0.0; n];
        let mut right = vec![0.0; n];
        kernel.render_block(voice, params, Tables::shared(), &mut left, &mut right);
        left
    }

    #[test]
    fn test_bilinear_corners() {
        assert_eq!(bilinear_weights(-1.0, 1.0), [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(bilinear_weights(1.0, 1.0), [0.0, 1.0, 0.0, 0.0]);
        assert_eq!(bilinear_weights(-1.0, -1.0), [0.0, 0.0, 1.0, 0.0]);
        assert_eq!(bilinear_weights(1.0, -1.0), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(bilinear_weights(0.0, 0.0), [0.25; 4]);
        let w = bilinear_weights(0.3, -0.7);
        assert!((w.iter().sum::<f32>() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_corner_isolates_source() {
        use SourceWaveform as W;
        let params = static_params([W::Sine, W::Noise, W::Noise, W::Noise], -1.0, 1.0);
        let (kernel, mut voice) = started(&params, 375.0);
        let out = render(&kernel, &mut voice, &params, 256);
        for (n, &s) in out.iter().enumerate() {
            let expected = libm::sinf(core::f32::consts::TAU * 375.0 * n as f32 / SR);
            assert!((s - expected).abs() < 1e-3, "sample {n}: {s} vs {expected}");
        }
    }

    #[test]
    fn test_lfo_moves_position() {
        use SourceWaveform as W;
        let mut params = static_params([W::Sine, W::Saw, W::Triangle, W::Pulse], 0.0, 0.0);
        params.lfo_x = LfoParams::new(10.0, 1.0);
        let (kernel, mut voice) = started(&params, 220.0);
        let mut xs = Vec::new();
        for _ in 0..48 {
            render(&kernel, &mut voice, &params, 100);
            xs.push(voice.position().0);
        }
        let min = xs.iter().copied().fold(f32::MAX, f32::min);
        let max = xs.iter().copied().fold(f32::MIN, f32::max);
        assert!(max > 0.5 && min < -0.5, "x range {min}..{max}");
        assert!(xs.iter().all(|x| (-1.0..=1.0).contains(x)));
        assert_eq!(voice.position().1, 0.0);
    }

    #[test]
    fn test_path_drives_position() {
        let mut params = VectorParams::preset(VectorPreset::Sweep);
        params.path = VectorPath::from_points(&[
            PathPoint::new(-1.0, 1.0, 0.0),
            PathPoint::new(1.0, 1.0, 0.01),
        ]);
        let (kernel, mut voice) = started(&params, 220.0);
        render(&kernel, &mut voice, &params, 960);
        assert_eq!(voice.position(), (1.0, 1.0));
        assert_eq!(voice.weights(), [0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_tempo_sync_locks_lfo_phase() {
        let mut params = static_params([SourceWaveform::Sine; SOURCES], 0.0, 0.0);
        params.lfo_x = LfoParams::new(1.0, 1.0);
        params.lfo_x.sync = Some(NoteDivision::Quarter);
        params.lfo_x.waveform = LfoWaveform::Saw;
        let mut kernel = VectorKernel::new(SR);
        let mut ctx = TempoContext::playing(120.0);
        ctx.beat_position = 0.5;
        kernel.set_tempo(&ctx);
        let mut voice = kernel.new_voice();
        let note = NoteContext {
            note: 60.0,
            frequency: 261.6,
            velocity: 1.0,
            seed: 1,
        };
        kernel.start(&mut voice, &note, &params, Tables::shared());
        kernel.render(&mut voice, &params, Tables::shared());
        // Half-way through a quarter note: saw LFO at 0.
        assert!(voice.position().0.abs() < 1e-3, "x = {}", voice.position().0);
    }

    #[test]
    fn test_every_waveform_sounds() {
        for waveform in SourceWaveform::ALL {
            let params = static_params([waveform; SOURCES], 0.0, 0.0);
            let (kernel, mut voice) = started(&params, 220.0);
            let out = render(&kernel, &mut voice, &params, 2048);
            assert!(out.iter().all(|s| s.is_finite()), "{}", waveform.name());
            let peak = out.iter().fold(0.0f32, |m, s| m.max(s.abs()));
            assert!(peak > 0.05, "{} peak {peak}", waveform.name());
            assert_eq!(SourceWaveform::from_name(waveform.name()), Some(waveform));
        }
    }

    #[test]
    fn test_wavetable_source() {
        let mut params = static_params([SourceWaveform::Wavetable; SOURCES], -1.0, 1.0);
        let table: Arc<[f32]> = (0..64).map(|i| if i < 32 { 0.5 } else { -0.5 }).collect();
        params.set_wavetable(Some(table));
        let (kernel, mut voice) = started(&params, 375.0);
        let out = render(&kernel, &mut voice, &params, 128);
        assert!((out[10] - 0.5).abs() < 1e-6);
        assert!((out[100] + 0.5).abs() < 1e-6);

        params.set_wavetable(Some(Arc::from(Vec::new())));
        assert!(params.wavetable().is_none());
    }

    #[test]
    fn test_hard_sync_period_follows_master() {
        let mut params = static_params([SourceWaveform::HardSync; SOURCES], -1.0, 1.0);
        params.sources[0].set_sync_ratio(2.7);
        let (kernel, mut voice) = started(&params, 375.0);
        // 375 Hz at 48 kHz is exactly 128 samples per master cycle.
        let out = render(&kernel, &mut voice, &params, 1024);
        for n in 300..400 {
            assert!((out[n] - out[n + 128]).abs() < 0.05, "sample {n}");
        }
    }

    #[test]
    fn test_finishes_after_release() {
        let mut params = VectorParams::preset(VectorPreset::SyncLead);
        params.envelope = EnvelopeConfig::new(0.0, 0.0, 1.0, 0.005);
        let (kernel, mut voice) = started(&params, 110.0);
        render(&kernel, &mut voice, &params, 64);
        assert!(!kernel.is_finished(&voice));
        kernel.release(&mut voice, &params);
        render(&kernel, &mut voice, &params, 480);
        assert!(kernel.is_finished(&voice));
    }

    #[test]
    fn test_presets_render() {
        for preset in VectorPreset::ALL {
            let params = VectorParams::preset(preset);
            let (kernel, mut voice) = started(&params, 196.0);
            let out = render(&kernel, &mut voice, &params, 48000);
            assert!(out.iter().all(|s| s.is_finite()), "{}", preset.name());
            assert!(out.iter().any(|s| s.abs() > 1e-3), "{}", preset.name());
            assert_eq!(VectorPreset::from_name(preset.name()), Some(preset));
        }
    }
}
