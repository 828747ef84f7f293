//! Physical modeling: waveguide strings and winds, modal percussion.
//!
//! Every voice owns two delay lines sized for a 20 Hz fundamental at the
//! current sample rate. The model picked at note-on decides how they are
//! used:
//!
//! | Model | Structure |
//! |-------|-----------|
//! | PluckedString | One line, loss filter, optional dispersion allpass |
//! | BowedString | Neck and bridge lines around a friction junction |
//! | Flute | Bore plus jet line, cubic jet nonlinearity |
//! | Clarinet | Bore, reed table |
//! | Saxophone | Two bore sections either side of the reed |
//! | Bell, Bar, Marimba | Modal bank, no delay lines |
//!
//! The dry model output optionally passes through a body resonator and a
//! DC blocker. A one-pole energy follower on the dry signal decides when a
//! waveguide voice has died away.

pub mod body;
pub mod modal;
pub mod string;
pub mod wind;

pub use body::BodyProfile;
pub use modal::{BAR_MODES, BELL_MODES, MARIMBA_MODES, MAX_MODES, Mode};
pub use string::Excitation;

use super::{Kernel, NoteContext};
use crate::envelope::{EnvelopeConfig, EnvelopeState};
use body::Body;
use modal::ModalBank;
use resona_core::{DcBlocker, FractionalRead, Rng, Tables, WaveguideDelay, sanitize};
use string::{BowedString, PluckedString};
use wind::{Wind, WindKind};

/// Lowest fundamental the delay lines can hold.
pub const LOWEST_FREQUENCY: f32 = 20.0;

/// Energy below which a voice is reclaimed.
pub const SILENCE_FLOOR: f32 = 1e-4;

const ENERGY_SMOOTHING: f32 = 0.999;

/// Which physical model a voice runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PhysicalModel {
    /// Karplus–Strong string
    #[default]
    PluckedString,
    /// Bowed string with friction junction
    BowedString,
    /// Jet-driven open bore
    Flute,
    /// Single reed, cylindrical bore
    Clarinet,
    /// Single reed, conical bore
    Saxophone,
    /// Risset bell partials
    Bell,
    /// Free-free bar (xylophone)
    Bar,
    /// Tuned marimba bar
    Marimba,
}

impl PhysicalModel {
    /// All models.
    pub const ALL: [PhysicalModel; 8] = [
        Self::PluckedString,
        Self::BowedString,
        Self::Flute,
        Self::Clarinet,
        Self::Saxophone,
        Self::Bell,
        Self::Bar,
        Self::Marimba,
    ];

    /// Lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::PluckedString => "plucked",
            Self::BowedString => "bowed",
            Self::Flute => "flute",
            Self::Clarinet => "clarinet",
            Self::Saxophone => "saxophone",
            Self::Bell => "bell",
            Self::Bar => "bar",
            Self::Marimba => "marimba",
        }
    }

    /// Parse a name produced by [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }

    /// `true` for the modal-bank models.
    pub fn is_modal(self) -> bool {
        self.modes().is_some()
    }

    /// Mode table of a modal model.
    pub fn modes(self) -> Option<&'static [Mode]> {
        match self {
            Self::Bell => Some(&BELL_MODES),
            Self::Bar => Some(&BAR_MODES),
            Self::Marimba => Some(&MARIMBA_MODES),
            _ => None,
        }
    }

    fn wind(self) -> Option<WindKind> {
        match self {
            Self::Flute => Some(WindKind::Flute),
            Self::Clarinet => Some(WindKind::Clarinet),
            Self::Saxophone => Some(WindKind::Saxophone),
            _ => None,
        }
    }
}

/// Factory patches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhysicalPreset {
    /// Steel-string acoustic with body
    AcousticGuitar,
    /// Bright, long-sustain string
    ElectricGuitar,
    /// Dark nylon string
    ClassicalGuitar,
    /// Bowed string, violin body
    Violin,
    /// Heavier bow, deeper body
    Cello,
    /// Breathy jet
    Flute,
    /// Cylindrical reed bore
    Clarinet,
    /// Conical reed bore
    Saxophone,
    /// Hard mallet on a bar
    Xylophone,
    /// Soft mallet on a tuned bar
    Marimba,
    /// Stiff plucked tine
    Kalimba,
    /// Long-ringing Risset bell
    Bell,
}

impl PhysicalPreset {
    /// All presets.
    pub const ALL: [PhysicalPreset; 12] = [
        Self::AcousticGuitar,
        Self::ElectricGuitar,
        Self::ClassicalGuitar,
        Self::Violin,
        Self::Cello,
        Self::Flute,
        Self::Clarinet,
        Self::Saxophone,
        Self::Xylophone,
        Self::Marimba,
        Self::Kalimba,
        Self::Bell,
    ];

    /// Lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::AcousticGuitar => "acoustic-guitar",
            Self::ElectricGuitar => "electric-guitar",
            Self::ClassicalGuitar => "classical-guitar",
            Self::Violin => "violin",
            Self::Cello => "cello",
            Self::Flute => "flute",
            Self::Clarinet => "clarinet",
            Self::Saxophone => "saxophone",
            Self::Xylophone => "xylophone",
            Self::Marimba => "marimba",
            Self::Kalimba => "kalimba",
            Self::Bell => "bell",
        }
    }

    /// Parse a name produced by [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

/// Engine parameters for [`PhysicalKernel`].
///
/// The model is read at note-on; changing it affects only new notes.
#[derive(Clone, Debug, PartialEq)]
pub struct PhysicalParams {
    model: PhysicalModel,
    /// Excitation shape for the plucked string
    pub excitation: Excitation,
    brightness: f32,
    decay: f32,
    damping: f32,
    stretch: f32,
    pluck_position: f32,
    bow_pressure: f32,
    bow_position: f32,
    breath_pressure: f32,
    breath_noise: f32,
    hardness: f32,
    ring_time: f32,
    body_mix: f32,
    /// Body resonance profile
    pub body: BodyProfile,
    /// High-pass the output at ~20 Hz
    pub dc_block: bool,
    /// Fractional-delay read used by the waveguides
    pub interpolation: FractionalRead,
    gain: f32,
    /// Drive envelope for bowed and wind models
    pub envelope: EnvelopeConfig,
}

impl Default for PhysicalParams {
    fn default() -> Self {
        Self::preset(PhysicalPreset::AcousticGuitar)
    }
}

impl PhysicalParams {
    /// Build a factory patch.
    pub fn preset(preset: PhysicalPreset) -> Self {
        let mut p = Self {
            model: PhysicalModel::PluckedString,
            excitation: Excitation::Pluck,
            brightness: 0.6,
            decay: 0.996,
            damping: 0.5,
            stretch: 0.0,
            pluck_position: 0.2,
            bow_pressure: 0.5,
            bow_position: 0.12,
            breath_pressure: 0.8,
            breath_noise: 0.1,
            hardness: 0.5,
            ring_time: 1.0,
            body_mix: 0.0,
            body: BodyProfile::Guitar,
            dc_block: true,
            interpolation: FractionalRead::Allpass,
            gain: 1.0,
            envelope: EnvelopeConfig::new(0.005, 0.1, 1.0, 0.2),
        };
        match preset {
            PhysicalPreset::AcousticGuitar => {
                p.brightness = 0.6;
                p.body_mix = 0.7;
            }
            PhysicalPreset::ElectricGuitar => {
                p.brightness = 0.8;
                p.decay = 0.998;
                p.pluck_position = 0.12;
                p.body_mix = 0.2;
            }
            PhysicalPreset::ClassicalGuitar => {
                p.brightness = 0.4;
                p.decay = 0.995;
                p.pluck_position = 0.3;
                p.body_mix = 0.6;
            }
            PhysicalPreset::Violin => {
                p.model = PhysicalModel::BowedString;
                p.brightness = 0.7;
                p.body = BodyProfile::Violin;
                p.body_mix = 0.8;
                p.envelope = EnvelopeConfig::new(0.08, 0.1, 0.9, 0.15);
            }
            PhysicalPreset::Cello => {
                p.model = PhysicalModel::BowedString;
                p.brightness = 0.5;
                p.bow_pressure = 0.6;
                p.bow_position = 0.15;
                p.body = BodyProfile::Violin;
                p.body_mix = 0.9;
                p.envelope = EnvelopeConfig::new(0.12, 0.1, 0.9, 0.25);
            }
            PhysicalPreset::Flute => {
                p.model = PhysicalModel::Flute;
                p.brightness = 0.8;
                p.breath_pressure = 0.7;
                p.breath_noise = 0.15;
                p.body_mix = 0.1;
                p.envelope = EnvelopeConfig::new(0.05, 0.1, 0.9, 0.1);
            }
            PhysicalPreset::Clarinet => {
                p.model = PhysicalModel::Clarinet;
                p.brightness = 0.5;
                p.breath_noise = 0.05;
                p.body_mix = 0.15;
                p.envelope = EnvelopeConfig::new(0.03, 0.1, 0.9, 0.08);
            }
            PhysicalPreset::Saxophone => {
                p.model = PhysicalModel::Saxophone;
                p.brightness = 0.6;
                p.breath_pressure = 0.85;
                p.body_mix = 0.2;
                p.envelope = EnvelopeConfig::new(0.04, 0.1, 0.9, 0.1);
            }
            PhysicalPreset::Xylophone => {
                p.model = PhysicalModel::Bar;
                p.hardness = 0.9;
                p.ring_time = 0.6;
                p.body = BodyProfile::Box;
                p.body_mix = 0.3;
            }
            PhysicalPreset::Marimba => {
                p.model = PhysicalModel::Marimba;
                p.hardness = 0.4;
                p.ring_time = 1.5;
                p.body = BodyProfile::Box;
                p.body_mix = 0.6;
            }
            PhysicalPreset::Kalimba => {
                p.excitation = Excitation::Hammer;
                p.brightness = 0.7;
                p.hardness = 0.7;
                p.stretch = 0.3;
                p.decay = 0.997;
                p.body = BodyProfile::Box;
                p.body_mix = 0.4;
            }
            PhysicalPreset::Bell => {
                p.model = PhysicalModel::Bell;
                p.hardness = 0.7;
                p.ring_time = 6.0;
                p.damping = 0.3;
            }
        }
        p
    }

    /// Model used by new notes.
    pub fn model(&self) -> PhysicalModel {
        self.model
    }

    /// Select the model for new notes.
    pub fn set_model(&mut self, model: PhysicalModel) {
        self.model = model;
    }

    /// Loss filter brightness.
    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    /// Set brightness (0.0 to 1.0, 1.0 disables the loss filter).
    pub fn set_brightness(&mut self, brightness: f32) {
        self.brightness = brightness.clamp(0.0, 1.0);
    }

    /// Loop gain applied once per round trip.
    pub fn decay(&self) -> f32 {
        self.decay
    }

    /// Set decay (0.8 to 1.0).
    pub fn set_decay(&mut self, decay: f32) {
        self.decay = decay.clamp(0.8, 1.0);
    }

    /// How quickly a released note dies.
    pub fn damping(&self) -> f32 {
        self.damping
    }

    /// Set damping (0.0 to 1.0, 0.0 lets a released note ring out).
    pub fn set_damping(&mut self, damping: f32) {
        self.damping = damping.clamp(0.0, 1.0);
    }

    /// String stiffness.
    pub fn stretch(&self) -> f32 {
        self.stretch
    }

    /// Set stretch (0.0 to 1.0, inharmonic upper partials above 0).
    pub fn set_stretch(&mut self, stretch: f32) {
        self.stretch = stretch.clamp(0.0, 1.0);
    }

    /// Pluck point along the string.
    pub fn pluck_position(&self) -> f32 {
        self.pluck_position
    }

    /// Set pluck position (0.05 to 0.95).
    pub fn set_pluck_position(&mut self, position: f32) {
        self.pluck_position = position.clamp(0.05, 0.95);
    }

    /// Bow force.
    pub fn bow_pressure(&self) -> f32 {
        self.bow_pressure
    }

    /// Set bow pressure (0.0 to 1.0).
    pub fn set_bow_pressure(&mut self, pressure: f32) {
        self.bow_pressure = pressure.clamp(0.0, 1.0);
    }

    /// Bow contact point measured from the bridge.
    pub fn bow_position(&self) -> f32 {
        self.bow_position
    }

    /// Set bow position (0.05 to 0.5).
    pub fn set_bow_position(&mut self, position: f32) {
        self.bow_position = position.clamp(0.05, 0.5);
    }

    /// Breath strength for winds.
    pub fn breath_pressure(&self) -> f32 {
        self.breath_pressure
    }

    /// Set breath pressure (0.0 to 1.0).
    pub fn set_breath_pressure(&mut self, pressure: f32) {
        self.breath_pressure = pressure.clamp(0.0, 1.0);
    }

    /// Turbulence mixed into the breath.
    pub fn breath_noise(&self) -> f32 {
        self.breath_noise
    }

    /// Set breath noise (0.0 to 1.0).
    pub fn set_breath_noise(&mut self, noise: f32) {
        self.breath_noise = noise.clamp(0.0, 1.0);
    }

    /// Mallet or hammer hardness.
    pub fn hardness(&self) -> f32 {
        self.hardness
    }

    /// Set hardness (0.0 to 1.0).
    pub fn set_hardness(&mut self, hardness: f32) {
        self.hardness = hardness.clamp(0.0, 1.0);
    }

    /// 60 dB ring time of the lowest mode of a modal model.
    pub fn ring_time(&self) -> f32 {
        self.ring_time
    }

    /// Set ring time (0.05 to 20 seconds).
    pub fn set_ring_time(&mut self, seconds: f32) {
        self.ring_time = seconds.clamp(0.05, 20.0);
    }

    /// Body resonance mix.
    pub fn body_mix(&self) -> f32 {
        self.body_mix
    }

    /// Set body mix (0.0 dry to 1.0 body only).
    pub fn set_body_mix(&mut self, mix: f32) {
        self.body_mix = mix.clamp(0.0, 1.0);
    }

    /// Output gain.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Set output gain (0.0 to 2.0).
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain.clamp(0.0, 2.0);
    }
}

/// Per-voice state for [`PhysicalKernel`].
#[derive(Clone, Debug)]
pub struct PhysicalVoice {
    lines: [WaveguideDelay; 2],
    plucked: PluckedString,
    bowed: BowedString,
    wind: Wind,
    modal: ModalBank,
    body: Body,
    dc: DcBlocker,
    drive: EnvelopeState,
    rng: Rng,
    model: PhysicalModel,
    frequency: f32,
    velocity: f32,
    energy: f32,
    fade: f32,
    released: bool,
    active: bool,
}

impl PhysicalVoice {
    /// Model this voice was started with.
    pub fn model(&self) -> PhysicalModel {
        self.model
    }

    /// Smoothed absolute output level.
    pub fn energy(&self) -> f32 {
        self.energy
    }
}

/// Physical-model kernel.
#[derive(Clone, Debug)]
pub struct PhysicalKernel {
    sample_rate: f32,
}

impl PhysicalKernel {
    /// Create a kernel at `sample_rate`.
    pub fn new(sample_rate: f32) -> Self {
        Self { sample_rate }
    }

    fn max_frequency(&self) -> f32 {
        self.sample_rate * 0.25
    }

    // Per-block filter and tuning updates. Never clears waveguide state.
    fn refresh(&self, voice: &mut PhysicalVoice, params: &PhysicalParams) {
        let sr = self.sample_rate;
        let freq = voice.frequency;
        let [a, b] = &mut voice.lines;
        a.set_fractional_read(params.interpolation);
        b.set_fractional_read(params.interpolation);
        match voice.model {
            PhysicalModel::PluckedString => {
                voice.plucked.configure(a, sr, freq, params.brightness, params.stretch);
            }
            PhysicalModel::BowedString => {
                voice
                    .bowed
                    .configure(a, b, sr, freq, params.bow_position, params.brightness);
            }
            model => {
                if let Some(kind) = model.wind() {
                    voice.wind.configure(kind, a, b, sr, freq, params.brightness);
                }
            }
        }
        if params.body_mix > 0.0 {
            voice.body.configure(params.body, sr);
        }
    }

    fn release_damping(&self, voice: &PhysicalVoice, params: &PhysicalParams) -> f32 {
        if voice.released {
            1.0 - params.damping * 0.0005
        } else {
            1.0
        }
    }
}

impl Kernel for PhysicalKernel {
    type Params = PhysicalParams;
    type Voice = PhysicalVoice;

    fn name(&self) -> &'static str {
        "physical"
    }

    fn new_voice(&self) -> PhysicalVoice {
        let line = WaveguideDelay::for_lowest_frequency(self.sample_rate, LOWEST_FREQUENCY);
        PhysicalVoice {
            lines: [line.clone(), line],
            plucked: PluckedString::default(),
            bowed: BowedString::default(),
            wind: {
                let mut wind = Wind::default();
                wind.set_sample_rate(self.sample_rate);
                wind
            },
            modal: ModalBank::default(),
            body: Body::default(),
            dc: DcBlocker::new(self.sample_rate),
            drive: EnvelopeState::new(),
            rng: Rng::new(1),
            model: PhysicalModel::default(),
            frequency: 440.0,
            velocity: 0.0,
            energy: 0.0,
            fade: 1.0,
            released: false,
            active: false,
        }
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    fn prepare_voice(&self, voice: &mut PhysicalVoice) {
        let probe = WaveguideDelay::for_lowest_frequency(self.sample_rate, LOWEST_FREQUENCY);
        for line in &mut voice.lines {
            line.resize(probe.max_delay());
        }
        voice.wind.set_sample_rate(self.sample_rate);
        voice.dc.set_sample_rate(self.sample_rate);
        voice.body.invalidate();
    }

    fn start(
        &self,
        voice: &mut PhysicalVoice,
        note: &NoteContext,
        params: &PhysicalParams,
        _tables: &Tables,
    ) {
        voice.model = params.model;
        voice.frequency = note.frequency.clamp(LOWEST_FREQUENCY, self.max_frequency());
        voice.velocity = note.velocity.clamp(0.0, 1.0);
        voice.energy = voice.velocity;
        voice.fade = 1.0;
        voice.released = false;
        voice.active = true;
        voice.rng.reseed(note.seed);
        voice.drive.note_on();
        self.refresh(voice, params);

        match voice.model {
            PhysicalModel::PluckedString => {
                voice.plucked.excite(
                    &mut voice.lines[0],
                    params.excitation,
                    params.pluck_position,
                    params.hardness,
                    voice.velocity,
                    &mut voice.rng,
                );
            }
            PhysicalModel::BowedString => {
                let [neck, bridge] = &mut voice.lines;
                voice.bowed.reset(neck, bridge);
            }
            model => {
                if let Some(modes) = model.modes() {
                    voice.modal.strike(
                        modes,
                        voice.frequency,
                        self.sample_rate,
                        params.ring_time,
                        params.hardness,
                        voice.velocity,
                    );
                } else {
                    let [bore, aux] = &mut voice.lines;
                    voice.wind.reset(bore, aux);
                }
            }
        }
    }

    fn release(&self, voice: &mut PhysicalVoice, _params: &PhysicalParams) {
        voice.released = true;
        voice.drive.note_off();
    }

    fn reset(&self, voice: &mut PhysicalVoice) {
        for line in &mut voice.lines {
            line.clear();
        }
        voice.plucked = PluckedString::default();
        voice.bowed = BowedString::default();
        let [bore, aux] = &mut voice.lines;
        voice.wind.reset(bore, aux);
        voice.modal.reset();
        voice.body.reset();
        voice.dc.reset();
        voice.drive.reset();
        voice.energy = 0.0;
        voice.fade = 1.0;
        voice.released = false;
        voice.active = false;
    }

    #[inline]
    fn render(
        &self,
        voice: &mut PhysicalVoice,
        params: &PhysicalParams,
        tables: &Tables,
    ) -> (f32, f32) {
        if !voice.active {
            return (0.0, 0.0);
        }
        let damping = self.release_damping(voice, params);
        let drive = voice.drive.advance(&params.envelope, 1.0 / self.sample_rate);
        let loop_gain = params.decay;

        let dry = match voice.model {
            PhysicalModel::PluckedString => {
                voice.plucked.tick(&mut voice.lines[0], tables, loop_gain)
            }
            PhysicalModel::BowedString => {
                let bow_velocity = (0.03 + 0.2 * voice.velocity) * drive;
                let [neck, bridge] = &mut voice.lines;
                voice.bowed.tick(
                    neck,
                    bridge,
                    tables,
                    bow_velocity,
                    params.bow_pressure,
                    loop_gain,
                )
            }
            PhysicalModel::Bell | PhysicalModel::Bar | PhysicalModel::Marimba => {
                voice.modal.tick(tables, damping)
            }
            PhysicalModel::Flute | PhysicalModel::Clarinet | PhysicalModel::Saxophone => {
                let base = match voice.model.wind() {
                    Some(kind) => kind.pressure(params.breath_pressure * voice.velocity),
                    None => 0.0,
                };
                let turbulence = 1.0 + params.breath_noise * 0.2 * voice.rng.next_bipolar();
                let breath = base * turbulence * drive;
                let [bore, aux] = &mut voice.lines;
                voice.wind.tick(bore, aux, tables, breath, loop_gain)
            }
        };
        let dry = if voice.model.is_modal() {
            sanitize(dry)
        } else {
            // Waveguides keep circulating; release fades their output.
            voice.fade *= damping;
            sanitize(dry * voice.fade)
        };
        voice.energy = voice.energy * ENERGY_SMOOTHING + dry.abs() * (1.0 - ENERGY_SMOOTHING);

        let mut out = dry;
        if params.body_mix > 0.0 {
            out = out * (1.0 - params.body_mix) + voice.body.process(out) * params.body_mix;
        }
        if params.dc_block {
            out = voice.dc.process(out);
        }
        let out = sanitize(out * params.gain);
        (out, out)
    }

    fn render_block(
        &self,
        voice: &mut PhysicalVoice,
        params: &PhysicalParams,
        tables: &Tables,
        left: &mut [f32],
        right: &mut [f32],
    ) {
        if !voice.active {
            return;
        }
        self.refresh(voice, params);
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let (a, b) = self.render(voice, params, tables);
            *l += a;
            *r += b;
        }
    }

    fn is_finished(&self, voice: &PhysicalVoice) -> bool {
        if !voice.active {
            return true;
        }
        match voice.model {
            PhysicalModel::PluckedString => voice.energy < SILENCE_FLOOR,
            PhysicalModel::Bell | PhysicalModel::Bar | PhysicalModel::Marimba => {
                voice.modal.loudest() < SILENCE_FLOOR
            }
            _ => voice.drive.is_idle() && voice.energy < SILENCE_FLOOR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    fn note(frequency: f32, velocity: f32) -> NoteContext {
        NoteContext {
            note: 69.0,
            frequency,
            velocity,
            seed: 7,
        }
    }

    fn pure_string() -> PhysicalParams {
        let mut p = PhysicalParams::preset(PhysicalPreset::ElectricGuitar);
        p.set_brightness(1.0);
        p.set_decay(1.0);
        p.set_stretch(0.0);
        p.set_body_mix(0.0);
        p.dc_block = false;
        p.interpolation = FractionalRead::Linear;
        p
    }

    fn start(kernel: &PhysicalKernel, params: &PhysicalParams, freq: f32) -> PhysicalVoice {
        let mut voice = kernel.new_voice();
        kernel.reset(&mut voice);
        kernel.start(&mut voice, &note(freq, 1.0), params, Tables::shared());
        voice
    }

    fn render(
        kernel: &PhysicalKernel,
        voice: &mut PhysicalVoice,
        params: &PhysicalParams,
        n: usize,
    ) -> Vec<f32> {
        let mut left = vec![0.0; n];
        let mut right = vec![0.0; n];
        for (l, r) in left.chunks_mut(256).zip(right.chunks_mut(256)) {
            kernel.render_block(voice, params, Tables::shared(), l, r);
        }
        left
    }

    #[test]
    fn test_karplus_strong_is_periodic() {
        let kernel = PhysicalKernel::new(SR);
        let params = pure_string();
        let mut voice = start(&kernel, &params, 480.0);
        let out = render(&kernel, &mut voice, &params, 1000);
        assert!(out.iter().any(|s| s.abs() > 0.1));
        for i in 0..900 {
            assert!(
                (out[i] - out[i + 100]).abs() < 1e-5,
                "sample {i}: {} vs {}",
                out[i],
                out[i + 100]
            );
        }
    }

    #[test]
    fn test_decay_below_one_shrinks_every_period() {
        let kernel = PhysicalKernel::new(SR);
        let mut params = pure_string();
        params.set_decay(0.99);
        let mut voice = start(&kernel, &params, 480.0);
        let out = render(&kernel, &mut voice, &params, 2000);
        let peaks: Vec<f32> = out
            .chunks(100)
            .map(|p| p.iter().fold(0.0f32, |m, s| m.max(s.abs())))
            .collect();
        for pair in peaks.windows(2) {
            assert!(pair[1] < pair[0], "{peaks:?}");
        }
    }

    #[test]
    fn test_plucked_string_finishes() {
        let kernel = PhysicalKernel::new(SR);
        let mut params = PhysicalParams::preset(PhysicalPreset::AcousticGuitar);
        params.set_decay(0.9);
        let mut voice = start(&kernel, &params, 440.0);
        assert!(!kernel.is_finished(&voice));
        render(&kernel, &mut voice, &params, SR as usize);
        assert!(kernel.is_finished(&voice));
    }

    #[test]
    fn test_release_damping_shortens_string() {
        let kernel = PhysicalKernel::new(SR);
        let mut params = pure_string();
        params.set_damping(1.0);
        let mut voice = start(&kernel, &params, 220.0);
        render(&kernel, &mut voice, &params, 1024);
        kernel.release(&mut voice, &params);
        render(&kernel, &mut voice, &params, SR as usize / 2);
        assert!(kernel.is_finished(&voice));
    }

    #[test]
    fn test_modal_bell_finishes_on_loudest_mode() {
        let kernel = PhysicalKernel::new(SR);
        let mut params = PhysicalParams::preset(PhysicalPreset::Bell);
        params.set_ring_time(0.2);
        let mut voice = start(&kernel, &params, 440.0);
        let out = render(&kernel, &mut voice, &params, 256);
        assert!(out.iter().any(|s| s.abs() > 0.01));
        assert!(!kernel.is_finished(&voice));
        render(&kernel, &mut voice, &params, SR as usize / 2);
        assert!(kernel.is_finished(&voice));
    }

    #[test]
    fn test_bowed_sustains_until_release() {
        let kernel = PhysicalKernel::new(SR);
        let params = PhysicalParams::preset(PhysicalPreset::Violin);
        let mut voice = start(&kernel, &params, 440.0);
        let out = render(&kernel, &mut voice, &params, SR as usize / 2);
        let tail = &out[out.len() - 4800..];
        assert!(tail.iter().any(|s| s.abs() > 1e-3));
        assert!(!kernel.is_finished(&voice));

        kernel.release(&mut voice, &params);
        render(&kernel, &mut voice, &params, 4 * SR as usize);
        assert!(kernel.is_finished(&voice));
    }

    #[test]
    fn test_model_locked_at_note_on() {
        let kernel = PhysicalKernel::new(SR);
        let mut params = PhysicalParams::preset(PhysicalPreset::AcousticGuitar);
        let mut voice = start(&kernel, &params, 440.0);
        params.set_model(PhysicalModel::Bell);
        render(&kernel, &mut voice, &params, 256);
        assert_eq!(voice.model(), PhysicalModel::PluckedString);
    }

    #[test]
    fn test_every_preset_is_finite_and_audible() {
        let kernel = PhysicalKernel::new(SR);
        for preset in PhysicalPreset::ALL {
            let params = PhysicalParams::preset(preset);
            let mut voice = start(&kernel, &params, 330.0);
            let out = render(&kernel, &mut voice, &params, 9600);
            assert!(out.iter().all(|s| s.is_finite()), "{preset:?}");
            let peak = out.iter().fold(0.0f32, |m, s| m.max(s.abs()));
            assert!(peak > 1e-3 && peak < 10.0, "{preset:?} peak {peak}");
        }
    }

    #[test]
    fn test_reset_voice_is_finished_and_silent() {
        let kernel = PhysicalKernel::new(SR);
        let params = PhysicalParams::default();
        let mut voice = start(&kernel, &params, 440.0);
        kernel.reset(&mut voice);
        assert!(kernel.is_finished(&voice));
        let out = render(&kernel, &mut voice, &params, 64);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_sample_rate_change_resizes_lines() {
        let mut kernel = PhysicalKernel::new(SR);
        let mut voice = kernel.new_voice();
        kernel.set_sample_rate(96000.0);
        kernel.prepare_voice(&mut voice);
        assert!(voice.lines[0].max_delay() as f32 >= 96000.0 / LOWEST_FREQUENCY);
    }

    #[test]
    fn test_setters_clamp() {
        let mut p = PhysicalParams::default();
        p.set_decay(2.0);
        p.set_brightness(-1.0);
        p.set_ring_time(100.0);
        p.set_bow_position(0.9);
        assert_eq!(p.decay(), 1.0);
        assert_eq!(p.brightness(), 0.0);
        assert_eq!(p.ring_time(), 20.0);
        assert_eq!(p.bow_position(), 0.5);
    }

    #[test]
    fn test_names_round_trip() {
        for m in PhysicalModel::ALL {
            assert_eq!(PhysicalModel::from_name(m.name()), Some(m));
        }
        for p in PhysicalPreset::ALL {
            assert_eq!(PhysicalPreset::from_name(p.name()), Some(p));
        }
    }
}
