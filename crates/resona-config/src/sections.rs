//! Per-engine parameter tables.
//!
//! Every field is optional: a table only overrides what it names, layered on
//! top of the selected preset (or the engine defaults). Values are checked by
//! [`validate`](AdditiveSection::validate) and rejected rather than clamped, so
//! a typo in a config file surfaces as an error instead of a silent fallback.

use resona_synth::kernel::additive::MAX_PARTIALS;
use resona_synth::kernel::fm::ALGORITHM_COUNT;
use resona_synth::{
    AdditiveParams, BodyProfile, EnvelopeConfig, Excitation, FmParams,
    GranularParams, PhysicalModel, PhysicalParams, SchedulingMode, VectorParams, WindowShape,
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn check_range(field: &str, value: Option<f32>, min: f32, max: f32) -> Result<(), ConfigError> {
    match value {
        Some(v) if !v.is_finite() => Err(ConfigError::invalid(field, "must be a finite number")),
        Some(v) if v < min || v > max => Err(ConfigError::invalid(
            field,
            format!("must be in {min}..={max}, got {v}"),
        )),
        _ => Ok(()),
    }
}

fn check_name<T>(
    field: &str,
    value: Option<&str>,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>, ConfigError> {
    value
        .map(|name| {
            parse(name)
                .ok_or_else(|| ConfigError::invalid(field, format!("unknown name '{name}'")))
        })
        .transpose()
}

/// Amplitude envelope override, applied to the engine's envelope (every
/// operator envelope for FM).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvelopeSection {
    /// Attack time in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attack: Option<f32>,
    /// Decay time in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decay: Option<f32>,
    /// Sustain level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sustain: Option<f32>,
    /// Release time in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<f32>,
    /// Attack curve exponent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attack_curve: Option<f32>,
}

impl EnvelopeSection {
    /// Capture every field of `cfg`.
    pub fn from_config(cfg: &EnvelopeConfig) -> Self {
        Self {
            attack: Some(cfg.attack()),
            decay: Some(cfg.decay()),
            sustain: Some(cfg.sustain()),
            release: Some(cfg.release()),
            attack_curve: Some(cfg.attack_curve()),
        }
    }

    /// Check every present field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("envelope.attack", self.attack, 0.0, 60.0)?;
        check_range("envelope.decay", self.decay, 0.0, 60.0)?;
        check_range("envelope.sustain", self.sustain, 0.0, 1.0)?;
        check_range("envelope.release", self.release, 0.0, 60.0)?;
        check_range("envelope.attack_curve", self.attack_curve, 0.1, 10.0)
    }

    /// Overwrite the fields this section names.
    pub fn apply(&self, cfg: &mut EnvelopeConfig) {
        if let Some(v) = self.attack {
            cfg.set_attack(v);
        }
        if let Some(v) = self.decay {
            cfg.set_decay(v);
        }
        if let Some(v) = self.sustain {
            cfg.set_sustain(v);
        }
        if let Some(v) = self.release {
            cfg.set_release(v);
        }
        if let Some(v) = self.attack_curve {
            cfg.set_attack_curve(v);
        }
    }
}

/// `[additive]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdditiveSection {
    /// Number of rendered partials (1 to 512).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_partials: Option<usize>,
    /// Position between partial sets A and B.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub morph_position: Option<f32>,
    /// Spectral tilt in dB per octave.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spectral_tilt: Option<f32>,
    /// Ratio exponent applied to partial frequencies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spectral_stretch: Option<f32>,
    /// Stiff-string inharmonicity coefficient.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inharmonicity: Option<f32>,
    /// -1 keeps odd partials only, +1 even only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub odd_even_balance: Option<f32>,
    /// Per-partial envelope time scaling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_decay_scaling: Option<f32>,
    /// Scale by 1/sqrt(active partials).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalize: Option<bool>,
}

impl AdditiveSection {
    /// Capture the tunable fields of `params`.
    pub fn from_params(params: &AdditiveParams) -> Self {
        Self {
            active_partials: Some(params.active_partials()),
            morph_position: Some(params.morph_position()),
            spectral_tilt: Some(params.spectral_tilt()),
            spectral_stretch: Some(params.spectral_stretch()),
            inharmonicity: Some(params.inharmonicity()),
            odd_even_balance: Some(params.odd_even_balance()),
            partial_decay_scaling: Some(params.partial_decay_scaling()),
            normalize: Some(params.normalize()),
        }
    }

    /// Check every present field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(count) = self.active_partials
            && !(1..=MAX_PARTIALS).contains(&count)
        {
            return Err(ConfigError::invalid(
                "additive.active_partials",
                format!("must be in 1..={MAX_PARTIALS}, got {count}"),
            ));
        }
        check_range("additive.morph_position", self.morph_position, 0.0, 1.0)?;
        check_range("additive.spectral_tilt", self.spectral_tilt, -24.0, 12.0)?;
        check_range("additive.spectral_stretch", self.spectral_stretch, 0.5, 2.0)?;
        check_range("additive.inharmonicity", self.inharmonicity, 0.0, 1.0)?;
        check_range("additive.odd_even_balance", self.odd_even_balance, -1.0, 1.0)?;
        check_range(
            "additive.partial_decay_scaling",
            self.partial_decay_scaling,
            0.0,
            8.0,
        )
    }

    /// Overwrite the fields this section names.
    pub fn apply(&self, params: &mut AdditiveParams) {
        if let Some(v) = self.active_partials {
            params.set_active_partials(v);
        }
        if let Some(v) = self.morph_position {
            params.set_morph_position(v);
        }
        if let Some(v) = self.spectral_tilt {
            params.set_spectral_tilt(v);
        }
        if let Some(v) = self.spectral_stretch {
            params.set_spectral_stretch(v);
        }
        if let Some(v) = self.inharmonicity {
            params.set_inharmonicity(v);
        }
        if let Some(v) = self.odd_even_balance {
            params.set_odd_even_balance(v);
        }
        if let Some(v) = self.partial_decay_scaling {
            params.set_partial_decay_scaling(v);
        }
        if let Some(v) = self.normalize {
            params.set_normalize(v);
        }
    }
}

/// `[granular]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GranularSection {
    /// Grains per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub density: Option<f32>,
    /// Grain length in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_ms: Option<f32>,
    /// Pitch shift in semitones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f32>,
    /// Read position in the source (0 to 1).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<f32>,
    /// Position randomization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spray: Option<f32>,
    /// Stereo spread.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stereo_spread: Option<f32>,
    /// Probability that a grain plays backwards.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse_probability: Option<f32>,
    /// Output gain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gain: Option<f32>,
    /// Grain window name, e.g. `hann`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<String>,
    /// Scheduling mode name, e.g. `quasi-synchronous`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl GranularSection {
    /// Capture the tunable fields of `params`.
    pub fn from_params(params: &GranularParams) -> Self {
        Self {
            density: Some(params.density()),
            size_ms: Some(params.size_ms()),
            pitch: Some(params.pitch()),
            position: Some(params.position()),
            spray: Some(params.spray()),
            stereo_spread: Some(params.stereo_spread()),
            reverse_probability: Some(params.reverse_probability()),
            gain: Some(params.gain()),
            window: Some(params.window().name().to_string()),
            mode: Some(params.mode().name().to_string()),
        }
    }

    /// Check every present field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("granular.density", self.density, 0.1, 200.0)?;
        check_range("granular.size_ms", self.size_ms, 1.0, 2000.0)?;
        check_range("granular.pitch", self.pitch, -48.0, 48.0)?;
        check_range("granular.position", self.position, 0.0, 1.0)?;
        check_range("granular.spray", self.spray, 0.0, 1.0)?;
        check_range("granular.stereo_spread", self.stereo_spread, 0.0, 1.0)?;
        check_range(
            "granular.reverse_probability",
            self.reverse_probability,
            0.0,
            1.0,
        )?;
        check_range("granular.gain", self.gain, 0.0, 2.0)?;
        check_name("granular.window", self.window.as_deref(), WindowShape::from_name)?;
        check_name("granular.mode", self.mode.as_deref(), SchedulingMode::from_name)?;
        Ok(())
    }

    /// Overwrite the fields this section names.
    pub fn apply(&self, params: &mut GranularParams) -> Result<(), ConfigError> {
        if let Some(v) = self.density {
            params.set_density(v);
        }
        if let Some(v) = self.size_ms {
            params.set_size_ms(v);
        }
        if let Some(v) = self.pitch {
            params.set_pitch(v);
        }
        if let Some(v) = self.position {
            params.set_position(v);
        }
        if let Some(v) = self.spray {
            params.set_spray(v);
        }
        if let Some(v) = self.stereo_spread {
            params.set_stereo_spread(v);
        }
        if let Some(v) = self.reverse_probability {
            params.set_reverse_probability(v);
        }
        if let Some(v) = self.gain {
            params.set_gain(v);
        }
        if let Some(window) =
            check_name("granular.window", self.window.as_deref(), WindowShape::from_name)?
        {
            params.set_window(window);
        }
        if let Some(mode) =
            check_name("granular.mode", self.mode.as_deref(), SchedulingMode::from_name)?
        {
            params.set_mode(mode);
        }
        Ok(())
    }
}

/// `[fm]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FmSection {
    /// Routing algorithm, 1 to 32.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<u8>,
    /// Feedback amount on the algorithm's feedback operator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<f32>,
    /// Divide the carrier sum by the carrier count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalize: Option<bool>,
    /// Master tuning offset in cents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_tune_cents: Option<f32>,
}

impl FmSection {
    /// Capture the tunable fields of `params`.
    pub fn from_params(params: &FmParams) -> Self {
        Self {
            algorithm: Some(params.algorithm()),
            feedback: Some(params.feedback()),
            normalize: Some(params.normalize()),
            master_tune_cents: Some(params.master_tune_cents()),
        }
    }

    /// Check every present field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(id) = self.algorithm
            && !(1..=ALGORITHM_COUNT as u8).contains(&id)
        {
            return Err(ConfigError::invalid(
                "fm.algorithm",
                format!("must be in 1..={ALGORITHM_COUNT}, got {id}"),
            ));
        }
        check_range("fm.feedback", self.feedback, 0.0, 1.0)?;
        check_range("fm.master_tune_cents", self.master_tune_cents, -100.0, 100.0)
    }

    /// Overwrite the fields this section names.
    pub fn apply(&self, params: &mut FmParams) {
        if let Some(v) = self.algorithm {
            params.set_algorithm(v);
        }
        if let Some(v) = self.feedback {
            params.set_feedback(v);
        }
        if let Some(v) = self.normalize {
            params.set_normalize(v);
        }
        if let Some(v) = self.master_tune_cents {
            params.set_master_tune_cents(v);
        }
    }
}

/// `[vector]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VectorSection {
    /// Manual x position (-1 to 1).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    /// Manual y position (-1 to 1).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    /// Output gain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gain: Option<f32>,
    /// Ignore the preset's breakpoint path and hold the manual position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual: Option<bool>,
}

impl VectorSection {
    /// Capture the tunable fields of `params`.
    pub fn from_params(params: &VectorParams) -> Self {
        let (x, y) = params.position();
        Self {
            x: Some(x),
            y: Some(y),
            gain: Some(params.gain()),
            manual: Some(params.path.is_empty()),
        }
    }

    /// Check every present field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("vector.x", self.x, -1.0, 1.0)?;
        check_range("vector.y", self.y, -1.0, 1.0)?;
        check_range("vector.gain", self.gain, 0.0, 2.0)
    }

    /// Overwrite the fields this section names.
    pub fn apply(&self, params: &mut VectorParams) {
        if self.x.is_some() || self.y.is_some() {
            let (x, y) = params.position();
            params.set_position(self.x.unwrap_or(x), self.y.unwrap_or(y));
        }
        if let Some(v) = self.gain {
            params.set_gain(v);
        }
        if self.manual == Some(true) {
            params.path.clear();
        }
    }
}

/// `[physical]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PhysicalSection {
    /// Model name, e.g. `plucked` or `bell`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Karplus-Strong excitation name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excitation: Option<String>,
    /// Body profile name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Loop filter brightness.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f32>,
    /// Loop gain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decay: Option<f32>,
    /// Release damping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub damping: Option<f32>,
    /// Inharmonic stretch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stretch: Option<f32>,
    /// Pluck position along the string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pluck_position: Option<f32>,
    /// Bow pressure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bow_pressure: Option<f32>,
    /// Bow position along the string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bow_position: Option<f32>,
    /// Breath pressure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breath_pressure: Option<f32>,
    /// Breath noise amount.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breath_noise: Option<f32>,
    /// Mallet hardness.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hardness: Option<f32>,
    /// Modal 60 dB ring time in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ring_time: Option<f32>,
    /// Body resonance mix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_mix: Option<f32>,
    /// Output gain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gain: Option<f32>,
    /// DC blocker on the output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dc_block: Option<bool>,
}

impl PhysicalSection {
    /// Capture the tunable fields of `params`.
    pub fn from_params(params: &PhysicalParams) -> Self {
        Self {
            model: Some(params.model().name().to_string()),
            excitation: Some(params.excitation.name().to_string()),
            body: Some(params.body.name().to_string()),
            brightness: Some(params.brightness()),
            decay: Some(params.decay()),
            damping: Some(params.damping()),
            stretch: Some(params.stretch()),
            pluck_position: Some(params.pluck_position()),
            bow_pressure: Some(params.bow_pressure()),
            bow_position: Some(params.bow_position()),
            breath_pressure: Some(params.breath_pressure()),
            breath_noise: Some(params.breath_noise()),
            hardness: Some(params.hardness()),
            ring_time: Some(params.ring_time()),
            body_mix: Some(params.body_mix()),
            gain: Some(params.gain()),
            dc_block: Some(params.dc_block),
        }
    }

    /// Check every present field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_name("physical.model", self.model.as_deref(), PhysicalModel::from_name)?;
        check_name(
            "physical.excitation",
            self.excitation.as_deref(),
            Excitation::from_name,
        )?;
        check_name("physical.body", self.body.as_deref(), BodyProfile::from_name)?;
        check_range("physical.brightness", self.brightness, 0.0, 1.0)?;
        check_range("physical.decay", self.decay, 0.8, 1.0)?;
        check_range("physical.damping", self.damping, 0.0, 1.0)?;
        check_range("physical.stretch", self.stretch, 0.0, 1.0)?;
        check_range("physical.pluck_position", self.pluck_position, 0.05, 0.95)?;
        check_range("physical.bow_pressure", self.bow_pressure, 0.0, 1.0)?;
        check_range("physical.bow_position", self.bow_position, 0.05, 0.5)?;
        check_range("physical.breath_pressure", self.breath_pressure, 0.0, 1.0)?;
        check_range("physical.breath_noise", self.breath_noise, 0.0, 1.0)?;
        check_range("physical.hardness", self.hardness, 0.0, 1.0)?;
        check_range("physical.ring_time", self.ring_time, 0.05, 20.0)?;
        check_range("physical.body_mix", self.body_mix, 0.0, 1.0)?;
        check_range("physical.gain", self.gain, 0.0, 2.0)
    }

    /// Overwrite the fields this section names.
    pub fn apply(&self, params: &mut PhysicalParams) -> Result<(), ConfigError> {
        if let Some(model) =
            check_name("physical.model", self.model.as_deref(), PhysicalModel::from_name)?
        {
            params.set_model(model);
        }
        if let Some(excitation) = check_name(
            "physical.excitation",
            self.excitation.as_deref(),
            Excitation::from_name,
        )? {
            params.excitation = excitation;
        }
        if let Some(body) =
            check_name("physical.body", self.body.as_deref(), BodyProfile::from_name)?
        {
            params.body = body;
        }
        let setters: [(Option<f32>, fn(&mut PhysicalParams, f32)); 13] = [
            (self.brightness, PhysicalParams::set_brightness),
            (self.decay, PhysicalParams::set_decay),
            (self.damping, PhysicalParams::set_damping),
            (self.stretch, PhysicalParams::set_stretch),
            (self.pluck_position, PhysicalParams::set_pluck_position),
            (self.bow_pressure, PhysicalParams::set_bow_pressure),
            (self.bow_position, PhysicalParams::set_bow_position),
            (self.breath_pressure, PhysicalParams::set_breath_pressure),
            (self.breath_noise, PhysicalParams::set_breath_noise),
            (self.hardness, PhysicalParams::set_hardness),
            (self.ring_time, PhysicalParams::set_ring_time),
            (self.body_mix, PhysicalParams::set_body_mix),
            (self.gain, PhysicalParams::set_gain),
        ];
        for (value, set) in setters {
            if let Some(v) = value {
                set(params, v);
            }
        }
        if let Some(v) = self.dc_block {
            params.dc_block = v;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_names_the_field() {
        let section = FmSection {
            algorithm: Some(33),
            ..FmSection::default()
        };
        match section.validate() {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "fm.algorithm"),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn non_finite_is_rejected() {
        let section = GranularSection {
            density: Some(f32::NAN),
            ..GranularSection::default()
        };
        assert!(section.validate().is_err());
    }

    #[test]
    fn unknown_variant_name_is_rejected() {
        let section = PhysicalSection {
            model: Some("tuba".to_string()),
            ..PhysicalSection::default()
        };
        let err = section.validate().unwrap_err();
        assert!(err.to_string().contains("tuba"), "got: {err}");
    }

    #[test]
    fn empty_section_leaves_params_untouched() {
        let mut params = PhysicalParams::default();
        PhysicalSection::default().apply(&mut params).unwrap();
        assert_eq!(params, PhysicalParams::default());
    }

    #[test]
    fn from_params_round_trips_through_apply() {
        let source = GranularParams::preset(resona_synth::GranularPreset::GlitchTexture);
        let section = GranularSection::from_params(&source);
        section.validate().unwrap();
        let mut rebuilt = GranularParams::default();
        section.apply(&mut rebuilt).unwrap();
        assert_eq!(rebuilt.density(), source.density());
        assert_eq!(rebuilt.window(), source.window());
        assert_eq!(rebuilt.mode(), source.mode());
    }

    #[test]
    fn vector_partial_position_keeps_other_axis() {
        let mut params = VectorParams::default();
        params.set_position(0.5, -0.5);
        VectorSection {
            x: Some(-1.0),
            ..VectorSection::default()
        }
        .apply(&mut params);
        assert_eq!(params.position(), (-1.0, -0.5));
    }

    #[test]
    fn envelope_section_overrides_named_fields() {
        let mut cfg = EnvelopeConfig::new(0.01, 0.1, 0.8, 0.3);
        EnvelopeSection {
            release: Some(1.5),
            ..EnvelopeSection::default()
        }
        .apply(&mut cfg);
        assert_eq!(cfg.release(), 1.5);
        assert_eq!(cfg.attack(), 0.01);
    }
}
