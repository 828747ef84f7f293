//! Engine configuration file format and operations.

use resona_synth::{
    AdditiveParams, AdditivePreset, FmParams, FmPreset, GranularParams, GranularPreset,
    MAX_POLYPHONY, PhysicalParams, PhysicalPreset, SynthConfig, VectorParams, VectorPreset,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::sections::{
    AdditiveSection, EnvelopeSection, FmSection, GranularSection, PhysicalSection, VectorSection,
};

/// Accepted sample-rate range in Hz.
pub const SAMPLE_RATE_RANGE: (u32, u32) = (8_000, 384_000);
/// Largest accepted render block.
pub const MAX_BLOCK_SIZE: usize = 8192;

/// One of the five synthesis engines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Sum of sine partials
    #[default]
    Additive,
    /// Grain clouds over sampled sources
    Granular,
    /// Six-operator frequency modulation
    Fm,
    /// Four sources blended by a 2D position
    Vector,
    /// Waveguide and modal physical models
    Physical,
}

impl EngineKind {
    /// All engines.
    pub const ALL: [EngineKind; 5] = [
        Self::Additive,
        Self::Granular,
        Self::Fm,
        Self::Vector,
        Self::Physical,
    ];

    /// Lowercase name as used in config files.
    pub fn name(self) -> &'static str {
        match self {
            Self::Additive => "additive",
            Self::Granular => "granular",
            Self::Fm => "fm",
            Self::Vector => "vector",
            Self::Physical => "physical",
        }
    }

    /// One-line description.
    pub fn description(self) -> &'static str {
        match self {
            Self::Additive => "Up to 512 sine partials with morphing and spectral shaping",
            Self::Granular => "Windowed grain clouds over up to four source buffers",
            Self::Fm => "Six operators routed by 32 algorithms",
            Self::Vector => "Four oscillator sources crossfaded from a 2D position",
            Self::Physical => "Plucked, bowed and blown waveguides plus modal percussion",
        }
    }

    /// Preset names accepted for this engine.
    pub fn preset_names(self) -> Vec<&'static str> {
        match self {
            Self::Additive => AdditivePreset::ALL.iter().map(|p| p.name()).collect(),
            Self::Granular => GranularPreset::ALL.iter().map(|p| p.name()).collect(),
            Self::Fm => FmPreset::ALL.iter().map(|p| p.name()).collect(),
            Self::Vector => VectorPreset::ALL.iter().map(|p| p.name()).collect(),
            Self::Physical => PhysicalPreset::ALL.iter().map(|p| p.name()).collect(),
        }
    }

    fn has_preset(self, name: &str) -> bool {
        match self {
            Self::Additive => AdditivePreset::from_name(name).is_some(),
            Self::Granular => GranularPreset::from_name(name).is_some(),
            Self::Fm => FmPreset::from_name(name).is_some(),
            Self::Vector => VectorPreset::from_name(name).is_some(),
            Self::Physical => PhysicalPreset::from_name(name).is_some(),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EngineKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == lower)
            .ok_or_else(|| ConfigError::UnknownEngine(s.to_string()))
    }
}

/// Engine configuration file.
///
/// Global render settings plus an optional preset and per-engine tables that
/// override individual preset values.
///
/// # TOML Format
///
/// ```toml
/// engine = "fm"
/// preset = "epiano"
/// sample_rate = 48000
/// max_block_size = 512
/// polyphony = 8
/// master_gain = 0.8
///
/// [envelope]
/// release = 1.2
///
/// [fm]
/// algorithm = 5
/// feedback = 0.3
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Which engine to build.
    pub engine: EngineKind,

    /// Preset the tables are layered on; engine defaults when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,

    /// Sample rate in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Largest block rendered in one pass.
    #[serde(default = "default_max_block_size")]
    pub max_block_size: usize,

    /// Number of voices.
    #[serde(default = "default_polyphony")]
    pub polyphony: usize,

    /// Master output gain.
    #[serde(default = "default_master_gain")]
    pub master_gain: f32,

    /// Amplitude envelope override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope: Option<EnvelopeSection>,

    /// Additive overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additive: Option<AdditiveSection>,

    /// Granular overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granular: Option<GranularSection>,

    /// FM overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fm: Option<FmSection>,

    /// Vector overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<VectorSection>,

    /// Physical-model overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical: Option<PhysicalSection>,
}

fn default_sample_rate() -> u32 {
    48000
}

fn default_max_block_size() -> usize {
    512
}

fn default_polyphony() -> usize {
    8
}

fn default_master_gain() -> f32 {
    1.0
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(EngineKind::default())
    }
}

impl EngineConfig {
    /// Bare configuration for `engine`: default render settings, no preset,
    /// no overrides.
    pub fn new(engine: EngineKind) -> Self {
        Self {
            engine,
            preset: None,
            sample_rate: default_sample_rate(),
            max_block_size: default_max_block_size(),
            polyphony: default_polyphony(),
            master_gain: default_master_gain(),
            envelope: None,
            additive: None,
            granular: None,
            fm: None,
            vector: None,
            physical: None,
        }
    }

    /// Fully spelled-out configuration for `engine`: its first preset with
    /// every table field filled in, ready to be edited.
    pub fn for_engine(engine: EngineKind) -> Self {
        let mut cfg = Self::new(engine);
        match engine {
            EngineKind::Additive => {
                let preset = AdditivePreset::ALL[0];
                let params = AdditiveParams::preset(preset);
                cfg.preset = Some(preset.name().to_string());
                cfg.envelope = Some(EnvelopeSection::from_config(&params.envelope));
                cfg.additive = Some(AdditiveSection::from_params(&params));
            }
            EngineKind::Granular => {
                let preset = GranularPreset::ALL[0];
                let params = GranularParams::preset(preset);
                cfg.preset = Some(preset.name().to_string());
                cfg.envelope = Some(EnvelopeSection::from_config(&params.envelope));
                cfg.granular = Some(GranularSection::from_params(&params));
            }
            EngineKind::Fm => {
                let preset = FmPreset::ALL[0];
                let params = FmParams::preset(preset);
                cfg.preset = Some(preset.name().to_string());
                cfg.fm = Some(FmSection::from_params(&params));
            }
            EngineKind::Vector => {
                let preset = VectorPreset::ALL[0];
                let params = VectorParams::preset(preset);
                cfg.preset = Some(preset.name().to_string());
                cfg.envelope = Some(EnvelopeSection::from_config(&params.envelope));
                cfg.vector = Some(VectorSection::from_params(&params));
            }
            EngineKind::Physical => {
                let preset = PhysicalPreset::ALL[0];
                let params = PhysicalParams::preset(preset);
                cfg.preset = Some(preset.name().to_string());
                cfg.envelope = Some(EnvelopeSection::from_config(&params.envelope));
                cfg.physical = Some(PhysicalSection::from_params(&params));
            }
        }
        cfg
    }

    /// Builder-style preset selection.
    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = Some(preset.into());
        self
    }

    /// Load and validate a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let cfg = Self::from_toml_str(&content)?;
        #[cfg(feature = "tracing")]
        tracing::debug!(path = %path.display(), engine = %cfg.engine, "config loaded");
        Ok(cfg)
    }

    /// Parse and validate a configuration from a TOML string.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let cfg: EngineConfig = toml::from_str(toml_str)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Save the configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::io(parent, e))?;
        }

        let content = self.to_toml_string()?;
        std::fs::write(path, content).map_err(|e| ConfigError::io(path, e))
    }

    /// Convert the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every field, the preset name and that only the selected
    /// engine's table is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (min_rate, max_rate) = SAMPLE_RATE_RANGE;
        if !(min_rate..=max_rate).contains(&self.sample_rate) {
            return Err(ConfigError::invalid(
                "sample_rate",
                format!("must be in {min_rate}..={max_rate}, got {}", self.sample_rate),
            ));
        }
        if !(1..=MAX_BLOCK_SIZE).contains(&self.max_block_size) {
            return Err(ConfigError::invalid(
                "max_block_size",
                format!("must be in 1..={MAX_BLOCK_SIZE}, got {}", self.max_block_size),
            ));
        }
        if !(1..=MAX_POLYPHONY).contains(&self.polyphony) {
            return Err(ConfigError::invalid(
                "polyphony",
                format!("must be in 1..={MAX_POLYPHONY}, got {}", self.polyphony),
            ));
        }
        if !self.master_gain.is_finite() || !(0.0..=2.0).contains(&self.master_gain) {
            return Err(ConfigError::invalid(
                "master_gain",
                format!("must be in 0..=2, got {}", self.master_gain),
            ));
        }
        if let Some(name) = &self.preset
            && !self.engine.has_preset(name)
        {
            return Err(ConfigError::UnknownPreset {
                engine: self.engine.name().to_string(),
                name: name.clone(),
            });
        }
        if let Some(envelope) = &self.envelope {
            envelope.validate()?;
        }

        let tables = [
            (EngineKind::Additive, self.additive.is_some()),
            (EngineKind::Granular, self.granular.is_some()),
            (EngineKind::Fm, self.fm.is_some()),
            (EngineKind::Vector, self.vector.is_some()),
            (EngineKind::Physical, self.physical.is_some()),
        ];
        if let Some((kind, _)) = tables
            .iter()
            .find(|&&(kind, present)| present && kind != self.engine)
        {
            return Err(ConfigError::invalid(
                kind.name(),
                format!("table does not apply to the {} engine", self.engine),
            ));
        }

        if let Some(section) = &self.additive {
            section.validate()?;
        }
        if let Some(section) = &self.granular {
            section.validate()?;
        }
        if let Some(section) = &self.fm {
            section.validate()?;
        }
        if let Some(section) = &self.vector {
            section.validate()?;
        }
        if let Some(section) = &self.physical {
            section.validate()?;
        }
        Ok(())
    }

    /// Render settings for [`Synth`](resona_synth::Synth).
    pub fn synth_config(&self) -> SynthConfig {
        SynthConfig::new(self.sample_rate as f32)
            .with_polyphony(self.polyphony)
            .with_max_block_size(self.max_block_size)
    }

    fn expect_engine(&self, engine: EngineKind) -> Result<(), ConfigError> {
        if self.engine == engine {
            Ok(())
        } else {
            Err(ConfigError::invalid(
                "engine",
                format!("configured for {}, requested {engine}", self.engine),
            ))
        }
    }

    fn preset_name(&self) -> Option<&str> {
        self.preset.as_deref()
    }

    fn unknown_preset(&self, name: &str) -> ConfigError {
        ConfigError::UnknownPreset {
            engine: self.engine.name().to_string(),
            name: name.to_string(),
        }
    }

    /// Build additive parameters: preset, then envelope and table overrides.
    pub fn additive_params(&self) -> Result<AdditiveParams, ConfigError> {
        self.expect_engine(EngineKind::Additive)?;
        self.validate()?;
        let mut params = match self.preset_name() {
            Some(name) => AdditivePreset::from_name(name)
                .map(AdditiveParams::preset)
                .ok_or_else(|| self.unknown_preset(name))?,
            None => AdditiveParams::default(),
        };
        if let Some(envelope) = &self.envelope {
            envelope.apply(&mut params.envelope);
        }
        if let Some(section) = &self.additive {
            section.apply(&mut params);
        }
        Ok(params)
    }

    /// Build granular parameters. Source buffers are left empty.
    pub fn granular_params(&self) -> Result<GranularParams, ConfigError> {
        self.expect_engine(EngineKind::Granular)?;
        self.validate()?;
        let mut params = match self.preset_name() {
            Some(name) => GranularPreset::from_name(name)
                .map(GranularParams::preset)
                .ok_or_else(|| self.unknown_preset(name))?,
            None => GranularParams::default(),
        };
        if let Some(envelope) = &self.envelope {
            envelope.apply(&mut params.envelope);
        }
        if let Some(section) = &self.granular {
            section.apply(&mut params)?;
        }
        Ok(params)
    }

    /// Build FM parameters. The envelope table applies to every operator.
    pub fn fm_params(&self) -> Result<FmParams, ConfigError> {
        self.expect_engine(EngineKind::Fm)?;
        self.validate()?;
        let mut params = match self.preset_name() {
            Some(name) => FmPreset::from_name(name)
                .map(FmParams::preset)
                .ok_or_else(|| self.unknown_preset(name))?,
            None => FmParams::default(),
        };
        if let Some(envelope) = &self.envelope {
            for op in &mut params.operators {
                envelope.apply(&mut op.envelope);
            }
        }
        if let Some(section) = &self.fm {
            section.apply(&mut params);
        }
        Ok(params)
    }

    /// Build vector parameters.
    pub fn vector_params(&self) -> Result<VectorParams, ConfigError> {
        self.expect_engine(EngineKind::Vector)?;
        self.validate()?;
        let mut params = match self.preset_name() {
            Some(name) => VectorPreset::from_name(name)
                .map(VectorParams::preset)
                .ok_or_else(|| self.unknown_preset(name))?,
            None => VectorParams::default(),
        };
        if let Some(envelope) = &self.envelope {
            envelope.apply(&mut params.envelope);
        }
        if let Some(section) = &self.vector {
            section.apply(&mut params);
        }
        Ok(params)
    }

    /// Build physical-model parameters.
    pub fn physical_params(&self) -> Result<PhysicalParams, ConfigError> {
        self.expect_engine(EngineKind::Physical)?;
        self.validate()?;
        let mut params = match self.preset_name() {
            Some(name) => PhysicalPreset::from_name(name)
                .map(PhysicalParams::preset)
                .ok_or_else(|| self.unknown_preset(name))?,
            None => PhysicalParams::default(),
        };
        if let Some(envelope) = &self.envelope {
            envelope.apply(&mut params.envelope);
        }
        if let Some(section) = &self.physical {
            section.apply(&mut params)?;
        }
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_names_parse_case_insensitively() {
        for kind in EngineKind::ALL {
            assert_eq!(kind.name().parse::<EngineKind>().unwrap(), kind);
            assert_eq!(kind.name().to_uppercase().parse::<EngineKind>().unwrap(), kind);
        }
        assert!(matches!(
            "theremin".parse::<EngineKind>(),
            Err(ConfigError::UnknownEngine(_))
        ));
    }

    #[test]
    fn every_engine_lists_presets() {
        for kind in EngineKind::ALL {
            let names = kind.preset_names();
            assert!(!names.is_empty(), "{kind}");
            assert!(names.iter().all(|n| kind.has_preset(n)));
        }
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg = EngineConfig::from_toml_str("engine = \"vector\"").unwrap();
        assert_eq!(cfg.engine, EngineKind::Vector);
        assert_eq!(cfg.sample_rate, 48000);
        assert_eq!(cfg.max_block_size, 512);
        assert_eq!(cfg.polyphony, 8);
        assert_eq!(cfg.master_gain, 1.0);
        assert!(cfg.preset.is_none());
    }

    #[test]
    fn for_engine_is_valid_for_every_engine() {
        for kind in EngineKind::ALL {
            let cfg = EngineConfig::for_engine(kind);
            cfg.validate().unwrap();
            let text = cfg.to_toml_string().unwrap();
            assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), cfg, "{kind}");
        }
    }

    #[test]
    fn range_errors_name_the_field() {
        let cases = [
            ("engine = \"fm\"\nsample_rate = 1000", "sample_rate"),
            ("engine = \"fm\"\npolyphony = 65", "polyphony"),
            ("engine = \"fm\"\nmax_block_size = 0", "max_block_size"),
            ("engine = \"fm\"\nmaster_gain = 3.0", "master_gain"),
            ("engine = \"fm\"\n[fm]\nalgorithm = 0", "fm.algorithm"),
            ("engine = \"granular\"\n[granular]\ndensity = 500.0", "granular.density"),
        ];
        for (text, expected) in cases {
            match EngineConfig::from_toml_str(text) {
                Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected),
                other => panic!("{expected}: expected Invalid, got {other:?}"),
            }
        }
    }

    #[test]
    fn foreign_table_is_rejected() {
        let err = EngineConfig::from_toml_str("engine = \"fm\"\n[physical]\ndecay = 0.9")
            .unwrap_err();
        assert!(err.to_string().contains("physical"), "got: {err}");
    }

    #[test]
    fn unknown_preset_is_rejected() {
        let err = EngineConfig::from_toml_str("engine = \"fm\"\npreset = \"kazoo\"").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPreset { ref name, .. } if name == "kazoo"));
    }

    #[test]
    fn unknown_field_is_a_parse_error() {
        let err = EngineConfig::from_toml_str("engine = \"fm\"\npolyfony = 4").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn tables_override_the_preset() {
        let cfg = EngineConfig::from_toml_str(
            "engine = \"fm\"\npreset = \"bell\"\n[fm]\nalgorithm = 5\n[envelope]\nrelease = 2.0",
        )
        .unwrap();
        let params = cfg.fm_params().unwrap();
        assert_eq!(params.algorithm(), 5);
        assert!(params.operators.iter().all(|op| op.envelope.release() == 2.0));
    }

    #[test]
    fn wrong_engine_builder_is_rejected() {
        let cfg = EngineConfig::new(EngineKind::Physical);
        assert!(cfg.physical_params().is_ok());
        assert!(cfg.fm_params().is_err());
    }

    #[test]
    fn synth_config_carries_render_settings() {
        let cfg = EngineConfig::from_toml_str(
            "engine = \"additive\"\nsample_rate = 44100\npolyphony = 16\nmax_block_size = 256",
        )
        .unwrap();
        let synth = cfg.synth_config();
        assert_eq!(synth.sample_rate, 44100.0);
        assert_eq!(synth.polyphony, 16);
        assert_eq!(synth.max_block_size, 256);
    }
}
