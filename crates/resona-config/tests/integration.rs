//! Integration tests for resona-config.
//!
//! These tests cover the file round trip and building a playable engine from
//! a configuration.

use resona_config::{ConfigError, EngineConfig, EngineKind, FmSection};
use resona_synth::{FmKernel, PhysicalKernel, Synth};
use tempfile::TempDir;

/// Save then load returns the same configuration.
#[test]
fn test_save_and_load_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("fm.toml");

    let mut cfg = EngineConfig::for_engine(EngineKind::Fm).with_preset("brass");
    cfg.polyphony = 12;
    cfg.fm = Some(FmSection {
        algorithm: Some(22),
        ..FmSection::default()
    });
    cfg.save(&path).expect("save should create parent directories");

    let loaded = EngineConfig::load(&path).unwrap();
    assert_eq!(loaded, cfg);
}

/// A missing file reports the path it tried.
#[test]
fn test_load_missing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");
    match EngineConfig::load(&path) {
        Err(ConfigError::Io { path: p, .. }) => assert_eq!(p, path),
        other => panic!("expected Io error, got {other:?}"),
    }
}

/// An invalid file is rejected at load time, not at build time.
#[test]
fn test_load_rejects_invalid_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "engine = \"physical\"\n[physical]\ndecay = 1.5\n").unwrap();
    assert!(matches!(
        EngineConfig::load(&path),
        Err(ConfigError::Invalid { .. })
    ));
}

/// A hand-written file builds an engine that renders audio.
#[test]
fn test_config_builds_playable_engine() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("guitar.toml");
    std::fs::write(
        &path,
        r#"
engine = "physical"
preset = "classical-guitar"
sample_rate = 44100
polyphony = 6
master_gain = 0.5

[physical]
body = "violin"
brightness = 0.3
"#,
    )
    .unwrap();

    let cfg = EngineConfig::load(&path).unwrap();
    let params = cfg.physical_params().unwrap();
    assert_eq!(params.brightness(), 0.3);

    let synth_config = cfg.synth_config();
    let mut synth = Synth::new(
        PhysicalKernel::new(synth_config.sample_rate),
        params,
        synth_config,
    );
    synth.set_master_gain(cfg.master_gain);
    assert_eq!(synth.polyphony(), 6);

    synth.note_on(52.0, 1.0);
    let mut left = vec![0.0; 2048];
    let mut right = vec![0.0; 2048];
    synth.process(&mut left, &mut right);
    assert!(left.iter().all(|s| s.is_finite()));
    assert!(left.iter().any(|s| s.abs() > 1e-3));
}

/// The generated default for every engine parses back and builds.
#[test]
fn test_default_files_build_for_every_engine() {
    let dir = TempDir::new().unwrap();
    for kind in EngineKind::ALL {
        let path = dir.path().join(format!("{kind}.toml"));
        EngineConfig::for_engine(kind).save(&path).unwrap();
        let cfg = EngineConfig::load(&path).unwrap();
        let built = match kind {
            EngineKind::Additive => cfg.additive_params().map(drop),
            EngineKind::Granular => cfg.granular_params().map(drop),
            EngineKind::Fm => cfg.fm_params().map(drop),
            EngineKind::Vector => cfg.vector_params().map(drop),
            EngineKind::Physical => cfg.physical_params().map(drop),
        };
        assert!(built.is_ok(), "{kind}: {built:?}");
    }
}

/// FM operator envelopes follow the shared envelope table.
#[test]
fn test_fm_envelope_override_changes_release() {
    let short = EngineConfig::from_toml_str(
        "engine = \"fm\"\npreset = \"organ\"\n[envelope]\nrelease = 0.01",
    )
    .unwrap();
    let mut synth = Synth::new(
        FmKernel::new(48000.0),
        short.fm_params().unwrap(),
        short.synth_config(),
    );
    synth.note_on(60.0, 1.0);
    let mut left = vec![0.0; 2048];
    let mut right = vec![0.0; 2048];
    synth.process(&mut left, &mut right);
    synth.all_notes_off();
    for _ in 0..4 {
        synth.process(&mut left, &mut right);
    }
    assert_eq!(synth.active_voice_count(), 0);
}
