//! Attack-decay-sustain-release envelope state machine.
//!
//! One [`EnvelopeState`] exists per independently enveloped element: a whole
//! voice, an FM operator, or an additive partial. The timing lives in a
//! shared [`EnvelopeConfig`] on the engine parameters, so thousands of
//! partial envelopes cost four floats each.
//!
//! Each call to [`EnvelopeState::advance`] moves one sample forward. The
//! next state depends only on the current state, the config and `dt`; there
//! is no hidden global clock.
//!
//! # Level continuity
//!
//! - Attack never drops the level: retriggering from a non-zero level holds
//!   until the attack curve catches up.
//! - Release always starts from the level at the moment of note-off, even
//!   mid-attack or mid-decay, and never rises.
//! - Only [`EnvelopeState::reset`] (voice stealing) jumps to silence.

use libm::powf;

/// Envelope stages
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EnvelopeStage {
    /// Inactive, level is zero.
    #[default]
    Idle,
    /// Rising from 0 toward 1.
    Attack,
    /// Falling from 1 toward the sustain level.
    Decay,
    /// Holding at the sustain level until note-off.
    Sustain,
    /// Falling from the note-off level to 0.
    Release,
}

/// Stage timing shared by every envelope of an engine.
///
/// Times are in seconds. Setters clamp: times to `[0, 60]`, sustain to
/// `[0, 1]`, the attack curve exponent to `[0.1, 10]` (1 = linear, >1 =
/// slow start, <1 = fast start).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnvelopeConfig {
    attack: f32,
    decay: f32,
    sustain: f32,
    release: f32,
    attack_curve: f32,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self::new(0.01, 0.1, 0.8, 0.3)
    }
}

impl EnvelopeConfig {
    const MAX_TIME: f32 = 60.0;

    /// Create a linear-attack envelope.
    pub fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        let mut cfg = Self {
            attack: 0.0,
            decay: 0.0,
            sustain: 0.0,
            release: 0.0,
            attack_curve: 1.0,
        };
        cfg.set_attack(attack);
        cfg.set_decay(decay);
        cfg.set_sustain(sustain);
        cfg.set_release(release);
        cfg
    }

    /// Instant attack, full sustain, instant release: a gate.
    pub fn gate() -> Self {
        Self::new(0.0, 0.0, 1.0, 0.0)
    }

    /// Builder-style attack curve.
    pub fn with_attack_curve(mut self, curve: f32) -> Self {
        self.set_attack_curve(curve);
        self
    }

    /// Attack time in seconds.
    pub fn attack(&self) -> f32 {
        self.attack
    }

    /// Set attack time in seconds.
    pub fn set_attack(&mut self, seconds: f32) {
        self.attack = clamp_time(seconds);
    }

    /// Decay time in seconds.
    pub fn decay(&self) -> f32 {
        self.decay
    }

    /// Set decay time in seconds.
    pub fn set_decay(&mut self, seconds: f32) {
        self.decay = clamp_time(seconds);
    }

    /// Sustain level.
    pub fn sustain(&self) -> f32 {
        self.sustain
    }

    /// Set sustain level (0.0 to 1.0).
    pub fn set_sustain(&mut self, level: f32) {
        self.sustain = if level.is_finite() { level.clamp(0.0, 1.0) } else { 0.0 };
    }

    /// Release time in seconds.
    pub fn release(&self) -> f32 {
        self.release
    }

    /// Set release time in seconds.
    pub fn set_release(&mut self, seconds: f32) {
        self.release = clamp_time(seconds);
    }

    /// Attack curve exponent.
    pub fn attack_curve(&self) -> f32 {
        self.attack_curve
    }

    /// Set the attack curve exponent.
    pub fn set_attack_curve(&mut self, curve: f32) {
        self.attack_curve = if curve.is_finite() { curve.clamp(0.1, 10.0) } else { 1.0 };
    }
}

fn clamp_time(seconds: f32) -> f32 {
    if seconds.is_finite() {
        seconds.clamp(0.0, EnvelopeConfig::MAX_TIME)
    } else {
        0.0
    }
}

/// Per-element envelope state.
///
/// # Example
///
/// ```rust
/// use resona_synth::{EnvelopeConfig, EnvelopeStage, EnvelopeState};
///
/// let cfg = EnvelopeConfig::new(0.0, 0.1, 0.5, 0.2);
/// let dt = 1.0 / 48000.0;
/// let mut env = EnvelopeState::new();
///
/// env.note_on();
/// assert_eq!(env.advance(&cfg, dt), 1.0);
/// assert_eq!(env.stage(), EnvelopeStage::Decay);
///
/// env.note_off();
/// for _ in 0..48000 {
///     env.advance(&cfg, dt);
/// }
/// assert!(env.is_idle());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EnvelopeState {
    stage: EnvelopeStage,
    level: f32,
    time_in_stage: f32,
    /// Level captured at note-off
    release_start: f32,
}

impl EnvelopeState {
    /// A silent, idle envelope.
    pub const fn new() -> Self {
        Self {
            stage: EnvelopeStage::Idle,
            level: 0.0,
            time_in_stage: 0.0,
            release_start: 0.0,
        }
    }

    /// Enter Attack. The current level is kept.
    pub fn note_on(&mut self) {
        self.stage = EnvelopeStage::Attack;
        self.time_in_stage = 0.0;
    }

    /// Enter Release from the current level. No-op when idle or already releasing.
    pub fn note_off(&mut self) {
        if matches!(
            self.stage,
            EnvelopeStage::Attack | EnvelopeStage::Decay | EnvelopeStage::Sustain
        ) {
            self.stage = EnvelopeStage::Release;
            self.time_in_stage = 0.0;
            self.release_start = self.level;
        }
    }

    /// Force silence (used when a voice is stolen).
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Current stage.
    #[inline]
    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    /// Current level without advancing.
    #[inline]
    pub fn level(&self) -> f32 {
        self.level
    }

    /// Seconds spent in the current stage.
    #[inline]
    pub fn time_in_stage(&self) -> f32 {
        self.time_in_stage
    }

    /// `true` once the envelope has finished (or never started).
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.stage == EnvelopeStage::Idle
    }

    /// `true` after note-off (release or finished).
    #[inline]
    pub fn is_released(&self) -> bool {
        matches!(self.stage, EnvelopeStage::Release | EnvelopeStage::Idle)
    }

    /// Advance by `dt` seconds and return the new level.
    ///
    /// Zero-length stages are passed through within the same call, except
    /// that the Attack → Decay hand-off always returns the peak (1.0) for
    /// one sample.
    #[inline]
    pub fn advance(&mut self, cfg: &EnvelopeConfig, dt: f32) -> f32 {
        match self.stage {
            EnvelopeStage::Idle => {
                self.level = 0.0;
            }
            EnvelopeStage::Attack => {
                self.time_in_stage += dt;
                if cfg.attack <= 0.0 || self.time_in_stage >= cfg.attack {
                    self.level = 1.0;
                    self.enter(EnvelopeStage::Decay);
                } else {
                    let curve = powf(self.time_in_stage / cfg.attack, cfg.attack_curve);
                    self.level = self.level.max(curve);
                }
            }
            EnvelopeStage::Decay => {
                self.time_in_stage += dt;
                if cfg.decay <= 0.0 || self.time_in_stage >= cfg.decay {
                    self.level = cfg.sustain;
                    self.enter(EnvelopeStage::Sustain);
                } else {
                    let t = self.time_in_stage / cfg.decay;
                    self.level = 1.0 - (1.0 - cfg.sustain) * t;
                }
            }
            EnvelopeStage::Sustain => {
                self.time_in_stage += dt;
                self.level = cfg.sustain;
            }
            EnvelopeStage::Release => {
                self.time_in_stage += dt;
                if cfg.release <= 0.0 || self.time_in_stage >= cfg.release {
                    self.level = 0.0;
                    self.enter(EnvelopeStage::Idle);
                } else {
                    let target = self.release_start * (1.0 - self.time_in_stage / cfg.release);
                    self.level = self.level.min(target).max(0.0);
                }
            }
        }
        self.level
    }

    fn enter(&mut self, stage: EnvelopeStage) {
        self.stage = stage;
        self.time_in_stage = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 48000.0;

    fn run(env: &mut EnvelopeState, cfg: &EnvelopeConfig, samples: usize) -> f32 {
        let mut level = env.level();
        for _ in 0..samples {
            level = env.advance(cfg, DT);
        }
        level
    }

    #[test]
    fn test_envelope_idle_is_silent() {
        let cfg = EnvelopeConfig::default();
        let mut env = EnvelopeState::new();
        assert_eq!(run(&mut env, &cfg, 100), 0.0);
        assert!(env.is_idle());
    }

    #[test]
    fn test_envelope_zero_attack_same_sample() {
        let cfg = EnvelopeConfig::new(0.0, 0.5, 0.3, 0.5);
        let mut env = EnvelopeState::new();
        env.note_on();
        assert_eq!(env.advance(&cfg, DT), 1.0);
        assert_eq!(env.stage(), EnvelopeStage::Decay);
    }

    #[test]
    fn test_envelope_attack_reaches_peak_on_time() {
        let cfg = EnvelopeConfig::new(0.01, 0.1, 0.5, 0.1);
        let mut env = EnvelopeState::new();
        env.note_on();
        let before = run(&mut env, &cfg, 470);
        assert!(before < 1.0 && before > 0.9, "level {before}");
        run(&mut env, &cfg, 20);
        assert_eq!(env.stage(), EnvelopeStage::Decay);
    }

    #[test]
    fn test_envelope_attack_curve_shapes() {
        let linear = EnvelopeConfig::new(0.01, 0.1, 0.5, 0.1);
        let slow = linear.with_attack_curve(3.0);
        let mut a = EnvelopeState::new();
        let mut b = EnvelopeState::new();
        a.note_on();
        b.note_on();
        let la = run(&mut a, &linear, 240);
        let lb = run(&mut b, &slow, 240);
        assert!((la - 0.5).abs() < 0.01);
        assert!((lb - 0.125).abs() < 0.01);
    }

    #[test]
    fn test_envelope_decay_to_sustain() {
        let cfg = EnvelopeConfig::new(0.0, 0.01, 0.4, 0.1);
        let mut env = EnvelopeState::new();
        env.note_on();
        let level = run(&mut env, &cfg, 1000);
        assert_eq!(env.stage(), EnvelopeStage::Sustain);
        assert!((level - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_envelope_release_mid_decay_from_current_level() {
        let cfg = EnvelopeConfig::new(0.0, 0.1, 0.2, 0.05);
        let mut env = EnvelopeState::new();
        env.note_on();
        let at_release = run(&mut env, &cfg, 2400);
        assert_eq!(env.stage(), EnvelopeStage::Decay);
        env.note_off();
        let first = env.advance(&cfg, DT);
        assert!(first <= at_release);
        assert!(at_release - first < 0.01, "jumped from {at_release} to {first}");

        let mut prev = first;
        while !env.is_idle() {
            let l = env.advance(&cfg, DT);
            assert!(l <= prev);
            prev = l;
        }
        assert_eq!(env.level(), 0.0);
    }

    #[test]
    fn test_envelope_release_mid_attack() {
        let cfg = EnvelopeConfig::new(0.1, 0.1, 0.8, 0.01);
        let mut env = EnvelopeState::new();
        env.note_on();
        let level = run(&mut env, &cfg, 480);
        env.note_off();
        assert!(env.advance(&cfg, DT) <= level);
        run(&mut env, &cfg, 1000);
        assert!(env.is_idle());
    }

    #[test]
    fn test_envelope_zero_release_is_immediate() {
        let cfg = EnvelopeConfig::new(0.0, 0.0, 1.0, 0.0);
        let mut env = EnvelopeState::new();
        env.note_on();
        run(&mut env, &cfg, 10);
        env.note_off();
        assert_eq!(env.advance(&cfg, DT), 0.0);
        assert!(env.is_idle());
    }

    #[test]
    fn test_envelope_retrigger_does_not_drop() {
        let cfg = EnvelopeConfig::new(0.05, 0.1, 0.7, 0.2);
        let mut env = EnvelopeState::new();
        env.note_on();
        let level = run(&mut env, &cfg, 48000);
        env.note_on();
        assert!(env.advance(&cfg, DT) >= level);
    }

    #[test]
    fn test_envelope_config_clamps() {
        let cfg = EnvelopeConfig::new(-1.0, f32::NAN, 3.0, 1000.0).with_attack_curve(0.0);
        assert_eq!(cfg.attack(), 0.0);
        assert_eq!(cfg.decay(), 0.0);
        assert_eq!(cfg.sustain(), 1.0);
        assert_eq!(cfg.release(), 60.0);
        assert_eq!(cfg.attack_curve(), 0.1);
    }

    #[test]
    fn test_envelope_reset_forces_silence() {
        let cfg = EnvelopeConfig::gate();
        let mut env = EnvelopeState::new();
        env.note_on();
        run(&mut env, &cfg, 10);
        env.reset();
        assert_eq!(env.level(), 0.0);
        assert!(env.is_idle());
    }
}
