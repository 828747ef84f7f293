//! Mathematical utility functions for synthesis.
//!
//! All functions are allocation-free and suitable for `no_std`.
//!
//! # Level and Pitch Conversions
//!
//! - [`db_to_linear`] / [`linear_to_db`] - Convert between dB and linear gain
//! - [`midi_to_freq`] / [`freq_to_midi`] - Equal-tempered note conversion (A4 = 440 Hz)
//! - [`cents_to_ratio`] / [`semitones_to_ratio`] - Detune ratios
//!
//! # Safety Nets
//!
//! - [`flush_denormal`] - Flush subnormals in feedback paths
//! - [`sanitize`] - Replace NaN/Inf with silence before a sample leaves the engine

use libm::{expf, log2f, logf, powf, sincosf};

/// Convert decibels to linear gain.
///
/// # Example
/// ```rust
/// use resona_core::db_to_linear;
///
/// assert!((db_to_linear(0.0) - 1.0).abs() < 0.001);
/// assert!((db_to_linear(-6.02) - 0.5).abs() < 0.01);
/// ```
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    // 10^(dB/20) = e^(dB * ln(10)/20)
    const FACTOR: f32 = core::f32::consts::LN_10 / 20.0;
    expf(db * FACTOR)
}

/// Convert linear gain to decibels. Inputs at or below zero read as -200 dB.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    const FACTOR: f32 = 20.0 / core::f32::consts::LN_10;
    logf(linear.max(1e-10)) * FACTOR
}

/// Convert a (possibly fractional) MIDI note number to frequency in Hz.
///
/// # Example
/// ```rust
/// use resona_core::midi_to_freq;
///
/// assert!((midi_to_freq(69.0) - 440.0).abs() < 1e-3);
/// assert!((midi_to_freq(60.0) - 261.626).abs() < 1e-2);
/// ```
#[inline]
pub fn midi_to_freq(note: f32) -> f32 {
    440.0 * powf(2.0, (note - 69.0) / 12.0)
}

/// Convert frequency in Hz to a fractional MIDI note number.
#[inline]
pub fn freq_to_midi(freq: f32) -> f32 {
    69.0 + 12.0 * log2f(freq.max(1e-6) / 440.0)
}

/// Convert a detune in cents to a frequency ratio.
#[inline]
pub fn cents_to_ratio(cents: f32) -> f32 {
    powf(2.0, cents / 1200.0)
}

/// Convert a transposition in semitones to a frequency ratio.
#[inline]
pub fn semitones_to_ratio(semitones: f32) -> f32 {
    powf(2.0, semitones / 12.0)
}

/// Constant-power pan law.
///
/// `pan` is in [-1, 1] (-1 = hard left). Returns `(left_gain, right_gain)`
/// with `l² + r² = 1`.
#[inline]
pub fn equal_power_pan(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * core::f32::consts::FRAC_PI_4;
    let (sin, cos) = sincosf(angle);
    (cos, sin)
}

/// Linear interpolation between two values.
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Convert milliseconds to samples.
#[inline]
pub fn ms_to_samples(ms: f32, sample_rate: f32) -> f32 {
    ms * sample_rate / 1000.0
}

/// Flush subnormal (denormalized) floats to zero.
///
/// Values below 1e-20 are replaced with zero, leaving margin before the
/// IEEE 754 subnormal range. Use in feedback loops (waveguides, resonators,
/// one-pole filters) where a signal can decay toward zero indefinitely.
#[allow(clippy::inline_always)]
#[inline(always)]
pub fn flush_denormal(x: f32) -> f32 {
    if x.abs() < 1e-20 { 0.0 } else { x }
}

/// Replace a non-finite sample with silence.
///
/// A single NaN would otherwise propagate through every feedback path in
/// the mix and never recover.
#[inline]
pub fn sanitize(x: f32) -> f32 {
    if x.is_finite() { x } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_linear_roundtrip() {
        let original = 0.5;
        let db = linear_to_db(original);
        let back = db_to_linear(db);
        assert!(
            (original - back).abs() < 1e-5,
            "Roundtrip failed: {} -> {} -> {}",
            original,
            db,
            back
        );
    }

    #[test]
    fn test_midi_freq_roundtrip() {
        for note in [21.0, 48.0, 60.0, 69.0, 108.0] {
            let back = freq_to_midi(midi_to_freq(note));
            assert!((back - note).abs() < 1e-3, "note {note} came back as {back}");
        }
    }

    #[test]
    fn test_detune_ratios() {
        assert!((cents_to_ratio(1200.0) - 2.0).abs() < 1e-5);
        assert!((semitones_to_ratio(-12.0) - 0.5).abs() < 1e-6);
        assert_eq!(cents_to_ratio(0.0), 1.0);
    }

    #[test]
    fn test_equal_power_pan() {
        let (l, r) = equal_power_pan(0.0);
        assert!((l - r).abs() < 1e-6);
        assert!((l * l + r * r - 1.0).abs() < 1e-5);

        let (l, r) = equal_power_pan(-1.0);
        assert!((l - 1.0).abs() < 1e-6 && r.abs() < 1e-6);

        // Out-of-range pan clamps
        let (l, r) = equal_power_pan(5.0);
        assert!(l.abs() < 1e-6 && (r - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize(0.25), 0.25);
        assert_eq!(sanitize(f32::NAN), 0.0);
        assert_eq!(sanitize(f32::INFINITY), 0.0);
        assert_eq!(sanitize(f32::NEG_INFINITY), 0.0);
    }

    #[test]
    fn test_flush_denormal() {
        assert_eq!(flush_denormal(1.0), 1.0);
        assert_eq!(flush_denormal(1e-10), 1e-10);
        assert_eq!(flush_denormal(1e-21), 0.0);
        assert_eq!(flush_denormal(-1e-38), 0.0);
    }

    #[test]
    fn test_lerp_and_ms() {
        assert_eq!(lerp(0.0, 10.0, 0.5), 5.0);
        assert_eq!(ms_to_samples(10.0, 48000.0), 480.0);
    }
}
