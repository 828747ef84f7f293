//! Precomputed lookup tables shared by every voice.
//!
//! [`Tables`] holds a band-limited sine table and a Kaiser-windowed sinc
//! table for fractional-delay reads. Both are built once and never mutated;
//! kernels borrow them as `&Tables` so any number of voices and engines can
//! read them without synchronization.
//!
//! With the `std` feature, [`Tables::shared`] returns a process-wide
//! instance initialized on first use. Call it once during startup, before
//! the audio thread runs, so the build cost never lands in a callback.
//!
//! # Example
//!
//! ```rust
//! use resona_core::Tables;
//!
//! let tables = Tables::new();
//! assert!(tables.sin(0.25) > 0.9999);
//! assert!(tables.sin(-0.25) < -0.9999);
//! ```

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use core::f32::consts::PI;
use libm::{floorf, sinf, sqrtf};

/// Number of points in one period of the sine table.
pub const SINE_TABLE_SIZE: usize = 4096;

/// Taps per fractional-delay kernel.
pub const SINC_TAPS: usize = 8;

/// Fractional positions resolved by the sinc table.
pub const SINC_PHASES: usize = 256;

/// Shape parameter of the Kaiser window applied to the sinc kernel.
pub const KAISER_BETA: f32 = 8.0;

/// Offset of the first sinc tap relative to the integer delay.
///
/// Tap `j` reads the sample `delay_int + j - SINC_TAP_OFFSET` samples ago.
pub const SINC_TAP_OFFSET: usize = SINC_TAPS / 2 - 1;

/// Immutable lookup tables.
#[derive(Debug, Clone)]
pub struct Tables {
    /// One sine period plus a guard point for interpolation.
    sine: Vec<f32>,
    /// `(SINC_PHASES + 1) * SINC_TAPS` windowed-sinc coefficients, row-major by phase.
    sinc: Vec<f32>,
}

impl Default for Tables {
    fn default() -> Self {
        Self::new()
    }
}

impl Tables {
    /// Build all tables.
    ///
    /// Allocates roughly 24 KiB. Not real-time safe; build before audio starts.
    pub fn new() -> Self {
        let sine = (0..=SINE_TABLE_SIZE)
            .map(|i| sinf(2.0 * PI * i as f32 / SINE_TABLE_SIZE as f32))
            .collect();

        let mut sinc = Vec::with_capacity((SINC_PHASES + 1) * SINC_TAPS);
        for phase in 0..=SINC_PHASES {
            let frac = phase as f32 / SINC_PHASES as f32;
            let row_start = sinc.len();
            for tap in 0..SINC_TAPS {
                let t = tap as f32 - SINC_TAP_OFFSET as f32 - frac;
                sinc.push(normalized_sinc(t) * kaiser(t / (SINC_TAPS / 2) as f32, KAISER_BETA));
            }
            // Unity DC gain per row keeps waveguide loops from drifting in level.
            let sum: f32 = sinc[row_start..].iter().sum();
            if sum.abs() > 1e-6 {
                for c in &mut sinc[row_start..] {
                    *c /= sum;
                }
            }
        }

        Self { sine, sinc }
    }

    /// Process-wide tables, built on first call.
    #[cfg(feature = "std")]
    pub fn shared() -> &'static Tables {
        static SHARED: std::sync::OnceLock<Tables> = std::sync::OnceLock::new();
        SHARED.get_or_init(|| {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                sine_points = SINE_TABLE_SIZE,
                sinc_phases = SINC_PHASES,
                "building shared lookup tables"
            );
            Tables::new()
        })
    }

    /// Sine of a phase expressed in turns (1.0 = one full period).
    ///
    /// Any finite phase is accepted, including negative values; the phase is
    /// wrapped before lookup. Linear interpolation keeps the error below 3e-7.
    #[inline]
    pub fn sin(&self, phase_turns: f32) -> f32 {
        let wrapped = phase_turns - floorf(phase_turns);
        let pos = wrapped * SINE_TABLE_SIZE as f32;
        // `wrapped` can round up to exactly 1.0 for tiny negative inputs.
        let index = (pos as usize).min(SINE_TABLE_SIZE - 1);
        let frac = pos - index as f32;
        let a = self.sine[index];
        let b = self.sine[index + 1];
        a + (b - a) * frac
    }

    /// Cosine of a phase in turns.
    #[inline]
    pub fn cos(&self, phase_turns: f32) -> f32 {
        self.sin(phase_turns + 0.25)
    }

    /// Windowed-sinc kernel for a fractional delay in `[0, 1]`.
    ///
    /// Returns [`SINC_TAPS`] coefficients; see [`SINC_TAP_OFFSET`] for the
    /// tap alignment.
    #[inline]
    pub fn sinc_kernel(&self, frac: f32) -> &[f32] {
        let phase = ((frac.clamp(0.0, 1.0) * SINC_PHASES as f32) + 0.5) as usize;
        let start = phase.min(SINC_PHASES) * SINC_TAPS;
        &self.sinc[start..start + SINC_TAPS]
    }
}

/// sin(πx)/(πx) with the removable singularity filled in.
fn normalized_sinc(x: f32) -> f32 {
    if x.abs() < 1e-6 {
        1.0
    } else {
        sinf(PI * x) / (PI * x)
    }
}

/// Kaiser window evaluated at `x` in [-1, 1]; zero outside.
fn kaiser(x: f32, beta: f32) -> f32 {
    if x.abs() > 1.0 {
        return 0.0;
    }
    bessel_i0(beta * sqrtf(1.0 - x * x)) / bessel_i0(beta)
}

/// Zeroth-order modified Bessel function of the first kind (power series).
fn bessel_i0(x: f32) -> f32 {
    let half = x * 0.5;
    let mut term = 1.0f32;
    let mut sum = 1.0f32;
    for k in 1..32 {
        let ratio = half / k as f32;
        term *= ratio * ratio;
        sum += term;
        if term < sum * 1e-9 {
            break;
        }
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sine_matches_libm() {
        let tables = Tables::new();
        for i in 0..1000 {
            let phase = i as f32 * 0.001_37 - 0.5;
            let expected = sinf(2.0 * PI * phase);
            let got = tables.sin(phase);
            assert!(
                (got - expected).abs() < 1e-5,
                "sin({phase}) = {got}, expected {expected}"
            );
        }
    }

    #[test]
    fn test_sine_wraps_large_phases() {
        let tables = Tables::new();
        assert!((tables.sin(10.25) - 1.0).abs() < 1e-5);
        assert!((tables.sin(-3.75) - 1.0).abs() < 1e-5);
        assert!(tables.sin(-1e-9).abs() < 1e-5);
    }

    #[test]
    fn test_cos_quadrature() {
        let tables = Tables::new();
        for i in 0..64 {
            let p = i as f32 / 64.0;
            let s = tables.sin(p);
            let c = tables.cos(p);
            assert!((s * s + c * c - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_sinc_integer_delay_is_identity() {
        let tables = Tables::new();
        let kernel = tables.sinc_kernel(0.0);
        for (tap, c) in kernel.iter().enumerate() {
            if tap == SINC_TAP_OFFSET {
                assert!((c - 1.0).abs() < 1e-5);
            } else {
                assert!(c.abs() < 1e-5, "tap {tap} = {c}");
            }
        }
    }

    #[test]
    fn test_sinc_rows_unity_gain() {
        let tables = Tables::new();
        for p in 0..=16 {
            let sum: f32 = tables.sinc_kernel(p as f32 / 16.0).iter().sum();
            assert!((sum - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_kaiser_window_shape() {
        assert!((kaiser(0.0, KAISER_BETA) - 1.0).abs() < 1e-6);
        assert!(kaiser(0.9, KAISER_BETA) < kaiser(0.5, KAISER_BETA));
        assert_eq!(kaiser(1.5, KAISER_BETA), 0.0);
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_shared_is_singleton() {
        let a = Tables::shared() as *const Tables;
        let b = Tables::shared() as *const Tables;
        assert_eq!(a, b);
    }
}
