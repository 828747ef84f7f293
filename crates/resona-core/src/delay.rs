//! Circular delay lines for digital waveguides.
//!
//! A [`WaveguideDelay`] is allocated once for the longest delay it will ever
//! need (the lowest playable pitch) and never reallocates afterwards. Delay
//! lengths can be fractional; the fractional part is resolved with one of
//! the [`FractionalRead`] methods.
//!
//! # Conventions
//!
//! `read` is called *before* `write` within a sample. With a delay of `N`
//! samples, the value returned by `read` is the one passed to `write`
//! exactly `N` calls earlier, so a read → filter → write loop has a period
//! of `N` samples.
//!
//! A line with zero capacity is valid and always reads silence.

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use crate::tables::{SINC_TAP_OFFSET, SINC_TAPS, Tables};

/// How the fractional part of a delay length is resolved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FractionalRead {
    /// Truncate to the integer delay.
    Integer,
    /// Two-point linear interpolation (slight high-frequency loss).
    #[default]
    Linear,
    /// First-order allpass interpolation (flat magnitude, stateful).
    Allpass,
    /// Kaiser-windowed sinc interpolation from [`Tables`].
    Sinc,
}

/// Fractional-length circular delay line for waveguide loops.
///
/// # Example
///
/// ```rust
/// use resona_core::{Tables, WaveguideDelay};
///
/// let tables = Tables::new();
/// let mut line = WaveguideDelay::new(64);
/// line.set_delay(4.0);
/// for x in [1.0, 0.0, 0.0, 0.0] {
///     line.read(&tables);
///     line.write(x);
/// }
/// // Four writes later the impulse comes back out.
/// assert_eq!(line.read(&tables), 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct WaveguideDelay {
    buffer: Vec<f32>,
    /// Index of the next write.
    write_pos: usize,
    delay: f32,
    delay_int: usize,
    frac: f32,
    mode: FractionalRead,
    // Allpass interpolator state
    ap_coeff: f32,
    ap_x1: f32,
    ap_y1: f32,
}

impl Default for WaveguideDelay {
    fn default() -> Self {
        Self::new(0)
    }
}

impl WaveguideDelay {
    /// Create a delay line able to hold up to `max_delay` samples.
    pub fn new(max_delay: usize) -> Self {
        let mut line = Self {
            buffer: vec![0.0; max_delay + 1],
            write_pos: 0,
            delay: 1.0,
            delay_int: 1,
            frac: 0.0,
            mode: FractionalRead::Linear,
            ap_coeff: 0.0,
            ap_x1: 0.0,
            ap_y1: 0.0,
        };
        if max_delay == 0 {
            line.buffer.clear();
        }
        line
    }

    /// Create a delay line long enough for `lowest_hz` at `sample_rate`.
    pub fn for_lowest_frequency(sample_rate: f32, lowest_hz: f32) -> Self {
        let max = if lowest_hz > 0.0 && sample_rate > 0.0 {
            (sample_rate / lowest_hz) as usize + SINC_TAPS
        } else {
            0
        };
        Self::new(max)
    }

    /// Reallocate for a new maximum length and clear.
    ///
    /// This is the one allocating operation; call it only from
    /// reconfiguration paths such as a sample-rate change.
    pub fn resize(&mut self, max_delay: usize) {
        self.buffer.clear();
        if max_delay > 0 {
            self.buffer.resize(max_delay + 1, 0.0);
        }
        self.write_pos = 0;
        self.set_delay(self.delay);
    }

    /// Maximum delay in samples (0 for an empty line).
    pub fn max_delay(&self) -> usize {
        self.buffer.len().saturating_sub(1)
    }

    /// Set the fractional-read method.
    pub fn set_fractional_read(&mut self, mode: FractionalRead) {
        self.mode = mode;
        self.set_delay(self.delay);
    }

    /// Current fractional-read method.
    pub fn fractional_read(&self) -> FractionalRead {
        self.mode
    }

    /// Set the delay length in samples.
    ///
    /// Clamped to `[1, max_delay]`. Sinc reads additionally need enough
    /// history on both sides of the read point, so their minimum is
    /// `SINC_TAPS / 2` samples; allpass reads need at least 1.5 samples to
    /// keep the interpolator pole away from the unit circle. Lines shorter
    /// than `SINC_TAPS` cannot hold a sinc window and read linearly instead.
    pub fn set_delay(&mut self, samples: f32) {
        let max = self.max_delay();
        if max == 0 {
            self.delay = 0.0;
            self.delay_int = 0;
            self.frac = 0.0;
            return;
        }
        let sinc = self.mode == FractionalRead::Sinc && max >= SINC_TAPS;
        let min = match self.mode {
            FractionalRead::Sinc if sinc => (SINC_TAPS / 2) as f32,
            FractionalRead::Allpass => 1.5,
            _ => 1.0,
        };
        let upper = if sinc {
            (max - SINC_TAPS / 2) as f32
        } else {
            max as f32
        };
        let samples = if samples.is_finite() { samples } else { min };
        let clamped = samples.clamp(min.min(upper), upper);
        self.delay = clamped;
        self.delay_int = clamped as usize;
        self.frac = clamped - self.delay_int as f32;
        if self.mode == FractionalRead::Allpass {
            // Thiran first-order: keep the fractional part in [0.5, 1.5) for a well-behaved pole.
            if self.frac < 0.5 && self.delay_int > 1 {
                self.delay_int -= 1;
                self.frac += 1.0;
            }
            self.ap_coeff = (1.0 - self.frac) / (1.0 + self.frac);
        }
    }

    /// Current delay length in samples.
    pub fn delay(&self) -> f32 {
        self.delay
    }

    /// Sample written `ago` writes before the most recent one (`ago = 1`
    /// is the latest write). Out-of-range offsets wrap.
    #[inline]
    pub fn tap(&self, ago: usize) -> f32 {
        let len = self.buffer.len();
        if len == 0 {
            return 0.0;
        }
        let ago = ago % len;
        self.buffer[(self.write_pos + len - ago) % len]
    }

    /// Read the delayed output for the current sample.
    #[inline]
    pub fn read(&mut self, tables: &Tables) -> f32 {
        if self.buffer.is_empty() {
            return 0.0;
        }
        let d = self.delay_int;
        match self.mode {
            FractionalRead::Integer => self.tap(d),
            FractionalRead::Sinc if d >= SINC_TAP_OFFSET => {
                let kernel = tables.sinc_kernel(self.frac);
                let base = d - SINC_TAP_OFFSET;
                kernel
                    .iter()
                    .enumerate()
                    .map(|(j, c)| c * self.tap(base + j))
                    .sum()
            }
            FractionalRead::Linear | FractionalRead::Sinc => {
                let a = self.tap(d);
                let b = self.tap(d + 1);
                a + (b - a) * self.frac
            }
            FractionalRead::Allpass => {
                let x = self.tap(d);
                let y = self.ap_coeff * x + self.ap_x1 - self.ap_coeff * self.ap_y1;
                self.ap_x1 = x;
                self.ap_y1 = crate::flush_denormal(y);
                self.ap_y1
            }
        }
    }

    /// Write the next input sample.
    #[inline]
    pub fn write(&mut self, sample: f32) {
        let len = self.buffer.len();
        if len == 0 {
            return;
        }
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % len;
    }

    /// Zero the buffer and interpolator state without reallocating.
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
        self.ap_x1 = 0.0;
        self.ap_y1 = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse_response(line: &mut WaveguideDelay, tables: &Tables, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let out = line.read(tables);
                line.write(if i == 0 { 1.0 } else { 0.0 });
                out
            })
            .collect()
    }

    #[test]
    fn test_integer_delay_period() {
        let tables = Tables::new();
        let mut line = WaveguideDelay::new(100);
        line.set_fractional_read(FractionalRead::Integer);
        line.set_delay(10.0);
        let ir = impulse_response(&mut line, &tables, 20);
        assert_eq!(ir[10], 1.0);
        assert_eq!(ir.iter().filter(|&&x| x != 0.0).count(), 1);
    }

    #[test]
    fn test_linear_fractional_delay() {
        let tables = Tables::new();
        let mut line = WaveguideDelay::new(100);
        line.set_delay(10.25);
        let ir = impulse_response(&mut line, &tables, 20);
        assert!((ir[10] - 0.75).abs() < 1e-6);
        assert!((ir[11] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_sinc_delay_centroid() {
        let tables = Tables::new();
        let mut line = WaveguideDelay::new(128);
        line.set_fractional_read(FractionalRead::Sinc);
        line.set_delay(20.5);
        let ir = impulse_response(&mut line, &tables, 40);
        let energy: f32 = ir.iter().sum();
        let centroid: f32 = ir.iter().enumerate().map(|(i, x)| i as f32 * x).sum::<f32>() / energy;
        assert!((energy - 1.0).abs() < 1e-3);
        assert!((centroid - 20.5).abs() < 0.05, "centroid {centroid}");
    }

    #[test]
    fn test_short_sinc_line_reads_linearly() {
        let tables = Tables::new();
        for max in 1..SINC_TAPS {
            let mut line = WaveguideDelay::new(max);
            line.set_fractional_read(FractionalRead::Sinc);
            line.set_delay(max as f32);
            line.write(1.0);
            for _ in 0..2 * max {
                let y = line.read(&tables);
                assert!(y.is_finite());
                line.write(0.0);
            }
        }

        let mut line = WaveguideDelay::new(4);
        line.set_fractional_read(FractionalRead::Sinc);
        line.set_delay(2.5);
        assert_eq!(line.delay(), 2.5);
        let ir = impulse_response(&mut line, &tables, 6);
        assert!((ir[2] - 0.5).abs() < 1e-6);
        assert!((ir[3] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_allpass_is_stable() {
        let tables = Tables::new();
        let mut line = WaveguideDelay::new(64);
        line.set_fractional_read(FractionalRead::Allpass);
        line.set_delay(7.3);
        for _ in 0..10_000 {
            let y = line.read(&tables);
            line.write(y * 0.999 + 0.01);
            assert!(y.is_finite() && y.abs() < 20.0);
        }
    }

    #[test]
    fn test_delay_clamped_to_capacity() {
        let mut line = WaveguideDelay::new(16);
        line.set_delay(1000.0);
        assert_eq!(line.delay(), 16.0);
        line.set_delay(-3.0);
        assert_eq!(line.delay(), 1.0);
        line.set_delay(f32::NAN);
        assert_eq!(line.delay(), 1.0);
    }

    #[test]
    fn test_empty_line_is_silent() {
        let tables = Tables::new();
        let mut line = WaveguideDelay::new(0);
        line.set_delay(10.0);
        line.write(1.0);
        assert_eq!(line.read(&tables), 0.0);
        assert_eq!(line.tap(1), 0.0);
    }

    #[test]
    fn test_resize_clears() {
        let tables = Tables::new();
        let mut line = WaveguideDelay::new(8);
        line.set_delay(2.0);
        line.write(1.0);
        line.resize(32);
        assert_eq!(line.max_delay(), 32);
        assert_eq!(line.read(&tables), 0.0);
    }
}
