//! Grain window shapes and the precomputed window bank.
//!
//! Windows are never evaluated per sample. [`WindowBank`] holds one table
//! per `(shape, length class)`; a grain picks the class matching its length
//! at spawn and then only performs an interpolated table read.

use core::f32::consts::PI;
use libm::{cosf, expf, fabsf, powf};

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Grain window shapes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WindowShape {
    /// Raised cosine
    #[default]
    Hann,
    /// Gaussian bell (sigma 0.4)
    Gaussian,
    /// Linear up, linear down
    Triangle,
    /// 20% ramp up, flat, 20% ramp down
    Trapezoid,
    /// Cosine-tapered flat top (alpha 0.5)
    Tukey,
    /// Three-term Blackman
    Blackman,
    /// Kaiser-like power window
    Kaiser,
    /// Fast attack, exponential decay
    Exponential,
    /// Exponential swell, fast release
    ReversedExponential,
    /// One of the above, drawn per grain
    Random,
}

impl WindowShape {
    /// Shapes with a table in the bank (everything except `Random`).
    pub const TABLED: [WindowShape; 9] = [
        Self::Hann,
        Self::Gaussian,
        Self::Triangle,
        Self::Trapezoid,
        Self::Tukey,
        Self::Blackman,
        Self::Kaiser,
        Self::Exponential,
        Self::ReversedExponential,
    ];

    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hann => "hann",
            Self::Gaussian => "gaussian",
            Self::Triangle => "triangle",
            Self::Trapezoid => "trapezoid",
            Self::Tukey => "tukey",
            Self::Blackman => "blackman",
            Self::Kaiser => "kaiser",
            Self::Exponential => "exponential",
            Self::ReversedExponential => "reversed-exponential",
            Self::Random => "random",
        }
    }

    /// Look up a shape by name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::TABLED
            .into_iter()
            .chain(core::iter::once(Self::Random))
            .find(|s| s.name().eq_ignore_ascii_case(name))
    }

    fn table_index(self) -> usize {
        match self {
            Self::Hann | Self::Random => 0,
            Self::Gaussian => 1,
            Self::Triangle => 2,
            Self::Trapezoid => 3,
            Self::Tukey => 4,
            Self::Blackman => 5,
            Self::Kaiser => 6,
            Self::Exponential => 7,
            Self::ReversedExponential => 8,
        }
    }

    /// Window value at normalized position `x` in `[0, 1]`.
    pub fn evaluate(self, x: f32) -> f32 {
        let x = x.clamp(0.0, 1.0);
        match self {
            Self::Hann | Self::Random => 0.5 * (1.0 - cosf(2.0 * PI * x)),
            Self::Gaussian => {
                let u = (x - 0.5) / 0.4;
                expf(-0.5 * u * u)
            }
            Self::Triangle => 1.0 - fabsf(2.0 * x - 1.0),
            Self::Trapezoid => {
                if x < 0.2 {
                    x / 0.2
                } else if x < 0.8 {
                    1.0
                } else {
                    (1.0 - x) / 0.2
                }
            }
            Self::Tukey => {
                const ALPHA: f32 = 0.5;
                if x < ALPHA / 2.0 {
                    0.5 * (1.0 + cosf(PI * (2.0 * x / ALPHA - 1.0)))
                } else if x < 1.0 - ALPHA / 2.0 {
                    1.0
                } else {
                    0.5 * (1.0 + cosf(PI * (2.0 * x / ALPHA - 2.0 / ALPHA + 1.0)))
                }
            }
            Self::Blackman => {
                (0.42 - 0.5 * cosf(2.0 * PI * x) + 0.08 * cosf(4.0 * PI * x)).max(0.0)
            }
            Self::Kaiser => {
                let u = 2.0 * x - 1.0;
                powf((1.0 - u * u).max(0.0), 0.8)
            }
            Self::Exponential => {
                if x < 0.1 {
                    x / 0.1
                } else {
                    expf(-3.0 * (x - 0.1) / 0.9)
                }
            }
            Self::ReversedExponential => {
                if x > 0.9 {
                    (1.0 - x) / 0.1
                } else {
                    1.0 - expf(-3.0 * x / 0.9)
                }
            }
        }
    }
}

/// Grain lengths covered by the bank: 64, 128, ... 8192 samples.
pub const LENGTH_CLASSES: usize = 8;

const SMALLEST_CLASS: usize = 64;

/// Table resolution is capped; longer classes interpolate.
const MAX_TABLE_LEN: usize = 2048;

/// Precomputed windows for every shape and length class.
#[derive(Debug, Clone)]
pub struct WindowBank {
    data: Vec<f32>,
    /// `(offset, len)` per `shape * LENGTH_CLASSES + class`
    tables: Vec<(usize, usize)>,
}

impl Default for WindowBank {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowBank {
    /// Build every table. Allocates; call at startup.
    pub fn new() -> Self {
        let mut data = Vec::new();
        let mut tables = Vec::with_capacity(WindowShape::TABLED.len() * LENGTH_CLASSES);
        for shape in WindowShape::TABLED {
            for class in 0..LENGTH_CLASSES {
                let len = (SMALLEST_CLASS << class).min(MAX_TABLE_LEN);
                let offset = data.len();
                let last = (len - 1) as f32;
                data.extend((0..len).map(|i| shape.evaluate(i as f32 / last)));
                tables.push((offset, len));
            }
        }
        Self { data, tables }
    }

    /// Smallest class whose length covers `grain_len` (the largest class for longer grains).
    pub fn class_for(grain_len: usize) -> usize {
        (0..LENGTH_CLASSES)
            .find(|&c| (SMALLEST_CLASS << c) >= grain_len)
            .unwrap_or(LENGTH_CLASSES - 1)
    }

    /// Table for `(shape, class)`.
    pub fn table(&self, shape: WindowShape, class: usize) -> &[f32] {
        let (offset, len) =
            self.tables[shape.table_index() * LENGTH_CLASSES + class.min(LENGTH_CLASSES - 1)];
        &self.data[offset..offset + len]
    }

    /// Interpolated window value at normalized position `x` in `[0, 1]`.
    #[inline]
    pub fn value(&self, shape: WindowShape, class: usize, x: f32) -> f32 {
        let table = self.table(shape, class);
        let last = table.len() - 1;
        let pos = x.clamp(0.0, 1.0) * last as f32;
        let i = (pos as usize).min(last);
        let j = (i + 1).min(last);
        let frac = pos - i as f32;
        table[i] + (table[j] - table[i]) * frac
    }
}
