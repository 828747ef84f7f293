//! Resona Core - lookup tables and DSP primitives for the resona synthesis engines
//!
//! Everything here is allocation-free after construction and safe to call
//! from a real-time audio callback.
//!
//! # Core Abstractions
//!
//! ## Precomputed Tables
//!
//! - [`Tables`] - Sine and Kaiser-windowed sinc tables, built once and shared by reference
//!
//! ## Waveguide Building Blocks
//!
//! - [`WaveguideDelay`] - Fractional-length circular delay ([`FractionalRead`] selects
//!   linear, allpass or sinc interpolation)
//! - [`OnePole`] - Loss/brightness filter
//! - [`DcBlocker`] - Output DC removal
//! - [`Resonator`] - Two-pole body and formant resonance
//!
//! ## Modulation
//!
//! - [`Lfo`] - Low-frequency oscillator with optional tempo sync
//! - [`TempoContext`] / [`NoteDivision`] - External tempo source snapshot
//! - [`SmoothedParam`] - Zipper-free scalar ramps
//! - [`Rng`] - Deterministic xorshift randomness
//!
//! ## Utilities
//!
//! - Math functions: [`midi_to_freq`], [`db_to_linear`], [`equal_power_pan`], [`sanitize`], etc.
//!
//! # no_std Support
//!
//! This crate is `no_std` compatible. Disable the default `std` feature:
//!
//! ```toml
//! [dependencies]
//! resona-core = { version = "0.1", default-features = false }
//! ```
//!
//! Without `std`, [`Tables::shared`] is unavailable; build a [`Tables`] at
//! startup and hand out `&'static` references to it from your own static.
//!
//! # Example
//!
//! ```rust
//! use resona_core::{OnePole, Tables, WaveguideDelay};
//!
//! let tables = Tables::new();
//! let mut line = WaveguideDelay::new(2400);
//! let mut loss = OnePole::with_coeff(0.2);
//! line.set_delay(109.1);
//!
//! line.write(1.0);
//! for _ in 0..1000 {
//!     let y = line.read(&tables);
//!     line.write(loss.process(y) * 0.996);
//! }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod dc_blocker;
pub mod delay;
pub mod lfo;
pub mod math;
pub mod one_pole;
pub mod param;
pub mod resonator;
pub mod rng;
pub mod tables;
pub mod tempo;

// Re-export main types at crate root
pub use dc_blocker::DcBlocker;
pub use delay::{FractionalRead, WaveguideDelay};
pub use lfo::{Lfo, LfoWaveform};
pub use math::{
    cents_to_ratio, db_to_linear, equal_power_pan, flush_denormal, freq_to_midi, lerp,
    linear_to_db, midi_to_freq, ms_to_samples, sanitize, semitones_to_ratio,
};
pub use one_pole::OnePole;
pub use param::SmoothedParam;
pub use resonator::Resonator;
pub use rng::Rng;
pub use tables::{SINC_PHASES, SINC_TAPS, SINE_TABLE_SIZE, Tables};
pub use tempo::{NoteDivision, TempoContext};
