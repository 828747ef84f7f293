//! Resona Synth - polyphonic synthesis engines for the resona framework
//!
//! Five engines share one real-time architecture: a bounded voice pool, a
//! per-voice envelope state machine and a pluggable per-voice kernel, driven
//! by a chunked render loop that never allocates.
//!
//! # Core Components
//!
//! ## Render Loop
//!
//! - [`Synth`] - Generic engine, monomorphized per [`Kernel`]
//! - [`SynthConfig`] - Sample rate, block size and polyphony
//! - [`SynthHandle`] - Lock-free control from another thread (`std` only)
//!
//! ## Voices
//!
//! - [`VoicePool`] - Fixed-capacity pool with oldest-first stealing
//! - [`VoiceHandle`] - Opaque reference to one note instance
//! - [`ActiveIndexSet`] - O(1) live-slot tracking
//!
//! ## Envelopes
//!
//! - [`EnvelopeConfig`] - Attack, decay, sustain, release and attack curve
//! - [`EnvelopeState`] - Per-voice (or per-partial, per-operator) stage machine
//!
//! ## Kernels
//!
//! - [`AdditiveKernel`] - Up to 512 partials, morphing, spectral shaping
//! - [`GranularKernel`] - Grain clouds over shared source buffers
//! - [`FmKernel`] - Six operators, 32 routing algorithms
//! - [`VectorKernel`] - Four sources blended from a 2D position
//! - [`PhysicalKernel`] - Waveguide strings and winds, modal percussion
//!
//! # no_std Support
//!
//! Kernels, voices and the render loop are `no_std` compatible. Disable the
//! default `std` feature:
//!
//! ```toml
//! [dependencies]
//! resona-synth = { version = "0.1", default-features = false }
//! ```
//!
//! Without `std` there is no [`Tables::shared`](resona_core::Tables::shared);
//! construct engines with [`Synth::with_tables`]. The cross-thread control
//! handle needs `std`.
//!
//! # Example
//!
//! ```rust
//! use resona_synth::{PhysicalKernel, PhysicalParams, PhysicalPreset, Synth, SynthConfig};
//!
//! let mut synth = Synth::new(
//!     PhysicalKernel::new(48000.0),
//!     PhysicalParams::preset(PhysicalPreset::AcousticGuitar),
//!     SynthConfig::new(48000.0).with_polyphony(6),
//! );
//!
//! // E minor chord
//! for note in [40.0, 47.0, 52.0, 55.0, 59.0, 64.0] {
//!     synth.note_on(note, 0.8);
//! }
//!
//! let mut left = vec![0.0; 1024];
//! let mut right = vec![0.0; 1024];
//! synth.process(&mut left, &mut right);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod active_set;
#[cfg(feature = "std")]
pub mod control;
pub mod engine;
pub mod envelope;
pub mod kernel;
pub mod oscillator;
pub mod voice;

// Re-export main types at crate root
pub use active_set::ActiveIndexSet;
#[cfg(feature = "std")]
pub use control::{Command, ControlError, NoteId, SynthHandle};
pub use engine::{Synth, SynthConfig};
pub use envelope::{EnvelopeConfig, EnvelopeStage, EnvelopeState};
pub use kernel::additive::{AdditiveParams, AdditivePreset, AdditiveVoice};
pub use kernel::fm::{Algorithm, FmParams, FmPreset, FmVoice, OperatorParams, OperatorWaveform};
pub use kernel::granular::{
    GranularParams, GranularPreset, GranularVoice, SchedulingMode, WindowShape,
};
pub use kernel::physical::{
    BodyProfile, Excitation, PhysicalModel, PhysicalParams, PhysicalPreset, PhysicalVoice,
};
pub use kernel::vector::{
    SourceParams, SourceWaveform, VectorParams, VectorPath, VectorPreset, VectorVoice,
};
pub use kernel::{
    AdditiveKernel, FmKernel, GranularKernel, Kernel, NoteContext, PhysicalKernel, VectorKernel,
};
pub use oscillator::{Oscillator, OscillatorWaveform};
pub use voice::{Allocation, MAX_POLYPHONY, Voice, VoiceHandle, VoicePool};

// Re-export commonly used types from resona-core
pub use resona_core::{FractionalRead, LfoWaveform, NoteDivision, Tables, TempoContext};
