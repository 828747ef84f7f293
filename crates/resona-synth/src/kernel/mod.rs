//! Synthesis kernels.
//!
//! A [`Kernel`] turns per-voice state plus shared parameters into samples.
//! [`Synth`](crate::Synth) is generic over the kernel, so each engine is
//! monomorphized and the render loop makes no dynamic calls per sample.
//!
//! | Kernel | Voice state |
//! |--------|-------------|
//! | [`AdditiveKernel`] | 512 partial phases with per-partial envelopes |
//! | [`GranularKernel`] | Up to 256 grains, scheduler, amplitude envelope |
//! | [`FmKernel`] | Six operators with envelopes, feedback history |
//! | [`VectorKernel`] | Four source oscillators, path and LFO state |
//! | [`PhysicalKernel`] | Waveguides, loss filters, modal bank, body |
//!
//! Kernels never look at another voice. Engine-wide state that is not
//! per-voice (sample rate, precomputed window bank, tempo) lives in the
//! kernel value itself and is only mutated outside the render pass.

pub mod additive;
pub mod fm;
pub mod granular;
pub mod physical;
pub mod vector;

pub use additive::AdditiveKernel;
pub use fm::FmKernel;
pub use granular::GranularKernel;
pub use physical::PhysicalKernel;
pub use vector::VectorKernel;

use resona_core::{TempoContext, Tables};

/// Everything a kernel learns about a new note.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteContext {
    /// MIDI note number (fractional when triggered by frequency)
    pub note: f32,
    /// Fundamental in Hz
    pub frequency: f32,
    /// Velocity in `[0, 1]`
    pub velocity: f32,
    /// Per-note seed for kernels that randomize
    pub seed: u32,
}

/// Per-voice sound generator.
///
/// Lifecycle of one note: [`reset`](Kernel::reset) (always, so a stolen
/// voice carries nothing over), [`start`](Kernel::start), any number of
/// [`render_block`](Kernel::render_block) / [`block_end`](Kernel::block_end)
/// pairs, [`release`](Kernel::release) on note-off, and finally
/// [`is_finished`](Kernel::is_finished) returning `true`.
///
/// Only [`new_voice`](Kernel::new_voice) and
/// [`prepare_voice`](Kernel::prepare_voice) may allocate; both run outside
/// the audio callback.
pub trait Kernel: Send {
    /// Engine parameters, swapped in whole between blocks.
    type Params: Clone + Send + 'static;
    /// State owned by one voice.
    type Voice: Send;

    /// Short engine name for logs and the CLI.
    fn name(&self) -> &'static str;

    /// Create an inert voice.
    fn new_voice(&self) -> Self::Voice;

    /// Adopt a new sample rate. Voices are re-prepared afterwards.
    fn set_sample_rate(&mut self, sample_rate: f32);

    /// Size voice buffers for the current sample rate.
    fn prepare_voice(&self, _voice: &mut Self::Voice) {}

    /// Latest tempo snapshot, delivered once per block while a tempo source is set.
    fn set_tempo(&mut self, _ctx: &TempoContext) {}

    /// Begin a note on a freshly reset voice.
    fn start(
        &self,
        voice: &mut Self::Voice,
        note: &NoteContext,
        params: &Self::Params,
        tables: &Tables,
    );

    /// Note-off: move envelopes into release.
    fn release(&self, voice: &mut Self::Voice, params: &Self::Params);

    /// Silence the voice and clear all state.
    fn reset(&self, voice: &mut Self::Voice);

    /// Produce one stereo sample.
    fn render(&self, voice: &mut Self::Voice, params: &Self::Params, tables: &Tables)
    -> (f32, f32);

    /// Add `left.len()` samples of this voice into the accumulators.
    fn render_block(
        &self,
        voice: &mut Self::Voice,
        params: &Self::Params,
        tables: &Tables,
        left: &mut [f32],
        right: &mut [f32],
    ) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let (a, b) = self.render(voice, params, tables);
            *l += a;
            *r += b;
        }
    }

    /// Batched cleanup after a block (e.g. retiring finished grains).
    fn block_end(&self, _voice: &mut Self::Voice) {}

    /// `true` once the voice can be reclaimed.
    fn is_finished(&self, voice: &Self::Voice) -> bool;
}
