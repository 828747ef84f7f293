//! Polyphonic render loop shared by every engine.
//!
//! [`Synth`] owns a [`VoicePool`] of kernel voices, the current parameter
//! snapshot and two pre-sized accumulators. One call to
//! [`process`](Synth::process) renders the request in chunks of at most
//! `max_block_size` frames:
//!
//! 1. clear the accumulators,
//! 2. let every active voice add its block, then run its batched cleanup,
//! 3. reclaim voices whose kernel reports them finished,
//! 4. apply the smoothed master gain and write the output.
//!
//! Nothing in that path allocates or locks. Buffers only grow in
//! [`prepare`](Synth::prepare), which callers run outside the audio callback.

use crate::kernel::{Kernel, NoteContext};
use crate::voice::{VoiceHandle, VoicePool};
use resona_core::{Rng, SmoothedParam, Tables, TempoContext, freq_to_midi, midi_to_freq, sanitize};

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, vec, vec::Vec};

#[cfg(feature = "std")]
use crate::control::RenderPort;

/// Master gain ramp time.
const GAIN_SMOOTHING_MS: f32 = 10.0;

const MIN_SAMPLE_RATE: f32 = 1000.0;
const MAX_SAMPLE_RATE: f32 = 768_000.0;
const MAX_BLOCK_SIZE: usize = 8192;

/// Fixed engine dimensions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SynthConfig {
    /// Output sample rate in Hz
    pub sample_rate: f32,
    /// Largest chunk rendered in one pass; longer requests are split
    pub max_block_size: usize,
    /// Number of voices (1 to [`MAX_POLYPHONY`](crate::MAX_POLYPHONY))
    pub polyphony: usize,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            max_block_size: 512,
            polyphony: 8,
        }
    }
}

impl SynthConfig {
    /// Config at `sample_rate` with default block size and polyphony.
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }

    /// Set the voice count.
    pub fn with_polyphony(mut self, polyphony: usize) -> Self {
        self.polyphony = polyphony;
        self
    }

    /// Set the largest rendered chunk.
    pub fn with_max_block_size(mut self, frames: usize) -> Self {
        self.max_block_size = frames;
        self
    }
}

fn clamp_sample_rate(rate: f32) -> f32 {
    if rate.is_finite() {
        rate.clamp(MIN_SAMPLE_RATE, MAX_SAMPLE_RATE)
    } else {
        48000.0
    }
}

/// A polyphonic synthesizer running kernel `K`.
///
/// # Example
///
/// ```rust
/// use resona_synth::{FmKernel, FmParams, Synth, SynthConfig};
///
/// let config = SynthConfig::new(48000.0).with_polyphony(8);
/// let mut synth = Synth::new(FmKernel::new(48000.0), FmParams::default(), config);
///
/// synth.note_on(69.0, 1.0);
/// let mut left = vec![0.0; 512];
/// let mut right = vec![0.0; 512];
/// synth.process(&mut left, &mut right);
/// assert!(left.iter().any(|s| s.abs() > 0.0));
/// ```
pub struct Synth<K: Kernel> {
    kernel: K,
    params: Box<K::Params>,
    pool: VoicePool<K::Voice>,
    tables: &'static Tables,
    left: Vec<f32>,
    right: Vec<f32>,
    config: SynthConfig,
    master_gain: SmoothedParam,
    gain: f32,
    muted: bool,
    tempo: Option<TempoContext>,
    seeds: Rng,
    #[cfg(feature = "std")]
    port: Option<RenderPort<K::Params>>,
}

impl<K: Kernel> Synth<K> {
    /// Create an engine using the process-wide lookup tables.
    #[cfg(feature = "std")]
    pub fn new(kernel: K, params: K::Params, config: SynthConfig) -> Self {
        Self::with_tables(kernel, params, config, Tables::shared())
    }

    /// Create an engine reading `tables`.
    ///
    /// Allocates every voice and both accumulators up front.
    pub fn with_tables(
        mut kernel: K,
        params: K::Params,
        config: SynthConfig,
        tables: &'static Tables,
    ) -> Self {
        let config = SynthConfig {
            sample_rate: clamp_sample_rate(config.sample_rate),
            max_block_size: config.max_block_size.clamp(1, MAX_BLOCK_SIZE),
            polyphony: config.polyphony,
        };
        kernel.set_sample_rate(config.sample_rate);
        let pool = VoicePool::new(config.polyphony, || {
            let mut voice = kernel.new_voice();
            kernel.prepare_voice(&mut voice);
            voice
        });
        let config = SynthConfig {
            polyphony: pool.capacity(),
            ..config
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            engine = kernel.name(),
            sample_rate = config.sample_rate,
            polyphony = config.polyphony,
            max_block_size = config.max_block_size,
            "synth created"
        );

        Self {
            kernel,
            params: Box::new(params),
            pool,
            tables,
            left: vec![0.0; config.max_block_size],
            right: vec![0.0; config.max_block_size],
            config,
            master_gain: SmoothedParam::with_config(1.0, config.sample_rate, GAIN_SMOOTHING_MS),
            gain: 1.0,
            muted: false,
            tempo: None,
            seeds: Rng::new(0x5EED_1234),
            #[cfg(feature = "std")]
            port: None,
        }
    }

    #[cfg(feature = "std")]
    pub(crate) fn attach(&mut self, port: RenderPort<K::Params>) {
        self.port = Some(port);
    }

    /// The kernel.
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Engine name reported by the kernel.
    pub fn engine_name(&self) -> &'static str {
        self.kernel.name()
    }

    /// Current dimensions.
    pub fn config(&self) -> SynthConfig {
        self.config
    }

    /// Current sample rate.
    pub fn sample_rate(&self) -> f32 {
        self.config.sample_rate
    }

    /// Number of voices.
    pub fn polyphony(&self) -> usize {
        self.pool.capacity()
    }

    /// Number of sounding voices.
    pub fn active_voice_count(&self) -> usize {
        self.pool.active_count()
    }

    /// Current parameter snapshot.
    pub fn params(&self) -> &K::Params {
        &self.params
    }

    /// Edit the parameter snapshot in place.
    ///
    /// Only for single-threaded use; a split engine receives whole
    /// snapshots through [`SynthHandle::set_params`](crate::SynthHandle::set_params).
    pub fn params_mut(&mut self) -> &mut K::Params {
        &mut self.params
    }

    /// Replace the parameter snapshot.
    pub fn set_params(&mut self, params: K::Params) {
        *self.params = params;
    }

    /// Kernel state of the note behind `handle`, if it is still playing.
    pub fn voice_state(&self, handle: VoiceHandle) -> Option<&K::Voice> {
        if self.pool.is_current(handle) {
            self.pool.voice(handle.index()).map(|v| &v.state)
        } else {
            None
        }
    }

    /// Whether the note behind `handle` is still sounding.
    pub fn is_playing(&self, handle: VoiceHandle) -> bool {
        self.pool.is_current(handle)
    }

    /// Change the sample rate.
    ///
    /// Silences every voice and re-prepares kernel buffers, so it must not
    /// run concurrently with [`process`](Self::process).
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        let sample_rate = clamp_sample_rate(sample_rate);
        self.config.sample_rate = sample_rate;
        self.kernel.set_sample_rate(sample_rate);
        let kernel = &self.kernel;
        self.pool.reset_all(|voice| {
            kernel.prepare_voice(voice);
            kernel.reset(voice);
        });
        self.master_gain.set_sample_rate(sample_rate);

        #[cfg(feature = "tracing")]
        tracing::debug!(engine = self.kernel.name(), sample_rate, "sample rate changed");
    }

    /// Grow the accumulators for chunks of up to `max_block_size` frames.
    ///
    /// Requests larger than this are still rendered, just in several chunks.
    pub fn prepare(&mut self, max_block_size: usize) {
        let frames = max_block_size.clamp(1, MAX_BLOCK_SIZE);
        if frames > self.left.len() {
            self.left.resize(frames, 0.0);
            self.right.resize(frames, 0.0);
        }
        self.config.max_block_size = frames;

        #[cfg(feature = "tracing")]
        tracing::debug!(engine = self.kernel.name(), max_block_size = frames, "block size changed");
    }

    /// Start a note by MIDI number (fractional notes are microtonal).
    ///
    /// Returns `None` while muted. When every voice is busy the oldest one
    /// is reset and reused.
    pub fn note_on(&mut self, note: f32, velocity: f32) -> Option<VoiceHandle> {
        let note = if note.is_finite() { note.clamp(0.0, 127.0) } else { 60.0 };
        self.start_voice(note, midi_to_freq(note), velocity, 0)
    }

    /// Start a note by frequency in Hz.
    pub fn note_on_hz(&mut self, frequency: f32, velocity: f32) -> Option<VoiceHandle> {
        let frequency = self.clamp_frequency(frequency);
        self.start_voice(freq_to_midi(frequency), frequency, velocity, 0)
    }

    pub(crate) fn note_on_tagged(
        &mut self,
        note: f32,
        frequency: f32,
        velocity: f32,
        tag: u64,
    ) -> Option<VoiceHandle> {
        self.start_voice(note, frequency, velocity, tag)
    }

    fn clamp_frequency(&self, frequency: f32) -> f32 {
        if frequency.is_finite() {
            frequency.clamp(1.0, self.config.sample_rate * 0.5)
        } else {
            440.0
        }
    }

    fn start_voice(
        &mut self,
        note: f32,
        frequency: f32,
        velocity: f32,
        tag: u64,
    ) -> Option<VoiceHandle> {
        if self.muted {
            return None;
        }
        let velocity = if velocity.is_finite() { velocity.clamp(0.0, 1.0) } else { 0.0 };
        let allocation = self.pool.allocate(note, frequency, velocity);
        let handle = allocation.handle;
        let ctx = NoteContext {
            note,
            frequency,
            velocity,
            seed: self.seeds.next_u32(),
        };
        let voice = self.pool.voice_mut(handle.index())?;
        voice.set_tag(tag);
        self.kernel.reset(&mut voice.state);
        self.kernel.start(&mut voice.state, &ctx, &self.params, self.tables);
        Some(handle)
    }

    /// Release every voice playing MIDI `note`. Returns how many were released.
    pub fn note_off(&mut self, note: f32) -> usize {
        let kernel = &self.kernel;
        let params = &*self.params;
        self.pool
            .release_note(note, |voice| kernel.release(&mut voice.state, params))
    }

    /// Release every voice started at `frequency` Hz.
    pub fn note_off_hz(&mut self, frequency: f32) -> usize {
        let note = freq_to_midi(self.clamp_frequency(frequency));
        self.note_off(note)
    }

    /// Release one note instance. Stale handles are ignored.
    pub fn note_off_handle(&mut self, handle: VoiceHandle) -> bool {
        let kernel = &self.kernel;
        let params = &*self.params;
        self.pool
            .release_handle(handle, |voice| kernel.release(&mut voice.state, params))
    }

    pub(crate) fn note_off_tag(&mut self, tag: u64) -> usize {
        let kernel = &self.kernel;
        let params = &*self.params;
        self.pool
            .release_tag(tag, |voice| kernel.release(&mut voice.state, params))
    }

    /// Release every sounding voice.
    pub fn all_notes_off(&mut self) -> usize {
        let kernel = &self.kernel;
        let params = &*self.params;
        self.pool
            .release_all(|voice| kernel.release(&mut voice.state, params))
    }

    /// Silence and reclaim every voice immediately.
    pub fn reset(&mut self) {
        let kernel = &self.kernel;
        self.pool.reset_all(|voice| kernel.reset(voice));
        self.master_gain.set_immediate(self.target_gain());
    }

    /// Master output gain.
    pub fn master_gain(&self) -> f32 {
        self.gain
    }

    /// Set master gain (0.0 to 2.0), ramped over 10 ms.
    pub fn set_master_gain(&mut self, gain: f32) {
        self.gain = if gain.is_finite() { gain.clamp(0.0, 2.0) } else { 0.0 };
        self.master_gain.set_target(self.target_gain());
    }

    /// Whether the engine is muted.
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Mute or unmute. While muted, output fades to silence and
    /// [`note_on`](Self::note_on) is refused.
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.master_gain.set_target(self.target_gain());
    }

    fn target_gain(&self) -> f32 {
        if self.muted { 0.0 } else { self.gain }
    }

    /// Tempo source for tempo-synced modulation, or `None` to free-run.
    pub fn tempo(&self) -> Option<TempoContext> {
        self.tempo
    }

    /// Set the tempo snapshot.
    ///
    /// The engine advances the beat position itself between calls; hosts
    /// with an authoritative transport call this every block.
    pub fn set_tempo(&mut self, tempo: Option<TempoContext>) {
        self.tempo = tempo;
    }

    /// Render stereo output. Frames beyond the shorter slice are zeroed.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        #[cfg(feature = "std")]
        self.drain_commands();

        let frames = left.len().min(right.len());
        let chunk = self.config.max_block_size.min(self.left.len()).max(1);
        let mut offset = 0;
        while offset < frames {
            let n = (frames - offset).min(chunk);
            self.render_chunk(&mut left[offset..offset + n], &mut right[offset..offset + n]);
            offset += n;
        }
        left[frames..].fill(0.0);
        right[frames..].fill(0.0);
    }

    /// Render mono output (the left channel of the stereo mix).
    pub fn process_mono(&mut self, out: &mut [f32]) {
        #[cfg(feature = "std")]
        self.drain_commands();

        let chunk = self.config.max_block_size.min(self.left.len()).max(1);
        for block in out.chunks_mut(chunk) {
            self.render_voices(block.len());
            for (o, &l) in block.iter_mut().zip(&self.left) {
                *o = sanitize(l * self.master_gain.advance());
            }
            self.advance_tempo(block.len());
        }
    }

    fn render_chunk(&mut self, left: &mut [f32], right: &mut [f32]) {
        let n = left.len();
        self.render_voices(n);
        for (((o_l, o_r), &l), &r) in left
            .iter_mut()
            .zip(right.iter_mut())
            .zip(&self.left)
            .zip(&self.right)
        {
            let g = self.master_gain.advance();
            *o_l = sanitize(l * g);
            *o_r = sanitize(r * g);
        }
        self.advance_tempo(n);
    }

    // Mix `n` frames of every active voice into the accumulators, then sweep.
    fn render_voices(&mut self, n: usize) {
        if let Some(tempo) = &self.tempo {
            self.kernel.set_tempo(tempo);
        }
        let acc_l = &mut self.left[..n];
        let acc_r = &mut self.right[..n];
        acc_l.fill(0.0);
        acc_r.fill(0.0);

        let kernel = &self.kernel;
        let params = &*self.params;
        let tables = self.tables;
        self.pool.for_each_active(|voice| {
            kernel.render_block(&mut voice.state, params, tables, acc_l, acc_r);
            kernel.block_end(&mut voice.state);
        });
        self.pool.sweep(|voice| kernel.is_finished(&voice.state));
    }

    fn advance_tempo(&mut self, frames: usize) {
        if let Some(tempo) = &mut self.tempo {
            tempo.advance(frames, self.config.sample_rate);
        }
    }

    #[cfg(feature = "std")]
    fn drain_commands(&mut self) {
        use crate::control::Command;

        let Some(mut port) = self.port.take() else {
            return;
        };
        if let Some(params) = port.take_deferred() {
            self.swap_params(&mut port, params);
        }
        while !port.is_deferring() {
            let Some(command) = port.try_recv() else {
                break;
            };
            match command {
                Command::NoteOn { id, note, velocity } => {
                    let note = if note.is_finite() { note.clamp(0.0, 127.0) } else { 60.0 };
                    self.note_on_tagged(note, midi_to_freq(note), velocity, id.get());
                }
                Command::NoteOnHz {
                    id,
                    frequency,
                    velocity,
                } => {
                    let frequency = self.clamp_frequency(frequency);
                    self.note_on_tagged(freq_to_midi(frequency), frequency, velocity, id.get());
                }
                Command::NoteOff { note } => {
                    self.note_off(note);
                }
                Command::NoteOffId(id) => {
                    self.note_off_tag(id.get());
                }
                Command::AllNotesOff => {
                    self.all_notes_off();
                }
                Command::SetParams(params) => self.swap_params(&mut port, params),
                Command::SetMasterGain(gain) => self.set_master_gain(gain),
                Command::SetMuted(muted) => self.set_muted(muted),
                Command::SetTempo(tempo) => self.set_tempo(tempo),
            }
        }
        self.port = Some(port);
    }

    // The old snapshot goes back to the control thread to be dropped there.
    #[cfg(feature = "std")]
    fn swap_params(&mut self, port: &mut RenderPort<K::Params>, params: Box<K::Params>) {
        if !port.can_return() {
            port.defer(params);
            return;
        }
        let old = core::mem::replace(&mut self.params, params);
        port.give_back(old);

        #[cfg(feature = "tracing")]
        tracing::debug!(engine = self.kernel.name(), "parameter snapshot swapped");
    }
}

impl<K: Kernel + core::fmt::Debug> core::fmt::Debug for Synth<K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Synth")
            .field("kernel", &self.kernel)
            .field("config", &self.config)
            .field("active_voices", &self.pool.active_count())
            .field("master_gain", &self.gain)
            .field("muted", &self.muted)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::fm::{FmKernel, FmParams, FmPreset};
    use crate::kernel::physical::{PhysicalKernel, PhysicalParams, PhysicalPreset};

    const SR: f32 = 48000.0;

    fn fm(polyphony: usize) -> Synth<FmKernel> {
        let config = SynthConfig::new(SR).with_polyphony(polyphony);
        Synth::new(FmKernel::new(SR), FmParams::preset(FmPreset::Organ), config)
    }

    fn render(synth: &mut Synth<impl Kernel>, frames: usize) -> (Vec<f32>, Vec<f32>) {
        let mut left = vec![0.0; frames];
        let mut right = vec![0.0; frames];
        synth.process(&mut left, &mut right);
        (left, right)
    }

    #[test]
    fn test_note_on_produces_sound() {
        let mut synth = fm(8);
        assert!(synth.note_on(69.0, 1.0).is_some());
        let (left, right) = render(&mut synth, 512);
        assert!(left.iter().any(|s| s.abs() > 0.01));
        assert_eq!(left, right);
    }

    #[test]
    fn test_ninth_note_steals_oldest() {
        let mut synth = fm(8);
        let first = synth.note_on(60.0, 1.0).unwrap();
        for n in 1..8 {
            synth.note_on(60.0 + n as f32, 1.0);
        }
        assert_eq!(synth.active_voice_count(), 8);
        let ninth = synth.note_on(72.0, 1.0).unwrap();
        assert_eq!(synth.active_voice_count(), 8);
        assert_eq!(ninth.index(), first.index());
        assert!(!synth.is_playing(first));
    }

    #[test]
    fn test_note_off_reclaims_after_release() {
        let mut synth = fm(4);
        synth.note_on(60.0, 1.0);
        render(&mut synth, 256);
        assert_eq!(synth.note_off(60.0), 1);
        assert_eq!(synth.active_voice_count(), 1);
        // Organ release is 50 ms.
        render(&mut synth, 4800);
        assert_eq!(synth.active_voice_count(), 0);
    }

    #[test]
    fn test_chunked_render_matches_single_block() {
        let config = SynthConfig::new(SR).with_max_block_size(64);
        let mut chunked = Synth::new(FmKernel::new(SR), FmParams::preset(FmPreset::Bell), config);
        let mut whole = Synth::new(
            FmKernel::new(SR),
            FmParams::preset(FmPreset::Bell),
            config.with_max_block_size(1024),
        );
        chunked.note_on(64.0, 0.8);
        whole.note_on(64.0, 0.8);
        let (a, _) = render(&mut chunked, 1000);
        let (b, _) = render(&mut whole, 1000);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_muted_refuses_notes_and_fades() {
        let mut synth = fm(4);
        synth.note_on(60.0, 1.0);
        synth.set_muted(true);
        assert!(synth.note_on(62.0, 1.0).is_none());
        let (left, _) = render(&mut synth, 9600);
        assert!(left[9000..].iter().all(|s| s.abs() < 1e-4));
        synth.set_muted(false);
        assert!(synth.note_on(62.0, 1.0).is_some());
    }

    #[test]
    fn test_master_gain_is_smoothed() {
        let mut synth = fm(4);
        synth.note_on(69.0, 1.0);
        render(&mut synth, 2048);
        synth.set_master_gain(0.0);
        let (left, _) = render(&mut synth, 48);
        assert!(left[..8].iter().any(|s| s.abs() > 1e-3));
        let (tail, _) = render(&mut synth, 9600);
        assert!(tail[9000..].iter().all(|s| s.abs() < 1e-4));
    }

    #[test]
    fn test_invalid_input_is_clamped() {
        let mut synth = fm(2);
        assert!(synth.note_on(f32::NAN, 2.0).is_some());
        assert!(synth.note_on_hz(-100.0, -1.0).is_some());
        synth.set_master_gain(f32::INFINITY);
        let (left, right) = render(&mut synth, 256);
        assert!(left.iter().chain(&right).all(|s| s.is_finite()));
    }

    #[test]
    fn test_mismatched_buffers_zero_tail() {
        let mut synth = fm(2);
        synth.note_on(69.0, 1.0);
        let mut left = vec![1.0; 128];
        let mut right = vec![1.0; 64];
        synth.process(&mut left, &mut right);
        assert!(left[64..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_sample_rate_change_silences_voices() {
        let mut synth = Synth::new(
            PhysicalKernel::new(SR),
            PhysicalParams::preset(PhysicalPreset::AcousticGuitar),
            SynthConfig::new(SR),
        );
        synth.note_on(40.0, 1.0);
        render(&mut synth, 256);
        synth.set_sample_rate(96000.0);
        assert_eq!(synth.active_voice_count(), 0);
        assert_eq!(synth.sample_rate(), 96000.0);
        synth.note_on(40.0, 1.0);
        let (left, _) = render(&mut synth, 1024);
        assert!(left.iter().all(|s| s.is_finite()));
        assert!(left.iter().any(|s| s.abs() > 1e-3));
    }

    #[test]
    fn test_process_mono_matches_left() {
        let mut stereo = fm(2);
        let mut mono = fm(2);
        stereo.note_on(57.0, 1.0);
        mono.note_on(57.0, 1.0);
        let (left, _) = render(&mut stereo, 700);
        let mut out = vec![0.0; 700];
        mono.process_mono(&mut out);
        assert_eq!(left, out);
    }

    #[test]
    fn test_prepare_grows_block() {
        let mut synth = fm(2);
        synth.prepare(2048);
        assert_eq!(synth.config().max_block_size, 2048);
        synth.note_on(69.0, 1.0);
        let (left, _) = render(&mut synth, 2048);
        assert!(left.iter().any(|s| s.abs() > 0.0));
    }

    #[test]
    fn test_tempo_advances_per_block() {
        let mut synth = fm(2);
        synth.set_tempo(Some(TempoContext::playing(120.0)));
        render(&mut synth, 24000);
        let beat = synth.tempo().map_or(0.0, |t| t.beat_position);
        assert!((beat - 1.0).abs() < 1e-9);
    }
}
