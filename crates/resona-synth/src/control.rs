//! Lock-free control of a [`Synth`] running on another thread.
//!
//! [`Synth::split`] returns a [`SynthHandle`] for the control thread and the
//! engine for the audio thread, joined by two bounded channels:
//!
//! ```text
//! control thread                         audio thread
//! SynthHandle ── Command ──────────────▶ Synth::process (try_recv per block)
//!             ◀── Box<Params> (garbage) ─ old snapshot after a swap
//! ```
//!
//! Parameter changes travel as complete boxed snapshots, so the audio
//! thread never sees a half-written parameter set. The snapshot it replaces
//! is sent back and dropped by [`SynthHandle::collect_garbage`], keeping
//! deallocation off the audio thread.

use crate::engine::{Synth, SynthConfig};
use crate::kernel::Kernel;
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};
use resona_core::TempoContext;
use thiserror::Error;

/// Errors returned by [`SynthHandle`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    /// The command queue is full; the audio thread has not caught up.
    #[error("command queue is full")]
    QueueFull,
    /// The engine side has been dropped.
    #[error("synth has been dropped")]
    Disconnected,
}

impl<T> From<TrySendError<T>> for ControlError {
    fn from(err: TrySendError<T>) -> Self {
        match err {
            TrySendError::Full(_) => Self::QueueFull,
            TrySendError::Disconnected(_) => Self::Disconnected,
        }
    }
}

/// Identifier of a note started through a [`SynthHandle`].
///
/// Ids are assigned on the control thread, so they are known before the
/// audio thread has processed the note-on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NoteId(u64);

impl NoteId {
    /// Raw id (never zero).
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Message from the control thread to the engine.
#[derive(Debug)]
pub enum Command<P> {
    /// Start a note by MIDI number.
    NoteOn {
        /// Id assigned by the handle
        id: NoteId,
        /// MIDI note, fractional allowed
        note: f32,
        /// Velocity in `[0, 1]`
        velocity: f32,
    },
    /// Start a note by frequency.
    NoteOnHz {
        /// Id assigned by the handle
        id: NoteId,
        /// Frequency in Hz
        frequency: f32,
        /// Velocity in `[0, 1]`
        velocity: f32,
    },
    /// Release every voice on `note`.
    NoteOff {
        /// MIDI note
        note: f32,
    },
    /// Release one note instance.
    NoteOffId(NoteId),
    /// Release everything.
    AllNotesOff,
    /// Swap in a new parameter snapshot.
    SetParams(Box<P>),
    /// Set master gain.
    SetMasterGain(f32),
    /// Mute or unmute.
    SetMuted(bool),
    /// Set or clear the tempo source.
    SetTempo(Option<TempoContext>),
}

/// Audio-thread end of the channels, held by the engine.
#[derive(Debug)]
pub(crate) struct RenderPort<P> {
    commands: Receiver<Command<P>>,
    garbage: Sender<Box<P>>,
    deferred: Option<Box<P>>,
}

impl<P> RenderPort<P> {
    pub(crate) fn try_recv(&self) -> Option<Command<P>> {
        match self.commands.try_recv() {
            Ok(command) => Some(command),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Whether a replaced snapshot can be handed back without blocking.
    pub(crate) fn can_return(&self) -> bool {
        !self.garbage.is_full()
    }

    pub(crate) fn give_back(&self, old: Box<P>) {
        // Capacity was checked; a disconnected handle means the snapshot is
        // dropped here, which only happens during teardown.
        let _ = self.garbage.try_send(old);
    }

    /// Hold a snapshot until the garbage queue drains.
    pub(crate) fn defer(&mut self, params: Box<P>) {
        self.deferred = Some(params);
    }

    pub(crate) fn take_deferred(&mut self) -> Option<Box<P>> {
        self.deferred.take()
    }

    /// While a snapshot is deferred, later commands wait so ordering holds.
    pub(crate) fn is_deferring(&self) -> bool {
        self.deferred.is_some()
    }
}

/// Control-thread end of a split [`Synth`].
///
/// Every method is non-blocking: commands are queued with `try_send` and
/// fail with [`ControlError::QueueFull`] instead of waiting.
///
/// ```rust
/// use resona_synth::{FmKernel, FmParams, Synth, SynthConfig};
///
/// let (mut handle, mut synth) = Synth::split(
///     FmKernel::new(48000.0),
///     FmParams::default(),
///     SynthConfig::new(48000.0),
///     64,
/// );
///
/// let id = handle.note_on(60.0, 0.9).unwrap();
/// let mut left = vec![0.0; 256];
/// let mut right = vec![0.0; 256];
/// synth.process(&mut left, &mut right);
/// assert_eq!(synth.active_voice_count(), 1);
///
/// handle.note_off_id(id).unwrap();
/// ```
#[derive(Debug)]
pub struct SynthHandle<K: Kernel> {
    commands: Sender<Command<K::Params>>,
    garbage: Receiver<Box<K::Params>>,
    next_id: u64,
}

impl<K: Kernel> SynthHandle<K> {
    fn send(&self, command: Command<K::Params>) -> Result<(), ControlError> {
        self.commands.try_send(command).map_err(ControlError::from)
    }

    fn next_id(&mut self) -> NoteId {
        let id = NoteId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    /// Start a note by MIDI number.
    pub fn note_on(&mut self, note: f32, velocity: f32) -> Result<NoteId, ControlError> {
        let id = self.next_id();
        self.send(Command::NoteOn { id, note, velocity })?;
        Ok(id)
    }

    /// Start a note by frequency in Hz.
    pub fn note_on_hz(&mut self, frequency: f32, velocity: f32) -> Result<NoteId, ControlError> {
        let id = self.next_id();
        self.send(Command::NoteOnHz {
            id,
            frequency,
            velocity,
        })?;
        Ok(id)
    }

    /// Release every voice on `note`.
    pub fn note_off(&self, note: f32) -> Result<(), ControlError> {
        self.send(Command::NoteOff { note })
    }

    /// Release the note started with `id`.
    pub fn note_off_id(&self, id: NoteId) -> Result<(), ControlError> {
        self.send(Command::NoteOffId(id))
    }

    /// Release every voice.
    pub fn all_notes_off(&self) -> Result<(), ControlError> {
        self.send(Command::AllNotesOff)
    }

    /// Queue a complete parameter snapshot.
    ///
    /// Previously replaced snapshots are collected first.
    pub fn set_params(&mut self, params: K::Params) -> Result<(), ControlError> {
        self.collect_garbage();
        self.send(Command::SetParams(Box::new(params)))
    }

    /// Set master gain.
    pub fn set_master_gain(&self, gain: f32) -> Result<(), ControlError> {
        self.send(Command::SetMasterGain(gain))
    }

    /// Mute or unmute.
    pub fn set_muted(&self, muted: bool) -> Result<(), ControlError> {
        self.send(Command::SetMuted(muted))
    }

    /// Set or clear the tempo source.
    pub fn set_tempo(&self, tempo: Option<TempoContext>) -> Result<(), ControlError> {
        self.send(Command::SetTempo(tempo))
    }

    /// Drop snapshots the engine has replaced. Returns how many were freed.
    pub fn collect_garbage(&mut self) -> usize {
        self.garbage.try_iter().count()
    }

    /// Commands waiting for the audio thread.
    pub fn pending(&self) -> usize {
        self.commands.len()
    }
}

impl<K: Kernel> Synth<K> {
    /// Build an engine plus a control handle joined by queues holding
    /// `queue_capacity` commands.
    pub fn split(
        kernel: K,
        params: K::Params,
        config: SynthConfig,
        queue_capacity: usize,
    ) -> (SynthHandle<K>, Synth<K>) {
        let capacity = queue_capacity.max(1);
        let (command_tx, command_rx) = bounded(capacity);
        let (garbage_tx, garbage_rx) = bounded(capacity);
        let mut synth = Synth::new(kernel, params, config);
        synth.attach(RenderPort {
            commands: command_rx,
            garbage: garbage_tx,
            deferred: None,
        });
        let handle = SynthHandle {
            commands: command_tx,
            garbage: garbage_rx,
            next_id: 1,
        };
        (handle, synth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::fm::{FmKernel, FmParams, FmPreset};

    const SR: f32 = 48000.0;

    fn split(capacity: usize) -> (SynthHandle<FmKernel>, Synth<FmKernel>) {
        Synth::split(
            FmKernel::new(SR),
            FmParams::preset(FmPreset::Organ),
            SynthConfig::new(SR),
            capacity,
        )
    }

    fn tick(synth: &mut Synth<FmKernel>) {
        let mut left = [0.0; 128];
        let mut right = [0.0; 128];
        synth.process(&mut left, &mut right);
    }

    #[test]
    fn test_note_on_applies_on_next_process() {
        let (mut handle, mut synth) = split(16);
        handle.note_on(60.0, 1.0).unwrap();
        assert_eq!(synth.active_voice_count(), 0);
        tick(&mut synth);
        assert_eq!(synth.active_voice_count(), 1);
    }

    #[test]
    fn test_note_off_by_id_releases_only_that_note() {
        let (mut handle, mut synth) = split(16);
        let a = handle.note_on(60.0, 1.0).unwrap();
        let _b = handle.note_on(60.0, 1.0).unwrap();
        tick(&mut synth);
        handle.note_off_id(a).unwrap();
        tick(&mut synth);
        for _ in 0..100 {
            tick(&mut synth);
        }
        assert_eq!(synth.active_voice_count(), 1);
    }

    #[test]
    fn test_ids_are_unique_and_nonzero() {
        let (mut handle, _synth) = split(16);
        let a = handle.note_on(60.0, 1.0).unwrap();
        let b = handle.note_on_hz(440.0, 1.0).unwrap();
        assert_ne!(a, b);
        assert!(a.get() > 0);
    }

    #[test]
    fn test_queue_full_is_reported() {
        let (mut handle, _synth) = split(2);
        handle.note_on(60.0, 1.0).unwrap();
        handle.note_on(61.0, 1.0).unwrap();
        assert_eq!(handle.note_on(62.0, 1.0), Err(ControlError::QueueFull));
        assert_eq!(handle.pending(), 2);
    }

    #[test]
    fn test_disconnected_after_drop() {
        let (handle, synth) = split(4);
        drop(synth);
        assert_eq!(handle.all_notes_off(), Err(ControlError::Disconnected));
    }

    #[test]
    fn test_params_swap_and_garbage_return() {
        let (mut handle, mut synth) = split(4);
        let mut params = FmParams::preset(FmPreset::Bell);
        params.set_algorithm(7);
        handle.set_params(params).unwrap();
        tick(&mut synth);
        assert_eq!(synth.params().algorithm(), 7);
        assert_eq!(handle.collect_garbage(), 1);
        assert_eq!(handle.collect_garbage(), 0);
    }

    #[test]
    fn test_full_garbage_defers_swap_in_order() {
        let (mut handle, mut synth) = split(1);
        let mut first = FmParams::default();
        first.set_algorithm(3);
        handle.set_params(first).unwrap();
        tick(&mut synth);
        // Garbage queue now holds one box and is full.
        let mut second = FmParams::default();
        second.set_algorithm(9);
        handle.send(Command::SetParams(Box::new(second))).unwrap();
        tick(&mut synth);
        assert_eq!(synth.params().algorithm(), 3);

        handle.note_on(60.0, 1.0).unwrap();
        tick(&mut synth);
        // Queued after the blocked swap, so it waits too.
        assert_eq!(synth.active_voice_count(), 0);

        assert_eq!(handle.collect_garbage(), 1);
        tick(&mut synth);
        assert_eq!(synth.params().algorithm(), 9);
        assert_eq!(synth.active_voice_count(), 1);
    }

    #[test]
    fn test_mute_and_gain_commands() {
        let (handle, mut synth) = split(8);
        handle.set_muted(true).unwrap();
        handle.set_master_gain(0.5).unwrap();
        tick(&mut synth);
        assert!(synth.is_muted());
        assert_eq!(synth.master_gain(), 0.5);
    }

    #[test]
    fn test_tempo_command() {
        let (handle, mut synth) = split(8);
        handle.set_tempo(Some(TempoContext::playing(90.0))).unwrap();
        tick(&mut synth);
        assert_eq!(synth.tempo().map(|t| t.bpm), Some(90.0));
    }

    #[test]
    fn test_handle_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<SynthHandle<FmKernel>>();
        assert_send::<Synth<FmKernel>>();
    }
}
