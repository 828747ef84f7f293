//! Fixed-capacity voice pool with deterministic oldest-first stealing.
//!
//! The pool owns every [`Voice`] slot for the lifetime of the engine. Slots
//! are created inert at construction and reused in place: `allocate` never
//! touches the heap, it either claims the lowest free slot or steals the
//! voice with the smallest start sequence.
//!
//! Kernel state is opaque to the pool (`S`). The pool only does the
//! cross-voice bookkeeping; the engine decides what "reset", "release" and
//! "finished" mean by passing closures.

use crate::active_set::ActiveIndexSet;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Maximum voices a pool may hold.
pub const MAX_POLYPHONY: usize = 64;

/// Notes closer than this (in semitones) are treated as the same note.
const NOTE_MATCH_TOLERANCE: f32 = 1e-3;

/// Opaque reference to one note instance.
///
/// The handle remembers the start sequence of the note it was issued for.
/// Once the slot is stolen or reused the handle goes stale and every
/// operation taking it becomes a no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VoiceHandle {
    index: usize,
    sequence: u64,
}

impl VoiceHandle {
    /// Slot index inside the pool.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Start sequence of the note this handle refers to.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Result of [`VoicePool::allocate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Allocation {
    /// Handle for the new note.
    pub handle: VoiceHandle,
    /// `true` when an active voice was taken over.
    pub stolen: bool,
}

/// One voice slot.
#[derive(Debug, Clone)]
pub struct Voice<S> {
    active: bool,
    note: f32,
    frequency: f32,
    velocity: f32,
    start_sequence: u64,
    releasing: bool,
    tag: u64,
    /// Kernel-specific state, owned exclusively by this voice.
    pub state: S,
}

impl<S> Voice<S> {
    fn new(state: S) -> Self {
        Self {
            active: false,
            note: 0.0,
            frequency: 0.0,
            velocity: 0.0,
            start_sequence: 0,
            releasing: false,
            tag: 0,
            state,
        }
    }

    /// Whether the slot is playing.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// MIDI note number (fractional for notes triggered by frequency).
    #[inline]
    pub fn note(&self) -> f32 {
        self.note
    }

    /// Fundamental frequency in Hz.
    #[inline]
    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    /// Velocity in `[0, 1]`.
    #[inline]
    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    /// Allocation order; smaller is older.
    #[inline]
    pub fn start_sequence(&self) -> u64 {
        self.start_sequence
    }

    /// Whether note-off has been received.
    #[inline]
    pub fn is_releasing(&self) -> bool {
        self.releasing
    }

    /// Caller-assigned identifier (0 when unused).
    #[inline]
    pub fn tag(&self) -> u64 {
        self.tag
    }

    /// Attach a caller-assigned identifier.
    pub fn set_tag(&mut self, tag: u64) {
        self.tag = tag;
    }

    /// Handle for the note currently in this slot.
    pub fn handle(&self, index: usize) -> VoiceHandle {
        VoiceHandle {
            index,
            sequence: self.start_sequence,
        }
    }
}

/// Bounded pool of voices.
///
/// # Example
///
/// ```rust
/// use resona_synth::VoicePool;
///
/// let mut pool = VoicePool::new(2, || 0u32);
/// let a = pool.allocate(60.0, 261.6, 1.0);
/// pool.allocate(64.0, 329.6, 1.0);
/// let c = pool.allocate(67.0, 392.0, 1.0);
///
/// // The third note took over the first voice.
/// assert!(c.stolen);
/// assert_eq!(c.handle.index(), a.handle.index());
/// assert_eq!(pool.active_count(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct VoicePool<S> {
    voices: Vec<Voice<S>>,
    active: ActiveIndexSet,
    next_sequence: u64,
}

impl<S> VoicePool<S> {
    /// Create a pool of `capacity` voices (clamped to 1..=[`MAX_POLYPHONY`]).
    ///
    /// `make_state` is called once per slot; this is the only allocation the
    /// pool ever performs.
    pub fn new(capacity: usize, mut make_state: impl FnMut() -> S) -> Self {
        let capacity = capacity.clamp(1, MAX_POLYPHONY);
        Self {
            voices: (0..capacity).map(|_| Voice::new(make_state())).collect(),
            active: ActiveIndexSet::new(capacity),
            next_sequence: 1,
        }
    }

    /// Number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.voices.len()
    }

    /// Number of active voices.
    #[inline]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Indices of active voices.
    #[inline]
    pub fn active_indices(&self) -> &[usize] {
        self.active.as_slice()
    }

    /// Slot by index.
    pub fn voice(&self, index: usize) -> Option<&Voice<S>> {
        self.voices.get(index)
    }

    /// Mutable slot by index.
    pub fn voice_mut(&mut self, index: usize) -> Option<&mut Voice<S>> {
        self.voices.get_mut(index)
    }

    /// Every slot, active or not.
    pub fn voices_mut(&mut self) -> impl Iterator<Item = &mut Voice<S>> {
        self.voices.iter_mut()
    }

    /// Whether `handle` still refers to a playing note.
    pub fn is_current(&self, handle: VoiceHandle) -> bool {
        self.voices
            .get(handle.index)
            .is_some_and(|v| v.active && v.start_sequence == handle.sequence)
    }

    /// Claim a voice for a new note.
    ///
    /// Takes the lowest-index free slot; when every slot is busy, takes the
    /// active voice with the smallest start sequence. The caller must reset
    /// the returned voice's kernel state before starting it.
    pub fn allocate(&mut self, note: f32, frequency: f32, velocity: f32) -> Allocation {
        let (index, stolen) = match self.voices.iter().position(|v| !v.active) {
            Some(free) => (free, false),
            None => (self.oldest_active(), true),
        };

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let voice = &mut self.voices[index];
        voice.active = true;
        voice.note = note;
        voice.frequency = frequency;
        voice.velocity = velocity.clamp(0.0, 1.0);
        voice.start_sequence = sequence;
        voice.releasing = false;
        voice.tag = 0;
        self.active.insert(index);

        #[cfg(feature = "tracing")]
        if stolen {
            tracing::debug!(index, note, "voice stolen");
        }

        Allocation {
            handle: VoiceHandle { index, sequence },
            stolen,
        }
    }

    fn oldest_active(&self) -> usize {
        self.active
            .as_slice()
            .iter()
            .copied()
            .min_by_key(|&i| self.voices[i].start_sequence)
            .unwrap_or(0)
    }

    /// Release every active, not yet releasing voice playing `note`.
    ///
    /// Returns the number of voices released.
    pub fn release_note(&mut self, note: f32, on_release: impl FnMut(&mut Voice<S>)) -> usize {
        self.release_where(
            |v| (v.note - note).abs() < NOTE_MATCH_TOLERANCE,
            on_release,
        )
    }

    /// Release the voice carrying `tag`.
    pub fn release_tag(&mut self, tag: u64, on_release: impl FnMut(&mut Voice<S>)) -> usize {
        self.release_where(|v| v.tag == tag, on_release)
    }

    /// Release one specific note instance. Stale handles are ignored.
    pub fn release_handle(
        &mut self,
        handle: VoiceHandle,
        mut on_release: impl FnMut(&mut Voice<S>),
    ) -> bool {
        if !self.is_current(handle) {
            return false;
        }
        let voice = &mut self.voices[handle.index];
        if voice.releasing {
            return false;
        }
        voice.releasing = true;
        on_release(voice);
        true
    }

    /// Release every active voice.
    pub fn release_all(&mut self, on_release: impl FnMut(&mut Voice<S>)) -> usize {
        self.release_where(|_| true, on_release)
    }

    fn release_where(
        &mut self,
        matches: impl Fn(&Voice<S>) -> bool,
        mut on_release: impl FnMut(&mut Voice<S>),
    ) -> usize {
        let mut released = 0;
        for &index in self.active.as_slice() {
            let voice = &mut self.voices[index];
            if !voice.releasing && matches(voice) {
                voice.releasing = true;
                on_release(voice);
                released += 1;
            }
        }
        released
    }

    /// Visit every active voice.
    #[inline]
    pub fn for_each_active(&mut self, mut f: impl FnMut(&mut Voice<S>)) {
        for &index in self.active.as_slice() {
            f(&mut self.voices[index]);
        }
    }

    /// Deactivate every active voice for which `finished` returns `true`.
    ///
    /// Returns the number of voices reclaimed.
    pub fn sweep(&mut self, mut finished: impl FnMut(&mut Voice<S>) -> bool) -> usize {
        let mut reclaimed = 0;
        // Walk backwards: removal swaps the last active entry into place.
        let mut n = self.active.len();
        while n > 0 {
            n -= 1;
            let index = self.active.get(n);
            let voice = &mut self.voices[index];
            if finished(voice) {
                voice.active = false;
                voice.releasing = false;
                self.active.remove(index);
                reclaimed += 1;
            }
        }
        reclaimed
    }

    /// Deactivate one slot immediately.
    pub fn deactivate(&mut self, index: usize) {
        if let Some(voice) = self.voices.get_mut(index) {
            voice.active = false;
            voice.releasing = false;
            self.active.remove(index);
        }
    }

    /// Deactivate everything and reset each voice's state.
    pub fn reset_all(&mut self, mut reset_state: impl FnMut(&mut S)) {
        for voice in &mut self.voices {
            voice.active = false;
            voice.releasing = false;
            voice.tag = 0;
            reset_state(&mut voice.state);
        }
        self.active.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(n: usize) -> VoicePool<u32> {
        VoicePool::new(n, || 0)
    }

    #[test]
    fn test_pool_allocates_lowest_free_slot() {
        let mut p = pool(4);
        assert_eq!(p.allocate(60.0, 261.6, 1.0).handle.index(), 0);
        assert_eq!(p.allocate(62.0, 293.7, 1.0).handle.index(), 1);
        p.deactivate(0);
        assert_eq!(p.allocate(64.0, 329.6, 1.0).handle.index(), 0);
    }

    #[test]
    fn test_pool_ninth_note_steals_first() {
        let mut p = pool(8);
        let first = p.allocate(60.0, 261.6, 1.0);
        for n in 1..8 {
            let a = p.allocate(60.0 + n as f32, 300.0, 1.0);
            assert!(!a.stolen);
        }
        let ninth = p.allocate(72.0, 523.3, 1.0);
        assert!(ninth.stolen);
        assert_eq!(ninth.handle.index(), first.handle.index());
        assert_eq!(p.active_count(), 8);
        assert!(!p.is_current(first.handle));
        assert!(p.is_current(ninth.handle));
    }

    #[test]
    fn test_pool_steal_order_follows_sequence() {
        let mut p = pool(2);
        p.allocate(60.0, 1.0, 1.0);
        p.allocate(61.0, 1.0, 1.0);
        let c = p.allocate(62.0, 1.0, 1.0);
        let d = p.allocate(63.0, 1.0, 1.0);
        assert_eq!(c.handle.index(), 0);
        assert_eq!(d.handle.index(), 1);
        let e = p.allocate(64.0, 1.0, 1.0);
        assert_eq!(e.handle.index(), 0);
    }

    #[test]
    fn test_pool_release_does_not_deactivate() {
        let mut p = pool(4);
        p.allocate(60.0, 261.6, 1.0);
        p.allocate(60.0, 261.6, 0.5);
        let mut count = 0;
        assert_eq!(p.release_note(60.0, |v| v.state += 1), 2);
        p.for_each_active(|v| count += v.state);
        assert_eq!(count, 2);
        assert_eq!(p.active_count(), 2);
        // Second release of the same note is a no-op.
        assert_eq!(p.release_note(60.0, |_| {}), 0);
    }

    #[test]
    fn test_pool_stale_handle_ignored() {
        let mut p = pool(1);
        let a = p.allocate(60.0, 261.6, 1.0);
        let b = p.allocate(61.0, 277.2, 1.0);
        assert!(!p.release_handle(a.handle, |_| {}));
        assert!(p.release_handle(b.handle, |_| {}));
    }

    #[test]
    fn test_pool_sweep_reclaims_finished() {
        let mut p = pool(4);
        for n in 0..4 {
            let a = p.allocate(60.0 + n as f32, 1.0, 1.0);
            p.voice_mut(a.handle.index()).unwrap().state = n;
        }
        let reclaimed = p.sweep(|v| v.state % 2 == 0);
        assert_eq!(reclaimed, 2);
        assert_eq!(p.active_count(), 2);
        let mut notes: Vec<usize> = p.active_indices().to_vec();
        notes.sort_unstable();
        assert_eq!(notes, vec![1, 3]);
    }

    #[test]
    fn test_pool_capacity_clamped() {
        assert_eq!(pool(0).capacity(), 1);
        assert_eq!(pool(1000).capacity(), MAX_POLYPHONY);
    }

    #[test]
    fn test_pool_velocity_clamped() {
        let mut p = pool(1);
        let a = p.allocate(60.0, 1.0, 3.0);
        assert_eq!(p.voice(a.handle.index()).unwrap().velocity(), 1.0);
    }

    #[test]
    fn test_pool_reset_all() {
        let mut p = pool(3);
        p.allocate(60.0, 1.0, 1.0);
        p.allocate(61.0, 1.0, 1.0);
        p.reset_all(|s| *s = 99);
        assert_eq!(p.active_count(), 0);
        assert!(p.voices_mut().all(|v| v.state == 99 && !v.is_active()));
    }
}
