//! Musical timing for tempo-synced modulation.
//!
//! The engines do not own a clock. A host or a network tempo source supplies
//! a [`TempoContext`] (tempo, beat position, transport state) and modulators
//! lock their phase to it with a [`NoteDivision`].

use libm::floor;

/// Musical note divisions for tempo sync.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NoteDivision {
    /// Four bars of 4/4 (16 beats)
    FourBars,
    /// Two bars of 4/4 (8 beats)
    TwoBars,
    /// Whole note (4 beats)
    Whole,
    /// Half note (2 beats)
    Half,
    /// Quarter note (1 beat)
    #[default]
    Quarter,
    /// Eighth note (1/2 beat)
    Eighth,
    /// Sixteenth note (1/4 beat)
    Sixteenth,
    /// Dotted quarter note (1.5 beats)
    DottedQuarter,
    /// Dotted eighth note (3/4 beat)
    DottedEighth,
    /// Triplet quarter note (2/3 beat)
    TripletQuarter,
    /// Triplet eighth note (1/3 beat)
    TripletEighth,
}

impl NoteDivision {
    /// Length of this division in beats.
    pub fn beats(&self) -> f32 {
        match self {
            NoteDivision::FourBars => 16.0,
            NoteDivision::TwoBars => 8.0,
            NoteDivision::Whole => 4.0,
            NoteDivision::Half => 2.0,
            NoteDivision::Quarter => 1.0,
            NoteDivision::Eighth => 0.5,
            NoteDivision::Sixteenth => 0.25,
            NoteDivision::DottedQuarter => 1.5,
            NoteDivision::DottedEighth => 0.75,
            NoteDivision::TripletQuarter => 2.0 / 3.0,
            NoteDivision::TripletEighth => 1.0 / 3.0,
        }
    }

    /// Cycle rate of this division at `bpm`.
    ///
    /// ```rust
    /// use resona_core::NoteDivision;
    ///
    /// // At 120 BPM a quarter note repeats at 2 Hz
    /// assert!((NoteDivision::Quarter.to_hz(120.0) - 2.0).abs() < 1e-6);
    /// ```
    pub fn to_hz(&self, bpm: f32) -> f32 {
        (bpm / 60.0) / self.beats()
    }
}

/// Snapshot of an external tempo/phase source.
///
/// `beat_position` counts quarter-note beats since the source's origin and
/// uses `f64` so hour-long sessions keep sub-sample precision.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TempoContext {
    /// Tempo in beats per minute
    pub bpm: f32,
    /// Current beat position
    pub beat_position: f64,
    /// Whether the transport is running
    pub playing: bool,
}

impl Default for TempoContext {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            beat_position: 0.0,
            playing: false,
        }
    }
}

impl TempoContext {
    /// Create a running context at `bpm` from beat zero.
    pub fn playing(bpm: f32) -> Self {
        Self {
            bpm,
            beat_position: 0.0,
            playing: true,
        }
    }

    /// Advance the beat position by `frames` samples.
    ///
    /// Hosts that receive an authoritative beat position every block should
    /// overwrite `beat_position` instead; this is for free-running use.
    pub fn advance(&mut self, frames: usize, sample_rate: f32) {
        if self.playing && sample_rate > 0.0 {
            self.beat_position += frames as f64 * f64::from(self.bpm) / (60.0 * f64::from(sample_rate));
        }
    }

    /// Phase in [0, 1) of `division` at the current beat position.
    pub fn phase_of(&self, division: NoteDivision) -> f32 {
        let cycles = self.beat_position / f64::from(division.beats());
        (cycles - floor(cycles)) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_division_rates() {
        assert!((NoteDivision::Eighth.to_hz(120.0) - 4.0).abs() < 1e-6);
        assert!((NoteDivision::Whole.to_hz(120.0) - 0.5).abs() < 1e-6);
        assert!((NoteDivision::FourBars.beats() - 16.0).abs() < 1e-6);
    }

    #[test]
    fn test_context_advance() {
        let mut ctx = TempoContext::playing(120.0);
        for _ in 0..375 {
            ctx.advance(128, 48000.0);
        }
        // 48000 samples at 120 BPM = 2 beats
        assert!((ctx.beat_position - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_stopped_context_does_not_move() {
        let mut ctx = TempoContext::default();
        ctx.advance(48000, 48000.0);
        assert_eq!(ctx.beat_position, 0.0);
    }

    #[test]
    fn test_phase_of_division() {
        let ctx = TempoContext {
            bpm: 90.0,
            beat_position: 5.25,
            playing: true,
        };
        assert!((ctx.phase_of(NoteDivision::Quarter) - 0.25).abs() < 1e-6);
        assert!((ctx.phase_of(NoteDivision::Half) - 0.625).abs() < 1e-6);
    }
}
