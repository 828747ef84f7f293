//! Wind instruments: reed (clarinet, saxophone) and jet (flute) bores.
//!
//! Structures follow the STK models. Breath pressure enters at the
//! mouthpiece; the bore is one delay line (two for the saxophone's conical
//! bore, one for the flute's jet) with a low-pass reflection.

use resona_core::{DcBlocker, OnePole, Tables, WaveguideDelay, flush_denormal};

/// Which bore/excitation pair to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WindKind {
    Flute,
    Clarinet,
    Saxophone,
}

impl WindKind {
    /// Mouth pressure for full breath: `base + span * breath`.
    pub(crate) fn pressure(self, breath: f32) -> f32 {
        let (base, span) = match self {
            Self::Flute => (0.7, 0.4),
            Self::Clarinet => (0.55, 0.3),
            Self::Saxophone => (0.55, 0.3),
        };
        base + span * breath.clamp(0.0, 1.0)
    }
}

const JET_RATIO: f32 = 0.32;
const JET_REFLECTION: f32 = 0.5;
const END_REFLECTION: f32 = 0.5;
const SAX_BLOW_POSITION: f32 = 0.2;

/// Reed table `offset + slope * x`, clamped to `[-1, 1]`.
#[inline]
fn reed(x: f32, offset: f32, slope: f32) -> f32 {
    (offset + slope * x).clamp(-1.0, 1.0)
}

#[derive(Clone, Debug)]
pub(crate) struct Wind {
    kind: WindKind,
    filter: OnePole,
    dc: DcBlocker,
}

impl Default for Wind {
    fn default() -> Self {
        Self {
            kind: WindKind::Clarinet,
            filter: OnePole::default(),
            dc: DcBlocker::default(),
        }
    }
}

impl Wind {
    pub(crate) fn set_sample_rate(&mut self, sample_rate: f32) {
        self.dc.set_sample_rate(sample_rate);
    }

    /// Select the instrument and tune the bore.
    pub(crate) fn configure(
        &mut self,
        kind: WindKind,
        bore: &mut WaveguideDelay,
        aux: &mut WaveguideDelay,
        sample_rate: f32,
        freq: f32,
        brightness: f32,
    ) {
        self.kind = kind;
        let period = sample_rate / freq.max(1.0);
        let dark = 1.0 - brightness.clamp(0.0, 1.0);
        match kind {
            WindKind::Clarinet => {
                self.filter.set_coeff(0.2 + 0.5 * dark);
                // Inverting reflection doubles the loop period.
                bore.set_delay((period * 0.5 - 1.5).max(1.0));
            }
            WindKind::Saxophone => {
                self.filter.set_coeff(0.2 + 0.5 * dark);
                let total = (period - 3.0).max(2.0);
                bore.set_delay(total * (1.0 - SAX_BLOW_POSITION));
                aux.set_delay(total * SAX_BLOW_POSITION);
            }
            WindKind::Flute => {
                self.filter.set_coeff(0.5 + 0.3 * dark);
                let bore_delay = (period - 2.0).max(2.0);
                bore.set_delay(bore_delay);
                aux.set_delay((bore_delay * JET_RATIO).max(1.0));
            }
        }
    }

    pub(crate) fn reset(&mut self, bore: &mut WaveguideDelay, aux: &mut WaveguideDelay) {
        bore.clear();
        aux.clear();
        self.filter.reset();
        self.dc.reset();
    }

    /// One sample for mouth pressure `breath` (noise already mixed in).
    #[inline]
    pub(crate) fn tick(
        &mut self,
        bore: &mut WaveguideDelay,
        aux: &mut WaveguideDelay,
        tables: &Tables,
        breath: f32,
        loop_gain: f32,
    ) -> f32 {
        match self.kind {
            WindKind::Clarinet => {
                let bore_out = bore.read(tables);
                let pressure_diff = -0.95 * loop_gain * self.filter.process(bore_out) - breath;
                let next = breath + pressure_diff * reed(pressure_diff, 0.7, -0.3);
                bore.write(flush_denormal(next));
                bore_out
            }
            WindKind::Saxophone => {
                let tip = bore.read(tables);
                let bell = aux.read(tables);
                let reflected = -0.95 * loop_gain * self.filter.process(tip);
                let out = reflected - bell;
                let pressure_diff = breath - out;
                aux.write(flush_denormal(reflected));
                bore.write(flush_denormal(
                    breath - pressure_diff * reed(pressure_diff, 0.7, 0.3) - reflected,
                ));
                out * 0.3
            }
            WindKind::Flute => {
                let bore_out = bore.read(tables);
                let reflected = self.dc.process(-self.filter.process(bore_out) * loop_gain);
                let jet_in = breath - JET_REFLECTION * reflected;
                let jet_out = aux.read(tables);
                aux.write(flush_denormal(jet_in));
                let jet = (jet_out * (jet_out * jet_out - 1.0)).clamp(-1.0, 1.0);
                bore.write(flush_denormal(jet + END_REFLECTION * reflected));
                bore_out * 0.3
            }
        }
    }
}
