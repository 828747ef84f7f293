//! Instrument body: five resonances added to the direct sound.

use resona_core::Resonator;

const RESONANCES: usize = 5;
const DIRECT_GAIN: f32 = 0.3;
const BAND_GAIN: f32 = 0.5;

/// Body resonance profile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BodyProfile {
    /// Acoustic guitar top and air cavity
    #[default]
    Guitar,
    /// Violin family
    Violin,
    /// Piano soundboard
    Piano,
    /// Wooden resonator box
    Box,
}

impl BodyProfile {
    /// All profiles.
    pub const ALL: [BodyProfile; 4] = [Self::Guitar, Self::Violin, Self::Piano, Self::Box];

    /// Lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Guitar => "guitar",
            Self::Violin => "violin",
            Self::Piano => "piano",
            Self::Box => "box",
        }
    }

    /// Parse a name produced by [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    /// `(center Hz, bandwidth Hz, gain)` per resonance.
    pub fn resonances(self) -> [(f32, f32, f32); RESONANCES] {
        match self {
            Self::Guitar => [
                (100.0, 50.0, 1.0),
                (200.0, 60.0, 0.8),
                (400.0, 80.0, 0.5),
                (800.0, 100.0, 0.3),
                (1600.0, 150.0, 0.2),
            ],
            Self::Violin => [
                (275.0, 40.0, 1.0),
                (450.0, 50.0, 0.9),
                (700.0, 70.0, 0.6),
                (1200.0, 100.0, 0.4),
                (2500.0, 150.0, 0.25),
            ],
            Self::Piano => [
                (150.0, 80.0, 0.8),
                (350.0, 100.0, 0.6),
                (550.0, 120.0, 0.5),
                (1100.0, 150.0, 0.4),
                (2200.0, 200.0, 0.3),
            ],
            Self::Box => [
                (80.0, 30.0, 1.2),
                (180.0, 50.0, 1.0),
                (300.0, 70.0, 0.7),
                (600.0, 100.0, 0.4),
                (1200.0, 150.0, 0.2),
            ],
        }
    }
}

/// Resonator bank for one voice.
#[derive(Clone, Debug, Default)]
pub(crate) struct Body {
    resonators: [Resonator; RESONANCES],
    gains: [f32; RESONANCES],
    profile: Option<BodyProfile>,
}

impl Body {
    /// Tune for `profile`. Filter state is cleared when the profile changes.
    pub(crate) fn configure(&mut self, profile: BodyProfile, sample_rate: f32) {
        if self.profile == Some(profile) {
            return;
        }
        for ((res, gain), (hz, bw, g)) in self
            .resonators
            .iter_mut()
            .zip(&mut self.gains)
            .zip(profile.resonances())
        {
            res.tune(sample_rate, hz, bw);
            res.reset();
            *gain = g;
        }
        self.profile = Some(profile);
    }

    /// Force retuning on the next `configure` (sample-rate change).
    pub(crate) fn invalidate(&mut self) {
        self.profile = None;
    }

    pub(crate) fn reset(&mut self) {
        for res in &mut self.resonators {
            res.reset();
        }
    }

    #[inline]
    pub(crate) fn process(&mut self, input: f32) -> f32 {
        let mut out = input * DIRECT_GAIN;
        for (res, gain) in self.resonators.iter_mut().zip(&self.gains) {
            out += res.process(input) * gain * BAND_GAIN;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    fn rms_response(profile: BodyProfile, hz: f32) -> f32 {
        let mut body = Body::default();
        body.configure(profile, SR);
        let mut sum = 0.0;
        let n = 9600;
        for i in 0..n {
            let x = libm::sinf(core::f32::consts::TAU * hz * i as f32 / SR);
            let y = body.process(x);
            if i >= n / 2 {
                sum += y * y;
            }
        }
        libm::sqrtf(sum / (n / 2) as f32)
    }

    #[test]
    fn test_guitar_body_emphasizes_low_resonance() {
        let at_peak = rms_response(BodyProfile::Guitar, 100.0);
        let between = rms_response(BodyProfile::Guitar, 5000.0);
        assert!(at_peak > between * 1.5, "{at_peak} vs {between}");
    }

    #[test]
    fn test_configure_is_idempotent() {
        let mut body = Body::default();
        body.configure(BodyProfile::Violin, SR);
        body.process(1.0);
        let snapshot = format!("{:?}", body.resonators[0]);
        body.configure(BodyProfile::Violin, SR);
        assert_eq!(format!("{:?}", body.resonators[0]), snapshot);
    }

    #[test]
    fn test_profile_names() {
        for b in BodyProfile::ALL {
            assert_eq!(BodyProfile::from_name(b.name()), Some(b));
        }
    }
}
