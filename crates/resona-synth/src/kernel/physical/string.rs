//! String waveguides: Karplus–Strong pluck and a bowed two-line string.
//!
//! Both operate on delay lines owned by the voice so one allocation per
//! voice serves every model.

use core::f32::consts::PI;
use libm::{atan2f, cosf, powf, sinf};
use resona_core::{OnePole, Rng, Tables, WaveguideDelay, flush_denormal};

/// How a plucked string is set in motion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Excitation {
    /// Triangle displacement peaking at the pluck position
    #[default]
    Pluck,
    /// White-noise burst filling the line
    Noise,
    /// Raised-cosine pulse, narrower for harder hammers
    Hammer,
    /// Single impulse
    Strike,
}

impl Excitation {
    /// All excitation shapes.
    pub const ALL: [Excitation; 4] = [Self::Pluck, Self::Noise, Self::Hammer, Self::Strike];

    /// Lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Pluck => "pluck",
            Self::Noise => "noise",
            Self::Hammer => "hammer",
            Self::Strike => "strike",
        }
    }

    /// Parse a name produced by [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.name() == name)
    }

    /// Sample `i` of a `len`-sample excitation.
    fn sample(self, i: usize, len: usize, position: f32, hardness: f32, rng: &mut Rng) -> f32 {
        let n = len as f32;
        let x = i as f32;
        match self {
            Self::Pluck => {
                let apex = (position.clamp(0.05, 0.95) * n).max(1.0);
                if x < apex { x / apex } else { (n - x) / (n - apex).max(1.0) }
            }
            Self::Noise => rng.next_bipolar(),
            Self::Hammer => {
                let width = (n * (0.5 - 0.4 * hardness.clamp(0.0, 1.0))).max(2.0);
                let center = position.clamp(0.05, 0.95) * n;
                let d = x - center;
                if d.abs() < width * 0.5 {
                    0.5 * (1.0 + cosf(2.0 * PI * d / width))
                } else {
                    0.0
                }
            }
            Self::Strike => {
                if i == 0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// Phase delay in samples of the one-pole lowpass `(1 - a) / (1 - a z^-1)` at `w` rad/sample.
pub(crate) fn one_pole_phase_delay(a: f32, w: f32) -> f32 {
    if a <= 0.0 || w <= 0.0 {
        return 0.0;
    }
    atan2f(a * sinf(w), 1.0 - a * cosf(w)) / w
}

/// Phase delay in samples of the allpass `(a + z^-1) / (1 + a z^-1)` at `w` rad/sample.
pub(crate) fn allpass_phase_delay(a: f32, w: f32) -> f32 {
    if w <= 0.0 {
        return (1.0 - a) / (1.0 + a);
    }
    let num = atan2f(-sinf(w), a + cosf(w));
    let den = atan2f(-a * sinf(w), 1.0 + a * cosf(w));
    let mut phase = num - den;
    if phase > 0.0 {
        phase -= 2.0 * PI;
    }
    -phase / w
}

/// First-order allpass used for string stiffness.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Dispersion {
    coeff: f32,
    x1: f32,
    y1: f32,
}

impl Dispersion {
    pub(crate) fn set_coeff(&mut self, coeff: f32) {
        self.coeff = coeff.clamp(-0.95, 0.0);
    }

    #[inline]
    pub(crate) fn process(&mut self, x: f32) -> f32 {
        let y = flush_denormal(self.coeff * x + self.x1 - self.coeff * self.y1);
        self.x1 = x;
        self.y1 = y;
        y
    }

    pub(crate) fn reset(&mut self) {
        self.x1 = 0.0;
        self.y1 = 0.0;
    }
}

/// Karplus–Strong loop: read, loss filter, optional dispersion, gain, write.
#[derive(Clone, Debug, Default)]
pub(crate) struct PluckedString {
    loss: OnePole,
    dispersion: Dispersion,
    stiff: bool,
}

impl PluckedString {
    /// Set filters and retune the line for `freq`.
    ///
    /// `brightness = 1` and `stretch = 0` leave the loop as a pure delay of
    /// `sample_rate / freq` samples.
    pub(crate) fn configure(
        &mut self,
        line: &mut WaveguideDelay,
        sample_rate: f32,
        freq: f32,
        brightness: f32,
        stretch: f32,
    ) {
        let loss = (1.0 - brightness.clamp(0.0, 1.0)) * 0.9;
        self.loss.set_coeff(loss);
        self.stiff = stretch > 0.0;
        let ap = -0.6 * stretch.clamp(0.0, 1.0);
        self.dispersion.set_coeff(ap);

        let period = sample_rate / freq.max(1.0);
        let w = 2.0 * PI * freq / sample_rate;
        let mut compensation = one_pole_phase_delay(self.loss.coeff(), w);
        if self.stiff {
            compensation += allpass_phase_delay(ap, w);
        }
        line.set_delay((period - compensation).max(1.0));
    }

    /// Clear the line and fill one period with `shape`.
    pub(crate) fn excite(
        &mut self,
        line: &mut WaveguideDelay,
        shape: Excitation,
        position: f32,
        hardness: f32,
        amplitude: f32,
        rng: &mut Rng,
    ) {
        line.clear();
        self.loss.reset();
        self.dispersion.reset();
        let len = line.delay() as usize;
        for i in 0..len {
            line.write(amplitude * shape.sample(i, len, position, hardness, rng));
        }
    }

    #[inline]
    pub(crate) fn tick(&mut self, line: &mut WaveguideDelay, tables: &Tables, loop_gain: f32) -> f32 {
        let out = line.read(tables);
        let mut y = self.loss.process(out);
        if self.stiff {
            y = self.dispersion.process(y);
        }
        line.write(flush_denormal(y * loop_gain));
        out
    }
}

/// Bowed string after the STK bowed model.
///
/// The bow splits the string into a neck side and a bridge side. Waves
/// reflect with inversion at both ends; the bridge reflection is low-passed.
/// At the bow the velocity difference goes through a friction curve whose
/// slope is set by bow pressure.
#[derive(Clone, Debug, Default)]
pub(crate) struct BowedString {
    filter: OnePole,
}

impl BowedString {
    pub(crate) fn configure(
        &mut self,
        neck: &mut WaveguideDelay,
        bridge: &mut WaveguideDelay,
        sample_rate: f32,
        freq: f32,
        bow_position: f32,
        brightness: f32,
    ) {
        self.filter.set_coeff(0.1 + (1.0 - brightness.clamp(0.0, 1.0)) * 0.6);
        let beta = bow_position.clamp(0.05, 0.5);
        let base = (sample_rate / freq.max(1.0) - 1.0).max(2.0);
        bridge.set_delay(base * beta);
        neck.set_delay(base * (1.0 - beta));
    }

    pub(crate) fn reset(&mut self, neck: &mut WaveguideDelay, bridge: &mut WaveguideDelay) {
        neck.clear();
        bridge.clear();
        self.filter.reset();
    }

    #[inline]
    pub(crate) fn tick(
        &mut self,
        neck: &mut WaveguideDelay,
        bridge: &mut WaveguideDelay,
        tables: &Tables,
        bow_velocity: f32,
        pressure: f32,
        loop_gain: f32,
    ) -> f32 {
        let bridge_out = bridge.read(tables);
        let neck_out = neck.read(tables);
        let bridge_reflection = -self.filter.process(bridge_out) * loop_gain;
        let nut_reflection = -neck_out;
        let string_velocity = bridge_reflection + nut_reflection;
        let delta = bow_velocity - string_velocity;
        let injected = if bow_velocity > 0.0 {
            delta * bow_friction(delta, 5.0 - 4.0 * pressure.clamp(0.0, 1.0))
        } else {
            0.0
        };
        neck.write(flush_denormal(bridge_reflection + injected));
        bridge.write(flush_denormal(nut_reflection + injected));
        bridge_out
    }
}

/// Friction curve: near 1 while sticking, falling off as slip velocity grows.
#[inline]
fn bow_friction(delta: f32, slope: f32) -> f32 {
    let x = ((delta + 0.001) * slope).abs() + 0.75;
    powf(x, -4.0).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    #[test]
    fn test_pure_loop_is_periodic() {
        let tables = Tables::shared();
        let mut line = WaveguideDelay::for_lowest_frequency(SR, 20.0);
        let mut string = PluckedString::default();
        string.configure(&mut line, SR, 480.0, 1.0, 0.0);
        assert_eq!(line.delay(), 100.0);
        let mut rng = Rng::new(3);
        string.excite(&mut line, Excitation::Noise, 0.5, 0.5, 1.0, &mut rng);
        let out: Vec<f32> = (0..600).map(|_| string.tick(&mut line, tables, 1.0)).collect();
        for n in 0..500 {
            assert!((out[n] - out[n + 100]).abs() < 1e-6, "sample {n}");
        }
    }

    #[test]
    fn test_loss_compensation_keeps_pitch() {
        // 440 Hz is not an integer period, and a dark loop adds phase delay.
        let mut line = WaveguideDelay::for_lowest_frequency(SR, 20.0);
        let mut string = PluckedString::default();
        string.configure(&mut line, SR, 440.0, 0.3, 0.0);
        let total = line.delay() + one_pole_phase_delay(string.loss.coeff(), 2.0 * PI * 440.0 / SR);
        assert!((total - SR / 440.0).abs() < 1e-3);
    }

    #[test]
    fn test_allpass_phase_delay_limits() {
        assert!((allpass_phase_delay(0.0, 0.1) - 1.0).abs() < 1e-4);
        let low = allpass_phase_delay(-0.5, 0.01);
        let high = allpass_phase_delay(-0.5, 2.5);
        assert!((low - 3.0).abs() < 0.05, "low {low}");
        assert!(high < low, "stiff strings delay highs less");
    }

    #[test]
    fn test_excitation_shapes() {
        let mut rng = Rng::new(1);
        let len = 100;
        let pluck: Vec<f32> = (0..len)
            .map(|i| Excitation::Pluck.sample(i, len, 0.25, 0.5, &mut rng))
            .collect();
        let peak = pluck.iter().cloned().fold(0.0f32, f32::max);
        assert!((peak - 1.0).abs() < 1e-6);
        assert_eq!(pluck.iter().position(|&v| v == peak), Some(25));

        let strike: Vec<f32> = (0..len)
            .map(|i| Excitation::Strike.sample(i, len, 0.5, 0.5, &mut rng))
            .collect();
        assert_eq!(strike[0], 1.0);
        assert!(strike[1..].iter().all(|&v| v == 0.0));

        let soft = (0..len)
            .filter(|&i| Excitation::Hammer.sample(i, len, 0.5, 0.0, &mut rng) > 0.0)
            .count();
        let hard = (0..len)
            .filter(|&i| Excitation::Hammer.sample(i, len, 0.5, 1.0, &mut rng) > 0.0)
            .count();
        assert!(hard < soft);

        for e in Excitation::ALL {
            assert_eq!(Excitation::from_name(e.name()), Some(e));
        }
    }

    #[test]
    fn test_bowed_string_self_oscillates() {
        let tables = Tables::shared();
        let mut neck = WaveguideDelay::for_lowest_frequency(SR, 20.0);
        let mut bridge = WaveguideDelay::for_lowest_frequency(SR, 20.0);
        let mut bow = BowedString::default();
        bow.configure(&mut neck, &mut bridge, SR, 220.0, 0.13, 0.6);
        let mut peak = 0.0f32;
        for n in 0..24000 {
            let y = bow.tick(&mut neck, &mut bridge, tables, 0.2, 0.6, 0.99);
            assert!(y.is_finite());
            if n > 12000 {
                peak = peak.max(y.abs());
            }
        }
        assert!(peak > 1e-3, "bowed string silent: {peak}");
    }
}
