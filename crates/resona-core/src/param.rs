//! Smoothed scalar parameters for zipper-free gain changes.
//!
//! The render loop applies master gain as one multiply per sample; ramping
//! the gain through a one-pole smoother keeps control-thread changes from
//! producing steps in the output.

use libm::expf;

/// A parameter that approaches its target exponentially.
///
/// ```rust
/// use resona_core::SmoothedParam;
///
/// let mut gain = SmoothedParam::with_config(1.0, 48000.0, 10.0);
/// gain.set_target(0.0);
/// let first = gain.advance();
/// assert!(first < 1.0 && first > 0.9);
/// ```
#[derive(Debug, Clone)]
pub struct SmoothedParam {
    current: f32,
    target: f32,
    /// Per-sample step toward the target (0 = frozen, 1 = instant)
    coeff: f32,
    sample_rate: f32,
    smoothing_time_ms: f32,
}

impl SmoothedParam {
    /// Create a parameter that changes instantly until configured.
    pub fn new(initial: f32) -> Self {
        Self {
            current: initial,
            target: initial,
            coeff: 1.0,
            sample_rate: 48000.0,
            smoothing_time_ms: 0.0,
        }
    }

    /// Create with sample rate and smoothing time.
    pub fn with_config(initial: f32, sample_rate: f32, smoothing_time_ms: f32) -> Self {
        let mut param = Self::new(initial);
        param.sample_rate = sample_rate;
        param.smoothing_time_ms = smoothing_time_ms;
        param.recalculate_coeff();
        param
    }

    /// Set the value to approach.
    #[inline]
    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    /// Jump to `value` with no ramp.
    #[inline]
    pub fn set_immediate(&mut self, value: f32) {
        self.target = value;
        self.current = value;
    }

    /// Update sample rate and recalculate the smoothing coefficient.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.recalculate_coeff();
    }

    /// Advance one sample and return the smoothed value.
    #[inline]
    pub fn advance(&mut self) -> f32 {
        self.current += self.coeff * (self.target - self.current);
        if (self.target - self.current).abs() < 1e-7 {
            self.current = self.target;
        }
        self.current
    }

    /// Current value without advancing.
    #[inline]
    pub fn get(&self) -> f32 {
        self.current
    }

    /// Target value.
    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    /// `true` once the ramp has reached its target.
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.current == self.target
    }

    fn recalculate_coeff(&mut self) {
        let samples = self.smoothing_time_ms * 0.001 * self.sample_rate;
        self.coeff = if samples > 1.0 { 1.0 - expf(-1.0 / samples) } else { 1.0 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_is_instant() {
        let mut p = SmoothedParam::new(0.0);
        p.set_target(1.0);
        assert_eq!(p.advance(), 1.0);
    }

    #[test]
    fn test_converges_and_settles() {
        let mut p = SmoothedParam::with_config(0.0, 48000.0, 5.0);
        p.set_target(1.0);
        for _ in 0..48000 {
            p.advance();
        }
        assert!(p.is_settled());
        assert_eq!(p.get(), 1.0);
    }

    #[test]
    fn test_ramp_is_monotonic() {
        let mut p = SmoothedParam::with_config(1.0, 48000.0, 20.0);
        p.set_target(0.25);
        let mut prev = p.get();
        for _ in 0..2000 {
            let v = p.advance();
            assert!(v <= prev);
            prev = v;
        }
    }
}
