//! Smoothed control value with a linear per-sample ramp.

use num_traits::float::Float;

/// Control value that moves toward its target along a linear ramp, advanced
/// once per rendered sample, so that parameter changes never step audibly.
///
/// The ramp is exact: after the full smoothing duration the current value
/// equals the target bit-for-bit, instead of accumulating float error.
#[derive(Debug, Clone)]
pub struct SmoothedValue<T: Float> {
    current_value: T,
    target_value: T,
    value_step: T,
    smooth_dur_seconds: f64,
    smooth_dur_samples: usize,
    smooth_count: usize,
    sample_rate: f64,
    reinitialize: bool,
}

impl<T: Float> SmoothedValue<T> {
    /// Create a new value with the given smoothing time in seconds.
    pub fn new(smoothing_time_seconds: f64) -> Self {
        let mut value = Self {
            current_value: T::zero(),
            target_value: T::zero(),
            value_step: T::zero(),
            smooth_dur_seconds: 0.0,
            smooth_dur_samples: 0,
            smooth_count: 0,
            sample_rate: 1.0,
            reinitialize: true,
        };
        value.set_smoothing_time(smoothing_time_seconds);
        value
    }

    /// Begin a ramp toward a new target.
    ///
    /// The very first call after construction or a sample rate change snaps
    /// immediately, so initialization never fades in from zero. Retargeting
    /// to the current target is a no-op. A zero smoothing duration also
    /// snaps.
    pub fn set_value(&mut self, target: T) {
        if core::mem::replace(&mut self.reinitialize, false) {
            self.set_value_now(target);
            return;
        }
        if target == self.target_value {
            return;
        }
        if self.smooth_dur_samples == 0 {
            self.set_value_now(target);
            return;
        }
        self.target_value = target;
        self.value_step = (self.target_value - self.current_value)
            / T::from(self.smooth_dur_samples).unwrap_or_else(T::one);
        self.smooth_count = 0;
    }

    /// Jump to a value immediately, bypassing the ramp.
    pub fn set_value_now(&mut self, value: T) {
        self.current_value = value;
        self.target_value = value;
        self.smooth_count = self.smooth_dur_samples;
        self.reinitialize = false;
    }

    /// Force the current value onto the target immediately.
    pub fn snap(&mut self) {
        self.set_value_now(self.target_value);
    }

    #[inline]
    pub fn is_smoothing(&self) -> bool {
        self.smooth_count < self.smooth_dur_samples
    }

    /// Advance the ramp by one sample. The final step lands on the target
    /// exactly.
    #[inline]
    pub fn inc(&mut self) {
        if self.smooth_count < self.smooth_dur_samples {
            self.smooth_count += 1;
            if self.smooth_count < self.smooth_dur_samples {
                self.current_value = self.current_value + self.value_step;
            } else {
                self.current_value = self.target_value;
            }
        }
    }

    /// Advance the ramp by several samples at once.
    #[inline]
    pub fn inc_by(&mut self, sample_count: usize) {
        for _ in 0..sample_count {
            if !self.is_smoothing() {
                break;
            }
            self.inc();
        }
    }

    #[inline]
    pub fn get_value(&self) -> T {
        self.current_value
    }

    #[inline]
    pub fn get_target(&self) -> T {
        self.target_value
    }

    /// Set the smoothing duration. Negative durations are a contract
    /// violation; release builds clamp to zero.
    pub fn set_smoothing_time(&mut self, smoothing_time_seconds: f64) {
        debug_assert!(smoothing_time_seconds >= 0.0);

        self.smooth_dur_seconds = smoothing_time_seconds;
        self.smooth_dur_samples = (self.smooth_dur_seconds * self.sample_rate).max(0.0) as usize;
    }

    /// Set the sample rate, which must be positive, and re-snap the current
    /// value to the target. Rate and ramp state are entangled; continuing a
    /// ramp across a rate change would produce an inconsistent step size.
    pub fn set_sample_rate(&mut self, sample_rate_hz: f64) {
        debug_assert!(sample_rate_hz > 0.0);

        if sample_rate_hz > 0.0 {
            self.sample_rate = sample_rate_hz;
        }
        self.set_smoothing_time(self.smooth_dur_seconds);
        self.set_value_now(self.target_value);
    }
}
