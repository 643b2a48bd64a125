//! Second-order IIR filter with an output history for fractional reads.

#[allow(unused_imports)]
use num_traits::float::Float;

use crate::math::clamp_denormal;

/// Fraction of the (downsampled) Nyquist frequency where the lowpass shelf
/// begins.
pub const SHELF_START_LOWPASS: f64 = 0.333;

/// Two-pole, two-zero filter in the reduced difference-equation form that
/// holds when the first and third feed-forward coefficients are equal, which
/// is the case for lowpass, highpass and notch responses.
///
/// Four output samples of history are kept so that a fractional position
/// inside the recent past can be Hermite interpolated, for reading a signal
/// that is itself being consumed at a variable rate.
#[derive(Debug, Clone, Default)]
pub struct IirFilter {
    in_coeff: f32,
    prev_in_coeff: f32,
    prev_out_coeff: f32,
    prev_prev_out_coeff: f32,

    prev_in: f32,
    prev_prev_in: f32,
    current_out: f32,
    prev_out: f32,
    prev_prev_out: f32,
    prev_prev_prev_out: f32,
}

impl IirFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero the input and output history.
    pub fn reset(&mut self) {
        self.prev_in = 0.0;
        self.prev_prev_in = 0.0;
        self.current_out = 0.0;
        self.prev_out = 0.0;
        self.prev_prev_out = 0.0;
        self.prev_prev_prev_out = 0.0;
    }

    pub fn calculate_lowpass_coefficients(&mut self, cutoff_hz: f32, sample_rate_hz: f32) {
        let q = 0.5_f32;
        let two_pi_freq_div_sr = 2.0 * core::f32::consts::PI * cutoff_hz / sample_rate_hz;
        let cos_omega = two_pi_freq_div_sr.cos();
        let slope_factor = two_pi_freq_div_sr.sin() / (q * 2.0);
        let coeff_scalar = 1.0 / (1.0 + slope_factor);

        self.prev_in_coeff = (1.0 - cos_omega) * coeff_scalar;
        self.in_coeff = self.prev_in_coeff * 0.5;
        self.prev_out_coeff = (-2.0 * cos_omega) * coeff_scalar;
        self.prev_prev_out_coeff = (1.0 - slope_factor) * coeff_scalar;
    }

    pub fn calculate_highpass_coefficients(&mut self, cutoff_hz: f32, sample_rate_hz: f32) {
        let q = 0.5_f32;
        let two_pi_freq_div_sr = 2.0 * core::f32::consts::PI * cutoff_hz / sample_rate_hz;
        let cos_omega = two_pi_freq_div_sr.cos();
        let slope_factor = two_pi_freq_div_sr.sin() / (q * 2.0);
        let coeff_scalar = 1.0 / (1.0 + slope_factor);

        self.prev_in_coeff = (-1.0 - cos_omega) * coeff_scalar;
        self.in_coeff = self.prev_in_coeff * -0.5;
        self.prev_out_coeff = (-2.0 * cos_omega) * coeff_scalar;
        self.prev_prev_out_coeff = (1.0 - slope_factor) * coeff_scalar;
    }

    /// Adopt another filter's coefficients, for stereo-linked channels that
    /// share one cutoff.
    pub fn copy_coefficients(&mut self, source: &IirFilter) {
        self.in_coeff = source.in_coeff;
        self.prev_in_coeff = source.prev_in_coeff;
        self.prev_out_coeff = source.prev_out_coeff;
        self.prev_prev_out_coeff = source.prev_prev_out_coeff;
    }

    /// Feed one input sample, shifting the output history.
    #[inline]
    pub fn process(&mut self, in_sample: f32) {
        self.prev_prev_prev_out = self.prev_prev_out;
        self.prev_prev_out = self.prev_out;
        self.prev_out = self.current_out;

        self.current_out = ((in_sample + self.prev_prev_in) * self.in_coeff)
            + (self.prev_in * self.prev_in_coeff)
            - (self.prev_out * self.prev_out_coeff)
            - (self.prev_prev_out * self.prev_prev_out_coeff);
        self.current_out = clamp_denormal(self.current_out);

        self.prev_prev_in = self.prev_in;
        self.prev_in = in_sample;
    }

    /// Feed two consecutive samples from a circular buffer.
    #[inline]
    pub fn process_2(&mut self, audio: &[f32], pos: usize) {
        let in0 = audio[pos];
        let in1 = audio[(pos + 1) % audio.len()];

        self.prev_prev_prev_out = self.prev_prev_out;
        self.prev_prev_out = self.prev_out;
        self.prev_out = self.current_out;
        self.current_out = ((in0 + self.prev_prev_in) * self.in_coeff)
            + (self.prev_in * self.prev_in_coeff)
            - (self.prev_out * self.prev_out_coeff)
            - (self.prev_prev_out * self.prev_prev_out_coeff);

        self.prev_prev_prev_out = self.prev_prev_out;
        self.prev_prev_out = self.prev_out;
        self.prev_out = self.current_out;
        self.current_out = ((in1 + self.prev_in) * self.in_coeff)
            + (in0 * self.prev_in_coeff)
            - (self.prev_out * self.prev_out_coeff)
            - (self.prev_prev_out * self.prev_prev_out_coeff);

        self.current_out = clamp_denormal(self.current_out);
        self.prev_prev_in = in0;
        self.prev_in = in1;
    }

    /// Feed three consecutive samples from a circular buffer.
    #[inline]
    pub fn process_3(&mut self, audio: &[f32], pos: usize) {
        let len = audio.len();
        let in0 = audio[pos];
        let in1 = audio[(pos + 1) % len];
        let in2 = audio[(pos + 2) % len];

        self.prev_prev_prev_out = ((in0 + self.prev_prev_in) * self.in_coeff)
            + (self.prev_in * self.prev_in_coeff)
            - (self.current_out * self.prev_out_coeff)
            - (self.prev_out * self.prev_prev_out_coeff);
        self.prev_prev_out = ((in1 + self.prev_in) * self.in_coeff)
            + (in0 * self.prev_in_coeff)
            - (self.prev_prev_prev_out * self.prev_out_coeff)
            - (self.current_out * self.prev_prev_out_coeff);
        self.prev_out = ((in2 + in0) * self.in_coeff)
            + (in1 * self.prev_in_coeff)
            - (self.prev_prev_out * self.prev_out_coeff)
            - (self.prev_prev_prev_out * self.prev_prev_out_coeff);

        self.current_out = self.prev_out;
        self.current_out = clamp_denormal(self.current_out);
        self.prev_out = self.prev_prev_out;
        self.prev_prev_out = self.prev_prev_prev_out;
        self.prev_prev_prev_out = self.current_out;

        self.prev_prev_in = in1;
        self.prev_in = in2;
    }

    /// Feed four consecutive samples from a circular buffer.
    #[inline]
    pub fn process_4(&mut self, audio: &[f32], pos: usize) {
        let len = audio.len();
        let in0 = audio[pos];
        let in1 = audio[(pos + 1) % len];
        let in2 = audio[(pos + 2) % len];
        let in3 = audio[(pos + 3) % len];

        self.prev_prev_prev_out = ((in0 + self.prev_prev_in) * self.in_coeff)
            + (self.prev_in * self.prev_in_coeff)
            - (self.current_out * self.prev_out_coeff)
            - (self.prev_out * self.prev_prev_out_coeff);
        self.prev_prev_out = ((in1 + self.prev_in) * self.in_coeff)
            + (in0 * self.prev_in_coeff)
            - (self.prev_prev_prev_out * self.prev_out_coeff)
            - (self.current_out * self.prev_prev_out_coeff);
        self.prev_out = ((in2 + in0) * self.in_coeff)
            + (in1 * self.prev_in_coeff)
            - (self.prev_prev_out * self.prev_out_coeff)
            - (self.prev_prev_prev_out * self.prev_prev_out_coeff);
        self.current_out = ((in3 + in1) * self.in_coeff)
            + (in2 * self.prev_in_coeff)
            - (self.prev_out * self.prev_out_coeff)
            - (self.prev_prev_out * self.prev_prev_out_coeff);
        self.current_out = clamp_denormal(self.current_out);

        self.prev_prev_in = in2;
        self.prev_in = in3;
    }

    /// 4-point Hermite interpolation over the stored output history, at the
    /// fractional part of the given position.
    #[inline]
    pub fn interpolate_hermite_output(&self, position: f64) -> f32 {
        let pos_fract = (position - position.floor()) as f32;

        let a = ((3.0 * (self.prev_prev_out - self.prev_out)) - self.prev_prev_prev_out
            + self.current_out)
            * 0.5;
        let b = (2.0 * self.prev_out) + self.prev_prev_prev_out
            - (2.5 * self.prev_prev_out)
            - (self.current_out * 0.5);
        let c = (self.prev_out - self.prev_prev_prev_out) * 0.5;

        ((((a * pos_fract) + b) * pos_fract + c) * pos_fract) + self.prev_prev_out
    }

    /// Most recent output sample.
    #[inline]
    pub fn current_output(&self) -> f32 {
        self.current_out
    }
}
