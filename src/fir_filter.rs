//! Windowed-sinc lowpass FIR filter, used where IIR decimation would need
//! too steep a slope.

#[allow(unused_imports)]
use num_traits::float::Float;

/// Tap count used by the downsampling lowpass. Must be odd so that the
/// response has a center coefficient.
pub const NUM_TAPS: usize = 23;

/// Fill `coefficients` with the ideal (sinc) lowpass response for the given
/// cutoff.
pub fn calculate_ideal_lowpass_coefficients(
    cutoff_hz: f32,
    sample_rate_hz: f32,
    coefficients: &mut [f32],
) {
    let num_taps = coefficients.len();
    // the cutoff as a ratio of cutoff to Nyquist, scaled from 0 to pi
    let corner = (cutoff_hz / (sample_rate_hz * 0.5)) * core::f32::consts::PI;

    let middle_coeff = if num_taps % 2 == 1 {
        let middle = (num_taps - 1) / 2;
        coefficients[middle] = corner / core::f32::consts::PI;
        middle
    } else {
        num_taps / 2
    };

    for n in 0..middle_coeff {
        let value = n as f32 - ((num_taps - 1) as f32 * 0.5);
        coefficients[n] = (value * corner).sin() / (value * core::f32::consts::PI);
        coefficients[num_taps - 1 - n] = coefficients[n];
    }
}

/// Shape the coefficients with a Kaiser window of the given stopband
/// attenuation in dB.
pub fn apply_kaiser_window(coefficients: &mut [f32], attenuation: f32) {
    let num_taps = coefficients.len();

    // beta is 0 if the attenuation is less than 21 dB
    let mut beta = 0.0_f32;
    if attenuation >= 50.0 {
        beta = 0.1102 * (attenuation - 8.71);
    } else if attenuation >= 21.0 {
        beta = 0.5842 * (attenuation - 21.0).powf(0.4);
        beta += 0.07886 * (attenuation - 21.0);
    }

    let half_length = if num_taps % 2 == 1 {
        (num_taps + 1) / 2
    } else {
        num_taps / 2
    };

    for n in 0..half_length {
        let window_pos = 1.0 - ((2.0 * n as f32) / (num_taps - 1) as f32);
        coefficients[n] *=
            bessel_i0(beta * (1.0 - (window_pos * window_pos)).sqrt()) / bessel_i0(beta);
        coefficients[num_taps - 1 - n] = coefficients[n];
    }
}

/// Zeroth-order modified Bessel function of the first kind.
fn bessel_i0(input: f32) -> f32 {
    let mut sum = 1.0_f32;
    let half_in = input * 0.5;
    let mut numerator = 1.0_f32;
    let mut denominator = 1.0_f32;
    for m in 1..=32 {
        numerator *= half_in;
        denominator *= m as f32;
        let term = numerator / denominator;
        sum += term * term;
    }
    sum
}

/// Convolve the coefficients against a run of samples in a circular buffer,
/// starting at `pos`. The modulo only costs when the run crosses the end.
#[inline]
pub fn process_fir(audio: &[f32], coefficients: &[f32], pos: usize) -> f32 {
    let mut out_value = 0.0;
    if pos + coefficients.len() > audio.len() {
        for (i, coeff) in coefficients.iter().enumerate() {
            out_value += audio[(pos + i) % audio.len()] * coeff;
        }
    } else {
        for (i, coeff) in coefficients.iter().enumerate() {
            out_value += audio[pos + i] * coeff;
        }
    }
    out_value
}
