//! Interpolation and numeric helpers shared by the effect cores.

#[allow(unused_imports)]
use num_traits::float::Float;

/// Values below this magnitude (around -300 dB) are treated as silence so
/// that denormals never enter feedback paths.
pub const DENORMAL_THRESHOLD: f32 = 1.0e-15;

/// Clamp very small values to zero.
#[inline]
pub fn clamp_denormal(value: f32) -> f32 {
    if value.abs() < DENORMAL_THRESHOLD {
        0.0
    } else {
        value
    }
}

/// 4-point cubic Hermite interpolation at a fractional position in a
/// circular buffer. The neighborhood wraps around both buffer ends.
#[inline]
pub fn interpolate_hermite(data: &[f32], address: f64) -> f32 {
    let len = data.len();
    let pos = address as usize;
    let pos_fract = (address - pos as f64) as f32;

    let xm1 = data[if pos == 0 { len - 1 } else { pos - 1 }];
    let x0 = data[pos];
    let x1 = data[(pos + 1) % len];
    let x2 = data[(pos + 2) % len];

    let a = ((3.0 * (x0 - x1)) - xm1 + x2) * 0.5;
    let b = (2.0 * x1) + xm1 - (2.5 * x0) - (x2 * 0.5);
    let c = (x1 - xm1) * 0.5;

    (((a * pos_fract) + b) * pos_fract + c) * pos_fract + x0
}

/// Hermite interpolation without wraparound; neighbors outside the buffer
/// read as silence.
#[inline]
pub fn interpolate_hermite_no_wrap(data: &[f32], address: f64) -> f32 {
    let len = data.len();
    let pos = address as usize;
    let pos_fract = (address - pos as f64) as f32;

    let xm1 = if pos == 0 { 0.0 } else { data[pos - 1] };
    let x0 = data[pos];
    let x1 = if pos + 1 >= len { 0.0 } else { data[pos + 1] };
    let x2 = if pos + 2 >= len { 0.0 } else { data[pos + 2] };

    let a = ((3.0 * (x0 - x1)) - xm1 + x2) * 0.5;
    let b = (2.0 * x1) + xm1 - (2.5 * x0) - (x2 * 0.5);
    let c = (x1 - xm1) * 0.5;

    (((a * pos_fract) + b) * pos_fract + c) * pos_fract + x0
}

/// Linear interpolation at a fractional position in a circular buffer.
#[inline]
pub fn interpolate_linear(data: &[f32], address: f64) -> f32 {
    let pos = address as usize;
    let pos_fract = (address - pos as f64) as f32;
    (data[pos] * (1.0 - pos_fract)) + (data[(pos + 1) % data.len()] * pos_fract)
}

/// Linear interpolation between two already-fetched values, using only the
/// fractional part of the address.
#[inline]
pub fn interpolate_linear_values(value1: f32, value2: f32, address: f64) -> f32 {
    let pos_fract = (address - ((address as i64) as f64)) as f32;
    (value1 * (1.0 - pos_fract)) + (value2 * pos_fract)
}

/// Closed-form approximation of the principal branch of the Lambert W
/// function, where W(x) * exp(W(x)) = x. An approximation, not exact.
#[inline]
pub fn lambert_w(value: f64) -> f64 {
    let x = value.abs();
    if x <= 500.0 {
        0.665 * (1.0 + (0.0195 * (x + 1.0).ln())) * (x + 1.0).ln() + 0.04
    } else {
        (x - 4.0).ln() - ((1.0 - (1.0 / x.ln())) * x.ln().ln())
    }
}

/// Return whichever input has the larger magnitude.
#[inline]
pub fn magnitude_max(value1: f32, value2: f32) -> f32 {
    if value1.abs() > value2.abs() {
        value1
    } else {
        value2
    }
}

/// Parameter taper expansions, mapping a normalized 0..1 control position
/// onto a real value range.
#[inline]
pub fn expand_linear(gen_value: f64, min: f64, max: f64) -> f64 {
    (gen_value * (max - min)) + min
}

#[inline]
pub fn expand_squared(gen_value: f64, min: f64, max: f64) -> f64 {
    (gen_value * gen_value * (max - min)) + min
}

#[inline]
pub fn expand_cubed(gen_value: f64, min: f64, max: f64) -> f64 {
    (gen_value * gen_value * gen_value * (max - min)) + min
}

#[inline]
pub fn expand_pow(gen_value: f64, curve: f64, min: f64, max: f64) -> f64 {
    (gen_value.powf(curve) * (max - min)) + min
}

/// Logarithmic taper; both range bounds must be positive.
#[inline]
pub fn expand_log(gen_value: f64, min: f64, max: f64) -> f64 {
    min * 2.0f64.powf(gen_value * (max / min).log2())
}
