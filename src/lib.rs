#![doc = include_str!("../README.md")]
#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod fir_filter;
pub mod iir_filter;
pub mod math;
pub mod midi;
pub mod midi_gater;
pub mod random;
pub mod scrubby;
pub mod skidder;
pub mod smoothed_value;
pub mod splitter;
pub mod tempo;
pub mod transverb;

/// Sample rate context for DSP calculations.
#[derive(Debug, Clone, Copy)]
pub struct SampleRate {
    /// Sample rate in Hz
    pub sample_rate_hz: f64,
}

impl SampleRate {
    /// Create a new sample rate context.
    ///
    /// The rate must be positive.
    pub fn new(sample_rate_hz: f64) -> Self {
        debug_assert!(sample_rate_hz > 0.0);
        Self { sample_rate_hz }
    }
}
