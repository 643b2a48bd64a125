//! Linear congruential pseudo random number generator.
//!
//! Every DSP core owns its own generator, so instances never interleave
//! draws through shared state and tests can fix the seed.

/// Pseudo random number generator with 32-bit state.
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u32,
}

impl Lcg {
    /// Create a new generator with the given seed.
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Next raw 32-bit word.
    #[inline]
    pub fn next_word(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(1664525).wrapping_add(1013904223);
        self.state
    }

    /// Next float in [0.0, 1.0).
    #[inline]
    pub fn next_float(&mut self) -> f32 {
        self.next_word() as f32 / 4294967296.0
    }

    /// Next float in [-1.0, 1.0).
    #[inline]
    pub fn next_bipolar(&mut self) -> f32 {
        (self.next_float() * 2.0) - 1.0
    }

    /// Next float uniformly placed between the two bounds.
    #[inline]
    pub fn next_in_range(&mut self, min: f32, max: f32) -> f32 {
        ((max - min) * self.next_float()) + min
    }
}

impl Default for Lcg {
    fn default() -> Self {
        Self::new(0x21)
    }
}
