//! Tempo rate lookup and host transport information.

#[allow(unused_imports)]
use num_traits::float::Float;

/// The beat-division families offered to tempo-synced rate parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempoRates {
    Normal,
    Slow,
    NoExtremes,
}

const NORMAL_SCALARS: [f64; 24] = [
    1.0 / 6.0,
    1.0 / 5.0,
    1.0 / 4.0,
    1.0 / 3.0,
    1.0 / 2.0,
    2.0 / 3.0,
    3.0 / 4.0,
    1.0,
    2.0,
    3.0,
    4.0,
    5.0,
    6.0,
    7.0,
    8.0,
    12.0,
    16.0,
    24.0,
    32.0,
    48.0,
    64.0,
    96.0,
    333.0,
    3000.0,
];

const NORMAL_DISPLAYS: [&str; 24] = [
    "1/6", "1/5", "1/4", "1/3", "1/2", "2/3", "3/4", "1", "2", "3", "4", "5", "6", "7", "8", "12",
    "16", "24", "32", "48", "64", "96", "333", "infinity",
];

const SLOW_SCALARS: [f64; 25] = [
    1.0 / 12.0,
    1.0 / 8.0,
    1.0 / 7.0,
    1.0 / 6.0,
    1.0 / 5.0,
    1.0 / 4.0,
    1.0 / 3.0,
    1.0 / 2.0,
    2.0 / 3.0,
    3.0 / 4.0,
    1.0,
    2.0,
    3.0,
    4.0,
    5.0,
    6.0,
    7.0,
    8.0,
    12.0,
    16.0,
    24.0,
    32.0,
    48.0,
    64.0,
    96.0,
];

const SLOW_DISPLAYS: [&str; 25] = [
    "1/12", "1/8", "1/7", "1/6", "1/5", "1/4", "1/3", "1/2", "2/3", "3/4", "1", "2", "3", "4", "5",
    "6", "7", "8", "12", "16", "24", "32", "48", "64", "96",
];

const NO_EXTREMES_SCALARS: [f64; 21] = [
    1.0 / 4.0,
    1.0 / 3.0,
    1.0 / 2.0,
    2.0 / 3.0,
    3.0 / 4.0,
    1.0,
    2.0,
    3.0,
    4.0,
    5.0,
    6.0,
    7.0,
    8.0,
    12.0,
    16.0,
    24.0,
    32.0,
    48.0,
    64.0,
    96.0,
    333.0,
];

const NO_EXTREMES_DISPLAYS: [&str; 21] = [
    "1/4", "1/3", "1/2", "2/3", "3/4", "1", "2", "3", "4", "5", "6", "7", "8", "12", "16", "24",
    "32", "48", "64", "96", "333",
];

/// Maps a discrete tempo-rate selection onto a beat multiplier of the host
/// tempo. Pure lookup, no state.
#[derive(Debug, Clone, Copy)]
pub struct TempoRateTable {
    scalars: &'static [f64],
    displays: &'static [&'static str],
}

impl TempoRateTable {
    pub fn new(table_type: TempoRates) -> Self {
        match table_type {
            TempoRates::Normal => Self {
                scalars: &NORMAL_SCALARS,
                displays: &NORMAL_DISPLAYS,
            },
            TempoRates::Slow => Self {
                scalars: &SLOW_SCALARS,
                displays: &SLOW_DISPLAYS,
            },
            TempoRates::NoExtremes => Self {
                scalars: &NO_EXTREMES_SCALARS,
                displays: &NO_EXTREMES_DISPLAYS,
            },
        }
    }

    pub fn num_rates(&self) -> usize {
        self.scalars.len()
    }

    /// Beat multiplier at an index, clamped into range.
    #[inline]
    pub fn scalar(&self, index: usize) -> f64 {
        self.scalars[self.safe_index(index)]
    }

    /// Display string at an index, clamped into range.
    pub fn display(&self, index: usize) -> &'static str {
        self.displays[self.safe_index(index)]
    }

    /// Convert a normalized 0..1 selection into a table index, biased so
    /// that the topmost entry still gets a full-width slot.
    #[inline]
    pub fn index_from_normalized(&self, gen_value: f32) -> usize {
        let gen_value = gen_value.clamp(0.0, 1.0);
        (gen_value * (self.scalars.len() as f32 - 0.9)) as usize
    }

    /// Beat multiplier for a normalized 0..1 selection.
    #[inline]
    pub fn scalar_from_normalized(&self, gen_value: f32) -> f64 {
        self.scalars[self.index_from_normalized(gen_value)]
    }

    #[inline]
    fn safe_index(&self, index: usize) -> usize {
        index.min(self.scalars.len() - 1)
    }
}

impl Default for TempoRateTable {
    fn default() -> Self {
        Self::new(TempoRates::Normal)
    }
}

/// Host transport and musical time data for one processing block.
///
/// Every field is host-dependent and may be unavailable; consumers check the
/// validity flags and fall back to user-provided values when they are clear.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeInfo {
    pub tempo_bpm: f64,
    pub tempo_is_valid: bool,
    /// Song position in beats.
    pub beat_pos: f64,
    pub beat_pos_is_valid: bool,
    /// Song position of the beginning of the current measure, in beats.
    pub bar_pos: f64,
    pub bar_pos_is_valid: bool,
    pub numerator: f64,
    pub denominator: f64,
    pub time_signature_is_valid: bool,
    pub samples_to_next_bar: i64,
    pub samples_to_next_bar_is_valid: bool,
    /// The playback position or play/stop state has just changed.
    pub playback_changed: bool,
    pub playback_is_occurring: bool,

    // derived by resolve()
    pub tempo_bps: f64,
    pub samples_per_beat: i64,
}

impl TimeInfo {
    /// Fill in the derived fields and the distance to the next bar line.
    /// Called once per block after the host fields are (partially) filled.
    ///
    /// Degenerate host data falls back to 120 BPM in 4/4 so that the
    /// arithmetic below stays finite; the validity flags still tell
    /// consumers whether to trust the host at all.
    pub fn resolve(&mut self, sample_rate_hz: f64) {
        if self.tempo_bpm <= 0.0 {
            self.tempo_bpm = 120.0;
        }
        self.tempo_bps = self.tempo_bpm / 60.0;
        self.samples_per_beat = round_i64(sample_rate_hz / self.tempo_bps);

        if self.tempo_is_valid
            && self.beat_pos_is_valid
            && self.bar_pos_is_valid
            && self.time_signature_is_valid
        {
            self.samples_to_next_bar_is_valid = true;
        }

        // a non-positive numerator would hang the wrapping below
        if self.numerator <= 0.0 {
            self.numerator = 4.0;
        }
        if self.denominator <= 0.0 {
            self.denominator = 4.0;
        }

        if self.samples_to_next_bar_is_valid {
            let mut num_beats_to_bar = if self.bar_pos == self.beat_pos {
                0.0
            } else {
                // some hosts report a bar start beyond the current beat
                let mut beats = self.bar_pos + self.numerator - self.beat_pos;
                while beats < 0.0 {
                    beats += self.numerator;
                }
                while beats > self.numerator {
                    beats -= self.numerator;
                }
                beats
            };
            if num_beats_to_bar < 0.0 {
                num_beats_to_bar = 0.0;
            }

            self.samples_to_next_bar =
                round_i64(num_beats_to_bar * sample_rate_hz / self.tempo_bps).max(0);
        }
    }
}

#[inline]
fn round_i64(value: f64) -> i64 {
    value.round() as i64
}
