//! A rhythmic gate that chops audio on and off.
//!
//! Each skid cycle walks slope-in, plateau, slope-out and valley phases
//! with sample countdowns. The rate is free-running in Hz or synced to
//! host tempo as a beat division, with optional randomization of rate,
//! pulsewidth and floor per cycle. Every cycle also draws a random stereo
//! pan throw, and the valley can emit "rupture" noise scaled by the RMS
//! of the gated audio. MIDI notes can trigger the skidding, or invert it
//! so that skidding applies only while notes are held.

use crate::math;
use crate::midi::{MidiEventKind, MidiState, NUM_NOTES};
use crate::random::Lcg;
use crate::tempo::{TempoRateTable, TempoRates, TimeInfo};
use crate::SampleRate;

#[allow(unused_imports)]
use num_traits::float::Float;

pub const RATE_MIN_HZ: f64 = 0.3;
pub const RATE_MAX_HZ: f64 = 21.0;
const RATE_CURVE: f64 = 1.65;

// the four states of the skid cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkidState {
    SlopeIn,
    Plateau,
    SlopeOut,
    Valley,
}

/// The three MIDI note control modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMode {
    /// Notes are ignored.
    None,
    /// Silence until a note starts the skidding.
    Trigger,
    /// Unprocessed audio until a note applies the skidding.
    Apply,
}

/// Control settings. The randomizable pairs (rate, floor) carry normalized
/// 0..1 curve positions because their per-cycle random draws interpolate in
/// that space before expanding through the parameter taper.
#[derive(Debug, Clone, Copy)]
pub struct SkidderParams {
    pub tempo_sync: bool,
    /// Position of the cycle rate on its 0.3 to 21 Hz power curve.
    pub rate_hz_gen: f32,
    /// Lower bound for rate randomization; at or above the rate disables it.
    pub rate_rand_min_hz_gen: f32,
    /// Beat-division index into the tempo rate table when synced.
    pub rate_index: usize,
    pub rate_rand_min_index: usize,
    /// Fraction of each cycle spent audible, 0.001 to 0.999.
    pub pulsewidth: f32,
    pub pulsewidth_rand_min: f32,
    pub slope_seconds: f32,
    /// Width of the random stereo pan throw, 0 to 1.
    pub pan_width: f32,
    /// Amount of rupture noise in the valleys, 0 to 1.
    pub noise: f32,
    /// Position of the gate floor on its cubed curve.
    pub floor_gen: f32,
    pub floor_rand_min_gen: f32,
    pub midi_mode: MidiMode,
    /// Map note velocity onto the gate floor.
    pub use_velocity: bool,
    pub use_host_tempo: bool,
    pub tempo_bpm: f64,
}

impl Default for SkidderParams {
    fn default() -> Self {
        Self {
            tempo_sync: false,
            // about 3 Hz on the power curve
            rate_hz_gen: 0.291,
            rate_rand_min_hz_gen: 0.291,
            rate_index: 7,
            rate_rand_min_index: 7,
            pulsewidth: 0.5,
            pulsewidth_rand_min: 0.5,
            slope_seconds: 0.003,
            pan_width: 0.0,
            noise: 0.0,
            floor_gen: 0.0,
            floor_rand_min_gen: 0.0,
            midi_mode: MidiMode::None,
            use_velocity: false,
            use_host_tempo: true,
            tempo_bpm: 120.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Skidder {
    pub params: SkidderParams,
    pub midi: MidiState,
    sample_rate: SampleRate,
    rng: Lcg,
    rate_table: TempoRateTable,

    state: SkidState,
    cycle_samples: i64,
    pulse_samples: i64,
    slope_samples: i64,
    slope_dur: i64,
    plateau_samples: i64,
    valley_samples: i64,
    // the scalar for each step of the fade during a slope in or out
    slope_step: f32,
    sample_amp: f32,
    pan_gain_left: f32,
    pan_gain_right: f32,
    rms: f32,
    rms_count: i64,

    random_floor: f32,
    random_gain_range: f32,

    current_tempo_bps: f32,
    // true when playback has just started up again
    need_resync: bool,

    // parameter values latched once per block
    floor: f32,
    gain_range: f32,
    use_random_floor: bool,
    use_random_rate: bool,
    use_random_pulsewidth: bool,
    rate_hz: f32,
    rate_sync_scalar: f64,

    // MIDI note state
    note_table: [i32; NUM_NOTES],
    most_recent_velocity: i32,
    wait_samples: i64,
    // set when notes start or stop so that the gate floor goes to silence
    midi_in: bool,
    midi_out: bool,
}

impl Skidder {
    pub fn new(sample_rate: SampleRate) -> Self {
        let mut skidder = Self {
            params: SkidderParams::default(),
            midi: MidiState::new(),
            sample_rate,
            rng: Lcg::default(),
            rate_table: TempoRateTable::new(TempoRates::Normal),
            state: SkidState::Valley,
            cycle_samples: 0,
            pulse_samples: 0,
            slope_samples: 0,
            slope_dur: 0,
            plateau_samples: 0,
            valley_samples: 0,
            slope_step: 0.0,
            sample_amp: 0.0,
            pan_gain_left: 1.0,
            pan_gain_right: 1.0,
            rms: 0.0,
            rms_count: 0,
            random_floor: 0.0,
            random_gain_range: 1.0,
            current_tempo_bps: 2.0,
            need_resync: false,
            floor: 0.0,
            gain_range: 1.0,
            use_random_floor: false,
            use_random_rate: false,
            use_random_pulsewidth: false,
            rate_hz: 3.0,
            rate_sync_scalar: 1.0,
            note_table: [0; NUM_NOTES],
            most_recent_velocity: 127,
            wait_samples: 0,
            midi_in: false,
            midi_out: false,
        };
        skidder.reset();
        skidder
    }

    pub fn set_sample_rate(&mut self, sample_rate: SampleRate) {
        self.sample_rate = sample_rate;
    }

    /// Reseed the cycle randomization, pan throw and rupture noise.
    pub fn reseed(&mut self, seed: u32) {
        self.rng = Lcg::new(seed);
    }

    /// Start a fresh skid cycle with all note and smoothing state cleared.
    pub fn reset(&mut self) {
        self.state = SkidState::Valley;
        self.valley_samples = 0;
        self.pan_gain_left = 1.0;
        self.pan_gain_right = 1.0;
        self.rms = 0.0;
        self.rms_count = 0;
        self.random_floor = 0.0;
        self.random_gain_range = 1.0;
        // the host may reset right before restarting playback
        self.need_resync = true;
        self.note_table.fill(0);
        self.wait_samples = 0;
        self.midi_in = false;
        self.midi_out = false;
        self.most_recent_velocity = 127;
        self.midi.reset();
    }

    fn latch_parameters(&mut self) {
        self.floor = math::expand_cubed(f64::from(self.params.floor_gen), 0.0, 1.0) as f32;
        self.gain_range = 1.0 - self.floor;
        self.use_random_floor = self.params.floor_rand_min_gen < self.params.floor_gen;

        self.rate_hz = math::expand_pow(
            f64::from(self.params.rate_hz_gen),
            RATE_CURVE,
            RATE_MIN_HZ,
            RATE_MAX_HZ,
        ) as f32;
        self.rate_sync_scalar = self.rate_table.scalar(self.params.rate_index);
        self.use_random_rate = if self.params.tempo_sync {
            self.params.rate_rand_min_index < self.params.rate_index
        } else {
            self.params.rate_rand_min_hz_gen < self.params.rate_hz_gen
        };
        self.use_random_pulsewidth = self.params.pulsewidth_rand_min < self.params.pulsewidth;
    }

    /// Process one block, replacing the output. `time_info` should already
    /// be resolved for this block.
    pub fn process(&mut self, input: &[&[f32]], output: &mut [&mut [f32]], time_info: &TimeInfo) {
        if input.is_empty() || output.is_empty() {
            return;
        }
        let total_frames = output[0].len();

        self.latch_parameters();
        self.process_midi_notes();

        let note_is_on = self.note_table.iter().any(|&velocity| velocity != 0);
        let mut start_frame: usize = 0;
        let mut end_frame: usize = total_frames;

        match self.params.midi_mode {
            MidiMode::Trigger => {
                // if wait_samples is zero we can just move ahead normally
                if note_is_on && self.wait_samples != 0 {
                    // the skipped-over part has to be silent
                    let wait = (self.wait_samples as usize).min(total_frames);
                    for channel in output.iter_mut().take(2) {
                        channel[..wait].fill(0.0);
                    }
                    start_frame = wait;
                    self.wait_samples = 0;
                } else if !note_is_on {
                    if self.wait_samples > total_frames as i64 {
                        // mid-plateau with a slow cycle, the release outlives
                        // this block
                        self.wait_samples -= total_frames as i64;
                    } else {
                        let wait = (self.wait_samples.max(0) as usize).min(total_frames);
                        for channel in output.iter_mut().take(2) {
                            channel[wait..].fill(0.0);
                        }
                        end_frame = wait;
                        self.wait_samples = 0;
                    }
                }
                if self.params.use_velocity {
                    self.apply_velocity_floor();
                }
            }

            MidiMode::Apply => {
                if note_is_on && self.wait_samples != 0 {
                    // the skipped-over part has to be unprocessed audio
                    let wait = (self.wait_samples as usize).min(total_frames);
                    self.copy_input_region(input, output, 0, wait);
                    start_frame = wait;
                    self.wait_samples = 0;
                } else if !note_is_on {
                    if self.wait_samples != 0 {
                        if self.wait_samples > total_frames as i64 {
                            self.wait_samples -= total_frames as i64;
                        } else {
                            let wait = (self.wait_samples.max(0) as usize).min(total_frames);
                            self.copy_input_region(input, output, wait, total_frames);
                            end_frame = wait;
                            self.wait_samples = 0;
                        }
                    } else {
                        // no notes at all, just pass the input through
                        self.copy_input_region(input, output, 0, total_frames);
                        return;
                    }
                }
                if self.params.use_velocity {
                    self.apply_velocity_floor();
                }
            }

            MidiMode::None => {}
        }

        // figure out the current tempo if we're doing tempo sync
        if self.params.tempo_sync {
            if self.params.use_host_tempo && time_info.tempo_is_valid {
                self.current_tempo_bps = time_info.tempo_bps as f32;
                // playback just restarted, so resynchronize with the bars
                if time_info.playback_changed {
                    self.need_resync = true;
                    self.state = SkidState::Valley;
                    self.valley_samples = 0;
                }
            } else {
                self.current_tempo_bps = (self.params.tempo_bpm / 60.0) as f32;
                self.need_resync = false;
            }
        } else {
            self.need_resync = false;
        }

        let num_inputs = input.len();
        if output.len() >= 2 {
            for frame in start_frame..end_frame {
                let in_left = input[0][frame];
                let in_right = if num_inputs < 2 {
                    input[0][frame]
                } else {
                    input[1][frame]
                };
                self.step_state(in_left, in_right, time_info);
                output[0][frame] = self.process_output(in_left, in_right, self.pan_gain_left);
                output[1][frame] = self.process_output(in_right, in_left, self.pan_gain_right);
            }
        } else {
            for frame in start_frame..end_frame {
                let in_mono = input[0][frame];
                self.step_state(in_mono, in_mono, time_info);
                output[0][frame] = self.process_output(in_mono, in_mono, 1.0);
            }
        }
    }

    // advance the skid cycle by one sample, accumulating RMS while audible
    #[inline]
    fn step_state(&mut self, in1: f32, in2: f32, time_info: &TimeInfo) {
        match self.state {
            SkidState::SlopeIn => {
                self.rms += (in1 * in1) + (in2 * in2);
                self.rms_count += 1;
                self.process_slope_in();
            }
            SkidState::Plateau => {
                self.rms += (in1 * in1) + (in2 * in2);
                self.rms_count += 1;
                self.process_plateau();
            }
            SkidState::SlopeOut => self.process_slope_out(),
            SkidState::Valley => self.process_valley(time_info),
        }
    }

    fn process_slope_in(&mut self) {
        // dividing the growing count by the duration makes ascending values
        if self.midi_in {
            match self.params.midi_mode {
                // start from a 0.0 floor when coming in from silence
                MidiMode::Trigger => {
                    self.sample_amp =
                        ((self.slope_dur - self.slope_samples) as f32) * self.slope_step;
                }
                // no fade-in for the first entry of MIDI apply
                MidiMode::Apply => self.sample_amp = 1.0,
                MidiMode::None => {}
            }
        } else if self.use_random_floor {
            self.sample_amp = ((self.slope_dur - self.slope_samples) as f32)
                * self.slope_step
                * self.random_gain_range
                + self.random_floor;
        } else {
            self.sample_amp = ((self.slope_dur - self.slope_samples) as f32)
                * self.slope_step
                * self.gain_range
                + self.floor;
        }

        self.slope_samples -= 1;
        if self.slope_samples <= 0 {
            self.state = SkidState::Plateau;
            self.midi_in = false;
        }
    }

    fn process_plateau(&mut self) {
        // in case there was no slope-in
        self.midi_in = false;

        // the plateau passes audio unaffected
        self.sample_amp = 1.0;

        self.plateau_samples -= 1;
        if self.plateau_samples <= 0 {
            // average, then take the square root of the squared samples,
            // for the RMS value
            self.rms = (self.rms / ((self.rms_count * 2) as f32)).sqrt();
            // RMS tends to stay below 0.5, which cheats rupture of its range
            self.rms *= 2.0;
            if self.rms > 1.0 || self.rms < 0.0 {
                self.rms = 1.0;
            }
            self.rms_count = 0;

            // set up the random floor values
            self.random_floor = math::expand_cubed(
                f64::from(
                    self.rng
                        .next_in_range(self.params.floor_rand_min_gen, self.params.floor_gen),
                ),
                0.0,
                1.0,
            ) as f32;
            self.random_gain_range = 1.0 - self.random_floor;

            if self.slope_dur > 0 {
                self.state = SkidState::SlopeOut;
                self.slope_samples = self.slope_dur;
                self.slope_step = 1.0 / (self.slope_dur as f32);
            } else {
                self.state = SkidState::Valley;
            }
        }
    }

    fn process_slope_out(&mut self) {
        // dividing the decrementing count by the duration makes descending
        // values
        if self.midi_out && self.params.midi_mode == MidiMode::Trigger {
            self.sample_amp = (self.slope_samples as f32) * self.slope_step;
        } else if self.use_random_floor {
            self.sample_amp = (self.slope_samples as f32) * self.slope_step
                * self.random_gain_range
                + self.random_floor;
        } else {
            self.sample_amp =
                (self.slope_samples as f32) * self.slope_step * self.gain_range + self.floor;
        }

        self.slope_samples -= 1;
        if self.slope_samples <= 0 {
            self.state = SkidState::Valley;
            self.midi_out = false;
        }
    }

    fn process_valley(&mut self, time_info: &TimeInfo) {
        if self.midi_in {
            match self.params.midi_mode {
                // trigger mode begins with one sample of valley, silence it
                MidiMode::Trigger => self.sample_amp = 0.0,
                // apply mode begins with one sample of valley, full gain
                MidiMode::Apply => self.sample_amp = 1.0,
                MidiMode::None => {}
            }
        } else if self.use_random_floor {
            self.sample_amp = self.random_floor;
        } else {
            self.sample_amp = self.floor;
        }

        self.valley_samples -= 1;
        if self.valley_samples <= 0 {
            // the valley is over, so its noise scalar is finished too
            self.rms = 0.0;

            // figure out how many samples long each envelope section is
            // for the next skid cycle
            let mut bar_sync = false;
            let cycle_rate: f32;
            if self.params.tempo_sync {
                let rate_scalar = if self.use_random_rate {
                    // no bar sync when the skid durations are random
                    self.need_resync = false;
                    self.rate_table.scalar(self.rng.next_in_range(
                        self.params.rate_rand_min_index as f32,
                        self.params.rate_index as f32 + 0.99,
                    ) as usize)
                } else {
                    self.rate_sync_scalar
                };
                cycle_rate = (rate_scalar as f32) * self.current_tempo_bps;
                if self.need_resync && self.params.midi_mode == MidiMode::None {
                    bar_sync = true;
                }
            } else if self.use_random_rate {
                cycle_rate = math::expand_pow(
                    f64::from(self.rng.next_in_range(
                        self.params.rate_rand_min_hz_gen,
                        self.params.rate_hz_gen,
                    )),
                    RATE_CURVE,
                    RATE_MIN_HZ,
                    RATE_MAX_HZ,
                ) as f32;
            } else {
                cycle_rate = self.rate_hz;
            }
            self.need_resync = false;

            let sample_rate = self.sample_rate.sample_rate_hz;
            self.cycle_samples = (((sample_rate as f32) / cycle_rate) as i64).max(1);
            self.pulse_samples = if self.use_random_pulsewidth {
                ((self.cycle_samples as f32)
                    * self
                        .rng
                        .next_in_range(self.params.pulsewidth_rand_min, self.params.pulsewidth))
                    as i64
            } else {
                ((self.cycle_samples as f32) * self.params.pulsewidth) as i64
            };
            self.valley_samples = self.cycle_samples - self.pulse_samples;
            self.slope_samples = (sample_rate * f64::from(self.params.slope_seconds)) as i64;
            self.slope_dur = self.slope_samples;
            self.slope_step = 1.0 / (self.slope_dur as f32);
            self.plateau_samples = self.pulse_samples - (self.slope_samples * 2);
            if self.plateau_samples < 1 {
                // the slopes shrink to a third of the pulse when the user
                // sets the slope too long for the pulse
                self.slope_samples = ((self.pulse_samples as f32) / 3.0) as i64;
                self.slope_dur = self.slope_samples;
                self.slope_step = 1.0 / (self.slope_dur as f32);
                self.plateau_samples = self.pulse_samples - (self.slope_samples * 2);
            }

            // go to slope-in next unless the slope is zero
            self.state = if self.slope_dur > 0 {
                SkidState::SlopeIn
            } else {
                SkidState::Plateau
            };

            if bar_sync && time_info.samples_to_next_bar_is_valid {
                // adjust this cycle so that a skid syncs with the next bar
                let countdown = time_info.samples_to_next_bar % self.cycle_samples;
                // skip straight to the valley and adjust its length,
                // or trim the plateau if the shortened skid still fits one
                if countdown <= self.valley_samples + (self.slope_samples * 2) {
                    self.valley_samples = countdown;
                    self.state = SkidState::Valley;
                } else {
                    self.plateau_samples -= self.cycle_samples - countdown;
                }
            }

            // if MIDI apply mode is just beginning, keep things smooth
            // with no panning
            if self.midi_in && self.params.midi_mode == MidiMode::Apply {
                self.pan_gain_left = 1.0;
                self.pan_gain_right = 1.0;
            } else {
                let pan_rander = self.rng.next_bipolar();
                // (pan_rander * width) + 1 ranges from 0.0 to 2.0
                self.pan_gain_left = (pan_rander * self.params.pan_width) + 1.0;
                self.pan_gain_right = 2.0 - ((pan_rander * self.params.pan_width) + 1.0);
            }
        }
    }

    fn process_output(&mut self, in1: f32, in2: f32, pan_gain: f32) -> f32 {
        // the valley outputs rupture noise when that is enabled, scaled by
        // the random pan, the noise amount and the RMS of the last pulse
        if self.state == SkidState::Valley && self.params.noise != 0.0 {
            return self.rng.next_bipolar() * pan_gain * self.params.noise * self.rms;
        }

        // regular skidding output
        if pan_gain <= 1.0 {
            // only output a portion of the first input
            in1 * pan_gain * self.sample_amp
        } else {
            // all of the first input plus a portion of the second
            (in1 + (in2 * (pan_gain - 1.0))) * self.sample_amp
        }
    }

    // MIDI note bookkeeping, walked once per block before rendering
    fn process_midi_notes(&mut self) {
        if self.midi.block_events().is_empty() {
            return;
        }
        self.midi.preprocess_events();

        for index in 0..self.midi.block_events().len() {
            let event = self.midi.block_events()[index];
            match event.kind {
                MidiEventKind::NoteOn => {
                    let note = event.byte1 as usize;
                    if event.byte2 > 0 {
                        self.note_table[note] = event.byte2;
                        self.most_recent_velocity = event.byte2;
                        // if several note-ons land in one block, only the
                        // last one is effective, which is close enough
                        self.note_on(event.delta_frames);
                    } else {
                        // a zero-velocity note-on is a note-off
                        self.note_table[note] = 0;
                    }
                }
                MidiEventKind::NoteOff => {
                    self.note_table[event.byte1 as usize] = 0;
                }
                MidiEventKind::AllNotesOff => {
                    self.note_table.fill(0);
                    self.note_off();
                }
                _ => {}
            }
        }
        self.midi.postprocess_events();

        // if every note got turned off during this block, wind the gate down
        if self.note_table.iter().all(|&velocity| velocity == 0) {
            self.note_off();
        }
    }

    fn note_on(&mut self, delta_frames: usize) {
        match self.params.midi_mode {
            MidiMode::Trigger | MidiMode::Apply => {
                self.wait_samples = delta_frames as i64;
                self.state = SkidState::Valley;
                self.valley_samples = 0;
                self.midi_in = true;
            }
            MidiMode::None => {}
        }
    }

    fn note_off(&mut self) {
        match self.params.midi_mode {
            MidiMode::Trigger => {
                match self.state {
                    SkidState::SlopeIn => {
                        // turn the fade-in around into a fade-out
                        self.state = SkidState::SlopeOut;
                        self.slope_samples = self.slope_dur - self.slope_samples;
                        self.wait_samples = self.slope_samples;
                    }
                    SkidState::Plateau => {
                        self.plateau_samples = 1;
                        self.wait_samples = self.slope_dur + 1;
                    }
                    SkidState::SlopeOut => self.wait_samples = self.slope_samples,
                    SkidState::Valley => self.wait_samples = 0,
                }
                self.midi_out = true;
                if self.midi_in {
                    // in case we're still in a MIDI-in phase,
                    // it won't get cleared otherwise
                    self.midi_in = false;
                } else if self.state == SkidState::SlopeOut && self.floor > 0.0 {
                    // with a raised floor the slope position needs rescaling
                    self.slope_samples = ((((self.slope_samples as f32) * self.slope_step
                        * self.gain_range)
                        + self.floor)
                        * (self.slope_dur as f32)) as i64;
                    self.wait_samples = self.slope_samples;
                }
                if self.wait_samples < 0 {
                    self.wait_samples = 0;
                }
            }

            MidiMode::Apply => {
                match self.state {
                    SkidState::SlopeIn => self.wait_samples = self.slope_samples,
                    SkidState::Plateau => self.wait_samples = 0,
                    SkidState::SlopeOut => {
                        // turn the fade-out around into a fade-in
                        self.state = SkidState::SlopeIn;
                        self.slope_samples = self.slope_dur - self.slope_samples;
                        self.wait_samples = self.slope_samples;
                    }
                    SkidState::Valley => {
                        self.valley_samples = 1;
                        self.wait_samples = self.slope_dur + 1;
                    }
                }
                self.midi_out = true;
                if self.midi_in {
                    self.midi_in = false;
                }
                if self.wait_samples < 0 {
                    self.wait_samples = 0;
                }
            }

            MidiMode::None => {}
        }
    }

    fn apply_velocity_floor(&mut self) {
        self.floor = math::expand_cubed(
            f64::from(127 - self.most_recent_velocity) / 127.0,
            0.0,
            1.0,
        ) as f32;
        self.gain_range = 1.0 - self.floor;
        self.use_random_floor = false;
    }

    fn copy_input_region(
        &self,
        input: &[&[f32]],
        output: &mut [&mut [f32]],
        start_frame: usize,
        end_frame: usize,
    ) {
        for (channel, out) in output.iter_mut().take(2).enumerate() {
            let source = input[channel.min(input.len() - 1)];
            out[start_frame..end_frame].copy_from_slice(&source[start_frame..end_frame]);
        }
    }
}
