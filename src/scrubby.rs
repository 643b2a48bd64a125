//! A speed-warped buffer scrubber.
//!
//! Incoming audio streams into a long ring buffer while a playback head
//! repeatedly seeks toward randomly chosen target positions within the
//! seek range, reading faster, slower or backwards as the distance
//! demands. Robot mode jumps straight to each new speed (optionally
//! constrained to semitone steps, with MIDI notes toggling the allowed
//! steps), while DJ mode glides between speeds with an exponential
//! portamento. Each channel can scrub independently or follow the first.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use crate::math;
use crate::midi::{MidiEventKind, MidiState};
use crate::random::Lcg;
use crate::tempo::{TempoRateTable, TempoRates, TimeInfo};
use crate::SampleRate;

#[allow(unused_imports)]
use num_traits::float::Float;

/// The number of semitones in an octave.
pub const NUM_PITCH_STEPS: usize = 12;

pub const OCTAVE_MIN: i64 = -5;
pub const OCTAVE_MAX: i64 = 7;

pub const SEEK_RANGE_MIN_MS: f64 = 0.3;
pub const SEEK_RANGE_MAX_MS: f64 = 6000.0;
pub const SEEK_RATE_MIN_HZ: f64 = 0.3;
pub const SEEK_RATE_MAX_HZ: f64 = 810.0;

// ln(2^(1/12)), for converting a speed scalar into semitones
const LN_2_TO_1_12TH: f64 = 0.057_762_265_046_662_109;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedMode {
    /// Jump directly to each new speed.
    Robot,
    /// Glide to each new speed like a turntable catching up.
    Dj,
}

/// Control settings. The seek rate carries a normalized 0..1 position on
/// its logarithmic Hz curve so that randomization interpolates in curve
/// space, like the tempo-synced variant does with rate table indices.
#[derive(Debug, Clone, Copy)]
pub struct ScrubbyParams {
    pub seek_range_ms: f64,
    /// Suspend writing into the ring so the head scrubs frozen audio.
    pub freeze: bool,
    /// Position of the free seek rate on its 0.3 to 810 Hz log curve.
    pub seek_rate_hz_gen: f64,
    pub seek_rate_rand_min_hz_gen: f64,
    /// Beat-division index into the tempo rate table when synced.
    pub seek_rate_index: usize,
    pub seek_rate_rand_min_index: usize,
    pub tempo_sync: bool,
    /// Fraction of each seek cycle spent moving, 0.03 to 1.
    pub seek_dur: f64,
    pub seek_dur_rand_min: f64,
    pub speed_mode: SpeedMode,
    /// Give every channel its own seek targets.
    pub split_channels: bool,
    /// Constrain robot mode speeds to the enabled semitone steps.
    pub pitch_constraint: bool,
    pub pitch_steps: [bool; NUM_PITCH_STEPS],
    pub octave_min: i64,
    pub octave_max: i64,
    pub tempo_bpm: f64,
    pub use_host_tempo: bool,
    /// Fraction of the seek range reported as latency, 0 to 1.
    pub predelay: f64,
}

impl Default for ScrubbyParams {
    fn default() -> Self {
        let mut pitch_steps = [false; NUM_PITCH_STEPS];
        pitch_steps[0] = true;
        Self {
            seek_range_ms: 333.0,
            freeze: false,
            // about 9 Hz on the log curve
            seek_rate_hz_gen: 0.4305,
            seek_rate_rand_min_hz_gen: 1.0,
            seek_rate_index: 7,
            seek_rate_rand_min_index: 23,
            tempo_sync: false,
            seek_dur: 1.0,
            seek_dur_rand_min: 1.0,
            speed_mode: SpeedMode::Robot,
            split_channels: false,
            pitch_constraint: false,
            pitch_steps,
            octave_min: OCTAVE_MIN,
            octave_max: OCTAVE_MAX,
            tempo_bpm: 120.0,
            use_host_tempo: true,
            predelay: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Scrubby {
    pub params: ScrubbyParams,
    pub midi: MidiState,
    sample_rate: SampleRate,
    rng: Lcg,
    rate_table: TempoRateTable,

    buffers: Vec<Box<[f32]>>,
    capacity: usize,
    capacity_f: f64,
    write_pos: usize,
    read_pos: Vec<f64>,
    read_step: Vec<f64>,
    portamento_step: Vec<f64>,
    move_count: Vec<i64>,
    seek_count: Vec<i64>,
    // true when playback has just started up again
    need_resync: Vec<bool>,

    current_tempo_bps: f64,
    // how many keys are holding each note of the octave
    active_notes: [i64; NUM_PITCH_STEPS],
    notes_were_already_active: bool,

    // parameter values latched once per block
    seek_range_seconds: f64,
    seek_rate_hz: f64,
    seek_rate_rand_min_hz: f64,
    seek_rate_sync_scalar: f64,
    seek_rate_rand_min_sync_scalar: f64,
    use_seek_rate_rand_min: bool,
    use_seek_dur_rand_min: bool,
    prev_seek_rate_index: usize,
    prev_tempo_sync: bool,
    prev_pitch_steps: [bool; NUM_PITCH_STEPS],
}

impl Scrubby {
    pub fn new(sample_rate: SampleRate, num_channels: usize) -> Self {
        let num_channels = num_channels.max(1);
        // the maximum seek range over the slowest seek rate,
        // for extra leeway while moving
        let capacity = (SEEK_RANGE_MAX_MS * 0.001 * sample_rate.sample_rate_hz
            / SEEK_RATE_MIN_HZ) as usize;
        let params = ScrubbyParams::default();
        Self {
            params,
            midi: MidiState::new(),
            sample_rate,
            rng: Lcg::default(),
            rate_table: TempoRateTable::new(TempoRates::Normal),
            buffers: (0..num_channels)
                .map(|_| vec![0.0; capacity].into_boxed_slice())
                .collect(),
            capacity,
            capacity_f: capacity as f64,
            write_pos: 0,
            read_pos: vec![0.001; num_channels],
            read_step: vec![1.0; num_channels],
            portamento_step: vec![1.0; num_channels],
            move_count: vec![0; num_channels],
            seek_count: vec![0; num_channels],
            need_resync: vec![true; num_channels],
            current_tempo_bps: params.tempo_bpm / 60.0,
            active_notes: [0; NUM_PITCH_STEPS],
            notes_were_already_active: false,
            seek_range_seconds: params.seek_range_ms * 0.001,
            seek_rate_hz: 0.0,
            seek_rate_rand_min_hz: 0.0,
            seek_rate_sync_scalar: 1.0,
            seek_rate_rand_min_sync_scalar: 1.0,
            use_seek_rate_rand_min: false,
            use_seek_dur_rand_min: false,
            prev_seek_rate_index: params.seek_rate_index,
            prev_tempo_sync: params.tempo_sync,
            prev_pitch_steps: params.pitch_steps,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: SampleRate) {
        self.sample_rate = sample_rate;
        let capacity = (SEEK_RANGE_MAX_MS * 0.001 * sample_rate.sample_rate_hz
            / SEEK_RATE_MIN_HZ) as usize;
        if capacity != self.capacity {
            self.capacity = capacity;
            self.capacity_f = capacity as f64;
            for buffer in self.buffers.iter_mut() {
                *buffer = vec![0.0; capacity].into_boxed_slice();
            }
        }
        self.reset();
    }

    /// Reseed the target, rate and duration randomization.
    pub fn reseed(&mut self, seed: u32) {
        self.rng = Lcg::new(seed);
    }

    /// Clear the rings and return every head to a forward unity crawl.
    pub fn reset(&mut self) {
        self.write_pos = 0;
        for step in 0..NUM_PITCH_STEPS {
            // let go of any pitch steps that MIDI notes were holding down
            if self.active_notes[step] > 0 {
                self.params.pitch_steps[step] = false;
                self.prev_pitch_steps[step] = false;
            }
            self.active_notes[step] = 0;
        }
        for buffer in self.buffers.iter_mut() {
            buffer.fill(0.0);
        }
        self.read_pos.fill(0.001);
        self.read_step.fill(1.0);
        self.portamento_step.fill(1.0);
        self.move_count.fill(0);
        self.seek_count.fill(0);
        // some hosts may call reset when restarting playback
        self.need_resync.fill(true);
        self.midi.reset();
    }

    /// The delay compensation to report to the host.
    pub fn latency_samples(&self) -> usize {
        (self.params.seek_range_ms * 0.001
            * self.sample_rate.sample_rate_hz
            * self.params.predelay) as usize
    }

    fn latch_parameters(&mut self) {
        self.seek_range_seconds = self.params.seek_range_ms * 0.001;
        self.seek_rate_hz = math::expand_log(
            self.params.seek_rate_hz_gen,
            SEEK_RATE_MIN_HZ,
            SEEK_RATE_MAX_HZ,
        );
        self.seek_rate_rand_min_hz = math::expand_log(
            self.params.seek_rate_rand_min_hz_gen,
            SEEK_RATE_MIN_HZ,
            SEEK_RATE_MAX_HZ,
        );
        self.seek_rate_sync_scalar = self.rate_table.scalar(self.params.seek_rate_index);
        self.seek_rate_rand_min_sync_scalar =
            self.rate_table.scalar(self.params.seek_rate_rand_min_index);

        let mut arm_resync = false;
        // make sure the cycles match up if the tempo rate has changed
        if self.params.seek_rate_index != self.prev_seek_rate_index {
            arm_resync = true;
        }
        // resync if tempo sync mode has just been switched on
        if self.params.tempo_sync && !self.prev_tempo_sync {
            arm_resync = true;
        }
        self.prev_seek_rate_index = self.params.seek_rate_index;
        self.prev_tempo_sync = self.params.tempo_sync;
        self.need_resync.fill(arm_resync);

        for step in 0..NUM_PITCH_STEPS {
            // manual pitch step changes override MIDI notes
            if self.params.pitch_steps[step] != self.prev_pitch_steps[step] {
                self.active_notes[step] = 0;
                self.prev_pitch_steps[step] = self.params.pitch_steps[step];
            }
        }

        self.use_seek_rate_rand_min = if self.params.tempo_sync {
            self.seek_rate_rand_min_sync_scalar < self.seek_rate_sync_scalar
        } else {
            self.seek_rate_rand_min_hz < self.seek_rate_hz
        };
        self.use_seek_dur_rand_min = self.params.seek_dur_rand_min < self.params.seek_dur;
    }

    /// Process one block, replacing the output. `time_info` should already
    /// be resolved for this block.
    pub fn process(&mut self, input: &[&[f32]], output: &mut [&mut [f32]], time_info: &TimeInfo) {
        if input.is_empty() || output.is_empty() {
            return;
        }
        let num_channels = self.buffers.len().min(output.len());
        let total_frames = output[0].len();

        self.latch_parameters();
        self.process_midi_notes();
        self.check_tempo_sync(time_info, num_channels);

        // if the previous block had no pitch steps active and new notes
        // have begun, start new seeks so that sound returns immediately
        let any_steps_active = self.params.pitch_steps.iter().any(|&active| active);
        if self.params.pitch_constraint
            && self.params.speed_mode == SpeedMode::Robot
            && !self.notes_were_already_active
            && any_steps_active
        {
            self.seek_count.fill(0);
        }
        self.notes_were_already_active = any_steps_active;

        for frame in 0..total_frames {
            // update the rings with the latest samples
            if !self.params.freeze {
                for channel in 0..num_channels {
                    let source = input[channel.min(input.len() - 1)];
                    self.buffers[channel][self.write_pos] = source[frame];
                }
            }

            for channel in 0..num_channels {
                output[channel][frame] =
                    math::interpolate_hermite(&self.buffers[channel], self.read_pos[channel]);
            }

            if !self.params.freeze {
                self.write_pos = (self.write_pos + 1) % self.capacity;
            }
            for channel in 0..num_channels {
                self.seek_count[channel] -= 1;
                self.move_count[channel] -= 1;
            }

            // time to find a new target to seek
            if self.seek_count[0] < 0 {
                self.generate_new_target(0, time_info);

                // copy the first channel's fresh seek state across
                // in unified channels mode
                if !self.params.split_channels {
                    for channel in 1..num_channels {
                        self.read_pos[channel] = self.read_pos[0];
                        self.read_step[channel] = self.read_step[0];
                        self.portamento_step[channel] = self.portamento_step[0];
                        self.seek_count[channel] = self.seek_count[0];
                        self.move_count[channel] = self.move_count[0];
                        self.need_resync[channel] = self.need_resync[0];
                    }
                }
            }
            if self.params.split_channels {
                for channel in 1..num_channels {
                    if self.seek_count[channel] < 0 {
                        self.generate_new_target(channel, time_info);
                    }
                }
            }

            // the heads only move while still seeking toward the target
            for channel in 0..num_channels {
                if self.move_count[channel] >= 0 {
                    if self.params.speed_mode == SpeedMode::Dj {
                        self.read_step[channel] *= self.portamento_step[channel];
                    }
                    self.read_pos[channel] += self.read_step[channel];
                    let read_pos_int = self.read_pos[channel] as i64;
                    if read_pos_int >= self.capacity as i64 {
                        self.read_pos[channel] %= self.capacity_f;
                    } else if read_pos_int < 0 {
                        while self.read_pos[channel] < 0.0 {
                            self.read_pos[channel] += self.capacity_f;
                        }
                    }
                }
            }
        }
    }

    // figure out the current tempo and pending resyncs for this block
    fn check_tempo_sync(&mut self, time_info: &TimeInfo, num_channels: usize) {
        if self.params.tempo_sync {
            if self.params.use_host_tempo && time_info.tempo_is_valid {
                self.current_tempo_bps = time_info.tempo_bps;
                // if playback just restarted, resync for measure alignment
                if time_info.playback_changed {
                    self.need_resync.fill(true);
                }
            } else {
                self.current_tempo_bps = self.params.tempo_bpm / 60.0;
                self.need_resync.fill(false);
            }
        } else {
            self.need_resync.fill(false);
        }

        for channel in 0..num_channels {
            if self.need_resync[channel] {
                self.seek_count[channel] = 0;
            }
        }
    }

    fn generate_new_target(&mut self, channel: usize, time_info: &TimeInfo) {
        let sample_rate = self.sample_rate.sample_rate_hz;

        // the length of this seek cycle
        let current_seek_rate = if self.params.tempo_sync {
            let rate_scalar = if self.use_seek_rate_rand_min {
                // no musical bar sync when the tempo rate is randomized
                self.need_resync[channel] = false;
                self.rate_table.scalar(self.rng.next_in_range(
                    self.params.seek_rate_rand_min_index as f32,
                    self.params.seek_rate_index as f32 + 0.99,
                ) as usize)
            } else {
                self.seek_rate_sync_scalar
            };
            rate_scalar * self.current_tempo_bps
        } else if self.use_seek_rate_rand_min {
            math::expand_log(
                f64::from(self.rng.next_in_range(
                    self.params.seek_rate_rand_min_hz_gen as f32,
                    self.params.seek_rate_hz_gen as f32,
                )),
                SEEK_RATE_MIN_HZ,
                SEEK_RATE_MAX_HZ,
            )
        } else {
            self.seek_rate_hz
        };
        let mut cycle_dur = 1.0 / current_seek_rate;
        self.seek_count[channel] = (cycle_dur * sample_rate) as i64;

        // musical bar sync trims the first cycle after a resync
        if self.need_resync[channel]
            && time_info.samples_to_next_bar_is_valid
            && self.seek_count[channel] > 0
        {
            let samples_until_bar = time_info.samples_to_next_bar;
            if samples_until_bar > 0 {
                self.seek_count[channel] = match self.params.speed_mode {
                    // doubling the length of the first seek after a resync
                    // keeps DJ mode from lurching at the bar line
                    SpeedMode::Dj => {
                        (samples_until_bar + self.seek_count[channel])
                            % (self.seek_count[channel] * 2)
                    }
                    SpeedMode::Robot => samples_until_bar % self.seek_count[channel],
                };
                cycle_dur = (self.seek_count[channel] as f64) / sample_rate;
            }
        }
        if self.seek_count[channel] < 1 {
            self.seek_count[channel] = 1;
        }

        // the length of the movement within the cycle
        let current_seek_dur = if self.use_seek_dur_rand_min {
            f64::from(self.rng.next_in_range(
                self.params.seek_dur_rand_min as f32,
                self.params.seek_dur as f32,
            ))
        } else {
            self.params.seek_dur
        };
        self.move_count[channel] = (cycle_dur * current_seek_dur * sample_rate) as i64;
        if self.move_count[channel] < 1 {
            self.move_count[channel] = 1;
        }

        // randomly locate a new target position within the seek range,
        // searching back from the current write point
        let seek_range_samples = self.seek_range_seconds * sample_rate;
        let new_target_pos = (self.write_pos as i64)
            - ((seek_range_samples * f64::from(self.rng.next_float())) as i64);
        let mut read_pos_int = self.read_pos[channel] as i64;
        if read_pos_int >= self.write_pos as i64 {
            read_pos_int -= self.capacity as i64;
        }
        let mut target_distance = new_target_pos - read_pos_int;
        if target_distance == 0 {
            target_distance = 1;
        }

        // the step size of playback movement through the ring
        let mut new_read_step = (target_distance as f64) / (self.move_count[channel] as f64);
        if self.params.pitch_constraint && self.params.speed_mode == SpeedMode::Robot {
            new_read_step = self.process_pitch_constraint(new_read_step);
        }

        if self.params.speed_mode == SpeedMode::Dj {
            // exponential acceleration from the old speed to the target
            let move_backwards = new_read_step < 0.0;
            let mut old_read_step = self.read_step[channel].abs();
            if old_read_step < 0.001 {
                old_read_step = 0.001;
            }
            let target_read_step = calculate_target_speed(
                old_read_step,
                self.move_count[channel] as f64,
                target_distance as f64,
            );
            self.portamento_step[channel] = (target_read_step.abs() / old_read_step)
                .powf(1.0 / (self.move_count[channel] as f64))
                .abs();
            new_read_step = if move_backwards {
                -old_read_step
            } else {
                old_read_step
            };
        } else {
            // no acceleration, reach the new speed at once
            self.portamento_step[channel] = 1.0;
        }

        self.read_step[channel] = new_read_step;
        self.need_resync[channel] = false;
    }

    // constrain a read step to the nearest enabled semitone transposition
    fn process_pitch_constraint(&self, read_step: f64) -> f64 {
        let backwards = read_step < 0.0;
        let direction = if backwards { -1.0 } else { 1.0 };

        // with every semitone disabled the playback goes silent
        let no_notes_active = !self.params.pitch_steps.iter().any(|&active| active);
        if no_notes_active {
            return 0.0;
        }

        // the lower bound of the semitone shift that this speed spans,
        // from solving 2^(semitone/12) = step for semitone
        let fsemitone = (read_step.abs().ln() / LN_2_TO_1_12TH).floor();
        // a little bit added to prevent float truncation errors
        let semitone = (fsemitone + 0.1) as i64;

        let mut octave = semitone / 12;
        let mut remainder = semitone % 12;
        // the remainder indexes the pitch steps so it must be positive,
        // compensated by dropping an octave
        if remainder < 0 {
            remainder += 12;
            octave -= 1;
        }

        // search downward from the current step for an enabled one,
        // wrapping past the octave bottom
        let mut semitone = remainder;
        let mut index = remainder;
        loop {
            if self.params.pitch_steps[index as usize] {
                semitone = index;
                break;
            }
            index -= 1;
            if index < 0 {
                index = (NUM_PITCH_STEPS as i64) - 1;
                octave -= 1;
            }
            if index == remainder {
                break;
            }
        }

        // constrain to the octave range, when one is set
        if (self.params.octave_min > OCTAVE_MIN) && (octave < self.params.octave_min) {
            octave = self.params.octave_min;
        } else if (self.params.octave_max < OCTAVE_MAX) && (octave > self.params.octave_max) {
            octave = self.params.octave_max;
        }
        semitone += octave * 12;

        // back to a playback speed scalar, with direction restored
        2.0_f64.powf((semitone as f64) / 12.0) * direction
    }

    // MIDI notes hold down pitch constraint steps, one octave folded
    fn process_midi_notes(&mut self) {
        if self.midi.block_events().is_empty() {
            return;
        }
        self.midi.preprocess_events();

        for index in 0..self.midi.block_events().len() {
            let event = self.midi.block_events()[index];
            let current_note = (event.byte1 as usize) % NUM_PITCH_STEPS;
            match event.kind {
                MidiEventKind::NoteOn => {
                    if self.active_notes[current_note] < 0 {
                        self.active_notes[current_note] = 0;
                    }
                    // the first key playing this note turns its step on
                    if self.active_notes[current_note] == 0 {
                        self.params.pitch_steps[current_note] = true;
                        self.prev_pitch_steps[current_note] = true;
                    }
                    self.active_notes[current_note] += 1;
                }
                MidiEventKind::NoteOff => {
                    // the last key playing this note turns its step off
                    if self.active_notes[current_note] == 1 {
                        self.params.pitch_steps[current_note] = false;
                        self.prev_pitch_steps[current_note] = false;
                    }
                    if self.active_notes[current_note] > 0 {
                        self.active_notes[current_note] -= 1;
                    } else {
                        self.active_notes[current_note] = 0;
                    }
                }
                MidiEventKind::AllNotesOff => {
                    for note in 0..NUM_PITCH_STEPS {
                        if self.active_notes[note] > 0 {
                            self.params.pitch_steps[note] = false;
                            self.prev_pitch_steps[note] = false;
                        }
                        self.active_notes[note] = 0;
                    }
                }
                _ => {}
            }
        }
        self.midi.postprocess_events();
    }
}

// the speed to pass through in order to cover distance k over n samples
// while decelerating smoothly from speed a
fn calculate_target_speed(a: f64, n: f64, k: f64) -> f64 {
    let a = a.abs();
    let n = n.abs();
    let k = k.abs();

    let lambert_input = (n * a) / k;
    let mut b = k * math::lambert_w(lambert_input) / n;
    // the Lambert W evaluation is an approximation, so mop up after it
    if !b.is_finite() {
        b = 1.0;
    }
    if b < 1.0 {
        b = b.powf(0.63);
    }
    b
}
