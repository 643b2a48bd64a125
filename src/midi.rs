//! MIDI event queue, note state table and per-note amplitude envelopes.
//!
//! Events arrive tagged with sample-frame offsets into the current block.
//! The queue is sorted before rendering so that the block splitter can walk
//! it in order and apply each event exactly at its frame.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use spin::Once;

#[allow(unused_imports)]
use num_traits::float::Float;

pub const NUM_NOTES: usize = 128;

// 12th root of 2 and its inverse
pub const NOTE_UP_SCALAR: f64 = 1.059463094359295264561825294946;
pub const NOTE_DOWN_SCALAR: f64 = 0.94387431268169349664191315666792;
pub const MIDI_SCALAR: f32 = 1.0 / 127.0;

pub const PITCHBEND_RANGE_MAX: f64 = 36.0;

pub const NUM_FADE_POINTS: usize = 30000;
const FADE_CURVE: f64 = 2.7;

/// Duration in samples of the quick fade applied to a note that gets
/// retriggered while still releasing.
pub const STOLEN_NOTE_FADE_DUR: usize = 48;
const STOLEN_NOTE_FADE_STEP: f32 = 1.0 / (STOLEN_NOTE_FADE_DUR as f32);
const LEGATO_FADE_DUR: i64 = 39;
const LEGATO_FADE_STEP: f32 = 1.0 / (LEGATO_FADE_DUR as f32);

pub const EVENT_QUEUE_SIZE: usize = 12000;

pub const CC_SUSTAIN_PEDAL: i32 = 0x40;
pub const CC_ALL_NOTES_OFF: i32 = 0x7B;

const INVALID_NOTE: i32 = -1;

static FADE_TABLE: Once<Box<[f32]>> = Once::new();
static NOTE_FREQUENCY_TABLE: Once<[f64; NUM_NOTES]> = Once::new();

fn fade_table() -> &'static [f32] {
    FADE_TABLE.call_once(|| {
        let fade_curve_step = 1.0 / ((NUM_FADE_POINTS - 1) as f64);
        let mut table = vec![0.0_f32; NUM_FADE_POINTS];
        for (i, point) in table.iter_mut().enumerate() {
            *point = ((i as f64) * fade_curve_step).powf(FADE_CURVE) as f32;
            // zero any near-denormal values
            if *point < 1.0e-15 {
                *point = 0.0;
            }
        }
        table.into_boxed_slice()
    })
}

fn note_frequency_table() -> &'static [f64; NUM_NOTES] {
    NOTE_FREQUENCY_TABLE.call_once(|| {
        let mut table = [0.0_f64; NUM_NOTES];
        // start from low A at 6.875 Hz and go up 3 semitones to C,
        // the frequency of MIDI note 0
        let mut frequency = 6.875 * NOTE_UP_SCALAR * NOTE_UP_SCALAR * NOTE_UP_SCALAR;
        for entry in table.iter_mut() {
            *entry = frequency;
            frequency *= NOTE_UP_SCALAR;
        }
        table
    })
}

/// The frequency in Hz of a MIDI note number, before any pitchbend.
pub fn note_frequency(note: usize) -> f64 {
    note_frequency_table()[note]
}

/// Event categories stored in the block queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEventKind {
    NoteOn,
    NoteOff,
    PitchBend,
    SustainPedal,
    AllNotesOff,
    ProgramChange,
}

impl MidiEventKind {
    #[inline]
    pub fn is_note(self) -> bool {
        matches!(self, MidiEventKind::NoteOn | MidiEventKind::NoteOff)
    }
}

/// One MIDI event localized to a sample frame within the current block.
#[derive(Debug, Clone, Copy)]
pub struct MidiEvent {
    pub kind: MidiEventKind,
    pub channel: i32,
    pub byte1: i32,
    pub byte2: i32,
    /// The sample position in the current block where the event occurs.
    pub delta_frames: usize,
}

/// Envelope and velocity response settings applied when an event is heeded.
/// Latched from the owning effect's parameters once per block.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeSettings {
    pub sample_rate_hz: f32,
    pub pitchbend_range: f64,
    pub attack_seconds: f32,
    pub release_seconds: f32,
    pub legato: bool,
    pub velocity_curve: f32,
    pub velocity_influence: f32,
}

#[derive(Debug, Clone)]
struct NoteState {
    velocity: i32,
    // the gain for the note, scaled with velocity, curve and influence
    note_amp: f32,
    attack_dur: i64,
    attack_samples: i64,
    release_dur: i64,
    release_samples: i64,
    fade_table_step: f32,
    linear_fade_step: f32,
    // the most recent output value, for smoothing cut-off notes
    last_out_value: f32,
    smooth_samples: i64,
    tails: [Vec<f32>; 2],
}

impl NoteState {
    fn new() -> Self {
        Self {
            velocity: 0,
            note_amp: 0.0,
            attack_dur: 0,
            attack_samples: 0,
            release_dur: 0,
            release_samples: 0,
            fade_table_step: 0.0,
            linear_fade_step: 0.0,
            last_out_value: 0.0,
            smooth_samples: 0,
            tails: [
                vec![0.0; STOLEN_NOTE_FADE_DUR],
                vec![0.0; STOLEN_NOTE_FADE_DUR],
            ],
        }
    }
}

/// Per-instance MIDI state: the block event queue, the 128-note table with
/// envelope phases, the ordered active-note queue, pitchbend and sustain.
#[derive(Debug, Clone)]
pub struct MidiState {
    events: Vec<MidiEvent>,
    notes: [NoteState; NUM_NOTES],
    // a chronologically ordered queue of all active notes, most recent first
    note_queue: [i32; NUM_NOTES],
    // note-offs deferred while the sustain pedal is held
    sustain_queue: [bool; NUM_NOTES],
    // a frequency scalar value for the current pitchbend setting
    pitchbend: f64,
    // most MIDI controllers don't produce pitchbend LSB,
    // so only start using the LSB once a nonzero one arrives
    use_pitchbend_lsb: bool,
    sustain: bool,
    // pick up a retriggered note's attack where its release left off
    lazy_attack: bool,
    fade_table: &'static [f32],
}

impl MidiState {
    pub fn new() -> Self {
        Self {
            events: Vec::with_capacity(EVENT_QUEUE_SIZE),
            notes: core::array::from_fn(|_| NoteState::new()),
            note_queue: [INVALID_NOTE; NUM_NOTES],
            sustain_queue: [false; NUM_NOTES],
            pitchbend: 1.0,
            use_pitchbend_lsb: false,
            sustain: false,
            lazy_attack: false,
            fade_table: fade_table(),
        }
    }

    /// When enabled, a note-on for a note that is still releasing resumes
    /// the attack from the release's current level instead of from zero.
    pub fn set_lazy_attack(&mut self, enable: bool) {
        self.lazy_attack = enable;
    }

    pub fn reset(&mut self) {
        for state in self.notes.iter_mut() {
            state.velocity = 0;
            state.attack_samples = 0;
            state.attack_dur = 0;
            state.release_samples = 0;
            state.release_dur = 0;
            state.last_out_value = 0.0;
            state.smooth_samples = 0;
            for tail in state.tails.iter_mut() {
                tail.fill(0.0);
            }
        }
        self.sustain_queue.fill(false);
        self.remove_all_notes();
        // clear the queue since events must not leak into the next block
        self.events.clear();
        self.pitchbend = 1.0;
        self.sustain = false;
    }

    pub fn handle_note_on(&mut self, channel: i32, note: i32, velocity: i32, offset_frames: usize) {
        self.push_event(MidiEvent {
            kind: MidiEventKind::NoteOn,
            channel,
            byte1: note,
            byte2: velocity,
            delta_frames: offset_frames,
        });
    }

    pub fn handle_note_off(
        &mut self,
        channel: i32,
        note: i32,
        velocity: i32,
        offset_frames: usize,
    ) {
        self.push_event(MidiEvent {
            kind: MidiEventKind::NoteOff,
            channel,
            byte1: note,
            byte2: velocity,
            delta_frames: offset_frames,
        });
    }

    pub fn handle_all_notes_off(&mut self, channel: i32, offset_frames: usize) {
        self.push_event(MidiEvent {
            kind: MidiEventKind::AllNotesOff,
            channel,
            byte1: 0,
            byte2: 0,
            delta_frames: offset_frames,
        });
    }

    pub fn handle_pitch_bend(
        &mut self,
        channel: i32,
        value_lsb: i32,
        value_msb: i32,
        offset_frames: usize,
    ) {
        self.push_event(MidiEvent {
            kind: MidiEventKind::PitchBend,
            channel,
            byte1: value_lsb,
            byte2: value_msb,
            delta_frames: offset_frames,
        });
    }

    pub fn handle_cc(&mut self, channel: i32, controller: i32, value: i32, offset_frames: usize) {
        // only handling the sustain pedal for now
        if controller == CC_SUSTAIN_PEDAL {
            self.push_event(MidiEvent {
                kind: MidiEventKind::SustainPedal,
                channel,
                byte1: controller,
                byte2: value,
                delta_frames: offset_frames,
            });
        }
    }

    pub fn handle_program_change(&mut self, channel: i32, program: i32, offset_frames: usize) {
        self.push_event(MidiEvent {
            kind: MidiEventKind::ProgramChange,
            channel,
            byte1: program,
            byte2: 0,
            delta_frames: offset_frames,
        });
    }

    fn push_event(&mut self, event: MidiEvent) {
        // never grow past the preallocated queue space; the last slot is
        // kept free so that a flooded block degrades by dropping events
        if self.events.len() < EVENT_QUEUE_SIZE - 1 {
            self.events.push(event);
        }
    }

    /// Sort the block's events into chronological order. Hosts are supposed
    /// to deliver them sorted already, so this is usually a single pass.
    pub fn preprocess_events(&mut self) {
        let count = self.events.len();
        if count < 2 {
            return;
        }
        for i in 0..(count - 1) {
            let mut sorted = true;
            for j in 0..(count - 1 - i) {
                if self.events[j + 1].delta_frames < self.events[j].delta_frames {
                    self.events.swap(j, j + 1);
                    sorted = false;
                }
            }
            if sorted {
                break;
            }
        }
    }

    /// Clear the queue at the end of each block so that events are not
    /// reused in later blocks if no new ones arrive.
    pub fn postprocess_events(&mut self) {
        self.events.clear();
    }

    pub fn block_events(&self) -> &[MidiEvent] {
        &self.events
    }

    /// Apply the effects of one queued event on the note and pitchbend state.
    pub fn heed_event(&mut self, event_index: usize, settings: &EnvelopeSettings) {
        let event = self.events[event_index];
        match event.kind {
            MidiEventKind::NoteOn => self.heed_note_on(&event, settings),

            MidiEventKind::NoteOff => {
                let note = event.byte1 as usize;
                // don't process the note-off yet if the sustain pedal is on,
                // but do remember it
                if self.sustain {
                    self.sustain_queue[note] = true;
                } else {
                    self.turn_off_note(note, settings);
                }
            }

            MidiEventKind::PitchBend => {
                if event.byte1 > 0 {
                    self.use_pitchbend_lsb = true;
                }
                if event.byte2 >= 64 {
                    // bend up: scale the MIDI value from 0 to 1, then apply
                    // the semitone range exponentially
                    let normalized = if self.use_pitchbend_lsb {
                        f64::from(event.byte1 + 128 * (event.byte2 - 64)) / 8191.0
                    } else {
                        f64::from(event.byte2 - 64) / 63.0
                    };
                    self.pitchbend = NOTE_UP_SCALAR.powf(normalized * settings.pitchbend_range);
                } else {
                    // bend down
                    let normalized = if self.use_pitchbend_lsb {
                        f64::from(-event.byte1 - 128 * (event.byte2 - 64)) / 8192.0
                    } else {
                        f64::from(64 - event.byte2) / 64.0
                    };
                    self.pitchbend = NOTE_DOWN_SCALAR.powf(normalized * settings.pitchbend_range);
                }
            }

            MidiEventKind::SustainPedal => {
                if self.sustain && event.byte2 <= 63 {
                    // pedal released: turn off every note-off deferred while
                    // the pedal was held
                    for note in 0..NUM_NOTES {
                        if self.sustain_queue[note] {
                            self.turn_off_note(note, settings);
                            self.sustain_queue[note] = false;
                        }
                    }
                }
                self.sustain = event.byte2 >= 64;
            }

            MidiEventKind::AllNotesOff => {
                for state in self.notes.iter_mut() {
                    state.velocity = 0;
                    state.attack_samples = 0;
                    state.attack_dur = 0;
                    state.release_samples = 0;
                    state.release_dur = 0;
                }
                self.remove_all_notes();
            }

            MidiEventKind::ProgramChange => {}
        }
    }

    fn heed_note_on(&mut self, event: &MidiEvent, settings: &EnvelopeSettings) {
        let note = event.byte1 as usize;
        {
            let state = &mut self.notes[note];
            state.velocity = event.byte2;
            state.note_amp = (MIDI_SCALAR * event.byte2 as f32).powf(settings.velocity_curve)
                * settings.velocity_influence
                + (1.0 - settings.velocity_influence);
        }
        self.insert_note(event.byte1);

        if settings.legato {
            // fade out the previous note and fade in the new one, supershort
            let mut legato_note_found = false;
            for (other, state) in self.notes.iter_mut().enumerate() {
                // we want the already active notes, but not this new one
                if other == note || state.velocity == 0 || state.release_dur != 0 {
                    continue;
                }
                // if the note is currently fading in, pick up where it left
                // off, otherwise do the full fade-out duration
                if state.attack_dur != 0 {
                    state.release_samples = state.attack_samples;
                } else if state.release_samples <= 0 {
                    state.release_samples = LEGATO_FADE_DUR;
                }
                state.release_dur = LEGATO_FADE_DUR;
                state.attack_dur = 0;
                state.attack_samples = 0;
                state.fade_table_step = (NUM_FADE_POINTS as f32) / (LEGATO_FADE_DUR as f32);
                state.linear_fade_step = LEGATO_FADE_STEP;
                legato_note_found = true;
            }
            // don't start a new fade-in if the only sounding note is already
            // this same note
            if legato_note_found || self.notes[note].velocity == 0 {
                let state = &mut self.notes[note];
                state.attack_dur = LEGATO_FADE_DUR;
                state.attack_samples = 0;
                state.fade_table_step = (NUM_FADE_POINTS as f32) / (LEGATO_FADE_DUR as f32);
                state.linear_fade_step = LEGATO_FADE_STEP;
            }
        } else {
            // regular operation: set up the attack envelope
            let attack_dur = (settings.attack_seconds * settings.sample_rate_hz) as i64;
            let lazy_attack = self.lazy_attack;
            let state = &mut self.notes[note];
            state.attack_dur = attack_dur;
            if attack_dur != 0 {
                state.fade_table_step = (NUM_FADE_POINTS as f32) / (attack_dur as f32);
                state.linear_fade_step = 1.0 / (attack_dur as f32);
            }
            if lazy_attack && state.release_dur > 0 {
                // the note is still releasing, so pick up from its level
                state.attack_samples = ((state.release_samples as f32)
                    / (state.release_dur as f32)
                    * (attack_dur as f32)) as i64;
            } else {
                state.attack_samples = 0;
                // if the note is still releasing, smooth over its stolen end
                if state.release_dur > 0 {
                    state.smooth_samples = STOLEN_NOTE_FADE_DUR as i64;
                }
            }
        }

        // the fade state is settled now, so kill this note's release
        let state = &mut self.notes[note];
        state.release_dur = 0;
        state.release_samples = 0;
    }

    fn turn_off_note(&mut self, note: usize, settings: &EnvelopeSettings) {
        self.remove_note(note as i32);
        // note-offs are ignored in legato mode,
        // and a note that is already off has nothing to release
        if !settings.legato && self.notes[note].velocity > 0 {
            let release_dur = (settings.release_seconds * settings.sample_rate_hz) as i64;
            let state = &mut self.notes[note];
            state.release_dur = release_dur;
            if state.attack_dur != 0 {
                // the note is still in attack, so pick up from where it is
                state.release_samples = ((state.attack_samples as f32)
                    / (state.attack_dur as f32)
                    * (release_dur as f32)) as i64;
            } else {
                state.release_samples = release_dur;
            }
            if release_dur != 0 {
                state.fade_table_step = (NUM_FADE_POINTS as f32) / (release_dur as f32);
                state.linear_fade_step = 1.0 / (release_dur as f32);
            } else {
                // no release means the note turns off right now
                state.velocity = 0;
            }
        }
        let state = &mut self.notes[note];
        state.attack_dur = 0;
        state.attack_samples = 0;
    }

    #[inline]
    pub fn is_note_active(&self, note: usize) -> bool {
        self.notes[note].velocity != 0
    }

    pub fn is_any_note_active(&self) -> bool {
        self.note_queue[0] >= 0
    }

    pub fn latest_note(&self) -> Option<usize> {
        let note = self.note_queue[0];
        (note >= 0).then_some(note as usize)
    }

    /// The gain for the note, scaled with velocity, curve and influence.
    #[inline]
    pub fn note_amplitude(&self, note: usize) -> f32 {
        self.notes[note].note_amp
    }

    #[inline]
    pub fn pitchbend(&self) -> f64 {
        self.pitchbend
    }

    /// Advance the note's envelope by one sample and return its gain scalar.
    /// `fades` selects the exponential fade curve over the linear one.
    pub fn process_envelope(&mut self, fades: bool, note: usize) -> f32 {
        let state = &mut self.notes[note];

        if state.attack_dur > 0 {
            state.attack_samples += 1;
            // zero things out when the attack ends so that this fade
            // calculation is skipped next time
            if state.attack_samples >= state.attack_dur {
                state.attack_dur = 0;
                return 1.0;
            }
            if fades {
                let index = ((state.attack_samples as f32) * state.fade_table_step) as usize;
                self.fade_table[index.min(NUM_FADE_POINTS - 1)]
            } else {
                (state.attack_samples as f32) * state.linear_fade_step
            }
        } else if state.release_dur != 0 {
            state.release_samples -= 1;
            // the release ending also turns the note off
            if state.release_samples <= 0 {
                state.release_dur = 0;
                state.velocity = 0;
                return 0.0;
            }
            if fades {
                let index = ((state.release_samples as f32) * state.fade_table_step) as usize;
                self.fade_table[index.min(NUM_FADE_POINTS - 1)]
            } else {
                (state.release_samples as f32) * state.linear_fade_step
            }
        } else if state.velocity == 0 {
            // the release can end partway through a processing buffer,
            // in which case the note is now silent
            0.0
        } else {
            1.0
        }
    }

    /// Remember the note's most recent output sample, in case a steal needs
    /// to slope away from it.
    #[inline]
    pub fn record_note_output(&mut self, note: usize, value: f32) {
        self.notes[note].last_out_value = value;
    }

    /// Store one sample of a note's output into its per-channel tail buffer.
    #[inline]
    pub fn record_note_tail(&mut self, note: usize, channel: usize, index: usize, value: f32) {
        self.notes[note].tails[channel][index] = value;
    }

    /// Smooth the tip of a cut-off note by sloping down from the last sample
    /// it output, accumulating into `out` until the counter runs out.
    pub fn process_smoothing_output_sample(&mut self, out: &mut [f32], note: usize) {
        let state = &mut self.notes[note];
        for sample in out.iter_mut() {
            *sample +=
                state.last_out_value * (state.smooth_samples as f32) * STOLEN_NOTE_FADE_STEP;
            state.smooth_samples -= 1;
            if state.smooth_samples <= 0 {
                return;
            }
        }
    }

    /// Smooth the tip of a cut-off note by fading out the samples stored in
    /// its tail buffer, accumulating into `out`.
    pub fn process_smoothing_output_buffer(&mut self, out: &mut [f32], note: usize, channel: usize) {
        let NoteState {
            tails,
            smooth_samples,
            ..
        } = &mut self.notes[note];
        let tail = &tails[channel];
        for sample in out.iter_mut() {
            let tail_index = (STOLEN_NOTE_FADE_DUR as i64 - *smooth_samples) as usize;
            *sample += tail[tail_index] * (*smooth_samples as f32) * STOLEN_NOTE_FADE_STEP;
            *smooth_samples -= 1;
            if *smooth_samples <= 0 {
                return;
            }
        }
    }

    /// How many samples of stolen-note smoothing remain for the note.
    #[inline]
    pub fn note_smoothing_samples(&self, note: usize) -> usize {
        self.notes[note].smooth_samples.max(0) as usize
    }

    // insert a new note at the head of the active notes queue
    fn insert_note(&mut self, note: i32) {
        // the note may already be active, in which case it only moves
        // back up to the head
        for index in 0..NUM_NOTES {
            if self.note_queue[index] < 0 {
                break;
            }
            if self.note_queue[index] == note {
                let mut position = index;
                while position > 0 {
                    self.note_queue[position] = self.note_queue[position - 1];
                    position -= 1;
                }
                self.note_queue[0] = note;
                return;
            }
        }

        // normal scenario: shift every note down a position
        for index in (1..NUM_NOTES).rev() {
            self.note_queue[index] = self.note_queue[index - 1];
        }
        self.note_queue[0] = note;
    }

    // remove a note from the active notes queue, compacting the remainder
    fn remove_note(&mut self, note: i32) {
        let mut do_shift = false;
        for index in 0..(NUM_NOTES - 1) {
            if self.note_queue[index] == note {
                do_shift = true;
            }
            if do_shift {
                self.note_queue[index] = self.note_queue[index + 1];
            }
            if self.note_queue[index] < 0 {
                break;
            }
        }
        self.note_queue[NUM_NOTES - 1] = INVALID_NOTE;
    }

    fn remove_all_notes(&mut self) {
        self.note_queue.fill(INVALID_NOTE);
    }
}

impl Default for MidiState {
    fn default() -> Self {
        Self::new()
    }
}
