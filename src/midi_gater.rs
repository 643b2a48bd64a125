//! A MIDI-note-controlled gate.
//!
//! Audio passes while notes are held, shaped by per-note attack and release
//! slopes and velocity response. Between notes, the "unaffected" input can
//! still bleed through at a floor gain, with short linear fades at the
//! transitions so that the gate never clicks.

use crate::midi::{EnvelopeSettings, MidiState, NUM_NOTES};
use crate::splitter::{self, EffectCore};
use crate::SampleRate;

const UNAFFECTED_FADE_DUR: i64 = 18;
const UNAFFECTED_FADE_STEP: f32 = 1.0 / (UNAFFECTED_FADE_DUR as f32);

const USE_NICE_AUDIO_FADES: bool = true;
const USE_LEGATO: bool = false;

// the three states of the unaffected audio input between notes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnaffectedState {
    FadeIn,
    Flat,
    FadeOut,
}

/// Control settings, in real units. The caller resolves any host parameter
/// curves before writing these.
#[derive(Debug, Clone, Copy)]
pub struct MidiGaterParams {
    pub attack_slope_ms: f32,
    pub release_slope_ms: f32,
    /// How much note velocity scales the gate level, 0 to 1.
    pub velocity_influence: f32,
    /// Linear gain for the audio that passes between notes.
    pub floor: f32,
}

impl Default for MidiGaterParams {
    fn default() -> Self {
        Self {
            attack_slope_ms: 3.0,
            release_slope_ms: 3.0,
            velocity_influence: 0.0,
            floor: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MidiGater {
    pub params: MidiGaterParams,
    pub midi: MidiState,
    sample_rate: SampleRate,

    unaffected_state: UnaffectedState,
    unaffected_fade_samples: i64,

    // parameter values latched once per block
    attack_slope_seconds: f32,
    release_slope_seconds: f32,
    velocity_influence: f32,
    floor: f32,
}

impl MidiGater {
    pub fn new(sample_rate: SampleRate) -> Self {
        let mut midi = MidiState::new();
        midi.set_lazy_attack(true);
        Self {
            params: MidiGaterParams::default(),
            midi,
            sample_rate,
            unaffected_state: UnaffectedState::FadeIn,
            unaffected_fade_samples: 0,
            attack_slope_seconds: 0.0,
            release_slope_seconds: 0.0,
            velocity_influence: 0.0,
            floor: 0.0,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: SampleRate) {
        self.sample_rate = sample_rate;
    }

    pub fn reset(&mut self) {
        self.midi.reset();
        self.unaffected_state = UnaffectedState::FadeIn;
        self.unaffected_fade_samples = 0;
    }

    fn latch_parameters(&mut self) {
        self.attack_slope_seconds = self.params.attack_slope_ms * 0.001;
        self.release_slope_seconds = self.params.release_slope_ms * 0.001;
        self.velocity_influence = self.params.velocity_influence;
        self.floor = self.params.floor;
    }

    fn envelope_settings(&self) -> EnvelopeSettings {
        EnvelopeSettings {
            sample_rate_hz: self.sample_rate.sample_rate_hz as f32,
            pitchbend_range: 0.0,
            attack_seconds: self.attack_slope_seconds,
            release_seconds: self.release_slope_seconds,
            legato: USE_LEGATO,
            velocity_curve: 1.0,
            velocity_influence: self.velocity_influence,
        }
    }

    /// Process one block. The output buffers are cleared first because the
    /// note and unaffected renderers both accumulate into them.
    pub fn process(&mut self, input: &[&[f32]], output: &mut [&mut [f32]]) {
        for channel in output.iter_mut() {
            channel.fill(0.0);
        }
        self.latch_parameters();
        splitter::process_block(self, input, output);
    }

    // the unprocessed audio input between notes, scaled by the floor gain
    fn process_unaffected(
        &mut self,
        input: &[&[f32]],
        output: &mut [&mut [f32]],
        start_frame: usize,
        frame_count: usize,
    ) {
        let num_channels = output.len().min(input.len());
        let end_frame = start_frame + frame_count;

        for frame in start_frame..end_frame {
            let mut sample_amp = self.floor;

            if self.unaffected_state == UnaffectedState::FadeIn {
                // all notes just ended and the clean input is kicking back in
                sample_amp =
                    (self.unaffected_fade_samples as f32) * UNAFFECTED_FADE_STEP * self.floor;
                self.unaffected_fade_samples += 1;
                if self.unaffected_fade_samples >= UNAFFECTED_FADE_DUR {
                    self.unaffected_state = UnaffectedState::Flat;
                }
            } else if self.unaffected_state == UnaffectedState::FadeOut {
                // a note just began, so fade out the clean input in a hurry
                self.unaffected_fade_samples -= 1;
                sample_amp =
                    (self.unaffected_fade_samples as f32) * UNAFFECTED_FADE_STEP * self.floor;
                if self.unaffected_fade_samples <= 0 {
                    // rearm the fade-in, and leave now or a new one begins
                    self.unaffected_state = UnaffectedState::FadeIn;
                    return;
                }
            }

            for channel in 0..num_channels {
                output[channel][frame] += input[channel][frame] * sample_amp;
            }
        }
    }
}

impl EffectCore for MidiGater {
    fn midi(&self) -> &MidiState {
        &self.midi
    }

    fn midi_mut(&mut self) -> &mut MidiState {
        &mut self.midi
    }

    fn heed_event(&mut self, event_index: usize) {
        let settings = self.envelope_settings();
        self.midi.heed_event(event_index, &settings);
    }

    fn render_chunk(
        &mut self,
        input: &[&[f32]],
        output: &mut [&mut [f32]],
        start_frame: usize,
        frame_count: usize,
    ) {
        let num_channels = output.len().min(input.len());
        let end_frame = start_frame + frame_count;

        // render every sounding note, accumulating each into the output
        let mut no_notes = true;
        for note in 0..NUM_NOTES {
            if !self.midi.is_note_active(note) {
                continue;
            }
            no_notes = false;
            for frame in start_frame..end_frame {
                // the attack/release scalar, scaled by key velocity
                let env_amp = self.midi.process_envelope(USE_NICE_AUDIO_FADES, note)
                    * self.midi.note_amplitude(note);
                for channel in 0..num_channels {
                    output[channel][frame] += input[channel][frame] * env_amp;
                }
            }
        }

        // notes arrived while the unaffected audio was running at full
        // floor level, so it has to fade out now
        if !no_notes && self.unaffected_state == UnaffectedState::Flat {
            self.unaffected_state = UnaffectedState::FadeOut;
        }
        // clean input passes whenever no notes sounded during this chunk,
        // or to finish off a pending fade-out
        if no_notes || self.unaffected_state == UnaffectedState::FadeOut {
            self.process_unaffected(input, output, start_frame, frame_count);
        }
    }
}
