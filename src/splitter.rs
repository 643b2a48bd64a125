//! Splits an audio block into sub-chunks at MIDI event boundaries.
//!
//! Events carry exact intra-block sample offsets, so two notes landing in
//! the same host callback must still take effect on different samples.
//! Rendering whole blocks against per-block parameter state would smear
//! onsets by up to a full block, which can be hundreds of samples.

use crate::midi::MidiState;

/// The narrow contract an effect exposes to the splitter: render one
/// contiguous run of samples, or take in one event at its boundary.
pub trait EffectCore {
    fn midi(&self) -> &MidiState;
    fn midi_mut(&mut self) -> &mut MidiState;

    /// Apply the effects of one queued MIDI event on the processing state.
    fn heed_event(&mut self, event_index: usize);

    /// Render output for the frames `[start_frame, start_frame + frame_count)`
    /// of the current block.
    fn render_chunk(
        &mut self,
        input: &[&[f32]],
        output: &mut [&mut [f32]],
        start_frame: usize,
        frame_count: usize,
    );
}

/// Walk one block of audio, rendering the stretches between events and
/// applying each event exactly at its sample frame. Sorts the event queue
/// first and clears it afterwards.
pub fn process_block<E: EffectCore + ?Sized>(
    effect: &mut E,
    input: &[&[f32]],
    output: &mut [&mut [f32]],
) {
    let total_frames = output.first().map_or(0, |channel| channel.len());

    effect.midi_mut().preprocess_events();
    let num_events = effect.midi().block_events().len();

    // start before the first event so that the opening stretch gets rendered
    let mut event_index: i64 = -1;
    let mut position: usize = 0;

    loop {
        let next = (event_index + 1) as usize;
        // the chunk runs up to the next event, or to the end of the block
        let frames_to_process = if next >= num_events {
            total_frames - position
        } else {
            let delta = effect.midi().block_events()[next].delta_frames;
            delta.saturating_sub(position).min(total_frames - position)
        };

        if frames_to_process == 0 {
            // two or more events occur simultaneously, so there is nothing
            // to render before taking in the next one
            event_index += 1;
            if (event_index as usize) < num_events {
                effect.heed_event(event_index as usize);
            }
        } else {
            effect.render_chunk(input, output, position, frames_to_process);
            event_index += 1;
            if (event_index as usize) < num_events {
                let delta = effect.midi().block_events()[event_index as usize].delta_frames;
                position = delta.min(total_frames);
                effect.heed_event(event_index as usize);
            }
        }

        if event_index as usize >= num_events {
            break;
        }
    }

    effect.midi_mut().postprocess_events();
}
