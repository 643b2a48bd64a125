//! Tests for the MIDI gate effect

mod wav_writer;

use midifx_dsp::midi_gater::MidiGater;
use midifx_dsp::SampleRate;

const SAMPLE_RATE: f64 = 44100.0;
const BLOCK_SIZE: usize = 512;

fn instant_gater() -> MidiGater {
    let mut gater = MidiGater::new(SampleRate::new(SAMPLE_RATE));
    gater.params.attack_slope_ms = 0.0;
    gater.params.release_slope_ms = 0.0;
    gater.params.velocity_influence = 0.0;
    gater.params.floor = 0.0;
    gater
}

fn process_mono(gater: &mut MidiGater, input_data: &[f32]) -> Vec<f32> {
    let input: Vec<&[f32]> = vec![input_data];
    let mut output_data = vec![0.0_f32; input_data.len()];
    {
        let mut output: Vec<&mut [f32]> = vec![&mut output_data];
        gater.process(&input, &mut output);
    }
    output_data
}

#[test]
fn gate_opens_at_the_note_frame() {
    let mut gater = instant_gater();
    let input = vec![1.0_f32; BLOCK_SIZE];

    gater.midi.handle_note_on(0, 60, 127, 100);
    let output = process_mono(&mut gater, &input);

    assert!(output[..100].iter().all(|&sample| sample == 0.0));
    assert!(output[100..].iter().all(|&sample| sample == 1.0));
}

#[test]
fn velocity_scales_the_gate() {
    let mut gater = instant_gater();
    gater.params.velocity_influence = 1.0;
    let input = vec![1.0_f32; BLOCK_SIZE];

    gater.midi.handle_note_on(0, 60, 64, 0);
    let output = process_mono(&mut gater, &input);

    let expected = 64.0 / 127.0;
    assert!(output.iter().all(|&sample| (sample - expected).abs() < 1e-6));
}

#[test]
fn floor_passes_audio_between_notes() {
    let mut gater = instant_gater();
    gater.params.floor = 0.5;
    let input = vec![1.0_f32; 64];

    let output = process_mono(&mut gater, &input);

    // the unaffected path fades in over 18 samples, then sits at the floor
    assert_eq!(output[0], 0.0);
    assert!((output[5] - (5.0 / 18.0) * 0.5).abs() < 1e-6);
    assert!((output[17] - (17.0 / 18.0) * 0.5).abs() < 1e-6);
    assert!(output[18..].iter().all(|&sample| sample == 0.5));
}

#[test]
fn unaffected_audio_crossfades_around_notes() {
    let mut gater = instant_gater();
    gater.params.floor = 0.5;
    let input = vec![1.0_f32; BLOCK_SIZE];

    // settle the floor first
    process_mono(&mut gater, &input);

    // a note starts: full note level plus the floor fading out
    gater.midi.handle_note_on(0, 60, 127, 0);
    let during_note = process_mono(&mut gater, &input);
    assert!(during_note[0] > 1.0 && during_note[0] < 1.5);
    assert!(during_note[18..].iter().all(|&sample| sample == 1.0));

    // the note ends: the floor fades back in from silence
    gater.midi.handle_note_off(0, 60, 0, 0);
    let after_note = process_mono(&mut gater, &input);
    assert_eq!(after_note[0], 0.0);
    assert!(after_note[18..].iter().all(|&sample| sample == 0.5));
}

#[test]
fn attack_ramps_over_the_slope_time() {
    let mut gater = instant_gater();
    // 1 ms at 44.1 kHz is 44 samples of attack
    gater.params.attack_slope_ms = 1.0;
    let input = vec![1.0_f32; BLOCK_SIZE];

    gater.midi.handle_note_on(0, 60, 127, 0);
    let output = process_mono(&mut gater, &input);

    // strictly rising through the attack, then pinned at unity
    for frame in 1..43 {
        assert!(output[frame] >= output[frame - 1]);
    }
    assert!(output[0] < 0.1);
    assert!(output[44..].iter().all(|&sample| sample == 1.0));
}

#[test]
fn reset_clears_held_notes() {
    let mut gater = instant_gater();
    let input = vec![1.0_f32; BLOCK_SIZE];

    gater.midi.handle_note_on(0, 60, 127, 0);
    let held = process_mono(&mut gater, &input);
    assert!(held[BLOCK_SIZE - 1] == 1.0);

    gater.reset();
    let cleared = process_mono(&mut gater, &input);
    assert!(cleared.iter().all(|&sample| sample == 0.0));
}

#[test]
fn render_gated_sine() {
    simple_logger::SimpleLogger::new().init().ok();

    let mut gater = MidiGater::new(SampleRate::new(SAMPLE_RATE));
    gater.params.attack_slope_ms = 20.0;
    gater.params.release_slope_ms = 80.0;
    gater.params.floor = 0.1;

    let duration = 2.0;
    let blocks = (duration * SAMPLE_RATE / (BLOCK_SIZE as f64)) as usize;
    let mut input_data = vec![0.0_f32; BLOCK_SIZE];
    let mut wav_data = Vec::new();

    for n in 0..blocks {
        signals::fill_sine(&mut input_data, n * BLOCK_SIZE, 220.0, SAMPLE_RATE as f32);
        // an eighth note pattern, two blocks on, two blocks off
        match n % 4 {
            0 => gater.midi.handle_note_on(0, 57, 100, 0),
            2 => gater.midi.handle_note_off(0, 57, 0, 0),
            _ => {}
        }
        let output = process_mono(&mut gater, &input_data);
        wav_data.extend_from_slice(&output);
    }

    // note level plus the fading floor can briefly exceed the dry peak
    log::info!("gated sine peak: {}", signals::peak(&wav_data));
    assert!(signals::peak(&wav_data) <= 0.5 * 1.1 + 1e-6);
    assert!(signals::rms(&wav_data) > 0.0);

    wav_writer::write("midi_gater/gated_sine.wav", SAMPLE_RATE, &wav_data).ok();
}
