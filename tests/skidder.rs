//! Tests for the rhythmic gate effect

mod wav_writer;

use midifx_dsp::skidder::{MidiMode, Skidder};
use midifx_dsp::tempo::TimeInfo;
use midifx_dsp::SampleRate;

const SAMPLE_RATE: f64 = 44100.0;
const BLOCK_SIZE: usize = 4410;

fn resolved_time_info() -> TimeInfo {
    let mut time_info = TimeInfo::default();
    time_info.resolve(SAMPLE_RATE);
    time_info
}

// a skidder locked to an exact 1 Hz cycle through its own tempo setting
fn square_skidder() -> Skidder {
    let mut skidder = Skidder::new(SampleRate::new(SAMPLE_RATE));
    skidder.params.tempo_sync = true;
    skidder.params.rate_index = 7; // the 1x beat division
    skidder.params.rate_rand_min_index = 7;
    skidder.params.use_host_tempo = false;
    skidder.params.tempo_bpm = 60.0;
    skidder.params.pulsewidth = 0.5;
    skidder.params.pulsewidth_rand_min = 0.5;
    skidder.params.slope_seconds = 0.0;
    skidder.params.floor_gen = 0.0;
    skidder.params.floor_rand_min_gen = 0.0;
    skidder.params.pan_width = 0.0;
    skidder.params.noise = 0.0;
    skidder
}

fn process_mono(skidder: &mut Skidder, input_data: &[f32], time_info: &TimeInfo) -> Vec<f32> {
    let mut collected = Vec::with_capacity(input_data.len());
    for block in input_data.chunks(BLOCK_SIZE) {
        let input: Vec<&[f32]> = vec![block];
        let mut output_data = vec![0.0_f32; block.len()];
        {
            let mut output: Vec<&mut [f32]> = vec![&mut output_data];
            skidder.process(&input, &mut output, time_info);
        }
        collected.extend_from_slice(&output_data);
    }
    collected
}

#[test]
fn square_gate_at_one_hertz() {
    let mut skidder = square_skidder();
    let time_info = resolved_time_info();

    // 3 seconds of ones makes 3 full cycles at 60 BPM
    let input = vec![1.0_f32; 132300];
    let output = process_mono(&mut skidder, &input, &time_info);

    // the initial zero-length valley spends one sample regenerating
    assert_eq!(output[0], 0.0);
    assert!(output[1..=22050].iter().all(|&sample| sample == 1.0));
    assert!(output[22051..=44100].iter().all(|&sample| sample == 0.0));
    assert!(output[44101..=66150].iter().all(|&sample| sample == 1.0));

    let ones = output.iter().filter(|&&sample| sample == 1.0).count();
    assert_eq!(ones, 66150);
}

#[test]
fn user_tempo_covers_invalid_host_tempo() {
    let mut skidder = square_skidder();
    skidder.params.use_host_tempo = true;
    skidder.params.tempo_bpm = 120.0;
    // the host reports no valid tempo
    let time_info = resolved_time_info();
    assert!(!time_info.tempo_is_valid);

    let input = vec![1.0_f32; 44100];
    let output = process_mono(&mut skidder, &input, &time_info);

    // 120 BPM doubles the cycle rate: 2 pulses of 11025 samples each
    assert_eq!(output[0], 0.0);
    assert!(output[1..=11025].iter().all(|&sample| sample == 1.0));
    assert!(output[11026..=22050].iter().all(|&sample| sample == 0.0));
    let ones = output.iter().filter(|&&sample| sample == 1.0).count();
    assert_eq!(ones, 22050);
}

#[test]
fn midi_trigger_waits_for_a_note() {
    let mut skidder = square_skidder();
    skidder.params.midi_mode = MidiMode::Trigger;
    let time_info = resolved_time_info();
    let input = vec![1.0_f32; 512];

    // silent until a note arrives
    let silent: Vec<f32> = {
        let input_refs: Vec<&[f32]> = vec![&input];
        let mut output_data = vec![0.0_f32; 512];
        let mut output: Vec<&mut [f32]> = vec![&mut output_data];
        skidder.process(&input_refs, &mut output, &time_info);
        output_data
    };
    assert!(silent.iter().all(|&sample| sample == 0.0));

    // the note starts the skidding exactly at its frame offset
    skidder.midi.handle_note_on(0, 60, 127, 100);
    let triggered: Vec<f32> = {
        let input_refs: Vec<&[f32]> = vec![&input];
        let mut output_data = vec![0.0_f32; 512];
        let mut output: Vec<&mut [f32]> = vec![&mut output_data];
        skidder.process(&input_refs, &mut output, &time_info);
        output_data
    };
    assert!(triggered[..=100].iter().all(|&sample| sample == 0.0));
    assert!(triggered[101..].iter().all(|&sample| sample == 1.0));

    // the note-off winds the gate down within a sample
    skidder.midi.handle_note_off(0, 60, 0, 0);
    let released: Vec<f32> = {
        let input_refs: Vec<&[f32]> = vec![&input];
        let mut output_data = vec![0.0_f32; 512];
        let mut output: Vec<&mut [f32]> = vec![&mut output_data];
        skidder.process(&input_refs, &mut output, &time_info);
        output_data
    };
    assert_eq!(released[0], 1.0);
    assert!(released[1..].iter().all(|&sample| sample == 0.0));

    // and it stays silent with the note gone
    let idle: Vec<f32> = {
        let input_refs: Vec<&[f32]> = vec![&input];
        let mut output_data = vec![0.0_f32; 512];
        let mut output: Vec<&mut [f32]> = vec![&mut output_data];
        skidder.process(&input_refs, &mut output, &time_info);
        output_data
    };
    assert!(idle.iter().all(|&sample| sample == 0.0));
}

#[test]
fn pan_throw_conserves_the_stereo_sum() {
    let time_info = resolved_time_info();
    let input = vec![1.0_f32; 88200];

    let run = |seed: u32| -> (Vec<f32>, Vec<f32>) {
        let mut skidder = square_skidder();
        skidder.params.pan_width = 1.0;
        skidder.reseed(seed);
        let mut left_out = Vec::new();
        let mut right_out = Vec::new();
        for block in input.chunks(BLOCK_SIZE) {
            let input_refs: Vec<&[f32]> = vec![block, block];
            let mut left = vec![0.0_f32; block.len()];
            let mut right = vec![0.0_f32; block.len()];
            {
                let mut output: Vec<&mut [f32]> = vec![&mut left, &mut right];
                skidder.process(&input_refs, &mut output, &time_info);
            }
            left_out.extend_from_slice(&left);
            right_out.extend_from_slice(&right);
        }
        (left_out, right_out)
    };

    let (left, right) = run(7);
    // with identical channel inputs, panning moves energy between sides
    // without changing the total
    for frame in 0..left.len() {
        let sum = left[frame] + right[frame];
        assert!(
            sum == 0.0 || (sum - 2.0).abs() < 1e-5,
            "frame {frame} sums to {sum}"
        );
    }

    // the same seed replays the same pan throws
    let (left_again, right_again) = run(7);
    assert_eq!(left, left_again);
    assert_eq!(right, right_again);
}

#[test]
fn rupture_noise_fills_the_valleys() {
    let mut skidder = square_skidder();
    skidder.params.noise = 1.0;
    skidder.reseed(11);
    let time_info = resolved_time_info();

    let input = vec![1.0_f32; 44100];
    let output = process_mono(&mut skidder, &input, &time_info);

    // the plateau passes the input untouched until the valley takes over
    // on its final sample
    assert!(output[1..22050].iter().all(|&sample| sample == 1.0));
    // the valley carries noise scaled by the previous pulse's RMS
    let valley = &output[22050..];
    assert!(signals::peak(valley) > 0.01);
    assert!(valley.iter().all(|&sample| sample.abs() <= 2.0));
}

#[test]
fn render_randomized_skids() {
    simple_logger::SimpleLogger::new().init().ok();

    let mut skidder = Skidder::new(SampleRate::new(SAMPLE_RATE));
    skidder.params.rate_hz_gen = 0.6;
    skidder.params.rate_rand_min_hz_gen = 0.2;
    skidder.params.pulsewidth = 0.7;
    skidder.params.pulsewidth_rand_min = 0.3;
    skidder.params.floor_gen = 0.4;
    skidder.params.floor_rand_min_gen = 0.1;
    skidder.params.slope_seconds = 0.01;
    skidder.params.pan_width = 0.6;
    skidder.params.noise = 0.25;
    skidder.reseed(0x5EED);
    let time_info = resolved_time_info();

    let duration = 2.0;
    let total_frames = (duration * SAMPLE_RATE) as usize;
    let mut left_out = Vec::new();
    let mut right_out = Vec::new();
    let mut block = vec![0.0_f32; BLOCK_SIZE];

    let mut frame = 0;
    while frame < total_frames {
        signals::fill_sine(&mut block, frame, 110.0, SAMPLE_RATE as f32);
        let input_refs: Vec<&[f32]> = vec![&block, &block];
        let mut left = vec![0.0_f32; BLOCK_SIZE];
        let mut right = vec![0.0_f32; BLOCK_SIZE];
        {
            let mut output: Vec<&mut [f32]> = vec![&mut left, &mut right];
            skidder.process(&input_refs, &mut output, &time_info);
        }
        left_out.extend_from_slice(&left);
        right_out.extend_from_slice(&right);
        frame += BLOCK_SIZE;
    }

    log::info!("randomized skids rms: {}", signals::rms(&left_out));
    assert!(signals::peak(&left_out) < 4.0);
    assert!(signals::peak(&right_out) < 4.0);
    assert!(signals::rms(&left_out) > 0.0);

    wav_writer::write_stereo("skidder/randomized.wav", SAMPLE_RATE, &left_out, &right_out).ok();
}
