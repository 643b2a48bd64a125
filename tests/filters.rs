//! Tests for the IIR and FIR filters

use midifx_dsp::fir_filter;
use midifx_dsp::iir_filter::IirFilter;

const SAMPLE_RATE: f32 = 44100.0;

#[test]
fn lowpass_passes_dc() {
    let mut filter = IirFilter::new();
    filter.calculate_lowpass_coefficients(1000.0, SAMPLE_RATE);

    for _ in 0..5000 {
        filter.process(1.0);
    }
    assert!((filter.current_output() - 1.0).abs() < 0.01);
}

#[test]
fn highpass_blocks_dc() {
    let mut filter = IirFilter::new();
    filter.calculate_highpass_coefficients(100.0, SAMPLE_RATE);

    for _ in 0..5000 {
        filter.process(1.0);
    }
    assert!(filter.current_output().abs() < 0.01);
}

#[test]
fn reset_clears_history() {
    let mut filter = IirFilter::new();
    filter.calculate_lowpass_coefficients(1000.0, SAMPLE_RATE);
    for _ in 0..100 {
        filter.process(1.0);
    }
    assert!(filter.current_output() != 0.0);

    filter.reset();
    filter.process(0.0);
    assert_eq!(filter.current_output(), 0.0);
}

#[test]
fn copied_coefficients_match() {
    let mut filter = IirFilter::new();
    filter.calculate_lowpass_coefficients(2500.0, SAMPLE_RATE);
    let mut linked = IirFilter::new();
    linked.copy_coefficients(&filter);

    // identical coefficients and identical input give identical output
    for i in 0..500 {
        let in_sample = ((i % 7) as f32 * 0.25) - 0.75;
        filter.process(in_sample);
        linked.process(in_sample);
        assert_eq!(filter.current_output(), linked.current_output());
    }
}

#[test]
fn batch_processing_matches_single_steps() {
    let audio: Vec<f32> = (0..64)
        .map(|i| ((i as f32) * 0.37).sin() * 0.8)
        .collect();

    let mut reference = IirFilter::new();
    reference.calculate_lowpass_coefficients(3000.0, SAMPLE_RATE);
    let mut batched = reference.clone();

    let mut pos = 0;
    while pos + 4 <= audio.len() {
        for i in 0..4 {
            reference.process(audio[pos + i]);
        }
        batched.process_4(&audio, pos);
        assert!(
            (reference.current_output() - batched.current_output()).abs() < 1e-4,
            "diverged at {pos}"
        );
        pos += 4;
    }

    let mut by_two = IirFilter::new();
    by_two.calculate_lowpass_coefficients(3000.0, SAMPLE_RATE);
    let mut by_three = by_two.clone();
    for i in 0..60 {
        by_two.process(audio[i]);
        by_three.process(audio[i]);
    }
    let mut stepped = by_two.clone();
    stepped.process(audio[60]);
    stepped.process(audio[61]);
    by_two.process_2(&audio, 60);
    assert!((stepped.current_output() - by_two.current_output()).abs() < 1e-4);

    let mut stepped3 = by_three.clone();
    stepped3.process(audio[60]);
    stepped3.process(audio[61]);
    stepped3.process(audio[62]);
    by_three.process_3(&audio, 60);
    assert!((stepped3.current_output() - by_three.current_output()).abs() < 1e-4);
}

#[test]
fn output_history_interpolates_flat_lines_exactly() {
    let mut filter = IirFilter::new();
    filter.calculate_lowpass_coefficients(1000.0, SAMPLE_RATE);
    for _ in 0..10000 {
        filter.process(0.5);
    }

    // once the history has settled on a constant, any fractional position
    // reads back that constant
    let settled = filter.current_output();
    for fraction in [0.0, 0.25, 0.5, 0.75, 0.99] {
        assert!((filter.interpolate_hermite_output(123.0 + fraction) - settled).abs() < 1e-4);
    }
}

#[test]
fn fir_lowpass_passes_dc() {
    let mut coefficients = [0.0_f32; fir_filter::NUM_TAPS];
    fir_filter::calculate_ideal_lowpass_coefficients(5000.0, SAMPLE_RATE, &mut coefficients);
    fir_filter::apply_kaiser_window(&mut coefficients, 60.0);

    // convolving a constant measures the DC gain
    let ones = [1.0_f32; 64];
    let dc_gain = fir_filter::process_fir(&ones, &coefficients, 0);
    assert!((dc_gain - 1.0).abs() < 0.1, "DC gain {dc_gain}");

    // the window must keep the response symmetric
    for n in 0..(fir_filter::NUM_TAPS / 2) {
        assert_eq!(coefficients[n], coefficients[fir_filter::NUM_TAPS - 1 - n]);
    }
}

#[test]
fn fir_wraps_across_the_buffer_end() {
    let mut coefficients = [0.0_f32; fir_filter::NUM_TAPS];
    fir_filter::calculate_ideal_lowpass_coefficients(3000.0, SAMPLE_RATE, &mut coefficients);
    fir_filter::apply_kaiser_window(&mut coefficients, 60.0);

    // on a constant buffer every start position must give the same sum,
    // wrapped or not
    let ones = [1.0_f32; 32];
    let direct = fir_filter::process_fir(&ones, &coefficients, 0);
    let wrapped = fir_filter::process_fir(&ones, &coefficients, 20);
    assert_eq!(direct, wrapped);
}
