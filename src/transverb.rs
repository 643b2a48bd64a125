//! A delay whose two read heads replay the buffer at independent speeds.
//!
//! One ring per channel is written at the input rate while two fractional
//! read heads traverse it at their own octave-scaled speeds, each with its
//! own feedback and mix. Reads crossing the write head start a short
//! crossfade from the last value read, instead of clicking. Quality modes
//! trade interpolation and filtering cost: dirt-fi truncates, hi-fi
//! Hermite-interpolates, ultra hi-fi also anti-alias lowpasses fast heads
//! (IIR, or FIR beyond 5x) and DC-blocks slow ones. TOMSOUND restores a
//! version 1.0 routing bug that made both heads feed back through the
//! first ring.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use crate::fir_filter;
use crate::iir_filter::{IirFilter, SHELF_START_LOWPASS};
use crate::math;
use crate::smoothed_value::SmoothedValue;
use crate::SampleRate;

#[allow(unused_imports)]
use num_traits::float::Float;

pub const BUFFER_MIN_MS: f64 = 1.0;
pub const BUFFER_MAX_MS: f64 = 3000.0;
pub const SPEED_MIN_OCTAVES: f64 = -3.0;
pub const SPEED_MAX_OCTAVES: f64 = 6.0;

// the most samples a head-crossing crossfade may last
const SMOOTH_DUR: i64 = 42;
const GAIN_SMOOTHING_SECONDS: f64 = 0.030;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    /// Truncated reads, no filtering.
    DirtFi,
    /// Hermite-interpolated reads.
    HiFi,
    /// Hermite interpolation plus anti-aliasing or DC-blocking filters.
    UltraHiFi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterMode {
    Nothing,
    LowpassIir,
    LowpassFir,
    Highpass,
}

#[derive(Debug, Clone, Copy)]
pub struct TransverbParams {
    pub buffer_size_ms: f64,
    /// Dry gain, 0 to 1.
    pub dry_mix: f32,
    pub mix1: f32,
    /// Head 1 position as a fraction of the maximum buffer, 0 to 1.
    pub dist1: f64,
    /// Head 1 playback speed in octaves, -3 to +6.
    pub speed1_octaves: f64,
    /// Head 1 feedback, 0 to 1.
    pub feed1: f32,
    pub mix2: f32,
    pub dist2: f64,
    pub speed2_octaves: f64,
    pub feed2: f32,
    pub quality: Quality,
    pub tomsound: bool,
}

impl Default for TransverbParams {
    fn default() -> Self {
        Self {
            buffer_size_ms: 2700.0,
            dry_mix: 1.0,
            mix1: 1.0,
            dist1: 0.90009,
            speed1_octaves: 0.0,
            feed1: 0.0,
            mix2: 0.0,
            dist2: 0.1,
            speed2_octaves: 1.0,
            feed2: 0.0,
            quality: Quality::UltraHiFi,
            tomsound: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Transverb {
    pub params: TransverbParams,
    sample_rate: SampleRate,

    // rings sized for the largest buffer setting, with the active region
    // re-latched from the buffer size parameter
    max_buffer: usize,
    buffer_size: usize,
    writer: usize,
    read1: f64,
    read2: f64,
    buffers1: Vec<Box<[f32]>>,
    buffers2: Vec<Box<[f32]>>,

    filters1: Vec<IirFilter>,
    filters2: Vec<IirFilter>,
    fir_coefficients1: [f32; fir_filter::NUM_TAPS],
    fir_coefficients2: [f32; fir_filter::NUM_TAPS],
    speed1_has_changed: bool,
    speed2_has_changed: bool,

    // head-crossing crossfade state, per channel
    smooth_count1: Vec<i64>,
    smooth_count2: Vec<i64>,
    smooth_dur1: Vec<i64>,
    smooth_dur2: Vec<i64>,
    smooth_step1: Vec<f32>,
    smooth_step2: Vec<f32>,
    last_read1: Vec<f32>,
    last_read2: Vec<f32>,

    dry_mix: SmoothedValue<f32>,
    mix1: SmoothedValue<f32>,
    mix2: SmoothedValue<f32>,
    feed1: SmoothedValue<f32>,
    feed2: SmoothedValue<f32>,

    // latched speeds as playback scalars
    speed1: f64,
    speed2: f64,

    force_full_latch: bool,
    prev_buffer_size_ms: f64,
    prev_dist1: f64,
    prev_dist2: f64,
    prev_speed1_octaves: f64,
    prev_speed2_octaves: f64,
    prev_quality: Quality,
    prev_tomsound: bool,
}

impl Transverb {
    pub fn new(sample_rate: SampleRate, num_channels: usize) -> Self {
        let num_channels = num_channels.max(1);
        let max_buffer = (BUFFER_MAX_MS * 0.001 * sample_rate.sample_rate_hz) as usize;
        let params = TransverbParams::default();

        let make_gain = |value: f32| {
            let mut gain = SmoothedValue::new(GAIN_SMOOTHING_SECONDS);
            gain.set_sample_rate(sample_rate.sample_rate_hz);
            gain.set_value_now(value);
            gain
        };

        Self {
            params,
            sample_rate,
            max_buffer,
            buffer_size: max_buffer,
            writer: 0,
            read1: 0.0,
            read2: 0.0,
            buffers1: (0..num_channels)
                .map(|_| vec![0.0; max_buffer].into_boxed_slice())
                .collect(),
            buffers2: (0..num_channels)
                .map(|_| vec![0.0; max_buffer].into_boxed_slice())
                .collect(),
            filters1: (0..num_channels).map(|_| IirFilter::new()).collect(),
            filters2: (0..num_channels).map(|_| IirFilter::new()).collect(),
            fir_coefficients1: [0.0; fir_filter::NUM_TAPS],
            fir_coefficients2: [0.0; fir_filter::NUM_TAPS],
            speed1_has_changed: true,
            speed2_has_changed: true,
            smooth_count1: vec![0; num_channels],
            smooth_count2: vec![0; num_channels],
            smooth_dur1: vec![0; num_channels],
            smooth_dur2: vec![0; num_channels],
            smooth_step1: vec![0.0; num_channels],
            smooth_step2: vec![0.0; num_channels],
            last_read1: vec![0.0; num_channels],
            last_read2: vec![0.0; num_channels],
            dry_mix: make_gain(params.dry_mix),
            mix1: make_gain(params.mix1),
            mix2: make_gain(params.mix2),
            feed1: make_gain(params.feed1),
            feed2: make_gain(params.feed2),
            speed1: 1.0,
            speed2: 2.0,
            force_full_latch: true,
            prev_buffer_size_ms: params.buffer_size_ms,
            prev_dist1: params.dist1,
            prev_dist2: params.dist2,
            prev_speed1_octaves: params.speed1_octaves,
            prev_speed2_octaves: params.speed2_octaves,
            prev_quality: params.quality,
            prev_tomsound: params.tomsound,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: SampleRate) {
        self.sample_rate = sample_rate;
        let max_buffer = (BUFFER_MAX_MS * 0.001 * sample_rate.sample_rate_hz) as usize;
        if max_buffer != self.max_buffer {
            self.max_buffer = max_buffer;
            for buffer in self.buffers1.iter_mut().chain(self.buffers2.iter_mut()) {
                *buffer = vec![0.0; max_buffer].into_boxed_slice();
            }
        }
        for gain in [
            &mut self.dry_mix,
            &mut self.mix1,
            &mut self.mix2,
            &mut self.feed1,
            &mut self.feed2,
        ] {
            gain.set_sample_rate(sample_rate.sample_rate_hz);
        }
        self.force_full_latch = true;
        self.reset();
    }

    /// Zero the rings and return both heads to the write position.
    pub fn reset(&mut self) {
        self.writer = 0;
        self.read1 = 0.0;
        self.read2 = 0.0;
        for buffer in self.buffers1.iter_mut().chain(self.buffers2.iter_mut()) {
            buffer.fill(0.0);
        }
        for filter in self.filters1.iter_mut().chain(self.filters2.iter_mut()) {
            filter.reset();
        }
        self.smooth_count1.fill(0);
        self.smooth_count2.fill(0);
        self.last_read1.fill(0.0);
        self.last_read2.fill(0.0);
        self.speed1_has_changed = true;
        self.speed2_has_changed = true;
        for gain in [
            &mut self.dry_mix,
            &mut self.mix1,
            &mut self.mix2,
            &mut self.feed1,
            &mut self.feed2,
        ] {
            gain.snap();
        }
    }

    /// The audio tail to report to the host.
    pub fn tail_seconds(&self) -> f64 {
        BUFFER_MAX_MS * 0.001
    }

    fn latch_parameters(&mut self) {
        let force = core::mem::replace(&mut self.force_full_latch, false);
        let sample_rate = self.sample_rate.sample_rate_hz;

        self.buffer_size = ((self.params.buffer_size_ms * sample_rate * 0.001) as usize)
            .clamp(1, self.max_buffer);
        self.speed1 = 2.0_f64.powf(self.params.speed1_octaves);
        self.speed2 = 2.0_f64.powf(self.params.speed2_octaves);

        let buffer_size_f = self.buffer_size as f64;
        if force || self.params.buffer_size_ms != self.prev_buffer_size_ms {
            // keep the heads inside the resized ring
            self.writer %= self.buffer_size;
            self.read1 = self.read1.abs() % buffer_size_f;
            self.read2 = self.read2.abs() % buffer_size_f;
        }
        if force || self.params.dist1 != self.prev_dist1 {
            self.read1 = ((self.writer as f64) + (self.params.dist1 * self.max_buffer as f64))
                .abs()
                % buffer_size_f;
        }
        if force || self.params.speed1_octaves != self.prev_speed1_octaves {
            self.speed1_has_changed = true;
        }
        if force || self.params.dist2 != self.prev_dist2 {
            self.read2 = ((self.writer as f64) + (self.params.dist2 * self.max_buffer as f64))
                .abs()
                % buffer_size_f;
        }
        if force || self.params.speed2_octaves != self.prev_speed2_octaves {
            self.speed2_has_changed = true;
        }
        if force
            || self.params.quality != self.prev_quality
            || self.params.tomsound != self.prev_tomsound
        {
            self.speed1_has_changed = true;
            self.speed2_has_changed = true;
        }

        self.dry_mix.set_value(self.params.dry_mix);
        self.mix1.set_value(self.params.mix1);
        self.mix2.set_value(self.params.mix2);
        self.feed1.set_value(self.params.feed1);
        self.feed2.set_value(self.params.feed2);

        self.prev_buffer_size_ms = self.params.buffer_size_ms;
        self.prev_dist1 = self.params.dist1;
        self.prev_dist2 = self.params.dist2;
        self.prev_speed1_octaves = self.params.speed1_octaves;
        self.prev_speed2_octaves = self.params.speed2_octaves;
        self.prev_quality = self.params.quality;
        self.prev_tomsound = self.params.tomsound;
    }

    // decide the ultra hi-fi filtering path per head and refresh
    // coefficients when a speed has changed
    fn prepare_filters(&mut self) -> (FilterMode, FilterMode, f32, f32) {
        let sample_rate = self.sample_rate.sample_rate_hz;
        let mut filter_mode1 = FilterMode::Nothing;
        let mut filter_mode2 = FilterMode::Nothing;
        let mut mug1 = 1.0_f32;
        let mut mug2 = 1.0_f32;
        if self.params.quality != Quality::UltraHiFi {
            return (filter_mode1, filter_mode2, mug1, mug2);
        }

        if self.speed1 > 1.0 {
            filter_mode1 = FilterMode::LowpassIir;
            // IIR catch-up grows too costly past 5x, switch to FIR
            if (self.speed1 as usize) >= 5 {
                filter_mode1 = FilterMode::LowpassFir;
                // compensate for gain lost in the filtering
                mug1 = ((self.speed1 as f32) * 0.2).powf(0.78);
                if self.speed1_has_changed {
                    let cutoff = ((sample_rate / self.speed1) * SHELF_START_LOWPASS) as f32;
                    fir_filter::calculate_ideal_lowpass_coefficients(
                        cutoff,
                        sample_rate as f32,
                        &mut self.fir_coefficients1,
                    );
                    fir_filter::apply_kaiser_window(&mut self.fir_coefficients1, 60.0);
                    self.speed1_has_changed = false;
                }
            } else if self.speed1_has_changed {
                let cutoff = ((sample_rate / self.speed1) * SHELF_START_LOWPASS) as f32;
                if let Some((first, rest)) = self.filters1.split_first_mut() {
                    first.calculate_lowpass_coefficients(cutoff, sample_rate as f32);
                    for filter in rest {
                        filter.copy_coefficients(first);
                    }
                }
                self.speed1_has_changed = false;
            }
        } else {
            // slowed-down heads need their mega sub bass removed
            filter_mode1 = FilterMode::Highpass;
            if self.speed1_has_changed {
                let cutoff = (33.3 / self.speed1) as f32;
                if let Some((first, rest)) = self.filters1.split_first_mut() {
                    first.calculate_highpass_coefficients(cutoff, sample_rate as f32);
                    for filter in rest {
                        filter.copy_coefficients(first);
                    }
                }
                self.speed1_has_changed = false;
            }
        }

        if self.speed2 > 1.0 {
            filter_mode2 = FilterMode::LowpassIir;
            if (self.speed2 as usize) >= 5 {
                filter_mode2 = FilterMode::LowpassFir;
                mug2 = ((self.speed2 as f32) * 0.2).powf(0.78);
                if self.speed2_has_changed {
                    let cutoff = ((sample_rate / self.speed2) * SHELF_START_LOWPASS) as f32;
                    fir_filter::calculate_ideal_lowpass_coefficients(
                        cutoff,
                        sample_rate as f32,
                        &mut self.fir_coefficients2,
                    );
                    fir_filter::apply_kaiser_window(&mut self.fir_coefficients2, 60.0);
                    self.speed2_has_changed = false;
                }
            } else if self.speed2_has_changed {
                let cutoff = ((sample_rate / self.speed2) * SHELF_START_LOWPASS) as f32;
                if let Some((first, rest)) = self.filters2.split_first_mut() {
                    first.calculate_lowpass_coefficients(cutoff, sample_rate as f32);
                    for filter in rest {
                        filter.copy_coefficients(first);
                    }
                }
                self.speed2_has_changed = false;
            }
        } else {
            filter_mode2 = FilterMode::Highpass;
            if self.speed2_has_changed {
                let cutoff = (33.3 / self.speed2) as f32;
                if let Some((first, rest)) = self.filters2.split_first_mut() {
                    first.calculate_highpass_coefficients(cutoff, sample_rate as f32);
                    for filter in rest {
                        filter.copy_coefficients(first);
                    }
                }
                self.speed2_has_changed = false;
            }
        }

        (filter_mode1, filter_mode2, mug1, mug2)
    }

    /// Process one block, replacing the output.
    pub fn process(&mut self, input: &[&[f32]], output: &mut [&mut [f32]]) {
        if input.is_empty() || output.is_empty() {
            return;
        }
        let num_channels = self.buffers1.len().min(output.len());
        let total_frames = output[0].len();

        self.latch_parameters();
        let (filter_mode1, filter_mode2, mug1, mug2) = self.prepare_filters();

        if self.params.tomsound {
            self.process_tomsound(input, output, num_channels, total_frames);
            return;
        }

        let bsize = self.buffer_size;
        let bsize_f = bsize as f64;
        let speed1 = self.speed1;
        let speed2 = self.speed2;
        let speed1_int = speed1 as usize;
        let speed2_int = speed2 as usize;

        // every channel renders the same head trajectory, so stash the
        // positions and gain ramps and restore them between channels
        let saved_read1 = self.read1;
        let saved_read2 = self.read2;
        let saved_writer = self.writer;
        let saved_gains = (
            self.dry_mix.clone(),
            self.mix1.clone(),
            self.mix2.clone(),
            self.feed1.clone(),
            self.feed2.clone(),
        );

        for channel in 0..num_channels {
            if channel > 0 {
                self.read1 = saved_read1;
                self.read2 = saved_read2;
                self.writer = saved_writer;
                self.dry_mix = saved_gains.0.clone();
                self.mix1 = saved_gains.1.clone();
                self.mix2 = saved_gains.2.clone();
                self.feed1 = saved_gains.3.clone();
                self.feed2 = saved_gains.4.clone();
            }
            let source = input[channel.min(input.len() - 1)];

            // the lowpass filters trail along at the integer read position
            let mut lowpass1_pos = self.read1 as usize;
            let mut lowpass2_pos = self.read2 as usize;

            for frame in 0..total_frames {
                let read1_int = self.read1 as usize;
                let read2_int = self.read2 as usize;
                let in_sample = source[frame];

                let mut r1val: f32;
                let mut r2val: f32;
                match self.params.quality {
                    Quality::DirtFi => {
                        r1val = self.buffers1[channel][read1_int];
                        r2val = self.buffers2[channel][read2_int];
                    }
                    Quality::HiFi => {
                        r1val = interpolate_hermite_danger(
                            &self.buffers1[channel][..bsize],
                            self.read1,
                            danger_from_writer(self.writer, read1_int),
                        );
                        r2val = interpolate_hermite_danger(
                            &self.buffers2[channel][..bsize],
                            self.read2,
                            danger_from_writer(self.writer, read2_int),
                        );
                    }
                    Quality::UltraHiFi => {
                        r1val = match filter_mode1 {
                            FilterMode::Highpass | FilterMode::LowpassIir => {
                                // interpolate inside the filter output history
                                self.filters1[channel].interpolate_hermite_output(self.read1)
                            }
                            FilterMode::LowpassFir => {
                                // two consecutive FIR outputs, interpolated
                                // linearly with the filter gain made up
                                let buffer = &self.buffers1[channel][..bsize];
                                let pos = wrap_back(read1_int, fir_filter::NUM_TAPS, bsize);
                                let lp1 =
                                    fir_filter::process_fir(buffer, &self.fir_coefficients1, pos);
                                let lp2 = fir_filter::process_fir(
                                    buffer,
                                    &self.fir_coefficients1,
                                    (pos + 1) % bsize,
                                );
                                math::interpolate_linear_values(lp1, lp2, self.read1) * mug1
                            }
                            FilterMode::Nothing => interpolate_hermite_danger(
                                &self.buffers1[channel][..bsize],
                                self.read1,
                                danger_from_writer(self.writer, read1_int),
                            ),
                        };
                        r2val = match filter_mode2 {
                            FilterMode::Highpass | FilterMode::LowpassIir => {
                                self.filters2[channel].interpolate_hermite_output(self.read2)
                            }
                            FilterMode::LowpassFir => {
                                let buffer = &self.buffers2[channel][..bsize];
                                let pos = wrap_back(read2_int, fir_filter::NUM_TAPS, bsize);
                                let lp1 =
                                    fir_filter::process_fir(buffer, &self.fir_coefficients2, pos);
                                let lp2 = fir_filter::process_fir(
                                    buffer,
                                    &self.fir_coefficients2,
                                    (pos + 1) % bsize,
                                );
                                math::interpolate_linear_values(lp1, lp2, self.read2) * mug2
                            }
                            FilterMode::Nothing => interpolate_hermite_danger(
                                &self.buffers2[channel][..bsize],
                                self.read2,
                                danger_from_writer(self.writer, read2_int),
                            ),
                        };
                    }
                }

                // crossfade from the stored sample while smoothing is
                // in progress
                if self.smooth_count1[channel] > 0 {
                    let fade = self.smooth_step1[channel] * (self.smooth_count1[channel] as f32);
                    r1val = (r1val * (1.0 - fade)) + (self.last_read1[channel] * fade);
                    self.smooth_count1[channel] -= 1;
                }
                if self.smooth_count2[channel] > 0 {
                    let fade = self.smooth_step2[channel] * (self.smooth_count2[channel] as f32);
                    r2val = (r2val * (1.0 - fade)) + (self.last_read2[channel] * fade);
                    self.smooth_count2[channel] -= 1;
                }

                let mix1 = self.mix1.get_value();
                let mix2 = self.mix2.get_value();

                // write into the rings with feedback
                self.buffers1[channel][self.writer] = math::clamp_denormal(
                    in_sample + (self.feed1.get_value() * r1val * mix1),
                );
                self.buffers2[channel][self.writer] = math::clamp_denormal(
                    in_sample + (self.feed2.get_value() * r2val * mix2),
                );

                output[channel][frame] =
                    (in_sample * self.dry_mix.get_value()) + (r1val * mix1) + (r2val * mix2);

                // start a crossfade when a head is about to pass the writer
                // or vice versa, checked before wrapping either one
                let writer_next = (self.writer + 1) as i64;
                if ((read1_int < self.writer) && (((self.read1 + speed1) as i64) >= writer_next))
                    || ((read1_int >= self.writer)
                        && (((self.read1 + speed1) as i64) <= writer_next))
                {
                    // at slow speeds this can trip several samples in a row
                    if self.smooth_count1[channel] <= 0 {
                        self.last_read1[channel] = r1val;
                        // truncate the fade when the buffer is tiny
                        self.smooth_dur1[channel] = SMOOTH_DUR.min((bsize_f / speed1) as i64);
                        self.smooth_step1[channel] = 1.0 / (self.smooth_dur1[channel] as f32);
                        self.smooth_count1[channel] = self.smooth_dur1[channel];
                    }
                }
                if ((read2_int < self.writer) && (((self.read2 + speed2) as i64) >= writer_next))
                    || ((read2_int >= self.writer)
                        && (((self.read2 + speed2) as i64) <= writer_next))
                {
                    if self.smooth_count2[channel] <= 0 {
                        self.last_read2[channel] = r2val;
                        self.smooth_dur2[channel] = SMOOTH_DUR.min((bsize_f / speed2) as i64);
                        self.smooth_step2[channel] = 1.0 / (self.smooth_dur2[channel] as f32);
                        self.smooth_count2[channel] = self.smooth_dur2[channel];
                    }
                }

                self.writer = (self.writer + 1) % bsize;
                self.read1 += speed1;
                self.read2 += speed2;
                if self.read1 >= bsize_f {
                    self.read1 = self.read1.abs() % bsize_f;
                }
                if self.read2 >= bsize_f {
                    self.read2 = self.read2.abs() % bsize_f;
                }

                // the IIR lowpass has to consume as many ring samples as the
                // head passed over this frame to stay continuous
                if filter_mode1 == FilterMode::LowpassIir {
                    lowpass1_pos = self.catch_up_lowpass(1, channel, lowpass1_pos, speed1_int);
                    let read1_int = self.read1 as usize;
                    if ((lowpass1_pos < read1_int) && (lowpass1_pos + 1 == read1_int))
                        || ((lowpass1_pos == bsize - 1) && (read1_int == 0))
                    {
                        self.filters1[channel].process(self.buffers1[channel][lowpass1_pos]);
                        lowpass1_pos = (lowpass1_pos + 1) % bsize;
                    }
                } else if filter_mode1 == FilterMode::Highpass {
                    // only filter when a new integer position was reached
                    if (self.read1 as usize) != read1_int {
                        self.filters1[channel].process(self.buffers1[channel][read1_int]);
                    }
                }

                if filter_mode2 == FilterMode::LowpassIir {
                    lowpass2_pos = self.catch_up_lowpass(2, channel, lowpass2_pos, speed2_int);
                    let read2_int = self.read2 as usize;
                    if ((lowpass2_pos < read2_int) && (lowpass2_pos + 1 == read2_int))
                        || ((lowpass2_pos == bsize - 1) && (read2_int == 0))
                    {
                        self.filters2[channel].process(self.buffers2[channel][lowpass2_pos]);
                        lowpass2_pos = (lowpass2_pos + 1) % bsize;
                    }
                } else if filter_mode2 == FilterMode::Highpass {
                    if (self.read2 as usize) != read2_int {
                        self.filters2[channel].process(self.buffers2[channel][read2_int]);
                    }
                }

                self.dry_mix.inc();
                self.mix1.inc();
                self.mix2.inc();
                self.feed1.inc();
                self.feed2.inc();
            }
        }
    }

    // feed the lowpass all samples the head traversed, in up to 4-sample
    // strides
    fn catch_up_lowpass(
        &mut self,
        head: usize,
        channel: usize,
        start_pos: usize,
        speed_int: usize,
    ) -> usize {
        let bsize = self.buffer_size;
        let (filter, buffer) = if head == 1 {
            (&mut self.filters1[channel], &self.buffers1[channel])
        } else {
            (&mut self.filters2[channel], &self.buffers2[channel])
        };
        let buffer = &buffer[..bsize];

        let mut pos = start_pos;
        let mut count = 0;
        while count < speed_int {
            match speed_int - count {
                1 => {
                    filter.process(buffer[pos]);
                    pos = (pos + 1) % bsize;
                    count += 1;
                }
                2 => {
                    filter.process_2(buffer, pos);
                    pos = (pos + 2) % bsize;
                    count += 2;
                }
                3 => {
                    filter.process_3(buffer, pos);
                    pos = (pos + 3) % bsize;
                    count += 3;
                }
                _ => {
                    filter.process_4(buffer, pos);
                    pos = (pos + 4) % bsize;
                    count += 4;
                }
            }
        }
        pos
    }

    // the version 1.0 routing bug kept for its sound: both heads read the
    // first ring premultiplied by mix, and the heads advance once per
    // channel, so stereo scrubs twice as fast
    fn process_tomsound(
        &mut self,
        input: &[&[f32]],
        output: &mut [&mut [f32]],
        num_channels: usize,
        total_frames: usize,
    ) {
        let bsize = self.buffer_size;
        let bsize_f = bsize as f64;
        let speed1 = self.speed1;
        let speed2 = self.speed2;

        for frame in 0..total_frames {
            for channel in 0..num_channels {
                let in_sample = input[channel.min(input.len() - 1)][frame];
                let mix1 = self.mix1.get_value();
                let mix2 = self.mix2.get_value();

                let (r1val, r2val) = match self.params.quality {
                    Quality::DirtFi => (
                        mix1 * self.buffers1[channel][self.read1 as usize],
                        mix2 * self.buffers1[channel][self.read2 as usize],
                    ),
                    Quality::HiFi | Quality::UltraHiFi => (
                        mix1 * interpolate_hermite_danger(
                            &self.buffers1[channel][..bsize],
                            self.read1,
                            333,
                        ),
                        mix2 * interpolate_hermite_danger(
                            &self.buffers1[channel][..bsize],
                            self.read2,
                            333,
                        ),
                    ),
                };

                self.buffers1[channel][self.writer] = in_sample
                    + (self.feed1.get_value() * r1val)
                    + (self.feed2.get_value() * r2val);

                self.writer = (self.writer + 1) % bsize;
                self.read1 += speed1;
                self.read2 += speed2;
                if self.read1 >= bsize_f {
                    self.read1 = self.read1.abs() % bsize_f;
                }
                if self.read2 >= bsize_f {
                    self.read2 = self.read2.abs() % bsize_f;
                }

                output[channel][frame] =
                    (in_sample * self.dry_mix.get_value()) + r1val + r2val;
            }

            self.dry_mix.inc();
            self.mix1.inc();
            self.mix2.inc();
            self.feed1.inc();
            self.feed2.inc();
        }
    }
}

// how many contiguous samples ahead of the read position are trustworthy,
// given where the writer is
#[inline]
fn danger_from_writer(writer: usize, read_int: usize) -> i64 {
    (writer as i64) - (read_int as i64)
}

// step a ring index back by a tap count without going negative
#[inline]
fn wrap_back(pos: usize, offset: usize, len: usize) -> usize {
    (((pos + len) as i64) - (offset as i64)).rem_euclid(len as i64) as usize
}

/// 4-point Hermite interpolation over a ring where the writer may sit
/// inside the interpolation window. The danger value is the distance from
/// the read position to the writer; discontiguous neighbor samples are
/// replaced with repeats.
fn interpolate_hermite_danger(data: &[f32], address: f64, danger: i64) -> f32 {
    let arraysize = data.len();
    let pos = address as usize;
    let pos_fract = (address - (pos as f64)) as f32;

    let (pos_minus1, pos_plus1, pos_plus2) = match danger {
        // the previous sample is bogus
        0 => (pos, (pos + 1) % arraysize, (pos + 2) % arraysize),
        // the next 2 samples are bogus
        1 => (if pos == 0 { arraysize - 1 } else { pos - 1 }, pos, pos),
        // the sample 2 steps ahead is bogus
        2 => {
            let plus1 = (pos + 1) % arraysize;
            (if pos == 0 { arraysize - 1 } else { pos - 1 }, plus1, plus1)
        }
        // everything is contiguous
        _ => (
            if pos == 0 { arraysize - 1 } else { pos - 1 },
            (pos + 1) % arraysize,
            (pos + 2) % arraysize,
        ),
    };

    let a = ((3.0 * (data[pos] - data[pos_plus1])) - data[pos_minus1] + data[pos_plus2]) * 0.5;
    let b = (2.0 * data[pos_plus1]) + data[pos_minus1]
        - (2.5 * data[pos])
        - (data[pos_plus2] * 0.5);
    let c = (data[pos_plus1] - data[pos_minus1]) * 0.5;

    ((((a * pos_fract) + b) * pos_fract + c) * pos_fract) + data[pos]
}
