//! Writer for WAV files

use std::path::Path;

use hound::*;

/// Writes mono sample data as WAV file in 32-bit float format, duplicated
/// onto both channels.
pub fn write(
    filename: impl AsRef<std::path::Path> + core::fmt::Display,
    sample_rate: f64,
    samples: &[f32],
) -> std::io::Result<()> {
    let path = format!("out/{filename}");
    let path = Path::new(path.as_str());

    // Create parent directories to the path if they don't exist.
    let parent = path.parent().unwrap();
    std::fs::create_dir_all(parent).ok();

    let spec = WavSpec {
        channels: 2,
        sample_rate: sample_rate as u32,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();

    for sample in samples {
        writer.write_sample(*sample).unwrap();
        writer.write_sample(*sample).unwrap();
    }

    Ok(())
}

/// Writes a stereo pair as WAV file in 32-bit float format.
pub fn write_stereo(
    filename: impl AsRef<std::path::Path> + core::fmt::Display,
    sample_rate: f64,
    left: &[f32],
    right: &[f32],
) -> std::io::Result<()> {
    let path = format!("out/{filename}");
    let path = Path::new(path.as_str());

    let parent = path.parent().unwrap();
    std::fs::create_dir_all(parent).ok();

    let spec = WavSpec {
        channels: 2,
        sample_rate: sample_rate as u32,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();

    for (sample_left, sample_right) in left.iter().zip(right.iter()) {
        writer.write_sample(*sample_left).unwrap();
        writer.write_sample(*sample_right).unwrap();
    }

    Ok(())
}
