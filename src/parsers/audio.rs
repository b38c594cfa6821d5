//! WAV decode/encode collaborator for audio-backed fields.
//!
//! Audio parsers treat a manifest cell as a file path and delegate the codec
//! work here. Decoding normalizes to the requested numeric encoding: 16-bit
//! integer samples keep the native PCM scale, float encodings keep the
//! decoder's normalized [-1, 1] range. Only mono files are accepted.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

/// Errors raised while decoding or encoding an audio file.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    /// The underlying WAV codec failed (missing file, truncated data, ...)
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Multi-channel input; only mono material can be packed
    #[error("'{path}' has {channels} channels, only mono files are supported")]
    ChannelCount {
        /// Offending file
        path: String,
        /// Channel count found in the header
        channels: u16,
    },

    /// Integer sample width outside the supported 8..=32 bit range
    #[error("'{path}' uses an unsupported sample width of {bits} bits")]
    UnsupportedBits {
        /// Offending file
        path: String,
        /// Bits per sample found in the header
        bits: u16,
    },
}

fn check_mono(path: &Path, spec: &WavSpec) -> Result<(), AudioError> {
    if spec.channels != 1 {
        return Err(AudioError::ChannelCount {
            path: path.display().to_string(),
            channels: spec.channels,
        });
    }
    Ok(())
}

/// Reads a mono WAV file as normalized `f64` samples plus its sample rate.
pub fn read_f64(path: &Path) -> Result<(Vec<f64>, u32), AudioError> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    check_mono(path, &spec)?;

    let samples = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(f64::from))
            .collect::<Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let scale = int_scale(path, spec.bits_per_sample)?;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f64 / scale))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok((samples, spec.sample_rate))
}

/// Reads a mono WAV file as normalized `f32` samples plus its sample rate.
pub fn read_f32(path: &Path) -> Result<(Vec<f32>, u32), AudioError> {
    let (samples, fs) = read_f64(path)?;
    Ok((samples.into_iter().map(|v| v as f32).collect(), fs))
}

/// Reads a mono WAV file as `i16` samples at the native PCM scale.
///
/// Float sources are rescaled to the 16-bit PCM range with rounding and
/// clipping; integer sources wider than 16 bits are truncated to it.
pub fn read_i16(path: &Path) -> Result<(Vec<i16>, u32), AudioError> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    check_mono(path, &spec)?;

    let samples = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(|v| clip_to_i16(f64::from(v))))
            .collect::<Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let scale = int_scale(path, spec.bits_per_sample)?;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| clip_to_i16(v as f64 / scale)))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok((samples, spec.sample_rate))
}

/// Writes mono 16-bit PCM samples to a WAV file.
pub fn write_i16(path: &Path, samples: &[i16], sample_rate: u32) -> Result<(), AudioError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Writes mono 32-bit float samples to a WAV file.
pub fn write_f32(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), AudioError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Writes mono `f64` samples as a 32-bit float WAV file.
///
/// WAV has no 64-bit float subtype, so samples are narrowed to `f32` on the
/// way out. Data decoded from WAV in the first place survives unchanged.
pub fn write_f64(path: &Path, samples: &[f64], sample_rate: u32) -> Result<(), AudioError> {
    let narrowed: Vec<f32> = samples.iter().map(|&v| v as f32).collect();
    write_f32(path, &narrowed, sample_rate)
}

fn int_scale(path: &Path, bits: u16) -> Result<f64, AudioError> {
    if !(8..=32).contains(&bits) {
        return Err(AudioError::UnsupportedBits {
            path: path.display().to_string(),
            bits,
        });
    }
    Ok(f64::from(1u32 << (bits - 1)))
}

fn clip_to_i16(normalized: f64) -> i16 {
    (normalized * 32768.0).round().clamp(-32768.0, 32767.0) as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn i16_roundtrip_preserves_samples() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<i16> = vec![0, 1, -1, i16::MAX, i16::MIN, 12345];

        write_i16(&path, &samples, 16_000).unwrap();
        let (read, fs) = read_i16(&path).unwrap();

        assert_eq!(fs, 16_000);
        assert_eq!(read, samples);
    }

    #[test]
    fn float_source_clips_to_i16_range() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hot.wav");
        // 1.5 is out of range and must clip instead of wrapping
        write_f32(&path, &[0.0, 0.5, -0.5, 1.5, -1.5], 8_000).unwrap();

        let (read, _) = read_i16(&path).unwrap();
        assert_eq!(read[0], 0);
        assert_eq!(read[1], 16384);
        assert_eq!(read[2], -16384);
        assert_eq!(read[3], i16::MAX);
        assert_eq!(read[4], i16::MIN);
    }

    #[test]
    fn int_source_normalizes_to_float() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pcm.wav");
        write_i16(&path, &[16384, -16384], 44_100).unwrap();

        let (read, fs) = read_f32(&path).unwrap();
        assert_eq!(fs, 44_100);
        assert!((read[0] - 0.5).abs() < 1e-6);
        assert!((read[1] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn missing_file_is_a_wav_error() {
        let err = read_i16(Path::new("/nonexistent/audio.wav")).unwrap_err();
        assert!(matches!(err, AudioError::Wav(_)));
    }
}
