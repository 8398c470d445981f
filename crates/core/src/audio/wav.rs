use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use super::AudioBuffer;
use crate::{BeatCountError, Result, Stage};

/// Reads a WAV file into an interleaved float buffer. Integer PCM is scaled
/// into `[-1, 1]`.
pub fn read_wav(path: impl AsRef<Path>) -> Result<AudioBuffer> {
    let path = path.as_ref();
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(BeatCountError::invalid_input(
                    Stage::Io,
                    format!("unsupported bit depth: {}", spec.bits_per_sample),
                ));
            }
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    tracing::info!(
        ?path,
        sample_rate = spec.sample_rate,
        channels = spec.channels,
        samples = samples.len(),
        "loaded audio"
    );
    AudioBuffer::new(samples, spec.sample_rate, spec.channels)
}

/// Writes the buffer as 32-bit float WAV.
pub fn write_wav(path: impl AsRef<Path>, buffer: &AudioBuffer) -> Result<()> {
    let path = path.as_ref();
    let spec = WavSpec {
        channels: buffer.channels(),
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in buffer.samples() {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    tracing::info!(?path, frames = buffer.frames(), "wrote audio");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_wav_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let buffer = AudioBuffer::new(vec![0.5, -0.5, 0.25, -0.25], 44_100, 2).unwrap();

        write_wav(&path, &buffer).unwrap();
        let loaded = read_wav(&path).unwrap();

        assert_eq!(loaded, buffer);
    }

    #[test]
    fn int_wav_is_scaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pcm16.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        writer.write_sample(16_384_i16).unwrap();
        writer.write_sample(-32_768_i16).unwrap();
        writer.finalize().unwrap();

        let loaded = read_wav(&path).unwrap();
        assert_eq!(loaded.samples(), &[0.5, -1.0]);
        assert_eq!(loaded.sample_rate(), 8_000);
    }

    #[test]
    fn unsupported_bit_depth_fails_as_io() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pcm64.wav");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&44_u32.to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16_u32.to_le_bytes());
        bytes.extend_from_slice(&1_u16.to_le_bytes());
        bytes.extend_from_slice(&1_u16.to_le_bytes());
        bytes.extend_from_slice(&8_000_u32.to_le_bytes());
        bytes.extend_from_slice(&64_000_u32.to_le_bytes());
        bytes.extend_from_slice(&8_u16.to_le_bytes());
        bytes.extend_from_slice(&64_u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&8_u32.to_le_bytes());
        bytes.extend_from_slice(&[0; 8]);
        std::fs::write(&path, bytes).unwrap();

        let err = read_wav(&path).unwrap_err();
        assert_eq!(err.stage(), Stage::Io);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(read_wav("/nonexistent/input.wav").is_err());
    }
}
