//! Audio buffers and the normalisation applied before feature extraction.

mod resample;
mod wav;

pub use resample::resample_mono;
pub use wav::{read_wav, write_wav};

use crate::{config::IngestConfig, BeatCountError, Result, Stage};

/// Interleaved floating point audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl AudioBuffer {
    /// Wraps interleaved samples. The sample count must be a whole number of
    /// frames.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self> {
        if sample_rate == 0 {
            return Err(BeatCountError::invalid_input(
                Stage::Ingest,
                "sample rate must be positive",
            ));
        }
        if channels == 0 {
            return Err(BeatCountError::invalid_input(
                Stage::Ingest,
                "channel count must be at least one",
            ));
        }
        if samples.len() % channels as usize != 0 {
            return Err(BeatCountError::invalid_input(
                Stage::Ingest,
                format!(
                    "{} samples do not divide into {channels} channels",
                    samples.len()
                ),
            ));
        }

        Ok(Self {
            samples,
            sample_rate,
            channels,
        })
    }

    /// Single channel buffer.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        Self::new(samples, sample_rate, 1)
    }

    /// Zero-filled buffer holding `frames` frames.
    pub fn silence(frames: usize, sample_rate: u32, channels: u16) -> Result<Self> {
        Self::new(vec![0.0; frames * channels as usize], sample_rate, channels)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Averages every frame's channels in place. Mono buffers are untouched.
    pub fn downmix(&mut self) {
        let channels = self.channels as usize;
        if channels == 1 {
            return;
        }

        let frames = self.frames();
        for frame in 0..frames {
            let start = frame * channels;
            let sum: f32 = self.samples[start..start + channels].iter().sum();
            self.samples[frame] = sum / channels as f32;
        }
        self.samples.truncate(frames);
        self.channels = 1;
    }
}

/// Turns arbitrary input audio into the mono signal the feature extractor
/// expects.
#[derive(Debug, Clone)]
pub struct AudioIngest {
    target_rate: u32,
}

impl AudioIngest {
    pub fn new(target_rate: u32) -> Self {
        Self { target_rate }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(config.target_sample_rate)
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Downmixes and resamples. The result is always mono at the target rate.
    pub fn ingest(&self, mut buffer: AudioBuffer) -> Result<AudioBuffer> {
        let source_rate = buffer.sample_rate();
        let source_channels = buffer.channels();
        buffer.downmix();

        if source_rate == self.target_rate {
            return Ok(buffer);
        }

        let resampled = resample_mono(buffer.samples(), source_rate, self.target_rate)?;
        tracing::debug!(
            source_rate,
            source_channels,
            target_rate = self.target_rate,
            frames_in = buffer.frames(),
            frames_out = resampled.len(),
            "normalised input audio"
        );
        AudioBuffer::mono(resampled, self.target_rate)
    }
}
