use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{BeatCountError, Result};

/// Top-level configuration structure for the analysis pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub ingest: IngestConfig,
    pub features: MelConfig,
    pub inference: InferenceConfig,
    pub decoder: DecoderConfig,
    pub annotator: AnnotatorConfig,
    pub tempo: TempoConfig,
    pub click: ClickConfig,
    pub mix: MixConfig,
}

impl PipelineConfig {
    /// Loads a JSON configuration file. Missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| {
            BeatCountError::Config(format!("cannot read {}: {err}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        tracing::debug!(?path, "loaded pipeline configuration");
        Ok(config)
    }

    /// Rejects settings the stages cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.ingest.target_sample_rate == 0 {
            return Err(invalid("ingest.target_sample_rate must be positive"));
        }
        if self.ingest.target_sample_rate != self.features.sample_rate {
            return Err(invalid(
                "ingest.target_sample_rate must match features.sample_rate",
            ));
        }
        self.features.validate()?;
        if self.inference.chunk_size <= 2 * self.inference.border_size {
            return Err(invalid(
                "inference.chunk_size must exceed twice the border size",
            ));
        }
        if self.decoder.fps <= 0.0 {
            return Err(invalid("decoder.fps must be positive"));
        }
        if self.decoder.pool_kernel == 0 || self.decoder.pool_kernel % 2 == 0 {
            return Err(invalid("decoder.pool_kernel must be odd"));
        }
        if self.annotator.tolerance.is_nan() || self.annotator.tolerance < 0.0 {
            return Err(invalid("annotator.tolerance must be non-negative"));
        }
        if !(self.tempo.min_interval > 0.0 && self.tempo.min_interval < self.tempo.max_interval) {
            return Err(invalid(
                "tempo.min_interval must be positive and below tempo.max_interval",
            ));
        }
        self.click.validate()?;
        if self.mix.click_gain < 0.0 || self.mix.original_gain < 0.0 {
            return Err(invalid("mix gains must be non-negative"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> BeatCountError {
    BeatCountError::Config(message.to_string())
}

/// Normalisation applied before feature extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub target_sample_rate: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 22_050,
        }
    }
}

/// Mel spectrogram parameters. They must match what the model was trained on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MelConfig {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub f_min: f64,
    pub f_max: f64,
    pub n_mels: usize,
    pub log_multiplier: f64,
    pub amin: f64,
}

impl Default for MelConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22_050,
            n_fft: 1024,
            hop_length: 441,
            f_min: 30.0,
            f_max: 11_000.0,
            n_mels: 128,
            log_multiplier: 1000.0,
            amin: 1e-10,
        }
    }
}

impl MelConfig {
    /// Frames per second produced by this configuration.
    pub fn frame_rate(&self) -> f64 {
        self.sample_rate as f64 / self.hop_length as f64
    }

    fn validate(&self) -> Result<()> {
        if self.n_fft < 2 || self.hop_length == 0 || self.n_mels == 0 {
            return Err(invalid("features.n_fft, hop_length and n_mels must be positive"));
        }
        let nyquist = self.sample_rate as f64 / 2.0;
        if !(self.f_min >= 0.0 && self.f_min < self.f_max && self.f_max <= nyquist) {
            return Err(invalid("features.f_min/f_max must satisfy 0 <= f_min < f_max <= nyquist"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Frames per model invocation.
    pub chunk_size: usize,
    /// Frames discarded at each chunk edge.
    pub border_size: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1500,
            border_size: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub fps: f64,
    pub pool_kernel: usize,
    pub dedup_width: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            fps: 50.0,
            pool_kernel: 7,
            dedup_width: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotatorConfig {
    /// Maximum distance in seconds for a downbeat to count as a beat.
    pub tolerance: f64,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            tolerance: crate::timeline::TIME_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    pub min_interval: f64,
    pub max_interval: f64,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            min_interval: 0.1,
            max_interval: 3.0,
        }
    }
}

/// Envelope and pitch of the rendered click tones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickConfig {
    pub tone_duration: f64,
    pub attack_time: f64,
    pub decay_time: f64,
    pub downbeat_frequency: f64,
    pub beat_frequency: f64,
    /// Rate used when rendering a standalone click track.
    pub sample_rate: u32,
}

impl Default for ClickConfig {
    fn default() -> Self {
        Self {
            tone_duration: 0.1,
            attack_time: 0.01,
            decay_time: 0.05,
            downbeat_frequency: 880.0,
            beat_frequency: 440.0,
            sample_rate: 44_100,
        }
    }
}

impl ClickConfig {
    /// Seconds of audio needed after the last beat.
    pub fn tail_seconds(&self) -> f64 {
        self.tone_duration + self.decay_time
    }

    fn validate(&self) -> Result<()> {
        if self.tone_duration.is_nan()
            || self.tone_duration <= 0.0
            || self.attack_time < 0.0
            || self.decay_time < 0.0
        {
            return Err(invalid("click durations must be positive"));
        }
        if self.attack_time + self.decay_time > self.tone_duration {
            return Err(invalid("click attack and decay must fit inside the tone"));
        }
        if !(self.downbeat_frequency > 0.0 && self.beat_frequency > 0.0) {
            return Err(invalid("click frequencies must be positive"));
        }
        if self.sample_rate == 0 {
            return Err(invalid("click.sample_rate must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MixConfig {
    pub click_gain: f32,
    pub original_gain: f32,
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            click_gain: 0.3,
            original_gain: 0.7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert!((config.features.frame_rate() - config.decoder.fps).abs() < 1e-9);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "mix": { "click_gain": 0.5 } }"#).unwrap();
        assert_eq!(config.mix.click_gain, 0.5);
        assert_eq!(config.mix.original_gain, 0.7);
        assert_eq!(config.click.beat_frequency, 440.0);
    }

    #[test]
    fn rejects_envelope_longer_than_tone() {
        let mut config = PipelineConfig::default();
        config.click.decay_time = 0.2;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, BeatCountError::Config(_)));
    }

    #[test]
    fn rejects_even_pool_kernel() {
        let mut config = PipelineConfig::default();
        config.decoder.pool_kernel = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_nan_settings() {
        let mut config = PipelineConfig::default();
        config.annotator.tolerance = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.click.tone_duration = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "tempo": { "max_interval": 2.0 } }"#).unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.tempo.max_interval, 2.0);
        assert_eq!(config.tempo.min_interval, 0.1);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = PipelineConfig::from_json_file("/nonexistent/beatcount.json").unwrap_err();
        assert!(matches!(err, BeatCountError::Config(_)));
    }
}
