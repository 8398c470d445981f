use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    analysis::{MeasureAnnotator, TempoEstimator},
    audio::{AudioBuffer, AudioIngest},
    click::ClickSynthesizer,
    config::PipelineConfig,
    decoder::{BeatDecoder, PeakPickingDecoder},
    features::{FeatureExtractor, MelSpectrogram},
    inference::InferenceEngine,
    mix::Mixer,
    timeline::{AnnotatedBeat, BeatTimeline},
    BeatCountError, Result,
};

/// Everything the pipeline learns about one recording.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeatAnalysis {
    pub timeline: BeatTimeline,
    pub beats: Vec<AnnotatedBeat>,
    /// 0.0 when undetermined.
    pub bpm: f64,
}

impl BeatAnalysis {
    pub fn tempo_bpm(&self) -> Option<f64> {
        (self.bpm > 0.0).then_some(self.bpm)
    }
}

/// Offline beat tracker. Owns the model handle, so it can be reused across
/// recordings one at a time.
pub struct BeatTracker {
    config: PipelineConfig,
    ingest: AudioIngest,
    extractor: Box<dyn FeatureExtractor>,
    engine: Box<dyn InferenceEngine>,
    decoder: Box<dyn BeatDecoder>,
    annotator: MeasureAnnotator,
    tempo: TempoEstimator,
}

impl BeatTracker {
    /// Tracker using the mel spectrogram front end and peak-picking decoder.
    pub fn new(config: PipelineConfig, engine: Box<dyn InferenceEngine>) -> Result<Self> {
        let extractor = Box::new(MelSpectrogram::new(config.features.clone()));
        let decoder = Box::new(PeakPickingDecoder::from_config(&config.decoder));
        Self::with_stages(config, extractor, engine, decoder)
    }

    pub fn with_stages(
        config: PipelineConfig,
        extractor: Box<dyn FeatureExtractor>,
        engine: Box<dyn InferenceEngine>,
        decoder: Box<dyn BeatDecoder>,
    ) -> Result<Self> {
        config.validate()?;
        if extractor.sample_rate() != config.ingest.target_sample_rate {
            return Err(BeatCountError::Config(format!(
                "feature extractor expects {} Hz but ingest produces {} Hz",
                extractor.sample_rate(),
                config.ingest.target_sample_rate
            )));
        }

        Ok(Self {
            ingest: AudioIngest::from_config(&config.ingest),
            annotator: MeasureAnnotator::from_config(&config.annotator),
            tempo: TempoEstimator::from_config(&config.tempo),
            config,
            extractor,
            engine,
            decoder,
        })
    }

    /// Loads an ONNX model and builds the default tracker around it.
    #[cfg(feature = "onnx")]
    pub fn from_model_path(
        path: impl AsRef<std::path::Path>,
        config: PipelineConfig,
    ) -> Result<Self> {
        let model = crate::inference::OnnxBeatModel::load(path, config.inference.clone())?;
        Self::new(config, Box::new(model))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every stage on `audio`.
    pub fn process(&mut self, audio: &AudioBuffer) -> Result<BeatAnalysis> {
        let mono = self.ingest.ingest(audio.clone())?;
        let spectrogram = self.extractor.extract(mono.samples())?;
        let activations = self.engine.infer(&spectrogram)?;
        if activations.len() != spectrogram.frames() {
            return Err(BeatCountError::Inference(format!(
                "model returned {} frames for {} spectrogram frames",
                activations.len(),
                spectrogram.frames()
            )));
        }

        let timeline = self.decoder.decode(&activations)?;
        if let Err(err) = timeline.check_consistency(self.config.annotator.tolerance) {
            tracing::error!(%err, "decoded timeline is inconsistent");
        }
        let beats = self.annotator.annotate(&timeline);
        let bpm = self.tempo.estimate_bpm(timeline.beats());

        tracing::info!(
            beats = timeline.len(),
            downbeats = timeline.downbeats().len(),
            bpm,
            "analysed audio"
        );
        Ok(BeatAnalysis {
            timeline,
            beats,
            bpm,
        })
    }

    /// Standalone click track at the configured render rate.
    pub fn click_track(&self, analysis: &BeatAnalysis) -> Result<AudioBuffer> {
        ClickSynthesizer::new(self.config.click.clone())
            .synthesize(&analysis.beats, self.config.click.sample_rate)
    }

    /// Click track laid over `original`.
    pub fn mix(&self, analysis: &BeatAnalysis, original: &AudioBuffer) -> Result<AudioBuffer> {
        Mixer::new(self.config.click.clone(), self.config.mix.clone()).mix(&analysis.beats, original)
    }
}

impl fmt::Debug for BeatTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeatTracker")
            .field("config", &self.config)
            .field("ingest", &self.ingest)
            .finish()
    }
}
