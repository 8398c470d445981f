//! Core library for beatcount.
//!
//! Turns a recording into a timeline of beats, each labelled with its
//! position inside the measure, and renders click tracks from such timelines.
//! The stages run in order: [`audio::AudioIngest`] normalises the input,
//! a [`features::FeatureExtractor`] builds the spectrogram, an
//! [`inference::InferenceEngine`] scores every frame, a
//! [`decoder::BeatDecoder`] picks beat times, and the [`analysis`] module
//! counts measures and estimates tempo. [`pipeline::BeatTracker`] wires them
//! together.

pub mod analysis;
pub mod audio;
pub mod click;
pub mod config;
pub mod decoder;
pub mod error;
pub mod features;
pub mod inference;
pub mod mix;
pub mod pipeline;
pub mod timeline;

pub use analysis::{annotate, estimate_bpm, MeasureAnnotator, TempoEstimator};
pub use audio::{read_wav, write_wav, AudioBuffer, AudioIngest};
pub use click::{normalize_peak, ClickSynthesizer};
pub use config::{
    AnnotatorConfig, ClickConfig, DecoderConfig, InferenceConfig, IngestConfig, MelConfig,
    MixConfig, PipelineConfig, TempoConfig,
};
pub use decoder::{BeatDecoder, PeakPickingDecoder};
pub use error::{BeatCountError, Result, Stage};
pub use features::{FeatureExtractor, MelSpectrogram, Spectrogram};
#[cfg(feature = "onnx")]
pub use inference::OnnxBeatModel;
pub use inference::{Activations, InferenceEngine};
pub use mix::Mixer;
pub use pipeline::{BeatAnalysis, BeatTracker};
pub use timeline::{
    read_timeline_file, write_timeline_file, AnnotatedBeat, BeatTimeline, TIME_TOLERANCE,
};
