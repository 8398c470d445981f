//! Temporal reasoning over a decoded beat timeline: measure positions and
//! tempo.

mod measure;
mod tempo;

pub use measure::{annotate, MeasureAnnotator};
pub use tempo::{estimate_bpm, TempoEstimator};
