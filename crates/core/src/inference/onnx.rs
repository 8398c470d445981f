use std::{fmt, path::Path};

use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};

use super::{infer_chunked, Activations, InferenceEngine};
use crate::{config::InferenceConfig, features::Spectrogram, BeatCountError, Result};

const INPUT_NAME: &str = "input_spectrogram";
const BEAT_OUTPUT: &str = "beat";
const DOWNBEAT_OUTPUT: &str = "downbeat";

/// Beat model exported to ONNX, run through ONNX Runtime.
///
/// Takes `[1, frames, bins]` and returns `beat` and `downbeat` logits of
/// `[1, frames]` each.
pub struct OnnxBeatModel {
    session: Session,
    config: InferenceConfig,
}

impl OnnxBeatModel {
    pub fn load(path: impl AsRef<Path>, config: InferenceConfig) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(BeatCountError::Config(format!(
                "model file {} does not exist",
                path.display()
            )));
        }

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(path)
            .map_err(|err| {
                BeatCountError::Config(format!("cannot load model {}: {err}", path.display()))
            })?;

        tracing::info!(?path, "loaded onnx beat model");
        Ok(Self { session, config })
    }
}

impl InferenceEngine for OnnxBeatModel {
    fn infer(&mut self, spectrogram: &Spectrogram) -> Result<Activations> {
        let session = &mut self.session;
        infer_chunked(spectrogram, &self.config, |chunk| run_chunk(session, chunk))
    }
}

fn run_chunk(session: &mut Session, chunk: &Spectrogram) -> Result<Activations> {
    let input = Tensor::from_array((
        [1usize, chunk.frames(), chunk.bins()],
        chunk.data().to_vec(),
    ))?;
    let outputs = session.run(ort::inputs![INPUT_NAME => input])?;

    let (_, beat) = outputs[BEAT_OUTPUT].try_extract_tensor::<f32>()?;
    let (_, downbeat) = outputs[DOWNBEAT_OUTPUT].try_extract_tensor::<f32>()?;
    Activations::new(beat.to_vec(), downbeat.to_vec())
}

impl fmt::Debug for OnnxBeatModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxBeatModel")
            .field("config", &self.config)
            .finish()
    }
}
