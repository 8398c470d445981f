//! Model inference: spectrogram in, per-frame beat and downbeat logits out.

#[cfg(feature = "onnx")]
mod onnx;

#[cfg(feature = "onnx")]
pub use onnx::OnnxBeatModel;

use crate::{config::InferenceConfig, features::Spectrogram, BeatCountError, Result};

/// Logit assigned to frames no chunk prediction covered.
pub const UNCOVERED_LOGIT: f32 = -1000.0;

/// Per-frame beat and downbeat logits, aligned with the spectrogram frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Activations {
    beat: Vec<f32>,
    downbeat: Vec<f32>,
}

impl Activations {
    pub fn new(beat: Vec<f32>, downbeat: Vec<f32>) -> Result<Self> {
        if beat.len() != downbeat.len() {
            return Err(BeatCountError::Inference(format!(
                "beat and downbeat outputs differ in length ({} vs {})",
                beat.len(),
                downbeat.len()
            )));
        }
        Ok(Self { beat, downbeat })
    }

    pub fn beat(&self) -> &[f32] {
        &self.beat
    }

    pub fn downbeat(&self) -> &[f32] {
        &self.downbeat
    }

    pub fn len(&self) -> usize {
        self.beat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beat.is_empty()
    }
}

/// A loaded beat model. Implementations own their runtime handle, so one
/// engine serves any number of sequential calls but not concurrent ones.
pub trait InferenceEngine {
    fn infer(&mut self, spectrogram: &Spectrogram) -> Result<Activations>;
}

/// Start frame of every chunk. The first chunk starts `border` frames before
/// the piece and the last one is pulled back so it ends `border` frames past
/// the end.
pub fn chunk_starts(frames: usize, config: &InferenceConfig) -> Vec<isize> {
    let len = frames as isize;
    let chunk = config.chunk_size as isize;
    let border = config.border_size as isize;
    let step = chunk - 2 * border;

    let mut starts = Vec::new();
    let mut start = -border;
    while start < len - border {
        starts.push(start);
        start += step;
    }

    if len > step {
        if let Some(last) = starts.last_mut() {
            *last = len - (chunk - border);
        }
    }
    starts
}

/// Copies the chunk starting at `start`, zero padding whatever lies outside the
/// piece (at most `border` frames on the right).
fn cut_chunk(spectrogram: &Spectrogram, start: isize, config: &InferenceConfig) -> Spectrogram {
    let len = spectrogram.frames() as isize;
    let chunk = config.chunk_size as isize;
    let border = config.border_size as isize;

    let first = start.max(0);
    let end = (start + chunk).min(len);
    let left_pad = (-start).max(0);
    let right_pad = (start + chunk - len).min(border).max(0);
    let inner = (end - first).max(0);

    let frames = (left_pad + inner + right_pad) as usize;
    let mut out = Spectrogram::zeros(frames, spectrogram.bins());
    for offset in 0..inner {
        let source = (first + offset) as usize;
        let target = (left_pad + offset) as usize;
        out.row_mut(target).copy_from_slice(spectrogram.row(source));
    }
    out
}

/// Runs `run` over overlapping chunks and stitches the predictions back
/// together. Where chunks overlap the earlier chunk wins; `border` frames at
/// each chunk edge are dropped unless the chunk is too short to have any.
pub fn infer_chunked<F>(
    spectrogram: &Spectrogram,
    config: &InferenceConfig,
    mut run: F,
) -> Result<Activations>
where
    F: FnMut(&Spectrogram) -> Result<Activations>,
{
    let len = spectrogram.frames();
    let starts = chunk_starts(len, config);
    let mut predictions = Vec::with_capacity(starts.len());
    for &start in &starts {
        let chunk = cut_chunk(spectrogram, start, config);
        let prediction = run(&chunk)?;
        if prediction.len() != chunk.frames() {
            return Err(BeatCountError::Inference(format!(
                "model returned {} frames for a chunk of {}",
                prediction.len(),
                chunk.frames()
            )));
        }
        predictions.push(prediction);
    }

    let border = config.border_size;
    let mut beat = vec![UNCOVERED_LOGIT; len];
    let mut downbeat = vec![UNCOVERED_LOGIT; len];
    for (prediction, &start) in predictions.iter().zip(&starts).rev() {
        let kept = if prediction.len() < 2 * border {
            0..prediction.len()
        } else {
            border..prediction.len() - border
        };
        for j in kept {
            let target = start + j as isize;
            if (0..len as isize).contains(&target) {
                beat[target as usize] = prediction.beat()[j];
                downbeat[target as usize] = prediction.downbeat()[j];
            }
        }
    }

    tracing::debug!(frames = len, chunks = starts.len(), "aggregated chunk predictions");
    Activations::new(beat, downbeat)
}
