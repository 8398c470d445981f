//! Logits to discrete beat and downbeat times.

use std::cmp::Ordering;

use crate::{config::DecoderConfig, inference::Activations, timeline::BeatTimeline, Result};

pub trait BeatDecoder {
    fn decode(&self, activations: &Activations) -> Result<BeatTimeline>;
}

/// Local-maximum peak picking followed by downbeat-to-beat snapping.
#[derive(Debug, Clone)]
pub struct PeakPickingDecoder {
    fps: f64,
    pool_kernel: usize,
    dedup_width: usize,
}

impl Default for PeakPickingDecoder {
    fn default() -> Self {
        Self::from_config(&DecoderConfig::default())
    }
}

impl PeakPickingDecoder {
    pub fn from_config(config: &DecoderConfig) -> Self {
        Self {
            fps: config.fps,
            pool_kernel: config.pool_kernel.max(1),
            dedup_width: config.dedup_width,
        }
    }

    fn peak_times(&self, logits: &[f32]) -> Vec<f64> {
        let frames = dedup_peaks(&local_maxima(logits, self.pool_kernel / 2), self.dedup_width);
        let mut times: Vec<f64> = frames.into_iter().map(|frame| frame as f64 / self.fps).collect();
        times.dedup();
        times
    }
}

impl BeatDecoder for PeakPickingDecoder {
    fn decode(&self, activations: &Activations) -> Result<BeatTimeline> {
        let beats = self.peak_times(activations.beat());
        let mut downbeats: Vec<f64> = self
            .peak_times(activations.downbeat())
            .into_iter()
            .filter_map(|time| nearest(&beats, time))
            .collect();
        downbeats.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        downbeats.dedup();

        tracing::debug!(
            beats = beats.len(),
            downbeats = downbeats.len(),
            "decoded beat timeline"
        );
        BeatTimeline::new(beats, downbeats)
    }
}

/// Frames that are positive and the maximum of the window `frame ± half`.
fn local_maxima(logits: &[f32], half: usize) -> Vec<usize> {
    (0..logits.len())
        .filter(|&frame| {
            let value = logits[frame];
            let lo = frame.saturating_sub(half);
            let hi = (frame + half + 1).min(logits.len());
            value > 0.0 && logits[lo..hi].iter().all(|&other| other <= value)
        })
        .collect()
}

/// Merges runs of peaks no more than `width` frames from the running mean of
/// their group into the rounded mean.
fn dedup_peaks(peaks: &[usize], width: usize) -> Vec<usize> {
    let Some((&first, rest)) = peaks.split_first() else {
        return Vec::new();
    };

    let mut merged = Vec::new();
    let mut mean = first as f64;
    let mut count = 1.0;
    for &peak in rest {
        if peak as f64 - mean <= width as f64 {
            count += 1.0;
            mean += (peak as f64 - mean) / count;
        } else {
            merged.push(mean.round() as usize);
            mean = peak as f64;
            count = 1.0;
        }
    }
    merged.push(mean.round() as usize);
    merged
}

fn nearest(beats: &[f64], time: f64) -> Option<f64> {
    beats
        .iter()
        .copied()
        .fold(None, |best: Option<f64>, beat| match best {
            Some(current) if (current - time).abs() <= (beat - time).abs() => Some(current),
            _ => Some(beat),
        })
}
