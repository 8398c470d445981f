use std::cmp::Ordering;

use crate::config::TempoConfig;

/// Median inter-beat interval tempo estimate.
#[derive(Debug, Clone)]
pub struct TempoEstimator {
    min_interval: f64,
    max_interval: f64,
}

impl Default for TempoEstimator {
    fn default() -> Self {
        Self::from_config(&TempoConfig::default())
    }
}

impl TempoEstimator {
    pub fn new(min_interval: f64, max_interval: f64) -> Self {
        Self {
            min_interval,
            max_interval,
        }
    }

    pub fn from_config(config: &TempoConfig) -> Self {
        Self::new(config.min_interval, config.max_interval)
    }

    /// Beats per minute, or 0.0 when the tempo cannot be determined.
    ///
    /// Intervals outside `[min_interval, max_interval]` are ignored.
    pub fn estimate_bpm(&self, beats: &[f64]) -> f64 {
        if beats.len() < 2 {
            return 0.0;
        }

        let mut intervals: Vec<f64> = beats
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .filter(|interval| (self.min_interval..=self.max_interval).contains(interval))
            .collect();
        if intervals.is_empty() {
            return 0.0;
        }

        intervals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let mid = intervals.len() / 2;
        let median = if intervals.len() % 2 == 0 {
            (intervals[mid - 1] + intervals[mid]) / 2.0
        } else {
            intervals[mid]
        };

        60.0 / median
    }
}

/// [`TempoEstimator::estimate_bpm`] with the default interval bounds.
pub fn estimate_bpm(beats: &[f64]) -> f64 {
    TempoEstimator::default().estimate_bpm(beats)
}
