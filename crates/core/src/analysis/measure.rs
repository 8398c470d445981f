use crate::{
    config::AnnotatorConfig,
    timeline::{contains_time, lower_bound, times_match, AnnotatedBeat, BeatTimeline, TIME_TOLERANCE},
};

/// Assigns every beat its position inside the current measure.
#[derive(Debug, Clone)]
pub struct MeasureAnnotator {
    tolerance: f64,
}

impl Default for MeasureAnnotator {
    fn default() -> Self {
        Self::new(TIME_TOLERANCE)
    }
}

impl MeasureAnnotator {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn from_config(config: &AnnotatorConfig) -> Self {
        Self::new(config.tolerance)
    }

    /// Counts per beat, one for one with `beats`.
    ///
    /// Returns all zeros, after logging an error, when a downbeat is not one of
    /// the beats. Also all zeros when there are no downbeats at all.
    pub fn count(&self, beats: &[f64], downbeats: &[f64]) -> Vec<u32> {
        let mut counts = vec![0; beats.len()];
        if beats.is_empty() || downbeats.is_empty() {
            return counts;
        }

        if let Some(&stray) = downbeats
            .iter()
            .find(|&&downbeat| !contains_time(beats, downbeat, self.tolerance))
        {
            tracing::error!(
                downbeat = stray,
                "not all downbeats are beats, cannot calculate beat counts"
            );
            return counts;
        }

        let mut counter = self.starting_count(beats, downbeats);
        let mut pending = downbeats.iter().peekable();
        for (&beat, slot) in beats.iter().zip(counts.iter_mut()) {
            match pending.peek() {
                Some(&&downbeat) if times_match(beat, downbeat, self.tolerance) => {
                    counter = 1;
                    pending.next();
                }
                _ => counter += 1,
            }
            *slot = counter;
        }

        counts
    }

    /// Convenience wrapper pairing each beat time with its count.
    pub fn annotate(&self, timeline: &BeatTimeline) -> Vec<AnnotatedBeat> {
        let counts = self.count(timeline.beats(), timeline.downbeats());
        timeline
            .beats()
            .iter()
            .zip(counts)
            .map(|(&time, count)| AnnotatedBeat::new(time, count))
            .collect()
    }

    /// Counter value before the first beat is seen.
    ///
    /// Beats ahead of the first downbeat are treated as the tail of a measure as
    /// long as the first full measure.
    fn starting_count(&self, beats: &[f64], downbeats: &[f64]) -> u32 {
        if downbeats.len() < 2 {
            tracing::warn!(
                downbeats = downbeats.len(),
                "fewer than two downbeats, cannot size the pickup measure"
            );
            return 1;
        }

        let first = lower_bound(beats, downbeats[0], self.tolerance);
        let second = lower_bound(beats, downbeats[1], self.tolerance);
        let beats_in_first_measure = second - first;
        let pickup_beats = first;

        if pickup_beats < beats_in_first_measure {
            (beats_in_first_measure - pickup_beats) as u32
        } else {
            tracing::warn!(
                pickup_beats,
                beats_in_first_measure,
                "pickup measure is not shorter than the first measure, not estimating its length"
            );
            1
        }
    }
}

/// [`MeasureAnnotator::count`] with the default tolerance.
pub fn annotate(beats: &[f64], downbeats: &[f64]) -> Vec<u32> {
    MeasureAnnotator::default().count(beats, downbeats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_beat_measures_without_pickup() {
        let counts = annotate(&[0.5, 1.0, 1.5, 2.0], &[0.5, 1.5]);
        assert_eq!(counts, vec![1, 2, 1, 2]);
    }

    #[test]
    fn single_pickup_beat_before_two_beat_measures() {
        let counts = annotate(&[0.2, 0.5, 1.0, 1.5, 2.0], &[0.5, 1.5]);
        assert_eq!(counts, vec![2, 1, 2, 1, 2]);
    }

    #[test]
    fn pickup_takes_the_tail_of_a_four_beat_measure() {
        let beats: Vec<f64> = (0..11).map(|i| 0.5 * i as f64).collect();
        // Downbeats on beats 2, 6 and 10.
        let counts = annotate(&beats, &[1.0, 3.0, 5.0]);
        assert_eq!(counts, vec![3, 4, 1, 2, 3, 4, 1, 2, 3, 4, 1]);
    }

    #[test]
    fn stray_downbeat_yields_zeros() {
        let counts = annotate(&[0.5, 0.6], &[0.5, 0.7]);
        assert_eq!(counts, vec![0, 0]);
    }

    #[test]
    fn empty_inputs() {
        assert!(annotate(&[], &[]).is_empty());
        assert!(annotate(&[], &[1.0]).is_empty());
        assert_eq!(annotate(&[0.5, 1.0], &[]), vec![0, 0]);
    }

    #[test]
    fn single_downbeat_starts_from_one() {
        let counts = annotate(&[0.5, 1.0, 1.5, 2.0], &[1.5]);
        assert_eq!(counts, vec![2, 3, 1, 2]);
    }

    #[test]
    fn long_pickup_falls_back_to_default_start() {
        // Three beats before the first downbeat, two in the first measure.
        let counts = annotate(&[0.0, 0.5, 1.0, 1.5, 2.0, 2.5], &[1.5, 2.5]);
        assert_eq!(counts, vec![2, 3, 4, 1, 2, 1]);
    }

    #[test]
    fn nearly_equal_downbeat_is_matched() {
        let counts = annotate(&[0.5, 1.0, 1.5, 2.0], &[0.5 + 4e-7, 1.5 - 4e-7]);
        assert_eq!(counts, vec![1, 2, 1, 2]);
    }

    #[test]
    fn counts_rise_by_one_between_downbeats() {
        for meter in 2..=7_usize {
            for pickup in 0..meter {
                let total = pickup + meter * 3;
                let beats: Vec<f64> = (0..total).map(|i| 0.25 + 0.4 * i as f64).collect();
                let downbeats: Vec<f64> = (pickup..total)
                    .step_by(meter)
                    .map(|i| beats[i])
                    .collect();

                let counts = annotate(&beats, &downbeats);
                assert_eq!(counts.len(), beats.len());
                for (i, &count) in counts.iter().enumerate() {
                    if i >= pickup {
                        assert_eq!(count as usize, (i - pickup) % meter + 1);
                    } else {
                        // Pickup beats end on the last beat of the implied measure.
                        assert_eq!(count as usize, meter - pickup + i + 1);
                    }
                }
            }
        }
    }

    #[test]
    fn annotate_pairs_times_with_counts() {
        let timeline = BeatTimeline::new(vec![0.5, 1.0, 1.5], vec![1.0]).unwrap();
        let beats = MeasureAnnotator::default().annotate(&timeline);
        assert_eq!(
            beats,
            vec![
                AnnotatedBeat::new(0.5, 2),
                AnnotatedBeat::new(1.0, 1),
                AnnotatedBeat::new(1.5, 2),
            ]
        );
    }
}
