use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::{BeatCountError, Result};

const MAX_FLUSHES: usize = 64;

/// Band-limited sinc resampling of a mono signal.
///
/// The filter delay is trimmed so the output stays aligned with the input.
/// The result holds `round(len * target / source)` samples when the resampler
/// produced that many, otherwise whatever it actually produced. Inputs shorter
/// than the filter delay can come back empty.
pub fn resample_mono(input: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    if source_rate == 0 || target_rate == 0 {
        return Err(BeatCountError::Resample(format!(
            "cannot resample from {source_rate} Hz to {target_rate} Hz"
        )));
    }
    if source_rate == target_rate {
        return Ok(input.to_vec());
    }
    if input.is_empty() {
        return Ok(Vec::new());
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let expected = (input.len() as f64 * ratio).round() as usize;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, input.len(), 1)
        .map_err(|err| BeatCountError::Resample(err.to_string()))?;
    let delay = resampler.output_delay();

    let waves_in = vec![input.to_vec()];
    let mut output = resampler
        .process(&waves_in, None)
        .map_err(|err| BeatCountError::Resample(err.to_string()))?
        .swap_remove(0);

    // Push silence through to drain the filter tail.
    let mut flushes = 0;
    while output.len() < delay + expected && flushes < MAX_FLUSHES {
        let tail = resampler
            .process_partial::<Vec<f32>>(None, None)
            .map_err(|err| BeatCountError::Resample(err.to_string()))?
            .swap_remove(0);
        output.extend_from_slice(&tail);
        flushes += 1;
    }

    if output.len() <= delay {
        tracing::debug!(
            input = input.len(),
            expected,
            delay,
            "input shorter than the resampler delay, nothing left after trimming"
        );
    }
    let start = delay.min(output.len());
    let end = (delay + expected).min(output.len());
    Ok(output[start..end].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_length_follows_rate_ratio() {
        let input = vec![0.25_f32; 44_100];
        let output = resample_mono(&input, 44_100, 22_050).unwrap();
        assert_eq!(output.len(), 22_050);
    }

    #[test]
    fn preserves_a_low_frequency_tone() {
        let source_rate = 48_000;
        let input: Vec<f32> = (0..source_rate)
            .map(|i| (2.0 * std::f32::consts::PI * 100.0 * i as f32 / source_rate as f32).sin())
            .collect();
        let output = resample_mono(&input, source_rate as u32, 22_050).unwrap();

        // Compare against the analytic signal away from the edges.
        let mut max_err = 0.0_f32;
        for (i, value) in output.iter().enumerate().skip(1_000).take(10_000) {
            let t = i as f32 / 22_050.0;
            let expected = (2.0 * std::f32::consts::PI * 100.0 * t).sin();
            max_err = max_err.max((value - expected).abs());
        }
        assert!(max_err < 0.05, "max error {max_err}");
    }

    #[test]
    fn zero_rate_is_an_error() {
        let err = resample_mono(&[0.0; 16], 0, 22_050).unwrap_err();
        assert!(matches!(err, BeatCountError::Resample(_)));
    }

    #[test]
    fn empty_input_stays_empty() {
        assert!(resample_mono(&[], 44_100, 22_050).unwrap().is_empty());
    }
}
