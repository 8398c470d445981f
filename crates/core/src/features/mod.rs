//! Time-frequency representation fed to the inference engine.

use std::{f64::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{config::MelConfig, BeatCountError, Result};

/// Row-major `frames x bins` matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    frames: usize,
    bins: usize,
    data: Vec<f32>,
}

impl Spectrogram {
    pub fn new(frames: usize, bins: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != frames * bins {
            return Err(BeatCountError::Feature(format!(
                "{} values do not fill {frames} frames of {bins} bins",
                data.len()
            )));
        }
        Ok(Self { frames, bins, data })
    }

    pub fn zeros(frames: usize, bins: usize) -> Self {
        Self {
            frames,
            bins,
            data: vec![0.0; frames * bins],
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn row(&self, frame: usize) -> &[f32] {
        &self.data[frame * self.bins..(frame + 1) * self.bins]
    }

    pub fn row_mut(&mut self, frame: usize) -> &mut [f32] {
        &mut self.data[frame * self.bins..(frame + 1) * self.bins]
    }
}

/// Turns mono audio at the extractor's fixed rate into a spectrogram.
pub trait FeatureExtractor {
    /// Rate the input is expected to have.
    fn sample_rate(&self) -> u32;

    fn extract(&self, mono: &[f32]) -> Result<Spectrogram>;
}

/// Log-compressed mel magnitude spectrogram with centred STFT frames.
pub struct MelSpectrogram {
    config: MelConfig,
    window: Vec<f32>,
    /// `n_mels` rows of `n_fft / 2 + 1` weights.
    filterbank: Vec<Vec<f64>>,
    centers: Vec<f64>,
    plan: Arc<dyn RealToComplex<f32>>,
}

impl MelSpectrogram {
    pub fn new(config: MelConfig) -> Self {
        let plan = RealFftPlanner::<f32>::new().plan_fft_forward(config.n_fft);
        let window = hann_window(config.n_fft);
        let (filterbank, centers) = mel_filterbank(&config);
        Self {
            config,
            window,
            filterbank,
            centers,
            plan,
        }
    }

    pub fn config(&self) -> &MelConfig {
        &self.config
    }

    /// Centre frequency of every mel band in Hz.
    pub fn center_frequencies(&self) -> &[f64] {
        &self.centers
    }
}

impl Default for MelSpectrogram {
    fn default() -> Self {
        Self::new(MelConfig::default())
    }
}

impl FeatureExtractor for MelSpectrogram {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn extract(&self, mono: &[f32]) -> Result<Spectrogram> {
        let n_fft = self.config.n_fft;
        let hop = self.config.hop_length;
        let n_mels = self.config.n_mels;
        let pad = n_fft / 2;
        if mono.len() <= pad {
            return Err(BeatCountError::Feature(format!(
                "need more than {pad} samples, got {}",
                mono.len()
            )));
        }

        let padded = reflect_pad(mono, pad);
        let frames = (padded.len() - n_fft) / hop + 1;
        let norm = (n_fft as f64).sqrt();
        let mut output = Spectrogram::zeros(frames, n_mels);

        let mut input = self.plan.make_input_vec();
        let mut spectrum = self.plan.make_output_vec();
        let mut scratch = self.plan.make_scratch_vec();
        let mut magnitudes = vec![0.0_f64; spectrum.len()];

        for frame in 0..frames {
            let start = frame * hop;
            for ((slot, &sample), &weight) in input
                .iter_mut()
                .zip(&padded[start..start + n_fft])
                .zip(&self.window)
            {
                *slot = sample * weight;
            }

            self.plan
                .process_with_scratch(&mut input, &mut spectrum, &mut scratch)
                .map_err(|err| BeatCountError::Feature(err.to_string()))?;

            for (magnitude, bin) in magnitudes.iter_mut().zip(&spectrum) {
                *magnitude = magnitude_of(bin) / norm;
            }

            for (value, weights) in output.row_mut(frame).iter_mut().zip(&self.filterbank) {
                let energy: f64 = weights
                    .iter()
                    .zip(&magnitudes)
                    .map(|(weight, magnitude)| weight * magnitude)
                    .sum();
                *value = (self.config.log_multiplier * energy.max(self.config.amin)).ln_1p() as f32;
            }
        }

        tracing::debug!(frames, bins = n_mels, "computed mel spectrogram");
        Ok(output)
    }
}

impl fmt::Debug for MelSpectrogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MelSpectrogram")
            .field("config", &self.config)
            .finish()
    }
}

fn magnitude_of(bin: &Complex32) -> f64 {
    let re = bin.re as f64;
    let im = bin.im as f64;
    (re * re + im * im).sqrt()
}

/// Mirrors `pad` samples at each end, leaving out the edge sample itself.
fn reflect_pad(signal: &[f32], pad: usize) -> Vec<f32> {
    let len = signal.len();
    let mut padded = Vec::with_capacity(len + 2 * pad);
    padded.extend((1..=pad).rev().map(|i| signal[i]));
    padded.extend_from_slice(signal);
    padded.extend((1..=pad).map(|i| signal[len - 1 - i]));
    padded
}

/// Periodic Hann window.
fn hann_window(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| (0.5 * (1.0 - (2.0 * PI * i as f64 / len as f64).cos())) as f32)
        .collect()
}

const SLANEY_F_SP: f64 = 200.0 / 3.0;
const SLANEY_MIN_LOG_HZ: f64 = 1000.0;

fn slaney_logstep() -> f64 {
    6.4_f64.ln() / 27.0
}

fn hz_to_mel(hz: f64) -> f64 {
    let min_log_mel = SLANEY_MIN_LOG_HZ / SLANEY_F_SP;
    if hz >= SLANEY_MIN_LOG_HZ {
        min_log_mel + (hz / SLANEY_MIN_LOG_HZ).ln() / slaney_logstep()
    } else {
        hz / SLANEY_F_SP
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    let min_log_mel = SLANEY_MIN_LOG_HZ / SLANEY_F_SP;
    if mel >= min_log_mel {
        SLANEY_MIN_LOG_HZ * (slaney_logstep() * (mel - min_log_mel)).exp()
    } else {
        SLANEY_F_SP * mel
    }
}

/// Triangular filters on the Slaney mel scale, unnormalised.
fn mel_filterbank(config: &MelConfig) -> (Vec<Vec<f64>>, Vec<f64>) {
    let n_freqs = config.n_fft / 2 + 1;
    let mel_min = hz_to_mel(config.f_min);
    let mel_max = hz_to_mel(config.f_max);
    let points: Vec<f64> = (0..config.n_mels + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f64 / (config.n_mels + 1) as f64))
        .collect();
    let freqs: Vec<f64> = (0..n_freqs)
        .map(|i| i as f64 * config.sample_rate as f64 / config.n_fft as f64)
        .collect();

    let bank = points
        .windows(3)
        .map(|edges| {
            let (left, center, right) = (edges[0], edges[1], edges[2]);
            freqs
                .iter()
                .map(|&hz| {
                    let rising = if center > left {
                        (hz - left) / (center - left)
                    } else {
                        0.0
                    };
                    let falling = if right > center {
                        (right - hz) / (right - center)
                    } else {
                        0.0
                    };
                    rising.min(falling).max(0.0)
                })
                .collect()
        })
        .collect();

    let centers = points[1..=config.n_mels].to_vec();
    (bank, centers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_count_follows_hop() {
        let extractor = MelSpectrogram::default();
        let spec = extractor.extract(&vec![0.0; 22_050]).unwrap();
        assert_eq!(spec.frames(), 51);
        assert_eq!(spec.bins(), 128);
    }

    #[test]
    fn silence_maps_to_floor() {
        let extractor = MelSpectrogram::default();
        let spec = extractor.extract(&vec![0.0; 4_096]).unwrap();
        let floor = (1000.0_f64 * 1e-10).ln_1p() as f32;
        assert!(spec.data().iter().all(|&v| (v - floor).abs() < 1e-9));
    }

    #[test]
    fn tone_lights_up_its_band() {
        let extractor = MelSpectrogram::default();
        let signal: Vec<f32> = (0..22_050)
            .map(|i| (2.0 * std::f32::consts::PI * 1_000.0 * i as f32 / 22_050.0).sin())
            .collect();
        let spec = extractor.extract(&signal).unwrap();

        let row = spec.row(25);
        let loudest = row
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
            .0;
        let center = extractor.center_frequencies()[loudest];
        assert!((center - 1_000.0).abs() < 60.0, "loudest band centred at {center} Hz");
    }

    #[test]
    fn slaney_scale_round_trips() {
        for hz in [30.0, 440.0, 1_000.0, 4_000.0, 11_000.0] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 1e-6);
        }
        assert!((hz_to_mel(1_000.0) - 15.0).abs() < 1e-12);
    }

    #[test]
    fn reflect_pad_skips_edge_sample() {
        let padded = reflect_pad(&[1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(padded, vec![3.0, 2.0, 1.0, 2.0, 3.0, 4.0, 3.0, 2.0]);
    }

    #[test]
    fn short_input_is_rejected() {
        let err = MelSpectrogram::default().extract(&[0.0; 512]).unwrap_err();
        assert!(matches!(err, BeatCountError::Feature(_)));
    }
}
