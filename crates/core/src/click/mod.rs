//! Click track rendering: one enveloped sine tone per beat, higher pitched on
//! downbeats.

use std::f64::consts::PI;

use crate::{
    audio::AudioBuffer, config::ClickConfig, timeline::AnnotatedBeat, BeatCountError, Result, Stage,
};

pub const CLICK_ARTIFACT: &str = "click track";

/// Pre-rendered tones for one sample rate.
#[derive(Debug, Clone)]
pub(crate) struct ToneBank {
    downbeat: Vec<f32>,
    beat: Vec<f32>,
}

impl ToneBank {
    pub(crate) fn for_beat(&self, beat: &AnnotatedBeat) -> &[f32] {
        if beat.is_downbeat() {
            &self.downbeat
        } else {
            &self.beat
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClickSynthesizer {
    config: ClickConfig,
}

impl ClickSynthesizer {
    pub fn new(config: ClickConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClickConfig {
        &self.config
    }

    /// A single tone: linear attack, flat sustain, linear decay over a sine.
    pub fn render_tone(&self, frequency: f64, sample_rate: u32) -> Vec<f32> {
        let rate = sample_rate as f64;
        let total = (self.config.tone_duration * rate) as usize;
        let attack = (self.config.attack_time * rate) as usize;
        let decay = (self.config.decay_time * rate) as usize;

        (0..total)
            .map(|i| {
                let amplitude = if i < attack {
                    i as f64 / attack as f64
                } else if i + decay > total {
                    (total - i) as f64 / decay as f64
                } else {
                    1.0
                };
                let t = i as f64 / rate;
                (amplitude * (2.0 * PI * frequency * t).sin()) as f32
            })
            .collect()
    }

    pub(crate) fn tone_bank(&self, sample_rate: u32) -> ToneBank {
        ToneBank {
            downbeat: self.render_tone(self.config.downbeat_frequency, sample_rate),
            beat: self.render_tone(self.config.beat_frequency, sample_rate),
        }
    }

    /// Frames needed to hold every tone after the last beat has rung out.
    pub fn output_frames(&self, last_beat: f64, sample_rate: u32) -> usize {
        ((last_beat.max(0.0) + self.config.tail_seconds()) * sample_rate as f64).round() as usize
    }

    /// Renders the click track as a mono buffer at `sample_rate`.
    pub fn synthesize(&self, beats: &[AnnotatedBeat], sample_rate: u32) -> Result<AudioBuffer> {
        let last = last_beat_time(beats, CLICK_ARTIFACT, Stage::Synthesis)?;
        if sample_rate == 0 {
            return Err(BeatCountError::invalid_input(
                Stage::Synthesis,
                "sample rate must be positive",
            ));
        }

        let mut samples = zeroed(self.output_frames(last, sample_rate), Stage::Synthesis)?;
        let tones = self.tone_bank(sample_rate);
        for beat in beats {
            let start = start_frame(beat.time, sample_rate);
            for (slot, value) in samples.iter_mut().skip(start).zip(tones.for_beat(beat)) {
                *slot += value;
            }
        }

        let peak = normalize_peak(&mut samples);
        tracing::debug!(beats = beats.len(), sample_rate, peak, "rendered click track");
        AudioBuffer::mono(samples, sample_rate)
    }
}

/// Time of the last beat. Fails on an empty timeline or any non-finite time,
/// either of which leaves no buffer length to allocate.
pub(crate) fn last_beat_time(
    beats: &[AnnotatedBeat],
    artifact: &'static str,
    stage: Stage,
) -> Result<f64> {
    if let Some(beat) = beats.iter().find(|beat| !beat.time.is_finite()) {
        return Err(BeatCountError::invalid_input(
            stage,
            format!("cannot render {artifact}: beat time {} is not finite", beat.time),
        ));
    }
    beats
        .iter()
        .map(|beat| beat.time)
        .reduce(f64::max)
        .ok_or(BeatCountError::EmptyTimeline { artifact })
}

/// Zero-filled buffer, failing instead of aborting when `len` cannot be
/// allocated.
pub(crate) fn zeroed(len: usize, stage: Stage) -> Result<Vec<f32>> {
    let mut samples = Vec::new();
    samples.try_reserve_exact(len).map_err(|err| {
        BeatCountError::invalid_input(stage, format!("cannot allocate {len} samples: {err}"))
    })?;
    samples.resize(len, 0.0);
    Ok(samples)
}

pub(crate) fn start_frame(time: f64, sample_rate: u32) -> usize {
    (time.max(0.0) * sample_rate as f64) as usize
}

/// Scales the buffer down so its peak is 1.0 if it exceeds that. Returns the
/// peak found before scaling.
pub fn normalize_peak(samples: &mut [f32]) -> f32 {
    let peak = samples.iter().fold(0.0_f32, |peak, sample| peak.max(sample.abs()));
    if peak > 1.0 {
        for sample in samples.iter_mut() {
            *sample /= peak;
        }
    }
    peak
}
