use crate::{
    audio::AudioBuffer,
    click::{last_beat_time, normalize_peak, start_frame, zeroed, ClickSynthesizer},
    config::{ClickConfig, MixConfig},
    timeline::AnnotatedBeat,
    Result, Stage,
};

pub const MIX_ARTIFACT: &str = "mixed audio";

/// Lays the click track over the original recording at its own rate and
/// channel layout.
#[derive(Debug, Clone, Default)]
pub struct Mixer {
    synth: ClickSynthesizer,
    config: MixConfig,
}

impl Mixer {
    pub fn new(click: ClickConfig, config: MixConfig) -> Self {
        Self {
            synth: ClickSynthesizer::new(click),
            config,
        }
    }

    /// Attenuated original plus clicks written identically to every channel,
    /// peak-normalised. The result lasts until the later of the original's end
    /// and the last tone's tail.
    pub fn mix(&self, beats: &[AnnotatedBeat], original: &AudioBuffer) -> Result<AudioBuffer> {
        let last = last_beat_time(beats, MIX_ARTIFACT, Stage::Mix)?;

        let rate = original.sample_rate();
        let channels = original.channels() as usize;
        let frames = original.frames().max(self.synth.output_frames(last, rate));

        let mut samples = zeroed(frames.saturating_mul(channels), Stage::Mix)?;
        for (slot, &value) in samples.iter_mut().zip(original.samples()) {
            *slot = value * self.config.original_gain;
        }

        let tones = self.synth.tone_bank(rate);
        for beat in beats {
            let start = start_frame(beat.time, rate);
            for (frame, &value) in samples
                .chunks_exact_mut(channels)
                .skip(start)
                .zip(tones.for_beat(beat))
            {
                let click = value * self.config.click_gain;
                for slot in frame.iter_mut() {
                    *slot += click;
                }
            }
        }

        let peak = normalize_peak(&mut samples);
        tracing::debug!(
            beats = beats.len(),
            sample_rate = rate,
            channels,
            frames,
            peak,
            "mixed click track into original audio"
        );
        AudioBuffer::new(samples, rate, original.channels())
    }
}
