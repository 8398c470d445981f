use beatcount_core::{
    read_timeline_file, read_wav, write_timeline_file, write_wav, Activations, AnnotatedBeat,
    AudioBuffer, BeatCountError, BeatTracker, ClickSynthesizer, InferenceEngine, Mixer,
    PipelineConfig, Result, Spectrogram, Stage,
};

/// Beat every 25 frames (0.5 s) and a downbeat on every third beat from the
/// second one, leaving a one beat pickup.
struct ThreeFour;

impl InferenceEngine for ThreeFour {
    fn infer(&mut self, spectrogram: &Spectrogram) -> Result<Activations> {
        let frames = spectrogram.frames();
        let beat = (0..frames)
            .map(|f| if f % 25 == 0 { 4.0 } else { -4.0 })
            .collect();
        let downbeat = (0..frames)
            .map(|f| if f >= 25 && (f - 25) % 75 == 0 { 4.0 } else { -4.0 })
            .collect();
        Activations::new(beat, downbeat)
    }
}

/// Reports beats but never a downbeat.
struct OffGrid;

impl InferenceEngine for OffGrid {
    fn infer(&mut self, spectrogram: &Spectrogram) -> Result<Activations> {
        let frames = spectrogram.frames();
        let beat = (0..frames)
            .map(|f| if f % 25 == 0 { 4.0 } else { -4.0 })
            .collect();
        Activations::new(beat, vec![-4.0; frames])
    }
}

fn noise(seconds: usize, rate: u32, channels: u16) -> AudioBuffer {
    let mut state = 0x2545_f491_u32;
    let samples = (0..seconds * rate as usize * channels as usize)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state as f32 / u32::MAX as f32 - 0.5) * 0.2
        })
        .collect();
    AudioBuffer::new(samples, rate, channels).unwrap()
}

#[test]
fn wav_to_timeline_click_and_mix() {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("input.wav");
    write_wav(&input_path, &noise(6, 44_100, 2)).unwrap();

    let original = read_wav(&input_path).unwrap();
    let mut tracker = BeatTracker::new(PipelineConfig::default(), Box::new(ThreeFour)).unwrap();
    let analysis = tracker.process(&original).unwrap();

    let counts: Vec<u32> = analysis.beats.iter().map(|b| b.count).collect();
    assert_eq!(counts[..8], [3, 1, 2, 3, 1, 2, 3, 1]);
    assert!((analysis.tempo_bpm().unwrap() - 120.0).abs() < 1e-9);

    let timeline_path = dir.path().join("input.beats");
    write_timeline_file(&timeline_path, &analysis.beats).unwrap();
    let text = std::fs::read_to_string(&timeline_path).unwrap();
    assert!(text.starts_with("0.000\t3\n0.500\t1\n1.000\t2\n"));
    let reread = read_timeline_file(&timeline_path).unwrap();
    assert_eq!(reread.len(), analysis.beats.len());

    let click = tracker.click_track(&analysis).unwrap();
    let last = analysis.beats.last().unwrap().time;
    assert_eq!(
        click.frames(),
        ClickSynthesizer::default().output_frames(last, 44_100)
    );
    assert!(click.frames() >= ((last + 0.15) * 44_100.0) as usize);
    assert!(click.samples().iter().all(|s| s.abs() <= 1.0));

    let mixed = tracker.mix(&analysis, &original).unwrap();
    assert_eq!(mixed.channels(), 2);
    assert_eq!(mixed.sample_rate(), 44_100);
    let expected_frames = original
        .frames()
        .max(ClickSynthesizer::default().output_frames(last, 44_100));
    assert_eq!(mixed.frames(), expected_frames);

    let mix_path = dir.path().join("mixed.wav");
    write_wav(&mix_path, &mixed).unwrap();
    assert_eq!(read_wav(&mix_path).unwrap(), mixed);
}

#[test]
fn timeline_without_downbeats_counts_zero() {
    let mut tracker = BeatTracker::new(PipelineConfig::default(), Box::new(OffGrid)).unwrap();
    let analysis = tracker.process(&noise(3, 22_050, 1)).unwrap();

    assert!(!analysis.beats.is_empty());
    assert!(analysis.beats.iter().all(|b| b.count == 0));

    // Zero counts render with the regular tone, so synthesis still works.
    ClickSynthesizer::default()
        .synthesize(&analysis.beats, 22_050)
        .unwrap();
}

#[test]
fn empty_timeline_only_fails_audio_artifacts() {
    let beats: Vec<AnnotatedBeat> = Vec::new();
    let dir = tempfile::tempdir().unwrap();

    let path = dir.path().join("empty.beats");
    write_timeline_file(&path, &beats).unwrap();
    assert!(read_timeline_file(&path).unwrap().is_empty());

    let err = ClickSynthesizer::default().synthesize(&beats, 44_100).unwrap_err();
    assert_eq!(err.stage(), Stage::Synthesis);
    let err = Mixer::default()
        .mix(&beats, &noise(1, 8_000, 1))
        .unwrap_err();
    assert_eq!(err.stage(), Stage::Mix);
    assert!(matches!(err, BeatCountError::EmptyTimeline { .. }));
}
