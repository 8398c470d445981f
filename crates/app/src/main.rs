use std::path::{Path, PathBuf};

use beatcount_core::{
    read_timeline_file, read_wav, write_timeline_file, write_wav, BeatCountError, BeatTracker,
    ClickSynthesizer, PipelineConfig,
};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

fn main() -> beatcount_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze(args) => run_analyze(&args),
        Commands::Render {
            beats,
            output,
            sample_rate,
            config,
        } => run_render(&beats, &output, sample_rate, config.as_deref()),
    }
}

fn run_analyze(args: &AnalyzeArgs) -> beatcount_core::Result<()> {
    tracing::info!(model = ?args.model, input = ?args.input, "starting beat analysis");

    let config = load_config(args.config.as_deref())?;
    let mut tracker = build_tracker(&args.model, config)?;
    let original = read_wav(&args.input)?;
    let analysis = tracker.process(&original)?;

    let nothing_requested = args.beats.is_none() && args.click.is_none() && args.mix.is_none() && !args.bpm;
    let timeline_path = args
        .beats
        .clone()
        .or_else(|| nothing_requested.then(|| args.input.with_extension("beats")));

    let mut failed = Vec::new();
    if let Some(path) = timeline_path {
        record(
            "timeline",
            write_timeline_file(&path, &analysis.beats),
            &mut failed,
        );
    }
    if let Some(path) = &args.click {
        let written = tracker
            .click_track(&analysis)
            .and_then(|click| write_wav(path, &click));
        record("click track", written, &mut failed);
    }
    if let Some(path) = &args.mix {
        let written = tracker
            .mix(&analysis, &original)
            .and_then(|mixed| write_wav(path, &mixed));
        record("mixed audio", written, &mut failed);
    }
    if args.bpm {
        match analysis.tempo_bpm() {
            Some(bpm) => println!("{bpm:.2} BPM"),
            None => println!("tempo undetermined"),
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(BeatCountError::msg(format!(
            "failed to produce: {}",
            failed.join(", ")
        )))
    }
}

fn run_render(
    beats: &Path,
    output: &Path,
    sample_rate: Option<u32>,
    config: Option<&Path>,
) -> beatcount_core::Result<()> {
    let config = load_config(config)?;
    let sample_rate = sample_rate.unwrap_or(config.click.sample_rate);
    tracing::info!(?beats, ?output, sample_rate, "rendering click track");

    let timeline = read_timeline_file(beats)?;
    let click = ClickSynthesizer::new(config.click).synthesize(&timeline, sample_rate)?;
    write_wav(output, &click)
}

/// Logs a failed artifact and keeps going with the rest.
fn record(artifact: &'static str, result: beatcount_core::Result<()>, failed: &mut Vec<&'static str>) {
    if let Err(err) = result {
        tracing::error!(artifact, stage = %err.stage(), %err, "could not write artifact");
        failed.push(artifact);
    }
}

fn load_config(path: Option<&Path>) -> beatcount_core::Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_json_file(path),
        None => Ok(PipelineConfig::default()),
    }
}

#[cfg(feature = "onnx")]
fn build_tracker(model: &Path, config: PipelineConfig) -> beatcount_core::Result<BeatTracker> {
    BeatTracker::from_model_path(model, config)
}

#[cfg(not(feature = "onnx"))]
fn build_tracker(model: &Path, _config: PipelineConfig) -> beatcount_core::Result<BeatTracker> {
    Err(BeatCountError::Config(format!(
        "cannot load {}: beatcount was built without the `onnx` feature",
        model.display()
    )))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Beat and downbeat tracking with measure counts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Detect beats in an audio file and write the requested artifacts.
    Analyze(AnalyzeArgs),
    /// Render a click track from an existing beat timeline.
    Render {
        /// Timeline file with one `time<TAB>count` line per beat.
        beats: PathBuf,
        /// Output WAV path.
        output: PathBuf,
        /// Sample rate of the rendered audio.
        #[arg(short, long)]
        sample_rate: Option<u32>,
        /// JSON pipeline configuration.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Path to the ONNX beat model.
    model: PathBuf,
    /// WAV file to analyse.
    input: PathBuf,
    /// Write the beat timeline here. Defaults to `<input>.beats` when no other
    /// output is requested.
    #[arg(short, long)]
    beats: Option<PathBuf>,
    /// Write a click-only WAV here.
    #[arg(long)]
    click: Option<PathBuf>,
    /// Write the input mixed with the click track here.
    #[arg(short, long)]
    mix: Option<PathBuf>,
    /// Print the estimated tempo.
    #[arg(long)]
    bpm: bool,
    /// JSON pipeline configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,
}
