use std::fmt;

/// Result alias that carries the custom [`BeatCountError`] type.
pub type Result<T> = std::result::Result<T, BeatCountError>;

/// Pipeline stage a failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Io,
    Ingest,
    Features,
    Inference,
    Decode,
    Annotate,
    Synthesis,
    Mix,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Config => "config",
            Stage::Io => "io",
            Stage::Ingest => "ingest",
            Stage::Features => "features",
            Stage::Inference => "inference",
            Stage::Decode => "decode",
            Stage::Annotate => "annotate",
            Stage::Synthesis => "synthesis",
            Stage::Mix => "mix",
        };
        f.write_str(name)
    }
}

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum BeatCountError {
    /// Missing or unusable model artifact, or a rejected configuration.
    #[error("configuration error: {0}")]
    Config(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("wav codec error: {0}")]
    Wav(#[from] hound::Error),
    #[error("invalid config file: {0}")]
    Json(#[from] serde_json::Error),
    /// Data a stage cannot work with, tagged with that stage.
    #[error("invalid input to {stage}: {message}")]
    InvalidInput { stage: Stage, message: String },
    #[error("resampling failed: {0}")]
    Resample(String),
    #[error("feature extraction failed: {0}")]
    Feature(String),
    #[error("inference failed: {0}")]
    Inference(String),
    /// A downbeat that does not coincide with any beat.
    #[error("downbeat at {downbeat:.6}s is not among the beats")]
    TimelineConsistency { downbeat: f64 },
    #[error("cannot render {artifact}: no beats to synthesize")]
    EmptyTimeline { artifact: &'static str },
    #[error("timeline line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("{0}")]
    Message(String),
}

impl BeatCountError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn invalid_input<T: Into<String>>(stage: Stage, msg: T) -> Self {
        Self::InvalidInput {
            stage,
            message: msg.into(),
        }
    }

    /// Stage that produced the error.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Config(_) | Self::Json(_) => Stage::Config,
            Self::Io(_) | Self::Wav(_) | Self::Parse { .. } | Self::Message(_) => Stage::Io,
            Self::InvalidInput { stage, .. } => *stage,
            Self::Resample(_) => Stage::Ingest,
            Self::Feature(_) => Stage::Features,
            Self::Inference(_) => Stage::Inference,
            Self::TimelineConsistency { .. } => Stage::Annotate,
            Self::EmptyTimeline { artifact } => {
                if *artifact == crate::mix::MIX_ARTIFACT {
                    Stage::Mix
                } else {
                    Stage::Synthesis
                }
            }
        }
    }
}

impl From<&str> for BeatCountError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for BeatCountError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

#[cfg(feature = "onnx")]
impl From<ort::Error> for BeatCountError {
    fn from(value: ort::Error) -> Self {
        Self::Inference(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_the_failing_step() {
        let err = BeatCountError::Resample("ratio out of range".into());
        assert_eq!(err.stage(), Stage::Ingest);
        assert!(err.to_string().starts_with("resampling failed"));

        let err = BeatCountError::EmptyTimeline {
            artifact: crate::mix::MIX_ARTIFACT,
        };
        assert_eq!(err.stage(), Stage::Mix);
    }

    #[test]
    fn invalid_input_keeps_its_stage() {
        let err = BeatCountError::invalid_input(Stage::Decode, "beat times out of order");
        assert_eq!(err.stage(), Stage::Decode);
        assert_eq!(
            err.to_string(),
            "invalid input to decode: beat times out of order"
        );
    }

    #[test]
    fn consistency_error_reports_the_downbeat() {
        let err = BeatCountError::TimelineConsistency { downbeat: 0.7 };
        assert!(err.to_string().contains("0.700000"));
        assert_eq!(err.stage(), Stage::Annotate);
    }
}
