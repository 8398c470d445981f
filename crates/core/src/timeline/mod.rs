use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{BeatCountError, Result, Stage};

/// Default distance in seconds under which two timestamps are the same beat.
pub const TIME_TOLERANCE: f64 = 1e-6;

/// The one comparison used wherever a downbeat is matched against a beat.
pub fn times_match(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance
}

/// Index of the first beat at or after `time` (with tolerance).
pub fn lower_bound(beats: &[f64], time: f64, tolerance: f64) -> usize {
    beats.partition_point(|&beat| beat < time - tolerance)
}

/// Whether `time` coincides with a beat. `beats` must be sorted.
pub fn contains_time(beats: &[f64], time: f64, tolerance: f64) -> bool {
    let index = lower_bound(beats, time, tolerance);
    beats
        .get(index)
        .map(|&beat| times_match(beat, time, tolerance))
        .unwrap_or(false)
}

/// Beats and the downbeat subset reported by the decoder, in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeatTimeline {
    beats: Vec<f64>,
    downbeats: Vec<f64>,
}

impl BeatTimeline {
    /// Both sequences must be strictly ascending. Downbeats are not required to
    /// be beats here; see [`BeatTimeline::check_consistency`].
    pub fn new(beats: Vec<f64>, downbeats: Vec<f64>) -> Result<Self> {
        ensure_ascending("beat", &beats)?;
        ensure_ascending("downbeat", &downbeats)?;
        Ok(Self { beats, downbeats })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn beats(&self) -> &[f64] {
        &self.beats
    }

    pub fn downbeats(&self) -> &[f64] {
        &self.downbeats
    }

    pub fn len(&self) -> usize {
        self.beats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }

    /// Fails with the first downbeat that does not coincide with a beat.
    pub fn check_consistency(&self, tolerance: f64) -> Result<()> {
        match self
            .downbeats
            .iter()
            .find(|&&downbeat| !contains_time(&self.beats, downbeat, tolerance))
        {
            Some(&downbeat) => Err(BeatCountError::TimelineConsistency { downbeat }),
            None => Ok(()),
        }
    }
}

fn ensure_ascending(kind: &str, times: &[f64]) -> Result<()> {
    if let Some(time) = times.iter().find(|time| !time.is_finite()) {
        return Err(BeatCountError::invalid_input(
            Stage::Decode,
            format!("{kind} time {time} is not finite"),
        ));
    }
    if let Some(pair) = times.windows(2).find(|pair| pair[1] <= pair[0]) {
        return Err(BeatCountError::invalid_input(
            Stage::Decode,
            format!(
                "{kind} times must be strictly ascending ({} then {})",
                pair[0], pair[1]
            ),
        ));
    }
    Ok(())
}

/// A beat with its position inside the current measure (1 = downbeat).
///
/// A count of 0 marks a timeline that could not be counted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedBeat {
    pub time: f64,
    pub count: u32,
}

impl AnnotatedBeat {
    pub fn new(time: f64, count: u32) -> Self {
        Self { time, count }
    }

    pub fn is_downbeat(&self) -> bool {
        self.count == 1
    }
}

/// Writes one `time<TAB>count` line per beat, time with millisecond precision.
pub fn write_timeline<W: Write>(mut out: W, beats: &[AnnotatedBeat]) -> Result<()> {
    for beat in beats {
        writeln!(out, "{:.3}\t{}", beat.time, beat.count)?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_timeline_file(path: impl AsRef<Path>, beats: &[AnnotatedBeat]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    write_timeline(BufWriter::new(file), beats)?;
    tracing::info!(?path, beats = beats.len(), "wrote beat timeline");
    Ok(())
}

/// Parses the format produced by [`write_timeline`]. Fields may be separated by
/// any whitespace and blank lines are skipped. Times must be finite,
/// non-negative and never decrease.
pub fn read_timeline<R: BufRead>(input: R) -> Result<Vec<AnnotatedBeat>> {
    let mut beats: Vec<AnnotatedBeat> = Vec::new();

    for (index, line) in input.lines().enumerate() {
        let line = line?;
        let line_no = index + 1;
        let mut fields = line.split_whitespace();
        let Some(time) = fields.next() else {
            continue;
        };

        let time: f64 = time.parse().map_err(|_| BeatCountError::Parse {
            line: line_no,
            message: format!("invalid time `{time}`"),
        })?;
        if !time.is_finite() || time < 0.0 {
            return Err(BeatCountError::Parse {
                line: line_no,
                message: format!("time `{time}` is not a finite, non-negative number"),
            });
        }
        if let Some(previous) = beats.last().filter(|previous| time < previous.time) {
            return Err(BeatCountError::Parse {
                line: line_no,
                message: format!("time {time} comes before {}", previous.time),
            });
        }
        let count = fields.next().ok_or_else(|| BeatCountError::Parse {
            line: line_no,
            message: "missing beat count".to_string(),
        })?;
        let count: u32 = count.parse().map_err(|_| BeatCountError::Parse {
            line: line_no,
            message: format!("invalid beat count `{count}`"),
        })?;
        if let Some(extra) = fields.next() {
            return Err(BeatCountError::Parse {
                line: line_no,
                message: format!("unexpected field `{extra}`"),
            });
        }

        beats.push(AnnotatedBeat::new(time, count));
    }

    Ok(beats)
}

pub fn read_timeline_file(path: impl AsRef<Path>) -> Result<Vec<AnnotatedBeat>> {
    let file = File::open(path.as_ref())?;
    read_timeline(BufReader::new(file))
}
