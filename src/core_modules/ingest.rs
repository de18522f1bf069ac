// THEORY:
// Detection Ingest is the boundary between the external detector and the
// engine. It has two jobs:
// 1.  **Structural validation**: a detection table has to carry the frame index,
//     the four box coordinates and a confidence. A table without them is a hard
//     failure surfaced before any processing starts.
// 2.  **Record-level filtering**: individual rows that cannot be parsed, carry
//     an impossible box, belong to another class, or fall below the confidence
//     threshold are dropped. Every drop is counted so the caller can see how
//     much of the input actually participated.

use crate::config::IngestConfig;
use crate::core_modules::detection::{BoundingBox, PlayerId, RawDetection};
use crate::error::{AnalysisError, Result};
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

const FRAME_COLUMNS: &[&str] = &["frame", "frame_index", "frame_id"];
const CONFIDENCE_COLUMNS: &[&str] = &["confidence", "conf"];
const LABEL_COLUMNS: &[&str] = &["label", "class_label", "class"];
const PLAYER_ID_COLUMNS: &[&str] = &["player_id", "track_id", "id"];

/// Counts describing how many input rows survived ingest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub rows_read: usize,
    pub malformed: usize,
    pub non_person: usize,
    pub low_confidence: usize,
    pub kept: usize,
}

impl IngestStats {
    pub fn dropped(&self) -> usize {
        self.malformed + self.non_person + self.low_confidence
    }
}

/// Column positions resolved from the header row.
#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    frame: usize,
    x1: usize,
    y1: usize,
    x2: usize,
    y2: usize,
    confidence: usize,
    label: Option<usize>,
    player_id: Option<usize>,
}

impl ColumnMap {
    fn resolve(headers: &csv::StringRecord) -> Result<Self> {
        let find = |aliases: &[&str]| {
            headers
                .iter()
                .position(|h| aliases.iter().any(|a| h.trim().eq_ignore_ascii_case(a)))
        };
        let require = |aliases: &[&str]| {
            find(aliases).ok_or_else(|| AnalysisError::MissingColumn {
                column: aliases[0].to_string(),
            })
        };

        Ok(Self {
            frame: require(FRAME_COLUMNS)?,
            x1: require(&["x1"])?,
            y1: require(&["y1"])?,
            x2: require(&["x2"])?,
            y2: require(&["y2"])?,
            confidence: require(CONFIDENCE_COLUMNS)?,
            label: find(LABEL_COLUMNS),
            player_id: find(PLAYER_ID_COLUMNS),
        })
    }

    fn parse(&self, record: &csv::StringRecord) -> Option<RawDetection> {
        let float = |idx: usize| record.get(idx)?.trim().parse::<f64>().ok();

        let frame_index = parse_whole_number(record.get(self.frame)?)?;
        let player_id = match self.player_id {
            Some(idx) => {
                let field = record.get(idx)?.trim();
                if field.is_empty() || field.eq_ignore_ascii_case("nan") {
                    None
                } else {
                    Some(PlayerId::try_from(parse_whole_number(field)?).ok()?)
                }
            }
            None => None,
        };
        let label = match self.label {
            Some(idx) => record.get(idx)?.trim().to_string(),
            None => String::new(),
        };

        Some(RawDetection {
            frame_index,
            player_id,
            bbox: BoundingBox::new(float(self.x1)?, float(self.y1)?, float(self.x2)?, float(self.y2)?),
            confidence: float(self.confidence)?,
            label,
        })
    }
}

/// Accepts integers written either plainly ("12") or by a float-typed
/// dataframe ("12.0").
fn parse_whole_number(field: &str) -> Option<u64> {
    let field = field.trim();
    if let Ok(value) = field.parse::<u64>() {
        return Some(value);
    }
    let value = field.parse::<f64>().ok()?;
    (value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u64::MAX as f64)
        .then_some(value as u64)
}

/// Reads a detection table from any reader. Rows that cannot be parsed are
/// counted as malformed and skipped; a missing required column fails the read.
pub fn read_detections<R: Read>(reader: R) -> Result<(Vec<RawDetection>, IngestStats)> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let columns = ColumnMap::resolve(csv_reader.headers()?)?;
    let mut stats = IngestStats::default();
    let mut detections = Vec::new();

    for result in csv_reader.records() {
        stats.rows_read += 1;
        match result.ok().and_then(|record| columns.parse(&record)) {
            Some(detection) => detections.push(detection),
            None => {
                stats.malformed += 1;
                debug!(row = stats.rows_read, "Skipping unparseable detection row");
            }
        }
    }

    Ok((detections, stats))
}

pub fn read_detections_path(path: &Path) -> Result<(Vec<RawDetection>, IngestStats)> {
    let file = File::open(path)?;
    let (detections, stats) = read_detections(file)?;
    info!(
        path = %path.display(),
        rows = stats.rows_read,
        malformed = stats.malformed,
        "Loaded detection table"
    );
    Ok((detections, stats))
}

/// Keeps detections that have a usable box, carry the person label (or no
/// label at all) and exceed the confidence threshold.
pub fn filter_detections(
    detections: Vec<RawDetection>,
    config: &IngestConfig,
    stats: &mut IngestStats,
) -> Vec<RawDetection> {
    let mut kept = Vec::with_capacity(detections.len());

    for detection in detections {
        if !detection.bbox.is_valid()
            || !detection.confidence.is_finite()
            || !(0.0..=1.0).contains(&detection.confidence)
        {
            stats.malformed += 1;
            continue;
        }
        if !detection.label.is_empty() && !detection.label.eq_ignore_ascii_case(&config.person_label) {
            stats.non_person += 1;
            continue;
        }
        if detection.confidence <= config.confidence_threshold {
            stats.low_confidence += 1;
            continue;
        }
        kept.push(detection);
    }

    stats.kept = kept.len();
    kept
}
