// THEORY:
// The `report` module is the persistence edge of the engine. Every table it
// writes is plain delimited text with one header row, so the output can be
// picked up by spreadsheets, dataframes or an external clustering step.

use crate::core_modules::kinematics::{KinematicSample, MovementClass, OutlierCaps};
use crate::core_modules::possession::Possession;
use crate::error::Result;
use serde::Serialize;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// One row of the per-player feature table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
    pub frame: u64,
    pub player_id: u32,
    pub cx: f64,
    pub cy: f64,
    pub vx: f64,
    pub vy: f64,
    pub speed: f64,
    pub acceleration: f64,
    pub movement_class: MovementClass,
}

impl FeatureRow {
    pub fn from_sample(sample: &KinematicSample, fast_speed_threshold: f64) -> Self {
        Self {
            frame: sample.frame_index,
            player_id: sample.player_id,
            cx: sample.position.x,
            cy: sample.position.y,
            vx: sample.velocity.0,
            vy: sample.velocity.1,
            speed: sample.speed,
            acceleration: sample.acceleration,
            movement_class: MovementClass::of(sample, fast_speed_threshold),
        }
    }
}

/// A possession row with its cluster label appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelledPossession {
    pub start_frame: u64,
    pub end_frame: u64,
    pub duration: usize,
    pub avg_speed: f64,
    pub avg_acceleration: f64,
    pub avg_spread: f64,
    pub frame_count: usize,
    pub cluster: usize,
}

impl LabelledPossession {
    pub fn new(possession: &Possession, cluster: usize) -> Self {
        Self {
            start_frame: possession.start_frame,
            end_frame: possession.end_frame,
            duration: possession.duration,
            avg_speed: possession.avg_speed,
            avg_acceleration: possession.avg_acceleration,
            avg_spread: possession.avg_spread,
            frame_count: possession.frame_count,
            cluster,
        }
    }
}

const POSSESSION_HEADER: &[&str] = &[
    "start_frame",
    "end_frame",
    "duration",
    "avg_speed",
    "avg_acceleration",
    "avg_spread",
    "frame_count",
];

const FEATURE_HEADER: &[&str] = &[
    "frame",
    "player_id",
    "cx",
    "cy",
    "vx",
    "vy",
    "speed",
    "acceleration",
    "movement_class",
];

const LABELLED_POSSESSION_HEADER: &[&str] = &[
    "start_frame",
    "end_frame",
    "duration",
    "avg_speed",
    "avg_acceleration",
    "avg_spread",
    "frame_count",
    "cluster",
];

/// Serializes `rows` under a header row. `header` is written explicitly when
/// there are no rows, since serde only emits it alongside the first record.
fn write_table<W: Write, T: Serialize>(
    writer: W,
    header: &[&str],
    rows: impl IntoIterator<Item = T>,
) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    let mut rows = rows.into_iter().peekable();
    if rows.peek().is_none() {
        csv_writer.write_record(header)?;
    }
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Writes the possession table ordered by `start_frame`. An empty list still
/// produces a header row.
pub fn write_possessions<W: Write>(writer: W, possessions: &[Possession]) -> Result<()> {
    let mut ordered: Vec<&Possession> = possessions.iter().collect();
    ordered.sort_by_key(|p| p.start_frame);
    write_table(writer, POSSESSION_HEADER, ordered)
}

pub fn write_possessions_path(path: &Path, possessions: &[Possession]) -> Result<()> {
    write_possessions(File::create(path)?, possessions)
}

/// Writes one row per admissible sample, ready for movement-classifier training.
pub fn write_features<W: Write>(
    writer: W,
    samples: &[KinematicSample],
    caps: &OutlierCaps,
    fast_speed_threshold: f64,
) -> Result<()> {
    write_table(
        writer,
        FEATURE_HEADER,
        samples
            .iter()
            .filter(|s| caps.admits(s))
            .map(|s| FeatureRow::from_sample(s, fast_speed_threshold)),
    )
}

pub fn write_features_path(
    path: &Path,
    samples: &[KinematicSample],
    caps: &OutlierCaps,
    fast_speed_threshold: f64,
) -> Result<()> {
    write_features(File::create(path)?, samples, caps, fast_speed_threshold)
}

pub fn read_possessions<R: Read>(reader: R) -> Result<Vec<Possession>> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut possessions = Vec::new();
    for row in csv_reader.deserialize() {
        possessions.push(row?);
    }
    Ok(possessions)
}

pub fn read_possessions_path(path: &Path) -> Result<Vec<Possession>> {
    read_possessions(File::open(path)?)
}

pub fn write_labelled_possessions<W: Write>(
    writer: W,
    possessions: &[Possession],
    labels: &[usize],
) -> Result<()> {
    write_table(
        writer,
        LABELLED_POSSESSION_HEADER,
        possessions
            .iter()
            .zip(labels)
            .map(|(p, &cluster)| LabelledPossession::new(p, cluster)),
    )
}

pub fn write_labelled_possessions_path(path: &Path, possessions: &[Possession], labels: &[usize]) -> Result<()> {
    write_labelled_possessions(File::create(path)?, possessions, labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::detection::Centroid;

    fn possession(start_frame: u64) -> Possession {
        Possession {
            start_frame,
            end_frame: start_frame + 9,
            duration: 10,
            avg_speed: 2.5,
            avg_acceleration: -0.25,
            avg_spread: 80.0,
            frame_count: 10,
        }
    }

    #[test]
    fn possession_table_is_sorted_with_header() {
        let mut out = Vec::new();
        write_possessions(&mut out, &[possession(40), possession(0)]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "start_frame,end_frame,duration,avg_speed,avg_acceleration,avg_spread,frame_count"
        );
        assert_eq!(lines[1], "0,9,10,2.5,-0.25,80.0,10");
        assert!(lines[2].starts_with("40,49,"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn empty_possession_table_still_has_a_header() {
        let mut out = Vec::new();
        write_possessions(&mut out, &[]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap().trim_end(),
            "start_frame,end_frame,duration,avg_speed,avg_acceleration,avg_spread,frame_count"
        );
    }

    #[test]
    fn possession_table_reads_back() {
        let mut out = Vec::new();
        write_possessions(&mut out, &[possession(0), possession(12)]).unwrap();
        let read = read_possessions(out.as_slice()).unwrap();
        assert_eq!(read, vec![possession(0), possession(12)]);
    }

    #[test]
    fn empty_feature_and_labelled_tables_still_have_headers() {
        let mut features = Vec::new();
        write_features(&mut features, &[], &OutlierCaps::default(), 4.0).unwrap();
        assert_eq!(
            String::from_utf8(features).unwrap().trim_end(),
            "frame,player_id,cx,cy,vx,vy,speed,acceleration,movement_class"
        );

        let mut labelled = Vec::new();
        write_labelled_possessions(&mut labelled, &[], &[]).unwrap();
        assert_eq!(
            String::from_utf8(labelled).unwrap().trim_end(),
            "start_frame,end_frame,duration,avg_speed,avg_acceleration,avg_spread,frame_count,cluster"
        );
    }

    #[test]
    fn labelled_table_header_matches_serialized_rows() {
        let mut out = Vec::new();
        write_labelled_possessions(&mut out, &[possession(0)], &[2]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(LABELLED_POSSESSION_HEADER.join(",").as_str()));
        assert_eq!(lines.next(), Some("0,9,10,2.5,-0.25,80.0,10,2"));
    }

    #[test]
    fn possession_table_accepts_bbox_area_column() {
        let table = "start_frame,end_frame,duration,avg_speed,avg_acceleration,bbox_area,frame_count\n\
                     0,9,10,2.5,-0.25,80.0,10\n";
        let read = read_possessions(table.as_bytes()).unwrap();
        assert_eq!(read, vec![possession(0)]);
    }

    #[test]
    fn feature_table_drops_outliers_and_labels_movement() {
        let slow = KinematicSample {
            frame_index: 3,
            player_id: 1,
            position: Centroid::new(10.0, 20.0),
            velocity: (1.0, 0.0),
            speed: 1.0,
            acceleration: 0.0,
        };
        let fast = KinematicSample { speed: 6.0, velocity: (6.0, 0.0), ..slow };
        let glitch = KinematicSample { speed: 500.0, ..slow };

        let mut out = Vec::new();
        write_features(&mut out, &[slow, fast, glitch], &OutlierCaps::default(), 4.0).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "frame,player_id,cx,cy,vx,vy,speed,acceleration,movement_class");
        assert_eq!(lines.len(), 3);
        assert!(lines[1].ends_with(",slow"));
        assert!(lines[2].ends_with(",fast"));
    }
}
