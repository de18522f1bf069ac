use court_vision::core_modules::features::{KMeans, cluster_possessions};
use court_vision::report;
use court_vision::{AnalysisConfig, AnalysisError, ParallelPipeline, PossessionPipeline};
use std::fmt::Write as _;
use std::fs;
use tempfile::tempdir;

/// Five players drifting right for 20 frames, a 50 frame cut, then five
/// players running left for 20 frames. A referee box and a low-confidence
/// ghost are mixed in.
fn detection_table() -> String {
    let mut table = String::from("frame,label,conf,x1,y1,x2,y2\n");
    for frame in (0..20).chain(70..90) {
        let step = if frame < 70 { 1.0 } else { -3.0 };
        for player in 0..5 {
            let cx = 100.0 + 120.0 * player as f64 + step * frame as f64;
            let cy = 300.0 + 10.0 * player as f64;
            writeln!(table, "{frame},person,0.9,{},{},{},{}", cx - 10.0, cy - 30.0, cx + 10.0, cy + 30.0).unwrap();
        }
        writeln!(table, "{frame},tie,0.9,0,0,5,5").unwrap();
        writeln!(table, "{frame},person,0.2,0,0,5,5").unwrap();
    }
    table
}

fn config() -> AnalysisConfig {
    let yaml = "
identity:
  strategy: naive
  naive_player_count: 5
segmenter:
  min_possession_length: 5
kinematics:
  workers: 2
";
    AnalysisConfig::from_yaml_str(yaml).unwrap()
}

#[test]
fn detection_file_becomes_possession_file() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("detections.csv");
    let output = dir.path().join("possessions.csv");
    fs::write(&input, detection_table()).unwrap();

    let report = PossessionPipeline::new(config()).unwrap().run_file(&input).unwrap();
    assert_eq!(report.stats.ingest.rows_read, 40 * 7);
    assert_eq!(report.stats.ingest.kept, 40 * 5);
    assert_eq!(report.stats.ingest.non_person, 40);
    assert_eq!(report.stats.ingest.low_confidence, 40);
    assert_eq!(report.stats.players, 5);

    report::write_possessions_path(&output, &report.possessions).unwrap();
    let written = report::read_possessions_path(&output).unwrap();
    assert_eq!(written, report.possessions);

    let spans: Vec<(u64, u64)> = written.iter().map(|p| (p.start_frame, p.end_frame)).collect();
    assert_eq!(spans, vec![(1, 19), (70, 89)]);
    assert!(written[1].avg_speed > written[0].avg_speed);
}

#[tokio::test]
async fn parallel_run_matches_sequential_run_on_files() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("detections.csv");
    fs::write(&input, detection_table()).unwrap();

    let sequential = PossessionPipeline::new(config()).unwrap().run_file(&input).unwrap();
    let parallel = ParallelPipeline::new(config()).unwrap().run_file(&input).await.unwrap();
    assert_eq!(parallel.possessions, sequential.possessions);
}

#[test]
fn missing_columns_fail_before_processing() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("broken.csv");
    fs::write(&input, "frame,x1,y1,x2,y2\n0,1,1,2,2\n").unwrap();

    let result = PossessionPipeline::new(AnalysisConfig::default()).unwrap().run_file(&input);
    assert!(matches!(result, Err(AnalysisError::MissingColumn { .. })));
}

#[test]
fn feature_and_cluster_tables_are_written() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("detections.csv");
    fs::write(&input, detection_table()).unwrap();
    let cfg = config();

    let report = PossessionPipeline::new(cfg.clone()).unwrap().run_file(&input).unwrap();

    let features = dir.path().join("features.csv");
    report::write_features_path(
        &features,
        &report.samples,
        &cfg.kinematics.outlier_caps(),
        cfg.kinematics.fast_speed_threshold,
    )
    .unwrap();
    let text = fs::read_to_string(&features).unwrap();
    assert!(text.starts_with("frame,player_id,cx,cy,vx,vy,speed,acceleration,movement_class\n"));

    let labels = cluster_possessions(&report.possessions, &KMeans::new(4, 50));
    assert_eq!(labels.len(), report.possessions.len());

    let labelled = dir.path().join("labelled.csv");
    report::write_labelled_possessions_path(&labelled, &report.possessions, &labels).unwrap();
    let text = fs::read_to_string(&labelled).unwrap();
    assert_eq!(text.lines().count(), report.possessions.len() + 1);
    assert!(text.lines().next().unwrap().ends_with(",cluster"));
}
