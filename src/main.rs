//! Command-line runner for the `court_vision` library.
//!
//! `analyze` turns a detection table into a possession table (and optionally a
//! per-player feature table); `cluster` labels an existing possession table
//! with possession types.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use court_vision::AnalysisConfig;
use court_vision::core_modules::features::{KMeans, cluster_possessions};
use court_vision::core_modules::frame_summary::SpreadMetric;
use court_vision::core_modules::identity::IdentityStrategy;
use court_vision::pipeline::PipelineReport;
use court_vision::{ParallelPipeline, PossessionPipeline, report};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "court_vision")]
#[command(about = "Segment basketball possessions from player detections", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SpreadMetricArg {
    MeanDistance,
    BboxArea,
}

impl From<SpreadMetricArg> for SpreadMetric {
    fn from(arg: SpreadMetricArg) -> Self {
        match arg {
            SpreadMetricArg::MeanDistance => SpreadMetric::MeanDistance,
            SpreadMetricArg::BboxArea => SpreadMetric::BoundingBoxArea,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum IdentityArg {
    Tracker,
    Naive,
}

impl From<IdentityArg> for IdentityStrategy {
    fn from(arg: IdentityArg) -> Self {
        match arg {
            IdentityArg::Tracker => IdentityStrategy::Tracker,
            IdentityArg::Naive => IdentityStrategy::Naive,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Segment a detection table into possessions
    Analyze {
        /// Input detection CSV (frame, x1, y1, x2, y2, conf[, label][, player_id])
        #[arg(long)]
        detections: PathBuf,

        /// Output possession CSV
        #[arg(long)]
        out: PathBuf,

        /// Optional per-player feature CSV
        #[arg(long)]
        features: Option<PathBuf>,

        /// YAML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Minimum detection confidence (exclusive)
        #[arg(long)]
        confidence: Option<f64>,

        /// Frame gap that ends a possession
        #[arg(long)]
        frame_gap: Option<u64>,

        /// Spread change that ends a possession
        #[arg(long)]
        spacing_change: Option<f64>,

        /// Fractional drop in mean speed that ends a possession
        #[arg(long)]
        speed_drop: Option<f64>,

        /// Minimum number of frames in an emitted possession
        #[arg(long)]
        min_length: Option<usize>,

        #[arg(long, value_enum)]
        spread_metric: Option<SpreadMetricArg>,

        #[arg(long, value_enum)]
        identity: Option<IdentityArg>,

        /// Player count used by the naive identity strategy
        #[arg(long)]
        player_count: Option<u32>,

        /// Compute kinematics on a worker pool
        #[arg(long, default_value = "false")]
        parallel: bool,

        /// Worker count for --parallel
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Label a possession table with possession types
    Cluster {
        /// Input possession CSV
        #[arg(long)]
        possessions: PathBuf,

        /// Output labelled possession CSV
        #[arg(long)]
        out: PathBuf,

        /// YAML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of possession types
        #[arg(long)]
        clusters: Option<usize>,
    },
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    match path {
        Some(path) => AnalysisConfig::load(path)
            .with_context(|| format!("Failed to load configuration: {}", path.display())),
        None => Ok(AnalysisConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("court_vision=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            detections,
            out,
            features,
            config,
            confidence,
            frame_gap,
            spacing_change,
            speed_drop,
            min_length,
            spread_metric,
            identity,
            player_count,
            parallel,
            workers,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(v) = confidence {
                config.ingest.confidence_threshold = v;
            }
            if let Some(v) = frame_gap {
                config.segmenter.frame_gap_threshold = v;
            }
            if let Some(v) = spacing_change {
                config.segmenter.spacing_change_threshold = Some(v);
            }
            if let Some(v) = speed_drop {
                config.segmenter.speed_drop_threshold = v;
            }
            if let Some(v) = min_length {
                config.segmenter.min_possession_length = v;
            }
            if let Some(v) = spread_metric {
                config.spread_metric = v.into();
            }
            if let Some(v) = identity {
                config.identity.strategy = v.into();
            }
            if let Some(v) = player_count {
                config.identity.naive_player_count = v;
            }
            if let Some(v) = workers {
                config.kinematics.workers = v;
            }

            info!(input = %detections.display(), parallel, "Analyzing detections");

            let report: PipelineReport = if parallel {
                ParallelPipeline::new(config.clone())?
                    .run_file(&detections)
                    .await
                    .with_context(|| format!("Failed to analyze {}", detections.display()))?
            } else {
                PossessionPipeline::new(config.clone())?
                    .run_file(&detections)
                    .with_context(|| format!("Failed to analyze {}", detections.display()))?
            };

            report::write_possessions_path(&out, &report.possessions)
                .with_context(|| format!("Failed to write possessions: {}", out.display()))?;

            if let Some(features_path) = features {
                report::write_features_path(
                    &features_path,
                    &report.samples,
                    &config.kinematics.outlier_caps(),
                    config.kinematics.fast_speed_threshold,
                )
                .with_context(|| format!("Failed to write features: {}", features_path.display()))?;
            }

            let stats = &report.stats;
            println!("Possessions: {}", report.possessions.len());
            println!(
                "  Detections: {} read, {} kept ({} malformed, {} non-person, {} low confidence)",
                stats.ingest.rows_read,
                stats.ingest.kept,
                stats.ingest.malformed,
                stats.ingest.non_person,
                stats.ingest.low_confidence
            );
            println!(
                "  Samples:    {} extracted, {} outliers",
                stats.samples_extracted, stats.outlier_samples
            );
            println!(
                "  Frames:     {} summarised, {} short segments discarded",
                stats.frames_summarized, stats.segmentation.possessions_discarded
            );
            println!("  Output:     {}", out.display());
        }

        Commands::Cluster {
            possessions,
            out,
            config,
            clusters,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(k) = clusters {
                config.clustering.clusters = k;
            }
            config.validate()?;

            let table = report::read_possessions_path(&possessions)
                .with_context(|| format!("Failed to read possessions: {}", possessions.display()))?;
            let kmeans = KMeans::new(config.clustering.clusters, config.clustering.max_iterations);
            let labels = cluster_possessions(&table, &kmeans);

            report::write_labelled_possessions_path(&out, &table, &labels)
                .with_context(|| format!("Failed to write labelled possessions: {}", out.display()))?;

            println!(
                "Clustered {} possessions into {} types -> {}",
                table.len(),
                config.clustering.clusters.min(table.len().max(1)),
                out.display()
            );
        }
    }

    Ok(())
}
