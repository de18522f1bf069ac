// THEORY:
// This file is the main entry point for the `court_vision` library crate.
// It exposes the `PossessionPipeline` (and its tokio-backed sibling
// `ParallelPipeline`) together with `AnalysisConfig` as the high-level
// interface: feed in per-frame player detections, get back possession
// segments with kinematic descriptors.
//
// The layered stages live under `core_modules` and can be used on their own
// when a caller only needs, say, trajectories or kinematics.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;
pub mod report;

pub use config::AnalysisConfig;
pub use error::{AnalysisError, Result};
pub use parallel_pipeline::ParallelPipeline;
pub use pipeline::{PipelineReport, PipelineStats, PossessionPipeline};
