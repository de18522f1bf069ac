// THEORY:
// Per-player kinematics are embarrassingly parallel: each trajectory depends
// only on itself. This module fans trajectories out over a pool of tokio
// workers and merges their samples back by `(frame_index, player_id)` before
// the strictly sequential stages (frame aggregation and segmentation) run on
// the calling task. Segmentation is never parallelised; possession boundaries
// depend on ordered state carried from one frame to the next.

use crate::core_modules::detection::{PlayerId, RawDetection};
use crate::core_modules::ingest::{self, IngestStats};
use crate::core_modules::kinematics::{self, KinematicSample};
use crate::core_modules::trajectory::Trajectory;
use crate::error::{AnalysisError, Result};
use crate::pipeline::{AnalysisConfig, PipelineReport, PossessionPipeline};
use futures::future::join_all;
use std::path::Path;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

pub struct KinematicsTask {
    pub trajectory: Trajectory,
    pub result_sender: oneshot::Sender<(PlayerId, Vec<KinematicSample>)>,
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<KinematicsTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns a dispatcher and `worker_count` workers on the current tokio
    /// runtime. Fails when called outside of one.
    pub fn new(worker_count: usize) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| AnalysisError::Worker(format!("Worker pool needs a tokio runtime: {}", e)))?;
        let worker_count = worker_count.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<KinematicsTask>();
        let mut workers = Vec::with_capacity(worker_count);

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<KinematicsTask>())
            .unzip();

        // Round-robin dispatcher
        runtime.spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                let _ = worker_senders[worker_idx].send(task);
                worker_idx = (worker_idx + 1) % worker_count;
            }
        });

        for mut worker_receiver in worker_receivers {
            let worker = runtime.spawn(async move {
                while let Some(task) = worker_receiver.recv().await {
                    let samples = kinematics::extract(&task.trajectory);
                    let _ = task.result_sender.send((task.trajectory.player_id, samples));
                }
            });
            workers.push(worker);
        }

        Ok(Self { task_sender, workers })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub async fn extract(&self, trajectory: Trajectory) -> Result<(PlayerId, Vec<KinematicSample>)> {
        let (result_sender, result_receiver) = oneshot::channel();

        self.task_sender
            .send(KinematicsTask {
                trajectory,
                result_sender,
            })
            .map_err(|_| AnalysisError::Worker("Failed to send task to worker pool".to_string()))?;

        result_receiver
            .await
            .map_err(|_| AnalysisError::Worker("Failed to receive result from worker".to_string()))
    }

    /// Extracts every trajectory concurrently and merges the samples by
    /// `(frame_index, player_id)`.
    pub async fn extract_all(&self, trajectories: impl IntoIterator<Item = Trajectory>) -> Result<Vec<KinematicSample>> {
        let results = join_all(trajectories.into_iter().map(|t| self.extract(t))).await;

        let mut samples = Vec::new();
        for result in results {
            let (player_id, player_samples) = result?;
            debug!(player_id, samples = player_samples.len(), "Worker finished trajectory");
            samples.extend(player_samples);
        }
        kinematics::sort_samples(&mut samples);
        Ok(samples)
    }
}

/// `PossessionPipeline` with its kinematics stage spread over a worker pool.
pub struct ParallelPipeline {
    pipeline: PossessionPipeline,
    worker_pool: WorkerPool,
}

impl ParallelPipeline {
    /// Must be called from within a tokio runtime.
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        let workers = config.kinematics.workers;
        Ok(Self {
            pipeline: PossessionPipeline::new(config)?,
            worker_pool: WorkerPool::new(workers)?,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_pool.worker_count()
    }

    pub async fn run_file(&self, path: &Path) -> Result<PipelineReport> {
        let (detections, ingest_stats) = ingest::read_detections_path(path)?;
        self.run_with_stats(detections, ingest_stats).await
    }

    pub async fn run(&self, detections: Vec<RawDetection>) -> Result<PipelineReport> {
        let stats = IngestStats {
            rows_read: detections.len(),
            ..IngestStats::default()
        };
        self.run_with_stats(detections, stats).await
    }

    async fn run_with_stats(&self, detections: Vec<RawDetection>, ingest_stats: IngestStats) -> Result<PipelineReport> {
        let (trajectories, stats) = self.pipeline.build_trajectories(detections, ingest_stats);
        let samples = self
            .worker_pool
            .extract_all(trajectories.trajectories.into_values())
            .await?;
        Ok(self.pipeline.summarize_and_segment(samples, stats))
    }
}
