// THEORY:
// Almost nothing in the motion-analytics core is allowed to fail. Degenerate
// samples, outliers and empty inputs are all handled by skipping and counting.
// What remains are the structural failures a caller has to hear about before
// any processing starts: unreadable files, a detection table without the
// columns we need, or a configuration that makes no sense.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Detection table is missing required column `{column}`")]
    MissingColumn { column: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Worker pool failure: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
