//! Pipeline-specific error types.

use crate::error::StreamError;
use thiserror::Error;

/// Errors returned by [`Pipeline::run`](crate::pipeline::Pipeline::run) and the config layer.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("source must be set before running the pipeline")]
    MissingSource,

    #[error("destination must be set before running the pipeline")]
    MissingDestination,

    /// A stage hit an error while the run used [`ErrorPolicy::Abort`](crate::config::ErrorPolicy::Abort).
    #[error("pipeline aborted by stage '{stage}': {source}")]
    Aborted {
        stage: String,
        #[source]
        source: StreamError,
    },

    #[error("failed to spawn thread for '{stage}': {source}")]
    Spawn {
        stage: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// True for the synchronous "pipeline is not fully configured" errors.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PipelineError::MissingSource | PipelineError::MissingDestination
        )
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
