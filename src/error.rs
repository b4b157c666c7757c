//! Top-level error type for pipeline runs.

use crate::processor::ProcessorError;
use crate::transport::BrokerError;
use thiserror::Error;

pub type CutResult<T> = Result<T, CutError>;

/// Errors surfaced by a coordinator or worker run. Configuration
/// problems are rejected before a run starts and never reach this
/// type.
#[derive(Debug, Error)]
pub enum CutError {
    #[error("processing error: {0}")]
    Processor(#[from] ProcessorError),

    #[error("transport error: {0}")]
    Transport(#[from] BrokerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("input produced no chunks")]
    NoChunks,

    #[error("no results received before timeout")]
    NoResults,

    #[error("result stream closed before collection finished")]
    ResultStreamClosed,

    #[error("quorum not reached: {clean} clean results of {expected} tasks (need {threshold})")]
    QuorumNotReached {
        clean: usize,
        expected: usize,
        threshold: usize,
    },

    #[error("failed to publish task {task_id}")]
    PublishTask {
        task_id: String,
        #[source]
        source: BrokerError,
    },
}
