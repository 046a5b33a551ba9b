use std::error::Error;

use thiserror::Error;

use tsummary_common::error::ParseError;
use tsummary_common::time::{format_timestamp, Timestamp};

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug, PartialEq, Clone, Error)]
pub enum RuntimeError {
    /// A row arrived older than the latest row already folded into the state.
    #[error("row at {} precedes the latest summarized row at {}", fmt_ts(.timestamp), fmt_ts(.latest))]
    OrderViolation { timestamp: Timestamp, latest: Timestamp },
    /// A subtracted row is not the oldest row still reflected by the state.
    #[error("cannot subtract row at {}: {}", fmt_ts(.timestamp), .reason)]
    SubtractionOrderViolation { timestamp: Timestamp, reason: String },
    #[error("partitions are not in timestamp order: {0}")]
    UnorderedPartitions(String),
    #[error("column `{0}` not found")]
    ColumnNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Unknown summarizer `{0}`")]
    UnknownSummarizer(String),
    #[error(transparent)]
    DurationParse(#[from] ParseError),
    #[error("{0}")]
    General(String),
}

fn fmt_ts(ts: &Timestamp) -> String {
    format_timestamp(*ts)
}

impl RuntimeError {
    pub(crate) fn subtraction_order(timestamp: Timestamp, reason: impl Into<String>) -> Self {
        RuntimeError::SubtractionOrderViolation {
            timestamp,
            reason: reason.into(),
        }
    }

    /// Order errors are integration bugs in the caller and must never be retried.
    pub fn is_order_violation(&self) -> bool {
        matches!(
            self,
            RuntimeError::OrderViolation { .. }
                | RuntimeError::SubtractionOrderViolation { .. }
                | RuntimeError::UnorderedPartitions(_)
        )
    }
}

impl From<&str> for RuntimeError {
    fn from(message: &str) -> Self {
        RuntimeError::General(String::from(message))
    }
}

impl From<String> for RuntimeError {
    fn from(message: String) -> Self {
        RuntimeError::General(message)
    }
}

impl<E: Error + 'static> From<(&str, E)> for RuntimeError {
    fn from((message, err): (&str, E)) -> Self {
        RuntimeError::General(format!("{}: {}", message, err))
    }
}
