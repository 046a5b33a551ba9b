use std::borrow::Borrow;

use ahash::AHashMap;

use tsummary_common::time::Timestamp;

use crate::runtime_error::{RuntimeError, RuntimeResult};

/// A timestamped record with named scalar fields.
///
/// `key` identifies the summarization stream (group) the row belongs to. Rows of
/// different groups are never folded into the same state.
#[derive(Debug, Clone, Default)]
pub struct Row {
    pub timestamp: Timestamp,
    pub key: String,
    values: AHashMap<String, f64>,
}

impl Row {
    pub fn new(timestamp: Timestamp) -> Self {
        Row {
            timestamp,
            key: String::new(),
            values: AHashMap::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_value(mut self, column: impl Into<String>, value: f64) -> Self {
        self.values.insert(column.into(), value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: f64) -> Option<f64> {
        self.values.insert(column.into(), value)
    }

    pub fn get(&self, column: &str) -> RuntimeResult<f64> {
        self.values
            .get(column)
            .copied()
            .ok_or_else(|| RuntimeError::ColumnNotFound(column.to_string()))
    }
}

/// Returns the index of the first row that is older than its predecessor, if any.
pub(crate) fn find_unordered<R: Borrow<Row>>(rows: &[R]) -> Option<usize> {
    rows.windows(2)
        .position(|pair| pair[1].borrow().timestamp < pair[0].borrow().timestamp)
        .map(|i| i + 1)
}

/// Builds an ungrouped series of rows with a single `column`, one row per (timestamp, value) pair.
pub fn rows_from_series(column: &str, timestamps: &[Timestamp], values: &[f64]) -> Vec<Row> {
    timestamps
        .iter()
        .zip(values.iter())
        .map(|(ts, v)| Row::new(*ts).with_value(column, *v))
        .collect()
}
