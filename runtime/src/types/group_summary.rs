use tsummary_common::time::Timestamp;

use crate::runtime_error::{RuntimeError, RuntimeResult};

/// The rendered output column for one group: one value per emitted row.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub key: String,
    pub timestamps: Vec<Timestamp>,
    pub values: Vec<f64>,
}

impl GroupSummary {
    pub fn new(key: impl Into<String>, timestamps: Vec<Timestamp>, values: Vec<f64>) -> Self {
        GroupSummary {
            key: key.into(),
            timestamps,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Appends the output of a later partition of the same group.
    pub(crate) fn extend(&mut self, timestamps: &[Timestamp], values: &[f64]) -> RuntimeResult<()> {
        if timestamps.len() != values.len() {
            let msg = format!(
                "BUG: values.len() must match timestamps.len(); got {} vs {}",
                values.len(),
                timestamps.len()
            );
            return Err(RuntimeError::from(msg));
        }
        self.timestamps.extend_from_slice(timestamps);
        self.values.extend_from_slice(values);
        Ok(())
    }
}
