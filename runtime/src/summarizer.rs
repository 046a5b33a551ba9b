use std::fmt::Debug;

use serde::Serialize;
use strum_macros::{Display, EnumString};

use crate::runtime_error::RuntimeResult;
use crate::types::Row;

/// Numeric type of a rendered output field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "lowercase")]
pub enum DataType {
    Float64,
}

/// A field declared in a summarizer's output schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputField {
    pub name: String,
    pub data_type: DataType,
}

impl OutputField {
    pub fn float64(name: impl Into<String>) -> Self {
        OutputField {
            name: name.into(),
            data_type: DataType::Float64,
        }
    }
}

/// A stateful, mergeable aggregation over the time-ordered rows of one group.
///
/// States are values: `add` and `merge` return new states and never mutate their
/// inputs, so a state moves between tasks instead of being shared.
///
/// `merge(left, right)` combines two states covering disjoint, contiguous row ranges
/// where `left` entirely precedes `right`. It must be associative over a chain of such
/// ranges, but it is not commutative.
pub trait Summarizer: Send + Sync {
    type State: Clone + Debug + Send + Sync;

    fn name(&self) -> &str;

    /// The identity state of an empty window.
    fn zero(&self) -> Self::State;

    fn add(&self, state: &Self::State, row: &Row) -> RuntimeResult<Self::State>;

    fn merge(&self, left: &Self::State, right: &Self::State) -> RuntimeResult<Self::State>;

    /// Renders the externally visible value. An uninitialized state renders `NaN`
    /// so output columns keep the same shape.
    fn render(&self, state: &Self::State) -> f64;

    fn output_schema(&self) -> Vec<OutputField>;

    /// Whether `add` rejects rows older than the latest row already folded in.
    fn requires_order(&self) -> bool {
        true
    }

    /// Capability check used by the window driver to pick a sliding-window strategy.
    fn as_subtractable(&self) -> Option<&dyn Subtractable<State = Self::State>> {
        None
    }
}

/// Summarizers whose `add` has an inverse.
///
/// Rows are removed in FIFO order: `subtract` only accepts the oldest row still
/// reflected by the state.
pub trait Subtractable: Summarizer {
    fn subtract(&self, state: &Self::State, row: &Row) -> RuntimeResult<Self::State>;
}

/// Folds `rows` into `state` in order.
pub fn add_all<'a, S, I>(summarizer: &S, state: S::State, rows: I) -> RuntimeResult<S::State>
where
    S: Summarizer + ?Sized,
    I: IntoIterator<Item = &'a Row>,
{
    rows.into_iter()
        .try_fold(state, |state, row| summarizer.add(&state, row))
}
