use crate::runtime_error::RuntimeResult;
use crate::summarizer::{OutputField, Summarizer};
use crate::types::Row;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MaxState {
    max: f64,
    count: usize,
}

impl MaxState {
    pub fn count(&self) -> usize {
        self.count
    }
}

/// Running maximum of a column.
///
/// Not subtractable: once the maximum leaves a window there is no way to recover the
/// runner-up without the window's rows, so sliding windows are recomputed.
#[derive(Debug, Clone, PartialEq)]
pub struct MaxSummarizer {
    column: String,
    output_name: String,
}

impl MaxSummarizer {
    pub fn new(column: impl Into<String>) -> Self {
        let column = column.into();
        let output_name = format!("{}_max", column);
        MaxSummarizer {
            column,
            output_name,
        }
    }
}

impl Summarizer for MaxSummarizer {
    type State = MaxState;

    fn name(&self) -> &str {
        "max"
    }

    fn zero(&self) -> MaxState {
        MaxState::default()
    }

    fn add(&self, state: &MaxState, row: &Row) -> RuntimeResult<MaxState> {
        let v = row.get(&self.column)?;
        if v.is_nan() {
            return Ok(*state);
        }
        if state.count == 0 {
            return Ok(MaxState { max: v, count: 1 });
        }
        Ok(MaxState {
            max: state.max.max(v),
            count: state.count + 1,
        })
    }

    fn merge(&self, left: &MaxState, right: &MaxState) -> RuntimeResult<MaxState> {
        Ok(match (left.count, right.count) {
            (0, _) => *right,
            (_, 0) => *left,
            _ => MaxState {
                max: left.max.max(right.max),
                count: left.count + right.count,
            },
        })
    }

    fn render(&self, state: &MaxState) -> f64 {
        if state.count == 0 {
            return f64::NAN;
        }
        state.max
    }

    fn output_schema(&self) -> Vec<OutputField> {
        vec![OutputField::float64(self.output_name.clone())]
    }

    fn requires_order(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarizer::add_all;
    use crate::types::rows_from_series;

    #[test]
    fn test_max() {
        let s = MaxSummarizer::new("x");
        let rows = rows_from_series("x", &[3, 1, 2], &[1.0, f64::NAN, 7.0]);
        let state = add_all(&s, s.zero(), rows.iter()).unwrap();
        assert_eq!(s.render(&state), 7.0);
        assert_eq!(state.count(), 2);
        assert!(s.render(&s.zero()).is_nan());
        assert!(s.as_subtractable().is_none());
    }

    #[test]
    fn test_merge() {
        let s = MaxSummarizer::new("x");
        let left = add_all(&s, s.zero(), rows_from_series("x", &[0, 1], &[5.0, 2.0]).iter()).unwrap();
        let right = add_all(&s, s.zero(), rows_from_series("x", &[2], &[3.0]).iter()).unwrap();
        let merged = s.merge(&left, &right).unwrap();
        assert_eq!(s.render(&merged), 5.0);
        assert_eq!(merged.count(), 3);
        assert_eq!(s.merge(&s.zero(), &right), Ok(right));
    }
}
