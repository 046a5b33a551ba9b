use tracing::trace;

use tsummary_common::time::Timestamp;

use crate::config::{Convention, DurationPerPeriod, EwmaConfig};
use crate::runtime_error::{RuntimeError, RuntimeResult};
use crate::summarizer::{OutputField, Subtractable, Summarizer};
use crate::types::Row;

/// Accumulated EWMA state of a contiguous range of rows.
///
/// `weighted_sum` and `weighted_decay_accumulated` are decayed to the time of the
/// latest row. `decay_product` is the product of every decay step applied since the
/// range start, i.e. the weight still carried by the oldest contribution. Keeping it
/// next to the sums is what lets `merge` rescale a preceding range exactly.
///
/// `first_timestamp` is the timestamp of the oldest contribution until a row is
/// subtracted; from then on it is only a lower bound, since the next-oldest row is not
/// retained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EwmaState {
    weighted_sum: f64,
    weighted_decay_accumulated: f64,
    first_timestamp: Option<Timestamp>,
    first_timestamp_exact: bool,
    previous_timestamp: Option<Timestamp>,
    last_value: Option<f64>,
    decay_product: f64,
    count: usize,
}

impl Default for EwmaState {
    fn default() -> Self {
        EwmaState {
            weighted_sum: 0.0,
            weighted_decay_accumulated: 0.0,
            first_timestamp: None,
            first_timestamp_exact: false,
            previous_timestamp: None,
            last_value: None,
            decay_product: 1.0,
            count: 0,
        }
    }
}

impl EwmaState {
    pub fn is_initialized(&self) -> bool {
        self.count > 0
    }

    pub fn weighted_sum(&self) -> f64 {
        self.weighted_sum
    }

    pub fn weighted_decay_accumulated(&self) -> f64 {
        self.weighted_decay_accumulated
    }

    pub fn decay_product(&self) -> f64 {
        self.decay_product
    }

    /// Oldest timestamp the state may still reflect.
    pub fn first_timestamp(&self) -> Option<Timestamp> {
        self.first_timestamp
    }

    /// Whether `first_timestamp` is the timestamp of the oldest contribution rather
    /// than a lower bound.
    pub fn is_first_timestamp_exact(&self) -> bool {
        self.first_timestamp_exact
    }

    pub fn previous_timestamp(&self) -> Option<Timestamp> {
        self.previous_timestamp
    }

    pub fn last_value(&self) -> Option<f64> {
        self.last_value
    }

    /// Number of rows currently reflected by the state.
    pub fn count(&self) -> usize {
        self.count
    }
}

/// Exponentially weighted moving average of a single column.
///
/// With decay `d = (1 - alpha)^p` between consecutive rows:
///
/// * `Legacy`: `S = d*S + alpha*x`, `W = d*W + alpha`, rendered as `S`
/// * `Core`: `S = d*S + x`, `W = d*W + 1`, rendered as `S / W`
///
/// `p` is 1 per row under [`DurationPerPeriod::Constant`], otherwise the elapsed time
/// divided by the period length. Since both conventions share the accumulator and only
/// differ in the `(value, weight)` contributed by a row, `Core(x)` equals
/// `Legacy(x) / Legacy(1)` at every row.
#[derive(Debug, Clone, PartialEq)]
pub struct EwmaSummarizer {
    x_column: String,
    output_name: String,
    alpha: f64,
    duration_per_period: DurationPerPeriod,
    convention: Convention,
}

impl EwmaSummarizer {
    pub fn new(config: &EwmaConfig) -> RuntimeResult<Self> {
        config.validate()?;
        Ok(EwmaSummarizer {
            x_column: config.x_column.clone(),
            output_name: config.output_name(),
            alpha: config.alpha()?,
            duration_per_period: config.duration_per_period,
            convention: config.convention,
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn convention(&self) -> Convention {
        self.convention
    }

    pub fn duration_per_period(&self) -> DurationPerPeriod {
        self.duration_per_period
    }

    pub fn x_column(&self) -> &str {
        &self.x_column
    }

    /// Number of decay periods between two consecutive rows.
    fn periods_between(&self, from: Timestamp, to: Timestamp) -> f64 {
        match self.duration_per_period {
            DurationPerPeriod::Constant => 1.0,
            DurationPerPeriod::Period(nanos) => {
                let elapsed = to.saturating_sub(from);
                // no elapsed time means no decay
                if elapsed <= 0 {
                    0.0
                } else {
                    elapsed as f64 / nanos as f64
                }
            }
        }
    }

    #[inline]
    fn decay(&self, periods: f64) -> f64 {
        if periods == 0.0 {
            return 1.0;
        }
        (1.0 - self.alpha).powf(periods)
    }

    /// Decay over `steps` rows under `Constant`. Computed from the row count rather
    /// than accumulated, so a long run of adds that underflows to zero recovers once
    /// the window shrinks again.
    fn steps_decay(&self, steps: usize) -> f64 {
        i32::try_from(steps).map_or(0.0, |n| (1.0 - self.alpha).powi(n))
    }

    /// The (value, weight) pair a row contributes at the time it is added.
    #[inline]
    fn contribution(&self, x: f64) -> (f64, f64) {
        match self.convention {
            Convention::Core => (x, 1.0),
            Convention::Legacy => (self.alpha * x, self.alpha),
        }
    }
}

impl Summarizer for EwmaSummarizer {
    type State = EwmaState;

    fn name(&self) -> &str {
        "ewma"
    }

    fn zero(&self) -> EwmaState {
        EwmaState::default()
    }

    fn add(&self, state: &EwmaState, row: &Row) -> RuntimeResult<EwmaState> {
        let x = row.get(&self.x_column)?;

        if let Some(latest) = state.previous_timestamp {
            if row.timestamp < latest {
                return Err(RuntimeError::OrderViolation {
                    timestamp: row.timestamp,
                    latest,
                });
            }
        }

        // skip NaN
        if x.is_nan() {
            return Ok(*state);
        }

        let (value, weight) = self.contribution(x);
        let mut next = *state;
        match state.previous_timestamp {
            Some(prev) if state.count > 0 => {
                let decay = self.decay(self.periods_between(prev, row.timestamp));
                next.weighted_sum = decay * state.weighted_sum + value;
                next.weighted_decay_accumulated = decay * state.weighted_decay_accumulated + weight;
                next.decay_product = state.decay_product * decay;
            }
            _ => {
                next.weighted_sum = value;
                next.weighted_decay_accumulated = weight;
                next.first_timestamp = Some(row.timestamp);
                next.first_timestamp_exact = true;
                next.decay_product = 1.0;
            }
        }
        next.previous_timestamp = Some(row.timestamp);
        next.last_value = Some(x);
        next.count += 1;

        Ok(next)
    }

    fn merge(&self, left: &EwmaState, right: &EwmaState) -> RuntimeResult<EwmaState> {
        if !left.is_initialized() {
            return Ok(*right);
        }
        if !right.is_initialized() {
            return Ok(*left);
        }

        let (left_last, right_first) = match (left.previous_timestamp, right.first_timestamp) {
            (Some(l), Some(r)) => (l, r),
            _ => return Err(RuntimeError::from("BUG: initialized ewma state without timestamps")),
        };
        if right_first < left_last {
            return Err(RuntimeError::OrderViolation {
                timestamp: right_first,
                latest: left_last,
            });
        }

        // Decay everything in `left` from its last row up to the last row of `right`:
        // one bridging step to right's first row, then every step taken inside right.
        let bridge = self.decay(self.periods_between(left_last, right_first));
        let scale = bridge * right.decay_product;

        trace!(
            left_count = left.count,
            right_count = right.count,
            scale,
            "merging ewma states"
        );

        Ok(EwmaState {
            weighted_sum: left.weighted_sum * scale + right.weighted_sum,
            weighted_decay_accumulated: left.weighted_decay_accumulated * scale
                + right.weighted_decay_accumulated,
            first_timestamp: left.first_timestamp,
            first_timestamp_exact: left.first_timestamp_exact,
            previous_timestamp: right.previous_timestamp,
            last_value: right.last_value,
            decay_product: left.decay_product * scale,
            count: left.count + right.count,
        })
    }

    fn render(&self, state: &EwmaState) -> f64 {
        if !state.is_initialized() {
            return f64::NAN;
        }
        match self.convention {
            Convention::Legacy => state.weighted_sum,
            Convention::Core => {
                if state.weighted_decay_accumulated == 0.0 {
                    f64::NAN
                } else {
                    state.weighted_sum / state.weighted_decay_accumulated
                }
            }
        }
    }

    fn output_schema(&self) -> Vec<OutputField> {
        vec![OutputField::float64(self.output_name.clone())]
    }

    fn as_subtractable(&self) -> Option<&dyn Subtractable<State = EwmaState>> {
        Some(self)
    }
}

impl Subtractable for EwmaSummarizer {
    fn subtract(&self, state: &EwmaState, row: &Row) -> RuntimeResult<EwmaState> {
        let x = row.get(&self.x_column)?;
        // NaN rows were never added
        if x.is_nan() {
            return Ok(*state);
        }

        let (oldest, latest) = match (state.first_timestamp, state.previous_timestamp) {
            (Some(first), Some(last)) if state.is_initialized() => (first, last),
            _ => {
                return Err(RuntimeError::subtraction_order(
                    row.timestamp,
                    "state has no rows",
                ))
            }
        };
        if row.timestamp < oldest {
            return Err(RuntimeError::subtraction_order(
                row.timestamp,
                "row is older than the oldest row in the state",
            ));
        }
        if state.first_timestamp_exact && row.timestamp != oldest {
            return Err(RuntimeError::subtraction_order(
                row.timestamp,
                "row is not the oldest row in the state",
            ));
        }
        if row.timestamp > latest {
            return Err(RuntimeError::subtraction_order(
                row.timestamp,
                "row is newer than the latest row in the state",
            ));
        }

        if state.count == 1 {
            return Ok(self.zero());
        }

        // Weight the oldest row carries at the latest row's time.
        let weight = match self.duration_per_period {
            DurationPerPeriod::Constant => self.steps_decay(state.count - 1),
            DurationPerPeriod::Period(_) => self.decay(self.periods_between(row.timestamp, latest)),
        };
        let (value, row_weight) = self.contribution(x);

        let mut next = *state;
        next.weighted_sum -= value * weight;
        next.weighted_decay_accumulated -= row_weight * weight;
        next.count -= 1;
        // the removed row's timestamp becomes the lower bound of the remaining range
        next.first_timestamp = Some(row.timestamp);
        next.first_timestamp_exact = false;
        next.decay_product = match self.duration_per_period {
            DurationPerPeriod::Constant => self.steps_decay(next.count - 1),
            DurationPerPeriod::Period(_) => weight,
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use tsummary_common::time::NANOS_PER_SECOND;

    use super::*;
    use crate::summarizer::add_all;
    use crate::types::rows_from_series;

    fn summarizer(convention: Convention, dpp: DurationPerPeriod, alpha: f64) -> EwmaSummarizer {
        let config = EwmaConfig::new("x")
            .with_alpha(alpha)
            .with_convention(convention)
            .with_duration_per_period(dpp);
        EwmaSummarizer::new(&config).unwrap()
    }

    fn cumulative(s: &EwmaSummarizer, rows: &[Row]) -> Vec<f64> {
        let mut state = s.zero();
        rows.iter()
            .map(|row| {
                state = s.add(&state, row).unwrap();
                s.render(&state)
            })
            .collect()
    }

    #[test]
    fn test_constant_core_scenario() {
        let s = summarizer(Convention::Core, DurationPerPeriod::Constant, 0.5);
        let rows = rows_from_series("x", &[0, 1, 2], &[1.0, 1.0, 1.0]);
        assert_eq!(cumulative(&s, &rows), vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_legacy_first_row_is_partially_weighted() {
        let s = summarizer(Convention::Legacy, DurationPerPeriod::Constant, 0.5);
        let rows = rows_from_series("x", &[0, 1, 2], &[1.0, 1.0, 1.0]);
        // the first row is weighted by alpha, not taken as-is
        assert_eq!(cumulative(&s, &rows), vec![0.5, 0.75, 0.875]);

        // normalized by the legacy average of ones, the constant series stays fixed
        let state = add_all(&s, s.zero(), rows.iter()).unwrap();
        assert_eq!(state.weighted_decay_accumulated(), 0.875);
        assert_eq!(
            s.render(&state) / state.weighted_decay_accumulated(),
            1.0
        );
    }

    #[test]
    fn test_core_constant_input_is_fixed_point() {
        for dpp in [DurationPerPeriod::Constant, DurationPerPeriod::Period(NANOS_PER_SECOND)] {
            let s = summarizer(Convention::Core, dpp, 0.3);
            let timestamps = [0, 1, 3, 3, 7, 20].map(|t| t * NANOS_PER_SECOND);
            let rows = rows_from_series("x", &timestamps, &[4.0; 6]);
            assert_eq!(cumulative(&s, &rows), vec![4.0; 6]);
        }
    }

    #[test]
    fn test_timed_decay() {
        let s = summarizer(Convention::Core, DurationPerPeriod::Period(NANOS_PER_SECOND), 0.5);
        let rows = rows_from_series("x", &[0, 2 * NANOS_PER_SECOND], &[2.0, 4.0]);
        let values = cumulative(&s, &rows);
        // 2 periods elapsed: the first value keeps a weight of 0.25
        assert_eq!(values[1], (0.25 * 2.0 + 4.0) / 1.25);
    }

    #[test]
    fn test_zero_elapsed_time_does_not_decay() {
        let s = summarizer(Convention::Legacy, DurationPerPeriod::Period(NANOS_PER_SECOND), 0.5);
        let rows = rows_from_series("x", &[5, 5, 5], &[1.0, 2.0, 3.0]);
        let state = add_all(&s, s.zero(), rows.iter()).unwrap();
        assert_eq!(state.weighted_sum(), 3.0);
        assert_eq!(state.weighted_decay_accumulated(), 1.5);
        assert_eq!(state.decay_product(), 1.0);
    }

    #[test]
    fn test_order_violation() {
        let s = summarizer(Convention::Core, DurationPerPeriod::Constant, 0.5);
        let rows = rows_from_series("x", &[10, 5], &[1.0, 1.0]);
        let state = s.add(&s.zero(), &rows[0]).unwrap();
        let err = s.add(&state, &rows[1]).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::OrderViolation {
                timestamp: 5,
                latest: 10
            }
        );
    }

    #[test]
    fn test_uninitialized_renders_nan() {
        for convention in [Convention::Core, Convention::Legacy] {
            let s = summarizer(convention, DurationPerPeriod::Constant, 0.5);
            assert!(s.render(&s.zero()).is_nan());
        }
    }

    #[test]
    fn test_nan_values_are_skipped() {
        let s = summarizer(Convention::Core, DurationPerPeriod::Constant, 0.5);
        let rows = rows_from_series("x", &[0, 1, 2], &[2.0, f64::NAN, 2.0]);
        let state = add_all(&s, s.zero(), rows.iter()).unwrap();
        assert_eq!(state.count(), 2);
        assert_eq!(s.render(&state), 2.0);
    }

    #[test]
    fn test_missing_column() {
        let s = summarizer(Convention::Core, DurationPerPeriod::Constant, 0.5);
        let row = Row::new(0).with_value("y", 1.0);
        assert_eq!(
            s.add(&s.zero(), &row),
            Err(RuntimeError::ColumnNotFound("x".to_string()))
        );
    }

    #[test]
    fn test_render_is_idempotent() {
        let s = summarizer(Convention::Core, DurationPerPeriod::Period(NANOS_PER_SECOND), 0.1);
        let rows = rows_from_series("x", &[0, 3, 9], &[1.0, 7.0, -2.5]);
        let state = add_all(&s, s.zero(), rows.iter()).unwrap();
        let first = s.render(&state);
        assert_eq!(first.to_bits(), s.render(&state).to_bits());
    }

    #[test]
    fn test_subtract_inverts_add() {
        let s = summarizer(Convention::Legacy, DurationPerPeriod::Period(NANOS_PER_SECOND), 0.2);
        let row = Row::new(42).with_value("x", 3.5);
        let state = s.add(&s.zero(), &row).unwrap();
        assert_eq!(s.subtract(&state, &row), Ok(s.zero()));
    }

    #[test]
    fn test_subtract_order_violation() {
        let s = summarizer(Convention::Core, DurationPerPeriod::Constant, 0.5);
        let rows = rows_from_series("x", &[10, 20], &[1.0, 2.0]);
        let state = add_all(&s, s.zero(), rows.iter()).unwrap();

        let too_old = Row::new(5).with_value("x", 1.0);
        assert!(matches!(
            s.subtract(&state, &too_old),
            Err(RuntimeError::SubtractionOrderViolation { timestamp: 5, .. })
        ));
        let too_new = Row::new(25).with_value("x", 1.0);
        assert!(matches!(
            s.subtract(&state, &too_new),
            Err(RuntimeError::SubtractionOrderViolation { timestamp: 25, .. })
        ));
        assert!(matches!(
            s.subtract(&s.zero(), &rows[0]),
            Err(RuntimeError::SubtractionOrderViolation { .. })
        ));

        // once the oldest row is gone, it cannot be removed again
        let state = s.subtract(&state, &rows[0]).unwrap();
        let older = Row::new(9).with_value("x", 1.0);
        assert!(s.subtract(&state, &older).is_err());
    }

    #[test]
    fn test_subtract_rejects_a_middle_row() {
        let s = summarizer(Convention::Core, DurationPerPeriod::Constant, 0.5);
        let rows = rows_from_series("x", &[10, 20, 30], &[1.0, 100.0, 5.0]);
        let state = add_all(&s, s.zero(), rows.iter()).unwrap();
        assert!(state.is_first_timestamp_exact());
        assert!(matches!(
            s.subtract(&state, &rows[1]),
            Err(RuntimeError::SubtractionOrderViolation { timestamp: 20, .. })
        ));

        let state = s.subtract(&state, &rows[0]).unwrap();
        assert!(!state.is_first_timestamp_exact());
        assert_eq!(state.first_timestamp(), Some(10));
        assert_eq!(s.render(&state), (0.5 * 100.0 + 5.0) / 1.5);
    }

    #[test]
    fn test_constant_subtract_survives_underflow() {
        let s = summarizer(Convention::Core, DurationPerPeriod::Constant, 0.5);
        let timestamps: Vec<i64> = (0..2100).collect();
        let rows = rows_from_series("x", &timestamps, &[100.0; 2100]);
        let mut state = add_all(&s, s.zero(), rows.iter()).unwrap();
        // 0.5^2099 is not representable
        assert_eq!(state.decay_product(), 0.0);

        let late = Row::new(5000).with_value("x", 0.0);
        state = s.add(&state, &late).unwrap();
        for row in &rows {
            state = s.subtract(&state, row).unwrap();
        }
        assert_eq!(state.count(), 1);
        assert!(s.render(&state).abs() < 1e-9, "{}", s.render(&state));
        assert!((state.weighted_decay_accumulated() - 1.0).abs() < 1e-9);
        assert_eq!(state.decay_product(), 1.0);
    }

    #[test]
    fn test_merge_with_empty_state() {
        let s = summarizer(Convention::Core, DurationPerPeriod::Constant, 0.5);
        let rows = rows_from_series("x", &[0, 1], &[1.0, 3.0]);
        let state = add_all(&s, s.zero(), rows.iter()).unwrap();
        assert_eq!(s.merge(&s.zero(), &state), Ok(state));
        assert_eq!(s.merge(&state, &s.zero()), Ok(state));
    }

    #[test]
    fn test_merge_rejects_out_of_order_ranges() {
        let s = summarizer(Convention::Core, DurationPerPeriod::Constant, 0.5);
        let rows = rows_from_series("x", &[0, 5, 10, 15], &[1.0, 2.0, 3.0, 4.0]);
        let left = add_all(&s, s.zero(), rows[..2].iter()).unwrap();
        let right = add_all(&s, s.zero(), rows[2..].iter()).unwrap();
        assert!(s.merge(&left, &right).is_ok());
        assert_eq!(
            s.merge(&right, &left),
            Err(RuntimeError::OrderViolation {
                timestamp: 0,
                latest: 15
            })
        );
    }

    #[test]
    fn test_output_schema() {
        let config = EwmaConfig::new("price").with_alpha(0.1);
        let s = EwmaSummarizer::new(&config).unwrap();
        assert_eq!(s.output_schema(), vec![OutputField::float64("price_ewma")]);

        let s = EwmaSummarizer::new(&config.with_alias("smoothed")).unwrap();
        assert_eq!(s.output_schema()[0].name, "smoothed");
    }
}
