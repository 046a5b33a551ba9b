use std::borrow::Borrow;
use std::fmt;
use std::ops::Range;

use tracing::debug;

use tsummary_common::duration::{positive_duration_value, DisplayDuration};

use crate::runtime_error::{RuntimeError, RuntimeResult};
use crate::summarizer::{add_all, Subtractable, Summarizer};
use crate::types::{find_unordered, Row};

/// The set of rows a summarizer sees when producing the output for a row at time `t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Window {
    /// Every row of the group up to and including `t`.
    Cumulative,
    /// Rows in `[t - duration, t]`.
    Past(i64),
    /// Rows in `[t, t + duration]`.
    Future(i64),
}

impl Window {
    /// A window over a fixed amount of time into the past, e.g. `"1d"` or `"100s"`.
    pub fn past_absolute_time(duration: &str) -> RuntimeResult<Self> {
        Ok(Window::Past(positive_duration_value(duration)?))
    }

    /// A window over a fixed amount of time into the future, e.g. `"1d"` or `"100s"`.
    pub fn future_absolute_time(duration: &str) -> RuntimeResult<Self> {
        Ok(Window::Future(positive_duration_value(duration)?))
    }

    pub fn is_cumulative(&self) -> bool {
        matches!(self, Window::Cumulative)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Window::Cumulative => write!(f, "cumulative"),
            Window::Past(d) => write!(f, "pastAbsoluteTime({})", DisplayDuration(*d)),
            Window::Future(d) => write!(f, "futureAbsoluteTime({})", DisplayDuration(*d)),
        }
    }
}

/// Applies a summarizer over the ordered rows of one group, producing one rendered
/// value per row.
///
/// Sliding windows are maintained with `add`/`subtract` when the summarizer is
/// subtractable. Otherwise every window is recomputed from its rows.
pub struct WindowDriver<'a, S: Summarizer + ?Sized> {
    summarizer: &'a S,
    window: Window,
}

impl<'a, S: Summarizer + ?Sized> WindowDriver<'a, S> {
    pub fn new(summarizer: &'a S, window: Window) -> Self {
        WindowDriver { summarizer, window }
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn run<R: Borrow<Row>>(&self, rows: &[R]) -> RuntimeResult<Vec<f64>> {
        self.run_with_context(&[], rows, &[])
    }

    /// Cumulative output for `rows`, resuming from `initial`, the state of every row of
    /// the group that precedes them.
    pub fn run_cumulative_from<R: Borrow<Row>>(
        &self,
        initial: S::State,
        rows: &[R],
    ) -> RuntimeResult<Vec<f64>> {
        let mut state = initial;
        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            state = self.summarizer.add(&state, row.borrow())?;
            values.push(self.summarizer.render(&state));
        }
        Ok(values)
    }

    /// Runs the window over `rows`, emitting one value per row of `rows` only.
    ///
    /// `lookbehind` holds earlier rows of the group (e.g. from preceding partitions)
    /// that may fall into the windows of `rows`: older rows for past and cumulative
    /// windows, rows sharing the first timestamp of `rows` for future windows.
    /// `lookahead` holds later rows that may fall into future windows. Both must be in
    /// timestamp order with `rows`.
    pub fn run_with_context<R: Borrow<Row>>(
        &self,
        lookbehind: &[R],
        rows: &[R],
        lookahead: &[R],
    ) -> RuntimeResult<Vec<f64>> {
        match self.window {
            Window::Cumulative => {
                let initial = add_all(
                    self.summarizer,
                    self.summarizer.zero(),
                    lookbehind.iter().map(|r| r.borrow()),
                )?;
                self.run_cumulative_from(initial, rows)
            }
            Window::Past(duration) => {
                let all = ordered_rows(&[lookbehind, rows])?;
                match self.summarizer.as_subtractable() {
                    Some(sub) => self.past_subtracting(sub, duration, &all, lookbehind.len()),
                    None => {
                        debug!(window = %self.window, summarizer = self.summarizer.name(),
                            "summarizer is not subtractable; recomputing every window");
                        self.past_recomputing(duration, &all, lookbehind.len())
                    }
                }
            }
            Window::Future(duration) => {
                let all = ordered_rows(&[lookbehind, rows, lookahead])?;
                let emit = lookbehind.len()..lookbehind.len() + rows.len();
                match self.summarizer.as_subtractable() {
                    Some(sub) => self.future_subtracting(sub, duration, &all, emit),
                    None => {
                        debug!(window = %self.window, summarizer = self.summarizer.name(),
                            "summarizer is not subtractable; recomputing every window");
                        self.future_recomputing(duration, &all, emit)
                    }
                }
            }
        }
    }

    fn past_subtracting(
        &self,
        sub: &dyn Subtractable<State = S::State>,
        duration: i64,
        all: &[&Row],
        skip: usize,
    ) -> RuntimeResult<Vec<f64>> {
        let mut values = Vec::with_capacity(all.len() - skip);
        let mut state = sub.zero();
        let mut start = 0;
        for (i, row) in all.iter().enumerate() {
            state = sub.add(&state, row)?;
            let lower = row.timestamp.saturating_sub(duration);
            while all[start].timestamp < lower {
                state = sub.subtract(&state, all[start])?;
                start += 1;
            }
            if i >= skip {
                values.push(sub.render(&state));
            }
        }
        Ok(values)
    }

    fn past_recomputing(&self, duration: i64, all: &[&Row], skip: usize) -> RuntimeResult<Vec<f64>> {
        let mut values = Vec::with_capacity(all.len() - skip);
        let mut start = 0;
        for (i, row) in all.iter().enumerate() {
            let lower = row.timestamp.saturating_sub(duration);
            while all[start].timestamp < lower {
                start += 1;
            }
            if i >= skip {
                let state = add_all(self.summarizer, self.summarizer.zero(), all[start..=i].iter().copied())?;
                values.push(self.summarizer.render(&state));
            }
        }
        Ok(values)
    }

    fn future_subtracting(
        &self,
        sub: &dyn Subtractable<State = S::State>,
        duration: i64,
        all: &[&Row],
        emit: Range<usize>,
    ) -> RuntimeResult<Vec<f64>> {
        let mut values = Vec::with_capacity(emit.len());
        let mut state = sub.zero();
        let (mut start, mut end) = (0, 0);
        for row in &all[emit] {
            let upper = row.timestamp.saturating_add(duration);
            while end < all.len() && all[end].timestamp <= upper {
                state = sub.add(&state, all[end])?;
                end += 1;
            }
            while all[start].timestamp < row.timestamp {
                state = sub.subtract(&state, all[start])?;
                start += 1;
            }
            values.push(sub.render(&state));
        }
        Ok(values)
    }

    fn future_recomputing(
        &self,
        duration: i64,
        all: &[&Row],
        emit: Range<usize>,
    ) -> RuntimeResult<Vec<f64>> {
        let mut values = Vec::with_capacity(emit.len());
        let (mut start, mut end) = (0, 0);
        for row in &all[emit] {
            let upper = row.timestamp.saturating_add(duration);
            while end < all.len() && all[end].timestamp <= upper {
                end += 1;
            }
            while all[start].timestamp < row.timestamp {
                start += 1;
            }
            let state = add_all(self.summarizer, self.summarizer.zero(), all[start..end].iter().copied())?;
            values.push(self.summarizer.render(&state));
        }
        Ok(values)
    }
}

/// Concatenates row slices, failing if the result is not in timestamp order.
fn ordered_rows<'r, R: Borrow<Row>>(parts: &[&'r [R]]) -> RuntimeResult<Vec<&'r Row>> {
    let all: Vec<&Row> = parts
        .iter()
        .flat_map(|part| part.iter().map(|r| r.borrow()))
        .collect();
    if let Some(i) = find_unordered(&all) {
        return Err(RuntimeError::OrderViolation {
            timestamp: all[i].timestamp,
            latest: all[i - 1].timestamp,
        });
    }
    Ok(all)
}
