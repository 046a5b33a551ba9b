use itertools::izip;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use tsummary_common::time::{Timestamp, NANOS_PER_SECOND};

use crate::types::{GroupSummary, Row};

pub const EPSILON: f64 = 1e-9;

/// Relative comparison; NaN only equals NaN.
pub fn compare_floats(expected: f64, actual: f64) -> bool {
    match (expected.is_finite(), actual.is_finite()) {
        (true, true) => (actual - expected).abs() <= EPSILON * expected.abs().max(1.0),
        (false, false) => {
            if expected.is_nan() {
                return actual.is_nan();
            }
            expected == actual
        }
        _ => false,
    }
}

pub fn compare_values(actual: &[f64], expected: &[f64]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "unexpected number of values; got {}; want {}",
        actual.len(),
        expected.len()
    );
    for (i, got, wanted) in izip!(0.., actual.iter(), expected.iter()) {
        assert!(
            compare_floats(*wanted, *got),
            "unexpected value at values[{}]; got {}; want {}\nvalues=\n{:?}\nvalues_expected=\n{:?}",
            i,
            got,
            wanted,
            actual,
            expected
        );
    }
}

pub fn test_summaries_equal(actual: &[GroupSummary], expected: &[GroupSummary]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "unexpected group count; got {}; want {}",
        actual.len(),
        expected.len()
    );
    for (got, wanted) in actual.iter().zip(expected.iter()) {
        assert_eq!(got.key, wanted.key);
        assert_eq!(
            got.timestamps, wanted.timestamps,
            "unexpected timestamps for group {}",
            got.key
        );
        compare_values(&got.values, &wanted.values);
    }
}

/// Generates `n` ordered rows with a single `x` column. Gaps are up to 3s and
/// include repeated timestamps; values are normally distributed with the odd NaN.
pub fn random_rows(rng: &mut StdRng, key: &str, n: usize) -> Vec<Row> {
    let normal = Normal::new(10.0, 5.0).unwrap();
    let mut ts: Timestamp = 0;
    (0..n)
        .map(|_| {
            if !rng.gen_bool(0.2) {
                ts += rng.gen_range(1..=3 * NANOS_PER_SECOND);
            }
            let value = if rng.gen_bool(0.02) {
                f64::NAN
            } else {
                normal.sample(rng)
            };
            Row::new(ts).with_key(key).with_value("x", value)
        })
        .collect()
}

/// Splits `rows` into `count` contiguous partitions at random cut points.
/// Some partitions may be empty.
pub fn random_partitions(rng: &mut StdRng, rows: &[Row], count: usize) -> Vec<Vec<Row>> {
    let mut cuts: Vec<usize> = (1..count).map(|_| rng.gen_range(0..=rows.len())).collect();
    cuts.sort_unstable();
    let mut partitions = Vec::with_capacity(count);
    let mut start = 0;
    for cut in cuts.into_iter().chain(std::iter::once(rows.len())) {
        partitions.push(rows[start..cut].to_vec());
        start = cut;
    }
    partitions
}

/// Splits `rows` into at most `count` partitions, cutting only between rows that share
/// a timestamp.
pub fn partitions_at_repeated_timestamps(
    rng: &mut StdRng,
    rows: &[Row],
    count: usize,
) -> Vec<Vec<Row>> {
    let candidates: Vec<usize> = (1..rows.len())
        .filter(|&i| rows[i].timestamp == rows[i - 1].timestamp)
        .collect();
    let mut cuts: Vec<usize> = candidates
        .choose_multiple(rng, count.saturating_sub(1))
        .copied()
        .collect();
    cuts.sort_unstable();
    let mut partitions = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for cut in cuts.into_iter().chain(std::iter::once(rows.len())) {
        partitions.push(rows[start..cut].to_vec());
        start = cut;
    }
    partitions
}
