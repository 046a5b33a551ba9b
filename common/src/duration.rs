use std::fmt;
use std::fmt::Formatter;

use crate::error::{ParseError, ParseResult};
use crate::time::*;

// Formatting adapted from Polars
// https://github.com/pola-rs/polars/blob/master/polars/polars-core/src/fmt.rs
// License Apache-2.0

const NAMES: [&str; 8] = ["y", "d", "h", "m", "s", "ms", "us", "ns"];
const SIZES_NS: [i64; 8] = [
    NANOS_PER_YEAR,
    NANOS_PER_DAY,
    NANOS_PER_HOUR,
    NANOS_PER_MINUTE,
    NANOS_PER_SECOND,
    NANOS_PER_MILLI,
    NANOS_PER_MICRO,
    1,
];

/// Marker for an unbounded duration (`Inf`, `+Inf`, `PlusInf`).
pub const INFINITE_DURATION: i64 = i64::MAX;

pub fn fmt_duration_ns(f: &mut Formatter<'_>, v: i64) -> fmt::Result {
    match v {
        0 => write!(f, "0s"),
        INFINITE_DURATION => write!(f, "Inf"),
        i64::MIN => write!(f, "-Inf"),
        _ => format_duration(f, v, SIZES_NS.as_slice(), NAMES.as_slice()),
    }
}

pub fn format_duration(f: &mut Formatter, v: i64, sizes: &[i64], names: &[&str]) -> fmt::Result {
    for i in 0..sizes.len() {
        let whole_num = if i == 0 {
            v / sizes[i]
        } else {
            (v % sizes[i - 1]) / sizes[i]
        };
        if whole_num <= -1 || whole_num >= 1 {
            write!(f, "{}{}", whole_num, names[i])?;
        }
    }
    Ok(())
}

/// Display adapter for a nanosecond duration, e.g. `1d2h` or `250ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayDuration(pub i64);

impl fmt::Display for DisplayDuration {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fmt_duration_ns(f, self.0)
    }
}

/// positive_duration_value returns a non-negative duration in nanoseconds for the given s.
///
/// Error is returned if the duration in s is negative.
pub fn positive_duration_value(s: &str) -> ParseResult<i64> {
    let d = duration_value(s)?;
    if d < 0 {
        return Err(ParseError::NegativeDuration(s.to_string()));
    }
    Ok(d)
}

/// duration_value returns the duration in nanoseconds for the given s.
///
/// The format is `<length><unit>`, where whitespace is allowed before, between and
/// after the parts, e.g. `1d`, `100s`, `5 days` or `250 millis`. Parts may be combined,
/// i.e. `2h5m`, `-2h5m` or `2h-5m`. A bare number is interpreted as seconds.
/// Infinities are designated by `Inf`, `PlusInf`, `+Inf`, `-Inf` and `MinusInf`.
///
/// The returned duration value can be negative.
pub fn duration_value(s: &str) -> ParseResult<i64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(ParseError::EmptyDuration);
    }

    match trimmed {
        "Inf" | "PlusInf" | "+Inf" => return Ok(INFINITE_DURATION),
        "-Inf" | "MinusInf" => return Ok(i64::MIN),
        _ => {}
    }

    // Try parsing floating-point duration
    if let Ok(secs) = trimmed.parse::<f64>() {
        return to_nanos(secs * NANOS_PER_SECOND as f64, s);
    }

    let mut is_minus = false;
    let mut cursor = trimmed;
    let mut d = 0.0;
    while !cursor.is_empty() {
        let (mut d_local, rest) = parse_single_duration(cursor, s)?;
        if is_minus && d_local > 0.0 {
            d_local = -d_local
        }
        d += d_local;
        if d_local < 0.0 {
            is_minus = true
        }
        cursor = rest.trim_start();
    }
    to_nanos(d, s)
}

fn to_nanos(d: f64, s: &str) -> ParseResult<i64> {
    if !d.is_finite() || d.abs() >= i64::MAX as f64 {
        return Err(ParseError::DurationOverflow(s.to_string()));
    }
    Ok(d.round() as i64)
}

/// Parses a single `<length><unit>` pair from the start of cursor, returning the
/// value in nanoseconds and the unconsumed remainder.
fn parse_single_duration<'a>(cursor: &'a str, input: &str) -> ParseResult<(f64, &'a str)> {
    let num_len = cursor
        .char_indices()
        .find(|(i, ch)| !(ch.is_ascii_digit() || *ch == '.' || (*i == 0 && (*ch == '-' || *ch == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(cursor.len());

    let num_part = &cursor[..num_len];
    let value: f64 = num_part
        .parse()
        .map_err(|_| ParseError::InvalidDuration(input.to_string()))?;

    let rest = cursor[num_len..].trim_start();
    let unit_len = rest
        .char_indices()
        .find(|(_, ch)| !ch.is_alphabetic())
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    if unit_len == 0 {
        return Err(ParseError::InvalidDuration(input.to_string()));
    }

    let unit = &rest[..unit_len];
    let multiplier = unit_nanos(unit).ok_or_else(|| ParseError::InvalidDurationUnit {
        unit: unit.to_string(),
        input: input.to_string(),
    })?;

    Ok((value * multiplier, &rest[unit_len..]))
}

fn unit_nanos(unit: &str) -> Option<f64> {
    let nanos = match unit {
        "ns" | "nano" | "nanos" | "nanosecond" | "nanoseconds" => 1,
        "us" | "µs" | "micro" | "micros" | "microsecond" | "microseconds" => NANOS_PER_MICRO,
        "ms" | "milli" | "millis" | "millisecond" | "milliseconds" => NANOS_PER_MILLI,
        "s" | "sec" | "secs" | "second" | "seconds" => NANOS_PER_SECOND,
        "m" | "min" | "mins" | "minute" | "minutes" => NANOS_PER_MINUTE,
        "h" | "hour" | "hours" => NANOS_PER_HOUR,
        "d" | "day" | "days" => NANOS_PER_DAY,
        "w" | "week" | "weeks" => NANOS_PER_WEEK,
        "y" => NANOS_PER_YEAR,
        _ => return None,
    };
    Some(nanos as f64)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("1d", NANOS_PER_DAY)]
    #[test_case("100s", 100 * NANOS_PER_SECOND)]
    #[test_case("5 days", 5 * NANOS_PER_DAY)]
    #[test_case(" 250 millis ", 250 * NANOS_PER_MILLI)]
    #[test_case("1h30m", 90 * NANOS_PER_MINUTE)]
    #[test_case("1.5h", 90 * NANOS_PER_MINUTE)]
    #[test_case("10µs", 10 * NANOS_PER_MICRO)]
    #[test_case("3 nanoseconds", 3)]
    #[test_case("2w", 2 * NANOS_PER_WEEK)]
    #[test_case("42", 42 * NANOS_PER_SECOND)]
    #[test_case("Inf", INFINITE_DURATION)]
    fn test_positive_duration_value(s: &str, expected: i64) {
        assert_eq!(positive_duration_value(s), Ok(expected));
    }

    #[test]
    fn test_negative_parts() {
        assert_eq!(duration_value("2h-5m"), Ok(115 * NANOS_PER_MINUTE));
        assert_eq!(duration_value("-1h5m"), Ok(-65 * NANOS_PER_MINUTE));
        assert_eq!(duration_value("MinusInf"), Ok(i64::MIN));
    }

    #[test]
    fn test_invalid_durations() {
        assert_eq!(duration_value(""), Err(ParseError::EmptyDuration));
        assert_eq!(
            duration_value("days"),
            Err(ParseError::InvalidDuration("days".to_string()))
        );
        assert_eq!(
            duration_value("5"),
            Ok(5 * NANOS_PER_SECOND)
        );
        assert_eq!(
            duration_value("5 parsecs"),
            Err(ParseError::InvalidDurationUnit {
                unit: "parsecs".to_string(),
                input: "5 parsecs".to_string()
            })
        );
        assert_eq!(
            positive_duration_value("-3s"),
            Err(ParseError::NegativeDuration("-3s".to_string()))
        );
        assert!(matches!(
            duration_value("300000y"),
            Err(ParseError::DurationOverflow(_))
        ));
    }

    #[test_case(0, "0s")]
    #[test_case(NANOS_PER_DAY, "1d")]
    #[test_case(NANOS_PER_DAY + 2 * NANOS_PER_HOUR, "1d2h")]
    #[test_case(250 * NANOS_PER_MILLI, "250ms")]
    #[test_case(INFINITE_DURATION, "Inf")]
    fn test_display_duration(v: i64, expected: &str) {
        assert_eq!(DisplayDuration(v).to_string(), expected);
    }
}
