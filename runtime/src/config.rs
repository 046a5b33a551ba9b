use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use tsummary_common::duration::{positive_duration_value, DisplayDuration, INFINITE_DURATION};
use tsummary_common::time::NANOS_PER_DAY;

use crate::runtime_error::{RuntimeError, RuntimeResult};

pub const DEFAULT_ALPHA: f64 = 0.05;

/// EWMA formula variant.
///
/// `Core` keeps the decayed sum and the decayed weight apart and normalizes at render
/// time. `Legacy` applies `alpha` at every step and renders the decayed sum directly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Convention {
    Core,
    #[default]
    Legacy,
}

/// How elapsed time turns into decay periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DurationPerPeriod {
    /// Every row is one period, regardless of elapsed time.
    Constant,
    /// Elapsed nanoseconds are divided by this length to get fractional periods.
    Period(i64),
}

impl Default for DurationPerPeriod {
    fn default() -> Self {
        DurationPerPeriod::Period(NANOS_PER_DAY)
    }
}

impl FromStr for DurationPerPeriod {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("constant") {
            return Ok(DurationPerPeriod::Constant);
        }
        match positive_duration_value(s)? {
            0 => Err(RuntimeError::InvalidConfig(format!(
                "durationPerPeriod must be positive; got `{}`",
                s
            ))),
            INFINITE_DURATION => Err(RuntimeError::InvalidConfig(format!(
                "durationPerPeriod must be finite; got `{}`",
                s
            ))),
            nanos => Ok(DurationPerPeriod::Period(nanos)),
        }
    }
}

impl TryFrom<String> for DurationPerPeriod {
    type Error = RuntimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DurationPerPeriod> for String {
    fn from(value: DurationPerPeriod) -> Self {
        value.to_string()
    }
}

impl fmt::Display for DurationPerPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DurationPerPeriod::Constant => write!(f, "constant"),
            DurationPerPeriod::Period(nanos) => write!(f, "{}", DisplayDuration(*nanos)),
        }
    }
}

/// Options recognized by the EWMA summarizer.
///
/// Either `alpha` or `halfLife` (measured in periods) may be given; with neither, alpha
/// defaults to [`DEFAULT_ALPHA`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EwmaConfig {
    pub x_column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub half_life: Option<f64>,
    #[serde(default)]
    pub duration_per_period: DurationPerPeriod,
    #[serde(default)]
    pub convention: Convention,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl EwmaConfig {
    pub fn new(x_column: impl Into<String>) -> Self {
        EwmaConfig {
            x_column: x_column.into(),
            alpha: None,
            half_life: None,
            duration_per_period: DurationPerPeriod::default(),
            convention: Convention::default(),
            alias: None,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = Some(alpha);
        self.half_life = None;
        self
    }

    pub fn with_half_life(mut self, half_life: f64) -> Self {
        self.half_life = Some(half_life);
        self.alpha = None;
        self
    }

    pub fn with_convention(mut self, convention: Convention) -> Self {
        self.convention = convention;
        self
    }

    pub fn with_duration_per_period(mut self, duration_per_period: DurationPerPeriod) -> Self {
        self.duration_per_period = duration_per_period;
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Builds a config from the engine's string option surface, e.g.
    /// `[("xColumn", "price"), ("durationPerPeriod", "constant"), ("convention", "core")]`.
    pub fn from_options<I, K, V>(options: I) -> RuntimeResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut x_column = None;
        let mut config = EwmaConfig::new("");
        for (key, value) in options {
            let value = value.as_ref();
            match key.as_ref() {
                "xColumn" => x_column = Some(value.to_string()),
                "alpha" => config.alpha = Some(parse_float_option("alpha", value)?),
                "halfLife" => config.half_life = Some(parse_float_option("halfLife", value)?),
                "durationPerPeriod" => config.duration_per_period = value.parse()?,
                "convention" => {
                    config.convention = Convention::from_str(value).map_err(|_| {
                        RuntimeError::InvalidConfig(format!(
                            "convention must be `core` or `legacy`; got `{}`",
                            value
                        ))
                    })?
                }
                "alias" => config.alias = Some(value.to_string()),
                other => {
                    return Err(RuntimeError::InvalidConfig(format!(
                        "unrecognized ewma option `{}`",
                        other
                    )))
                }
            }
        }
        config.x_column = x_column
            .ok_or_else(|| RuntimeError::InvalidConfig("missing required option `xColumn`".to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolves the decay rate from `alpha` or `halfLife`.
    pub fn alpha(&self) -> RuntimeResult<f64> {
        let alpha = match (self.alpha, self.half_life) {
            (Some(_), Some(_)) => {
                return Err(RuntimeError::InvalidConfig(
                    "only one of `alpha` and `halfLife` may be set".to_string(),
                ))
            }
            (Some(alpha), None) => alpha,
            (None, Some(half_life)) => {
                if !(half_life.is_finite() && half_life > 0.0) {
                    return Err(RuntimeError::InvalidConfig(format!(
                        "halfLife must be a positive number of periods; got {}",
                        half_life
                    )));
                }
                1.0 - 0.5_f64.powf(1.0 / half_life)
            }
            (None, None) => DEFAULT_ALPHA,
        };
        // alpha == 1 leaves no memory and makes the decay step non-invertible
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(RuntimeError::InvalidConfig(format!(
                "alpha must be in (0, 1); got {}",
                alpha
            )));
        }
        Ok(alpha)
    }

    pub fn validate(&self) -> RuntimeResult<()> {
        if self.x_column.is_empty() {
            return Err(RuntimeError::InvalidConfig(
                "xColumn cannot be empty".to_string(),
            ));
        }
        if let DurationPerPeriod::Period(nanos) = self.duration_per_period {
            if nanos <= 0 {
                return Err(RuntimeError::InvalidConfig(format!(
                    "durationPerPeriod must be positive; got {}ns",
                    nanos
                )));
            }
        }
        self.alpha().map(|_| ())
    }

    /// Name of the rendered output column.
    pub fn output_name(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => format!("{}_ewma", self.x_column),
        }
    }
}

fn parse_float_option(name: &str, value: &str) -> RuntimeResult<f64> {
    value.trim().parse::<f64>().map_err(|_| {
        RuntimeError::InvalidConfig(format!("{} must be a number; got `{}`", name, value))
    })
}

/// Settings for [`crate::SummarizeExecutor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutorConfig {
    /// Size of the worker pool. 0 uses one worker per available cpu.
    pub max_workers: usize,
    pub trace_enabled: bool,
    /// Max number of groups to emit. 0 means no limit.
    pub max_groups: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            max_workers: 0,
            trace_enabled: false,
            max_groups: 0,
        }
    }
}
