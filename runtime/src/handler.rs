use std::str::FromStr;

use strum_macros::{Display, EnumString, IntoStaticStr};

use crate::config::EwmaConfig;
use crate::ewma::{EwmaState, EwmaSummarizer};
use crate::max::{MaxState, MaxSummarizer};
use crate::runtime_error::{RuntimeError, RuntimeResult};
use crate::summarizer::{OutputField, Subtractable, Summarizer};
use crate::types::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SummarizerKind {
    Ewma,
    Max,
}

/// A summarizer chosen at runtime by name.
#[derive(Debug, Clone)]
pub enum SummarizerHandler {
    Ewma(EwmaSummarizer),
    Max(MaxSummarizer),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SummaryState {
    Ewma(EwmaState),
    Max(MaxState),
}

impl SummarizerHandler {
    pub fn kind(&self) -> SummarizerKind {
        match self {
            SummarizerHandler::Ewma(_) => SummarizerKind::Ewma,
            SummarizerHandler::Max(_) => SummarizerKind::Max,
        }
    }

    fn state_mismatch(&self) -> RuntimeError {
        let msg = format!("BUG: state does not belong to the `{}` summarizer", self.kind());
        RuntimeError::from(msg)
    }
}

/// Creates a summarizer from its name and string options, e.g.
/// `create_summarizer("ewma", [("xColumn", "price"), ("convention", "core")])`.
pub fn create_summarizer<I, K, V>(name: &str, options: I) -> RuntimeResult<SummarizerHandler>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let kind = SummarizerKind::from_str(name)
        .map_err(|_| RuntimeError::UnknownSummarizer(name.to_string()))?;
    match kind {
        SummarizerKind::Ewma => {
            let config = EwmaConfig::from_options(options)?;
            Ok(SummarizerHandler::Ewma(EwmaSummarizer::new(&config)?))
        }
        SummarizerKind::Max => {
            let mut column = None;
            for (key, value) in options {
                match key.as_ref() {
                    "column" => column = Some(value.as_ref().to_string()),
                    other => {
                        return Err(RuntimeError::InvalidConfig(format!(
                            "unrecognized max option `{}`",
                            other
                        )))
                    }
                }
            }
            let column = column.ok_or_else(|| {
                RuntimeError::InvalidConfig("missing required option `column`".to_string())
            })?;
            Ok(SummarizerHandler::Max(MaxSummarizer::new(column)))
        }
    }
}

impl Summarizer for SummarizerHandler {
    type State = SummaryState;

    fn name(&self) -> &str {
        match self {
            SummarizerHandler::Ewma(s) => s.name(),
            SummarizerHandler::Max(s) => s.name(),
        }
    }

    fn zero(&self) -> SummaryState {
        match self {
            SummarizerHandler::Ewma(s) => SummaryState::Ewma(s.zero()),
            SummarizerHandler::Max(s) => SummaryState::Max(s.zero()),
        }
    }

    fn add(&self, state: &SummaryState, row: &Row) -> RuntimeResult<SummaryState> {
        match (self, state) {
            (SummarizerHandler::Ewma(s), SummaryState::Ewma(state)) => {
                s.add(state, row).map(SummaryState::Ewma)
            }
            (SummarizerHandler::Max(s), SummaryState::Max(state)) => {
                s.add(state, row).map(SummaryState::Max)
            }
            _ => Err(self.state_mismatch()),
        }
    }

    fn merge(&self, left: &SummaryState, right: &SummaryState) -> RuntimeResult<SummaryState> {
        match (self, left, right) {
            (SummarizerHandler::Ewma(s), SummaryState::Ewma(l), SummaryState::Ewma(r)) => {
                s.merge(l, r).map(SummaryState::Ewma)
            }
            (SummarizerHandler::Max(s), SummaryState::Max(l), SummaryState::Max(r)) => {
                s.merge(l, r).map(SummaryState::Max)
            }
            _ => Err(self.state_mismatch()),
        }
    }

    fn render(&self, state: &SummaryState) -> f64 {
        match (self, state) {
            (SummarizerHandler::Ewma(s), SummaryState::Ewma(state)) => s.render(state),
            (SummarizerHandler::Max(s), SummaryState::Max(state)) => s.render(state),
            _ => f64::NAN,
        }
    }

    fn output_schema(&self) -> Vec<OutputField> {
        match self {
            SummarizerHandler::Ewma(s) => s.output_schema(),
            SummarizerHandler::Max(s) => s.output_schema(),
        }
    }

    fn requires_order(&self) -> bool {
        match self {
            SummarizerHandler::Ewma(s) => s.requires_order(),
            SummarizerHandler::Max(s) => s.requires_order(),
        }
    }

    fn as_subtractable(&self) -> Option<&dyn Subtractable<State = SummaryState>> {
        match self {
            SummarizerHandler::Ewma(_) => Some(self),
            SummarizerHandler::Max(_) => None,
        }
    }
}

impl Subtractable for SummarizerHandler {
    fn subtract(&self, state: &SummaryState, row: &Row) -> RuntimeResult<SummaryState> {
        match (self, state) {
            (SummarizerHandler::Ewma(s), SummaryState::Ewma(state)) => {
                s.subtract(state, row).map(SummaryState::Ewma)
            }
            (SummarizerHandler::Max(_), _) => Err(RuntimeError::from(
                "BUG: subtract called on a non-subtractable summarizer",
            )),
            _ => Err(self.state_mismatch()),
        }
    }
}
