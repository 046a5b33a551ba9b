use thiserror::Error;

pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug, PartialEq, Clone, Error)]
pub enum ParseError {
    #[error("duration cannot be empty")]
    EmptyDuration,
    #[error("cannot parse duration `{0}`")]
    InvalidDuration(String),
    #[error("invalid duration unit `{unit}` in `{input}`")]
    InvalidDurationUnit { unit: String, input: String },
    #[error("duration cannot be negative; got `{0}`")]
    NegativeDuration(String),
    #[error("duration `{0}` is too large")]
    DurationOverflow(String),
}
