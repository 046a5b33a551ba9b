extern crate ahash;
extern crate rayon;
extern crate tsummary_common;

mod runtime_error;

pub mod config;
pub mod coordinator;
pub mod ewma;
pub mod executor;
pub mod handler;
pub mod max;
pub mod summarizer;
pub mod types;
pub mod window;

pub use config::*;
pub use coordinator::*;
pub use ewma::*;
pub use executor::*;
pub use handler::*;
pub use max::*;
pub use runtime_error::*;
pub use summarizer::*;
pub use types::*;
pub use window::*;

#[cfg(test)]
mod tests;

pub mod prelude {
    pub use crate::config::{Convention, DurationPerPeriod, EwmaConfig, ExecutorConfig};
    pub use crate::executor::SummarizeExecutor;
    pub use crate::handler::{create_summarizer, SummarizerHandler, SummarizerKind};
    pub use crate::runtime_error::{RuntimeError, RuntimeResult};
    pub use crate::summarizer::{Subtractable, Summarizer};
    pub use crate::types::{GroupSummary, Row, Timestamp};
    pub use crate::window::{Window, WindowDriver};
}
