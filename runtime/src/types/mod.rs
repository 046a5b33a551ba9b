pub use group_summary::*;
pub use row::*;

mod group_summary;
mod row;

pub use tsummary_common::time::Timestamp;
