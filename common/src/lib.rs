extern crate chrono;

pub mod duration;
pub mod error;
pub mod time;

pub mod prelude {
    pub use crate::duration::*;
    pub use crate::error::*;
    pub use crate::time;
    pub use crate::time::*;
}
