#![forbid(unsafe_code)]

pub mod accessibility;
pub mod model;
pub mod resume;
pub mod time;
pub mod watch_timer;

pub use time::{Clock, ManualClock};
