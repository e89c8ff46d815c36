#![forbid(unsafe_code)]

pub mod model;
pub mod playback;
pub mod time;

pub use time::Clock;
