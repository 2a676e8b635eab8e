//! Domain types for chartfeed

pub mod bar;
pub mod fill;
pub mod timeframe;

pub use bar::Bar;
pub use fill::{FillEvent, Side};
pub use timeframe::{ParseTimeframeError, Timeframe};
