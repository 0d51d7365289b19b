//! Stream sources and adapters.

mod ticker;

pub use ticker::{IntervalTicker, ManualClock, ManualTicker, Ticker};
