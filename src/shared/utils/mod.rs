pub mod clock;
pub mod logger;

pub use clock::{Clock, FixedClock, SystemClock};
