//! Stream combinators for subscriber streams

mod throttle;

pub use throttle::{Throttle, ThrottleExt};
