//! Ensemble management: validation-loss ranking, series-to-network
//! assignment and the rolling forecast averager.

mod ranking;
mod rolling;

pub use ranking::{perf_to_ranking, Assignments, BIG_LOSS};
pub use rolling::RollingForecasts;
